//! Restore requests
//!
//! A request is an immutable value describing why and how a caller wants the solution
//! restored. Requests folded into the same run are accumulated with [`RestoreRequest::fold`].

use serde::{Deserialize, Serialize};

/// Where a restore request originated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RestoreSource {
    /// Background triggers: build events, solution load, file watches
    #[default]
    Implicit,
    /// A user asked for it
    Explicit,
}

/// Why an explicit restore was requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExplicitRestoreReason {
    #[default]
    None,
    RestoreSolutionPackages,
    RebuildSolution,
    CleanSolution,
    ProjectRetargeting,
    MissingPackagesBanner,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RestoreRequest {
    pub allow_delayed_start: bool,
    pub force_restore: bool,
    pub show_opt_out_message: bool,
    pub log_error_on_failure: bool,
    pub force_status_write: bool,
    #[serde(default)]
    pub source: RestoreSource,
    #[serde(default)]
    pub explicit_reason: ExplicitRestoreReason,
}

impl RestoreRequest {
    /// Background request as issued by build events and solution load.
    pub fn implicit() -> Self {
        Self {
            allow_delayed_start: true,
            ..Self::default()
        }
    }

    /// User-initiated request.
    pub fn explicit(reason: ExplicitRestoreReason) -> Self {
        Self {
            show_opt_out_message: true,
            log_error_on_failure: true,
            force_status_write: true,
            source: RestoreSource::Explicit,
            explicit_reason: reason,
            ..Self::default()
        }
    }

    pub fn with_force(mut self, force: bool) -> Self {
        self.force_restore = force;
        self
    }

    pub fn is_explicit(&self) -> bool {
        self.source == RestoreSource::Explicit
    }

    /// Accumulate `other` into a new request covering both.
    ///
    /// Flags are OR-ed. When the sources differ the result is explicit and carries the
    /// explicit reason of whichever side is explicit (`other` wins a tie).
    pub fn fold(&self, other: &RestoreRequest) -> RestoreRequest {
        let source = if self.source != other.source {
            RestoreSource::Explicit
        } else {
            self.source
        };
        let explicit_reason = if other.is_explicit() {
            other.explicit_reason
        } else if self.is_explicit() {
            self.explicit_reason
        } else {
            ExplicitRestoreReason::None
        };

        RestoreRequest {
            // A delayed start is only acceptable if every folded caller accepted one
            allow_delayed_start: self.allow_delayed_start && other.allow_delayed_start,
            force_restore: self.force_restore || other.force_restore,
            show_opt_out_message: self.show_opt_out_message || other.show_opt_out_message,
            log_error_on_failure: self.log_error_on_failure || other.log_error_on_failure,
            force_status_write: self.force_status_write || other.force_status_write,
            source,
            explicit_reason,
        }
    }

    /// True when folding `other` changes the request source, which ends a drain window early.
    pub fn upgrades_source(&self, other: &RestoreRequest) -> bool {
        self.source != other.source
    }
}
