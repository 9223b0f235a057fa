//! Restore job context
//!
//! State carried between successive restores of one solution. Only one restore runs at a
//! time, so the context is never touched concurrently by two executors; the interior locks
//! only make it `Sync` for the executor trait.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

/// Identity of a job context generation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContextId(u64);

impl ContextId {
    fn next() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        ContextId(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(self) -> u64 {
        self.0
    }
}

/// Hex-encoded blake3 digest of a project's restore inputs.
pub fn fingerprint(inputs: &[u8]) -> String {
    hex::encode(blake3::hash(inputs).as_bytes())
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectGraphEntry {
    pub fingerprint: String,
    pub restored_at: DateTime<Utc>,
}

/// Per-project dependency graph fingerprints from the last successful restore.
#[derive(Debug, Default)]
pub struct DependencyGraphCache {
    entries: RwLock<HashMap<String, ProjectGraphEntry>>,
}

impl DependencyGraphCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// True when `project` was last restored with the same inputs.
    pub fn is_up_to_date(&self, project: &str, fingerprint: &str) -> bool {
        self.entries
            .read()
            .get(project)
            .map(|entry| entry.fingerprint == fingerprint)
            .unwrap_or(false)
    }

    pub fn record(&self, project: impl Into<String>, fingerprint: impl Into<String>) {
        let project = project.into();
        let entry = ProjectGraphEntry {
            fingerprint: fingerprint.into(),
            restored_at: Utc::now(),
        };
        debug!(project = %project, fingerprint = %entry.fingerprint, "Recorded dependency graph");
        self.entries.write().insert(project, entry);
    }

    pub fn get(&self, project: &str) -> Option<ProjectGraphEntry> {
        self.entries.read().get(project).cloned()
    }

    pub fn invalidate(&self, project: &str) -> bool {
        self.entries.write().remove(project).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

/// Long-lived context threaded into every restore execution.
#[derive(Debug)]
pub struct RestoreJobContext {
    id: ContextId,
    created_at: DateTime<Utc>,
    dependency_graphs: DependencyGraphCache,
    executions: AtomicU64,
}

impl RestoreJobContext {
    pub fn new() -> Self {
        Self {
            id: ContextId::next(),
            created_at: Utc::now(),
            dependency_graphs: DependencyGraphCache::new(),
            executions: AtomicU64::new(0),
        }
    }

    pub fn id(&self) -> ContextId {
        self.id
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn dependency_graphs(&self) -> &DependencyGraphCache {
        &self.dependency_graphs
    }

    /// Number of executions that ran against this context.
    pub fn executions(&self) -> u64 {
        self.executions.load(Ordering::Relaxed)
    }

    pub(crate) fn record_execution(&self) -> u64 {
        self.executions.fetch_add(1, Ordering::Relaxed) + 1
    }
}

impl Default for RestoreJobContext {
    fn default() -> Self {
        Self::new()
    }
}
