//! Progress sinks: where a restore run reports progress, log lines and errors.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, error, info, trace, warn};

use crate::progress::event::ProgressEvent;

/// Severity of a restore log line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    Debug,
    Verbose,
    Information,
    Minimal,
    Warning,
    Error,
}

/// Receiver of restore progress. Calls are fire-and-forget and must return quickly.
pub trait ProgressSink: Send + Sync {
    fn report_progress(&self, message: &str, current_step: u32, total_steps: u32);

    fn log(&self, level: LogLevel, message: &str);

    fn show_error(&self, message: &str);

    /// Structured lifecycle event; ignored unless the sink records events.
    fn emit_event(&self, _event_type: &str, _data: Value) {}
}

/// Call into `sink` and swallow a panic. Returns false when the sink panicked.
pub fn call_guarded<F>(sink: &dyn ProgressSink, f: F) -> bool
where
    F: FnOnce(&dyn ProgressSink),
{
    catch_unwind(AssertUnwindSafe(|| f(sink))).is_ok()
}

/// Forwards everything to `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingProgressSink;

impl ProgressSink for TracingProgressSink {
    fn report_progress(&self, message: &str, current_step: u32, total_steps: u32) {
        debug!(current_step, total_steps, "{}", message);
    }

    fn log(&self, level: LogLevel, message: &str) {
        match level {
            LogLevel::Debug => trace!("{}", message),
            LogLevel::Verbose => debug!("{}", message),
            LogLevel::Information | LogLevel::Minimal => info!("{}", message),
            LogLevel::Warning => warn!("{}", message),
            LogLevel::Error => error!("{}", message),
        }
    }

    fn show_error(&self, message: &str) {
        error!(shown = true, "{}", message);
    }

    fn emit_event(&self, event_type: &str, data: Value) {
        debug!(event_type = %event_type, data = %data, "Restore event");
    }
}

/// Line recorded by [`MemoryProgressSink`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SinkEntry {
    Progress {
        message: String,
        current_step: u32,
        total_steps: u32,
    },
    Log {
        level: LogLevel,
        message: String,
    },
    Error(String),
}

/// Keeps everything in memory. Used by the simulator summary and by tests.
#[derive(Debug, Default)]
pub struct MemoryProgressSink {
    entries: Mutex<Vec<SinkEntry>>,
    events: Mutex<Vec<ProgressEvent>>,
    seq: AtomicU64,
}

impl MemoryProgressSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<SinkEntry> {
        self.entries.lock().clone()
    }

    pub fn events(&self) -> Vec<ProgressEvent> {
        self.events.lock().clone()
    }

    pub fn events_of_type(&self, event_type: &str) -> Vec<ProgressEvent> {
        self.events
            .lock()
            .iter()
            .filter(|e| e.event_type == event_type)
            .cloned()
            .collect()
    }

    pub fn errors(&self) -> Vec<String> {
        self.entries
            .lock()
            .iter()
            .filter_map(|entry| match entry {
                SinkEntry::Error(message) => Some(message.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn messages_at(&self, level: LogLevel) -> Vec<String> {
        self.entries
            .lock()
            .iter()
            .filter_map(|entry| match entry {
                SinkEntry::Log { level: l, message } if *l == level => Some(message.clone()),
                _ => None,
            })
            .collect()
    }
}

impl ProgressSink for MemoryProgressSink {
    fn report_progress(&self, message: &str, current_step: u32, total_steps: u32) {
        self.entries.lock().push(SinkEntry::Progress {
            message: message.to_string(),
            current_step,
            total_steps,
        });
    }

    fn log(&self, level: LogLevel, message: &str) {
        self.entries.lock().push(SinkEntry::Log {
            level,
            message: message.to_string(),
        });
    }

    fn show_error(&self, message: &str) {
        self.entries.lock().push(SinkEntry::Error(message.to_string()));
    }

    fn emit_event(&self, event_type: &str, data: Value) {
        let seq = self.seq.fetch_add(1, Ordering::Relaxed) + 1;
        self.events
            .lock()
            .push(ProgressEvent::with_now(seq, event_type, data));
    }
}
