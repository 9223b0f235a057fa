//! Event schema for restore progress observability.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::request::{ExplicitRestoreReason, RestoreSource};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub ts: String,
    pub seq: u64,
    #[serde(rename = "type")]
    pub event_type: String,
    pub data: Value,
}

impl ProgressEvent {
    pub fn with_now(seq: u64, event_type: impl Into<String>, data: Value) -> Self {
        Self {
            ts: now_millis().to_string(),
            seq,
            event_type: event_type.into(),
            data,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RestoreStartedData {
    pub operation_id: u64,
    pub request_count: usize,
    pub trigger: String,
    pub source: RestoreSource,
    pub explicit_reason: ExplicitRestoreReason,
    pub force_restore: bool,
    pub is_solution_load_restore: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RestoreFinishedData {
    pub operation_id: u64,
    pub outcome: String,
    pub duration_ms: u128,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestDroppedData {
    pub queue_capacity: usize,
    pub source: RestoreSource,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerResetData {
    pub reason: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub runner_abandoned: Option<bool>,
}

pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
