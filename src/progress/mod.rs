//! Progress observability primitives.

pub mod event;
pub mod operation_log;
pub mod sink;

pub use event::{
    now_millis, ProgressEvent, RequestDroppedData, RestoreFinishedData, RestoreStartedData,
    SchedulerResetData,
};
pub use operation_log::RestoreOperationLogger;
pub use sink::{
    call_guarded, LogLevel, MemoryProgressSink, ProgressSink, SinkEntry, TracingProgressSink,
};
