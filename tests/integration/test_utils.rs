//! Shared test utilities for integration tests
//!
//! Executors that record what the scheduler asked of them, a gate to hold a restore open,
//! scheduler construction with short windows, and isolated config directories.

use async_trait::async_trait;
use parking_lot::Mutex;
use restore_scheduler::progress::MemoryProgressSink;
use restore_scheduler::{
    RestoreError, RestoreExecutor, RestoreInvocation, RestoreRequest, RestoreScheduler,
    RestoreTrigger, SchedulerConfig,
};
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

/// Upper bound for any single wait in these tests
pub const TEST_TIMEOUT: Duration = Duration::from_secs(10);

/// One call observed by [`RecordingExecutor`].
#[derive(Debug, Clone)]
pub struct RecordedRun {
    pub operation_id: u64,
    pub request: RestoreRequest,
    pub request_count: usize,
    pub trigger: RestoreTrigger,
}

/// Records every execution and the highest number of executions running at once.
///
/// Each execution sleeps for `restore_time` (cancellable) and then reports `success`.
pub struct RecordingExecutor {
    restore_time: Duration,
    success: bool,
    concurrent: AtomicUsize,
    max_concurrent: AtomicUsize,
    runs: Mutex<Vec<RecordedRun>>,
}

impl RecordingExecutor {
    pub fn new(restore_time: Duration) -> Self {
        Self {
            restore_time,
            success: true,
            concurrent: AtomicUsize::new(0),
            max_concurrent: AtomicUsize::new(0),
            runs: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(restore_time: Duration) -> Self {
        Self {
            success: false,
            ..Self::new(restore_time)
        }
    }

    pub fn runs(&self) -> Vec<RecordedRun> {
        self.runs.lock().clone()
    }

    pub fn run_count(&self) -> usize {
        self.runs.lock().len()
    }

    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RestoreExecutor for RecordingExecutor {
    async fn execute(
        &self,
        invocation: RestoreInvocation,
        cancel: CancellationToken,
    ) -> Result<bool, RestoreError> {
        let running = self.concurrent.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_concurrent.fetch_max(running, Ordering::SeqCst);
        self.runs.lock().push(RecordedRun {
            operation_id: invocation.tracking.operation_id.as_u64(),
            request: invocation.request.clone(),
            request_count: invocation.tracking.request_count,
            trigger: invocation.tracking.trigger,
        });

        let result = tokio::select! {
            _ = tokio::time::sleep(self.restore_time) => Ok(self.success),
            _ = cancel.cancelled() => Err(RestoreError::Cancelled),
        };
        self.concurrent.fetch_sub(1, Ordering::SeqCst);
        result
    }
}

/// Holds every execution open until the test releases it.
///
/// `started` counts executions that reached the gate, `release` lets one through.
pub struct GatedExecutor {
    gate: Semaphore,
    started: AtomicUsize,
    finished: AtomicUsize,
}

impl GatedExecutor {
    pub fn new() -> Self {
        Self {
            gate: Semaphore::new(0),
            started: AtomicUsize::new(0),
            finished: AtomicUsize::new(0),
        }
    }

    pub fn release(&self, runs: usize) {
        self.gate.add_permits(runs);
    }

    pub fn started(&self) -> usize {
        self.started.load(Ordering::SeqCst)
    }

    pub fn finished(&self) -> usize {
        self.finished.load(Ordering::SeqCst)
    }

    /// Poll until `count` executions have reached the gate.
    pub async fn wait_started(&self, count: usize) {
        wait_until(|| self.started() >= count).await;
    }
}

#[async_trait]
impl RestoreExecutor for GatedExecutor {
    async fn execute(
        &self,
        _invocation: RestoreInvocation,
        cancel: CancellationToken,
    ) -> Result<bool, RestoreError> {
        self.started.fetch_add(1, Ordering::SeqCst);
        let result = tokio::select! {
            permit = self.gate.acquire() => match permit {
                Ok(permit) => {
                    permit.forget();
                    Ok(true)
                }
                Err(_) => Err(RestoreError::Failed("gate closed".to_string())),
            },
            _ = cancel.cancelled() => Err(RestoreError::Cancelled),
        };
        self.finished.fetch_add(1, Ordering::SeqCst);
        result
    }
}

/// Scheduler config with windows short enough for tests.
pub fn fast_config() -> SchedulerConfig {
    SchedulerConfig {
        idle_timeout_ms: 40,
        max_drain_window_ms: 2_000,
        shutdown_timeout_ms: 1_000,
        ..SchedulerConfig::default()
    }
}

/// Scheduler on the current runtime with [`fast_config`] and an in-memory sink.
pub fn scheduler_with(
    executor: Arc<dyn RestoreExecutor>,
) -> (Arc<RestoreScheduler>, Arc<MemoryProgressSink>) {
    scheduler_with_config(fast_config(), executor)
}

pub fn scheduler_with_config(
    config: SchedulerConfig,
    executor: Arc<dyn RestoreExecutor>,
) -> (Arc<RestoreScheduler>, Arc<MemoryProgressSink>) {
    let sink = Arc::new(MemoryProgressSink::new());
    let scheduler = RestoreScheduler::new(config, executor, sink.clone()).unwrap();
    (Arc::new(scheduler), sink)
}

/// Await `future` or fail the test after [`TEST_TIMEOUT`].
pub async fn within<F: Future>(future: F) -> F::Output {
    tokio::time::timeout(TEST_TIMEOUT, future)
        .await
        .expect("test step timed out")
}

/// Poll `condition` every few milliseconds until it holds or [`TEST_TIMEOUT`] elapses.
pub async fn wait_until<F: Fn() -> bool>(condition: F) {
    within(async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await;
}

/// Global mutex to serialize config environment access across all tests
static CONFIG_ENV_MUTEX: std::sync::Mutex<()> = std::sync::Mutex::new(());

const CONFIG_ENV_VARS: &[&str] = &[
    "HOME",
    "XDG_CONFIG_HOME",
    "RESTORE_SCHEDULER_ENV",
    "RESTORE_SCHEDULER__SCHEDULER__IDLE_TIMEOUT_MS",
    "RESTORE_SCHEDULER__SCHEDULER__QUEUE_CAPACITY",
];

/// Environment variable state to restore after test
struct EnvState {
    saved: Vec<(&'static str, Option<String>)>,
}

impl EnvState {
    fn capture() -> Self {
        Self {
            saved: CONFIG_ENV_VARS
                .iter()
                .map(|name| (*name, std::env::var(name).ok()))
                .collect(),
        }
    }

    fn restore(self) {
        for (name, value) in self.saved {
            match value {
                Some(value) => std::env::set_var(name, value),
                None => std::env::remove_var(name),
            }
        }
    }
}

/// Run `f` with HOME and XDG_CONFIG_HOME pointed into `test_dir` and the override
/// variables cleared. The original environment is restored afterwards.
pub fn with_config_env<F, R>(test_dir: &TempDir, f: F) -> R
where
    F: FnOnce() -> R,
{
    let _guard = CONFIG_ENV_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
    let env_state = EnvState::capture();

    let test_config_home = test_dir.path().join("xdg");
    let test_home = test_dir.path().join("home");
    std::fs::create_dir_all(&test_config_home).unwrap();
    std::fs::create_dir_all(&test_home).unwrap();

    for name in CONFIG_ENV_VARS {
        std::env::remove_var(name);
    }
    std::env::set_var("HOME", test_home.to_str().unwrap());
    std::env::set_var("XDG_CONFIG_HOME", test_config_home.to_str().unwrap());

    let result = f();

    env_state.restore();

    result
}
