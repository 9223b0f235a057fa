//! Simulated restore workload
//!
//! A [`RestoreExecutor`] that pretends to restore a fixed set of projects, plus the driver
//! behind the `simulate` command: several producers hammering one scheduler, followed by a
//! summary of how their requests were coalesced.

use async_trait::async_trait;
use futures::future::join_all;
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::context::fingerprint;
use crate::error::{RestoreError, SchedulerError};
use crate::executor::{RestoreExecutor, RestoreInvocation, RestoreTrigger};
use crate::progress::sink::LogLevel;
use crate::request::{ExplicitRestoreReason, RestoreRequest};
use crate::scheduler::RestoreScheduler;
use crate::state::SchedulerStats;

/// One simulated execution as seen by the executor.
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionRecord {
    pub operation_id: u64,
    pub request_count: usize,
    pub trigger: RestoreTrigger,
    pub force_restore: bool,
    pub projects_restored: usize,
    pub projects_skipped: usize,
    pub success: bool,
}

/// Sleeps instead of restoring. Every `fail_every`-th execution reports failure.
pub struct SimulatedExecutor {
    restore_time: Duration,
    fail_every: Option<u64>,
    projects: Vec<String>,
    executions: AtomicU64,
    records: Mutex<Vec<ExecutionRecord>>,
}

impl SimulatedExecutor {
    pub fn new(restore_time: Duration, fail_every: Option<u64>) -> Self {
        Self {
            restore_time,
            fail_every: fail_every.filter(|n| *n > 0),
            projects: vec![
                "src/App/App.csproj".to_string(),
                "src/Core/Core.csproj".to_string(),
                "tests/App.Tests/App.Tests.csproj".to_string(),
            ],
            executions: AtomicU64::new(0),
            records: Mutex::new(Vec::new()),
        }
    }

    pub fn records(&self) -> Vec<ExecutionRecord> {
        self.records.lock().clone()
    }
}

#[async_trait]
impl RestoreExecutor for SimulatedExecutor {
    async fn execute(
        &self,
        invocation: RestoreInvocation,
        cancel: CancellationToken,
    ) -> Result<bool, RestoreError> {
        let execution = self.executions.fetch_add(1, Ordering::SeqCst) + 1;
        let graphs = invocation.job_context.dependency_graphs();
        let total = self.projects.len() as u32;
        let step = self.restore_time / total.max(1);

        let mut restored = 0usize;
        let mut skipped = 0usize;
        for (index, project) in self.projects.iter().enumerate() {
            let inputs = fingerprint(project.as_bytes());
            if !invocation.request.force_restore && graphs.is_up_to_date(project, &inputs) {
                skipped += 1;
                invocation.progress.log(
                    LogLevel::Verbose,
                    &format!("{} is up to date, skipping", project),
                );
                continue;
            }

            invocation
                .progress
                .report_progress(&format!("Restoring {}", project), index as u32 + 1, total);
            tokio::select! {
                _ = tokio::time::sleep(step) => {}
                _ = cancel.cancelled() => return Err(RestoreError::Cancelled),
            }
            graphs.record(project.clone(), inputs);
            restored += 1;
        }

        let success = self
            .fail_every
            .map(|n| execution % n != 0)
            .unwrap_or(true);
        if !success {
            invocation
                .progress
                .log(LogLevel::Error, "Simulated restore failure");
            for project in &self.projects {
                graphs.invalidate(project);
            }
        }

        debug!(
            operation_id = %invocation.tracking.operation_id,
            restored,
            skipped,
            success,
            "Simulated restore finished"
        );
        self.records.lock().push(ExecutionRecord {
            operation_id: invocation.tracking.operation_id.as_u64(),
            request_count: invocation.tracking.request_count,
            trigger: invocation.tracking.trigger,
            force_restore: invocation.request.force_restore,
            projects_restored: restored,
            projects_skipped: skipped,
            success,
        });
        Ok(success)
    }
}

/// Load shape for [`run_simulation`].
#[derive(Debug, Clone)]
pub struct SimulationPlan {
    pub producers: usize,
    pub requests_per_producer: usize,
    pub restore_now_calls: usize,
    /// Pause between two requests of the same producer
    pub stagger: Duration,
}

/// What the producers observed.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SimulationReport {
    /// Outcome label to number of callers that saw it
    pub outcomes: BTreeMap<String, usize>,
    /// Operations the callers were attached to, direct runs included
    pub distinct_operations: usize,
    pub stats: SchedulerStats,
    pub elapsed_ms: u128,
}

/// Drive `scheduler` with concurrent producers and wait for every caller.
pub async fn run_simulation(
    scheduler: Arc<RestoreScheduler>,
    plan: &SimulationPlan,
) -> Result<SimulationReport, SchedulerError> {
    let started = Instant::now();
    info!(
        producers = plan.producers,
        requests = plan.requests_per_producer,
        restore_now = plan.restore_now_calls,
        "Starting simulation"
    );

    let mut producers = Vec::with_capacity(plan.producers + plan.restore_now_calls);
    for producer in 0..plan.producers {
        let scheduler = Arc::clone(&scheduler);
        let requests = plan.requests_per_producer;
        let stagger = plan.stagger;
        producers.push(tokio::spawn(async move {
            let mut futures = Vec::with_capacity(requests);
            for index in 0..requests {
                let request = RestoreRequest::implicit().with_force(index == 0 && producer == 0);
                futures.push(scheduler.schedule(request));
                tokio::time::sleep(stagger * (producer as u32 + 1)).await;
            }
            let mut observed = Vec::with_capacity(futures.len());
            for future in futures {
                let id = future.id().as_u64();
                observed.push((Some(id), future.wait().await));
            }
            observed
        }));
    }

    for call in 0..plan.restore_now_calls {
        let scheduler = Arc::clone(&scheduler);
        let stagger = plan.stagger;
        producers.push(tokio::spawn(async move {
            tokio::time::sleep(stagger * (call as u32 + 1) * 3).await;
            let request = RestoreRequest::explicit(ExplicitRestoreReason::RestoreSolutionPackages);
            let outcome = scheduler
                .restore_now(request, &CancellationToken::new())
                .await;
            vec![(None, outcome)]
        }));
    }

    let mut report = SimulationReport::default();
    let mut operations = BTreeSet::new();
    let mut direct_runs = 0usize;
    for joined in join_all(producers).await {
        let observed = joined
            .map_err(|e| SchedulerError::RunnerFailed(format!("Producer task failed: {}", e)))?;
        for (operation, outcome) in observed {
            match operation {
                Some(id) => {
                    operations.insert(id);
                }
                None => direct_runs += 1,
            }
            *report.outcomes.entry(outcome.as_str().to_string()).or_default() += 1;
        }
    }

    report.distinct_operations = operations.len() + direct_runs;
    report.stats = scheduler.stats();
    report.elapsed_ms = started.elapsed().as_millis();
    info!(
        executed = report.stats.executed,
        elapsed_ms = report.elapsed_ms as u64,
        "Simulation finished"
    );
    Ok(report)
}
