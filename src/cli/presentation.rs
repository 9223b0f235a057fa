//! CLI presentation: render simulation results.

use crate::error::SchedulerError;
use crate::simulate::{ExecutionRecord, SimulationReport};
use comfy_table::Table;
use serde_json::json;

/// Executions table followed by a caller/counter summary.
pub fn format_simulation_text(report: &SimulationReport, records: &[ExecutionRecord]) -> String {
    let mut executions = Table::new();
    executions.load_preset(comfy_table::presets::UTF8_FULL);
    executions.set_header(vec![
        "Operation", "Requests", "Trigger", "Force", "Restored", "Skipped", "Result",
    ]);
    for record in records {
        executions.add_row(vec![
            format!("op-{}", record.operation_id),
            record.request_count.to_string(),
            record.trigger.as_str().to_string(),
            if record.force_restore { "yes" } else { "no" }.to_string(),
            record.projects_restored.to_string(),
            record.projects_skipped.to_string(),
            if record.success { "succeeded" } else { "failed" }.to_string(),
        ]);
    }

    let mut summary = Table::new();
    summary.load_preset(comfy_table::presets::UTF8_FULL);
    summary.set_header(vec!["Metric", "Value"]);
    let stats = &report.stats;
    let callers: usize = report.outcomes.values().sum();
    let rows: Vec<(String, String)> = vec![
        ("Callers".to_string(), callers.to_string()),
        (
            "Operations observed".to_string(),
            report.distinct_operations.to_string(),
        ),
        ("Requests scheduled".to_string(), stats.scheduled.to_string()),
        ("Requests dropped".to_string(), stats.dropped.to_string()),
        ("Executions".to_string(), stats.executed.to_string()),
        ("Succeeded".to_string(), stats.succeeded.to_string()),
        ("Failed".to_string(), stats.failed.to_string()),
        ("Cancelled".to_string(), stats.cancelled.to_string()),
        ("Elapsed".to_string(), format!("{} ms", report.elapsed_ms)),
    ];
    for (metric, value) in rows {
        summary.add_row(vec![metric, value]);
    }
    for (outcome, count) in &report.outcomes {
        summary.add_row(vec![format!("Callers {}", outcome), count.to_string()]);
    }

    format!("{}\n{}", executions, summary)
}

pub fn format_simulation_json(
    report: &SimulationReport,
    records: &[ExecutionRecord],
) -> Result<String, SchedulerError> {
    serde_json::to_string_pretty(&json!({
        "report": report,
        "executions": records,
    }))
    .map_err(|e| SchedulerError::ConfigError(format!("Failed to render report: {}", e)))
}
