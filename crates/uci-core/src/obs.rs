//! Structured lifecycle events for supervised tasks and check runs.
//!
//! Events go through `tracing`, so they reach whichever sinks
//! [`crate::telemetry::init_logs`] installed.

use tracing::{error, info};

/// Span tagged with the delivery id and repository of one check run.
///
/// Attach it with `tracing::Instrument` so it survives `.await` points.
pub fn check_span(delivery_id: &str, repo: &str) -> tracing::Span {
    tracing::info_span!("uci.check", delivery_id = %delivery_id, repo = %repo)
}

pub fn emit_task_started(task: &str) {
    info!(event = "task.started", task = %task);
}

pub fn emit_task_finished(task: &str) {
    info!(event = "task.finished", task = %task);
}

/// Error level, so it reaches the error sink.
pub fn emit_task_failed(task: &str, error: &dyn std::fmt::Display) {
    error!(event = "task.failed", task = %task, error = %error);
}

pub fn emit_shutdown(reason: &str) {
    info!(event = "supervisor.shutdown", reason = %reason);
}

pub fn emit_check_started(check: &str, repo: &str) {
    info!(event = "check.started", check = %check, repo = %repo);
}

pub fn emit_check_finished(check: &str, repo: &str, findings: usize) {
    info!(
        event = "check.finished",
        check = %check,
        repo = %repo,
        findings = findings,
    );
}
