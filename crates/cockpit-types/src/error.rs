//! The error taxonomy surfaced by the core.
//!
//! Graph construction errors abort a run. Execution errors never propagate
//! as `Err` — the runner folds them into `TaskResult::error` and the
//! scheduler only collects results.

use std::path::PathBuf;

use thiserror::Error;

use crate::id::TaskId;

/// Convenience alias used across the cockpit crates.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("no cockpit configuration found (searched upward from {})", .searched.display())]
    ConfigNotFound { searched: PathBuf },

    #[error("invalid configuration: {message}")]
    ConfigValidation { message: String },

    #[error("cyclic dependency detected: {}", format_cycle(.cycle))]
    CyclicDependency { cycle: Vec<TaskId> },

    #[error("task not found: {task_ref}{}", format_available(.available))]
    TaskNotFound {
        task_ref: String,
        available: Vec<String>,
    },

    #[error("workspace not found: {workspace_id}{}", format_available(.available))]
    WorkspaceNotFound {
        workspace_id: String,
        available: Vec<String>,
    },

    #[error("task {task_id} failed with exit code {exit_code}")]
    TaskExecution {
        task_id: TaskId,
        exit_code: i32,
        stderr_tail: String,
    },

    #[error("task {task_id} timed out after {timeout_ms} ms")]
    TaskTimeout { task_id: TaskId, timeout_ms: u64 },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

fn format_cycle(cycle: &[TaskId]) -> String {
    cycle
        .iter()
        .map(TaskId::as_str)
        .collect::<Vec<_>>()
        .join(" -> ")
}

fn format_available(available: &[String]) -> String {
    if available.is_empty() {
        String::new()
    } else {
        format!(" (available: {})", available.join(", "))
    }
}
