//! Per-task outcomes and run-level aggregates.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::id::TaskId;

/// Terminal status of a task instance, as surfaced to the scheduler.
///
/// Restores from cache report as `Cached`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Success,
    Failed,
    Skipped,
    Cached,
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TaskStatus::Success => "success",
            TaskStatus::Failed => "failed",
            TaskStatus::Skipped => "skipped",
            TaskStatus::Cached => "cached",
        };
        f.write_str(s)
    }
}

/// The outcome of one task instance.
#[derive(Debug)]
pub struct TaskResult {
    pub task_id: TaskId,
    pub status: TaskStatus,
    pub duration_ms: u64,
    pub error: Option<Error>,
}

impl TaskResult {
    pub fn success(task_id: TaskId, duration_ms: u64) -> Self {
        Self { task_id, status: TaskStatus::Success, duration_ms, error: None }
    }

    pub fn cached(task_id: TaskId, duration_ms: u64) -> Self {
        Self { task_id, status: TaskStatus::Cached, duration_ms, error: None }
    }

    /// Skipped tasks always report zero duration.
    pub fn skipped(task_id: TaskId) -> Self {
        Self { task_id, status: TaskStatus::Skipped, duration_ms: 0, error: None }
    }

    pub fn failed(task_id: TaskId, duration_ms: u64, error: Error) -> Self {
        Self { task_id, status: TaskStatus::Failed, duration_ms, error: Some(error) }
    }

    pub fn is_failed(&self) -> bool {
        self.status == TaskStatus::Failed
    }
}

/// Aggregate counts for a finished run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSummary {
    pub success: usize,
    pub failed: usize,
    pub cached: usize,
    pub skipped: usize,
    pub duration_ms: u64,
}

impl RunSummary {
    /// Tally results; `duration_ms` is the caller-observed wall time.
    pub fn tally(results: &[TaskResult], duration_ms: u64) -> Self {
        let mut summary = RunSummary { duration_ms, ..Default::default() };
        for result in results {
            match result.status {
                TaskStatus::Success => summary.success += 1,
                TaskStatus::Failed => summary.failed += 1,
                TaskStatus::Cached => summary.cached += 1,
                TaskStatus::Skipped => summary.skipped += 1,
            }
        }
        summary
    }

    /// Number of results tallied.
    pub fn total(&self) -> usize {
        self.success + self.failed + self.cached + self.skipped
    }
}

/// Everything the engine hands back for one run.
#[derive(Debug)]
pub struct RunReport {
    /// True iff no task failed.
    pub success: bool,
    pub results: Vec<TaskResult>,
    pub summary: RunSummary,
}

impl RunReport {
    pub fn new(results: Vec<TaskResult>, duration_ms: u64) -> Self {
        let summary = RunSummary::tally(&results, duration_ms);
        Self { success: summary.failed == 0, results, summary }
    }
}
