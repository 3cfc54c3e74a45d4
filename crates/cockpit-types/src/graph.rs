//! The resolved task graph.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::id::TaskId;
use crate::task::TaskDefinition;

/// A task instance after reference resolution. Immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedTask {
    pub id: TaskId,
    pub workspace_id: String,
    pub name: String,
    pub definition: TaskDefinition,
    /// Canonical ids only; optional-but-missing references were dropped
    /// during resolution.
    pub dependencies: Vec<TaskId>,
}

/// The closed set of tasks reachable from the requested roots, with
/// ordering metadata.
///
/// Invariants:
/// - `execution_order` and `tasks` contain exactly the same ids.
/// - Every dependency of every task is itself in `tasks`.
/// - Each task's dependencies precede it in `execution_order`.
/// - `parallel_levels` partitions `tasks`; tasks in level `k` depend only
///   on tasks in earlier levels.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskGraph {
    pub tasks: HashMap<TaskId, ResolvedTask>,
    pub execution_order: Vec<TaskId>,
    pub parallel_levels: Vec<Vec<TaskId>>,
    pub root_tasks: Vec<TaskId>,
}

impl TaskGraph {
    /// Number of task instances in the graph.
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Look up a resolved task by id.
    pub fn get(&self, id: &TaskId) -> Option<&ResolvedTask> {
        self.tasks.get(id)
    }
}
