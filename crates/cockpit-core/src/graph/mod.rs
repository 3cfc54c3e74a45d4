//! Task graph construction.
//!
//! A breadth-first closure walks dependency references outward from the
//! requested roots, resolving each reference against the workspace it was
//! written in. The closed map is then ordered (Kahn) and partitioned into
//! parallel levels.

mod toposort;

pub use toposort::{parallel_levels, topological_order};

use std::collections::{HashMap, VecDeque};

use cockpit_types::{parse_ref, Error, ResolvedTask, Result, TaskGraph, TaskId};

use crate::workspace::Monorepo;

/// Build the graph for one task in one workspace.
pub fn build_task_graph(
    monorepo: &Monorepo,
    workspace_id: &str,
    task_name: &str,
) -> Result<TaskGraph> {
    if !monorepo.has_workspace(workspace_id) {
        return Err(workspace_not_found(monorepo, workspace_id));
    }
    let root = TaskId::new(workspace_id, task_name);
    let tasks = resolve_closure(monorepo, vec![root.clone()])?;
    finish(tasks, vec![root])
}

/// Build the graph for the same task name across several workspaces.
///
/// Workspaces that do not define the task contribute no root; it is an
/// error when none of them does.
pub fn build_multi_workspace_graph(
    monorepo: &Monorepo,
    task_name: &str,
    workspace_ids: &[String],
) -> Result<TaskGraph> {
    for workspace_id in workspace_ids {
        if !monorepo.has_workspace(workspace_id) {
            return Err(workspace_not_found(monorepo, workspace_id));
        }
    }

    let roots: Vec<TaskId> = workspace_ids
        .iter()
        .filter(|ws| {
            monorepo
                .tasks_of(ws)
                .is_some_and(|tasks| tasks.contains_key(task_name))
        })
        .map(|ws| TaskId::new(ws, task_name))
        .collect();

    if roots.is_empty() {
        return Err(Error::TaskNotFound {
            task_ref: task_name.to_string(),
            available: Vec::new(),
        });
    }

    let tasks = resolve_closure(monorepo, roots.clone())?;
    finish(tasks, roots)
}

/// Build the graph of every task across every workspace.
///
/// Dependency references that resolve to no defined task are dropped
/// rather than rejected, so tasks with unresolved externals simply land
/// at level zero.
pub fn build_full_graph(monorepo: &Monorepo) -> Result<TaskGraph> {
    let roots = monorepo.all_task_ids();

    let mut tasks = HashMap::with_capacity(roots.len());
    for id in &roots {
        let Some(definition) = monorepo.find_task(id) else {
            continue;
        };
        let dependencies: Vec<TaskId> = definition
            .depends_on
            .iter()
            .map(|reference| parse_ref(reference.task(), id.workspace_id()))
            .collect();
        tasks.insert(
            id.clone(),
            ResolvedTask {
                id: id.clone(),
                workspace_id: id.workspace_id().to_string(),
                name: id.task_name().to_string(),
                definition: definition.clone(),
                dependencies,
            },
        );
    }

    // Keep only edges that point at defined tasks.
    let present: std::collections::HashSet<TaskId> = tasks.keys().cloned().collect();
    for task in tasks.values_mut() {
        task.dependencies.retain(|dep| present.contains(dep));
    }

    finish(tasks, roots)
}

/// BFS closure from the roots, strict about non-optional references.
fn resolve_closure(
    monorepo: &Monorepo,
    roots: Vec<TaskId>,
) -> Result<HashMap<TaskId, ResolvedTask>> {
    let mut tasks: HashMap<TaskId, ResolvedTask> = HashMap::new();
    let mut queue: VecDeque<TaskId> = roots.into();

    while let Some(id) = queue.pop_front() {
        if tasks.contains_key(&id) {
            continue;
        }

        let Some(definition) = monorepo.find_task(&id) else {
            return Err(task_not_found(monorepo, &id));
        };

        let mut dependencies = Vec::with_capacity(definition.depends_on.len());
        for reference in &definition.depends_on {
            let dep_id = parse_ref(reference.task(), id.workspace_id());
            if monorepo.find_task(&dep_id).is_none() {
                if reference.optional() {
                    continue;
                }
                return Err(task_not_found(monorepo, &dep_id));
            }
            if !tasks.contains_key(&dep_id) {
                queue.push_back(dep_id.clone());
            }
            dependencies.push(dep_id);
        }

        tasks.insert(
            id.clone(),
            ResolvedTask {
                workspace_id: id.workspace_id().to_string(),
                name: id.task_name().to_string(),
                definition: definition.clone(),
                dependencies,
                id,
            },
        );
    }

    Ok(tasks)
}

fn finish(tasks: HashMap<TaskId, ResolvedTask>, roots: Vec<TaskId>) -> Result<TaskGraph> {
    let deps: HashMap<TaskId, Vec<TaskId>> = tasks
        .iter()
        .map(|(id, task)| (id.clone(), task.dependencies.clone()))
        .collect();

    let execution_order = topological_order(&deps)?;
    let levels = parallel_levels(&deps)?;

    Ok(TaskGraph {
        tasks,
        execution_order,
        parallel_levels: levels,
        root_tasks: roots,
    })
}

fn task_not_found(monorepo: &Monorepo, id: &TaskId) -> Error {
    let available = monorepo
        .tasks_of(id.workspace_id())
        .map(|tasks| {
            tasks
                .keys()
                .map(|name| TaskId::new(id.workspace_id(), name).to_string())
                .collect()
        })
        .unwrap_or_default();
    Error::TaskNotFound { task_ref: id.to_string(), available }
}

fn workspace_not_found(monorepo: &Monorepo, workspace_id: &str) -> Error {
    Error::WorkspaceNotFound {
        workspace_id: workspace_id.to_string(),
        available: monorepo.workspaces.keys().cloned().collect(),
    }
}
