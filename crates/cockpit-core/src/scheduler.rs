//! The execution scheduler.
//!
//! Walks the graph's parallel levels in order, dispatching runnable tasks
//! concurrently under a counting semaphore. Failures cascade: with
//! `continue_on_error` off, a failure short-circuits every later level to
//! `skipped`, and within a level a task whose dependency failed is skipped
//! outright. Every task in the graph yields exactly one result.

use std::collections::HashSet;
use std::sync::Arc;

use tokio::sync::Semaphore;

use cockpit_types::{Error, TaskGraph, TaskId, TaskResult, TaskStatus};

use crate::logger::TaskEvent;
use crate::runner::{run_task, ExecutionContext};

/// Scheduler policy knobs.
#[derive(Debug, Clone)]
pub struct SchedulerOptions {
    /// Maximum concurrently running tasks. Clamped to at least 1.
    pub concurrency: usize,
    /// Attempt tasks even when a dependency failed, and keep walking
    /// later levels after failures.
    pub continue_on_error: bool,
}

impl Default for SchedulerOptions {
    fn default() -> Self {
        Self { concurrency: 4, continue_on_error: false }
    }
}

/// Run every task in the graph, returning one result per task in a
/// topological order (per-level appended; order within a level is
/// unspecified).
pub async fn run_graph(
    graph: &TaskGraph,
    ctx: Arc<ExecutionContext>,
    options: &SchedulerOptions,
) -> Vec<TaskResult> {
    let semaphore = Arc::new(Semaphore::new(options.concurrency.max(1)));
    let mut results = Vec::with_capacity(graph.len());
    let mut failed: HashSet<TaskId> = HashSet::new();

    for level in &graph.parallel_levels {
        // A failure with continue_on_error off drains the rest as skipped,
        // preserving the one-result-per-task invariant.
        if !options.continue_on_error && !failed.is_empty() {
            for id in level {
                ctx.logger.task(id, TaskEvent::Skipped, Some("earlier task failed"));
                results.push(TaskResult::skipped(id.clone()));
            }
            continue;
        }

        let mut level_results = Vec::with_capacity(level.len());
        let mut handles = Vec::new();

        for id in level {
            let Some(task) = graph.tasks.get(id) else {
                continue;
            };

            let dependency_failed =
                task.dependencies.iter().any(|dep| failed.contains(dep));
            if dependency_failed && !options.continue_on_error {
                ctx.logger.task(id, TaskEvent::Skipped, Some("dependency failed"));
                level_results.push(TaskResult::skipped(id.clone()));
                continue;
            }

            let Ok(permit) = semaphore.clone().acquire_owned().await else {
                // The semaphore is never closed; bail defensively anyway.
                break;
            };
            let ctx = ctx.clone();
            let task = task.clone();
            let handle = tokio::spawn(async move {
                let _permit = permit;
                run_task(&ctx, &task).await
            });
            handles.push((id.clone(), handle));
        }

        for (id, handle) in handles {
            match handle.await {
                Ok(result) => level_results.push(result),
                Err(err) => {
                    ctx.logger.task(&id, TaskEvent::Failed, Some("worker panicked"));
                    level_results.push(TaskResult::failed(
                        id.clone(),
                        0,
                        Error::TaskExecution {
                            task_id: id,
                            exit_code: -1,
                            stderr_tail: format!("task worker panicked: {err}"),
                        },
                    ));
                }
            }
        }

        for result in level_results {
            if result.status == TaskStatus::Failed {
                failed.insert(result.task_id.clone());
            }
            results.push(result);
        }
    }

    results
}

/// Deterministic single-task-at-a-time variant; same skip policy, walks
/// `execution_order` instead of levels. Not on the default path.
pub async fn run_graph_sequential(
    graph: &TaskGraph,
    ctx: Arc<ExecutionContext>,
    options: &SchedulerOptions,
) -> Vec<TaskResult> {
    let mut results = Vec::with_capacity(graph.len());
    let mut failed: HashSet<TaskId> = HashSet::new();

    for id in &graph.execution_order {
        let Some(task) = graph.tasks.get(id) else {
            continue;
        };

        let short_circuit = !options.continue_on_error && !failed.is_empty();
        let dependency_failed = task.dependencies.iter().any(|dep| failed.contains(dep));
        if short_circuit || (dependency_failed && !options.continue_on_error) {
            ctx.logger.task(id, TaskEvent::Skipped, Some("earlier task failed"));
            results.push(TaskResult::skipped(id.clone()));
            continue;
        }

        let result = run_task(&ctx, task).await;
        if result.status == TaskStatus::Failed {
            failed.insert(result.task_id.clone());
        }
        results.push(result);
    }

    results
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::time::Instant;

    use cockpit_types::TaskDefinition;

    use super::*;
    use crate::graph::build_task_graph;
    use crate::logger::NullLogger;
    use crate::workspace::{Monorepo, WorkspaceTasks};

    /// Root-only monorepo over a tempdir; tasks run with the tempdir as cwd.
    fn monorepo_with(root: &std::path::Path, tasks: &[(&str, TaskDefinition)]) -> Arc<Monorepo> {
        let mut table = BTreeMap::new();
        for (name, def) in tasks {
            table.insert(name.to_string(), def.clone());
        }
        let mut task_configs = BTreeMap::new();
        task_configs.insert(String::new(), WorkspaceTasks { tasks: table, env: BTreeMap::new() });
        Arc::new(Monorepo {
            root: root.to_path_buf(),
            workspaces: BTreeMap::new(),
            task_configs,
            default_workspace: None,
        })
    }

    fn ctx(monorepo: Arc<Monorepo>) -> Arc<ExecutionContext> {
        Arc::new(ExecutionContext::new(monorepo, Arc::new(NullLogger)))
    }

    fn status_of(results: &[TaskResult], id: &str) -> TaskStatus {
        results
            .iter()
            .find(|r| r.task_id == cockpit_types::TaskId::parse(id))
            .unwrap_or_else(|| panic!("no result for {id}"))
            .status
    }

    #[tokio::test]
    async fn independent_tasks_run_concurrently() {
        let tmp = tempfile::tempdir().unwrap();
        let repo = monorepo_with(
            tmp.path(),
            &[
                ("a", TaskDefinition::shell("sleep 0.3")),
                ("b", TaskDefinition::shell("sleep 0.3")),
                ("all", TaskDefinition::shell("true").with_depends_on([":a", ":b"])),
            ],
        );

        let graph = build_task_graph(&repo, "", "all").unwrap();
        let started = Instant::now();
        let results = run_graph(
            &graph,
            ctx(repo),
            &SchedulerOptions { concurrency: 2, continue_on_error: false },
        )
        .await;

        assert_eq!(results.len(), 3);
        assert!(results.iter().all(|r| r.status == TaskStatus::Success));
        // Both sleeps overlapped: well under the 0.6 s serial time.
        assert!(started.elapsed().as_millis() < 550, "levels did not parallelize");
    }

    #[tokio::test]
    async fn failure_skips_dependents() {
        let tmp = tempfile::tempdir().unwrap();
        let repo = monorepo_with(
            tmp.path(),
            &[
                ("bad", TaskDefinition::shell("exit 1")),
                ("dependent", TaskDefinition::shell("true").with_depends_on([":bad"])),
            ],
        );
        let graph = build_task_graph(&repo, "", "dependent").unwrap();
        let results = run_graph(&graph, ctx(repo), &SchedulerOptions::default()).await;

        assert_eq!(results.len(), 2);
        assert_eq!(status_of(&results, ":bad"), TaskStatus::Failed);
        assert_eq!(status_of(&results, ":dependent"), TaskStatus::Skipped);
        let skipped = results.iter().find(|r| r.status == TaskStatus::Skipped).unwrap();
        assert_eq!(skipped.duration_ms, 0);
    }

    #[tokio::test]
    async fn continue_on_error_still_attempts_dependents() {
        let tmp = tempfile::tempdir().unwrap();
        let repo = monorepo_with(
            tmp.path(),
            &[
                ("bad", TaskDefinition::shell("exit 1")),
                ("dependent", TaskDefinition::shell("true").with_depends_on([":bad"])),
            ],
        );
        let graph = build_task_graph(&repo, "", "dependent").unwrap();
        let results = run_graph(
            &graph,
            ctx(repo),
            &SchedulerOptions { concurrency: 2, continue_on_error: true },
        )
        .await;

        assert_eq!(status_of(&results, ":bad"), TaskStatus::Failed);
        assert_eq!(status_of(&results, ":dependent"), TaskStatus::Success);
    }

    #[tokio::test]
    async fn transitive_dependents_are_skipped() {
        let tmp = tempfile::tempdir().unwrap();
        let repo = monorepo_with(
            tmp.path(),
            &[
                ("bad", TaskDefinition::shell("exit 1")),
                ("mid", TaskDefinition::shell("true").with_depends_on([":bad"])),
                ("top", TaskDefinition::shell("true").with_depends_on([":mid"])),
            ],
        );
        let graph = build_task_graph(&repo, "", "top").unwrap();
        let results = run_graph(&graph, ctx(repo), &SchedulerOptions::default()).await;

        assert_eq!(results.len(), 3);
        assert_eq!(status_of(&results, ":bad"), TaskStatus::Failed);
        assert_eq!(status_of(&results, ":mid"), TaskStatus::Skipped);
        assert_eq!(status_of(&results, ":top"), TaskStatus::Skipped);
    }

    #[tokio::test]
    async fn sequential_variant_matches_policy() {
        let tmp = tempfile::tempdir().unwrap();
        let repo = monorepo_with(
            tmp.path(),
            &[
                ("bad", TaskDefinition::shell("exit 1")),
                ("after", TaskDefinition::shell("true").with_depends_on([":bad"])),
            ],
        );
        let graph = build_task_graph(&repo, "", "after").unwrap();
        let results =
            run_graph_sequential(&graph, ctx(repo), &SchedulerOptions::default()).await;

        assert_eq!(results.len(), 2);
        assert_eq!(status_of(&results, ":bad"), TaskStatus::Failed);
        assert_eq!(status_of(&results, ":after"), TaskStatus::Skipped);
    }

    #[tokio::test]
    async fn one_result_per_task() {
        let tmp = tempfile::tempdir().unwrap();
        let repo = monorepo_with(
            tmp.path(),
            &[
                ("a", TaskDefinition::shell("true")),
                ("b", TaskDefinition::shell("exit 1").with_depends_on([":a"])),
                ("c", TaskDefinition::shell("true").with_depends_on([":b"])),
                ("d", TaskDefinition::shell("true").with_depends_on([":c", ":a"])),
            ],
        );
        let graph = build_task_graph(&repo, "", "d").unwrap();
        let results = run_graph(&graph, ctx(repo), &SchedulerOptions::default()).await;

        assert_eq!(results.len(), graph.len());
        let mut ids: Vec<_> = results.iter().map(|r| r.task_id.as_str()).collect();
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), graph.len());
    }
}
