//! The engine façade: turns a CLI-shaped request into a graph choice, a
//! context and a scheduled run.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

use cockpit_types::{Result, RunReport, TaskGraph, TaskId};

use crate::cache::{CacheStats, CacheStore};
use crate::cleanup::{cleanup_task, CleanupOutcome};
use crate::graph::{build_multi_workspace_graph, build_task_graph};
use crate::logger::{Logger, TerminalLogger};
use crate::runner::ExecutionContext;
use crate::scheduler::{run_graph, SchedulerOptions};
use crate::workspace::Monorepo;

/// Options for one `run` invocation, mirroring the CLI surface.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Explicit workspace selection.
    pub workspaces: Vec<String>,
    /// Run the task in every workspace that defines it.
    pub all: bool,
    /// Run the task in every workspace carrying this tag.
    pub tag: Option<String>,
    /// Maximum concurrent tasks; 0 means "host parallelism".
    pub concurrency: usize,
    pub continue_on_error: bool,
    /// Bypass cache hits (results are still stored).
    pub force: bool,
    pub dry_run: bool,
    pub verbose: bool,
    /// Arguments after `--`, appended to main task commands only.
    pub extra_args: Vec<String>,
}

/// The engine owns the loaded monorepo, the logger and the cache store.
pub struct Engine {
    monorepo: Arc<Monorepo>,
    logger: Arc<dyn Logger>,
    cache: Option<Arc<CacheStore>>,
}

impl Engine {
    pub fn new(monorepo: Monorepo) -> Self {
        let cache = Arc::new(CacheStore::new(monorepo.cache_dir()));
        Self {
            monorepo: Arc::new(monorepo),
            logger: Arc::new(TerminalLogger::new()),
            cache: Some(cache),
        }
    }

    pub fn with_logger(mut self, logger: Arc<dyn Logger>) -> Self {
        self.logger = logger;
        self
    }

    /// Disable the cache store entirely (every task re-executes).
    pub fn without_cache(mut self) -> Self {
        self.cache = None;
        self
    }

    pub fn monorepo(&self) -> &Monorepo {
        &self.monorepo
    }

    /// Resolve the request to a graph, schedule it, and aggregate results.
    pub async fn run(&self, task_name: &str, options: RunOptions) -> Result<RunReport> {
        let graph = self.select_graph(task_name, &options)?;
        self.export_graph(&graph).await;

        let ctx = Arc::new(ExecutionContext {
            monorepo: self.monorepo.clone(),
            logger: self.logger.clone(),
            cache: self.cache.clone(),
            env: Default::default(),
            force: options.force,
            dry_run: options.dry_run,
            verbose: options.verbose,
            extra_args: options.extra_args.clone(),
            main_task_ids: graph.root_tasks.iter().cloned().collect::<HashSet<TaskId>>(),
        });

        let scheduler_options = SchedulerOptions {
            concurrency: effective_concurrency(options.concurrency),
            continue_on_error: options.continue_on_error,
        };

        let started = Instant::now();
        let results = run_graph(&graph, ctx, &scheduler_options).await;
        let report = RunReport::new(results, started.elapsed().as_millis() as u64);

        self.logger.summary(&report.summary);
        Ok(report)
    }

    /// Clean one task's artifacts; workspace selection mirrors `run`.
    pub async fn cleanup(
        &self,
        workspace_id: Option<&str>,
        task_name: &str,
        dry_run: bool,
    ) -> Result<CleanupOutcome> {
        let workspace_id = workspace_id
            .map(str::to_string)
            .or_else(|| self.monorepo.default_workspace.clone())
            .unwrap_or_default();
        let task_id = TaskId::new(&workspace_id, task_name);
        cleanup_task(&self.monorepo, self.cache.as_deref(), &task_id, dry_run).await
    }

    /// Every task id with its description, for `cockpit list`.
    pub fn list_tasks(&self, workspace_filter: Option<&str>) -> Vec<(TaskId, Option<String>)> {
        self.monorepo
            .task_configs
            .iter()
            .filter(|(workspace_id, _)| {
                workspace_filter.is_none_or(|filter| filter == workspace_id.as_str())
            })
            .flat_map(|(workspace_id, config)| {
                config.tasks.iter().map(|(name, definition)| {
                    (TaskId::new(workspace_id, name), definition.description.clone())
                })
            })
            .collect()
    }

    pub async fn cache_stats(&self) -> CacheStats {
        match &self.cache {
            Some(cache) => cache.stats().await,
            None => CacheStats::default(),
        }
    }

    pub async fn cache_clear(&self) {
        if let Some(cache) = &self.cache {
            cache.clear().await;
        }
    }

    fn select_graph(&self, task_name: &str, options: &RunOptions) -> Result<TaskGraph> {
        if options.all {
            let mut workspaces: Vec<String> =
                self.monorepo.workspaces.keys().cloned().collect();
            workspaces.push(String::new());
            return build_multi_workspace_graph(&self.monorepo, task_name, &workspaces);
        }

        if let Some(tag) = &options.tag {
            let workspaces = self.monorepo.workspaces_with_tag(tag);
            return build_multi_workspace_graph(&self.monorepo, task_name, &workspaces);
        }

        match options.workspaces.as_slice() {
            [] => {
                let workspace = self
                    .monorepo
                    .default_workspace
                    .clone()
                    .unwrap_or_default();
                build_task_graph(&self.monorepo, &workspace, task_name)
            }
            [workspace] => build_task_graph(&self.monorepo, workspace, task_name),
            many => build_multi_workspace_graph(&self.monorepo, task_name, many),
        }
    }

    /// Best-effort `graph.json` export for external watchers.
    async fn export_graph(&self, graph: &TaskGraph) {
        let Some(cache) = &self.cache else {
            return;
        };
        let path = cache.cache_dir().join("graph.json");
        let result = async {
            if let Some(parent) = path.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            let bytes = serde_json::to_vec_pretty(graph)
                .map_err(|err| std::io::Error::new(std::io::ErrorKind::InvalidData, err))?;
            tokio::fs::write(&path, bytes).await
        }
        .await;
        if let Err(err) = result {
            tracing::warn!(path = %path.display(), %err, "failed to export graph.json");
        }
    }
}

fn effective_concurrency(requested: usize) -> usize {
    if requested > 0 {
        return requested;
    }
    std::thread::available_parallelism().map(|n| n.get()).unwrap_or(4)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn effective_concurrency_defaults_to_host() {
        assert!(effective_concurrency(0) >= 1);
        assert_eq!(effective_concurrency(3), 3);
    }
}
