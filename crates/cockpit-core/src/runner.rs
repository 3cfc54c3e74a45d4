//! The per-task execution state machine.
//!
//! Order per task: platform gate, working-directory and environment
//! composition, cache probe (replay or restore on a hit), dry-run
//! short-circuit, supervised execution with chunk capture, result
//! interpretation, cache commit.
//!
//! The runner never returns `Err`; every outcome is a `TaskResult` and
//! errors ride inside it.

use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use cockpit_types::{
    Error, OutputChunk, ResolvedTask, StreamKind, TaskId, TaskResult,
};

use crate::cache::{CacheStore, StoreRequest};
use crate::fingerprint::input_hash;
use crate::logger::{Logger, TaskEvent};
use crate::process::{supervise, OutputSink, SpawnOptions};
use crate::workspace::Monorepo;

/// Default per-task timeout: five minutes.
pub const DEFAULT_TIMEOUT_MS: u64 = 300_000;

/// How much trailing stderr a failure carries in its error.
const STDERR_TAIL_LINES: usize = 20;

/// Everything a run shares across tasks.
pub struct ExecutionContext {
    pub monorepo: Arc<Monorepo>,
    pub logger: Arc<dyn Logger>,
    pub cache: Option<Arc<CacheStore>>,
    /// Base environment composed under workspace and task env.
    pub env: BTreeMap<String, String>,
    pub force: bool,
    pub dry_run: bool,
    pub verbose: bool,
    /// Extra CLI arguments, applied to main tasks only.
    pub extra_args: Vec<String>,
    /// The requested roots; only these receive `extra_args`.
    pub main_task_ids: HashSet<TaskId>,
}

impl ExecutionContext {
    /// A context with everything defaulted off, for tests and embedding.
    pub fn new(monorepo: Arc<Monorepo>, logger: Arc<dyn Logger>) -> Self {
        Self {
            monorepo,
            logger,
            cache: None,
            env: BTreeMap::new(),
            force: false,
            dry_run: false,
            verbose: false,
            extra_args: Vec::new(),
            main_task_ids: HashSet::new(),
        }
    }
}

/// Captures chunks in arrival order and forwards them to the logger.
struct CaptureSink {
    stream: StreamKind,
    task_id: TaskId,
    chunks: Arc<Mutex<Vec<OutputChunk>>>,
    logger: Arc<dyn Logger>,
}

impl OutputSink for CaptureSink {
    fn write(&self, data: &str) {
        if let Ok(mut chunks) = self.chunks.lock() {
            chunks.push(OutputChunk { stream: self.stream, data: data.to_string() });
        }
        match self.stream {
            StreamKind::Stdout => self.logger.task_stdout(&self.task_id, data),
            StreamKind::Stderr => self.logger.task_stderr(&self.task_id, data),
        }
    }
}

/// Execute one resolved task to completion.
pub async fn run_task(ctx: &ExecutionContext, task: &ResolvedTask) -> TaskResult {
    let started = Instant::now();
    let definition = &task.definition;

    if !definition.platform.matches_host() {
        ctx.logger
            .task(&task.id, TaskEvent::Skipped, Some("platform mismatch"));
        return TaskResult::skipped(task.id.clone());
    }

    let workspace_path = ctx
        .monorepo
        .workspace_path(&task.workspace_id)
        .unwrap_or(ctx.monorepo.root.as_path())
        .to_path_buf();
    let cwd = match &definition.cwd {
        Some(rel) => workspace_path.join(rel),
        None => workspace_path.clone(),
    };

    // Environment: context base, workspace-shared, then task overlay.
    let mut env = ctx.env.clone();
    if let Some(workspace_env) = ctx.monorepo.workspace_env(&task.workspace_id) {
        env.extend(workspace_env.clone());
    }
    env.extend(definition.env.clone());

    let is_main = ctx.main_task_ids.contains(&task.id);
    let extra_args: &[String] = if is_main { &ctx.extra_args } else { &[] };

    // Cache probe.
    let cache = ctx.cache.as_ref().filter(|_| definition.cache);
    let hash = match cache {
        Some(_) => match input_hash(definition, &workspace_path, extra_args).await {
            Ok(hash) => Some(hash),
            Err(err) => {
                tracing::warn!(task = %task.id, %err, "input hashing failed, caching disabled");
                None
            }
        },
        None => None,
    };

    if let (Some(cache), Some(hash)) = (cache, hash.as_deref()) {
        if !ctx.force && cache.has(&task.id, hash).await {
            if cache.has_outputs_on_disk(&task.id, hash, &workspace_path).await {
                ctx.logger.task(&task.id, TaskEvent::Cached, None);
                replay(ctx, cache, &task.id, hash).await;
                return TaskResult::cached(task.id.clone(), elapsed_ms(started));
            }
            match cache.restore_outputs(&task.id, hash, &workspace_path).await {
                Some(restored) if restored > 0 => {
                    ctx.logger.task(
                        &task.id,
                        TaskEvent::Restored,
                        Some(&format!("{restored} files")),
                    );
                    replay(ctx, cache, &task.id, hash).await;
                    return TaskResult::cached(task.id.clone(), elapsed_ms(started));
                }
                _ => {
                    if ctx.verbose {
                        tracing::debug!(
                            task = %task.id,
                            "cache hit but outputs missing, rebuilding"
                        );
                    }
                }
            }
        }
    }

    if ctx.dry_run {
        ctx.logger.task(&task.id, TaskEvent::Skipped, Some("dry run"));
        return TaskResult::skipped(task.id.clone());
    }

    // Execute.
    ctx.logger.task(&task.id, TaskEvent::Starting, None);
    let chunks: Arc<Mutex<Vec<OutputChunk>>> = Arc::new(Mutex::new(Vec::new()));
    let stdout_sink = Arc::new(CaptureSink {
        stream: StreamKind::Stdout,
        task_id: task.id.clone(),
        chunks: chunks.clone(),
        logger: ctx.logger.clone(),
    });
    let stderr_sink = Arc::new(CaptureSink {
        stream: StreamKind::Stderr,
        task_id: task.id.clone(),
        chunks: chunks.clone(),
        logger: ctx.logger.clone(),
    });

    let result = supervise(
        &definition.command,
        SpawnOptions {
            cwd,
            env,
            timeout_ms: Some(definition.timeout.unwrap_or(DEFAULT_TIMEOUT_MS)),
            extra_args: extra_args.to_vec(),
            stdout_sink,
            stderr_sink,
        },
    )
    .await;

    let duration_ms = elapsed_ms(started);

    if result.killed {
        let timeout_ms = definition.timeout.unwrap_or(DEFAULT_TIMEOUT_MS);
        ctx.logger.task(
            &task.id,
            TaskEvent::Failed,
            Some(&format!("timeout after {timeout_ms} ms")),
        );
        return TaskResult::failed(
            task.id.clone(),
            duration_ms,
            Error::TaskTimeout { task_id: task.id.clone(), timeout_ms },
        );
    }

    if result.exit_code != 0 {
        if definition.allow_failure {
            ctx.logger.task(
                &task.id,
                TaskEvent::Success,
                Some(&format!("exit {}, allowed", result.exit_code)),
            );
            return TaskResult::success(task.id.clone(), duration_ms);
        }
        ctx.logger.task(
            &task.id,
            TaskEvent::Failed,
            Some(&format!("exit {}", result.exit_code)),
        );
        return TaskResult::failed(
            task.id.clone(),
            duration_ms,
            Error::TaskExecution {
                task_id: task.id.clone(),
                exit_code: result.exit_code,
                stderr_tail: tail(&result.stderr, STDERR_TAIL_LINES),
            },
        );
    }

    ctx.logger.task(
        &task.id,
        TaskEvent::Success,
        Some(&format!("in {duration_ms} ms")),
    );

    // Commit to cache.
    if let (Some(cache), Some(hash)) = (cache, hash.as_deref()) {
        let captured = chunks.lock().map(|c| c.clone()).unwrap_or_default();
        cache
            .store(StoreRequest {
                task_id: &task.id,
                input_hash: hash,
                outputs: definition.outputs.as_deref().unwrap_or(&[]),
                workspace_path: &workspace_path,
                output_chunks: &captured,
            })
            .await;
    }

    TaskResult::success(task.id.clone(), duration_ms)
}

/// Re-emit a cached chunk sequence through the logger.
async fn replay(ctx: &ExecutionContext, cache: &CacheStore, task_id: &TaskId, hash: &str) {
    let Some(chunks) = cache.output_chunks(task_id, hash).await else {
        return;
    };
    for chunk in chunks {
        match chunk.stream {
            StreamKind::Stdout => ctx.logger.task_stdout(task_id, &chunk.data),
            StreamKind::Stderr => ctx.logger.task_stderr(task_id, &chunk.data),
        }
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    started.elapsed().as_millis() as u64
}

/// The last `lines` lines of a stream.
fn tail(text: &str, lines: usize) -> String {
    let all: Vec<&str> = text.lines().collect();
    let start = all.len().saturating_sub(lines);
    all[start..].join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tail_keeps_last_lines() {
        let text = (1..=30).map(|i| format!("line {i}")).collect::<Vec<_>>().join("\n");
        let tail = tail(&text, 20);
        assert!(tail.starts_with("line 11"));
        assert!(tail.ends_with("line 30"));
        assert_eq!(tail.lines().count(), 20);
    }

    #[test]
    fn tail_of_short_text_is_whole_text() {
        assert_eq!(tail("one\ntwo", 20), "one\ntwo");
    }
}
