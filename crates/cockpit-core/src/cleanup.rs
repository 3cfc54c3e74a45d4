//! The cleanup engine.
//!
//! Expands a task's cleanup patterns (its declared outputs, or an explicit
//! list) under the task's workspace, deletes the matches, and invalidates
//! the task's whole cache entry when anything was actually removed.

use std::collections::HashSet;
use std::path::Path;

use cockpit_glob::{walk, EntryTypes, Pattern, WalkOptions};
use cockpit_types::{CleanupSpec, Error, Result, TaskId};

use crate::cache::CacheStore;
use crate::workspace::Monorepo;

/// Directory names never touched by cleanup.
const CLEANUP_EXCLUDES: [&str; 2] = ["node_modules", ".git"];

/// What a cleanup pass did (or, under dry-run, would do).
#[derive(Debug, Default)]
pub struct CleanupOutcome {
    /// Workspace-relative paths that were (or would be) deleted.
    pub deleted: Vec<String>,
    /// Per-path failures; the batch continues past them.
    pub errors: Vec<(String, String)>,
    pub dry_run: bool,
}

/// Clean one task's declared artifacts.
///
/// Tasks without a `cleanup` config (or with `cleanup: "outputs"` but no
/// outputs) are a silent no-op.
pub async fn cleanup_task(
    monorepo: &Monorepo,
    cache: Option<&CacheStore>,
    task_id: &TaskId,
    dry_run: bool,
) -> Result<CleanupOutcome> {
    let Some(definition) = monorepo.find_task(task_id) else {
        return Err(Error::TaskNotFound {
            task_ref: task_id.to_string(),
            available: monorepo
                .tasks_of(task_id.workspace_id())
                .map(|tasks| {
                    tasks
                        .keys()
                        .map(|name| TaskId::new(task_id.workspace_id(), name).to_string())
                        .collect()
                })
                .unwrap_or_default(),
        });
    };

    let patterns: Vec<String> = match &definition.cleanup {
        Some(CleanupSpec::Outputs) => definition.outputs.clone().unwrap_or_default(),
        Some(CleanupSpec::Patterns(patterns)) => patterns.clone(),
        None => Vec::new(),
    };

    let mut outcome = CleanupOutcome { dry_run, ..Default::default() };
    if patterns.is_empty() {
        return Ok(outcome);
    }

    let workspace_path = monorepo
        .workspace_path(task_id.workspace_id())
        .unwrap_or(monorepo.root.as_path())
        .to_path_buf();

    let targets = expand_patterns(&patterns, &workspace_path).await;

    for rel_path in targets {
        let abs = workspace_path.join(&rel_path);
        if dry_run {
            outcome.deleted.push(rel_path);
            continue;
        }
        match delete(&abs).await {
            Ok(()) => outcome.deleted.push(rel_path),
            Err(err) => outcome.errors.push((rel_path, err.to_string())),
        }
    }

    if !dry_run && !outcome.deleted.is_empty() {
        if let Some(cache) = cache {
            cache.invalidate(task_id, None).await;
        }
    }

    Ok(outcome)
}

/// Glob-expand each pattern; a pattern with no glob match falls back to a
/// direct path if one exists. Duplicates are dropped, order preserved.
async fn expand_patterns(patterns: &[String], workspace_path: &Path) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut targets = Vec::new();

    for raw in patterns {
        let Ok(pattern) = Pattern::new(raw) else {
            tracing::warn!(pattern = %raw, "ignoring unparsable cleanup pattern");
            continue;
        };

        let options = WalkOptions {
            patterns: vec![pattern],
            exclude_dirs: CLEANUP_EXCLUDES.iter().map(|s| s.to_string()).collect(),
            include_hidden: true,
            entry_types: EntryTypes::all(),
        };
        let matched = walk(workspace_path, &options).await.unwrap_or_default();

        if matched.is_empty() {
            // Direct-path fallback: `dist` with no glob hit may still name
            // an existing path.
            let direct = raw.trim_matches('/');
            if !direct.is_empty() && workspace_path.join(direct).exists() {
                if seen.insert(direct.to_string()) {
                    targets.push(direct.to_string());
                }
            }
            continue;
        }

        for entry in matched {
            if seen.insert(entry.rel_path.clone()) {
                targets.push(entry.rel_path);
            }
        }
    }

    // Deleting a parent directory first makes child deletions no-ops that
    // would report spurious errors; drop entries covered by a kept parent.
    let mut pruned: Vec<String> = Vec::new();
    for target in targets {
        let covered = pruned
            .iter()
            .any(|kept| target.strip_prefix(kept.as_str()).is_some_and(|r| r.starts_with('/')));
        if !covered {
            pruned.push(target);
        }
    }
    pruned
}

async fn delete(path: &Path) -> std::io::Result<()> {
    let metadata = tokio::fs::metadata(path).await?;
    if metadata.is_dir() {
        tokio::fs::remove_dir_all(path).await
    } else {
        tokio::fs::remove_file(path).await
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use cockpit_types::TaskDefinition;

    use super::*;
    use crate::workspace::WorkspaceTasks;

    async fn write(root: &Path, rel: &str, contents: &str) {
        let path = root.join(rel);
        tokio::fs::create_dir_all(path.parent().unwrap()).await.unwrap();
        tokio::fs::write(path, contents).await.unwrap();
    }

    fn monorepo_with(root: &Path, name: &str, def: TaskDefinition) -> Monorepo {
        let mut tasks = BTreeMap::new();
        tasks.insert(name.to_string(), def);
        let mut task_configs = BTreeMap::new();
        task_configs.insert(String::new(), WorkspaceTasks { tasks, env: BTreeMap::new() });
        Monorepo {
            root: root.to_path_buf(),
            workspaces: BTreeMap::new(),
            task_configs,
            default_workspace: None,
        }
    }

    #[tokio::test]
    async fn cleanup_outputs_deletes_declared_artifacts() {
        let tmp = tempfile::tempdir().unwrap();
        write(tmp.path(), "dist/bundle.js", "x").await;
        write(tmp.path(), "src/keep.rs", "k").await;

        let mut def = TaskDefinition::shell("build").with_outputs(["dist/**"]);
        def.cleanup = Some(CleanupSpec::Outputs);
        let repo = monorepo_with(tmp.path(), "build", def);

        let outcome = cleanup_task(&repo, None, &TaskId::parse(":build"), false)
            .await
            .unwrap();
        assert_eq!(outcome.deleted, vec!["dist/bundle.js"]);
        assert!(outcome.errors.is_empty());
        assert!(!tmp.path().join("dist/bundle.js").exists());
        assert!(tmp.path().join("src/keep.rs").exists());
    }

    #[tokio::test]
    async fn cleanup_explicit_patterns_and_direct_paths() {
        let tmp = tempfile::tempdir().unwrap();
        write(tmp.path(), "out/a.txt", "a").await;
        write(tmp.path(), ".turbo/cache.bin", "c").await;

        let mut def = TaskDefinition::shell("build");
        def.cleanup = Some(CleanupSpec::Patterns(vec!["out/**".into(), ".turbo".into()]));
        let repo = monorepo_with(tmp.path(), "build", def);

        let outcome = cleanup_task(&repo, None, &TaskId::parse(":build"), false)
            .await
            .unwrap();
        assert!(outcome.deleted.contains(&"out/a.txt".to_string()));
        assert!(outcome.deleted.contains(&".turbo".to_string()));
        assert!(!tmp.path().join(".turbo").exists());
    }

    #[tokio::test]
    async fn cleanup_without_config_is_silent() {
        let tmp = tempfile::tempdir().unwrap();
        let repo = monorepo_with(tmp.path(), "build", TaskDefinition::shell("build"));
        let outcome = cleanup_task(&repo, None, &TaskId::parse(":build"), false)
            .await
            .unwrap();
        assert!(outcome.deleted.is_empty());
        assert!(outcome.errors.is_empty());
    }

    #[tokio::test]
    async fn cleanup_outputs_without_declared_outputs_is_silent() {
        let tmp = tempfile::tempdir().unwrap();
        let mut def = TaskDefinition::shell("build");
        def.cleanup = Some(CleanupSpec::Outputs);
        let repo = monorepo_with(tmp.path(), "build", def);
        let outcome = cleanup_task(&repo, None, &TaskId::parse(":build"), false)
            .await
            .unwrap();
        assert!(outcome.deleted.is_empty());
    }

    #[tokio::test]
    async fn dry_run_reports_without_deleting() {
        let tmp = tempfile::tempdir().unwrap();
        write(tmp.path(), "dist/bundle.js", "x").await;
        let mut def = TaskDefinition::shell("build").with_outputs(["dist/**"]);
        def.cleanup = Some(CleanupSpec::Outputs);
        let repo = monorepo_with(tmp.path(), "build", def);

        let outcome = cleanup_task(&repo, None, &TaskId::parse(":build"), true)
            .await
            .unwrap();
        assert_eq!(outcome.deleted, vec!["dist/bundle.js"]);
        assert!(outcome.dry_run);
        assert!(tmp.path().join("dist/bundle.js").exists());
    }

    #[tokio::test]
    async fn cleanup_invalidates_cache_after_deletion() {
        let tmp = tempfile::tempdir().unwrap();
        write(tmp.path(), "dist/bundle.js", "x").await;
        let mut def = TaskDefinition::shell("build").with_outputs(["dist/**"]);
        def.cleanup = Some(CleanupSpec::Outputs);
        let repo = monorepo_with(tmp.path(), "build", def);

        let cache = CacheStore::new(tmp.path().join(".cockpit/.cache"));
        let task = TaskId::parse(":build");
        cache
            .store(crate::cache::StoreRequest {
                task_id: &task,
                input_hash: "aaaa000011112222",
                outputs: &["dist/**".to_string()],
                workspace_path: tmp.path(),
                output_chunks: &[],
            })
            .await;
        assert!(cache.has(&task, "aaaa000011112222").await);

        cleanup_task(&repo, Some(&cache), &task, false).await.unwrap();
        assert!(!cache.has(&task, "aaaa000011112222").await);
    }

    #[tokio::test]
    async fn unknown_task_is_an_error() {
        let tmp = tempfile::tempdir().unwrap();
        let repo = monorepo_with(tmp.path(), "build", TaskDefinition::shell("build"));
        let err = cleanup_task(&repo, None, &TaskId::parse(":ghost"), false)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::TaskNotFound { .. }));
    }
}
