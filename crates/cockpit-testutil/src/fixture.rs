//! On-disk monorepo fixtures.

use std::collections::BTreeMap;
use std::path::Path;

use tempfile::TempDir;

use cockpit_core::{load_monorepo, Monorepo};
use cockpit_types::TaskDefinition;

/// Declarative builder for a throwaway monorepo.
///
/// ```ignore
/// let fixture = MonorepoBuilder::new()
///     .workspace("core", "packages/core")
///     .task("core", "build", TaskDefinition::shell("echo built"))
///     .file("packages/core/src/lib.rs", "pub fn x() {}")
///     .build()
///     .await;
/// ```
#[derive(Default)]
pub struct MonorepoBuilder {
    workspaces: Vec<WorkspaceSpec>,
    tasks: BTreeMap<String, BTreeMap<String, TaskDefinition>>,
    default_workspace: Option<String>,
    files: Vec<(String, String)>,
}

struct WorkspaceSpec {
    id: String,
    rel_path: String,
    tags: Vec<String>,
}

impl MonorepoBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a workspace at `rel_path` under the root.
    pub fn workspace(mut self, id: &str, rel_path: &str) -> Self {
        self.workspaces.push(WorkspaceSpec {
            id: id.to_string(),
            rel_path: rel_path.to_string(),
            tags: Vec::new(),
        });
        self
    }

    /// Add a workspace carrying tags.
    pub fn workspace_with_tags(mut self, id: &str, rel_path: &str, tags: &[&str]) -> Self {
        self.workspaces.push(WorkspaceSpec {
            id: id.to_string(),
            rel_path: rel_path.to_string(),
            tags: tags.iter().map(|t| t.to_string()).collect(),
        });
        self
    }

    /// Add a task to a workspace; the empty id targets the root.
    pub fn task(mut self, workspace_id: &str, name: &str, definition: TaskDefinition) -> Self {
        self.tasks
            .entry(workspace_id.to_string())
            .or_default()
            .insert(name.to_string(), definition);
        self
    }

    pub fn default_workspace(mut self, id: &str) -> Self {
        self.default_workspace = Some(id.to_string());
        self
    }

    /// Write an arbitrary file (path relative to the monorepo root).
    pub fn file(mut self, rel_path: &str, contents: &str) -> Self {
        self.files.push((rel_path.to_string(), contents.to_string()));
        self
    }

    /// Materialize everything on disk and load the model.
    pub async fn build(self) -> TempMonorepo {
        let dir = tempfile::tempdir().expect("create temp monorepo");
        let root = dir.path();

        let mut workspaces_json = serde_json::Map::new();
        for spec in &self.workspaces {
            tokio::fs::create_dir_all(root.join(&spec.rel_path))
                .await
                .expect("create workspace dir");
            workspaces_json.insert(
                spec.id.clone(),
                serde_json::json!({ "path": spec.rel_path, "tags": spec.tags }),
            );
        }

        let mut config = serde_json::Map::new();
        config.insert("workspaces".into(), workspaces_json.into());
        if let Some(default) = &self.default_workspace {
            config.insert("defaultWorkspace".into(), default.clone().into());
        }
        if let Some(root_tasks) = self.tasks.get("") {
            config.insert(
                "tasks".into(),
                serde_json::to_value(root_tasks).expect("serialize root tasks"),
            );
        }

        write(root, ".cockpit/config.json", &pretty(&config.into())).await;

        for (workspace_id, tasks) in &self.tasks {
            if workspace_id.is_empty() {
                continue;
            }
            let spec = self
                .workspaces
                .iter()
                .find(|w| &w.id == workspace_id)
                .unwrap_or_else(|| panic!("task added to undeclared workspace {workspace_id}"));
            let body = serde_json::json!({ "tasks": tasks });
            write(
                root,
                &format!("{}/cockpit.json", spec.rel_path),
                &pretty(&body),
            )
            .await;
        }

        for (rel_path, contents) in &self.files {
            write(root, rel_path, contents).await;
        }

        let monorepo = load_monorepo(root).await.expect("load fixture monorepo");
        TempMonorepo { dir, monorepo }
    }
}

/// A built fixture; dropping it removes the directory.
pub struct TempMonorepo {
    dir: TempDir,
    pub monorepo: Monorepo,
}

impl TempMonorepo {
    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    /// Reload the model from disk (e.g. after editing config files).
    pub async fn reload(&mut self) {
        self.monorepo = load_monorepo(self.dir.path()).await.expect("reload monorepo");
    }

    /// Write a file under the root after construction.
    pub async fn write_file(&self, rel_path: &str, contents: &str) {
        write(self.dir.path(), rel_path, contents).await;
    }

    /// Read a file under the root.
    pub async fn read_file(&self, rel_path: &str) -> String {
        tokio::fs::read_to_string(self.dir.path().join(rel_path))
            .await
            .unwrap_or_else(|err| panic!("read {rel_path}: {err}"))
    }

    pub fn exists(&self, rel_path: &str) -> bool {
        self.dir.path().join(rel_path).exists()
    }
}

async fn write(root: &Path, rel_path: &str, contents: &str) {
    let path = root.join(rel_path);
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await.expect("create parent dirs");
    }
    tokio::fs::write(path, contents).await.expect("write fixture file");
}

fn pretty(value: &serde_json::Value) -> String {
    serde_json::to_string_pretty(value).expect("serialize fixture json")
}
