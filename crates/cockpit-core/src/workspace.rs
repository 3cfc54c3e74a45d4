//! The workspace model the engine consumes.
//!
//! Produced by the config loader, read-only thereafter. The monorepo root is
//! itself a workspace with id `""`; it never appears in `workspaces` but may
//! carry tasks in `task_configs`.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use cockpit_types::{TaskDefinition, TaskId};

/// One workspace directory inside the monorepo.
#[derive(Debug, Clone)]
pub struct Workspace {
    pub id: String,
    pub name: String,
    pub abs_path: PathBuf,
    pub rel_path: String,
    pub tags: Vec<String>,
    pub depends_on: Vec<String>,
}

/// The task table and shared environment of one workspace.
#[derive(Debug, Clone, Default)]
pub struct WorkspaceTasks {
    pub tasks: BTreeMap<String, TaskDefinition>,
    pub env: BTreeMap<String, String>,
}

/// The loaded monorepo. BTreeMaps keep every iteration deterministic.
#[derive(Debug, Clone)]
pub struct Monorepo {
    /// Absolute path of the monorepo root.
    pub root: PathBuf,
    /// All workspaces except the root (id `""`).
    pub workspaces: BTreeMap<String, Workspace>,
    /// Task tables keyed by workspace id, including `""` for the root.
    pub task_configs: BTreeMap<String, WorkspaceTasks>,
    pub default_workspace: Option<String>,
}

impl Monorepo {
    /// The `.cockpit/` directory holding user config.
    pub fn dot_dir(&self) -> PathBuf {
        self.root.join(".cockpit")
    }

    /// The cache directory wholly managed by the core.
    pub fn cache_dir(&self) -> PathBuf {
        self.dot_dir().join(".cache")
    }

    /// True for the root id and every configured workspace.
    pub fn has_workspace(&self, workspace_id: &str) -> bool {
        workspace_id.is_empty() || self.workspaces.contains_key(workspace_id)
    }

    /// Absolute path of a workspace; the empty id is the root.
    pub fn workspace_path(&self, workspace_id: &str) -> Option<&Path> {
        if workspace_id.is_empty() {
            Some(&self.root)
        } else {
            self.workspaces.get(workspace_id).map(|ws| ws.abs_path.as_path())
        }
    }

    /// The task table of a workspace, if it has one.
    pub fn tasks_of(&self, workspace_id: &str) -> Option<&BTreeMap<String, TaskDefinition>> {
        self.task_configs.get(workspace_id).map(|config| &config.tasks)
    }

    /// Look up a task definition by canonical id.
    pub fn find_task(&self, id: &TaskId) -> Option<&TaskDefinition> {
        self.tasks_of(id.workspace_id())
            .and_then(|tasks| tasks.get(id.task_name()))
    }

    /// The shared env of a workspace's task config.
    pub fn workspace_env(&self, workspace_id: &str) -> Option<&BTreeMap<String, String>> {
        self.task_configs.get(workspace_id).map(|config| &config.env)
    }

    /// Ids of every task across every workspace, in deterministic order.
    pub fn all_task_ids(&self) -> Vec<TaskId> {
        self.task_configs
            .iter()
            .flat_map(|(workspace_id, config)| {
                config.tasks.keys().map(|name| TaskId::new(workspace_id, name))
            })
            .collect()
    }

    /// Workspace ids carrying the given tag.
    pub fn workspaces_with_tag(&self, tag: &str) -> Vec<String> {
        self.workspaces
            .values()
            .filter(|ws| ws.tags.iter().any(|t| t == tag))
            .map(|ws| ws.id.clone())
            .collect()
    }
}
