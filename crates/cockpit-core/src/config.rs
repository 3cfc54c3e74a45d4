//! Configuration loading.
//!
//! The monorepo is marked by `.cockpit/config.json` at its root:
//!
//! ```json
//! {
//!   "workspaces": {
//!     "core": { "path": "packages/core", "tags": ["lib"] },
//!     "web":  { "path": "apps/web", "dependsOn": ["core"] }
//!   },
//!   "defaultWorkspace": "web",
//!   "tasks": { "setup": { "command": "./scripts/setup.sh" } }
//! }
//! ```
//!
//! `tasks`/`env` in the root file belong to the root workspace (id `""`).
//! Each workspace directory may add its own `cockpit.json` with a `tasks`
//! table and an optional shared `env`.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use cockpit_types::{Error, Result, TaskDefinition};

use crate::workspace::{Monorepo, Workspace, WorkspaceTasks};

const CONFIG_DIR: &str = ".cockpit";
const CONFIG_FILE: &str = "config.json";
const WORKSPACE_FILE: &str = "cockpit.json";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct RootConfigFile {
    #[serde(default)]
    workspaces: BTreeMap<String, WorkspaceEntry>,
    #[serde(default)]
    default_workspace: Option<String>,
    #[serde(default)]
    tasks: BTreeMap<String, TaskDefinition>,
    #[serde(default)]
    env: BTreeMap<String, String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct WorkspaceEntry {
    path: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    tags: Vec<String>,
    #[serde(default)]
    depends_on: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WorkspaceTaskFile {
    #[serde(default)]
    tasks: BTreeMap<String, TaskDefinition>,
    #[serde(default)]
    env: BTreeMap<String, String>,
}

/// Ascend from `start` to the first directory containing
/// `.cockpit/config.json`.
pub fn find_root(start: &Path) -> Result<PathBuf> {
    let mut current = start;
    loop {
        if current.join(CONFIG_DIR).join(CONFIG_FILE).is_file() {
            return Ok(current.to_path_buf());
        }
        match current.parent() {
            Some(parent) => current = parent,
            None => return Err(Error::ConfigNotFound { searched: start.to_path_buf() }),
        }
    }
}

/// Load the workspace model rooted at `root`.
pub async fn load_monorepo(root: &Path) -> Result<Monorepo> {
    let config_path = root.join(CONFIG_DIR).join(CONFIG_FILE);
    let raw = tokio::fs::read_to_string(&config_path)
        .await
        .map_err(|_| Error::ConfigNotFound { searched: root.to_path_buf() })?;
    let config: RootConfigFile = serde_json::from_str(&raw).map_err(|err| {
        Error::ConfigValidation { message: format!("{}: {err}", config_path.display()) }
    })?;

    let mut workspaces = BTreeMap::new();
    let mut task_configs = BTreeMap::new();

    // Root tasks come from the config file itself.
    task_configs.insert(
        String::new(),
        WorkspaceTasks { tasks: config.tasks, env: config.env },
    );

    for (id, entry) in config.workspaces {
        if id.is_empty() {
            return Err(Error::ConfigValidation {
                message: "workspace id must not be empty (the empty id is the root)".into(),
            });
        }
        if id.contains(':') {
            return Err(Error::ConfigValidation {
                message: format!("workspace id {id:?} must not contain ':'"),
            });
        }

        let abs_path = root.join(&entry.path);
        if !abs_path.is_dir() {
            return Err(Error::ConfigValidation {
                message: format!("workspace {id:?}: directory {} does not exist", entry.path),
            });
        }

        if let Some(tasks) = load_workspace_tasks(&abs_path, &id).await? {
            task_configs.insert(id.clone(), tasks);
        }

        workspaces.insert(
            id.clone(),
            Workspace {
                name: entry.name.unwrap_or_else(|| id.clone()),
                id,
                abs_path,
                rel_path: entry.path,
                tags: entry.tags,
                depends_on: entry.depends_on,
            },
        );
    }

    if let Some(default) = &config.default_workspace {
        if !workspaces.contains_key(default) {
            return Err(Error::ConfigValidation {
                message: format!("defaultWorkspace {default:?} is not a configured workspace"),
            });
        }
    }

    Ok(Monorepo {
        root: root.to_path_buf(),
        workspaces,
        task_configs,
        default_workspace: config.default_workspace,
    })
}

async fn load_workspace_tasks(
    workspace_path: &Path,
    workspace_id: &str,
) -> Result<Option<WorkspaceTasks>> {
    let path = workspace_path.join(WORKSPACE_FILE);
    let raw = match tokio::fs::read_to_string(&path).await {
        Ok(raw) => raw,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(err) => return Err(err.into()),
    };

    let file: WorkspaceTaskFile = serde_json::from_str(&raw).map_err(|err| {
        Error::ConfigValidation {
            message: format!("workspace {workspace_id:?}: {}: {err}", path.display()),
        }
    })?;
    Ok(Some(WorkspaceTasks { tasks: file.tasks, env: file.env }))
}

/// Scaffold for `cockpit init`.
const STARTER_CONFIG: &str = r#"{
  "workspaces": {},
  "tasks": {
    "hello": {
      "command": "echo hello from cockpit",
      "cache": false
    }
  }
}
"#;

/// Write a starter `.cockpit/config.json` under `dir`.
///
/// Fails if one already exists.
pub async fn init_config(dir: &Path) -> Result<PathBuf> {
    let config_path = dir.join(CONFIG_DIR).join(CONFIG_FILE);
    if config_path.exists() {
        return Err(Error::ConfigValidation {
            message: format!("{} already exists", config_path.display()),
        });
    }
    tokio::fs::create_dir_all(dir.join(CONFIG_DIR)).await?;
    tokio::fs::write(&config_path, STARTER_CONFIG).await?;
    Ok(config_path)
}
