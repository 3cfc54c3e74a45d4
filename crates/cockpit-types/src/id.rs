//! Task identifiers and the reference grammar.
//!
//! A task id is the pair `(workspace, task name)` rendered as
//! `workspace:task`. The *first* colon separates the two components; any
//! further colons belong to the task name, so `web:build:prod` is the task
//! `build:prod` in workspace `web`. The empty workspace id denotes the
//! monorepo root, giving ids like `:build`.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Canonical identifier of a task instance: `workspaceId:taskName`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(String);

impl TaskId {
    /// Build an id from its components.
    pub fn new(workspace_id: &str, task_name: &str) -> Self {
        Self(format!("{workspace_id}:{task_name}"))
    }

    /// Parse a rendered id back into canonical form.
    ///
    /// Splits on the first colon. An id without a colon is a bare task name
    /// in the root workspace.
    pub fn parse(id: &str) -> Self {
        match id.split_once(':') {
            Some(_) => Self(id.to_string()),
            None => Self(format!(":{id}")),
        }
    }

    /// The workspace component (empty string = monorepo root).
    pub fn workspace_id(&self) -> &str {
        self.0.split_once(':').map(|(ws, _)| ws).unwrap_or("")
    }

    /// The task name component (may itself contain colons).
    pub fn task_name(&self) -> &str {
        self.0.split_once(':').map(|(_, name)| name).unwrap_or(&self.0)
    }

    /// The rendered id.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// A filesystem-safe rendering: every `:` becomes `__`.
    pub fn safe_dir_name(&self) -> String {
        self.0.replace(':', "__")
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Resolve a reference string against the workspace it was written in.
///
/// Reference forms:
/// - `"name"` — task `name` in `current_workspace`
/// - `"ws:name"` — task `name` in workspace `ws`
/// - `":name"` — task `name` in the root workspace
pub fn parse_ref(reference: &str, current_workspace: &str) -> TaskId {
    match reference.split_once(':') {
        Some((workspace, name)) => TaskId::new(workspace, name),
        None => TaskId::new(current_workspace, reference),
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case("build", "web", "web:build")]
    #[case("core:build", "web", "core:build")]
    #[case(":setup", "web", ":setup")]
    #[case("build", "", ":build")]
    #[case("db:migrate:up", "web", "db:migrate:up")]
    fn parse_ref_forms(#[case] reference: &str, #[case] current: &str, #[case] expected: &str) {
        assert_eq!(parse_ref(reference, current).as_str(), expected);
    }

    #[rstest]
    #[case("web", "build")]
    #[case("", "build")]
    #[case("web", "build:prod")]
    #[case("ws", "a:b:c")]
    fn id_round_trip(#[case] workspace: &str, #[case] name: &str) {
        let id = TaskId::new(workspace, name);
        let parsed = TaskId::parse(id.as_str());
        assert_eq!(parsed.workspace_id(), workspace);
        assert_eq!(parsed.task_name(), name);
    }

    #[test]
    fn parse_without_colon_defaults_to_root() {
        let id = TaskId::parse("build");
        assert_eq!(id.workspace_id(), "");
        assert_eq!(id.task_name(), "build");
        assert_eq!(id.as_str(), ":build");
    }

    #[test]
    fn first_colon_splits_workspace_from_name() {
        let id = TaskId::parse("web:build:prod");
        assert_eq!(id.workspace_id(), "web");
        assert_eq!(id.task_name(), "build:prod");
    }

    #[test]
    fn safe_dir_name_replaces_all_colons() {
        assert_eq!(TaskId::new("web", "build:prod").safe_dir_name(), "web__build__prod");
    }

    #[test]
    fn serializes_as_plain_string() {
        let id = TaskId::new("web", "build");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"web:build\"");
        let back: TaskId = serde_json::from_str("\"web:build\"").unwrap();
        assert_eq!(back, id);
    }
}
