//! Declarative task definitions as they appear in workspace config files.
//!
//! Field names follow the on-disk JSON shape (camelCase). The unions here
//! (`CommandSpec`, `TaskRef`, `CleanupSpec`) mirror the shorthand forms users
//! write; each is normalized at a single boundary (`process::normalize` for
//! commands, `parse_ref` for references) before the core touches it.

use std::collections::BTreeMap;
use std::fmt;

use serde::de::{self, Deserializer, SeqAccess, Visitor};
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};

/// What a task runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CommandSpec {
    /// A single shell line.
    Shell(String),
    /// Several shell lines, chained with logical AND.
    Sequence(Vec<String>),
    /// An explicit program invocation.
    Exec {
        program: String,
        #[serde(default)]
        args: Vec<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        cwd: Option<String>,
        #[serde(default)]
        shell: bool,
    },
}

/// A dependency reference, raw (`"core:build"`) or structured
/// (`{"task": "lint", "optional": true}`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TaskRef {
    Raw(String),
    Struct {
        task: String,
        #[serde(default)]
        optional: bool,
    },
}

impl TaskRef {
    /// The reference string, regardless of form.
    pub fn task(&self) -> &str {
        match self {
            TaskRef::Raw(s) => s,
            TaskRef::Struct { task, .. } => task,
        }
    }

    /// Whether a missing target is tolerated. Raw references never are.
    pub fn optional(&self) -> bool {
        match self {
            TaskRef::Raw(_) => false,
            TaskRef::Struct { optional, .. } => *optional,
        }
    }
}

impl From<&str> for TaskRef {
    fn from(s: &str) -> Self {
        TaskRef::Raw(s.to_string())
    }
}

/// What `cockpit cleanup` deletes for a task: either the task's declared
/// outputs (the literal string `"outputs"`) or an explicit pattern list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CleanupSpec {
    Outputs,
    Patterns(Vec<String>),
}

impl Serialize for CleanupSpec {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            CleanupSpec::Outputs => serializer.serialize_str("outputs"),
            CleanupSpec::Patterns(patterns) => patterns.serialize(serializer),
        }
    }
}

impl<'de> Deserialize<'de> for CleanupSpec {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct CleanupVisitor;

        impl<'de> Visitor<'de> for CleanupVisitor {
            type Value = CleanupSpec;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("the string \"outputs\" or a list of glob patterns")
            }

            fn visit_str<E: de::Error>(self, value: &str) -> Result<CleanupSpec, E> {
                if value == "outputs" {
                    Ok(CleanupSpec::Outputs)
                } else {
                    Err(E::invalid_value(de::Unexpected::Str(value), &self))
                }
            }

            fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<CleanupSpec, A::Error> {
                let mut patterns = Vec::new();
                while let Some(pattern) = seq.next_element::<String>()? {
                    patterns.push(pattern);
                }
                Ok(CleanupSpec::Patterns(patterns))
            }
        }

        deserializer.deserialize_any(CleanupVisitor)
    }
}

/// Platform gate for a task definition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Linux,
    Darwin,
    Win32,
    #[default]
    All,
}

impl Platform {
    /// True when the task may run on the host this process runs on.
    pub fn matches_host(self) -> bool {
        match self {
            Platform::All => true,
            Platform::Linux => cfg!(target_os = "linux"),
            Platform::Darwin => cfg!(target_os = "macos"),
            Platform::Win32 => cfg!(target_os = "windows"),
        }
    }
}

/// A task as declared in a workspace's `cockpit.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskDefinition {
    pub command: CommandSpec,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Extra environment for the child process. A BTreeMap keeps hashing
    /// canonical: identical maps always serialize identically.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub env: BTreeMap<String, String>,
    /// Glob patterns describing the task's input file set. Absent means
    /// "everything under the workspace".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inputs: Option<Vec<String>>,
    /// Glob patterns describing produced artifacts, cached on success.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outputs: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cleanup: Option<CleanupSpec>,
    /// Caching applies unless explicitly disabled.
    #[serde(default = "default_cache")]
    pub cache: bool,
    /// Working directory, relative to the workspace.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cwd: Option<String>,
    /// A non-zero exit still counts as success.
    #[serde(default)]
    pub allow_failure: bool,
    /// Per-task timeout in milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u64>,
    #[serde(default)]
    pub platform: Platform,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<TaskRef>,
}

fn default_cache() -> bool {
    true
}

impl TaskDefinition {
    /// A definition running a single shell line, everything else defaulted.
    pub fn shell(command: impl Into<String>) -> Self {
        Self {
            command: CommandSpec::Shell(command.into()),
            description: None,
            env: BTreeMap::new(),
            inputs: None,
            outputs: None,
            cleanup: None,
            cache: true,
            cwd: None,
            allow_failure: false,
            timeout: None,
            platform: Platform::All,
            depends_on: Vec::new(),
        }
    }

    /// Replace the dependency list.
    pub fn with_depends_on<I, R>(mut self, refs: I) -> Self
    where
        I: IntoIterator<Item = R>,
        R: Into<TaskRef>,
    {
        self.depends_on = refs.into_iter().map(Into::into).collect();
        self
    }

    /// Replace the input patterns.
    pub fn with_inputs<I: IntoIterator<Item = S>, S: Into<String>>(mut self, inputs: I) -> Self {
        self.inputs = Some(inputs.into_iter().map(Into::into).collect());
        self
    }

    /// Replace the output patterns.
    pub fn with_outputs<I: IntoIterator<Item = S>, S: Into<String>>(mut self, outputs: I) -> Self {
        self.outputs = Some(outputs.into_iter().map(Into::into).collect());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_spec_shell_from_string() {
        let spec: CommandSpec = serde_json::from_str("\"echo hi\"").unwrap();
        assert_eq!(spec, CommandSpec::Shell("echo hi".into()));
    }

    #[test]
    fn command_spec_sequence_from_array() {
        let spec: CommandSpec = serde_json::from_str(r#"["mkdir -p dist", "cp a dist/"]"#).unwrap();
        assert_eq!(
            spec,
            CommandSpec::Sequence(vec!["mkdir -p dist".into(), "cp a dist/".into()])
        );
    }

    #[test]
    fn command_spec_exec_from_object() {
        let spec: CommandSpec =
            serde_json::from_str(r#"{"program": "cargo", "args": ["build"]}"#).unwrap();
        match spec {
            CommandSpec::Exec { program, args, cwd, shell } => {
                assert_eq!(program, "cargo");
                assert_eq!(args, vec!["build"]);
                assert_eq!(cwd, None);
                assert!(!shell);
            }
            other => panic!("expected exec spec, got {other:?}"),
        }
    }

    #[test]
    fn task_ref_raw_is_never_optional() {
        let r: TaskRef = serde_json::from_str("\"core:build\"").unwrap();
        assert_eq!(r.task(), "core:build");
        assert!(!r.optional());
    }

    #[test]
    fn task_ref_struct_carries_optional() {
        let r: TaskRef = serde_json::from_str(r#"{"task": "lint", "optional": true}"#).unwrap();
        assert_eq!(r.task(), "lint");
        assert!(r.optional());
    }

    #[test]
    fn cleanup_outputs_keyword() {
        let c: CleanupSpec = serde_json::from_str("\"outputs\"").unwrap();
        assert_eq!(c, CleanupSpec::Outputs);
    }

    #[test]
    fn cleanup_pattern_list() {
        let c: CleanupSpec = serde_json::from_str(r#"["dist/**", ".turbo"]"#).unwrap();
        assert_eq!(c, CleanupSpec::Patterns(vec!["dist/**".into(), ".turbo".into()]));
    }

    #[test]
    fn cleanup_rejects_other_strings() {
        assert!(serde_json::from_str::<CleanupSpec>("\"everything\"").is_err());
    }

    #[test]
    fn definition_defaults() {
        let def: TaskDefinition = serde_json::from_str(r#"{"command": "echo hi"}"#).unwrap();
        assert!(def.cache);
        assert!(!def.allow_failure);
        assert_eq!(def.platform, Platform::All);
        assert!(def.depends_on.is_empty());
        assert!(def.env.is_empty());
    }

    #[test]
    fn definition_camel_case_fields() {
        let def: TaskDefinition = serde_json::from_str(
            r#"{"command": "tsc", "dependsOn": ["core:build"], "allowFailure": true}"#,
        )
        .unwrap();
        assert_eq!(def.depends_on.len(), 1);
        assert!(def.allow_failure);
    }

    #[test]
    fn platform_all_always_matches() {
        assert!(Platform::All.matches_host());
    }
}
