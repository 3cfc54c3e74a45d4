//! Input fingerprinting.
//!
//! A task's input hash covers its command, any extra CLI arguments, its
//! environment overlay and the metadata of its input file set. Hashing is
//! metadata-only (relative path, mtime, size) — fast enough to run before
//! every task, at the cost of false hits when timestamps are rewritten
//! without content changes.

use std::path::Path;

use sha2::{Digest, Sha256};

use cockpit_glob::{walk, Pattern, WalkOptions};
use cockpit_types::{Result, TaskDefinition};

/// Directory names never fed into the hash. `dist` and `.cache` stay
/// excluded even when a user declares them as inputs: a task whose outputs
/// land in its own input set would otherwise never be a cache hit twice.
const HASH_EXCLUDES: [&str; 4] = ["node_modules", ".git", "dist", ".cache"];

/// When a definition declares no inputs, everything under the workspace
/// counts.
const DEFAULT_INPUTS: [&str; 1] = ["**/*"];

/// Compute the input hash of a task instance.
///
/// `extra_args` participate only when non-empty; the runner passes them
/// for main (requested) tasks exclusively. Returns the first 16 hex chars
/// of a SHA-256 digest.
pub async fn input_hash(
    definition: &TaskDefinition,
    workspace_path: &Path,
    extra_args: &[String],
) -> Result<String> {
    let mut hasher = Sha256::new();

    hasher.update(serde_json::to_string(&definition.command)?);
    hasher.update(b"\n");

    if !extra_args.is_empty() {
        hasher.update(serde_json::to_string(extra_args)?);
        hasher.update(b"\n");
    }

    // BTreeMap: identical env maps always serialize identically.
    if !definition.env.is_empty() {
        hasher.update(serde_json::to_string(&definition.env)?);
        hasher.update(b"\n");
    }

    let patterns: Vec<Pattern> = match &definition.inputs {
        Some(inputs) => compile(inputs),
        None => compile(&DEFAULT_INPUTS.map(String::from)),
    };
    let options = WalkOptions {
        patterns,
        exclude_dirs: HASH_EXCLUDES.iter().map(|s| s.to_string()).collect(),
        include_hidden: true,
        ..Default::default()
    };

    for file in walk(workspace_path, &options).await.unwrap_or_default() {
        let mtime = file
            .modified
            .map(|time| chrono::DateTime::<chrono::Utc>::from(time).to_rfc3339())
            .unwrap_or_default();
        hasher.update(&file.rel_path);
        hasher.update(b"|");
        hasher.update(&mtime);
        hasher.update(b"|");
        hasher.update(file.size.to_string());
        hasher.update(b"\n");
    }

    let digest = hasher.finalize();
    let hex: String = digest.iter().map(|byte| format!("{byte:02x}")).collect();
    Ok(hex[..16].to_string())
}

/// Compile patterns, dropping any that fail to parse with a note.
fn compile(patterns: &[String]) -> Vec<Pattern> {
    patterns
        .iter()
        .filter_map(|raw| match Pattern::new(raw) {
            Ok(pattern) => Some(pattern),
            Err(err) => {
                tracing::warn!(pattern = %raw, %err, "ignoring unparsable glob");
                None
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn write(root: &Path, rel: &str, contents: &str) {
        let path = root.join(rel);
        tokio::fs::create_dir_all(path.parent().unwrap()).await.unwrap();
        tokio::fs::write(path, contents).await.unwrap();
    }

    #[tokio::test]
    async fn hash_is_16_hex_chars() {
        let tmp = tempfile::tempdir().unwrap();
        let def = TaskDefinition::shell("echo hi");
        let hash = input_hash(&def, tmp.path(), &[]).await.unwrap();
        assert_eq!(hash.len(), 16);
        assert!(hash.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[tokio::test]
    async fn hash_is_deterministic() {
        let tmp = tempfile::tempdir().unwrap();
        write(tmp.path(), "src/main.rs", "fn main() {}").await;
        let def = TaskDefinition::shell("cargo build").with_inputs(["src/**"]);

        let first = input_hash(&def, tmp.path(), &[]).await.unwrap();
        let second = input_hash(&def, tmp.path(), &[]).await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn command_change_changes_hash() {
        let tmp = tempfile::tempdir().unwrap();
        let a = input_hash(&TaskDefinition::shell("echo a"), tmp.path(), &[]).await.unwrap();
        let b = input_hash(&TaskDefinition::shell("echo b"), tmp.path(), &[]).await.unwrap();
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn extra_args_change_hash() {
        let tmp = tempfile::tempdir().unwrap();
        let def = TaskDefinition::shell("echo hi");
        let bare = input_hash(&def, tmp.path(), &[]).await.unwrap();
        let with_args = input_hash(&def, tmp.path(), &["--watch".into()]).await.unwrap();
        assert_ne!(bare, with_args);
    }

    #[tokio::test]
    async fn env_changes_hash() {
        let tmp = tempfile::tempdir().unwrap();
        let plain = TaskDefinition::shell("echo hi");
        let mut with_env = TaskDefinition::shell("echo hi");
        with_env.env.insert("MODE".into(), "release".into());

        let a = input_hash(&plain, tmp.path(), &[]).await.unwrap();
        let b = input_hash(&with_env, tmp.path(), &[]).await.unwrap();
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn new_input_file_changes_hash() {
        let tmp = tempfile::tempdir().unwrap();
        write(tmp.path(), "src/a.rs", "a").await;
        let def = TaskDefinition::shell("build").with_inputs(["src/**"]);

        let before = input_hash(&def, tmp.path(), &[]).await.unwrap();
        write(tmp.path(), "src/b.rs", "b").await;
        let after = input_hash(&def, tmp.path(), &[]).await.unwrap();
        assert_ne!(before, after);
    }

    #[tokio::test]
    async fn files_outside_inputs_do_not_affect_hash() {
        let tmp = tempfile::tempdir().unwrap();
        write(tmp.path(), "src/a.rs", "a").await;
        let def = TaskDefinition::shell("build").with_inputs(["src/**"]);

        let before = input_hash(&def, tmp.path(), &[]).await.unwrap();
        write(tmp.path(), "README.md", "docs").await;
        let after = input_hash(&def, tmp.path(), &[]).await.unwrap();
        assert_eq!(before, after);
    }

    #[tokio::test]
    async fn dist_is_excluded_even_when_declared() {
        let tmp = tempfile::tempdir().unwrap();
        write(tmp.path(), "src/a.rs", "a").await;
        let def = TaskDefinition::shell("build").with_inputs(["src/**", "dist/**"]);

        let before = input_hash(&def, tmp.path(), &[]).await.unwrap();
        write(tmp.path(), "dist/bundle.js", "generated").await;
        let after = input_hash(&def, tmp.path(), &[]).await.unwrap();
        assert_eq!(before, after);
    }
}
