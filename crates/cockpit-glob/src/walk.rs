//! Async recursive directory walker.

use std::path::{Path, PathBuf};
use std::time::SystemTime;

use crate::pattern::Pattern;
use crate::WalkError;

/// Which entry kinds a walk yields.
#[derive(Debug, Clone, Copy)]
pub struct EntryTypes {
    pub files: bool,
    pub dirs: bool,
}

impl EntryTypes {
    pub fn files_only() -> Self {
        Self { files: true, dirs: false }
    }

    pub fn all() -> Self {
        Self { files: true, dirs: true }
    }
}

impl Default for EntryTypes {
    fn default() -> Self {
        Self::files_only()
    }
}

/// Options for a walk.
#[derive(Debug, Clone)]
pub struct WalkOptions {
    /// An entry is yielded when any pattern matches its relative path.
    pub patterns: Vec<Pattern>,
    /// Directory names pruned wherever they appear; the walker never
    /// descends into them.
    pub exclude_dirs: Vec<String>,
    /// Include entries whose name starts with `.`.
    pub include_hidden: bool,
    pub entry_types: EntryTypes,
}

impl Default for WalkOptions {
    fn default() -> Self {
        Self {
            patterns: Vec::new(),
            exclude_dirs: Vec::new(),
            include_hidden: false,
            entry_types: EntryTypes::files_only(),
        }
    }
}

/// One matched entry.
#[derive(Debug, Clone)]
pub struct Walked {
    /// Path relative to the walk root, `/`-separated on every platform.
    pub rel_path: String,
    /// True for directories (only yielded when `entry_types.dirs`).
    pub is_dir: bool,
    pub size: u64,
    pub modified: Option<SystemTime>,
}

/// Walk `root` recursively, yielding entries matched by `options`.
///
/// A missing root yields an empty result rather than an error — callers
/// glob against workspaces that may not have produced anything yet.
/// Unreadable entries are skipped with a `tracing::debug!` note. Results
/// are sorted by relative path.
pub async fn walk(root: &Path, options: &WalkOptions) -> Result<Vec<Walked>, WalkError> {
    if !root.is_dir() {
        return Ok(Vec::new());
    }

    let mut results = Vec::new();
    // (absolute dir, relative prefix) — explicit stack, depth-first.
    let mut pending: Vec<(PathBuf, String)> = vec![(root.to_path_buf(), String::new())];

    while let Some((dir, prefix)) = pending.pop() {
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(err) => {
                tracing::debug!(dir = %dir.display(), %err, "skipping unreadable directory");
                continue;
            }
        };

        loop {
            let entry = match entries.next_entry().await {
                Ok(Some(entry)) => entry,
                Ok(None) => break,
                Err(err) => {
                    tracing::debug!(dir = %dir.display(), %err, "skipping unreadable entry");
                    break;
                }
            };

            let name = entry.file_name().to_string_lossy().into_owned();
            if !options.include_hidden && name.starts_with('.') {
                continue;
            }

            let rel_path = if prefix.is_empty() {
                name.clone()
            } else {
                format!("{prefix}/{name}")
            };

            let file_type = match entry.file_type().await {
                Ok(ft) => ft,
                Err(err) => {
                    tracing::debug!(path = %rel_path, %err, "skipping entry without file type");
                    continue;
                }
            };

            if file_type.is_dir() {
                if options.exclude_dirs.iter().any(|excluded| excluded == &name) {
                    continue;
                }
                if options.entry_types.dirs && matches_any(&options.patterns, &rel_path) {
                    let metadata = entry.metadata().await.ok();
                    results.push(Walked {
                        rel_path: rel_path.clone(),
                        is_dir: true,
                        size: 0,
                        modified: metadata.and_then(|m| m.modified().ok()),
                    });
                }
                pending.push((entry.path(), rel_path));
            } else if file_type.is_file() {
                if options.entry_types.files && matches_any(&options.patterns, &rel_path) {
                    let metadata = match entry.metadata().await {
                        Ok(m) => m,
                        Err(err) => {
                            tracing::debug!(path = %rel_path, %err, "skipping unreadable file");
                            continue;
                        }
                    };
                    results.push(Walked {
                        rel_path,
                        is_dir: false,
                        size: metadata.len(),
                        modified: metadata.modified().ok(),
                    });
                }
            }
            // Symlinks are yielded as neither file nor dir and thus skipped;
            // following them would need cycle detection the cache does not
            // require.
        }
    }

    results.sort_by(|a, b| a.rel_path.cmp(&b.rel_path));
    Ok(results)
}

fn matches_any(patterns: &[Pattern], rel_path: &str) -> bool {
    patterns.iter().any(|pattern| pattern.matches(rel_path))
}
