//! cockpit-glob: Glob matching and file walking.
//!
//! Provides:
//! - **Pattern**: compiled `/`-separated glob patterns with `**` (globstar),
//!   `*`, `?`, character classes and `{a,b}` brace alternatives
//! - **walk**: async recursive directory walker yielding matched files (and
//!   optionally directories) with their metadata, sorted by relative path
//!
//! Paths handed to `Pattern::matches` are workspace-relative and use `/`
//! separators on every platform. The walker never consults the process
//! working directory; the root is always passed explicitly.

mod pattern;
mod walk;

pub use pattern::{contains_glob, expand_braces, Pattern, PatternError};
pub use walk::{walk, EntryTypes, WalkOptions, Walked};

use thiserror::Error;

/// Errors from filesystem operations within the walker.
#[derive(Debug, Error)]
pub enum WalkError {
    #[error("io error under {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}
