//! Captured console output.

use serde::{Deserialize, Serialize};

/// Which stream a chunk came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamKind {
    Stdout,
    Stderr,
}

/// One captured chunk of child-process output.
///
/// A `Vec<OutputChunk>` preserves the interleaving order in which chunks
/// arrived, so a cache replay reproduces the original console stream
/// faithfully.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputChunk {
    pub stream: StreamKind,
    pub data: String,
}

impl OutputChunk {
    pub fn stdout(data: impl Into<String>) -> Self {
        Self { stream: StreamKind::Stdout, data: data.into() }
    }

    pub fn stderr(data: impl Into<String>) -> Self {
        Self { stream: StreamKind::Stderr, data: data.into() }
    }
}
