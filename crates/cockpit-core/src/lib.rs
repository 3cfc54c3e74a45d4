//! cockpit-core: The engine of the cockpit task runner.
//!
//! This crate provides:
//!
//! - **Config loader**: discovers the monorepo root and builds the workspace model
//! - **Graph builder**: resolves task references into a DAG with execution order
//!   and parallel levels
//! - **Fingerprinter**: deterministic input hashing over command, env, args and
//!   input file metadata
//! - **Cache store**: per-task registries of hash-addressed outputs plus captured
//!   console streams, with restore and replay
//! - **Process supervisor**: spawns children, streams their output, enforces
//!   timeouts
//! - **Runner + Scheduler**: drives the DAG with bounded parallelism, cascading
//!   failures and cache short-circuits
//! - **Cleanup engine**: deletes declared outputs and invalidates cache entries
//!
//! The workspace root is resolved once at the boundary and passed explicitly;
//! no component consults the process working directory.

pub mod cache;
pub mod cleanup;
pub mod config;
pub mod engine;
pub mod fingerprint;
pub mod graph;
pub mod logger;
pub mod process;
pub mod runner;
pub mod scheduler;
pub mod workspace;

pub use cache::{CacheStats, CacheStore, CachedFile, Lookup, RegistryEntry, StoreRequest};
pub use cleanup::{cleanup_task, CleanupOutcome};
pub use config::{find_root, init_config, load_monorepo};
pub use engine::{Engine, RunOptions};
pub use fingerprint::input_hash;
pub use graph::{build_full_graph, build_multi_workspace_graph, build_task_graph};
pub use logger::{Logger, NullLogger, TaskEvent, TerminalLogger};
pub use process::{supervise, NullSink, OutputSink, ProcessResult, SpawnOptions};
pub use runner::{run_task, ExecutionContext, DEFAULT_TIMEOUT_MS};
pub use scheduler::{run_graph, run_graph_sequential, SchedulerOptions};
pub use workspace::{Monorepo, Workspace, WorkspaceTasks};
