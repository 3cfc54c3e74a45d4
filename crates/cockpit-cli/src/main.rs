//! cockpit CLI entry point.
//!
//! Usage:
//!   cockpit run <task> [--workspace ws | --all | --tag t] [-- extra args]
//!   cockpit list [--workspace ws]
//!   cockpit cleanup <task> [--workspace ws] [--dry-run]
//!   cockpit init
//!   cockpit cache <stats|clear>

use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use cockpit_core::{find_root, init_config, load_monorepo, Engine, RunOptions};

#[derive(Parser)]
#[command(name = "cockpit", version, about = "Monorepo task runner")]
struct Cli {
    /// Verbose diagnostics (also honors RUST_LOG).
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Resolve a task to a graph and execute it.
    Run {
        /// Task name, optionally prefixed `workspace:`.
        task: String,
        /// Run in these workspaces (repeatable).
        #[arg(long = "workspace", short = 'w')]
        workspaces: Vec<String>,
        /// Run in every workspace defining the task.
        #[arg(long, conflicts_with_all = ["workspaces", "tag"])]
        all: bool,
        /// Run in every workspace carrying this tag.
        #[arg(long, conflicts_with = "workspaces")]
        tag: Option<String>,
        /// Maximum concurrent tasks (default: host parallelism).
        #[arg(long, short = 'j', default_value_t = 0)]
        concurrency: usize,
        /// Keep going past failures.
        #[arg(long)]
        continue_on_error: bool,
        /// Ignore cache hits; results are still stored.
        #[arg(long, short)]
        force: bool,
        /// Show what would run without executing.
        #[arg(long)]
        dry_run: bool,
        /// Extra arguments appended to the requested task's command.
        #[arg(last = true)]
        extra_args: Vec<String>,
    },
    /// List every known task.
    List {
        #[arg(long, short = 'w')]
        workspace: Option<String>,
    },
    /// Delete a task's declared artifacts and invalidate its cache.
    Cleanup {
        task: String,
        #[arg(long, short = 'w')]
        workspace: Option<String>,
        #[arg(long)]
        dry_run: bool,
    },
    /// Scaffold a .cockpit/config.json in the current directory.
    Init,
    /// Inspect or clear the task cache.
    Cache {
        #[command(subcommand)]
        command: CacheCommand,
    },
}

#[derive(Subcommand)]
enum CacheCommand {
    /// Show cached task and entry counts.
    Stats,
    /// Remove every cached entry.
    Clear,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let default_filter = if cli.verbose { "cockpit=debug,cockpit_core=debug" } else { "warn" };
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)))
        .init();

    match run(cli).await {
        Ok(code) => code,
        Err(err) => {
            eprintln!("Error: {err:?}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<ExitCode> {
    let cwd = std::env::current_dir().context("cannot determine current directory")?;

    if let Command::Init = cli.command {
        let path = init_config(&cwd).await?;
        println!("Initialized {}", path.display());
        return Ok(ExitCode::SUCCESS);
    }

    let root = find_root(&cwd)?;
    let monorepo = load_monorepo(&root).await?;
    let engine = Engine::new(monorepo);

    match cli.command {
        Command::Run {
            task,
            mut workspaces,
            all,
            tag,
            concurrency,
            continue_on_error,
            force,
            dry_run,
            extra_args,
        } => {
            // `web:build` without --workspace selects the workspace by
            // prefix when that prefix is actually a workspace.
            let task_name = if workspaces.is_empty() && !all && tag.is_none() {
                match task.split_once(':') {
                    Some((prefix, name))
                        if engine.monorepo().has_workspace(prefix) =>
                    {
                        workspaces.push(prefix.to_string());
                        name.to_string()
                    }
                    _ => task,
                }
            } else {
                task
            };

            let report = engine
                .run(
                    &task_name,
                    RunOptions {
                        workspaces,
                        all,
                        tag,
                        concurrency,
                        continue_on_error,
                        force,
                        dry_run,
                        verbose: cli.verbose,
                        extra_args,
                    },
                )
                .await?;

            Ok(if report.success { ExitCode::SUCCESS } else { ExitCode::FAILURE })
        }

        Command::List { workspace } => {
            let mut tasks = engine.list_tasks(workspace.as_deref());
            tasks.sort_by(|(a, _), (b, _)| a.cmp(b));
            for (id, description) in tasks {
                match description {
                    Some(description) => println!("{id}  -  {description}"),
                    None => println!("{id}"),
                }
            }
            Ok(ExitCode::SUCCESS)
        }

        Command::Cleanup { task, workspace, dry_run } => {
            let outcome = engine.cleanup(workspace.as_deref(), &task, dry_run).await?;
            let verb = if outcome.dry_run { "would delete" } else { "deleted" };
            for path in &outcome.deleted {
                println!("{verb} {path}");
            }
            for (path, error) in &outcome.errors {
                eprintln!("failed to delete {path}: {error}");
            }
            Ok(ExitCode::SUCCESS)
        }

        Command::Init => unreachable!("handled before loading the monorepo"),

        Command::Cache { command } => {
            match command {
                CacheCommand::Stats => {
                    let stats = engine.cache_stats().await;
                    println!("{} tasks, {} cache entries", stats.tasks, stats.total_entries);
                }
                CacheCommand::Clear => {
                    engine.cache_clear().await;
                    println!("cache cleared");
                }
            }
            Ok(ExitCode::SUCCESS)
        }
    }
}
