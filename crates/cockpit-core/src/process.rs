//! Child process supervision.
//!
//! The supervisor normalizes the three command shapes to one spawnable
//! form, streams stdout/stderr chunks to a pair of sinks as they arrive,
//! enforces the task timeout with graceful-then-forceful termination, and
//! never throws: spawn failures come back as an exit-code-1 result.

use std::collections::BTreeMap;
use std::path::Path;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::AsyncReadExt;
use tokio::process::{Child, Command};

use cockpit_types::CommandSpec;

/// Seconds between graceful and forceful termination.
const KILL_GRACE: Duration = Duration::from_secs(5);

/// Receives decoded output chunks in arrival order.
///
/// The runner wires sinks that both capture into an ordered buffer and
/// forward to the logger; writes must therefore be cheap and non-blocking.
pub trait OutputSink: Send + Sync {
    fn write(&self, data: &str);
}

/// A sink that drops everything.
pub struct NullSink;

impl OutputSink for NullSink {
    fn write(&self, _data: &str) {}
}

/// Options for one supervised spawn.
pub struct SpawnOptions {
    pub cwd: std::path::PathBuf,
    pub env: BTreeMap<String, String>,
    /// Milliseconds; `None` disables the timer.
    pub timeout_ms: Option<u64>,
    pub extra_args: Vec<String>,
    pub stdout_sink: Arc<dyn OutputSink>,
    pub stderr_sink: Arc<dyn OutputSink>,
}

/// What came back from the child.
#[derive(Debug)]
pub struct ProcessResult {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    /// True when the timeout fired and the child was terminated.
    pub killed: bool,
}

#[derive(Debug, PartialEq, Eq)]
struct Normalized {
    program: String,
    args: Vec<String>,
    shell: bool,
    cwd: Option<String>,
}

/// Collapse the command union to `(program, args, shell)`.
///
/// Extra arguments go at the tail of a shell line, onto the *last* element
/// of a sequence, or at the end of an explicit argv.
fn normalize(command: &CommandSpec, extra_args: &[String]) -> Normalized {
    match command {
        CommandSpec::Shell(line) => {
            let line = append_args(line, extra_args);
            Normalized { program: line, args: Vec::new(), shell: true, cwd: None }
        }
        CommandSpec::Sequence(lines) => {
            let mut lines = lines.clone();
            if let Some(last) = lines.last_mut() {
                *last = append_args(last, extra_args);
            }
            Normalized {
                program: lines.join(" && "),
                args: Vec::new(),
                shell: true,
                cwd: None,
            }
        }
        CommandSpec::Exec { program, args, cwd, shell } => {
            let mut args = args.clone();
            args.extend(extra_args.iter().cloned());
            Normalized {
                program: program.clone(),
                args,
                shell: *shell,
                cwd: cwd.clone(),
            }
        }
    }
}

fn append_args(line: &str, extra_args: &[String]) -> String {
    if extra_args.is_empty() {
        line.to_string()
    } else {
        format!("{line} {}", extra_args.join(" "))
    }
}

/// Spawn and supervise one child process.
pub async fn supervise(command: &CommandSpec, options: SpawnOptions) -> ProcessResult {
    let normalized = normalize(command, &options.extra_args);

    let mut cmd = if normalized.shell {
        let line = if normalized.args.is_empty() {
            normalized.program.clone()
        } else {
            format!("{} {}", normalized.program, normalized.args.join(" "))
        };
        shell_command(&line)
    } else {
        let mut cmd = Command::new(&normalized.program);
        cmd.args(&normalized.args);
        cmd
    };

    let cwd = match &normalized.cwd {
        Some(rel) => options.cwd.join(rel),
        None => options.cwd.clone(),
    };
    cmd.current_dir(cwd);

    // Children keep color output alive even though their stdout is a pipe.
    cmd.env("FORCE_COLOR", "1");
    cmd.env("CLICOLOR_FORCE", "1");
    cmd.env("TERM", std::env::var("TERM").unwrap_or_else(|_| "xterm-256color".into()));
    for (key, value) in &options.env {
        cmd.env(key, value);
    }

    cmd.stdin(Stdio::null());
    cmd.stdout(Stdio::piped());
    cmd.stderr(Stdio::piped());
    cmd.kill_on_drop(true);

    let mut child = match cmd.spawn() {
        Ok(child) => child,
        Err(err) => {
            let message = format!("failed to spawn {}: {err}", normalized.program);
            options.stderr_sink.write(&message);
            return ProcessResult {
                exit_code: 1,
                stdout: String::new(),
                stderr: message,
                killed: false,
            };
        }
    };

    let stdout_pump = child
        .stdout
        .take()
        .map(|stream| tokio::spawn(pump(stream, options.stdout_sink.clone())));
    let stderr_pump = child
        .stderr
        .take()
        .map(|stream| tokio::spawn(pump(stream, options.stderr_sink.clone())));

    let mut killed = false;
    let status = match options.timeout_ms {
        Some(timeout_ms) if timeout_ms > 0 => {
            tokio::select! {
                status = child.wait() => status,
                _ = tokio::time::sleep(Duration::from_millis(timeout_ms)) => {
                    killed = true;
                    terminate(&mut child).await
                }
            }
        }
        _ => child.wait().await,
    };

    let stdout = drain(stdout_pump).await;
    let mut stderr = drain(stderr_pump).await;

    let exit_code = match status {
        Ok(status) => status.code().unwrap_or(-1),
        Err(err) => {
            stderr.push_str(&format!("failed to wait for child: {err}"));
            1
        }
    };

    ProcessResult { exit_code, stdout, stderr, killed }
}

fn shell_command(line: &str) -> Command {
    #[cfg(unix)]
    {
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg(line);
        cmd
    }
    #[cfg(not(unix))]
    {
        let mut cmd = Command::new("cmd");
        cmd.arg("/C").arg(line);
        cmd
    }
}

/// Graceful termination, escalating after the grace period.
async fn terminate(child: &mut Child) -> std::io::Result<std::process::ExitStatus> {
    #[cfg(unix)]
    {
        if let Some(pid) = child.id() {
            let pid = nix::unistd::Pid::from_raw(pid as i32);
            if let Err(err) = nix::sys::signal::kill(pid, nix::sys::signal::Signal::SIGTERM) {
                tracing::debug!(%pid, %err, "SIGTERM failed, killing outright");
            }
        }
        match tokio::time::timeout(KILL_GRACE, child.wait()).await {
            Ok(status) => status,
            Err(_) => {
                let _ = child.start_kill();
                child.wait().await
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = child.start_kill();
        child.wait().await
    }
}

/// Forward chunks to the sink as they arrive; also accumulate for the
/// final result.
async fn pump<R: AsyncReadExt + Unpin>(mut stream: R, sink: Arc<dyn OutputSink>) -> String {
    let mut collected = String::new();
    let mut buf = [0u8; 8192];
    loop {
        match stream.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => {
                let chunk = String::from_utf8_lossy(&buf[..n]);
                sink.write(&chunk);
                collected.push_str(&chunk);
            }
            Err(err) => {
                tracing::debug!(%err, "output pump stopped");
                break;
            }
        }
    }
    collected
}

async fn drain(pump: Option<tokio::task::JoinHandle<String>>) -> String {
    match pump {
        Some(handle) => handle.await.unwrap_or_default(),
        None => String::new(),
    }
}
