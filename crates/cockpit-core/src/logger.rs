//! The logger contract and its terminal implementation.
//!
//! Every line a task produces is prefixed with its id in a color chosen
//! deterministically from the id's hash. Cached replays go through the
//! same sinks as live output, so a hit reads exactly like a fresh run.

use std::hash::{Hash, Hasher};

use cockpit_types::{RunSummary, TaskId};

/// Status of a task line, as shown to the user.
///
/// `Running` and `Starting` are transient; the rest mirror terminal task
/// statuses, with `Restored` marking a cache hit that had to copy files
/// back first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskEvent {
    Starting,
    Running,
    Success,
    Failed,
    Skipped,
    Cached,
    Restored,
}

impl std::fmt::Display for TaskEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TaskEvent::Starting => "starting",
            TaskEvent::Running => "running",
            TaskEvent::Success => "success",
            TaskEvent::Failed => "failed",
            TaskEvent::Skipped => "skipped",
            TaskEvent::Cached => "cached",
            TaskEvent::Restored => "restored",
        };
        f.write_str(s)
    }
}

/// Where the runner and scheduler report to.
pub trait Logger: Send + Sync {
    /// A status line for a task, optionally with detail.
    fn task(&self, id: &TaskId, event: TaskEvent, message: Option<&str>);
    /// A chunk of task stdout (live or replayed).
    fn task_stdout(&self, id: &TaskId, data: &str);
    /// A chunk of task stderr (live or replayed).
    fn task_stderr(&self, id: &TaskId, data: &str);
    /// End-of-run counts.
    fn summary(&self, summary: &RunSummary);
}

/// Discards everything.
pub struct NullLogger;

impl Logger for NullLogger {
    fn task(&self, _id: &TaskId, _event: TaskEvent, _message: Option<&str>) {}
    fn task_stdout(&self, _id: &TaskId, _data: &str) {}
    fn task_stderr(&self, _id: &TaskId, _data: &str) {}
    fn summary(&self, _summary: &RunSummary) {}
}

/// Writes colored, task-prefixed lines to the terminal.
pub struct TerminalLogger {
    color: bool,
}

impl TerminalLogger {
    pub fn new() -> Self {
        Self { color: true }
    }

    pub fn plain() -> Self {
        Self { color: false }
    }

    fn prefix(&self, id: &TaskId) -> String {
        if self.color {
            let (r, g, b) = task_color(id);
            format!("\x1b[38;2;{r};{g};{b}m[{id}]\x1b[0m")
        } else {
            format!("[{id}]")
        }
    }

    fn write_chunk(&self, id: &TaskId, data: &str, to_stderr: bool) {
        let prefix = self.prefix(id);
        for line in data.split_inclusive('\n') {
            let rendered = format!("{prefix} {line}");
            if to_stderr {
                eprint!("{rendered}");
            } else {
                print!("{rendered}");
            }
            if !rendered.ends_with('\n') {
                if to_stderr {
                    eprintln!();
                } else {
                    println!();
                }
            }
        }
    }
}

impl Default for TerminalLogger {
    fn default() -> Self {
        Self::new()
    }
}

impl Logger for TerminalLogger {
    fn task(&self, id: &TaskId, event: TaskEvent, message: Option<&str>) {
        match message {
            Some(message) => println!("{} {event} ({message})", self.prefix(id)),
            None => println!("{} {event}", self.prefix(id)),
        }
    }

    fn task_stdout(&self, id: &TaskId, data: &str) {
        self.write_chunk(id, data, false);
    }

    fn task_stderr(&self, id: &TaskId, data: &str) {
        self.write_chunk(id, data, true);
    }

    fn summary(&self, summary: &RunSummary) {
        println!(
            "\n{} succeeded, {} cached, {} failed, {} skipped in {} ms",
            summary.success, summary.cached, summary.failed, summary.skipped, summary.duration_ms
        );
    }
}

/// A stable 24-bit color for a task id.
///
/// Hues are spread by the golden ratio over the id's hash so neighboring
/// tasks land far apart on the wheel; saturation and lightness are fixed
/// at 0.7 / 0.6.
fn task_color(id: &TaskId) -> (u8, u8, u8) {
    let mut hasher = std::hash::DefaultHasher::new();
    id.hash(&mut hasher);
    let hue = (hasher.finish() as f64 * 0.618_033_988_749_895).fract();
    hsl_to_rgb(hue, 0.7, 0.6)
}

/// Standard HSL to RGB, all inputs in `[0, 1]`.
fn hsl_to_rgb(h: f64, s: f64, l: f64) -> (u8, u8, u8) {
    let c = (1.0 - (2.0 * l - 1.0).abs()) * s;
    let h6 = h * 6.0;
    let x = c * (1.0 - (h6 % 2.0 - 1.0).abs());
    let (r, g, b) = match h6 as u32 {
        0 => (c, x, 0.0),
        1 => (x, c, 0.0),
        2 => (0.0, c, x),
        3 => (0.0, x, c),
        4 => (x, 0.0, c),
        _ => (c, 0.0, x),
    };
    let m = l - c / 2.0;
    (
        ((r + m) * 255.0).round() as u8,
        ((g + m) * 255.0).round() as u8,
        ((b + m) * 255.0).round() as u8,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn color_is_deterministic_per_id() {
        let id = TaskId::new("web", "build");
        assert_eq!(task_color(&id), task_color(&TaskId::new("web", "build")));
    }

    #[test]
    fn hsl_primaries() {
        assert_eq!(hsl_to_rgb(0.0, 1.0, 0.5), (255, 0, 0));
        assert_eq!(hsl_to_rgb(1.0 / 3.0, 1.0, 0.5), (0, 255, 0));
        assert_eq!(hsl_to_rgb(2.0 / 3.0, 1.0, 0.5), (0, 0, 255));
    }

    #[test]
    fn hsl_lightness_extremes() {
        assert_eq!(hsl_to_rgb(0.3, 0.7, 0.0), (0, 0, 0));
        assert_eq!(hsl_to_rgb(0.3, 0.7, 1.0), (255, 255, 255));
    }

    #[test]
    fn event_display_is_lowercase() {
        assert_eq!(TaskEvent::Cached.to_string(), "cached");
        assert_eq!(TaskEvent::Restored.to_string(), "restored");
    }
}
