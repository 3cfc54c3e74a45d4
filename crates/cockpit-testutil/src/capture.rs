//! A logger that records everything for assertions.

use std::sync::Mutex;

use cockpit_core::{Logger, TaskEvent};
use cockpit_types::{RunSummary, TaskId};

/// Records every status line, output chunk and summary it receives.
#[derive(Default)]
pub struct CaptureLogger {
    events: Mutex<Vec<(TaskId, TaskEvent, Option<String>)>>,
    stdout: Mutex<Vec<(TaskId, String)>>,
    stderr: Mutex<Vec<(TaskId, String)>>,
    summaries: Mutex<Vec<RunSummary>>,
}

impl CaptureLogger {
    pub fn new() -> Self {
        Self::default()
    }

    /// The events emitted for one task, in order.
    pub fn events_for(&self, id: &TaskId) -> Vec<TaskEvent> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|(task_id, _, _)| task_id == id)
            .map(|(_, event, _)| *event)
            .collect()
    }

    /// The detail message attached to the latest occurrence of `event`.
    pub fn message_for(&self, id: &TaskId, event: TaskEvent) -> Option<String> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|(task_id, e, _)| task_id == id && *e == event)
            .and_then(|(_, _, message)| message.clone())
    }

    /// Concatenated stdout of one task.
    pub fn stdout_of(&self, id: &TaskId) -> String {
        concat_for(&self.stdout, id)
    }

    /// Concatenated stderr of one task.
    pub fn stderr_of(&self, id: &TaskId) -> String {
        concat_for(&self.stderr, id)
    }

    pub fn summaries(&self) -> Vec<RunSummary> {
        self.summaries.lock().unwrap().clone()
    }
}

fn concat_for(store: &Mutex<Vec<(TaskId, String)>>, id: &TaskId) -> String {
    store
        .lock()
        .unwrap()
        .iter()
        .filter(|(task_id, _)| task_id == id)
        .map(|(_, data)| data.as_str())
        .collect()
}

impl Logger for CaptureLogger {
    fn task(&self, id: &TaskId, event: TaskEvent, message: Option<&str>) {
        self.events
            .lock()
            .unwrap()
            .push((id.clone(), event, message.map(str::to_string)));
    }

    fn task_stdout(&self, id: &TaskId, data: &str) {
        self.stdout.lock().unwrap().push((id.clone(), data.to_string()));
    }

    fn task_stderr(&self, id: &TaskId, data: &str) {
        self.stderr.lock().unwrap().push((id.clone(), data.to_string()));
    }

    fn summary(&self, summary: &RunSummary) {
        self.summaries.lock().unwrap().push(summary.clone());
    }
}
