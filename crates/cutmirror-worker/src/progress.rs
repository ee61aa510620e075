//! Session progress stream.

use std::sync::{Mutex, MutexGuard};

use tokio::sync::broadcast;
use tracing::debug;

use cutmirror_models::{JobStatus, ProgressEvent};

/// Broadcasts a session's progress events.
///
/// Progress never decreases and exactly one terminal event (`complete` or
/// `error`) is emitted; anything reported after it is dropped.
pub struct ProgressReporter {
    sender: broadcast::Sender<ProgressEvent>,
    state: Mutex<ReporterState>,
}

struct ReporterState {
    latest: ProgressEvent,
    logs: Vec<String>,
}

impl ProgressReporter {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            sender,
            state: Mutex::new(ReporterState {
                latest: ProgressEvent::uploaded(),
                logs: Vec::new(),
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, ReporterState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn latest(&self) -> ProgressEvent {
        self.state().latest.clone()
    }

    pub fn is_finished(&self) -> bool {
        self.state().latest.status.is_terminal()
    }

    /// The latest event together with a receiver for every later one.
    pub fn subscribe(&self) -> (ProgressEvent, broadcast::Receiver<ProgressEvent>) {
        let state = self.state();
        (state.latest.clone(), self.sender.subscribe())
    }

    /// Queue a log line for the next event.
    pub fn log(&self, line: impl Into<String>) {
        self.state().logs.push(line.into());
    }

    /// Report processing progress. Returns false once the session finished.
    pub fn update(&self, progress: f64, message: impl Into<String>) -> bool {
        self.emit(JobStatus::Processing, Some(progress), message.into())
    }

    pub fn complete(&self, message: impl Into<String>) -> bool {
        self.emit(JobStatus::Complete, Some(1.0), message.into())
    }

    /// Terminal error; progress stays where the run stopped.
    pub fn fail(&self, message: impl Into<String>) -> bool {
        self.emit(JobStatus::Error, None, message.into())
    }

    fn emit(&self, status: JobStatus, progress: Option<f64>, message: String) -> bool {
        let mut state = self.state();
        if state.latest.status.is_terminal() {
            debug!(status = status.as_str(), "Ignoring progress after terminal event");
            return false;
        }

        let previous = state.latest.progress;
        let progress = progress.map_or(previous, |p| p.max(previous));
        let logs = std::mem::take(&mut state.logs);
        let event = ProgressEvent::new(status, progress, message).with_logs(logs);
        state.latest = event.clone();
        // No receivers is fine; the latest event is still kept.
        let _ = self.sender.send(event);
        true
    }
}
