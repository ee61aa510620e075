//! Structured session logging.

use tracing::{error, info, warn, Span};

use cutmirror_models::SessionId;

/// Logger carrying the session id and operation on every line.
#[derive(Debug, Clone)]
pub struct JobLogger {
    session_id: String,
    operation: String,
}

impl JobLogger {
    pub fn new(session_id: &SessionId, operation: &str) -> Self {
        Self {
            session_id: session_id.to_string(),
            operation: operation.to_string(),
        }
    }

    /// Same session, different operation.
    pub fn for_operation(&self, operation: &str) -> Self {
        Self {
            session_id: self.session_id.clone(),
            operation: operation.to_string(),
        }
    }

    pub fn log_start(&self, message: &str) {
        info!(session_id = %self.session_id, operation = %self.operation, "Started: {}", message);
    }

    pub fn log_progress(&self, message: &str) {
        info!(session_id = %self.session_id, operation = %self.operation, "Progress: {}", message);
    }

    pub fn log_warning(&self, message: &str) {
        warn!(session_id = %self.session_id, operation = %self.operation, "Warning: {}", message);
    }

    pub fn log_error(&self, message: &str) {
        error!(session_id = %self.session_id, operation = %self.operation, "Error: {}", message);
    }

    pub fn log_completion(&self, message: &str) {
        info!(session_id = %self.session_id, operation = %self.operation, "Completed: {}", message);
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn operation(&self) -> &str {
        &self.operation
    }

    pub fn create_span(&self) -> Span {
        tracing::info_span!("session", session_id = %self.session_id, operation = %self.operation)
    }
}
