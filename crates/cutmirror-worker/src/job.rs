//! In-process job service: the boundary the HTTP surface talks to.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use metrics::counter;
use tokio::sync::{broadcast, watch, RwLock, Semaphore};
use tracing::{debug, error, info, warn};

use cutmirror_models::{JobResult, JobStatus, ProgressEvent, SessionId};

use crate::error::{WorkerError, WorkerResult};
use crate::names;
use crate::pipeline::{PipelineController, PipelineInput};
use crate::progress::ProgressReporter;

/// Events buffered per subscriber before it starts lagging.
const PROGRESS_CAPACITY: usize = 64;

struct Session {
    progress: Arc<ProgressReporter>,
    cancel: watch::Sender<bool>,
    result: Option<Arc<JobResult>>,
    created_at: DateTime<Utc>,
    finished_at: Option<Instant>,
}

/// Submits sessions to the pipeline and tracks their progress and results.
///
/// Sessions live in memory. Finished ones are dropped once they outlive
/// the configured TTL or exceed the retention cap; running ones never are.
#[derive(Clone)]
pub struct JobService {
    controller: Arc<PipelineController>,
    sessions: Arc<RwLock<HashMap<SessionId, Session>>>,
    permits: Arc<Semaphore>,
    ttl: Duration,
    max_finished: usize,
}

impl JobService {
    pub fn new(controller: PipelineController) -> Self {
        let config = controller.config();
        let permits = Arc::new(Semaphore::new(config.max_concurrent_sessions.max(1)));
        let (ttl, max_finished) = (config.session_ttl, config.max_finished_sessions);
        Self {
            controller: Arc::new(controller),
            sessions: Arc::new(RwLock::new(HashMap::new())),
            permits,
            ttl,
            max_finished,
        }
    }

    /// Drop finished sessions past their TTL, then the oldest finished ones
    /// while over the retention cap.
    async fn cleanup_finished(&self) {
        let mut sessions = self.sessions.write().await;
        let now = Instant::now();
        let before = sessions.len();

        sessions.retain(|_, s| s.finished_at.map_or(true, |t| now.duration_since(t) < self.ttl));

        let mut finished: Vec<_> = sessions
            .iter()
            .filter_map(|(id, s)| s.finished_at.map(|t| (id.clone(), t)))
            .collect();
        if finished.len() > self.max_finished {
            finished.sort_by_key(|(_, t)| *t);
            let excess = finished.len() - self.max_finished;
            for (id, _) in finished.into_iter().take(excess) {
                sessions.remove(&id);
            }
        }

        let removed = before - sessions.len();
        if removed > 0 {
            debug!(removed, retained = sessions.len(), "Dropped finished sessions");
        }
    }

    async fn mark_finished(&self, session_id: &SessionId, result: Option<JobResult>) {
        if let Some(session) = self.sessions.write().await.get_mut(session_id) {
            session.result = result.map(Arc::new);
            session.finished_at = Some(Instant::now());
        }
    }

    /// Start a session for a reference video and a clip library.
    pub async fn submit(&self, reference: PathBuf, clips: Vec<PathBuf>) -> WorkerResult<SessionId> {
        if reference.as_os_str().is_empty() {
            return Err(WorkerError::invalid_input("reference path is required"));
        }

        self.cleanup_finished().await;

        let session_id = SessionId::new();
        let progress = Arc::new(ProgressReporter::new(PROGRESS_CAPACITY));
        let (cancel_tx, cancel_rx) = watch::channel(false);

        self.sessions.write().await.insert(
            session_id.clone(),
            Session {
                progress: Arc::clone(&progress),
                cancel: cancel_tx,
                result: None,
                created_at: Utc::now(),
                finished_at: None,
            },
        );
        counter!(names::SESSIONS_SUBMITTED).increment(1);
        info!(session_id = %session_id, clips = clips.len(), "Session submitted");

        let input = PipelineInput {
            session_id: session_id.clone(),
            reference,
            clips,
        };
        let service = self.clone();
        tokio::spawn(async move {
            service.execute(input, progress, cancel_rx).await;
        });

        Ok(session_id)
    }

    async fn execute(&self, input: PipelineInput, progress: Arc<ProgressReporter>, cancel: watch::Receiver<bool>) {
        let _permit = match Arc::clone(&self.permits).acquire_owned().await {
            Ok(permit) => permit,
            Err(e) => {
                error!(session_id = %input.session_id, error = %e, "Session pool closed");
                self.mark_finished(&input.session_id, None).await;
                progress.fail("service is shutting down");
                return;
            }
        };

        match self.controller.run(&input, &progress, cancel).await {
            Ok(result) => {
                // Stored before the terminal event so a subscriber that sees
                // `complete` can always fetch the result.
                self.mark_finished(&input.session_id, Some(result)).await;
                progress.complete("Edit ready");
                counter!(names::SESSIONS_FINISHED, "outcome" => "complete").increment(1);
            }
            Err(e) => {
                let outcome = if e.is_cancelled() {
                    warn!(session_id = %input.session_id, "Session cancelled");
                    "cancelled"
                } else {
                    error!(session_id = %input.session_id, error = %e, "Session failed");
                    "error"
                };
                self.mark_finished(&input.session_id, None).await;
                progress.fail(e.to_string());
                counter!(names::SESSIONS_FINISHED, "outcome" => outcome).increment(1);
            }
        }
    }

    async fn progress_of(&self, session_id: &SessionId) -> WorkerResult<Arc<ProgressReporter>> {
        self.sessions
            .read()
            .await
            .get(session_id)
            .map(|s| Arc::clone(&s.progress))
            .ok_or_else(|| WorkerError::SessionNotFound(session_id.clone()))
    }

    /// Latest progress event of a session.
    pub async fn status(&self, session_id: &SessionId) -> WorkerResult<ProgressEvent> {
        Ok(self.progress_of(session_id).await?.latest())
    }

    /// Latest event plus a receiver for every later one.
    pub async fn subscribe(
        &self,
        session_id: &SessionId,
    ) -> WorkerResult<(ProgressEvent, broadcast::Receiver<ProgressEvent>)> {
        Ok(self.progress_of(session_id).await?.subscribe())
    }

    pub async fn get_result(&self, session_id: &SessionId) -> WorkerResult<Arc<JobResult>> {
        let sessions = self.sessions.read().await;
        let session = sessions
            .get(session_id)
            .ok_or_else(|| WorkerError::SessionNotFound(session_id.clone()))?;
        session
            .result
            .clone()
            .ok_or_else(|| WorkerError::NotReady(session_id.clone()))
    }

    /// Ask a running session to stop at its next stage boundary.
    ///
    /// Returns false when the session had already finished.
    pub async fn cancel(&self, session_id: &SessionId) -> WorkerResult<bool> {
        let sessions = self.sessions.read().await;
        let session = sessions
            .get(session_id)
            .ok_or_else(|| WorkerError::SessionNotFound(session_id.clone()))?;
        if session.progress.is_finished() {
            return Ok(false);
        }
        session.cancel.send_replace(true);
        info!(session_id = %session_id, "Cancellation requested");
        Ok(true)
    }

    /// Ids and statuses of all known sessions, newest first.
    pub async fn list(&self) -> Vec<(SessionId, JobStatus, DateTime<Utc>)> {
        let sessions = self.sessions.read().await;
        let mut listed: Vec<_> = sessions
            .iter()
            .map(|(id, s)| (id.clone(), s.progress.latest().status, s.created_at))
            .collect();
        listed.sort_by(|a, b| b.2.cmp(&a.2));
        listed
    }
}
