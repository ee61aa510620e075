//! Analysis gateway: credential rotation, retries and structured output
//! handling on top of a [`ReasoningBackend`].

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use metrics::{counter, histogram};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use cutmirror_cache::{Computed, ContentCache};
use cutmirror_models::AudioConfidence;

use crate::backend::{AnalysisRequest, ReasoningBackend, TaskKind};
use crate::config::GatewayConfig;
use crate::credentials::CredentialPool;
use crate::error::{AnalysisError, AnalysisErrorKind, AnalysisResult};
use crate::names;
use crate::structured::{validate, StructuredOutput, Validated};

/// Shortest sleep while waiting for a credential.
const MIN_POOL_WAIT: Duration = Duration::from_millis(10);

/// Where raw responses that failed validation are kept.
#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn record(&self, task: TaskKind, raw: &str);
}

#[async_trait]
impl AuditSink for ContentCache {
    async fn record(&self, task: TaskKind, raw: &str) {
        match self.persist_audit(task.as_str(), raw).await {
            Ok(path) => info!(task = %task, path = %path.display(), "Stored malformed response for audit"),
            Err(e) => warn!(task = %task, error = %e, "Failed to store malformed response"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provenance {
    /// Valid on the first answer
    Valid,
    /// Valid after the corrective retry
    Corrected,
    /// Produced by the caller's deterministic fallback
    Fallback,
}

#[derive(Debug)]
pub struct Analyzed<T> {
    pub value: T,
    pub provenance: Provenance,
    /// Why the fallback was used
    pub failure: Option<AnalysisError>,
}

impl<T> Analyzed<T> {
    fn fresh(value: T, provenance: Provenance) -> Self {
        Self {
            value,
            provenance,
            failure: None,
        }
    }

    fn fallback(value: T, failure: AnalysisError) -> Self {
        Self {
            value,
            provenance: Provenance::Fallback,
            failure: Some(failure),
        }
    }

    pub fn is_fallback(&self) -> bool {
        self.provenance == Provenance::Fallback
    }

    /// Cache view: fallbacks must not be stored.
    pub fn into_computed(self) -> Computed<T> {
        match self.provenance {
            Provenance::Fallback => Computed::Fallback(self.value),
            _ => Computed::Fresh(self.value),
        }
    }
}

pub struct AnalysisGateway {
    backend: Arc<dyn ReasoningBackend>,
    pool: CredentialPool,
    config: GatewayConfig,
    audit: Option<Arc<dyn AuditSink>>,
}

impl AnalysisGateway {
    pub fn new(backend: Arc<dyn ReasoningBackend>, config: GatewayConfig) -> Self {
        let pool = CredentialPool::new(&config.api_keys, config.requests_per_minute);
        Self {
            backend,
            pool,
            config,
            audit: None,
        }
    }

    pub fn with_audit(mut self, audit: Arc<dyn AuditSink>) -> Self {
        self.audit = Some(audit);
        self
    }

    pub fn pool(&self) -> &CredentialPool {
        &self.pool
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    /// Raw text answer for a request.
    ///
    /// Rate-limited credentials are cooled down and the call moves to the
    /// next one. Pool-wide exhaustion is returned as `RateLimited` only once
    /// no credential has freed up within the retry window. Unavailability is
    /// retried with backoff up to the configured attempt count; other
    /// failures return immediately.
    pub async fn call_raw(&self, request: &AnalysisRequest) -> AnalysisResult<String> {
        if self.pool.is_empty() {
            return Err(AnalysisError::unavailable("no reasoning service credentials configured"));
        }

        let task = request.task.as_str();
        let deadline = Instant::now() + self.config.retry_window;
        let mut failures = 0u32;

        loop {
            let lease = match self.pool.try_acquire() {
                Ok(lease) => lease,
                Err(wait) => {
                    let now = Instant::now();
                    if now >= deadline {
                        counter!(names::GATEWAY_CALLS, "task" => task, "outcome" => "pool_exhausted").increment(1);
                        return Err(AnalysisError::rate_limited(format!(
                            "all {} credentials rate limited for {:?}",
                            self.pool.len(),
                            self.config.retry_window
                        )));
                    }
                    let pause = wait.min(deadline - now).max(MIN_POOL_WAIT);
                    debug!(task, wait_ms = pause.as_millis() as u64, "Waiting for a credential");
                    tokio::time::sleep(pause).await;
                    continue;
                }
            };

            let started = Instant::now();
            let result = match tokio::time::timeout(
                self.config.request_timeout,
                self.backend.generate(lease.credential(), request),
            )
            .await
            {
                Ok(result) => result,
                Err(_) => Err(AnalysisError::unavailable(format!(
                    "request timed out after {:?}",
                    self.config.request_timeout
                ))),
            };
            histogram!(names::GATEWAY_LATENCY, "task" => task).record(started.elapsed().as_secs_f64());

            let error = match result {
                Ok(text) => {
                    counter!(names::GATEWAY_CALLS, "task" => task, "outcome" => "ok").increment(1);
                    return Ok(text);
                }
                Err(e) => e,
            };
            counter!(names::GATEWAY_CALLS, "task" => task, "outcome" => error.kind.as_str()).increment(1);

            match error.kind {
                AnalysisErrorKind::RateLimited => {
                    counter!(names::CREDENTIAL_ROTATIONS).increment(1);
                    lease.rate_limited(self.config.rate_limit_cooldown);
                }
                AnalysisErrorKind::Unavailable => {
                    drop(lease);
                    failures += 1;
                    if failures >= self.config.retry.max_attempts {
                        warn!(task, attempts = failures, error = %error, "Reasoning service unavailable");
                        return Err(error);
                    }
                    let delay = self.config.retry.delay_for_attempt(failures);
                    info!(task, attempt = failures, delay_ms = delay.as_millis() as u64, error = %error, "Retrying reasoning call");
                    tokio::time::sleep(delay).await;
                }
                AnalysisErrorKind::Blocked | AnalysisErrorKind::MalformedOutput => return Err(error),
            }
        }
    }

    /// Structured answer of type `T`.
    ///
    /// A malformed answer gets one corrective retry that restates the
    /// schema. If that also fails, the raw text goes to the audit sink and
    /// `fallback` supplies the value. Transport failures, including
    /// `Blocked`, are returned to the caller.
    pub async fn analyze<T, F>(&self, request: &AnalysisRequest, fallback: F) -> AnalysisResult<Analyzed<T>>
    where
        T: StructuredOutput,
        F: FnOnce() -> T,
    {
        Ok(match self.structured::<T>(request).await? {
            Ok(analyzed) => analyzed,
            Err(malformed) => Analyzed::fallback(fallback(), malformed),
        })
    }

    /// Like [`analyze`](Self::analyze) but any failure ends in the fallback.
    pub async fn analyze_or<T, F>(&self, request: &AnalysisRequest, fallback: F) -> Analyzed<T>
    where
        T: StructuredOutput,
        F: FnOnce() -> T,
    {
        match self.structured::<T>(request).await {
            Ok(Ok(analyzed)) => analyzed,
            Ok(Err(malformed)) => Analyzed::fallback(fallback(), malformed),
            Err(e) => {
                warn!(task = %T::TASK, error = %e, "Reasoning call failed, using fallback");
                counter!(names::STRUCTURED_FALLBACKS, "task" => T::TASK.as_str()).increment(1);
                Analyzed::fallback(fallback(), e)
            }
        }
    }

    /// Structured answer for a request carrying a reference with audio.
    ///
    /// When the service blocks the request, `muted` builds the same request
    /// over a muted copy of the media and the analysis is retried once.
    /// The returned confidence is `Inferred` whenever the muted copy was used.
    pub async fn analyze_with_audio_fallback<T, F, M, Fut>(
        &self,
        request: &AnalysisRequest,
        muted: M,
        fallback: F,
    ) -> AnalysisResult<(Analyzed<T>, AudioConfidence)>
    where
        T: StructuredOutput,
        F: FnOnce() -> T,
        M: FnOnce() -> Fut,
        Fut: Future<Output = AnalysisResult<AnalysisRequest>>,
    {
        let (outcome, confidence) = match self.structured::<T>(request).await {
            Ok(outcome) => (outcome, AudioConfidence::Observed),
            Err(e) if e.is(AnalysisErrorKind::Blocked) => {
                info!(task = %T::TASK, reason = %e.message, "Request blocked, retrying with muted audio");
                let muted_request = muted().await?;
                (self.structured::<T>(&muted_request).await?, AudioConfidence::Inferred)
            }
            Err(e) => return Err(e),
        };

        let analyzed = match outcome {
            Ok(analyzed) => analyzed,
            Err(malformed) => Analyzed::fallback(fallback(), malformed),
        };
        Ok((analyzed, confidence))
    }

    /// Validated value, or the final malformed-output error once the
    /// corrective retry has failed too and the raw text has been audited.
    async fn structured<T: StructuredOutput>(
        &self,
        request: &AnalysisRequest,
    ) -> AnalysisResult<Result<Analyzed<T>, AnalysisError>> {
        let reason = match self.attempt::<T>(request).await? {
            Validated::Valid(value) => return Ok(Ok(Analyzed::fresh(value, Provenance::Valid))),
            Validated::Malformed { reason, .. } => reason,
        };
        info!(task = %T::TASK, reason = %reason, "Malformed structured output, sending corrective retry");

        let corrected = request.with_correction(&correction_prompt::<T>(&reason));
        let (reason, raw) = match self.attempt::<T>(&corrected).await? {
            Validated::Valid(value) => return Ok(Ok(Analyzed::fresh(value, Provenance::Corrected))),
            Validated::Malformed { reason, raw } => (reason, raw),
        };

        warn!(task = %T::TASK, reason = %reason, "Structured output still malformed, using fallback");
        counter!(names::STRUCTURED_FALLBACKS, "task" => T::TASK.as_str()).increment(1);
        if let Some(audit) = &self.audit {
            audit.record(T::TASK, &raw).await;
        }
        Ok(Err(AnalysisError::malformed(reason, raw)))
    }

    async fn attempt<T: StructuredOutput>(&self, request: &AnalysisRequest) -> AnalysisResult<Validated<T>> {
        match self.call_raw(request).await {
            Ok(raw) => Ok(validate::<T>(&raw)),
            Err(e) if e.is(AnalysisErrorKind::MalformedOutput) => Ok(Validated::Malformed {
                raw: e.raw.clone().unwrap_or_default(),
                reason: e.message,
            }),
            Err(e) => Err(e),
        }
    }
}

fn correction_prompt<T: StructuredOutput>(reason: &str) -> String {
    format!(
        "Your previous response could not be used: {}.\n\
         Respond again with only a JSON document matching this schema, with every required field present:\n{}",
        reason,
        T::schema_json()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::Credential;
    use crate::retry::RetryConfig;
    use cutmirror_models::{Critique, CritiqueSource};
    use std::collections::VecDeque;
    use std::sync::Mutex;

    struct ScriptedBackend {
        script: Mutex<VecDeque<AnalysisResult<String>>>,
        calls: Mutex<Vec<(String, String)>>,
    }

    impl ScriptedBackend {
        fn new(script: Vec<AnalysisResult<String>>) -> Arc<Self> {
            Arc::new(Self {
                script: Mutex::new(script.into()),
                calls: Mutex::new(Vec::new()),
            })
        }

        fn keys(&self) -> Vec<String> {
            self.calls.lock().unwrap().iter().map(|(k, _)| k.clone()).collect()
        }

        fn prompts(&self) -> Vec<String> {
            self.calls.lock().unwrap().iter().map(|(_, p)| p.clone()).collect()
        }
    }

    #[async_trait]
    impl ReasoningBackend for ScriptedBackend {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn generate(&self, credential: &Credential, request: &AnalysisRequest) -> AnalysisResult<String> {
            self.calls
                .lock()
                .unwrap()
                .push((credential.key().to_string(), request.prompt.clone()));
            self.script
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(AnalysisError::unavailable("script exhausted")))
        }
    }

    #[derive(Default)]
    struct RecordingAudit {
        records: Mutex<Vec<(TaskKind, String)>>,
    }

    #[async_trait]
    impl AuditSink for RecordingAudit {
        async fn record(&self, task: TaskKind, raw: &str) {
            self.records.lock().unwrap().push((task, raw.to_string()));
        }
    }

    fn config(keys: &[&str]) -> GatewayConfig {
        GatewayConfig {
            api_keys: keys.iter().map(|k| k.to_string()).collect(),
            retry: RetryConfig::default()
                .with_max_attempts(3)
                .with_base_delay(Duration::from_millis(1)),
            rate_limit_cooldown: Duration::from_secs(60),
            retry_window: Duration::from_millis(200),
            requests_per_minute: 600,
            ..GatewayConfig::default()
        }
    }

    fn request() -> AnalysisRequest {
        AnalysisRequest::new(TaskKind::Reflection, "review")
    }

    const VALID: &str = r#"{"fidelity_score": 0.8}"#;

    fn local() -> Critique {
        Critique::local(0.5, None)
    }

    #[tokio::test]
    async fn test_rate_limit_rotates_to_next_credential() {
        let backend = ScriptedBackend::new(vec![
            Err(AnalysisError::rate_limited("429")),
            Ok(VALID.to_string()),
        ]);
        let gateway = AnalysisGateway::new(backend.clone(), config(&["a", "b"]));

        let analyzed = gateway.analyze::<Critique, _>(&request(), local).await.unwrap();
        assert_eq!(analyzed.provenance, Provenance::Valid);
        assert_eq!(analyzed.value.source, CritiqueSource::External);
        assert_eq!(backend.keys(), vec!["a", "b"]);
        assert_eq!(gateway.pool().available(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_pool_exhaustion_surfaces_after_retry_window() {
        let backend = ScriptedBackend::new(vec![Err(AnalysisError::rate_limited("429"))]);
        let gateway = AnalysisGateway::new(backend.clone(), config(&["only"]));

        let started = Instant::now();
        let err = gateway.call_raw(&request()).await.unwrap_err();
        assert!(err.is(AnalysisErrorKind::RateLimited));
        assert!(started.elapsed() >= Duration::from_millis(200));
        assert_eq!(backend.keys().len(), 1);
    }

    #[tokio::test]
    async fn test_unavailable_is_retried_with_backoff() {
        let backend = ScriptedBackend::new(vec![
            Err(AnalysisError::unavailable("503")),
            Ok(VALID.to_string()),
        ]);
        let gateway = AnalysisGateway::new(backend.clone(), config(&["a"]));
        assert_eq!(gateway.call_raw(&request()).await.unwrap(), VALID);
    }

    #[tokio::test]
    async fn test_unavailable_gives_up_after_max_attempts() {
        let backend = ScriptedBackend::new(vec![]);
        let gateway = AnalysisGateway::new(backend.clone(), config(&["a"]));
        let err = gateway.call_raw(&request()).await.unwrap_err();
        assert!(err.is(AnalysisErrorKind::Unavailable));
        assert_eq!(backend.keys().len(), 3);
    }

    #[tokio::test]
    async fn test_no_credentials_is_unavailable() {
        let backend = ScriptedBackend::new(vec![Ok(VALID.to_string())]);
        let gateway = AnalysisGateway::new(backend, config(&[]));
        assert!(gateway.call_raw(&request()).await.unwrap_err().is(AnalysisErrorKind::Unavailable));
    }

    #[tokio::test]
    async fn test_corrective_retry_restates_schema() {
        let backend = ScriptedBackend::new(vec![Ok(r#"{"summary": "x"}"#.to_string()), Ok(VALID.to_string())]);
        let gateway = AnalysisGateway::new(backend.clone(), config(&["a"]));

        let analyzed = gateway.analyze::<Critique, _>(&request(), local).await.unwrap();
        assert_eq!(analyzed.provenance, Provenance::Corrected);
        let prompts = backend.prompts();
        assert_eq!(prompts.len(), 2);
        assert!(prompts[1].contains("fidelity_score"));
        assert!(prompts[1].starts_with("review"));
    }

    #[tokio::test]
    async fn test_second_malformed_answer_is_audited_and_falls_back() {
        let backend = ScriptedBackend::new(vec![Ok("nope".to_string()), Ok("still nope".to_string())]);
        let audit = Arc::new(RecordingAudit::default());
        let gateway = AnalysisGateway::new(backend, config(&["a"])).with_audit(audit.clone());

        let analyzed = gateway.analyze::<Critique, _>(&request(), local).await.unwrap();
        assert!(analyzed.is_fallback());
        assert_eq!(analyzed.value.source, CritiqueSource::LocalOnly);
        assert!(matches!(analyzed.into_computed(), Computed::Fallback(_)));

        let records = audit.records.lock().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0], (TaskKind::Reflection, "still nope".to_string()));
    }

    #[tokio::test]
    async fn test_blocked_request_retries_muted() {
        let backend = ScriptedBackend::new(vec![Err(AnalysisError::blocked("SAFETY")), Ok(VALID.to_string())]);
        let gateway = AnalysisGateway::new(backend.clone(), config(&["a"]));

        let (analyzed, confidence) = gateway
            .analyze_with_audio_fallback::<Critique, _, _, _>(
                &request(),
                || async { Ok(AnalysisRequest::new(TaskKind::Reflection, "muted review")) },
                local,
            )
            .await
            .unwrap();

        assert_eq!(analyzed.provenance, Provenance::Valid);
        assert_eq!(confidence, AudioConfidence::Inferred);
        assert_eq!(backend.prompts()[1], "muted review");
    }

    #[tokio::test]
    async fn test_unblocked_request_keeps_observed_audio() {
        let backend = ScriptedBackend::new(vec![Ok(VALID.to_string())]);
        let gateway = AnalysisGateway::new(backend, config(&["a"]));

        let (_, confidence) = gateway
            .analyze_with_audio_fallback::<Critique, _, _, _>(
                &request(),
                || async { Err(AnalysisError::unavailable("should not mute")) },
                local,
            )
            .await
            .unwrap();
        assert_eq!(confidence, AudioConfidence::Observed);
    }

    #[tokio::test]
    async fn test_analyze_or_falls_back_on_transport_failure() {
        let backend = ScriptedBackend::new(vec![Err(AnalysisError::blocked("nope"))]);
        let gateway = AnalysisGateway::new(backend, config(&["a"]));

        let analyzed = gateway.analyze_or::<Critique, _>(&request(), local).await;
        assert!(analyzed.is_fallback());
        assert!(analyzed.failure.unwrap().is(AnalysisErrorKind::Blocked));
    }
}
