//! External Analysis Gateway.
//!
//! Wraps calls to a multimodal reasoning service:
//! - a pool of credentials rotated on rate limiting ([`credentials`])
//! - per-call timeouts and bounded, backed-off retries ([`retry`])
//! - required-field validation before decoding, one corrective retry and a
//!   caller-supplied deterministic fallback ([`structured`])
//! - a muted-audio retry when the service blocks a reference on its audio
//!
//! The HTTP backend is behind [`ReasoningBackend`] so tests and other
//! providers can be swapped in.

pub mod backend;
pub mod config;
pub mod credentials;
pub mod error;
pub mod gateway;
pub mod gemini;
pub mod retry;
pub mod structured;
pub mod tasks;

pub use backend::{AnalysisRequest, MediaAttachment, ReasoningBackend, TaskKind};
pub use config::GatewayConfig;
pub use credentials::{Credential, CredentialLease, CredentialPool};
pub use error::{AnalysisError, AnalysisErrorKind, AnalysisResult};
pub use gateway::{AnalysisGateway, Analyzed, AuditSink, Provenance};
pub use gemini::GeminiBackend;
pub use retry::RetryConfig;
pub use structured::{strip_code_fences, validate, StructuredOutput, Validated};
pub use tasks::ClipAssessment;

/// Metric names emitted by the gateway.
pub mod names {
    pub const GATEWAY_CALLS: &str = "cutmirror_gateway_calls_total";
    pub const GATEWAY_LATENCY: &str = "cutmirror_gateway_call_duration_seconds";
    pub const CREDENTIAL_ROTATIONS: &str = "cutmirror_credential_rotations_total";
    pub const STRUCTURED_FALLBACKS: &str = "cutmirror_structured_fallbacks_total";
}
