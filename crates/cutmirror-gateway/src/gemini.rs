//! Gemini `generateContent` backend.

use async_trait::async_trait;
use base64::Engine;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::backend::{AnalysisRequest, MediaAttachment, ReasoningBackend};
use crate::config::GatewayConfig;
use crate::credentials::Credential;
use crate::error::{AnalysisError, AnalysisResult};

/// Finish reasons that mean the service refused the content.
const SAFETY_FINISH_REASONS: &[&str] = &["SAFETY", "PROHIBITED_CONTENT", "BLOCKLIST", "SPII", "IMAGE_SAFETY"];

pub struct GeminiBackend {
    client: Client,
    base_url: String,
    model: String,
    max_inline_bytes: u64,
}

#[derive(Debug, Serialize)]
struct GenerateRequest {
    contents: Vec<Content>,
    #[serde(rename = "generationConfig")]
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct Content {
    role: &'static str,
    parts: Vec<Part>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum Part {
    Text {
        text: String,
    },
    Inline {
        #[serde(rename = "inlineData")]
        inline_data: InlineData,
    },
}

#[derive(Debug, Serialize)]
struct InlineData {
    #[serde(rename = "mimeType")]
    mime_type: String,
    data: String,
}

#[derive(Debug, Serialize)]
struct GenerationConfig {
    #[serde(rename = "responseMimeType")]
    response_mime_type: &'static str,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(rename = "promptFeedback")]
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
struct PromptFeedback {
    #[serde(rename = "blockReason")]
    block_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<ResponseContent>,
    #[serde(rename = "finishReason")]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ResponseContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    text: Option<String>,
}

impl GeminiBackend {
    pub fn new(config: &GatewayConfig) -> AnalysisResult<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| AnalysisError::unavailable(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            max_inline_bytes: config.max_inline_bytes,
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/models/{}:generateContent", self.base_url, self.model)
    }

    async fn inline_part(&self, media: &MediaAttachment) -> AnalysisResult<Part> {
        let meta = tokio::fs::metadata(&media.path)
            .await
            .map_err(|e| AnalysisError::unavailable(format!("cannot read {}: {}", media.path.display(), e)))?;
        if meta.len() > self.max_inline_bytes {
            return Err(AnalysisError::unavailable(format!(
                "{} is {} bytes, above the {} byte inline limit",
                media.path.display(),
                meta.len(),
                self.max_inline_bytes
            )));
        }
        let bytes = tokio::fs::read(&media.path)
            .await
            .map_err(|e| AnalysisError::unavailable(format!("cannot read {}: {}", media.path.display(), e)))?;
        Ok(Part::Inline {
            inline_data: InlineData {
                mime_type: media.mime_type.clone(),
                data: base64::engine::general_purpose::STANDARD.encode(bytes),
            },
        })
    }
}

#[async_trait]
impl ReasoningBackend for GeminiBackend {
    fn name(&self) -> &str {
        "gemini"
    }

    async fn generate(&self, credential: &Credential, request: &AnalysisRequest) -> AnalysisResult<String> {
        let mut parts = Vec::with_capacity(request.media.len() + 1);
        for media in &request.media {
            parts.push(self.inline_part(media).await?);
        }
        parts.push(Part::Text {
            text: request.prompt.clone(),
        });

        let body = GenerateRequest {
            contents: vec![Content { role: "user", parts }],
            generation_config: GenerationConfig {
                response_mime_type: "application/json",
            },
        };

        debug!(task = %request.task, model = %self.model, credential = %credential.label(), "Calling reasoning service");

        let response = self
            .client
            .post(self.endpoint())
            .query(&[("key", credential.key())])
            .json(&body)
            .send()
            .await
            .map_err(|e| AnalysisError::unavailable(format!("request failed: {}", e.without_url())))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| AnalysisError::unavailable(format!("failed to read response: {}", e.without_url())))?;

        if !status.is_success() {
            return Err(map_status(status, text));
        }

        extract_text(&text)
    }
}

fn map_status(status: StatusCode, body: String) -> AnalysisError {
    let message = format!("reasoning service returned {}", status);
    let mut error = if status == StatusCode::TOO_MANY_REQUESTS {
        AnalysisError::rate_limited(message)
    } else {
        if status.is_client_error() {
            warn!(status = %status, "Reasoning service rejected request");
        }
        AnalysisError::unavailable(message)
    };
    error.raw = Some(body);
    error
}

fn extract_text(body: &str) -> AnalysisResult<String> {
    let response: GenerateResponse = serde_json::from_str(body)
        .map_err(|e| AnalysisError::malformed(format!("unexpected response envelope: {}", e), body))?;

    if let Some(reason) = response.prompt_feedback.and_then(|f| f.block_reason) {
        return Err(AnalysisError::blocked(format!("prompt blocked: {}", reason)));
    }

    let Some(candidate) = response.candidates.into_iter().next() else {
        return Err(AnalysisError::malformed("response has no candidates", body));
    };

    if let Some(reason) = candidate.finish_reason.as_deref() {
        if SAFETY_FINISH_REASONS.contains(&reason) {
            return Err(AnalysisError::blocked(format!("generation stopped: {}", reason)));
        }
    }

    let text: String = candidate
        .content
        .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
        .unwrap_or_default();

    if text.trim().is_empty() {
        return Err(AnalysisError::malformed("response has no text", body));
    }
    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::TaskKind;
    use crate::credentials::CredentialPool;
    use crate::error::AnalysisErrorKind;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn backend(server: &MockServer) -> GeminiBackend {
        let config = GatewayConfig {
            base_url: server.uri(),
            model: "test-model".to_string(),
            ..GatewayConfig::default()
        };
        GeminiBackend::new(&config).unwrap()
    }

    async fn call(server: &MockServer) -> AnalysisResult<String> {
        let pool = CredentialPool::new(&["k1".to_string()], 60);
        let lease = pool.try_acquire().unwrap();
        let request = AnalysisRequest::new(TaskKind::Reflection, "review this");
        backend(server).generate(lease.credential(), &request).await
    }

    #[tokio::test]
    async fn test_success_extracts_text() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/models/test-model:generateContent"))
            .and(query_param("key", "k1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "candidates": [{
                    "content": {"parts": [{"text": "{\"fidelity_score\":"}, {"text": " 0.9}"}]},
                    "finishReason": "STOP"
                }]
            })))
            .mount(&server)
            .await;

        assert_eq!(call(&server).await.unwrap(), "{\"fidelity_score\": 0.9}");
    }

    #[tokio::test]
    async fn test_429_is_rate_limited() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429).set_body_string("quota"))
            .mount(&server)
            .await;

        let err = call(&server).await.unwrap_err();
        assert!(err.is(AnalysisErrorKind::RateLimited));
        assert_eq!(err.raw.as_deref(), Some("quota"));
    }

    #[tokio::test]
    async fn test_server_error_is_unavailable() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        assert!(call(&server).await.unwrap_err().is(AnalysisErrorKind::Unavailable));
    }

    #[tokio::test]
    async fn test_safety_finish_is_blocked() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "candidates": [{"finishReason": "SAFETY"}]
            })))
            .mount(&server)
            .await;

        assert!(call(&server).await.unwrap_err().is(AnalysisErrorKind::Blocked));
    }

    #[test]
    fn test_prompt_block_reason_is_blocked() {
        let err = extract_text(r#"{"promptFeedback": {"blockReason": "OTHER"}}"#).unwrap_err();
        assert!(err.is(AnalysisErrorKind::Blocked));
    }

    #[test]
    fn test_missing_text_is_malformed() {
        let err = extract_text(r#"{"candidates": [{"content": {"parts": []}, "finishReason": "STOP"}]}"#)
            .unwrap_err();
        assert!(err.is(AnalysisErrorKind::MalformedOutput));
        assert!(err.raw.is_some());
    }
}
