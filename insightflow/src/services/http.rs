//! HTTP-backed service adapters.
//!
//! - [`HttpRetrievalService`] posts `{query, top_k, stage}` to a JSON search
//!   endpoint and expects `{"passages": [...]}` back.
//! - [`OpenAiGenerationService`] talks to an OpenAI-compatible
//!   `chat/completions` endpoint.
//!
//! Transport failures are mapped onto the engine's error taxonomy: HTTP 429
//! becomes `RateLimited`, client timeouts become `Timeout`, and everything
//! else (5xx, connection errors, undecodable bodies) becomes `Unavailable`.

use super::{Generation, GenerationRequest, GenerationService, RetrievalService, SearchFilters};
use crate::core::Passage;
use crate::errors::{GenerationError, RetrievalError};
use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

/// Marker a model emits when the context does not support an answer.
pub const INSUFFICIENT_CONTEXT_MARKER: &str = "INSUFFICIENT_CONTEXT";

fn build_client(timeout: Duration) -> Result<Client, String> {
    Client::builder()
        .timeout(timeout)
        .user_agent(concat!("insightflow/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| e.to_string())
}

fn retry_after_ms(response: &Response) -> Option<u64> {
    response
        .headers()
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(|secs| secs.saturating_mul(1000))
}

#[derive(Debug, Serialize)]
struct SearchRequestBody<'a> {
    query: &'a str,
    top_k: usize,
    stage: &'a str,
}

#[derive(Debug, Deserialize)]
struct SearchResponseBody {
    #[serde(default)]
    passages: Vec<Passage>,
}

/// Retrieval over a JSON search endpoint.
#[derive(Debug, Clone)]
pub struct HttpRetrievalService {
    client: Client,
    endpoint: String,
    timeout_ms: u64,
}

impl HttpRetrievalService {
    /// Creates a client for `base_url`, posting to `{base_url}/search`.
    ///
    /// # Errors
    ///
    /// Returns `Unavailable` if the HTTP client cannot be built.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, RetrievalError> {
        let client = build_client(timeout).map_err(RetrievalError::Unavailable)?;
        Ok(Self {
            client,
            endpoint: format!("{}/search", base_url.trim_end_matches('/')),
            timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
        })
    }
}

#[async_trait]
impl RetrievalService for HttpRetrievalService {
    async fn search(
        &self,
        query: &str,
        filters: &SearchFilters,
    ) -> Result<Vec<Passage>, RetrievalError> {
        let body = SearchRequestBody {
            query,
            top_k: filters.top_k,
            stage: filters.stage.as_str(),
        };

        let response = self
            .client
            .post(&self.endpoint)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    RetrievalError::Timeout {
                        after_ms: self.timeout_ms,
                    }
                } else {
                    RetrievalError::Unavailable(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            warn!(%status, stage = %filters.stage, "Retrieval request rejected");
            return Err(RetrievalError::Unavailable(format!("HTTP {status}")));
        }

        let parsed: SearchResponseBody = response
            .json()
            .await
            .map_err(|e| RetrievalError::Unavailable(format!("invalid response body: {e}")))?;

        debug!(
            stage = %filters.stage,
            passages = parsed.passages.len(),
            "Retrieval completed"
        );
        let mut passages = parsed.passages;
        passages.truncate(filters.top_k);
        Ok(passages)
    }
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ChatRequestBody<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct ChatResponseBody {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Generation over an OpenAI-compatible chat-completions API.
#[derive(Clone)]
pub struct OpenAiGenerationService {
    client: Client,
    endpoint: String,
    api_key: Option<String>,
    timeout_ms: u64,
}

impl std::fmt::Debug for OpenAiGenerationService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiGenerationService")
            .field("endpoint", &self.endpoint)
            .field("has_api_key", &self.api_key.is_some())
            .finish()
    }
}

impl OpenAiGenerationService {
    /// Creates a client for `base_url`, posting to `{base_url}/chat/completions`.
    ///
    /// # Errors
    ///
    /// Returns `Unavailable` if the HTTP client cannot be built.
    pub fn new(
        base_url: &str,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Result<Self, GenerationError> {
        let client = build_client(timeout).map_err(GenerationError::Unavailable)?;
        Ok(Self {
            client,
            endpoint: format!("{}/chat/completions", base_url.trim_end_matches('/')),
            api_key,
            timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
        })
    }
}

#[async_trait]
impl GenerationService for OpenAiGenerationService {
    async fn generate(&self, request: &GenerationRequest) -> Result<Generation, GenerationError> {
        let body = ChatRequestBody {
            model: &request.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: &request.prompt.system,
                },
                ChatMessage {
                    role: "user",
                    content: &request.prompt.user,
                },
            ],
            temperature: request.temperature,
            max_tokens: request.max_tokens,
        };

        let mut builder = self.client.post(&self.endpoint).json(&body);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                GenerationError::Timeout {
                    after_ms: self.timeout_ms,
                }
            } else {
                GenerationError::Unavailable(e.to_string())
            }
        })?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(GenerationError::RateLimited {
                retry_after_ms: retry_after_ms(&response),
            });
        }
        if !status.is_success() {
            warn!(%status, stage = %request.stage, "Generation request rejected");
            return Err(GenerationError::Unavailable(format!("HTTP {status}")));
        }

        let parsed: ChatResponseBody = response
            .json()
            .await
            .map_err(|e| GenerationError::Unavailable(format!("invalid response body: {e}")))?;

        let text = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| GenerationError::Unavailable("empty completion".to_string()))?;

        Ok(interpret_completion(text))
    }
}

/// Turns raw completion text into a [`Generation`], honouring the
/// insufficient-context marker.
#[must_use]
pub fn interpret_completion(text: String) -> Generation {
    if text.contains(INSUFFICIENT_CONTEXT_MARKER) {
        Generation::ungrounded(text.replace(INSUFFICIENT_CONTEXT_MARKER, "").trim().to_string())
    } else {
        Generation::grounded(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interpret_completion_marker() {
        let generation = interpret_completion("INSUFFICIENT_CONTEXT\nNothing relevant.".to_string());
        assert!(!generation.grounded);
        assert_eq!(generation.text, "Nothing relevant.");

        let generation = interpret_completion("- finding [cite:p1]".to_string());
        assert!(generation.grounded);
    }

    #[test]
    fn test_endpoints_are_normalized() {
        let retrieval =
            HttpRetrievalService::new("http://localhost:8080/", Duration::from_secs(1)).unwrap();
        assert_eq!(retrieval.endpoint, "http://localhost:8080/search");

        let generation =
            OpenAiGenerationService::new("http://localhost:8000/v1", None, Duration::from_secs(1))
                .unwrap();
        assert_eq!(generation.endpoint, "http://localhost:8000/v1/chat/completions");
    }

    #[test]
    fn test_search_response_tolerates_missing_passages() {
        let parsed: SearchResponseBody = serde_json::from_str("{}").unwrap();
        assert!(parsed.passages.is_empty());
    }

    #[tokio::test]
    async fn test_unreachable_retrieval_is_unavailable() {
        let retrieval =
            HttpRetrievalService::new("http://127.0.0.1:9", Duration::from_secs(2)).unwrap();
        let err = retrieval
            .search("q", &SearchFilters::new(crate::core::StageRole::Researcher, 3))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            RetrievalError::Unavailable(_) | RetrievalError::Timeout { .. }
        ));
    }
}
