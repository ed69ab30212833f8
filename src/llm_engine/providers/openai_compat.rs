//! OpenAI-compatible chat-completion provider
//!
//! Posts the conversation with `stream: true` and hands the raw SSE body to
//! [`ChatStream`]. Works with any endpoint speaking the chat-completions
//! wire format (Moonshot, Zhipu, OpenAI and friends).

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::{header, Client, StatusCode};
use tokio::sync::Mutex;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::database::models::ApiEndpoint;
use crate::llm_engine::provider::{
    ByteStream, ChatCompletionRequest, ChatError, ChatMessage, ChatProvider,
};
use crate::llm_engine::stream::ChatStream;

/// Longest error body excerpt kept in a transport error
const ERROR_BODY_LIMIT: usize = 200;

/// OpenAI-compatible provider configuration
#[derive(Debug, Clone)]
pub struct OpenAiCompatConfig {
    /// Longest wait for response headers or for the next body chunk.
    /// 0 disables it. Long answers that keep streaming never hit it.
    pub idle_timeout_secs: u64,
    pub connect_timeout_secs: u64,
}

impl Default for OpenAiCompatConfig {
    fn default() -> Self {
        Self {
            idle_timeout_secs: 120,
            connect_timeout_secs: 10,
        }
    }
}

/// Streaming provider for OpenAI-compatible endpoints
pub struct OpenAiCompatProvider {
    client: Client,
    idle_timeout: Option<Duration>,
    /// Earliest time the next request to each URL may start
    next_slot: Mutex<HashMap<String, Instant>>,
}

impl OpenAiCompatProvider {
    pub fn new(config: OpenAiCompatConfig) -> Result<Self, ChatError> {
        // Connect timeout only; the idle limit is applied per read
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .build()
            .map_err(|e| ChatError::transport(format!("Failed to create HTTP client: {}", e)))?;

        let idle_timeout = (config.idle_timeout_secs > 0)
            .then(|| Duration::from_secs(config.idle_timeout_secs));

        Ok(Self {
            client,
            idle_timeout,
            next_slot: Mutex::new(HashMap::new()),
        })
    }

    pub fn with_default_config() -> Result<Self, ChatError> {
        Self::new(OpenAiCompatConfig::default())
    }

    /// Wait until the endpoint's minimum request interval has passed.
    /// The slot is claimed only once the wait is over, so a cancelled wait
    /// does not delay the next request.
    async fn pace(&self, endpoint: &ApiEndpoint, cancel: &CancellationToken) -> Result<(), ChatError> {
        let interval = endpoint.policy.min_request_interval_ms;
        if interval == 0 {
            return Ok(());
        }

        loop {
            let start_at = {
                let mut slots = self.next_slot.lock().await;
                let now = Instant::now();
                match slots.get(&endpoint.url) {
                    Some(slot) if *slot > now => *slot,
                    _ => {
                        slots.insert(endpoint.url.clone(), now + Duration::from_millis(interval));
                        return Ok(());
                    }
                }
            };

            log::debug!(
                "[{}] Pacing request, waiting {:?}",
                endpoint.label(),
                start_at.saturating_duration_since(Instant::now())
            );
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(ChatError::Aborted),
                _ = tokio::time::sleep_until(start_at) => {}
            }
        }
    }

    async fn await_response(
        &self,
        request: impl std::future::Future<Output = reqwest::Result<reqwest::Response>>,
    ) -> Result<reqwest::Response, ChatError> {
        let result = match self.idle_timeout {
            Some(limit) => tokio::time::timeout(limit, request).await.map_err(|_| {
                ChatError::transport(format!("No response within {:?}", limit))
            })?,
            None => request.await,
        };
        result.map_err(|e| ChatError::transport(e.to_string()))
    }
}

fn excerpt(text: &str) -> String {
    let trimmed = text.trim();
    match trimmed.char_indices().nth(ERROR_BODY_LIMIT) {
        Some((cut, _)) => format!("{}...", &trimmed[..cut]),
        None => trimmed.to_string(),
    }
}

#[async_trait]
impl ChatProvider for OpenAiCompatProvider {
    fn provider_name(&self) -> &'static str {
        "openai-compatible"
    }

    async fn open_stream(
        &self,
        endpoint: &ApiEndpoint,
        messages: &[ChatMessage],
        cancel: CancellationToken,
    ) -> Result<ChatStream, ChatError> {
        if let Some(missing) = endpoint.missing_field() {
            return Err(ChatError::Configuration {
                endpoint: endpoint.label().to_string(),
                missing,
            });
        }

        self.pace(endpoint, &cancel).await?;

        let model = endpoint.effective_model();
        let body = ChatCompletionRequest::streaming(model, messages);
        crate::stream_trace!(
            endpoint.label(),
            "POST {} model={} messages={}",
            endpoint.url,
            model,
            messages.len()
        );

        let request = self
            .client
            .post(endpoint.url.trim())
            .bearer_auth(endpoint.key.trim())
            .header(header::ACCEPT, "text/event-stream")
            .json(&body)
            .send();

        let response = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                log::info!("[{}] Request cancelled before response", endpoint.label());
                return Err(ChatError::Aborted);
            }
            result = self.await_response(request) => result?,
        };

        let status = response.status();
        if !status.is_success() {
            let error_text = match self.idle_timeout {
                Some(limit) => tokio::time::timeout(limit, response.text()).await.ok().and_then(|r| r.ok()),
                None => response.text().await.ok(),
            }
            .unwrap_or_default();
            log::error!("[{}] HTTP error {}: {}", endpoint.label(), status, excerpt(&error_text));
            return Err(ChatError::http_status(status.as_u16(), excerpt(&error_text)));
        }

        if status == StatusCode::NO_CONTENT || response.content_length() == Some(0) {
            log::error!("[{}] Response has no body (status {})", endpoint.label(), status);
            return Err(ChatError::http_status(status.as_u16(), "response has no body"));
        }

        log::info!(
            "[{}] Streaming {} via {} ({} messages)",
            endpoint.label(),
            model,
            self.provider_name(),
            messages.len()
        );

        let body: ByteStream = Box::pin(
            response
                .bytes_stream()
                .map(|chunk| chunk.map_err(|e| ChatError::transport(format!("Stream error: {}", e)))),
        );

        let stream = ChatStream::new(endpoint.label(), body, cancel);
        Ok(match self.idle_timeout {
            Some(limit) => stream.with_idle_timeout(limit),
            None => stream,
        })
    }
}
