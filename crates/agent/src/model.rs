// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Model client seam: a streaming text-completion call.
//!
//! One HTTP implementation speaking server-sent events; a scriptable fake
//! behind `test-support`.

use async_trait::async_trait;
use futures_util::stream::{Stream, StreamExt};
use std::pin::Pin;
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ModelError {
    #[error("model request failed: {0}")]
    Http(String),
    #[error("model stream broke: {0}")]
    Stream(String),
    #[error("model protocol error: {0}")]
    Protocol(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelMessage {
    pub role: String,
    pub content: String,
}

impl ModelMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self { role: "user".to_string(), content: content.into() }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: "assistant".to_string(), content: content.into() }
    }
}

#[derive(Debug, Clone)]
pub struct ModelRequest {
    pub system: String,
    pub messages: Vec<ModelMessage>,
    pub model_id: String,
    pub max_tokens: u32,
}

/// Text chunks as they stream in.
pub type ChunkStream = Pin<Box<dyn Stream<Item = Result<String, ModelError>> + Send>>;

#[async_trait]
pub trait ModelClient: Send + Sync + 'static {
    async fn stream(&self, request: ModelRequest) -> Result<ChunkStream, ModelError>;
}

/// SSE client against a messages-style completion API.
pub struct HttpModelClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl HttpModelClient {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        }
    }

    pub fn from_config(config: &sb_core::config::ModelConfig) -> Self {
        Self::new(&config.base_url, &config.api_key)
    }
}

#[async_trait]
impl ModelClient for HttpModelClient {
    async fn stream(&self, request: ModelRequest) -> Result<ChunkStream, ModelError> {
        let body = serde_json::json!({
            "model": request.model_id,
            "max_tokens": request.max_tokens,
            "stream": true,
            "system": request.system,
            "messages": request.messages.iter().map(|m| {
                serde_json::json!({ "role": m.role, "content": m.content })
            }).collect::<Vec<_>>(),
        });

        let response = self
            .client
            .post(format!("{}/v1/messages", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01")
            .json(&body)
            .send()
            .await
            .map_err(|e| ModelError::Http(e.to_string()))?;

        let status = response.status().as_u16();
        if !(200..300).contains(&status) {
            let body = response.text().await.unwrap_or_default();
            return Err(ModelError::Http(format!(
                "status {status}: {}",
                sb_core::short(&body, 200)
            )));
        }

        let bytes = response.bytes_stream();
        let chunks = bytes
            .map(|result| result.map_err(|e| ModelError::Stream(e.to_string())))
            .scan(SseParser::default(), |parser, result| {
                let out = match result {
                    Ok(bytes) => Ok(parser.push(&bytes)),
                    Err(e) => Err(e),
                };
                std::future::ready(Some(out))
            })
            .flat_map(|result| match result {
                Ok(texts) => {
                    futures_util::stream::iter(texts.into_iter().map(Ok).collect::<Vec<_>>())
                }
                Err(e) => futures_util::stream::iter(vec![Err(e)]),
            });

        Ok(Box::pin(chunks))
    }
}

/// Incremental server-sent-events parser. Only `data:` lines carrying
/// `content_block_delta` text are surfaced; everything else is protocol
/// chatter.
#[derive(Default)]
struct SseParser {
    buffer: String,
}

impl SseParser {
    fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        self.buffer.push_str(&String::from_utf8_lossy(bytes));
        let mut texts = Vec::new();

        while let Some(newline) = self.buffer.find('\n') {
            let line: String = self.buffer.drain(..=newline).collect();
            let line = line.trim_end();
            let Some(data) = line.strip_prefix("data:") else {
                continue;
            };
            let data = data.trim_start();
            if data == "[DONE]" {
                continue;
            }
            if let Some(text) = delta_text(data) {
                texts.push(text);
            }
        }
        texts
    }
}

fn delta_text(data: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(data).ok()?;
    if value.get("type")?.as_str()? != "content_block_delta" {
        return None;
    }
    value
        .get("delta")?
        .get("text")
        .and_then(|t| t.as_str())
        .map(str::to_string)
}

#[cfg(any(test, feature = "test-support"))]
pub use fake::FakeModel;

#[cfg(any(test, feature = "test-support"))]
mod fake {
    use super::*;
    use parking_lot::Mutex;
    use std::collections::VecDeque;
    use std::sync::Arc;

    /// One scripted model response: its chunks, and whether the stream hangs
    /// open after them (for cancellation tests).
    #[derive(Debug, Clone, Default)]
    pub struct ScriptedResponse {
        pub chunks: Vec<String>,
        pub hang_after: bool,
    }

    #[derive(Default)]
    struct FakeModelState {
        responses: VecDeque<ScriptedResponse>,
        requests: Vec<ModelRequest>,
    }

    /// Scriptable in-process model. Responses are consumed in order; with
    /// none left, the stream errors.
    #[derive(Clone, Default)]
    pub struct FakeModel {
        state: Arc<Mutex<FakeModelState>>,
    }

    impl FakeModel {
        pub fn new() -> Self {
            Self::default()
        }

        /// Queue a response delivered as one chunk.
        pub fn push_response(&self, text: &str) {
            self.push_chunks(vec![text.to_string()]);
        }

        pub fn push_chunks(&self, chunks: Vec<String>) {
            self.state
                .lock()
                .responses
                .push_back(ScriptedResponse { chunks, hang_after: false });
        }

        /// Queue chunks followed by a stream that never completes.
        pub fn push_hanging(&self, chunks: Vec<String>) {
            self.state
                .lock()
                .responses
                .push_back(ScriptedResponse { chunks, hang_after: true });
        }

        /// Requests seen so far, for assertions on prompt assembly.
        pub fn requests(&self) -> Vec<ModelRequest> {
            self.state.lock().requests.clone()
        }
    }

    #[async_trait]
    impl ModelClient for FakeModel {
        async fn stream(&self, request: ModelRequest) -> Result<ChunkStream, ModelError> {
            let scripted = {
                let mut state = self.state.lock();
                state.requests.push(request);
                state.responses.pop_front()
            };
            let Some(scripted) = scripted else {
                return Err(ModelError::Http("no scripted response".to_string()));
            };

            let head = futures_util::stream::iter(
                scripted.chunks.into_iter().map(Ok).collect::<Vec<_>>(),
            );
            if scripted.hang_after {
                Ok(Box::pin(head.chain(futures_util::stream::pending())))
            } else {
                Ok(Box::pin(head))
            }
        }
    }
}

#[cfg(test)]
#[path = "model_tests.rs"]
mod tests;
