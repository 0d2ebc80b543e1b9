//! Ollama HTTP backend
//!
//! `POST {base_url}/api/generate`. Streaming responses are newline-delimited
//! JSON objects carrying a `response` fragment and a `done` flag.

use crate::backend::{
    generation_channel, BackendError, GenerationBackend, GenerationRequest, GenerationSink,
    GenerationStream,
};
use async_trait::async_trait;
use futures::StreamExt;
use minimind_core::config::BackendConfig;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

#[derive(Debug, Clone, Serialize)]
struct Options {
    temperature: f32,
    num_ctx: u32,
    repeat_penalty: f32,
    stop: Vec<String>,
}

#[derive(Debug, Serialize)]
struct GenerateBody<'a> {
    model: &'a str,
    prompt: &'a str,
    system: &'a str,
    stream: bool,
    options: &'a Options,
}

#[derive(Debug, Deserialize)]
struct GenerateLine {
    #[serde(default)]
    response: String,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Clone)]
pub struct OllamaBackend {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    options: Options,
}

impl OllamaBackend {
    pub fn new(config: &BackendConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: format!("{}/api/generate", config.base_url.trim_end_matches('/')),
            model: config.model.clone(),
            options: Options {
                temperature: config.temperature,
                num_ctx: config.context_tokens,
                repeat_penalty: config.repeat_penalty,
                stop: config.stop_tokens.clone(),
            },
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn send(
        &self,
        request: &GenerationRequest,
        stream: bool,
    ) -> Result<reqwest::Response, BackendError> {
        let body = GenerateBody {
            model: &self.model,
            prompt: &request.prompt,
            system: &request.system,
            stream,
            options: &self.options,
        };
        let response = self
            .client
            .post(&self.endpoint)
            .json(&body)
            .send()
            .await
            .map_err(|err| BackendError::Http(err.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(BackendError::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }

    #[instrument(skip_all, fields(request = %request.id, model = %self.model))]
    async fn stream_into(self, request: GenerationRequest, mut sink: GenerationSink) {
        let response = tokio::select! {
            _ = sink.cancelled() => {
                debug!("cancelled before the backend answered");
                return;
            }
            response = self.send(&request, true) => response,
        };
        let response = match response {
            Ok(response) => response,
            Err(err) => {
                warn!(error = %err, "generation request failed");
                sink.fail(err);
                return;
            }
        };

        let mut body = response.bytes_stream();
        let mut pending: Vec<u8> = Vec::new();
        loop {
            let next = tokio::select! {
                _ = sink.cancelled() => {
                    debug!(received = sink.text().len(), "generation cancelled");
                    return;
                }
                next = body.next() => next,
            };
            let bytes = match next {
                Some(Ok(bytes)) => bytes,
                Some(Err(err)) => {
                    sink.fail(BackendError::Http(err.to_string()));
                    return;
                }
                None => {
                    sink.fail(BackendError::Disconnected);
                    return;
                }
            };
            pending.extend_from_slice(&bytes);

            while let Some(newline) = pending.iter().position(|b| *b == b'\n') {
                let line: Vec<u8> = pending.drain(..=newline).collect();
                let line = String::from_utf8_lossy(&line);
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                let parsed: GenerateLine = match serde_json::from_str(line) {
                    Ok(parsed) => parsed,
                    Err(err) => {
                        sink.fail(BackendError::Decode(err.to_string()));
                        return;
                    }
                };
                if let Some(error) = parsed.error {
                    sink.fail(BackendError::Decode(error));
                    return;
                }
                if !parsed.response.is_empty() && !sink.chunk(&parsed.response) {
                    debug!("consumer stopped listening");
                    return;
                }
                if parsed.done {
                    debug!(received = sink.text().len(), "generation complete");
                    sink.complete();
                    return;
                }
            }
        }
    }
}

#[async_trait]
impl GenerationBackend for OllamaBackend {
    fn name(&self) -> &str {
        "ollama"
    }

    fn generate_streaming(&self, request: GenerationRequest) -> GenerationStream {
        let (sink, stream) = generation_channel(request.id);
        tokio::spawn(self.clone().stream_into(request, sink));
        stream
    }

    async fn complete(&self, request: GenerationRequest) -> Result<String, BackendError> {
        let response = self.send(&request, false).await?;
        let parsed: GenerateLine = response
            .json()
            .await
            .map_err(|err| BackendError::Decode(err.to_string()))?;
        match parsed.error {
            Some(error) => Err(BackendError::Decode(error)),
            None => Ok(parsed.response),
        }
    }
}
