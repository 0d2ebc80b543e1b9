//! Scripted backend
//!
//! Replays canned generations step by step. Used by the offline demo and by
//! tests that need exact control over chunk boundaries, failures and
//! backends that never finish.

use crate::backend::{
    generation_channel, BackendError, GenerationBackend, GenerationRequest, GenerationSink,
    GenerationStream,
};
use async_trait::async_trait;
use minimind_core::config::BackendConfig;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tracing::debug;

/// Chunk size used when splitting configured script text
const CONFIG_CHUNK_CHARS: usize = 12;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptStep {
    Chunk(String),
    Delay(Duration),
    Complete,
    Fail(String),
    /// Stop producing but honour cancellation
    Hang,
    /// Stop producing and ignore cancellation entirely
    Stall,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Script {
    steps: Vec<ScriptStep>,
}

impl Script {
    pub fn new() -> Self {
        Self::default()
    }

    /// Split `text` into chunks of `chunk_chars` characters, then complete
    pub fn from_text(text: &str, chunk_chars: usize) -> Self {
        let chars: Vec<char> = text.chars().collect();
        let mut script = Self::new();
        for piece in chars.chunks(chunk_chars.max(1)) {
            script = script.chunk(piece.iter().collect::<String>());
        }
        script.complete()
    }

    pub fn chunk(mut self, text: impl Into<String>) -> Self {
        self.steps.push(ScriptStep::Chunk(text.into()));
        self
    }

    pub fn delay(mut self, duration: Duration) -> Self {
        self.steps.push(ScriptStep::Delay(duration));
        self
    }

    pub fn complete(mut self) -> Self {
        self.steps.push(ScriptStep::Complete);
        self
    }

    pub fn fail(mut self, message: impl Into<String>) -> Self {
        self.steps.push(ScriptStep::Fail(message.into()));
        self
    }

    pub fn hang(mut self) -> Self {
        self.steps.push(ScriptStep::Hang);
        self
    }

    pub fn stall(mut self) -> Self {
        self.steps.push(ScriptStep::Stall);
        self
    }

    pub fn steps(&self) -> &[ScriptStep] {
        &self.steps
    }

    fn text(&self) -> String {
        self.steps
            .iter()
            .filter_map(|step| match step {
                ScriptStep::Chunk(text) => Some(text.as_str()),
                _ => None,
            })
            .collect()
    }
}

/// Backend replaying its scripts round-robin, one per request
#[derive(Debug, Default)]
pub struct ScriptedBackend {
    scripts: Vec<Script>,
    cursor: AtomicUsize,
    requests: Mutex<Vec<GenerationRequest>>,
}

impl ScriptedBackend {
    pub fn new(scripts: Vec<Script>) -> Self {
        Self {
            scripts,
            cursor: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// One script per configured response text
    pub fn from_config(config: &BackendConfig) -> Self {
        Self::new(
            config
                .script
                .iter()
                .map(|text| Script::from_text(text, CONFIG_CHUNK_CHARS))
                .collect(),
        )
    }

    /// Every request received so far
    pub fn requests(&self) -> Vec<GenerationRequest> {
        self.requests.lock().clone()
    }

    fn next_script(&self, request: &GenerationRequest) -> Option<Script> {
        self.requests.lock().push(request.clone());
        if self.scripts.is_empty() {
            return None;
        }
        let index = self.cursor.fetch_add(1, Ordering::SeqCst) % self.scripts.len();
        Some(self.scripts[index].clone())
    }
}

async fn play(script: Script, mut sink: GenerationSink) {
    for step in script.steps {
        match step {
            ScriptStep::Chunk(text) => {
                if !sink.chunk(&text) {
                    debug!("script stopped by cancellation");
                    return;
                }
            }
            ScriptStep::Delay(duration) => {
                tokio::select! {
                    _ = sink.cancelled() => return,
                    _ = tokio::time::sleep(duration) => {}
                }
            }
            ScriptStep::Complete => {
                sink.complete();
                return;
            }
            ScriptStep::Fail(message) => {
                sink.fail(BackendError::Scripted(message));
                return;
            }
            ScriptStep::Hang => {
                sink.cancelled().await;
                return;
            }
            ScriptStep::Stall => {
                std::future::pending::<()>().await;
            }
        }
    }
    // out of steps: the sink drops without a terminal event
}

#[async_trait]
impl GenerationBackend for ScriptedBackend {
    fn name(&self) -> &str {
        "scripted"
    }

    fn generate_streaming(&self, request: GenerationRequest) -> GenerationStream {
        let (sink, stream) = generation_channel(request.id);
        match self.next_script(&request) {
            Some(script) => {
                tokio::spawn(play(script, sink));
            }
            None => sink.fail(BackendError::Scripted("no scripts configured".into())),
        }
        stream
    }

    async fn complete(&self, request: GenerationRequest) -> Result<String, BackendError> {
        let script = self
            .next_script(&request)
            .ok_or_else(|| BackendError::Scripted("no scripts configured".into()))?;
        for step in script.steps() {
            match step {
                ScriptStep::Delay(duration) => tokio::time::sleep(*duration).await,
                ScriptStep::Fail(message) => return Err(BackendError::Scripted(message.clone())),
                ScriptStep::Hang | ScriptStep::Stall => return Err(BackendError::Disconnected),
                _ => {}
            }
        }
        Ok(script.text())
    }
}
