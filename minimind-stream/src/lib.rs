//! Streaming generation for minimind
//!
//! Generated actors take their turns through a streaming backend. Text is
//! scanned as it arrives; once a complete command line shows up after the
//! reasoning segment, the backend is cancelled and the command is handed to
//! the core [`CommandPipeline`](minimind_core::CommandPipeline).

pub mod backend;
pub mod barrier;
pub mod extract;
pub mod machine;
pub mod ollama;
pub mod prompt;
pub mod scripted;
pub mod turn;

pub use backend::{
    BackendError, BackendSynthesizer, GenerationBackend, GenerationEvent, GenerationHandle,
    GenerationRequest, GenerationStream,
};
pub use barrier::CompletionBarrier;
pub use extract::{Extracted, Extractor};
pub use machine::{Detection, PendingGeneration, Phase, Verdict};
pub use ollama::OllamaBackend;
pub use prompt::PromptBuilder;
pub use scripted::{Script, ScriptStep, ScriptedBackend};
pub use turn::{TurnError, TurnOutcome, TurnResolution, TurnRunner, TurnTiming};

use minimind_core::config::{BackendConfig, BackendKind};
use std::sync::Arc;

/// Build the backend named by the config
pub fn backend_from_config(config: &BackendConfig) -> Arc<dyn GenerationBackend> {
    match config.kind {
        BackendKind::Ollama => Arc::new(OllamaBackend::new(config)),
        BackendKind::Scripted => Arc::new(ScriptedBackend::from_config(config)),
    }
}
