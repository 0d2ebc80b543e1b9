//! Generated turns
//!
//! [`TurnRunner::run_agent_turn`] drives one turn for a generated actor:
//! build the prompt, start a streaming generation, and let a coordination
//! task feed chunks through a [`PendingGeneration`]. The coordinator hands
//! the first detected command to the pipeline and resolves the turn's
//! [`CompletionBarrier`]; the runner waits on the barrier with a bounded
//! timeout and always cancels the backend before returning.

use crate::backend::{GenerationBackend, GenerationEvent, GenerationHandle, GenerationRequest};
use crate::barrier::{CompletionBarrier, ResolveOnDrop};
use crate::extract::Extractor;
use crate::machine::{Detection, PendingGeneration, Phase, Verdict};
use crate::prompt::PromptBuilder;
use minimind_core::config::StreamingConfig;
use minimind_core::memory::MemoryStore;
use minimind_core::{CommandPipeline, ExecutionReport, TurnArtifacts, ValidationError};
use minimind_types::ActorId;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{debug, info, instrument, warn};

/// How a turn ended
#[derive(Debug, Clone)]
pub enum TurnResolution {
    /// A command ran (successfully or not) and was charged
    Executed(ExecutionReport),
    /// No usable command; the failure cost was charged
    Forfeited(ExecutionReport),
    /// The pipeline refused the command and nothing was charged
    Rejected(ValidationError),
    /// The coordinator stopped without resolving
    Abandoned(String),
    /// The barrier timed out. Carries the forfeit if one was charged.
    TimedOut(Option<ExecutionReport>),
}

impl TurnResolution {
    pub fn report(&self) -> Option<&ExecutionReport> {
        match self {
            TurnResolution::Executed(report) | TurnResolution::Forfeited(report) => Some(report),
            TurnResolution::TimedOut(report) => report.as_ref(),
            TurnResolution::Rejected(_) | TurnResolution::Abandoned(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TurnError {
    #[error("{0} already has a turn in progress")]
    AlreadyLive(ActorId),

    #[error("{0} has no memory store")]
    NoMind(ActorId),

    #[error(transparent)]
    Validation(#[from] ValidationError),
}

/// Everything known about a finished turn
#[derive(Debug, Clone)]
pub struct TurnOutcome {
    pub actor: ActorId,
    pub resolution: TurnResolution,
    pub phase: Phase,
    pub detection: Option<Detection>,
    /// Whether the backend confirmed it stopped
    pub acknowledged: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TurnTiming {
    pub settle_delay: Duration,
    pub cancel_ack_timeout: Duration,
    pub turn_timeout: Duration,
}

impl From<&StreamingConfig> for TurnTiming {
    fn from(config: &StreamingConfig) -> Self {
        Self {
            settle_delay: config.settle_delay(),
            cancel_ack_timeout: config.cancel_ack_timeout(),
            turn_timeout: config.turn_timeout(),
        }
    }
}

/// Marks an actor's turn as in progress until dropped
struct LiveGuard {
    live: Arc<Mutex<HashSet<ActorId>>>,
    actor: ActorId,
}

impl LiveGuard {
    fn acquire(live: &Arc<Mutex<HashSet<ActorId>>>, actor: &ActorId) -> Result<Self, TurnError> {
        if !live.lock().insert(actor.clone()) {
            return Err(TurnError::AlreadyLive(actor.clone()));
        }
        Ok(Self {
            live: live.clone(),
            actor: actor.clone(),
        })
    }
}

impl Drop for LiveGuard {
    fn drop(&mut self) {
        self.live.lock().remove(&self.actor);
    }
}

#[derive(Clone)]
pub struct TurnRunner {
    pipeline: CommandPipeline,
    backend: Arc<dyn GenerationBackend>,
    extractor: Arc<Extractor>,
    prompts: PromptBuilder,
    timing: TurnTiming,
    live: Arc<Mutex<HashSet<ActorId>>>,
}

impl TurnRunner {
    pub fn new(pipeline: CommandPipeline, backend: Arc<dyn GenerationBackend>) -> Self {
        let ctx = pipeline.context();
        let extractor = Extractor::new(ctx.parser.as_ref().clone(), &ctx.config.streaming);
        let prompts = PromptBuilder::new(&ctx.config);
        let timing = TurnTiming::from(&ctx.config.streaming);
        Self {
            pipeline,
            backend,
            extractor: Arc::new(extractor),
            prompts,
            timing,
            live: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    pub fn with_timing(mut self, timing: TurnTiming) -> Self {
        self.timing = timing;
        self
    }

    pub fn pipeline(&self) -> &CommandPipeline {
        &self.pipeline
    }

    pub fn is_live(&self, actor: &ActorId) -> bool {
        self.live.lock().contains(actor)
    }

    /// Run one generated turn for `actor`, who must hold the turn
    #[instrument(skip_all, fields(actor = %actor, backend = self.backend.name()))]
    pub async fn run_agent_turn(&self, actor: &ActorId) -> Result<TurnOutcome, TurnError> {
        let ctx = self.pipeline.context();
        ctx.scheduler.lock().ensure_turn(actor)?;
        let store = ctx
            .mind(actor)
            .ok_or_else(|| TurnError::NoMind(actor.clone()))?;
        let _live = LiveGuard::acquire(&self.live, actor)?;

        let (prompt, system) = self.prompts.build(ctx, actor, store.as_ref());
        let request = GenerationRequest::new(prompt, system);
        info!(request = %request.id, "starting generation");

        let stream = self.backend.generate_streaming(request.clone());
        let handle = stream.handle.clone();
        let machine = Arc::new(PendingGeneration::new(self.extractor.clone()));
        machine.begin();
        let barrier = Arc::new(CompletionBarrier::new());
        let charged = Arc::new(AtomicBool::new(false));

        let coordinator = Coordinator {
            pipeline: self.pipeline.clone(),
            actor: actor.clone(),
            store,
            machine: machine.clone(),
            barrier: barrier.clone(),
            handle: handle.clone(),
            timing: self.timing,
            request,
            charged: charged.clone(),
        };
        let mut task = tokio::spawn(coordinator.run(stream.events));

        let resolution = match barrier.wait(self.timing.turn_timeout).await {
            Some(resolution) => resolution,
            None => {
                warn!(timeout = ?self.timing.turn_timeout, "turn timed out, cancelling");
                handle.cancel();
                task.abort();
                let _ = (&mut task).await;
                machine.on_error();
                match barrier.current() {
                    Some(TurnResolution::Abandoned(_)) | None => {
                        self.resolve_timeout(actor, &barrier, &charged)
                    }
                    Some(late) => late,
                }
            }
        };

        // cleanup runs whatever the barrier said
        handle.cancel();
        let acknowledged = handle
            .wait_for_completion(self.timing.cancel_ack_timeout)
            .await;
        if !acknowledged {
            warn!("backend did not acknowledge cancellation, moving on");
        }

        Ok(TurnOutcome {
            actor: actor.clone(),
            resolution,
            phase: machine.phase(),
            detection: machine.detection().cloned(),
            acknowledged,
        })
    }

    fn resolve_timeout(
        &self,
        actor: &ActorId,
        barrier: &CompletionBarrier,
        charged: &AtomicBool,
    ) -> TurnResolution {
        let report = if charged.load(Ordering::SeqCst) {
            None
        } else {
            match self.pipeline.forfeit(actor, "turn timed out") {
                Ok(report) => Some(report),
                Err(err) => {
                    warn!(error = %err, "could not forfeit timed out turn");
                    None
                }
            }
        };
        let resolution = TurnResolution::TimedOut(report);
        barrier.resolve(resolution.clone());
        resolution
    }
}

/// Per-turn task consuming backend events
struct Coordinator {
    pipeline: CommandPipeline,
    actor: ActorId,
    store: Arc<dyn MemoryStore>,
    machine: Arc<PendingGeneration>,
    barrier: Arc<CompletionBarrier>,
    handle: GenerationHandle,
    timing: TurnTiming,
    request: GenerationRequest,
    charged: Arc<AtomicBool>,
}

impl Coordinator {
    async fn run(self, mut events: UnboundedReceiver<GenerationEvent>) {
        let _guard = ResolveOnDrop::new(self.barrier.clone());

        let resolution = loop {
            let Some(event) = events.recv().await else {
                self.machine.on_error();
                break self.forfeit("generation ended without a result");
            };
            match event {
                GenerationEvent::Chunk(text) => {
                    debug!(len = text.len(), "chunk");
                    if let Verdict::Detected(detection) = self.machine.on_chunk(&text) {
                        info!(command = %detection.command, "command detected mid-stream");
                        let response = self.machine.raw_text();
                        break self.hand_off(detection, response, true).await;
                    }
                }
                GenerationEvent::Complete(full) => match self.machine.on_complete(&full) {
                    Some(detection) => {
                        info!(
                            command = %detection.command,
                            best_effort = detection.best_effort,
                            "command extracted from full response"
                        );
                        break self.hand_off(detection, full, false).await;
                    }
                    None => break self.forfeit("no command in response"),
                },
                GenerationEvent::Failed(err) => {
                    warn!(error = %err, "generation failed");
                    self.machine.on_error();
                    self.handle.cancel();
                    break self.forfeit(&err.to_string());
                }
            }
        };

        self.barrier.resolve(resolution);
    }

    async fn hand_off(&self, detection: Detection, response: String, early: bool) -> TurnResolution {
        if let Some(reasoning) = &detection.reasoning {
            self.store.record_reasoning(reasoning);
        }

        if early {
            self.handle.cancel();
            tokio::time::sleep(self.timing.settle_delay).await;
            if !self
                .handle
                .wait_for_completion(self.timing.cancel_ack_timeout)
                .await
            {
                warn!("no cancellation ack before executing");
            }
        }

        let artifacts = TurnArtifacts {
            prompt: self.request.prompt.clone(),
            system_prompt: self.request.system.clone(),
            response,
        };
        let result = self
            .pipeline
            .execute(
                &self.actor,
                &detection.command,
                detection.rationale.as_deref(),
                Some(artifacts),
            )
            .await;

        match result {
            Ok(report) => {
                self.charged.store(true, Ordering::SeqCst);
                TurnResolution::Executed(report)
            }
            Err(err @ (ValidationError::NotYourTurn { .. } | ValidationError::UnknownActor(_))) => {
                warn!(error = %err, "command rejected");
                TurnResolution::Rejected(err)
            }
            Err(err) => {
                // a model that can't produce a valid command still spends its turn
                warn!(error = %err, command = %detection.command, "invalid generated command");
                self.forfeit(&err.to_string())
            }
        }
    }

    fn forfeit(&self, why: &str) -> TurnResolution {
        match self.pipeline.forfeit(&self.actor, why) {
            Ok(report) => {
                self.charged.store(true, Ordering::SeqCst);
                TurnResolution::Forfeited(report)
            }
            Err(err) => TurnResolution::Rejected(err),
        }
    }
}
