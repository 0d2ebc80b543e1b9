//! Command pipeline
//!
//! Validates that the caller holds the turn, executes the command (against the
//! world, or in-house for RECALL and DREAM), charges the scheduler once, and
//! publishes one round of events.

use crate::bus::{Event, PublishOutcome};
use crate::command::Command;
use crate::context::SharedContext;
use crate::dream::{self, DREAM_MEMORY_PREFIX, DREAM_NOTE_TITLE};
use crate::error::{ExecutionError, SynthesisError, ValidationError};
use crate::memory::{LastTurn, MemoryKind, MemoryStore, TurnArtifacts};
use crate::scheduler::ChargeReceipt;
use crate::world::{ActionRequest, WorldOutcome};
use async_trait::async_trait;
use minimind_types::{ActorId, EventKind, Location};
use std::sync::Arc;
use tracing::{info, instrument, warn};

/// Non-streaming text generation, used for dreams
#[async_trait]
pub trait Synthesizer: Send + Sync {
    async fn synthesize(&self, prompt: &str, system: &str) -> Result<String, SynthesisError>;
}

/// Result of an executed (or forfeited) turn
#[derive(Debug, Clone)]
pub struct ExecutionReport {
    pub actor: ActorId,
    /// `None` for a forfeited turn
    pub command: Option<Command>,
    pub rationale: Option<String>,
    pub success: bool,
    /// What the actor was told
    pub message: String,
    pub error: Option<ExecutionError>,
    pub charge: ChargeReceipt,
    pub publish: Option<PublishOutcome>,
}

#[derive(Clone)]
pub struct CommandPipeline {
    ctx: SharedContext,
    synthesizer: Option<Arc<dyn Synthesizer>>,
}

impl CommandPipeline {
    pub fn new(ctx: SharedContext) -> Self {
        Self {
            ctx,
            synthesizer: None,
        }
    }

    pub fn with_synthesizer(mut self, synthesizer: Arc<dyn Synthesizer>) -> Self {
        self.synthesizer = Some(synthesizer);
        self
    }

    pub fn context(&self) -> &SharedContext {
        &self.ctx
    }

    /// Execute one command line for `actor`. A trailing `| rationale` wins
    /// over `reason`.
    ///
    /// Validation failures leave every piece of state untouched. Anything past
    /// validation charges the scheduler exactly once, whether the command
    /// worked or not.
    #[instrument(skip_all, fields(actor = %actor))]
    pub async fn execute(
        &self,
        actor: &ActorId,
        raw: &str,
        reason: Option<&str>,
        artifacts: Option<TurnArtifacts>,
    ) -> Result<ExecutionReport, ValidationError> {
        let (text, inline_reason) = self.ctx.parser.split_rationale(raw.trim());
        let rationale = inline_reason.or(reason).map(str::to_string);

        self.ctx.scheduler.lock().ensure_turn(actor)?;
        let command = self.ctx.parser.parse(text)?;
        let location = self
            .ctx
            .location_of(actor)
            .ok_or_else(|| ValidationError::UnknownActor(actor.clone()))?;
        let store = self.ctx.mind(actor);

        info!(command = %command, rationale = rationale.as_deref().unwrap_or(""), "executing");

        let outcome = if command.is_reflective() {
            self.reflect(actor, &location, store.as_deref(), &command, rationale.as_deref())
                .await
        } else {
            let outcome = self.ctx.world.apply(ActionRequest {
                actor,
                location: &location,
                command: &command,
                reason: rationale.as_deref(),
            });
            if outcome.success {
                Ok(outcome)
            } else {
                Err(ExecutionError::Rejected(outcome.message))
            }
        };

        let report = match outcome {
            Ok(outcome) => self.settle_success(actor, command, rationale, outcome, store.as_deref())?,
            Err(error) => self.settle_failure(actor, &location, command, rationale, error, store.as_deref())?,
        };

        if let Some(store) = &store {
            store.record_turn(LastTurn {
                command: report.command.as_ref().map(Command::to_string),
                result: Some(report.message.clone()),
                rationale: report.rationale.clone(),
                artifacts,
                thought_chain: None,
            });
        }
        Ok(report)
    }

    /// End `actor`'s turn without a command: charge the failure cost and tell
    /// the room.
    pub fn forfeit(&self, actor: &ActorId, why: &str) -> Result<ExecutionReport, ValidationError> {
        let location = self
            .ctx
            .location_of(actor)
            .ok_or_else(|| ValidationError::UnknownActor(actor.clone()))?;
        warn!(actor = %actor, why, "turn forfeited");

        let message = "You hesitate and lose the moment.".to_string();
        if let Some(store) = self.ctx.mind(actor) {
            store.add_memory(MemoryKind::Response, &message, Some(why));
        }
        let charge = self.charge(actor, self.failure_cost())?;
        let publish = self.publish(Event::new(
            EventKind::Failure,
            actor.clone(),
            format!("{actor} hesitates and loses the moment."),
            location,
        ));

        Ok(ExecutionReport {
            actor: actor.clone(),
            command: None,
            rationale: Some(why.to_string()),
            success: false,
            message,
            error: None,
            charge,
            publish: Some(publish),
        })
    }

    fn settle_success(
        &self,
        actor: &ActorId,
        command: Command,
        rationale: Option<String>,
        outcome: WorldOutcome,
        store: Option<&dyn MemoryStore>,
    ) -> Result<ExecutionReport, ValidationError> {
        if let Some(store) = store {
            store.add_memory(MemoryKind::Response, &outcome.message, rationale.as_deref());
            if let Command::Note { title, content } = &command {
                let content = if !content.is_empty() {
                    content.as_str()
                } else {
                    rationale.as_deref().unwrap_or("(empty)")
                };
                store.create_note(title, content, rationale.as_deref());
            }
        }
        if let Some(destination) = &outcome.new_location {
            self.ctx.roster.place(actor.clone(), destination.clone());
        }

        let cost = self.ctx.scheduler.lock().cost_of(&command);
        let charge = self.charge(actor, cost)?;
        let publish = outcome.event.map(|event| self.publish(event));

        Ok(ExecutionReport {
            actor: actor.clone(),
            command: Some(command),
            rationale,
            success: true,
            message: outcome.message,
            error: None,
            charge,
            publish,
        })
    }

    fn settle_failure(
        &self,
        actor: &ActorId,
        location: &Location,
        command: Command,
        rationale: Option<String>,
        error: ExecutionError,
        store: Option<&dyn MemoryStore>,
    ) -> Result<ExecutionReport, ValidationError> {
        warn!(actor = %actor, command = %command, error = %error, "command failed");
        let message = error.to_string();
        if let Some(store) = store {
            store.add_memory(MemoryKind::Response, &message, rationale.as_deref());
        }

        let charge = self.charge(actor, self.failure_cost())?;
        let publish = self.publish(
            Event::new(
                EventKind::Failure,
                actor.clone(),
                format!("{actor} tries to {} but fails.", attempted(&command)),
                location.clone(),
            )
            .with_reason(rationale.clone()),
        );

        Ok(ExecutionReport {
            actor: actor.clone(),
            command: Some(command),
            rationale,
            success: false,
            message,
            error: Some(error),
            charge,
            publish: Some(publish),
        })
    }

    async fn reflect(
        &self,
        actor: &ActorId,
        location: &Location,
        store: Option<&dyn MemoryStore>,
        command: &Command,
        rationale: Option<&str>,
    ) -> Result<WorldOutcome, ExecutionError> {
        match command {
            Command::Recall { query } => Ok(self.recall(actor, location, store, query)),
            _ => self.dream(actor, location, store, rationale).await,
        }
    }

    fn recall(
        &self,
        actor: &ActorId,
        location: &Location,
        store: Option<&dyn MemoryStore>,
        query: &str,
    ) -> WorldOutcome {
        let limit = self.ctx.config.memory.recall_limit;
        let hits = store.map(|s| s.recall(query, limit)).unwrap_or_default();

        let message = if hits.is_empty() {
            "No notes found.".to_string()
        } else {
            hits.iter()
                .map(|hit| {
                    format!(
                        "## {} ({:.0}% match)\n{}",
                        hit.note.title,
                        hit.score * 100.0,
                        hit.note.content
                    )
                })
                .collect::<Vec<_>>()
                .join("\n\n")
        };

        WorldOutcome::ok(message).with_event(Event::new(
            EventKind::Recall,
            actor.clone(),
            format!("{actor} looks thoughtful for a moment, recalling information."),
            location.clone(),
        ))
    }

    async fn dream(
        &self,
        actor: &ActorId,
        location: &Location,
        store: Option<&dyn MemoryStore>,
        question: Option<&str>,
    ) -> Result<WorldOutcome, ExecutionError> {
        let synthesizer = self
            .synthesizer
            .as_ref()
            .ok_or(ExecutionError::NoSynthesizer)?;

        let history = store.map(|s| s.memories(usize::MAX)).unwrap_or_default();
        let recent = self.ctx.config.memory.dream_memories;
        let fragments = dream::dream_fragments(&history, recent, &mut rand::thread_rng());
        let (prompt, system) = dream::dream_prompt(actor, question, &fragments);

        info!(actor = %actor, fragments = fragments.len(), "dreaming");
        let limit = self.ctx.config.memory.dream_timeout();
        let narrative = tokio::time::timeout(limit, synthesizer.synthesize(&prompt, &system))
            .await
            .map_err(|_| ExecutionError::SynthesisTimedOut(limit.as_millis() as u64))?
            .map_err(|err| ExecutionError::Synthesis(err.0))?;
        let narrative = dream::strip_reasoning(&narrative);

        if let Some(store) = store {
            store.create_note(
                DREAM_NOTE_TITLE,
                &narrative,
                Some(question.unwrap_or("Introspection")),
            );
        }

        Ok(
            WorldOutcome::ok(format!("{DREAM_MEMORY_PREFIX}{narrative}")).with_event(Event::new(
                EventKind::Dream,
                actor.clone(),
                format!("{actor} appears to be dreaming."),
                location.clone(),
            )),
        )
    }

    fn charge(&self, actor: &ActorId, cost: u64) -> Result<ChargeReceipt, ValidationError> {
        self.ctx.scheduler.lock().charge(actor, cost)
    }

    fn failure_cost(&self) -> u64 {
        self.ctx.config.turns.failure_cost
    }

    fn publish(&self, event: Event) -> PublishOutcome {
        let outcome = self.ctx.bus.publish(event.clone(), None);
        if outcome != PublishOutcome::Suppressed {
            self.ctx.world.notify(&event);
        }
        outcome
    }
}

/// The command as prose: verb keyword lowercased, arguments as typed
fn attempted(command: &Command) -> String {
    let shown = command.to_string();
    let keyword = command.verb().keyword();
    match shown.strip_prefix(keyword) {
        Some(rest) => format!("{}{rest}", keyword.to_lowercase()),
        None => shown,
    }
}
