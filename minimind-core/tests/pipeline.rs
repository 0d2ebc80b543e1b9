//! End-to-end command pipeline tests over the sandbox world

use async_trait::async_trait;
use minimind_core::memory::MemoryKind;
use minimind_core::{
    AgentMind, CommandPipeline, ExecutionError, HumanJournal, MemoryStore, PublishOutcome,
    SharedContext, SimConfig, SynthesisError, Synthesizer, ValidationError,
};
use minimind_types::{ActorId, Location};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

struct Cast {
    pipeline: CommandPipeline,
    human: ActorId,
    ada: ActorId,
    bram: ActorId,
    ada_mind: Arc<AgentMind>,
    bram_mind: Arc<AgentMind>,
}

fn cast() -> Cast {
    let ctx = SharedContext::sandbox(SimConfig::default());
    let human = ActorId::from("T");
    let ada = ActorId::from("Ada");
    let bram = ActorId::from("Bram");
    let ada_mind = Arc::new(AgentMind::new(ada.clone(), "curious"));
    let bram_mind = Arc::new(AgentMind::new(bram.clone(), "grumpy"));

    ctx.enroll(
        human.clone(),
        true,
        Location::from("Town Square"),
        Arc::new(HumanJournal::new(human.clone())),
    );
    ctx.enroll(ada.clone(), false, Location::from("Town Square"), ada_mind.clone());
    ctx.enroll(bram.clone(), false, Location::from("Kitchen"), bram_mind.clone());

    Cast {
        pipeline: CommandPipeline::new(ctx),
        human,
        ada,
        bram,
        ada_mind,
        bram_mind,
    }
}

struct Echo {
    prompts: Mutex<Vec<String>>,
}

#[async_trait]
impl Synthesizer for Echo {
    async fn synthesize(&self, prompt: &str, _system: &str) -> Result<String, SynthesisError> {
        self.prompts.lock().push(prompt.to_string());
        Ok("<think>hmm</think>\nI was flying over the kitchen.".to_string())
    }
}

struct Broken;

#[async_trait]
impl Synthesizer for Broken {
    async fn synthesize(&self, _prompt: &str, _system: &str) -> Result<String, SynthesisError> {
        Err(SynthesisError("backend down".into()))
    }
}

struct Asleep;

#[async_trait]
impl Synthesizer for Asleep {
    async fn synthesize(&self, _prompt: &str, _system: &str) -> Result<String, SynthesisError> {
        std::future::pending::<()>().await;
        Ok(String::new())
    }
}

#[tokio::test]
async fn test_say_charges_and_notifies_observers() {
    let cast = cast();
    let report = cast
        .pipeline
        .execute(&cast.human, "SAY hello there friends | being polite", None, None)
        .await
        .unwrap();

    assert!(report.success);
    assert_eq!(report.rationale.as_deref(), Some("being polite"));
    assert_eq!(report.charge.effective, 2);
    assert_eq!(report.publish, Some(PublishOutcome::Delivered(2)));

    let seen = cast.ada_mind.memories(1);
    assert_eq!(seen[0].kind, MemoryKind::Observed);
    assert_eq!(seen[0].content, "T says: \"hello there friends\"");
    // Bram is in the kitchen
    assert!(cast.bram_mind.memories(10).is_empty());

    let scheduler = cast.pipeline.context().scheduler.lock();
    assert_eq!(scheduler.pending(&cast.ada), Some(1));
    assert_eq!(scheduler.next_actor(), Some(cast.ada.clone()));
}

#[tokio::test]
async fn test_not_your_turn_changes_nothing() {
    let cast = cast();
    let before = cast.pipeline.context().scheduler.lock().snapshot();

    let err = cast
        .pipeline
        .execute(&cast.ada, "LOOK", None, None)
        .await
        .unwrap_err();
    assert!(matches!(err, ValidationError::NotYourTurn { .. }));

    let err = cast
        .pipeline
        .execute(&cast.human, "FLY QUIETLY", None, None)
        .await
        .unwrap_err();
    assert!(matches!(err, ValidationError::UnrecognizedVerb(_)));

    assert_eq!(cast.pipeline.context().scheduler.lock().snapshot(), before);
    assert!(cast.ada_mind.memories(10).is_empty());
}

#[tokio::test]
async fn test_movement_updates_roster() {
    let cast = cast();
    let report = cast
        .pipeline
        .execute(&cast.human, "GO TO kitchen", None, None)
        .await
        .unwrap();
    assert!(report.success);

    let ctx = cast.pipeline.context();
    assert_eq!(ctx.location_of(&cast.human), Some(Location::from("Kitchen")));

    // both ends of the trip saw it, each from their side
    assert_eq!(
        cast.ada_mind.memories(1)[0].content,
        "T goes to Kitchen."
    );
    assert_eq!(
        cast.bram_mind.memories(1)[0].content,
        "T goes from Town Square."
    );
}

#[tokio::test]
async fn test_world_rejection_costs_failure_cost() {
    let cast = cast();
    let report = cast
        .pipeline
        .execute(&cast.human, "GO TO Moon", None, None)
        .await
        .unwrap();

    assert!(!report.success);
    assert!(matches!(report.error, Some(ExecutionError::Rejected(_))));
    assert_eq!(report.charge.raw, 1);
    assert_eq!(
        cast.ada_mind.memories(1)[0].content,
        "T tries to go to Moon but fails."
    );
}

#[tokio::test]
async fn test_note_then_recall() {
    let cast = cast();
    let ctx = cast.pipeline.context().clone();
    ctx.scheduler.lock().set_override_mode(true);

    cast.pipeline
        .execute(&cast.human, "NOTE groceries: eggs and flour", None, None)
        .await
        .unwrap();
    cast.pipeline
        .execute(&cast.human, "NOTE plans | visit the library", None, None)
        .await
        .unwrap();

    let report = cast
        .pipeline
        .execute(&cast.human, "RECALL groceries", None, None)
        .await
        .unwrap();
    assert!(report.message.starts_with("## groceries (100% match)\neggs and flour"));
    assert!(report.message.contains("## plans"));
    assert!(report.message.contains("visit the library"));
    assert_eq!(report.charge.effective, 0);

    assert_eq!(
        cast.ada_mind.memories(1)[0].content,
        "T looks thoughtful for a moment, recalling information."
    );
}

#[tokio::test]
async fn test_recall_with_no_notes() {
    let cast = cast();
    let report = cast
        .pipeline
        .execute(&cast.human, "RECALL anything", None, None)
        .await
        .unwrap();
    assert_eq!(report.message, "No notes found.");
    assert_eq!(report.charge.raw, 2);
}

#[tokio::test]
async fn test_dream_stores_note_and_memory() {
    let echo = Arc::new(Echo {
        prompts: Mutex::new(Vec::new()),
    });
    let cast = cast();
    let pipeline = cast.pipeline.clone().with_synthesizer(echo.clone());
    let ctx = pipeline.context().clone();

    cast.ada_mind
        .add_memory(MemoryKind::Action, "I found a strange key", None);
    ctx.scheduler.lock().charge(&cast.human, 1).unwrap();
    assert_eq!(ctx.scheduler.lock().next_actor(), Some(cast.ada.clone()));

    let report = pipeline
        .execute(&cast.ada, "DREAM | what does the key open?", None, None)
        .await
        .unwrap();

    assert!(report.success);
    assert_eq!(report.charge.raw, 5);
    assert_eq!(
        report.message,
        "You've had a dream: I was flying over the kitchen."
    );
    let notes = cast.ada_mind.notes(1);
    assert_eq!(notes[0].title, "Dream");
    assert_eq!(notes[0].content, "I was flying over the kitchen.");

    let prompts = echo.prompts.lock();
    assert!(prompts[0].contains("I found a strange key"));
    assert!(prompts[0].contains("what does the key open?"));
}

#[tokio::test]
async fn test_failed_dream_is_an_execution_error() {
    let cast = cast();
    let pipeline = cast.pipeline.clone().with_synthesizer(Arc::new(Broken));
    pipeline.context().scheduler.lock().set_override_mode(true);

    let report = pipeline
        .execute(&cast.human, "DREAM", None, None)
        .await
        .unwrap();
    assert!(!report.success);
    assert_eq!(
        report.error,
        Some(ExecutionError::Synthesis("backend down".into()))
    );
}

#[tokio::test(start_paused = true)]
async fn test_dream_gives_up_after_timeout() {
    let cast = cast();
    let pipeline = cast.pipeline.clone().with_synthesizer(Arc::new(Asleep));
    pipeline.context().scheduler.lock().set_override_mode(true);
    let limit = pipeline.context().config.memory.dream_timeout();

    let started = tokio::time::Instant::now();
    let report = pipeline
        .execute(&cast.human, "DREAM", None, None)
        .await
        .unwrap();

    assert!(started.elapsed() >= limit);
    assert!(started.elapsed() < limit + Duration::from_secs(1));
    assert!(!report.success);
    assert_eq!(
        report.error,
        Some(ExecutionError::SynthesisTimedOut(limit.as_millis() as u64))
    );
    assert_eq!(report.message, "Dream synthesis timed out after 45000 ms");
    assert_eq!(report.charge.raw, 1);
}

#[tokio::test]
async fn test_forfeit_charges_and_narrates() {
    let cast = cast();
    let ctx = cast.pipeline.context().clone();
    ctx.scheduler.lock().charge(&cast.human, 1).unwrap();

    let report = cast.pipeline.forfeit(&cast.ada, "stream failed").unwrap();
    assert!(!report.success);
    assert_eq!(report.charge.raw, 1);
    assert_eq!(ctx.scheduler.lock().next_actor(), Some(cast.bram.clone()));

    let err = cast
        .pipeline
        .forfeit(&ActorId::from("ghost"), "nobody")
        .unwrap_err();
    assert!(matches!(err, ValidationError::UnknownActor(_)));
}
