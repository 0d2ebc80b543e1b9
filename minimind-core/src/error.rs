//! Error types for turn validation and command execution

use minimind_types::ActorId;
use thiserror::Error;

/// A command rejected before anything was charged or mutated
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// Someone else holds the turn
    #[error("It's not {actor}'s turn (waiting on {})", .expected.as_ref().map(ActorId::as_str).unwrap_or("nobody"))]
    NotYourTurn {
        actor: ActorId,
        expected: Option<ActorId>,
    },

    /// Actor is not registered with the scheduler
    #[error("Unknown actor {0}")]
    UnknownActor(ActorId),

    /// Line does not start with a known verb
    #[error("Unrecognized command: {0}")]
    UnrecognizedVerb(String),

    /// Verb recognized but its argument is missing or malformed
    #[error("{verb} needs {expected}")]
    MissingArgument {
        verb: &'static str,
        expected: &'static str,
    },

    /// Nothing to parse
    #[error("Empty command")]
    EmptyCommand,
}

/// A well-formed command that could not be carried out
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExecutionError {
    /// The world refused the command
    #[error("{0}")]
    Rejected(String),

    /// Dream synthesis failed
    #[error("Dream synthesis failed: {0}")]
    Synthesis(String),

    /// Dream synthesis ran past `memory.dream_timeout_ms`
    #[error("Dream synthesis timed out after {0} ms")]
    SynthesisTimedOut(u64),

    /// No synthesizer was configured for DREAM
    #[error("Nothing to dream with")]
    NoSynthesizer,
}

/// Result type using ValidationError
pub type ValidationResult<T> = std::result::Result<T, ValidationError>;

/// Failure reported by a [`Synthesizer`](crate::pipeline::Synthesizer)
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct SynthesisError(pub String);
