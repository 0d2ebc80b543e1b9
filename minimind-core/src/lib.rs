//! Core simulation engine for minimind
//!
//! A human and a handful of generated actors share a small text world and take
//! turns issuing commands. This crate owns whose turn it is, what a command
//! costs, how events reach the actors who can see them, and what happens when
//! a command runs.

pub mod bus;
pub mod command;
pub mod config;
pub mod context;
pub mod dream;
pub mod error;
pub mod memory;
pub mod pipeline;
pub mod scheduler;
pub mod world;

pub use bus::{Delivery, Event, EventBus, Movement, Observer, PublishOutcome, Whereabouts};
pub use command::{Command, CommandParser, Verb};
pub use config::{ConfigError, SimConfig};
pub use context::{Roster, SharedContext};
pub use error::{ExecutionError, SynthesisError, ValidationError};
pub use memory::{AgentMind, HumanJournal, MemoryKind, MemoryStore, TurnArtifacts};
pub use pipeline::{CommandPipeline, ExecutionReport, Synthesizer};
pub use scheduler::{ActorStanding, ChargeReceipt, Scheduler, TurnMode};
pub use world::{SandboxWorld, World, WorldOutcome};
