//! Shared types for minimind
//!
//! This crate provides the identifiers and event vocabulary used across the
//! minimind workspace: who acts, where they are, and what kind of thing
//! happened.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Actor identifier
///
/// Actors are addressed by their display name. Comparison is exact; callers
/// that accept user input should resolve names before building an id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ActorId(pub String);

impl ActorId {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ActorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ActorId {
    fn from(name: &str) -> Self {
        ActorId(name.to_string())
    }
}

/// Named place in the world
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Location(pub String);

impl Location {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Location {
    fn from(name: &str) -> Self {
        Location(name.to_string())
    }
}

/// Event type tag
///
/// The tag decides who hears about an event: shouts reach everyone, movements
/// reach both ends of the move, everything else stays in one location.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Speech,
    Shout,
    Emote,
    Movement,
    Observation,
    Command,
    Recall,
    Dream,
    Failure,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Speech => "speech",
            EventKind::Shout => "shout",
            EventKind::Emote => "emote",
            EventKind::Movement => "movement",
            EventKind::Observation => "observation",
            EventKind::Command => "command",
            EventKind::Recall => "recall",
            EventKind::Dream => "dream",
            EventKind::Failure => "failure",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
