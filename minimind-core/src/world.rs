//! World collaborator boundary and a small in-memory sandbox

use crate::bus::{Event, Movement, Whereabouts};
use crate::command::Command;
use minimind_types::{ActorId, EventKind, Location};
use std::sync::Arc;

/// One command to apply on behalf of an actor
#[derive(Debug, Clone, Copy)]
pub struct ActionRequest<'a> {
    pub actor: &'a ActorId,
    pub location: &'a Location,
    pub command: &'a Command,
    pub reason: Option<&'a str>,
}

/// What the world made of a command
#[derive(Debug, Clone, PartialEq)]
pub struct WorldOutcome {
    pub success: bool,
    /// Shown to the acting actor
    pub message: String,
    pub new_location: Option<Location>,
    /// Broadcast to observers on success
    pub event: Option<Event>,
}

impl WorldOutcome {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            new_location: None,
            event: None,
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            new_location: None,
            event: None,
        }
    }

    pub fn with_event(mut self, event: Event) -> Self {
        self.event = Some(event);
        self
    }

    pub fn moved_to(mut self, location: Location) -> Self {
        self.new_location = Some(location);
        self
    }
}

pub trait World: Send + Sync {
    fn apply(&self, request: ActionRequest<'_>) -> WorldOutcome;

    /// Called after an event has been published
    fn notify(&self, _event: &Event) {}

    /// Case-insensitive place lookup
    fn resolve_place(&self, name: &str) -> Option<Location>;
}

/// Flat world: a set of places, all reachable from each other
pub struct SandboxWorld {
    places: Vec<Location>,
    whereabouts: Arc<dyn Whereabouts>,
}

impl SandboxWorld {
    pub fn new(places: impl IntoIterator<Item = Location>, whereabouts: Arc<dyn Whereabouts>) -> Self {
        Self {
            places: places.into_iter().collect(),
            whereabouts,
        }
    }

    pub fn places(&self) -> &[Location] {
        &self.places
    }

    fn look(&self, actor: &ActorId, here: &Location) -> String {
        let others: Vec<String> = self
            .whereabouts
            .actors_at(here)
            .into_iter()
            .filter(|other| other != actor)
            .map(|other| other.to_string())
            .collect();
        let exits: Vec<&str> = self
            .places
            .iter()
            .filter(|place| *place != here)
            .map(Location::as_str)
            .collect();

        let company = if others.is_empty() {
            "You are alone.".to_string()
        } else {
            format!("You see {}.", others.join(", "))
        };
        format!(
            "You are in the {here}. {company} From here you can go to: {}.",
            exits.join(", ")
        )
    }
}

impl World for SandboxWorld {
    fn apply(&self, request: ActionRequest<'_>) -> WorldOutcome {
        let ActionRequest {
            actor,
            location,
            command,
            reason,
        } = request;
        let reason = reason.map(str::to_string);
        let event = |kind: EventKind, description: String| {
            Event::new(kind, actor.clone(), description, location.clone()).with_reason(reason.clone())
        };

        match command {
            Command::GoTo { place } => {
                let Some(destination) = self.resolve_place(place.as_str()) else {
                    return WorldOutcome::failed(format!("There is no location called '{place}'."));
                };
                if &destination == location {
                    return WorldOutcome::failed(format!("You are already in the {destination}."));
                }
                let movement = Movement {
                    origin: location.clone(),
                    destination: destination.clone(),
                    via: "goes".into(),
                };
                let description = format!("{actor} goes from {location} to {destination}.");
                WorldOutcome::ok(format!("You go to the {destination}."))
                    .moved_to(destination.clone())
                    .with_event(
                        Event::new(EventKind::Movement, actor.clone(), description, destination)
                            .with_reason(reason.clone())
                            .with_movement(movement),
                    )
            }
            Command::Say { text } => {
                let text = text.trim_matches('"');
                WorldOutcome::ok(format!("You say: \"{text}\""))
                    .with_event(event(EventKind::Speech, format!("{actor} says: \"{text}\"")).with_message(text))
            }
            Command::Shout { text } => {
                let text = text.trim_matches('"');
                WorldOutcome::ok(format!("You shout: \"{text}\""))
                    .with_event(event(EventKind::Shout, format!("{actor} shouts: \"{text}\"")).with_message(text))
            }
            Command::Emote { action } => WorldOutcome::ok(format!("{actor} {action}"))
                .with_event(event(EventKind::Emote, format!("{actor} {action}"))),
            Command::Look => WorldOutcome::ok(self.look(actor, location))
                .with_event(event(EventKind::Observation, format!("{actor} looks around."))),
            Command::Note { title, .. } => WorldOutcome::ok(format!("You make a note titled '{title}'."))
                .with_event(event(EventKind::Command, format!("{actor} makes a mental note."))),
            Command::Recall { .. } | Command::Dream => {
                WorldOutcome::failed("That happens in your head, not in the world.")
            }
        }
    }

    fn resolve_place(&self, name: &str) -> Option<Location> {
        let name = name.trim().trim_end_matches('.');
        let name = name
            .strip_prefix("the ")
            .or_else(|| name.strip_prefix("The "))
            .unwrap_or(name);
        self.places
            .iter()
            .find(|place| place.as_str().eq_ignore_ascii_case(name))
            .cloned()
    }
}
