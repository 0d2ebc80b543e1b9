//! Event bus
//!
//! Publishes world events to per-actor observers. Recipients are picked by
//! event kind and where actors stand: shouts reach everyone, movements reach
//! both ends of the trip, everything else stays in the room. Identical events
//! published within a short window are dropped.

mod observer;
mod window;

pub use observer::{FnObserver, Observer, ObserverError, ObserverId, SharedObserver};
pub use window::{Fingerprint, RecentEventWindow};

use crate::config::BusConfig;
use chrono::{DateTime, Utc};
use minimind_types::{ActorId, EventKind, Location};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use tracing::{debug, warn};

/// Where actors currently are
pub trait Whereabouts: Send + Sync {
    fn location_of(&self, actor: &ActorId) -> Option<Location>;

    fn actors_at(&self, location: &Location) -> Vec<ActorId>;

    fn everyone(&self) -> Vec<ActorId>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Movement {
    pub origin: Location,
    pub destination: Location,
    /// Verb phrase for the trip, e.g. "walks"
    pub via: String,
}

/// A world event as published
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    pub kind: EventKind,
    pub actor: ActorId,
    pub description: String,
    pub location: Location,
    pub reason: Option<String>,
    /// Stamped on publish when absent
    pub timestamp: Option<DateTime<Utc>>,
    pub movement: Option<Movement>,
    pub message: Option<String>,
}

impl Event {
    pub fn new(
        kind: EventKind,
        actor: ActorId,
        description: impl Into<String>,
        location: Location,
    ) -> Self {
        Self {
            kind,
            actor,
            description: description.into(),
            location,
            reason: None,
            timestamp: None,
            movement: None,
            message: None,
        }
    }

    pub fn with_reason(mut self, reason: Option<String>) -> Self {
        self.reason = reason;
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_movement(mut self, movement: Movement) -> Self {
        self.movement = Some(movement);
        self
    }

    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    fn fingerprint(&self, timestamp: DateTime<Utc>) -> Fingerprint {
        Fingerprint {
            actor: self.actor.clone(),
            description: self.description.clone(),
            location: self.location.clone(),
            kind: self.kind,
            timestamp,
        }
    }
}

/// One event as seen by one recipient
#[derive(Debug, Clone)]
pub struct Delivery {
    pub event: Arc<Event>,
    pub observer: ActorId,
    pub is_actor: bool,
    /// Description rewritten for this recipient's point of view
    pub description: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishOutcome {
    /// Number of observer callbacks that accepted the event
    Delivered(usize),
    Suppressed,
}

struct BusState {
    observers: HashMap<ActorId, Vec<(ObserverId, SharedObserver)>>,
    window: RecentEventWindow,
}

pub struct EventBus {
    state: Mutex<BusState>,
    whereabouts: Arc<dyn Whereabouts>,
    threshold: chrono::Duration,
}

impl EventBus {
    pub fn new(config: &BusConfig, whereabouts: Arc<dyn Whereabouts>) -> Self {
        let threshold = chrono::Duration::milliseconds(config.dedup_threshold_ms as i64);
        Self {
            state: Mutex::new(BusState {
                observers: HashMap::new(),
                window: RecentEventWindow::new(config.window_capacity),
            }),
            whereabouts,
            threshold,
        }
    }

    /// Attach an observer to an actor. Registering the same observer twice
    /// returns the original id.
    pub fn register(&self, actor: ActorId, observer: SharedObserver) -> ObserverId {
        let mut state = self.state.lock();
        let entries = state.observers.entry(actor).or_default();
        if let Some((id, _)) = entries.iter().find(|(_, o)| Arc::ptr_eq(o, &observer)) {
            return *id;
        }
        let id = ObserverId::new();
        entries.push((id, observer));
        id
    }

    /// Remove one observer, or every observer of the actor when `id` is None.
    /// Returns how many were removed.
    pub fn unregister(&self, actor: &ActorId, id: Option<ObserverId>) -> usize {
        let mut state = self.state.lock();
        let Some(entries) = state.observers.get_mut(actor) else {
            return 0;
        };
        let before = entries.len();
        match id {
            Some(id) => entries.retain(|(existing, _)| *existing != id),
            None => entries.clear(),
        }
        let removed = before - entries.len();
        if entries.is_empty() {
            state.observers.remove(actor);
        }
        removed
    }

    pub fn observer_count(&self, actor: &ActorId) -> usize {
        self.state
            .lock()
            .observers
            .get(actor)
            .map_or(0, Vec::len)
    }

    /// Publish an event. `recipients` overrides the location-based audience.
    pub fn publish(&self, mut event: Event, recipients: Option<Vec<ActorId>>) -> PublishOutcome {
        let timestamp = *event.timestamp.get_or_insert_with(Utc::now);
        let recipients = recipients.unwrap_or_else(|| self.audience(&event));

        let targets: Vec<(ActorId, SharedObserver)> = {
            let mut state = self.state.lock();
            let fingerprint = event.fingerprint(timestamp);
            if state.window.is_duplicate(&fingerprint, self.threshold) {
                debug!(
                    kind = %event.kind,
                    actor = %event.actor,
                    description = %event.description,
                    "suppressed duplicate event"
                );
                return PublishOutcome::Suppressed;
            }
            state.window.record(fingerprint);

            recipients
                .iter()
                .flat_map(|recipient| {
                    state
                        .observers
                        .get(recipient)
                        .into_iter()
                        .flatten()
                        .map(move |(_, observer)| (recipient.clone(), observer.clone()))
                })
                .collect()
        };

        // callbacks run without the lock so they may publish in turn
        let event = Arc::new(event);
        let mut delivered = 0;
        for (recipient, observer) in targets {
            let delivery = Delivery {
                event: event.clone(),
                is_actor: recipient == event.actor,
                description: self.perspective(&event, &recipient),
                observer: recipient,
            };
            match catch_unwind(AssertUnwindSafe(|| observer.on_event(&delivery))) {
                Ok(Ok(())) => delivered += 1,
                Ok(Err(err)) => {
                    warn!(observer = %delivery.observer, kind = %event.kind, error = %err, "observer rejected event")
                }
                Err(_) => {
                    warn!(observer = %delivery.observer, kind = %event.kind, "observer panicked")
                }
            }
        }
        debug!(kind = %event.kind, actor = %event.actor, delivered, "published event");
        PublishOutcome::Delivered(delivered)
    }

    fn audience(&self, event: &Event) -> Vec<ActorId> {
        match (&event.kind, &event.movement) {
            (EventKind::Shout, _) => self.whereabouts.everyone(),
            (EventKind::Movement, Some(movement)) => {
                let mut actors = self.whereabouts.actors_at(&movement.origin);
                for actor in self.whereabouts.actors_at(&movement.destination) {
                    if !actors.contains(&actor) {
                        actors.push(actor);
                    }
                }
                actors
            }
            _ => self.whereabouts.actors_at(&event.location),
        }
    }

    fn perspective(&self, event: &Event, recipient: &ActorId) -> String {
        let description = match &event.movement {
            Some(m) if event.kind == EventKind::Movement => {
                let left_behind =
                    self.whereabouts.location_of(recipient).as_ref() == Some(&m.origin);
                if recipient == &event.actor || left_behind {
                    format!("{} {} to {}.", event.actor, m.via, m.destination)
                } else {
                    format!("{} {} from {}.", event.actor, m.via, m.origin)
                }
            }
            _ => event.description.clone(),
        };
        if recipient == &event.actor {
            second_person(&description, &event.actor)
        } else {
            description
        }
    }
}

const CONJUGATIONS: &[(&str, &str)] = &[
    ("says", "say"),
    ("shouts", "shout"),
    ("goes", "go"),
    ("walks", "walk"),
    ("looks", "look"),
    ("examines", "examine"),
    ("writes", "write"),
    ("tries", "try"),
    ("appears", "appear"),
    ("hesitates", "hesitate"),
    ("is", "are"),
    ("has", "have"),
];

/// "Bob says hi" -> "You say hi"
pub fn second_person(description: &str, actor: &ActorId) -> String {
    let Some(rest) = description
        .strip_prefix(actor.as_str())
        .and_then(|rest| rest.strip_prefix(' '))
    else {
        return description.to_string();
    };
    let (verb, tail) = match rest.find(|c: char| c.is_whitespace() || c == ':' || c == ',') {
        Some(idx) => rest.split_at(idx),
        None => (rest, ""),
    };
    format!("You {}{tail}", conjugate(verb))
}

fn conjugate(verb: &str) -> &str {
    if let Some((_, second)) = CONJUGATIONS.iter().find(|(third, _)| *third == verb) {
        return second;
    }
    for suffix in ["shes", "ches", "xes", "sses"] {
        if verb.ends_with(suffix) {
            return &verb[..verb.len() - 2];
        }
    }
    match verb.strip_suffix('s') {
        Some(stem) if !stem.is_empty() && !stem.ends_with('s') => stem,
        _ => verb,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    struct Fixed(Vec<(ActorId, Location)>);

    impl Whereabouts for Fixed {
        fn location_of(&self, actor: &ActorId) -> Option<Location> {
            self.0.iter().find(|(a, _)| a == actor).map(|(_, l)| l.clone())
        }

        fn actors_at(&self, location: &Location) -> Vec<ActorId> {
            self.0
                .iter()
                .filter(|(_, l)| l == location)
                .map(|(a, _)| a.clone())
                .collect()
        }

        fn everyone(&self) -> Vec<ActorId> {
            self.0.iter().map(|(a, _)| a.clone()).collect()
        }
    }

    fn bus() -> EventBus {
        let world = Fixed(vec![
            (ActorId::from("Bob"), Location::from("Kitchen")),
            (ActorId::from("Ann"), Location::from("Kitchen")),
            (ActorId::from("Cy"), Location::from("Library")),
        ]);
        EventBus::new(&BusConfig::default(), Arc::new(world))
    }

    fn recorder() -> (SharedObserver, Arc<Mutex<Vec<String>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let observer = FnObserver::shared(move |d: &Delivery| {
            sink.lock().push(d.description.clone());
            Ok(())
        });
        (observer, seen)
    }

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    fn speech(secs: i64) -> Event {
        Event::new(
            EventKind::Speech,
            ActorId::from("Bob"),
            "Bob says hi",
            Location::from("Kitchen"),
        )
        .at(at(secs))
    }

    #[test]
    fn test_dedup_window() {
        let bus = bus();
        let (observer, seen) = recorder();
        bus.register(ActorId::from("Ann"), observer);

        assert_eq!(bus.publish(speech(0), None), PublishOutcome::Delivered(1));
        assert_eq!(bus.publish(speech(1), None), PublishOutcome::Suppressed);
        assert_eq!(bus.publish(speech(3), None), PublishOutcome::Delivered(1));
        assert_eq!(seen.lock().len(), 2);
    }

    #[test]
    fn test_location_scoping_and_shouts() {
        let bus = bus();
        let (cy, seen) = recorder();
        bus.register(ActorId::from("Cy"), cy);

        bus.publish(speech(0), None);
        assert!(seen.lock().is_empty());

        let shout = Event::new(
            EventKind::Shout,
            ActorId::from("Bob"),
            "Bob shouts FIRE",
            Location::from("Kitchen"),
        );
        bus.publish(shout, None);
        assert_eq!(seen.lock().as_slice(), ["Bob shouts FIRE"]);
    }

    #[test]
    fn test_actor_sees_second_person() {
        let bus = bus();
        let (bob, seen) = recorder();
        bus.register(ActorId::from("Bob"), bob);
        bus.publish(speech(0), None);
        assert_eq!(seen.lock().as_slice(), ["You say hi"]);
    }

    #[test]
    fn test_movement_perspectives() {
        let bus = bus();
        let (ann, ann_seen) = recorder();
        let (cy, cy_seen) = recorder();
        bus.register(ActorId::from("Ann"), ann);
        bus.register(ActorId::from("Cy"), cy);

        let walk = Event::new(
            EventKind::Movement,
            ActorId::from("Dee"),
            "Dee walks to Library",
            Location::from("Library"),
        )
        .with_movement(Movement {
            origin: Location::from("Kitchen"),
            destination: Location::from("Library"),
            via: "walks".into(),
        });
        bus.publish(walk, None);

        assert_eq!(ann_seen.lock().as_slice(), ["Dee walks to Library."]);
        assert_eq!(cy_seen.lock().as_slice(), ["Dee walks from Kitchen."]);
    }

    #[test]
    fn test_mover_sees_destination() {
        let bus = bus();
        let (cy, seen) = recorder();
        bus.register(ActorId::from("Cy"), cy);

        let walk = Event::new(
            EventKind::Movement,
            ActorId::from("Cy"),
            "Cy walks to Library",
            Location::from("Library"),
        )
        .with_movement(Movement {
            origin: Location::from("Kitchen"),
            destination: Location::from("Library"),
            via: "walks".into(),
        });
        bus.publish(walk, None);

        assert_eq!(seen.lock().as_slice(), ["You walk to Library."]);
    }

    #[test]
    fn test_failing_observer_does_not_stop_delivery() {
        let bus = bus();
        bus.register(
            ActorId::from("Bob"),
            FnObserver::shared(|_: &Delivery| Err(ObserverError("broken".into()))),
        );
        bus.register(
            ActorId::from("Bob"),
            FnObserver::shared(|_: &Delivery| panic!("observer bug")),
        );
        let (ann, seen) = recorder();
        bus.register(ActorId::from("Ann"), ann);

        assert_eq!(bus.publish(speech(0), None), PublishOutcome::Delivered(1));
        assert_eq!(seen.lock().len(), 1);
    }

    #[test]
    fn test_register_idempotent_and_unregister() {
        let bus = bus();
        let ann = ActorId::from("Ann");
        let (observer, _) = recorder();
        let first = bus.register(ann.clone(), observer.clone());
        assert_eq!(bus.register(ann.clone(), observer), first);
        let (other, _) = recorder();
        bus.register(ann.clone(), other);
        assert_eq!(bus.observer_count(&ann), 2);

        assert_eq!(bus.unregister(&ann, Some(first)), 1);
        assert_eq!(bus.unregister(&ann, None), 1);
        assert_eq!(bus.observer_count(&ann), 0);
        assert_eq!(bus.unregister(&ann, None), 0);
    }

    #[test]
    fn test_explicit_recipients() {
        let bus = bus();
        let (cy, seen) = recorder();
        bus.register(ActorId::from("Cy"), cy);
        bus.publish(speech(0), Some(vec![ActorId::from("Cy")]));
        assert_eq!(seen.lock().len(), 1);
    }

    #[test]
    fn test_second_person() {
        let bob = ActorId::from("Bob");
        assert_eq!(second_person("Bob says: hello", &bob), "You say: hello");
        assert_eq!(second_person("Bob waves", &bob), "You wave");
        assert_eq!(second_person("Bob reaches up", &bob), "You reach up");
        assert_eq!(second_person("Bobby says hi", &bob), "Bobby says hi");
    }
}
