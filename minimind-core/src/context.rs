//! Shared simulation context
//!
//! Everything a turn needs, constructed once and handed to each component.

use crate::bus::{Delivery, EventBus, Observer, ObserverError, Whereabouts};
use crate::command::CommandParser;
use crate::config::SimConfig;
use crate::memory::{MemoryKind, MemoryStore};
use crate::scheduler::Scheduler;
use crate::world::{SandboxWorld, World};
use minimind_types::{ActorId, Location};
use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::info;

/// Where every registered actor stands
#[derive(Debug, Default)]
pub struct Roster {
    positions: RwLock<BTreeMap<ActorId, Location>>,
}

impl Roster {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn place(&self, actor: ActorId, location: Location) {
        self.positions.write().insert(actor, location);
    }

    pub fn remove(&self, actor: &ActorId) -> Option<Location> {
        self.positions.write().remove(actor)
    }
}

impl Whereabouts for Roster {
    fn location_of(&self, actor: &ActorId) -> Option<Location> {
        self.positions.read().get(actor).cloned()
    }

    fn actors_at(&self, location: &Location) -> Vec<ActorId> {
        self.positions
            .read()
            .iter()
            .filter(|(_, here)| *here == location)
            .map(|(actor, _)| actor.clone())
            .collect()
    }

    fn everyone(&self) -> Vec<ActorId> {
        self.positions.read().keys().cloned().collect()
    }
}

/// Records what an actor sees and bumps their pending count
pub struct ObservationFeedback {
    store: Arc<dyn MemoryStore>,
    scheduler: Arc<Mutex<Scheduler>>,
}

impl Observer for ObservationFeedback {
    fn on_event(&self, delivery: &Delivery) -> Result<(), ObserverError> {
        if delivery.is_actor {
            return Ok(());
        }
        self.store.add_memory(
            MemoryKind::Observed,
            &delivery.description,
            delivery.event.reason.as_deref(),
        );
        if !self.scheduler.lock().increment_pending(&delivery.observer, 1) {
            return Err(ObserverError(format!(
                "{} is not scheduled",
                delivery.observer
            )));
        }
        Ok(())
    }
}

#[derive(Clone)]
pub struct SharedContext {
    pub config: Arc<SimConfig>,
    pub parser: Arc<CommandParser>,
    pub scheduler: Arc<Mutex<Scheduler>>,
    pub bus: Arc<EventBus>,
    pub roster: Arc<Roster>,
    pub world: Arc<dyn World>,
    minds: Arc<RwLock<HashMap<ActorId, Arc<dyn MemoryStore>>>>,
}

impl SharedContext {
    pub fn new(config: SimConfig, world: Arc<dyn World>, roster: Arc<Roster>) -> Self {
        let parser = CommandParser::new(&config.commands);
        let scheduler = Scheduler::new(config.turns.clone(), parser.clone());
        let bus = EventBus::new(&config.bus, roster.clone());
        Self {
            config: Arc::new(config),
            parser: Arc::new(parser),
            scheduler: Arc::new(Mutex::new(scheduler)),
            bus: Arc::new(bus),
            roster,
            world,
            minds: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Context over a [`SandboxWorld`] built from the `world` config section
    pub fn sandbox(config: SimConfig) -> Self {
        let roster = Arc::new(Roster::new());
        let world = SandboxWorld::new(
            config.world.places.iter().map(|p| Location::new(p.as_str())),
            roster.clone(),
        );
        Self::new(config, Arc::new(world), roster)
    }

    /// Put an actor into the world: scheduler, roster, memory, and an
    /// observer feeding what they see back into their memory
    pub fn enroll(
        &self,
        actor: ActorId,
        is_human: bool,
        start: Location,
        store: Arc<dyn MemoryStore>,
    ) {
        let start = self.world.resolve_place(start.as_str()).unwrap_or(start);
        info!(actor = %actor, is_human, start = %start, "enrolling actor");

        self.scheduler.lock().register(actor.clone(), is_human);
        self.roster.place(actor.clone(), start);
        self.minds.write().insert(actor.clone(), store.clone());
        self.bus.register(
            actor,
            Arc::new(ObservationFeedback {
                store,
                scheduler: self.scheduler.clone(),
            }),
        );
    }

    pub fn withdraw(&self, actor: &ActorId) {
        self.scheduler.lock().unregister(actor);
        self.roster.remove(actor);
        self.minds.write().remove(actor);
        self.bus.unregister(actor, None);
    }

    pub fn mind(&self, actor: &ActorId) -> Option<Arc<dyn MemoryStore>> {
        self.minds.read().get(actor).cloned()
    }

    pub fn location_of(&self, actor: &ActorId) -> Option<Location> {
        self.roster.location_of(actor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::{Event, PublishOutcome};
    use crate::memory::{AgentMind, HumanJournal};
    use minimind_types::EventKind;

    #[test]
    fn test_enroll_wires_observation_feedback() {
        let ctx = SharedContext::sandbox(SimConfig::default());
        let ada = ActorId::from("Ada");
        let bram = ActorId::from("Bram");
        let ada_mind = Arc::new(AgentMind::new(ada.clone(), ""));
        ctx.enroll(ada.clone(), false, Location::from("kitchen"), ada_mind.clone());
        ctx.enroll(
            bram.clone(),
            false,
            Location::from("Kitchen"),
            Arc::new(HumanJournal::new(bram.clone())),
        );
        assert_eq!(ctx.location_of(&ada), Some(Location::from("Kitchen")));

        let event = Event::new(
            EventKind::Speech,
            bram.clone(),
            "Bram says: \"hi\"",
            Location::from("Kitchen"),
        );
        assert_eq!(ctx.bus.publish(event, None), PublishOutcome::Delivered(2));

        assert_eq!(ctx.scheduler.lock().pending(&ada), Some(1));
        assert_eq!(ctx.scheduler.lock().pending(&bram), Some(0));
        let seen = ada_mind.memories(1);
        assert_eq!(seen[0].kind, MemoryKind::Observed);
        assert_eq!(seen[0].content, "Bram says: \"hi\"");
    }

    #[test]
    fn test_withdraw_removes_everything() {
        let ctx = SharedContext::sandbox(SimConfig::default());
        let ada = ActorId::from("Ada");
        ctx.enroll(
            ada.clone(),
            false,
            Location::from("Kitchen"),
            Arc::new(AgentMind::new(ada.clone(), "")),
        );
        ctx.withdraw(&ada);
        assert!(ctx.mind(&ada).is_none());
        assert!(ctx.location_of(&ada).is_none());
        assert_eq!(ctx.bus.observer_count(&ada), 0);
        assert!(!ctx.scheduler.lock().is_registered(&ada));
    }
}
