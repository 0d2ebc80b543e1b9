//! Turn scheduler
//!
//! Every actor carries a cost. Acting raises it, and after each charge the
//! table is renormalized so the cheapest actor sits at zero. The next actor is
//! the cheapest one (cost mode) or the one with the most unread observations
//! (pending-count mode). Ties go to whoever acted longest ago, then to
//! registration order.
//!
//! Humans and agents are charged asymmetrically: a human never pays more than
//! it takes to drop one rank, an agent always pays at least that much.

use crate::command::{Command, CommandParser};
use crate::config::TurnRules;
use crate::error::{ValidationError, ValidationResult};
use minimind_types::ActorId;
use serde::{Deserialize, Serialize};
use std::cmp::Reverse;
use std::collections::HashMap;
use std::fmt;
use tracing::{debug, info};

/// Selection algorithm
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnMode {
    #[default]
    Cost,
    PendingCount,
}

impl fmt::Display for TurnMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TurnMode::Cost => f.write_str("cost"),
            TurnMode::PendingCount => f.write_str("pending"),
        }
    }
}

#[derive(Debug, Clone)]
struct ActorState {
    cost: u64,
    pending: u64,
    /// Ledger position of the last turn, 0 if never acted
    last_acted: u64,
    registered: u64,
    is_human: bool,
}

/// One row of the displayed turn order
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActorStanding {
    pub actor: ActorId,
    pub cost: u64,
    pub pending: u64,
    pub last_acted: u64,
    pub is_human: bool,
}

/// What a charge actually did
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChargeReceipt {
    pub actor: ActorId,
    pub raw: u64,
    pub effective: u64,
    /// Who is up after the charge
    pub next: Option<ActorId>,
}

#[derive(Debug)]
pub struct Scheduler {
    rules: TurnRules,
    parser: CommandParser,
    mode: TurnMode,
    override_mode: bool,
    actors: HashMap<ActorId, ActorState>,
    ledger: Vec<ActorId>,
    registrations: u64,
}

impl Scheduler {
    pub fn new(rules: TurnRules, parser: CommandParser) -> Self {
        Self {
            mode: rules.mode,
            rules,
            parser,
            override_mode: false,
            actors: HashMap::new(),
            ledger: Vec::new(),
            registrations: 0,
        }
    }

    /// Register an actor. Humans start at cost 0, agents at 1. No-op (returns
    /// false) if already registered.
    pub fn register(&mut self, actor: ActorId, is_human: bool) -> bool {
        if self.actors.contains_key(&actor) {
            return false;
        }
        self.registrations += 1;
        debug!(actor = %actor, is_human, "registered with scheduler");
        self.actors.insert(
            actor,
            ActorState {
                cost: if is_human { 0 } else { 1 },
                pending: 0,
                last_acted: 0,
                registered: self.registrations,
                is_human,
            },
        );
        true
    }

    pub fn unregister(&mut self, actor: &ActorId) -> bool {
        self.actors.remove(actor).is_some()
    }

    pub fn is_registered(&self, actor: &ActorId) -> bool {
        self.actors.contains_key(actor)
    }

    pub fn is_human(&self, actor: &ActorId) -> bool {
        self.actors.get(actor).is_some_and(|s| s.is_human)
    }

    pub fn set_mode(&mut self, mode: TurnMode) {
        if self.mode != mode {
            info!(%mode, "scheduling mode changed");
        }
        self.mode = mode;
    }

    pub fn mode(&self) -> TurnMode {
        self.mode
    }

    pub fn set_override_mode(&mut self, enabled: bool) {
        if self.override_mode != enabled {
            info!(enabled, "override mode changed");
        }
        self.override_mode = enabled;
    }

    pub fn override_mode(&self) -> bool {
        self.override_mode
    }

    pub fn rules(&self) -> &TurnRules {
        &self.rules
    }

    pub fn cost(&self, actor: &ActorId) -> Option<u64> {
        self.actors.get(actor).map(|s| s.cost)
    }

    pub fn pending(&self, actor: &ActorId) -> Option<u64> {
        self.actors.get(actor).map(|s| s.pending)
    }

    pub fn ledger(&self) -> &[ActorId] {
        &self.ledger
    }

    /// Full ranking; the first entry is the next actor
    pub fn turn_order(&self) -> Vec<ActorId> {
        let mut rows: Vec<(&ActorId, &ActorState)> = self.actors.iter().collect();
        match self.mode {
            TurnMode::Cost => rows.sort_by_key(|(_, s)| (s.cost, s.last_acted, s.registered)),
            TurnMode::PendingCount => {
                rows.sort_by_key(|(_, s)| (Reverse(s.pending), s.last_acted, s.registered))
            }
        }
        if self.override_mode {
            // stable, so humans keep their relative order
            rows.sort_by_key(|(_, s)| !s.is_human);
        }
        rows.into_iter().map(|(id, _)| id.clone()).collect()
    }

    pub fn next_actor(&self) -> Option<ActorId> {
        self.turn_order().into_iter().next()
    }

    pub fn snapshot(&self) -> Vec<ActorStanding> {
        self.turn_order()
            .into_iter()
            .filter_map(|actor| {
                let s = self.actors.get(&actor)?;
                Some(ActorStanding {
                    cost: s.cost,
                    pending: s.pending,
                    last_acted: s.last_acted,
                    is_human: s.is_human,
                    actor,
                })
            })
            .collect()
    }

    /// Check that `actor` may act now
    pub fn ensure_turn(&self, actor: &ActorId) -> ValidationResult<()> {
        let state = self
            .actors
            .get(actor)
            .ok_or_else(|| ValidationError::UnknownActor(actor.clone()))?;
        if self.override_mode && state.is_human {
            return Ok(());
        }
        let expected = self.next_actor();
        if expected.as_ref() == Some(actor) {
            Ok(())
        } else {
            Err(ValidationError::NotYourTurn {
                actor: actor.clone(),
                expected,
            })
        }
    }

    /// Cost of a command line; unparseable text costs the base cost
    pub fn compute_cost(&self, text: &str) -> u64 {
        match self.parser.parse(text) {
            Ok(command) => self.cost_of(&command),
            Err(_) => self.rules.base_cost,
        }
    }

    pub fn cost_of(&self, command: &Command) -> u64 {
        let rules = &self.rules;
        if let Command::Recall { .. } = command {
            return rules.recall_cost;
        }
        if !rules.scale_with_content {
            return rules.base_cost;
        }
        let extra = match command {
            Command::Say { text } => per_words(text, rules.say_divisor),
            Command::Shout { text } => per_words(text, rules.shout_divisor),
            Command::Note { content, .. } => per_words(content, rules.note_divisor),
            Command::Emote { action } => per_words(action, rules.emote_divisor),
            Command::Dream => rules.dream_surcharge,
            Command::GoTo { .. } | Command::Look | Command::Recall { .. } => 0,
        };
        rules.base_cost + extra
    }

    /// Charge `actor` for a turn, apply the human cap or agent floor, then
    /// renormalize.
    pub fn charge(&mut self, actor: &ActorId, raw: u64) -> ValidationResult<ChargeReceipt> {
        let state = self
            .actors
            .get(actor)
            .ok_or_else(|| ValidationError::UnknownActor(actor.clone()))?;
        let is_human = state.is_human;

        let effective = if self.override_mode && is_human {
            0
        } else {
            match self.rank_gap(actor) {
                Some(gap) if is_human => (raw as i128).min(gap.max(1)) as u64,
                Some(gap) => (raw as i128).max(gap) as u64,
                None => raw,
            }
        };

        self.stamp(actor);
        if let Some(state) = self.actors.get_mut(actor) {
            state.cost += effective;
            state.pending = 0;
        }
        self.normalize();

        let next = self.next_actor();
        info!(
            actor = %actor,
            raw,
            effective,
            next = next.as_ref().map(ActorId::as_str).unwrap_or("-"),
            "charged turn"
        );
        Ok(ChargeReceipt {
            actor: actor.clone(),
            raw,
            effective,
            next,
        })
    }

    /// Give up the turn without acting. Only the first actor in order may
    /// pass, there must be someone to pass to, and an overriding human cannot
    /// pass at all.
    pub fn pass_turn(&mut self, actor: &ActorId) -> bool {
        let Some(state) = self.actors.get(actor) else {
            return false;
        };
        if self.override_mode && state.is_human {
            return false;
        }
        let order = self.turn_order();
        if order.len() < 2 || order.first() != Some(actor) {
            return false;
        }
        let next_cost = self.actors.get(&order[1]).map(|s| s.cost).unwrap_or(0);

        self.stamp(actor);
        match self.mode {
            TurnMode::PendingCount => {
                if let Some(state) = self.actors.get_mut(actor) {
                    state.pending = 0;
                }
            }
            TurnMode::Cost => {
                if let Some(state) = self.actors.get_mut(actor) {
                    state.cost = next_cost + 1;
                }
                self.normalize();
            }
        }
        info!(actor = %actor, mode = %self.mode, "passed turn");
        true
    }

    pub fn increment_pending(&mut self, actor: &ActorId, amount: u64) -> bool {
        match self.actors.get_mut(actor) {
            Some(state) => {
                state.pending += amount;
                true
            }
            None => false,
        }
    }

    /// `next - current + 1` when `actor` is first and someone follows
    fn rank_gap(&self, actor: &ActorId) -> Option<i128> {
        let order = self.turn_order();
        if order.first() != Some(actor) {
            return None;
        }
        let next = self.actors.get(order.get(1)?)?;
        let current = self.actors.get(actor)?;
        Some(next.cost as i128 - current.cost as i128 + 1)
    }

    fn stamp(&mut self, actor: &ActorId) {
        self.ledger.push(actor.clone());
        let seq = self.ledger.len() as u64;
        if let Some(state) = self.actors.get_mut(actor) {
            state.last_acted = seq;
        }
    }

    fn normalize(&mut self) {
        let Some(min) = self.actors.values().map(|s| s.cost).min() else {
            return;
        };
        if min == 0 {
            return;
        }
        for state in self.actors.values_mut() {
            state.cost -= min;
        }
    }
}

fn per_words(text: &str, divisor: u64) -> u64 {
    let words = text.split_whitespace().count() as u64;
    words.div_ceil(divisor.max(1))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(name: &str) -> ActorId {
        ActorId::from(name)
    }

    fn scheduler() -> Scheduler {
        Scheduler::new(TurnRules::default(), CommandParser::default())
    }

    fn cast() -> Scheduler {
        let mut s = scheduler();
        s.register(id("A"), true);
        s.register(id("B"), false);
        s.register(id("C"), false);
        s
    }

    #[test]
    fn test_human_cap_scenario() {
        let mut s = cast();
        assert_eq!(s.next_actor(), Some(id("A")));

        // message words only: ceil(3 / 3) on top of the base
        let raw = s.compute_cost("SAY hi there now");
        assert_eq!(raw, 2);
        let receipt = s.charge(&id("A"), raw).unwrap();
        assert_eq!(receipt.effective, 2);
        assert_eq!(s.cost(&id("A")), Some(1));
        assert_eq!(s.cost(&id("B")), Some(0));
        assert_eq!(s.cost(&id("C")), Some(0));
        assert_eq!(receipt.next, Some(id("B")));
    }

    #[test]
    fn test_human_cap_trims_long_speech() {
        let mut s = cast();
        let raw = s.compute_cost("SAY hi there right now");
        assert_eq!(raw, 3);
        let receipt = s.charge(&id("A"), raw).unwrap();
        // capped at the gap to the next actor plus one
        assert_eq!(receipt.effective, 2);
        assert_eq!(s.cost(&id("A")), Some(1));
        assert_eq!(receipt.next, Some(id("B")));
    }

    #[test]
    fn test_agent_floor() {
        let mut s = cast();
        s.charge(&id("A"), 2).unwrap();
        assert_eq!(s.next_actor(), Some(id("B")));
        // B at 0, C at 0: floor is 0 - 0 + 1
        let receipt = s.charge(&id("B"), 1).unwrap();
        assert_eq!(receipt.effective, 1);
        assert_eq!(s.next_actor(), Some(id("C")));
    }

    #[test]
    fn test_ties_go_to_longest_waiting() {
        let mut s = scheduler();
        s.register(id("B"), false);
        s.register(id("C"), false);
        s.register(id("D"), false);
        // never acted: registration order
        assert_eq!(s.turn_order(), vec![id("B"), id("C"), id("D")]);

        s.charge(&id("B"), 1).unwrap();
        s.charge(&id("C"), 1).unwrap();
        s.charge(&id("D"), 1).unwrap();
        // all back at zero; B acted longest ago
        assert_eq!(s.next_actor(), Some(id("B")));
    }

    #[test]
    fn test_empty_and_unknown() {
        let mut s = scheduler();
        assert_eq!(s.next_actor(), None);
        assert!(!s.pass_turn(&id("ghost")));
        assert!(!s.increment_pending(&id("ghost"), 1));
        assert!(matches!(
            s.charge(&id("ghost"), 1),
            Err(ValidationError::UnknownActor(_))
        ));
        assert!(!s.unregister(&id("ghost")));
    }

    #[test]
    fn test_register_is_idempotent() {
        let mut s = cast();
        s.charge(&id("A"), 1).unwrap();
        let before = s.snapshot();
        assert!(!s.register(id("A"), true));
        assert_eq!(s.snapshot(), before);
    }

    #[test]
    fn test_pending_mode() {
        let mut s = cast();
        s.set_mode(TurnMode::PendingCount);
        s.increment_pending(&id("C"), 3);
        s.increment_pending(&id("B"), 1);
        assert_eq!(s.next_actor(), Some(id("C")));

        assert!(s.pass_turn(&id("C")));
        assert_eq!(s.pending(&id("C")), Some(0));
        assert_eq!(s.pending(&id("B")), Some(1));
        assert_eq!(s.next_actor(), Some(id("B")));
    }

    #[test]
    fn test_pass_requires_first_place() {
        let mut s = cast();
        assert!(!s.pass_turn(&id("B")));
        assert!(s.pass_turn(&id("A")));
        // A moved to B's cost + 1, then renormalized
        assert_eq!(s.cost(&id("A")), Some(1));
        assert_eq!(s.next_actor(), Some(id("B")));
        assert_eq!(s.ledger(), &[id("A")]);
    }

    #[test]
    fn test_single_actor_cannot_pass() {
        let mut s = scheduler();
        s.register(id("solo"), false);
        assert!(!s.pass_turn(&id("solo")));
        let receipt = s.charge(&id("solo"), 4).unwrap();
        assert_eq!(receipt.effective, 4);
        assert_eq!(s.cost(&id("solo")), Some(0));
    }

    #[test]
    fn test_override_mode() {
        let mut s = cast();
        s.charge(&id("A"), 2).unwrap();
        assert_eq!(s.next_actor(), Some(id("B")));

        s.set_override_mode(true);
        assert_eq!(s.next_actor(), Some(id("A")));
        assert!(s.ensure_turn(&id("A")).is_ok());
        assert!(!s.pass_turn(&id("A")));

        let receipt = s.charge(&id("A"), 9).unwrap();
        assert_eq!(receipt.effective, 0);
        assert_eq!(s.ledger().len(), 2);
    }

    #[test]
    fn test_ensure_turn() {
        let s = cast();
        assert!(s.ensure_turn(&id("A")).is_ok());
        assert_eq!(
            s.ensure_turn(&id("B")),
            Err(ValidationError::NotYourTurn {
                actor: id("B"),
                expected: Some(id("A"))
            })
        );
    }

    #[test]
    fn test_cost_table() {
        let s = scheduler();
        assert_eq!(s.compute_cost("GO TO Kitchen"), 1);
        assert_eq!(s.compute_cost("LOOK"), 1);
        assert_eq!(s.compute_cost("SAY one two three four"), 3);
        assert_eq!(s.compute_cost("SHOUT one two three"), 3);
        assert_eq!(s.compute_cost("NOTE plan: a b c d e f g h"), 3);
        assert_eq!(s.compute_cost("EMOTE waves"), 2);
        assert_eq!(s.compute_cost("RECALL the plan"), 2);
        assert_eq!(s.compute_cost("DREAM"), 5);
        assert_eq!(s.compute_cost("FLY QUIETLY"), 1);
    }

    #[test]
    fn test_flat_costs() {
        let rules = TurnRules {
            scale_with_content: false,
            ..TurnRules::default()
        };
        let s = Scheduler::new(rules, CommandParser::default());
        assert_eq!(s.compute_cost("SAY a very long sentence indeed"), 1);
        assert_eq!(s.compute_cost("RECALL x"), 2);
    }
}
