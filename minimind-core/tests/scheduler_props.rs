//! Property tests for the scheduler invariants

use minimind_core::command::CommandParser;
use minimind_core::config::TurnRules;
use minimind_core::scheduler::{Scheduler, TurnMode};
use minimind_types::ActorId;
use proptest::prelude::*;

fn cast(agents: usize) -> (Scheduler, Vec<ActorId>) {
    let mut scheduler = Scheduler::new(TurnRules::default(), CommandParser::default());
    let mut ids = vec![ActorId::from("human")];
    scheduler.register(ids[0].clone(), true);
    for i in 0..agents {
        let id = ActorId::new(format!("agent-{i}"));
        scheduler.register(id.clone(), false);
        ids.push(id);
    }
    (scheduler, ids)
}

fn min_cost(scheduler: &Scheduler) -> u64 {
    scheduler
        .snapshot()
        .iter()
        .map(|row| row.cost)
        .min()
        .unwrap_or(0)
}

proptest! {
    #[test]
    fn min_cost_is_zero_after_every_charge(
        agents in 1usize..5,
        costs in prop::collection::vec(1u64..20, 1..40),
    ) {
        let (mut scheduler, _) = cast(agents);
        for raw in costs {
            let next = scheduler.next_actor().unwrap();
            scheduler.charge(&next, raw).unwrap();
            prop_assert_eq!(min_cost(&scheduler), 0);
        }
    }

    #[test]
    fn human_pays_at_most_one_rank(
        agents in 1usize..5,
        costs in prop::collection::vec(1u64..20, 1..40),
    ) {
        let (mut scheduler, ids) = cast(agents);
        let human = &ids[0];
        for raw in costs {
            let order = scheduler.turn_order();
            let next = order[0].clone();
            let gap = if &next == human {
                let own = scheduler.cost(human).unwrap();
                let following = scheduler.cost(&order[1]).unwrap();
                Some(following + 1 - own)
            } else {
                None
            };
            let receipt = scheduler.charge(&next, raw).unwrap();
            if let Some(gap) = gap {
                prop_assert!(receipt.effective <= gap.max(1));
                prop_assert!(receipt.effective <= raw);
            } else {
                prop_assert!(receipt.effective >= raw);
            }
        }
    }

    #[test]
    fn next_actor_heads_the_order(
        agents in 1usize..5,
        costs in prop::collection::vec(1u64..20, 0..20),
    ) {
        let (mut scheduler, _) = cast(agents);
        for raw in costs {
            let next = scheduler.next_actor().unwrap();
            scheduler.charge(&next, raw).unwrap();
        }
        let first = scheduler.next_actor();
        prop_assert_eq!(first.clone(), scheduler.next_actor());
        prop_assert_eq!(first, scheduler.snapshot().first().map(|row| row.actor.clone()));
    }

    #[test]
    fn pending_pass_zeroes_only_the_caller(
        pending in prop::collection::vec(0u64..10, 3),
    ) {
        let (mut scheduler, ids) = cast(2);
        scheduler.set_mode(TurnMode::PendingCount);
        for (id, amount) in ids.iter().zip(&pending) {
            scheduler.increment_pending(id, *amount);
        }
        let first = scheduler.next_actor().unwrap();
        let before: Vec<u64> = ids.iter().map(|id| scheduler.pending(id).unwrap()).collect();

        prop_assert!(scheduler.pass_turn(&first));
        for (id, was) in ids.iter().zip(before) {
            let now = scheduler.pending(id).unwrap();
            if id == &first {
                prop_assert_eq!(now, 0);
            } else {
                prop_assert_eq!(now, was);
            }
        }
    }
}
