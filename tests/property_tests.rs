//! Property-based convergence checks (testable property 1: commutativity).

use crdt_engine::{ActorId, RgaTreeList, TimeTicket};
use proptest::prelude::*;

fn t(lamport: u64, actor: u128) -> TimeTicket {
    TimeTicket::new(lamport, 0, ActorId(actor))
}

/// Insert `n` elements all anchored at the head with distinct actors at the
/// same lamport tick, in an arbitrary application order; the final sequence
/// must not depend on that order (RGA tiebreak is a total order on ticket).
fn insert_all_anchored_at_head(order: &[usize]) -> Vec<TimeTicket> {
    let mut list = RgaTreeList::new();
    for &actor in order {
        let ticket = t(1, actor as u128);
        list.insert(ticket, TimeTicket::INITIAL, ticket).unwrap();
    }
    list.values()
}

proptest! {
    #[test]
    fn concurrent_head_inserts_converge_regardless_of_application_order(
        mut order in prop::collection::vec(1usize..6, 1..6)
    ) {
        order.dedup();
        prop_assume!(!order.is_empty());

        let canonical = insert_all_anchored_at_head(&order);

        let mut shuffled = order.clone();
        shuffled.reverse();
        let reversed = insert_all_anchored_at_head(&shuffled);

        prop_assert_eq!(canonical, reversed);
    }
}

proptest! {
    #[test]
    fn index_of_and_values_agree_after_arbitrary_inserts(actors in prop::collection::vec(1u128..10, 1..8)) {
        let mut list = RgaTreeList::new();
        let mut anchor = TimeTicket::INITIAL;
        let mut tickets = Vec::new();
        for (lamport, &actor) in actors.iter().enumerate() {
            let ticket = t(lamport as u64 + 1, actor);
            list.insert(ticket, anchor, ticket).unwrap();
            anchor = ticket;
            tickets.push(ticket);
        }

        for ticket in &tickets {
            let idx = list.index_of(*ticket).unwrap();
            prop_assert_eq!(list.values()[idx], *ticket);
        }
    }
}
