//! Causal frontier keyed by actor (spec §3.2).

use std::collections::HashMap;

use crate::ticket::{ActorId, TimeTicket};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// `actor_id -> max observed lamport`. Used as the causal frontier for GC and
/// for concurrent-edit filtering during remote application.
#[derive(Clone, Debug, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct VersionVector {
    entries: HashMap<ActorId, u64>,
}

impl VersionVector {
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    /// Record that `actor` has been observed up to `lamport` (a no-op if we've
    /// already observed something later).
    pub fn observe(&mut self, actor: ActorId, lamport: u64) {
        let entry = self.entries.entry(actor).or_insert(0);
        if lamport > *entry {
            *entry = lamport;
        }
    }

    pub fn observe_ticket(&mut self, ticket: &TimeTicket) {
        self.observe(ticket.actor_id, ticket.lamport);
    }

    /// Max lamport observed for `actor`, or 0 if never observed.
    pub fn get(&self, actor: ActorId) -> u64 {
        self.entries.get(&actor).copied().unwrap_or(0)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// `vv[t.actor] >= t.lamport`: whether this frontier has already seen `t`
    /// or anything causally after it from the same actor.
    pub fn after_or_equal(&self, ticket: &TimeTicket) -> bool {
        self.get(ticket.actor_id) >= ticket.lamport
    }

    /// Pointwise max merge with `other`, as used when folding a remote
    /// change's `known_state` into our own frontier.
    pub fn merge(&mut self, other: &VersionVector) {
        for (&actor, &lamport) in &other.entries {
            self.observe(actor, lamport);
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (ActorId, u64)> + '_ {
        self.entries.iter().map(|(&a, &l)| (a, l))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn after_or_equal_matches_observed_frontier() {
        let mut vv = VersionVector::new();
        vv.observe(ActorId(1), 10);
        vv.observe(ActorId(2), 8);

        assert!(vv.after_or_equal(&TimeTicket::new(9, 0, ActorId(1))));
        assert!(vv.after_or_equal(&TimeTicket::new(10, 0, ActorId(1))));
        assert!(!vv.after_or_equal(&TimeTicket::new(11, 0, ActorId(1))));
        assert!(!vv.after_or_equal(&TimeTicket::new(1, 0, ActorId(3))));
    }

    #[test]
    fn observe_only_advances() {
        let mut vv = VersionVector::new();
        vv.observe(ActorId(1), 10);
        vv.observe(ActorId(1), 5);
        assert_eq!(vv.get(ActorId(1)), 10);
    }

    #[test]
    fn merge_takes_pointwise_max() {
        let mut a = VersionVector::new();
        a.observe(ActorId(1), 5);
        a.observe(ActorId(2), 1);

        let mut b = VersionVector::new();
        b.observe(ActorId(1), 3);
        b.observe(ActorId(2), 9);

        a.merge(&b);
        assert_eq!(a.get(ActorId(1)), 5);
        assert_eq!(a.get(ActorId(2)), 9);
    }
}
