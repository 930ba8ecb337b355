//! Object-member map with tombstone retention (spec §4.4).
//!
//! Indexes children by `(key, created_at)`. The actual child [`crate::element::Element`]
//! payload lives in [`crate::root::CRDTRoot`]'s registry — this structure only
//! tracks identity and winner bookkeeping, mirroring how `RGATreeList`/
//! `RGATreeSplit` reference children by creation ticket rather than owning
//! them directly (spec §9's cyclic-reference note).

use std::collections::HashMap;

use crate::heap::TicketHeap;
use crate::ticket::TimeTicket;
use crate::version_vector::VersionVector;

#[derive(Clone, Debug)]
struct MemberNode {
    key: String,
    created_at: TimeTicket,
    removed_at: Option<TimeTicket>,
}

impl MemberNode {
    fn is_removed(&self) -> bool {
        self.removed_at.is_some()
    }
}

#[derive(Clone, Debug, Default)]
pub struct ElementRHT {
    by_key: HashMap<String, TimeTicket>,
    by_created_at: HashMap<TimeTicket, MemberNode>,
    /// Tombstoned bindings keyed by `removed_at`, so [`Self::prune_tombstones`]
    /// can pop the oldest-removed entries first instead of scanning
    /// `by_created_at` end to end.
    tombstones: TicketHeap<TimeTicket>,
}

impl ElementRHT {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `key` to a freshly created child identified by `created_at`.
    ///
    /// If a live node currently wins under `key` and it is older than the
    /// new child, it is tombstoned with `removed_at = created_at` and
    /// returned as the displaced element so the caller (the owning
    /// `CRDTObject`) can propagate the tombstone onto the actual element and
    /// hand it to the root's GC queue.
    pub fn set(&mut self, key: impl Into<String>, created_at: TimeTicket) -> Option<TimeTicket> {
        let key = key.into();
        let mut displaced = None;

        if let Some(&winner_id) = self.by_key.get(&key) {
            if winner_id < created_at {
                if let Some(node) = self.by_created_at.get_mut(&winner_id) {
                    if !node.is_removed() {
                        node.removed_at = Some(created_at);
                        displaced = Some(winner_id);
                        self.tombstones.push(created_at, winner_id);
                    }
                }
            }
        }

        self.by_created_at.insert(
            created_at,
            MemberNode {
                key: key.clone(),
                created_at,
                removed_at: None,
            },
        );

        let should_bind = match self.by_key.get(&key) {
            None => true,
            Some(&winner_id) => created_at > winner_id,
        };
        if should_bind {
            self.by_key.insert(key, created_at);
        }

        displaced
    }

    /// Tombstone the current winner under `key` at `executed_at`, returning
    /// its `created_at` on success (a no-op, returning `None`, if there is no
    /// live winner).
    pub fn remove_by_key(&mut self, key: &str, executed_at: TimeTicket) -> Option<TimeTicket> {
        let winner_id = *self.by_key.get(key)?;
        self.remove_by_created_at(winner_id, executed_at)
    }

    /// Tombstone the node identified by `created_at`, regardless of whether
    /// it is the current winner for its key.
    pub fn remove_by_created_at(
        &mut self,
        created_at: TimeTicket,
        executed_at: TimeTicket,
    ) -> Option<TimeTicket> {
        let node = self.by_created_at.get_mut(&created_at)?;
        if node.is_removed() {
            return None;
        }
        node.removed_at = Some(executed_at);
        self.tombstones.push(executed_at, created_at);
        Some(created_at)
    }

    /// Physically drop tombstoned bindings whose `removed_at` is causally
    /// known to every peer, draining the heap oldest-first rather than
    /// scanning `by_created_at`. Returns the `created_at` of each dropped
    /// binding.
    pub fn prune_tombstones(&mut self, min_synced_vv: &VersionVector) -> Vec<TimeTicket> {
        let mut pruned = Vec::new();
        while let Some(removed_at) = self.tombstones.peek_key() {
            if !min_synced_vv.after_or_equal(&removed_at) {
                break;
            }
            let (_, created_at) = self.tombstones.pop().unwrap();
            // The binding may have already been pruned via a different
            // removed_at entry (a node can be displaced once, recorded here,
            // then never touched again) or resurrected by a later winning
            // `set` under the same key — only drop it if it is still present
            // and still tombstoned.
            if let Some(node) = self.by_created_at.get(&created_at) {
                if node.is_removed() {
                    self.by_created_at.remove(&created_at);
                    pruned.push(created_at);
                }
            }
        }
        pruned
    }

    /// The live winner for `key`, if any.
    pub fn get(&self, key: &str) -> Option<TimeTicket> {
        let &id = self.by_key.get(key)?;
        let node = self.by_created_at.get(&id)?;
        if node.is_removed() {
            None
        } else {
            Some(id)
        }
    }

    pub fn has(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// All live winners, arbitrary order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, TimeTicket)> + '_ {
        self.by_key.iter().filter_map(|(k, &id)| {
            let node = self.by_created_at.get(&id)?;
            (!node.is_removed()).then_some((k.as_str(), id))
        })
    }

    /// Live winners sorted by key, for `to_sorted_json`.
    pub fn iter_sorted(&self) -> Vec<(&str, TimeTicket)> {
        let mut out: Vec<_> = self.iter().collect();
        out.sort_by(|a, b| a.0.cmp(b.0));
        out
    }

    pub fn len(&self) -> usize {
        self.iter().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ticket::ActorId;

    fn t(l: u64) -> TimeTicket {
        TimeTicket::new(l, 0, ActorId(1))
    }

    #[test]
    fn later_created_at_wins_and_displaces_previous() {
        let mut rht = ElementRHT::new();
        assert!(rht.set("k", t(1)).is_none());
        assert_eq!(rht.get("k"), Some(t(1)));

        let displaced = rht.set("k", t(2));
        assert_eq!(displaced, Some(t(1)));
        assert_eq!(rht.get("k"), Some(t(2)));
    }

    #[test]
    fn earlier_created_at_does_not_displace_winner() {
        let mut rht = ElementRHT::new();
        rht.set("k", t(5));
        let displaced = rht.set("k", t(2));
        assert!(displaced.is_none());
        assert_eq!(rht.get("k"), Some(t(5)));
    }

    #[test]
    fn remove_by_key_tombstones_winner() {
        let mut rht = ElementRHT::new();
        rht.set("k", t(1));
        let removed = rht.remove_by_key("k", t(2));
        assert_eq!(removed, Some(t(1)));
        assert!(rht.get("k").is_none());
        assert!(!rht.has("k"));
    }

    #[test]
    fn prune_tombstones_drops_only_causally_synced_bindings() {
        use crate::version_vector::VersionVector;

        let mut rht = ElementRHT::new();
        rht.set("k", t(1));
        rht.remove_by_key("k", t(9));

        let mut behind = VersionVector::new();
        behind.observe(ActorId(1), 5);
        assert!(rht.prune_tombstones(&behind).is_empty());

        let mut caught_up = VersionVector::new();
        caught_up.observe(ActorId(1), 9);
        assert_eq!(rht.prune_tombstones(&caught_up), vec![t(1)]);
    }
}
