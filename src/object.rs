//! Map container: a key points at the child with the largest `created_at`
//! among its non-removed nodes (spec §3.3, §4.4).

use crate::element_rht::ElementRHT;
use crate::ticket::TimeTicket;
use crate::version_vector::VersionVector;

#[derive(Clone)]
pub struct CRDTObject {
    created_at: TimeTicket,
    members: ElementRHT,
}

impl CRDTObject {
    pub fn new(created_at: TimeTicket) -> Self {
        Self {
            created_at,
            members: ElementRHT::new(),
        }
    }

    pub fn created_at(&self) -> TimeTicket {
        self.created_at
    }

    /// Bind `key` to a child identified by `child_created_at`. Returns the
    /// displaced child's identity (if any) so the caller can tombstone that
    /// element in the root registry and enqueue it for GC.
    pub fn set(&mut self, key: impl Into<String>, child_created_at: TimeTicket) -> Option<TimeTicket> {
        self.members.set(key, child_created_at)
    }

    pub fn remove(&mut self, key: &str, executed_at: TimeTicket) -> Option<TimeTicket> {
        self.members.remove_by_key(key, executed_at)
    }

    pub fn get(&self, key: &str) -> Option<TimeTicket> {
        self.members.get(key)
    }

    pub fn has(&self, key: &str) -> bool {
        self.members.has(key)
    }

    pub fn iter_sorted(&self) -> Vec<(&str, TimeTicket)> {
        self.members.iter_sorted()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, TimeTicket)> {
        self.members.iter()
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Own overhead: the byte length of each live member's key (the member
    /// elements themselves are billed separately as they are registered).
    pub fn data_size(&self) -> usize {
        self.members.iter().map(|(k, _)| k.len()).sum()
    }

    /// Physically drop tombstoned bindings causally known to every peer.
    /// Returns the `created_at` of each dropped binding, for the caller to
    /// cross-check against the root's element registry.
    pub fn prune_tombstones(&mut self, min_synced_vv: &VersionVector) -> Vec<TimeTicket> {
        self.members.prune_tombstones(min_synced_vv)
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
    fn later_write_wins_and_displaces_previous_child() {
        let mut obj = CRDTObject::new(t(0));
        obj.set("k", t(1));
        let displaced = obj.set("k", t(2));
        assert_eq!(displaced, Some(t(1)));
        assert_eq!(obj.get("k"), Some(t(2)));
    }
}
