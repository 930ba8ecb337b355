//! Replicated growable array with move and tombstones (spec §4.5).
//!
//! Nodes live under a zero-weight dummy head in a [`SplayTree`] that doubles
//! as the ordered sequence structure (its in-order walk *is* the linked
//! list), plus a `created_at -> node` index for O(1) anchor lookup.

use std::collections::HashMap;

use crate::error::{Error, Result};
use crate::splay_tree::{SplayNodeId, SplayTree};
use crate::ticket::TimeTicket;

#[derive(Clone, Debug)]
struct ArrayNode {
    /// Identity of the child element this node represents.
    value: TimeTicket,
    /// Ticket this node currently "belongs" to in sequence order; advances on
    /// `move`. Used for the RGA skip-forward tiebreak on concurrent inserts.
    positioned_at: TimeTicket,
    removed_at: Option<TimeTicket>,
    moved_at: Option<TimeTicket>,
}

impl ArrayNode {
    fn is_removed(&self) -> bool {
        self.removed_at.is_some()
    }
}

#[derive(Clone)]
pub struct RgaTreeList {
    tree: SplayTree<ArrayNode>,
    head: SplayNodeId,
    by_created_at: HashMap<TimeTicket, SplayNodeId>,
}

impl Default for RgaTreeList {
    fn default() -> Self {
        Self::new()
    }
}

impl RgaTreeList {
    pub fn new() -> Self {
        let mut tree = SplayTree::new();
        let head = tree.insert_root(
            ArrayNode {
                value: TimeTicket::INITIAL,
                positioned_at: TimeTicket::INITIAL,
                removed_at: None,
                moved_at: None,
            },
            0,
        );
        Self {
            tree,
            head,
            by_created_at: HashMap::new(),
        }
    }

    /// Number of live (non-tombstoned) elements.
    pub fn len(&self) -> usize {
        self.tree.total_length()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Insert `value` right after the element identified by `after_created_at`
    /// (or the dummy head, for `TimeTicket::INITIAL`), resolving concurrent
    /// inserts at the same anchor via the RGA tiebreak.
    pub fn insert(
        &mut self,
        value: TimeTicket,
        after_created_at: TimeTicket,
        executed_at: TimeTicket,
    ) -> Result<()> {
        let mut anchor = self.find_splay_id(after_created_at)?;

        loop {
            let Some(next) = self.tree.next(anchor) else {
                break;
            };
            let next_node = self.tree.value(next);
            if next_node.positioned_at > executed_at {
                anchor = next;
            } else {
                break;
            }
        }

        let node = ArrayNode {
            value,
            positioned_at: executed_at,
            removed_at: None,
            moved_at: None,
        };
        let len = if node.is_removed() { 0 } else { 1 };
        let id = self.tree.insert_after(anchor, node, len);
        self.by_created_at.insert(value, id);
        Ok(())
    }

    /// Move the element identified by `created_at` to just after
    /// `after_created_at`. A no-op if a later move has already been applied.
    pub fn move_element(
        &mut self,
        created_at: TimeTicket,
        after_created_at: TimeTicket,
        executed_at: TimeTicket,
    ) -> Result<bool> {
        let id = self.find_splay_id(created_at)?;
        let node = self.tree.value(id);
        if let Some(moved_at) = node.moved_at {
            if executed_at <= moved_at {
                return Ok(false);
            }
        }
        let value = node.value;
        let was_removed = node.is_removed();

        self.tree.delete(id);
        self.by_created_at.remove(&created_at);

        let mut anchor = self.find_splay_id(after_created_at)?;
        loop {
            let Some(next) = self.tree.next(anchor) else {
                break;
            };
            let next_node = self.tree.value(next);
            if next_node.positioned_at > executed_at {
                anchor = next;
            } else {
                break;
            }
        }

        let new_node = ArrayNode {
            value,
            positioned_at: executed_at,
            removed_at: if was_removed { Some(executed_at) } else { None },
            moved_at: Some(executed_at),
        };
        let len = if new_node.is_removed() { 0 } else { 1 };
        let new_id = self.tree.insert_after(anchor, new_node, len);
        self.by_created_at.insert(created_at, new_id);
        Ok(true)
    }

    /// Tombstone the element identified by `created_at`.
    pub fn remove(&mut self, created_at: TimeTicket, executed_at: TimeTicket) -> Result<bool> {
        let id = self.find_splay_id(created_at)?;
        self.remove_node(id, created_at, executed_at)
    }

    /// Tombstone the live element currently at logical `index`.
    pub fn remove_by_index(&mut self, index: usize, executed_at: TimeTicket) -> Result<TimeTicket> {
        let (id, offset) = self
            .tree
            .find(index)
            .filter(|&(_, off)| off == 0)
            .ok_or_else(|| Error::invalid_argument(format!("index {index} out of range")))?;
        let _ = offset;
        let created_at = self.tree.value(id).value;
        self.remove_node(id, created_at, executed_at)?;
        Ok(created_at)
    }

    fn remove_node(
        &mut self,
        id: SplayNodeId,
        created_at: TimeTicket,
        executed_at: TimeTicket,
    ) -> Result<bool> {
        if executed_at <= created_at {
            return Ok(false);
        }
        let node = self.tree.value(id);
        if let Some(removed_at) = node.removed_at {
            if executed_at <= removed_at {
                return Ok(false);
            }
        }
        self.tree.value_mut(id).removed_at = Some(executed_at);
        self.tree.set_length(id, 0);
        Ok(true)
    }

    /// Scan backward from `created_at` for the nearest predecessor, skipping
    /// tombstones; `None` only when `created_at` has no predecessor at all
    /// (i.e. it is the dummy head or unknown).
    pub fn get_previous_created_at(&self, created_at: TimeTicket) -> Option<TimeTicket> {
        let mut id = *self.by_created_at.get(&created_at)?;
        while let Some(prev) = self.tree.prev(id) {
            let node = self.tree.value(prev);
            if prev == self.head || !node.is_removed() {
                return Some(node.value);
            }
            id = prev;
        }
        None
    }

    pub fn index_of(&mut self, created_at: TimeTicket) -> Result<usize> {
        let id = self.find_splay_id(created_at)?;
        Ok(self.tree.index_of(id))
    }

    pub fn is_removed(&self, created_at: TimeTicket) -> bool {
        self.by_created_at
            .get(&created_at)
            .map(|&id| self.tree.value(id).is_removed())
            .unwrap_or(false)
    }

    /// Live elements in sequence order, for JSON rendering.
    pub fn values(&self) -> Vec<TimeTicket> {
        let mut out = Vec::with_capacity(self.len());
        let mut cur = Some(self.head);
        while let Some(id) = cur {
            let node = self.tree.value(id);
            if id != self.head && !node.is_removed() {
                out.push(node.value);
            }
            cur = self.tree.next(id);
        }
        out
    }

    fn find_splay_id(&self, created_at: TimeTicket) -> Result<SplayNodeId> {
        if created_at == TimeTicket::INITIAL {
            return Ok(self.head);
        }
        self.by_created_at
            .get(&created_at)
            .copied()
            .ok_or_else(|| Error::invalid_argument(format!("unknown array node {created_at:?}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ticket::ActorId;

    fn t(l: u64, a: u128) -> TimeTicket {
        TimeTicket::new(l, 0, ActorId(a))
    }

    #[test]
    fn insert_after_head_builds_sequence() {
        let mut list = RgaTreeList::new();
        list.insert(t(1, 1), TimeTicket::INITIAL, t(1, 1)).unwrap();
        list.insert(t(2, 1), t(1, 1), t(2, 1)).unwrap();
        assert_eq!(list.values(), vec![t(1, 1), t(2, 1)]);
        assert_eq!(list.len(), 2);
    }

    #[test]
    fn concurrent_insert_after_same_anchor_newer_ticket_wins_earlier_slot() {
        // S1 from spec: actor A inserts "a" at (1,A), actor B inserts "b" at (1,B), A<B.
        let mut list = RgaTreeList::new();
        let a = t(1, 1);
        let b = t(1, 2);
        list.insert(a, TimeTicket::INITIAL, a).unwrap();
        list.insert(b, TimeTicket::INITIAL, b).unwrap();
        assert_eq!(list.values(), vec![b, a]);
        assert_eq!(list.index_of(a).unwrap(), 1);
    }

    #[test]
    fn remove_tombstones_without_shifting_structure() {
        let mut list = RgaTreeList::new();
        let a = t(1, 1);
        let b = t(2, 1);
        list.insert(a, TimeTicket::INITIAL, a).unwrap();
        list.insert(b, a, b).unwrap();
        list.remove(a, t(3, 1)).unwrap();
        assert_eq!(list.values(), vec![b]);
        assert_eq!(list.len(), 1);
    }

    #[test]
    fn move_relocates_element_after_anchor() {
        let mut list = RgaTreeList::new();
        let a = t(1, 1);
        let b = t(2, 1);
        let c = t(3, 1);
        list.insert(a, TimeTicket::INITIAL, a).unwrap();
        list.insert(b, a, b).unwrap();
        list.insert(c, b, c).unwrap();

        list.move_element(a, c, t(4, 1)).unwrap();
        assert_eq!(list.values(), vec![b, c, a]);
    }

    #[test]
    fn get_previous_created_at_skips_tombstones() {
        let mut list = RgaTreeList::new();
        let a = t(1, 1);
        let b = t(2, 1);
        let c = t(3, 1);
        list.insert(a, TimeTicket::INITIAL, a).unwrap();
        list.insert(b, a, b).unwrap();
        list.insert(c, b, c).unwrap();
        list.remove(b, t(4, 1)).unwrap();

        assert_eq!(list.get_previous_created_at(c), Some(a));
    }
}
