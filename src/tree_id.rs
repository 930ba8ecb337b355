//! Identity and position types for the hierarchical tree element (spec §4.8).
//!
//! Kept as a standalone leaf module (no dependency on [`crate::crdt_tree`]) so
//! both the tree implementation and the root's GC-pair bookkeeping can depend
//! on it without a cycle.

use crate::ticket::TimeTicket;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// `(created_at, offset)`: identity of a tree node. `offset` disambiguates a
/// text node that has been split, the same way `RgaTreeSplitNodeId` does.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct CRDTTreeNodeId {
    pub created_at: TimeTicket,
    pub offset: u32,
}

impl CRDTTreeNodeId {
    pub fn new(created_at: TimeTicket, offset: u32) -> Self {
        Self { created_at, offset }
    }
}

impl Ord for CRDTTreeNodeId {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        (self.created_at, self.offset).cmp(&(other.created_at, other.offset))
    }
}
impl PartialOrd for CRDTTreeNodeId {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

/// A tree-relative position: the parent node plus the left sibling to insert
/// after. `left_sibling_id == parent_id` means "left-most child of parent".
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct CRDTTreePos {
    pub parent_id: CRDTTreeNodeId,
    pub left_sibling_id: CRDTTreeNodeId,
}

impl CRDTTreePos {
    pub fn new(parent_id: CRDTTreeNodeId, left_sibling_id: CRDTTreeNodeId) -> Self {
        Self {
            parent_id,
            left_sibling_id,
        }
    }

    pub fn is_left_most(&self) -> bool {
        self.left_sibling_id == self.parent_id
    }
}
