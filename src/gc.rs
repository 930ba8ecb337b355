//! Fine-grained GC-pair identities (spec §4.9: `gc_pairs: child_id_string ->
//! GCPair(parent, child)`). Covers the tombstones a container can't iterate
//! itself once physically detached: split text blocks, RHT attribute
//! entries, and tree tokens. Element-level tombstones go through
//! [`crate::root::CRDTRoot::register_removed_element`] instead.

use crate::rga_tree_split::RgaTreeSplitNodeId;
use crate::ticket::TimeTicket;
use crate::tree_id::CRDTTreeNodeId;

/// What a [`GcPair`] identifies for purge dispatch.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GcTarget {
    /// A fully tombstoned element, keyed by its own creation ticket.
    Element(TimeTicket),
    /// A physically split-off text block.
    TextBlock(RgaTreeSplitNodeId),
    /// An attribute entry displaced on a text block's attribute RHT.
    TextAttr(RgaTreeSplitNodeId, String),
    /// A tree token (element-open/text/element-close) identified by node id.
    TreeToken(CRDTTreeNodeId),
    /// An attribute entry displaced on a tree node's attribute RHT.
    TreeAttr(CRDTTreeNodeId, String),
}

impl GcTarget {
    /// The stable string key the root's `gc_pairs` map is indexed by.
    pub fn key(&self) -> String {
        match self {
            GcTarget::Element(id) => format!("elem:{id:?}"),
            GcTarget::TextBlock(id) => format!("text:{id:?}"),
            GcTarget::TextAttr(id, key) => format!("text-attr:{id:?}#{key}"),
            GcTarget::TreeToken(id) => format!("tree:{id:?}"),
            GcTarget::TreeAttr(id, key) => format!("tree-attr:{id:?}#{key}"),
        }
    }
}

/// A pending fine-grained tombstone: `child` was detached from `parent` and
/// awaits physical purge once `min_synced_vv` catches up.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GcPair {
    pub parent: TimeTicket,
    pub child: GcTarget,
    pub removed_at: TimeTicket,
}

impl GcPair {
    pub fn new(parent: TimeTicket, child: GcTarget, removed_at: TimeTicket) -> Self {
        Self {
            parent,
            child,
            removed_at,
        }
    }
}
