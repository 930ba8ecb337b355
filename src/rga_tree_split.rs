//! Block-RGA with splittable blocks, used by rich text (spec §4.6).
//!
//! Nodes live between a zero-weight dummy `head` and `tail` sentinel in a
//! [`SplayTree`] (whose in-order walk is the sequence), indexed additionally
//! by an [`LLRBTree`] keyed on `(created_at, offset)` for `floor_entry`
//! lookups. Splitting a block never changes any other block's identity, so
//! `RgaTreeSplitNodeId`s (and the positions built from them) stay valid
//! across splits — only physical purge invalidates them.

use crate::error::{Error, Result};
use crate::llrb_tree::LLRBTree;
use crate::splay_tree::{SplayNodeId, SplayTree};
use crate::ticket::{ActorId, TimeTicket};
use crate::version_vector::VersionVector;

/// A splittable content value (spec §4.6: "split-value `T`").
pub trait SplitValue: Clone {
    /// Number of addressable units (code units for text).
    fn count(&self) -> usize;
    /// Slice `[from, to)` in the same units as `count`.
    fn substring(&self, from: usize, to: usize) -> Self;
    /// Approximate byte footprint, for root size accounting.
    fn data_size(&self) -> usize;
}

impl SplitValue for String {
    fn count(&self) -> usize {
        self.encode_utf16().count()
    }

    fn substring(&self, from: usize, to: usize) -> Self {
        String::from_utf16_lossy(&self.encode_utf16().collect::<Vec<_>>()[from..to])
    }

    fn data_size(&self) -> usize {
        self.len()
    }
}

/// `(created_at, offset)`: identity of a block, and the unit of addressing
/// for a logical position within the sequence.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub struct RgaTreeSplitNodeId {
    pub created_at: TimeTicket,
    pub offset: u32,
}

impl RgaTreeSplitNodeId {
    pub fn new(created_at: TimeTicket, offset: u32) -> Self {
        Self { created_at, offset }
    }
}

impl Ord for RgaTreeSplitNodeId {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        (self.created_at, self.offset).cmp(&(other.created_at, other.offset))
    }
}
impl PartialOrd for RgaTreeSplitNodeId {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

/// Sentinel ticket guaranteed to sort after any real ticket; used only to
/// give the tail sentinel a unique, unreachable identity.
fn sentinel_ticket() -> TimeTicket {
    TimeTicket::new(u64::MAX, u32::MAX, ActorId(u128::MAX))
}

/// A single emitted content change from `edit`/`set_style`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TextChange<T> {
    pub from_index: usize,
    pub to_index: usize,
    pub content: Option<T>,
}

#[derive(Clone)]
struct SplitNode<T> {
    id: RgaTreeSplitNodeId,
    value: T,
    removed_at: Option<TimeTicket>,
    ins_prev_id: Option<RgaTreeSplitNodeId>,
    ins_next_id: Option<RgaTreeSplitNodeId>,
}

impl<T> SplitNode<T> {
    fn is_removed(&self) -> bool {
        self.removed_at.is_some()
    }
}

#[derive(Clone)]
pub struct RgaTreeSplit<T: SplitValue> {
    tree: SplayTree<SplitNode<T>>,
    head: SplayNodeId,
    tail: SplayNodeId,
    by_id: LLRBTree<RgaTreeSplitNodeId, SplayNodeId>,
}

impl<T: SplitValue + Default> Default for RgaTreeSplit<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: SplitValue + Default> RgaTreeSplit<T> {
    pub fn new() -> Self {
        let mut tree = SplayTree::new();
        let head_id = RgaTreeSplitNodeId::new(TimeTicket::INITIAL, 0);
        let head = tree.insert_root(
            SplitNode {
                id: head_id,
                value: T::default(),
                removed_at: None,
                ins_prev_id: None,
                ins_next_id: None,
            },
            0,
        );
        let tail_id = RgaTreeSplitNodeId::new(sentinel_ticket(), 0);
        let tail = tree.insert_after(
            head,
            SplitNode {
                id: tail_id,
                value: T::default(),
                removed_at: None,
                ins_prev_id: None,
                ins_next_id: None,
            },
            0,
        );

        let mut by_id = LLRBTree::new();
        by_id.put(head_id, head);
        by_id.put(tail_id, tail);

        Self {
            tree,
            head,
            tail,
            by_id,
        }
    }

    pub fn len(&self) -> usize {
        self.tree.total_length()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Physical block count, live and tombstoned alike (head/tail sentinels
    /// included) — distinct from `len()`'s live-character count, for callers
    /// that need to observe whether `purge` actually freed a node.
    pub fn node_count(&self) -> usize {
        self.by_id.len()
    }

    /// Id of a freshly inserted content block located at `index`, or the
    /// `tail` position if `index == len()`. Callers use this to build the
    /// `from`/`to` positions for `edit`/`set_style`.
    pub fn index_to_pos(&mut self, index: usize) -> RgaTreeSplitNodeId {
        if index >= self.tree.total_length() {
            return self.node_id(self.tail);
        }
        let (id, offset) = self.tree.find(index).expect("index within bounds");
        let node = self.tree.value(id);
        RgaTreeSplitNodeId::new(node.id.created_at, node.id.offset + offset as u32)
    }

    /// Inverse of `index_to_pos`. `prefer_to_left` resolves a position that
    /// sits exactly at a split boundary to the predecessor block instead of
    /// the successor, walking the `ins_prev_id` chain so it still works
    /// after the original neighbor has been split further (or purged, as
    /// long as some ancestor in the chain survives).
    pub fn pos_to_index(&mut self, pos: RgaTreeSplitNodeId, prefer_to_left: bool) -> Result<usize> {
        let (&owner_id, &owner_splay) = self
            .by_id
            .floor_entry(&pos)
            .ok_or_else(|| Error::invalid_argument(format!("no block owns {pos:?}")))?;

        let (owner_id, owner_splay) = if prefer_to_left && pos.offset == owner_id.offset {
            match self.tree.value(owner_splay).ins_prev_id {
                Some(prev_id) => match self.by_id.get(&prev_id) {
                    Some(&prev_splay) => (prev_id, prev_splay),
                    None => (owner_id, owner_splay),
                },
                None => (owner_id, owner_splay),
            }
        } else {
            (owner_id, owner_splay)
        };

        let base_index = self.tree.index_of(owner_splay);
        let node = self.tree.value(owner_splay);
        let offset_contribution = if node.is_removed() {
            0
        } else {
            (pos.offset - owner_id.offset) as usize
        };
        Ok(base_index + offset_contribution)
    }

    /// Core text mutation: delete `[from, to)` (subject to causal
    /// `can_delete`) and optionally insert `content` at `from`. Returns the
    /// caret position, the block ids that were physically tombstoned (for
    /// the caller to enqueue as GC pairs), and the coalesced content changes.
    #[allow(clippy::too_many_arguments)]
    pub fn edit(
        &mut self,
        from: RgaTreeSplitNodeId,
        to: RgaTreeSplitNodeId,
        edited_at: TimeTicket,
        content: Option<T>,
        version_vector: Option<&VersionVector>,
        is_local: bool,
    ) -> Result<(RgaTreeSplitNodeId, Vec<RgaTreeSplitNodeId>, Vec<TextChange<T>>)> {
        let to_boundary = self.find_node_with_split(to, Some(edited_at))?;
        let from_boundary = self.find_node_with_split(from, Some(edited_at))?;

        let mut candidates = Vec::new();
        let mut cur = from_boundary;
        while cur != to_boundary {
            candidates.push(cur);
            match self.tree.next(cur) {
                Some(n) => cur = n,
                None => break,
            }
        }

        let start_index = self.tree.index_of(from_boundary);

        let mut removed_ids = Vec::new();
        let mut changes: Vec<TextChange<T>> = Vec::new();
        let mut running_index = start_index;
        let mut run_start: Option<usize> = None;
        let mut run_len = 0usize;

        for id in candidates {
            let (node_len, was_removed, deletable) = {
                let node = self.tree.value(id);
                let len = node.value.count();
                let was_removed = node.is_removed();
                let deletable = Self::can_delete(node, edited_at, version_vector, is_local);
                (len, was_removed, deletable)
            };
            let live_len = if was_removed { 0 } else { node_len };

            if deletable {
                if run_start.is_none() {
                    run_start = Some(running_index);
                    run_len = 0;
                }
                run_len += live_len;
                if !was_removed {
                    self.tree.value_mut(id).removed_at = Some(edited_at);
                    self.tree.set_length(id, 0);
                    removed_ids.push(self.tree.value(id).id);
                }
            } else {
                if let Some(start) = run_start.take() {
                    changes.push(TextChange {
                        from_index: start,
                        to_index: start + run_len,
                        content: None,
                    });
                }
                running_index += live_len;
            }
        }
        if let Some(start) = run_start.take() {
            changes.push(TextChange {
                from_index: start,
                to_index: start + run_len,
                content: None,
            });
        }

        let caret = if let Some(value) = content {
            let anchor = self.tree.prev(from_boundary).unwrap_or(self.head);
            let new_id = RgaTreeSplitNodeId::new(edited_at, 0);
            let len = value.count();
            let new_splay = self.tree.insert_after(
                anchor,
                SplitNode {
                    id: new_id,
                    value: value.clone(),
                    removed_at: None,
                    ins_prev_id: None,
                    ins_next_id: None,
                },
                len,
            );
            self.by_id.put(new_id, new_splay);

            match changes.first_mut() {
                Some(first) if first.from_index == start_index => {
                    first.content = Some(value);
                }
                _ => {
                    changes.insert(
                        0,
                        TextChange {
                            from_index: start_index,
                            to_index: start_index,
                            content: Some(value),
                        },
                    );
                }
            }

            RgaTreeSplitNodeId::new(edited_at, len as u32)
        } else {
            from
        };

        Ok((caret, removed_ids, changes))
    }

    /// Split the boundaries of `[from, to)` and invoke `f` on every node
    /// (live or tombstoned) strictly within the resulting range, in order.
    /// Used by callers that need to touch a per-node side table (e.g. a text
    /// block's attribute RHT) without deleting or inserting content.
    pub fn for_each_in_range<F>(
        &mut self,
        from: RgaTreeSplitNodeId,
        to: RgaTreeSplitNodeId,
        edited_at: TimeTicket,
        mut f: F,
    ) -> Result<()>
    where
        F: FnMut(RgaTreeSplitNodeId, bool, &mut T),
    {
        let to_boundary = self.find_node_with_split(to, Some(edited_at))?;
        let from_boundary = self.find_node_with_split(from, Some(edited_at))?;

        let mut cur = from_boundary;
        while cur != to_boundary {
            let is_removed = self.tree.value(cur).is_removed();
            let id = self.tree.value(cur).id;
            f(id, is_removed, &mut self.tree.value_mut(cur).value);
            match self.tree.next(cur) {
                Some(n) => cur = n,
                None => break,
            }
        }
        Ok(())
    }

    /// Mutable access to a block's value by id, for touching a per-block side
    /// table (e.g. a text block's attribute RHT) in place.
    pub fn value_mut(&mut self, id: RgaTreeSplitNodeId) -> Option<&mut T> {
        let &splay_id = self.by_id.get(&id)?;
        Some(&mut self.tree.value_mut(splay_id).value)
    }

    /// Physically remove an already-tombstoned block, unlinking it from the
    /// sequence and re-pointing its `ins_prev_id`/`ins_next_id` neighbors at
    /// each other so position resolution can still walk across the gap.
    /// Returns `false` if `id` is unknown (already purged).
    pub fn purge(&mut self, id: RgaTreeSplitNodeId) -> Result<bool> {
        let splay_id = match self.by_id.get(&id) {
            Some(&s) => s,
            None => return Ok(false),
        };
        let node = self.tree.value(splay_id);
        if !node.is_removed() {
            return Err(Error::invalid_argument(format!("block {id:?} is not tombstoned")));
        }
        let (prev_id, next_id) = (node.ins_prev_id, node.ins_next_id);

        if let Some(prev_id) = prev_id {
            if let Some(&prev_splay) = self.by_id.get(&prev_id) {
                self.tree.value_mut(prev_splay).ins_next_id = next_id;
            }
        }
        if let Some(next_id) = next_id {
            if let Some(&next_splay) = self.by_id.get(&next_id) {
                self.tree.value_mut(next_splay).ins_prev_id = prev_id;
            }
        }

        self.tree.delete(splay_id);
        self.by_id.remove(&id);
        Ok(true)
    }

    /// Live `(id, value)` pairs in sequence order, for JSON/string rendering.
    pub fn values(&self) -> Vec<(RgaTreeSplitNodeId, &T)> {
        let mut out = Vec::new();
        let mut cur = self.tree.next(self.head);
        while let Some(id) = cur {
            if id == self.tail {
                break;
            }
            let node = self.tree.value(id);
            if !node.is_removed() {
                out.push((node.id, &node.value));
            }
            cur = self.tree.next(id);
        }
        out
    }

    fn node_id(&self, id: SplayNodeId) -> RgaTreeSplitNodeId {
        self.tree.value(id).id
    }

    fn can_delete(
        node: &SplitNode<T>,
        edited_at: TimeTicket,
        version_vector: Option<&VersionVector>,
        is_local: bool,
    ) -> bool {
        if is_local {
            return true;
        }
        let creation_known = version_vector
            .map(|vv| vv.after_or_equal(&node.id.created_at))
            .unwrap_or(false);
        let removal_ok = match node.removed_at {
            None => true,
            Some(removed_at) => edited_at > removed_at,
        };
        creation_known && removal_ok
    }

    /// Split the block that owns `pos` so a boundary exists exactly there,
    /// then (if `edited_at` is given) skip forward past any freshly inserted
    /// sibling block whose own creation ticket is later than `edited_at` —
    /// the RGA tiebreak, so a concurrent insert at the same anchor keeps
    /// winning the earlier slot.
    fn find_node_with_split(
        &mut self,
        pos: RgaTreeSplitNodeId,
        edited_at: Option<TimeTicket>,
    ) -> Result<SplayNodeId> {
        let (&owner_id, &owner_splay) = self
            .by_id
            .floor_entry(&pos)
            .ok_or_else(|| Error::invalid_argument(format!("no block owns {pos:?}")))?;
        let rel_offset = (pos.offset - owner_id.offset) as usize;

        let mut boundary = if rel_offset == 0 {
            owner_splay
        } else {
            self.split_node(owner_splay, rel_offset)
        };

        if let Some(edited_at) = edited_at {
            loop {
                if boundary == self.tail {
                    break;
                }
                let node = self.tree.value(boundary);
                if node.id.offset == 0 && node.id.created_at > edited_at {
                    boundary = self.tree.next(boundary).unwrap_or(self.tail);
                } else {
                    break;
                }
            }
        }

        Ok(boundary)
    }

    /// Split `id` at `offset` (content units from its own start). Offset 0
    /// returns `id` itself; offset == content length returns its successor
    /// (creating nothing); any interior offset creates a new right-half
    /// block, linked via `ins_prev_id`/`ins_next_id` so position resolution
    /// can still walk across the split after a future physical purge.
    fn split_node(&mut self, id: SplayNodeId, offset: usize) -> SplayNodeId {
        if offset == 0 {
            return id;
        }
        let content_len = self.tree.value(id).value.count();
        if offset >= content_len {
            return self.tree.next(id).unwrap_or(self.tail);
        }

        let node = self.tree.value(id);
        let left_value = node.value.substring(0, offset);
        let right_value = node.value.substring(offset, content_len);
        let base_id = node.id;
        let removed_at = node.removed_at;
        let old_ins_next = node.ins_next_id;
        let new_id = RgaTreeSplitNodeId::new(base_id.created_at, base_id.offset + offset as u32);

        self.tree.value_mut(id).value = left_value;
        self.tree.value_mut(id).ins_next_id = Some(new_id);
        let left_len = if removed_at.is_some() { 0 } else { offset };
        self.tree.set_length(id, left_len);

        let right_len = if removed_at.is_some() { 0 } else { content_len - offset };
        let right_splay = self.tree.insert_after(
            id,
            SplitNode {
                id: new_id,
                value: right_value,
                removed_at,
                ins_prev_id: Some(base_id),
                ins_next_id: old_ins_next,
            },
            right_len,
        );
        self.by_id.put(new_id, right_splay);

        if let Some(old_next_id) = old_ins_next {
            if let Some(&old_next_splay) = self.by_id.get(&old_next_id) {
                self.tree.value_mut(old_next_splay).ins_prev_id = Some(new_id);
            }
        }

        right_splay
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(l: u64, a: u128) -> TimeTicket {
        TimeTicket::new(l, 0, ActorId(a))
    }

    fn insert_all(split: &mut RgaTreeSplit<String>, text: &str, at: TimeTicket) {
        let pos = split.index_to_pos(split.len());
        let (_, _, _) = split
            .edit(pos, pos, at, Some(text.to_string()), None, true)
            .unwrap();
    }

    #[test]
    fn insert_and_render_text() {
        let mut split: RgaTreeSplit<String> = RgaTreeSplit::new();
        insert_all(&mut split, "hello", t(1, 1));
        let rendered: String = split.values().into_iter().map(|(_, v)| v.clone()).collect();
        assert_eq!(rendered, "hello");
        assert_eq!(split.len(), 5);
    }

    #[test]
    fn delete_range_tombstones_and_emits_change() {
        let mut split: RgaTreeSplit<String> = RgaTreeSplit::new();
        insert_all(&mut split, "hello", t(1, 1));

        let from = split.index_to_pos(1);
        let to = split.index_to_pos(4);
        let (_, removed, changes) = split.edit(from, to, t(2, 1), None, None, true).unwrap();

        assert!(!removed.is_empty());
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].from_index, 1);
        assert_eq!(changes[0].to_index, 4);

        let rendered: String = split.values().into_iter().map(|(_, v)| v.clone()).collect();
        assert_eq!(rendered, "ho");
    }

    #[test]
    fn replace_range_merges_insert_into_change() {
        let mut split: RgaTreeSplit<String> = RgaTreeSplit::new();
        insert_all(&mut split, "hello", t(1, 1));

        let from = split.index_to_pos(0);
        let to = split.index_to_pos(5);
        let (_, _, changes) = split
            .edit(from, to, t(2, 1), Some("bye".to_string()), None, true)
            .unwrap();

        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].content.as_deref(), Some("bye"));

        let rendered: String = split.values().into_iter().map(|(_, v)| v.clone()).collect();
        assert_eq!(rendered, "bye");
    }

    #[test]
    fn purge_physically_drops_a_tombstoned_block() {
        let mut split: RgaTreeSplit<String> = RgaTreeSplit::new();
        insert_all(&mut split, "hello", t(1, 1));
        assert_eq!(split.by_id.len(), 3); // head + tail + one "hello" block

        let from = split.index_to_pos(1);
        let to = split.index_to_pos(4);
        let (_, removed, _) = split.edit(from, to, t(2, 1), None, None, true).unwrap();
        assert_eq!(removed.len(), 1);
        assert_eq!(split.by_id.len(), 5); // "hello" split into "h" / "ell" / "o"

        for id in &removed {
            assert!(split.purge(*id).unwrap());
        }
        assert_eq!(split.by_id.len(), 4);
        assert!(split.value_mut(removed[0]).is_none());
        assert!(!split.purge(removed[0]).unwrap(), "already purged");

        let rendered: String = split.values().into_iter().map(|(_, v)| v.clone()).collect();
        assert_eq!(rendered, "ho");
    }

    #[test]
    fn pos_to_index_round_trips_index_to_pos() {
        let mut split: RgaTreeSplit<String> = RgaTreeSplit::new();
        insert_all(&mut split, "hello", t(1, 1));
        for i in 0..=5 {
            let pos = split.index_to_pos(i);
            assert_eq!(split.pos_to_index(pos, false).unwrap(), i);
        }
    }

    #[test]
    fn concurrent_delete_then_insert_converges() {
        // S2 from spec: "hello" -> A deletes [0,5) at t=10, B inserts "X" at 3 at t=11.
        let mut split: RgaTreeSplit<String> = RgaTreeSplit::new();
        insert_all(&mut split, "hello", t(1, 1));

        let insert_pos = split.index_to_pos(3);
        let from = split.index_to_pos(0);
        let to = split.index_to_pos(5);

        let (_, _, _) = split.edit(from, to, t(10, 1), None, None, true).unwrap();
        let (_, _, _) = split
            .edit(insert_pos, insert_pos, t(11, 2), Some("X".to_string()), None, true)
            .unwrap();

        let rendered: String = split.values().into_iter().map(|(_, v)| v.clone()).collect();
        assert_eq!(rendered, "X");
    }
}
