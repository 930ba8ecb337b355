//! Rich text element: an `RGATreeSplit` of `(content, attrs)` segments (spec §4.7).

use std::collections::BTreeMap;

use crate::error::Result;
use crate::gc::{GcPair, GcTarget};
use crate::rga_tree_split::{RgaTreeSplit, RgaTreeSplitNodeId, SplitValue};
use crate::rht::Rht;
use crate::ticket::TimeTicket;
use crate::version_vector::VersionVector;

/// One text block's payload: live content plus a last-writer-wins attribute
/// map. Splitting a block duplicates its attrs onto both halves.
#[derive(Clone, Debug, Default)]
pub struct TextValue {
    pub content: String,
    pub attrs: Rht<String>,
}

impl SplitValue for TextValue {
    fn count(&self) -> usize {
        self.content.count()
    }

    fn substring(&self, from: usize, to: usize) -> Self {
        TextValue {
            content: self.content.substring(from, to),
            attrs: self.attrs.clone(),
        }
    }

    fn data_size(&self) -> usize {
        self.content.data_size() + self.attrs.iter().map(|(k, v)| k.len() + v.len()).sum::<usize>()
    }
}

/// A change emitted by `edit`: `content`/`attrs` are `Some` only on the one
/// range that carries the inserted text (if any was inserted).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TextEditChange {
    pub from_index: usize,
    pub to_index: usize,
    pub content: Option<String>,
    pub attrs: Option<BTreeMap<String, String>>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TextStyleChange {
    pub from_index: usize,
    pub to_index: usize,
    pub attrs: BTreeMap<String, String>,
}

/// A run of content sharing identical attributes, for JSON/string rendering.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TextSegment {
    pub attrs: BTreeMap<String, String>,
    pub value: String,
}

#[derive(Clone)]
pub struct CRDTText {
    created_at: TimeTicket,
    split: RgaTreeSplit<TextValue>,
}

impl CRDTText {
    pub fn new(created_at: TimeTicket) -> Self {
        Self {
            created_at,
            split: RgaTreeSplit::new(),
        }
    }

    pub fn created_at(&self) -> TimeTicket {
        self.created_at
    }

    pub fn len(&self) -> usize {
        self.split.len()
    }

    pub fn is_empty(&self) -> bool {
        self.split.is_empty()
    }

    /// Physical block count, live and tombstoned — see `RgaTreeSplit::node_count`.
    pub fn block_count(&self) -> usize {
        self.split.node_count()
    }

    pub fn to_plain_string(&self) -> String {
        self.split.values().into_iter().map(|(_, v)| v.content.clone()).collect()
    }

    /// Live segments, coalesced by identical attributes, empty ones elided.
    pub fn segments(&self) -> Vec<TextSegment> {
        let mut out: Vec<TextSegment> = Vec::new();
        for (_, value) in self.split.values() {
            if value.content.is_empty() {
                continue;
            }
            let attrs: BTreeMap<String, String> = value
                .attrs
                .iter_sorted()
                .into_iter()
                .map(|(k, v)| (k.to_string(), v.clone()))
                .collect();
            match out.last_mut() {
                Some(last) if last.attrs == attrs => last.value.push_str(&value.content),
                _ => out.push(TextSegment {
                    attrs,
                    value: value.content.clone(),
                }),
            }
        }
        out
    }

    /// Resolve a live index to the split-node position identifying it. A
    /// remote op must capture this once, at generation time, and ship the
    /// position rather than the index — by the time it is replayed on
    /// another replica, concurrent structural edits may have moved what
    /// that index refers to.
    pub fn index_to_pos(&self, index: usize) -> RgaTreeSplitNodeId {
        self.split.index_to_pos(index)
    }

    /// Replace `[from_idx, to_idx)` with `content` (if any), seeding the
    /// inserted block's attributes from `attrs` when both are given. Use
    /// this for local edits, where resolving the range against the current
    /// index is exactly what's wanted; use [`Self::edit_at`] to replay a
    /// remote op against the position it was generated at.
    #[allow(clippy::too_many_arguments)]
    pub fn edit(
        &mut self,
        from_idx: usize,
        to_idx: usize,
        content: Option<String>,
        edited_at: TimeTicket,
        attrs: Option<BTreeMap<String, String>>,
        version_vector: Option<&VersionVector>,
        is_local: bool,
    ) -> Result<(usize, Vec<GcPair>, Vec<TextEditChange>)> {
        let from = self.split.index_to_pos(from_idx);
        let to = self.split.index_to_pos(to_idx);
        self.edit_at(from, to, content, edited_at, attrs, version_vector, is_local)
    }

    /// Replace the already-resolved range `[from, to)` with `content`.
    #[allow(clippy::too_many_arguments)]
    pub fn edit_at(
        &mut self,
        from: RgaTreeSplitNodeId,
        to: RgaTreeSplitNodeId,
        content: Option<String>,
        edited_at: TimeTicket,
        attrs: Option<BTreeMap<String, String>>,
        version_vector: Option<&VersionVector>,
        is_local: bool,
    ) -> Result<(usize, Vec<GcPair>, Vec<TextEditChange>)> {
        let seeded = content.map(|text| {
            let mut seeded_attrs = Rht::new();
            if let Some(map) = &attrs {
                for (k, v) in map {
                    seeded_attrs.set(k.clone(), v.clone(), edited_at);
                }
            }
            TextValue {
                content: text,
                attrs: seeded_attrs,
            }
        });

        let (caret_pos, removed_ids, raw_changes) =
            self.split.edit(from, to, edited_at, seeded, version_vector, is_local)?;

        let gc_pairs = removed_ids
            .into_iter()
            .map(|id| GcPair::new(self.created_at, GcTarget::TextBlock(id), edited_at))
            .collect();

        let changes = raw_changes
            .into_iter()
            .map(|c| TextEditChange {
                from_index: c.from_index,
                to_index: c.to_index,
                content: c.content.as_ref().map(|v| v.content.clone()),
                attrs: if c.content.is_some() { attrs.clone() } else { None },
            })
            .collect();

        let caret = self.split.pos_to_index(caret_pos, false)?;
        Ok((caret, gc_pairs, changes))
    }

    /// Apply `attrs` (LWW per key) to every block in `[from_idx, to_idx)`
    /// whose creation is causally known to the editor (`can_style`: existence
    /// only, unlike `can_delete` which also checks tombstone freshness).
    pub fn set_style(
        &mut self,
        from_idx: usize,
        to_idx: usize,
        attrs: &BTreeMap<String, String>,
        edited_at: TimeTicket,
        version_vector: Option<&VersionVector>,
        is_local: bool,
    ) -> Result<(Vec<GcPair>, usize, Vec<TextStyleChange>)> {
        let from = self.split.index_to_pos(from_idx);
        let to = self.split.index_to_pos(to_idx);

        let mut gc_pairs = Vec::new();
        let mut diff_size = 0usize;
        let created_at = self.created_at;

        self.split.for_each_in_range(from, to, edited_at, |id, _is_removed, value| {
            let creation_known = is_local
                || version_vector
                    .map(|vv| vv.after_or_equal(&id.created_at))
                    .unwrap_or(false);
            if !creation_known {
                return;
            }
            for (k, v) in attrs {
                if let Some((Some(prev), _new)) = value.attrs.set(k.clone(), v.clone(), edited_at) {
                    diff_size += prev.value.len();
                    gc_pairs.push(GcPair::new(
                        created_at,
                        GcTarget::TextAttr(id, prev.key.clone()),
                        edited_at,
                    ));
                }
            }
        })?;

        let changes = vec![TextStyleChange {
            from_index: self.split.pos_to_index(from, false)?,
            to_index: self.split.pos_to_index(to, true)?,
            attrs: attrs.clone(),
        }];
        Ok((gc_pairs, diff_size, changes))
    }

    /// Physically drop a tombstoned text block.
    pub fn purge_text_node(&mut self, id: RgaTreeSplitNodeId) -> Result<bool> {
        self.split.purge(id)
    }

    /// Physically drop a tombstoned attribute entry on block `id`.
    pub fn purge_attr(&mut self, id: RgaTreeSplitNodeId, key: &str) -> bool {
        match self.split.value_mut(id) {
            Some(value) => value.attrs.purge(key),
            None => false,
        }
    }
}
