//! Augmented splay tree over a sequence of nodes (spec §4.1).
//!
//! Indexes a linear sequence by cumulative node `length`: 1 for a live node,
//! 0 for a tombstone, or a content length for a splittable text block. This
//! is purely an index accelerator — callers that need ordered traversal of
//! tombstones too keep their own linked list; the splay tree only promises
//! fast index<->node translation over the *live* weight.

use std::fmt;

/// Opaque handle into the tree's arena. Stable for the node's lifetime.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub struct SplayNodeId(usize);

impl fmt::Display for SplayNodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Clone)]
struct Node<T> {
    value: T,
    len: usize,
    weight: usize,
    parent: Option<SplayNodeId>,
    left: Option<SplayNodeId>,
    right: Option<SplayNodeId>,
}

#[derive(Clone)]
pub struct SplayTree<T> {
    arena: Vec<Node<T>>,
    root: Option<SplayNodeId>,
}

impl<T> Default for SplayTree<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> SplayTree<T> {
    pub fn new() -> Self {
        Self {
            arena: Vec::new(),
            root: None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.root.is_none()
    }

    /// Total live weight of the whole sequence.
    pub fn total_length(&self) -> usize {
        self.root.map(|r| self.weight(Some(r))).unwrap_or(0)
    }

    pub fn value(&self, id: SplayNodeId) -> &T {
        &self.arena[id.0].value
    }

    pub fn value_mut(&mut self, id: SplayNodeId) -> &mut T {
        &mut self.arena[id.0].value
    }

    pub fn length(&self, id: SplayNodeId) -> usize {
        self.arena[id.0].len
    }

    /// Insert a fresh standalone root. Only valid for an empty tree.
    pub fn insert_root(&mut self, value: T, len: usize) -> SplayNodeId {
        debug_assert!(self.root.is_none());
        let id = self.push_node(value, len);
        self.root = Some(id);
        id
    }

    /// O(log n) amortized: insert `value` immediately after `prev` in sequence order.
    pub fn insert_after(&mut self, prev: SplayNodeId, value: T, len: usize) -> SplayNodeId {
        self.splay(prev);
        let new_id = self.push_node(value, len);
        let prev_right = self.arena[prev.0].right;
        self.arena[new_id.0].right = prev_right;
        if let Some(r) = prev_right {
            self.arena[r.0].parent = Some(new_id);
        }
        self.arena[prev.0].right = Some(new_id);
        self.arena[new_id.0].parent = Some(prev);
        self.update_weight(new_id);
        self.update_weight(prev);
        new_id
    }

    /// O(log n) amortized: splay then detach `id` from the sequence.
    pub fn delete(&mut self, id: SplayNodeId) {
        self.splay(id);
        let left = self.arena[id.0].left;
        let right = self.arena[id.0].right;

        let new_root = match (left, right) {
            (None, None) => None,
            (Some(l), None) => {
                self.arena[l.0].parent = None;
                Some(l)
            }
            (None, Some(r)) => {
                self.arena[r.0].parent = None;
                Some(r)
            }
            (Some(l), Some(r)) => {
                self.arena[l.0].parent = None;
                let new_left_root = self.splay_max(l);
                self.arena[new_left_root.0].right = Some(r);
                self.arena[r.0].parent = Some(new_left_root);
                self.update_weight(new_left_root);
                Some(new_left_root)
            }
        };

        self.arena[id.0].left = None;
        self.arena[id.0].right = None;
        self.arena[id.0].parent = None;
        self.arena[id.0].len = 0;
        self.arena[id.0].weight = 0;
        self.root = new_root;
    }

    /// Recompute `id`'s subtree weight from its children. Call after mutating
    /// `len` directly (e.g. tombstoning a node by zeroing its length).
    pub fn update_weight(&mut self, id: SplayNodeId) {
        let left_w = self.weight(self.arena[id.0].left);
        let right_w = self.weight(self.arena[id.0].right);
        self.arena[id.0].weight = left_w + right_w + self.arena[id.0].len;
        if let Some(p) = self.arena[id.0].parent {
            self.update_weight(p);
        }
    }

    /// Set `id`'s own length (e.g. to 0 for a tombstone) and repropagate weight.
    pub fn set_length(&mut self, id: SplayNodeId, len: usize) {
        self.arena[id.0].len = len;
        self.update_weight(id);
    }

    /// Translate a global index into `(node, offset_within_node)`.
    pub fn find(&mut self, pos: usize) -> Option<(SplayNodeId, usize)> {
        let mut current = self.root?;
        let mut remaining = pos;
        loop {
            let left_w = self.weight(self.arena[current.0].left);
            if remaining < left_w {
                current = self.arena[current.0].left?;
                continue;
            }
            let here = remaining - left_w;
            if here < self.arena[current.0].len || self.arena[current.0].right.is_none() {
                self.splay(current);
                return Some((current, here.min(self.length(current))));
            }
            remaining = here - self.arena[current.0].len;
            current = self.arena[current.0].right?;
        }
    }

    /// Inverse of `find`: the starting index of `id` in the whole sequence.
    pub fn index_of(&mut self, id: SplayNodeId) -> usize {
        self.splay(id);
        self.weight(self.arena[id.0].left)
    }

    /// In-order successor of `id`, if any.
    pub fn next(&self, id: SplayNodeId) -> Option<SplayNodeId> {
        if let Some(r) = self.arena[id.0].right {
            let mut cur = r;
            while let Some(l) = self.arena[cur.0].left {
                cur = l;
            }
            return Some(cur);
        }
        let mut cur = id;
        while let Some(p) = self.arena[cur.0].parent {
            if self.arena[p.0].left == Some(cur) {
                return Some(p);
            }
            cur = p;
        }
        None
    }

    /// In-order predecessor of `id`, if any.
    pub fn prev(&self, id: SplayNodeId) -> Option<SplayNodeId> {
        if let Some(l) = self.arena[id.0].left {
            let mut cur = l;
            while let Some(r) = self.arena[cur.0].right {
                cur = r;
            }
            return Some(cur);
        }
        let mut cur = id;
        while let Some(p) = self.arena[cur.0].parent {
            if self.arena[p.0].right == Some(cur) {
                return Some(p);
            }
            cur = p;
        }
        None
    }

    pub fn root(&self) -> Option<SplayNodeId> {
        self.root
    }

    /// Zero the weight of every node whose index range overlaps `[from, to)`,
    /// assuming node boundaries already align with `from`/`to` (the caller is
    /// expected to have split boundary nodes first). Returns the nodes that
    /// were zeroed, in sequence order.
    pub fn cut_off_range(&mut self, from: usize, to: usize) -> Vec<SplayNodeId> {
        if to <= from {
            return Vec::new();
        }
        let mut removed = Vec::new();
        let Some((mut node, _)) = self.find(from) else {
            return removed;
        };
        let mut consumed = 0usize;
        let total = to - from;
        loop {
            if consumed >= total {
                break;
            }
            let len = self.length(node);
            if len > 0 {
                self.set_length(node, 0);
                removed.push(node);
            }
            consumed += len;
            match self.next(node) {
                Some(n) => node = n,
                None => break,
            }
            if consumed >= total {
                break;
            }
        }
        removed
    }

    fn weight(&self, id: Option<SplayNodeId>) -> usize {
        id.map(|i| self.arena[i.0].weight).unwrap_or(0)
    }

    fn push_node(&mut self, value: T, len: usize) -> SplayNodeId {
        let id = SplayNodeId(self.arena.len());
        self.arena.push(Node {
            value,
            len,
            weight: len,
            parent: None,
            left: None,
            right: None,
        });
        id
    }

    fn rotate_left(&mut self, x: SplayNodeId) {
        let p = self.arena[x.0].parent.expect("rotate_left without parent");
        let b = self.arena[x.0].left;

        self.arena[p.0].right = b;
        if let Some(b) = b {
            self.arena[b.0].parent = Some(p);
        }

        let gp = self.arena[p.0].parent;
        self.arena[x.0].parent = gp;
        if let Some(gp) = gp {
            if self.arena[gp.0].left == Some(p) {
                self.arena[gp.0].left = Some(x);
            } else {
                self.arena[gp.0].right = Some(x);
            }
        }

        self.arena[x.0].left = Some(p);
        self.arena[p.0].parent = Some(x);

        self.update_weight_local(p);
        self.update_weight_local(x);
    }

    fn rotate_right(&mut self, x: SplayNodeId) {
        let p = self.arena[x.0].parent.expect("rotate_right without parent");
        let b = self.arena[x.0].right;

        self.arena[p.0].left = b;
        if let Some(b) = b {
            self.arena[b.0].parent = Some(p);
        }

        let gp = self.arena[p.0].parent;
        self.arena[x.0].parent = gp;
        if let Some(gp) = gp {
            if self.arena[gp.0].left == Some(p) {
                self.arena[gp.0].left = Some(x);
            } else {
                self.arena[gp.0].right = Some(x);
            }
        }

        self.arena[x.0].right = Some(p);
        self.arena[p.0].parent = Some(x);

        self.update_weight_local(p);
        self.update_weight_local(x);
    }

    /// Recompute just `id`'s own weight from its current children, without
    /// walking further up (the rotate helpers call this bottom-up manually).
    fn update_weight_local(&mut self, id: SplayNodeId) {
        let left_w = self.weight(self.arena[id.0].left);
        let right_w = self.weight(self.arena[id.0].right);
        self.arena[id.0].weight = left_w + right_w + self.arena[id.0].len;
    }

    /// Splay `id` to the root of its tree.
    fn splay(&mut self, id: SplayNodeId) {
        while let Some(p) = self.arena[id.0].parent {
            match self.arena[p.0].parent {
                None => {
                    if self.arena[p.0].left == Some(id) {
                        self.rotate_right(id);
                    } else {
                        self.rotate_left(id);
                    }
                }
                Some(gp) => {
                    let p_is_left = self.arena[gp.0].left == Some(p);
                    let id_is_left = self.arena[p.0].left == Some(id);
                    if p_is_left && id_is_left {
                        self.rotate_right(p);
                        self.rotate_right(id);
                    } else if !p_is_left && !id_is_left {
                        self.rotate_left(p);
                        self.rotate_left(id);
                    } else if p_is_left && !id_is_left {
                        self.rotate_left(id);
                        self.rotate_right(id);
                    } else {
                        self.rotate_right(id);
                        self.rotate_left(id);
                    }
                }
            }
        }
        self.root = Some(id);
    }

    /// Splay the maximum node of the subtree rooted at `id` to become the
    /// (local) root, returning its id. Used by `delete` to join subtrees.
    fn splay_max(&mut self, id: SplayNodeId) -> SplayNodeId {
        let mut cur = id;
        while let Some(r) = self.arena[cur.0].right {
            cur = r;
        }
        self.splay(cur);
        cur
    }
}
