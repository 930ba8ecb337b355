//! Left-leaning red-black balanced map (spec §4.2).
//!
//! Keyed by anything `Ord + Clone` (in practice `TimeTicket` or
//! `CRDTTreeNodeID`). The one query every caller actually needs is
//! `floor_entry`: the greatest key `<=` a given query key, used to locate the
//! block or node that owns a logical position.

use std::cmp::Ordering;

#[derive(Clone)]
struct Node<K, V> {
    key: K,
    value: V,
    black: bool,
    left: Option<Box<Node<K, V>>>,
    right: Option<Box<Node<K, V>>>,
}

impl<K, V> Node<K, V> {
    fn new(key: K, value: V) -> Box<Self> {
        Box::new(Node {
            key,
            value,
            black: false,
            left: None,
            right: None,
        })
    }
}

fn is_red<K, V>(node: &Option<Box<Node<K, V>>>) -> bool {
    node.as_ref().map(|n| !n.black).unwrap_or(false)
}

fn rotate_left<K, V>(mut h: Box<Node<K, V>>) -> Box<Node<K, V>> {
    let mut x = h.right.take().expect("rotate_left requires a right child");
    h.right = x.left.take();
    x.black = h.black;
    h.black = false;
    x.left = Some(h);
    x
}

fn rotate_right<K, V>(mut h: Box<Node<K, V>>) -> Box<Node<K, V>> {
    let mut x = h.left.take().expect("rotate_right requires a left child");
    h.left = x.right.take();
    x.black = h.black;
    h.black = false;
    x.right = Some(h);
    x
}

fn flip_colors<K, V>(h: &mut Node<K, V>) {
    h.black = !h.black;
    if let Some(l) = h.left.as_mut() {
        l.black = !l.black;
    }
    if let Some(r) = h.right.as_mut() {
        r.black = !r.black;
    }
}

fn fix_up<K, V>(mut h: Box<Node<K, V>>) -> Box<Node<K, V>> {
    if is_red(&h.right) && !is_red(&h.left) {
        h = rotate_left(h);
    }
    if is_red(&h.left) && is_red(&h.left.as_ref().unwrap().left) {
        h = rotate_right(h);
    }
    if is_red(&h.left) && is_red(&h.right) {
        flip_colors(&mut h);
    }
    h
}

fn insert<K: Ord, V>(node: Option<Box<Node<K, V>>>, key: K, value: V) -> Box<Node<K, V>> {
    let mut h = match node {
        None => return Node::new(key, value),
        Some(h) => h,
    };

    match key.cmp(&h.key) {
        Ordering::Less => h.left = Some(insert(h.left.take(), key, value)),
        Ordering::Greater => h.right = Some(insert(h.right.take(), key, value)),
        Ordering::Equal => h.value = value,
    }

    fix_up(h)
}

fn get<'a, K: Ord, V>(node: &'a Option<Box<Node<K, V>>>, key: &K) -> Option<&'a V> {
    let mut current = node.as_deref();
    while let Some(n) = current {
        match key.cmp(&n.key) {
            Ordering::Less => current = n.left.as_deref(),
            Ordering::Greater => current = n.right.as_deref(),
            Ordering::Equal => return Some(&n.value),
        }
    }
    None
}

/// Greatest key `<= key`, recursively so we can prefer a right-subtree match
/// over falling back to the current node.
fn floor<'a, K: Ord, V>(node: &'a Option<Box<Node<K, V>>>, key: &K) -> Option<(&'a K, &'a V)> {
    let n = node.as_deref()?;
    match key.cmp(&n.key) {
        Ordering::Equal => Some((&n.key, &n.value)),
        Ordering::Less => floor(&n.left, key),
        Ordering::Greater => floor(&n.right, key).or(Some((&n.key, &n.value))),
    }
}

fn move_red_left<K, V>(mut h: Box<Node<K, V>>) -> Box<Node<K, V>> {
    flip_colors(&mut h);
    if is_red(&h.right.as_ref().unwrap().left) {
        let right = h.right.take().unwrap();
        h.right = Some(rotate_right(right));
        h = rotate_left(h);
        flip_colors(&mut h);
    }
    h
}

fn move_red_right<K, V>(mut h: Box<Node<K, V>>) -> Box<Node<K, V>> {
    flip_colors(&mut h);
    if is_red(&h.left.as_ref().unwrap().left) {
        h = rotate_right(h);
        flip_colors(&mut h);
    }
    h
}

fn min_node<K, V>(node: &Node<K, V>) -> (&K, &V) {
    let mut cur = node;
    while let Some(l) = cur.left.as_deref() {
        cur = l;
    }
    (&cur.key, &cur.value)
}

fn delete_min<K, V>(mut h: Box<Node<K, V>>) -> Option<Box<Node<K, V>>> {
    if h.left.is_none() {
        return None;
    }
    if !is_red(&h.left) && !is_red(&h.left.as_ref().unwrap().left) {
        h = move_red_left(h);
    }
    h.left = delete_min(h.left.take().unwrap());
    Some(fix_up(h))
}

fn delete<K: Ord + Clone, V>(mut h: Box<Node<K, V>>, key: &K) -> Option<Box<Node<K, V>>> {
    if *key < h.key {
        if h.left.is_some() {
            if !is_red(&h.left) && !is_red(&h.left.as_ref().unwrap().left) {
                h = move_red_left(h);
            }
            h.left = delete(h.left.take().unwrap(), key);
        }
    } else {
        if is_red(&h.left) {
            h = rotate_right(h);
        }
        if *key == h.key && h.right.is_none() {
            return None;
        }
        if h.right.is_some() {
            if !is_red(&h.right) && !is_red(&h.right.as_ref().unwrap().left) {
                h = move_red_right(h);
            }
            if *key == h.key {
                let (min_key, _) = {
                    let (k, v) = min_node(h.right.as_ref().unwrap());
                    (k.clone(), v)
                };
                let min_value_node = delete_min_take_value(h.right.take().unwrap());
                h.key = min_key;
                h.value = min_value_node.1;
                h.right = min_value_node.0;
            } else {
                h.right = delete(h.right.take().unwrap(), key);
            }
        }
    }
    Some(fix_up(h))
}

/// Deletes the minimum node of `h`, returning the resulting subtree and the
/// removed node's value so the caller can splice it into the deleted node's slot.
fn delete_min_take_value<K, V>(mut h: Box<Node<K, V>>) -> (Option<Box<Node<K, V>>>, V) {
    if h.left.is_none() {
        return (h.right.take(), h.value);
    }
    if !is_red(&h.left) && !is_red(&h.left.as_ref().unwrap().left) {
        h = move_red_left(h);
    }
    let (new_left, value) = delete_min_take_value(h.left.take().unwrap());
    h.left = new_left;
    (Some(fix_up(h)), value)
}

fn len<K, V>(node: &Option<Box<Node<K, V>>>) -> usize {
    match node {
        None => 0,
        Some(n) => 1 + len(&n.left) + len(&n.right),
    }
}

fn collect_in_order<'a, K, V>(node: &'a Option<Box<Node<K, V>>>, out: &mut Vec<(&'a K, &'a V)>) {
    if let Some(n) = node {
        collect_in_order(&n.left, out);
        out.push((&n.key, &n.value));
        collect_in_order(&n.right, out);
    }
}

/// Left-leaning red-black tree map with `floor_entry` support.
#[derive(Clone)]
pub struct LLRBTree<K, V> {
    root: Option<Box<Node<K, V>>>,
}

impl<K, V> Default for LLRBTree<K, V> {
    fn default() -> Self {
        Self { root: None }
    }
}

impl<K: Ord + Clone, V> LLRBTree<K, V> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.root.is_none()
    }

    pub fn len(&self) -> usize {
        len(&self.root)
    }

    pub fn put(&mut self, key: K, value: V) {
        let mut root = insert(self.root.take(), key, value);
        root.black = true;
        self.root = Some(root);
    }

    pub fn get(&self, key: &K) -> Option<&V> {
        get(&self.root, key)
    }

    pub fn contains(&self, key: &K) -> bool {
        self.get(key).is_some()
    }

    /// Greatest key `<=` `key`.
    pub fn floor_entry(&self, key: &K) -> Option<(&K, &V)> {
        floor(&self.root, key)
    }

    pub fn remove(&mut self, key: &K) {
        if !self.contains(key) {
            return;
        }
        let mut root = self.root.take().unwrap();
        if !is_red(&root.left) && !is_red(&root.right) {
            root.black = false;
        }
        self.root = delete(root, key);
        if let Some(r) = self.root.as_mut() {
            r.black = true;
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&K, &V)> {
        let mut out = Vec::new();
        collect_in_order(&self.root, &mut out);
        out.into_iter()
    }
}
