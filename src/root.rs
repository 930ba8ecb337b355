//! The document's single owner of concrete element storage (spec §4.9).
//!
//! Containers (`CRDTObject`, `CRDTArray`, `CRDTText`'s split blocks, ...)
//! reference children by [`TimeTicket`] identity only; `CRDTRoot` is where
//! the actual [`Element`] payloads live, alongside the GC bookkeeping and
//! document-size accounting that only make sense with a whole-document view.

use std::collections::{HashMap, HashSet};

use crate::array::CRDTArray;
use crate::element::{Element, ElementValue};
use crate::error::{Error, Result};
use crate::gc::{GcPair, GcTarget};
use crate::object::CRDTObject;
use crate::primitive::PrimitiveValue;
use crate::ticket::TimeTicket;
use crate::version_vector::VersionVector;

/// Flat overhead billed per registered identity: a `TimeTicket` is
/// `lamport: u64` + `actor_id: u128` + `delimiter: u32`.
const TICKET_META_SIZE: usize = 8 + 16 + 4;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SizeBucket {
    pub data: usize,
    pub meta: usize,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DocSize {
    pub live: SizeBucket,
    pub gc: SizeBucket,
}

#[derive(Clone)]
struct Entry {
    element: Element,
    parent: Option<TimeTicket>,
}

#[derive(Clone)]
pub struct CRDTRoot {
    elements: HashMap<TimeTicket, Entry>,
    gc_elements: HashSet<TimeTicket>,
    gc_pairs: HashMap<String, GcPair>,
    doc_size: DocSize,
    root_object: TimeTicket,
}

impl CRDTRoot {
    pub fn new(created_at: TimeTicket) -> Self {
        let root_element = Element::new(ElementValue::Object(CRDTObject::new(created_at)));
        let mut root = Self {
            elements: HashMap::new(),
            gc_elements: HashSet::new(),
            gc_pairs: HashMap::new(),
            doc_size: DocSize::default(),
            root_object: created_at,
        };
        root.register_element(root_element, None)
            .expect("registering a fresh root element cannot fail");
        root
    }

    pub fn root_object(&self) -> TimeTicket {
        self.root_object
    }

    pub fn doc_size(&self) -> DocSize {
        self.doc_size
    }

    pub fn get(&self, created_at: TimeTicket) -> Result<&Element> {
        self.elements
            .get(&created_at)
            .map(|e| &e.element)
            .ok_or_else(|| Error::invalid_argument(format!("unknown element {created_at:?}")))
    }

    pub fn get_mut(&mut self, created_at: TimeTicket) -> Result<&mut Element> {
        self.elements
            .get_mut(&created_at)
            .map(|e| &mut e.element)
            .ok_or_else(|| Error::invalid_argument(format!("unknown element {created_at:?}")))
    }

    pub fn parent_of(&self, created_at: TimeTicket) -> Result<Option<TimeTicket>> {
        self.elements
            .get(&created_at)
            .map(|e| e.parent)
            .ok_or_else(|| Error::invalid_argument(format!("unknown element {created_at:?}")))
    }

    /// Record a freshly created element under `parent`, charging its own
    /// `data_size` plus a fixed identity overhead to the live bucket.
    /// Container elements (object/array) bill 0 data of their own — their
    /// members are billed individually as each is registered in turn.
    pub fn register_element(&mut self, element: Element, parent: Option<TimeTicket>) -> Result<()> {
        let created_at = element.created_at();
        if self.elements.contains_key(&created_at) {
            return Err(Error::invalid_argument(format!("element {created_at:?} already registered")));
        }
        let data = element.data_size();
        self.doc_size.live.data += data;
        self.doc_size.live.meta += TICKET_META_SIZE;
        self.elements.insert(created_at, Entry { element, parent });
        Ok(())
    }

    /// Move a tombstoned element's size from `live` to `gc` and index it in
    /// `gc_elements`. The element must already carry a tombstone (set via
    /// [`Element::remove`]) before calling this.
    pub fn register_removed_element(&mut self, created_at: TimeTicket) -> Result<()> {
        let entry = self
            .elements
            .get(&created_at)
            .ok_or_else(|| Error::invalid_argument(format!("unknown element {created_at:?}")))?;
        if !entry.element.is_removed() {
            return Err(Error::invalid_argument("cannot register a live element as removed"));
        }
        if self.gc_elements.contains(&created_at) {
            return Ok(());
        }
        let data = entry.element.data_size();
        self.doc_size.live.data -= data;
        self.doc_size.live.meta -= TICKET_META_SIZE;
        self.doc_size.gc.data += data;
        self.doc_size.gc.meta += TICKET_META_SIZE + TICKET_META_SIZE;
        self.gc_elements.insert(created_at);
        Ok(())
    }

    /// Idempotent: registering the same pair twice cancels out (treated as
    /// resurrection — the remove that produced it must have been undone by a
    /// later concurrent operation).
    pub fn register_gc_pair(&mut self, pair: GcPair) {
        let key = pair.child.key();
        if self.gc_pairs.remove(&key).is_some() {
            self.doc_size.gc.meta -= TICKET_META_SIZE;
            self.doc_size.live.meta += TICKET_META_SIZE;
        } else {
            self.doc_size.live.meta -= TICKET_META_SIZE;
            self.doc_size.gc.meta += TICKET_META_SIZE;
            self.gc_pairs.insert(key, pair);
        }
    }

    fn path_component(&mut self, parent_id: TimeTicket, child_id: TimeTicket) -> Result<String> {
        let parent = self
            .elements
            .get_mut(&parent_id)
            .ok_or_else(|| Error::invalid_argument(format!("unknown element {parent_id:?}")))?;
        match parent.element.value_mut() {
            ElementValue::Object(obj) => obj
                .iter_sorted()
                .into_iter()
                .find(|(_, id)| *id == child_id)
                .map(|(k, _)| escape_path_component(k))
                .ok_or_else(|| Error::unexpected("child missing from parent object")),
            ElementValue::Array(arr) => arr.index_of(child_id).map(|idx| idx.to_string()),
            _ => Err(Error::invalid_argument("parent element is not a container")),
        }
    }

    /// `$.a.b.c`-style path from the document root down to `created_at`.
    pub fn create_path(&mut self, created_at: TimeTicket) -> Result<String> {
        let components = self.create_sub_paths(created_at)?;
        let mut path = String::from("$");
        for component in components {
            path.push('.');
            path.push_str(&component);
        }
        Ok(path)
    }

    /// The ordered list of path components from root to `created_at`
    /// (without the leading `$`), escaped per-component.
    pub fn create_sub_paths(&mut self, created_at: TimeTicket) -> Result<Vec<String>> {
        let mut components = Vec::new();
        let mut current = created_at;
        loop {
            let parent = self
                .elements
                .get(&current)
                .ok_or_else(|| Error::invalid_argument(format!("unknown element {current:?}")))?
                .parent;
            match parent {
                None => break,
                Some(parent_id) => {
                    components.push(self.path_component(parent_id, current)?);
                    current = parent_id;
                }
            }
        }
        components.reverse();
        Ok(components)
    }

    /// Purge every tombstoned element/GC pair that `min_synced_vv` has fully
    /// observed. Returns the number of entries purged.
    ///
    /// Live object elements are additionally swept for their own tombstoned
    /// members, independent of `gc_pairs` (`ElementRHT` tracks displaced
    /// bindings itself rather than going through a registered pair); those
    /// prunes aren't counted in the returned total since they purge object
    /// bindings, not the gc_elements/gc_pairs entries the count documents.
    pub fn garbage_collect(&mut self, min_synced_vv: &VersionVector) -> usize {
        let mut purged = 0;

        let ready: Vec<TimeTicket> = self
            .gc_elements
            .iter()
            .copied()
            .filter(|id| {
                self.elements
                    .get(id)
                    .and_then(|e| e.element.removed_at())
                    .map(|removed_at| min_synced_vv.after_or_equal(&removed_at))
                    .unwrap_or(false)
            })
            .collect();
        for id in ready {
            if let Some(entry) = self.elements.remove(&id) {
                let data = entry.element.data_size();
                self.doc_size.gc.data -= data;
                self.doc_size.gc.meta -= TICKET_META_SIZE + TICKET_META_SIZE;
            }
            self.gc_elements.remove(&id);
            purged += 1;
        }

        let ready_pairs: Vec<GcPair> = self
            .gc_pairs
            .values()
            .filter(|pair| min_synced_vv.after_or_equal(&pair.removed_at))
            .cloned()
            .collect();
        for pair in ready_pairs {
            self.purge_gc_pair(&pair);
            self.gc_pairs.remove(&pair.child.key());
            self.doc_size.gc.meta -= TICKET_META_SIZE;
            purged += 1;
        }

        let object_ids: Vec<TimeTicket> = self
            .elements
            .iter()
            .filter(|(_, e)| !e.element.is_removed() && matches!(e.element.value(), ElementValue::Object(_)))
            .map(|(&id, _)| id)
            .collect();
        for id in object_ids {
            if let Some(entry) = self.elements.get_mut(&id) {
                if let ElementValue::Object(obj) = entry.element.value_mut() {
                    obj.prune_tombstones(min_synced_vv);
                }
            }
        }

        purged
    }

    /// Physically purge the container-level node or attribute entry a GC
    /// pair identifies. The owning element may itself already be gone
    /// (concurrently purged via `gc_elements`), in which case this is a no-op.
    fn purge_gc_pair(&mut self, pair: &GcPair) {
        let Some(entry) = self.elements.get_mut(&pair.parent) else {
            return;
        };
        match (entry.element.value_mut(), &pair.child) {
            (ElementValue::Text(text), GcTarget::TextBlock(id)) => {
                let _ = text.purge_text_node(*id);
            }
            (ElementValue::Text(text), GcTarget::TextAttr(id, key)) => {
                text.purge_attr(*id, key);
            }
            (ElementValue::Tree(tree), GcTarget::TreeToken(id)) => {
                let _ = tree.purge(*id);
            }
            (ElementValue::Tree(tree), GcTarget::TreeAttr(id, key)) => {
                let _ = tree.purge_attr(*id, key);
            }
            _ => {}
        }
    }

    pub fn deepcopy(&self) -> Self {
        self.clone()
    }

    pub fn to_json(&self) -> Result<String> {
        self.render(self.root_object, false)
    }

    pub fn to_sorted_json(&self) -> Result<String> {
        self.render(self.root_object, true)
    }

    fn render(&self, created_at: TimeTicket, sorted: bool) -> Result<String> {
        let entry = self
            .elements
            .get(&created_at)
            .ok_or_else(|| Error::invalid_argument(format!("unknown element {created_at:?}")))?;
        if entry.element.is_removed() {
            return Ok("null".to_string());
        }
        match entry.element.value() {
            ElementValue::Primitive(p) => Ok(render_primitive(p.value())),
            ElementValue::Counter(c) => Ok(render_counter(c.value())),
            ElementValue::Object(obj) => {
                let mut parts = Vec::new();
                if sorted {
                    for (key, child_id) in obj.iter_sorted() {
                        let value = self.render(child_id, sorted)?;
                        parts.push(format!("{}:{value}", json_string(key)));
                    }
                } else {
                    for (key, child_id) in obj.iter() {
                        let value = self.render(child_id, sorted)?;
                        parts.push(format!("{}:{value}", json_string(key)));
                    }
                }
                Ok(format!("{{{}}}", parts.join(",")))
            }
            ElementValue::Array(arr) => {
                let mut parts = Vec::with_capacity(arr.len());
                for child_id in arr.values() {
                    parts.push(self.render(child_id, sorted)?);
                }
                Ok(format!("[{}]", parts.join(",")))
            }
            ElementValue::Text(text) => {
                let mut parts = Vec::new();
                for seg in text.segments() {
                    if seg.attrs.is_empty() {
                        parts.push(format!("{{\"val\":{}}}", json_string(&seg.value)));
                    } else {
                        let attrs: Vec<String> = seg
                            .attrs
                            .iter()
                            .map(|(k, v)| format!("{}:{}", json_string(k), json_string(v)))
                            .collect();
                        parts.push(format!(
                            "{{\"attrs\":{{{}}},\"val\":{}}}",
                            attrs.join(","),
                            json_string(&seg.value)
                        ));
                    }
                }
                Ok(format!("[{}]", parts.join(",")))
            }
            ElementValue::Tree(tree) => Ok(format!("{{\"type\":\"tree\",\"xml\":{}}}", json_string(&tree.to_xml()))),
        }
    }
}

fn render_primitive(value: &PrimitiveValue) -> String {
    match value {
        PrimitiveValue::Null => "null".to_string(),
        PrimitiveValue::Bool(b) => b.to_string(),
        PrimitiveValue::I32(i) => i.to_string(),
        PrimitiveValue::I64(i) => i.to_string(),
        PrimitiveValue::F64(f) => f.to_string(),
        PrimitiveValue::String(s) => json_string(s),
        PrimitiveValue::Bytes(b) => {
            let mut parts = vec![b.len().to_string()];
            parts.extend(b.iter().map(|byte| byte.to_string()));
            format!("[{}]", parts.join(","))
        }
        PrimitiveValue::Date(ms) => ms.to_string(),
    }
}

fn render_counter(value: crate::counter::CounterValue) -> String {
    match value {
        crate::counter::CounterValue::I32(i) => i.to_string(),
        crate::counter::CounterValue::I64(i) => i.to_string(),
    }
}

fn json_string(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c.is_control() => out.push_str(&format!("\\u{:04x}", c as u32)),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

fn escape_path_component(key: &str) -> String {
    let mut out = String::with_capacity(key.len());
    for c in key.chars() {
        if c == '.' || c == '$' || c == '\\' {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ticket::ActorId;

    fn t(l: u64) -> TimeTicket {
        TimeTicket::new(l, 0, ActorId(1))
    }

    #[test]
    fn register_and_remove_moves_size_from_live_to_gc() {
        let mut root = CRDTRoot::new(t(0));
        let child = Element::new(ElementValue::Primitive(
            crate::primitive::CRDTPrimitive::new(t(1), PrimitiveValue::String("hi".into())).unwrap(),
        ));
        root.register_element(child, Some(t(0))).unwrap();
        assert!(root.doc_size().live.data > 0);

        root.get_mut(t(1)).unwrap().remove(t(2));
        root.register_removed_element(t(1)).unwrap();
        assert_eq!(root.doc_size().live.data, 0);
        assert!(root.doc_size().gc.data > 0);
    }

    #[test]
    fn garbage_collect_purges_only_causally_observed_tombstones() {
        let mut root = CRDTRoot::new(t(0));
        let child = Element::new(ElementValue::Primitive(
            crate::primitive::CRDTPrimitive::new(t(1), PrimitiveValue::Bool(true)).unwrap(),
        ));
        root.register_element(child, Some(t(0))).unwrap();
        root.get_mut(t(1)).unwrap().remove(t(9));
        root.register_removed_element(t(1)).unwrap();

        let mut behind = VersionVector::new();
        behind.observe(ActorId(1), 5);
        assert_eq!(root.garbage_collect(&behind), 0);

        let mut caught_up = VersionVector::new();
        caught_up.observe(ActorId(1), 9);
        assert_eq!(root.garbage_collect(&caught_up), 1);
        assert!(root.get(t(1)).is_err());
        assert_eq!(root.doc_size().gc.data, 0);
    }

    #[test]
    fn garbage_collect_purges_a_registered_gc_pair_physically() {
        use crate::text::CRDTText;

        let mut root = CRDTRoot::new(t(0));
        let mut text = CRDTText::new(t(1));
        text.edit(0, 0, Some("hello".into()), t(2), None, None, true).unwrap();
        let (_, gc_pairs, _) = text.edit(1, 4, None, t(3), None, None, true).unwrap();
        assert_eq!(gc_pairs.len(), 1);

        root.register_element(Element::new(ElementValue::Text(text)), Some(t(0))).unwrap();
        for pair in gc_pairs {
            root.register_gc_pair(pair);
        }

        let before = match root.get(t(1)).unwrap().value() {
            ElementValue::Text(text) => text.block_count(),
            _ => unreachable!(),
        };

        let mut caught_up = VersionVector::new();
        caught_up.observe(ActorId(1), 3);
        root.garbage_collect(&caught_up);

        let after = match root.get(t(1)).unwrap().value() {
            ElementValue::Text(text) => text.block_count(),
            _ => unreachable!(),
        };
        assert!(after < before, "purge should physically drop the tombstoned block, not just the gc_pairs entry");
    }

    #[test]
    fn create_path_walks_object_and_array_ancestors() {
        let mut root = CRDTRoot::new(t(0));
        let array = Element::new(ElementValue::Array(CRDTArray::new(t(1))));
        root.register_element(array, Some(t(0))).unwrap();
        if let ElementValue::Object(obj) = root.get_mut(t(0)).unwrap().value_mut() {
            obj.set("items", t(1));
        }

        let leaf = Element::new(ElementValue::Primitive(
            crate::primitive::CRDTPrimitive::new(t(2), PrimitiveValue::I32(1)).unwrap(),
        ));
        root.register_element(leaf, Some(t(1))).unwrap();
        if let ElementValue::Array(arr) = root.get_mut(t(1)).unwrap().value_mut() {
            arr.insert(t(2), TimeTicket::INITIAL, t(2)).unwrap();
        }

        assert_eq!(root.create_path(t(2)).unwrap(), "$.items.0");
    }
}
