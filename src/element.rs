//! Tagged variant unifying the six concrete CRDT element kinds behind one
//! shared header (spec §9's redesign note: model the runtime type switch as
//! `{Primitive, Counter, Object, Array, Text, Tree}` with common
//! `{created_at, moved_at, removed_at}`, dispatching shared behaviour —
//! JSON, deepcopy, remove — from the variant and leaving container-specific
//! behaviour on the variant arm).

use crate::array::CRDTArray;
use crate::counter::CRDTCounter;
use crate::crdt_tree::CRDTTree;
use crate::object::CRDTObject;
use crate::primitive::{CRDTPrimitive, PrimitiveValue};
use crate::text::CRDTText;
use crate::ticket::TimeTicket;

#[derive(Clone)]
pub enum ElementValue {
    Primitive(CRDTPrimitive),
    Counter(CRDTCounter),
    Object(CRDTObject),
    Array(CRDTArray),
    Text(CRDTText),
    Tree(CRDTTree),
}

#[derive(Clone)]
pub struct Element {
    value: ElementValue,
    moved_at: Option<TimeTicket>,
    removed_at: Option<TimeTicket>,
}

impl Element {
    pub fn new(value: ElementValue) -> Self {
        Self {
            value,
            moved_at: None,
            removed_at: None,
        }
    }

    pub fn value(&self) -> &ElementValue {
        &self.value
    }

    pub fn value_mut(&mut self) -> &mut ElementValue {
        &mut self.value
    }

    pub fn created_at(&self) -> TimeTicket {
        match &self.value {
            ElementValue::Primitive(p) => p.created_at(),
            ElementValue::Counter(c) => c.created_at(),
            ElementValue::Object(o) => o.created_at(),
            ElementValue::Array(a) => a.created_at(),
            ElementValue::Text(t) => t.created_at(),
            ElementValue::Tree(t) => t.created_at(),
        }
    }

    pub fn moved_at(&self) -> Option<TimeTicket> {
        self.moved_at
    }

    pub fn removed_at(&self) -> Option<TimeTicket> {
        self.removed_at
    }

    pub fn is_removed(&self) -> bool {
        self.removed_at.is_some()
    }

    pub fn set_moved_at(&mut self, moved_at: TimeTicket) {
        self.moved_at = Some(moved_at);
    }

    /// Tombstone this element at `executed_at`. A no-op (returns `false`, not
    /// an error) if `executed_at` doesn't causally dominate both the
    /// element's creation and any existing tombstone (spec §4.9).
    pub fn remove(&mut self, executed_at: TimeTicket) -> bool {
        if executed_at <= self.created_at() {
            return false;
        }
        if let Some(removed_at) = self.removed_at {
            if executed_at <= removed_at {
                return false;
            }
        }
        self.removed_at = Some(executed_at);
        true
    }

    pub fn type_name(&self) -> &'static str {
        match &self.value {
            ElementValue::Primitive(_) => "primitive",
            ElementValue::Counter(_) => "counter",
            ElementValue::Object(_) => "object",
            ElementValue::Array(_) => "array",
            ElementValue::Text(_) => "text",
            ElementValue::Tree(_) => "tree",
        }
    }

    /// Own size, excluding any children registered separately in the root
    /// (containers are billed per member as those members are registered).
    pub fn data_size(&self) -> usize {
        match &self.value {
            ElementValue::Primitive(p) => p.data_size(),
            ElementValue::Counter(c) => c.data_size(),
            ElementValue::Object(o) => o.data_size(),
            ElementValue::Array(_) => 0,
            ElementValue::Text(t) => t.len(),
            ElementValue::Tree(t) => t.len(),
        }
    }
}

/// Constructs a leaf `Null` element, useful for tests and as a placeholder
/// root-object member default.
impl From<PrimitiveValue> for ElementValue {
    fn from(value: PrimitiveValue) -> Self {
        ElementValue::Primitive(CRDTPrimitive::new(TimeTicket::INITIAL, value).expect("finite value"))
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
    fn remove_is_a_noop_when_ticket_precedes_creation() {
        let mut el = Element::new(ElementValue::Primitive(
            CRDTPrimitive::new(t(5), PrimitiveValue::Bool(true)).unwrap(),
        ));
        assert!(!el.remove(t(3)));
        assert!(!el.is_removed());
        assert!(el.remove(t(6)));
        assert!(el.is_removed());
    }

    #[test]
    fn remove_is_a_noop_against_a_fresher_existing_tombstone() {
        let mut el = Element::new(ElementValue::Primitive(
            CRDTPrimitive::new(t(1), PrimitiveValue::Bool(true)).unwrap(),
        ));
        assert!(el.remove(t(10)));
        assert!(!el.remove(t(5)));
        assert_eq!(el.removed_at(), Some(t(10)));
    }
}
