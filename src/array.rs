//! Ordered sequence container: an `RGATreeList` of child identities
//! (spec §3.3, §4.5).

use crate::error::Result;
use crate::rga_tree_list::RgaTreeList;
use crate::ticket::TimeTicket;

#[derive(Clone)]
pub struct CRDTArray {
    created_at: TimeTicket,
    elements: RgaTreeList,
}

impl CRDTArray {
    pub fn new(created_at: TimeTicket) -> Self {
        Self {
            created_at,
            elements: RgaTreeList::new(),
        }
    }

    pub fn created_at(&self) -> TimeTicket {
        self.created_at
    }

    pub fn insert(&mut self, value: TimeTicket, after: TimeTicket, executed_at: TimeTicket) -> Result<()> {
        self.elements.insert(value, after, executed_at)
    }

    pub fn move_element(&mut self, created_at: TimeTicket, after: TimeTicket, executed_at: TimeTicket) -> Result<bool> {
        self.elements.move_element(created_at, after, executed_at)
    }

    pub fn remove(&mut self, created_at: TimeTicket, executed_at: TimeTicket) -> Result<bool> {
        self.elements.remove(created_at, executed_at)
    }

    pub fn remove_by_index(&mut self, index: usize, executed_at: TimeTicket) -> Result<TimeTicket> {
        self.elements.remove_by_index(index, executed_at)
    }

    pub fn index_of(&mut self, created_at: TimeTicket) -> Result<usize> {
        self.elements.index_of(created_at)
    }

    pub fn get_previous_created_at(&self, created_at: TimeTicket) -> Option<TimeTicket> {
        self.elements.get_previous_created_at(created_at)
    }

    pub fn is_removed(&self, created_at: TimeTicket) -> bool {
        self.elements.is_removed(created_at)
    }

    pub fn values(&self) -> Vec<TimeTicket> {
        self.elements.values()
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
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
    fn insert_and_iterate_in_sequence_order() {
        let mut arr = CRDTArray::new(t(0, 0));
        arr.insert(t(1, 1), TimeTicket::INITIAL, t(1, 1)).unwrap();
        arr.insert(t(2, 1), t(1, 1), t(2, 1)).unwrap();
        assert_eq!(arr.values(), vec![t(1, 1), t(2, 1)]);
    }
}
