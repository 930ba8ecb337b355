//! Priority queue keyed by ticket (spec component table, "used by keyed map").
//!
//! A plain min-heap over `(TimeTicket, T)`, used by [`crate::element_rht::ElementRHT`]
//! to find its oldest tombstoned member bindings without scanning every
//! entry in its `by_created_at` table.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use crate::ticket::TimeTicket;

#[derive(Clone, Debug, Eq, PartialEq)]
struct HeapEntry<T> {
    key: TimeTicket,
    value: T,
}

impl<T: Eq> Ord for HeapEntry<T> {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed so `BinaryHeap` (a max-heap) pops the smallest ticket first.
        other.key.cmp(&self.key)
    }
}

impl<T: Eq> PartialOrd for HeapEntry<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[derive(Clone, Debug, Default)]
pub struct TicketHeap<T: Eq> {
    entries: BinaryHeap<HeapEntry<T>>,
}

impl<T: Eq> TicketHeap<T> {
    pub fn new() -> Self {
        Self {
            entries: BinaryHeap::new(),
        }
    }

    pub fn push(&mut self, key: TimeTicket, value: T) {
        self.entries.push(HeapEntry { key, value });
    }

    pub fn peek_key(&self) -> Option<TimeTicket> {
        self.entries.peek().map(|e| e.key)
    }

    pub fn pop(&mut self) -> Option<(TimeTicket, T)> {
        self.entries.pop().map(|e| (e.key, e.value))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
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
    fn pops_in_ascending_ticket_order() {
        let mut heap = TicketHeap::new();
        heap.push(t(5), "e");
        heap.push(t(1), "a");
        heap.push(t(3), "c");

        assert_eq!(heap.pop(), Some((t(1), "a")));
        assert_eq!(heap.pop(), Some((t(3), "c")));
        assert_eq!(heap.pop(), Some((t(5), "e")));
        assert_eq!(heap.pop(), None);
    }
}
