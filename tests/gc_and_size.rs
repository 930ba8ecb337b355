//! S5 and related GC-soundness / document-size invariants (testable
//! properties 4, 5, 6), exercised through `CRDTRoot` end to end.

use crdt_engine::{ActorId, CRDTRoot, Element, ElementValue, PrimitiveValue, TimeTicket, VersionVector};

fn t(lamport: u64, actor: u128) -> TimeTicket {
    TimeTicket::new(lamport, 0, ActorId(actor))
}

fn primitive(created_at: TimeTicket) -> Element {
    Element::new(ElementValue::Primitive(
        crdt_engine::CRDTPrimitive::new(created_at, PrimitiveValue::Bool(true)).unwrap(),
    ))
}

/// S5: `min_synced_vv = {A:10, B:8}`. A tombstone removed at `(lamport=9,
/// actor=A)` is causally behind A's synced frontier and is purged; one
/// removed at `(lamport=9, actor=B)` is ahead of B's synced frontier (8) and
/// must be retained.
#[test]
fn gc_purges_only_tombstones_within_the_synced_frontier() {
    let root_created = t(0, 0);
    let mut root = CRDTRoot::new(root_created);

    let a_child = t(1, 1);
    root.register_element(primitive(a_child), Some(root_created)).unwrap();
    root.get_mut(a_child).unwrap().remove(t(9, 1));
    root.register_removed_element(a_child).unwrap();

    let b_child = t(2, 2);
    root.register_element(primitive(b_child), Some(root_created)).unwrap();
    root.get_mut(b_child).unwrap().remove(t(9, 2));
    root.register_removed_element(b_child).unwrap();

    let mut min_synced = VersionVector::new();
    min_synced.observe(ActorId(1), 10);
    min_synced.observe(ActorId(2), 8);

    let purged = root.garbage_collect(&min_synced);

    assert_eq!(purged, 1);
    assert!(root.get(a_child).is_err(), "A's tombstone is behind the synced frontier and is purged");
    assert!(root.get(b_child).is_ok(), "B's tombstone is ahead of its synced frontier and is retained");
}

/// Document size invariant: every byte charged to `live` when an element is
/// registered is charged to `gc` (never double-counted, never lost) once it
/// is tombstoned and registered as removed, and vanishes entirely only once
/// garbage-collected.
#[test]
fn doc_size_conserves_bytes_across_the_tombstone_lifecycle() {
    let root_created = t(0, 0);
    let mut root = CRDTRoot::new(root_created);

    let child = t(1, 1);
    root.register_element(primitive(child), Some(root_created)).unwrap();
    let live_data_before = root.doc_size().live.data;
    assert!(live_data_before > 0);
    assert_eq!(root.doc_size().gc.data, 0);

    root.get_mut(child).unwrap().remove(t(5, 1));
    root.register_removed_element(child).unwrap();
    assert_eq!(root.doc_size().live.data, 0);
    assert_eq!(root.doc_size().gc.data, live_data_before);

    let mut fully_synced = VersionVector::new();
    fully_synced.observe(ActorId(1), 5);
    assert_eq!(root.garbage_collect(&fully_synced), 1);
    assert_eq!(root.doc_size().gc.data, 0);
    assert_eq!(root.doc_size().live.data, 0);
}
