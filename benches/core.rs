use criterion::{criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion};
use crdt_engine::{ActorId, CRDTTree, CRDTTreePos, RgaTreeList, TimeTicket, TreeNodeValue};

fn t(lamport: u64) -> TimeTicket {
    TimeTicket::new(lamport, 0, ActorId(1))
}

fn bench_array_insert_chain(c: &mut Criterion) {
    let sizes = [100u64, 1_000, 10_000];
    let mut group = c.benchmark_group("array_insert_chain");

    for size in sizes {
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, &n| {
            b.iter_batched(
                RgaTreeList::new,
                |mut list| {
                    let mut anchor = TimeTicket::INITIAL;
                    for i in 0..n {
                        let ticket = t(i + 1);
                        list.insert(ticket, anchor, ticket).unwrap();
                        anchor = ticket;
                    }
                },
                BatchSize::SmallInput,
            );
        });
    }

    group.finish();
}

fn bench_array_remove_by_index(c: &mut Criterion) {
    let mut group = c.benchmark_group("array_remove_by_index");
    group.bench_function("remove_first_of_1000", |b| {
        b.iter_batched(
            || {
                let mut list = RgaTreeList::new();
                let mut anchor = TimeTicket::INITIAL;
                for i in 0..1_000u64 {
                    let ticket = t(i + 1);
                    list.insert(ticket, anchor, ticket).unwrap();
                    anchor = ticket;
                }
                list
            },
            |mut list| {
                list.remove_by_index(0, t(2_000)).unwrap();
            },
            BatchSize::SmallInput,
        );
    });
    group.finish();
}

fn bench_tree_insert_chain(c: &mut Criterion) {
    let sizes = [100u64, 1_000, 10_000];
    let mut group = c.benchmark_group("tree_insert_chain");

    for size in sizes {
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, &n| {
            b.iter_batched(
                || CRDTTree::new(t(0), "r"),
                |mut tree| {
                    let root = tree.root_id();
                    let mut parent = root;
                    for i in 0..n {
                        let ticket = t(i + 1);
                        parent = tree
                            .insert(CRDTTreePos::new(parent, parent), TreeNodeValue::Element { tag: "p".into() }, ticket, ticket)
                            .unwrap();
                    }
                },
                BatchSize::SmallInput,
            );
        });
    }

    group.finish();
}

fn bench_tree_index_of(c: &mut Criterion) {
    let mut group = c.benchmark_group("tree_index_of");
    group.bench_function("index_of_last_of_1000_siblings", |b| {
        b.iter_batched(
            || {
                let mut tree = CRDTTree::new(t(0), "r");
                let root = tree.root_id();
                let mut last = root;
                for i in 0..1_000u64 {
                    let ticket = t(i + 1);
                    last = tree
                        .insert(CRDTTreePos::new(root, last), TreeNodeValue::Element { tag: "p".into() }, ticket, ticket)
                        .unwrap();
                }
                (tree, last)
            },
            |(tree, last)| {
                tree.index_of(last).unwrap();
            },
            BatchSize::SmallInput,
        );
    });
    group.finish();
}

criterion_group!(
    core,
    bench_array_insert_chain,
    bench_array_remove_by_index,
    bench_tree_insert_chain,
    bench_tree_index_of
);
criterion_main!(core);
