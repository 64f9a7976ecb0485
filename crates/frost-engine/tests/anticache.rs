//! End-to-end eviction and uneviction scenarios.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use frost_engine::{
    merge_unevicted, parse_block_header, read_block, EvictionManager, FaultTracker,
    MemoryBlockStore,
};
use frost_error::{FrostError, Result};
use frost_store::{BlockStore, IndexSpec, Table, TableOptions, TableRegistry};
use frost_types::tuple::{decode_tuple, tuple_wire_len};
use frost_types::{
    BlockId, ClockWidth, Column, ColumnType, EvictionPolicy, MergeStrategy, Schema, TupleAddr,
    Value,
};

/// Block store wrapper that counts reads; the idempotence scenario asserts
/// the underlying store is touched at most once per block and retry.
struct CountingStore {
    inner: MemoryBlockStore,
    reads: AtomicUsize,
}

impl CountingStore {
    fn new() -> Self {
        Self {
            inner: MemoryBlockStore::new(),
            reads: AtomicUsize::new(0),
        }
    }

    fn read_count(&self) -> usize {
        self.reads.load(Ordering::Relaxed)
    }
}

impl BlockStore for CountingStore {
    fn next_block_id(&self) -> Result<BlockId> {
        self.inner.next_block_id()
    }

    fn write(&self, table: &str, block_id: BlockId, tuple_count: i32, bytes: &[u8]) -> Result<()> {
        self.inner.write(table, block_id, tuple_count, bytes)
    }

    fn flush(&self) -> Result<()> {
        self.inner.flush()
    }

    fn read(&self, table: &str, block_id: BlockId) -> Result<Vec<u8>> {
        self.reads.fetch_add(1, Ordering::Relaxed);
        self.inner.read(table, block_id)
    }
}

fn items_table(policy: EvictionPolicy, store: Arc<dyn BlockStore>) -> Table {
    let mut table = Table::new(
        "items",
        1,
        Schema::new(vec![
            Column::new("id", ColumnType::Integer),
            Column::new("payload", ColumnType::Text),
        ]),
        4096,
        vec![IndexSpec::unique("items_pk", 0)],
        TableOptions {
            policy,
            lru_sample_rate: 1,
            rng_seed: Some(0xC01D),
            ..TableOptions::default()
        },
    )
    .unwrap();
    table.set_block_store(store);
    table
}

/// A row of roughly 100 serialized bytes: 4 length prefix + 9 integer +
/// 1 tag + 4 length + 87 text bytes.
fn wide_row(id: i64) -> Vec<Value> {
    vec![Value::Integer(id), Value::Text(format!("{id:087}"))]
}

fn stub_of(table: &Table, key: i64) -> frost_types::StubId {
    match table.lookup_pk(&Value::Integer(key)) {
        Some(TupleAddr::Stub(stub)) => stub,
        other => panic!("key {key} expected to be a stub, got {other:?}"),
    }
}

// ----------------------------------------------------------------------
// S1: single-table LRU eviction
// ----------------------------------------------------------------------

#[test]
fn s1_lru_single_evicts_oldest_first() {
    let store = Arc::new(MemoryBlockStore::new());
    let mut table = items_table(EvictionPolicy::LruSingle, store.clone());
    for id in 0..1000 {
        table.insert(wide_row(id)).unwrap();
    }
    // touch a hot band; sample rate 1 makes every touch a real move
    for id in 500..510 {
        let TupleAddr::Live(slot) = table.lookup_pk(&Value::Integer(id)).unwrap() else {
            panic!("row {id} should be live");
        };
        table.touch(slot).unwrap();
    }

    let manager = EvictionManager::new();
    let result = manager.evict_block(&mut table, 16_384, 1).unwrap();

    let row = &result.rows[0];
    assert_eq!(row.table_name, "items");
    assert_eq!(row.blocks_evicted, 1);
    let evicted = row.tuples_evicted;
    assert!(evicted > 100, "a 16 KiB block holds >100 of these rows");
    assert!(row.bytes_evicted >= 100 * i64::from(evicted));

    // eviction took the oldest prefix, skipping nothing: ids 0..N-1
    for id in 0..i64::from(evicted) {
        assert!(
            table.lookup_pk(&Value::Integer(id)).unwrap().is_stub(),
            "row {id} should have been evicted"
        );
    }
    assert!(matches!(
        table.lookup_pk(&Value::Integer(i64::from(evicted))),
        Some(TupleAddr::Live(_))
    ));
    // the touched band was moved to the hot tail and survived
    for id in 500..510 {
        assert!(matches!(
            table.lookup_pk(&Value::Integer(id)),
            Some(TupleAddr::Live(_))
        ));
    }
    assert_eq!(store.flushed_blocks(), 1);
}

// ----------------------------------------------------------------------
// S2: clock policy, w = 2
// ----------------------------------------------------------------------

#[test]
fn s2_clock_evicts_first_zero_counter_and_advances_cursor() {
    let store = Arc::new(MemoryBlockStore::new());
    let mut table = Table::new(
        "items",
        1,
        Schema::new(vec![Column::new("id", ColumnType::Integer)]),
        128,
        vec![IndexSpec::unique("items_pk", 0)],
        TableOptions {
            policy: EvictionPolicy::Clock(ClockWidth::W2),
            max_evicted_tuple_size: 64,
            ..TableOptions::default()
        },
    )
    .unwrap();
    table.set_block_store(store);

    let mut slots = Vec::new();
    for id in 0..64 {
        slots.push(table.insert(vec![Value::Integer(id)]).unwrap());
    }
    // access row i exactly i mod 4 times
    for (i, &slot) in slots.iter().enumerate() {
        for _ in 0..(i % 4) {
            table.touch(slot).unwrap();
        }
    }
    assert_eq!(table.clock_position(), Some(1));

    // a block sized to admit exactly one tuple
    let manager = EvictionManager::new();
    let result = manager.evict_block(&mut table, 90, 1).unwrap();
    assert_eq!(result.rows[0].tuples_evicted, 1);

    // row 0 has counter 0 and the lowest index: it goes first, and the
    // cursor lands one past it
    assert!(table.lookup_pk(&Value::Integer(0)).unwrap().is_stub());
    assert!(matches!(
        table.lookup_pk(&Value::Integer(1)),
        Some(TupleAddr::Live(_))
    ));
    assert_eq!(table.clock_position(), Some(2));
}

// ----------------------------------------------------------------------
// S3: parent/child co-eviction
// ----------------------------------------------------------------------

fn family(store: Arc<dyn BlockStore>) -> (Table, Table) {
    let mut parent = Table::new(
        "parents",
        1,
        Schema::new(vec![
            Column::new("id", ColumnType::Integer),
            Column::new("name", ColumnType::Text),
        ]),
        64,
        vec![IndexSpec::unique("parents_pk", 0)],
        TableOptions {
            batch_evicted: true,
            max_evicted_tuple_size: 500,
            ..TableOptions::default()
        },
    )
    .unwrap();
    parent.set_block_store(store.clone());

    let mut child = Table::new(
        "children",
        2,
        Schema::new(vec![
            Column::new("id", ColumnType::Integer),
            Column::new("parent_id", ColumnType::Integer),
        ]),
        256,
        vec![
            IndexSpec::unique("children_pk", 0),
            IndexSpec::non_unique("children_fk", 1),
        ],
        TableOptions {
            batch_evicted: true,
            max_evicted_tuple_size: 500,
            ..TableOptions::default()
        },
    )
    .unwrap();
    child.set_block_store(store);
    (parent, child)
}

#[test]
fn s3_children_colocate_with_parents() {
    let store = Arc::new(MemoryBlockStore::new());
    let (mut parent, mut child) = family(store.clone());
    for p in 0..10 {
        parent
            .insert(vec![Value::Integer(p), Value::Text(format!("parent-{p}"))])
            .unwrap();
        for c in 0..3 {
            child
                .insert(vec![Value::Integer(p * 100 + c), Value::Integer(p)])
                .unwrap();
        }
    }

    let manager = EvictionManager::new();
    let result = manager
        .evict_block_in_batch(&mut parent, &mut child, "children_fk", 8192, 1)
        .unwrap();

    assert_eq!(result.rows.len(), 2);
    let parents_evicted = result.rows[0].tuples_evicted;
    let children_evicted = result.rows[1].tuples_evicted;
    // admission (parent bytes + ceiling + child budget at the ceiling) stops
    // well before all ten parents fit an 8 KiB block
    assert!(parents_evicted >= 1);
    assert!(parents_evicted < 10);
    assert_eq!(children_evicted, parents_evicted * 3);
    assert_eq!(result.rows[0].blocks_evicted, 1);

    // the block carries both sections, parents first
    let bytes = store.read("parents", BlockId::FIRST).unwrap();
    let header = parse_block_header(&bytes).unwrap();
    assert_eq!(header.sections[0].table, "parents");
    assert_eq!(header.sections[0].tuple_count, parents_evicted);
    assert_eq!(header.sections[1].table, "children");
    assert_eq!(header.sections[1].tuple_count, children_evicted);

    // evicted parents took their whole families along; survivors kept theirs
    for p in 0..i64::from(parents_evicted) {
        assert!(parent.lookup_pk(&Value::Integer(p)).unwrap().is_stub());
        for c in 0..3 {
            assert!(child
                .lookup_pk(&Value::Integer(p * 100 + c))
                .unwrap()
                .is_stub());
        }
    }
    for p in i64::from(parents_evicted)..10 {
        assert!(matches!(
            parent.lookup_pk(&Value::Integer(p)),
            Some(TupleAddr::Live(_))
        ));
        for c in 0..3 {
            assert!(matches!(
                child.lookup_pk(&Value::Integer(p * 100 + c)),
                Some(TupleAddr::Live(_))
            ));
        }
    }
}

// ----------------------------------------------------------------------
// S4: access fault and tuple-merge retry
// ----------------------------------------------------------------------

#[test]
fn s4_fault_then_tuple_merge_restores_only_the_faulting_row() {
    let store = Arc::new(MemoryBlockStore::new());
    let mut registry = TableRegistry::new();
    registry.insert(items_table(EvictionPolicy::LruSingle, store));

    let table = registry.get_mut("items").unwrap();
    for id in 0..100 {
        table.insert(wide_row(id)).unwrap();
    }
    let manager = EvictionManager::new();
    let result = manager.evict_block(&mut *table, 16_384, 1).unwrap();
    assert_eq!(result.rows[0].tuples_evicted, 100);
    table.set_merge_strategy(MergeStrategy::Tuple);

    // a read of primary key 3 lands on a stub
    let stub = stub_of(table, 3);
    let mut faults = FaultTracker::new();
    faults.record_evicted_access(table, stub).unwrap();
    let err = faults.raise();
    let fault = err.access_fault().expect("typed access fault").clone();
    assert_eq!(fault.table_relative_index, 1);
    assert_eq!(fault.block_ids, vec![BlockId::FIRST]);
    assert_eq!(fault.tuple_offsets, vec![3]);

    // retry protocol: read the faulted blocks, merge, reschedule
    for (block_id, offset) in fault.block_ids.iter().zip(&fault.tuple_offsets) {
        read_block(table, *block_id, *offset).unwrap();
    }
    merge_unevicted(&mut registry, "items").unwrap();

    let table = registry.get("items").unwrap();
    assert_eq!(table.live_count(), 1);
    assert_eq!(table.stats().tuples_evicted, 99);
    let TupleAddr::Live(slot) = table.lookup_pk(&Value::Integer(3)).unwrap() else {
        panic!("row 3 should be live after the merge");
    };
    assert_eq!(table.values(slot).unwrap(), wide_row(3).as_slice());
    // the faulting tuple re-registered hot
    assert_eq!(table.chain_newest(), Some(slot));
    assert_eq!(table.chain_len(), 1);
}

// ----------------------------------------------------------------------
// S5: idempotent block reads within one retry
// ----------------------------------------------------------------------

#[test]
fn s5_duplicate_fault_reads_touch_the_store_once() {
    let counting = Arc::new(CountingStore::new());
    let mut registry = TableRegistry::new();
    registry.insert(items_table(
        EvictionPolicy::LruSingle,
        counting.clone() as Arc<dyn BlockStore>,
    ));

    let table = registry.get_mut("items").unwrap();
    for id in 0..50 {
        table.insert(wide_row(id)).unwrap();
    }
    EvictionManager::new()
        .evict_block(&mut *table, 16_384, 1)
        .unwrap();

    // two stub hits in the same block
    let stub_a = stub_of(table, 5);
    let stub_b = stub_of(table, 7);
    let mut faults = FaultTracker::new();
    faults.record_evicted_access(table, stub_a).unwrap();
    faults.record_evicted_access(table, stub_b).unwrap();
    let err = faults.raise();
    let fault = err.access_fault().unwrap().clone();
    assert_eq!(fault.num_blocks(), 2);

    for (block_id, offset) in fault.block_ids.iter().zip(&fault.tuple_offsets) {
        read_block(table, *block_id, *offset).unwrap();
    }
    assert_eq!(counting.read_count(), 1);
    assert_eq!(table.pending_block_count(), 1);

    merge_unevicted(&mut registry, "items").unwrap();
    let table = registry.get("items").unwrap();
    // block-merge restored every tuple exactly once
    assert_eq!(table.live_count(), 50);
    assert_eq!(table.stub_count(), 0);
    assert_eq!(table.stats().tuples_evicted, 0);
}

// ----------------------------------------------------------------------
// Round-trip and stub equivalence
// ----------------------------------------------------------------------

#[test]
fn eviction_uneviction_round_trip_preserves_logical_identity() {
    for policy in [
        EvictionPolicy::LruSingle,
        EvictionPolicy::LruDouble,
        EvictionPolicy::Timestamp,
        EvictionPolicy::Clock(ClockWidth::W4),
    ] {
        let store = Arc::new(MemoryBlockStore::new());
        let mut registry = TableRegistry::new();
        registry.insert(items_table(policy, store));

        let table = registry.get_mut("items").unwrap();
        for id in 0..40 {
            table.insert(wide_row(id)).unwrap();
        }
        for id in [3, 9, 27] {
            let TupleAddr::Live(slot) = table.lookup_pk(&Value::Integer(id)).unwrap() else {
                panic!("row {id} should be live");
            };
            table.touch(slot).unwrap();
        }

        EvictionManager::new()
            .evict_block(&mut *table, 65_536, 1)
            .unwrap();
        assert_eq!(table.live_count(), 0, "policy {policy:?}");

        let stub = stub_of(table, 0);
        let block_id = table.stub_get(stub).unwrap().block_id;
        read_block(table, block_id, 0).unwrap();
        merge_unevicted(&mut registry, "items").unwrap();

        let table = registry.get("items").unwrap();
        assert_eq!(table.live_count(), 40, "policy {policy:?}");
        for id in 0..40 {
            let TupleAddr::Live(slot) = table.lookup_pk(&Value::Integer(id)).unwrap() else {
                panic!("row {id} should be live after merge (policy {policy:?})");
            };
            assert_eq!(table.values(slot).unwrap(), wide_row(id).as_slice());
        }
    }
}

#[test]
fn stub_decodes_to_the_tuples_position_in_its_block() {
    let store = Arc::new(MemoryBlockStore::new());
    let mut table = items_table(EvictionPolicy::LruSingle, store.clone());
    for id in 0..20 {
        table.insert(wide_row(id)).unwrap();
    }
    EvictionManager::new()
        .evict_block(&mut table, 16_384, 1)
        .unwrap();

    for id in [0_i64, 7, 19] {
        let stub = stub_of(&table, id);
        let row = table.stub_get(stub).unwrap();
        let bytes = store.read("items", row.block_id).unwrap();
        let header = parse_block_header(&bytes).unwrap();
        assert_eq!(header.sections[0].tuple_count, 20);

        // walk the body to the stub's offset and decode
        let mut cursor = header.header_len;
        for _ in 0..row.offset_in_block {
            cursor += tuple_wire_len(&bytes[cursor..]).unwrap();
        }
        let (values, _) = decode_tuple(&bytes[cursor..]).unwrap();
        assert_eq!(values, wide_row(id));
    }
}

// ----------------------------------------------------------------------
// Co-evicted blocks merge into both live tables
// ----------------------------------------------------------------------

#[test]
fn co_evicted_block_merges_into_both_tables() {
    let store = Arc::new(MemoryBlockStore::new());
    let (mut parent, mut child) = family(store.clone());
    for p in 0..4 {
        parent
            .insert(vec![Value::Integer(p), Value::Text(format!("parent-{p}"))])
            .unwrap();
        for c in 0..3 {
            child
                .insert(vec![Value::Integer(p * 100 + c), Value::Integer(p)])
                .unwrap();
        }
    }
    let result = EvictionManager::new()
        .evict_block_in_batch(&mut parent, &mut child, "children_fk", 8192, 1)
        .unwrap();
    let parents_evicted = result.rows[0].tuples_evicted;
    assert_eq!(parents_evicted, 4);

    let mut registry = TableRegistry::new();
    registry.insert(parent);
    registry.insert(child);

    // fault on an evicted parent; its children ride back in the same block
    let parent_ref = registry.get_mut("parents").unwrap();
    let stub = stub_of(parent_ref, 0);
    let block_id = parent_ref.stub_get(stub).unwrap().block_id;
    read_block(parent_ref, block_id, 0).unwrap();
    merge_unevicted(&mut registry, "parents").unwrap();

    let parent_ref = registry.get("parents").unwrap();
    let child_ref = registry.get("children").unwrap();
    assert_eq!(parent_ref.live_count(), 4);
    assert_eq!(child_ref.live_count(), 12);
    assert_eq!(parent_ref.stub_count(), 0);
    assert_eq!(child_ref.stub_count(), 0);
    for p in 0..4 {
        assert!(matches!(
            parent_ref.lookup_pk(&Value::Integer(p)),
            Some(TupleAddr::Live(_))
        ));
    }
    // foreign-key index answers again with live addresses
    let fam = child_ref.index("children_fk").unwrap().get(&Value::Integer(2));
    assert_eq!(fam.len(), 3);
    assert!(fam.iter().all(|addr| !addr.is_stub()));
}

// ----------------------------------------------------------------------
// Error dispositions
// ----------------------------------------------------------------------

#[test]
fn unknown_block_read_propagates() {
    let store = Arc::new(MemoryBlockStore::new());
    let mut table = items_table(EvictionPolicy::LruSingle, store);
    let err = read_block(&mut table, BlockId::new(11), 0).unwrap_err();
    assert!(matches!(err, FrostError::UnknownBlock { .. }));
}
