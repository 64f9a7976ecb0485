//! frost — an anti-caching eviction engine for in-memory relational tables.
//!
//! Cold tuples are tracked per table (LRU chain, timestamps, or a clock),
//! packaged into opaque on-disk blocks, and replaced in memory by stubs that
//! keep every index reachable. A transaction that touches a stub raises a
//! typed access fault; the faulted blocks are read back and merged, and the
//! transaction retries.
//!
//! This crate is the facade: it re-exports the public surface of the member
//! crates.
//!
//! ```
//! use std::sync::Arc;
//!
//! use frost::{
//!     Column, ColumnType, EvictionManager, EvictionPolicy, IndexSpec, MemoryBlockStore, Schema,
//!     Table, TableOptions, Value,
//! };
//!
//! let store = Arc::new(MemoryBlockStore::new());
//! let mut table = Table::new(
//!     "orders",
//!     1,
//!     Schema::new(vec![
//!         Column::new("id", ColumnType::Integer),
//!         Column::new("note", ColumnType::Text),
//!     ]),
//!     1024,
//!     vec![IndexSpec::unique("orders_pk", 0)],
//!     TableOptions {
//!         policy: EvictionPolicy::LruDouble,
//!         lru_sample_rate: 1,
//!         rng_seed: Some(42),
//!         ..TableOptions::default()
//!     },
//! )
//! .unwrap();
//! table.set_block_store(store);
//!
//! for id in 0..100 {
//!     table
//!         .insert(vec![Value::Integer(id), Value::Text(format!("order {id}"))])
//!         .unwrap();
//! }
//!
//! let result = EvictionManager::new()
//!     .evict_block(&mut table, 16_384, 1)
//!     .unwrap();
//! assert_eq!(result.rows[0].tuples_evicted, 100);
//! ```

pub use frost_error::{FrostError, Result};
pub use frost_types::{
    BlockId, ClockWidth, Column, ColumnType, EvictedAccessFault, EvictionPolicy, MergeStrategy,
    Schema, SlotId, StubId, TupleAddr, Value, DEFAULT_LRU_SAMPLE_RATE,
    DEFAULT_MAX_EVICTED_TUPLE_SIZE,
};

pub use frost_store::{
    BlockStore, EvictionIterator, Index, IndexSpec, StubRow, StubTable, Table, TableOptions,
    TableRegistry, TableStats,
};

pub use frost_engine::{
    merge_unevicted, parse_block_header, read_block, BlockBuilder, BlockHeader, BlockSection,
    EvictionManager, EvictionResult, EvictionResultRow, FaultTracker, FileBlockStore,
    MemoryBlockStore, RESULT_COLUMNS,
};
