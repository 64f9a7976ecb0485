//! The frost anti-caching engine: block assembly, eviction orchestration,
//! fault tracking, and uneviction.
//!
//! The storage side (tables, stubs, trackers, the coldest-first iterator)
//! lives in `frost-store`; this crate drives it. Eviction packages cold
//! tuples into opaque blocks, hands them to the block store, and leaves
//! stubs behind; a transaction that later touches a stub collects an access
//! fault, the faulted blocks are read back, and their tuples merge into the
//! live tables.

pub mod block;
pub mod fault;
pub mod manager;
pub mod store;
pub mod unevict;

pub use block::{parse_block_header, BlockBuilder, BlockHeader, BlockSection};
pub use fault::FaultTracker;
pub use manager::{EvictionManager, EvictionResult, EvictionResultRow, RESULT_COLUMNS};
pub use store::{FileBlockStore, MemoryBlockStore};
pub use unevict::{merge_unevicted, read_block};
