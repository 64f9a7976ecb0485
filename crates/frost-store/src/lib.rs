//! Live-table storage for the frost anti-caching engine.
//!
//! A [`table::Table`] owns a fixed-capacity slot arena, its indexes, a
//! [`stub::StubTable`] holding one stub row per evicted tuple, per-table
//! statistics, and the recency state of the active eviction policy. The
//! policy-specific tracker lives in this crate because its state is embedded
//! in tuple and table storage; the block pipeline that consumes it lives in
//! `frost-engine`.

pub mod index;
pub mod iterator;
pub mod registry;
pub mod stats;
pub mod stub;
pub mod table;
pub(crate) mod tracker;
pub mod traits;

pub use index::{Index, IndexSpec};
pub use iterator::EvictionIterator;
pub use registry::TableRegistry;
pub use stats::TableStats;
pub use stub::{StubRow, StubTable};
pub use table::{Table, TableOptions};
pub use traits::BlockStore;
