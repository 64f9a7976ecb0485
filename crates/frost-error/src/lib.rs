//! Primary error type for the frost anti-caching engine.
//!
//! Structured variants for the conditions the engine can hit, plus the typed
//! access fault a transaction receives when it dereferences a stub. Warnings
//! (an eviction pass that found nothing, a duplicate block read within one
//! retry) are logged, not raised.

use frost_types::{BlockId, EvictedAccessFault, SchemaMismatch, SlotId};
use thiserror::Error;

/// Errors raised by the frost storage and eviction layers.
#[derive(Error, Debug)]
pub enum FrostError {
    /// Eviction was requested on a table that has no stub table attached.
    ///
    /// Fatal: the caller asked to evict a non-evictable table.
    #[error("table '{table}' has no stub table and cannot be evicted")]
    StubTableMissing { table: String },

    /// Parent/child co-eviction requires the child to be flagged
    /// batch-evicted by the caller; the flag is never inferred.
    #[error("table '{table}' must be flagged batch-evicted for co-eviction")]
    NotBatchEvicted { table: String },

    /// The block store has no block under this id.
    #[error("unknown block {block_id} for table '{table}'")]
    UnknownBlock { table: String, block_id: BlockId },

    /// A single tuple exceeded the per-tuple eviction ceiling.
    #[error("tuple of {size} bytes exceeds the evicted-tuple ceiling of {max}")]
    TupleTooLarge { size: usize, max: usize },

    /// A tuple was appended past the block's byte capacity.
    #[error("block {block_id} overflow: {size} of {capacity} bytes used")]
    BlockOverflow {
        block_id: BlockId,
        size: usize,
        capacity: usize,
    },

    /// Typed lookup failed: no live table under this name participates in
    /// anti-caching.
    #[error("no such anti-cache table: {name}")]
    NoSuchTable { name: String },

    /// The named index does not exist on the table.
    #[error("no such index '{index}' on table '{table}'")]
    NoSuchIndex { table: String, index: String },

    /// Unique index rejected a duplicate key.
    #[error("duplicate key in index '{index}'")]
    DuplicateKey { index: String },

    /// The table's slot arena is at capacity.
    #[error("table '{table}' is full ({capacity} slots)")]
    TableFull { table: String, capacity: u32 },

    /// The addressed slot holds no live tuple.
    #[error("slot {slot} is vacant")]
    SlotVacant { slot: SlotId },

    /// The monotonic 16-bit block id space is exhausted.
    #[error("block id space exhausted")]
    BlockIdsExhausted,

    /// A block read back from the store failed to parse.
    #[error("corrupt evicted block: {detail}")]
    CorruptBlock { detail: String },

    /// A row does not match its table's schema.
    #[error("schema mismatch: {0}")]
    Schema(#[from] SchemaMismatch),

    /// A transaction dereferenced one or more stubs; the executor must roll
    /// back, uneviction must run, and the transaction is retried.
    #[error("evicted tuple access: {0}")]
    AccessFault(EvictedAccessFault),

    /// Block store I/O failure.
    ///
    /// Fatal to the eviction call; evicted tuple storage has already been
    /// freed, so the partition must treat this as data loss.
    #[error("block store I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Internal invariant violation (should never happen).
    #[error("internal error: {0}")]
    Internal(String),
}

impl FrostError {
    /// Create an internal error.
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Create a corrupt-block error.
    pub fn corrupt(detail: impl Into<String>) -> Self {
        Self::CorruptBlock {
            detail: detail.into(),
        }
    }

    /// True for the access-fault signal, which is a scheduling event rather
    /// than a failure: the transaction retries once uneviction completes.
    #[must_use]
    pub const fn is_access_fault(&self) -> bool {
        matches!(self, Self::AccessFault(_))
    }

    /// Borrow the fault payload, if this is one.
    #[must_use]
    pub const fn access_fault(&self) -> Option<&EvictedAccessFault> {
        match self {
            Self::AccessFault(fault) => Some(fault),
            _ => None,
        }
    }
}

/// Result type alias using [`FrostError`].
pub type Result<T> = std::result::Result<T, FrostError>;
