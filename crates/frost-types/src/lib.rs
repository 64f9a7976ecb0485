//! Core identifiers and data types shared across the frost anti-caching
//! engine.
//!
//! The engine moves cold tuples out of memory into opaque on-disk blocks and
//! leaves lightweight stubs behind. The types here are the vocabulary for
//! that traffic: slot ids inside a table's arena, block ids handed out by the
//! block store, stub ids inside the evicted-tuple table, and the typed
//! payload of an access fault.

pub mod schema;
pub mod tuple;
pub mod value;

pub use schema::{Column, ColumnType, Schema, SchemaMismatch};
pub use value::Value;

use std::fmt;
use std::num::NonZeroU32;

/// Hard ceiling on the serialized size of any single evicted tuple, in bytes.
///
/// Block admission reserves this much headroom so a tuple can never straddle
/// the end of a block. Tables may lower it via
/// `TableOptions::max_evicted_tuple_size`.
pub const DEFAULT_MAX_EVICTED_TUPLE_SIZE: usize = 2500;

/// Default denominator for LRU update sampling: one in this many accesses
/// performs a real move-to-tail.
pub const DEFAULT_LRU_SAMPLE_RATE: u32 = 100;

/// A tuple slot id inside a table's storage arena.
///
/// Slot ids are 1-based and dense; the value 0 is reserved as the on-wire
/// chain sentinel, which in Rust surfaces as `Option<SlotId>` instead.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
#[repr(transparent)]
pub struct SlotId(NonZeroU32);

impl SlotId {
    /// Create a slot id from a raw 1-based value.
    ///
    /// Returns `None` for 0, the chain sentinel.
    #[inline]
    #[must_use]
    pub const fn new(raw: u32) -> Option<Self> {
        match NonZeroU32::new(raw) {
            Some(v) => Some(Self(v)),
            None => None,
        }
    }

    /// Raw 1-based value.
    #[inline]
    #[must_use]
    pub const fn get(self) -> u32 {
        self.0.get()
    }

    /// Zero-based index into the backing arena.
    #[inline]
    #[must_use]
    pub const fn index(self) -> usize {
        self.0.get() as usize - 1
    }

    /// Encode an optional slot id as the raw chain field (0 = none).
    #[inline]
    #[must_use]
    pub fn to_raw(slot: Option<Self>) -> u32 {
        slot.map_or(0, Self::get)
    }

    /// Decode the raw chain field (0 = none).
    #[inline]
    #[must_use]
    pub const fn from_raw(raw: u32) -> Option<Self> {
        Self::new(raw)
    }
}

impl fmt::Display for SlotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of one on-disk block, allocated monotonically by the block
/// store starting at 0.
///
/// The width is 16 bits because the stub row stores it in an `int16` column;
/// running out of ids is a hard error rather than a wraparound.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
#[repr(transparent)]
pub struct BlockId(i16);

impl BlockId {
    /// First id the store hands out.
    pub const FIRST: Self = Self(0);

    #[inline]
    #[must_use]
    pub const fn new(raw: i16) -> Self {
        Self(raw)
    }

    #[inline]
    #[must_use]
    pub const fn get(self) -> i16 {
        self.0
    }

    /// The id following this one, or `None` at the 16-bit limit.
    #[inline]
    #[must_use]
    pub const fn next(self) -> Option<Self> {
        match self.0.checked_add(1) {
            Some(v) => Some(Self(v)),
            None => None,
        }
    }
}

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of a stub row inside a table's stub storage.
///
/// Stable from insertion until deletion; freed ids may be reused afterwards.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
#[repr(transparent)]
pub struct StubId(u32);

impl StubId {
    #[inline]
    #[must_use]
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    #[inline]
    #[must_use]
    pub const fn get(self) -> u32 {
        self.0
    }
}

impl fmt::Display for StubId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Where an index entry points: at a live tuple slot or at a stub standing in
/// for an evicted tuple.
///
/// Eviction swaps `Live` for `Stub` in every index of the owning table;
/// uneviction swaps it back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TupleAddr {
    Live(SlotId),
    Stub(StubId),
}

impl TupleAddr {
    /// True iff this entry points at a stub.
    #[inline]
    #[must_use]
    pub const fn is_stub(self) -> bool {
        matches!(self, Self::Stub(_))
    }
}

/// Counter width for the clock policy, in bits per tuple.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum ClockWidth {
    W2,
    W4,
    W8,
}

impl ClockWidth {
    /// Bits per counter.
    #[inline]
    #[must_use]
    pub const fn bits(self) -> u32 {
        match self {
            Self::W2 => 2,
            Self::W4 => 4,
            Self::W8 => 8,
        }
    }

    /// Saturation value `2^w - 1`.
    #[inline]
    #[must_use]
    pub const fn max_count(self) -> u64 {
        (1u64 << self.bits()) - 1
    }

    /// Counters packed into one 64-bit word.
    #[inline]
    #[must_use]
    pub const fn counters_per_word(self) -> u32 {
        64 / self.bits()
    }
}

/// Recency policy of a table's tracker.
///
/// The three policies share nothing but their external contract; the
/// discriminant is fixed at table creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum EvictionPolicy {
    /// Singly linked LRU chain: one link slot per tuple, O(n) remove.
    LruSingle,
    /// Doubly linked LRU chain: two link slots per tuple, O(1) remove.
    LruDouble,
    /// Per-tuple access timestamps; coldest = smallest.
    Timestamp,
    /// Clock (second chance) with saturating w-bit counters.
    Clock(ClockWidth),
}

impl EvictionPolicy {
    /// True for either LRU chain flavour.
    #[inline]
    #[must_use]
    pub const fn is_lru(self) -> bool {
        matches!(self, Self::LruSingle | Self::LruDouble)
    }
}

/// Uneviction granularity when a faulted block is merged back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum MergeStrategy {
    /// Re-insert every tuple in the block.
    Block,
    /// Re-insert only the faulting tuple; the block stays on disk.
    Tuple,
}

/// Payload of the access-fault signal raised when a transaction touched one
/// or more stubs.
///
/// The executor rolls the transaction back, hands this to the coordinator,
/// and reschedules after the listed blocks have been read and merged.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct EvictedAccessFault {
    /// Catalog-relative index of the first table that faulted.
    pub table_relative_index: i32,
    /// One entry per recorded stub access.
    pub block_ids: Vec<BlockId>,
    /// Tuple offset within its table's block section, parallel to
    /// `block_ids`.
    pub tuple_offsets: Vec<i32>,
}

impl EvictedAccessFault {
    /// Number of recorded block accesses (duplicates included).
    #[inline]
    #[must_use]
    pub fn num_blocks(&self) -> usize {
        self.block_ids.len()
    }
}

impl fmt::Display for EvictedAccessFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "table {} touched {} evicted block(s)",
            self.table_relative_index,
            self.num_blocks()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slot_id_is_one_based() {
        assert!(SlotId::new(0).is_none());
        let s = SlotId::new(1).unwrap();
        assert_eq!(s.get(), 1);
        assert_eq!(s.index(), 0);
    }

    #[test]
    fn slot_id_raw_roundtrip() {
        assert_eq!(SlotId::to_raw(None), 0);
        assert_eq!(SlotId::from_raw(0), None);
        let s = SlotId::new(7).unwrap();
        assert_eq!(SlotId::to_raw(Some(s)), 7);
        assert_eq!(SlotId::from_raw(7), Some(s));
    }

    #[test]
    fn block_id_exhausts_at_i16_max() {
        assert_eq!(BlockId::FIRST.next(), Some(BlockId::new(1)));
        assert_eq!(BlockId::new(i16::MAX).next(), None);
    }

    #[test]
    fn clock_width_packing() {
        assert_eq!(ClockWidth::W2.max_count(), 3);
        assert_eq!(ClockWidth::W4.max_count(), 15);
        assert_eq!(ClockWidth::W8.max_count(), 255);
        assert_eq!(ClockWidth::W2.counters_per_word(), 32);
        assert_eq!(ClockWidth::W8.counters_per_word(), 8);
    }

    #[test]
    fn fault_display() {
        let fault = EvictedAccessFault {
            table_relative_index: 3,
            block_ids: vec![BlockId::new(0), BlockId::new(0)],
            tuple_offsets: vec![5, 9],
        };
        assert_eq!(fault.num_blocks(), 2);
        assert_eq!(fault.to_string(), "table 3 touched 2 evicted block(s)");
    }
}
