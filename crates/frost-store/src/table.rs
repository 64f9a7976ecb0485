//! The live table: a fixed-capacity slot arena with indexes, stub storage,
//! and embedded recency-tracking state.
//!
//! Tuple link ids and timestamps live inside [`LiveTuple`] (the original
//! design kept them in spare tuple-header bits; here they are typed fields of
//! the slot record). Clock counters live table-side in a packed bit array.

use std::collections::HashSet;
use std::sync::Arc;

use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::warn;

use frost_error::{FrostError, Result};
use frost_types::{
    BlockId, ClockWidth, EvictionPolicy, MergeStrategy, Schema, SlotId, StubId, TupleAddr, Value,
    DEFAULT_LRU_SAMPLE_RATE, DEFAULT_MAX_EVICTED_TUPLE_SIZE,
};

use crate::index::{Index, IndexSpec};
use crate::stats::TableStats;
use crate::stub::{StubRow, StubTable};
use crate::tracker;
use crate::traits::BlockStore;

/// Per-table anti-caching options, fixed at table creation (except the merge
/// strategy, which the operator may flip between retries).
#[derive(Debug, Clone)]
pub struct TableOptions {
    /// Recency policy of the tracker.
    pub policy: EvictionPolicy,
    /// Uneviction granularity.
    pub merge_strategy: MergeStrategy,
    /// Denominator for LRU update sampling; clamped to at least 1.
    pub lru_sample_rate: u32,
    /// Admission ceiling on a single serialized tuple.
    pub max_evicted_tuple_size: usize,
    /// True for tables moved only by parent/child co-eviction; the tracker
    /// is inert and the eviction iterator degrades to a slot-order sweep.
    pub batch_evicted: bool,
    /// False disables anti-caching entirely: no stub table is attached and
    /// every tracker operation is a no-op.
    pub evictable: bool,
    /// Seed for the LRU sampling RNG; tests pin this for determinism.
    pub rng_seed: Option<u64>,
}

impl Default for TableOptions {
    fn default() -> Self {
        Self {
            policy: EvictionPolicy::LruSingle,
            merge_strategy: MergeStrategy::Block,
            lru_sample_rate: DEFAULT_LRU_SAMPLE_RATE,
            max_evicted_tuple_size: DEFAULT_MAX_EVICTED_TUPLE_SIZE,
            batch_evicted: false,
            evictable: true,
            rng_seed: None,
        }
    }
}

/// One occupied slot: the row plus the tracking fields embedded in it.
#[derive(Debug)]
pub(crate) struct LiveTuple {
    pub(crate) values: Vec<Value>,
    /// Next tuple toward the hot end of the LRU chain.
    pub(crate) next: Option<SlotId>,
    /// Previous tuple toward the cold end; maintained only under
    /// [`EvictionPolicy::LruDouble`].
    pub(crate) prev: Option<SlotId>,
    /// Access timestamp under [`EvictionPolicy::Timestamp`]; 0 is the cold
    /// sentinel.
    pub(crate) ts: u64,
}

impl LiveTuple {
    fn new(values: Vec<Value>) -> Self {
        Self {
            values,
            next: None,
            prev: None,
            ts: 0,
        }
    }
}

/// LRU chain endpoints.
#[derive(Debug, Default, Clone, Copy)]
pub(crate) struct ChainState {
    pub(crate) oldest: Option<SlotId>,
    pub(crate) newest: Option<SlotId>,
    pub(crate) count: u64,
}

/// Packed w-bit clock counters plus the sweep cursor.
#[derive(Debug)]
pub(crate) struct ClockState {
    width: ClockWidth,
    words: Vec<u64>,
    /// Raw 1-based slot id the next sweep visit starts at.
    pub(crate) position: u32,
}

impl ClockState {
    fn new(width: ClockWidth, capacity: u32) -> Self {
        let per_word = width.counters_per_word();
        let words = capacity.div_ceil(per_word) as usize;
        Self {
            width,
            words: vec![0; words],
            position: 1,
        }
    }

    #[inline]
    pub(crate) const fn width(&self) -> ClockWidth {
        self.width
    }

    pub(crate) fn get(&self, slot: SlotId) -> u64 {
        let (word, shift) = self.locate(slot);
        (self.words[word] >> shift) & self.width.max_count()
    }

    pub(crate) fn set(&mut self, slot: SlotId, value: u64) {
        let clamped = value.min(self.width.max_count());
        let (word, shift) = self.locate(slot);
        let mask = self.width.max_count() << shift;
        self.words[word] = (self.words[word] & !mask) | (clamped << shift);
    }

    fn locate(&self, slot: SlotId) -> (usize, u32) {
        let per_word = self.width.counters_per_word() as usize;
        let idx = slot.index();
        let word = idx / per_word;
        let shift = (idx % per_word) as u32 * self.width.bits();
        (word, shift)
    }
}

/// A live table participating in anti-caching.
pub struct Table {
    name: String,
    relative_index: i32,
    schema: Schema,
    capacity: u32,
    pk_column: usize,

    slots: Vec<Option<LiveTuple>>,
    free: Vec<SlotId>,
    live: u64,

    indexes: Vec<Index>,
    stubs: Option<StubTable>,
    store: Option<Arc<dyn BlockStore>>,
    options: TableOptions,

    pub(crate) chain: ChainState,
    pub(crate) access_counter: u64,
    pub(crate) clock: Option<ClockState>,
    pub(crate) rng: StdRng,

    pending_blocks: Vec<Vec<u8>>,
    pending_offsets: Vec<i32>,
    pending_seen: HashSet<BlockId>,

    stats: TableStats,
}

impl std::fmt::Debug for Table {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Table")
            .field("name", &self.name)
            .field("live", &self.live)
            .field("capacity", &self.capacity)
            .field("policy", &self.options.policy)
            .finish_non_exhaustive()
    }
}

impl Table {
    /// Create a table.
    ///
    /// `indexes[0]` must be a unique index; it is the primary key used to
    /// locate stubs during uneviction.
    pub fn new(
        name: impl Into<String>,
        relative_index: i32,
        schema: Schema,
        capacity: u32,
        index_specs: Vec<IndexSpec>,
        mut options: TableOptions,
    ) -> Result<Self> {
        let name = name.into();
        let first = index_specs
            .first()
            .ok_or_else(|| FrostError::internal(format!("table '{name}' needs a primary key")))?;
        if !first.unique {
            return Err(FrostError::internal(format!(
                "table '{name}' primary key index '{}' must be unique",
                first.name
            )));
        }
        for spec in &index_specs {
            if spec.column >= schema.len() {
                return Err(FrostError::internal(format!(
                    "index '{}' on '{name}' references column {} of {}",
                    spec.name,
                    spec.column,
                    schema.len()
                )));
            }
        }

        options.lru_sample_rate = options.lru_sample_rate.max(1);
        let pk_column = first.column;
        let clock = match options.policy {
            EvictionPolicy::Clock(width) => Some(ClockState::new(width, capacity)),
            _ => None,
        };
        let rng = match options.rng_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let stubs = options.evictable.then(StubTable::new);

        Ok(Self {
            name,
            relative_index,
            schema,
            capacity,
            pk_column,
            slots: Vec::new(),
            free: Vec::new(),
            live: 0,
            indexes: index_specs.into_iter().map(Index::new).collect(),
            stubs,
            store: None,
            options,
            chain: ChainState::default(),
            access_counter: 0,
            clock,
            rng,
            pending_blocks: Vec::new(),
            pending_offsets: Vec::new(),
            pending_seen: HashSet::new(),
            stats: TableStats::default(),
        })
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    #[must_use]
    pub const fn relative_index(&self) -> i32 {
        self.relative_index
    }

    #[inline]
    #[must_use]
    pub const fn schema(&self) -> &Schema {
        &self.schema
    }

    #[inline]
    #[must_use]
    pub const fn capacity(&self) -> u32 {
        self.capacity
    }

    #[inline]
    #[must_use]
    pub const fn options(&self) -> &TableOptions {
        &self.options
    }

    /// Flip the uneviction granularity between retries.
    pub fn set_merge_strategy(&mut self, strategy: MergeStrategy) {
        self.options.merge_strategy = strategy;
    }

    #[inline]
    #[must_use]
    pub const fn stats(&self) -> &TableStats {
        &self.stats
    }

    #[inline]
    pub fn stats_mut(&mut self) -> &mut TableStats {
        &mut self.stats
    }

    /// Number of live (non-evicted) tuples.
    #[inline]
    #[must_use]
    pub const fn live_count(&self) -> u64 {
        self.live
    }

    /// Highest raw slot id ever allocated; sweep bounds.
    #[inline]
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn high_water(&self) -> u32 {
        self.slots.len() as u32
    }

    /// Attach the block store handle this table evicts to.
    pub fn set_block_store(&mut self, store: Arc<dyn BlockStore>) {
        self.store = Some(store);
    }

    /// The block store handle, or an error if none was attached.
    pub fn block_store(&self) -> Result<Arc<dyn BlockStore>> {
        self.store
            .clone()
            .ok_or_else(|| FrostError::internal(format!("table '{}' has no block store", self.name)))
    }

    /// Whether the tracker maintains state for this table.
    #[inline]
    pub(crate) fn tracks(&self) -> bool {
        self.stubs.is_some() && !self.options.batch_evicted
    }

    // ------------------------------------------------------------------
    // Row operations
    // ------------------------------------------------------------------

    /// Insert a row; registers it with the tracker at the cold-eligible end.
    pub fn insert(&mut self, values: Vec<Value>) -> Result<SlotId> {
        self.schema.check(&values)?;
        for index in &self.indexes {
            if index.would_collide(&values[index.column()]) {
                return Err(FrostError::DuplicateKey {
                    index: index.name().to_owned(),
                });
            }
        }
        let slot = self.allocate(values)?;
        let keys: Vec<Value> = self
            .indexes
            .iter()
            .map(|ix| self.row(slot)[ix.column()].clone())
            .collect();
        for (index, key) in self.indexes.iter_mut().zip(keys) {
            index.insert(key, TupleAddr::Live(slot));
        }
        tracker::on_insert(self, slot);
        Ok(slot)
    }

    /// Update a row in place, re-keying any index whose column changed and
    /// refreshing the tracker (sampled under LRU).
    pub fn update(&mut self, slot: SlotId, values: Vec<Value>) -> Result<()> {
        self.schema.check(&values)?;
        let old = self
            .slot(slot)
            .map(|t| t.values.clone())
            .ok_or(FrostError::SlotVacant { slot })?;

        for index in &self.indexes {
            let old_key = &old[index.column()];
            let new_key = &values[index.column()];
            if old_key.key_cmp(new_key) != std::cmp::Ordering::Equal
                && index.would_collide(new_key)
            {
                return Err(FrostError::DuplicateKey {
                    index: index.name().to_owned(),
                });
            }
        }
        for index in &mut self.indexes {
            let old_key = &old[index.column()];
            let new_key = &values[index.column()];
            if old_key.key_cmp(new_key) != std::cmp::Ordering::Equal {
                index.remove(old_key, TupleAddr::Live(slot));
                index.insert(new_key.clone(), TupleAddr::Live(slot));
            }
        }
        if let Some(tuple) = self.slot_mut(slot) {
            tuple.values = values;
        }
        tracker::on_update(self, slot);
        Ok(())
    }

    /// Record a read access without changing the row.
    pub fn touch(&mut self, slot: SlotId) -> Result<()> {
        if self.slot(slot).is_none() {
            return Err(FrostError::SlotVacant { slot });
        }
        tracker::on_update(self, slot);
        Ok(())
    }

    /// Delete a row: tracker, indexes, then storage.
    pub fn delete(&mut self, slot: SlotId) -> Result<()> {
        if self.slot(slot).is_none() {
            return Err(FrostError::SlotVacant { slot });
        }
        tracker::on_remove(self, slot);
        let values = match self.slot(slot) {
            Some(t) => t.values.clone(),
            None => return Err(FrostError::SlotVacant { slot }),
        };
        for index in &mut self.indexes {
            index.remove(&values[index.column()], TupleAddr::Live(slot));
        }
        self.release(slot);
        Ok(())
    }

    /// The row at `slot`, if live.
    #[must_use]
    pub fn values(&self, slot: SlotId) -> Option<&[Value]> {
        self.slot(slot).map(|t| t.values.as_slice())
    }

    /// The primary-key value of a row.
    #[must_use]
    pub fn pk_value<'a>(&self, values: &'a [Value]) -> &'a Value {
        &values[self.pk_column]
    }

    /// Primary-key lookup.
    #[must_use]
    pub fn lookup_pk(&self, key: &Value) -> Option<TupleAddr> {
        self.indexes[0].get(key).first().copied()
    }

    /// Look up an index by name.
    pub fn index(&self, name: &str) -> Result<&Index> {
        self.indexes
            .iter()
            .find(|ix| ix.name() == name)
            .ok_or_else(|| FrostError::NoSuchIndex {
                table: self.name.clone(),
                index: name.to_owned(),
            })
    }

    #[must_use]
    pub fn indexes(&self) -> &[Index] {
        &self.indexes
    }

    // ------------------------------------------------------------------
    // Eviction surface (consumed by the engine crate)
    // ------------------------------------------------------------------

    /// Fail unless this table can hold stubs.
    pub fn ensure_evictable(&self) -> Result<()> {
        if self.stubs.is_none() {
            return Err(FrostError::StubTableMissing {
                table: self.name.clone(),
            });
        }
        Ok(())
    }

    /// Drop the tuple from the tracker ahead of eviction. No-op on
    /// batch-evicted tables.
    pub fn unregister(&mut self, slot: SlotId) {
        tracker::on_remove(self, slot);
    }

    /// Re-register an unevicted tuple at the cold end.
    pub fn register_cold(&mut self, slot: SlotId) {
        tracker::on_unevict_cold(self, slot);
    }

    /// Re-register the faulting tuple at the hot end.
    pub fn register_hot(&mut self, slot: SlotId) {
        tracker::on_unevict_hot(self, slot);
    }

    /// Free a slot whose row has been copied into a block. Index entries are
    /// the caller's responsibility (they were just retargeted to a stub).
    pub fn free_slot(&mut self, slot: SlotId) -> Result<()> {
        if self.slot(slot).is_none() {
            return Err(FrostError::SlotVacant { slot });
        }
        self.release(slot);
        Ok(())
    }

    /// Allocate a slot for a merged-back row without touching indexes or the
    /// tracker; the uneviction path retargets and re-registers explicitly.
    pub fn insert_unmanaged(&mut self, values: Vec<Value>) -> Result<SlotId> {
        self.schema.check(&values)?;
        self.allocate(values)
    }

    /// Swap `old` for `new` in every index, keyed by the row's own values.
    pub fn retarget_indexes(&mut self, values: &[Value], old: TupleAddr, new: TupleAddr) {
        let name = self.name.clone();
        for index in &mut self.indexes {
            let key = &values[index.column()];
            if !index.retarget(key, old, new) {
                warn!(
                    table = %name,
                    index = index.name(),
                    "index entry missing during retarget"
                );
            }
        }
    }

    /// Insert a stub row for an evicted tuple.
    pub fn stub_insert(&mut self, block_id: BlockId, offset_in_block: i32) -> Result<StubId> {
        let name = self.name.clone();
        let stubs = self
            .stubs
            .as_mut()
            .ok_or(FrostError::StubTableMissing { table: name })?;
        Ok(stubs.insert(block_id, offset_in_block))
    }

    /// Read a stub row.
    #[must_use]
    pub fn stub_get(&self, id: StubId) -> Option<StubRow> {
        self.stubs.as_ref().and_then(|s| s.get(id))
    }

    /// Delete a stub row during uneviction.
    pub fn stub_delete(&mut self, id: StubId) -> Result<StubRow> {
        let name = self.name.clone();
        let stubs = self
            .stubs
            .as_mut()
            .ok_or(FrostError::StubTableMissing { table: name })?;
        stubs.delete(id)
    }

    /// Number of live stubs.
    #[must_use]
    pub fn stub_count(&self) -> usize {
        self.stubs.as_ref().map_or(0, StubTable::len)
    }

    // ------------------------------------------------------------------
    // Pending-uneviction state
    // ------------------------------------------------------------------

    /// True when `block_id` has already been fetched this retry; the
    /// duplicate read must be suppressed.
    #[must_use]
    pub fn block_seen(&self, block_id: BlockId) -> bool {
        self.pending_seen.contains(&block_id)
    }

    /// Record that `block_id` has been fetched this retry. Returns false when
    /// it was already fetched.
    pub fn mark_block_seen(&mut self, block_id: BlockId) -> bool {
        self.pending_seen.insert(block_id)
    }

    /// Queue a fetched block for merging, remembering the faulting tuple's
    /// offset.
    pub fn push_pending_block(&mut self, bytes: Vec<u8>, merge_offset: i32) {
        self.pending_blocks.push(bytes);
        self.pending_offsets.push(merge_offset);
    }

    /// Number of blocks waiting to merge.
    #[must_use]
    pub fn pending_block_count(&self) -> usize {
        self.pending_blocks.len()
    }

    /// Drain pending blocks and their merge offsets, clearing the seen set so
    /// a later fault on a tuple-merged block reads it again.
    pub fn take_pending_blocks(&mut self) -> Vec<(Vec<u8>, i32)> {
        self.pending_seen.clear();
        std::mem::take(&mut self.pending_blocks)
            .into_iter()
            .zip(std::mem::take(&mut self.pending_offsets))
            .collect()
    }

    // ------------------------------------------------------------------
    // Tracker inspection (tests and diagnostics)
    // ------------------------------------------------------------------

    #[must_use]
    pub const fn chain_len(&self) -> u64 {
        self.chain.count
    }

    #[must_use]
    pub const fn chain_oldest(&self) -> Option<SlotId> {
        self.chain.oldest
    }

    #[must_use]
    pub const fn chain_newest(&self) -> Option<SlotId> {
        self.chain.newest
    }

    #[must_use]
    pub fn chain_next(&self, slot: SlotId) -> Option<SlotId> {
        self.slot(slot).and_then(|t| t.next)
    }

    #[must_use]
    pub fn chain_prev(&self, slot: SlotId) -> Option<SlotId> {
        self.slot(slot).and_then(|t| t.prev)
    }

    #[must_use]
    pub fn tuple_ts(&self, slot: SlotId) -> Option<u64> {
        self.slot(slot).map(|t| t.ts)
    }

    #[must_use]
    pub const fn access_counter(&self) -> u64 {
        self.access_counter
    }

    #[must_use]
    pub fn clock_counter(&self, slot: SlotId) -> Option<u64> {
        self.clock.as_ref().map(|c| c.get(slot))
    }

    /// Raw 1-based cursor of the clock sweep.
    #[must_use]
    pub fn clock_position(&self) -> Option<u32> {
        self.clock.as_ref().map(|c| c.position)
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    #[inline]
    pub(crate) fn slot(&self, slot: SlotId) -> Option<&LiveTuple> {
        self.slots.get(slot.index()).and_then(Option::as_ref)
    }

    #[inline]
    pub(crate) fn slot_mut(&mut self, slot: SlotId) -> Option<&mut LiveTuple> {
        self.slots.get_mut(slot.index()).and_then(Option::as_mut)
    }

    fn row(&self, slot: SlotId) -> &[Value] {
        self.slot(slot).map_or(&[], |t| t.values.as_slice())
    }

    #[allow(clippy::cast_possible_truncation)]
    fn allocate(&mut self, values: Vec<Value>) -> Result<SlotId> {
        let slot = if let Some(slot) = self.free.pop() {
            self.slots[slot.index()] = Some(LiveTuple::new(values));
            slot
        } else {
            if self.slots.len() as u32 >= self.capacity {
                return Err(FrostError::TableFull {
                    table: self.name.clone(),
                    capacity: self.capacity,
                });
            }
            self.slots.push(Some(LiveTuple::new(values)));
            SlotId::new(self.slots.len() as u32)
                .ok_or_else(|| FrostError::internal("slot allocation underflow"))?
        };
        self.live += 1;
        Ok(slot)
    }

    fn release(&mut self, slot: SlotId) {
        // Dropping the LiveTuple frees any out-of-line text/blob storage.
        self.slots[slot.index()] = None;
        self.free.push(slot);
        self.live -= 1;
    }
}
