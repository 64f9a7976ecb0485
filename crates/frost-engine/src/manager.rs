//! Eviction orchestration.
//!
//! For each block: allocate an id, walk the coldest-first iterator, and for
//! every admitted tuple remove it from the tracker, write a stub, retarget
//! the table's indexes at the stub, append the serialized row to the block,
//! and free the slot. Completed blocks go to the block store; a single flush
//! at the end makes them durable.

use tracing::{debug, info, warn};

use frost_error::{FrostError, Result};
use frost_store::{EvictionIterator, Table, TableStats};
use frost_types::tuple::encode_tuple;
use frost_types::{SlotId, TupleAddr, Value};

use crate::block::BlockBuilder;

/// Column names of the result set returned by eviction calls; the first is a
/// `varchar(4096)`, the counts are `int32`, the byte total an `int64`.
pub const RESULT_COLUMNS: [&str; 4] = [
    "TABLE_NAME",
    "ANTICACHE_TUPLES_EVICTED",
    "ANTICACHE_BLOCKS_EVICTED",
    "ANTICACHE_BYTES_EVICTED",
];

/// One result row: the per-call delta for one table.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct EvictionResultRow {
    pub table_name: String,
    pub tuples_evicted: i32,
    pub blocks_evicted: i32,
    pub bytes_evicted: i64,
}

/// Result set of one eviction call: one row for single-table eviction, two
/// (parent, child) for co-eviction.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct EvictionResult {
    pub rows: Vec<EvictionResultRow>,
}

fn delta_row(table: &Table, before: &TableStats) -> EvictionResultRow {
    let after = table.stats();
    EvictionResultRow {
        table_name: table.name().to_owned(),
        tuples_evicted: after.tuples_evicted - before.tuples_evicted,
        blocks_evicted: after.blocks_evicted - before.blocks_evicted,
        bytes_evicted: after.bytes_evicted - before.bytes_evicted,
    }
}

/// Drives single-table and parent/child co-eviction.
#[derive(Debug, Default)]
pub struct EvictionManager;

impl EvictionManager {
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Evict up to `num_blocks` blocks of `block_size` bytes from `table`.
    ///
    /// Returns the one-row result set with this call's deltas. An iterator
    /// that produces no real tuples ends the call early with whatever blocks
    /// already completed.
    pub fn evict_block(
        &self,
        table: &mut Table,
        block_size: usize,
        num_blocks: u32,
    ) -> Result<EvictionResult> {
        table.ensure_evictable()?;
        let store = table.block_store()?;
        let before = *table.stats();
        info!(
            table = table.name(),
            block_size,
            num_blocks,
            live = table.live_count(),
            "evicting blocks"
        );

        let budget = block_size.saturating_mul(num_blocks as usize);
        let mut iter = EvictionIterator::new(table, Some(budget));
        let max_tuple = table.options().max_evicted_tuple_size;
        let mut wrote_any = false;

        for _ in 0..num_blocks {
            let block_id = store.next_block_id()?;
            let mut builder = BlockBuilder::new(block_size, &[table.name()], block_id);
            let header_len = builder.header_len();
            let mut tuples_in_block: i32 = 0;

            while builder.serialized_size() + max_tuple < block_size {
                let Some(slot) = iter.next(table) else { break };
                let Some(values) = evictable_row(table, slot) else {
                    continue;
                };
                let encoded = encode_checked(&values, max_tuple)?;
                table.unregister(slot);
                evict_one(
                    table,
                    &mut builder,
                    slot,
                    &values,
                    &encoded,
                    tuples_in_block,
                    max_tuple,
                )?;
                tuples_in_block += 1;
            }

            let block_bytes = (builder.serialized_size() - header_len) as i64;
            if tuples_in_block == 0 {
                warn!(table = table.name(), "no tuples were evicted");
                // finalize the empty block, never write it, stop early
                let _ = builder.finish(&[0])?;
                break;
            }
            let data = builder.finish(&[tuples_in_block])?;
            store.write(table.name(), block_id, tuples_in_block, &data)?;
            wrote_any = true;
            table.stats_mut().record_evicted(tuples_in_block, block_bytes);
            debug!(
                table = table.name(),
                %block_id,
                tuples = tuples_in_block,
                bytes = block_bytes,
                "evicted block"
            );
        }

        if wrote_any {
            store.flush()?;
        }
        Ok(EvictionResult {
            rows: vec![delta_row(table, &before)],
        })
    }

    /// Parent/child co-eviction: parent tuples are selected coldest-first and
    /// their children (via `fk_index` on `child`) ride along in the same
    /// block, serialized after all parents.
    ///
    /// A parent is admitted only while the committed parent bytes plus one
    /// tuple ceiling plus the accumulated child budget still fit the block;
    /// a rejected parent keeps its buffered children out too and ends the
    /// block. The child must be flagged batch-evicted by the caller — its own
    /// tracker is inert and is never touched here.
    pub fn evict_block_in_batch(
        &self,
        parent: &mut Table,
        child: &mut Table,
        fk_index: &str,
        block_size: usize,
        num_blocks: u32,
    ) -> Result<EvictionResult> {
        parent.ensure_evictable()?;
        child.ensure_evictable()?;
        if !child.options().batch_evicted {
            return Err(FrostError::NotBatchEvicted {
                table: child.name().to_owned(),
            });
        }
        // fail fast on a bad index name
        let _ = child.index(fk_index)?;

        let store = parent.block_store()?;
        let parent_before = *parent.stats();
        let child_before = *child.stats();
        info!(
            parent = parent.name(),
            child = child.name(),
            block_size,
            num_blocks,
            "co-evicting blocks"
        );

        // parents take roughly half the block; children fill the rest
        let budget = block_size.saturating_mul(num_blocks as usize) / 2;
        let mut iter = EvictionIterator::new(parent, Some(budget));
        let parent_max = parent.options().max_evicted_tuple_size;
        let child_max = child.options().max_evicted_tuple_size;
        let mut wrote_any = false;

        for _ in 0..num_blocks {
            let block_id = store.next_block_id()?;
            let mut builder =
                BlockBuilder::new(block_size, &[parent.name(), child.name()], block_id);
            let header_len = builder.header_len();
            let mut parent_count: i32 = 0;
            let mut child_budget = 0usize;
            let mut buffered_children: Vec<SlotId> = Vec::new();

            loop {
                let Some(slot) = iter.next(parent) else { break };
                let Some(values) = evictable_row(parent, slot) else {
                    continue;
                };
                let encoded = encode_checked(&values, parent_max)?;
                let pk = parent.pk_value(&values).clone();
                let child_slots: Vec<SlotId> = child
                    .index(fk_index)?
                    .get(&pk)
                    .iter()
                    .filter_map(|addr| match addr {
                        TupleAddr::Live(s) => Some(*s),
                        TupleAddr::Stub(_) => None,
                    })
                    .collect();
                // children are charged at the ceiling: admission must hold
                // whatever their real serialized size turns out to be
                let child_cost = child_slots.len() * child_max;

                if builder.serialized_size() + parent_max + child_budget + child_cost >= block_size
                {
                    debug!(
                        parent = parent.name(),
                        slot = %slot,
                        "parent rejected, block budget exhausted"
                    );
                    break;
                }
                child_budget += child_cost;
                buffered_children.extend(child_slots);

                parent.unregister(slot);
                evict_one(
                    parent,
                    &mut builder,
                    slot,
                    &values,
                    &encoded,
                    parent_count,
                    parent_max,
                )?;
                parent_count += 1;

                if builder.serialized_size() + child_budget >= block_size {
                    break;
                }
            }

            let parent_bytes = (builder.serialized_size() - header_len) as i64;
            let mut child_count: i32 = 0;
            for slot in buffered_children {
                let Some(values) = evictable_row(child, slot) else {
                    continue;
                };
                let encoded = encode_checked(&values, child_max)?;
                evict_one(
                    child,
                    &mut builder,
                    slot,
                    &values,
                    &encoded,
                    child_count,
                    child_max,
                )?;
                child_count += 1;
            }
            let child_bytes =
                builder.serialized_size() as i64 - parent_bytes - header_len as i64;

            if parent_count == 0 && child_count == 0 {
                warn!(parent = parent.name(), "no tuples were evicted");
                let _ = builder.finish(&[0, 0])?;
                break;
            }
            let data = builder.finish(&[parent_count, child_count])?;
            store.write(parent.name(), block_id, parent_count + child_count, &data)?;
            wrote_any = true;
            parent.stats_mut().record_evicted(parent_count, parent_bytes);
            if child_count > 0 {
                child.stats_mut().record_evicted(child_count, child_bytes);
            }
            debug!(
                %block_id,
                parents = parent_count,
                children = child_count,
                "co-evicted block"
            );
        }

        if wrote_any {
            store.flush()?;
        }
        Ok(EvictionResult {
            rows: vec![
                delta_row(parent, &parent_before),
                delta_row(child, &child_before),
            ],
        })
    }
}

/// The row at `slot`, or `None` (with a warning) when the iterator produced
/// a slot that no longer holds a real tuple — a stale chain.
fn evictable_row(table: &Table, slot: SlotId) -> Option<Vec<Value>> {
    match table.values(slot) {
        Some(values) => Some(values.to_vec()),
        None => {
            warn!(
                table = table.name(),
                slot = %slot,
                "tuple already evicted, skipping"
            );
            None
        }
    }
}

/// Serialize a row and enforce the per-tuple ceiling.
///
/// Callers run this before touching the tracker, the stub table, or the
/// indexes, so a `TupleTooLarge` failure leaves the tuple live and still
/// registered.
fn encode_checked(values: &[Value], max_tuple: usize) -> Result<Vec<u8>> {
    let encoded = encode_tuple(values);
    if encoded.len() > max_tuple {
        return Err(FrostError::TupleTooLarge {
            size: encoded.len(),
            max: max_tuple,
        });
    }
    Ok(encoded)
}

/// Move one tuple out of the table and into the block: stub, retarget,
/// append, free. `encoded` has already passed [`encode_checked`], so the
/// appends here cannot fail on the ceiling.
fn evict_one(
    table: &mut Table,
    builder: &mut BlockBuilder,
    slot: SlotId,
    values: &[Value],
    encoded: &[u8],
    offset_in_block: i32,
    max_tuple: usize,
) -> Result<()> {
    let stub_id = table.stub_insert(builder.block_id(), offset_in_block)?;
    table.retarget_indexes(values, TupleAddr::Live(slot), TupleAddr::Stub(stub_id));
    builder.add_tuple(encoded, max_tuple)?;
    table.free_slot(slot)?;
    Ok(())
}
