//! Reading faulted blocks back and merging their tuples into live tables.
//!
//! `read_block` runs once per `(table, block)` of the fault payload and only
//! buffers raw bytes; `merge_unevicted` then walks the buffered blocks and
//! re-inserts tuples. The split mirrors the retry protocol: reads happen
//! while the transaction is parked, the merge completes before it is
//! rescheduled.

use tracing::{debug, info, warn};

use frost_error::{FrostError, Result};
use frost_store::{Table, TableRegistry};
use frost_types::tuple::{decode_tuple, tuple_wire_len};
use frost_types::{BlockId, MergeStrategy, TupleAddr, Value};

use crate::block::parse_block_header;

/// Fetch one faulted block from the block store onto `table`'s pending-merge
/// list.
///
/// Idempotent per `(table, block_id)` within one retry attempt: a duplicate
/// call warns and touches the store at most once. `tuple_offset` is the
/// faulting tuple's offset within its table's section, kept for the merge.
pub fn read_block(table: &mut Table, block_id: BlockId, tuple_offset: i32) -> Result<()> {
    if table.block_seen(block_id) {
        warn!(table = table.name(), %block_id, "block already read");
        return Ok(());
    }
    let store = table.block_store()?;
    let bytes = store.read(table.name(), block_id)?;
    let header = parse_block_header(&bytes)?;
    debug!(
        table = table.name(),
        %block_id,
        sections = header.sections.len(),
        len = bytes.len(),
        "read evicted block"
    );
    table.push_pending_block(bytes, tuple_offset);
    table.mark_block_seen(block_id);
    Ok(())
}

/// Merge every pending block of `table_name` back into the live tables named
/// in the block headers (which differ from `table_name` for co-evicted
/// blocks).
///
/// Under [`MergeStrategy::Block`] every tuple of a section is restored; under
/// [`MergeStrategy::Tuple`] only the faulting offset is, and the block stays
/// on disk for later faults. The faulting tuple re-registers hot, everything
/// else cold. Pending state is cleared afterwards either way, so a
/// tuple-merged block can fault and be read again.
pub fn merge_unevicted(registry: &mut TableRegistry, table_name: &str) -> Result<()> {
    let pending = registry.live_table_mut(table_name)?.take_pending_blocks();
    if pending.is_empty() {
        warn!(table = table_name, "no unevicted blocks to merge");
        return Ok(());
    }
    info!(
        table = table_name,
        blocks = pending.len(),
        "merging unevicted blocks"
    );

    for (bytes, merge_offset) in pending {
        let header = parse_block_header(&bytes)?;
        let mut cursor = header.header_len;
        for section in &header.sections {
            let table = registry.live_table_mut(&section.table)?;
            let merge_all = table.options().merge_strategy == MergeStrategy::Block;
            let mut tuples_read: i32 = 0;
            let mut bytes_unevicted: i64 = 0;

            for offset in 0..section.tuple_count {
                let remaining = &bytes[cursor..];
                let wire_len = tuple_wire_len(remaining)
                    .ok_or_else(|| FrostError::corrupt("truncated tuple in block body"))?;
                if merge_all || offset == merge_offset {
                    let (values, consumed) = decode_tuple(remaining)
                        .ok_or_else(|| FrostError::corrupt("undecodable tuple in block body"))?;
                    debug_assert_eq!(consumed, wire_len);
                    merge_one(table, values, offset == merge_offset)?;
                    tuples_read += 1;
                    bytes_unevicted += wire_len as i64;
                }
                cursor += wire_len;
            }

            if tuples_read > 0 {
                table.stats_mut().record_unevicted(tuples_read, bytes_unevicted);
                debug!(
                    table = %section.table,
                    tuples = tuples_read,
                    bytes = bytes_unevicted,
                    "merged section"
                );
            }
        }
    }
    Ok(())
}

/// Restore one tuple: fresh slot, stub located through the primary key and
/// deleted, indexes retargeted back to the live address, tracker
/// re-registration hot or cold.
fn merge_one(table: &mut Table, values: Vec<Value>, hot: bool) -> Result<()> {
    let pk = table.pk_value(&values).clone();
    let addr = table.lookup_pk(&pk).ok_or_else(|| {
        FrostError::internal(format!(
            "unevicted tuple has no index entry on '{}'",
            table.name()
        ))
    })?;
    let TupleAddr::Stub(stub_id) = addr else {
        return Err(FrostError::internal(format!(
            "unevicted tuple on '{}' is not stubbed",
            table.name()
        )));
    };
    let slot = table.insert_unmanaged(values)?;
    let row = table
        .values(slot)
        .map(<[Value]>::to_vec)
        .ok_or_else(|| FrostError::internal("freshly merged slot is vacant"))?;
    table.stub_delete(stub_id)?;
    table.retarget_indexes(&row, TupleAddr::Stub(stub_id), TupleAddr::Live(slot));
    if hot {
        table.register_hot(slot);
    } else {
        table.register_cold(slot);
    }
    Ok(())
}
