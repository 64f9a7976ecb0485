//! Per-transaction tracking of stub accesses.
//!
//! During normal execution, any index probe that lands on a stub calls
//! [`FaultTracker::record_evicted_access`]. When the transaction can make no
//! further progress, [`FaultTracker::raise`] produces the typed access fault;
//! the executor rolls the transaction back, uneviction runs, and the
//! transaction is rescheduled.

use tracing::debug;

use frost_error::{FrostError, Result};
use frost_store::Table;
use frost_types::{BlockId, EvictedAccessFault, StubId};

/// Accumulates `(table, block, offset)` triples for one transaction attempt.
#[derive(Debug, Default)]
pub struct FaultTracker {
    table_indexes: Vec<i32>,
    block_ids: Vec<BlockId>,
    tuple_offsets: Vec<i32>,
}

impl FaultTracker {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that execution dereferenced `stub` on `table`.
    ///
    /// A stub id that no longer resolves is an internal error: the stub was
    /// deleted while an index still pointed at it.
    pub fn record_evicted_access(&mut self, table: &Table, stub: StubId) -> Result<()> {
        let row = table.stub_get(stub).ok_or_else(|| {
            FrostError::internal(format!(
                "stub {stub} on table '{}' is deleted but still referenced",
                table.name()
            ))
        })?;
        debug!(
            table = table.name(),
            block_id = %row.block_id,
            offset = row.offset_in_block,
            "recording evicted tuple access"
        );
        self.table_indexes.push(table.relative_index());
        self.block_ids.push(row.block_id);
        self.tuple_offsets.push(row.offset_in_block);
        Ok(())
    }

    /// True when at least one stub access has been recorded.
    #[must_use]
    pub fn has_faults(&self) -> bool {
        !self.block_ids.is_empty()
    }

    /// Number of recorded accesses.
    #[must_use]
    pub fn len(&self) -> usize {
        self.block_ids.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.block_ids.is_empty()
    }

    /// Drain the recorded accesses into the typed fault signal.
    ///
    /// Raising with nothing recorded is a caller bug and yields an internal
    /// error instead of an empty fault.
    pub fn raise(&mut self) -> FrostError {
        let Some(&table_relative_index) = self.table_indexes.first() else {
            return FrostError::internal("access fault raised with no recorded accesses");
        };
        self.table_indexes.clear();
        FrostError::AccessFault(EvictedAccessFault {
            table_relative_index,
            block_ids: std::mem::take(&mut self.block_ids),
            tuple_offsets: std::mem::take(&mut self.tuple_offsets),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use frost_store::{IndexSpec, TableOptions};
    use frost_types::{Column, ColumnType, Schema};

    fn table() -> Table {
        Table::new(
            "orders",
            4,
            Schema::new(vec![Column::new("id", ColumnType::Integer)]),
            8,
            vec![IndexSpec::unique("orders_pk", 0)],
            TableOptions::default(),
        )
        .unwrap()
    }

    #[test]
    fn records_and_raises() {
        let mut t = table();
        let stub_a = t.stub_insert(BlockId::new(2), 0).unwrap();
        let stub_b = t.stub_insert(BlockId::new(2), 5).unwrap();

        let mut tracker = FaultTracker::new();
        assert!(!tracker.has_faults());
        tracker.record_evicted_access(&t, stub_a).unwrap();
        tracker.record_evicted_access(&t, stub_b).unwrap();
        assert_eq!(tracker.len(), 2);

        let err = tracker.raise();
        let fault = err.access_fault().expect("must be an access fault");
        assert_eq!(fault.table_relative_index, 4);
        assert_eq!(fault.block_ids, vec![BlockId::new(2), BlockId::new(2)]);
        assert_eq!(fault.tuple_offsets, vec![0, 5]);
        // the tracker drained; a fresh attempt starts clean
        assert!(tracker.is_empty());
    }

    #[test]
    fn deleted_stub_access_is_internal_error() {
        let mut t = table();
        let stub = t.stub_insert(BlockId::new(1), 0).unwrap();
        t.stub_delete(stub).unwrap();
        let mut tracker = FaultTracker::new();
        assert!(matches!(
            tracker.record_evicted_access(&t, stub).unwrap_err(),
            FrostError::Internal(_)
        ));
    }

    #[test]
    fn empty_raise_is_internal_error() {
        let mut tracker = FaultTracker::new();
        assert!(matches!(tracker.raise(), FrostError::Internal(_)));
    }
}
