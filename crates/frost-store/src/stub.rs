//! Stub storage for evicted tuples.
//!
//! One stub row per evicted tuple, fixed 2-column shape: the block holding
//! the tuple and its offset within that table's section of the block. A
//! stub's id is the address substituted into every index of the owning
//! table, so it must stay stable from insertion until deletion; the arena
//! never compacts, it only reuses explicitly freed rows.

use frost_error::{FrostError, Result};
use frost_types::{BlockId, StubId};

/// The fixed stub row: `(block_id: int16, offset_in_block: int32)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct StubRow {
    pub block_id: BlockId,
    pub offset_in_block: i32,
}

/// Append-style arena of stub rows with a free list.
#[derive(Debug, Default)]
pub struct StubTable {
    rows: Vec<Option<StubRow>>,
    free: Vec<StubId>,
    live: usize,
}

impl StubTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live stubs.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.live
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    /// Insert a stub and return its stable id.
    #[allow(clippy::cast_possible_truncation)]
    pub fn insert(&mut self, block_id: BlockId, offset_in_block: i32) -> StubId {
        let row = StubRow {
            block_id,
            offset_in_block,
        };
        self.live += 1;
        if let Some(id) = self.free.pop() {
            self.rows[id.get() as usize] = Some(row);
            return id;
        }
        let id = StubId::new(self.rows.len() as u32);
        self.rows.push(Some(row));
        id
    }

    /// Look up a stub row.
    #[must_use]
    pub fn get(&self, id: StubId) -> Option<StubRow> {
        self.rows.get(id.get() as usize).copied().flatten()
    }

    /// Delete a stub, releasing its id for reuse.
    pub fn delete(&mut self, id: StubId) -> Result<StubRow> {
        let entry = self
            .rows
            .get_mut(id.get() as usize)
            .ok_or_else(|| FrostError::internal(format!("stub {id} out of range")))?;
        let row = entry
            .take()
            .ok_or_else(|| FrostError::internal(format!("stub {id} already deleted")))?;
        self.free.push(id);
        self.live -= 1;
        Ok(row)
    }
}
