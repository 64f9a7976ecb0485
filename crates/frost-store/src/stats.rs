//! Per-table anti-caching statistics.

/// Counters a table carries across eviction and uneviction calls.
///
/// `tuples_evicted` / `blocks_evicted` / `bytes_evicted` describe what is
/// currently out on disk and shrink when blocks are merged back. The
/// `*_written` and `*_read` counters are cumulative I/O totals and only grow.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct TableStats {
    pub tuples_evicted: i32,
    pub blocks_evicted: i32,
    pub bytes_evicted: i64,

    pub tuples_written: i32,
    pub blocks_written: i32,
    pub bytes_written: i64,

    pub tuples_read: i32,
    pub blocks_read: i32,
    pub bytes_read: i64,
}

impl TableStats {
    /// Account one completed block of `tuples` tuples and `bytes` payload.
    pub fn record_evicted(&mut self, tuples: i32, bytes: i64) {
        self.tuples_evicted = self.tuples_evicted.saturating_add(tuples);
        self.blocks_evicted = self.blocks_evicted.saturating_add(1);
        self.bytes_evicted = self.bytes_evicted.saturating_add(bytes);

        self.tuples_written = self.tuples_written.saturating_add(tuples);
        self.blocks_written = self.blocks_written.saturating_add(1);
        self.bytes_written = self.bytes_written.saturating_add(bytes);
    }

    /// Account one merged block section: `tuples` tuples restored, `bytes`
    /// no longer evicted.
    pub fn record_unevicted(&mut self, tuples: i32, bytes: i64) {
        self.tuples_evicted = self.tuples_evicted.saturating_sub(tuples);
        self.blocks_evicted = self.blocks_evicted.saturating_sub(1);
        self.bytes_evicted = self.bytes_evicted.saturating_sub(bytes);

        self.tuples_read = self.tuples_read.saturating_add(tuples);
        self.blocks_read = self.blocks_read.saturating_add(1);
        self.bytes_read = self.bytes_read.saturating_add(bytes);
    }
}
