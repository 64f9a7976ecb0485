//! Block store interface.
//!
//! The store that keeps evicted blocks is an external collaborator; tables
//! hold a shared handle to one. It is the only cross-partition resource in
//! the engine, so implementations provide their own interior locking and the
//! trait takes `&self`.

use frost_error::Result;
use frost_types::BlockId;

/// Storage backend for evicted blocks.
///
/// Ordering contract: a block written with [`BlockStore::write`] is not
/// durable (readable by a future transaction) until [`BlockStore::flush`]
/// returns. `write`, `flush`, and `read` are the engine's only suspension
/// points.
pub trait BlockStore: Send + Sync {
    /// Allocate the next monotonic block id.
    fn next_block_id(&self) -> Result<BlockId>;

    /// Stage one serialized block under `(table, block_id)`.
    fn write(&self, table: &str, block_id: BlockId, tuple_count: i32, bytes: &[u8]) -> Result<()>;

    /// Make all staged blocks durable. Blocks until they are safely written.
    fn flush(&self) -> Result<()>;

    /// Read back the opaque bytes of one block.
    ///
    /// Returns [`frost_error::FrostError::UnknownBlock`] when no flushed
    /// block exists under the key.
    fn read(&self, table: &str, block_id: BlockId) -> Result<Vec<u8>>;
}
