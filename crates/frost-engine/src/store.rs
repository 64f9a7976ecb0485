//! Block store implementations.
//!
//! Both stores follow the same staging discipline: [`BlockStore::write`]
//! stages a block, [`BlockStore::flush`] makes every staged block readable.
//! A block is never visible to [`BlockStore::read`] before its flush
//! returns; that is the engine's only durability ordering contract. The
//! store is the one resource shared across partitions, so all state sits
//! behind a `parking_lot::Mutex`.

use std::collections::HashMap;
use std::fs;
use std::io::Write as _;
use std::path::PathBuf;

use parking_lot::Mutex;
use tracing::debug;

use frost_error::{FrostError, Result};
use frost_store::BlockStore;
use frost_types::BlockId;

#[derive(Debug)]
struct StagedBlock {
    table: String,
    block_id: BlockId,
    tuple_count: i32,
    bytes: Vec<u8>,
}

#[derive(Debug, Default)]
struct MemoryInner {
    next_id: i16,
    exhausted: bool,
    staged: Vec<StagedBlock>,
    blocks: HashMap<(String, i16), Vec<u8>>,
}

/// In-memory block store; the default backend for tests and single-process
/// deployments.
#[derive(Debug, Default)]
pub struct MemoryBlockStore {
    inner: Mutex<MemoryInner>,
}

impl MemoryBlockStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of flushed (readable) blocks.
    #[must_use]
    pub fn flushed_blocks(&self) -> usize {
        self.inner.lock().blocks.len()
    }

    /// Number of staged, not yet durable blocks.
    #[must_use]
    pub fn staged_blocks(&self) -> usize {
        self.inner.lock().staged.len()
    }
}

impl BlockStore for MemoryBlockStore {
    fn next_block_id(&self) -> Result<BlockId> {
        let mut inner = self.inner.lock();
        if inner.exhausted {
            return Err(FrostError::BlockIdsExhausted);
        }
        let id = BlockId::new(inner.next_id);
        match id.next() {
            Some(next) => inner.next_id = next.get(),
            None => inner.exhausted = true,
        }
        Ok(id)
    }

    fn write(&self, table: &str, block_id: BlockId, tuple_count: i32, bytes: &[u8]) -> Result<()> {
        debug!(table, %block_id, tuple_count, len = bytes.len(), "staging block");
        self.inner.lock().staged.push(StagedBlock {
            table: table.to_owned(),
            block_id,
            tuple_count,
            bytes: bytes.to_vec(),
        });
        Ok(())
    }

    fn flush(&self) -> Result<()> {
        let mut inner = self.inner.lock();
        let staged = std::mem::take(&mut inner.staged);
        for block in staged {
            inner
                .blocks
                .insert((block.table, block.block_id.get()), block.bytes);
        }
        Ok(())
    }

    fn read(&self, table: &str, block_id: BlockId) -> Result<Vec<u8>> {
        self.inner
            .lock()
            .blocks
            .get(&(table.to_owned(), block_id.get()))
            .cloned()
            .ok_or_else(|| FrostError::UnknownBlock {
                table: table.to_owned(),
                block_id,
            })
    }
}

#[derive(Debug, Default)]
struct FileInner {
    next_id: i16,
    exhausted: bool,
    staged: Vec<StagedBlock>,
}

/// File-backed block store: one file per flushed block under a directory.
#[derive(Debug)]
pub struct FileBlockStore {
    dir: PathBuf,
    inner: Mutex<FileInner>,
}

impl FileBlockStore {
    /// Open (creating if needed) a store rooted at `dir`.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            inner: Mutex::new(FileInner::default()),
        })
    }

    fn block_path(&self, table: &str, block_id: BlockId) -> PathBuf {
        self.dir.join(format!("{table}.{}.blk", block_id.get()))
    }
}

impl BlockStore for FileBlockStore {
    fn next_block_id(&self) -> Result<BlockId> {
        let mut inner = self.inner.lock();
        if inner.exhausted {
            return Err(FrostError::BlockIdsExhausted);
        }
        let id = BlockId::new(inner.next_id);
        match id.next() {
            Some(next) => inner.next_id = next.get(),
            None => inner.exhausted = true,
        }
        Ok(id)
    }

    fn write(&self, table: &str, block_id: BlockId, tuple_count: i32, bytes: &[u8]) -> Result<()> {
        debug!(table, %block_id, tuple_count, len = bytes.len(), "staging block");
        self.inner.lock().staged.push(StagedBlock {
            table: table.to_owned(),
            block_id,
            tuple_count,
            bytes: bytes.to_vec(),
        });
        Ok(())
    }

    /// Blocks until every staged block is safely on disk.
    fn flush(&self) -> Result<()> {
        let staged = std::mem::take(&mut self.inner.lock().staged);
        for block in staged {
            let path = self.block_path(&block.table, block.block_id);
            let mut file = fs::File::create(&path)?;
            file.write_all(&block.bytes)?;
            file.sync_all()?;
        }
        Ok(())
    }

    fn read(&self, table: &str, block_id: BlockId) -> Result<Vec<u8>> {
        match fs::read(self.block_path(table, block_id)) {
            Ok(bytes) => Ok(bytes),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                Err(FrostError::UnknownBlock {
                    table: table.to_owned(),
                    block_id,
                })
            }
            Err(err) => Err(err.into()),
        }
    }
}
