//! Evicted-block assembly and header parsing.
//!
//! Wire format of one block:
//!
//! ```text
//! header := i32_be n_tables
//!           repeat n_tables: (i32_be name_len, utf8 name) i32_be tuple_count
//! body   := tuples concatenated, grouped by table in header order
//! ```
//!
//! The block id is the store key and is not re-encoded in the bytes. The
//! builder writes a provisional header with zero counts, appends tuples, and
//! rewrites the exact counts in [`BlockBuilder::finish`].

use frost_error::{FrostError, Result};
use frost_types::BlockId;

/// Sanity bound on the table count of a parsed header.
const MAX_TABLES_PER_BLOCK: i32 = 64;

/// Assembles one serialized block.
#[derive(Debug)]
pub struct BlockBuilder {
    block_id: BlockId,
    block_size: usize,
    buf: Vec<u8>,
    count_offsets: Vec<usize>,
    header_len: usize,
}

impl BlockBuilder {
    /// Start a block, writing the provisional header for `table_names` in
    /// serialization order.
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
    pub fn new(block_size: usize, table_names: &[&str], block_id: BlockId) -> Self {
        let mut buf = Vec::with_capacity(block_size.min(1 << 20));
        buf.extend_from_slice(&(table_names.len() as i32).to_be_bytes());
        let mut count_offsets = Vec::with_capacity(table_names.len());
        for name in table_names {
            buf.extend_from_slice(&(name.len() as i32).to_be_bytes());
            buf.extend_from_slice(name.as_bytes());
            count_offsets.push(buf.len());
            buf.extend_from_slice(&0_i32.to_be_bytes());
        }
        let header_len = buf.len();
        Self {
            block_id,
            block_size,
            buf,
            count_offsets,
            header_len,
        }
    }

    #[inline]
    #[must_use]
    pub const fn block_id(&self) -> BlockId {
        self.block_id
    }

    /// Bytes accumulated so far, header included.
    #[inline]
    #[must_use]
    pub fn serialized_size(&self) -> usize {
        self.buf.len()
    }

    /// Size of the provisional header; subtract from the final size to get
    /// the payload bytes this block evicted.
    #[inline]
    #[must_use]
    pub const fn header_len(&self) -> usize {
        self.header_len
    }

    /// Append one serialized tuple.
    ///
    /// Rejects a tuple larger than `max_tuple_size` (the per-tuple ceiling)
    /// and any append that would push the block past its byte capacity; the
    /// manager's admission check makes the latter unreachable in the normal
    /// sequence.
    pub fn add_tuple(&mut self, bytes: &[u8], max_tuple_size: usize) -> Result<()> {
        if bytes.len() > max_tuple_size {
            return Err(FrostError::TupleTooLarge {
                size: bytes.len(),
                max: max_tuple_size,
            });
        }
        if self.buf.len() + bytes.len() > self.block_size {
            return Err(FrostError::BlockOverflow {
                block_id: self.block_id,
                size: self.buf.len() + bytes.len(),
                capacity: self.block_size,
            });
        }
        self.buf.extend_from_slice(bytes);
        Ok(())
    }

    /// Rewrite the header with the exact per-table tuple counts and return
    /// the finished bytes.
    pub fn finish(mut self, counts: &[i32]) -> Result<Vec<u8>> {
        if counts.len() != self.count_offsets.len() {
            return Err(FrostError::internal(format!(
                "block {} header has {} tables but {} counts supplied",
                self.block_id,
                self.count_offsets.len(),
                counts.len()
            )));
        }
        for (&offset, &count) in self.count_offsets.iter().zip(counts) {
            self.buf[offset..offset + 4].copy_from_slice(&count.to_be_bytes());
        }
        Ok(self.buf)
    }
}

/// One per-table section declared by a block header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockSection {
    pub table: String,
    pub tuple_count: i32,
}

/// Parsed block header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockHeader {
    pub sections: Vec<BlockSection>,
    /// Byte offset where the tuple body starts.
    pub header_len: usize,
}

/// Parse and validate the header of a block read back from the store.
pub fn parse_block_header(bytes: &[u8]) -> Result<BlockHeader> {
    let mut cursor = 0usize;
    let n_tables = read_i32(bytes, &mut cursor)?;
    if !(1..=MAX_TABLES_PER_BLOCK).contains(&n_tables) {
        return Err(FrostError::corrupt(format!(
            "implausible table count {n_tables}"
        )));
    }
    let mut sections = Vec::with_capacity(n_tables as usize);
    for _ in 0..n_tables {
        let name_len = read_i32(bytes, &mut cursor)?;
        if name_len < 0 {
            return Err(FrostError::corrupt("negative table name length"));
        }
        let end = cursor
            .checked_add(name_len as usize)
            .filter(|&e| e <= bytes.len())
            .ok_or_else(|| FrostError::corrupt("table name overruns block"))?;
        let table = std::str::from_utf8(&bytes[cursor..end])
            .map_err(|_| FrostError::corrupt("table name is not UTF-8"))?
            .to_owned();
        cursor = end;
        let tuple_count = read_i32(bytes, &mut cursor)?;
        if tuple_count < 0 {
            return Err(FrostError::corrupt(format!(
                "negative tuple count for table '{table}'"
            )));
        }
        sections.push(BlockSection { table, tuple_count });
    }
    Ok(BlockHeader {
        sections,
        header_len: cursor,
    })
}

fn read_i32(bytes: &[u8], cursor: &mut usize) -> Result<i32> {
    let end = *cursor + 4;
    let slice = bytes
        .get(*cursor..end)
        .ok_or_else(|| FrostError::corrupt("truncated block header"))?;
    let raw: [u8; 4] = slice
        .try_into()
        .map_err(|_| FrostError::corrupt("truncated block header"))?;
    *cursor = end;
    Ok(i32::from_be_bytes(raw))
}

#[cfg(test)]
mod tests {
    use super::*;
    use frost_types::tuple::encode_tuple;
    use frost_types::Value;

    #[test]
    fn header_roundtrip_single_table() {
        let builder = BlockBuilder::new(4096, &["orders"], BlockId::new(3));
        let header_len = builder.header_len();
        let bytes = builder.finish(&[7]).unwrap();
        assert_eq!(bytes.len(), header_len);

        let header = parse_block_header(&bytes).unwrap();
        assert_eq!(header.header_len, header_len);
        assert_eq!(
            header.sections,
            vec![BlockSection {
                table: "orders".to_owned(),
                tuple_count: 7
            }]
        );
    }

    #[test]
    fn header_roundtrip_two_tables() {
        let builder = BlockBuilder::new(4096, &["parent", "child"], BlockId::new(0));
        let bytes = builder.finish(&[2, 6]).unwrap();
        let header = parse_block_header(&bytes).unwrap();
        assert_eq!(header.sections.len(), 2);
        assert_eq!(header.sections[0].table, "parent");
        assert_eq!(header.sections[0].tuple_count, 2);
        assert_eq!(header.sections[1].table, "child");
        assert_eq!(header.sections[1].tuple_count, 6);
    }

    #[test]
    fn size_law_holds_for_completed_blocks() {
        let block_size = 512;
        let max_tuple = 64;
        let mut builder = BlockBuilder::new(block_size, &["t"], BlockId::FIRST);
        let tuple = encode_tuple(&[Value::Integer(1), Value::Text("x".repeat(30))]);
        assert!(tuple.len() <= max_tuple);

        let mut count = 0;
        while builder.serialized_size() + max_tuple < block_size {
            builder.add_tuple(&tuple, max_tuple).unwrap();
            count += 1;
        }
        let bytes = builder.finish(&[count]).unwrap();
        assert!(bytes.len() <= block_size);
        assert!(count > 0);
    }

    #[test]
    fn oversized_tuple_is_rejected() {
        let mut builder = BlockBuilder::new(4096, &["t"], BlockId::FIRST);
        let big = vec![0u8; 100];
        let err = builder.add_tuple(&big, 64).unwrap_err();
        assert!(matches!(
            err,
            FrostError::TupleTooLarge { size: 100, max: 64 }
        ));
    }

    #[test]
    fn overflow_is_rejected() {
        let mut builder = BlockBuilder::new(32, &["t"], BlockId::FIRST);
        let tuple = vec![0u8; 24];
        let err = builder.add_tuple(&tuple, 2500).unwrap_err();
        assert!(matches!(err, FrostError::BlockOverflow { .. }));
    }

    #[test]
    fn finish_requires_matching_counts() {
        let builder = BlockBuilder::new(4096, &["a", "b"], BlockId::FIRST);
        assert!(builder.finish(&[1]).is_err());
    }

    #[test]
    fn corrupt_headers_are_rejected() {
        assert!(parse_block_header(&[]).is_err());
        // zero tables
        assert!(parse_block_header(&0_i32.to_be_bytes()).is_err());
        // name overruns the buffer
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&1_i32.to_be_bytes());
        bytes.extend_from_slice(&100_i32.to_be_bytes());
        bytes.extend_from_slice(b"short");
        assert!(parse_block_header(&bytes).is_err());
    }
}
