//! Byte codecs for every persisted record family.
//!
//! ## Block record
//!
//! | Offset | Size | Field |
//! |--------|------|-------|
//! | 0 | 4 | Version (`u32` LE, currently 3) |
//! | 4 | 4 | Chunk flags (`u32` LE) |
//! | 8 | 15 | Reachability (one byte per face pair, 0/1) |
//! | 23 | 4 | Payload length (`u32` LE) |
//! | 27 | N | LZ4 payload (size-prepended) |
//!
//! The uncompressed payload is columnar: `N` material-lo bytes, `N`
//! material-hi bytes, then `N` each of data, local, and paint. A zero-length
//! payload means every block is default air.
//!
//! ## LOD record
//!
//! Version (`u32`), tier factor (`u8`), payload length (`u32`), then an LZ4
//! payload of two bytes per cell. Zero length means all air.
//!
//! ## Column records
//!
//! Tops: version, payload length, LZ4 payload of two material bytes per cell.
//! Heights: version, min height (`i32`), max height (`i32`), payload length,
//! LZ4 payload of one `i32` per cell.
//!
//! Entities are a JSON document (`{"entities": [...]}`).

use crate::block::{BlockRecord, LocalFlags, MaterialId};
use crate::chunk::{CHUNK_VOLUME, Chunk, ChunkFlags};
use crate::column::{COLUMN_CELLS, ColumnRecord, TopCell};
use crate::entity::{EntityDocument, EntityRecord};
use crate::lod::{LodBuffer, Tier};
use crate::reachability::{FACE_PAIRS, Reachability};

/// Current block record version.
pub const BLOCK_VERSION: u32 = 3;

/// Current LOD record version.
pub const LOD_VERSION: u32 = 1;

/// Current tops / heights record version.
pub const COLUMN_VERSION: u32 = 1;

/// Errors that can occur while decoding a record.
#[derive(Debug, thiserror::Error)]
pub enum RecordError {
    /// The data is shorter than its header claims.
    #[error("record truncated: expected {expected} bytes, got {actual}")]
    Truncated { expected: usize, actual: usize },
    /// The record was written by a different format version.
    #[error("record version {found}, expected {expected}")]
    VersionMismatch { found: u32, expected: u32 },
    /// The LZ4 payload could not be decompressed.
    #[error("payload decompression failed: {0}")]
    Decompress(#[from] lz4_flex::block::DecompressError),
    /// The decompressed payload has the wrong size.
    #[error("payload length {actual}, expected {expected}")]
    Length { expected: usize, actual: usize },
    /// The tier byte does not name a known tier.
    #[error("unknown LOD tier factor {0}")]
    UnknownTier(u8),
    /// The entity document is not valid JSON.
    #[error("entity document: {0}")]
    Json(#[from] serde_json::Error),
}

impl RecordError {
    /// Version mismatches are expected after format changes and are not
    /// worth a warning.
    pub fn is_version_mismatch(&self) -> bool {
        matches!(self, RecordError::VersionMismatch { .. })
    }
}

/// The decoded contents of a block record.
#[derive(Clone, Debug)]
pub struct BlockRecordData {
    pub flags: ChunkFlags,
    pub reachability: Reachability,
    pub blocks: Box<[BlockRecord]>,
}

// ---------------------------------------------------------------------------
// Shared helpers
// ---------------------------------------------------------------------------

struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8], RecordError> {
        let end = self.pos + len;
        if self.data.len() < end {
            return Err(RecordError::Truncated {
                expected: end,
                actual: self.data.len(),
            });
        }
        let slice = &self.data[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn u8(&mut self) -> Result<u8, RecordError> {
        Ok(self.take(1)?[0])
    }

    fn u32(&mut self) -> Result<u32, RecordError> {
        let b = self.take(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn i32(&mut self) -> Result<i32, RecordError> {
        let b = self.take(4)?;
        Ok(i32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn version(&mut self, expected: u32) -> Result<(), RecordError> {
        let found = self.u32()?;
        if found != expected {
            return Err(RecordError::VersionMismatch { found, expected });
        }
        Ok(())
    }

    /// Reads a length-prefixed payload and decompresses it. Returns `None`
    /// for the zero-length sentinel.
    ///
    /// The declared uncompressed size is checked before anything is
    /// allocated for it.
    fn payload(&mut self, expected: usize) -> Result<Option<Vec<u8>>, RecordError> {
        let len = self.u32()? as usize;
        if len == 0 {
            return Ok(None);
        }
        let compressed = self.take(len)?;
        let declared = compressed
            .first_chunk::<4>()
            .map(|b| u32::from_le_bytes(*b) as usize)
            .ok_or(RecordError::Truncated {
                expected: 4,
                actual: compressed.len(),
            })?;
        if declared != expected {
            return Err(RecordError::Length {
                expected,
                actual: declared,
            });
        }
        let raw = decompress(compressed)?;
        if raw.len() != expected {
            return Err(RecordError::Length {
                expected,
                actual: raw.len(),
            });
        }
        Ok(Some(raw))
    }
}

fn push_payload(buf: &mut Vec<u8>, raw: Option<&[u8]>) {
    match raw {
        Some(raw) => {
            let compressed = compress(raw);
            buf.extend_from_slice(&(compressed.len() as u32).to_le_bytes());
            buf.extend_from_slice(&compressed);
        }
        None => buf.extend_from_slice(&0u32.to_le_bytes()),
    }
}

/// Compresses a payload with LZ4, prepending the uncompressed size.
pub fn compress(raw: &[u8]) -> Vec<u8> {
    lz4_flex::compress_prepend_size(raw)
}

/// Inverse of [`compress`].
pub fn decompress(bytes: &[u8]) -> Result<Vec<u8>, RecordError> {
    Ok(lz4_flex::decompress_size_prepended(bytes)?)
}

// ---------------------------------------------------------------------------
// Blocks
// ---------------------------------------------------------------------------

/// Encodes a chunk's blocks, flags, and reachability.
pub fn encode_blocks(chunk: &Chunk) -> Vec<u8> {
    encode_block_parts(chunk.blocks(), chunk.flags(), chunk.reachability())
}

/// Encodes a block array with its flags and reachability.
pub fn encode_block_parts(
    blocks: &[BlockRecord],
    flags: ChunkFlags,
    reachability: Reachability,
) -> Vec<u8> {
    let mut buf = Vec::with_capacity(27);
    buf.extend_from_slice(&BLOCK_VERSION.to_le_bytes());
    buf.extend_from_slice(&u32::from(flags.bits()).to_le_bytes());
    buf.extend_from_slice(&reachability.to_bytes());

    if blocks.iter().all(BlockRecord::is_default) {
        push_payload(&mut buf, None);
        return buf;
    }

    let n = blocks.len();
    let mut raw = vec![0u8; n * 5];
    for (i, block) in blocks.iter().enumerate() {
        let [lo, hi] = block.word_bytes();
        raw[i] = lo;
        raw[n + i] = hi;
        raw[2 * n + i] = block.data();
        raw[3 * n + i] = block.local().bits();
        raw[4 * n + i] = block.paint();
    }
    push_payload(&mut buf, Some(&raw));
    buf
}

/// Decodes a block record.
pub fn decode_blocks(data: &[u8]) -> Result<BlockRecordData, RecordError> {
    let mut reader = Reader::new(data);
    reader.version(BLOCK_VERSION)?;
    // Only the low byte carries flags; higher bits are reserved.
    let flags = ChunkFlags(reader.u32()? as u8);
    let reach_bytes: [u8; FACE_PAIRS] = reader
        .take(FACE_PAIRS)?
        .try_into()
        .map_err(|_| RecordError::Truncated {
            expected: FACE_PAIRS,
            actual: 0,
        })?;
    let reachability = Reachability::from_bytes(&reach_bytes);

    let blocks = match reader.payload(CHUNK_VOLUME * 5)? {
        None => vec![BlockRecord::AIR; CHUNK_VOLUME].into_boxed_slice(),
        Some(raw) => {
            let n = CHUNK_VOLUME;
            (0..n)
                .map(|i| {
                    let word = u16::from_le_bytes([raw[i], raw[n + i]]);
                    BlockRecord::from_parts(
                        word,
                        raw[2 * n + i],
                        raw[4 * n + i],
                        LocalFlags(raw[3 * n + i]),
                    )
                })
                .collect()
        }
    };

    Ok(BlockRecordData {
        flags,
        reachability,
        blocks,
    })
}

// ---------------------------------------------------------------------------
// LODs
// ---------------------------------------------------------------------------

pub fn encode_lod(buffer: &LodBuffer) -> Vec<u8> {
    let mut buf = Vec::with_capacity(9);
    buf.extend_from_slice(&LOD_VERSION.to_le_bytes());
    buf.push(buffer.tier().factor() as u8);
    if buffer.is_all_air() {
        push_payload(&mut buf, None);
    } else {
        push_payload(&mut buf, Some(&buffer.to_bytes()));
    }
    buf
}

/// Decodes an LOD record, checking it holds `tier`.
pub fn decode_lod(data: &[u8], tier: Tier) -> Result<LodBuffer, RecordError> {
    let mut reader = Reader::new(data);
    reader.version(LOD_VERSION)?;
    let factor = reader.u8()?;
    if usize::from(factor) != tier.factor() {
        return Err(RecordError::UnknownTier(factor));
    }
    match reader.payload(tier.volume() * 2)? {
        None => Ok(LodBuffer::air(tier)),
        Some(raw) => LodBuffer::from_bytes(tier, &raw).ok_or(RecordError::Length {
            expected: tier.volume() * 2,
            actual: raw.len(),
        }),
    }
}

// ---------------------------------------------------------------------------
// Entities
// ---------------------------------------------------------------------------

pub fn encode_entities(entities: &[EntityRecord]) -> Result<Vec<u8>, RecordError> {
    let doc = EntityDocument {
        entities: entities.to_vec(),
    };
    Ok(serde_json::to_vec(&doc)?)
}

pub fn decode_entities(data: &[u8]) -> Result<Vec<EntityRecord>, RecordError> {
    let doc: EntityDocument = serde_json::from_slice(data)?;
    Ok(doc.entities)
}

// ---------------------------------------------------------------------------
// Columns
// ---------------------------------------------------------------------------

pub fn encode_tops(record: &ColumnRecord) -> Vec<u8> {
    let mut buf = Vec::with_capacity(8);
    buf.extend_from_slice(&COLUMN_VERSION.to_le_bytes());
    push_payload(&mut buf, Some(&record.tops_payload()));
    buf
}

pub fn encode_heights(record: &ColumnRecord) -> Vec<u8> {
    let mut buf = Vec::with_capacity(16);
    buf.extend_from_slice(&COLUMN_VERSION.to_le_bytes());
    buf.extend_from_slice(&record.min_height().to_le_bytes());
    buf.extend_from_slice(&record.max_height().to_le_bytes());
    let mut raw = Vec::with_capacity(COLUMN_CELLS * 4);
    for cell in record.cells() {
        raw.extend_from_slice(&cell.height.to_le_bytes());
    }
    push_payload(&mut buf, Some(&raw));
    buf
}

/// Rebuilds a column record from its tops and heights records.
pub fn decode_column(tops: &[u8], heights: &[u8]) -> Result<ColumnRecord, RecordError> {
    let mut reader = Reader::new(tops);
    reader.version(COLUMN_VERSION)?;
    let materials = reader.payload(COLUMN_CELLS * 2)?.ok_or(RecordError::Length {
        expected: COLUMN_CELLS * 2,
        actual: 0,
    })?;

    let mut reader = Reader::new(heights);
    reader.version(COLUMN_VERSION)?;
    let min_height = reader.i32()?;
    let max_height = reader.i32()?;
    let raw_heights = reader.payload(COLUMN_CELLS * 4)?.ok_or(RecordError::Length {
        expected: COLUMN_CELLS * 4,
        actual: 0,
    })?;

    let cells: Vec<TopCell> = materials
        .chunks_exact(2)
        .zip(raw_heights.chunks_exact(4))
        .map(|(m, h)| {
            TopCell::new(
                MaterialId(u16::from_le_bytes([m[0], m[1]])),
                i32::from_le_bytes([h[0], h[1], h[2], h[3]]),
            )
        })
        .collect();

    let mut record = ColumnRecord::from_cells(cells).ok_or(RecordError::Length {
        expected: COLUMN_CELLS,
        actual: 0,
    })?;
    record.set_bounds(min_height, max_height);
    Ok(record)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::MAX_DAMAGE;
    use crate::chunk::CHUNK_SIDE;
    use crate::coords::{ChunkCoord, Face};
    use serde_json::json;

    fn air_chunk() -> Chunk {
        Chunk::new_air(ChunkCoord::new(0, 0, 0))
    }

    #[test]
    fn test_all_air_chunk_has_zero_length_payload() {
        let bytes = encode_blocks(&air_chunk());
        assert_eq!(bytes.len(), 27);
        assert_eq!(&bytes[23..27], &[0, 0, 0, 0]);

        let data = decode_blocks(&bytes).unwrap();
        assert!(data.blocks.iter().all(BlockRecord::is_default));
        assert_eq!(data.blocks.len(), CHUNK_VOLUME);
    }

    #[test]
    fn test_block_fields_survive_roundtrip() {
        let mut chunk = air_chunk();
        let edges = [0u8, 1, 127, 255];
        let locals = std::iter::once(0u8).chain((0..8).map(|bit| 1 << bit));
        let mut placed = 0;
        for local in locals {
            for damage in 0..=MAX_DAMAGE {
                for material in [0u16, 1, 16383] {
                    for data in edges {
                        for paint in edges {
                            let mut block = BlockRecord::new(MaterialId(material)).with_damage(damage);
                            block.set_data(data);
                            block.set_paint(paint);
                            block.local_mut().insert(local);
                            let (x, y, z) = (
                                placed % CHUNK_SIDE,
                                placed / CHUNK_SIDE % CHUNK_SIDE,
                                placed / (CHUNK_SIDE * CHUNK_SIDE),
                            );
                            chunk.put(x, y, z, block);
                            placed += 1;
                        }
                    }
                }
            }
        }
        assert_eq!(placed, 9 * 4 * 3 * 4 * 4);
        let mut reach = Reachability::all_closed();
        reach.set(Face::NegX, Face::PosY, true);

        let bytes = encode_block_parts(chunk.blocks(), ChunkFlags(0), reach);
        let data = decode_blocks(&bytes).unwrap();
        assert_eq!(&*data.blocks, chunk.blocks());
        assert_eq!(data.reachability, reach);

        let last = data.blocks[placed - 1];
        assert_eq!(last.material(), MaterialId(16383));
        assert_eq!(last.damage(), MAX_DAMAGE);
        assert_eq!((last.data(), last.paint()), (255, 255));
        assert!(last.local().is_protected());
    }

    #[test]
    fn test_declared_payload_size_is_checked_before_decompressing() {
        let mut chunk = air_chunk();
        chunk.put(0, 0, 0, BlockRecord::new(MaterialId(3)));
        let mut bytes = encode_blocks(&chunk);
        // The compressed payload starts with its uncompressed size.
        assert_eq!(&bytes[27..31], &((CHUNK_VOLUME * 5) as u32).to_le_bytes());

        bytes[27..31].copy_from_slice(&u32::MAX.to_le_bytes());
        let err = decode_blocks(&bytes).unwrap_err();
        assert!(matches!(
            err,
            RecordError::Length { expected, actual }
                if expected == CHUNK_VOLUME * 5 && actual == u32::MAX as usize
        ));
    }

    #[test]
    fn test_version_mismatch_is_reported() {
        let mut bytes = encode_blocks(&air_chunk());
        bytes[0] = 2;
        let err = decode_blocks(&bytes).unwrap_err();
        assert!(err.is_version_mismatch());
    }

    #[test]
    fn test_truncated_record_is_rejected() {
        let mut chunk = air_chunk();
        chunk.put(0, 0, 0, BlockRecord::new(MaterialId(3)));
        let bytes = encode_blocks(&chunk);
        let err = decode_blocks(&bytes[..bytes.len() - 3]).unwrap_err();
        assert!(matches!(err, RecordError::Truncated { .. }));
    }

    #[test]
    fn test_flags_are_persisted() {
        let flags = ChunkFlags(ChunkFlags::NEEDS_ACCESS_DETECTION);
        let bytes = encode_block_parts(
            &vec![BlockRecord::AIR; CHUNK_VOLUME],
            flags,
            Reachability::all_open(),
        );
        assert_eq!(decode_blocks(&bytes).unwrap().flags, flags);
    }

    #[test]
    fn test_air_lod_is_zero_length() {
        let bytes = encode_lod(&LodBuffer::air(Tier::Lod2));
        assert_eq!(&bytes[5..9], &[0, 0, 0, 0]);
        assert!(decode_lod(&bytes, Tier::Lod2).unwrap().is_all_air());
    }

    #[test]
    fn test_lod_tier_must_match() {
        let mut cells = vec![MaterialId::AIR; Tier::Lod6.volume()];
        cells[3] = MaterialId(9);
        let lod = LodBuffer::from_cells(Tier::Lod6, cells).unwrap();
        let bytes = encode_lod(&lod);
        assert_eq!(decode_lod(&bytes, Tier::Lod6).unwrap(), lod);
        assert!(decode_lod(&bytes, Tier::Lod5).is_err());
    }

    #[test]
    fn test_entities_document() {
        let entities = vec![
            EntityRecord::new("sheep", 1, 10).with_field("wool", json!("grey")),
            EntityRecord::new("chest", 2, 11),
        ];
        let bytes = encode_entities(&entities).unwrap();
        assert_eq!(decode_entities(&bytes).unwrap(), entities);
        assert!(decode_entities(b"not json").is_err());
    }

    #[test]
    fn test_column_records_rebuild_record() {
        let mut record = ColumnRecord::new();
        for i in 0..COLUMN_CELLS {
            record.set_cell(i, TopCell::new(MaterialId(5), -4 + (i % 3) as i32));
        }
        let rebuilt = decode_column(&encode_tops(&record), &encode_heights(&record)).unwrap();
        assert_eq!(rebuilt, record);
        assert_eq!(rebuilt.min_height(), -4);
    }
}
