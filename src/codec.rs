//! Run-length codec for a chunk's block field.
//!
//! A chunk is a flat `CHUNK_VOLUME` array of [`BlockType`] traversed in
//! `(y, x, z)` order — `y` slowest, `z` fastest. The on-disk form is a flat
//! stream of `(type: u8, run: u8)` pairs with no length prefix; a reader
//! knows it's done once it has materialized `CHUNK_VOLUME` cells. This is
//! the same run-splitting idea the old `CompactedChunk::compact`/`decompact`
//! pair implemented, just narrowed from a `Vec<(usize, BlockId)>` in memory
//! to a byte stream with runs capped at 255, matching how the original
//! engine's `Chunk::Load`/`Chunk::Unload` walk its block data.

use crate::{block::BlockType, config::CHUNK_VOLUME, error::CodecError};

/// The result of decoding a block stream: the expanded array plus whether
/// any decoded cell was non-empty. `non_empty == false` means the whole
/// chunk is air and the caller can skip meshing it.
pub struct DecodedChunk {
    pub blocks: Box<[BlockType; CHUNK_VOLUME]>,
    pub non_empty: bool,
}

/// Encode a full block array into its run-length byte stream.
///
/// Traverses `blocks` in index order (which is already `(y, x, z)`, `z`
/// fastest) and emits one `(type, run)` pair every time the type changes or
/// a run reaches the `u8` cap of 255.
pub fn encode(blocks: &[BlockType; CHUNK_VOLUME]) -> Vec<u8> {
    let mut out = Vec::new();
    let mut iter = blocks.iter().copied();
    let mut current = match iter.next() {
        Some(first) => first,
        None => return out,
    };
    let mut run: u32 = 1;

    let mut flush = |ty: BlockType, run: u32, out: &mut Vec<u8>| {
        let mut remaining = run;
        while remaining > 0 {
            let chunk_run = remaining.min(255) as u8;
            out.push(ty.0);
            out.push(chunk_run);
            remaining -= chunk_run as u32;
        }
    };

    for block in iter {
        if block == current {
            run += 1;
        } else {
            flush(current, run, &mut out);
            current = block;
            run = 1;
        }
    }
    flush(current, run, &mut out);
    out
}

/// Decode a run-length byte stream back into a full block array.
///
/// Returns [`CodecError::TruncatedRecord`] if the stream ends on an odd byte,
/// [`CodecError::ZeroRun`] if a run byte of zero is found, and
/// [`CodecError::InvalidLength`] if the runs don't sum to exactly
/// `CHUNK_VOLUME`.
pub fn decode(bytes: &[u8]) -> Result<DecodedChunk, CodecError> {
    if bytes.len() % 2 != 0 {
        return Err(CodecError::TruncatedRecord);
    }

    let mut blocks: Box<[BlockType; CHUNK_VOLUME]> =
        vec![BlockType::NONE; CHUNK_VOLUME].into_boxed_slice().try_into().ok().expect(
            "CHUNK_VOLUME-length vec always converts to a CHUNK_VOLUME array",
        );
    let mut filled = 0usize;
    let mut non_empty = false;

    for (pair_index, pair) in bytes.chunks_exact(2).enumerate() {
        let ty = BlockType(pair[0]);
        let run = pair[1];
        if run == 0 {
            return Err(CodecError::ZeroRun {
                offset: pair_index * 2 + 1,
            });
        }
        let run = run as usize;
        if filled + run > CHUNK_VOLUME {
            return Err(CodecError::InvalidLength {
                decoded: filled + run,
                expected: CHUNK_VOLUME,
            });
        }
        if ty.is_some() {
            non_empty = true;
        }
        blocks[filled..filled + run].fill(ty);
        filled += run;
    }

    if filled != CHUNK_VOLUME {
        return Err(CodecError::InvalidLength {
            decoded: filled,
            expected: CHUNK_VOLUME,
        });
    }

    Ok(DecodedChunk { blocks, non_empty })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn solid(ty: u8) -> Box<[BlockType; CHUNK_VOLUME]> {
        vec![BlockType(ty); CHUNK_VOLUME]
            .into_boxed_slice()
            .try_into()
            .ok()
            .unwrap()
    }

    #[test]
    fn solid_chunk_round_trips() {
        let blocks = solid(7);
        let bytes = encode(&blocks);
        // 32768 / 255 = 128 full runs, plus a remainder of 128.
        assert_eq!(bytes.len(), (128 + 1) * 2);
        let decoded = decode(&bytes).unwrap();
        assert_eq!(*decoded.blocks, *blocks);
        assert!(decoded.non_empty);
    }

    #[test]
    fn empty_chunk_round_trips_and_is_not_non_empty() {
        let blocks = solid(0);
        let bytes = encode(&blocks);
        let decoded = decode(&bytes).unwrap();
        assert!(!decoded.non_empty);
        assert_eq!(*decoded.blocks, *blocks);
    }

    #[test]
    fn single_nonzero_cell_round_trips() {
        let mut blocks = solid(0);
        blocks[0] = BlockType(1);
        let bytes = encode(&blocks);
        let decoded = decode(&bytes).unwrap();
        assert_eq!(*decoded.blocks, *blocks);
        assert!(decoded.non_empty);
    }

    #[test]
    fn rejects_zero_run() {
        let err = decode(&[5, 0]).unwrap_err();
        assert_eq!(err, CodecError::ZeroRun { offset: 1 });
    }

    #[test]
    fn rejects_truncated_record() {
        let err = decode(&[5]).unwrap_err();
        assert_eq!(err, CodecError::TruncatedRecord);
    }

    #[test]
    fn rejects_short_stream() {
        let err = decode(&[5, 255]).unwrap_err();
        assert!(matches!(err, CodecError::InvalidLength { .. }));
    }

    #[test]
    fn rejects_overlong_stream() {
        let mut bytes = encode(&solid(3));
        bytes.push(3);
        bytes.push(1);
        let err = decode(&bytes).unwrap_err();
        assert!(matches!(err, CodecError::InvalidLength { .. }));
    }

    #[test]
    fn sum_of_runs_always_equals_chunk_volume() {
        let mut blocks = solid(0);
        for (i, b) in blocks.iter_mut().enumerate() {
            *b = BlockType((i % 5) as u8);
        }
        let bytes = encode(&blocks);
        let total: usize = bytes.chunks_exact(2).map(|pair| pair[1] as usize).sum();
        assert_eq!(total, CHUNK_VOLUME);
    }
}
