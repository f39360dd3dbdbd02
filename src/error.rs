//! Error taxonomy.
//!
//! Each fallible boundary gets its own `thiserror` enum; [`EngineError`]
//! composes them at the crate root the way `anyhow::Error` composes
//! arbitrary errors at an application edge, except that the variants callers
//! care about (a rejected codec stream, a collaborator failure) stay
//! matchable.

use thiserror::Error;

use crate::chunk::ChunkPosition;

#[derive(Debug, Error, Eq, PartialEq)]
pub enum CodecError {
    #[error("block stream decoded to {decoded} cells, expected {expected}")]
    InvalidLength { decoded: usize, expected: usize },
    #[error("zero-length run at byte offset {offset}")]
    ZeroRun { offset: usize },
    #[error("truncated run-length record: trailing type byte with no run length")]
    TruncatedRecord,
}

#[derive(Debug, Error)]
pub enum RegionFileError {
    #[error("no region file is open for chunk {0:?}")]
    NotOpen(ChunkPosition),
    #[error("region file I/O error for chunk {position:?}: {source}")]
    Io {
        position: ChunkPosition,
        #[source]
        source: std::io::Error,
    },
    #[error("region file contains corrupt chunk data for {0:?}: {1}")]
    Corrupt(ChunkPosition, CodecError),
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Codec(#[from] CodecError),
    #[error(transparent)]
    RegionFile(#[from] RegionFileError),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T, E = EngineError> = std::result::Result<T, E>;
