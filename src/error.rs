use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum StriderError {
    /// Malformed edge list or an out-of-range CLI/config value.
    #[error("bad input: {0}")]
    BadInput(String),
    /// A single vertex record does not fit inside one block.
    #[error(
        "vertex {vertex} needs {record_bytes} bytes, which exceeds the block size of {block_bytes}"
    )]
    BlockTooSmall {
        vertex: u32,
        record_bytes: u64,
        block_bytes: u64,
    },
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("CRC mismatch in block {0}")]
    CrcMismatch(u32),
    #[error("allocation failed for {0}")]
    Oom(&'static str),
    /// Hop count or source id exceeds the 23/9 walk encoding.
    #[error("walk encoding overflow: {0}")]
    WalkOverflow(&'static str),
    /// Caller requested cancellation; partial visit counts were kept.
    #[error("run cancelled")]
    Cancelled,
}

impl StriderError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Process exit code for the CLI surface.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::BadInput(_) | Self::BlockTooSmall { .. } => 1,
            Self::Io { .. } | Self::CrcMismatch(_) => 2,
            Self::Oom(_) => 3,
            Self::WalkOverflow(_) => 4,
            Self::Cancelled => 0,
        }
    }
}
