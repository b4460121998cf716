use std::io;

use thiserror::Error;

/// Errors raised while building, opening or enumerating a block-tree dictionary.
#[derive(Debug, Error)]
pub enum IndexError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("fst error: {0}")]
    Fst(#[from] fst::Error),

    #[error("metadata error: {0}")]
    Cbor(#[from] serde_cbor::Error),

    /// Structural problem in a file that is not tied to a specific block.
    #[error("invalid format: {0}")]
    InvalidFormat(&'static str),

    /// A block (or its frame index record) failed to decode.
    #[error("corrupt block at fp={fp}: {reason}")]
    Corrupt { fp: u64, reason: &'static str },

    /// Positioning or metadata call this enumerator does not support.
    #[error("unsupported operation: {0}")]
    Unsupported(&'static str),

    #[error("invalid configuration: {0}")]
    InvalidConfig(&'static str),

    #[error("regex error: {0}")]
    Regex(String),

    #[error("terms must be inserted in strictly ascending order")]
    UnsortedInput,
}

pub type Result<T> = std::result::Result<T, IndexError>;
