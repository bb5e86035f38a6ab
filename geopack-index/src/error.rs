//! Error types for index construction and search.

use std::io;
use thiserror::Error;

/// Errors that can occur while building, reading or searching a packed index.
#[derive(Debug, Error)]
pub enum IndexError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("node size must be at least 2, got {0}")]
    InvalidNodeSize(u16),

    #[error("cannot build an index over zero items")]
    Empty,

    #[error("number of items must be less than 2^56, got {0}")]
    TooManyItems(u64),

    #[error("feature ordinal {ordinal} out of range ({num_items} items)")]
    OrdinalOutOfRange { ordinal: u64, num_items: u64 },

    #[error("index data truncated: expected {expected} bytes, got {actual}")]
    Truncated { expected: usize, actual: usize },
}

/// Result type for index operations.
pub type IndexResult<T> = Result<T, IndexError>;
