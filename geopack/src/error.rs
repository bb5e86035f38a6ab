//! Error types for the container format and geometry codec.

use geopack_index::IndexError;
use std::io;
use thiserror::Error;

/// Errors that can occur while reading or writing geopack data.
///
/// All variants are terminal for the operation in progress; nothing is
/// retried internally.
#[derive(Debug, Error)]
pub enum GeopackError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Bad magic bytes, or a truncated header or feature block.
    #[error("malformed container: {0}")]
    MalformedContainer(String),

    /// A geometry type tag outside the known set.
    #[error("unsupported geometry kind: {0}")]
    UnsupportedGeometryKind(u8),

    /// Ends/parts arrays disagreeing with coordinate counts.
    #[error("inconsistent geometry encoding: {0}")]
    InconsistentGeometry(String),

    #[error("WKT parse error: {0}")]
    WktParse(String),

    /// A construction-time invariant violation or search failure in the
    /// spatial index.
    #[error("index error: {0}")]
    Index(#[from] IndexError),
}

/// Result type for geopack operations.
pub type GeopackResult<T> = Result<T, GeopackError>;

impl GeopackError {
    pub(crate) fn truncated(what: &str) -> GeopackError {
        GeopackError::MalformedContainer(format!("truncated {what}"))
    }
}
