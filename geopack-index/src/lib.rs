//! # Geopack Index - Packed Hilbert R-Tree
//!
//! A static, bulk-loaded spatial index over axis-aligned bounding boxes,
//! designed as the seekable index block of the geopack container format but
//! usable on its own.
//!
//! ## Features
//!
//! - **Bulk Loading**: built bottom-up in one pass from Hilbert-sorted
//!   leaves; immutable afterwards
//! - **Flat Layout**: fixed 40-byte little-endian records, root first, so
//!   the serialized form needs no pointers or rebuilding
//! - **Buffer And Stream Search**: bounding-box queries against a fully
//!   materialized byte buffer or a forward-only reader (single-pass I/O)
//! - **Ordinal Lookup**: resolve one feature's byte offset without a
//!   spatial query
//!
//! ## Quick Start
//!
//! ```rust
//! use geopack_index::{calc_extent, hilbert_sort, BoundingBox, NodeEntry, PackedRTree};
//!
//! # fn main() -> Result<(), geopack_index::IndexError> {
//! let mut leaves = vec![
//!     NodeEntry::new(BoundingBox::new(0.0, 0.0, 1.0, 1.0), 0),
//!     NodeEntry::new(BoundingBox::new(2.0, 2.0, 3.0, 3.0), 120),
//! ];
//! let extent = calc_extent(&leaves);
//! hilbert_sort(&mut leaves, &extent);
//!
//! let tree = PackedRTree::build(&leaves, 16)?;
//! let hits = tree.search(&BoundingBox::new(0.5, 0.5, 2.5, 2.5));
//! assert_eq!(hits.len(), 2);
//! # Ok(())
//! # }
//! ```

pub mod bounding_box;
pub mod error;
pub mod hilbert;
pub mod packed_rtree;

pub use bounding_box::BoundingBox;
pub use error::{IndexError, IndexResult};
pub use hilbert::{calc_extent, hilbert_sort, HILBERT_MAX};
pub use packed_rtree::{NodeEntry, PackedRTree, SearchHit, DEFAULT_NODE_SIZE, ENTRY_SIZE};
