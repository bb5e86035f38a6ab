//! Seekable binary container for vector geographic features.
//!
//! A container holds a collection of features, each a geometry plus an
//! opaque properties blob, behind a fixed magic signature and a compact
//! header. When an index is requested the features are stored in
//! Hilbert-curve order and a packed R-tree (from [`geopack_index`]) is
//! embedded between header and feature stream, so bounding-box queries
//! touch only the blocks they need.
//!
//! ## Features
//!
//! - All simple-feature geometry kinds with optional Z and M coordinates
//! - WKT parsing and normalized display for geometries
//! - Spatial queries through a seekable [`ContainerReader`] or a single
//!   forward pass with [`stream_select_bbox`]
//! - Per-feature random access by ordinal
//!
//! ## Quick Start
//!
//! ```
//! use geopack::{
//!     parse_wkt, ContainerReader, ContainerWriter, Dimensions, Feature,
//!     GeometryType, WriterOptions,
//! };
//! use geopack_index::BoundingBox;
//! use std::io::Cursor;
//!
//! # fn main() -> geopack::GeopackResult<()> {
//! let mut writer = ContainerWriter::new(
//!     GeometryType::Point,
//!     Dimensions::xy(),
//!     WriterOptions::default(),
//! );
//! writer.add_feature(&Feature::new(parse_wkt("POINT (1 2)")?))?;
//! writer.add_feature(&Feature::new(parse_wkt("POINT (8 9)")?))?;
//! let mut buf = Vec::new();
//! writer.write(&mut buf)?;
//!
//! let mut reader = ContainerReader::open(Cursor::new(buf))?;
//! let hits = reader.select_bbox(&BoundingBox::new(0.0, 0.0, 4.0, 4.0))?;
//! assert_eq!(hits.len(), 1);
//! assert_eq!(hits[0].geometry.to_string(), "POINT (1 2)");
//! # Ok(())
//! # }
//! ```

pub mod codec;
pub mod error;
pub mod feature;
pub mod geometry;
pub mod header;
pub mod reader;
mod table;
pub mod writer;

pub use codec::{decode_geometry, encode_geometry, Dimensions, EncodedGeometry};
pub use error::{GeopackError, GeopackResult};
pub use feature::Feature;
pub use geometry::{parse_wkt, Coord, Geometry, GeometryType, Polygon};
pub use header::{Column, Header, MAGIC};
pub use reader::{stream_select_bbox, ContainerReader};
pub use writer::{ContainerWriter, WriterOptions};

pub use geopack_index;
