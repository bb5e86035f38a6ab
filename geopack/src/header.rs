//! Container header record.
//!
//! The header is written once per file, before the index and the feature
//! stream, and cached for the lifetime of a decode session.
//!
//! ## Layout (little-endian, inside the size-prefixed header block)
//!
//! ```text
//! flags: u8            -- 1=has_z, 2=has_m, 4=envelope present, 8=name present
//! geometry_type: u8
//! features_count: u64
//! index_node_size: u16 -- 0 = no index block
//! [envelope: 4 f64]    -- min_x min_y max_x max_y
//! [name: u32-len block, UTF-8]
//! column_count: u16, then per column: u32-len name block, type tag u8
//! ```
//!
//! Column type tags are carried opaquely; attribute typing is the caller's
//! concern.

use serde::{Deserialize, Serialize};

use crate::codec::Dimensions;
use crate::error::{GeopackError, GeopackResult};
use crate::geometry::GeometryType;
use crate::table::{TableBuilder, TableReader};
use geopack_index::BoundingBox;

/// Magic bytes opening every container file: tag, format version, tag, patch.
pub const MAGIC: [u8; 8] = [b'g', b'p', b'k', 0x01, b'g', b'p', b'k', 0x00];

const FLAG_Z: u8 = 1;
const FLAG_M: u8 = 2;
const FLAG_ENVELOPE: u8 = 4;
const FLAG_NAME: u8 = 8;

/// Checks the leading magic bytes: the tag and a supported version.
pub fn verify_magic(magic: &[u8; 8]) -> GeopackResult<()> {
    if magic[..3] != MAGIC[..3] || magic[3] != MAGIC[3] {
        return Err(GeopackError::MalformedContainer(format!(
            "bad magic bytes: {magic:02x?}"
        )));
    }
    Ok(())
}

/// An attribute column: a name plus an opaque type tag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    pub type_tag: u8,
}

/// Framing metadata for one container file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Header {
    /// Optional dataset name.
    pub name: Option<String>,
    /// Declared geometry kind; `Unknown` for mixed collections.
    pub geometry_type: GeometryType,
    pub dimensions: Dimensions,
    pub features_count: u64,
    /// Index branching factor; 0 means no index block follows the header.
    pub index_node_size: u16,
    /// Union of all feature boxes, when known.
    pub envelope: Option<BoundingBox>,
    pub columns: Vec<Column>,
}

impl Header {
    pub fn has_index(&self) -> bool {
        self.index_node_size > 0
    }

    /// Serializes the header table (without the size prefix).
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut builder = TableBuilder::new();
        let mut flags = 0u8;
        if self.dimensions.has_z {
            flags |= FLAG_Z;
        }
        if self.dimensions.has_m {
            flags |= FLAG_M;
        }
        if self.envelope.is_some() {
            flags |= FLAG_ENVELOPE;
        }
        if self.name.is_some() {
            flags |= FLAG_NAME;
        }
        builder.put_u8(flags);
        builder.put_u8(self.geometry_type as u8);
        builder.put_u64(self.features_count);
        builder.put_u16(self.index_node_size);
        if let Some(envelope) = &self.envelope {
            builder.put_f64(envelope.min_x);
            builder.put_f64(envelope.min_y);
            builder.put_f64(envelope.max_x);
            builder.put_f64(envelope.max_y);
        }
        if let Some(name) = &self.name {
            builder.put_block(name.as_bytes());
        }
        builder.put_u16(self.columns.len() as u16);
        for column in &self.columns {
            builder.put_block(column.name.as_bytes());
            builder.put_u8(column.type_tag);
        }
        builder.into_bytes()
    }

    /// Parses a header table (the bytes inside the size-prefixed block).
    pub fn from_bytes(data: &[u8]) -> GeopackResult<Header> {
        let mut reader = TableReader::new(data);
        let flags = reader.read_u8("header flags")?;
        let geometry_type = GeometryType::from_u8(reader.read_u8("header geometry type")?)?;
        let features_count = reader.read_u64("features count")?;
        let index_node_size = reader.read_u16("index node size")?;
        let envelope = if flags & FLAG_ENVELOPE != 0 {
            Some(BoundingBox::new(
                reader.read_f64("envelope")?,
                reader.read_f64("envelope")?,
                reader.read_f64("envelope")?,
                reader.read_f64("envelope")?,
            ))
        } else {
            None
        };
        let name = if flags & FLAG_NAME != 0 {
            let bytes = reader.read_block("name")?;
            Some(String::from_utf8(bytes.to_vec()).map_err(|_| {
                GeopackError::MalformedContainer("header name is not UTF-8".to_string())
            })?)
        } else {
            None
        };
        let column_count = reader.read_u16("column count")?;
        let mut columns = Vec::with_capacity(column_count as usize);
        for _ in 0..column_count {
            let name_bytes = reader.read_block("column name")?;
            let name = String::from_utf8(name_bytes.to_vec()).map_err(|_| {
                GeopackError::MalformedContainer("column name is not UTF-8".to_string())
            })?;
            let type_tag = reader.read_u8("column type")?;
            columns.push(Column { name, type_tag });
        }
        Ok(Header {
            name,
            geometry_type,
            dimensions: Dimensions {
                has_z: flags & FLAG_Z != 0,
                has_m: flags & FLAG_M != 0,
            },
            features_count,
            index_node_size,
            envelope,
            columns,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_header() -> Header {
        Header {
            name: Some("countries".to_string()),
            geometry_type: GeometryType::MultiPolygon,
            dimensions: Dimensions::xy(),
            features_count: 179,
            index_node_size: 16,
            envelope: Some(BoundingBox::new(-180.0, -85.0, 180.0, 83.6)),
            columns: vec![
                Column {
                    name: "id".to_string(),
                    type_tag: 11,
                },
                Column {
                    name: "name".to_string(),
                    type_tag: 11,
                },
            ],
        }
    }

    #[test]
    fn test_header_roundtrip() {
        let header = sample_header();
        let bytes = header.to_bytes();
        assert_eq!(Header::from_bytes(&bytes).unwrap(), header);
    }

    #[test]
    fn test_minimal_header_roundtrip() {
        let header = Header {
            name: None,
            geometry_type: GeometryType::Point,
            dimensions: Dimensions::xyzm(),
            features_count: 0,
            index_node_size: 0,
            envelope: None,
            columns: Vec::new(),
        };
        let bytes = header.to_bytes();
        let back = Header::from_bytes(&bytes).unwrap();
        assert_eq!(back, header);
        assert!(!back.has_index());
    }

    #[test]
    fn test_truncated_header_rejected() {
        let bytes = sample_header().to_bytes();
        assert!(matches!(
            Header::from_bytes(&bytes[..10]),
            Err(GeopackError::MalformedContainer(_))
        ));
    }

    #[test]
    fn test_magic() {
        assert!(verify_magic(&MAGIC).is_ok());
        let mut bad = MAGIC;
        bad[0] = b'x';
        assert!(verify_magic(&bad).is_err());
        let mut wrong_version = MAGIC;
        wrong_version[3] = 0x7f;
        assert!(verify_magic(&wrong_version).is_err());
    }
}
