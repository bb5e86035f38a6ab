//! Feature records: one geometry plus opaque properties.

use serde::{Deserialize, Serialize};

use crate::codec::{decode_geometry, encode_geometry, read_geometry, write_geometry, Dimensions};
use crate::error::GeopackResult;
use crate::geometry::Geometry;
use crate::table::{TableBuilder, TableReader};

/// One vector feature.
///
/// Properties are an opaque tagged key-value byte run; the container carries
/// them untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Feature {
    pub geometry: Geometry,
    pub properties: Vec<u8>,
}

impl Feature {
    pub fn new(geometry: Geometry) -> Feature {
        Feature {
            geometry,
            properties: Vec::new(),
        }
    }

    pub fn with_properties(geometry: Geometry, properties: Vec<u8>) -> Feature {
        Feature {
            geometry,
            properties,
        }
    }

    /// Serializes the feature table (without the size prefix).
    pub fn to_bytes(&self, dims: Dimensions) -> Vec<u8> {
        let mut builder = TableBuilder::new();
        write_geometry(&mut builder, &encode_geometry(&self.geometry, dims));
        builder.put_block(&self.properties);
        builder.into_bytes()
    }

    /// Parses a feature table (the bytes inside the size-prefixed block).
    pub fn from_bytes(data: &[u8]) -> GeopackResult<Feature> {
        let mut reader = TableReader::new(data);
        let geometry = decode_geometry(&read_geometry(&mut reader)?)?;
        let properties = reader.read_block("properties")?.to_vec();
        Ok(Feature {
            geometry,
            properties,
        })
    }
}
