//! Container writer.
//!
//! Features are collected in memory, their leaf boxes Hilbert-sorted, the
//! packed index built over the sorted order, and only then is anything
//! emitted: magic bytes, the size-prefixed header, the index block, and the
//! size-prefixed feature blocks.
//!
//! When an index is present the features are physically stored in the
//! index's leaf order, because leaf payloads are byte offsets from the start
//! of the feature stream. The writer owns that invariant; it never reorders
//! one without the other.

use std::io::Write;

use crate::codec::Dimensions;
use crate::error::{GeopackError, GeopackResult};
use crate::feature::Feature;
use crate::geometry::GeometryType;
use crate::header::{Column, Header};
use geopack_index::{calc_extent, hilbert_sort, BoundingBox, NodeEntry, PackedRTree};

/// Size prefix of header and feature blocks.
pub(crate) const SIZE_PREFIX_LEN: u64 = 4;

/// Options for writing a container.
#[derive(Debug, Clone)]
pub struct WriterOptions {
    /// Branching factor of the index.
    pub node_size: u16,
    /// Whether to build and embed a spatial index.
    pub build_index: bool,
    /// Optional dataset name stored in the header.
    pub name: Option<String>,
    /// Attribute column schema, carried opaquely.
    pub columns: Vec<Column>,
}

impl Default for WriterOptions {
    fn default() -> Self {
        WriterOptions {
            node_size: geopack_index::DEFAULT_NODE_SIZE,
            build_index: true,
            name: None,
            columns: Vec::new(),
        }
    }
}

/// Collects features and writes one container file.
pub struct ContainerWriter {
    geometry_type: GeometryType,
    dimensions: Dimensions,
    options: WriterOptions,
    /// Encoded feature blocks (without size prefix) and their boxes.
    features: Vec<(Vec<u8>, BoundingBox)>,
}

impl ContainerWriter {
    /// Creates a writer for a collection of the declared kind.
    ///
    /// Use [`GeometryType::Unknown`] for mixed collections; any concrete
    /// kind makes the writer reject features of other kinds.
    pub fn new(
        geometry_type: GeometryType,
        dimensions: Dimensions,
        options: WriterOptions,
    ) -> ContainerWriter {
        ContainerWriter {
            geometry_type,
            dimensions,
            options,
            features: Vec::new(),
        }
    }

    /// Number of features collected so far.
    pub fn num_features(&self) -> usize {
        self.features.len()
    }

    /// Encodes and queues one feature.
    pub fn add_feature(&mut self, feature: &Feature) -> GeopackResult<()> {
        let kind = feature.geometry.geometry_type();
        if self.geometry_type != GeometryType::Unknown && kind != self.geometry_type {
            return Err(GeopackError::InconsistentGeometry(format!(
                "feature kind {kind:?} in a {:?} collection",
                self.geometry_type
            )));
        }
        let bbox = feature.geometry.bounding_box();
        self.features.push((feature.to_bytes(self.dimensions), bbox));
        Ok(())
    }

    /// Writes the complete container and returns the header that was
    /// written.
    ///
    /// Requesting an index over zero features is an error; a caller
    /// expecting spatial search must know it won't be available.
    pub fn write<W: Write>(self, out: &mut W) -> GeopackResult<Header> {
        if self.options.build_index && self.features.is_empty() {
            return Err(GeopackError::Index(geopack_index::IndexError::Empty));
        }

        // leaf order and feature order must stay in lockstep
        let mut order: Vec<usize> = (0..self.features.len()).collect();
        let mut index_bytes = Vec::new();
        let mut envelope = None;
        if self.options.build_index {
            let mut entries: Vec<NodeEntry> = self
                .features
                .iter()
                .enumerate()
                .map(|(i, (_, bbox))| NodeEntry::new(*bbox, i as u64))
                .collect();
            let extent = calc_extent(&entries);
            hilbert_sort(&mut entries, &extent);
            order = entries.iter().map(|e| e.offset as usize).collect();

            // leaf payload becomes the byte offset within the feature stream
            let mut offset = 0u64;
            for entry in entries.iter_mut() {
                let feature_len = self.features[entry.offset as usize].0.len() as u64;
                entry.offset = offset;
                offset += SIZE_PREFIX_LEN + feature_len;
            }
            let tree = PackedRTree::build(&entries, self.options.node_size)?;
            tree.write_to(&mut index_bytes)?;
            envelope = Some(extent);
        } else if !self.features.is_empty() {
            let mut extent = BoundingBox::empty();
            for (_, bbox) in &self.features {
                extent.expand(bbox);
            }
            envelope = Some(extent);
        }

        let header = Header {
            name: self.options.name.clone(),
            geometry_type: self.geometry_type,
            dimensions: self.dimensions,
            features_count: self.features.len() as u64,
            index_node_size: if self.options.build_index {
                self.options.node_size
            } else {
                0
            },
            envelope,
            columns: self.options.columns.clone(),
        };

        out.write_all(&crate::header::MAGIC)?;
        let header_bytes = header.to_bytes();
        out.write_all(&(header_bytes.len() as u32).to_le_bytes())?;
        out.write_all(&header_bytes)?;
        out.write_all(&index_bytes)?;
        for i in order {
            let body = &self.features[i].0;
            out.write_all(&(body.len() as u32).to_le_bytes())?;
            out.write_all(body)?;
        }
        log::debug!(
            "wrote container: {} features, index node size {}",
            header.features_count,
            header.index_node_size
        );
        Ok(header)
    }
}
