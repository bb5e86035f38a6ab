//! Container reader.
//!
//! Two access modes are supported, mirroring the two index search forms:
//!
//! - [`ContainerReader`] over a seekable source: the header is read once and
//!   cached; spatial queries materialize the index block only for the
//!   duration of the search, then seek to each hit.
//! - [`stream_select_bbox`] over a forward-only source: a single forward
//!   pass through index and feature stream, for non-seekable inputs.

use std::io::{Read, Seek, SeekFrom};

use crate::error::{GeopackError, GeopackResult};
use crate::feature::Feature;
use crate::header::{verify_magic, Header};
use crate::writer::SIZE_PREFIX_LEN;
use geopack_index::{BoundingBox, IndexError, PackedRTree, SearchHit};

/// Reads a container through a seekable source.
pub struct ContainerReader<R> {
    reader: R,
    header: Header,
    index_begin: u64,
    features_begin: u64,
}

impl<R: Read + Seek> ContainerReader<R> {
    /// Verifies the magic bytes and reads the header.
    pub fn open(mut reader: R) -> GeopackResult<ContainerReader<R>> {
        let mut magic = [0u8; 8];
        reader
            .read_exact(&mut magic)
            .map_err(|_| GeopackError::truncated("magic bytes"))?;
        verify_magic(&magic)?;
        let header = read_header_block(&mut reader)?;
        let index_begin = reader.stream_position()?;
        let features_begin = index_begin + index_len(&header)?;
        log::debug!(
            "opened container: {:?}, {} features, index node size {}",
            header.geometry_type,
            header.features_count,
            header.index_node_size
        );
        Ok(ContainerReader {
            reader,
            header,
            index_begin,
            features_begin,
        })
    }

    pub fn header(&self) -> &Header {
        &self.header
    }

    /// Runs a bounding-box query against the embedded index and returns the
    /// raw hits, sorted by feature byte offset.
    ///
    /// The index block is materialized only for the duration of the call.
    /// Fails if the container has no index.
    pub fn search_bbox(&mut self, query: &BoundingBox) -> GeopackResult<Vec<SearchHit>> {
        if !self.header.has_index() {
            return Err(GeopackError::MalformedContainer(
                "container has no spatial index".to_string(),
            ));
        }
        let len = (self.features_begin - self.index_begin) as usize;
        self.reader.seek(SeekFrom::Start(self.index_begin))?;
        let mut index_bytes = vec![0u8; len];
        self.reader
            .read_exact(&mut index_bytes)
            .map_err(|_| GeopackError::truncated("index block"))?;
        let mut hits = PackedRTree::search_buf(
            &index_bytes,
            self.header.features_count as usize,
            self.header.index_node_size,
            query,
        )?;
        hits.sort_by_key(|hit| hit.offset);
        log::debug!("bbox search: {} hits", hits.len());
        Ok(hits)
    }

    /// Returns all features intersecting `query`.
    ///
    /// Uses the index when present, a sequential envelope-filtered scan
    /// otherwise.
    pub fn select_bbox(&mut self, query: &BoundingBox) -> GeopackResult<Vec<Feature>> {
        if self.header.has_index() {
            let hits = self.search_bbox(query)?;
            hits.iter()
                .map(|hit| self.feature_at_offset(hit.offset))
                .collect()
        } else {
            let mut features = self.select_all()?;
            features.retain(|f| f.geometry.bounding_box().intersects(query));
            Ok(features)
        }
    }

    /// Reads every feature in storage order.
    pub fn select_all(&mut self) -> GeopackResult<Vec<Feature>> {
        self.reader.seek(SeekFrom::Start(self.features_begin))?;
        FeatureIter {
            reader: &mut self.reader,
            remaining: self.header.features_count,
        }
        .collect()
    }

    /// Reads one feature by ordinal (position in storage order).
    ///
    /// With an index present only the relevant leaf payload is read; without
    /// one the feature stream is skipped sequentially.
    pub fn feature_at(&mut self, ordinal: u64) -> GeopackResult<Feature> {
        let count = self.header.features_count;
        if ordinal >= count {
            return Err(GeopackError::Index(IndexError::OrdinalOutOfRange {
                ordinal,
                num_items: count,
            }));
        }
        if self.header.has_index() {
            self.reader.seek(SeekFrom::Start(self.index_begin))?;
            let offset = PackedRTree::read_feature_offset(
                &mut self.reader,
                count as usize,
                self.header.index_node_size,
                ordinal,
            )?;
            self.feature_at_offset(offset)
        } else {
            self.reader.seek(SeekFrom::Start(self.features_begin))?;
            for _ in 0..ordinal {
                let len = read_size_prefix(&mut self.reader)?;
                self.reader.seek(SeekFrom::Current(len as i64))?;
            }
            read_feature_block(&mut self.reader)
        }
    }

    fn feature_at_offset(&mut self, offset: u64) -> GeopackResult<Feature> {
        self.reader
            .seek(SeekFrom::Start(self.features_begin + offset))?;
        read_feature_block(&mut self.reader)
    }
}

/// Iterator over size-prefixed feature blocks.
struct FeatureIter<'a, R> {
    reader: &'a mut R,
    remaining: u64,
}

impl<R: Read> Iterator for FeatureIter<'_, R> {
    type Item = GeopackResult<Feature>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;
        Some(read_feature_block(self.reader))
    }
}

/// One-shot bounding-box query over a forward-only source.
///
/// Traverses the index (when present) and the feature stream in a single
/// forward pass, never rewinding; without an index every feature is read
/// and filtered by its envelope. Returns the header along with the
/// matching features in storage order.
pub fn stream_select_bbox<R: Read>(
    reader: &mut R,
    query: &BoundingBox,
) -> GeopackResult<(Header, Vec<Feature>)> {
    let mut magic = [0u8; 8];
    reader
        .read_exact(&mut magic)
        .map_err(|_| GeopackError::truncated("magic bytes"))?;
    verify_magic(&magic)?;
    let header = read_header_block(reader)?;

    let count = header.features_count;
    let mut features = Vec::new();
    if header.has_index() && count > 0 {
        let mut hits = PackedRTree::stream_search(
            reader,
            count as usize,
            header.index_node_size,
            query,
        )?;
        hits.sort_by_key(|hit| hit.offset);
        // the cursor now sits at the start of the feature stream; walk
        // forward, skipping the gaps between hits
        let mut cursor = 0u64;
        for hit in hits {
            skip_bytes(reader, hit.offset - cursor)?;
            let before = read_size_prefix(reader)?;
            let mut block = vec![0u8; before as usize];
            reader
                .read_exact(&mut block)
                .map_err(|_| GeopackError::truncated("feature block"))?;
            features.push(Feature::from_bytes(&block)?);
            cursor = hit.offset + SIZE_PREFIX_LEN + before as u64;
        }
    } else {
        for _ in 0..count {
            let feature = read_feature_block(reader)?;
            if feature.geometry.bounding_box().intersects(query) {
                features.push(feature);
            }
        }
    }
    Ok((header, features))
}

fn index_len(header: &Header) -> GeopackResult<u64> {
    if !header.has_index() {
        return Ok(0);
    }
    if header.features_count == 0 {
        return Err(GeopackError::MalformedContainer(
            "container declares an index over zero features".to_string(),
        ));
    }
    let len = PackedRTree::index_size(
        header.features_count as usize,
        header.index_node_size,
    )?;
    Ok(len as u64)
}

fn read_header_block<R: Read>(reader: &mut R) -> GeopackResult<Header> {
    let len = read_size_prefix(reader)?;
    let mut bytes = vec![0u8; len as usize];
    reader
        .read_exact(&mut bytes)
        .map_err(|_| GeopackError::truncated("header block"))?;
    Header::from_bytes(&bytes)
}

fn read_feature_block<R: Read>(reader: &mut R) -> GeopackResult<Feature> {
    let len = read_size_prefix(reader)?;
    let mut bytes = vec![0u8; len as usize];
    reader
        .read_exact(&mut bytes)
        .map_err(|_| GeopackError::truncated("feature block"))?;
    Feature::from_bytes(&bytes)
}

fn read_size_prefix<R: Read>(reader: &mut R) -> GeopackResult<u32> {
    let mut buf = [0u8; 4];
    reader
        .read_exact(&mut buf)
        .map_err(|_| GeopackError::truncated("size prefix"))?;
    Ok(u32::from_le_bytes(buf))
}

fn skip_bytes<R: Read>(reader: &mut R, len: u64) -> GeopackResult<()> {
    let skipped = std::io::copy(&mut reader.take(len), &mut std::io::sink())?;
    if skipped < len {
        return Err(GeopackError::truncated("feature stream"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::Dimensions;
    use crate::geometry::{parse_wkt, GeometryType};
    use crate::writer::{ContainerWriter, WriterOptions};
    use std::io::Cursor;

    fn small_container() -> Vec<u8> {
        let mut writer = ContainerWriter::new(
            GeometryType::Point,
            Dimensions::xy(),
            WriterOptions::default(),
        );
        for (x, y) in [(0.0, 0.0), (5.0, 5.0), (10.0, 10.0)] {
            writer
                .add_feature(&Feature::new(parse_wkt(&format!("POINT ({x} {y})")).unwrap()))
                .unwrap();
        }
        let mut out = Vec::new();
        writer.write(&mut out).unwrap();
        out
    }

    #[test]
    fn test_open_rejects_bad_magic() {
        let mut data = small_container();
        data[0] = b'x';
        assert!(matches!(
            ContainerReader::open(Cursor::new(data)),
            Err(GeopackError::MalformedContainer(_))
        ));
    }

    #[test]
    fn test_select_all_and_bbox() {
        let data = small_container();
        let mut reader = ContainerReader::open(Cursor::new(data)).unwrap();
        assert_eq!(reader.header().features_count, 3);
        assert_eq!(reader.select_all().unwrap().len(), 3);

        let hits = reader
            .select_bbox(&BoundingBox::new(4.0, 4.0, 6.0, 6.0))
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].geometry.to_string(), "POINT (5 5)");
    }

    #[test]
    fn test_feature_at_out_of_range() {
        let data = small_container();
        let mut reader = ContainerReader::open(Cursor::new(data)).unwrap();
        assert!(matches!(
            reader.feature_at(3),
            Err(GeopackError::Index(IndexError::OrdinalOutOfRange { .. }))
        ));
    }
}
