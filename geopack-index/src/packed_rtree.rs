//! Packed Hilbert R-tree: bulk construction, on-disk layout and search.
//!
//! The tree is a flat array of fixed-size records partitioned into levels,
//! built bottom-up in a single pass from Hilbert-sorted leaves and immutable
//! afterwards. Storage order is reversed: higher levels first, the root at
//! array index 0, leaves last.
//!
//! ## Record layout
//!
//! Every record is 40 bytes, little-endian:
//!
//! ```text
//! min_x: f64   min_y: f64   max_x: f64   max_y: f64   offset: u64
//! ```
//!
//! For leaf records `offset` is the feature's byte offset within the feature
//! stream, supplied by the caller before the build. For internal records it
//! is the array index of the record's first child.
//!
//! ## Search
//!
//! Search is an explicit-stack depth-first traversal, so query cost is
//! bounded by visited-node count only and the stack stays at
//! `O(node_size x levels)`. Two access modes are supported:
//!
//! - [`PackedRTree::search_buf`] over a fully materialized byte buffer, and
//! - [`PackedRTree::stream_search`] over a forward-only reader, which keeps a
//!   running cursor and re-sorts its pending work by ascending target offset
//!   so the index is traversed in a single forward pass.

use std::io::{Read, Write};

use crate::bounding_box::BoundingBox;
use crate::error::{IndexError, IndexResult};
use crate::hilbert;

/// Serialized size of one index record in bytes.
pub const ENTRY_SIZE: usize = 8 * 4 + 8;

/// Default branching factor.
pub const DEFAULT_NODE_SIZE: u16 = 16;

/// Hard cap on indexed items so the byte size of the tree fits in a u64.
const MAX_ITEMS: usize = 1 << 56;

/// One index record: a bounding box plus an opaque 64-bit payload.
#[derive(Clone, Copy, PartialEq, Debug, serde::Deserialize, serde::Serialize)]
pub struct NodeEntry {
    /// Bounds of the feature (leaf) or of all children (internal).
    pub bbox: BoundingBox,
    /// Feature byte offset (leaf) or first-child array index (internal).
    pub offset: u64,
}

impl NodeEntry {
    /// Creates an entry with the given bounds and payload.
    pub fn new(bbox: BoundingBox, offset: u64) -> NodeEntry {
        NodeEntry { bbox, offset }
    }

    /// Creates an entry with empty bounds, ready for bottom-up expansion.
    pub fn placeholder(offset: u64) -> NodeEntry {
        NodeEntry {
            bbox: BoundingBox::empty(),
            offset,
        }
    }

    fn write_to(&self, out: &mut dyn Write) -> std::io::Result<()> {
        out.write_all(&self.bbox.min_x.to_le_bytes())?;
        out.write_all(&self.bbox.min_y.to_le_bytes())?;
        out.write_all(&self.bbox.max_x.to_le_bytes())?;
        out.write_all(&self.bbox.max_y.to_le_bytes())?;
        out.write_all(&self.offset.to_le_bytes())
    }

    fn from_bytes(buf: &[u8]) -> NodeEntry {
        debug_assert!(buf.len() >= ENTRY_SIZE);
        let f = |i: usize| f64::from_le_bytes(buf[i..i + 8].try_into().unwrap());
        NodeEntry {
            bbox: BoundingBox::new(f(0), f(8), f(16), f(24)),
            offset: u64::from_le_bytes(buf[32..40].try_into().unwrap()),
        }
    }
}

/// One spatial query hit.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct SearchHit {
    /// Byte offset of the feature within the feature stream.
    pub offset: u64,
    /// Feature ordinal (position in Hilbert order).
    pub index: u64,
}

/// A bulk-loaded, immutable packed Hilbert R-tree.
pub struct PackedRTree {
    extent: BoundingBox,
    entries: Vec<NodeEntry>,
    num_items: usize,
    num_nodes: usize,
    node_size: u16,
    level_bounds: Vec<(usize, usize)>,
}

impl PackedRTree {
    /// Builds a tree from Hilbert-sorted leaf entries.
    ///
    /// Leaf payloads are taken from the entries as given; callers set them to
    /// feature byte offsets before building. Fails for `node_size < 2` or an
    /// empty input rather than degrading silently.
    pub fn build(leaves: &[NodeEntry], node_size: u16) -> IndexResult<PackedRTree> {
        let level_bounds = Self::generate_level_bounds(leaves.len(), node_size)?;
        let num_nodes = level_bounds[0].1;
        let mut entries = vec![NodeEntry::placeholder(0); num_nodes];
        let leaf_start = num_nodes - leaves.len();
        entries[leaf_start..].copy_from_slice(leaves);

        let mut tree = PackedRTree {
            extent: hilbert::calc_extent(leaves),
            entries,
            num_items: leaves.len(),
            num_nodes,
            node_size,
            level_bounds,
        };
        tree.generate_nodes();
        log::debug!(
            "built packed index: {} items, {} nodes, {} levels",
            tree.num_items,
            tree.num_nodes,
            tree.level_bounds.len()
        );
        Ok(tree)
    }

    /// Reconstructs a tree from its serialized bytes.
    pub fn from_buf(data: &[u8], num_items: usize, node_size: u16) -> IndexResult<PackedRTree> {
        let level_bounds = Self::generate_level_bounds(num_items, node_size)?;
        let num_nodes = level_bounds[0].1;
        let expected = num_nodes * ENTRY_SIZE;
        if data.len() < expected {
            return Err(IndexError::Truncated {
                expected,
                actual: data.len(),
            });
        }
        let mut entries = Vec::with_capacity(num_nodes);
        let mut extent = BoundingBox::empty();
        for chunk in data[..expected].chunks_exact(ENTRY_SIZE) {
            let entry = NodeEntry::from_bytes(chunk);
            extent.expand(&entry.bbox);
            entries.push(entry);
        }
        Ok(PackedRTree {
            extent,
            entries,
            num_items,
            num_nodes,
            node_size,
            level_bounds,
        })
    }

    /// Serializes all records in array order (root first).
    pub fn write_to(&self, out: &mut dyn Write) -> IndexResult<()> {
        for entry in &self.entries {
            entry.write_to(out)?;
        }
        Ok(())
    }

    /// Serialized size of this tree in bytes.
    pub fn size(&self) -> usize {
        self.num_nodes * ENTRY_SIZE
    }

    /// Union of all leaf boxes.
    pub fn extent(&self) -> BoundingBox {
        self.extent
    }

    /// Number of indexed features.
    pub fn num_items(&self) -> usize {
        self.num_items
    }

    /// Serialized size of a tree over `num_items` features without building
    /// it; callers use this to know how many bytes to skip before the
    /// feature stream begins.
    pub fn index_size(num_items: usize, node_size: u16) -> IndexResult<usize> {
        if node_size < 2 {
            return Err(IndexError::InvalidNodeSize(node_size));
        }
        if num_items == 0 {
            return Err(IndexError::Empty);
        }
        if num_items > MAX_ITEMS {
            return Err(IndexError::TooManyItems(num_items as u64));
        }
        let mut n = num_items;
        let mut num_nodes = n;
        loop {
            n = n.div_ceil(node_size as usize);
            num_nodes += n;
            if n == 1 {
                break;
            }
        }
        Ok(num_nodes * ENTRY_SIZE)
    }

    /// Per-level `(start, end)` node ranges in storage order: index 0 is the
    /// leaf level, the last element the root. `level_bounds[0].1` equals the
    /// total node count.
    fn generate_level_bounds(num_items: usize, node_size: u16) -> IndexResult<Vec<(usize, usize)>> {
        if node_size < 2 {
            return Err(IndexError::InvalidNodeSize(node_size));
        }
        if num_items == 0 {
            return Err(IndexError::Empty);
        }
        if num_items > MAX_ITEMS {
            return Err(IndexError::TooManyItems(num_items as u64));
        }

        // node counts per level, bottom-up
        let mut level_num_nodes = vec![num_items];
        let mut n = num_items;
        let mut num_nodes = n;
        loop {
            n = n.div_ceil(node_size as usize);
            num_nodes += n;
            level_num_nodes.push(n);
            if n == 1 {
                break;
            }
        }
        // start offsets per level in reversed storage order (root at 0)
        let mut level_offsets = Vec::with_capacity(level_num_nodes.len());
        let mut remaining = num_nodes;
        for size in &level_num_nodes {
            level_offsets.push(remaining - size);
            remaining -= size;
        }
        let level_bounds = level_offsets
            .iter()
            .zip(&level_num_nodes)
            .map(|(offset, size)| (*offset, offset + size))
            .collect();
        Ok(level_bounds)
    }

    /// Emits one parent per group of up to `node_size` siblings, per level,
    /// from the leaves upward. Parent payload = array index of first child.
    fn generate_nodes(&mut self) {
        for level in 0..self.level_bounds.len() - 1 {
            let (mut pos, end) = self.level_bounds[level];
            let mut parent_pos = self.level_bounds[level + 1].0;
            while pos < end {
                let mut parent = NodeEntry::placeholder(pos as u64);
                let mut child = 0;
                while child < self.node_size && pos < end {
                    parent.bbox.expand(&self.entries[pos].bbox);
                    pos += 1;
                    child += 1;
                }
                self.entries[parent_pos] = parent;
                parent_pos += 1;
            }
        }
    }

    /// Searches the materialized tree for leaves intersecting `query`.
    pub fn search(&self, query: &BoundingBox) -> Vec<SearchHit> {
        let leaf_start = self.level_bounds[0].0;
        let mut hits = Vec::new();
        // (node index, level) pairs; explicit stack instead of recursion
        let mut stack = vec![(0usize, self.level_bounds.len() - 1)];
        while let Some((node_index, level)) = stack.pop() {
            let is_leaf = node_index >= leaf_start;
            let end = (node_index + self.node_size as usize).min(self.level_bounds[level].1);
            for pos in node_index..end {
                let entry = &self.entries[pos];
                if !query.intersects(&entry.bbox) {
                    continue;
                }
                if is_leaf {
                    hits.push(SearchHit {
                        offset: entry.offset,
                        index: (pos - leaf_start) as u64,
                    });
                } else {
                    stack.push((entry.offset as usize, level - 1));
                }
            }
        }
        hits
    }

    /// Searches serialized index bytes without materializing the tree.
    pub fn search_buf(
        data: &[u8],
        num_items: usize,
        node_size: u16,
        query: &BoundingBox,
    ) -> IndexResult<Vec<SearchHit>> {
        let level_bounds = Self::generate_level_bounds(num_items, node_size)?;
        let num_nodes = level_bounds[0].1;
        let leaf_start = level_bounds[0].0;
        let expected = num_nodes * ENTRY_SIZE;
        if data.len() < expected {
            return Err(IndexError::Truncated {
                expected,
                actual: data.len(),
            });
        }

        let mut hits = Vec::new();
        let mut stack = vec![(0usize, level_bounds.len() - 1)];
        while let Some((node_index, level)) = stack.pop() {
            let is_leaf = node_index >= leaf_start;
            let end = (node_index + node_size as usize).min(level_bounds[level].1);
            for pos in node_index..end {
                let entry = NodeEntry::from_bytes(&data[pos * ENTRY_SIZE..]);
                if !query.intersects(&entry.bbox) {
                    continue;
                }
                if is_leaf {
                    hits.push(SearchHit {
                        offset: entry.offset,
                        index: (pos - leaf_start) as u64,
                    });
                } else {
                    stack.push((entry.offset as usize, level - 1));
                }
            }
        }
        Ok(hits)
    }

    /// Searches serialized index bytes through a forward-only reader.
    ///
    /// The reader must be positioned at the start of the index. Node visits
    /// become forward byte skips only; after every drained node the pending
    /// stack is re-sorted by ascending node index to keep the traversal a
    /// single forward pass. On return the cursor sits just past the index,
    /// at the start of the feature stream.
    pub fn stream_search<R: Read>(
        data: &mut R,
        num_items: usize,
        node_size: u16,
        query: &BoundingBox,
    ) -> IndexResult<Vec<SearchHit>> {
        let level_bounds = Self::generate_level_bounds(num_items, node_size)?;
        let num_nodes = level_bounds[0].1;
        let leaf_start = level_bounds[0].0;

        let mut hits = Vec::new();
        let mut cursor = 0usize;
        let mut stack = vec![(0usize, level_bounds.len() - 1)];
        while let Some((node_index, level)) = stack.pop() {
            let is_leaf = node_index >= leaf_start;
            let end = (node_index + node_size as usize).min(level_bounds[level].1);
            let node_start = node_index * ENTRY_SIZE;
            if node_start > cursor {
                skip_bytes(data, (node_start - cursor) as u64)?;
                cursor = node_start;
            }
            let mut record = [0u8; ENTRY_SIZE];
            for pos in node_index..end {
                data.read_exact(&mut record)?;
                cursor += ENTRY_SIZE;
                let entry = NodeEntry::from_bytes(&record);
                if !query.intersects(&entry.bbox) {
                    continue;
                }
                if is_leaf {
                    hits.push(SearchHit {
                        offset: entry.offset,
                        index: (pos - leaf_start) as u64,
                    });
                } else {
                    stack.push((entry.offset as usize, level - 1));
                }
            }
            // keep the pending work in ascending offset order; pop() then
            // always yields the nearest forward target
            stack.sort_by(|a, b| b.0.cmp(&a.0));
        }
        // leave the cursor at the start of the feature stream
        let index_len = num_nodes * ENTRY_SIZE;
        if index_len > cursor {
            skip_bytes(data, (index_len - cursor) as u64)?;
        }
        log::trace!("stream search: {} hits over {} nodes", hits.len(), num_nodes);
        Ok(hits)
    }

    /// Resolves one feature's byte offset by ordinal through a forward-only
    /// reader positioned at the start of the index.
    ///
    /// Reads exactly one payload field and skips everything else, leaving the
    /// cursor at the start of the feature stream.
    pub fn read_feature_offset<R: Read>(
        data: &mut R,
        num_items: usize,
        node_size: u16,
        ordinal: u64,
    ) -> IndexResult<u64> {
        if ordinal >= num_items as u64 {
            return Err(IndexError::OrdinalOutOfRange {
                ordinal,
                num_items: num_items as u64,
            });
        }
        let level_bounds = Self::generate_level_bounds(num_items, node_size)?;
        let index_len = (level_bounds[0].1 * ENTRY_SIZE) as u64;
        let leaf_start = (level_bounds[0].0 * ENTRY_SIZE) as u64;

        // skip straight to the payload field of the target leaf record
        let payload_pos = leaf_start + ordinal * ENTRY_SIZE as u64 + 8 * 4;
        skip_bytes(data, payload_pos)?;
        let mut buf = [0u8; 8];
        data.read_exact(&mut buf)?;
        let offset = u64::from_le_bytes(buf);
        skip_bytes(data, index_len - payload_pos - 8)?;
        Ok(offset)
    }
}

fn skip_bytes<R: Read>(data: &mut R, len: u64) -> IndexResult<()> {
    let skipped = std::io::copy(&mut data.take(len), &mut std::io::sink())?;
    if skipped < len {
        return Err(IndexError::Truncated {
            expected: len as usize,
            actual: skipped as usize,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hilbert::{calc_extent, hilbert_sort};

    fn entry(min_x: f64, min_y: f64, max_x: f64, max_y: f64, offset: u64) -> NodeEntry {
        NodeEntry::new(BoundingBox::new(min_x, min_y, max_x, max_y), offset)
    }

    fn build_sorted(mut leaves: Vec<NodeEntry>, node_size: u16) -> (Vec<NodeEntry>, PackedRTree) {
        let _ = env_logger::builder().is_test(true).try_init();
        let extent = calc_extent(&leaves);
        hilbert_sort(&mut leaves, &extent);
        let tree = PackedRTree::build(&leaves, node_size).unwrap();
        (leaves, tree)
    }

    #[test]
    fn test_two_items() {
        let (leaves, tree) = build_sorted(
            vec![entry(0.0, 0.0, 1.0, 1.0, 0), entry(2.0, 2.0, 3.0, 3.0, 40)],
            DEFAULT_NODE_SIZE,
        );
        let hits = tree.search(&BoundingBox::new(0.0, 0.0, 1.0, 1.0));
        assert_eq!(hits.len(), 1);
        assert!(leaves[hits[0].index as usize]
            .bbox
            .intersects(&BoundingBox::new(0.0, 0.0, 1.0, 1.0)));
    }

    #[test]
    fn test_three_item_scenario() {
        // Hilbert order of these boxes is [A, C, B].
        let a = entry(2.1, 2.1, 8.5, 5.5, 1000);
        let b = entry(10.0, 2.1, 12.0, 5.5, 500);
        let c = entry(10.0, 3.0, 12.0, 6.0, 200);
        let (leaves, tree) = build_sorted(vec![a, b, c], 16);
        assert_eq!(leaves[0].offset, 1000);
        assert_eq!(leaves[1].offset, 200);
        assert_eq!(leaves[2].offset, 500);

        let hits = tree.search(&BoundingBox::new(10.0, 2.1, 12.0, 2.999));
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].offset, 200);
        assert_eq!(hits[0].index, 1);
    }

    #[test]
    fn test_rejects_degenerate_input() {
        assert!(matches!(
            PackedRTree::build(&[entry(0.0, 0.0, 1.0, 1.0, 0)], 1),
            Err(IndexError::InvalidNodeSize(1))
        ));
        assert!(matches!(
            PackedRTree::build(&[], 16),
            Err(IndexError::Empty)
        ));
        assert!(matches!(PackedRTree::index_size(0, 16), Err(IndexError::Empty)));
    }

    #[test]
    fn test_index_size_matches_serialized_length() {
        for num_items in [1usize, 2, 15, 16, 17, 100, 1000] {
            for node_size in [2u16, 4, 16, 256] {
                let leaves: Vec<NodeEntry> = (0..num_items)
                    .map(|i| entry(i as f64, i as f64, i as f64 + 1.0, i as f64 + 1.0, i as u64))
                    .collect();
                let tree = PackedRTree::build(&leaves, node_size).unwrap();
                let mut data = Vec::new();
                tree.write_to(&mut data).unwrap();
                assert_eq!(
                    data.len(),
                    PackedRTree::index_size(num_items, node_size).unwrap(),
                    "{num_items} items, node size {node_size}"
                );
                assert_eq!(data.len(), tree.size());
            }
        }
    }

    #[test]
    fn test_roundtrip_is_byte_identical() {
        let leaves: Vec<NodeEntry> = (0..57)
            .map(|i| entry(i as f64, 0.0, i as f64 + 0.5, 2.0, i * 100))
            .collect();
        let (_, tree) = build_sorted(leaves, 4);
        let mut data = Vec::new();
        tree.write_to(&mut data).unwrap();

        let tree2 = PackedRTree::from_buf(&data, 57, 4).unwrap();
        let mut data2 = Vec::new();
        tree2.write_to(&mut data2).unwrap();
        assert_eq!(data, data2);
        assert_eq!(tree2.extent(), tree.extent());
    }

    #[test]
    fn test_from_buf_rejects_truncated_data() {
        let (_, tree) = build_sorted(
            vec![entry(0.0, 0.0, 1.0, 1.0, 0), entry(2.0, 2.0, 3.0, 3.0, 40)],
            16,
        );
        let mut data = Vec::new();
        tree.write_to(&mut data).unwrap();
        assert!(matches!(
            PackedRTree::from_buf(&data[..data.len() - 1], 2, 16),
            Err(IndexError::Truncated { .. })
        ));
    }

    #[test]
    fn test_search_variants_agree() {
        let mut leaves = Vec::new();
        leaves.push(entry(0.0, 0.0, 1.0, 1.0, 0));
        leaves.push(entry(2.0, 2.0, 3.0, 3.0, 1));
        for i in 0..5 {
            let base = 100.0 + i as f64;
            leaves.push(entry(base, base, base + 10.0, base + 10.0, 2 + i as u64));
        }
        for i in 0..12 {
            leaves.push(entry(10010.0, 10010.0, 10110.0, 10110.0, 7 + i as u64));
        }
        let (leaves, tree) = build_sorted(leaves, DEFAULT_NODE_SIZE);
        let query = BoundingBox::new(102.0, 102.0, 103.0, 103.0);

        let hits = tree.search(&query);
        assert_eq!(hits.len(), 4);
        for hit in &hits {
            assert!(leaves[hit.index as usize].bbox.intersects(&query));
        }

        let mut data = Vec::new();
        tree.write_to(&mut data).unwrap();

        let mut buf_hits = PackedRTree::search_buf(&data, leaves.len(), DEFAULT_NODE_SIZE, &query)
            .unwrap();
        let mut stream_hits = PackedRTree::stream_search(
            &mut data.as_slice(),
            leaves.len(),
            DEFAULT_NODE_SIZE,
            &query,
        )
        .unwrap();
        let mut mem_hits = hits;
        mem_hits.sort_by_key(|h| h.index);
        buf_hits.sort_by_key(|h| h.index);
        stream_hits.sort_by_key(|h| h.index);
        assert_eq!(mem_hits, buf_hits);
        assert_eq!(mem_hits, stream_hits);
    }

    #[test]
    fn test_stream_search_consumes_whole_index() {
        let (leaves, tree) = build_sorted(
            (0..40)
                .map(|i| entry(i as f64, 0.0, i as f64, 0.0, i))
                .collect(),
            4,
        );
        let mut data = Vec::new();
        tree.write_to(&mut data).unwrap();
        data.extend_from_slice(b"feature stream");

        let mut reader = data.as_slice();
        // matches nothing; the cursor must still land after the index
        let hits = PackedRTree::stream_search(
            &mut reader,
            leaves.len(),
            4,
            &BoundingBox::new(-10.0, -10.0, -5.0, -5.0),
        )
        .unwrap();
        assert!(hits.is_empty());
        assert_eq!(reader, b"feature stream");
    }

    #[test]
    fn test_random_search_soundness() {
        use rand::Rng;
        let mut rng = rand::thread_rng();
        let leaves: Vec<NodeEntry> = (0..1000)
            .map(|i| {
                let x: f64 = rng.gen_range(0.0..1000.0);
                let y: f64 = rng.gen_range(0.0..1000.0);
                entry(x, y, x + rng.gen_range(0.0..20.0), y + rng.gen_range(0.0..20.0), i)
            })
            .collect();
        let (leaves, tree) = build_sorted(leaves, DEFAULT_NODE_SIZE);

        for _ in 0..10 {
            let x: f64 = rng.gen_range(0.0..900.0);
            let y: f64 = rng.gen_range(0.0..900.0);
            let query = BoundingBox::new(x, y, x + 100.0, y + 100.0);
            let mut got: Vec<u64> = tree.search(&query).iter().map(|h| h.index).collect();
            got.sort_unstable();
            let expected: Vec<u64> = leaves
                .iter()
                .enumerate()
                .filter(|(_, leaf)| leaf.bbox.intersects(&query))
                .map(|(i, _)| i as u64)
                .collect();
            assert_eq!(got, expected);
        }
    }

    #[test]
    fn test_read_feature_offset() {
        let (leaves, tree) = build_sorted(
            (0..23)
                .map(|i| entry(i as f64, 1.0, i as f64 + 1.0, 2.0, i * 37))
                .collect(),
            4,
        );
        let mut data = Vec::new();
        tree.write_to(&mut data).unwrap();
        data.extend_from_slice(b"tail");

        for ordinal in [0u64, 1, 11, 22] {
            let mut reader = data.as_slice();
            let offset =
                PackedRTree::read_feature_offset(&mut reader, 23, 4, ordinal).unwrap();
            assert_eq!(offset, leaves[ordinal as usize].offset);
            assert_eq!(reader, b"tail");
        }

        let mut reader = data.as_slice();
        assert!(matches!(
            PackedRTree::read_feature_offset(&mut reader, 23, 4, 23),
            Err(IndexError::OrdinalOutOfRange { .. })
        ));
    }
}
