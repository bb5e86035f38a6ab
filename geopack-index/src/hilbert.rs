//! Hilbert curve ordering for spatial locality.
//!
//! The Hilbert curve is a continuous fractal space-filling curve that maps
//! 2D coordinates to a 1D index while preserving spatial locality. Leaf
//! entries sorted by their Hilbert distance pack into R-tree nodes with
//! near-optimal overlap, which is the whole trick behind the bulk-loaded
//! index in [`crate::packed_rtree`].
//!
//! The curve is evaluated at a fixed 16-bit resolution per axis; positions
//! are only ever used to order entries, so higher precision buys nothing.

use crate::bounding_box::BoundingBox;
use crate::packed_rtree::NodeEntry;

/// Maximum coordinate value on either curve axis (16-bit resolution).
pub const HILBERT_MAX: u32 = (1 << 16) - 1;

/// Computes the Hilbert curve distance of a discrete grid coordinate.
///
/// Branch-free variant working in four transformation passes at shift
/// widths 1, 2, 4 and 8, followed by a bit interleave. Based on public
/// domain code at <https://github.com/rawrunprotected/hilbert_curves>.
pub fn hilbert_index(x: u32, y: u32) -> u32 {
    let a = x ^ y;
    let b = 0xFFFF ^ a;
    let c = 0xFFFF ^ (x | y);
    let d = x & (y ^ 0xFFFF);

    let mut aa = a | (b >> 1);
    let mut bb = (a >> 1) ^ a;
    let mut cc = ((c >> 1) ^ (b & (d >> 1))) ^ c;
    let mut dd = ((a & (c >> 1)) ^ (d >> 1)) ^ d;

    let (a, b, c, d) = (aa, bb, cc, dd);
    aa = (a & (a >> 2)) ^ (b & (b >> 2));
    bb = (a & (b >> 2)) ^ (b & ((a ^ b) >> 2));
    cc ^= (a & (c >> 2)) ^ (b & (d >> 2));
    dd ^= (b & (c >> 2)) ^ ((a ^ b) & (d >> 2));

    let (a, b, c, d) = (aa, bb, cc, dd);
    aa = (a & (a >> 4)) ^ (b & (b >> 4));
    bb = (a & (b >> 4)) ^ (b & ((a ^ b) >> 4));
    cc ^= (a & (c >> 4)) ^ (b & (d >> 4));
    dd ^= (b & (c >> 4)) ^ ((a ^ b) & (d >> 4));

    let (a, b, c, d) = (aa, bb, cc, dd);
    cc ^= (a & (c >> 8)) ^ (b & (d >> 8));
    dd ^= (b & (c >> 8)) ^ ((a ^ b) & (d >> 8));

    let a = cc ^ (cc >> 1);
    let b = dd ^ (dd >> 1);

    let mut i0 = x ^ y;
    let mut i1 = b | (0xFFFF ^ (i0 | a));

    i0 = (i0 | (i0 << 8)) & 0x00FF_00FF;
    i0 = (i0 | (i0 << 4)) & 0x0F0F_0F0F;
    i0 = (i0 | (i0 << 2)) & 0x3333_3333;
    i0 = (i0 | (i0 << 1)) & 0x5555_5555;

    i1 = (i1 | (i1 << 8)) & 0x00FF_00FF;
    i1 = (i1 | (i1 << 4)) & 0x0F0F_0F0F;
    i1 = (i1 | (i1 << 2)) & 0x3333_3333;
    i1 = (i1 | (i1 << 1)) & 0x5555_5555;

    (i1 << 1) | i0
}

/// Hilbert distance of a box center within the global extent.
///
/// The center is scaled into `[0, HILBERT_MAX]` relative to `extent`. A
/// degenerate extent axis (zero width or height) maps to 0 on that axis,
/// collapsing the order to rank by the other axis.
pub fn hilbert_of_box(bbox: &BoundingBox, extent: &BoundingBox) -> u32 {
    let (cx, cy) = bbox.center();
    let x = if extent.width() > 0.0 {
        (HILBERT_MAX as f64 * (cx - extent.min_x) / extent.width()).floor() as u32
    } else {
        0
    };
    let y = if extent.height() > 0.0 {
        (HILBERT_MAX as f64 * (cy - extent.min_y) / extent.height()).floor() as u32
    } else {
        0
    };
    hilbert_index(x, y)
}

/// Sorts entries by ascending Hilbert distance within `extent`.
///
/// The sort is stable, but tie order carries no meaning for callers.
pub fn hilbert_sort(entries: &mut [NodeEntry], extent: &BoundingBox) {
    entries.sort_by_key(|entry| hilbert_of_box(&entry.bbox, extent));
}

/// Union of all entry boxes, used as the sort extent.
pub fn calc_extent(entries: &[NodeEntry]) -> BoundingBox {
    entries.iter().fold(BoundingBox::empty(), |mut acc, entry| {
        acc.expand(&entry.bbox);
        acc
    })
}
