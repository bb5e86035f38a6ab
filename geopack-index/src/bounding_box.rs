//! Axis-aligned bounding boxes.
//!
//! `BoundingBox` is the value type everything else in this crate is built
//! from: index records aggregate boxes bottom-up with [`BoundingBox::expand`]
//! and queries are answered with [`BoundingBox::intersects`].

use std::hash::Hash;

/// A 2D bounding box represented by minimum and maximum coordinates.
///
/// Boxes are plain values and are copied freely. A freshly created box must
/// satisfy `min_x <= max_x` and `min_y <= max_y`; the only exception is the
/// canonical empty box returned by [`BoundingBox::empty`], which has inverted
/// infinite bounds and never intersects anything.
///
/// # Examples
///
/// ```rust
/// use geopack_index::BoundingBox;
///
/// let mut a = BoundingBox::new(0.0, 0.0, 10.0, 10.0);
/// let b = BoundingBox::new(5.0, 5.0, 20.0, 20.0);
/// assert!(a.intersects(&b));
///
/// a.expand(&b);
/// assert_eq!(a, BoundingBox::new(0.0, 0.0, 20.0, 20.0));
/// ```
#[derive(Clone, Copy, PartialEq, Debug, serde::Deserialize, serde::Serialize)]
pub struct BoundingBox {
    /// Minimum X coordinate
    pub min_x: f64,
    /// Minimum Y coordinate
    pub min_y: f64,
    /// Maximum X coordinate
    pub max_x: f64,
    /// Maximum Y coordinate
    pub max_y: f64,
}

impl Eq for BoundingBox {}

impl Hash for BoundingBox {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.min_x.to_bits().hash(state);
        self.min_y.to_bits().hash(state);
        self.max_x.to_bits().hash(state);
        self.max_y.to_bits().hash(state);
    }
}

impl std::fmt::Display for BoundingBox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "BoundingBox({}, {}, {}, {})",
            self.min_x, self.min_y, self.max_x, self.max_y
        )
    }
}

impl Default for BoundingBox {
    fn default() -> Self {
        BoundingBox::empty()
    }
}

impl BoundingBox {
    /// Creates a new bounding box with the specified coordinates.
    pub fn new(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> BoundingBox {
        BoundingBox {
            min_x,
            min_y,
            max_x,
            max_y,
        }
    }

    /// Creates the canonical empty box.
    ///
    /// The empty box is the identity element of [`expand`](Self::expand) and
    /// fails every [`intersects`](Self::intersects) test.
    pub fn empty() -> BoundingBox {
        BoundingBox {
            min_x: f64::INFINITY,
            min_y: f64::INFINITY,
            max_x: f64::NEG_INFINITY,
            max_y: f64::NEG_INFINITY,
        }
    }

    /// Returns true if this is the canonical empty box.
    pub fn is_empty(&self) -> bool {
        self.min_x > self.max_x
    }

    /// Width of the bounding box (max_x - min_x).
    pub fn width(&self) -> f64 {
        self.max_x - self.min_x
    }

    /// Height of the bounding box (max_y - min_y).
    pub fn height(&self) -> f64 {
        self.max_y - self.min_y
    }

    /// Center point of the bounding box.
    pub fn center(&self) -> (f64, f64) {
        (
            (self.min_x + self.max_x) / 2.0,
            (self.min_y + self.max_y) / 2.0,
        )
    }

    /// Grows this box to the union of itself and `other`.
    pub fn expand(&mut self, other: &BoundingBox) {
        if other.min_x < self.min_x {
            self.min_x = other.min_x;
        }
        if other.min_y < self.min_y {
            self.min_y = other.min_y;
        }
        if other.max_x > self.max_x {
            self.max_x = other.max_x;
        }
        if other.max_y > self.max_y {
            self.max_y = other.max_y;
        }
    }

    /// Returns the union of this box and `other` without mutating either.
    pub fn union(&self, other: &BoundingBox) -> BoundingBox {
        let mut result = *self;
        result.expand(other);
        result
    }

    /// Checks whether this box intersects `other`.
    ///
    /// Touching edges count as intersecting.
    pub fn intersects(&self, other: &BoundingBox) -> bool {
        if other.min_x > self.max_x {
            return false;
        }
        if other.min_y > self.max_y {
            return false;
        }
        if other.max_x < self.min_x {
            return false;
        }
        if other.max_y < self.min_y {
            return false;
        }
        true
    }
}
