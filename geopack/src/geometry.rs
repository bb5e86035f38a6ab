//! Geometry types for the container format.
//!
//! ## Design Philosophy
//!
//! Rather than adapting a full geometry-suite object model, the container
//! works on lightweight value types: coordinates with optional Z/M
//! measures and one enum over the six supported geometry kinds. WKT
//! parsing and formatting (XY only) are provided for interchange and
//! testing; Z/M geometries are constructed through the API.

use serde::{Deserialize, Serialize};
use std::fmt::{self, Display, Write};

use crate::error::{GeopackError, GeopackResult};
use geopack_index::BoundingBox;

/// Geometry kind discriminator, also the wire tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum GeometryType {
    /// Mixed-geometry collections declare Unknown at the header level;
    /// individual records then carry their concrete kind.
    Unknown = 0,
    Point = 1,
    LineString = 2,
    Polygon = 3,
    MultiPoint = 4,
    MultiLineString = 5,
    MultiPolygon = 6,
}

impl GeometryType {
    pub fn from_u8(tag: u8) -> GeopackResult<GeometryType> {
        match tag {
            0 => Ok(GeometryType::Unknown),
            1 => Ok(GeometryType::Point),
            2 => Ok(GeometryType::LineString),
            3 => Ok(GeometryType::Polygon),
            4 => Ok(GeometryType::MultiPoint),
            5 => Ok(GeometryType::MultiLineString),
            6 => Ok(GeometryType::MultiPolygon),
            other => Err(GeopackError::UnsupportedGeometryKind(other)),
        }
    }
}

/// A coordinate with optional Z and M measures.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coord {
    pub x: f64,
    pub y: f64,
    pub z: Option<f64>,
    pub m: Option<f64>,
}

impl Coord {
    pub fn new(x: f64, y: f64) -> Coord {
        Coord {
            x,
            y,
            z: None,
            m: None,
        }
    }

    pub fn xyz(x: f64, y: f64, z: f64) -> Coord {
        Coord {
            x,
            y,
            z: Some(z),
            m: None,
        }
    }

    pub fn xyzm(x: f64, y: f64, z: f64, m: f64) -> Coord {
        Coord {
            x,
            y,
            z: Some(z),
            m: Some(m),
        }
    }
}

/// A polygon: one exterior ring plus zero or more interior rings (holes).
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Polygon {
    pub exterior: Vec<Coord>,
    pub holes: Vec<Vec<Coord>>,
}

impl Polygon {
    pub fn new(exterior: Vec<Coord>, holes: Vec<Vec<Coord>>) -> Polygon {
        Polygon { exterior, holes }
    }

    pub fn simple(exterior: Vec<Coord>) -> Polygon {
        Polygon {
            exterior,
            holes: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.exterior.is_empty()
    }

    /// All rings, exterior first.
    pub fn rings(&self) -> impl Iterator<Item = &Vec<Coord>> {
        std::iter::once(&self.exterior).chain(self.holes.iter())
    }

    /// Total number of points across all rings.
    pub fn num_points(&self) -> usize {
        self.rings().map(|ring| ring.len()).sum()
    }
}

/// A vector geometry of one of the six supported kinds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Geometry {
    Point(Option<Coord>),
    MultiPoint(Vec<Coord>),
    LineString(Vec<Coord>),
    MultiLineString(Vec<Vec<Coord>>),
    Polygon(Polygon),
    MultiPolygon(Vec<Polygon>),
}

impl Geometry {
    pub fn geometry_type(&self) -> GeometryType {
        match self {
            Geometry::Point(_) => GeometryType::Point,
            Geometry::MultiPoint(_) => GeometryType::MultiPoint,
            Geometry::LineString(_) => GeometryType::LineString,
            Geometry::MultiLineString(_) => GeometryType::MultiLineString,
            Geometry::Polygon(_) => GeometryType::Polygon,
            Geometry::MultiPolygon(_) => GeometryType::MultiPolygon,
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Geometry::Point(coord) => coord.is_none(),
            Geometry::MultiPoint(coords) => coords.is_empty(),
            Geometry::LineString(coords) => coords.is_empty(),
            Geometry::MultiLineString(lines) => lines.is_empty(),
            Geometry::Polygon(polygon) => polygon.is_empty(),
            Geometry::MultiPolygon(polygons) => polygons.is_empty(),
        }
    }

    /// Bounding box over all coordinates; the canonical empty box for empty
    /// geometries.
    pub fn bounding_box(&self) -> BoundingBox {
        let mut bbox = BoundingBox::empty();
        self.each_coord(&mut |c| {
            bbox.expand(&BoundingBox::new(c.x, c.y, c.x, c.y));
        });
        bbox
    }

    fn each_coord(&self, f: &mut dyn FnMut(&Coord)) {
        match self {
            Geometry::Point(coord) => {
                if let Some(c) = coord {
                    f(c);
                }
            }
            Geometry::MultiPoint(coords) | Geometry::LineString(coords) => {
                coords.iter().for_each(|c| f(c));
            }
            Geometry::MultiLineString(lines) => {
                lines.iter().flatten().for_each(|c| f(c));
            }
            Geometry::Polygon(polygon) => {
                polygon.rings().flatten().for_each(|c| f(c));
            }
            Geometry::MultiPolygon(polygons) => {
                polygons
                    .iter()
                    .flat_map(|p| p.rings())
                    .flatten()
                    .for_each(|c| f(c));
            }
        }
    }
}

// ============================================================================
// WKT formatting
// ============================================================================

fn fmt_coord(out: &mut String, c: &Coord) {
    let _ = write!(out, "{} {}", c.x, c.y);
}

fn fmt_coord_seq(out: &mut String, coords: &[Coord]) {
    out.push('(');
    for (i, c) in coords.iter().enumerate() {
        if i > 0 {
            out.push_str(", ");
        }
        fmt_coord(out, c);
    }
    out.push(')');
}

fn fmt_polygon_body(out: &mut String, polygon: &Polygon) {
    out.push('(');
    for (i, ring) in polygon.rings().enumerate() {
        if i > 0 {
            out.push_str(", ");
        }
        fmt_coord_seq(out, ring);
    }
    out.push(')');
}

impl Display for Geometry {
    /// Normalized WKT: uppercase tag, one space before the body, `EMPTY`
    /// for empty geometries, integral coordinates without a trailing `.0`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            let tag = match self {
                Geometry::Point(_) => "POINT",
                Geometry::MultiPoint(_) => "MULTIPOINT",
                Geometry::LineString(_) => "LINESTRING",
                Geometry::MultiLineString(_) => "MULTILINESTRING",
                Geometry::Polygon(_) => "POLYGON",
                Geometry::MultiPolygon(_) => "MULTIPOLYGON",
            };
            return write!(f, "{tag} EMPTY");
        }
        let mut body = String::new();
        let tag = match self {
            Geometry::Point(Some(c)) => {
                body.push('(');
                fmt_coord(&mut body, c);
                body.push(')');
                "POINT"
            }
            Geometry::Point(None) => unreachable!("empty handled above"),
            Geometry::MultiPoint(coords) => {
                body.push('(');
                for (i, c) in coords.iter().enumerate() {
                    if i > 0 {
                        body.push_str(", ");
                    }
                    body.push('(');
                    fmt_coord(&mut body, c);
                    body.push(')');
                }
                body.push(')');
                "MULTIPOINT"
            }
            Geometry::LineString(coords) => {
                fmt_coord_seq(&mut body, coords);
                "LINESTRING"
            }
            Geometry::MultiLineString(lines) => {
                body.push('(');
                for (i, line) in lines.iter().enumerate() {
                    if i > 0 {
                        body.push_str(", ");
                    }
                    fmt_coord_seq(&mut body, line);
                }
                body.push(')');
                "MULTILINESTRING"
            }
            Geometry::Polygon(polygon) => {
                fmt_polygon_body(&mut body, polygon);
                "POLYGON"
            }
            Geometry::MultiPolygon(polygons) => {
                body.push('(');
                for (i, polygon) in polygons.iter().enumerate() {
                    if i > 0 {
                        body.push_str(", ");
                    }
                    fmt_polygon_body(&mut body, polygon);
                }
                body.push(')');
                "MULTIPOLYGON"
            }
        };
        write!(f, "{tag} {body}")
    }
}

// ============================================================================
// WKT parsing
// ============================================================================

/// Parses a WKT string into a [`Geometry`].
///
/// Supports the six geometry kinds, `EMPTY` bodies and XY coordinates.
///
/// # Example
///
/// ```rust
/// use geopack::geometry::parse_wkt;
///
/// let line = parse_wkt("LINESTRING (0 0, 10 10, 20 20)").unwrap();
/// assert_eq!(line.to_string(), "LINESTRING (0 0, 10 10, 20 20)");
/// ```
pub fn parse_wkt(wkt: &str) -> GeopackResult<Geometry> {
    let wkt = wkt.trim();
    let split = wkt
        .find(|c: char| c == '(' || c.is_whitespace())
        .unwrap_or(wkt.len());
    let tag = wkt[..split].to_ascii_uppercase();
    let body = wkt[split..].trim();

    if body.eq_ignore_ascii_case("EMPTY") {
        return Ok(match tag.as_str() {
            "POINT" => Geometry::Point(None),
            "MULTIPOINT" => Geometry::MultiPoint(Vec::new()),
            "LINESTRING" => Geometry::LineString(Vec::new()),
            "MULTILINESTRING" => Geometry::MultiLineString(Vec::new()),
            "POLYGON" => Geometry::Polygon(Polygon::default()),
            "MULTIPOLYGON" => Geometry::MultiPolygon(Vec::new()),
            _ => return Err(GeopackError::WktParse(format!("unknown tag: {tag}"))),
        });
    }

    match tag.as_str() {
        "POINT" => {
            let coords = parse_coord_seq(strip_parens(body)?)?;
            if coords.len() != 1 {
                return Err(GeopackError::WktParse(
                    "POINT must have exactly one coordinate".to_string(),
                ));
            }
            Ok(Geometry::Point(Some(coords[0])))
        }
        "LINESTRING" => Ok(Geometry::LineString(parse_coord_seq(strip_parens(body)?)?)),
        "POLYGON" => Ok(Geometry::Polygon(parse_polygon_body(body)?)),
        "MULTIPOINT" => {
            let inner = strip_parens(body)?;
            let coords = split_top_level(inner)
                .map(|group| {
                    let group = group.trim();
                    // both (x y), (x y) and x y, x y forms are accepted
                    let group = if group.starts_with('(') {
                        strip_parens(group)?
                    } else {
                        group
                    };
                    let coords = parse_coord_seq(group)?;
                    if coords.len() != 1 {
                        return Err(GeopackError::WktParse(
                            "MULTIPOINT member must be a single coordinate".to_string(),
                        ));
                    }
                    Ok(coords[0])
                })
                .collect::<GeopackResult<Vec<Coord>>>()?;
            Ok(Geometry::MultiPoint(coords))
        }
        "MULTILINESTRING" => {
            let inner = strip_parens(body)?;
            let lines = split_top_level(inner)
                .map(|group| parse_coord_seq(strip_parens(group.trim())?))
                .collect::<GeopackResult<Vec<_>>>()?;
            Ok(Geometry::MultiLineString(lines))
        }
        "MULTIPOLYGON" => {
            let inner = strip_parens(body)?;
            let polygons = split_top_level(inner)
                .map(|group| parse_polygon_body(group.trim()))
                .collect::<GeopackResult<Vec<_>>>()?;
            Ok(Geometry::MultiPolygon(polygons))
        }
        _ => Err(GeopackError::WktParse(format!("unknown tag: {tag}"))),
    }
}

fn parse_polygon_body(body: &str) -> GeopackResult<Polygon> {
    let inner = strip_parens(body)?;
    let mut rings = split_top_level(inner)
        .map(|group| parse_coord_seq(strip_parens(group.trim())?))
        .collect::<GeopackResult<Vec<_>>>()?;
    if rings.is_empty() {
        return Err(GeopackError::WktParse(
            "POLYGON must have at least one ring".to_string(),
        ));
    }
    let exterior = rings.remove(0);
    Ok(Polygon::new(exterior, rings))
}

/// Removes one matching outer paren pair.
fn strip_parens(s: &str) -> GeopackResult<&str> {
    let s = s.trim();
    match s.strip_prefix('(').and_then(|t| t.strip_suffix(')')) {
        Some(inner) => Ok(inner),
        None => Err(GeopackError::WktParse(format!(
            "expected parenthesized group, got: {s}"
        ))),
    }
}

/// Splits at commas that sit outside any nested parens.
fn split_top_level(s: &str) -> impl Iterator<Item = &str> {
    let mut depth = 0i32;
    let mut start = 0usize;
    let mut groups = Vec::new();
    for (i, ch) in s.char_indices() {
        match ch {
            '(' => depth += 1,
            ')' => depth -= 1,
            ',' if depth == 0 => {
                groups.push(&s[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    groups.push(&s[start..]);
    groups.into_iter()
}

/// Parses `x y, x y, ...` (XY only).
fn parse_coord_seq(s: &str) -> GeopackResult<Vec<Coord>> {
    split_top_level(s)
        .map(|pair| {
            let nums = pair
                .split_whitespace()
                .map(|tok| {
                    tok.parse::<f64>()
                        .map_err(|_| GeopackError::WktParse(format!("bad number: {tok}")))
                })
                .collect::<GeopackResult<Vec<f64>>>()?;
            if nums.len() != 2 {
                return Err(GeopackError::WktParse(format!(
                    "expected 'x y' pair, got: {}",
                    pair.trim()
                )));
            }
            Ok(Coord::new(nums[0], nums[1]))
        })
        .collect()
}
