//! Geometry codec: nested geometries to flat arrays and back.
//!
//! Geometries are stored as flat coordinate arrays with ring/part boundary
//! metadata instead of nested structures:
//!
//! - `xy` holds all coordinates in order, two doubles per point; `z`/`m`
//!   hold one double per point when the container declares those dimensions
//! - `ends` holds cumulative point counts marking where one ring or line
//!   component ends and the next begins
//! - MultiPolygon alone nests: each constituent polygon becomes a
//!   recursive part record, and the parent carries no flat data
//!
//! A record is either flat or nested, never both; which one is selected
//! purely by geometry kind. Z and M are carried uniformly through every
//! path, including recursive parts.
//!
//! ## Wire layout (little-endian)
//!
//! ```text
//! type: u8   flags: u8 (1=ends, 2=z, 4=m, 8=parts)
//! parts set:   u32 part count, then each part as a full record
//! parts unset: xy f64-vec, then [ends u32-vec] [z f64-vec] [m f64-vec]
//! ```
//!
//! Vectors are u32-count-prefixed (see [`crate::table`]).

use crate::error::{GeopackError, GeopackResult};
use crate::geometry::{Coord, Geometry, GeometryType, Polygon};
use crate::table::{TableBuilder, TableReader};

const FLAG_ENDS: u8 = 1;
const FLAG_Z: u8 = 2;
const FLAG_M: u8 = 4;
const FLAG_PARTS: u8 = 8;

/// Dimensions declared at the container level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
pub struct Dimensions {
    pub has_z: bool,
    pub has_m: bool,
}

impl Dimensions {
    pub fn xy() -> Dimensions {
        Dimensions::default()
    }

    pub fn xyz() -> Dimensions {
        Dimensions {
            has_z: true,
            has_m: false,
        }
    }

    pub fn xyzm() -> Dimensions {
        Dimensions {
            has_z: true,
            has_m: true,
        }
    }
}

/// A geometry flattened for storage.
#[derive(Debug, Clone, PartialEq)]
pub struct EncodedGeometry {
    pub geometry_type: GeometryType,
    /// Flat coordinates, two doubles per point.
    pub xy: Vec<f64>,
    /// One value per point, present iff the container has Z.
    pub z: Option<Vec<f64>>,
    /// One value per point, present iff the container has M.
    pub m: Option<Vec<f64>>,
    /// Cumulative point counts per ring/component, when more than one.
    pub ends: Option<Vec<u32>>,
    /// Recursive parts; populated only for multi-part MultiPolygon.
    pub parts: Vec<EncodedGeometry>,
}

impl EncodedGeometry {
    fn flat(geometry_type: GeometryType) -> EncodedGeometry {
        EncodedGeometry {
            geometry_type,
            xy: Vec::new(),
            z: None,
            m: None,
            ends: None,
            parts: Vec::new(),
        }
    }

    fn num_points(&self) -> usize {
        self.xy.len() / 2
    }
}

// ============================================================================
// Encoding
// ============================================================================

/// Flattens a geometry for storage under the given dimensions.
pub fn encode_geometry(geometry: &Geometry, dims: Dimensions) -> EncodedGeometry {
    let kind = geometry.geometry_type();
    match geometry {
        Geometry::Point(coord) => {
            let mut encoded = EncodedGeometry::flat(kind);
            if let Some(c) = coord {
                push_coords(&mut encoded, std::slice::from_ref(c), dims);
            }
            encoded
        }
        Geometry::MultiPoint(coords) | Geometry::LineString(coords) => {
            let mut encoded = EncodedGeometry::flat(kind);
            push_coords(&mut encoded, coords, dims);
            encoded
        }
        Geometry::MultiLineString(lines) => {
            let mut encoded = EncodedGeometry::flat(kind);
            for line in lines {
                push_coords(&mut encoded, line, dims);
            }
            // a single component needs no slicing metadata
            if lines.len() > 1 {
                let mut end = 0u32;
                encoded.ends = Some(
                    lines
                        .iter()
                        .map(|line| {
                            end += line.len() as u32;
                            end
                        })
                        .collect(),
                );
            }
            encoded
        }
        Geometry::Polygon(polygon) => encode_polygon(polygon, dims),
        Geometry::MultiPolygon(polygons) => {
            if polygons.len() == 1 {
                // promotable representation: a bare polygon record
                let mut encoded = encode_polygon(&polygons[0], dims);
                encoded.geometry_type = kind;
                return encoded;
            }
            let mut encoded = EncodedGeometry::flat(kind);
            encoded.parts = polygons
                .iter()
                .map(|polygon| encode_polygon(polygon, dims))
                .collect();
            encoded
        }
    }
}

fn encode_polygon(polygon: &Polygon, dims: Dimensions) -> EncodedGeometry {
    let mut encoded = EncodedGeometry::flat(GeometryType::Polygon);
    for ring in polygon.rings() {
        push_coords(&mut encoded, ring, dims);
    }
    // single-ring polygons omit ends
    if !polygon.holes.is_empty() {
        let mut end = 0u32;
        encoded.ends = Some(
            polygon
                .rings()
                .map(|ring| {
                    end += ring.len() as u32;
                    end
                })
                .collect(),
        );
    }
    encoded
}

fn push_coords(encoded: &mut EncodedGeometry, coords: &[Coord], dims: Dimensions) {
    for c in coords {
        encoded.xy.push(c.x);
        encoded.xy.push(c.y);
        if dims.has_z {
            encoded.z.get_or_insert_with(Vec::new).push(c.z.unwrap_or(0.0));
        }
        if dims.has_m {
            encoded.m.get_or_insert_with(Vec::new).push(c.m.unwrap_or(0.0));
        }
    }
    if coords.is_empty() {
        // dimension arrays stay aligned with xy even for empty inputs
        if dims.has_z {
            encoded.z.get_or_insert_with(Vec::new);
        }
        if dims.has_m {
            encoded.m.get_or_insert_with(Vec::new);
        }
    }
}

// ============================================================================
// Decoding
// ============================================================================

/// Rebuilds a geometry from its flattened form.
///
/// Fails fast on any disagreement between the ends/parts arrays and the
/// coordinate counts rather than silently truncating.
pub fn decode_geometry(encoded: &EncodedGeometry) -> GeopackResult<Geometry> {
    validate(encoded)?;
    match encoded.geometry_type {
        GeometryType::Unknown => Err(GeopackError::UnsupportedGeometryKind(0)),
        GeometryType::Point => {
            let mut coords = collect_coords(encoded);
            match coords.len() {
                0 => Ok(Geometry::Point(None)),
                1 => Ok(Geometry::Point(Some(coords.remove(0)))),
                n => Err(GeopackError::InconsistentGeometry(format!(
                    "point record with {n} coordinates"
                ))),
            }
        }
        GeometryType::MultiPoint => Ok(Geometry::MultiPoint(collect_coords(encoded))),
        GeometryType::LineString => Ok(Geometry::LineString(collect_coords(encoded))),
        GeometryType::MultiLineString => {
            let coords = collect_coords(encoded);
            match &encoded.ends {
                Some(ends) if ends.len() > 1 => {
                    Ok(Geometry::MultiLineString(slice_rings(coords, ends)?))
                }
                _ if coords.is_empty() => Ok(Geometry::MultiLineString(Vec::new())),
                _ => Ok(Geometry::MultiLineString(vec![coords])),
            }
        }
        GeometryType::Polygon => Ok(Geometry::Polygon(decode_polygon(encoded)?)),
        GeometryType::MultiPolygon => {
            if !encoded.parts.is_empty() {
                let polygons = encoded
                    .parts
                    .iter()
                    .map(|part| {
                        if part.geometry_type != GeometryType::Polygon {
                            return Err(GeopackError::InconsistentGeometry(format!(
                                "multipolygon part with kind {:?}",
                                part.geometry_type
                            )));
                        }
                        validate(part)?;
                        decode_polygon(part)
                    })
                    .collect::<GeopackResult<Vec<Polygon>>>()?;
                Ok(Geometry::MultiPolygon(polygons))
            } else if encoded.num_points() == 0 {
                Ok(Geometry::MultiPolygon(Vec::new()))
            } else {
                // the promoted single-polygon representation
                Ok(Geometry::MultiPolygon(vec![decode_polygon(encoded)?]))
            }
        }
    }
}

fn decode_polygon(encoded: &EncodedGeometry) -> GeopackResult<Polygon> {
    let coords = collect_coords(encoded);
    match &encoded.ends {
        Some(ends) if ends.len() > 1 => {
            let mut rings = slice_rings(coords, ends)?;
            let exterior = rings.remove(0);
            Ok(Polygon::new(exterior, rings))
        }
        _ => Ok(Polygon::simple(coords)),
    }
}

fn collect_coords(encoded: &EncodedGeometry) -> Vec<Coord> {
    let num_points = encoded.num_points();
    (0..num_points)
        .map(|i| Coord {
            x: encoded.xy[2 * i],
            y: encoded.xy[2 * i + 1],
            z: encoded.z.as_ref().map(|z| z[i]),
            m: encoded.m.as_ref().map(|m| m[i]),
        })
        .collect()
}

/// Slices `[previous_end, end)` per ring.
fn slice_rings(coords: Vec<Coord>, ends: &[u32]) -> GeopackResult<Vec<Vec<Coord>>> {
    let mut rings = Vec::with_capacity(ends.len());
    let mut start = 0usize;
    for end in ends {
        let end = *end as usize;
        if end < start || end > coords.len() {
            return Err(GeopackError::InconsistentGeometry(format!(
                "ring end {end} out of order (start {start}, {} points)",
                coords.len()
            )));
        }
        rings.push(coords[start..end].to_vec());
        start = end;
    }
    Ok(rings)
}

fn validate(encoded: &EncodedGeometry) -> GeopackResult<()> {
    if encoded.xy.len() % 2 != 0 {
        return Err(GeopackError::InconsistentGeometry(format!(
            "odd xy length {}",
            encoded.xy.len()
        )));
    }
    let num_points = encoded.num_points();
    if !encoded.parts.is_empty() {
        if encoded.geometry_type != GeometryType::MultiPolygon {
            return Err(GeopackError::InconsistentGeometry(format!(
                "kind {:?} cannot carry parts",
                encoded.geometry_type
            )));
        }
        if num_points > 0 || encoded.ends.is_some() {
            return Err(GeopackError::InconsistentGeometry(
                "record carries both flat data and parts".to_string(),
            ));
        }
        return Ok(());
    }
    if let Some(ends) = &encoded.ends {
        if ends.is_empty() && num_points > 0 {
            return Err(GeopackError::InconsistentGeometry(
                "empty ends array over nonzero coordinates".to_string(),
            ));
        }
        if let Some(last) = ends.last() {
            if *last as usize != num_points {
                return Err(GeopackError::InconsistentGeometry(format!(
                    "final end {last} disagrees with {num_points} points"
                )));
            }
        }
    }
    for (name, values) in [("z", &encoded.z), ("m", &encoded.m)] {
        if let Some(values) = values {
            if values.len() != num_points {
                return Err(GeopackError::InconsistentGeometry(format!(
                    "{name} length {} disagrees with {num_points} points",
                    values.len()
                )));
            }
        }
    }
    Ok(())
}

// ============================================================================
// Wire format
// ============================================================================

/// Appends the wire form of an encoded geometry record.
pub(crate) fn write_geometry(builder: &mut TableBuilder, encoded: &EncodedGeometry) {
    builder.put_u8(encoded.geometry_type as u8);
    let mut flags = 0u8;
    if encoded.ends.is_some() {
        flags |= FLAG_ENDS;
    }
    if encoded.z.is_some() {
        flags |= FLAG_Z;
    }
    if encoded.m.is_some() {
        flags |= FLAG_M;
    }
    if !encoded.parts.is_empty() {
        flags |= FLAG_PARTS;
    }
    builder.put_u8(flags);
    if !encoded.parts.is_empty() {
        builder.put_u32(encoded.parts.len() as u32);
        for part in &encoded.parts {
            write_geometry(builder, part);
        }
        return;
    }
    builder.put_f64_vec(&encoded.xy);
    if let Some(ends) = &encoded.ends {
        builder.put_u32_vec(ends);
    }
    if let Some(z) = &encoded.z {
        builder.put_f64_vec(z);
    }
    if let Some(m) = &encoded.m {
        builder.put_f64_vec(m);
    }
}

/// Reads one wire geometry record.
pub(crate) fn read_geometry(reader: &mut TableReader<'_>) -> GeopackResult<EncodedGeometry> {
    read_geometry_at(reader, 0)
}

fn read_geometry_at(reader: &mut TableReader<'_>, depth: u8) -> GeopackResult<EncodedGeometry> {
    let geometry_type = GeometryType::from_u8(reader.read_u8("geometry type")?)?;
    let flags = reader.read_u8("geometry flags")?;
    let mut encoded = EncodedGeometry::flat(geometry_type);
    if flags & FLAG_PARTS != 0 {
        // parts hold flat polygon records only; deeper nesting is never
        // produced and reading it unbounded would recurse on input data
        if depth > 0 {
            return Err(GeopackError::InconsistentGeometry(
                "part record carries nested parts".to_string(),
            ));
        }
        let count = reader.read_u32("part count")? as usize;
        encoded.parts = (0..count)
            .map(|_| read_geometry_at(reader, depth + 1))
            .collect::<GeopackResult<Vec<_>>>()?;
        return Ok(encoded);
    }
    encoded.xy = reader.read_f64_vec("xy")?;
    if flags & FLAG_ENDS != 0 {
        encoded.ends = Some(reader.read_u32_vec("ends")?);
    }
    if flags & FLAG_Z != 0 {
        encoded.z = Some(reader.read_f64_vec("z")?);
    }
    if flags & FLAG_M != 0 {
        encoded.m = Some(reader.read_f64_vec("m")?);
    }
    Ok(encoded)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::parse_wkt;

    fn wire_roundtrip(encoded: &EncodedGeometry) -> EncodedGeometry {
        let mut builder = TableBuilder::new();
        write_geometry(&mut builder, encoded);
        let bytes = builder.into_bytes();
        let mut reader = TableReader::new(&bytes);
        let back = read_geometry(&mut reader).unwrap();
        assert_eq!(reader.remaining(), 0);
        back
    }

    fn assert_roundtrip(geometry: Geometry, dims: Dimensions) {
        let encoded = encode_geometry(&geometry, dims);
        let back = decode_geometry(&wire_roundtrip(&encoded)).unwrap();
        assert_eq!(back, geometry);
    }

    #[test]
    fn test_roundtrip_all_kinds_xy() {
        for wkt in [
            "POINT (30 10)",
            "MULTIPOINT ((10 40), (40 30))",
            "LINESTRING (30 10, 10 30, 40 40)",
            "MULTILINESTRING ((10 10, 20 20, 10 40), (40 40, 30 30, 40 20, 30 10))",
            "MULTILINESTRING ((10 10, 20 20))",
            "POLYGON ((30 10, 40 40, 20 40, 10 20, 30 10))",
            "POLYGON ((35 10, 45 45, 15 40, 10 20, 35 10), (20 30, 35 35, 30 20, 20 30))",
            "MULTIPOLYGON (((30 20, 45 40, 10 40, 30 20)), ((15 5, 40 10, 10 20, 5 10, 15 5)))",
            "MULTIPOLYGON (((40 40, 20 45, 45 30, 40 40)), \
             ((20 35, 10 30, 10 10, 30 5, 45 20, 20 35), (30 20, 20 15, 20 25, 30 20)))",
        ] {
            assert_roundtrip(parse_wkt(wkt).unwrap(), Dimensions::xy());
        }
    }

    #[test]
    fn test_roundtrip_empties() {
        for wkt in [
            "POINT EMPTY",
            "MULTIPOINT EMPTY",
            "LINESTRING EMPTY",
            "MULTILINESTRING EMPTY",
            "POLYGON EMPTY",
            "MULTIPOLYGON EMPTY",
        ] {
            assert_roundtrip(parse_wkt(wkt).unwrap(), Dimensions::xy());
            assert_roundtrip(parse_wkt(wkt).unwrap(), Dimensions::xyzm());
        }
    }

    #[test]
    fn test_roundtrip_with_z_and_m() {
        let line = Geometry::LineString(vec![
            Coord::xyzm(0.0, 0.0, 1.0, 10.0),
            Coord::xyzm(5.0, 5.0, 2.0, 20.0),
        ]);
        assert_roundtrip(line, Dimensions::xyzm());

        let point = Geometry::Point(Some(Coord::xyz(1.0, 2.0, 3.0)));
        assert_roundtrip(point, Dimensions::xyz());
    }

    #[test]
    fn test_z_m_flow_through_multipolygon_parts() {
        let ring = |base: f64| {
            vec![
                Coord::xyzm(base, base, base + 0.1, base + 0.2),
                Coord::xyzm(base + 1.0, base, base + 0.1, base + 0.2),
                Coord::xyzm(base + 1.0, base + 1.0, base + 0.1, base + 0.2),
                Coord::xyzm(base, base, base + 0.1, base + 0.2),
            ]
        };
        let geometry = Geometry::MultiPolygon(vec![
            Polygon::simple(ring(0.0)),
            Polygon::simple(ring(10.0)),
        ]);
        let encoded = encode_geometry(&geometry, Dimensions::xyzm());
        assert_eq!(encoded.parts.len(), 2);
        for part in &encoded.parts {
            assert!(part.z.is_some());
            assert!(part.m.is_some());
        }
        assert_roundtrip(geometry, Dimensions::xyzm());
    }

    #[test]
    fn test_single_ring_polygon_omits_ends() {
        let geometry = parse_wkt("POLYGON ((30 10, 40 40, 20 40, 30 10))").unwrap();
        let encoded = encode_geometry(&geometry, Dimensions::xy());
        assert!(encoded.ends.is_none());
    }

    #[test]
    fn test_single_component_multilinestring_omits_ends() {
        let geometry = parse_wkt("MULTILINESTRING ((10 10, 20 20))").unwrap();
        let encoded = encode_geometry(&geometry, Dimensions::xy());
        assert!(encoded.ends.is_none());
        // decodes back as a one-component multi, not a bare linestring
        assert_eq!(decode_geometry(&encoded).unwrap(), geometry);
    }

    #[test]
    fn test_single_polygon_multipolygon_promotes() {
        let geometry =
            parse_wkt("MULTIPOLYGON (((30 20, 45 40, 10 40, 30 20)))").unwrap();
        let encoded = encode_geometry(&geometry, Dimensions::xy());
        assert!(encoded.parts.is_empty());
        assert!(!encoded.xy.is_empty());
        assert_eq!(decode_geometry(&encoded).unwrap(), geometry);
    }

    #[test]
    fn test_polygon_hole_structure_survives() {
        let wkt =
            "POLYGON ((35 10, 45 45, 15 40, 10 20, 35 10), (20 30, 35 35, 30 20, 20 30))";
        let geometry = parse_wkt(wkt).unwrap();
        let encoded = encode_geometry(&geometry, Dimensions::xy());
        assert_eq!(encoded.ends.as_deref(), Some(&[5u32, 9][..]));
        let back = decode_geometry(&wire_roundtrip(&encoded)).unwrap();
        assert_eq!(back.to_string(), wkt);
    }

    #[test]
    fn test_bad_ends_rejected() {
        let mut encoded = encode_geometry(
            &parse_wkt("POLYGON ((35 10, 45 45, 15 40, 10 20, 35 10), (20 30, 35 35, 30 20, 20 30))")
                .unwrap(),
            Dimensions::xy(),
        );
        encoded.ends = Some(vec![5, 12]); // final end beyond point count
        assert!(matches!(
            decode_geometry(&encoded),
            Err(GeopackError::InconsistentGeometry(_))
        ));
        encoded.ends = Some(vec![7, 5]); // out of order
        assert!(matches!(
            decode_geometry(&encoded),
            Err(GeopackError::InconsistentGeometry(_))
        ));
    }

    #[test]
    fn test_mismatched_z_rejected() {
        let mut encoded = encode_geometry(
            &Geometry::LineString(vec![Coord::xyz(0.0, 0.0, 1.0), Coord::xyz(1.0, 1.0, 2.0)]),
            Dimensions::xyz(),
        );
        encoded.z = Some(vec![1.0]);
        assert!(matches!(
            decode_geometry(&encoded),
            Err(GeopackError::InconsistentGeometry(_))
        ));
    }

    #[test]
    fn test_nested_parts_rejected() {
        // a run of multipolygon-with-parts headers, each claiming one part
        // that is itself a multipolygon with parts
        let mut builder = TableBuilder::new();
        for _ in 0..100_000 {
            builder.put_u8(GeometryType::MultiPolygon as u8);
            builder.put_u8(FLAG_PARTS);
            builder.put_u32(1);
        }
        let bytes = builder.into_bytes();
        let mut reader = TableReader::new(&bytes);
        assert!(matches!(
            read_geometry(&mut reader),
            Err(GeopackError::InconsistentGeometry(_))
        ));
    }

    #[test]
    fn test_unknown_kind_rejected() {
        let mut builder = TableBuilder::new();
        builder.put_u8(9);
        builder.put_u8(0);
        builder.put_u32(0);
        let bytes = builder.into_bytes();
        let mut reader = TableReader::new(&bytes);
        assert!(matches!(
            read_geometry(&mut reader),
            Err(GeopackError::UnsupportedGeometryKind(9))
        ));
    }
}
