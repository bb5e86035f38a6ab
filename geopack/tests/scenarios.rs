#[cfg(test)]
mod tests {
    use geopack::{
        parse_wkt, stream_select_bbox, ContainerReader, ContainerWriter, Dimensions, Feature,
        GeometryType, WriterOptions,
    };
    use geopack_index::BoundingBox;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use std::io::Cursor;

    fn box_wkt(b: &BoundingBox) -> String {
        format!(
            "POLYGON (({} {}, {} {}, {} {}, {} {}, {} {}))",
            b.min_x, b.min_y, b.max_x, b.min_y, b.max_x, b.max_y, b.min_x, b.max_y, b.min_x,
            b.min_y
        )
    }

    fn box_container(boxes: &[BoundingBox], node_size: u16) -> Vec<u8> {
        let _ = env_logger::builder().is_test(true).try_init();
        let options = WriterOptions {
            node_size,
            ..WriterOptions::default()
        };
        let mut writer = ContainerWriter::new(GeometryType::Polygon, Dimensions::xy(), options);
        for (i, b) in boxes.iter().enumerate() {
            let geometry = parse_wkt(&box_wkt(b)).unwrap();
            writer
                .add_feature(&Feature::with_properties(geometry, vec![i as u8]))
                .unwrap();
        }
        let mut out = Vec::new();
        writer.write(&mut out).unwrap();
        out
    }

    #[test]
    fn test_three_box_query() {
        let a = BoundingBox::new(2.1, 2.1, 8.5, 5.5);
        let b = BoundingBox::new(10.0, 2.1, 12.0, 5.5);
        let c = BoundingBox::new(10.0, 3.0, 12.0, 6.0);
        let data = box_container(&[a, b, c], 16);

        let mut reader = ContainerReader::open(Cursor::new(data)).unwrap();

        // the Hilbert sort stores the leftmost box first and interleaves
        // the two right-hand boxes by curve position
        let order: Vec<u8> = reader
            .select_all()
            .unwrap()
            .iter()
            .map(|f| f.properties[0])
            .collect();
        assert_eq!(order, vec![0, 2, 1]);

        // a thin strip below the third box catches only the second
        let hits = reader
            .select_bbox(&BoundingBox::new(10.0, 2.1, 12.0, 2.999))
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].properties, vec![1]);
        assert_eq!(hits[0].geometry.bounding_box(), b);
    }

    #[test]
    fn test_polygon_with_hole_wkt_round_trip() {
        let wkt = "POLYGON ((35 10, 45 45, 15 40, 10 20, 35 10), (20 30, 35 35, 30 20, 20 30))";
        let geometry = parse_wkt(wkt).unwrap();
        assert_eq!(geometry.to_string(), wkt);

        let mut writer = ContainerWriter::new(
            GeometryType::Polygon,
            Dimensions::xy(),
            WriterOptions::default(),
        );
        writer.add_feature(&Feature::new(geometry)).unwrap();
        let mut out = Vec::new();
        writer.write(&mut out).unwrap();

        let mut reader = ContainerReader::open(Cursor::new(out)).unwrap();
        let features = reader.select_all().unwrap();
        assert_eq!(features[0].geometry.to_string(), wkt);
    }

    #[test]
    fn test_queries_match_brute_force() {
        let mut rng = StdRng::seed_from_u64(94);
        let mut boxes = Vec::with_capacity(179);
        for _ in 0..179 {
            let x = rng.gen_range(0.0..95.0);
            let y = rng.gen_range(0.0..95.0);
            let w = rng.gen_range(0.1..5.0);
            let h = rng.gen_range(0.1..5.0);
            boxes.push(BoundingBox::new(x, y, x + w, y + h));
        }
        let data = box_container(&boxes, 16);

        let mut reader = ContainerReader::open(Cursor::new(data.clone())).unwrap();
        let all = reader.select_all().unwrap();
        assert_eq!(all.len(), 179);

        for _ in 0..20 {
            let x = rng.gen_range(0.0..90.0);
            let y = rng.gen_range(0.0..90.0);
            let query = BoundingBox::new(x, y, x + rng.gen_range(1.0..10.0), y + rng.gen_range(1.0..10.0));

            let mut expected: Vec<u8> = all
                .iter()
                .filter(|f| f.geometry.bounding_box().intersects(&query))
                .map(|f| f.properties[0])
                .collect();
            expected.sort();

            let mut indexed: Vec<u8> = reader
                .select_bbox(&query)
                .unwrap()
                .iter()
                .map(|f| f.properties[0])
                .collect();
            indexed.sort();
            assert_eq!(indexed, expected);

            let (_, streamed) = stream_select_bbox(&mut Cursor::new(data.clone()), &query).unwrap();
            let mut streamed: Vec<u8> = streamed.iter().map(|f| f.properties[0]).collect();
            streamed.sort();
            assert_eq!(streamed, expected);
        }
    }

    #[test]
    fn test_small_node_size() {
        let mut rng = StdRng::seed_from_u64(7);
        let mut boxes = Vec::new();
        for _ in 0..40 {
            let x = rng.gen_range(0.0..50.0);
            let y = rng.gen_range(0.0..50.0);
            boxes.push(BoundingBox::new(x, y, x + 1.0, y + 1.0));
        }
        // node size 2 forces the deepest possible tree
        let data = box_container(&boxes, 2);

        let mut reader = ContainerReader::open(Cursor::new(data)).unwrap();
        let all = reader.select_all().unwrap();
        let query = BoundingBox::new(10.0, 10.0, 30.0, 30.0);

        let mut expected: Vec<u8> = all
            .iter()
            .filter(|f| f.geometry.bounding_box().intersects(&query))
            .map(|f| f.properties[0])
            .collect();
        expected.sort();

        let mut indexed: Vec<u8> = reader
            .select_bbox(&query)
            .unwrap()
            .iter()
            .map(|f| f.properties[0])
            .collect();
        indexed.sort();
        assert_eq!(indexed, expected);
    }
}
