mod common;

use std::io::Cursor;

use laz14::las::Point6;
use laz14::{
    compress_chunks, decompress_chunks, DecompressionSelector, LazItem, LazItemRecordBuilder,
    LazItemType,
};

use common::{
    compress_chunk, decompress_chunk, point_records, survey_points, unpack_points,
};

fn point14_items() -> Vec<LazItem> {
    LazItemRecordBuilder::new()
        .add_item(LazItemType::Point14)
        .build()
}

fn round_trip(points: &[Point6]) -> Vec<Point6> {
    let items = point14_items();
    let records = point_records(points);
    let compressed = compress_chunk(&items, &records);
    let decompressed =
        decompress_chunk(&items, compressed, points.len(), DecompressionSelector::all());
    assert_eq!(decompressed, records);
    unpack_points(&decompressed, Point6::SIZE)
}

#[test]
fn test_round_trip_single_channel() {
    let points = survey_points(2_000, &[0], 42);
    assert_eq!(round_trip(&points), points);
}

#[test]
fn test_round_trip_mixed_channels() {
    let points = survey_points(2_000, &[0, 1, 1, 3, 2, 0, 3], 7);
    assert_eq!(round_trip(&points), points);
}

#[test]
fn test_round_trip_single_point() {
    let points = survey_points(1, &[2], 3);
    assert_eq!(round_trip(&points), points);
}

#[test]
fn test_round_trip_extreme_values() {
    let mut points = survey_points(50, &[0, 1], 11);
    points[10].x = i32::MAX;
    points[11].x = i32::MIN;
    points[12].y = i32::MIN;
    points[13].z = i32::MAX;
    points[14].intensity = u16::MAX;
    points[15].scan_angle_rank = i16::MIN;
    points[16].point_source_id = u16::MAX;
    points[17].gps_time = -1.0;
    points[18].gps_time = 1.0e300;
    points[19].gps_time = 0.0;
    assert_eq!(round_trip(&points), points);
}

#[test]
fn test_compression_is_deterministic() {
    let items = point14_items();
    let records = point_records(&survey_points(1_000, &[0, 1], 5));
    let first = compress_chunk(&items, &records);
    let second = compress_chunk(&items, &records);
    assert_eq!(first, second);
}

#[test]
fn test_chunks_are_independent() {
    let items = point14_items();
    let points = survey_points(1_000, &[0, 2, 1], 13);
    let records = point_records(&points);

    let mut compressed = Vec::new();
    let chunk_sizes = compress_chunks(&mut compressed, &records, &items, 600).unwrap();
    assert_eq!(chunk_sizes.len(), 2);
    assert_eq!(chunk_sizes.iter().sum::<usize>(), compressed.len());

    // The second chunk is exactly what compressing its points alone gives
    let second_alone = compress_chunk(&items, &records[600 * Point6::SIZE..]);
    assert_eq!(&compressed[chunk_sizes[0]..], &second_alone[..]);

    let mut decompressed = vec![0u8; records.len()];
    decompress_chunks(
        Cursor::new(&compressed),
        &mut decompressed,
        &items,
        600,
        DecompressionSelector::all(),
    )
    .unwrap();
    assert_eq!(decompressed, records);
}

#[test]
fn test_many_small_chunks() {
    let items = point14_items();
    let records = point_records(&survey_points(103, &[3, 0], 17));

    let mut compressed = Vec::new();
    let chunk_sizes = compress_chunks(&mut compressed, &records, &items, 10).unwrap();
    assert_eq!(chunk_sizes.len(), 11);

    let mut decompressed = vec![0u8; records.len()];
    decompress_chunks(
        Cursor::new(&compressed),
        &mut decompressed,
        &items,
        10,
        DecompressionSelector::all(),
    )
    .unwrap();
    assert_eq!(decompressed, records);
}

#[test]
fn test_context_isolation() {
    let channel_0 = survey_points(300, &[0], 21);
    let mut channel_1 = survey_points(300, &[1], 22);
    for point in &mut channel_1 {
        point.x += 50_000;
        point.classification = 6;
    }

    let interleaved: Vec<Point6> = channel_0
        .iter()
        .zip(&channel_1)
        .flat_map(|(a, b)| vec![*a, *b])
        .collect();
    let decoded = round_trip(&interleaved);

    let decoded_0: Vec<Point6> = decoded
        .iter()
        .filter(|p| p.scanner_channel == 0)
        .cloned()
        .collect();
    let decoded_1: Vec<Point6> = decoded
        .iter()
        .filter(|p| p.scanner_channel == 1)
        .cloned()
        .collect();
    assert_eq!(decoded_0, channel_0);
    assert_eq!(decoded_1, channel_1);

    assert_eq!(round_trip(&channel_0), channel_0);
    assert_eq!(round_trip(&channel_1), channel_1);
}

#[test]
fn test_return_number_wraparound() {
    let returns = [14u8, 15, 0, 1, 0, 15, 14, 15, 0, 0, 15, 0, 3, 15, 0];
    let points: Vec<Point6> = returns
        .iter()
        .enumerate()
        .map(|(i, r)| Point6 {
            x: i as i32,
            y: 2 * i as i32,
            return_number: *r,
            number_of_returns: 15,
            gps_time: 10.0 + (i / 4) as f64,
            ..Default::default()
        })
        .collect();
    assert_eq!(round_trip(&points), points);
}

#[test]
fn test_first_use_bootstrap() {
    let mut points = survey_points(40, &[0], 31);
    let mut far_points = survey_points(40, &[3], 32);
    for point in &mut far_points {
        point.x = point.x.wrapping_add(123_456_789);
        point.z -= 10_000;
        point.intensity = 7;
        point.gps_time += 1_000.0;
    }
    points.extend_from_slice(&far_points);
    // back to the first channel, which kept its own history
    points.extend_from_slice(&survey_points(10, &[0], 33));
    assert_eq!(round_trip(&points), points);
}

#[test]
fn test_gps_time_with_constant_delta() {
    let base = 400_000.0f64.to_bits() as i64;
    let num_points = 1_000usize;
    let points: Vec<Point6> = (0..num_points)
        .map(|i| Point6 {
            x: 100,
            y: 200,
            z: 300,
            return_number: 1,
            number_of_returns: 1,
            gps_time: f64::from_bits((base + 1_000 * i as i64) as u64),
            ..Default::default()
        })
        .collect();

    let items = point14_items();
    let compressed = compress_chunk(&items, &point_records(&points));

    // first point, count, then the sizes of the 9 layers, gps time being the last one
    let gps_size_pos = Point6::SIZE + 4 + 8 * 4;
    let mut size = [0u8; 4];
    size.copy_from_slice(&compressed[gps_size_pos..gps_size_pos + 4]);
    let gps_layer_size = u32::from_le_bytes(size) as usize;
    assert!(gps_layer_size > 0);
    let bits_per_point = (gps_layer_size * 8) as f64 / num_points as f64;
    assert!(
        bits_per_point < 4.0,
        "gps time layer uses {} bits per point",
        bits_per_point
    );

    let decompressed =
        decompress_chunk(&items, compressed, num_points, DecompressionSelector::all());
    assert_eq!(unpack_points(&decompressed, Point6::SIZE), points);
}

#[test]
fn test_constant_layers_are_not_written() {
    let points: Vec<Point6> = (0..100)
        .map(|i| Point6 {
            x: i,
            y: -i,
            z: 12,
            intensity: 40,
            return_number: 1,
            number_of_returns: 1,
            classification: 2,
            user_data: 3,
            point_source_id: 4,
            gps_time: 5.0,
            ..Default::default()
        })
        .collect();
    let compressed = compress_chunk(&point14_items(), &point_records(&points));

    let sizes: Vec<u32> = compressed[Point6::SIZE + 4..Point6::SIZE + 4 + 9 * 4]
        .chunks_exact(4)
        .map(|s| u32::from_le_bytes([s[0], s[1], s[2], s[3]]))
        .collect();
    assert!(sizes[0] > 0);
    assert!(sizes[1..].iter().all(|size| *size == 0));
    assert_eq!(
        compressed.len(),
        Point6::SIZE + 4 + 9 * 4 + sizes[0] as usize
    );
    assert_eq!(round_trip(&points), points);
}
