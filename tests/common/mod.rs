#![allow(dead_code)]

use std::io::Cursor;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use laz14::las::{Point10, Point6};
use laz14::packers::Packable;
use laz14::{
    DecompressionSelector, LayeredPointRecordCompressor, LayeredPointRecordDecompressor, LazItem,
};

/// Points looking like the ones of an aerial scan: small coordinates
/// deltas, a few returns per pulse, increasing gps time.
pub fn survey_points(count: usize, channels: &[u8], seed: u64) -> Vec<Point6> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut points = Vec::with_capacity(count);
    let mut last = Point6 {
        x: 1_000_000,
        y: -2_000_000,
        z: 500,
        intensity: 300,
        return_number: 1,
        number_of_returns: 1,
        classification: 2,
        point_source_id: 17,
        gps_time: 301_234.567_8,
        ..Default::default()
    };
    for i in 0..count {
        let mut point = last;
        point.scanner_channel = channels[i % channels.len()];
        point.x = point.x.wrapping_add(rng.gen_range(-50..150));
        point.y = point.y.wrapping_add(rng.gen_range(-50..50));
        point.z = point.z.wrapping_add(rng.gen_range(-20..=20));
        point.intensity = rng.gen_range(0..1024);

        if point.return_number >= point.number_of_returns {
            point.number_of_returns = rng.gen_range(1..=4);
            point.return_number = 1;
            point.gps_time += 0.000_01 * f64::from(rng.gen_range(1..=3i32));
        } else {
            point.return_number += 1;
        }

        if rng.gen_range(0..10) == 0 {
            point.classification = rng.gen();
        }
        if rng.gen_range(0..20) == 0 {
            point.classification_flags = rng.gen_range(0..16);
            point.scan_direction_flag = !point.scan_direction_flag;
        }
        if rng.gen_range(0..50) == 0 {
            point.edge_of_flight_line = !point.edge_of_flight_line;
        }
        if rng.gen_range(0..8) == 0 {
            point.scan_angle_rank = rng.gen_range(-30_000..30_000);
        }
        if rng.gen_range(0..30) == 0 {
            point.user_data = rng.gen();
        }
        if rng.gen_range(0..100) == 0 {
            point.point_source_id = rng.gen();
        }
        points.push(point);
        last = point;
    }
    points
}

/// Points of a scan of the point formats 0 to 5, built like `survey_points`.
pub fn survey_points10(count: usize, seed: u64) -> Vec<Point10> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut points = Vec::with_capacity(count);
    let mut last = Point10 {
        x: 1_000_000,
        y: -2_000_000,
        z: 500,
        intensity: 300,
        return_number: 1,
        number_of_returns_of_given_pulse: 1,
        classification: 2,
        point_source_id: 17,
        ..Default::default()
    };
    for _ in 0..count {
        let mut point = last;
        point.x = point.x.wrapping_add(rng.gen_range(-50..150));
        point.y = point.y.wrapping_add(rng.gen_range(-50..50));
        point.z = point.z.wrapping_add(rng.gen_range(-20..=20));
        if rng.gen_range(0..3) != 0 {
            point.intensity = rng.gen_range(0..1024);
        }

        if point.return_number >= point.number_of_returns_of_given_pulse {
            point.number_of_returns_of_given_pulse = rng.gen_range(1..=5);
            point.return_number = 1;
        } else {
            point.return_number += 1;
        }

        if rng.gen_range(0..10) == 0 {
            point.classification = rng.gen();
        }
        if rng.gen_range(0..20) == 0 {
            point.scan_direction_flag = !point.scan_direction_flag;
        }
        if rng.gen_range(0..50) == 0 {
            point.edge_of_flight_line = !point.edge_of_flight_line;
        }
        if rng.gen_range(0..8) == 0 {
            point.scan_angle_rank = rng.gen_range(-90..=90);
        }
        if rng.gen_range(0..30) == 0 {
            point.user_data = rng.gen();
        }
        if rng.gen_range(0..100) == 0 {
            point.point_source_id = rng.gen();
        }
        points.push(point);
        last = point;
    }
    points
}

/// Raw records made of the points followed by `extra_len` bytes
/// filled by `extra` (which receives the point index).
pub fn records_of<F>(points: &[Point6], extra_len: usize, mut extra: F) -> Vec<u8>
where
    F: FnMut(usize, &mut [u8]),
{
    let record_size = Point6::SIZE + extra_len;
    let mut records = vec![0u8; points.len() * record_size];
    for (i, (point, record)) in points
        .iter()
        .zip(records.chunks_exact_mut(record_size))
        .enumerate()
    {
        point.pack_into(&mut record[..Point6::SIZE]);
        extra(i, &mut record[Point6::SIZE..]);
    }
    records
}

pub fn point_records(points: &[Point6]) -> Vec<u8> {
    records_of(points, 0, |_, _| {})
}

pub fn compress_chunk(items: &[LazItem], records: &[u8]) -> Vec<u8> {
    let mut compressor = LayeredPointRecordCompressor::new(Cursor::new(Vec::<u8>::new()));
    compressor.set_fields_from(items).unwrap();
    let record_size = compressor.record_size();
    for record in records.chunks_exact(record_size) {
        compressor.compress_next(record).unwrap();
    }
    compressor.done().unwrap();
    compressor.into_inner().into_inner()
}

pub fn decompress_chunk(
    items: &[LazItem],
    compressed: Vec<u8>,
    num_points: usize,
    selection: DecompressionSelector,
) -> Vec<u8> {
    let mut decompressor =
        LayeredPointRecordDecompressor::selective(Cursor::new(compressed), selection);
    decompressor.set_fields_from(items).unwrap();
    let record_size = decompressor.record_size();
    let mut records = vec![0u8; num_points * record_size];
    for record in records.chunks_exact_mut(record_size) {
        decompressor.decompress_next(record).unwrap();
    }
    records
}

pub fn unpack_points(records: &[u8], record_size: usize) -> Vec<Point6> {
    records
        .chunks_exact(record_size)
        .map(|record| Point6::unpack_from(&record[..Point6::SIZE]))
        .collect()
}
