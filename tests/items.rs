mod common;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use laz14::las::{Nir, Point6, RGB};
use laz14::packers::Packable;
use laz14::{DecompressionSelector, LazItem, LazItemRecordBuilder, LazItemType};

use common::{compress_chunk, decompress_chunk, records_of, survey_points, unpack_points};

const RGB_NIR_EXTRA_SIZE: usize = RGB::SIZE + Nir::SIZE + 3;

fn rgb_nir_bytes_items() -> Vec<LazItem> {
    LazItemRecordBuilder::new()
        .add_item(LazItemType::Point14)
        .add_item(LazItemType::RGBNIR14)
        .add_item(LazItemType::Byte14(3))
        .build()
}

/// Colors change slowly, and are sometimes grey
fn fill_rgb_nir_bytes(rng: &mut StdRng, i: usize, out: &mut [u8]) {
    let base = (i as u16).wrapping_mul(97);
    let rgb = if rng.gen_range(0..4) == 0 {
        RGB {
            red: base,
            green: base,
            blue: base,
        }
    } else {
        RGB {
            red: base,
            green: base.wrapping_add(rng.gen_range(0..300)),
            blue: rng.gen(),
        }
    };
    rgb.pack_into(&mut out[..RGB::SIZE]);
    Nir((i as u16).wrapping_mul(1031)).pack_into(&mut out[RGB::SIZE..RGB::SIZE + Nir::SIZE]);
    let bytes = &mut out[RGB::SIZE + Nir::SIZE..];
    bytes[0] = i as u8;
    bytes[1] = 42;
    bytes[2] = rng.gen();
}

fn rgb_nir_bytes_records(num_points: usize, channels: &[u8]) -> Vec<u8> {
    let points = survey_points(num_points, channels, 99);
    let mut rng = StdRng::seed_from_u64(1234);
    records_of(&points, RGB_NIR_EXTRA_SIZE, |i, out| {
        fill_rgb_nir_bytes(&mut rng, i, out)
    })
}

#[test]
fn test_rgb14_round_trip() {
    let items = LazItemRecordBuilder::new()
        .add_item(LazItemType::Point14)
        .add_item(LazItemType::RGB14)
        .build();
    let points = survey_points(800, &[0, 1], 3);
    let mut rng = StdRng::seed_from_u64(5);
    let records = records_of(&points, RGB::SIZE, |i, out| {
        let value = (i as u16).wrapping_mul(300);
        RGB {
            red: value,
            green: value.wrapping_add(rng.gen_range(0..10)),
            blue: if i % 3 == 0 { value } else { rng.gen() },
        }
        .pack_into(out)
    });

    let compressed = compress_chunk(&items, &records);
    let decompressed =
        decompress_chunk(&items, compressed, points.len(), DecompressionSelector::all());
    assert_eq!(decompressed, records);
}

#[test]
fn test_rgb_nir_extra_bytes_round_trip() {
    let items = rgb_nir_bytes_items();
    let records = rgb_nir_bytes_records(1_000, &[0, 0, 1, 2, 3, 3]);
    let compressed = compress_chunk(&items, &records);
    let decompressed = decompress_chunk(&items, compressed, 1_000, DecompressionSelector::all());
    assert_eq!(decompressed, records);
}

#[test]
fn test_constant_colors_are_not_written() {
    let items = LazItemRecordBuilder::new()
        .add_item(LazItemType::Point14)
        .add_item(LazItemType::RGBNIR14)
        .build();
    let points = survey_points(100, &[0], 8);
    let records = records_of(&points, RGB::SIZE + Nir::SIZE, |_, out| {
        RGB {
            red: 1,
            green: 2,
            blue: 3,
        }
        .pack_into(&mut out[..RGB::SIZE]);
        Nir(4).pack_into(&mut out[RGB::SIZE..]);
    });
    let compressed = compress_chunk(&items, &records);

    // after the 9 point layers sizes come the rgb and the nir layer sizes
    let pos = Point6::SIZE + RGB::SIZE + Nir::SIZE + 4 + 9 * 4;
    assert_eq!(&compressed[pos..pos + 8], &[0u8; 8]);

    let decompressed = decompress_chunk(&items, compressed, 100, DecompressionSelector::all());
    assert_eq!(decompressed, records);
}

#[test]
fn test_selective_decompression() {
    let items = rgb_nir_bytes_items();
    let num_points = 500;
    let records = rgb_nir_bytes_records(num_points, &[0, 1]);
    let record_size = Point6::SIZE + RGB_NIR_EXTRA_SIZE;
    let compressed = compress_chunk(&items, &records);

    let decompressed = decompress_chunk(
        &items,
        compressed.clone(),
        num_points,
        DecompressionSelector::base(),
    );
    let first = &records[..record_size];
    let first_point = Point6::unpack_from(first);
    let expected = unpack_points(&records, record_size);
    for (record, expected) in decompressed
        .chunks_exact(record_size)
        .zip(expected.iter())
    {
        let point = Point6::unpack_from(record);
        // decoded from the base layer
        assert_eq!(point.x, expected.x);
        assert_eq!(point.y, expected.y);
        assert_eq!(point.return_number, expected.return_number);
        assert_eq!(point.number_of_returns, expected.number_of_returns);
        assert_eq!(point.scanner_channel, expected.scanner_channel);
        // skipped layers keep the value of the first point
        assert_eq!(point.z, first_point.z);
        assert_eq!(point.intensity, first_point.intensity);
        assert_eq!(point.classification, first_point.classification);
        assert_eq!(point.gps_time.to_bits(), first_point.gps_time.to_bits());
        assert_eq!(&record[Point6::SIZE..], &first[Point6::SIZE..]);
    }

    // only skipping the colors
    let selection = DecompressionSelector::all().skip_rgb().skip_nir();
    let decompressed = decompress_chunk(&items, compressed, num_points, selection);
    for (record, expected) in decompressed
        .chunks_exact(record_size)
        .zip(records.chunks_exact(record_size))
    {
        assert_eq!(&record[..Point6::SIZE], &expected[..Point6::SIZE]);
        assert_eq!(
            &record[Point6::SIZE..Point6::SIZE + RGB::SIZE + Nir::SIZE],
            &first[Point6::SIZE..Point6::SIZE + RGB::SIZE + Nir::SIZE]
        );
        assert_eq!(
            &record[Point6::SIZE + RGB::SIZE + Nir::SIZE..],
            &expected[Point6::SIZE + RGB::SIZE + Nir::SIZE..]
        );
    }
}
