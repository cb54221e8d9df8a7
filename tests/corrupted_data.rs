mod common;

use std::io::{Cursor, ErrorKind};

use laz14::las::Point6;
use laz14::{
    decompress_chunks, DecompressionSelector, LasZipError, LayeredPointRecordDecompressor,
    LazItem, LazItemRecordBuilder, LazItemType,
};

use common::{compress_chunk, point_records, survey_points};

fn items() -> Vec<LazItem> {
    LazItemRecordBuilder::new()
        .add_item(LazItemType::Point14)
        .build()
}

fn decompress_all(data: Vec<u8>, num_points: usize) -> std::io::Result<()> {
    let mut decompressor = LayeredPointRecordDecompressor::new(Cursor::new(data));
    decompressor.set_fields_from(&items()).unwrap();
    let mut point = vec![0u8; Point6::SIZE];
    for _ in 0..num_points {
        decompressor.decompress_next(&mut point)?;
    }
    Ok(())
}

#[test]
fn test_invalid_layer_start_is_an_error() {
    let mut data = compress_chunk(&items(), &point_records(&survey_points(100, &[0], 1)));
    // first point, count, 9 layers sizes, then the first layer
    let layer_start = Point6::SIZE + 4 + 9 * 4;
    for byte in &mut data[layer_start..layer_start + 4] {
        *byte = 0xFF;
    }
    let err = decompress_all(data, 100).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidData);
}

#[test]
fn test_truncated_chunk_is_an_error() {
    let mut data = compress_chunk(&items(), &point_records(&survey_points(100, &[0], 2)));
    data.truncate(50);
    let err = decompress_all(data, 100).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UnexpectedEof);
}

#[test]
fn test_chunk_without_points_is_an_error() {
    let mut data = compress_chunk(&items(), &point_records(&survey_points(10, &[0], 3)));
    for byte in &mut data[Point6::SIZE..Point6::SIZE + 4] {
        *byte = 0;
    }
    let err = decompress_all(data, 1).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidData);
}

#[test]
fn test_reading_past_the_chunk_is_an_error() {
    let data = compress_chunk(&items(), &point_records(&survey_points(5, &[0], 5)));
    assert!(decompress_all(data.clone(), 5).is_ok());
    let err = decompress_all(data, 6).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UnexpectedEof);
}

#[test]
fn test_buffer_helpers_report_errors() {
    let data = compress_chunk(&items(), &point_records(&survey_points(5, &[0], 6)));
    let mut out = vec![0u8; 5 * Point6::SIZE + 1];
    match decompress_chunks(
        Cursor::new(&data),
        &mut out,
        &items(),
        5,
        DecompressionSelector::all(),
    ) {
        Err(LasZipError::BufferLenNotMultipleOfPointSize { .. }) => {}
        other => panic!("unexpected result {:?}", other),
    }

    let mut truncated = data;
    truncated.truncate(20);
    let mut out = vec![0u8; 5 * Point6::SIZE];
    match decompress_chunks(
        Cursor::new(&truncated),
        &mut out,
        &items(),
        5,
        DecompressionSelector::all(),
    ) {
        Err(LasZipError::IoError(e)) => assert_eq!(e.kind(), ErrorKind::UnexpectedEof),
        other => panic!("unexpected result {:?}", other),
    }
}
