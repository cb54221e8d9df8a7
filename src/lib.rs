//! Rust implementation of the layered (v3) LASzip compression
//! used for the points of LAS 1.4 (point formats 6, 7 and 8),
//! and of the sequential (v2) one used for the point formats 0 to 3.
//!
//! Points are compressed in chunks, each chunk being independent from the others.
//! Inside a layered chunk the fields of the points are split into layers, so that
//! a decompressor can skip the layers it has no use for.
//! A sequential chunk is a single arithmetic coded stream.
//!
//! [`LayeredPointRecordCompressor`] and [`LayeredPointRecordDecompressor`] handle one chunk
//! at a time, [`record_compressor_from_laz_items`] and [`record_decompressor_from_laz_items`]
//! pick the sequential or the layered record codec from the version of the items.
//! [`compress_chunks`] and [`decompress_chunks`] handle a whole buffer of points.
//!
//! # Examples
//!
//! ```
//! use laz14::{
//!     compress_chunks, decompress_chunks, DecompressionSelector, LasZipError,
//!     LazItemRecordBuilder, LazItemType,
//! };
//! use laz14::las::Point6;
//! use laz14::packers::Packable;
//!
//! # fn main() -> Result<(), LasZipError> {
//! let items = LazItemRecordBuilder::new()
//!             .add_item(LazItemType::Point14)
//!             .add_item(LazItemType::RGB14)
//!             .build();
//! let point_size = 30 + 6;
//!
//! let mut points = vec![0u8; 10 * point_size];
//! for (i, raw_point) in points.chunks_exact_mut(point_size).enumerate() {
//!     let point = Point6 {
//!         x: i as i32,
//!         y: 2 * i as i32,
//!         return_number: 1,
//!         number_of_returns: 1,
//!         gps_time: i as f64,
//!         ..Default::default()
//!     };
//!     point.pack_into(&mut raw_point[..30]);
//! }
//!
//! // Here we use a Vec but a std::fs::File will work just fine
//! let mut compressed = Vec::<u8>::new();
//! let chunk_sizes = compress_chunks(&mut compressed, &points, &items, 4)?;
//! assert_eq!(chunk_sizes.len(), 3);
//!
//! let mut decompressed = vec![0u8; points.len()];
//! decompress_chunks(
//!     std::io::Cursor::new(&compressed),
//!     &mut decompressed,
//!     &items,
//!     4,
//!     DecompressionSelector::all(),
//! )?;
//! assert_eq!(decompressed, points);
//! # Ok(())
//! # }
//! ```
//!
//! [`LayeredPointRecordCompressor`]: record/struct.LayeredPointRecordCompressor.html
//! [`LayeredPointRecordDecompressor`]: record/struct.LayeredPointRecordDecompressor.html
//! [`record_compressor_from_laz_items`]: record/fn.record_compressor_from_laz_items.html
//! [`record_decompressor_from_laz_items`]: record/fn.record_decompressor_from_laz_items.html
//! [`compress_chunks`]: las/laszip/fn.compress_chunks.html
//! [`decompress_chunks`]: las/laszip/fn.decompress_chunks.html

pub(crate) mod compressors;
pub(crate) mod decoders;
pub(crate) mod decompressors;
pub(crate) mod encoders;
pub(crate) mod models;

pub mod errors;
pub mod las;
pub mod packers;
pub mod record;

pub use errors::LasZipError;
pub use las::laszip::{
    compress_chunks, decompress_chunks, LazItem, LazItemRecordBuilder, LazItemType,
    DEFAULT_CHUNK_SIZE,
};
pub use las::selective::DecompressionSelector;
pub use record::{
    record_compressor_from_laz_items, record_decompressor_from_laz_items,
    LayeredPointRecordCompressor, LayeredPointRecordDecompressor, RecordCompressor,
    RecordDecompressor, SequentialPointRecordCompressor, SequentialPointRecordDecompressor,
};

pub type Result<T> = std::result::Result<T, LasZipError>;
