#[macro_use]
mod utils;

pub mod extra_bytes;
pub mod gps;
pub mod laszip;
pub mod nir;
pub mod point10;
pub mod point6;
pub mod rgb;
pub mod selective;

pub use gps::GpsTime;
pub use nir::Nir;
pub use point10::Point10;
pub use point6::Point6;
pub use rgb::RGB;
pub use selective::DecompressionSelector;

pub mod v2 {
    pub use crate::las::extra_bytes::v2::{LasExtraByteCompressor, LasExtraByteDecompressor};
    pub use crate::las::gps::v2::{LasGpsTimeCompressor, LasGpsTimeDecompressor};
    pub use crate::las::point10::v2::{LasPoint10Compressor, LasPoint10Decompressor};
    pub use crate::las::rgb::v2::{LasRGBCompressor, LasRGBDecompressor};
}

pub mod v3 {
    pub use crate::las::extra_bytes::v3::{LasExtraByteCompressor, LasExtraByteDecompressor};
    pub use crate::las::nir::v3::{LasNIRCompressor, LasNIRDecompressor};
    pub use crate::las::point6::v3::{LasPoint6Compressor, LasPoint6Decompressor};
    pub use crate::las::rgb::v3::{LasRGBCompressor, LasRGBDecompressor};
}
