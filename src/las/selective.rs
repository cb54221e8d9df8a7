//! Selective decompression of the layered point formats

/// Selects which layers of a layered chunk are decompressed.
///
/// Layers that are not selected are skipped over when a chunk is read,
/// the corresponding fields keep the value they had in the first point of
/// the chunk.
///
/// The X, Y, returns and scanner channel layer is always decompressed,
/// as every other layer depends on it.
#[derive(Debug, Copy, Clone, Ord, PartialOrd, Eq, PartialEq)]
// The inner value is pub to facilitate language bindings
pub struct DecompressionSelector(pub u32);

macro_rules! decompress_setter {
    (
        $fn_name:ident = $bit_mask:expr
    ) => {
        pub fn $fn_name(self) -> Self {
            self.set($bit_mask)
        }
    };
}

macro_rules! skip_setter {
    (
        $fn_name:ident = $bit_mask:expr
    ) => {
        pub fn $fn_name(self) -> Self {
            self.unset($bit_mask)
        }
    };
}

macro_rules! accessor {
    (
        $fn_name:ident = $bit_mask:expr
    ) => {
        pub fn $fn_name(self) -> bool {
            self.is_set($bit_mask)
        }
    };
}

impl DecompressionSelector {
    pub const ALL: u32 = u32::MAX;

    // Always decompressed, cannot be skipped
    pub const XY_RETURNS_CHANNEL: u32 = 0;
    pub const Z: u32 = 1 << 0;
    pub const CLASSIFICATION: u32 = 1 << 1;
    pub const FLAGS: u32 = 1 << 2;
    pub const INTENSITY: u32 = 1 << 3;
    pub const SCAN_ANGLE: u32 = 1 << 4;
    pub const USER_DATA: u32 = 1 << 5;
    pub const POINT_SOURCE_ID: u32 = 1 << 6;
    pub const GPS_TIME: u32 = 1 << 7;
    pub const RGB: u32 = 1 << 8;
    pub const NIR: u32 = 1 << 9;
    pub const ALL_EXTRA_BYTES: u32 = 1 << 10;

    /// To decompress all the layers
    pub fn all() -> Self {
        Self(Self::ALL)
    }

    /// To decompress only the 'base' layer
    /// that is:
    ///
    /// - x
    /// - y
    /// - return number
    /// - number of returns
    /// - scanner channel
    pub fn base() -> Self {
        Self(Self::XY_RETURNS_CHANNEL)
    }

    decompress_setter!(decompress_z = Self::Z);
    decompress_setter!(decompress_classification = Self::CLASSIFICATION);
    decompress_setter!(decompress_flags = Self::FLAGS);
    decompress_setter!(decompress_intensity = Self::INTENSITY);
    decompress_setter!(decompress_scan_angle = Self::SCAN_ANGLE);
    decompress_setter!(decompress_user_data = Self::USER_DATA);
    decompress_setter!(decompress_point_source_id = Self::POINT_SOURCE_ID);
    decompress_setter!(decompress_gps_time = Self::GPS_TIME);
    decompress_setter!(decompress_rgb = Self::RGB);
    decompress_setter!(decompress_nir = Self::NIR);
    decompress_setter!(decompress_extra_bytes = Self::ALL_EXTRA_BYTES);

    skip_setter!(skip_z = Self::Z);
    skip_setter!(skip_classification = Self::CLASSIFICATION);
    skip_setter!(skip_flags = Self::FLAGS);
    skip_setter!(skip_intensity = Self::INTENSITY);
    skip_setter!(skip_scan_angle = Self::SCAN_ANGLE);
    skip_setter!(skip_user_data = Self::USER_DATA);
    skip_setter!(skip_point_source_id = Self::POINT_SOURCE_ID);
    skip_setter!(skip_gps_time = Self::GPS_TIME);
    skip_setter!(skip_rgb = Self::RGB);
    skip_setter!(skip_nir = Self::NIR);
    skip_setter!(skip_extra_bytes = Self::ALL_EXTRA_BYTES);

    accessor!(should_decompress_z = Self::Z);
    accessor!(should_decompress_classification = Self::CLASSIFICATION);
    accessor!(should_decompress_flags = Self::FLAGS);
    accessor!(should_decompress_intensity = Self::INTENSITY);
    accessor!(should_decompress_scan_angle = Self::SCAN_ANGLE);
    accessor!(should_decompress_user_data = Self::USER_DATA);
    accessor!(should_decompress_point_source_id = Self::POINT_SOURCE_ID);
    accessor!(should_decompress_gps_time = Self::GPS_TIME);
    accessor!(should_decompress_rgb = Self::RGB);
    accessor!(should_decompress_nir = Self::NIR);
    accessor!(should_decompress_extra_bytes = Self::ALL_EXTRA_BYTES);

    fn set(self, bit_mask: u32) -> Self {
        Self(self.0 | bit_mask)
    }

    fn unset(self, bit_mask: u32) -> Self {
        Self(self.0 & (!bit_mask))
    }

    fn is_set(self, bit_mask: u32) -> bool {
        (self.0 & bit_mask) != 0
    }
}

impl Default for DecompressionSelector {
    fn default() -> Self {
        Self::all()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_base_skips_everything_optional() {
        let selector = DecompressionSelector::base();
        assert!(!selector.should_decompress_z());
        assert!(!selector.should_decompress_gps_time());
        assert!(!selector.should_decompress_extra_bytes());
    }

    #[test]
    fn test_setters_compose() {
        let selector = DecompressionSelector::all().skip_rgb().skip_z();
        assert!(!selector.should_decompress_rgb());
        assert!(!selector.should_decompress_z());
        assert!(selector.should_decompress_nir());

        let selector = DecompressionSelector::base()
            .decompress_intensity()
            .decompress_gps_time();
        assert_eq!(
            selector.0,
            DecompressionSelector::INTENSITY | DecompressionSelector::GPS_TIME
        );
    }
}
