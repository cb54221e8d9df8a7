//! The point record shared by the LAS 1.4 point formats 6 to 10
//! and its layered (v3) compression.

use std::io::{Read, Write};

use crate::packers::Packable;

/// Core fields of a LAS 1.4 point (point format 6), 30 bytes on the wire.
///
/// Coordinates are the scaled integers as stored in the file.
#[derive(Default, Copy, Clone, Debug, PartialEq)]
pub struct Point6 {
    pub x: i32,
    pub y: i32,
    pub z: i32,
    pub intensity: u16,
    // 4 bits each
    pub return_number: u8,
    pub number_of_returns: u8,
    // 4 bits
    pub classification_flags: u8,
    // 2 bits
    pub scanner_channel: u8,
    pub scan_direction_flag: bool,
    pub edge_of_flight_line: bool,
    pub classification: u8,
    pub user_data: u8,
    pub scan_angle_rank: i16,
    pub point_source_id: u16,
    pub gps_time: f64,
}

impl Point6 {
    pub const SIZE: usize = 30;

    /// The byte holding the return number (low nibble)
    /// and the number of returns (high nibble)
    pub fn bit_fields(&self) -> u8 {
        (self.number_of_returns & 0b0000_1111) << 4 | (self.return_number & 0b0000_1111)
    }

    pub fn set_bit_fields(&mut self, bit_fields: u8) {
        self.return_number = bit_fields & 0b0000_1111;
        self.number_of_returns = bit_fields >> 4;
    }

    /// The byte holding the classification flags, the scanner channel,
    /// the scan direction flag and the edge of flight line
    pub fn flags(&self) -> u8 {
        (self.edge_of_flight_line as u8) << 7
            | (self.scan_direction_flag as u8) << 6
            | (self.scanner_channel & 0b0000_0011) << 4
            | (self.classification_flags & 0b0000_1111)
    }

    pub fn set_flags(&mut self, flags: u8) {
        self.classification_flags = flags & 0b0000_1111;
        self.scanner_channel = (flags >> 4) & 0b0000_0011;
        self.scan_direction_flag = flags & 0b0100_0000 != 0;
        self.edge_of_flight_line = flags & 0b1000_0000 != 0;
    }

    pub fn read_from<R: Read>(src: &mut R) -> std::io::Result<Self> {
        let mut buf = [0u8; Self::SIZE];
        src.read_exact(&mut buf)?;
        Ok(Self::unpack_from(&buf))
    }

    pub fn write_to<W: Write>(&self, dst: &mut W) -> std::io::Result<()> {
        let mut buf = [0u8; Self::SIZE];
        self.pack_into(&mut buf);
        dst.write_all(&buf)
    }
}

impl Packable for Point6 {
    fn unpack_from(input: &[u8]) -> Self {
        let mut point = Self {
            x: i32::unpack_from(&input[0..4]),
            y: i32::unpack_from(&input[4..8]),
            z: i32::unpack_from(&input[8..12]),
            intensity: u16::unpack_from(&input[12..14]),
            classification: input[16],
            user_data: input[17],
            scan_angle_rank: i16::unpack_from(&input[18..20]),
            point_source_id: u16::unpack_from(&input[20..22]),
            gps_time: f64::unpack_from(&input[22..30]),
            ..Default::default()
        };
        point.set_bit_fields(input[14]);
        point.set_flags(input[15]);
        point
    }

    fn pack_into(&self, output: &mut [u8]) {
        self.x.pack_into(&mut output[0..4]);
        self.y.pack_into(&mut output[4..8]);
        self.z.pack_into(&mut output[8..12]);
        self.intensity.pack_into(&mut output[12..14]);
        output[14] = self.bit_fields();
        output[15] = self.flags();
        output[16] = self.classification;
        output[17] = self.user_data;
        self.scan_angle_rank.pack_into(&mut output[18..20]);
        self.point_source_id.pack_into(&mut output[20..22]);
        self.gps_time.pack_into(&mut output[22..30]);
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_bit_fields_get_set() {
        let mut p = Point6::default();
        assert_eq!(p.bit_fields(), 0);
        p.number_of_returns = 1;
        p.return_number = 1;
        assert_eq!(p.bit_fields(), 17);

        p.number_of_returns = 2;
        assert_eq!(p.bit_fields(), 33);

        p.set_bit_fields(0xF3);
        assert_eq!(p.return_number, 3);
        assert_eq!(p.number_of_returns, 15);
    }

    #[test]
    fn test_flags_layout() {
        let mut p = Point6::default();
        p.classification_flags = 0b1010;
        p.scanner_channel = 3;
        p.edge_of_flight_line = true;
        assert_eq!(p.flags(), 0b1011_1010);

        let mut other = Point6::default();
        other.set_flags(0b0110_0101);
        assert_eq!(other.classification_flags, 0b0101);
        assert_eq!(other.scanner_channel, 2);
        assert!(other.scan_direction_flag);
        assert!(!other.edge_of_flight_line);
    }

    #[test]
    fn test_wire_format() {
        let point = Point6 {
            x: -1,
            y: 2,
            z: 0x0102_0304,
            intensity: 0xABCD,
            return_number: 2,
            number_of_returns: 3,
            classification_flags: 1,
            scanner_channel: 1,
            scan_direction_flag: false,
            edge_of_flight_line: true,
            classification: 6,
            user_data: 7,
            scan_angle_rank: -15,
            point_source_id: 513,
            gps_time: 42.5,
        };
        let mut buf = Vec::new();
        point.write_to(&mut buf).unwrap();
        assert_eq!(buf.len(), Point6::SIZE);
        assert_eq!(&buf[0..4], &[0xFF, 0xFF, 0xFF, 0xFF]);
        assert_eq!(&buf[8..12], &[0x04, 0x03, 0x02, 0x01]);
        assert_eq!(&buf[12..18], &[0xCD, 0xAB, 0x32, 0x91, 6, 7]);
        assert_eq!(&buf[18..22], &[0xF1, 0xFF, 0x01, 0x02]);

        let read = Point6::read_from(&mut std::io::Cursor::new(buf)).unwrap();
        assert_eq!(read, point);
    }
}

pub mod v3 {
    //! Layered compression of the point 14 item.
    //!
    //! Each point is split into 9 layers, each layer being coded with its own
    //! arithmetic coder so that a reader can skip the layers it does not need.
    //! The models are kept per scanner channel (4 contexts), a context
    //! is initialized from the last point of the previously active
    //! context the first time its channel is seen in a chunk.
    use std::io::{Cursor, Read, Seek, Write};

    use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
    use log::{debug, trace};

    use crate::compressors::{IntegerCodec, IntegerCompressor};
    use crate::decoders::ArithmeticDecoder;
    use crate::decompressors::IntegerDecompressor;
    use crate::encoders::ArithmeticEncoder;
    use crate::las::gps::{GpsTime, GpsTimeCoding, GpsTimeContext};
    use crate::las::point6::Point6;
    use crate::las::selective::DecompressionSelector;
    use crate::las::utils::{
        copy_bytes_into_decoder, copy_encoder_content_to, layer_size_of, reset_layer_encoder,
        u32_zero_bit_0, StreamingMedian, NUMBER_RETURN_LEVEL_8CTX, NUMBER_RETURN_MAP_6CTX,
    };
    use crate::models::{ArithmeticModel, ArithmeticModelBuilder};
    use crate::packers::Packable;
    use crate::record::{LayeredFieldCompressor, LayeredFieldDecompressor};

    const NUM_CONTEXTS: usize = 4;

    #[derive(Clone)]
    struct Point6Context<IC> {
        unused: bool,

        last_point: Point6,
        // whether the gps time of last_point differed from its predecessor
        gps_time_change: bool,
        last_intensities: [u16; 8],
        last_x_diff_median5: [StreamingMedian<i32>; 12],
        last_y_diff_median5: [StreamingMedian<i32>; 12],
        last_z: [i32; 8],

        changed_values_models: Vec<ArithmeticModel>, // 8
        scanner_channel_model: ArithmeticModel,
        number_of_returns_models: Vec<Option<ArithmeticModel>>, // 16
        return_number_models: Vec<Option<ArithmeticModel>>,     // 16
        return_number_gps_same_model: ArithmeticModel,
        classification_models: Vec<Option<ArithmeticModel>>, // 64
        flags_models: Vec<Option<ArithmeticModel>>,          // 64
        user_data_models: Vec<Option<ArithmeticModel>>,      // 64

        ic_dx: IC,
        ic_dy: IC,
        ic_z: IC,
        ic_intensity: IC,
        ic_scan_angle: IC,
        ic_point_source: IC,

        gps_time_context: GpsTimeContext<IC>,
    }

    impl<IC: IntegerCodec> Point6Context<IC> {
        fn from_last_point(point: &Point6) -> Self {
            Self {
                unused: false,
                last_point: *point,
                gps_time_change: false,
                last_intensities: [point.intensity; 8],
                last_x_diff_median5: [StreamingMedian::<i32>::new(); 12],
                last_y_diff_median5: [StreamingMedian::<i32>::new(); 12],
                last_z: [point.z; 8],
                changed_values_models: (0..8)
                    .map(|_| ArithmeticModelBuilder::new(128).build())
                    .collect(),
                scanner_channel_model: ArithmeticModelBuilder::new(3).build(),
                number_of_returns_models: (0..16).map(|_| None).collect(),
                return_number_models: (0..16).map(|_| None).collect(),
                return_number_gps_same_model: ArithmeticModelBuilder::new(13).build(),
                classification_models: (0..64).map(|_| None).collect(),
                flags_models: (0..64).map(|_| None).collect(),
                user_data_models: (0..64).map(|_| None).collect(),
                ic_dx: IC::with_bits_and_contexts(32, 2),
                ic_dy: IC::with_bits_and_contexts(32, 22),
                ic_z: IC::with_bits_and_contexts(32, 20),
                ic_intensity: IC::with_bits_and_contexts(16, 4),
                ic_scan_angle: IC::with_bits_and_contexts(16, 2),
                ic_point_source: IC::with_bits_and_contexts(16, 1),
                gps_time_context: GpsTimeContext::new(
                    GpsTime::from(point.gps_time),
                    GpsTimeCoding::Layered,
                ),
            }
        }

        fn unused_contexts() -> [Self; NUM_CONTEXTS] {
            let p = Point6::default();
            let mut contexts = [
                Self::from_last_point(&p),
                Self::from_last_point(&p),
                Self::from_last_point(&p),
                Self::from_last_point(&p),
            ];
            for context in &mut contexts {
                context.unused = true;
            }
            contexts
        }
    }

    impl<IC> Point6Context<IC> {
        /// Single (3) / first (1) / last (2) / intermediate (0) return context
        /// of the last point, plus 4 if its gps time changed
        fn last_point_return_context(&self) -> usize {
            let last_point = &self.last_point;
            let mut lpr = if last_point.return_number == 1 { 1 } else { 0 };
            if last_point.return_number >= last_point.number_of_returns {
                lpr += 2;
            }
            if self.gps_time_change {
                lpr += 4;
            }
            lpr
        }
    }

    /// Single (3) / first (2) / last (1) / intermediate (0) return context
    #[inline]
    fn current_point_return_context(n: u8, r: u8) -> u32 {
        let mut cpr = if r == 1 { 2 } else { 0 };
        if r >= n {
            cpr += 1;
        }
        cpr
    }

    #[inline]
    fn flags_context_of(point: &Point6) -> u8 {
        (point.edge_of_flight_line as u8) << 5
            | (point.scan_direction_flag as u8) << 4
            | (point.classification_flags & 0b0000_1111)
    }

    #[inline]
    fn dy_context_of(n: u8, k_bits: u32) -> u32 {
        (n == 1) as u32 + if k_bits < 20 { u32_zero_bit_0(k_bits) } else { 20 }
    }

    #[inline]
    fn z_context_of(n: u8, k_bits: u32) -> u32 {
        (n == 1) as u32 + if k_bits < 18 { u32_zero_bit_0(k_bits) } else { 18 }
    }

    /// Compressed size in bytes of each layer of a chunk, 0 for unchanged layers
    #[derive(Copy, Clone, Default, Debug, PartialEq)]
    struct LayerSizes {
        channel_returns_xy: u32,
        z: u32,
        classification: u32,
        flags: u32,
        intensity: u32,
        scan_angle: u32,
        user_data: u32,
        point_source: u32,
        gps_time: u32,
    }

    impl LayerSizes {
        fn read_from<R: Read>(src: &mut R) -> std::io::Result<Self> {
            Ok(Self {
                channel_returns_xy: src.read_u32::<LittleEndian>()?,
                z: src.read_u32::<LittleEndian>()?,
                classification: src.read_u32::<LittleEndian>()?,
                flags: src.read_u32::<LittleEndian>()?,
                intensity: src.read_u32::<LittleEndian>()?,
                scan_angle: src.read_u32::<LittleEndian>()?,
                user_data: src.read_u32::<LittleEndian>()?,
                point_source: src.read_u32::<LittleEndian>()?,
                gps_time: src.read_u32::<LittleEndian>()?,
            })
        }

        fn write_to<W: Write>(&self, dst: &mut W) -> std::io::Result<()> {
            dst.write_u32::<LittleEndian>(self.channel_returns_xy)?;
            dst.write_u32::<LittleEndian>(self.z)?;
            dst.write_u32::<LittleEndian>(self.classification)?;
            dst.write_u32::<LittleEndian>(self.flags)?;
            dst.write_u32::<LittleEndian>(self.intensity)?;
            dst.write_u32::<LittleEndian>(self.scan_angle)?;
            dst.write_u32::<LittleEndian>(self.user_data)?;
            dst.write_u32::<LittleEndian>(self.point_source)?;
            dst.write_u32::<LittleEndian>(self.gps_time)?;
            Ok(())
        }
    }

    /// Whether each optional layer changed at least once in the chunk
    #[derive(Copy, Clone, Default, Debug)]
    struct ChangedLayers {
        z: bool,
        classification: bool,
        flags: bool,
        intensity: bool,
        scan_angle: bool,
        user_data: bool,
        point_source: bool,
        gps_time: bool,
    }

    /***************************************************************************************
                                    Compression
    ***************************************************************************************/

    struct Point6Encoders {
        channel_returns_xy: ArithmeticEncoder<Cursor<Vec<u8>>>,
        z: ArithmeticEncoder<Cursor<Vec<u8>>>,
        classification: ArithmeticEncoder<Cursor<Vec<u8>>>,
        flags: ArithmeticEncoder<Cursor<Vec<u8>>>,
        intensity: ArithmeticEncoder<Cursor<Vec<u8>>>,
        scan_angle: ArithmeticEncoder<Cursor<Vec<u8>>>,
        user_data: ArithmeticEncoder<Cursor<Vec<u8>>>,
        point_source: ArithmeticEncoder<Cursor<Vec<u8>>>,
        gps_time: ArithmeticEncoder<Cursor<Vec<u8>>>,
    }

    impl Default for Point6Encoders {
        fn default() -> Self {
            Self {
                channel_returns_xy: ArithmeticEncoder::new(Cursor::new(Vec::<u8>::new())),
                z: ArithmeticEncoder::new(Cursor::new(Vec::<u8>::new())),
                classification: ArithmeticEncoder::new(Cursor::new(Vec::<u8>::new())),
                flags: ArithmeticEncoder::new(Cursor::new(Vec::<u8>::new())),
                intensity: ArithmeticEncoder::new(Cursor::new(Vec::<u8>::new())),
                scan_angle: ArithmeticEncoder::new(Cursor::new(Vec::<u8>::new())),
                user_data: ArithmeticEncoder::new(Cursor::new(Vec::<u8>::new())),
                point_source: ArithmeticEncoder::new(Cursor::new(Vec::<u8>::new())),
                gps_time: ArithmeticEncoder::new(Cursor::new(Vec::<u8>::new())),
            }
        }
    }

    impl Point6Encoders {
        fn reset(&mut self) {
            reset_layer_encoder(&mut self.channel_returns_xy);
            reset_layer_encoder(&mut self.z);
            reset_layer_encoder(&mut self.classification);
            reset_layer_encoder(&mut self.flags);
            reset_layer_encoder(&mut self.intensity);
            reset_layer_encoder(&mut self.scan_angle);
            reset_layer_encoder(&mut self.user_data);
            reset_layer_encoder(&mut self.point_source);
            reset_layer_encoder(&mut self.gps_time);
        }
    }

    pub struct LasPoint6Compressor {
        encoders: Point6Encoders,
        changed: ChangedLayers,
        current_context: usize,
        contexts: [Point6Context<IntegerCompressor>; NUM_CONTEXTS],
    }

    impl LasPoint6Compressor {
        pub fn new() -> Self {
            Self {
                encoders: Point6Encoders::default(),
                changed: ChangedLayers::default(),
                current_context: 0,
                contexts: Point6Context::unused_contexts(),
            }
        }

        fn compress_point(&mut self, current_point: &Point6) -> std::io::Result<()> {
            let lpr = self.contexts[self.current_context].last_point_return_context();

            let scanner_channel = usize::from(current_point.scanner_channel);
            let scanner_channel_changed = scanner_channel != self.current_context;

            // The point is predicted from the last point of its own channel
            // if that channel was already seen in this chunk
            let last_point = if scanner_channel_changed && !self.contexts[scanner_channel].unused
            {
                self.contexts[scanner_channel].last_point
            } else {
                self.contexts[self.current_context].last_point
            };

            let point_source_changed = current_point.point_source_id != last_point.point_source_id;
            let gps_time_changed =
                GpsTime::from(current_point.gps_time) != GpsTime::from(last_point.gps_time);
            let scan_angle_changed = current_point.scan_angle_rank != last_point.scan_angle_rank;

            let last_n = last_point.number_of_returns;
            let last_r = last_point.return_number;
            let n = current_point.number_of_returns;
            let r = current_point.return_number;

            let mut changed_values = (scanner_channel_changed as u32) << 6
                | (point_source_changed as u32) << 5
                | (gps_time_changed as u32) << 4
                | (scan_angle_changed as u32) << 3
                | ((n != last_n) as u32) << 2;

            if r != last_r {
                if r == (last_r + 1) % 16 {
                    changed_values |= 1;
                } else if r == (last_r + 15) % 16 {
                    changed_values |= 2;
                } else {
                    changed_values |= 3;
                }
            }

            self.encoders.channel_returns_xy.encode_symbol(
                &mut self.contexts[self.current_context].changed_values_models[lpr],
                changed_values,
            )?;

            if scanner_channel_changed {
                let diff = (scanner_channel + NUM_CONTEXTS - self.current_context - 1) % 4;
                self.encoders.channel_returns_xy.encode_symbol(
                    &mut self.contexts[self.current_context].scanner_channel_model,
                    diff as u32,
                )?;

                if self.contexts[scanner_channel].unused {
                    trace!(
                        "point14: initializing context {} from context {}",
                        scanner_channel,
                        self.current_context
                    );
                    self.contexts[scanner_channel] = Point6Context::from_last_point(
                        &self.contexts[self.current_context].last_point,
                    );
                }
                self.current_context = scanner_channel;
            }

            let the_context = &mut self.contexts[self.current_context];
            let encoders = &mut self.encoders;

            if n != last_n {
                encoders.channel_returns_xy.encode_symbol(
                    the_context.number_of_returns_models[usize::from(last_n)]
                        .get_or_insert_with(|| ArithmeticModelBuilder::new(16).build()),
                    u32::from(n),
                )?;
            }

            // The return number is not +1 / -1 so we compress how it is different
            if changed_values & 3 == 3 {
                if gps_time_changed {
                    encoders.channel_returns_xy.encode_symbol(
                        the_context.return_number_models[usize::from(last_r)]
                            .get_or_insert_with(|| ArithmeticModelBuilder::new(16).build()),
                        u32::from(r),
                    )?;
                } else {
                    let diff = i32::from(r) - i32::from(last_r);
                    let sym = if diff > 1 { diff - 2 } else { diff + 16 - 2 };
                    encoders.channel_returns_xy.encode_symbol(
                        &mut the_context.return_number_gps_same_model,
                        sym as u32,
                    )?;
                }
            }

            let m = usize::from(NUMBER_RETURN_MAP_6CTX[usize::from(n)][usize::from(r)]);
            let l = usize::from(NUMBER_RETURN_LEVEL_8CTX[usize::from(n)][usize::from(r)]);
            let cpr = current_point_return_context(n, r);

            // X & Y
            let idx = (m << 1) | (gps_time_changed as usize);
            let median = the_context.last_x_diff_median5[idx].get();
            let diff = current_point.x.wrapping_sub(last_point.x);
            the_context.ic_dx.compress(
                &mut encoders.channel_returns_xy,
                median,
                diff,
                (n == 1) as u32,
            )?;
            the_context.last_x_diff_median5[idx].add(diff);

            let k_bits = the_context.ic_dx.k();
            let median = the_context.last_y_diff_median5[idx].get();
            let diff = current_point.y.wrapping_sub(last_point.y);
            the_context.ic_dy.compress(
                &mut encoders.channel_returns_xy,
                median,
                diff,
                dy_context_of(n, k_bits),
            )?;
            the_context.last_y_diff_median5[idx].add(diff);

            // Z
            let k_bits = (the_context.ic_dx.k() + the_context.ic_dy.k()) / 2;
            the_context.ic_z.compress(
                &mut encoders.z,
                the_context.last_z[l],
                current_point.z,
                z_context_of(n, k_bits),
            )?;
            the_context.last_z[l] = current_point.z;
            self.changed.z |= current_point.z != last_point.z;

            // Classification
            let ccc = (((last_point.classification & 0x1F) << 1) + (cpr == 3) as u8) as usize;
            encoders.classification.encode_symbol(
                the_context.classification_models[ccc]
                    .get_or_insert_with(|| ArithmeticModelBuilder::new(256).build()),
                u32::from(current_point.classification),
            )?;
            self.changed.classification |=
                current_point.classification != last_point.classification;

            // Flags
            let last_flags = flags_context_of(&last_point);
            let flags = flags_context_of(current_point);
            encoders.flags.encode_symbol(
                the_context.flags_models[usize::from(last_flags)]
                    .get_or_insert_with(|| ArithmeticModelBuilder::new(64).build()),
                u32::from(flags),
            )?;
            self.changed.flags |= flags != last_flags;

            // Intensity
            let idx = ((cpr << 1) | gps_time_changed as u32) as usize;
            the_context.ic_intensity.compress(
                &mut encoders.intensity,
                i32::from(the_context.last_intensities[idx]),
                i32::from(current_point.intensity),
                cpr,
            )?;
            the_context.last_intensities[idx] = current_point.intensity;
            self.changed.intensity |= current_point.intensity != last_point.intensity;

            if scan_angle_changed {
                self.changed.scan_angle = true;
                the_context.ic_scan_angle.compress(
                    &mut encoders.scan_angle,
                    i32::from(last_point.scan_angle_rank),
                    i32::from(current_point.scan_angle_rank),
                    gps_time_changed as u32,
                )?;
            }

            encoders.user_data.encode_symbol(
                the_context.user_data_models[usize::from(last_point.user_data / 4)]
                    .get_or_insert_with(|| ArithmeticModelBuilder::new(256).build()),
                u32::from(current_point.user_data),
            )?;
            self.changed.user_data |= current_point.user_data != last_point.user_data;

            if point_source_changed {
                self.changed.point_source = true;
                the_context.ic_point_source.compress(
                    &mut encoders.point_source,
                    i32::from(last_point.point_source_id),
                    i32::from(current_point.point_source_id),
                    0,
                )?;
            }

            if gps_time_changed {
                self.changed.gps_time = true;
                the_context
                    .gps_time_context
                    .compress(&mut encoders.gps_time, GpsTime::from(current_point.gps_time))?;
            }

            the_context.last_point = *current_point;
            the_context.gps_time_change = gps_time_changed;
            Ok(())
        }
    }

    impl Default for LasPoint6Compressor {
        fn default() -> Self {
            Self::new()
        }
    }

    impl<W: Write> LayeredFieldCompressor<W> for LasPoint6Compressor {
        fn size_of_field(&self) -> usize {
            Point6::SIZE
        }

        fn init_first_point(
            &mut self,
            dst: &mut W,
            first_point: &[u8],
            context: &mut usize,
        ) -> std::io::Result<()> {
            let first_point = &first_point[..Point6::SIZE];
            dst.write_all(first_point)?;
            let point = Point6::unpack_from(first_point);

            self.encoders.reset();
            self.changed = ChangedLayers::default();
            for ctx in &mut self.contexts {
                ctx.unused = true;
            }

            self.current_context = usize::from(point.scanner_channel);
            *context = self.current_context;
            self.contexts[self.current_context] = Point6Context::from_last_point(&point);
            Ok(())
        }

        fn compress_field_with(
            &mut self,
            current_point: &[u8],
            context: &mut usize,
        ) -> std::io::Result<()> {
            let point = Point6::unpack_from(current_point);
            self.compress_point(&point)?;
            *context = self.current_context;
            Ok(())
        }

        fn write_layers_sizes(&mut self, dst: &mut W) -> std::io::Result<()> {
            let encoders = &mut self.encoders;
            let changed = &self.changed;
            let sizes = LayerSizes {
                channel_returns_xy: layer_size_of(true, &mut encoders.channel_returns_xy)?,
                z: layer_size_of(changed.z, &mut encoders.z)?,
                classification: layer_size_of(changed.classification, &mut encoders.classification)?,
                flags: layer_size_of(changed.flags, &mut encoders.flags)?,
                intensity: layer_size_of(changed.intensity, &mut encoders.intensity)?,
                scan_angle: layer_size_of(changed.scan_angle, &mut encoders.scan_angle)?,
                user_data: layer_size_of(changed.user_data, &mut encoders.user_data)?,
                point_source: layer_size_of(changed.point_source, &mut encoders.point_source)?,
                gps_time: layer_size_of(changed.gps_time, &mut encoders.gps_time)?,
            };
            debug!("point14 layers sizes: {:?}", sizes);
            sizes.write_to(dst)
        }

        fn write_layers(&mut self, dst: &mut W) -> std::io::Result<()> {
            copy_encoder_content_to(&self.encoders.channel_returns_xy, dst)?;
            if self.changed.z {
                copy_encoder_content_to(&self.encoders.z, dst)?;
            }
            if self.changed.classification {
                copy_encoder_content_to(&self.encoders.classification, dst)?;
            }
            if self.changed.flags {
                copy_encoder_content_to(&self.encoders.flags, dst)?;
            }
            if self.changed.intensity {
                copy_encoder_content_to(&self.encoders.intensity, dst)?;
            }
            if self.changed.scan_angle {
                copy_encoder_content_to(&self.encoders.scan_angle, dst)?;
            }
            if self.changed.user_data {
                copy_encoder_content_to(&self.encoders.user_data, dst)?;
            }
            if self.changed.point_source {
                copy_encoder_content_to(&self.encoders.point_source, dst)?;
            }
            if self.changed.gps_time {
                copy_encoder_content_to(&self.encoders.gps_time, dst)?;
            }
            Ok(())
        }
    }

    /***************************************************************************************
                                    Decompression
    ***************************************************************************************/

    // Each layer has its own decoder that holds the compressed data
    // to be decoded
    struct Point6Decoders {
        channel_returns_xy: ArithmeticDecoder<Cursor<Vec<u8>>>,
        z: ArithmeticDecoder<Cursor<Vec<u8>>>,
        classification: ArithmeticDecoder<Cursor<Vec<u8>>>,
        flags: ArithmeticDecoder<Cursor<Vec<u8>>>,
        intensity: ArithmeticDecoder<Cursor<Vec<u8>>>,
        scan_angle: ArithmeticDecoder<Cursor<Vec<u8>>>,
        user_data: ArithmeticDecoder<Cursor<Vec<u8>>>,
        point_source: ArithmeticDecoder<Cursor<Vec<u8>>>,
        gps_time: ArithmeticDecoder<Cursor<Vec<u8>>>,
    }

    impl Default for Point6Decoders {
        fn default() -> Self {
            Self {
                channel_returns_xy: ArithmeticDecoder::new(Cursor::new(Vec::<u8>::new())),
                z: ArithmeticDecoder::new(Cursor::new(Vec::<u8>::new())),
                classification: ArithmeticDecoder::new(Cursor::new(Vec::<u8>::new())),
                flags: ArithmeticDecoder::new(Cursor::new(Vec::<u8>::new())),
                intensity: ArithmeticDecoder::new(Cursor::new(Vec::<u8>::new())),
                scan_angle: ArithmeticDecoder::new(Cursor::new(Vec::<u8>::new())),
                user_data: ArithmeticDecoder::new(Cursor::new(Vec::<u8>::new())),
                point_source: ArithmeticDecoder::new(Cursor::new(Vec::<u8>::new())),
                gps_time: ArithmeticDecoder::new(Cursor::new(Vec::<u8>::new())),
            }
        }
    }

    pub struct LasPoint6Decompressor {
        decoders: Point6Decoders,
        // layers that have data and were requested
        changed: ChangedLayers,
        layers_sizes: LayerSizes,
        selection: DecompressionSelector,

        current_context: usize,
        contexts: [Point6Context<IntegerDecompressor>; NUM_CONTEXTS],
    }

    impl LasPoint6Decompressor {
        pub fn new() -> Self {
            Self::selective(DecompressionSelector::all())
        }

        pub fn selective(selection: DecompressionSelector) -> Self {
            Self {
                decoders: Point6Decoders::default(),
                changed: ChangedLayers::default(),
                layers_sizes: LayerSizes::default(),
                selection,
                current_context: 0,
                contexts: Point6Context::unused_contexts(),
            }
        }

        fn decompress_point(&mut self) -> std::io::Result<Point6> {
            let changed_values = {
                let the_context = &mut self.contexts[self.current_context];
                let lpr = the_context.last_point_return_context();
                self.decoders
                    .channel_returns_xy
                    .decode_symbol(&mut the_context.changed_values_models[lpr])?
            };

            // Scanner channel changed
            if changed_values & (1 << 6) != 0 {
                let diff = self.decoders.channel_returns_xy.decode_symbol(
                    &mut self.contexts[self.current_context].scanner_channel_model,
                )?;
                let scanner_channel = (self.current_context + diff as usize + 1) % NUM_CONTEXTS;

                if self.contexts[scanner_channel].unused {
                    trace!(
                        "point14: initializing context {} from context {}",
                        scanner_channel,
                        self.current_context
                    );
                    self.contexts[scanner_channel] = Point6Context::from_last_point(
                        &self.contexts[self.current_context].last_point,
                    );
                }
                self.current_context = scanner_channel;
            }

            let point_source_changed = is_nth_bit_set!(changed_values, 5);
            let gps_time_changed = is_nth_bit_set!(changed_values, 4);
            let scan_angle_changed = is_nth_bit_set!(changed_values, 3);

            let the_context = &mut self.contexts[self.current_context];
            let decoders = &mut self.decoders;
            let last_point = &mut the_context.last_point;
            last_point.scanner_channel = self.current_context as u8;

            let last_n = last_point.number_of_returns;
            let last_r = last_point.return_number;

            let n = if is_nth_bit_set!(changed_values, 2) {
                decoders.channel_returns_xy.decode_symbol(
                    the_context.number_of_returns_models[usize::from(last_n)]
                        .get_or_insert_with(|| ArithmeticModelBuilder::new(16).build()),
                )? as u8
            } else {
                last_n
            };
            last_point.number_of_returns = n;

            let r = match changed_values & 3 {
                0 => last_r,
                1 => (last_r + 1) % 16,
                2 => (last_r + 15) % 16,
                _ => {
                    // The return number is not +1 / -1 so we decompress how it is different
                    if gps_time_changed {
                        decoders.channel_returns_xy.decode_symbol(
                            the_context.return_number_models[usize::from(last_r)]
                                .get_or_insert_with(|| ArithmeticModelBuilder::new(16).build()),
                        )? as u8
                    } else {
                        let sym = decoders
                            .channel_returns_xy
                            .decode_symbol(&mut the_context.return_number_gps_same_model)?;
                        ((u32::from(last_r) + sym + 2) % 16) as u8
                    }
                }
            };
            last_point.return_number = r;

            let m = usize::from(NUMBER_RETURN_MAP_6CTX[usize::from(n)][usize::from(r)]);
            let l = usize::from(NUMBER_RETURN_LEVEL_8CTX[usize::from(n)][usize::from(r)]);
            let cpr = current_point_return_context(n, r);

            // X & Y
            let idx = (m << 1) | (gps_time_changed as usize);
            let median = the_context.last_x_diff_median5[idx].get();
            let diff = the_context.ic_dx.decompress(
                &mut decoders.channel_returns_xy,
                median,
                (n == 1) as u32,
            )?;
            last_point.x = last_point.x.wrapping_add(diff);
            the_context.last_x_diff_median5[idx].add(diff);

            let k_bits = the_context.ic_dx.k();
            let median = the_context.last_y_diff_median5[idx].get();
            let diff = the_context.ic_dy.decompress(
                &mut decoders.channel_returns_xy,
                median,
                dy_context_of(n, k_bits),
            )?;
            last_point.y = last_point.y.wrapping_add(diff);
            the_context.last_y_diff_median5[idx].add(diff);

            if self.changed.z {
                let k_bits = (the_context.ic_dx.k() + the_context.ic_dy.k()) / 2;
                last_point.z = the_context.ic_z.decompress(
                    &mut decoders.z,
                    the_context.last_z[l],
                    z_context_of(n, k_bits),
                )?;
                the_context.last_z[l] = last_point.z;
            }

            if self.changed.classification {
                let ccc =
                    (((last_point.classification & 0x1F) << 1) + (cpr == 3) as u8) as usize;
                last_point.classification = decoders.classification.decode_symbol(
                    the_context.classification_models[ccc]
                        .get_or_insert_with(|| ArithmeticModelBuilder::new(256).build()),
                )? as u8;
            }

            if self.changed.flags {
                let last_flags = flags_context_of(last_point);
                let flags = decoders.flags.decode_symbol(
                    the_context.flags_models[usize::from(last_flags)]
                        .get_or_insert_with(|| ArithmeticModelBuilder::new(64).build()),
                )?;
                last_point.edge_of_flight_line = is_nth_bit_set!(flags, 5);
                last_point.scan_direction_flag = is_nth_bit_set!(flags, 4);
                last_point.classification_flags = (flags & 0b0000_1111) as u8;
            }

            if self.changed.intensity {
                let idx = ((cpr << 1) | gps_time_changed as u32) as usize;
                last_point.intensity = the_context.ic_intensity.decompress(
                    &mut decoders.intensity,
                    i32::from(the_context.last_intensities[idx]),
                    cpr,
                )? as u16;
                the_context.last_intensities[idx] = last_point.intensity;
            }

            if self.changed.scan_angle && scan_angle_changed {
                last_point.scan_angle_rank = the_context.ic_scan_angle.decompress(
                    &mut decoders.scan_angle,
                    i32::from(last_point.scan_angle_rank),
                    gps_time_changed as u32,
                )? as i16;
            }

            if self.changed.user_data {
                last_point.user_data = decoders.user_data.decode_symbol(
                    the_context.user_data_models[usize::from(last_point.user_data / 4)]
                        .get_or_insert_with(|| ArithmeticModelBuilder::new(256).build()),
                )? as u8;
            }

            if self.changed.point_source && point_source_changed {
                last_point.point_source_id = the_context.ic_point_source.decompress(
                    &mut decoders.point_source,
                    i32::from(last_point.point_source_id),
                    0,
                )? as u16;
            }

            if self.changed.gps_time && gps_time_changed {
                let gps_time = the_context
                    .gps_time_context
                    .decompress(&mut decoders.gps_time)?;
                last_point.gps_time = f64::from(gps_time);
            }

            the_context.gps_time_change = gps_time_changed;
            Ok(*last_point)
        }
    }

    impl Default for LasPoint6Decompressor {
        fn default() -> Self {
            Self::new()
        }
    }

    impl<R: Read + Seek> LayeredFieldDecompressor<R> for LasPoint6Decompressor {
        fn size_of_field(&self) -> usize {
            Point6::SIZE
        }

        fn init_first_point(
            &mut self,
            src: &mut R,
            first_point: &mut [u8],
            context: &mut usize,
        ) -> std::io::Result<()> {
            let first_point = &mut first_point[..Point6::SIZE];
            src.read_exact(first_point)?;
            let point = Point6::unpack_from(first_point);

            for ctx in &mut self.contexts {
                ctx.unused = true;
            }
            self.current_context = usize::from(point.scanner_channel);
            *context = self.current_context;
            self.contexts[self.current_context] = Point6Context::from_last_point(&point);
            Ok(())
        }

        fn decompress_field_with(
            &mut self,
            current_point: &mut [u8],
            context: &mut usize,
        ) -> std::io::Result<()> {
            let point = self.decompress_point()?;
            point.pack_into(current_point);
            *context = self.current_context;
            Ok(())
        }

        fn read_layers_sizes(&mut self, src: &mut R) -> std::io::Result<()> {
            self.layers_sizes = LayerSizes::read_from(src)?;
            debug!("point14 layers sizes: {:?}", self.layers_sizes);
            Ok(())
        }

        fn read_layers(&mut self, src: &mut R) -> std::io::Result<()> {
            let num_bytes = self.layers_sizes;
            let selection = self.selection;
            let decoders = &mut self.decoders;

            // Always decoded: x, y, returns and channel
            copy_bytes_into_decoder(
                true,
                num_bytes.channel_returns_xy as usize,
                &mut decoders.channel_returns_xy,
                src,
            )?;

            self.changed = ChangedLayers {
                z: copy_bytes_into_decoder(
                    selection.should_decompress_z(),
                    num_bytes.z as usize,
                    &mut decoders.z,
                    src,
                )?,
                classification: copy_bytes_into_decoder(
                    selection.should_decompress_classification(),
                    num_bytes.classification as usize,
                    &mut decoders.classification,
                    src,
                )?,
                flags: copy_bytes_into_decoder(
                    selection.should_decompress_flags(),
                    num_bytes.flags as usize,
                    &mut decoders.flags,
                    src,
                )?,
                intensity: copy_bytes_into_decoder(
                    selection.should_decompress_intensity(),
                    num_bytes.intensity as usize,
                    &mut decoders.intensity,
                    src,
                )?,
                scan_angle: copy_bytes_into_decoder(
                    selection.should_decompress_scan_angle(),
                    num_bytes.scan_angle as usize,
                    &mut decoders.scan_angle,
                    src,
                )?,
                user_data: copy_bytes_into_decoder(
                    selection.should_decompress_user_data(),
                    num_bytes.user_data as usize,
                    &mut decoders.user_data,
                    src,
                )?,
                point_source: copy_bytes_into_decoder(
                    selection.should_decompress_point_source_id(),
                    num_bytes.point_source as usize,
                    &mut decoders.point_source,
                    src,
                )?,
                gps_time: copy_bytes_into_decoder(
                    selection.should_decompress_gps_time(),
                    num_bytes.gps_time as usize,
                    &mut decoders.gps_time,
                    src,
                )?,
            };
            Ok(())
        }
    }

    #[cfg(test)]
    mod test {
        use std::io::{Cursor, Seek, SeekFrom};

        use super::*;

        fn point_at(i: i32) -> Point6 {
            Point6 {
                x: 1000 + i * 3,
                y: 2000 - i * 5,
                z: 300 + (i % 7),
                intensity: (i * 11 % 400) as u16,
                return_number: (i % 3 + 1) as u8,
                number_of_returns: 3,
                classification: if i % 5 == 0 { 2 } else { 6 },
                scan_angle_rank: (i % 4 - 2) as i16,
                point_source_id: 12,
                gps_time: 10_000.0 + f64::from(i / 3) * 0.5,
                ..Default::default()
            }
        }

        #[test]
        fn test_layer_sizes_layout() {
            let sizes = LayerSizes {
                channel_returns_xy: 1,
                gps_time: 9,
                ..Default::default()
            };
            let mut buf = Vec::new();
            sizes.write_to(&mut buf).unwrap();
            assert_eq!(buf.len(), 36);
            assert_eq!(&buf[..4], &[1, 0, 0, 0]);
            assert_eq!(&buf[32..], &[9, 0, 0, 0]);
            assert_eq!(LayerSizes::read_from(&mut Cursor::new(buf)).unwrap(), sizes);
        }

        #[test]
        fn test_constant_layers_are_not_written() {
            let mut point6_compressor = LasPoint6Compressor::new();
            let compressor: &mut dyn LayeredFieldCompressor<Cursor<Vec<u8>>> =
                &mut point6_compressor;
            let mut dst = Cursor::new(Vec::<u8>::new());
            let mut context = 0usize;
            let mut buf = [0u8; Point6::SIZE];

            let mut point = Point6::default();
            point.z = 12;
            point.pack_into(&mut buf);
            compressor
                .init_first_point(&mut dst, &buf, &mut context)
                .unwrap();
            for i in 1..50 {
                point.x = i;
                point.pack_into(&mut buf);
                compressor.compress_field_with(&buf, &mut context).unwrap();
            }
            compressor.write_layers_sizes(&mut dst).unwrap();

            dst.seek(SeekFrom::Start(Point6::SIZE as u64)).unwrap();
            let sizes = LayerSizes::read_from(&mut dst).unwrap();
            assert!(sizes.channel_returns_xy > 0);
            assert_eq!(sizes.z, 0);
            assert_eq!(sizes.intensity, 0);
            assert_eq!(sizes.gps_time, 0);
        }

        #[test]
        fn test_field_round_trip() {
            let points: Vec<Point6> = (0..200).map(point_at).collect();
            let mut buf = [0u8; Point6::SIZE];

            let mut point6_compressor = LasPoint6Compressor::new();
            let compressor: &mut dyn LayeredFieldCompressor<Cursor<Vec<u8>>> =
                &mut point6_compressor;
            let mut dst = Cursor::new(Vec::<u8>::new());
            let mut context = 0usize;
            points[0].pack_into(&mut buf);
            compressor
                .init_first_point(&mut dst, &buf, &mut context)
                .unwrap();
            for point in &points[1..] {
                point.pack_into(&mut buf);
                compressor.compress_field_with(&buf, &mut context).unwrap();
            }
            compressor.write_layers_sizes(&mut dst).unwrap();
            compressor.write_layers(&mut dst).unwrap();

            dst.set_position(0);
            let mut point6_decompressor = LasPoint6Decompressor::new();
            let decompressor: &mut dyn LayeredFieldDecompressor<Cursor<Vec<u8>>> =
                &mut point6_decompressor;
            let mut context = 0usize;
            decompressor
                .init_first_point(&mut dst, &mut buf, &mut context)
                .unwrap();
            assert_eq!(Point6::unpack_from(&buf), points[0]);
            decompressor.read_layers_sizes(&mut dst).unwrap();
            decompressor.read_layers(&mut dst).unwrap();
            for point in &points[1..] {
                decompressor
                    .decompress_field_with(&mut buf, &mut context)
                    .unwrap();
                assert_eq!(&Point6::unpack_from(&buf), point);
            }
        }
    }
}
