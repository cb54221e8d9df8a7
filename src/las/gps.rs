/*
===============================================================================

  PROGRAMMERS:

    martin.isenburg@rapidlasso.com  -  http://rapidlasso.com
    uday.karan@gmail.com - Hobu, Inc.

  COPYRIGHT:

    (c) 2007-2014, martin isenburg, rapidlasso - tools to catch reality
    (c) 2014, Uday Verma, Hobu, Inc.
    (c) 2019, Thomas Montaigu

    This is free software; you can redistribute and/or modify it under the
    terms of the GNU Lesser General Licence as published by the Free Software
    Foundation. See the COPYING file for more information.

    This software is distributed WITHOUT ANY WARRANTY and without even the
    implied warranty of MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.

  CHANGE HISTORY:
    6 June 2019: Translated to Rust
===============================================================================
*/
//! GpsTime and its compression.
//!
//! Gps times are predicted from up to 4 interleaved time sequences.
//! Each sequence (slot) remembers its last time and last difference, new
//! times are coded as a multiple of the last difference of their sequence
//! plus a correction.
//!
//! The sequential (v2) and layered (v3) streams share this coding, they only
//! differ in the symbols: v2 has dedicated symbols for an unchanged time.
use std::io::{Read, Write};

use log::trace;

use crate::compressors::{IntegerCodec, IntegerCompressor};
use crate::decoders::{corrupted_data, ArithmeticDecoder};
use crate::decompressors::IntegerDecompressor;
use crate::encoders::ArithmeticEncoder;
use crate::las::utils::i32_quantize;
use crate::models::{ArithmeticModel, ArithmeticModelBuilder};
use crate::packers::Packable;

/// Struct to store GpsTime
///
/// As the value (f64 as per LAS spec) needs to be reinterpreted
/// (not simply converted with 'as') to i64 (or u64)
/// during compression / decompression this struct provides a convenient wrapper
#[derive(Default, Copy, Clone, Debug, PartialEq)]
pub struct GpsTime {
    pub value: i64,
}

impl From<f64> for GpsTime {
    fn from(v: f64) -> Self {
        Self {
            value: v.to_bits() as i64,
        }
    }
}

impl From<GpsTime> for f64 {
    fn from(gps: GpsTime) -> Self {
        f64::from_bits(gps.value as u64)
    }
}

impl From<i64> for GpsTime {
    fn from(value: i64) -> Self {
        Self { value }
    }
}

impl GpsTime {
    pub const SIZE: usize = 8;

    /// Integer difference with `other` if it fits in 32 bits
    #[inline]
    fn diff_32(self, other: GpsTime) -> Option<i32> {
        let diff_64 = self.value.wrapping_sub(other.value);
        let diff = diff_64 as i32;
        if i64::from(diff) == diff_64 {
            Some(diff)
        } else {
            None
        }
    }

    #[inline]
    fn upper_32(self) -> i32 {
        (self.value >> 32) as i32
    }
}

impl Packable for GpsTime {
    fn unpack_from(input: &[u8]) -> Self {
        let lower = u32::unpack_from(&input[0..4]);
        let upper = u32::unpack_from(&input[4..8]);
        GpsTime {
            value: i64::from(upper) << 32 | i64::from(lower),
        }
    }

    fn pack_into(&self, output: &mut [u8]) {
        (self.value as u32).pack_into(&mut output[0..4]);
        ((self.value >> 32) as u32).pack_into(&mut output[4..8]);
    }
}

pub const LASZIP_GPS_TIME_MULTI: i32 = 500;
pub const LASZIP_GPS_TIME_MULTI_MINUS: i32 = -10;

const NUM_SEQUENCES: usize = 4;

/// Symbol layout of the gps time models
#[derive(Copy, Clone, Debug, PartialEq)]
pub(crate) enum GpsTimeCoding {
    /// Point10 streams (v2), an unchanged time has its own symbols
    Sequential,
    /// Point14 streams (v3)
    Layered,
}

impl GpsTimeCoding {
    /// Symbols of the no-diff model before the "difference follows" one
    fn no_diff_offset(self) -> u32 {
        match self {
            GpsTimeCoding::Sequential => 1,
            GpsTimeCoding::Layered => 0,
        }
    }

    fn no_diff_symbols(self) -> u32 {
        self.no_diff_offset() + 5
    }

    fn multi_unchanged(self) -> Option<i32> {
        match self {
            GpsTimeCoding::Sequential => {
                Some(LASZIP_GPS_TIME_MULTI - LASZIP_GPS_TIME_MULTI_MINUS + 1)
            }
            GpsTimeCoding::Layered => None,
        }
    }

    fn multi_code_full(self) -> i32 {
        LASZIP_GPS_TIME_MULTI - LASZIP_GPS_TIME_MULTI_MINUS + 1 + self.no_diff_offset() as i32
    }

    fn multi_symbols(self) -> u32 {
        (self.multi_code_full() + NUM_SEQUENCES as i32) as u32
    }
}

/// State of the gps time coding, one per scanner channel in layered streams
#[derive(Clone)]
pub(crate) struct GpsTimeContext<IC> {
    coding: GpsTimeCoding,
    last: usize,
    next: usize,
    last_gps_times: [GpsTime; NUM_SEQUENCES],
    last_gps_diffs: [i32; NUM_SEQUENCES],
    multi_extreme_counters: [i32; NUM_SEQUENCES],

    multi_model: ArithmeticModel,
    no_diff_model: ArithmeticModel,
    ic: IC,
}

impl<IC: IntegerCodec> GpsTimeContext<IC> {
    pub(crate) fn new(first_gps_time: GpsTime, coding: GpsTimeCoding) -> Self {
        let mut last_gps_times = [GpsTime::default(); NUM_SEQUENCES];
        last_gps_times[0] = first_gps_time;
        Self {
            coding,
            last: 0,
            next: 0,
            last_gps_times,
            last_gps_diffs: [0; NUM_SEQUENCES],
            multi_extreme_counters: [0; NUM_SEQUENCES],
            multi_model: ArithmeticModelBuilder::new(coding.multi_symbols()).build(),
            no_diff_model: ArithmeticModelBuilder::new(coding.no_diff_symbols()).build(),
            ic: IC::with_bits_and_contexts(32, 9),
        }
    }
}

impl<IC> GpsTimeContext<IC> {
    /// The gps time of the sequence currently followed
    pub(crate) fn last_gps_time(&self) -> GpsTime {
        self.last_gps_times[self.last]
    }

    fn count_extreme(&mut self, diff: i32) {
        self.multi_extreme_counters[self.last] += 1;
        if self.multi_extreme_counters[self.last] > 3 {
            self.last_gps_diffs[self.last] = diff;
            self.multi_extreme_counters[self.last] = 0;
        }
    }

    fn start_new_sequence(&mut self, gps_time: GpsTime) {
        self.next = (self.next + 1) & 3;
        self.last = self.next;
        self.last_gps_diffs[self.last] = 0;
        self.multi_extreme_counters[self.last] = 0;
        self.last_gps_times[self.last] = gps_time;
        trace!("gps time starts sequence {}", self.last);
    }

    fn other_sequence_of(&self, gps_time: GpsTime) -> Option<usize> {
        (1..NUM_SEQUENCES).find(|i| {
            gps_time
                .diff_32(self.last_gps_times[(self.last + i) & 3])
                .is_some()
        })
    }

    fn switch_sequence(&mut self, offset: usize) {
        self.last = (self.last + offset) & 3;
        trace!("gps time switches to sequence {}", self.last);
    }
}

impl GpsTimeContext<IntegerCompressor> {
    pub(crate) fn compress<W: Write>(
        &mut self,
        encoder: &mut ArithmeticEncoder<W>,
        gps_time: GpsTime,
    ) -> std::io::Result<()> {
        let offset = self.coding.no_diff_offset();
        let code_full = self.coding.multi_code_full();
        // at most one switch to another sequence is needed
        for _ in 0..NUM_SEQUENCES {
            let last_diff = self.last_gps_diffs[self.last];

            if let Some(unchanged) = self.coding.multi_unchanged() {
                if gps_time == self.last_gps_times[self.last] {
                    if last_diff == 0 {
                        encoder.encode_symbol(&mut self.no_diff_model, 0)?;
                    } else {
                        encoder.encode_symbol(&mut self.multi_model, unchanged as u32)?;
                    }
                    return Ok(());
                }
            }

            let curr_diff = gps_time.diff_32(self.last_gps_times[self.last]);
            if last_diff == 0 {
                if let Some(diff) = curr_diff {
                    // the difference can be represented with 32 bits
                    encoder.encode_symbol(&mut self.no_diff_model, offset)?;
                    self.ic.compress(encoder, 0, diff, 0)?;
                    self.last_gps_diffs[self.last] = diff;
                    self.multi_extreme_counters[self.last] = 0;
                } else if let Some(i) = self.other_sequence_of(gps_time) {
                    // the time belongs to another sequence
                    encoder.encode_symbol(&mut self.no_diff_model, offset + 1 + i as u32)?;
                    self.switch_sequence(i);
                    continue;
                } else {
                    encoder.encode_symbol(&mut self.no_diff_model, offset + 1)?;
                    self.compress_full(encoder, gps_time)?;
                    return Ok(());
                }
            } else if let Some(diff) = curr_diff {
                self.compress_diff(encoder, last_diff, diff)?;
            } else if let Some(i) = self.other_sequence_of(gps_time) {
                encoder.encode_symbol(&mut self.multi_model, (code_full + i as i32) as u32)?;
                self.switch_sequence(i);
                continue;
            } else {
                encoder.encode_symbol(&mut self.multi_model, code_full as u32)?;
                self.compress_full(encoder, gps_time)?;
                return Ok(());
            }
            self.last_gps_times[self.last] = gps_time;
            return Ok(());
        }
        Err(std::io::Error::new(
            std::io::ErrorKind::Other,
            "gps time sequence search did not terminate",
        ))
    }

    fn compress_diff<W: Write>(
        &mut self,
        encoder: &mut ArithmeticEncoder<W>,
        last_diff: i32,
        diff: i32,
    ) -> std::io::Result<()> {
        // multiplier between current and last integer difference
        let multi = i32_quantize(diff as f32 / last_diff as f32);

        if multi == 1 {
            // the case we get most often for regularly spaced pulses
            encoder.encode_symbol(&mut self.multi_model, 1)?;
            self.ic.compress(encoder, last_diff, diff, 1)?;
            self.multi_extreme_counters[self.last] = 0;
        } else if multi > 0 {
            if multi < LASZIP_GPS_TIME_MULTI {
                encoder.encode_symbol(&mut self.multi_model, multi as u32)?;
                let context = if multi < 10 { 2 } else { 3 };
                self.ic
                    .compress(encoder, multi.wrapping_mul(last_diff), diff, context)?;
            } else {
                encoder.encode_symbol(&mut self.multi_model, LASZIP_GPS_TIME_MULTI as u32)?;
                self.ic.compress(
                    encoder,
                    LASZIP_GPS_TIME_MULTI.wrapping_mul(last_diff),
                    diff,
                    4,
                )?;
                self.count_extreme(diff);
            }
        } else if multi < 0 {
            if multi > LASZIP_GPS_TIME_MULTI_MINUS {
                encoder
                    .encode_symbol(&mut self.multi_model, (LASZIP_GPS_TIME_MULTI - multi) as u32)?;
                self.ic
                    .compress(encoder, multi.wrapping_mul(last_diff), diff, 5)?;
            } else {
                encoder.encode_symbol(
                    &mut self.multi_model,
                    (LASZIP_GPS_TIME_MULTI - LASZIP_GPS_TIME_MULTI_MINUS) as u32,
                )?;
                self.ic.compress(
                    encoder,
                    LASZIP_GPS_TIME_MULTI_MINUS.wrapping_mul(last_diff),
                    diff,
                    6,
                )?;
                self.count_extreme(diff);
            }
        } else {
            encoder.encode_symbol(&mut self.multi_model, 0)?;
            self.ic.compress(encoder, 0, diff, 7)?;
            self.count_extreme(diff);
        }
        Ok(())
    }

    // the upper 32 bits are predicted, the lower 32 bits are written raw
    fn compress_full<W: Write>(
        &mut self,
        encoder: &mut ArithmeticEncoder<W>,
        gps_time: GpsTime,
    ) -> std::io::Result<()> {
        self.ic.compress(
            encoder,
            self.last_gps_times[self.last].upper_32(),
            gps_time.upper_32(),
            8,
        )?;
        encoder.write_int(gps_time.value as u32)?;
        self.start_new_sequence(gps_time);
        Ok(())
    }
}

impl GpsTimeContext<IntegerDecompressor> {
    pub(crate) fn decompress<R: Read>(
        &mut self,
        decoder: &mut ArithmeticDecoder<R>,
    ) -> std::io::Result<GpsTime> {
        let offset = self.coding.no_diff_offset();
        let code_full = self.coding.multi_code_full();
        let unchanged = self.coding.multi_unchanged();
        // a valid stream switches sequence at most once
        for _ in 0..NUM_SEQUENCES {
            let last_diff = self.last_gps_diffs[self.last];
            if last_diff == 0 {
                let multi = decoder.decode_symbol(&mut self.no_diff_model)?;
                if multi < offset {
                    // unchanged
                } else if multi == offset {
                    // the difference can be represented with 32 bits
                    let diff = self.ic.decompress(decoder, 0, 0)?;
                    self.last_gps_diffs[self.last] = diff;
                    self.add_to_last(diff);
                    self.multi_extreme_counters[self.last] = 0;
                } else if multi == offset + 1 {
                    self.decompress_full(decoder)?;
                } else {
                    self.switch_sequence((multi - offset - 1) as usize);
                    continue;
                }
            } else {
                let multi = decoder.decode_symbol(&mut self.multi_model)? as i32;
                if Some(multi) == unchanged {
                    // unchanged
                } else if multi < code_full {
                    let diff = self.decompress_diff(decoder, last_diff, multi)?;
                    self.add_to_last(diff);
                } else if multi == code_full {
                    self.decompress_full(decoder)?;
                } else {
                    self.switch_sequence((multi - code_full) as usize);
                    continue;
                }
            }
            return Ok(self.last_gps_time());
        }
        Err(corrupted_data("gps time sequence search did not terminate"))
    }

    fn decompress_diff<R: Read>(
        &mut self,
        decoder: &mut ArithmeticDecoder<R>,
        last_diff: i32,
        multi: i32,
    ) -> std::io::Result<i32> {
        if multi == 1 {
            let diff = self.ic.decompress(decoder, last_diff, 1)?;
            self.multi_extreme_counters[self.last] = 0;
            Ok(diff)
        } else if multi == 0 {
            let diff = self.ic.decompress(decoder, 0, 7)?;
            self.count_extreme(diff);
            Ok(diff)
        } else if multi < LASZIP_GPS_TIME_MULTI {
            let context = if multi < 10 { 2 } else { 3 };
            self.ic
                .decompress(decoder, multi.wrapping_mul(last_diff), context)
        } else if multi == LASZIP_GPS_TIME_MULTI {
            let diff = self.ic.decompress(
                decoder,
                LASZIP_GPS_TIME_MULTI.wrapping_mul(last_diff),
                4,
            )?;
            self.count_extreme(diff);
            Ok(diff)
        } else {
            let multi = LASZIP_GPS_TIME_MULTI - multi;
            if multi > LASZIP_GPS_TIME_MULTI_MINUS {
                self.ic
                    .decompress(decoder, multi.wrapping_mul(last_diff), 5)
            } else {
                let diff = self.ic.decompress(
                    decoder,
                    LASZIP_GPS_TIME_MULTI_MINUS.wrapping_mul(last_diff),
                    6,
                )?;
                self.count_extreme(diff);
                Ok(diff)
            }
        }
    }

    fn decompress_full<R: Read>(&mut self, decoder: &mut ArithmeticDecoder<R>) -> std::io::Result<()> {
        let upper = self
            .ic
            .decompress(decoder, self.last_gps_times[self.last].upper_32(), 8)?;
        let lower = decoder.read_int()?;
        self.start_new_sequence(GpsTime::from(i64::from(upper) << 32 | i64::from(lower)));
        Ok(())
    }

    fn add_to_last(&mut self, diff: i32) {
        let last = &mut self.last_gps_times[self.last];
        last.value = last.value.wrapping_add(i64::from(diff));
    }
}

pub mod v2 {
    //! Gps time of the point formats 1 and 3, compressed in a single stream.
    use std::io::{Read, Write};

    use crate::compressors::IntegerCompressor;
    use crate::decoders::ArithmeticDecoder;
    use crate::decompressors::IntegerDecompressor;
    use crate::encoders::ArithmeticEncoder;
    use crate::packers::Packable;
    use crate::record::{FieldCompressor, FieldDecompressor};

    use super::{GpsTime, GpsTimeCoding, GpsTimeContext};

    pub struct LasGpsTimeCompressor {
        context: GpsTimeContext<IntegerCompressor>,
    }

    impl LasGpsTimeCompressor {
        pub fn new() -> Self {
            Self {
                context: GpsTimeContext::new(GpsTime::default(), GpsTimeCoding::Sequential),
            }
        }
    }

    impl Default for LasGpsTimeCompressor {
        fn default() -> Self {
            Self::new()
        }
    }

    impl<W: Write> FieldCompressor<W> for LasGpsTimeCompressor {
        fn size_of_field(&self) -> usize {
            GpsTime::SIZE
        }

        fn compress_first(&mut self, dst: &mut W, first_point: &[u8]) -> std::io::Result<()> {
            let first_point = &first_point[..GpsTime::SIZE];
            self.context =
                GpsTimeContext::new(GpsTime::unpack_from(first_point), GpsTimeCoding::Sequential);
            dst.write_all(first_point)
        }

        fn compress_with(
            &mut self,
            encoder: &mut ArithmeticEncoder<W>,
            buf: &[u8],
        ) -> std::io::Result<()> {
            self.context.compress(encoder, GpsTime::unpack_from(buf))
        }
    }

    pub struct LasGpsTimeDecompressor {
        context: GpsTimeContext<IntegerDecompressor>,
    }

    impl LasGpsTimeDecompressor {
        pub fn new() -> Self {
            Self {
                context: GpsTimeContext::new(GpsTime::default(), GpsTimeCoding::Sequential),
            }
        }
    }

    impl Default for LasGpsTimeDecompressor {
        fn default() -> Self {
            Self::new()
        }
    }

    impl<R: Read> FieldDecompressor<R> for LasGpsTimeDecompressor {
        fn size_of_field(&self) -> usize {
            GpsTime::SIZE
        }

        fn decompress_first(&mut self, src: &mut R, first_point: &mut [u8]) -> std::io::Result<()> {
            let first_point = &mut first_point[..GpsTime::SIZE];
            src.read_exact(first_point)?;
            self.context =
                GpsTimeContext::new(GpsTime::unpack_from(first_point), GpsTimeCoding::Sequential);
            Ok(())
        }

        fn decompress_with(
            &mut self,
            decoder: &mut ArithmeticDecoder<R>,
            buf: &mut [u8],
        ) -> std::io::Result<()> {
            let gps_time = self.context.decompress(decoder)?;
            gps_time.pack_into(&mut buf[..GpsTime::SIZE]);
            Ok(())
        }
    }

}

#[cfg(test)]
mod test {
    use std::io::Cursor;

    use super::*;

    fn encode(times: &[GpsTime], coding: GpsTimeCoding) -> Vec<u8> {
        let mut encoder = ArithmeticEncoder::new(Cursor::new(Vec::<u8>::new()));
        let mut context = GpsTimeContext::<IntegerCompressor>::new(times[0], coding);
        for gps_time in &times[1..] {
            context.compress(&mut encoder, *gps_time).unwrap();
        }
        encoder.done().unwrap();
        encoder.into_stream().into_inner()
    }

    fn decode(first: GpsTime, count: usize, bytes: Vec<u8>, coding: GpsTimeCoding) -> Vec<GpsTime> {
        let mut decoder = ArithmeticDecoder::new(Cursor::new(bytes));
        decoder.read_init_bytes().unwrap();
        let mut context = GpsTimeContext::<IntegerDecompressor>::new(first, coding);
        let mut times = vec![first];
        for _ in 1..count {
            times.push(context.decompress(&mut decoder).unwrap());
        }
        times
    }

    fn assert_round_trip(times: &[GpsTime]) {
        for coding in [GpsTimeCoding::Sequential, GpsTimeCoding::Layered].iter() {
            let bytes = encode(times, *coding);
            assert_eq!(decode(times[0], times.len(), bytes, *coding), times);
        }
    }

    #[test]
    fn test_gps_time_is_bit_reinterpretation() {
        let gps = GpsTime::from(1.5f64);
        assert_eq!(gps.value, 1.5f64.to_bits() as i64);
        assert_eq!(f64::from(gps), 1.5);
    }

    #[test]
    fn test_diff_32() {
        let a = GpsTime::from(100i64);
        assert_eq!(GpsTime::from(150i64).diff_32(a), Some(50));
        assert_eq!(GpsTime::from(1i64 << 40).diff_32(a), None);
    }

    #[test]
    fn test_packing_is_little_endian() {
        let gps = GpsTime::from(0x0102_0304_0506_0708i64);
        let mut buf = [0u8; GpsTime::SIZE];
        gps.pack_into(&mut buf);
        assert_eq!(buf, [8, 7, 6, 5, 4, 3, 2, 1]);
        assert_eq!(GpsTime::unpack_from(&buf), gps);
    }

    #[test]
    fn test_symbol_layouts() {
        assert_eq!(GpsTimeCoding::Sequential.no_diff_symbols(), 6);
        assert_eq!(GpsTimeCoding::Layered.no_diff_symbols(), 5);
        assert_eq!(GpsTimeCoding::Sequential.multi_code_full(), 512);
        assert_eq!(GpsTimeCoding::Layered.multi_code_full(), 511);
        assert_eq!(GpsTimeCoding::Sequential.multi_symbols(), 516);
        assert_eq!(GpsTimeCoding::Layered.multi_symbols(), 515);
        assert_eq!(GpsTimeCoding::Sequential.multi_unchanged(), Some(511));
    }

    #[test]
    fn test_interleaved_sequences() {
        let mut times = Vec::new();
        for i in 0..200i64 {
            // two flight lines far apart in time, plus a few random jumps
            times.push(GpsTime::from(1_000.0 + i as f64 * 0.0001));
            times.push(GpsTime::from(250_000.0 + i as f64 * 0.0003));
            if i % 50 == 0 {
                times.push(GpsTime::from(-(i as f64) * 1e9));
                times.push(GpsTime::from(f64::from(i as i32) * 7.5));
            }
        }
        assert_round_trip(&times);
    }

    #[test]
    fn test_multipliers_and_extremes() {
        let mut value = 1_000_000i64;
        let mut times = vec![GpsTime::from(value)];
        let steps = [
            10, 10, 20, 30, 10, 0, 10, -10, -50, 10, 5_000, 10, -200, 10, 10, 70, 10, 1_000_000,
            1_000_000, 1_000_000, 1_000_000, 1_000_000, 3, 3, 3, 3, 3, 0, 0, 3,
        ];
        for step in steps.iter() {
            value += step;
            times.push(GpsTime::from(value));
        }
        assert_round_trip(&times);
    }

    #[test]
    fn test_constant_delta_is_cheap() {
        let times: Vec<GpsTime> = (0..1000i64)
            .map(|i| GpsTime::from(1_000_000_000 + i * 1000))
            .collect();
        let bytes = encode(&times, GpsTimeCoding::Layered);
        assert!(bytes.len() * 8 < 4 * times.len());
        assert_round_trip(&times);
    }

    #[test]
    fn test_round_robin_over_all_sequences() {
        let starts = [0i64, 1i64 << 40, 2i64 << 40, 3i64 << 40];
        let mut times = Vec::new();
        for i in 0..64i64 {
            for start in starts.iter() {
                times.push(GpsTime::from(start + i * 17));
            }
        }
        assert_round_trip(&times);
    }

    #[test]
    fn test_endless_sequence_switching_is_corrupted_data() {
        // stream that keeps asking to switch to sequence 2
        let mut encoder = ArithmeticEncoder::new(Cursor::new(Vec::<u8>::new()));
        let mut model = ArithmeticModelBuilder::new(5).build();
        for _ in 0..8 {
            encoder.encode_symbol(&mut model, 2).unwrap();
        }
        encoder.done().unwrap();

        let mut decoder = ArithmeticDecoder::new(Cursor::new(encoder.into_stream().into_inner()));
        decoder.read_init_bytes().unwrap();
        let mut context =
            GpsTimeContext::<IntegerDecompressor>::new(GpsTime::default(), GpsTimeCoding::Layered);
        let err = context.decompress(&mut decoder).unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::InvalidData);
    }
}
