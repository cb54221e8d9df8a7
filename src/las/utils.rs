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
    terms of the Apache Public License 2.0 published by the Apache Software
    Foundation. See the COPYING file for more information.

    This software is distributed WITHOUT ANY WARRANTY and without even the
    implied warranty of MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.

  CHANGE HISTORY:
    6 June 2019: Translated to Rust
===============================================================================
*/


use std::io::{Cursor, Read, Seek, SeekFrom, Write};

use num_traits::Zero;

use crate::decoders::ArithmeticDecoder;
use crate::encoders::ArithmeticEncoder;

/// Median of the last 5 values pushed, used to predict x and y deltas
#[derive(Debug, Copy, Clone)]
pub struct StreamingMedian<T: Zero + Copy + PartialOrd> {
    values: [T; 5],
    high: bool,
}

impl<T: Zero + Copy + PartialOrd> StreamingMedian<T> {
    pub fn new() -> Self {
        Self {
            values: [T::zero(); 5],
            high: true,
        }
    }

    pub fn add(&mut self, v: T) {
        let values = &mut self.values;
        if self.high {
            if v < values[2] {
                values[4] = values[3];
                values[3] = values[2];
                if v < values[0] {
                    values[2] = values[1];
                    values[1] = values[0];
                    values[0] = v;
                } else if v < values[1] {
                    values[2] = values[1];
                    values[1] = v;
                } else {
                    values[2] = v;
                }
            } else {
                if v < values[3] {
                    values[4] = values[3];
                    values[3] = v;
                } else {
                    values[4] = v;
                }
                self.high = false;
            }
        } else if values[2] < v {
            values[0] = values[1];
            values[1] = values[2];
            if values[4] < v {
                values[2] = values[3];
                values[3] = values[4];
                values[4] = v;
            } else if values[3] < v {
                values[2] = values[3];
                values[3] = v;
            } else {
                values[2] = v;
            }
        } else {
            if values[1] < v {
                values[0] = values[1];
                values[1] = v;
            } else {
                values[0] = v;
            }
            self.high = true;
        }
    }

    pub fn get(&self) -> T {
        self.values[2]
    }
}

impl<T: Zero + Copy + PartialOrd> Default for StreamingMedian<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[inline]
pub(crate) fn u32_zero_bit_0(n: u32) -> u32 {
    n & 0xFFFF_FFFE
}

#[inline]
pub(crate) fn u8_clamp(n: i32) -> u8 {
    num_traits::clamp(n, i32::from(std::u8::MIN), i32::from(std::u8::MAX)) as u8
}

#[inline(always)]
pub(crate) fn lower_byte(n: u16) -> u8 {
    (n & 0x00_FF) as u8
}

#[inline(always)]
pub(crate) fn upper_byte(n: u16) -> u8 {
    (n >> 8) as u8
}

#[inline(always)]
pub(crate) fn lower_byte_changed(lhs: u16, rhs: u16) -> bool {
    lower_byte(lhs) != lower_byte(rhs)
}

#[inline(always)]
pub(crate) fn upper_byte_changed(lhs: u16, rhs: u16) -> bool {
    upper_byte(lhs) != upper_byte(rhs)
}

/// Rounds half away from zero
#[inline]
pub fn i32_quantize(n: f32) -> i32 {
    if n >= 0.0f32 {
        (n + 0.5f32) as i32
    } else {
        (n - 0.5f32) as i32
    }
}

/// Loads the `num_bytes` next bytes of `src` as the content of a layer decoder.
///
/// Returns whether the decoder is ready to decode values, layers that are not
/// requested are skipped over.
#[inline]
pub(crate) fn copy_bytes_into_decoder<R: Read + Seek>(
    is_requested: bool,
    num_bytes: usize,
    decoder: &mut ArithmeticDecoder<Cursor<Vec<u8>>>,
    src: &mut R,
) -> std::io::Result<bool> {
    let cursor = decoder.in_stream();
    cursor.set_position(0);
    let inner_vec = cursor.get_mut();
    if is_requested {
        if num_bytes > 0 {
            inner_vec.resize(num_bytes, 0);
            src.read_exact(&mut inner_vec[..num_bytes])?;
            decoder.read_init_bytes()?;
            Ok(true)
        } else {
            inner_vec.clear();
            Ok(false)
        }
    } else {
        if num_bytes > 0 {
            src.seek(SeekFrom::Current(num_bytes as i64))?;
        }
        Ok(false)
    }
}

#[inline]
pub(crate) fn inner_buffer_len_of(encoder: &ArithmeticEncoder<Cursor<Vec<u8>>>) -> usize {
    encoder.get_ref().get_ref().len()
}

#[inline]
pub(crate) fn copy_encoder_content_to<W: Write>(
    encoder: &ArithmeticEncoder<Cursor<Vec<u8>>>,
    dst: &mut W,
) -> std::io::Result<()> {
    dst.write_all(encoder.get_ref().get_ref())
}

/// Makes a layer encoder ready for a new chunk, dropping its previous content
#[inline]
pub(crate) fn reset_layer_encoder(encoder: &mut ArithmeticEncoder<Cursor<Vec<u8>>>) {
    encoder.reset();
    let cursor = encoder.get_mut();
    cursor.get_mut().clear();
    cursor.set_position(0);
}

/// Size of a layer as written in the chunk header, 0 when the layer is unchanged
#[inline]
pub(crate) fn layer_size_of(
    changed: bool,
    encoder: &mut ArithmeticEncoder<Cursor<Vec<u8>>>,
) -> std::io::Result<u32> {
    if changed {
        encoder.done()?;
        Ok(inner_buffer_len_of(encoder) as u32)
    } else {
        Ok(0)
    }
}

macro_rules! is_nth_bit_set {
    ($sym:expr, $n:expr) => {
        ($sym & (1 << $n)) != 0
    };
}

// Point10 returns: 3 bits for r and n, every (n, r) pair gets its own
// context when 1 <= r <= n <= 5, the others share the remaining ones.
pub const NUMBER_RETURN_MAP: [[u8; 8]; 8] = [
    [15, 14, 13, 12, 11, 10, 9, 8],
    [14, 0, 1, 3, 6, 10, 10, 9],
    [13, 1, 2, 4, 7, 11, 11, 10],
    [12, 3, 4, 5, 8, 12, 12, 11],
    [11, 6, 7, 8, 9, 13, 13, 12],
    [10, 10, 11, 12, 13, 14, 14, 13],
    [9, 10, 11, 12, 13, 14, 15, 14],
    [8, 9, 10, 11, 12, 13, 14, 15],
];

// |n - r|
pub const NUMBER_RETURN_LEVEL: [[u8; 8]; 8] = [
    [0, 1, 2, 3, 4, 5, 6, 7],
    [1, 0, 1, 2, 3, 4, 5, 6],
    [2, 1, 0, 1, 2, 3, 4, 5],
    [3, 2, 1, 0, 1, 2, 3, 4],
    [4, 3, 2, 1, 0, 1, 2, 3],
    [5, 4, 3, 2, 1, 0, 1, 2],
    [6, 5, 4, 3, 2, 1, 0, 1],
    [7, 6, 5, 4, 3, 2, 1, 0],
];

// For LAS points with correctly populated return numbers (1 <= r <= n) and
// number of returns of given pulse (1 <= n <= 15) there are 120 possible
// combinations. They are simplified down to 6 contexts as higher returns
// will not have significant entropy differences.
//
// Some files start the numbering of r and n with 0, only have return
// counts r, only have number of returns n, or mix up the position of
// r and n. The table is "completed" to also map those combinations.
pub const NUMBER_RETURN_MAP_6CTX: [[u8; 16]; 16] = [
    [0, 1, 2, 3, 4, 5, 3, 4, 4, 5, 5, 5, 5, 5, 5, 5],
    [1, 0, 1, 3, 3, 3, 3, 3, 3, 3, 3, 3, 3, 3, 3, 3],
    [2, 1, 2, 4, 4, 4, 4, 4, 4, 4, 4, 3, 3, 3, 3, 3],
    [3, 3, 4, 5, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4],
    [4, 3, 4, 4, 5, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4],
    [5, 3, 4, 4, 4, 5, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4],
    [3, 3, 4, 4, 4, 4, 5, 4, 4, 4, 4, 4, 4, 4, 4, 4],
    [4, 3, 4, 4, 4, 4, 4, 5, 4, 4, 4, 4, 4, 4, 4, 4],
    [4, 3, 4, 4, 4, 4, 4, 4, 5, 4, 4, 4, 4, 4, 4, 4],
    [5, 3, 4, 4, 4, 4, 4, 4, 4, 5, 4, 4, 4, 4, 4, 4],
    [5, 3, 4, 4, 4, 4, 4, 4, 4, 4, 5, 4, 4, 4, 4, 4],
    [5, 3, 3, 4, 4, 4, 4, 4, 4, 4, 4, 5, 5, 4, 4, 4],
    [5, 3, 3, 4, 4, 4, 4, 4, 4, 4, 4, 5, 5, 5, 4, 4],
    [5, 3, 3, 4, 4, 4, 4, 4, 4, 4, 4, 4, 5, 5, 5, 4],
    [5, 3, 3, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 5, 5, 5],
    [5, 3, 3, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 4, 5, 5],
];

// The level of penetration of a return is n - r, the enumeration stops
// at 7 to keep the number of contexts small. As for the map above,
// invalid r & n combinations are given their own levels.
pub const NUMBER_RETURN_LEVEL_8CTX: [[u8; 16]; 16] = [
    [0, 1, 2, 3, 4, 5, 6, 7, 7, 7, 7, 7, 7, 7, 7, 7],
    [1, 0, 1, 2, 3, 4, 5, 6, 7, 7, 7, 7, 7, 7, 7, 7],
    [2, 1, 0, 1, 2, 3, 4, 5, 6, 7, 7, 7, 7, 7, 7, 7],
    [3, 2, 1, 0, 1, 2, 3, 4, 5, 6, 7, 7, 7, 7, 7, 7],
    [4, 3, 2, 1, 0, 1, 2, 3, 4, 5, 6, 7, 7, 7, 7, 7],
    [5, 4, 3, 2, 1, 0, 1, 2, 3, 4, 5, 6, 7, 7, 7, 7],
    [6, 5, 4, 3, 2, 1, 0, 1, 2, 3, 4, 5, 6, 7, 7, 7],
    [7, 6, 5, 4, 3, 2, 1, 0, 1, 2, 3, 4, 5, 6, 7, 7],
    [7, 7, 6, 5, 4, 3, 2, 1, 0, 1, 2, 3, 4, 5, 6, 7],
    [7, 7, 7, 6, 5, 4, 3, 2, 1, 0, 1, 2, 3, 4, 5, 6],
    [7, 7, 7, 7, 6, 5, 4, 3, 2, 1, 0, 1, 2, 3, 4, 5],
    [7, 7, 7, 7, 7, 6, 5, 4, 3, 2, 1, 0, 1, 2, 3, 4],
    [7, 7, 7, 7, 7, 7, 6, 5, 4, 3, 2, 1, 0, 1, 2, 3],
    [7, 7, 7, 7, 7, 7, 7, 6, 5, 4, 3, 2, 1, 0, 1, 2],
    [7, 7, 7, 7, 7, 7, 7, 7, 6, 5, 4, 3, 2, 1, 0, 1],
    [7, 7, 7, 7, 7, 7, 7, 7, 7, 6, 5, 4, 3, 2, 1, 0],
];

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_streaming_median() {
        let mut median = StreamingMedian::<i32>::new();
        assert_eq!(median.get(), 0);
        for v in &[10, 10, 10, 10, 10] {
            median.add(*v);
        }
        assert_eq!(median.get(), 10);

        // a single outlier does not move the median
        median.add(1000);
        assert_eq!(median.get(), 10);
        median.add(-1000);
        assert_eq!(median.get(), 10);

        for v in &[20, 20, 20] {
            median.add(*v);
        }
        assert_eq!(median.get(), 20);
    }

    #[test]
    fn test_quantize_rounds_away_from_zero() {
        assert_eq!(i32_quantize(1.4), 1);
        assert_eq!(i32_quantize(1.5), 2);
        assert_eq!(i32_quantize(-1.5), -2);
        assert_eq!(i32_quantize(-0.2), 0);
    }

    #[test]
    fn test_byte_helpers() {
        assert_eq!(u8_clamp(-3), 0);
        assert_eq!(u8_clamp(300), 255);
        assert_eq!(u8_clamp(42), 42);
        assert_eq!(lower_byte(0xABCD), 0xCD);
        assert_eq!(upper_byte(0xABCD), 0xAB);
        assert!(lower_byte_changed(0x0102, 0x0103));
        assert!(!upper_byte_changed(0x0102, 0x0103));
        assert_eq!(u32_zero_bit_0(7), 6);
    }

    #[test]
    fn test_return_tables() {
        // first of many returns and single returns have their own contexts
        assert_eq!(NUMBER_RETURN_MAP_6CTX[1][1], 0);
        assert_eq!(NUMBER_RETURN_MAP_6CTX[2][1], 1);
        assert_eq!(NUMBER_RETURN_LEVEL_8CTX[5][1], 4);
        assert_eq!(NUMBER_RETURN_LEVEL_8CTX[15][1], 7);
        for row in NUMBER_RETURN_MAP_6CTX.iter() {
            assert!(row.iter().all(|&m| m < 6));
        }
        for row in NUMBER_RETURN_LEVEL_8CTX.iter() {
            assert!(row.iter().all(|&l| l < 8));
        }
        assert_eq!(NUMBER_RETURN_MAP[1][1], 0);
        assert_eq!(NUMBER_RETURN_LEVEL[3][1], 2);
        for row in NUMBER_RETURN_MAP.iter() {
            assert!(row.iter().all(|&m| m < 16));
        }
    }
}
