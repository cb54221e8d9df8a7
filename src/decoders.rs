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

// - - - - - - - - - - - - - - - - - - - - - - - - - - - - - - - - - - - - - -
//                                                                           -
//                       ****************************                        -
//                        ARITHMETIC CODING EXAMPLES                         -
//                       ****************************                        -
//                                                                           -
// - - - - - - - - - - - - - - - - - - - - - - - - - - - - - - - - - - - - - -
//                                                                           -
// Fast arithmetic coding implementation                                     -
// -> 32-bit variables, 32-bit product, periodic updates, table decoding     -
//                                                                           -
// - - - - - - - - - - - - - - - - - - - - - - - - - - - - - - - - - - - - - -
//                                                                           -
// Version 1.00  -  April 25, 2004                                           -
//                                                                           -
// - - - - - - - - - - - - - - - - - - - - - - - - - - - - - - - - - - - - - -
//                                                                           -
//                                  WARNING                                  -
//                                 =========                                 -
//                                                                           -
// The only purpose of this program is to demonstrate the basic principles   -
// of arithmetic coding. The original version of this code can be found in   -
// Digital Signal Compression: Principles and Practice                       -
// (Cambridge University Press, 2011, ISBN: 9780511984655)                   -
//                                                                           -
// Copyright (c) 2019 by Amir Said (said@ieee.org) &                         -
//                       William A. Pearlman (pearlw@ecse.rpi.edu)           -
//                                                                           -
// Redistribution and use in source and binary forms, with or without        -
// modification, are permitted provided that the following conditions are    -
// met:                                                                      -
//                                                                           -
// 1. Redistributions of source code must retain the above copyright notice, -
// this list of conditions and the following disclaimer.                     -
//                                                                           -
// 2. Redistributions in binary form must reproduce the above copyright      -
// notice, this list of conditions and the following disclaimer in the       -
// documentation and/or other materials provided with the distribution.      -
//                                                                           -
// THIS SOFTWARE IS PROVIDED BY THE COPYRIGHT HOLDERS AND CONTRIBUTORS       -
// "AS IS" AND ANY EXPRESS OR IMPLIED WARRANTIES, INCLUDING, BUT NOT LIMITED -
// TO, THE IMPLIED WARRANTIES OF MERCHANTABILITY AND FITNESS FOR A           -
// PARTICULAR PURPOSE ARE DISCLAIMED. IN NO EVENT SHALL THE COPYRIGHT HOLDER -
// OR CONTRIBUTORS BE LIABLE FOR ANY DIRECT, INDIRECT, INCIDENTAL, SPECIAL,  -
// EXEMPLARY, OR CONSEQUENTIAL DAMAGES (INCLUDING, BUT NOT LIMITED TO,       -
// PROCUREMENT OF SUBSTITUTE GOODS OR SERVICES; LOSS OF USE, DATA, OR        -
// PROFITS; OR BUSINESS INTERRUPTION) HOWEVER CAUSED AND ON ANY THEORY OF    -
// LIABILITY, WHETHER IN CONTRACT, STRICT LIABILITY, OR TORT (INCLUDING      -
// NEGLIGENCE OR OTHERWISE) ARISING IN ANY WAY OUT OF THE USE OF THIS        -
// SOFTWARE, EVEN IF ADVISED OF THE POSSIBILITY OF SUCH DAMAGE.              -
//                                                                           -
// - - - - - - - - - - - - - - - - - - - - - - - - - - - - - - - - - - - - - -
//                                                                           -
// A description of the arithmetic coding method used here is available in   -
//                                                                           -
// Lossless Compression Handbook, ed. K. Sayood                              -
// Chapter 5: Arithmetic Coding (A. Said), pp. 101-152, Academic Press, 2003 -
//                                                                           -
// A. Said, Introduction to Arithetic Coding Theory and Practice             -
// HP Labs report HPL-2004-76  -  http://www.hpl.hp.com/techreports/         -
//                                                                           -
// - - - - - - - - - - - - - - - - - - - - - - - - - - - - - - - - - - - - - -

use byteorder::ReadBytesExt;
use std::io::Read;

use crate::models::{ArithmeticBitModel, ArithmeticModel, BM_LENGTH_SHIFT, DM_LENGTH_SHIFT};

// maximum AC interval length
pub const AC_MAX_LENGTH: u32 = 0xFFFF_FFFF;
// threshold for renormalization
pub const AC_MIN_LENGTH: u32 = 0x0100_0000;

pub(crate) fn corrupted_data(msg: &str) -> std::io::Error {
    std::io::Error::new(std::io::ErrorKind::InvalidData, msg)
}

/// Range decoder reading its bytes from `T`
pub struct ArithmeticDecoder<T: Read> {
    in_stream: T,
    value: u32,
    length: u32,
}

impl<T: Read> ArithmeticDecoder<T> {
    pub fn new(in_stream: T) -> Self {
        Self {
            in_stream,
            value: 0,
            length: AC_MAX_LENGTH,
        }
    }

    pub fn reset(&mut self) {
        self.value = 0;
        self.length = AC_MAX_LENGTH;
    }

    /// Reads the first 4 bytes of a coded stream
    pub fn read_init_bytes(&mut self) -> std::io::Result<()> {
        self.length = AC_MAX_LENGTH;
        self.value = self.in_stream.read_u32::<byteorder::BigEndian>()?;
        if self.value >= self.length {
            return Err(corrupted_data("arithmetic decoder initial value out of range"));
        }
        Ok(())
    }

    pub fn decode_bit(&mut self, model: &mut ArithmeticBitModel) -> std::io::Result<u32> {
        // product l x p0
        let x = model.bit_0_prob * (self.length >> BM_LENGTH_SHIFT);
        let sym = (self.value >= x) as u32;
        if sym == 0 {
            self.length = x;
        } else {
            self.value -= x;
            self.length -= x;
        }
        if self.length < AC_MIN_LENGTH {
            self.renorm_dec_interval()?;
        }
        model.count(sym);
        Ok(sym)
    }

    pub fn decode_symbol(&mut self, model: &mut ArithmeticModel) -> std::io::Result<u32> {
        let mut sym;
        let x;
        let mut y = self.length;

        if !model.decoder_table.is_empty() {
            // use table look-up for faster decoding
            self.length >>= DM_LENGTH_SHIFT;
            let dv = self.value / self.length;
            let t = (dv >> model.table_shift) as usize;

            // initial decision based on table look-up
            let (first, next) = match (model.decoder_table.get(t), model.decoder_table.get(t + 1)) {
                (Some(&first), Some(&next)) => (first, next),
                _ => return Err(corrupted_data("symbol outside of the model range")),
            };
            sym = first;
            let mut n = next + 1;

            // finish with bisection search
            while n > sym + 1 {
                let k = (sym + n) >> 1;
                if model.distribution[k as usize] > dv {
                    n = k;
                } else {
                    sym = k;
                }
            }
            // compute products
            x = model.distribution[sym as usize] * self.length;
            if sym != model.last_symbol {
                y = model.distribution[sym as usize + 1] * self.length;
            }
        } else {
            // decode using only multiplications
            let mut lower = 0;
            sym = 0;
            self.length >>= DM_LENGTH_SHIFT;
            let mut n = model.symbols;
            let mut k = n >> 1;
            loop {
                let z = self.length * model.distribution[k as usize];
                if z > self.value {
                    // value is smaller
                    n = k;
                    y = z;
                } else {
                    // value is larger or equal
                    sym = k;
                    lower = z;
                }
                k = (sym + n) >> 1;
                if k == sym {
                    break;
                }
            }
            x = lower;
        }

        // update interval
        self.value -= x;
        self.length = y - x;
        if self.value >= self.length {
            return Err(corrupted_data("symbol outside of the model range"));
        }

        if self.length < AC_MIN_LENGTH {
            self.renorm_dec_interval()?;
        }
        model.count(sym);
        Ok(sym)
    }

    /// Reads `bits` bits written with a uniform distribution
    pub fn read_bits(&mut self, bits: u32) -> std::io::Result<u32> {
        debug_assert!(bits > 0 && bits <= 32);
        if bits > 19 {
            let lower = u32::from(self.read_short()?);
            let upper = self.read_bits(bits - 16)?;
            Ok(upper << 16 | lower)
        } else {
            self.decode_raw(bits)
        }
    }

    pub fn read_byte(&mut self) -> std::io::Result<u8> {
        Ok(self.decode_raw(8)? as u8)
    }

    pub fn read_short(&mut self) -> std::io::Result<u16> {
        Ok(self.decode_raw(16)? as u16)
    }

    pub fn read_int(&mut self) -> std::io::Result<u32> {
        let lower = u32::from(self.read_short()?);
        let upper = u32::from(self.read_short()?);
        Ok(upper << 16 | lower)
    }

    pub fn read_int_64(&mut self) -> std::io::Result<u64> {
        let lower = u64::from(self.read_int()?);
        let upper = u64::from(self.read_int()?);
        Ok(upper << 32 | lower)
    }

    fn decode_raw(&mut self, bits: u32) -> std::io::Result<u32> {
        // decode symbol, change length
        self.length >>= bits;
        let sym = self.value / self.length;
        if sym >= (1u32 << bits) {
            return Err(corrupted_data("raw value does not fit in the requested bits"));
        }
        // update interval
        self.value -= self.length * sym;
        if self.length < AC_MIN_LENGTH {
            self.renorm_dec_interval()?;
        }
        Ok(sym)
    }

    fn renorm_dec_interval(&mut self) -> std::io::Result<()> {
        loop {
            self.value = (self.value << 8) | u32::from(self.in_stream.read_u8()?);
            self.length <<= 8;
            if self.length >= AC_MIN_LENGTH {
                break;
            }
        }
        Ok(())
    }

    pub fn in_stream(&mut self) -> &mut T {
        &mut self.in_stream
    }

    pub fn into_stream(self) -> T {
        self.in_stream
    }
}

#[cfg(test)]
mod test {
    use std::io::Cursor;

    use super::*;

    #[test]
    fn test_init_bytes_are_big_endian() {
        let mut decoder = ArithmeticDecoder::new(Cursor::new(vec![0x12, 0x34, 0x56, 0x78]));
        decoder.read_init_bytes().unwrap();
        assert_eq!(decoder.value, 0x1234_5678);
        assert_eq!(decoder.length, AC_MAX_LENGTH);
    }

    #[test]
    fn test_truncated_stream_is_an_error() {
        let mut decoder = ArithmeticDecoder::new(Cursor::new(vec![0x12, 0x34]));
        assert!(decoder.read_init_bytes().is_err());
    }

    #[test]
    fn test_impossible_initial_value_is_invalid_data() {
        let mut decoder = ArithmeticDecoder::new(Cursor::new(vec![0xFF; 8]));
        let err = decoder.read_init_bytes().unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::InvalidData);
    }

    #[test]
    fn test_out_of_range_raw_value_is_invalid_data() {
        // value / (length >> 8) == 256, which does not fit in 8 bits
        let mut decoder = ArithmeticDecoder::new(Cursor::new(vec![0xFF, 0xFF, 0xFF, 0x00, 0, 0]));
        decoder.read_init_bytes().unwrap();
        let err = decoder.read_byte().unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::InvalidData);
    }
}
