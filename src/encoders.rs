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
use std::io::Write;

use crate::decoders::{AC_MAX_LENGTH, AC_MIN_LENGTH};
use crate::models::{ArithmeticBitModel, ArithmeticModel, BM_LENGTH_SHIFT, DM_LENGTH_SHIFT};

const AC_BUFFER_SIZE: usize = 1024;

/// Range encoder writing its bytes to `T`.
///
/// Produced bytes are staged in a circular buffer made of two halves,
/// a carry may still reach bytes of the half that was not yet flushed.
pub struct ArithmeticEncoder<T: Write> {
    out_buffer: Vec<u8>,
    out_byte: usize,
    end_byte: usize,

    base: u32,
    length: u32,

    out_stream: T,
}

impl<T: Write> ArithmeticEncoder<T> {
    pub fn new(out_stream: T) -> Self {
        Self {
            out_buffer: vec![0u8; 2 * AC_BUFFER_SIZE],
            out_byte: 0,
            end_byte: 2 * AC_BUFFER_SIZE,
            base: 0,
            length: AC_MAX_LENGTH,
            out_stream,
        }
    }

    /// Resets the coding interval, bytes already written to the stream are kept
    pub fn reset(&mut self) {
        self.base = 0;
        self.length = AC_MAX_LENGTH;
        self.out_byte = 0;
        self.end_byte = 2 * AC_BUFFER_SIZE;
    }

    /// Flushes the coding interval and every pending byte.
    ///
    /// The encoder must be `reset` before being used again.
    pub fn done(&mut self) -> std::io::Result<()> {
        // done encoding: set final data bytes
        let init_base = self.base;
        let another_byte = if self.length > 2 * AC_MIN_LENGTH {
            // base offset
            self.base = self.base.wrapping_add(AC_MIN_LENGTH);
            // set new length for 1 more byte
            self.length = AC_MIN_LENGTH >> 1;
            true
        } else {
            // base offset
            self.base = self.base.wrapping_add(AC_MIN_LENGTH >> 1);
            // set new length for 2 more bytes
            self.length = AC_MIN_LENGTH >> 9;
            false
        };

        if init_base > self.base {
            self.propagate_carry();
        }
        self.renorm_enc_interval()?;

        // the upper half was filled but not flushed yet
        if self.end_byte != 2 * AC_BUFFER_SIZE {
            self.out_stream
                .write_all(&self.out_buffer[AC_BUFFER_SIZE..2 * AC_BUFFER_SIZE])?;
        }
        if self.out_byte > 0 {
            self.out_stream
                .write_all(&self.out_buffer[..self.out_byte])?;
        }

        // two or three zero bytes keep the decoder reads in bounds
        self.out_stream.write_all(&[0u8, 0u8])?;
        if another_byte {
            self.out_stream.write_all(&[0u8])?;
        }
        Ok(())
    }

    pub fn encode_bit(&mut self, model: &mut ArithmeticBitModel, bit: u32) -> std::io::Result<()> {
        debug_assert!(bit <= 1);
        // product l x p0
        let x = model.bit_0_prob * (self.length >> BM_LENGTH_SHIFT);
        // update interval
        if bit == 0 {
            self.length = x;
        } else {
            let init_base = self.base;
            self.base = self.base.wrapping_add(x);
            self.length -= x;
            if init_base > self.base {
                self.propagate_carry();
            }
        }
        if self.length < AC_MIN_LENGTH {
            self.renorm_enc_interval()?;
        }
        model.count(bit);
        Ok(())
    }

    pub fn encode_symbol(&mut self, model: &mut ArithmeticModel, sym: u32) -> std::io::Result<()> {
        debug_assert!(sym < model.symbols);
        let init_base = self.base;
        if sym == model.last_symbol {
            // the last symbol takes what the truncated products leave
            let x = model.distribution[sym as usize] * (self.length >> DM_LENGTH_SHIFT);
            self.base = self.base.wrapping_add(x);
            self.length -= x;
        } else {
            self.length >>= DM_LENGTH_SHIFT;
            let x = model.distribution[sym as usize] * self.length;
            self.base = self.base.wrapping_add(x);
            self.length = model.distribution[sym as usize + 1] * self.length - x;
        }
        if init_base > self.base {
            self.propagate_carry();
        }
        if self.length < AC_MIN_LENGTH {
            self.renorm_enc_interval()?;
        }
        model.count(sym);
        Ok(())
    }

    /// Writes the `bits` lower bits of `sym` with a uniform distribution
    pub fn write_bits(&mut self, mut bits: u32, mut sym: u32) -> std::io::Result<()> {
        debug_assert!(bits > 0 && bits <= 32);
        debug_assert!(bits == 32 || sym < (1u32 << bits));
        if bits > 19 {
            self.write_short((sym & 0xFFFF) as u16)?;
            sym >>= 16;
            bits -= 16;
        }
        self.length >>= bits;
        self.encode_raw(sym)
    }

    pub fn write_byte(&mut self, sym: u8) -> std::io::Result<()> {
        self.length >>= 8;
        self.encode_raw(u32::from(sym))
    }

    pub fn write_short(&mut self, sym: u16) -> std::io::Result<()> {
        self.length >>= 16;
        self.encode_raw(u32::from(sym))
    }

    pub fn write_int(&mut self, sym: u32) -> std::io::Result<()> {
        // lower 16 bits first
        self.write_short((sym & 0xFFFF) as u16)?;
        self.write_short((sym >> 16) as u16)
    }

    pub fn write_int64(&mut self, sym: u64) -> std::io::Result<()> {
        self.write_int((sym & 0xFFFF_FFFF) as u32)?;
        self.write_int((sym >> 32) as u32)
    }

    // length was already divided by the alphabet size
    #[inline]
    fn encode_raw(&mut self, sym: u32) -> std::io::Result<()> {
        let init_base = self.base;
        self.base = self.base.wrapping_add(sym * self.length);
        if init_base > self.base {
            self.propagate_carry();
        }
        if self.length < AC_MIN_LENGTH {
            self.renorm_enc_interval()?;
        }
        Ok(())
    }

    fn propagate_carry(&mut self) {
        let last = 2 * AC_BUFFER_SIZE - 1;
        let mut p = if self.out_byte == 0 {
            last
        } else {
            self.out_byte - 1
        };
        while self.out_buffer[p] == 0xFF {
            self.out_buffer[p] = 0;
            p = if p == 0 { last } else { p - 1 };
        }
        self.out_buffer[p] += 1;
    }

    fn renorm_enc_interval(&mut self) -> std::io::Result<()> {
        loop {
            self.out_buffer[self.out_byte] = (self.base >> 24) as u8;
            self.out_byte += 1;
            if self.out_byte == self.end_byte {
                self.manage_out_buffer()?;
            }
            self.base <<= 8;
            self.length <<= 8;
            if self.length >= AC_MIN_LENGTH {
                break;
            }
        }
        Ok(())
    }

    fn manage_out_buffer(&mut self) -> std::io::Result<()> {
        if self.out_byte == 2 * AC_BUFFER_SIZE {
            self.out_byte = 0;
        }
        // flush the half we are about to overwrite
        self.out_stream
            .write_all(&self.out_buffer[self.out_byte..self.out_byte + AC_BUFFER_SIZE])?;
        self.end_byte = self.out_byte + AC_BUFFER_SIZE;
        Ok(())
    }

    pub fn get_ref(&self) -> &T {
        &self.out_stream
    }

    pub fn get_mut(&mut self) -> &mut T {
        &mut self.out_stream
    }

    pub fn into_stream(self) -> T {
        self.out_stream
    }
}

#[cfg(test)]
mod test {
    use std::io::Cursor;

    use super::*;
    use crate::decoders::ArithmeticDecoder;

    #[test]
    fn test_done_on_fresh_encoder() {
        let mut encoder = ArithmeticEncoder::new(Cursor::new(Vec::<u8>::new()));
        encoder.done().unwrap();
        let bytes = encoder.into_stream().into_inner();
        // one interval byte followed by three padding bytes
        assert_eq!(bytes, vec![1, 0, 0, 0]);
    }

    #[test]
    fn test_raw_values() {
        let mut encoder = ArithmeticEncoder::new(Cursor::new(Vec::<u8>::new()));
        encoder.write_bits(3, 5).unwrap();
        encoder.write_bits(24, 0xAB_CDEF).unwrap();
        encoder.write_bits(32, 0xDEAD_BEEF).unwrap();
        encoder.write_byte(0x7F).unwrap();
        encoder.write_short(0xBEEF).unwrap();
        encoder.write_int(0x1234_5678).unwrap();
        encoder.write_int64(0x0123_4567_89AB_CDEF).unwrap();
        encoder.done().unwrap();

        let mut decoder = ArithmeticDecoder::new(Cursor::new(encoder.into_stream().into_inner()));
        decoder.read_init_bytes().unwrap();
        assert_eq!(decoder.read_bits(3).unwrap(), 5);
        assert_eq!(decoder.read_bits(24).unwrap(), 0xAB_CDEF);
        assert_eq!(decoder.read_bits(32).unwrap(), 0xDEAD_BEEF);
        assert_eq!(decoder.read_byte().unwrap(), 0x7F);
        assert_eq!(decoder.read_short().unwrap(), 0xBEEF);
        assert_eq!(decoder.read_int().unwrap(), 0x1234_5678);
        assert_eq!(decoder.read_int_64().unwrap(), 0x0123_4567_89AB_CDEF);
    }

    #[test]
    fn test_symbols_and_bits_across_buffer_halves() {
        // enough output to wrap around the staging buffer several times
        let mut symbol_model = ArithmeticModel::new(256);
        let mut bit_model = ArithmeticBitModel::new();
        let mut encoder = ArithmeticEncoder::new(Cursor::new(Vec::<u8>::new()));
        for i in 0..20_000u32 {
            let sym = (i.wrapping_mul(2_654_435_761) >> 24) & 0xFF;
            encoder.encode_symbol(&mut symbol_model, sym).unwrap();
            encoder.encode_bit(&mut bit_model, (i % 3) & 1).unwrap();
        }
        encoder.done().unwrap();
        let bytes = encoder.into_stream().into_inner();
        assert!(bytes.len() > 4 * AC_BUFFER_SIZE);

        let mut symbol_model = ArithmeticModel::new(256);
        let mut bit_model = ArithmeticBitModel::new();
        let mut decoder = ArithmeticDecoder::new(Cursor::new(bytes));
        decoder.read_init_bytes().unwrap();
        for i in 0..20_000u32 {
            let sym = (i.wrapping_mul(2_654_435_761) >> 24) & 0xFF;
            assert_eq!(decoder.decode_symbol(&mut symbol_model).unwrap(), sym);
            assert_eq!(decoder.decode_bit(&mut bit_model).unwrap(), (i % 3) & 1);
        }
    }

    #[test]
    fn test_skewed_source_compresses() {
        let mut model = ArithmeticModel::new(16);
        let mut encoder = ArithmeticEncoder::new(Cursor::new(Vec::<u8>::new()));
        for _ in 0..10_000 {
            encoder.encode_symbol(&mut model, 0).unwrap();
        }
        encoder.done().unwrap();
        assert!(encoder.get_ref().get_ref().len() < 100);
    }
}
