/*
===============================================================================

  CONTENTS:
    Integer decompressor

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

use std::io::Read;

use crate::compressors::{
    CorrectorRange, IntegerCodec, DEFAULT_BITS, DEFAULT_BITS_HIGH, DEFAULT_CONTEXTS,
    DEFAULT_RANGE,
};
use crate::decoders::{corrupted_data, ArithmeticDecoder};
use crate::models::{ArithmeticBitModel, ArithmeticModel};

/// Decodes integers coded by an [`IntegerCompressor`](crate::compressors::IntegerCompressor)
/// built with the same parameters
#[derive(Debug, Clone)]
pub struct IntegerDecompressor {
    k: u32,

    contexts: u32,
    bits_high: u32,
    range: CorrectorRange,

    m_bits: Vec<ArithmeticModel>,
    m_corrector0: ArithmeticBitModel,
    m_corrector: Vec<ArithmeticModel>,
}

impl IntegerDecompressor {
    pub fn new(bits: u32, contexts: u32, bits_high: u32, range: u32) -> Self {
        Self {
            k: 0,
            contexts,
            bits_high,
            range: CorrectorRange::new(bits, range),
            m_bits: vec![],
            m_corrector0: ArithmeticBitModel::new(),
            m_corrector: vec![],
        }
    }

    pub fn k(&self) -> u32 {
        self.k
    }

    pub fn init(&mut self) {
        if self.m_bits.is_empty() {
            let (m_bits, m_corrector) = self.range.models(self.contexts, self.bits_high);
            self.m_bits = m_bits;
            self.m_corrector = m_corrector;
        }
    }

    pub fn decompress<T: Read>(
        &mut self,
        decoder: &mut ArithmeticDecoder<T>,
        pred: i32,
        context: u32,
    ) -> std::io::Result<i32> {
        let corr = self.read_corrector(decoder, context)?;
        let corr_range = self.range.corr_range as i32;
        let mut real = pred.wrapping_add(corr);
        if real < 0 {
            real = real.wrapping_add(corr_range);
        } else if real >= corr_range && corr_range != 0 {
            real -= corr_range;
        }
        Ok(real)
    }

    fn read_corrector<T: Read>(
        &mut self,
        decoder: &mut ArithmeticDecoder<T>,
        context: u32,
    ) -> std::io::Result<i32> {
        // decode within which interval the corrector is falling
        self.k = decoder.decode_symbol(&mut self.m_bits[context as usize])?;

        if self.k == 0 {
            // then c is either 0 or 1
            return Ok(decoder.decode_bit(&mut self.m_corrector0)? as i32);
        }
        if self.k >= 32 {
            return Ok(self.range.corr_min);
        }

        // decode the exact location of the corrector within the interval
        let model = &mut self.m_corrector[(self.k - 1) as usize];
        let mut c = if self.k <= self.bits_high {
            // for small k we can do this in one step
            decoder.decode_symbol(model)? as i32
        } else {
            // for larger k the lowest k - bits_high bits were stored raw
            let k1 = self.k - self.bits_high;
            let high = decoder.decode_symbol(model)? as i32;
            let low = decoder.read_bits(k1)? as i32;
            (high << k1) | low
        };

        // translate c back into its correct interval
        if c >= (1u32 << (self.k - 1)) as i32 {
            // c is in [ 2^(k-1) ... 2^k - 1 ], add 1
            c = c
                .checked_add(1)
                .ok_or_else(|| corrupted_data("integer corrector out of range"))?;
        } else {
            // c is in [ 0 ... 2^(k-1) - 1 ], subtract (2^k - 1)
            c -= ((1u32 << self.k) - 1) as i32;
        }
        Ok(c)
    }
}

impl IntegerCodec for IntegerDecompressor {
    fn with_bits_and_contexts(bits: u32, contexts: u32) -> Self {
        IntegerDecompressorBuilder::new()
            .bits(bits)
            .contexts(contexts)
            .build_initialized()
    }
}

pub struct IntegerDecompressorBuilder {
    bits: u32,
    contexts: u32,
    bits_high: u32,
    range: u32,
}

impl IntegerDecompressorBuilder {
    pub fn new() -> Self {
        Self {
            bits: DEFAULT_BITS,
            contexts: DEFAULT_CONTEXTS,
            bits_high: DEFAULT_BITS_HIGH,
            range: DEFAULT_RANGE,
        }
    }

    pub fn bits(&mut self, bits: u32) -> &mut Self {
        self.bits = bits;
        self
    }

    pub fn contexts(&mut self, contexts: u32) -> &mut Self {
        self.contexts = contexts;
        self
    }

    pub fn build(&self) -> IntegerDecompressor {
        IntegerDecompressor::new(self.bits, self.contexts, self.bits_high, self.range)
    }

    pub fn build_initialized(&self) -> IntegerDecompressor {
        let mut idc = self.build();
        idc.init();
        idc
    }
}

impl Default for IntegerDecompressorBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod test {
    use std::io::Cursor;

    use super::*;
    use crate::encoders::ArithmeticEncoder;

    #[test]
    fn test_corrector_past_i32_max_is_corrupted_data() {
        // k = 31, then a high part and raw low bits that put c at i32::MAX
        let mut encoder = ArithmeticEncoder::new(Cursor::new(Vec::<u8>::new()));
        let mut k_model = ArithmeticModel::new(33);
        let mut high_model = ArithmeticModel::new(256);
        encoder.encode_symbol(&mut k_model, 31).unwrap();
        encoder.encode_symbol(&mut high_model, 255).unwrap();
        encoder.write_bits(23, 0x7F_FFFF).unwrap();
        encoder.done().unwrap();

        let mut decoder = ArithmeticDecoder::new(Cursor::new(encoder.into_stream().into_inner()));
        decoder.read_init_bytes().unwrap();
        let mut idc = IntegerDecompressor::new(32, 1, 8, 0);
        idc.init();
        let err = idc.decompress(&mut decoder, 0, 0).unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::InvalidData);
        assert_eq!(idc.k(), 31);
    }
}
