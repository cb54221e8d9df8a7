/*
===============================================================================

  CONTENTS:
    Integer compressor

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

use std::io::Write;

use crate::encoders::ArithmeticEncoder;
use crate::models::{ArithmeticBitModel, ArithmeticModel};

pub const DEFAULT_BITS: u32 = 16;
pub const DEFAULT_CONTEXTS: u32 = 1;
pub const DEFAULT_BITS_HIGH: u32 = 8;
pub const DEFAULT_RANGE: u32 = 0;

/// Integer coder of one direction (compression or decompression).
///
/// Lets the per scanner channel contexts be written once for both directions.
pub trait IntegerCodec: Sized {
    fn with_bits_and_contexts(bits: u32, contexts: u32) -> Self;
}

/// Interval in which the difference between a value and its prediction is coded
#[derive(Debug, Copy, Clone, PartialEq)]
pub(crate) struct CorrectorRange {
    pub(crate) corr_bits: u32,
    pub(crate) corr_range: u32,
    pub(crate) corr_min: i32,
    pub(crate) corr_max: i32,
}

impl CorrectorRange {
    pub(crate) fn new(bits: u32, mut range: u32) -> Self {
        if range != 0 {
            // the corrector's significant bits and range
            let corr_range = range;
            let mut corr_bits = 0u32;
            while range != 0 {
                range >>= 1;
                corr_bits += 1;
            }
            if corr_range == (1u32 << (corr_bits - 1)) {
                corr_bits -= 1;
            }
            // the corrector must fall into this interval
            let corr_min = -((corr_range / 2) as i32);
            Self {
                corr_bits,
                corr_range,
                corr_min,
                corr_max: corr_min + (corr_range - 1) as i32,
            }
        } else if bits >= 1 && bits < 32 {
            let corr_range = 1u32 << bits;
            let corr_min = -((corr_range / 2) as i32);
            Self {
                corr_bits: bits,
                corr_range,
                corr_min,
                corr_max: corr_min + (corr_range - 1) as i32,
            }
        } else {
            Self {
                corr_bits: 32,
                corr_range: 0,
                corr_min: std::i32::MIN,
                corr_max: std::i32::MAX,
            }
        }
    }

    /// One model per context for k, then one corrector model per k in `1..=corr_bits`
    pub(crate) fn models(
        &self,
        contexts: u32,
        bits_high: u32,
    ) -> (Vec<ArithmeticModel>, Vec<ArithmeticModel>) {
        let k_models = (0..contexts)
            .map(|_| ArithmeticModel::new(self.corr_bits + 1))
            .collect();
        let corrector_models = (1..=self.corr_bits)
            .map(|i| ArithmeticModel::new(1u32 << i.min(bits_high)))
            .collect();
        (k_models, corrector_models)
    }
}

/// Codes the difference between an integer and its prediction
#[derive(Debug)]
pub struct IntegerCompressor {
    k: u32,

    contexts: u32,
    bits_high: u32,
    range: CorrectorRange,

    m_bits: Vec<ArithmeticModel>,
    m_corrector_0: ArithmeticBitModel,
    m_corrector: Vec<ArithmeticModel>,
}

impl IntegerCompressor {
    pub fn new(bits: u32, contexts: u32, bits_high: u32, range: u32) -> Self {
        Self {
            k: 0,
            contexts,
            bits_high,
            range: CorrectorRange::new(bits, range),
            m_bits: vec![],
            m_corrector_0: ArithmeticBitModel::new(),
            m_corrector: vec![],
        }
    }

    /// Number of significant bits of the last coded corrector
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

    pub fn compress<T: Write>(
        &mut self,
        encoder: &mut ArithmeticEncoder<T>,
        pred: i32,
        real: i32,
        context: u32,
    ) -> std::io::Result<()> {
        // the corrector will be within the interval [ - (corr_range - 1)  ...  + (corr_range - 1) ]
        let mut corr = real.wrapping_sub(pred);
        // we fold the corrector into the interval [ corr_min  ...  corr_max ]
        if corr < self.range.corr_min {
            corr = corr.wrapping_add(self.range.corr_range as i32);
        } else if corr > self.range.corr_max {
            corr = corr.wrapping_sub(self.range.corr_range as i32);
        }
        self.write_corrector(encoder, corr, context)
    }

    fn write_corrector<T: Write>(
        &mut self,
        encoder: &mut ArithmeticEncoder<T>,
        mut c: i32,
        context: u32,
    ) -> std::io::Result<()> {
        // find the tightest interval [ - (2^k - 1)  ...  + (2^k) ] that contains c
        // do this by checking the absolute value of c (adjusted for the case that c is 2^k)
        let c1 = if c <= 0 {
            c.wrapping_neg() as u32
        } else {
            (c - 1) as u32
        };
        self.k = 32 - c1.leading_zeros();

        // the number k is between 0 and corr_bits and describes the interval the corrector
        encoder.encode_symbol(&mut self.m_bits[context as usize], self.k)?;

        if self.k == 0 {
            // then c is 0 or 1
            debug_assert!(c == 0 || c == 1);
            return encoder.encode_bit(&mut self.m_corrector_0, c as u32);
        }
        if self.k < 32 {
            // translate the corrector c into the k-bit interval [ 0 ... 2^k - 1 ]
            if c >= 0 {
                // c is in [ 2^(k-1) + 1 ... 2^k ], subtract 1
                c -= 1;
            } else {
                // c is in [ - (2^k - 1) ... - 2^(k-1) ], add (2^k - 1)
                c += ((1u32 << self.k) - 1) as i32;
            }

            let model = &mut self.m_corrector[(self.k - 1) as usize];
            if self.k <= self.bits_high {
                // for small k we code the interval in one step
                encoder.encode_symbol(model, c as u32)?;
            } else {
                // for larger k the lowest k - bits_high bits are stored raw
                let k1 = self.k - self.bits_high;
                let low = (c as u32) & ((1u32 << k1) - 1);
                encoder.encode_symbol(model, (c >> k1) as u32)?;
                encoder.write_bits(k1, low)?;
            }
        }
        // k == 32 is only reached by corr_min, k alone identifies it
        Ok(())
    }
}

impl IntegerCodec for IntegerCompressor {
    fn with_bits_and_contexts(bits: u32, contexts: u32) -> Self {
        IntegerCompressorBuilder::new()
            .bits(bits)
            .contexts(contexts)
            .build_initialized()
    }
}

pub struct IntegerCompressorBuilder {
    bits: u32,
    contexts: u32,
    bits_high: u32,
    range: u32,
}

impl IntegerCompressorBuilder {
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

    pub fn build(&self) -> IntegerCompressor {
        IntegerCompressor::new(self.bits, self.contexts, self.bits_high, self.range)
    }

    pub fn build_initialized(&self) -> IntegerCompressor {
        let mut ic = self.build();
        ic.init();
        ic
    }
}

impl Default for IntegerCompressorBuilder {
    fn default() -> Self {
        Self::new()
    }
}
