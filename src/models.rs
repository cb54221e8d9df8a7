/*
===============================================================================

  CONTENTS:
    Adaptive symbol and bit models used by the range coder

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

// length bits discarded before mult.
pub(crate) const DM_LENGTH_SHIFT: u32 = 15;
// for adaptive models
pub(crate) const DM_MAX_COUNT: u32 = 1 << DM_LENGTH_SHIFT;

// length bits discarded before mult.
pub(crate) const BM_LENGTH_SHIFT: u32 = 13;
// for adaptive models
pub(crate) const BM_MAX_COUNT: u32 = 1 << BM_LENGTH_SHIFT;

const MAX_SYMBOLS: u32 = 1 << 11;

/// Adaptive frequency table of a fixed alphabet `0..symbols`.
///
/// Symbol counts are accumulated as symbols are coded and the cumulative
/// distribution is recomputed every `update_cycle` symbols. When the total
/// count goes over `DM_MAX_COUNT` all counts are halved, which keeps the
/// model adapting to the local statistics of the stream.
#[derive(Debug, Clone)]
pub struct ArithmeticModel {
    pub(crate) symbols: u32,

    pub(crate) distribution: Vec<u32>,
    pub(crate) symbol_count: Vec<u32>,
    // only allocated for alphabets of more than 16 symbols
    pub(crate) decoder_table: Vec<u32>,

    pub(crate) total_count: u32,
    pub(crate) update_cycle: u32,
    pub(crate) symbols_until_update: u32,
    pub(crate) last_symbol: u32,
    pub(crate) table_size: u32,
    pub(crate) table_shift: u32,
}

impl ArithmeticModel {
    /// Creates a model where every symbol is equiprobable
    ///
    /// # Panics
    ///
    /// If `symbols` is not in `2..=2048`
    pub fn new(symbols: u32) -> Self {
        assert!(
            symbols >= 2 && symbols <= MAX_SYMBOLS,
            "Invalid number of symbols: {}",
            symbols
        );

        let (table_size, table_shift, decoder_table) = if symbols > 16 {
            let mut table_bits = 3u32;
            while symbols > (1u32 << (table_bits + 2)) {
                table_bits += 1;
            }
            let table_size = 1u32 << table_bits;
            (
                table_size,
                DM_LENGTH_SHIFT - table_bits,
                vec![0u32; table_size as usize + 2],
            )
        } else {
            (0, 0, Vec::new())
        };

        let mut model = Self {
            symbols,
            distribution: vec![0u32; symbols as usize],
            symbol_count: vec![1u32; symbols as usize],
            decoder_table,
            total_count: 0,
            update_cycle: symbols,
            symbols_until_update: 0,
            last_symbol: symbols - 1,
            table_size,
            table_shift,
        };
        model.update();
        model.update_cycle = (symbols + 6) >> 1;
        model.symbols_until_update = model.update_cycle;
        model
    }

    pub fn symbols(&self) -> u32 {
        self.symbols
    }

    pub(crate) fn update(&mut self) {
        // halve counts when a threshold is reached
        self.total_count += self.update_cycle;
        if self.total_count > DM_MAX_COUNT {
            self.total_count = 0;
            for count in &mut self.symbol_count {
                *count = (*count + 1) >> 1;
                self.total_count += *count;
            }
        }

        // compute cumulative distribution, decoder table
        let scale = 0x8000_0000u32 / self.total_count;
        let mut sum = 0u32;
        if self.decoder_table.is_empty() {
            for (distribution, count) in self.distribution.iter_mut().zip(&self.symbol_count) {
                *distribution = (scale * sum) >> (31 - DM_LENGTH_SHIFT);
                sum += *count;
            }
        } else {
            let mut s = 0usize;
            for (k, (distribution, count)) in self
                .distribution
                .iter_mut()
                .zip(&self.symbol_count)
                .enumerate()
            {
                *distribution = (scale * sum) >> (31 - DM_LENGTH_SHIFT);
                sum += *count;
                let w = (*distribution >> self.table_shift) as usize;
                while s < w {
                    s += 1;
                    self.decoder_table[s] = k as u32 - 1;
                }
            }
            self.decoder_table[0] = 0;
            while s <= self.table_size as usize {
                s += 1;
                self.decoder_table[s] = self.symbols - 1;
            }
        }

        // set frequency of model updates
        self.update_cycle = (5 * self.update_cycle) >> 2;
        let max_cycle = (self.symbols + 6) << 3;
        if self.update_cycle > max_cycle {
            self.update_cycle = max_cycle;
        }
        self.symbols_until_update = self.update_cycle;
    }

    /// Registers one more occurrence of `symbol`
    #[inline]
    pub(crate) fn count(&mut self, symbol: u32) {
        self.symbol_count[symbol as usize] += 1;
        self.symbols_until_update -= 1;
        if self.symbols_until_update == 0 {
            self.update();
        }
    }
}

/// Adaptive model of a single bit
#[derive(Debug, Clone)]
pub struct ArithmeticBitModel {
    pub(crate) bit_0_count: u32,
    pub(crate) bit_count: u32,
    pub(crate) bit_0_prob: u32,
    pub(crate) bits_until_update: u32,
    pub(crate) update_cycle: u32,
}

impl ArithmeticBitModel {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn update(&mut self) {
        // halve counts when a threshold is reached
        self.bit_count += self.update_cycle;
        if self.bit_count > BM_MAX_COUNT {
            self.bit_count = (self.bit_count + 1) >> 1;
            self.bit_0_count = (self.bit_0_count + 1) >> 1;
            if self.bit_0_count == self.bit_count {
                self.bit_count += 1;
            }
        }

        // compute scaled bit 0 probability
        let scale = 0x8000_0000u32 / self.bit_count;
        self.bit_0_prob = (self.bit_0_count * scale) >> (31 - BM_LENGTH_SHIFT);

        // set frequency of model updates
        self.update_cycle = (5 * self.update_cycle) >> 2;
        if self.update_cycle > 64 {
            self.update_cycle = 64;
        }
        self.bits_until_update = self.update_cycle;
    }

    #[inline]
    pub(crate) fn count(&mut self, bit: u32) {
        if bit == 0 {
            self.bit_0_count += 1;
        }
        self.bits_until_update -= 1;
        if self.bits_until_update == 0 {
            self.update();
        }
    }
}

impl Default for ArithmeticBitModel {
    fn default() -> Self {
        // initialization to equiprobable model
        Self {
            bit_0_count: 1,
            bit_count: 2,
            bit_0_prob: 1u32 << (BM_LENGTH_SHIFT - 1),
            // start with frequent updates
            bits_until_update: 4,
            update_cycle: 4,
        }
    }
}

pub struct ArithmeticModelBuilder {
    symbols: u32,
}

impl ArithmeticModelBuilder {
    pub fn new(symbols: u32) -> Self {
        Self { symbols }
    }

    pub fn build(self) -> ArithmeticModel {
        ArithmeticModel::new(self.symbols)
    }
}
