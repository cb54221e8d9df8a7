/*
===============================================================================

  PROGRAMMERS:

    martin.isenburg@rapidlasso.com  -  http://rapidlasso.com
    uday.karan@gmail.com - Hobu, Inc.
    andrew.bell.ia@gmail.com - Hobu Inc.

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
//! Compression of the extra bytes that may follow the standard fields of a point.
//!
//! Each extra byte is coded as the difference with the same byte
//! of the previous point. In layered (v3) streams the previous point is the
//! last one of the same scanner channel (context) and each byte lives in its
//! own layer.

pub mod v2 {
    //! All the extra bytes of the point formats 0 to 5 share the stream of the point.
    use std::io::{Read, Write};

    use crate::decoders::ArithmeticDecoder;
    use crate::encoders::ArithmeticEncoder;
    use crate::models::{ArithmeticModel, ArithmeticModelBuilder};
    use crate::record::{FieldCompressor, FieldDecompressor};

    struct ExtraBytes {
        last_bytes: Vec<u8>,
        models: Vec<ArithmeticModel>,
    }

    impl ExtraBytes {
        fn from_last(last_bytes: &[u8]) -> Self {
            Self {
                last_bytes: last_bytes.to_vec(),
                models: (0..last_bytes.len())
                    .map(|_i| ArithmeticModelBuilder::new(256).build())
                    .collect(),
            }
        }
    }

    pub struct LasExtraByteCompressor {
        state: ExtraBytes,
    }

    impl LasExtraByteCompressor {
        pub fn new(count: usize) -> Self {
            Self {
                state: ExtraBytes::from_last(&vec![0u8; count]),
            }
        }
    }

    impl<W: Write> FieldCompressor<W> for LasExtraByteCompressor {
        fn size_of_field(&self) -> usize {
            self.state.last_bytes.len()
        }

        fn compress_first(&mut self, dst: &mut W, first_point: &[u8]) -> std::io::Result<()> {
            let first_point = &first_point[..self.state.last_bytes.len()];
            self.state = ExtraBytes::from_last(first_point);
            dst.write_all(first_point)
        }

        fn compress_with(
            &mut self,
            encoder: &mut ArithmeticEncoder<W>,
            buf: &[u8],
        ) -> std::io::Result<()> {
            let state = &mut self.state;
            for ((last, model), current) in state
                .last_bytes
                .iter_mut()
                .zip(state.models.iter_mut())
                .zip(buf.iter())
            {
                let diff = current.wrapping_sub(*last);
                encoder.encode_symbol(model, u32::from(diff))?;
                *last = *current;
            }
            Ok(())
        }
    }

    pub struct LasExtraByteDecompressor {
        state: ExtraBytes,
    }

    impl LasExtraByteDecompressor {
        pub fn new(count: usize) -> Self {
            Self {
                state: ExtraBytes::from_last(&vec![0u8; count]),
            }
        }
    }

    impl<R: Read> FieldDecompressor<R> for LasExtraByteDecompressor {
        fn size_of_field(&self) -> usize {
            self.state.last_bytes.len()
        }

        fn decompress_first(&mut self, src: &mut R, first_point: &mut [u8]) -> std::io::Result<()> {
            let first_point = &mut first_point[..self.state.last_bytes.len()];
            src.read_exact(first_point)?;
            self.state = ExtraBytes::from_last(first_point);
            Ok(())
        }

        fn decompress_with(
            &mut self,
            decoder: &mut ArithmeticDecoder<R>,
            buf: &mut [u8],
        ) -> std::io::Result<()> {
            let state = &mut self.state;
            for ((last, model), out) in state
                .last_bytes
                .iter_mut()
                .zip(state.models.iter_mut())
                .zip(buf.iter_mut())
            {
                let diff = decoder.decode_symbol(model)? as u8;
                *last = last.wrapping_add(diff);
                *out = *last;
            }
            Ok(())
        }
    }
}

pub mod v3 {
    use std::io::{Cursor, Read, Seek, Write};

    use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
    use log::trace;

    use crate::decoders::ArithmeticDecoder;
    use crate::encoders::ArithmeticEncoder;
    use crate::las::selective::DecompressionSelector;
    use crate::las::utils::{
        copy_bytes_into_decoder, copy_encoder_content_to, layer_size_of, reset_layer_encoder,
    };
    use crate::models::{ArithmeticModel, ArithmeticModelBuilder};
    use crate::record::{LayeredFieldCompressor, LayeredFieldDecompressor};

    struct ExtraBytesContext {
        last_bytes: Vec<u8>,
        models: Vec<ArithmeticModel>,
        unused: bool,
    }

    impl ExtraBytesContext {
        fn from_last(last_bytes: &[u8]) -> Self {
            Self {
                last_bytes: last_bytes.to_vec(),
                models: (0..last_bytes.len())
                    .map(|_i| ArithmeticModelBuilder::new(256).build())
                    .collect(),
                unused: false,
            }
        }

        fn unused_contexts(count: usize) -> Vec<Self> {
            let zeros = vec![0u8; count];
            (0..4)
                .map(|_i| {
                    let mut ctx = Self::from_last(&zeros);
                    ctx.unused = true;
                    ctx
                })
                .collect()
        }
    }

    fn switch_context(
        contexts: &mut [ExtraBytesContext],
        current_context: &mut usize,
        context: usize,
    ) {
        if *current_context != context {
            if contexts[context].unused {
                trace!(
                    "byte14: initializing context {} from context {}",
                    context,
                    current_context
                );
                let new_context = ExtraBytesContext::from_last(&contexts[*current_context].last_bytes);
                contexts[context] = new_context;
            }
            *current_context = context;
        }
    }

    pub struct LasExtraByteDecompressor {
        // Each extra bytes has is own layer, thus its own decoder
        decoders: Vec<ArithmeticDecoder<Cursor<Vec<u8>>>>,
        layers_sizes: Vec<u32>,
        has_byte_changed: Vec<bool>,
        requested_bytes: bool,
        contexts: Vec<ExtraBytesContext>,
        num_extra_bytes: usize,
        current_context: usize,
    }

    impl LasExtraByteDecompressor {
        pub fn new(count: usize) -> Self {
            Self::selective(count, DecompressionSelector::all())
        }

        pub fn selective(count: usize, selection: DecompressionSelector) -> Self {
            Self {
                decoders: (0..count)
                    .map(|_i| ArithmeticDecoder::new(Cursor::new(Vec::<u8>::new())))
                    .collect(),
                layers_sizes: vec![0; count],
                has_byte_changed: vec![false; count],
                requested_bytes: selection.should_decompress_extra_bytes(),
                contexts: ExtraBytesContext::unused_contexts(count),
                num_extra_bytes: count,
                current_context: 0,
            }
        }
    }

    impl<R: Read + Seek> LayeredFieldDecompressor<R> for LasExtraByteDecompressor {
        fn size_of_field(&self) -> usize {
            self.num_extra_bytes
        }

        fn init_first_point(
            &mut self,
            src: &mut R,
            first_point: &mut [u8],
            context: &mut usize,
        ) -> std::io::Result<()> {
            let first_point = &mut first_point[..self.num_extra_bytes];
            src.read_exact(first_point)?;
            for eb_context in &mut self.contexts {
                eb_context.unused = true;
            }
            self.current_context = *context;
            self.contexts[*context] = ExtraBytesContext::from_last(first_point);
            Ok(())
        }

        fn decompress_field_with(
            &mut self,
            current_point: &mut [u8],
            context: &mut usize,
        ) -> std::io::Result<()> {
            switch_context(&mut self.contexts, &mut self.current_context, *context);
            let the_context = &mut self.contexts[self.current_context];

            for i in 0..self.num_extra_bytes {
                if self.has_byte_changed[i] {
                    let diff = self.decoders[i].decode_symbol(&mut the_context.models[i])? as u8;
                    the_context.last_bytes[i] = the_context.last_bytes[i].wrapping_add(diff);
                }
            }
            current_point[..self.num_extra_bytes].copy_from_slice(&the_context.last_bytes);
            Ok(())
        }

        fn read_layers_sizes(&mut self, src: &mut R) -> std::io::Result<()> {
            for layer_size in &mut self.layers_sizes {
                *layer_size = src.read_u32::<LittleEndian>()?;
            }
            Ok(())
        }

        fn read_layers(&mut self, src: &mut R) -> std::io::Result<()> {
            for i in 0..self.num_extra_bytes {
                self.has_byte_changed[i] = copy_bytes_into_decoder(
                    self.requested_bytes,
                    self.layers_sizes[i] as usize,
                    &mut self.decoders[i],
                    src,
                )?;
            }
            Ok(())
        }
    }

    pub struct LasExtraByteCompressor {
        // Each extra bytes has is own layer, thus its own encoder
        encoders: Vec<ArithmeticEncoder<Cursor<Vec<u8>>>>,
        has_byte_changed: Vec<bool>,
        contexts: Vec<ExtraBytesContext>,
        num_extra_bytes: usize,
        current_context: usize,
    }

    impl LasExtraByteCompressor {
        pub fn new(count: usize) -> Self {
            Self {
                encoders: (0..count)
                    .map(|_i| ArithmeticEncoder::new(Cursor::new(Vec::<u8>::new())))
                    .collect(),
                has_byte_changed: vec![false; count],
                contexts: ExtraBytesContext::unused_contexts(count),
                num_extra_bytes: count,
                current_context: 0,
            }
        }
    }

    impl<W: Write> LayeredFieldCompressor<W> for LasExtraByteCompressor {
        fn size_of_field(&self) -> usize {
            self.num_extra_bytes
        }

        fn init_first_point(
            &mut self,
            dst: &mut W,
            first_point: &[u8],
            context: &mut usize,
        ) -> std::io::Result<()> {
            let first_point = &first_point[..self.num_extra_bytes];
            dst.write_all(first_point)?;
            for encoder in &mut self.encoders {
                reset_layer_encoder(encoder);
            }
            for changed in &mut self.has_byte_changed {
                *changed = false;
            }
            for eb_context in &mut self.contexts {
                eb_context.unused = true;
            }
            self.current_context = *context;
            self.contexts[*context] = ExtraBytesContext::from_last(first_point);
            Ok(())
        }

        fn compress_field_with(
            &mut self,
            current_point: &[u8],
            context: &mut usize,
        ) -> std::io::Result<()> {
            switch_context(&mut self.contexts, &mut self.current_context, *context);
            let the_context = &mut self.contexts[self.current_context];

            for i in 0..self.num_extra_bytes {
                let diff = current_point[i].wrapping_sub(the_context.last_bytes[i]);
                self.encoders[i].encode_symbol(&mut the_context.models[i], u32::from(diff))?;
                if diff != 0 {
                    self.has_byte_changed[i] = true;
                    the_context.last_bytes[i] = current_point[i];
                }
            }
            Ok(())
        }

        fn write_layers_sizes(&mut self, dst: &mut W) -> std::io::Result<()> {
            for (encoder, changed) in self.encoders.iter_mut().zip(&self.has_byte_changed) {
                let size = layer_size_of(*changed, encoder)?;
                dst.write_u32::<LittleEndian>(size)?;
            }
            Ok(())
        }

        fn write_layers(&mut self, dst: &mut W) -> std::io::Result<()> {
            for (encoder, changed) in self.encoders.iter().zip(&self.has_byte_changed) {
                if *changed {
                    copy_encoder_content_to(encoder, dst)?;
                }
            }
            Ok(())
        }
    }
}
