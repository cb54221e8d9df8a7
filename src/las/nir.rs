//! Near infrared channel and its layered (v3) compression

use crate::packers::Packable;

#[derive(Default, Copy, Clone, Debug, PartialOrd, PartialEq)]
pub struct Nir(pub u16);

impl Nir {
    pub const SIZE: usize = 2;
}

impl Packable for Nir {
    fn unpack_from(input: &[u8]) -> Self {
        Nir(u16::unpack_from(input))
    }

    fn pack_into(&self, output: &mut [u8]) {
        u16::pack_into(&self.0, output)
    }
}

pub mod v3 {
    use std::io::{Cursor, Read, Seek, Write};

    use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
    use log::trace;

    use crate::decoders::ArithmeticDecoder;
    use crate::encoders::ArithmeticEncoder;
    use crate::las::nir::Nir;
    use crate::las::selective::DecompressionSelector;
    use crate::las::utils::{
        copy_bytes_into_decoder, copy_encoder_content_to, layer_size_of, lower_byte,
        lower_byte_changed, reset_layer_encoder, upper_byte, upper_byte_changed,
    };
    use crate::models::{ArithmeticModel, ArithmeticModelBuilder};
    use crate::packers::Packable;
    use crate::record::{LayeredFieldCompressor, LayeredFieldDecompressor};

    struct NirContext {
        last_nir: u16,
        bytes_used_model: ArithmeticModel,
        diff_0_model: ArithmeticModel,
        diff_1_model: ArithmeticModel,
        unused: bool,
    }

    impl NirContext {
        fn from_last(last_nir: u16) -> Self {
            Self {
                last_nir,
                bytes_used_model: ArithmeticModelBuilder::new(4).build(),
                diff_0_model: ArithmeticModelBuilder::new(256).build(),
                diff_1_model: ArithmeticModelBuilder::new(256).build(),
                unused: false,
            }
        }

        fn unused_contexts() -> [Self; 4] {
            let mut contexts = [
                Self::from_last(0),
                Self::from_last(0),
                Self::from_last(0),
                Self::from_last(0),
            ];
            for ctx in &mut contexts {
                ctx.unused = true;
            }
            contexts
        }
    }

    fn switch_context(contexts: &mut [NirContext; 4], current_context: &mut usize, context: usize) {
        if *current_context != context {
            if contexts[context].unused {
                trace!("nir14: initializing context {} from context {}", context, current_context);
                contexts[context] = NirContext::from_last(contexts[*current_context].last_nir);
            }
            *current_context = context;
        }
    }

    pub struct LasNIRDecompressor {
        decoder: ArithmeticDecoder<Cursor<Vec<u8>>>,
        changed_nir: bool,
        requested_nir: bool,
        layer_size: u32,
        current_context: usize,
        contexts: [NirContext; 4],
    }

    impl LasNIRDecompressor {
        pub fn new() -> Self {
            Self::selective(DecompressionSelector::all())
        }

        pub fn selective(selection: DecompressionSelector) -> Self {
            Self {
                decoder: ArithmeticDecoder::new(Cursor::new(Vec::<u8>::new())),
                changed_nir: false,
                requested_nir: selection.should_decompress_nir(),
                layer_size: 0,
                current_context: 0,
                contexts: NirContext::unused_contexts(),
            }
        }
    }

    impl Default for LasNIRDecompressor {
        fn default() -> Self {
            Self::new()
        }
    }

    impl<R: Read + Seek> LayeredFieldDecompressor<R> for LasNIRDecompressor {
        fn size_of_field(&self) -> usize {
            Nir::SIZE
        }

        fn init_first_point(
            &mut self,
            src: &mut R,
            first_point: &mut [u8],
            context: &mut usize,
        ) -> std::io::Result<()> {
            let first_point = &mut first_point[..Nir::SIZE];
            src.read_exact(first_point)?;
            for ctx in &mut self.contexts {
                ctx.unused = true;
            }
            self.current_context = *context;
            self.contexts[*context] = NirContext::from_last(Nir::unpack_from(first_point).0);
            Ok(())
        }

        fn decompress_field_with(
            &mut self,
            current_point: &mut [u8],
            context: &mut usize,
        ) -> std::io::Result<()> {
            switch_context(&mut self.contexts, &mut self.current_context, *context);
            let the_context = &mut self.contexts[self.current_context];

            if self.changed_nir {
                let last = the_context.last_nir;
                let sym = self.decoder.decode_symbol(&mut the_context.bytes_used_model)?;

                let low = if is_nth_bit_set!(sym, 0) {
                    let corr = self.decoder.decode_symbol(&mut the_context.diff_0_model)? as u8;
                    corr.wrapping_add(lower_byte(last))
                } else {
                    lower_byte(last)
                };

                let high = if is_nth_bit_set!(sym, 1) {
                    let corr = self.decoder.decode_symbol(&mut the_context.diff_1_model)? as u8;
                    corr.wrapping_add(upper_byte(last))
                } else {
                    upper_byte(last)
                };
                the_context.last_nir = u16::from(high) << 8 | u16::from(low);
            }

            Nir(the_context.last_nir).pack_into(current_point);
            Ok(())
        }

        fn read_layers_sizes(&mut self, src: &mut R) -> std::io::Result<()> {
            self.layer_size = src.read_u32::<LittleEndian>()?;
            Ok(())
        }

        fn read_layers(&mut self, src: &mut R) -> std::io::Result<()> {
            self.changed_nir = copy_bytes_into_decoder(
                self.requested_nir,
                self.layer_size as usize,
                &mut self.decoder,
                src,
            )?;
            Ok(())
        }
    }

    pub struct LasNIRCompressor {
        encoder: ArithmeticEncoder<Cursor<Vec<u8>>>,
        nir_has_changed: bool,
        current_context: usize,
        contexts: [NirContext; 4],
    }

    impl LasNIRCompressor {
        pub fn new() -> Self {
            Self {
                encoder: ArithmeticEncoder::new(Cursor::new(Vec::<u8>::new())),
                nir_has_changed: false,
                current_context: 0,
                contexts: NirContext::unused_contexts(),
            }
        }
    }

    impl Default for LasNIRCompressor {
        fn default() -> Self {
            Self::new()
        }
    }

    impl<W: Write> LayeredFieldCompressor<W> for LasNIRCompressor {
        fn size_of_field(&self) -> usize {
            Nir::SIZE
        }

        fn init_first_point(
            &mut self,
            dst: &mut W,
            first_point: &[u8],
            context: &mut usize,
        ) -> std::io::Result<()> {
            let first_point = &first_point[..Nir::SIZE];
            dst.write_all(first_point)?;
            reset_layer_encoder(&mut self.encoder);
            self.nir_has_changed = false;
            for ctx in &mut self.contexts {
                ctx.unused = true;
            }
            self.current_context = *context;
            self.contexts[*context] = NirContext::from_last(Nir::unpack_from(first_point).0);
            Ok(())
        }

        fn compress_field_with(&mut self, buf: &[u8], context: &mut usize) -> std::io::Result<()> {
            let current = Nir::unpack_from(buf).0;
            switch_context(&mut self.contexts, &mut self.current_context, *context);
            let the_context = &mut self.contexts[self.current_context];
            let last = the_context.last_nir;

            if last != current {
                self.nir_has_changed = true;
            }

            let sym = (lower_byte_changed(current, last) as u32)
                | (upper_byte_changed(current, last) as u32) << 1;
            self.encoder
                .encode_symbol(&mut the_context.bytes_used_model, sym)?;

            if is_nth_bit_set!(sym, 0) {
                let diff = lower_byte(current).wrapping_sub(lower_byte(last));
                self.encoder
                    .encode_symbol(&mut the_context.diff_0_model, u32::from(diff))?;
            }

            if is_nth_bit_set!(sym, 1) {
                let diff = upper_byte(current).wrapping_sub(upper_byte(last));
                self.encoder
                    .encode_symbol(&mut the_context.diff_1_model, u32::from(diff))?;
            }

            the_context.last_nir = current;
            Ok(())
        }

        fn write_layers_sizes(&mut self, dst: &mut W) -> std::io::Result<()> {
            let size = layer_size_of(self.nir_has_changed, &mut self.encoder)?;
            dst.write_u32::<LittleEndian>(size)
        }

        fn write_layers(&mut self, dst: &mut W) -> std::io::Result<()> {
            if self.nir_has_changed {
                copy_encoder_content_to(&self.encoder, dst)?;
            }
            Ok(())
        }
    }
}
