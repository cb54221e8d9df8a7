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


//! Module with the definition of a RGB struct and its sequential (v2)
//! and layered (v3) compression

use crate::decoders::ArithmeticDecoder;
use crate::encoders::ArithmeticEncoder;
use crate::las::utils::{lower_byte, lower_byte_changed, u8_clamp, upper_byte, upper_byte_changed};
use crate::models::{ArithmeticModel, ArithmeticModelBuilder};
use crate::packers::Packable;

/// Struct representing a RGB component of a point, in compliance with
/// the LAS spec
#[derive(Default, Copy, Clone, Debug, PartialEq)]
pub struct RGB {
    pub red: u16,
    pub green: u16,
    pub blue: u16,
}

impl RGB {
    pub const SIZE: usize = 6;
}

impl Packable for RGB {
    fn unpack_from(input: &[u8]) -> Self {
        Self {
            red: u16::unpack_from(&input[0..2]),
            green: u16::unpack_from(&input[2..4]),
            blue: u16::unpack_from(&input[4..6]),
        }
    }

    fn pack_into(&self, output: &mut [u8]) {
        u16::pack_into(&self.red, &mut output[0..2]);
        u16::pack_into(&self.green, &mut output[2..4]);
        u16::pack_into(&self.blue, &mut output[4..6]);
    }
}

/// Which bytes changed from the last color,
/// bit 6 is set when the color is not a shade of grey
struct ColorDiff(u8);

impl ColorDiff {
    fn from_points(current: &RGB, last: &RGB) -> Self {
        let v = (lower_byte_changed(last.red, current.red) as u8)
            | (upper_byte_changed(last.red, current.red) as u8) << 1
            | (lower_byte_changed(last.green, current.green) as u8) << 2
            | (upper_byte_changed(last.green, current.green) as u8) << 3
            | (lower_byte_changed(last.blue, current.blue) as u8) << 4
            | (upper_byte_changed(last.blue, current.blue) as u8) << 5
            | ((lower_byte_changed(current.red, current.green)
                || lower_byte_changed(current.red, current.blue)
                || upper_byte_changed(current.red, current.green)
                || upper_byte_changed(current.red, current.blue)) as u8)
                << 6;
        ColorDiff(v)
    }

    fn lower_red_byte_changed(&self) -> bool {
        is_nth_bit_set!(self.0, 0)
    }

    fn upper_red_byte_changed(&self) -> bool {
        is_nth_bit_set!(self.0, 1)
    }

    fn lower_green_byte_changed(&self) -> bool {
        is_nth_bit_set!(self.0, 2)
    }

    fn upper_green_byte_changed(&self) -> bool {
        is_nth_bit_set!(self.0, 3)
    }

    fn lower_blue_byte_changed(&self) -> bool {
        is_nth_bit_set!(self.0, 4)
    }

    fn upper_blue_byte_changed(&self) -> bool {
        is_nth_bit_set!(self.0, 5)
    }

    fn is_colored(&self) -> bool {
        is_nth_bit_set!(self.0, 6)
    }
}

pub(crate) struct RGBModels {
    byte_used: ArithmeticModel,
    lower_red_byte: ArithmeticModel,
    upper_red_byte: ArithmeticModel,
    lower_green_byte: ArithmeticModel,
    upper_green_byte: ArithmeticModel,
    lower_blue_byte: ArithmeticModel,
    upper_blue_byte: ArithmeticModel,
}

impl Default for RGBModels {
    fn default() -> Self {
        Self {
            byte_used: ArithmeticModelBuilder::new(128).build(),
            lower_red_byte: ArithmeticModelBuilder::new(256).build(),
            upper_red_byte: ArithmeticModelBuilder::new(256).build(),
            lower_green_byte: ArithmeticModelBuilder::new(256).build(),
            upper_green_byte: ArithmeticModelBuilder::new(256).build(),
            lower_blue_byte: ArithmeticModelBuilder::new(256).build(),
            upper_blue_byte: ArithmeticModelBuilder::new(256).build(),
        }
    }
}

/// Red is coded as a byte difference, green and blue
/// are predicted from the red difference
pub(crate) fn compress_rgb_using<W: std::io::Write>(
    encoder: &mut ArithmeticEncoder<W>,
    models: &mut RGBModels,
    current_rgb: &RGB,
    last_rgb: &RGB,
) -> std::io::Result<()> {
    let mut diff_l = 0i32;
    let mut diff_h = 0i32;
    let mut corr;

    let color_diff = ColorDiff::from_points(current_rgb, last_rgb);
    encoder.encode_symbol(&mut models.byte_used, u32::from(color_diff.0))?;

    if color_diff.lower_red_byte_changed() {
        diff_l = i32::from(lower_byte(current_rgb.red)) - i32::from(lower_byte(last_rgb.red));
        encoder.encode_symbol(&mut models.lower_red_byte, u32::from(diff_l as u8))?;
    }

    if color_diff.upper_red_byte_changed() {
        diff_h = i32::from(upper_byte(current_rgb.red)) - i32::from(upper_byte(last_rgb.red));
        encoder.encode_symbol(&mut models.upper_red_byte, u32::from(diff_h as u8))?;
    }

    if color_diff.is_colored() {
        if color_diff.lower_green_byte_changed() {
            corr = i32::from(lower_byte(current_rgb.green))
                - i32::from(u8_clamp(diff_l + i32::from(lower_byte(last_rgb.green))));
            encoder.encode_symbol(&mut models.lower_green_byte, u32::from(corr as u8))?;
        }

        if color_diff.lower_blue_byte_changed() {
            diff_l = (diff_l + i32::from(lower_byte(current_rgb.green))
                - i32::from(lower_byte(last_rgb.green)))
                / 2;
            corr = i32::from(lower_byte(current_rgb.blue))
                - i32::from(u8_clamp(diff_l + i32::from(lower_byte(last_rgb.blue))));
            encoder.encode_symbol(&mut models.lower_blue_byte, u32::from(corr as u8))?;
        }

        if color_diff.upper_green_byte_changed() {
            corr = i32::from(upper_byte(current_rgb.green))
                - i32::from(u8_clamp(diff_h + i32::from(upper_byte(last_rgb.green))));
            encoder.encode_symbol(&mut models.upper_green_byte, u32::from(corr as u8))?;
        }

        if color_diff.upper_blue_byte_changed() {
            diff_h = (diff_h + i32::from(upper_byte(current_rgb.green))
                - i32::from(upper_byte(last_rgb.green)))
                / 2;
            corr = i32::from(upper_byte(current_rgb.blue))
                - i32::from(u8_clamp(diff_h + i32::from(upper_byte(last_rgb.blue))));
            encoder.encode_symbol(&mut models.upper_blue_byte, u32::from(corr as u8))?;
        }
    }
    Ok(())
}

pub(crate) fn decompress_rgb_using<R: std::io::Read>(
    decoder: &mut ArithmeticDecoder<R>,
    models: &mut RGBModels,
    last: &RGB,
) -> std::io::Result<RGB> {
    let sym = decoder.decode_symbol(&mut models.byte_used)?;
    let color_diff = ColorDiff(sym as u8);

    let mut this_val = RGB::default();
    let mut corr;
    let mut diff;

    if color_diff.lower_red_byte_changed() {
        corr = decoder.decode_symbol(&mut models.lower_red_byte)? as u8;
        this_val.red = u16::from(corr.wrapping_add(lower_byte(last.red)));
    } else {
        this_val.red = last.red & 0x00FF;
    }

    if color_diff.upper_red_byte_changed() {
        corr = decoder.decode_symbol(&mut models.upper_red_byte)? as u8;
        this_val.red |= u16::from(corr.wrapping_add(upper_byte(last.red))) << 8;
    } else {
        this_val.red |= last.red & 0xFF00;
    }

    if color_diff.is_colored() {
        diff = i32::from(lower_byte(this_val.red)) - i32::from(lower_byte(last.red));

        if color_diff.lower_green_byte_changed() {
            corr = decoder.decode_symbol(&mut models.lower_green_byte)? as u8;
            this_val.green = u16::from(
                corr.wrapping_add(u8_clamp(diff + i32::from(lower_byte(last.green)))),
            );
        } else {
            this_val.green = last.green & 0x00FF;
        }

        if color_diff.lower_blue_byte_changed() {
            corr = decoder.decode_symbol(&mut models.lower_blue_byte)? as u8;
            diff = (diff + i32::from(lower_byte(this_val.green))
                - i32::from(lower_byte(last.green)))
                / 2;
            this_val.blue = u16::from(
                corr.wrapping_add(u8_clamp(diff + i32::from(lower_byte(last.blue)))),
            );
        } else {
            this_val.blue = last.blue & 0x00FF;
        }

        diff = i32::from(upper_byte(this_val.red)) - i32::from(upper_byte(last.red));
        if color_diff.upper_green_byte_changed() {
            corr = decoder.decode_symbol(&mut models.upper_green_byte)? as u8;
            this_val.green |= u16::from(
                corr.wrapping_add(u8_clamp(diff + i32::from(upper_byte(last.green)))),
            ) << 8;
        } else {
            this_val.green |= last.green & 0xFF00;
        }

        if color_diff.upper_blue_byte_changed() {
            corr = decoder.decode_symbol(&mut models.upper_blue_byte)? as u8;
            diff = (diff + i32::from(upper_byte(this_val.green))
                - i32::from(upper_byte(last.green)))
                / 2;
            this_val.blue |= u16::from(
                corr.wrapping_add(u8_clamp(diff + i32::from(upper_byte(last.blue)))),
            ) << 8;
        } else {
            this_val.blue |= last.blue & 0xFF00;
        }
    } else {
        this_val.green = this_val.red;
        this_val.blue = this_val.red;
    }
    Ok(this_val)
}

pub mod v2 {
    //! The RGB of the point formats 2 and 3, compressed in a single stream.
    use std::io::{Read, Write};

    use crate::decoders::ArithmeticDecoder;
    use crate::encoders::ArithmeticEncoder;
    use crate::las::rgb::RGB;
    use crate::packers::Packable;
    use crate::record::{FieldCompressor, FieldDecompressor};

    use super::{compress_rgb_using, decompress_rgb_using, RGBModels};

    pub struct LasRGBCompressor {
        last: RGB,
        models: RGBModels,
    }

    impl LasRGBCompressor {
        pub fn new() -> Self {
            Self {
                last: RGB::default(),
                models: RGBModels::default(),
            }
        }
    }

    impl Default for LasRGBCompressor {
        fn default() -> Self {
            Self::new()
        }
    }

    impl<W: Write> FieldCompressor<W> for LasRGBCompressor {
        fn size_of_field(&self) -> usize {
            RGB::SIZE
        }

        fn compress_first(&mut self, dst: &mut W, first_point: &[u8]) -> std::io::Result<()> {
            let first_point = &first_point[..RGB::SIZE];
            self.last = RGB::unpack_from(first_point);
            self.models = RGBModels::default();
            dst.write_all(first_point)
        }

        fn compress_with(
            &mut self,
            encoder: &mut ArithmeticEncoder<W>,
            buf: &[u8],
        ) -> std::io::Result<()> {
            let current = RGB::unpack_from(buf);
            compress_rgb_using(encoder, &mut self.models, &current, &self.last)?;
            self.last = current;
            Ok(())
        }
    }

    pub struct LasRGBDecompressor {
        last: RGB,
        models: RGBModels,
    }

    impl LasRGBDecompressor {
        pub fn new() -> Self {
            Self {
                last: RGB::default(),
                models: RGBModels::default(),
            }
        }
    }

    impl Default for LasRGBDecompressor {
        fn default() -> Self {
            Self::new()
        }
    }

    impl<R: Read> FieldDecompressor<R> for LasRGBDecompressor {
        fn size_of_field(&self) -> usize {
            RGB::SIZE
        }

        fn decompress_first(&mut self, src: &mut R, first_point: &mut [u8]) -> std::io::Result<()> {
            let first_point = &mut first_point[..RGB::SIZE];
            src.read_exact(first_point)?;
            self.last = RGB::unpack_from(first_point);
            self.models = RGBModels::default();
            Ok(())
        }

        fn decompress_with(
            &mut self,
            decoder: &mut ArithmeticDecoder<R>,
            buf: &mut [u8],
        ) -> std::io::Result<()> {
            self.last = decompress_rgb_using(decoder, &mut self.models, &self.last)?;
            self.last.pack_into(&mut buf[..RGB::SIZE]);
            Ok(())
        }
    }
}

pub mod v3 {
    //! The RGB compression with one set of models per scanner channel.
    //!
    //! The scanner channel (context) is the one selected by the point 14
    //! item that precedes the RGB in the record.
    use std::io::{Cursor, Read, Seek, Write};

    use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
    use log::trace;

    use crate::decoders::ArithmeticDecoder;
    use crate::encoders::ArithmeticEncoder;
    use crate::las::rgb::RGB;
    use crate::las::selective::DecompressionSelector;
    use crate::las::utils::{
        copy_bytes_into_decoder, copy_encoder_content_to, layer_size_of, reset_layer_encoder,
    };
    use crate::packers::Packable;
    use crate::record::{LayeredFieldCompressor, LayeredFieldDecompressor};

    use super::{compress_rgb_using, decompress_rgb_using, RGBModels};

    struct RGBContext {
        unused: bool,
        last: RGB,
        models: RGBModels,
    }

    impl RGBContext {
        fn from_last(last: RGB) -> Self {
            Self {
                unused: false,
                last,
                models: RGBModels::default(),
            }
        }

        fn unused_contexts() -> [Self; 4] {
            let mut contexts = [
                Self::from_last(RGB::default()),
                Self::from_last(RGB::default()),
                Self::from_last(RGB::default()),
                Self::from_last(RGB::default()),
            ];
            for ctx in &mut contexts {
                ctx.unused = true;
            }
            contexts
        }
    }

    /// Makes `context` the current one, initializing it
    /// from the current one when it was not used yet in the chunk
    fn switch_context(contexts: &mut [RGBContext; 4], current_context: &mut usize, context: usize) {
        if *current_context != context {
            if contexts[context].unused {
                trace!("rgb14: initializing context {} from context {}", context, current_context);
                contexts[context] = RGBContext::from_last(contexts[*current_context].last);
            }
            *current_context = context;
        }
    }

    pub struct LasRGBDecompressor {
        decoder: ArithmeticDecoder<Cursor<Vec<u8>>>,
        changed_rgb: bool,
        requested_rgb: bool,
        layer_size: u32,
        current_context: usize,
        contexts: [RGBContext; 4],
    }

    impl LasRGBDecompressor {
        pub fn new() -> Self {
            Self::selective(DecompressionSelector::all())
        }

        pub fn selective(selection: DecompressionSelector) -> Self {
            Self {
                decoder: ArithmeticDecoder::new(Cursor::new(Vec::<u8>::new())),
                changed_rgb: false,
                requested_rgb: selection.should_decompress_rgb(),
                layer_size: 0,
                current_context: 0,
                contexts: RGBContext::unused_contexts(),
            }
        }
    }

    impl Default for LasRGBDecompressor {
        fn default() -> Self {
            Self::new()
        }
    }

    impl<R: Read + Seek> LayeredFieldDecompressor<R> for LasRGBDecompressor {
        fn size_of_field(&self) -> usize {
            RGB::SIZE
        }

        fn init_first_point(
            &mut self,
            src: &mut R,
            first_point: &mut [u8],
            context: &mut usize,
        ) -> std::io::Result<()> {
            let first_point = &mut first_point[..RGB::SIZE];
            src.read_exact(first_point)?;
            for ctx in &mut self.contexts {
                ctx.unused = true;
            }
            self.current_context = *context;
            self.contexts[*context] = RGBContext::from_last(RGB::unpack_from(first_point));
            Ok(())
        }

        fn decompress_field_with(
            &mut self,
            current_point: &mut [u8],
            context: &mut usize,
        ) -> std::io::Result<()> {
            switch_context(&mut self.contexts, &mut self.current_context, *context);
            let the_context = &mut self.contexts[self.current_context];

            if self.changed_rgb {
                the_context.last =
                    decompress_rgb_using(&mut self.decoder, &mut the_context.models, &the_context.last)?;
            }
            the_context.last.pack_into(current_point);
            Ok(())
        }

        fn read_layers_sizes(&mut self, src: &mut R) -> std::io::Result<()> {
            self.layer_size = src.read_u32::<LittleEndian>()?;
            Ok(())
        }

        fn read_layers(&mut self, src: &mut R) -> std::io::Result<()> {
            self.changed_rgb = copy_bytes_into_decoder(
                self.requested_rgb,
                self.layer_size as usize,
                &mut self.decoder,
                src,
            )?;
            Ok(())
        }
    }

    pub struct LasRGBCompressor {
        encoder: ArithmeticEncoder<Cursor<Vec<u8>>>,
        rgb_has_changed: bool,
        current_context: usize,
        contexts: [RGBContext; 4],
    }

    impl LasRGBCompressor {
        pub fn new() -> Self {
            Self {
                encoder: ArithmeticEncoder::new(Cursor::new(Vec::<u8>::new())),
                rgb_has_changed: false,
                current_context: 0,
                contexts: RGBContext::unused_contexts(),
            }
        }
    }

    impl Default for LasRGBCompressor {
        fn default() -> Self {
            Self::new()
        }
    }

    impl<W: Write> LayeredFieldCompressor<W> for LasRGBCompressor {
        fn size_of_field(&self) -> usize {
            RGB::SIZE
        }

        fn init_first_point(
            &mut self,
            dst: &mut W,
            first_point: &[u8],
            context: &mut usize,
        ) -> std::io::Result<()> {
            let first_point = &first_point[..RGB::SIZE];
            dst.write_all(first_point)?;
            reset_layer_encoder(&mut self.encoder);
            self.rgb_has_changed = false;
            for ctx in &mut self.contexts {
                ctx.unused = true;
            }
            self.current_context = *context;
            self.contexts[*context] = RGBContext::from_last(RGB::unpack_from(first_point));
            Ok(())
        }

        fn compress_field_with(&mut self, buf: &[u8], context: &mut usize) -> std::io::Result<()> {
            let current_point = RGB::unpack_from(buf);
            switch_context(&mut self.contexts, &mut self.current_context, *context);
            let the_context = &mut self.contexts[self.current_context];

            if the_context.last != current_point {
                self.rgb_has_changed = true;
            }
            compress_rgb_using(
                &mut self.encoder,
                &mut the_context.models,
                &current_point,
                &the_context.last,
            )?;
            the_context.last = current_point;
            Ok(())
        }

        fn write_layers_sizes(&mut self, dst: &mut W) -> std::io::Result<()> {
            let size = layer_size_of(self.rgb_has_changed, &mut self.encoder)?;
            dst.write_u32::<LittleEndian>(size)
        }

        fn write_layers(&mut self, dst: &mut W) -> std::io::Result<()> {
            if self.rgb_has_changed {
                copy_encoder_content_to(&self.encoder, dst)?;
            }
            Ok(())
        }
    }
}

#[cfg(test)]
mod test {
    use std::io::Cursor;

    use super::*;

    fn rgb(red: u16, green: u16, blue: u16) -> RGB {
        RGB { red, green, blue }
    }

    #[test]
    fn lower_red_changed() {
        let a = rgb(0, 0, 0);
        let b = rgb(1, 0, 0);
        assert_eq!(ColorDiff::from_points(&a, &b).0, 0b00000001);
        assert_eq!(ColorDiff::from_points(&b, &a).0, 0b01000001);
    }

    #[test]
    fn upper_green_changes() {
        let a = rgb(0, 0, 0);
        let b = rgb(0, 256, 0);
        assert_eq!(ColorDiff::from_points(&a, &b).0, 0b00001000);
        assert_eq!(ColorDiff::from_points(&b, &a).0, 0b01001000);
    }

    #[test]
    fn upper_blue_changes() {
        let a = rgb(0, 0, 0);
        let b = rgb(0, 0, 256);
        assert_eq!(ColorDiff::from_points(&a, &b).0, 0b00100000);
        assert_eq!(ColorDiff::from_points(&b, &a).0, 0b01100000);
    }

    #[test]
    fn test_nothing_changes() {
        let a = RGB::default();
        assert_eq!(ColorDiff::from_points(&a, &a).0, 0);
        let grey = rgb(0x1234, 0x1234, 0x1234);
        assert_eq!(ColorDiff::from_points(&grey, &a).0 & (1 << 6), 0);
    }

    #[test]
    fn test_rgb_coding_round_trip() {
        let colors = vec![
            rgb(0, 0, 0),
            rgb(0x0102, 0x0102, 0x0102),
            rgb(0xFF00, 0x00FF, 0x8080),
            rgb(0xFFFF, 0, 0xFFFF),
            rgb(12, 250, 3),
            rgb(12, 250, 3),
            rgb(65535, 65535, 65535),
        ];

        let mut encoder = ArithmeticEncoder::new(Cursor::new(Vec::<u8>::new()));
        let mut models = RGBModels::default();
        for pair in colors.windows(2) {
            compress_rgb_using(&mut encoder, &mut models, &pair[1], &pair[0]).unwrap();
        }
        encoder.done().unwrap();

        let mut decoder = ArithmeticDecoder::new(Cursor::new(encoder.into_stream().into_inner()));
        decoder.read_init_bytes().unwrap();
        let mut models = RGBModels::default();
        let mut last = colors[0];
        for expected in &colors[1..] {
            last = decompress_rgb_using(&mut decoder, &mut models, &last).unwrap();
            assert_eq!(&last, expected);
        }
    }
}
