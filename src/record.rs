//! Traits implemented by the field codecs and the record
//! compressors / decompressors that chain them to handle a whole point.
//!
//! Items of version 1 and 2 are coded sequentially: one arithmetic coder
//! for the whole chunk. Items of version 3 are coded in layers.

use std::io::{Read, Seek, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use log::debug;

use crate::decoders::{corrupted_data, ArithmeticDecoder};
use crate::encoders::ArithmeticEncoder;
use crate::las;
use crate::las::laszip::{LazItem, LazItemType};
use crate::las::selective::DecompressionSelector;
use crate::LasZipError;

/***************************************************************************************************
                    Decompression Related Traits
***************************************************************************************************/

/// A decompressor for one field (item) of a point, coded sequentially
/// with the other fields of the record.
pub trait FieldDecompressor<R: Read> {
    fn size_of_field(&self) -> usize;

    /// Reads the raw first point of the chunk, and resets the per-chunk state.
    fn decompress_first(&mut self, src: &mut R, first_point: &mut [u8]) -> std::io::Result<()>;

    fn decompress_with(
        &mut self,
        decoder: &mut ArithmeticDecoder<R>,
        buf: &mut [u8],
    ) -> std::io::Result<()>;
}

/// A decompressor for one field (item) of a point, whose data is split into layers.
///
/// The `context` is the scanner channel of the current point, it is set by
/// the point decompressor and read by the decompressors of the following fields.
pub trait LayeredFieldDecompressor<R: Read> {
    fn size_of_field(&self) -> usize;

    /// Reads the raw first point of the chunk, and resets the per-chunk state.
    fn init_first_point(
        &mut self,
        src: &mut R,
        first_point: &mut [u8],
        context: &mut usize,
    ) -> std::io::Result<()>;

    fn decompress_field_with(
        &mut self,
        current_point: &mut [u8],
        context: &mut usize,
    ) -> std::io::Result<()>;

    fn read_layers_sizes(&mut self, src: &mut R) -> std::io::Result<()>;
    fn read_layers(&mut self, src: &mut R) -> std::io::Result<()>;
}

/// Decompresses whole point records, one chunk at a time.
pub trait RecordDecompressor<R> {
    fn set_fields_from(&mut self, laz_items: &[LazItem]) -> crate::Result<()>;
    fn record_size(&self) -> usize;

    fn decompress_next(&mut self, out: &mut [u8]) -> std::io::Result<()>;

    /// Points of the current chunk not yet decompressed,
    /// `None` when the chunk does not store its number of points.
    fn points_left(&self) -> Option<u32>;

    /// Prepares the decompressor to read a new chunk,
    /// which starts at the current position of the input.
    fn reset(&mut self);

    fn get_mut(&mut self) -> &mut R;
    fn box_into_inner(self: Box<Self>) -> R;
}

/***************************************************************************************************
                    Compression Related Traits
***************************************************************************************************/

/// A compressor for one field (item) of a point, coded sequentially
/// with the other fields of the record.
pub trait FieldCompressor<W: Write> {
    fn size_of_field(&self) -> usize;

    /// Writes the raw first point of the chunk, and resets the per-chunk state.
    fn compress_first(&mut self, dst: &mut W, first_point: &[u8]) -> std::io::Result<()>;

    fn compress_with(
        &mut self,
        encoder: &mut ArithmeticEncoder<W>,
        buf: &[u8],
    ) -> std::io::Result<()>;
}

/// A compressor for one field (item) of a point, whose data is split into layers.
pub trait LayeredFieldCompressor<W: Write> {
    fn size_of_field(&self) -> usize;

    /// Writes the raw first point of the chunk, and resets the per-chunk state.
    fn init_first_point(
        &mut self,
        dst: &mut W,
        first_point: &[u8],
        context: &mut usize,
    ) -> std::io::Result<()>;

    fn compress_field_with(
        &mut self,
        current_point: &[u8],
        context: &mut usize,
    ) -> std::io::Result<()>;

    fn write_layers_sizes(&mut self, dst: &mut W) -> std::io::Result<()>;
    fn write_layers(&mut self, dst: &mut W) -> std::io::Result<()>;
}

/// Compresses whole point records, one chunk at a time.
pub trait RecordCompressor<W> {
    fn set_fields_from(&mut self, laz_items: &[LazItem]) -> crate::Result<()>;
    fn record_size(&self) -> usize;

    fn compress_next(&mut self, point: &[u8]) -> std::io::Result<()>;

    /// Writes what remains of the current chunk
    fn done(&mut self) -> std::io::Result<()>;

    /// Prepares the compressor to start a new chunk,
    /// `done` must have been called to write the previous one.
    fn reset(&mut self);

    fn get_mut(&mut self) -> &mut W;
    fn box_into_inner(self: Box<Self>) -> W;
}

fn unsupported(item: &LazItem) -> LasZipError {
    LasZipError::UnsupportedLazItemVersion(item.item_type(), item.version())
}

fn check_point_len(point: &[u8], record_size: usize) -> std::io::Result<()> {
    if point.len() < record_size {
        Err(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            format!(
                "point buffer of {} bytes is too small for a record of {} bytes",
                point.len(),
                record_size
            ),
        ))
    } else {
        Ok(())
    }
}

/***************************************************************************************************
                    Record Decompressors implementations
***************************************************************************************************/

/// SequentialPointRecordDecompressor decompresses data using FieldDecompressor.
/// The Points data is organized as follow:
///
/// 1) 1 Raw Point (as per ASPRS LAS definition)
/// 2) n compressed Points
///
/// The chunk does not store its number of points.
pub struct SequentialPointRecordDecompressor<R: Read> {
    field_decompressors: Vec<Box<dyn FieldDecompressor<R>>>,
    decoder: ArithmeticDecoder<R>,
    is_first_decompression: bool,
    record_size: usize,
}

impl<R: Read> SequentialPointRecordDecompressor<R> {
    pub fn new(input: R) -> Self {
        Self {
            field_decompressors: vec![],
            decoder: ArithmeticDecoder::new(input),
            is_first_decompression: true,
            record_size: 0,
        }
    }

    pub fn add_field_decompressor<T: 'static + FieldDecompressor<R>>(&mut self, field: T) {
        self.record_size += field.size_of_field();
        self.field_decompressors.push(Box::new(field));
    }

    pub fn set_fields_from(&mut self, laz_items: &[LazItem]) -> crate::Result<()> {
        for record_item in laz_items {
            if record_item.version() != 2 {
                return Err(unsupported(record_item));
            }
            match record_item.item_type() {
                LazItemType::Point10 => {
                    self.add_field_decompressor(las::v2::LasPoint10Decompressor::new())
                }
                LazItemType::GpsTime => {
                    self.add_field_decompressor(las::v2::LasGpsTimeDecompressor::new())
                }
                LazItemType::RGB12 => self.add_field_decompressor(las::v2::LasRGBDecompressor::new()),
                LazItemType::Byte(count) => self.add_field_decompressor(
                    las::v2::LasExtraByteDecompressor::new(count as usize),
                ),
                _ => return Err(unsupported(record_item)),
            }
        }
        Ok(())
    }

    pub fn record_size(&self) -> usize {
        self.record_size
    }

    pub fn decompress_next(&mut self, out: &mut [u8]) -> std::io::Result<()> {
        check_point_len(out, self.record_size)?;
        let mut field_start = 0;
        if self.is_first_decompression {
            for field in &mut self.field_decompressors {
                let field_end = field_start + field.size_of_field();
                field.decompress_first(self.decoder.in_stream(), &mut out[field_start..field_end])?;
                field_start = field_end;
            }
            // the coded points start after the raw one
            self.decoder.read_init_bytes()?;
            self.is_first_decompression = false;
        } else {
            for field in &mut self.field_decompressors {
                let field_end = field_start + field.size_of_field();
                field.decompress_with(&mut self.decoder, &mut out[field_start..field_end])?;
                field_start = field_end;
            }
        }
        Ok(())
    }

    pub fn reset(&mut self) {
        self.decoder.reset();
        self.is_first_decompression = true;
    }

    pub fn get_mut(&mut self) -> &mut R {
        self.decoder.in_stream()
    }

    pub fn into_inner(self) -> R {
        self.decoder.into_stream()
    }
}

impl<R: Read> RecordDecompressor<R> for SequentialPointRecordDecompressor<R> {
    fn set_fields_from(&mut self, laz_items: &[LazItem]) -> crate::Result<()> {
        self.set_fields_from(laz_items)
    }

    fn record_size(&self) -> usize {
        self.record_size()
    }

    fn decompress_next(&mut self, out: &mut [u8]) -> std::io::Result<()> {
        self.decompress_next(out)
    }

    fn points_left(&self) -> Option<u32> {
        None
    }

    fn reset(&mut self) {
        self.reset()
    }

    fn get_mut(&mut self) -> &mut R {
        self.get_mut()
    }

    fn box_into_inner(self: Box<Self>) -> R {
        self.into_inner()
    }
}

/// LayeredPointRecordDecompressor decompresses data using LayeredFieldDecompressor.
/// The Points data is organized in layer as follow:
///
/// 1) 1 Raw Point (as per ASPRS LAS definition)
/// 2) Number of points in the chunk
/// 3) Number of bytes for each layer of the chunk
/// 4) Data of the layers
pub struct LayeredPointRecordDecompressor<R: Read + Seek> {
    field_decompressors: Vec<Box<dyn LayeredFieldDecompressor<R>>>,
    input: R,
    selection: DecompressionSelector,
    is_first_decompression: bool,
    points_left: u32,
    record_size: usize,
    context: usize,
}

impl<R: Read + Seek> LayeredPointRecordDecompressor<R> {
    pub fn new(input: R) -> Self {
        Self::selective(input, DecompressionSelector::all())
    }

    /// Creates a decompressor that will only decode the layers
    /// of the `selection`, the fields whose layer is skipped keep
    /// the value they have in the first point of the chunk.
    pub fn selective(input: R, selection: DecompressionSelector) -> Self {
        Self {
            field_decompressors: vec![],
            input,
            selection,
            is_first_decompression: true,
            points_left: 0,
            record_size: 0,
            context: 0,
        }
    }

    pub fn add_field_decompressor<T: 'static + LayeredFieldDecompressor<R>>(
        &mut self,
        field: T,
    ) {
        self.record_size += field.size_of_field();
        self.field_decompressors.push(Box::new(field));
    }

    pub fn set_fields_from(&mut self, laz_items: &[LazItem]) -> crate::Result<()> {
        for record_item in laz_items {
            if record_item.version() != 3 {
                return Err(unsupported(record_item));
            }
            match record_item.item_type() {
                LazItemType::Point14 => self.add_field_decompressor(
                    las::v3::LasPoint6Decompressor::selective(self.selection),
                ),
                LazItemType::RGB14 => self
                    .add_field_decompressor(las::v3::LasRGBDecompressor::selective(self.selection)),
                LazItemType::RGBNIR14 => {
                    self.add_field_decompressor(las::v3::LasRGBDecompressor::selective(
                        self.selection,
                    ));
                    self.add_field_decompressor(las::v3::LasNIRDecompressor::selective(
                        self.selection,
                    ));
                }
                LazItemType::Byte14(count) => self.add_field_decompressor(
                    las::v3::LasExtraByteDecompressor::selective(count as usize, self.selection),
                ),
                _ => return Err(unsupported(record_item)),
            }
        }
        Ok(())
    }

    pub fn record_size(&self) -> usize {
        self.record_size
    }

    pub fn decompress_next(&mut self, out: &mut [u8]) -> std::io::Result<()> {
        check_point_len(out, self.record_size)?;
        if self.is_first_decompression {
            let mut field_start = 0;
            for field in &mut self.field_decompressors {
                let field_end = field_start + field.size_of_field();
                field.init_first_point(
                    &mut self.input,
                    &mut out[field_start..field_end],
                    &mut self.context,
                )?;
                field_start = field_end;
            }

            let count = self.input.read_u32::<LittleEndian>()?;
            if count == 0 {
                return Err(corrupted_data("chunk header announces 0 points"));
            }
            for field in &mut self.field_decompressors {
                field.read_layers_sizes(&mut self.input)?;
            }
            for field in &mut self.field_decompressors {
                field.read_layers(&mut self.input)?;
            }
            debug!(
                "reading chunk of {} points, selection: {:#x}",
                count, self.selection.0
            );
            self.points_left = count - 1;
            self.is_first_decompression = false;
        } else {
            if self.points_left == 0 {
                return Err(std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    "all the points of the chunk were decompressed",
                ));
            }
            let mut field_start = 0;
            for field in &mut self.field_decompressors {
                let field_end = field_start + field.size_of_field();
                field.decompress_field_with(&mut out[field_start..field_end], &mut self.context)?;
                field_start = field_end;
            }
            self.points_left -= 1;
        }
        Ok(())
    }

    /// Number of points of the current chunk not yet decompressed,
    /// 0 before the first point of a chunk is read.
    pub fn points_left(&self) -> u32 {
        self.points_left
    }

    /// Prepares the decompressor to read a new chunk,
    /// which starts at the current position of the input.
    pub fn reset(&mut self) {
        self.is_first_decompression = true;
        self.points_left = 0;
        self.context = 0;
    }

    pub fn get_mut(&mut self) -> &mut R {
        &mut self.input
    }

    pub fn into_inner(self) -> R {
        self.input
    }
}

impl<R: Read + Seek> RecordDecompressor<R> for LayeredPointRecordDecompressor<R> {
    fn set_fields_from(&mut self, laz_items: &[LazItem]) -> crate::Result<()> {
        self.set_fields_from(laz_items)
    }

    fn record_size(&self) -> usize {
        self.record_size()
    }

    fn decompress_next(&mut self, out: &mut [u8]) -> std::io::Result<()> {
        self.decompress_next(out)
    }

    fn points_left(&self) -> Option<u32> {
        Some(self.points_left())
    }

    fn reset(&mut self) {
        self.reset()
    }

    fn get_mut(&mut self) -> &mut R {
        self.get_mut()
    }

    fn box_into_inner(self: Box<Self>) -> R {
        self.into_inner()
    }
}

/***************************************************************************************************
                    Record Compressors implementations
***************************************************************************************************/

/// SequentialPointRecordCompressor compresses points using FieldCompressor,
/// the first point is written raw, the others go through the arithmetic encoder.
pub struct SequentialPointRecordCompressor<W: Write> {
    field_compressors: Vec<Box<dyn FieldCompressor<W>>>,
    encoder: ArithmeticEncoder<W>,
    record_size: usize,
    point_count: u32,
}

impl<W: Write> SequentialPointRecordCompressor<W> {
    pub fn new(output: W) -> Self {
        Self {
            field_compressors: vec![],
            encoder: ArithmeticEncoder::new(output),
            record_size: 0,
            point_count: 0,
        }
    }

    pub fn add_field_compressor<T: 'static + FieldCompressor<W>>(&mut self, field: T) {
        self.record_size += field.size_of_field();
        self.field_compressors.push(Box::new(field));
    }

    pub fn set_fields_from(&mut self, laz_items: &[LazItem]) -> crate::Result<()> {
        for item in laz_items {
            if item.version() != 2 {
                return Err(unsupported(item));
            }
            match item.item_type() {
                LazItemType::Point10 => {
                    self.add_field_compressor(las::v2::LasPoint10Compressor::new())
                }
                LazItemType::GpsTime => {
                    self.add_field_compressor(las::v2::LasGpsTimeCompressor::new())
                }
                LazItemType::RGB12 => self.add_field_compressor(las::v2::LasRGBCompressor::new()),
                LazItemType::Byte(count) => {
                    self.add_field_compressor(las::v2::LasExtraByteCompressor::new(count as usize))
                }
                _ => return Err(unsupported(item)),
            }
        }
        Ok(())
    }

    pub fn record_size(&self) -> usize {
        self.record_size
    }

    pub fn compress_next(&mut self, point: &[u8]) -> std::io::Result<()> {
        check_point_len(point, self.record_size)?;
        let mut field_start = 0;
        if self.point_count == 0 {
            for field in &mut self.field_compressors {
                let field_end = field_start + field.size_of_field();
                field.compress_first(self.encoder.get_mut(), &point[field_start..field_end])?;
                field_start = field_end;
            }
        } else {
            for field in &mut self.field_compressors {
                let field_end = field_start + field.size_of_field();
                field.compress_with(&mut self.encoder, &point[field_start..field_end])?;
                field_start = field_end;
            }
        }
        self.point_count += 1;
        Ok(())
    }

    /// Flushes the encoder.
    ///
    /// Does nothing when no point was compressed since the last reset.
    pub fn done(&mut self) -> std::io::Result<()> {
        if self.point_count > 0 {
            debug!("writing sequential chunk of {} points", self.point_count);
            self.encoder.done()?;
        }
        Ok(())
    }

    pub fn reset(&mut self) {
        self.encoder.reset();
        self.point_count = 0;
    }

    pub fn point_count(&self) -> u32 {
        self.point_count
    }

    pub fn get_mut(&mut self) -> &mut W {
        self.encoder.get_mut()
    }

    pub fn into_inner(self) -> W {
        self.encoder.into_stream()
    }
}

impl<W: Write> RecordCompressor<W> for SequentialPointRecordCompressor<W> {
    fn set_fields_from(&mut self, laz_items: &[LazItem]) -> crate::Result<()> {
        self.set_fields_from(laz_items)
    }

    fn record_size(&self) -> usize {
        self.record_size()
    }

    fn compress_next(&mut self, point: &[u8]) -> std::io::Result<()> {
        self.compress_next(point)
    }

    fn done(&mut self) -> std::io::Result<()> {
        self.done()
    }

    fn reset(&mut self) {
        self.reset()
    }

    fn get_mut(&mut self) -> &mut W {
        self.get_mut()
    }

    fn box_into_inner(self: Box<Self>) -> W {
        self.into_inner()
    }
}

/// LayeredPointRecordCompressor compresses points using LayeredFieldCompressor,
/// the chunk is only written to the output when calling `done`.
pub struct LayeredPointRecordCompressor<W: Write> {
    field_compressors: Vec<Box<dyn LayeredFieldCompressor<W>>>,
    record_size: usize,
    point_count: u32,
    context: usize,
    dst: W,
}

impl<W: Write> LayeredPointRecordCompressor<W> {
    pub fn new(dst: W) -> Self {
        Self {
            field_compressors: vec![],
            record_size: 0,
            point_count: 0,
            context: 0,
            dst,
        }
    }

    pub fn add_field_compressor<T: 'static + LayeredFieldCompressor<W>>(&mut self, field: T) {
        self.record_size += field.size_of_field();
        self.field_compressors.push(Box::new(field));
    }

    pub fn set_fields_from(&mut self, laz_items: &[LazItem]) -> crate::Result<()> {
        for item in laz_items {
            if item.version() != 3 {
                return Err(unsupported(item));
            }
            match item.item_type() {
                LazItemType::Point14 => {
                    self.add_field_compressor(las::v3::LasPoint6Compressor::default())
                }
                LazItemType::RGB14 => self.add_field_compressor(las::v3::LasRGBCompressor::new()),
                LazItemType::RGBNIR14 => {
                    self.add_field_compressor(las::v3::LasRGBCompressor::new());
                    self.add_field_compressor(las::v3::LasNIRCompressor::new());
                }
                LazItemType::Byte14(count) => {
                    self.add_field_compressor(las::v3::LasExtraByteCompressor::new(count as usize))
                }
                _ => return Err(unsupported(item)),
            }
        }
        Ok(())
    }

    pub fn record_size(&self) -> usize {
        self.record_size
    }

    pub fn compress_next(&mut self, point: &[u8]) -> std::io::Result<()> {
        check_point_len(point, self.record_size)?;
        let mut field_start = 0;
        if self.point_count == 0 {
            for compressor in &mut self.field_compressors {
                let field_end = field_start + compressor.size_of_field();
                compressor.init_first_point(
                    &mut self.dst,
                    &point[field_start..field_end],
                    &mut self.context,
                )?;
                field_start = field_end;
            }
        } else {
            for compressor in &mut self.field_compressors {
                let field_end = field_start + compressor.size_of_field();
                compressor.compress_field_with(&point[field_start..field_end], &mut self.context)?;
                field_start = field_end;
            }
        }
        self.point_count += 1;
        Ok(())
    }

    /// Writes the point count and the layers of the current chunk.
    ///
    /// Does nothing when no point was compressed since the last reset.
    pub fn done(&mut self) -> std::io::Result<()> {
        if self.point_count > 0 {
            debug!("writing chunk of {} points", self.point_count);
            self.dst.write_u32::<LittleEndian>(self.point_count)?;
            for compressor in &mut self.field_compressors {
                compressor.write_layers_sizes(&mut self.dst)?;
            }
            for compressor in &mut self.field_compressors {
                compressor.write_layers(&mut self.dst)?;
            }
        }
        Ok(())
    }

    /// Prepares the compressor to start a new chunk,
    /// `done` must have been called to write the previous one.
    pub fn reset(&mut self) {
        self.point_count = 0;
        self.context = 0;
    }

    pub fn point_count(&self) -> u32 {
        self.point_count
    }

    pub fn get_mut(&mut self) -> &mut W {
        &mut self.dst
    }

    pub fn into_inner(self) -> W {
        self.dst
    }
}

impl<W: Write> RecordCompressor<W> for LayeredPointRecordCompressor<W> {
    fn set_fields_from(&mut self, laz_items: &[LazItem]) -> crate::Result<()> {
        self.set_fields_from(laz_items)
    }

    fn record_size(&self) -> usize {
        self.record_size()
    }

    fn compress_next(&mut self, point: &[u8]) -> std::io::Result<()> {
        self.compress_next(point)
    }

    fn done(&mut self) -> std::io::Result<()> {
        self.done()
    }

    fn reset(&mut self) {
        self.reset()
    }

    fn get_mut(&mut self) -> &mut W {
        self.get_mut()
    }

    fn box_into_inner(self: Box<Self>) -> W {
        self.into_inner()
    }
}

/// Creates the record compressor matching the version of the items
/// (sequential for 1 and 2, layered otherwise) and adds their field compressors.
pub fn record_compressor_from_laz_items<'a, W: Write + 'a>(
    laz_items: &[LazItem],
    output: W,
) -> crate::Result<Box<dyn RecordCompressor<W> + 'a>> {
    let mut compressor = match laz_items.first().map(LazItem::version) {
        Some(1) | Some(2) => Box::new(SequentialPointRecordCompressor::new(output))
            as Box<dyn RecordCompressor<W> + 'a>,
        _ => Box::new(LayeredPointRecordCompressor::new(output))
            as Box<dyn RecordCompressor<W> + 'a>,
    };
    compressor.set_fields_from(laz_items)?;
    Ok(compressor)
}

/// Creates the record decompressor matching the version of the items.
///
/// The `selection` only applies to layered items.
pub fn record_decompressor_from_laz_items<'a, R: Read + Seek + 'a>(
    laz_items: &[LazItem],
    input: R,
    selection: DecompressionSelector,
) -> crate::Result<Box<dyn RecordDecompressor<R> + 'a>> {
    let mut decompressor = match laz_items.first().map(LazItem::version) {
        Some(1) | Some(2) => Box::new(SequentialPointRecordDecompressor::new(input))
            as Box<dyn RecordDecompressor<R> + 'a>,
        _ => Box::new(LayeredPointRecordDecompressor::selective(input, selection))
            as Box<dyn RecordDecompressor<R> + 'a>,
    };
    decompressor.set_fields_from(laz_items)?;
    Ok(decompressor)
}
