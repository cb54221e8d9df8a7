//! Module with the description of the items a point record is made of
//! and the helpers to compress / decompress a buffer of points chunk by chunk.

use std::io::{Cursor, Read, Seek, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use log::debug;

pub use crate::errors::LasZipError;
use crate::las::gps::GpsTime;
use crate::las::nir::Nir;
use crate::las::point10::Point10;
use crate::las::point6::Point6;
use crate::las::rgb::RGB;
use crate::las::selective::DecompressionSelector;
use crate::record::{record_compressor_from_laz_items, record_decompressor_from_laz_items};

/// Number of points per chunk used by LASzip when nothing else is specified
pub const DEFAULT_CHUNK_SIZE: usize = 50_000;

/// The different type of data / fields found in the definition of LAS points
#[derive(Debug, Copy, Clone, PartialEq)]
pub enum LazItemType {
    /// ExtraBytes for LAS versions <= 1.3 & point format <= 5
    Byte(u16),
    /// Point10 is the Point format id 0 of LAS for versions <= 1.3
    Point10,
    /// GpsTime of the point formats 1 and 3
    GpsTime,
    /// RGB of the point formats 2 and 3
    RGB12,
    /// Point14 is the Point format id 6 of LAS for versions >= 1.4 & point format >= 6
    Point14,
    /// RGB for LAS versions >= 1.4
    RGB14,
    /// RGB + Nir for LAS versions >= 1.4
    RGBNIR14,
    /// ExtraBytes for LAS versions >= 1.4
    Byte14(u16),
}

impl LazItemType {
    fn size(&self) -> u16 {
        match self {
            LazItemType::Byte(size) => *size,
            LazItemType::Point10 => Point10::SIZE as u16,
            LazItemType::GpsTime => GpsTime::SIZE as u16,
            LazItemType::RGB12 => RGB::SIZE as u16,
            LazItemType::Point14 => Point6::SIZE as u16,
            LazItemType::RGB14 => RGB::SIZE as u16,
            LazItemType::RGBNIR14 => (RGB::SIZE + Nir::SIZE) as u16,
            LazItemType::Byte14(size) => *size,
        }
    }

    /// Version of the compression LASzip writes for this item:
    /// sequential (2) for the point formats 0 to 5, layered (3) for the others
    fn default_version(&self) -> u16 {
        match self {
            LazItemType::Byte(_)
            | LazItemType::Point10
            | LazItemType::GpsTime
            | LazItemType::RGB12 => 2,
            LazItemType::Point14
            | LazItemType::RGB14
            | LazItemType::RGBNIR14
            | LazItemType::Byte14(_) => 3,
        }
    }
}

impl From<LazItemType> for u16 {
    fn from(t: LazItemType) -> Self {
        match t {
            LazItemType::Byte(_) => 0,
            LazItemType::Point10 => 6,
            LazItemType::GpsTime => 7,
            LazItemType::RGB12 => 8,
            LazItemType::Point14 => 10,
            LazItemType::RGB14 => 11,
            LazItemType::RGBNIR14 => 12,
            LazItemType::Byte14(_) => 14,
        }
    }
}

/// Description of one item of a point record:
/// the data it holds and the version of the algorithm that compresses it.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct LazItem {
    // coded on a u16
    pub(crate) item_type: LazItemType,
    pub(crate) size: u16,
    pub(crate) version: u16,
}

impl LazItem {
    pub fn new(item_type: LazItemType, version: u16) -> Self {
        let size = item_type.size();
        Self {
            item_type,
            size,
            version,
        }
    }

    pub fn item_type(&self) -> LazItemType {
        self.item_type
    }

    pub fn size(&self) -> u16 {
        self.size
    }

    pub fn version(&self) -> u16 {
        self.version
    }

    /// Reads the 6 bytes (type, size, version) describing an item
    pub fn read_from<R: Read>(src: &mut R) -> crate::Result<Self> {
        let item_type = src.read_u16::<LittleEndian>()?;
        let size = src.read_u16::<LittleEndian>()?;
        let item_type = match item_type {
            0 => LazItemType::Byte(size),
            6 => LazItemType::Point10,
            7 => LazItemType::GpsTime,
            8 => LazItemType::RGB12,
            10 => LazItemType::Point14,
            11 => LazItemType::RGB14,
            12 => LazItemType::RGBNIR14,
            14 => LazItemType::Byte14(size),
            _ => return Err(LasZipError::UnknownLazItem(item_type)),
        };
        Ok(Self {
            item_type,
            size,
            version: src.read_u16::<LittleEndian>()?,
        })
    }

    pub fn write_to<W: Write>(&self, dst: &mut W) -> std::io::Result<()> {
        dst.write_u16::<LittleEndian>(self.item_type.into())?;
        dst.write_u16::<LittleEndian>(self.size)?;
        dst.write_u16::<LittleEndian>(self.version)?;
        Ok(())
    }
}

/// Sum of the sizes of the items, that is the size of one point record
pub fn record_size_of(items: &[LazItem]) -> usize {
    items.iter().map(|item| item.size() as usize).sum()
}

pub struct LazItemRecordBuilder {
    items: Vec<LazItemType>,
}

impl LazItemRecordBuilder {
    /// Items of the point formats 0 to 3 and of the LAS 1.4 point formats 6, 7 and 8
    pub fn default_for_point_format_id(
        point_format_id: u8,
        num_extra_bytes: u16,
    ) -> crate::Result<Vec<LazItem>> {
        let mut builder = Self::new();
        match point_format_id {
            0..=3 => {
                builder.add_item(LazItemType::Point10);
                if point_format_id == 1 || point_format_id == 3 {
                    builder.add_item(LazItemType::GpsTime);
                }
                if point_format_id >= 2 {
                    builder.add_item(LazItemType::RGB12);
                }
                if num_extra_bytes != 0 {
                    builder.add_item(LazItemType::Byte(num_extra_bytes));
                }
            }
            6..=8 => {
                builder.add_item(LazItemType::Point14);
                if point_format_id == 7 {
                    builder.add_item(LazItemType::RGB14);
                } else if point_format_id == 8 {
                    builder.add_item(LazItemType::RGBNIR14);
                }
                if num_extra_bytes != 0 {
                    builder.add_item(LazItemType::Byte14(num_extra_bytes));
                }
            }
            _ => return Err(LasZipError::UnsupportedPointFormat(point_format_id)),
        }
        Ok(builder.build())
    }

    pub fn new() -> Self {
        Self { items: vec![] }
    }

    pub fn add_item(&mut self, item_type: LazItemType) -> &mut Self {
        self.items.push(item_type);
        self
    }

    /// Every item gets the version LASzip writes for it
    pub fn build(&self) -> Vec<LazItem> {
        self.items
            .iter()
            .map(|item_type| LazItem::new(*item_type, item_type.default_version()))
            .collect()
    }
}

impl Default for LazItemRecordBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Compresses the points, `chunk_size` points at a time.
///
/// Each chunk is independent from the others, the chunks are written
/// one after the other in `dst`. Returns the number of bytes of each chunk,
/// no chunk table is written.
pub fn compress_chunks<W: Write>(
    dst: &mut W,
    uncompressed_points: &[u8],
    laz_items: &[LazItem],
    chunk_size: usize,
) -> crate::Result<Vec<usize>> {
    let point_size = record_size_of(laz_items);
    if point_size == 0 || uncompressed_points.len() % point_size != 0 {
        return Err(LasZipError::BufferLenNotMultipleOfPointSize {
            buffer_len: uncompressed_points.len(),
            point_size,
        });
    }
    let chunk_size = chunk_size.max(1);

    let mut compressor =
        record_compressor_from_laz_items(laz_items, Cursor::new(Vec::<u8>::new()))?;

    let mut chunk_sizes = Vec::new();
    for chunk in uncompressed_points.chunks(chunk_size.saturating_mul(point_size)) {
        for point in chunk.chunks_exact(point_size) {
            compressor.compress_next(point)?;
        }
        compressor.done()?;
        compressor.reset();

        let buffer = compressor.get_mut();
        dst.write_all(buffer.get_ref())?;
        chunk_sizes.push(buffer.get_ref().len());
        buffer.get_mut().clear();
        buffer.set_position(0);
    }
    debug!(
        "compressed {} points into {} chunks",
        uncompressed_points.len() / point_size,
        chunk_sizes.len()
    );
    Ok(chunk_sizes)
}

/// Decompresses points from consecutive chunks until `decompressed_points` is full.
///
/// Layered chunks store their number of points, sequential ones do not:
/// they are expected to hold `chunk_size` points, except the last one.
/// The `selection` only applies to layered items.
pub fn decompress_chunks<R: Read + Seek>(
    src: R,
    decompressed_points: &mut [u8],
    laz_items: &[LazItem],
    chunk_size: usize,
    selection: DecompressionSelector,
) -> crate::Result<()> {
    let point_size = record_size_of(laz_items);
    if point_size == 0 || decompressed_points.len() % point_size != 0 {
        return Err(LasZipError::BufferLenNotMultipleOfPointSize {
            buffer_len: decompressed_points.len(),
            point_size,
        });
    }

    let chunk_size = chunk_size.max(1);
    let mut decompressor = record_decompressor_from_laz_items(laz_items, src, selection)?;

    for (i, point) in decompressed_points.chunks_exact_mut(point_size).enumerate() {
        let chunk_exhausted = match decompressor.points_left() {
            Some(left) => left == 0,
            None => i != 0 && i % chunk_size == 0,
        };
        if chunk_exhausted {
            // the previous chunk is exhausted, the next one starts here
            decompressor.reset();
        }
        decompressor.decompress_next(point)?;
    }
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_create_laz_items() {
        let items = LazItemRecordBuilder::new()
            .add_item(LazItemType::Point14)
            .add_item(LazItemType::RGBNIR14)
            .add_item(LazItemType::Byte14(3))
            .build();
        assert_eq!(items.len(), 3);
        assert!(items.iter().all(|item| item.version() == 3));
        assert_eq!(record_size_of(&items), 30 + 8 + 3);
    }

    #[test]
    fn test_default_for_point_format() {
        let items = LazItemRecordBuilder::default_for_point_format_id(7, 0).unwrap();
        assert_eq!(
            items,
            vec![
                LazItem::new(LazItemType::Point14, 3),
                LazItem::new(LazItemType::RGB14, 3)
            ]
        );
        let items = LazItemRecordBuilder::default_for_point_format_id(6, 2).unwrap();
        assert_eq!(items[1].item_type(), LazItemType::Byte14(2));
        assert!(LazItemRecordBuilder::default_for_point_format_id(4, 0).is_err());
        assert!(LazItemRecordBuilder::default_for_point_format_id(9, 0).is_err());
    }

    #[test]
    fn test_default_for_sequential_point_formats() {
        let items = LazItemRecordBuilder::default_for_point_format_id(3, 4).unwrap();
        assert_eq!(
            items,
            vec![
                LazItem::new(LazItemType::Point10, 2),
                LazItem::new(LazItemType::GpsTime, 2),
                LazItem::new(LazItemType::RGB12, 2),
                LazItem::new(LazItemType::Byte(4), 2),
            ]
        );
        assert_eq!(record_size_of(&items), 20 + 8 + 6 + 4);

        let items = LazItemRecordBuilder::default_for_point_format_id(2, 0).unwrap();
        let types: Vec<LazItemType> = items.iter().map(LazItem::item_type).collect();
        assert_eq!(types, vec![LazItemType::Point10, LazItemType::RGB12]);
    }

    #[test]
    fn test_laz_item_bytes() {
        let item = LazItem::new(LazItemType::Byte14(5), 3);
        let mut data = Vec::new();
        item.write_to(&mut data).unwrap();
        assert_eq!(data, vec![14, 0, 5, 0, 3, 0]);
        let read = LazItem::read_from(&mut Cursor::new(data)).unwrap();
        assert_eq!(read, item);

        let point10 = LazItem::read_from(&mut Cursor::new(vec![6u8, 0, 20, 0, 2, 0])).unwrap();
        assert_eq!(point10, LazItem::new(LazItemType::Point10, 2));

        // wave packets
        let unknown = vec![9u8, 0, 29, 0, 2, 0];
        match LazItem::read_from(&mut Cursor::new(unknown)) {
            Err(LasZipError::UnknownLazItem(9)) => {}
            other => panic!("unexpected result {:?}", other),
        }
    }

    #[test]
    fn test_huge_chunk_size_gives_one_chunk() {
        let items = LazItemRecordBuilder::default_for_point_format_id(0, 0).unwrap();
        let mut points = vec![0u8; 20 * 10];
        for (i, byte) in points.iter_mut().enumerate() {
            *byte = (i % 7) as u8;
        }
        let mut dst = Vec::new();
        let sizes = compress_chunks(&mut dst, &points, &items, usize::MAX).unwrap();
        assert_eq!(sizes.len(), 1);
        assert_eq!(sizes[0], dst.len());

        let mut decompressed = vec![0u8; points.len()];
        decompress_chunks(
            Cursor::new(dst),
            &mut decompressed,
            &items,
            usize::MAX,
            DecompressionSelector::all(),
        )
        .unwrap();
        assert_eq!(decompressed, points);
    }

    #[test]
    fn test_buffer_len_must_be_multiple_of_point_size() {
        let items = LazItemRecordBuilder::default_for_point_format_id(6, 0).unwrap();
        let mut dst = Vec::new();
        let result = compress_chunks(&mut dst, &[0u8; 31], &items, 10);
        match result {
            Err(LasZipError::BufferLenNotMultipleOfPointSize {
                buffer_len: 31,
                point_size: 30,
            }) => {}
            other => panic!("unexpected result {:?}", other),
        }
    }
}
