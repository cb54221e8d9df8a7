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

//! Little-endian packing of fixed size values into byte slices

use byteorder::{ByteOrder, LittleEndian};

/// A value with a fixed size, little-endian, binary representation.
///
/// # Panics
///
/// Both methods panic if the slice is shorter than the packed size.
pub trait Packable: Sized {
    fn unpack_from(input: &[u8]) -> Self;
    fn pack_into(&self, output: &mut [u8]);
}

macro_rules! impl_packable_with {
    ($type:ty, $read:ident, $write:ident) => {
        impl Packable for $type {
            #[inline]
            fn unpack_from(input: &[u8]) -> Self {
                LittleEndian::$read(input)
            }

            #[inline]
            fn pack_into(&self, output: &mut [u8]) {
                LittleEndian::$write(output, *self)
            }
        }
    };
}

impl_packable_with!(u16, read_u16, write_u16);
impl_packable_with!(i16, read_i16, write_i16);
impl_packable_with!(u32, read_u32, write_u32);
impl_packable_with!(i32, read_i32, write_i32);
impl_packable_with!(f64, read_f64, write_f64);

impl Packable for u8 {
    #[inline]
    fn unpack_from(input: &[u8]) -> Self {
        input[0]
    }

    #[inline]
    fn pack_into(&self, output: &mut [u8]) {
        output[0] = *self;
    }
}
