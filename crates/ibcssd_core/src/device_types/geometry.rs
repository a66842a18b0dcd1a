/*
    IbcSSD
    https://github.com/dbalsom/ibcssd

    Copyright 2022-2025 Daniel Balsom

    Permission is hereby granted, free of charge, to any person obtaining a
    copy of this software and associated documentation files (the “Software”),
    to deal in the Software without restriction, including without limitation
    the rights to use, copy, modify, merge, publish, distribute, sublicense,
    and/or sell copies of the Software, and to permit persons to whom the
    Software is furnished to do so, subject to the following conditions:

    The above copyright notice and this permission notice shall be included in
    all copies or substantial portions of the Software.

    THE SOFTWARE IS PROVIDED “AS IS”, WITHOUT WARRANTY OF ANY KIND, EXPRESS OR
    IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY,
    FITNESS FOR A PARTICULAR PURPOSE AND NONINFRINGEMENT. IN NO EVENT SHALL THE
    AUTHORS OR COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER
    LIABILITY, WHETHER IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING
    FROM, OUT OF OR IN CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER
    DEALINGS IN THE SOFTWARE.

    --------------------------------------------------------------------------
*/

//! Define a [DriveGeometry] that represents cylinder, head, and sector based
//! drive geometry, plus the sector size in bytes.
//!
//! A drive's backing image is a flat byte array addressed cylinder → head →
//! sector, each sector occupying a fixed-size slot. There is no header or
//! metadata in the image; geometry is supplied externally, never derived from
//! the file.

use crate::device_types::chs::DiskChs;
use std::fmt::Display;

/// A structure representing how sectors are laid out on a disk
///  - Cylinder count (c)
///  - Head count (h)
///  - Sector count per track (s)
///  - Sector size in bytes
#[derive(Copy, Clone, Debug, Default, Hash, Eq, PartialEq)]
pub struct DriveGeometry {
    pub(crate) c: u16,
    pub(crate) h: u8,
    pub(crate) s: u8,
    pub(crate) sector_size: usize,
}

impl Display for DriveGeometry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[c:{:3} h:{} s:{:2} n:{}]", self.c, self.h, self.s, self.sector_size)
    }
}

impl DriveGeometry {
    /// Create a new [DriveGeometry] structure from cylinder, head and sector count components.
    pub fn new(c: u16, h: u8, s: u8, sector_size: usize) -> Self {
        Self { c, h, s, sector_size }
    }
    /// Return the cylinder count (c) field.
    #[inline]
    pub fn c(&self) -> u16 {
        self.c
    }
    /// Return the head count (h) field.
    #[inline]
    pub fn h(&self) -> u8 {
        self.h
    }
    /// Return the sector count (s) field.
    #[inline]
    pub fn s(&self) -> u8 {
        self.s
    }
    /// Return the size of a sector in bytes.
    #[inline]
    pub fn sector_size(&self) -> usize {
        self.sector_size
    }
    /// Return the number of sectors represented by a [DriveGeometry].
    pub fn total_sectors(&self) -> usize {
        (self.c as usize) * (self.h as usize) * (self.s as usize)
    }
    /// Return the total size in bytes of a disk with this geometry.
    pub fn total_size(&self) -> usize {
        self.total_sectors() * self.sector_size
    }
    /// Return the length in bytes of one track.
    pub fn track_size(&self) -> usize {
        (self.s as usize) * self.sector_size
    }
    /// Return whether the given address falls within this geometry.
    pub fn contains(&self, chs: DiskChs) -> bool {
        chs.c < self.c && chs.h < self.h && chs.s < self.s
    }

    /// Return the byte offset of the given sector address within a flat
    /// backing image laid out cylinder → head → sector.
    pub fn chs_offset(&self, chs: DiskChs) -> u64 {
        let lba = (chs.c as u64 * self.h as u64 + chs.h as u64) * self.s as u64 + chs.s as u64;
        lba * self.sector_size as u64
    }

    /// Return the byte offset of the start of the given track. Formatting
    /// operates on whole tracks, so the sector component is not consulted.
    pub fn track_offset(&self, c: u16, h: u8) -> u64 {
        self.chs_offset(DiskChs::new(c, h, 0))
    }
}
