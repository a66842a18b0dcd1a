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

//! The drive parameter table emitted by the Read Parameters command.
//!
//! The host firmware reads this 108-byte blob through the FIFO to learn the
//! attached drive complement. The layout matches what the real controller
//! returns for an 85MB fixed drive in slot 0 (C:680/H:15/S:32/N:256) and a
//! 10MB removable cartridge in slot 3 (C:612/H:2/S:32/N:256); partition
//! boundaries are encoded as 16-bit track numbers at the annotated offsets.

pub const DRIVE_PARAMETER_TABLE_LEN: usize = 108;

/// Byte offset of the head-count field within the table.
pub const PARAM_OFFSET_HEADS: usize = 0x30;

#[rustfmt::skip]
pub const DRIVE_PARAMETER_TABLE: [u8; DRIVE_PARAMETER_TABLE_LEN] = [
    0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF,   // 0x00
    0x00, 0x00, 0x00, 0x00, 0x00, 0x88, 0x00, 0x00,   // 0x08 0088=136
    0x00, 0x10, 0x01, 0x00, 0x00, 0x98, 0x01, 0x00,   // 0x10 0110=272, 0198=408
    0x00, 0x20, 0x02, 0x00, 0x03, 0x00, 0x00, 0x00,   // 0x18 0220=544
    0x00, 0x00, 0x00, 0x00, 0x02, 0x00, 0x61, 0x62,   // 0x20
    0x20, 0x00, 0x61, 0x02, 0x02, 0x00, 0x00, 0x00,   // 0x28
    0x0F, 0x00, 0x88, 0x00, 0x20, 0x00, 0x1D, 0x03,   // 0x30=#heads
    0x0F, 0x00, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF,   // 0x38
    0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF,   // 0x40
    0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0x02, 0x00,   // 0x48
    0x61, 0x62, 0x20, 0x00, 0x61, 0x02, 0x02, 0x00,   // 0x50
    0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF,   // 0x58
    0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF,   // 0x60
    0xFF, 0xFF, 0xFF, 0xFF,                           // 0x68
];
