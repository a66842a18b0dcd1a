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

//! The controller's sector staging buffer.
//!
//! [SectorFifo] is shared between the two access styles the hardware exposes:
//! the bus handler moves one byte per stalled bus cycle through the FIFO data
//! port, and the command dispatcher moves whole transfers against storage.
//! Both advance the same cursor.
//!
//! The cursor is clamped at capacity: a read past the end returns the open-bus
//! byte and a write past the end is dropped, and either event latches the
//! sticky overflow flag. The byte-at-a-time paths run inside the host's bus
//! stall window, so they never log; the dispatcher collects the flag with
//! [SectorFifo::take_overflow] and reports it from the main loop.

use crate::bus::NO_IO_BYTE;

/// One maximal transfer: the largest multi-sector read/write the controller
/// accepts, at the largest sector size any slot geometry uses.
pub const FIFO_CAPACITY: usize = super::MAX_XFER_SECTORS * super::MAX_SECTOR_SIZE;

pub struct SectorFifo {
    buf: Vec<u8>,
    cursor: usize,
    overflow: bool,
}

impl SectorFifo {
    pub fn new() -> Self {
        Self {
            buf: vec![0; FIFO_CAPACITY],
            cursor: 0,
            overflow: false,
        }
    }

    /// Reset the cursor to the start of the buffer. Buffer contents are
    /// retained; the host re-reads a transfer by resetting and reading again.
    pub fn reset(&mut self) {
        self.cursor = 0;
    }

    #[inline]
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    /// Read the byte at the cursor and advance. Bus-stall path: bounded time,
    /// no logging.
    #[inline]
    pub fn read_next(&mut self) -> u8 {
        if self.cursor < self.buf.len() {
            let byte = self.buf[self.cursor];
            self.cursor += 1;
            byte
        }
        else {
            self.overflow = true;
            NO_IO_BYTE
        }
    }

    /// Store a byte at the cursor and advance. Bus-stall path: bounded time,
    /// no logging.
    #[inline]
    pub fn write_next(&mut self, data: u8) {
        if self.cursor < self.buf.len() {
            self.buf[self.cursor] = data;
            self.cursor += 1;
        }
        else {
            self.overflow = true;
        }
    }

    /// Return and clear the sticky overflow flag.
    pub fn take_overflow(&mut self) -> bool {
        let overflow = self.overflow;
        self.overflow = false;
        overflow
    }

    /// Bulk access for the dispatcher's storage transfers.
    pub fn slice(&self, len: usize) -> &[u8] {
        &self.buf[0..len]
    }

    pub fn slice_mut(&mut self, len: usize) -> &mut [u8] {
        &mut self.buf[0..len]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cursor_advances_and_resets() {
        let mut fifo = SectorFifo::new();

        fifo.write_next(0xAA);
        fifo.write_next(0x55);
        assert_eq!(fifo.cursor(), 2);

        fifo.reset();
        assert_eq!(fifo.cursor(), 0);
        assert_eq!(fifo.read_next(), 0xAA);
        assert_eq!(fifo.read_next(), 0x55);
    }

    #[test]
    fn overflow_clamps_and_latches() {
        let mut fifo = SectorFifo::new();

        for i in 0..FIFO_CAPACITY {
            fifo.write_next(i as u8);
        }
        assert_eq!(fifo.cursor(), FIFO_CAPACITY);
        assert!(!fifo.take_overflow());

        // Writes past the end are dropped, reads return the open-bus byte,
        // and the cursor stays put.
        fifo.write_next(0xEE);
        assert_eq!(fifo.cursor(), FIFO_CAPACITY);
        assert_eq!(fifo.read_next(), NO_IO_BYTE);
        assert!(fifo.take_overflow());
        assert!(!fifo.take_overflow());

        fifo.reset();
        assert_eq!(fifo.read_next(), 0);
    }
}
