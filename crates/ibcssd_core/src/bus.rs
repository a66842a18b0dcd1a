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

//! Defines the [IoDevice] trait through which the host CPU bus reaches the
//! controller's register window.
//!
//! On the real board, an address match in the controller's port range latches
//! WAIT# to the CPU and traps into an interrupt handler; WAIT# is released only
//! after the access is fully serviced and the data bus has been tristated.
//! Here, one call to [IoDevice::read_u8] or [IoDevice::write_u8] is one such
//! stalled bus cycle: the access is complete, and WAIT# released, exactly when
//! the call returns. Implementations must therefore be bounded-time — no
//! blocking, no filesystem access — since the host cannot tolerate an open-ended
//! stall (a long WAIT# window starves DRAM refresh on the host side).

/// The byte read from an unconnected IO address.
pub const NO_IO_BYTE: u8 = 0xFF;

pub trait IoDevice {
    /// Read a byte from the specified port. The default implementation returns
    /// NO_IO_BYTE (0xFF).
    fn read_u8(&mut self, _port: u16) -> u8 {
        NO_IO_BYTE
    }

    /// Write a byte to the specified port.
    /// The default implementation does nothing.
    fn write_u8(&mut self, _port: u16, _data: u8) {
        // Default implementation does nothing
    }

    /// Return the number of waits (in system ticks) to be incurred by an
    /// immediate read from the specified port.
    /// The default implementation returns 0.
    fn read_wait(&mut self, _port: u16) -> u32 {
        0
    }

    /// Return the number of waits (in system ticks) to be incurred by an
    /// immediate write to the specified port.
    /// The default implementation returns 0.
    fn write_wait(&mut self, _port: u16) -> u32 {
        0
    }

    /// Return a list of ports used by this device. The list is a tuple of a
    /// display string and the port number.
    fn port_list(&self) -> Vec<(String, u16)>;
}
