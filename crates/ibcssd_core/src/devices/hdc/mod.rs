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

//! An implementation of the IBC MCC ST-506 hard disk controller.
//!
//! The host talks to the controller through a 16-port register window. Writes
//! accumulate in four holding registers; a write to the trigger port commits
//! them as either a command burst (bit 7 set: command, drive select, cylinder)
//! or a parameter burst (sector, head, sector count), and a committed
//! parameter burst raises the command-pending flag. Sector payloads move one
//! byte per bus cycle through the FIFO data port.
//!
//! On the original board the register window is serviced from interrupt
//! context while WAIT# stalls the host CPU, and commands execute in the
//! non-preemptible main loop, with interrupt-disable brackets guarding
//! multi-field state updates. Here both domains reach the controller through
//! `&mut self` — the bus side via [IoDevice], the main loop via
//! [IbcHdcController::run] — so a bus cycle can never observe a half-updated
//! task file, and nothing on the bus side blocks or touches storage. The
//! command-pending flag is the only signal that crosses the boundary: it is
//! raised when the parameter burst commits, so `run()` always sees a complete
//! task-file snapshot.

pub mod fifo;
pub mod parameters;

use lazy_static::lazy_static;
use modular_bitfield::prelude::*;

use crate::{
    bus::{IoDevice, NO_IO_BYTE},
    device_types::{chs::DiskChs, geometry::DriveGeometry},
    machine_config::DriveSlotConfig,
    vdisk::VirtualDisk,
};

use fifo::SectorFifo;
use parameters::{DRIVE_PARAMETER_TABLE, DRIVE_PARAMETER_TABLE_LEN};

pub const DRIVE_CT: usize = 4;

// Public consts
pub const DEFAULT_IO_BASE: u16 = 0x40;

/// Sector size is fixed per command on this controller.
pub const SECTOR_SIZE: usize = 256;
pub const MAX_SECTOR_SIZE: usize = 256;
/// Largest multi-sector transfer the FIFO can stage.
pub const MAX_XFER_SECTORS: usize = 10;

/// The real controller fills formatted tracks with zero; 0xE5 is used instead
/// so a freshly formatted disk reads as blank under CP/M.
pub const FORMAT_FILL_BYTE: u8 = 0xE5;
pub const FORMAT_CHUNK_LEN: usize = 2048;

/// The first reopen after a write can fail on the deployment platform, so the
/// file handle is recovered with a bounded retry.
pub const FILE_REOPEN_ATTEMPTS: u32 = 10;

pub const DEFAULT_DISK_FILENAMES: [&str; DRIVE_CT] = [
    "IBCDISK0.dsk",
    "IBCDISK1.dsk",
    "IBCDISK2.dsk",
    "IBCDISK3.dsk",
];

// Register offsets relative to the controller's base port
pub const HDC_REG_TRIGGER: u16 = 0x00; // Status on read, burst trigger on write
pub const HDC_REG_HOLDING_1: u16 = 0x01;
pub const HDC_REG_HOLDING_2: u16 = 0x02;
pub const HDC_REG_HOLDING_3: u16 = 0x03;
pub const HDC_REG_FIFO_STATUS: u16 = 0x04;
pub const HDC_REG_FIFO: u16 = 0x08;
pub const HDC_REG_TEST_LOOPBACK: u16 = 0x0C;
pub const HDC_REG_TEST_INCR: u16 = 0x0D;

/// Bit 7 of a trigger write marks the burst as a command burst.
pub const CMD_TRIGGER_BIT: u8 = 0x80;

// Commands, decoded from the low 7 bits of the command byte
pub const CMD_RESET: u8 = 0x00;
pub const CMD_READ_SECT: u8 = 0x01;
pub const CMD_WRITE_SECT: u8 = 0x02;
pub const CMD_FORMAT_TRK: u8 = 0x08;
pub const CMD_ACCESS_FIFO: u8 = 0x0B;
pub const CMD_READ_PARAMETERS: u8 = 0x10;

// Composite status patterns. The protocol stores whole patterns at each step
// rather than flipping individual bits; the host firmware polls for these
// exact values, with the error bit OR'd on top.
pub const STATUS_RESET_COMPLETE: u8 = 0x00;
pub const STATUS_BUSY: u8 = 0x10; // parameter burst committed, command pending
pub const STATUS_ACK: u8 = 0x20; // burst/housekeeping acknowledge
pub const STATUS_CMD_ACK: u8 = 0x30; // command burst acknowledge
pub const STATUS_WRITE_DONE: u8 = 0x40;
pub const STATUS_DATA_READY: u8 = 0x60; // FIFO holds valid data

/// The controller status byte as seen by the host.
#[bitfield]
#[derive(Copy, Clone, Debug)]
pub struct HdcStatusRegister {
    pub err: bool, // Error
    #[skip]
    unused: B2,
    pub drq: bool,           // Data Request
    pub seek_complete: bool, // Seek Complete
    pub write_fault: bool,   // Write Fault
    pub ready: bool,         // Drive Ready
    pub busy: bool,          // Controller Busy
}

lazy_static! {
    /// Fixed per-slot drive geometry. Geometry is a property of the slot, set
    /// once at reset; it is never negotiated with the host or derived from the
    /// backing image.
    static ref SLOT_GEOMETRY: [DriveGeometry; DRIVE_CT] = [
        DriveGeometry::new(680, 15, 32, 256), // 85MB fixed disk
        DriveGeometry::new(615, 4, 32, 256),
        DriveGeometry::new(615, 4, 32, 256),
        DriveGeometry::new(612, 2, 32, 256),  // 10MB removable cartridge
    ];
}

/// The committed task file. The first four fields are written by a command
/// burst, the last four by a parameter burst.
#[derive(Copy, Clone, Debug, Default)]
pub struct TaskFile {
    pub command: u8,
    pub drive: u8,
    pub cyl_lo: u8,
    pub cyl_hi: u8,
    pub sector: u8,
    pub head: u8,
    pub sector_count: u8,
    pub spare: u8,
}

pub struct Drive {
    read_only: bool,
    geometry: DriveGeometry,
    cur_cyl: u16,
    cur_head: u8,
    cur_sect: u8,
    cur_sector_size: usize,
    xfr_sectors: u16,
    ready: bool,
    disk: Option<VirtualDisk>,
}

impl Drive {
    fn new(geometry: DriveGeometry) -> Self {
        Self {
            read_only: false,
            geometry,
            cur_cyl: 0,
            cur_head: 0,
            cur_sect: 0,
            cur_sector_size: 0,
            xfr_sectors: 0,
            ready: false,
            disk: None,
        }
    }

    /// Reinitialize the slot from fixed geometry, dropping any open media.
    fn reinit(&mut self, geometry: DriveGeometry) {
        *self = Drive::new(geometry);
    }

    pub fn geometry(&self) -> DriveGeometry {
        self.geometry
    }

    pub fn ready(&self) -> bool {
        self.ready
    }
}

pub struct IbcHdcController {
    io_base: u16,
    sel_drive: usize,
    holding: [u8; 4],
    taskfile: TaskFile,
    status: HdcStatusRegister,
    command_pending: bool,
    drives: [Drive; DRIVE_CT],
    slot_media: [Option<DriveSlotConfig>; DRIVE_CT],
    fifo: SectorFifo,
    test_register: u8,
}

impl IoDevice for IbcHdcController {
    fn read_u8(&mut self, port: u16) -> u8 {
        match port.wrapping_sub(self.io_base) {
            // The FIFO is serviced inline: it is the latency-critical path and
            // must complete within the bus-stall budget. No logging here.
            HDC_REG_FIFO => self.fifo.read_next(),
            offset => self.register_read(offset),
        }
    }

    fn write_u8(&mut self, port: u16, data: u8) {
        match port.wrapping_sub(self.io_base) {
            HDC_REG_FIFO => self.fifo.write_next(data),
            offset => self.register_write(offset, data),
        }
    }

    #[rustfmt::skip]
    fn port_list(&self) -> Vec<(String, u16)> {
        vec![
            (String::from("IBC HDC Command/Status"), self.io_base + HDC_REG_TRIGGER),
            (String::from("IBC HDC Holding 1"), self.io_base + HDC_REG_HOLDING_1),
            (String::from("IBC HDC Holding 2"), self.io_base + HDC_REG_HOLDING_2),
            (String::from("IBC HDC Holding 3"), self.io_base + HDC_REG_HOLDING_3),
            (String::from("IBC HDC FIFO Status"), self.io_base + HDC_REG_FIFO_STATUS),
            (String::from("IBC HDC FIFO Data"), self.io_base + HDC_REG_FIFO),
            (String::from("IBC HDC Test Loopback"), self.io_base + HDC_REG_TEST_LOOPBACK),
            (String::from("IBC HDC Test Increment"), self.io_base + HDC_REG_TEST_INCR),
        ]
    }
}

impl IbcHdcController {
    pub fn new(io_base: Option<u16>, drives: &[DriveSlotConfig]) -> Self {
        let mut slot_media: [Option<DriveSlotConfig>; DRIVE_CT] = Default::default();
        for slot_config in drives {
            if slot_config.slot < DRIVE_CT {
                slot_media[slot_config.slot] = Some(slot_config.clone());
            }
            else {
                log::error!("Drive slot out of range: {}", slot_config.slot);
            }
        }

        Self {
            io_base: io_base.unwrap_or(DEFAULT_IO_BASE),
            sel_drive: 0,
            holding: [0; 4],
            taskfile: TaskFile::default(),
            status: HdcStatusRegister::from_bytes([STATUS_RESET_COMPLETE]),
            command_pending: false,
            drives: std::array::from_fn(|i| Drive::new(SLOT_GEOMETRY[i])),
            slot_media,
            fifo: SectorFifo::new(),
            test_register: 0,
        }
    }

    /// Bus-reset entry: the host's reset line clears any latched command.
    /// Drive state and media are untouched; a full reinitialization requires
    /// the Reset command.
    pub fn hard_reset(&mut self) {
        self.taskfile.command = 0;
        log::debug!("Hard Reset.");
    }

    /// Full controller reset: rebuild all controller and drive state from the
    /// fixed slot tables and reopen backing media for the configured slots.
    /// Missing media is reported through the status error bit; the controller
    /// keeps running degraded.
    pub fn reset(&mut self) {
        log::trace!("Resetting Hard Disk Controller...");

        self.sel_drive = 0;
        self.holding = [0; 4];
        self.taskfile = TaskFile::default();
        self.command_pending = false;
        self.status = HdcStatusRegister::from_bytes([STATUS_RESET_COMPLETE]);

        for (i, drive) in self.drives.iter_mut().enumerate() {
            drive.reinit(SLOT_GEOMETRY[i]);
        }

        for i in 0..DRIVE_CT {
            let Some(media) = self.slot_media[i].clone() else {
                continue;
            };
            match VirtualDisk::open(&media.path, SLOT_GEOMETRY[i], media.read_only, media.create) {
                Ok(disk) => {
                    log::info!("Drive {}: opened {:?}", i, disk.path());
                    self.drives[i].disk = Some(disk);
                    self.drives[i].read_only = media.read_only;
                    self.drives[i].ready = true;
                }
                Err(e) => {
                    log::error!("Drive {}: could not open {:?}: {:#}", i, media.path, e);
                    self.status.set_err(true);
                }
            }
        }
    }

    pub fn status_byte(&self) -> u8 {
        self.status.into_bytes()[0]
    }

    pub fn selected_drive(&self) -> usize {
        self.sel_drive
    }

    pub fn command_pending(&self) -> bool {
        self.command_pending
    }

    pub fn drive(&self, drive_n: usize) -> &Drive {
        &self.drives[drive_n]
    }

    /// Read from the task file register window. Bus-stall path.
    fn register_read(&mut self, offset: u16) -> u8 {
        match offset {
            HDC_REG_TRIGGER => self.status_byte(),
            HDC_REG_FIFO_STATUS => {
                // Reserved
                NO_IO_BYTE
            }
            HDC_REG_TEST_LOOPBACK => {
                log::debug!("TEST: Read {:02X}", self.test_register);
                self.test_register
            }
            HDC_REG_TEST_INCR => {
                self.test_register = self.test_register.wrapping_add(1);
                log::debug!("TEST: Read (incr) {:02X}", self.test_register);
                self.test_register
            }
            _ => {
                log::error!("Unhandled register read: {:02X}", offset);
                NO_IO_BYTE
            }
        }
    }

    /// Write to the task file register window. Bus-stall path: a trigger write
    /// commits the holding registers, but command execution itself is deferred
    /// to the main loop.
    fn register_write(&mut self, offset: u16, data: u8) {
        match offset {
            HDC_REG_TRIGGER => {
                self.holding[0] = data;
                if data & CMD_TRIGGER_BIT != 0 {
                    self.commit_command_burst();
                }
                else {
                    self.commit_parameter_burst();
                }
            }
            HDC_REG_HOLDING_1 | HDC_REG_HOLDING_2 | HDC_REG_HOLDING_3 => {
                self.holding[(offset & 0x03) as usize] = data;
            }
            HDC_REG_FIFO_STATUS => {
                self.fifo.reset();
            }
            HDC_REG_TEST_LOOPBACK => {
                self.test_register = data;
                log::debug!("TEST: Write {:02X}", data);
            }
            HDC_REG_TEST_INCR => {
                self.test_register = data;
                log::debug!("TEST: Write (incr) {:02X}", data);
            }
            _ => {
                log::error!("Unhandled register write: {:02X}={:02X}", offset, data);
            }
        }
    }

    /// Commit the holding registers as a command burst: command opcode, drive
    /// select, and cylinder address. Read Parameters reports on the whole
    /// drive complement, so it does not move the selection.
    fn commit_command_burst(&mut self) {
        self.taskfile.command = self.holding[0];
        self.taskfile.drive = self.holding[1];
        self.taskfile.cyl_lo = self.holding[2];
        self.taskfile.cyl_hi = self.holding[3];

        if self.taskfile.command & !CMD_TRIGGER_BIT != CMD_READ_PARAMETERS {
            self.sel_drive = (self.taskfile.drive & 0x03) as usize;
        }
        self.status = HdcStatusRegister::from_bytes([STATUS_CMD_ACK]);

        log::trace!(
            "Command burst: cmd {:02X} drive {} cyl {}",
            self.taskfile.command,
            self.taskfile.drive,
            (self.taskfile.cyl_hi as u16) << 8 | self.taskfile.cyl_lo as u16
        );
    }

    /// Commit the holding registers as a parameter burst and, if the
    /// dispatcher is idle, raise the command-pending flag. A burst arriving
    /// while a command is pending is rejected rather than queued — except for
    /// Reset, which the front-panel switch can deliver more than once.
    fn commit_parameter_burst(&mut self) {
        self.taskfile.sector = self.holding[0];
        self.taskfile.head = self.holding[1];
        self.taskfile.sector_count = self.holding[2];
        self.taskfile.spare = self.holding[3];

        self.status = HdcStatusRegister::from_bytes([STATUS_ACK]);
        if self.command_pending {
            if self.taskfile.command & !CMD_TRIGGER_BIT != CMD_RESET {
                log::warn!("Command already in progress; burst rejected");
            }
        }
        else {
            self.status = HdcStatusRegister::from_bytes([STATUS_BUSY]);
            self.command_pending = true;
        }
    }

    /// Run the controller's main-loop side: execute one pending command to
    /// completion. Storage IO and logging happen here, never on the bus side.
    pub fn run(&mut self) {
        if self.command_pending {
            self.do_command();
            self.command_pending = false;

            if self.fifo.take_overflow() {
                log::warn!("FIFO cursor was clamped at capacity");
            }
        }
    }

    /// Decode and execute the committed task file against the selected drive.
    fn do_command(&mut self) {
        let cmd = self.taskfile.command & !CMD_TRIGGER_BIT;

        let drive = &mut self.drives[self.sel_drive];
        drive.cur_cyl = (self.taskfile.cyl_hi as u16) << 8 | self.taskfile.cyl_lo as u16;
        drive.cur_head = self.taskfile.head;
        drive.cur_sect = self.taskfile.sector;
        drive.cur_sector_size = SECTOR_SIZE;
        // Hardware convention: a sector count of zero means one sector.
        drive.xfr_sectors = match self.taskfile.sector_count {
            0 => 1,
            n => n as u16,
        };

        match cmd {
            CMD_RESET => self.command_reset(),
            CMD_READ_SECT => self.command_read_sector(),
            CMD_WRITE_SECT => self.command_write_sector(),
            CMD_FORMAT_TRK => self.command_format_track(),
            CMD_ACCESS_FIFO => self.command_access_fifo(),
            CMD_READ_PARAMETERS => self.command_read_parameters(),
            _ => {
                // Acknowledged with a done status; the host probes commands
                // this controller never implemented and must not see an error.
                log::warn!("UNKNOWN COMMAND {:02X}", cmd);
                self.status = HdcStatusRegister::from_bytes([STATUS_DATA_READY]);
            }
        }
    }

    /// Validate the working C/H/S/N address against the selected drive's
    /// geometry. Formatting covers whole tracks, so the sector component is
    /// not checked for it. A passing validation clears the error bit; a
    /// failing one sets it, where it stays until the next valid operation.
    fn validate_chsn(&mut self, check_sector: bool) -> bool {
        let drive = &self.drives[self.sel_drive];
        let geometry = drive.geometry;

        let mut valid = drive.cur_cyl < geometry.c()
            && drive.cur_head < geometry.h()
            && drive.cur_sector_size == geometry.sector_size();
        if check_sector {
            valid = valid && drive.cur_sect < geometry.s();
        }

        if valid {
            self.status.set_err(false);
        }
        else {
            log::error!(
                "Drive {}: C:{}/H:{}/S:{}/N:{}: ID Not Found (check disk geometry)",
                self.sel_drive,
                drive.cur_cyl,
                drive.cur_head,
                drive.cur_sect,
                drive.cur_sector_size
            );
            self.status.set_err(true);
        }
        valid
    }

    fn command_reset(&mut self) {
        log::debug!("RESET COMMAND");
        self.reset();
    }

    fn command_read_sector(&mut self) {
        if !self.validate_chsn(true) {
            return;
        }

        let drive = &mut self.drives[self.sel_drive];
        let xfr_len = drive.xfr_sectors as usize * drive.cur_sector_size;
        let chs = DiskChs::new(drive.cur_cyl, drive.cur_head, drive.cur_sect);
        let offset = drive.geometry.chs_offset(chs);

        if xfr_len > self.fifo.capacity() {
            log::error!(
                "Drive {}: transfer of {} bytes exceeds FIFO capacity",
                self.sel_drive,
                xfr_len
            );
            self.status.set_err(true);
            return;
        }

        log::debug!(
            "Drive {}: READ SECTOR  {} #:{:2} offset={:06X} len={}",
            self.sel_drive,
            chs,
            drive.xfr_sectors,
            offset,
            xfr_len
        );

        self.status = HdcStatusRegister::from_bytes([STATUS_DATA_READY]);

        let Some(disk) = drive.disk.as_mut() else {
            log::error!("Drive {}: no media attached", self.sel_drive);
            self.status.set_err(true);
            return;
        };
        if let Err(e) = disk.seek(offset) {
            log::error!("Drive {}: seek failed: {:#}", self.sel_drive, e);
            self.status.set_err(true);
            return;
        }
        match disk.read(self.fifo.slice_mut(xfr_len)) {
            Ok(actual) if actual == xfr_len => {}
            Ok(actual) => {
                log::error!("Drive {}: tried to read {} but got {}", self.sel_drive, xfr_len, actual);
                self.status.set_err(true);
            }
            Err(e) => {
                log::error!("Drive {}: read failed: {:#}", self.sel_drive, e);
                self.status.set_err(true);
            }
        }
    }

    fn command_write_sector(&mut self) {
        if !self.validate_chsn(true) {
            return;
        }

        let drive = &mut self.drives[self.sel_drive];
        let xfr_len = drive.xfr_sectors as usize * drive.cur_sector_size;
        let chs = DiskChs::new(drive.cur_cyl, drive.cur_head, drive.cur_sect);
        let offset = drive.geometry.chs_offset(chs);

        if xfr_len > self.fifo.capacity() {
            log::error!(
                "Drive {}: transfer of {} bytes exceeds FIFO capacity",
                self.sel_drive,
                xfr_len
            );
            self.status.set_err(true);
            return;
        }

        log::debug!(
            "Drive {}: WRITE SECTOR {} #:{:2} offset={:06X} len={}",
            self.sel_drive,
            chs,
            drive.xfr_sectors,
            offset,
            xfr_len
        );

        self.status = HdcStatusRegister::from_bytes([STATUS_WRITE_DONE]);

        let Some(disk) = drive.disk.as_mut() else {
            log::error!("Drive {}: no media attached", self.sel_drive);
            self.status.set_err(true);
            return;
        };
        if let Err(e) = disk.seek(offset) {
            log::error!("Drive {}: seek failed: {:#}", self.sel_drive, e);
            self.status.set_err(true);
            return;
        }
        match disk.write(self.fifo.slice(xfr_len)) {
            Ok(actual) if actual == xfr_len => {}
            Ok(actual) => {
                log::error!("Drive {}: tried to write {} but got {}", self.sel_drive, xfr_len, actual);
                self.status.set_err(true);
            }
            Err(e) => {
                log::error!("Drive {}: write failed: {:#}", self.sel_drive, e);
                self.status.set_err(true);
            }
        }

        if let Err(e) = disk.reopen_with_retry(FILE_REOPEN_ATTEMPTS) {
            log::error!("Drive {}: could not reopen backing file: {:#}", self.sel_drive, e);
        }
    }

    fn command_format_track(&mut self) {
        if !self.validate_chsn(false) {
            return;
        }

        let drive = &mut self.drives[self.sel_drive];
        let track_len = drive.geometry.track_size();
        let offset = drive.geometry.track_offset(drive.cur_cyl, drive.cur_head);

        log::debug!(
            "Drive {}: FORMAT TRACK: C:{}/H:{}/Fill={:02X}/Len={} offset={:06X}",
            self.sel_drive,
            drive.cur_cyl,
            drive.cur_head,
            FORMAT_FILL_BYTE,
            track_len,
            offset
        );

        self.status = HdcStatusRegister::from_bytes([STATUS_ACK]);

        let Some(disk) = drive.disk.as_mut() else {
            log::error!("Drive {}: no media attached", self.sel_drive);
            self.status.set_err(true);
            return;
        };
        if let Err(e) = disk.seek(offset) {
            log::error!("Drive {}: seek failed: {:#}", self.sel_drive, e);
            self.status.set_err(true);
            return;
        }

        let chunk = [FORMAT_FILL_BYTE; FORMAT_CHUNK_LEN];
        let mut formatted = 0;
        while formatted < track_len {
            let len = FORMAT_CHUNK_LEN.min(track_len - formatted);
            match disk.write(&chunk[..len]) {
                Ok(actual) if actual == len => {}
                Ok(actual) => {
                    log::error!("Drive {}: tried to write {} but got {}", self.sel_drive, len, actual);
                    self.status.set_err(true);
                }
                Err(e) => {
                    log::error!("Drive {}: format write failed: {:#}", self.sel_drive, e);
                    self.status.set_err(true);
                    break;
                }
            }
            formatted += len;
        }

        if let Err(e) = disk.reopen_with_retry(FILE_REOPEN_ATTEMPTS) {
            log::error!("Drive {}: could not reopen backing file: {:#}", self.sel_drive, e);
        }
    }

    /// Rewind the FIFO cursor so the host can prime the buffer before a write
    /// or drain it after a read, outside the read/write command envelope.
    fn command_access_fifo(&mut self) {
        log::debug!("ACCESS FIFO {} blocks", self.taskfile.sector_count);
        self.fifo.reset();
        self.status = HdcStatusRegister::from_bytes([STATUS_ACK]);
    }

    /// Emit the fixed 108-byte drive parameter table into the FIFO buffer.
    /// The cursor is not moved; the host rewinds it through the FIFO status
    /// port before draining the table.
    fn command_read_parameters(&mut self) {
        let drive = &self.drives[self.sel_drive];
        log::debug!(
            "READ DRIVE PARAMETERS C:{}/H:{}/S:{:2}",
            drive.cur_cyl,
            drive.cur_head,
            drive.cur_sect
        );
        for (i, drive) in self.drives.iter().enumerate() {
            log::debug!("Drive {}: {}", i, drive.geometry);
        }

        self.fifo
            .slice_mut(DRIVE_PARAMETER_TABLE_LEN)
            .copy_from_slice(&DRIVE_PARAMETER_TABLE);
        self.status = HdcStatusRegister::from_bytes([STATUS_DATA_READY]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::machine_config::DriveSlotConfig;
    use std::{fs, fs::File, io::Read};
    use tempfile::TempDir;

    const IO_BASE: u16 = DEFAULT_IO_BASE;

    fn slot_config(dir: &TempDir, slot: usize, create: bool) -> DriveSlotConfig {
        DriveSlotConfig {
            slot,
            path: dir.path().join(format!("disk{}.dsk", slot)),
            read_only: false,
            create,
        }
    }

    /// A controller with media in slots 0 and 3, reset and ready.
    fn test_controller(dir: &TempDir) -> IbcHdcController {
        let slots = vec![slot_config(dir, 0, true), slot_config(dir, 3, true)];
        let mut hdc = IbcHdcController::new(None, &slots);
        hdc.reset();
        hdc
    }

    /// Issue a command burst followed by a parameter burst, as the host does.
    fn issue_command(hdc: &mut IbcHdcController, cmd: u8, drive: u8, cyl: u16, head: u8, sect: u8, count: u8) {
        hdc.write_u8(IO_BASE + HDC_REG_HOLDING_1, drive);
        hdc.write_u8(IO_BASE + HDC_REG_HOLDING_2, (cyl & 0xFF) as u8);
        hdc.write_u8(IO_BASE + HDC_REG_HOLDING_3, (cyl >> 8) as u8);
        hdc.write_u8(IO_BASE + HDC_REG_TRIGGER, CMD_TRIGGER_BIT | cmd);

        hdc.write_u8(IO_BASE + HDC_REG_HOLDING_1, head);
        hdc.write_u8(IO_BASE + HDC_REG_HOLDING_2, count);
        hdc.write_u8(IO_BASE + HDC_REG_HOLDING_3, 0);
        hdc.write_u8(IO_BASE + HDC_REG_TRIGGER, sect);
    }

    fn prime_fifo(hdc: &mut IbcHdcController, data: &[u8]) {
        hdc.write_u8(IO_BASE + HDC_REG_FIFO_STATUS, 0);
        for &byte in data {
            hdc.write_u8(IO_BASE + HDC_REG_FIFO, byte);
        }
    }

    fn drain_fifo(hdc: &mut IbcHdcController, len: usize) -> Vec<u8> {
        hdc.write_u8(IO_BASE + HDC_REG_FIFO_STATUS, 0);
        (0..len).map(|_| hdc.read_u8(IO_BASE + HDC_REG_FIFO)).collect()
    }

    fn read_status(hdc: &mut IbcHdcController) -> u8 {
        hdc.read_u8(IO_BASE + HDC_REG_TRIGGER)
    }

    #[test]
    fn burst_status_progression() {
        let dir = tempfile::tempdir().unwrap();
        let mut hdc = test_controller(&dir);

        hdc.write_u8(IO_BASE + HDC_REG_HOLDING_1, 0);
        hdc.write_u8(IO_BASE + HDC_REG_HOLDING_2, 0);
        hdc.write_u8(IO_BASE + HDC_REG_HOLDING_3, 0);
        hdc.write_u8(IO_BASE + HDC_REG_TRIGGER, CMD_TRIGGER_BIT | CMD_READ_SECT);
        assert_eq!(read_status(&mut hdc), STATUS_CMD_ACK);

        hdc.write_u8(IO_BASE + HDC_REG_HOLDING_1, 0);
        hdc.write_u8(IO_BASE + HDC_REG_HOLDING_2, 1);
        hdc.write_u8(IO_BASE + HDC_REG_HOLDING_3, 0);
        hdc.write_u8(IO_BASE + HDC_REG_TRIGGER, 0);
        assert_eq!(read_status(&mut hdc), STATUS_BUSY);
        assert!(hdc.command_pending());
    }

    #[test]
    fn write_then_read_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let mut hdc = test_controller(&dir);

        let pattern: Vec<u8> = (0..=255).collect();
        prime_fifo(&mut hdc, &pattern);
        issue_command(&mut hdc, CMD_WRITE_SECT, 0, 0, 0, 0, 1);
        hdc.run();
        assert_eq!(read_status(&mut hdc), STATUS_WRITE_DONE);

        issue_command(&mut hdc, CMD_READ_SECT, 0, 0, 0, 0, 1);
        hdc.run();
        assert_eq!(read_status(&mut hdc), STATUS_DATA_READY);

        assert_eq!(drain_fifo(&mut hdc, 256), pattern);
    }

    #[test]
    fn multi_sector_round_trip_spans_heads() {
        let dir = tempfile::tempdir().unwrap();
        let mut hdc = test_controller(&dir);

        // Two sectors starting at the last sector of head 0; the transfer is
        // linear in the image, continuing into head 1, sector 0.
        let pattern: Vec<u8> = (0..512u32).map(|i| (i % 251) as u8).collect();
        prime_fifo(&mut hdc, &pattern);
        issue_command(&mut hdc, CMD_WRITE_SECT, 0, 0, 0, 31, 2);
        hdc.run();
        assert_eq!(read_status(&mut hdc), STATUS_WRITE_DONE);

        issue_command(&mut hdc, CMD_READ_SECT, 0, 0, 1, 0, 1);
        hdc.run();
        assert_eq!(drain_fifo(&mut hdc, 256), &pattern[256..]);
    }

    #[test]
    fn out_of_range_cylinder_sets_error_and_aborts() {
        let dir = tempfile::tempdir().unwrap();
        let mut hdc = test_controller(&dir);

        // Drive 0 has 680 cylinders; 681 is out of range. The status byte
        // keeps its pre-command pending pattern with the error bit OR'd on.
        issue_command(&mut hdc, CMD_READ_SECT, 0, 681, 0, 0, 1);
        hdc.run();
        assert_eq!(read_status(&mut hdc), STATUS_BUSY | 0x01);

        // A write at an invalid address performs no storage IO.
        let image_path = dir.path().join("disk0.dsk");
        let len_before = fs::metadata(&image_path).unwrap().len();
        prime_fifo(&mut hdc, &[0xEE; 256]);
        issue_command(&mut hdc, CMD_WRITE_SECT, 0, 680, 0, 0, 1);
        hdc.run();
        assert_eq!(read_status(&mut hdc) & 0x01, 0x01);
        assert_eq!(fs::metadata(&image_path).unwrap().len(), len_before);

        // The next valid operation clears the error bit.
        issue_command(&mut hdc, CMD_READ_SECT, 0, 0, 0, 0, 1);
        hdc.run();
        assert_eq!(read_status(&mut hdc), STATUS_DATA_READY);
    }

    #[test]
    fn out_of_range_head_and_sector_set_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut hdc = test_controller(&dir);

        issue_command(&mut hdc, CMD_WRITE_SECT, 3, 0, 2, 0, 1);
        hdc.run();
        assert_eq!(read_status(&mut hdc) & 0x01, 0x01);

        issue_command(&mut hdc, CMD_READ_SECT, 3, 0, 0, 32, 1);
        hdc.run();
        assert_eq!(read_status(&mut hdc) & 0x01, 0x01);

        issue_command(&mut hdc, CMD_FORMAT_TRK, 3, 612, 0, 0, 0);
        hdc.run();
        assert_eq!(read_status(&mut hdc) & 0x01, 0x01);
    }

    #[test]
    fn sector_count_zero_transfers_one_sector() {
        let dir = tempfile::tempdir().unwrap();
        let mut hdc = test_controller(&dir);

        // Prime two sectors worth of pattern, but command a zero count.
        let pattern = vec![0xA5u8; 512];
        prime_fifo(&mut hdc, &pattern);
        issue_command(&mut hdc, CMD_WRITE_SECT, 0, 0, 0, 0, 0);
        hdc.run();
        assert_eq!(read_status(&mut hdc), STATUS_WRITE_DONE);

        // Sector 0 holds the pattern; sector 1 is untouched.
        issue_command(&mut hdc, CMD_READ_SECT, 0, 0, 0, 0, 2);
        hdc.run();
        let readback = drain_fifo(&mut hdc, 512);
        assert_eq!(&readback[..256], &pattern[..256]);
        assert_eq!(&readback[256..], &vec![0u8; 256][..]);
    }

    #[test]
    fn transfer_exceeding_fifo_capacity_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut hdc = test_controller(&dir);

        issue_command(&mut hdc, CMD_READ_SECT, 0, 0, 0, 0, (MAX_XFER_SECTORS + 1) as u8);
        hdc.run();
        assert_eq!(read_status(&mut hdc), STATUS_BUSY | 0x01);
    }

    #[test]
    fn access_fifo_resets_cursor() {
        let dir = tempfile::tempdir().unwrap();
        let mut hdc = test_controller(&dir);

        for byte in 0..16 {
            hdc.write_u8(IO_BASE + HDC_REG_FIFO, byte);
        }
        assert_eq!(hdc.fifo.cursor(), 16);

        issue_command(&mut hdc, CMD_ACCESS_FIFO, 0, 0, 0, 0, 0);
        hdc.run();
        assert_eq!(hdc.fifo.cursor(), 0);
        assert_eq!(read_status(&mut hdc), STATUS_ACK);
    }

    #[test]
    fn format_track_fills_with_fill_byte() {
        let dir = tempfile::tempdir().unwrap();
        let mut hdc = test_controller(&dir);

        issue_command(&mut hdc, CMD_FORMAT_TRK, 3, 0, 0, 0, 0);
        hdc.run();
        assert_eq!(read_status(&mut hdc), STATUS_ACK);

        // Track 0 of drive 3 is 32 x 256 bytes of fill; the first byte of the
        // next track is untouched.
        let track_len = SLOT_GEOMETRY[3].track_size();
        let mut buf = vec![0u8; track_len + 1];
        let mut file = File::open(dir.path().join("disk3.dsk")).unwrap();
        file.read_exact(&mut buf).unwrap();
        assert!(buf[..track_len].iter().all(|&b| b == FORMAT_FILL_BYTE));
        assert_eq!(buf[track_len], 0x00);
    }

    #[test]
    fn format_ignores_sector_field() {
        let dir = tempfile::tempdir().unwrap();
        let mut hdc = test_controller(&dir);

        // Sector 99 would fail read/write validation; format does not care.
        issue_command(&mut hdc, CMD_FORMAT_TRK, 3, 1, 1, 99, 0);
        hdc.run();
        assert_eq!(read_status(&mut hdc), STATUS_ACK);
    }

    #[test]
    fn reset_is_accepted_while_command_pending() {
        let dir = tempfile::tempdir().unwrap();
        let mut hdc = test_controller(&dir);

        // Leave a read pending on drive 3 without running the dispatcher.
        issue_command(&mut hdc, CMD_READ_SECT, 3, 0, 0, 0, 1);
        assert!(hdc.command_pending());
        assert_eq!(hdc.selected_drive(), 3);

        // A reset burst is tolerated while busy and fully reinitializes.
        issue_command(&mut hdc, CMD_RESET, 0, 0, 0, 0, 0);
        hdc.run();
        assert_eq!(read_status(&mut hdc), STATUS_RESET_COMPLETE);
        assert_eq!(hdc.selected_drive(), 0);
        assert!(!hdc.command_pending());
        for i in 0..DRIVE_CT {
            assert_eq!(hdc.drive(i).geometry(), SLOT_GEOMETRY[i]);
        }
        assert!(hdc.drive(0).ready());
        assert!(!hdc.drive(1).ready());
    }

    #[test]
    fn non_reset_burst_while_pending_is_not_queued() {
        let dir = tempfile::tempdir().unwrap();
        let mut hdc = test_controller(&dir);

        issue_command(&mut hdc, CMD_READ_SECT, 0, 0, 0, 0, 1);
        assert_eq!(read_status(&mut hdc), STATUS_BUSY);

        // The second burst is logged and rejected: no second pending raise.
        issue_command(&mut hdc, CMD_WRITE_SECT, 0, 0, 0, 0, 1);
        assert_eq!(read_status(&mut hdc), STATUS_ACK);
        assert!(hdc.command_pending());
    }

    #[test]
    fn unknown_command_acks_without_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut hdc = test_controller(&dir);

        issue_command(&mut hdc, 0x55, 0, 0, 0, 0, 0);
        hdc.run();
        assert_eq!(read_status(&mut hdc), STATUS_DATA_READY);
    }

    #[test]
    fn read_parameters_emits_table_and_keeps_selection() {
        let dir = tempfile::tempdir().unwrap();
        let mut hdc = test_controller(&dir);

        // Select drive 3, then ask for parameters naming drive 0; the
        // selection must not move.
        issue_command(&mut hdc, CMD_ACCESS_FIFO, 3, 0, 0, 0, 0);
        hdc.run();
        assert_eq!(hdc.selected_drive(), 3);

        issue_command(&mut hdc, CMD_READ_PARAMETERS, 0, 0, 0, 0, 0);
        hdc.run();
        assert_eq!(read_status(&mut hdc), STATUS_DATA_READY);
        assert_eq!(hdc.selected_drive(), 3);

        let table = drain_fifo(&mut hdc, DRIVE_PARAMETER_TABLE_LEN);
        assert_eq!(table, DRIVE_PARAMETER_TABLE);
        assert_eq!(table[parameters::PARAM_OFFSET_HEADS], 0x0F);
    }

    #[test]
    fn missing_media_reports_degraded_mode() {
        let dir = tempfile::tempdir().unwrap();
        let slots = vec![DriveSlotConfig {
            slot: 0,
            path: dir.path().join("absent.dsk"),
            read_only: false,
            create: false,
        }];
        let mut hdc = IbcHdcController::new(None, &slots);
        hdc.reset();

        assert_eq!(read_status(&mut hdc), STATUS_RESET_COMPLETE | 0x01);
        assert!(!hdc.drive(0).ready());

        // Still running: housekeeping commands complete normally.
        issue_command(&mut hdc, CMD_ACCESS_FIFO, 0, 0, 0, 0, 0);
        hdc.run();
        assert_eq!(read_status(&mut hdc), STATUS_ACK);
    }

    #[test]
    fn write_to_read_only_media_flags_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("disk0.dsk");
        crate::vdisk::create_disk_image(&path, SLOT_GEOMETRY[0]).unwrap();

        let slots = vec![DriveSlotConfig {
            slot: 0,
            path,
            read_only: true,
            create: false,
        }];
        let mut hdc = IbcHdcController::new(None, &slots);
        hdc.reset();

        prime_fifo(&mut hdc, &[0xA5; 256]);
        issue_command(&mut hdc, CMD_WRITE_SECT, 0, 0, 0, 0, 1);
        hdc.run();
        assert_eq!(read_status(&mut hdc) & 0x01, 0x01);
    }

    #[test]
    fn test_registers_loop_back_and_increment() {
        let dir = tempfile::tempdir().unwrap();
        let mut hdc = test_controller(&dir);

        hdc.write_u8(IO_BASE + HDC_REG_TEST_LOOPBACK, 0x5A);
        assert_eq!(hdc.read_u8(IO_BASE + HDC_REG_TEST_LOOPBACK), 0x5A);

        hdc.write_u8(IO_BASE + HDC_REG_TEST_INCR, 0x10);
        assert_eq!(hdc.read_u8(IO_BASE + HDC_REG_TEST_INCR), 0x11);
        assert_eq!(hdc.read_u8(IO_BASE + HDC_REG_TEST_INCR), 0x12);
    }

    #[test]
    fn fifo_status_read_is_reserved() {
        let dir = tempfile::tempdir().unwrap();
        let mut hdc = test_controller(&dir);

        assert_eq!(hdc.read_u8(IO_BASE + HDC_REG_FIFO_STATUS), NO_IO_BYTE);
    }
}
