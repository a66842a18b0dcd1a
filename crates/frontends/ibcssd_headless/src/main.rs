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

//! Headless harness for the IbcSSD controller core.
//!
//! Loads a machine configuration, brings the controller up through the same
//! bus-level register protocol the host firmware uses, and runs a read-only
//! smoke exercise: a controller reset, a drive parameter read, and a sector
//! read from each attached drive. Nothing is written to the configured images.

use std::{fs, path::PathBuf};

use anyhow::Context;

use ibcssd_core::{
    bus::IoDevice,
    devices::hdc::{
        IbcHdcController,
        CMD_READ_PARAMETERS,
        CMD_READ_SECT,
        CMD_RESET,
        CMD_TRIGGER_BIT,
        DRIVE_CT,
        HDC_REG_FIFO,
        HDC_REG_FIFO_STATUS,
        HDC_REG_HOLDING_1,
        HDC_REG_HOLDING_2,
        HDC_REG_HOLDING_3,
        HDC_REG_TRIGGER,
    },
    machine_config::MachineConfig,
};

const DEFAULT_CONFIG_PATH: &str = "ibcssd.toml";

const STATUS_ERR_BIT: u8 = 0x01;

struct HostBus {
    hdc: IbcHdcController,
    io_base: u16,
}

impl HostBus {
    fn new(hdc: IbcHdcController, io_base: u16) -> Self {
        Self { hdc, io_base }
    }

    /// Issue a command burst followed by a parameter burst, then run the
    /// dispatcher to completion, as the host's polled protocol does.
    fn issue_command(&mut self, cmd: u8, drive: u8, cyl: u16, head: u8, sect: u8, count: u8) -> u8 {
        self.hdc.write_u8(self.io_base + HDC_REG_HOLDING_1, drive);
        self.hdc.write_u8(self.io_base + HDC_REG_HOLDING_2, (cyl & 0xFF) as u8);
        self.hdc.write_u8(self.io_base + HDC_REG_HOLDING_3, (cyl >> 8) as u8);
        self.hdc.write_u8(self.io_base + HDC_REG_TRIGGER, CMD_TRIGGER_BIT | cmd);

        self.hdc.write_u8(self.io_base + HDC_REG_HOLDING_1, head);
        self.hdc.write_u8(self.io_base + HDC_REG_HOLDING_2, count);
        self.hdc.write_u8(self.io_base + HDC_REG_HOLDING_3, 0);
        self.hdc.write_u8(self.io_base + HDC_REG_TRIGGER, sect);

        self.hdc.run();
        self.hdc.read_u8(self.io_base + HDC_REG_TRIGGER)
    }

    fn drain_fifo(&mut self, len: usize) -> Vec<u8> {
        self.hdc.write_u8(self.io_base + HDC_REG_FIFO_STATUS, 0);
        (0..len).map(|_| self.hdc.read_u8(self.io_base + HDC_REG_FIFO)).collect()
    }
}

fn main() -> Result<(), anyhow::Error> {
    env_logger::init(); // Log to stderr (if you run with `RUST_LOG=debug`).

    println!("IbcSSD: IBC MCC ST-506 Hard Disk Controller emulator");

    let config_path = std::env::args().nth(1).map_or(PathBuf::from(DEFAULT_CONFIG_PATH), PathBuf::from);

    let config = if config_path.is_file() {
        let config_str =
            fs::read_to_string(&config_path).with_context(|| format!("Failed to read config {:?}", config_path))?;
        MachineConfig::from_toml(&config_str).with_context(|| format!("Failed to parse config {:?}", config_path))?
    }
    else {
        log::warn!("Config {:?} not found; using the default machine", config_path);
        MachineConfig::default_machine()
    };

    let io_base = config.controller.io_base.unwrap_or(ibcssd_core::devices::hdc::DEFAULT_IO_BASE);
    let hdc = IbcHdcController::new(config.controller.io_base, &config.drive);

    for (name, port) in hdc.port_list() {
        log::debug!("Port {:04X}: {}", port, name);
    }

    let mut bus = HostBus::new(hdc, io_base);

    // The host's boot firmware issues a controller reset through the register
    // protocol before anything else.
    bus.hdc.hard_reset();
    let status = bus.issue_command(CMD_RESET, 0, 0, 0, 0, 0);
    if status & STATUS_ERR_BIT != 0 {
        log::error!("Controller reset reported missing media; continuing degraded");
    }
    println!("Controller ready, status {:02X}.", status);

    let status = bus.issue_command(CMD_READ_PARAMETERS, 0, 0, 0, 0, 0);
    if status & STATUS_ERR_BIT == 0 {
        let table = bus.drain_fifo(ibcssd_core::devices::hdc::parameters::DRIVE_PARAMETER_TABLE_LEN);
        println!("Drive parameter table: {} bytes, {} heads reported.", table.len(), table[0x30]);
    }

    let mut failures = 0;
    for drive_n in 0..DRIVE_CT {
        if !bus.hdc.drive(drive_n).ready() {
            continue;
        }
        let geometry = bus.hdc.drive(drive_n).geometry();
        let status = bus.issue_command(CMD_READ_SECT, drive_n as u8, 0, 0, 0, 1);
        if status & STATUS_ERR_BIT == 0 {
            println!("Drive {}: {} read OK, status {:02X}.", drive_n, geometry, status);
        }
        else {
            println!("Drive {}: {} read FAILED, status {:02X}.", drive_n, geometry, status);
            failures += 1;
        }
    }

    if failures > 0 {
        anyhow::bail!("{} drive(s) failed the smoke read", failures);
    }
    Ok(())
}
