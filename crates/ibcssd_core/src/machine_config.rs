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

//! Configuration types for the emulated machine, deserialized from TOML.
//!
//! Only media assignment is configurable: which drive slots have a backing
//! image, where it lives, and how it is opened. Drive geometry is fixed per
//! slot by the controller's tables and is never read from configuration.

use serde_derive::Deserialize;
use std::path::PathBuf;

use crate::devices::hdc::DEFAULT_DISK_FILENAMES;

#[derive(Clone, Debug, Default, Deserialize)]
pub struct MachineConfig {
    #[serde(default)]
    pub controller: ControllerConfig,
    #[serde(default)]
    pub drive: Vec<DriveSlotConfig>,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct ControllerConfig {
    /// Base port of the controller's register window. The deployment decodes
    /// 0x40-0x4F; leave unset to use the default.
    pub io_base: Option<u16>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct DriveSlotConfig {
    /// Drive slot 0-3.
    pub slot: usize,
    /// Path of the backing disk image.
    pub path: PathBuf,
    #[serde(default)]
    pub read_only: bool,
    /// Create a blank image if the path does not exist yet.
    #[serde(default)]
    pub create: bool,
}

impl MachineConfig {
    pub fn from_toml(toml_str: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(toml_str)
    }

    /// The as-shipped machine: an 85MB fixed disk in slot 0 that must already
    /// exist, and a 10MB removable cartridge in slot 3 created on first use.
    pub fn default_machine() -> Self {
        Self {
            controller: ControllerConfig::default(),
            drive: vec![
                DriveSlotConfig {
                    slot: 0,
                    path: PathBuf::from(DEFAULT_DISK_FILENAMES[0]),
                    read_only: false,
                    create: false,
                },
                DriveSlotConfig {
                    slot: 3,
                    path: PathBuf::from(DEFAULT_DISK_FILENAMES[3]),
                    read_only: false,
                    create: true,
                },
            ],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_drive_slots_from_toml() {
        let config = MachineConfig::from_toml(
            r#"
            [controller]
            io_base = 0x40

            [[drive]]
            slot = 0
            path = "IBCDISK0.dsk"

            [[drive]]
            slot = 3
            path = "cartridge.dsk"
            create = true
            read_only = true
            "#,
        )
        .unwrap();

        assert_eq!(config.controller.io_base, Some(0x40));
        assert_eq!(config.drive.len(), 2);
        assert_eq!(config.drive[0].slot, 0);
        assert!(!config.drive[0].create);
        assert_eq!(config.drive[1].path, PathBuf::from("cartridge.dsk"));
        assert!(config.drive[1].read_only);
    }

    #[test]
    fn default_machine_populates_slots_0_and_3() {
        let config = MachineConfig::default_machine();
        let slots: Vec<usize> = config.drive.iter().map(|d| d.slot).collect();
        assert_eq!(slots, vec![0, 3]);
    }
}
