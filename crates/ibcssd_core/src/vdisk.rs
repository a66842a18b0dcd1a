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

//! Implements [VirtualDisk], a file-backed virtual hard disk.
//!
//! Images are raw: a flat byte array of geometry.total_size() bytes with no
//! header or footer. The controller supplies geometry from its fixed slot
//! tables and computes byte offsets itself; this module only moves bytes.

use core::fmt::Display;
use std::{
    error::Error,
    fs,
    fs::{File, OpenOptions},
    io::{Read, Seek, SeekFrom, Write},
    path::{Path, PathBuf},
};

use anyhow::{bail, Context, Result};

use crate::device_types::geometry::DriveGeometry;

#[derive(Debug)]
pub enum VirtualDiskError {
    FileExists,
    NotOpen,
    InvalidSeek,
}
impl Error for VirtualDiskError {}
impl Display for VirtualDiskError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &*self {
            VirtualDiskError::FileExists => write!(
                f,
                "Creation of disk image failed as the file already exists (Will not overwrite)."
            ),
            VirtualDiskError::NotOpen => write!(f, "An IO operation was requested with no backing file open."),
            VirtualDiskError::InvalidSeek => write!(f, "An IO operation was requested out of bounds."),
        }
    }
}

pub struct VirtualDisk {
    file: Option<File>,
    path: PathBuf,
    geometry: DriveGeometry,
    read_only: bool,
}

impl VirtualDisk {
    /// Open the image at `path` with the externally supplied geometry. If
    /// `create` is set a missing image is created blank first; otherwise a
    /// missing image is an error (the degraded-media case the controller
    /// reports at reset).
    pub fn open(path: impl Into<PathBuf>, geometry: DriveGeometry, read_only: bool, create: bool) -> Result<Self> {
        let path = path.into();

        if create && fs::metadata(&path).is_err() {
            log::info!("Disk image {:?} not present; creating blank image", path);
            create_disk_image(&path, geometry)?;
        }

        let file = OpenOptions::new()
            .read(true)
            .write(!read_only)
            .open(&path)
            .with_context(|| format!("Failed to open disk image {:?}", path))?;

        let metadata = file.metadata().context("Failed to read disk image metadata")?;
        if metadata.len() != geometry.total_size() as u64 {
            // Not fatal: a short image simply produces short reads, which the
            // controller reports through the status error bit.
            log::warn!(
                "Disk image {:?} is {} bytes; geometry {} implies {}",
                path,
                metadata.len(),
                geometry,
                geometry.total_size()
            );
        }

        Ok(Self {
            file: Some(file),
            path,
            geometry,
            read_only,
        })
    }

    pub fn geometry(&self) -> DriveGeometry {
        self.geometry
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_open(&self) -> bool {
        self.file.is_some()
    }

    /// Seek to an absolute byte offset within the image.
    pub fn seek(&mut self, offset: u64) -> Result<()> {
        if offset > self.geometry.total_size() as u64 {
            bail!(VirtualDiskError::InvalidSeek);
        }
        match &mut self.file {
            Some(file) => {
                file.seek(SeekFrom::Start(offset))?;
                Ok(())
            }
            None => bail!(VirtualDiskError::NotOpen),
        }
    }

    /// Read bytes at the current position, filling as much of `buf` as the
    /// image allows. Returns the actual number of bytes read; the caller
    /// compares it against the requested length.
    pub fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let file = match &mut self.file {
            Some(file) => file,
            None => bail!(VirtualDiskError::NotOpen),
        };

        let mut total = 0;
        while total < buf.len() {
            let n = file.read(&mut buf[total..])?;
            if n == 0 {
                break;
            }
            total += n;
        }
        Ok(total)
    }

    /// Write bytes at the current position. Returns the actual number of bytes
    /// written; the caller compares it against the requested length.
    pub fn write(&mut self, buf: &[u8]) -> Result<usize> {
        let file = match &mut self.file {
            Some(file) => file,
            None => bail!(VirtualDiskError::NotOpen),
        };

        let n = file.write(buf)?;
        Ok(n)
    }

    /// Close the backing file. Subsequent IO fails until the image is reopened.
    pub fn close(&mut self) {
        self.file = None;
    }

    /// Close and reopen the backing file, retrying the open up to `attempts`
    /// times. The original hardware deployment needed this: the first reopen
    /// after a write could fail, so the handle is recovered with a bounded
    /// retry rather than treated as fatal.
    pub fn reopen_with_retry(&mut self, attempts: u32) -> Result<()> {
        self.close();

        let mut last_err = None;
        for attempt in 0..attempts {
            match OpenOptions::new().read(true).write(!self.read_only).open(&self.path) {
                Ok(file) => {
                    if attempt > 0 {
                        log::debug!("Reopened {:?} after {} failed attempts", self.path, attempt);
                    }
                    self.file = Some(file);
                    return Ok(());
                }
                Err(e) => {
                    last_err = Some(e);
                }
            }
        }

        Err(last_err.unwrap()).with_context(|| format!("Failed to reopen {:?} after {} attempts", self.path, attempts))
    }
}

/// Create a blank disk image of the full geometry size. The image reads as
/// zeroes; formatted tracks are later filled with the controller's fill byte,
/// so an unformatted image is distinguishable from a formatted one.
pub fn create_disk_image(path: impl AsRef<Path>, geometry: DriveGeometry) -> Result<File> {
    let path = path.as_ref();

    // Don't overwrite an existing file
    if fs::metadata(path).is_ok() {
        log::warn!("Requested disk image already exists: {:?}", path);
        bail!(VirtualDiskError::FileExists);
    }

    let file = File::create(path).with_context(|| format!("Failed to create disk image {:?}", path))?;
    file.set_len(geometry.total_size() as u64)
        .context("Error allocating disk image")?;

    Ok(file)
}
