// Copyright 2024 Kevin Ludwig
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Backing-store abstraction for a VernamFS volume.
//!
//! A volume's backing store is a file or block device, memory-mapped
//! read/write. The engine never performs unchecked pointer math; every
//! access here is bounds-checked against the mapping's length.

use std::fs::{File, OpenOptions};
use std::path::Path;

use log::debug;
use memmap2::MmapMut;
use vernamfs_err::{Error, Result};

/// A bounds-checked view over a backing image.
///
/// `write_at` overwrites bytes in place (used for the plaintext header).
/// `xor_in_at` XORs the supplied bytes into the backing image (used for the
/// FAT and data regions, preserving the one-time-pad property as long as
/// each byte offset is XORed at most once over the volume's lifetime).
pub trait DataStorage {
    fn len(&self) -> u64;

    fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<()>;

    fn write_at(&mut self, offset: u64, buf: &[u8]) -> Result<()>;

    fn xor_in_at(&mut self, offset: u64, buf: &[u8]) -> Result<()>;

    fn flush(&mut self) -> Result<()>;
}

/// A memory-mapped file or block device backing a volume.
pub struct MappedStore {
    file: File,
    map: MmapMut,
}

impl MappedStore {
    /// Opens `path` read/write and maps the first `len` bytes, growing a
    /// plain file to `len` if it is shorter. Block devices are expected to
    /// already be at least `len` bytes and are never truncated or grown.
    pub fn open(path: impl AsRef<Path>, len: u64) -> Result<Self> {
        let path = path.as_ref();
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        if file.metadata()?.len() < len {
            file.set_len(len)?;
        }
        let map = unsafe { MmapMut::map_mut(&file)? };
        debug!("mapped {} ({} bytes)", path.display(), map.len());
        Ok(Self { file, map })
    }

    /// Maps the whole of an already-sized file or device.
    pub fn open_existing(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        let map = unsafe { MmapMut::map_mut(&file)? };
        Ok(Self { file, map })
    }

    fn check_bounds(&self, offset: u64, len: usize) -> Result<()> {
        let end = offset
            .checked_add(len as u64)
            .ok_or(Error::BadParams("offset + length overflows u64"))?;
        if end > self.map.len() as u64 {
            return Err(Error::BadParams("access out of bounds of the backing store"));
        }
        Ok(())
    }
}

impl DataStorage for MappedStore {
    fn len(&self) -> u64 {
        self.map.len() as u64
    }

    fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<()> {
        self.check_bounds(offset, buf.len())?;
        let start = offset as usize;
        buf.copy_from_slice(&self.map[start..start + buf.len()]);
        Ok(())
    }

    fn write_at(&mut self, offset: u64, buf: &[u8]) -> Result<()> {
        self.check_bounds(offset, buf.len())?;
        let start = offset as usize;
        self.map[start..start + buf.len()].copy_from_slice(buf);
        Ok(())
    }

    fn xor_in_at(&mut self, offset: u64, buf: &[u8]) -> Result<()> {
        self.check_bounds(offset, buf.len())?;
        let start = offset as usize;
        for (dst, src) in self.map[start..start + buf.len()].iter_mut().zip(buf) {
            *dst ^= *src;
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        self.map.flush()?;
        self.file.sync_data()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn scratch(len: u64) -> (tempfile::TempDir, std::path::PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("otp.img");
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(&vec![0u8; len as usize]).unwrap();
        (dir, path)
    }

    #[test]
    fn xor_in_at_toggles_bytes_exactly_once() {
        let (_dir, path) = scratch(64);
        let mut store = MappedStore::open(&path, 64).unwrap();
        store.xor_in_at(8, &[0xFF, 0x0F]).unwrap();
        let mut buf = [0u8; 2];
        store.read_at(8, &mut buf).unwrap();
        assert_eq!(buf, [0xFF, 0x0F]);
        store.xor_in_at(8, &[0xFF, 0x0F]).unwrap();
        store.read_at(8, &mut buf).unwrap();
        assert_eq!(buf, [0x00, 0x00]);
    }

    #[test]
    fn out_of_bounds_access_is_rejected() {
        let (_dir, path) = scratch(16);
        let store = MappedStore::open(&path, 16).unwrap();
        let mut buf = [0u8; 4];
        assert!(store.read_at(14, &mut buf).is_err());
    }

    #[test]
    fn write_at_overwrites_rather_than_xors() {
        let (_dir, path) = scratch(16);
        let mut store = MappedStore::open(&path, 16).unwrap();
        store.write_at(0, &[1, 2, 3, 4]).unwrap();
        store.write_at(0, &[9, 9, 9, 9]).unwrap();
        let mut buf = [0u8; 4];
        store.read_at(0, &mut buf).unwrap();
        assert_eq!(buf, [9, 9, 9, 9]);
    }
}
