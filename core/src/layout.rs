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

//! Unit A (layout & header codec) and Unit B (alignment & sizing).
//!
//! The header is the single region of a volume stored in the clear; every
//! field is little-endian and the record is tightly packed. We lean on
//! `zerocopy`'s byte-order wrapper types the way `fs/exfat` leans on them for
//! `BootSector`: each of those types has alignment 1, so a `#[repr(C)]`
//! struct built entirely out of them needs no explicit `packed` attribute to
//! avoid inter-field padding.

use vernamfs_err::{Error, Result};
use zerocopy::little_endian::{U32, U64};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

/// `0x53464d414e524556` — "VERNAMFS" as ASCII, little-endian.
pub const VOLUME_MAGIC: u64 = 0x5346_4d41_4e52_4556;

/// Volume kind: the only variant this crate implements.
pub const VOLUME_TYPE_ENCRYPTED_FAT: u32 = 1;

pub const MIN_TABLE_ENTRY_SIZE: u32 = 32;
pub const MAX_TABLE_ENTRY_SIZE: u32 = 128;
/// `128 - 16 - 1`, the largest name length a 128-byte entry can hold.
pub const MAX_NAME_LENGTH: u32 = MAX_TABLE_ENTRY_SIZE - 16 - 1;
/// Default requested in the original CLI when `-l` is not given (`64 - 17`).
pub const DEFAULT_NAME_LENGTH: u32 = 64 - 16 - 1;

/// Volume header, stored in the clear at offset 0. See spec §3.
#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable)]
pub struct Header {
    pub magic: U64,
    pub volume_type: U32,
    pub version: U32,
    pub flags: U32,
    pub length: U64,
    pub padding: U64,
    pub table_offset: U64,
    pub max_files: U32,
    pub table_entry_size: U32,
    pub table_ptr: U64,
    pub data_offset: U64,
    pub data_ptr: U64,
}

pub const HEADER_SIZE: u64 = size_of::<Header>() as u64;

impl Header {
    pub fn decode(bytes: &[u8]) -> Result<Header> {
        if bytes.len() < HEADER_SIZE as usize {
            return Err(Error::Truncated);
        }
        let header = Header::read_from_bytes(&bytes[..HEADER_SIZE as usize])
            .map_err(|_| Error::BadParams("header bytes do not match the on-disk layout"))?;
        if header.magic.get() != VOLUME_MAGIC {
            return Err(Error::BadMagic);
        }
        Ok(header)
    }

    pub fn encode(&self) -> [u8; HEADER_SIZE as usize] {
        let mut out = [0u8; HEADER_SIZE as usize];
        out.copy_from_slice(self.as_bytes());
        out
    }

    pub fn pack_version(major: u8, minor: u8, patch: u8) -> u32 {
        ((major as u32) << 16) | ((minor as u32) << 8) | patch as u32
    }
}

/// `((v + g - 1) / g) * g`
pub fn align_up(v: u64, g: u64) -> u64 {
    (v + g - 1) / g * g
}

/// Smallest entry size in `{32, 64, 128}` with `s - 17 >= max_name_length`.
pub fn entry_size_for(max_name_length: u32) -> Result<u32> {
    if max_name_length < 1 || max_name_length > MAX_NAME_LENGTH {
        return Err(Error::BadParams("max_name_length must be within [1, 111]"));
    }
    for s in [MIN_TABLE_ENTRY_SIZE, 64, MAX_TABLE_ENTRY_SIZE] {
        if s - 17 >= max_name_length {
            return Ok(s);
        }
    }
    unreachable!("MAX_NAME_LENGTH bounds max_name_length to fit in a 128-byte entry")
}

/// Capacity check performed at `init`: computes `table_offset`, `table_extent`
/// and verifies the volume is large enough, per spec §4.B.
pub struct Capacity {
    pub table_offset: u64,
    pub table_extent: u64,
    pub data_offset: u64,
}

pub fn check_capacity(
    length: u64,
    max_files: u32,
    entry_size: u32,
    padding: u64,
) -> Result<Capacity> {
    let table_offset = align_up(HEADER_SIZE, padding);
    let table_extent = align_up(max_files as u64 * entry_size as u64, padding);
    let min_data_area = max_files as u64 * padding;
    let data_offset = table_offset + table_extent;
    if table_offset + table_extent + min_data_area > length {
        return Err(Error::TooSmall);
    }
    Ok(Capacity {
        table_offset,
        table_extent,
        data_offset,
    })
}
