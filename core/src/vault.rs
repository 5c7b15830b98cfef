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

//! Unit E: vault-side reconstruction.
//!
//! The vault is a pristine copy of the one-time pad: it carries no header of
//! its own, only the same byte offsets the remote's header already points
//! into. Recovery XORs a remote payload (or the remote image directly)
//! against the vault at those same offsets.

use std::fs;
use std::path::Path;

use vernamfs_err::{Error, Result};
use vernamfs_store::DataStorage;

use crate::layout::Header;
use crate::remote::RemotePayload;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FatEntry {
    pub name: String,
    pub offset: u64,
    pub length: u64,
}

/// `decode_fat(vault_image, payload)` from spec §4.E.
///
/// `entry_size` is supplied by the caller (it is not recoverable from the
/// vault alone); `vls` takes it as a flag defaulting to the table entry size
/// used by `init`.
pub fn decode_fat<S: DataStorage>(vault: &S, entry_size: u32, payload: &RemotePayload) -> Result<Vec<FatEntry>> {
    let entry_size = entry_size as u64;
    if entry_size == 0 || payload.length % entry_size != 0 {
        return Err(Error::BadParams("payload length is not a multiple of the table entry size"));
    }
    if payload.offset + payload.length > vault.len() {
        return Err(Error::TooSmall);
    }

    let count = payload.length / entry_size;
    let mut entries = Vec::with_capacity(count as usize);
    for i in 0..count {
        let start = (i * entry_size) as usize;
        let end = start + entry_size as usize;
        let ciphertext = &payload.data[start..end];

        let mut plain = vec![0u8; entry_size as usize];
        vault.read_at(payload.offset + i * entry_size, &mut plain)?;
        for (p, c) in plain.iter_mut().zip(ciphertext) {
            *p ^= *c;
        }

        let offset = u64::from_le_bytes(plain[0..8].try_into().unwrap());
        let length = u64::from_le_bytes(plain[8..16].try_into().unwrap());
        let name = nul_terminated_name(&plain[16..]);
        entries.push(FatEntry {
            name,
            offset,
            length,
        });
    }
    Ok(entries)
}

/// `decode_range(vault_image, payload)` from spec §4.E.
pub fn decode_range<S: DataStorage>(vault: &S, payload: &RemotePayload) -> Result<Vec<u8>> {
    if payload.offset + payload.length > vault.len() {
        return Err(Error::TooSmall);
    }
    let mut plain = vec![0u8; payload.length as usize];
    vault.read_at(payload.offset, &mut plain)?;
    for (p, c) in plain.iter_mut().zip(&payload.data) {
        *p ^= *c;
    }
    Ok(plain)
}

/// `recover_all(remote_image, vault_image, output_dir)` from spec §4.E.
///
/// Reads the header directly off the remote image (the vault never carries
/// one), decodes every allocated FAT entry against the vault, and writes
/// recovered content under `output_dir`. Duplicate names are appended to the
/// same output file, in FAT order.
pub fn recover_all<R: DataStorage, V: DataStorage>(
    remote: &R,
    vault: &V,
    output_dir: impl AsRef<Path>,
) -> Result<usize> {
    let mut header_bytes = [0u8; crate::layout::HEADER_SIZE as usize];
    remote.read_at(0, &mut header_bytes)?;
    let header = Header::decode(&header_bytes)?;

    if header.table_offset.get() + header.max_files.get() as u64 * header.table_entry_size.get() as u64
        > vault.len()
    {
        return Err(Error::Mismatch);
    }

    let output_dir = output_dir.as_ref();
    fs::create_dir_all(output_dir)?;

    let entry_size = header.table_entry_size.get() as u64;
    let table_offset = header.table_offset.get();
    let allocated = (header.table_ptr.get() - table_offset) / entry_size;

    let mut recovered = 0usize;
    for i in 0..allocated {
        let entry_offset = table_offset + i * entry_size;

        let mut cipher = vec![0u8; entry_size as usize];
        remote.read_at(entry_offset, &mut cipher)?;
        let mut plain = vec![0u8; entry_size as usize];
        vault.read_at(entry_offset, &mut plain)?;
        for (p, c) in plain.iter_mut().zip(&cipher) {
            *p ^= *c;
        }

        let content_offset = u64::from_le_bytes(plain[0..8].try_into().unwrap());
        let content_length = u64::from_le_bytes(plain[8..16].try_into().unwrap());
        let name = nul_terminated_name(&plain[16..]);
        if name.is_empty() {
            log::warn!("FAT entry {i} has no recoverable name; skipping");
            continue;
        }

        let mut cipher = vec![0u8; content_length as usize];
        remote.read_at(content_offset, &mut cipher)?;
        let mut plain = vec![0u8; content_length as usize];
        vault.read_at(content_offset, &mut plain)?;
        for (p, c) in plain.iter_mut().zip(&cipher) {
            *p ^= *c;
        }

        let relative = name.strip_prefix('/').unwrap_or(&name);
        let out_path = output_dir.join(relative);
        if let Some(parent) = out_path.parent() {
            fs::create_dir_all(parent)?;
        }
        use std::io::Write;
        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&out_path)?;
        file.write_all(&plain)?;
        recovered += 1;
    }
    Ok(recovered)
}

fn nul_terminated_name(bytes: &[u8]) -> String {
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    String::from_utf8_lossy(&bytes[..end]).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::Engine;
    use crate::layout::VOLUME_MAGIC;
    use crate::remote::remote_list;
    use vernamfs_store::MappedStore;

    fn dual_volume(len: u64) -> (tempfile::TempDir, std::path::PathBuf, std::path::PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let pad: Vec<u8> = (0..len).map(|i| (i * 2654435761 % 256) as u8).collect();
        let remote_path = dir.path().join("remote.img");
        let vault_path = dir.path().join("vault.img");
        std::fs::write(&remote_path, &pad).unwrap();
        std::fs::write(&vault_path, &pad).unwrap();
        (dir, remote_path, vault_path)
    }

    #[test]
    fn single_file_round_trip_matches_spec_scenario_2() {
        let (_dir, remote_path, vault_path) = dual_volume(65536);

        let remote_store = MappedStore::open(&remote_path, 65536).unwrap();
        let mut engine = Engine::init(remote_store, 4, 15, true).unwrap();
        engine.open_entry("/msg").unwrap();
        engine.write(b"hello\n").unwrap();
        engine.close_entry().unwrap();
        engine.persist_header().unwrap();
        let remote_header = *engine.header();
        let remote_store = engine.into_store();

        let payload = remote_list(&remote_header, &remote_store).unwrap();
        assert_eq!(payload.offset, 4096);
        assert_eq!(payload.length, 32);

        let vault_store = MappedStore::open(&vault_path, 65536).unwrap();
        let entries = decode_fat(&vault_store, remote_header.table_entry_size.get(), &payload).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].name, "/msg");
        assert_eq!(entries[0].offset, 8192);
        assert_eq!(entries[0].length, 6);

        let cat_payload = crate::remote::remote_cat(&remote_store, 8192, 6).unwrap();
        let plain = decode_range(&vault_store, &cat_payload).unwrap();
        assert_eq!(plain, b"hello\n");
        assert_eq!(remote_header.magic.get(), VOLUME_MAGIC);
    }

    #[test]
    fn recover_all_appends_duplicate_names_in_fat_order() {
        let (dir, remote_path, vault_path) = dual_volume(65536);

        let remote_store = MappedStore::open(&remote_path, 65536).unwrap();
        let mut engine = Engine::init(remote_store, 4, 15, true).unwrap();
        engine.open_entry("/log").unwrap();
        engine.write(b"A").unwrap();
        engine.close_entry().unwrap();
        engine.open_entry("/log").unwrap();
        engine.write(b"BB").unwrap();
        engine.close_entry().unwrap();
        engine.persist_header().unwrap();
        let remote_store = engine.into_store();

        let vault_store = MappedStore::open(&vault_path, 65536).unwrap();
        let out_dir = dir.path().join("out");
        let recovered = recover_all(&remote_store, &vault_store, &out_dir).unwrap();
        assert_eq!(recovered, 2);

        let content = std::fs::read(out_dir.join("log")).unwrap();
        assert_eq!(content, b"ABB");
    }

    #[test]
    fn recover_all_rejects_vault_too_small_for_remote_layout() {
        let (dir, remote_path, _vault_path) = dual_volume(65536);
        let small_vault_path = dir.path().join("small_vault.img");
        std::fs::write(&small_vault_path, vec![0u8; 1024]).unwrap();

        let remote_store = MappedStore::open(&remote_path, 65536).unwrap();
        let mut engine = Engine::init(remote_store, 4, 15, true).unwrap();
        engine.persist_header().unwrap();
        let remote_store = engine.into_store();

        let vault_store = MappedStore::open(&small_vault_path, 1024).unwrap();
        let out_dir = dir.path().join("out");
        assert!(matches!(
            recover_all(&remote_store, &vault_store, &out_dir),
            Err(Error::Mismatch)
        ));
    }

    #[test]
    fn decode_fat_rejects_vault_too_small_for_payload() {
        let (dir, _remote_path, _vault_path) = dual_volume(65536);
        let small_vault_path = dir.path().join("small_vault.img");
        std::fs::write(&small_vault_path, vec![0u8; 16]).unwrap();

        let vault_store = MappedStore::open(&small_vault_path, 16).unwrap();
        let payload = RemotePayload {
            offset: 4096,
            length: 32,
            data: vec![0u8; 32],
        };
        assert!(matches!(
            decode_fat(&vault_store, 32, &payload),
            Err(Error::TooSmall)
        ));
    }
}
