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

//! Unit D: remote-payload framing.
//!
//! A payload is `{offset: u64, length: u64, data: [u8; length]}`, written
//! and read byte-exact, little-endian, with no framing besides the leading
//! two integers — the wire format the original's `VFSRemoteResult` uses.

use std::io::{Read, Write};

use vernamfs_err::{Error, Result};
use vernamfs_store::DataStorage;

use crate::layout::Header;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemotePayload {
    pub offset: u64,
    pub length: u64,
    pub data: Vec<u8>,
}

pub fn payload_read<R: Read>(mut stream: R) -> Result<RemotePayload> {
    let offset = read_u64(&mut stream)?;
    let length = read_u64(&mut stream)?;
    let mut data = vec![0u8; length as usize];
    stream.read_exact(&mut data).map_err(|_| Error::Truncated)?;
    Ok(RemotePayload {
        offset,
        length,
        data,
    })
}

pub fn payload_write<W: Write>(mut stream: W, payload: &RemotePayload) -> Result<()> {
    stream.write_all(&payload.offset.to_le_bytes())?;
    stream.write_all(&payload.length.to_le_bytes())?;
    stream.write_all(&payload.data)?;
    Ok(())
}

fn read_u64<R: Read>(stream: &mut R) -> Result<u64> {
    let mut buf = [0u8; 8];
    stream.read_exact(&mut buf).map_err(|_| Error::Truncated)?;
    Ok(u64::from_le_bytes(buf))
}

/// `rls`: emits the whole allocated portion of the FAT.
pub fn remote_list<S: DataStorage>(header: &Header, store: &S) -> Result<RemotePayload> {
    let offset = header.table_offset.get();
    let length = header.table_ptr.get() - offset;
    let mut data = vec![0u8; length as usize];
    store.read_at(offset, &mut data)?;
    Ok(RemotePayload {
        offset,
        length,
        data,
    })
}

/// `rcat`: emits a caller-chosen byte range from the volume.
pub fn remote_cat<S: DataStorage>(store: &S, offset: u64, length: u64) -> Result<RemotePayload> {
    let mut data = vec![0u8; length as usize];
    store.read_at(offset, &mut data)?;
    Ok(RemotePayload {
        offset,
        length,
        data,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn payload_round_trips_through_write_read() {
        let payload = RemotePayload {
            offset: 4096,
            length: 3,
            data: vec![1, 2, 3],
        };
        let mut buf = Vec::new();
        payload_write(&mut buf, &payload).unwrap();
        let decoded = payload_read(Cursor::new(buf)).unwrap();
        assert_eq!(decoded, payload);
    }

    #[test]
    fn payload_read_reports_truncated_on_short_data() {
        let mut buf = Vec::new();
        buf.extend_from_slice(&0u64.to_le_bytes());
        buf.extend_from_slice(&10u64.to_le_bytes());
        buf.extend_from_slice(&[1, 2, 3]); // fewer than 10 bytes
        assert!(matches!(
            payload_read(Cursor::new(buf)),
            Err(Error::Truncated)
        ));
    }
}
