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

//! `vernamfs generate`: writes a pseudo-random one-time pad keyed by an
//! AES-128-CTR keystream, a stand-in for whatever PRNG a caller already
//! trusts. VernamFS itself never calls this; it only ever consumes bytes
//! that already exist on disk.

use std::io::Write;
use std::path::Path;

use aes::Aes128;
use cipher::{KeyIvInit, StreamCipher};
use vernamfs_err::{Error, Result};

type Aes128Ctr = ctr::Ctr128BE<Aes128>;

const CHUNK: usize = 1 << 20;

pub fn run(key_hex: &str, log2_size: u32, output: Option<&Path>) -> Result<()> {
    let key_bytes = hex::decode(key_hex).map_err(|_| Error::BadParams("key must be hex-encoded"))?;
    if key_bytes.len() != 16 {
        return Err(Error::BadParams("key must decode to exactly 16 bytes (AES-128)"));
    }
    if log2_size > 40 {
        return Err(Error::BadParams("log2_size is unreasonably large"));
    }

    let total = 1u64 << log2_size;
    let nonce = [0u8; 16];
    let mut cipher = Aes128Ctr::new(key_bytes.as_slice().into(), (&nonce).into());

    let mut sink: Box<dyn Write> = match output {
        Some(path) => Box::new(std::fs::File::create(path)?),
        None => Box::new(std::io::stdout().lock()),
    };

    let mut remaining = total;
    while remaining > 0 {
        let n = remaining.min(CHUNK as u64) as usize;
        let mut buf = vec![0u8; n];
        cipher.apply_keystream(&mut buf);
        sink.write_all(&buf)?;
        remaining -= n as u64;
    }
    Ok(())
}
