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

//! On-disk layout, write engine, remote-payload framing and recovery for
//! VernamFS volumes. No I/O surface of its own; callers supply a
//! `vernamfs_store::DataStorage` and drive the engine.

pub mod engine;
pub mod info;
pub mod layout;
pub mod remote;
pub mod vault;

pub use engine::{default_padding, Engine};
pub use layout::{Capacity, Header, HEADER_SIZE, VOLUME_MAGIC, VOLUME_TYPE_ENCRYPTED_FAT};
pub use remote::{payload_read, payload_write, remote_cat, remote_list, RemotePayload};
pub use vault::{decode_fat, decode_range, recover_all, FatEntry};
