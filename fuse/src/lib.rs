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

//! `fuser::Filesystem` adapter exposing a single VernamFS volume as a
//! write-only mount point (spec.md §6, SPEC_FULL.md §7).
//!
//! This crate is a thin collaborator: every write-once XOR decision lives in
//! `vernamfs_core::Engine`, this layer only translates kernel requests into
//! engine calls and engine errors into `errno`s.

use std::ffi::OsStr;
use std::time::{Duration, SystemTime};

use fuser::{
    FileAttr, FileType, Filesystem, ReplyAttr, ReplyData, ReplyEmpty, ReplyEntry, ReplyOpen,
    ReplyWrite, Request,
};
use log::{info, warn};
use vernamfs_core::Engine;
use vernamfs_err::Error;
use vernamfs_store::DataStorage;

const ROOT_INO: u64 = 1;
const TTL: Duration = Duration::from_secs(1);

fn root_attr() -> FileAttr {
    let now = SystemTime::now();
    FileAttr {
        ino: ROOT_INO,
        size: 0,
        blocks: 0,
        atime: now,
        mtime: now,
        ctime: now,
        crtime: now,
        kind: FileType::Directory,
        perm: 0o555,
        nlink: 2,
        uid: 0,
        gid: 0,
        rdev: 0,
        blksize: 512,
        flags: 0,
    }
}

/// A file's attributes before it has ever been opened: write-only regular
/// file, zero size (VernamFS never reports sizes, only write-once content).
fn entry_attr(ino: u64) -> FileAttr {
    let now = SystemTime::now();
    FileAttr {
        ino,
        size: 0,
        blocks: 0,
        atime: now,
        mtime: now,
        ctime: now,
        crtime: now,
        kind: FileType::RegularFile,
        perm: 0o200,
        nlink: 1,
        uid: 0,
        gid: 0,
        rdev: 0,
        blksize: 512,
        flags: 0,
    }
}

/// Maps an engine error to the `errno` the kernel should see.
fn errno_for(err: &Error) -> libc::c_int {
    match err {
        Error::Busy => libc::EBUSY,
        Error::ReadOnlyRequested => libc::EACCES,
        Error::NoSpace => libc::ENOSPC,
        Error::NameTooLong => libc::ENAMETOOLONG,
        Error::Unsupported => libc::ENOSYS,
        _ => libc::EIO,
    }
}

/// Exposes one VernamFS volume over FUSE.
///
/// Inode numbers past the root are assigned on the fly, one per
/// `lookup`/`open` call on a path that hasn't been seen yet, and never
/// reused; VernamFS has no delete, so collisions cannot arise.
pub struct VernamFuse<S: DataStorage> {
    engine: Engine<S>,
    next_ino: u64,
    paths: Vec<(u64, String)>,
}

impl<S: DataStorage> VernamFuse<S> {
    pub fn new(engine: Engine<S>) -> Self {
        Self {
            engine,
            next_ino: 2,
            paths: Vec::new(),
        }
    }

    fn ino_for(&mut self, name: &str) -> u64 {
        if let Some((ino, _)) = self.paths.iter().find(|(_, n)| n == name) {
            return *ino;
        }
        let ino = self.next_ino;
        self.next_ino += 1;
        self.paths.push((ino, name.to_string()));
        ino
    }

    fn path_for(&self, ino: u64) -> Option<&str> {
        self.paths
            .iter()
            .find(|(i, _)| *i == ino)
            .map(|(_, n)| n.as_str())
    }
}

impl<S: DataStorage> Filesystem for VernamFuse<S> {
    fn lookup(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEntry) {
        if parent != ROOT_INO {
            reply.error(libc::ENOENT);
            return;
        }
        let Some(name) = name.to_str() else {
            reply.error(libc::EINVAL);
            return;
        };
        let ino = self.ino_for(name);
        reply.entry(&TTL, &entry_attr(ino), 0);
    }

    fn getattr(&mut self, _req: &Request<'_>, ino: u64, _fh: Option<u64>, reply: ReplyAttr) {
        if ino == ROOT_INO {
            reply.attr(&TTL, &root_attr());
        } else if self.path_for(ino).is_some() {
            reply.attr(&TTL, &entry_attr(ino));
        } else {
            reply.error(libc::ENOENT);
        }
    }

    fn open(&mut self, _req: &Request<'_>, ino: u64, flags: i32, reply: ReplyOpen) {
        let access_mode = flags & libc::O_ACCMODE;
        if access_mode != libc::O_WRONLY {
            warn!("open requested with non-write-only flags on ino {ino}");
            reply.error(errno_for(&Error::ReadOnlyRequested));
            return;
        }
        let Some(path) = self.path_for(ino).map(str::to_string) else {
            reply.error(libc::ENOENT);
            return;
        };
        match self.engine.open_entry(&format!("/{path}")) {
            Ok(()) => reply.opened(0, 0),
            Err(err) => reply.error(errno_for(&err)),
        }
    }

    fn write(
        &mut self,
        _req: &Request<'_>,
        _ino: u64,
        _fh: u64,
        _offset: i64,
        data: &[u8],
        _write_flags: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyWrite,
    ) {
        match self.engine.write(data) {
            Ok(n) => reply.written(n as u32),
            Err(err) => reply.error(errno_for(&err)),
        }
    }

    fn release(
        &mut self,
        _req: &Request<'_>,
        _ino: u64,
        _fh: u64,
        _flags: i32,
        _lock_owner: Option<u64>,
        _flush: bool,
        reply: ReplyEmpty,
    ) {
        match self.engine.close_entry().and_then(|()| self.engine.persist_header()) {
            Ok(()) => reply.ok(),
            Err(err) => reply.error(errno_for(&err)),
        }
    }

    fn read(
        &mut self,
        _req: &Request<'_>,
        _ino: u64,
        _fh: u64,
        _offset: i64,
        _size: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyData,
    ) {
        info!("read is not supported: VernamFS is write-only from the remote side");
        reply.error(errno_for(&Error::Unsupported));
    }

    fn readdir(
        &mut self,
        _req: &Request<'_>,
        _ino: u64,
        _fh: u64,
        _offset: i64,
        reply: fuser::ReplyDirectory,
    ) {
        reply.error(errno_for(&Error::Unsupported));
    }

    fn unlink(&mut self, _req: &Request<'_>, _parent: u64, _name: &OsStr, reply: ReplyEmpty) {
        reply.error(errno_for(&Error::Unsupported));
    }

    fn mkdir(
        &mut self,
        _req: &Request<'_>,
        _parent: u64,
        _name: &OsStr,
        _mode: u32,
        _umask: u32,
        reply: ReplyEntry,
    ) {
        reply.error(errno_for(&Error::Unsupported));
    }

    fn rename(
        &mut self,
        _req: &Request<'_>,
        _parent: u64,
        _name: &OsStr,
        _newparent: u64,
        _newname: &OsStr,
        _flags: u32,
        reply: ReplyEmpty,
    ) {
        reply.error(errno_for(&Error::Unsupported));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vernamfs_store::MappedStore;

    fn scratch_engine() -> (tempfile::TempDir, Engine<MappedStore>) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("otp.img");
        std::fs::write(&path, vec![0u8; 65536]).unwrap();
        let store = MappedStore::open(&path, 65536).unwrap();
        let engine = Engine::init(store, 4, 15, true).unwrap();
        (dir, engine)
    }

    #[test]
    fn ino_for_is_stable_across_repeated_lookups() {
        let (_dir, engine) = scratch_engine();
        let mut fs = VernamFuse::new(engine);
        let first = fs.ino_for("msg");
        let second = fs.ino_for("msg");
        assert_eq!(first, second);
        assert_ne!(first, ROOT_INO);
    }

    #[test]
    fn errno_mapping_matches_spec_error_table() {
        assert_eq!(errno_for(&Error::Busy), libc::EBUSY);
        assert_eq!(errno_for(&Error::ReadOnlyRequested), libc::EACCES);
        assert_eq!(errno_for(&Error::NoSpace), libc::ENOSPC);
        assert_eq!(errno_for(&Error::Unsupported), libc::ENOSYS);
    }
}
