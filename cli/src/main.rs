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

//! Command-line front end for VernamFS volumes.
//!
//! Every subcommand is a thin call into `vernamfs_core` (or `vernamfs_fuse`
//! for `mount`); this binary owns argument parsing and process exit codes
//! only.

mod generate;

use std::io::{self, Write};
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use log::error;
use vernamfs_core::{
    decode_fat, decode_range, info, payload_read, payload_write, recover_all, remote_cat,
    remote_list, Engine,
};
use vernamfs_err::Result;
use vernamfs_store::MappedStore;

#[derive(Parser)]
#[command(name = "vernamfs", about = "A write-only, append-only one-time-pad filesystem")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Lay down a fresh volume header on an existing one-time-pad file.
    Init {
        file: PathBuf,
        #[arg(long, default_value_t = 16)]
        max_files: u32,
        #[arg(long)]
        max_name_length: Option<u32>,
        #[arg(long)]
        force: bool,
    },
    /// Print a volume's header fields.
    Info {
        file: PathBuf,
        #[arg(long)]
        expert: bool,
        /// Hex-dump the raw table region instead of decoding it.
        #[arg(long)]
        raw_table: bool,
    },
    /// Mount a volume at `mountpoint`, exposing it as a write-only directory.
    Mount { file: PathBuf, mountpoint: PathBuf },
    /// Emit the remote's allocated FAT region as a payload on stdout.
    Rls { file: PathBuf },
    /// Decode an `rls` payload against a vault image.
    Vls {
        vault: PathBuf,
        #[arg(long)]
        entry_size: Option<u32>,
        /// Read the rls payload from this file instead of stdin.
        rls_result: Option<PathBuf>,
    },
    /// Emit a byte range of the remote as a payload on stdout.
    Rcat {
        file: PathBuf,
        offset: u64,
        length: u64,
    },
    /// Decode an `rcat` payload against a vault image.
    Vcat {
        vault: PathBuf,
        /// Read the rcat payload from this file instead of stdin.
        rcat_result: Option<PathBuf>,
    },
    /// Reconstruct every file from a remote image and its vault pad.
    Recover {
        remote: PathBuf,
        vault: PathBuf,
        output_dir: PathBuf,
    },
    /// Write a pseudo-random one-time pad, keyed by a hex AES-128 key.
    Generate {
        #[arg(long)]
        key_hex: String,
        /// Output size as a power of two, e.g. 20 for 1MiB.
        #[arg(long)]
        log2_size: u32,
        output: Option<PathBuf>,
    },
}

fn main() -> ExitCode {
    env_logger::init();
    let cli = Cli::parse();
    match run(cli.command) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{err}");
            eprintln!("vernamfs: {err}");
            ExitCode::FAILURE
        }
    }
}

fn run(command: Command) -> Result<()> {
    match command {
        Command::Init {
            file,
            max_files,
            max_name_length,
            force,
        } => cmd_init(file, max_files, max_name_length, force),
        Command::Info {
            file,
            expert,
            raw_table,
        } => cmd_info(file, expert, raw_table),
        Command::Mount { file, mountpoint } => cmd_mount(file, mountpoint),
        Command::Rls { file } => cmd_rls(file),
        Command::Vls {
            vault,
            entry_size,
            rls_result,
        } => cmd_vls(vault, entry_size, rls_result),
        Command::Rcat {
            file,
            offset,
            length,
        } => cmd_rcat(file, offset, length),
        Command::Vcat { vault, rcat_result } => cmd_vcat(vault, rcat_result),
        Command::Recover {
            remote,
            vault,
            output_dir,
        } => cmd_recover(remote, vault, output_dir),
        Command::Generate {
            key_hex,
            log2_size,
            output,
        } => generate::run(&key_hex, log2_size, output.as_deref()),
    }
}

fn cmd_init(file: PathBuf, max_files: u32, max_name_length: Option<u32>, force: bool) -> Result<()> {
    let len = std::fs::metadata(&file)?.len();
    let store = MappedStore::open(&file, len)?;
    let max_name_length = max_name_length.unwrap_or(vernamfs_core::layout::DEFAULT_NAME_LENGTH);
    let engine = Engine::init(store, max_files, max_name_length, force)?;
    println!(
        "initialized {} ({} bytes, {} files, table at {})",
        file.display(),
        engine.header().length.get(),
        engine.header().max_files.get(),
        engine.header().table_offset.get()
    );
    Ok(())
}

fn cmd_info(file: PathBuf, expert: bool, raw_table: bool) -> Result<()> {
    let len = std::fs::metadata(&file)?.len();
    let store = MappedStore::open(&file, len)?;
    let engine = Engine::open(store)?;
    let header = engine.header();

    if raw_table {
        let payload = remote_list(header, engine.store())?;
        println!("{}", hex::encode(&payload.data));
        return Ok(());
    }

    if expert {
        println!("{}", info::ExpertReport(header));
    } else {
        println!("{}", info::Summary::from_header(header));
    }
    Ok(())
}

fn cmd_mount(file: PathBuf, mountpoint: PathBuf) -> Result<()> {
    let len = std::fs::metadata(&file)?.len();
    let store = MappedStore::open(&file, len)?;
    let engine = Engine::open(store)?;
    let fs = vernamfs_fuse::VernamFuse::new(engine);
    fuser::mount2(fs, &mountpoint, &[]).map_err(vernamfs_err::Error::Io)
}

fn cmd_rls(file: PathBuf) -> Result<()> {
    let len = std::fs::metadata(&file)?.len();
    let store = MappedStore::open(&file, len)?;
    let engine = Engine::open(store)?;
    let payload = remote_list(engine.header(), engine.store())?;
    payload_write(io::stdout().lock(), &payload)
}

fn cmd_vls(vault: PathBuf, entry_size: Option<u32>, rls_result: Option<PathBuf>) -> Result<()> {
    let payload = read_payload(rls_result)?;
    let entry_size = match entry_size {
        Some(size) => size,
        None => vernamfs_core::layout::entry_size_for(vernamfs_core::layout::DEFAULT_NAME_LENGTH)?,
    };
    let len = std::fs::metadata(&vault)?.len();
    let vault_store = MappedStore::open(&vault, len)?;
    let entries = decode_fat(&vault_store, entry_size, &payload)?;
    for entry in entries {
        println!("{}\t{}\t{}", entry.name, entry.offset, entry.length);
    }
    Ok(())
}

fn cmd_rcat(file: PathBuf, offset: u64, length: u64) -> Result<()> {
    let len = std::fs::metadata(&file)?.len();
    let store = MappedStore::open(&file, len)?;
    let payload = remote_cat(&store, offset, length)?;
    payload_write(io::stdout().lock(), &payload)
}

fn cmd_vcat(vault: PathBuf, rcat_result: Option<PathBuf>) -> Result<()> {
    let payload = read_payload(rcat_result)?;
    let len = std::fs::metadata(&vault)?.len();
    let vault_store = MappedStore::open(&vault, len)?;
    let plain = decode_range(&vault_store, &payload)?;
    io::stdout().lock().write_all(&plain)?;
    Ok(())
}

fn cmd_recover(remote: PathBuf, vault: PathBuf, output_dir: PathBuf) -> Result<()> {
    let remote_len = std::fs::metadata(&remote)?.len();
    let vault_len = std::fs::metadata(&vault)?.len();
    let remote_store = MappedStore::open(&remote, remote_len)?;
    let vault_store = MappedStore::open(&vault, vault_len)?;
    let recovered = recover_all(&remote_store, &vault_store, &output_dir)?;
    println!("recovered {recovered} file(s) into {}", output_dir.display());
    Ok(())
}

fn read_payload(path: Option<PathBuf>) -> Result<vernamfs_core::RemotePayload> {
    match path {
        Some(path) => payload_read(std::fs::File::open(path)?),
        None => payload_read(io::stdin().lock()),
    }
}
