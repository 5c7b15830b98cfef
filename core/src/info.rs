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

//! Supplementary `info` / `info --expert` reporting, carried over from the
//! original's `info.c` (plain) and `-e` flag (expert) since neither is
//! excluded by the non-goals.

use std::fmt;

use crate::layout::Header;

/// Plain summary: the fields an operator needs to decide whether a volume
/// has room left, nothing more.
pub struct Summary {
    pub length: u64,
    pub max_files: u32,
    pub files_used: u32,
    pub data_used: u64,
    pub data_total: u64,
}

impl Summary {
    pub fn from_header(header: &Header) -> Self {
        let entry_size = header.table_entry_size.get() as u64;
        let files_used = ((header.table_ptr.get() - header.table_offset.get()) / entry_size) as u32;
        Self {
            length: header.length.get(),
            max_files: header.max_files.get(),
            files_used,
            data_used: header.data_ptr.get() - header.data_offset.get(),
            data_total: header.length.get() - header.data_offset.get(),
        }
    }
}

impl fmt::Display for Summary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "length:     {}", self.length)?;
        writeln!(f, "files:      {}/{}", self.files_used, self.max_files)?;
        write!(f, "data used:  {}/{}", self.data_used, self.data_total)
    }
}

/// `--expert`: every header field, raw. Grounded on the original's `-e`
/// flag in `init.c`/`cmds.h`, which dumps the full struct rather than a
/// derived summary.
pub struct ExpertReport<'a>(pub &'a Header);

impl fmt::Display for ExpertReport<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let h = self.0;
        writeln!(f, "magic:            {:#018x}", h.magic.get())?;
        writeln!(f, "volume_type:      {}", h.volume_type.get())?;
        writeln!(
            f,
            "version:          {}.{}.{}",
            h.version.get() >> 16,
            (h.version.get() >> 8) & 0xff,
            h.version.get() & 0xff
        )?;
        writeln!(f, "flags:            {:#010x}", h.flags.get())?;
        writeln!(f, "length:           {}", h.length.get())?;
        writeln!(f, "padding:          {}", h.padding.get())?;
        writeln!(f, "table_offset:     {}", h.table_offset.get())?;
        writeln!(f, "max_files:        {}", h.max_files.get())?;
        writeln!(f, "table_entry_size: {}", h.table_entry_size.get())?;
        writeln!(f, "table_ptr:        {}", h.table_ptr.get())?;
        writeln!(f, "data_offset:      {}", h.data_offset.get())?;
        write!(f, "data_ptr:         {}", h.data_ptr.get())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::{Header, VOLUME_TYPE_ENCRYPTED_FAT, VOLUME_MAGIC};

    fn sample_header() -> Header {
        Header {
            magic: VOLUME_MAGIC.into(),
            volume_type: VOLUME_TYPE_ENCRYPTED_FAT.into(),
            version: Header::pack_version(1, 0, 0).into(),
            flags: 0.into(),
            length: 65536u64.into(),
            padding: 4096u64.into(),
            table_offset: 4096u64.into(),
            max_files: 4u32.into(),
            table_entry_size: 32u32.into(),
            table_ptr: (4096 + 32).into(),
            data_offset: 8192u64.into(),
            data_ptr: (8192 + 6).into(),
        }
    }

    #[test]
    fn summary_reports_one_used_file_and_slot() {
        let header = sample_header();
        let summary = Summary::from_header(&header);
        assert_eq!(summary.files_used, 1);
        assert_eq!(summary.max_files, 4);
        assert_eq!(summary.data_used, 6);
        assert_eq!(summary.data_total, 65536 - 8192);
    }

    #[test]
    fn expert_report_prints_raw_version_triplet() {
        let header = sample_header();
        let report = ExpertReport(&header).to_string();
        assert!(report.contains("version:          1.0.0"));
    }
}
