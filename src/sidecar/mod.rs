//! Sidecar recovery files written next to patched binaries

mod types;

use std::fs;
use std::path::Path;

pub use types::SidecarRecord;
pub use types::HEADER_SIZE_32;
pub use types::HEADER_SIZE_64;

use crate::elf::entry_window;
use crate::elf::parse_elf;
use crate::elf::restore_interp;
use crate::elf::write_window;
use crate::elf::ElfClass;
use crate::elf::ElfInfo;
use crate::elf::PT_NULL;
use crate::error::ElfError;
use crate::error::PatchError;
use crate::patch::write_atomically;

/// Mode of sidecar files
pub const SIDECAR_MODE: u32 = 0o644;

/// Write `record` to `path`, world-readable
///
/// The file appears complete or not at all.
pub fn write_sidecar(path: &Path, record: &SidecarRecord) -> Result<(), PatchError> {
    let bytes = record.encode()?;
    write_atomically(path, &bytes, SIDECAR_MODE)
}

/// Read a sidecar written for an image of the given class
pub fn read_sidecar(path: &Path, class: ElfClass) -> Result<SidecarRecord, PatchError> {
    let bytes = fs::read(path)?;
    Ok(SidecarRecord::decode(&bytes, class)?)
}

/// The PT_NULL header that used to be PT_INTERP
///
/// Its segment still covers the old interpreter string.
fn former_interp(data: &[u8], info: &ElfInfo) -> Option<usize> {
    info.segments
        .iter()
        .filter(|s| s.p_type == PT_NULL && s.filesz > 1)
        .find(|s| {
            let start = usize::try_from(s.offset).ok();
            let end = start.and_then(|st| st.checked_add(usize::try_from(s.filesz).ok()?));
            match (start, end) {
                (Some(start), Some(end)) if end <= data.len() => {
                    let bytes = &data[start..end];
                    bytes[0] == b'/' && bytes.last() == Some(&0)
                }
                _ => false,
            }
        })
        .map(|s| s.index)
}

/// Undo a patch on an in-memory image
///
/// Writes the saved window back at the entry point recorded in `record` and
/// turns the neutralized interpreter header back into PT_INTERP.
pub fn restore_image(data: &mut [u8], record: &SidecarRecord) -> Result<(), PatchError> {
    let mut info = parse_elf(data)?;
    info.entry = record.orig_entry;
    let window = entry_window(&info).ok_or(PatchError::EntryNotLoaded(record.orig_entry))?;
    write_window(data, window.file_offset, &record.original_bytes)?;

    let index = former_interp(data, &info)
        .ok_or_else(|| ElfError::InvalidElf("no neutralized PT_INTERP header".to_string()))?;
    restore_interp(data, &info, index)?;
    Ok(())
}
