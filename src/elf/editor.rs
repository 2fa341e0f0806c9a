//! In-place modification of an ELF image held in memory
//!
//! All writes are bounds-checked against the buffer; a malformed header
//! produces an error instead of a panic.

use std::ops::Range;

use crate::error::ElfError;

use super::types::ElfInfo;
use super::types::PT_INTERP;
use super::types::PT_NULL;

/// Patchable region at the entry point
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntryWindow {
    /// File offset of the entry point
    pub file_offset: u64,
    /// Bytes from the entry point to the end of its segment's file image
    pub available: u64,
}

/// Locate the entry point inside its PT_LOAD segment
pub fn entry_window(info: &ElfInfo) -> Option<EntryWindow> {
    let segment = info.entry_segment()?;
    let delta = info.entry - segment.vaddr;
    Some(EntryWindow {
        file_offset: segment.offset.checked_add(delta)?,
        available: segment.filesz - delta,
    })
}

fn checked_range(data_len: usize, offset: u64, len: usize) -> Result<Range<usize>, ElfError> {
    let start = usize::try_from(offset)
        .map_err(|_| ElfError::InvalidElf(format!("offset {offset:#x} out of range")))?;
    let end = start
        .checked_add(len)
        .filter(|end| *end <= data_len)
        .ok_or_else(|| {
            ElfError::InvalidElf(format!(
                "range {start:#x}+{len:#x} extends past end of file ({data_len:#x})"
            ))
        })?;
    Ok(start..end)
}

/// Copy `len` bytes starting at `offset`
pub fn read_window(data: &[u8], offset: u64, len: usize) -> Result<Vec<u8>, ElfError> {
    let range = checked_range(data.len(), offset, len)?;
    Ok(data[range].to_vec())
}

/// Overwrite bytes starting at `offset`
pub fn write_window(data: &mut [u8], offset: u64, bytes: &[u8]) -> Result<(), ElfError> {
    let range = checked_range(data.len(), offset, bytes.len())?;
    data[range].copy_from_slice(bytes);
    Ok(())
}

/// Rewrite the p_type field of program header `index`
pub(crate) fn set_segment_type(
    data: &mut [u8],
    info: &ElfInfo,
    index: usize,
    p_type: u32,
) -> Result<(), ElfError> {
    let entry_offset = (index as u64)
        .checked_mul(u64::from(info.phentsize))
        .and_then(|rel| rel.checked_add(info.phoff))
        .ok_or_else(|| ElfError::InvalidElf("program header offset overflows".to_string()))?;
    // p_type is the first field of both Elf32_Phdr and Elf64_Phdr
    let bytes = if info.little_endian {
        p_type.to_le_bytes()
    } else {
        p_type.to_be_bytes()
    };
    write_window(data, entry_offset, &bytes)
}

/// Turn the PT_INTERP program header into PT_NULL
///
/// Returns false if the image has no PT_INTERP.
pub fn null_interp(data: &mut [u8], info: &ElfInfo) -> Result<bool, ElfError> {
    let Some(index) = info.interp_segment().map(|s| s.index) else {
        return Ok(false);
    };
    set_segment_type(data, info, index, PT_NULL)?;
    Ok(true)
}

/// Undo `null_interp` for program header `index`
pub fn restore_interp(data: &mut [u8], info: &ElfInfo, index: usize) -> Result<(), ElfError> {
    set_segment_type(data, info, index, PT_INTERP)
}
