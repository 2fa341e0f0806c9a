//! Sidecar recovery record and its binary encoding
//!
//! Layout (little-endian), for ELF64 images:
//!
//! ```text
//! orig_entry      u64
//! stub_window_len u64
//! interp_len      u16   (including the trailing NUL)
//! rpath_len       u16   (including the trailing NUL)
//! interp          [u8; interp_len]
//! rpath           [u8; rpath_len]
//! original bytes  [u8; stub_window_len]
//! ```
//!
//! ELF32 images use `u32` for the first two fields (12-byte header).

use crate::elf::ElfClass;
use crate::error::SidecarError;

pub const HEADER_SIZE_64: usize = 20;
pub const HEADER_SIZE_32: usize = 12;

/// Everything the external loader needs to undo a patch at process start
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SidecarRecord {
    /// Class of the patched image; selects the header layout
    pub class: ElfClass,
    /// Original e_entry
    pub orig_entry: u64,
    /// Interpreter the loader hands control to
    pub interpreter: String,
    /// Colon-separated library search path
    pub rpath: String,
    /// Bytes overwritten at the entry point; its length is the padded stub size
    pub original_bytes: Vec<u8>,
}

fn header_size(class: ElfClass) -> usize {
    match class {
        ElfClass::Elf64 => HEADER_SIZE_64,
        ElfClass::Elf32 => HEADER_SIZE_32,
    }
}

fn c_string_len(field: &'static str, value: &str) -> Result<u16, SidecarError> {
    if value.as_bytes().contains(&0) {
        return Err(SidecarError::InteriorNul(field));
    }
    let len = value.len() + 1;
    u16::try_from(len).map_err(|_| SidecarError::FieldTooLong { field, len })
}

fn take<'a>(data: &'a [u8], pos: &mut usize, len: usize) -> Result<&'a [u8], SidecarError> {
    let end = pos
        .checked_add(len)
        .filter(|end| *end <= data.len())
        .ok_or(SidecarError::Truncated {
            needed: pos.saturating_add(len),
            actual: data.len(),
        })?;
    let bytes = &data[*pos..end];
    *pos = end;
    Ok(bytes)
}

fn read_c_string(field: &'static str, bytes: &[u8]) -> Result<String, SidecarError> {
    let Some((&0, body)) = bytes.split_last() else {
        return Err(SidecarError::Malformed(format!("{field} is not NUL-terminated")));
    };
    String::from_utf8(body.to_vec())
        .map_err(|_| SidecarError::Malformed(format!("{field} is not valid UTF-8")))
}

impl SidecarRecord {
    /// Length of the saved window (the padded stub size)
    pub fn window_len(&self) -> usize {
        self.original_bytes.len()
    }

    /// Serialize to the on-disk format
    pub fn encode(&self) -> Result<Vec<u8>, SidecarError> {
        let interp_len = c_string_len("interpreter path", &self.interpreter)?;
        let rpath_len = c_string_len("rpath", &self.rpath)?;
        let window_len = self.original_bytes.len();

        let mut out = Vec::with_capacity(
            header_size(self.class) + usize::from(interp_len) + usize::from(rpath_len) + window_len,
        );
        match self.class {
            ElfClass::Elf64 => {
                out.extend_from_slice(&self.orig_entry.to_le_bytes());
                out.extend_from_slice(&(window_len as u64).to_le_bytes());
            }
            ElfClass::Elf32 => {
                let entry = u32::try_from(self.orig_entry).map_err(|_| SidecarError::FieldTooLong {
                    field: "orig_entry",
                    len: 8,
                })?;
                let window = u32::try_from(window_len).map_err(|_| SidecarError::FieldTooLong {
                    field: "stub window",
                    len: window_len,
                })?;
                out.extend_from_slice(&entry.to_le_bytes());
                out.extend_from_slice(&window.to_le_bytes());
            }
        }
        out.extend_from_slice(&interp_len.to_le_bytes());
        out.extend_from_slice(&rpath_len.to_le_bytes());
        out.extend_from_slice(self.interpreter.as_bytes());
        out.push(0);
        out.extend_from_slice(self.rpath.as_bytes());
        out.push(0);
        out.extend_from_slice(&self.original_bytes);
        Ok(out)
    }

    /// Parse the on-disk format
    pub fn decode(data: &[u8], class: ElfClass) -> Result<Self, SidecarError> {
        let mut pos = 0;
        let (orig_entry, window_len) = match class {
            ElfClass::Elf64 => {
                let header = take(data, &mut pos, 16)?;
                let entry = u64::from_le_bytes(header[0..8].try_into().unwrap_or_default());
                let window = u64::from_le_bytes(header[8..16].try_into().unwrap_or_default());
                (entry, window)
            }
            ElfClass::Elf32 => {
                let header = take(data, &mut pos, 8)?;
                let entry = u32::from_le_bytes(header[0..4].try_into().unwrap_or_default());
                let window = u32::from_le_bytes(header[4..8].try_into().unwrap_or_default());
                (u64::from(entry), u64::from(window))
            }
        };
        let lens = take(data, &mut pos, 4)?;
        let interp_len = usize::from(u16::from_le_bytes([lens[0], lens[1]]));
        let rpath_len = usize::from(u16::from_le_bytes([lens[2], lens[3]]));

        let interpreter = read_c_string("interpreter path", take(data, &mut pos, interp_len)?)?;
        let rpath = read_c_string("rpath", take(data, &mut pos, rpath_len)?)?;

        let window_len = usize::try_from(window_len)
            .map_err(|_| SidecarError::Malformed(format!("window length {window_len} too large")))?;
        let original_bytes = take(data, &mut pos, window_len)?.to_vec();
        if pos != data.len() {
            return Err(SidecarError::Malformed(format!(
                "{} trailing bytes after saved window",
                data.len() - pos
            )));
        }

        Ok(Self {
            class,
            orig_entry,
            interpreter,
            rpath,
            original_bytes,
        })
    }
}
