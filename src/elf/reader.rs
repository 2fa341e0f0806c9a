//! ELF inspection using goblin
//!
//! goblin resolves the dynamic string table for us, so DT_NEEDED and
//! DT_RPATH/DT_RUNPATH come back as real strings rather than offsets.

use std::fs::File;
use std::io;
use std::io::Read;
use std::path::Path;

use goblin::elf::Elf;

use crate::error::ElfError;

use super::types::ElfClass;
use super::types::ElfInfo;
use super::types::Segment;
use super::types::ELF_MAGIC;

const EI_OSABI: usize = 7;

/// Cheap magic-byte check on a buffer
pub fn has_elf_magic(data: &[u8]) -> bool {
    data.len() >= ELF_MAGIC.len() && data[..ELF_MAGIC.len()] == ELF_MAGIC
}

/// Check the first four bytes of a file for the ELF magic
///
/// Files shorter than the magic are not ELF files; failing to open or read
/// the file is an error.
pub fn check_elf_magic(path: &Path) -> io::Result<bool> {
    let mut magic = [0u8; 4];
    let mut file = File::open(path)?;
    match file.read_exact(&mut magic) {
        Ok(()) => Ok(magic == ELF_MAGIC),
        Err(err) if err.kind() == io::ErrorKind::UnexpectedEof => Ok(false),
        Err(err) => Err(err),
    }
}

/// Like [`check_elf_magic`], with unreadable files counted as non-ELF
pub fn is_elf_file(path: &Path) -> bool {
    check_elf_magic(path).unwrap_or(false)
}

/// Parse an ELF image from bytes and extract information
pub fn parse_elf(data: &[u8]) -> Result<ElfInfo, ElfError> {
    if !has_elf_magic(data) {
        return Err(ElfError::InvalidElf("missing ELF magic".to_string()));
    }

    let elf = Elf::parse(data).map_err(|e| ElfError::InvalidElf(e.to_string()))?;
    let header = &elf.header;

    let segments = elf
        .program_headers
        .iter()
        .enumerate()
        .map(|(index, ph)| Segment {
            index,
            p_type: ph.p_type,
            flags: ph.p_flags,
            offset: ph.p_offset,
            vaddr: ph.p_vaddr,
            filesz: ph.p_filesz,
            memsz: ph.p_memsz,
        })
        .collect();

    let rpath = elf
        .rpaths
        .iter()
        .chain(elf.runpaths.iter())
        .flat_map(|entry| entry.split(':'))
        .filter(|dir| !dir.is_empty())
        .map(str::to_string)
        .collect();

    let interpreter = elf
        .interpreter
        .map(|s| s.trim_end_matches('\0').to_string())
        .filter(|s| !s.is_empty());

    Ok(ElfInfo {
        class: if elf.is_64 {
            ElfClass::Elf64
        } else {
            ElfClass::Elf32
        },
        little_endian: elf.little_endian,
        elf_type: header.e_type,
        machine: header.e_machine,
        osabi: header.e_ident[EI_OSABI],
        entry: header.e_entry,
        phoff: header.e_phoff,
        phentsize: header.e_phentsize,
        segments,
        needed: elf.libraries.iter().map(|s| s.to_string()).collect(),
        rpath,
        interpreter,
    })
}

/// Read and parse an ELF file from disk
pub fn read_elf(path: &Path) -> Result<ElfInfo, ElfError> {
    let data = std::fs::read(path)?;
    parse_elf(&data)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_magic() {
        assert!(has_elf_magic(b"\x7fELF\x02\x01"));
        assert!(!has_elf_magic(b"\x7fEL"));
        assert!(!has_elf_magic(b"#!/bin/sh\n"));
    }

    #[test]
    fn test_not_elf_is_error() {
        assert!(matches!(
            parse_elf(b"plain text, not a binary"),
            Err(ElfError::InvalidElf(_))
        ));
    }

    #[test]
    fn test_truncated_elf_is_error() {
        assert!(parse_elf(b"\x7fELF\x02\x01\x01").is_err());
    }

    #[test]
    fn test_is_elf_file_missing_path() {
        assert!(!is_elf_file(Path::new("/nonexistent/wrapbuddy/file")));
        assert!(check_elf_magic(Path::new("/nonexistent/wrapbuddy/file")).is_err());
    }

    #[test]
    fn test_check_elf_magic_short_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let short = dir.path().join("short");
        std::fs::write(&short, b"\x7fE").unwrap();
        assert!(!check_elf_magic(&short).unwrap());

        let elf = dir.path().join("elf");
        std::fs::write(&elf, b"\x7fELF\x02\x01\x01").unwrap();
        assert!(check_elf_magic(&elf).unwrap());
    }

    #[test]
    #[ignore] // Requires a dynamically linked system binary
    fn test_parse_system_binary() {
        let info = read_elf(Path::new("/bin/ls")).expect("Failed to parse ELF");
        assert!(info.is_dynamic_executable());
        assert!(info.interpreter.is_some());
    }
}
