//! Target dynamic linker description

use std::fs;
use std::path::Path;
use std::path::PathBuf;

use crate::elf::read_elf;
use crate::error::ConfigError;

/// The dynamic linker patched binaries will be handed to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterpreterInfo {
    pub path: String,
    /// e_machine of the interpreter
    pub machine: u16,
    /// EI_OSABI of the interpreter
    pub osabi: u8,
    /// Library directory of the libc matching this interpreter
    pub libc_lib: Option<PathBuf>,
}

impl InterpreterInfo {
    /// Describe the interpreter at `path`, reading its machine and ABI
    pub fn from_path(
        path: impl Into<String>,
        libc_lib: Option<PathBuf>,
    ) -> Result<Self, ConfigError> {
        let path = path.into();
        let info = read_elf(Path::new(&path)).map_err(|source| ConfigError::Interpreter {
            path: PathBuf::from(&path),
            source,
        })?;
        Ok(Self {
            path,
            machine: info.machine,
            osabi: info.osabi,
            libc_lib,
        })
    }

    /// Derive the interpreter from a build-environment root
    ///
    /// Reads `nix-support/dynamic-linker` for the interpreter path and, when
    /// present, `nix-support/orig-libc` for the libc root (its `lib`
    /// subdirectory becomes the libc library directory).
    pub fn from_bintools(root: &Path) -> Result<Self, ConfigError> {
        let support = root.join("nix-support");

        let linker_file = support.join("dynamic-linker");
        if !linker_file.exists() {
            return Err(ConfigError::MissingFile(linker_file));
        }
        let interpreter = read_trimmed(&linker_file)?;

        let libc_file = support.join("orig-libc");
        let libc_lib = if libc_file.exists() {
            Some(PathBuf::from(read_trimmed(&libc_file)?).join("lib"))
        } else {
            None
        };

        Self::from_path(interpreter, libc_lib)
    }
}

fn read_trimmed(path: &Path) -> Result<String, ConfigError> {
    fs::read_to_string(path)
        .map(|s| s.trim().to_string())
        .map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })
}
