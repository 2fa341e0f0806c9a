//! Entry-point stub generation
//!
//! The stub is a flat, headerless blob of machine code that maps the
//! external loader and jumps to it. It runs before any relocation is
//! applied, so it is compiled freestanding and position-independent.
//!
//! Compilation goes through the [`StubCompiler`] trait; [`CcCompiler`] is
//! the C-toolchain backend.

mod cc;

use std::fs;
use std::os::unix::ffi::OsStrExt;
use std::path::Path;
use std::path::PathBuf;

pub use cc::CcCompiler;

use crate::elf::EM_386;
use crate::elf::EM_AARCH64;
use crate::elf::EM_X86_64;
use crate::error::StubError;

const STUB_C: &str = include_str!("../../stub/stub.c");
const PREAMBLE_LD: &str = include_str!("../../stub/preamble.ld");

pub const STUB_C_NAME: &str = "stub.c";
pub const LINKER_SCRIPT_NAME: &str = "preamble.ld";

/// Where the stub sources come from
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum StubSource {
    /// Sources compiled into this binary
    #[default]
    Embedded,
    /// A directory holding `stub.c` and `preamble.ld`
    Dir(PathBuf),
}

/// Paths of the sources for one compilation
#[derive(Debug, Clone)]
pub struct StubFiles {
    pub stub_c: PathBuf,
    pub linker_script: PathBuf,
    pub include_dir: PathBuf,
}

impl StubSource {
    /// Make the sources available on disk, using `scratch` for embedded ones
    pub fn materialize(&self, scratch: &Path) -> Result<StubFiles, StubError> {
        match self {
            StubSource::Embedded => {
                let stub_c = scratch.join(STUB_C_NAME);
                let linker_script = scratch.join(LINKER_SCRIPT_NAME);
                fs::write(&stub_c, STUB_C)?;
                fs::write(&linker_script, PREAMBLE_LD)?;
                Ok(StubFiles {
                    stub_c,
                    linker_script,
                    include_dir: scratch.to_path_buf(),
                })
            }
            StubSource::Dir(dir) => {
                let stub_c = dir.join(STUB_C_NAME);
                let linker_script = dir.join(LINKER_SCRIPT_NAME);
                if !stub_c.is_file() {
                    return Err(StubError::MissingSource(STUB_C_NAME, dir.clone()));
                }
                if !linker_script.is_file() {
                    return Err(StubError::MissingSource(LINKER_SCRIPT_NAME, dir.clone()));
                }
                Ok(StubFiles {
                    stub_c,
                    linker_script,
                    include_dir: dir.clone(),
                })
            }
        }
    }
}

/// Compiles stub sources into a flat code blob
pub trait StubCompiler {
    /// Compile `source` with the extra `flags` and return the raw code
    fn compile(&self, source: &StubSource, flags: &[String]) -> Result<Vec<u8>, StubError>;
}

/// Escape bytes for a C string literal
///
/// Octal escapes are used for everything non-printable, since `\x` escapes
/// would swallow following hex digits.
pub fn c_escape(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len());
    for &b in bytes {
        match b {
            b'\\' => out.push_str("\\\\"),
            b'"' => out.push_str("\\\""),
            b'\n' => out.push_str("\\n"),
            b'\r' => out.push_str("\\r"),
            b'\t' => out.push_str("\\t"),
            0x20..=0x7e => out.push(b as char),
            _ => out.push_str(&format!("\\{:03o}", b)),
        }
    }
    out
}

/// Compiler flags for a stub that jumps to `loader`, targeting `machine`
pub fn stub_flags(loader: &Path, machine: u16) -> Result<Vec<String>, StubError> {
    let loader_bytes = loader.as_os_str().as_bytes();
    if loader_bytes.contains(&0) {
        return Err(StubError::InvalidLoaderPath(loader.display().to_string()));
    }

    let mut flags: Vec<String> = [
        "-nostdlib",
        "-fPIC",
        "-fno-stack-protector",
        "-fno-exceptions",
        "-fno-unwind-tables",
        "-fno-asynchronous-unwind-tables",
        "-fno-builtin",
        "-Os",
        "-Wl,-e,_start",
        "-Wl,-Ttext=0",
        "-Wl,--build-id=none",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect();

    match machine {
        EM_X86_64 => {}
        EM_386 => flags.insert(0, "-m32".to_string()),
        // Purely PC-relative code: adr instead of adrp, which would resolve
        // page addresses before relocation
        EM_AARCH64 => flags.insert(0, "-mcmodel=tiny".to_string()),
        other => return Err(StubError::UnsupportedMachine(other)),
    }

    flags.push(format!("-DLOADER_PATH=\"{}\"", c_escape(loader_bytes)));
    Ok(flags)
}

/// Build the stub for one binary
pub fn compile_stub(
    compiler: &dyn StubCompiler,
    source: &StubSource,
    loader: &Path,
    machine: u16,
) -> Result<Vec<u8>, StubError> {
    let flags = stub_flags(loader, machine)?;
    let code = compiler.compile(source, &flags)?;
    if code.is_empty() {
        return Err(StubError::Empty);
    }
    Ok(code)
}
