//! Patch engine: install the entry stub and write the sidecar
//!
//! The original entry bytes are saved to the sidecar before the binary is
//! touched, and the binary itself is replaced atomically, so a failure at
//! any step leaves the original file as it was.

use std::collections::BTreeSet;
use std::fs;
use std::io::Write;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use std::path::PathBuf;

use tempfile::NamedTempFile;
use tracing::debug;
use tracing::info;

use crate::elf::entry_window;
use crate::elf::null_interp;
use crate::elf::parse_elf;
use crate::elf::read_window;
use crate::elf::write_window;
use crate::elf::EntryWindow;
use crate::error::ElfError;
use crate::error::PatchError;
use crate::name::sidecar_path;
use crate::sidecar::write_sidecar;
use crate::sidecar::SidecarRecord;
use crate::stub::compile_stub;
use crate::stub::StubCompiler;
use crate::stub::StubSource;

/// Stub windows are padded to this many bytes
pub const STUB_ALIGN: usize = 16;

/// Per-run settings for the patch engine
#[derive(Debug, Clone, Default)]
pub struct PatchConfig {
    pub stub_source: StubSource,
    /// Loader binary the stub maps and jumps to
    pub loader: PathBuf,
    /// Paths always added to the RPATH when they exist
    pub runtime_deps: Vec<PathBuf>,
    /// Every library directory found while populating the soname cache
    pub all_lib_dirs: BTreeSet<PathBuf>,
}

/// What happened to a binary the engine was asked to patch
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PatchOutcome {
    Patched {
        sidecar: PathBuf,
        window: EntryWindow,
        /// Unpadded stub size
        stub_len: usize,
    },
    /// Dry run: the binary would have been patched at `window`
    DryRun { window: EntryWindow },
}

/// Round `len` up to [`STUB_ALIGN`]
pub fn padded_len(len: usize) -> usize {
    len.div_ceil(STUB_ALIGN) * STUB_ALIGN
}

/// Mode with an execute bit added wherever a read bit is set
fn executable_mode(mode: u32) -> u32 {
    mode | ((mode & 0o444) >> 2)
}

/// Replace `path` with `data` through a temp file in the same directory
pub(crate) fn write_atomically(path: &Path, data: &[u8], mode: u32) -> Result<(), PatchError> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(data)?;
    tmp.as_file().sync_all()?;
    fs::set_permissions(tmp.path(), fs::Permissions::from_mode(mode))?;
    tmp.persist(path).map_err(|e| PatchError::Io(e.error))?;
    Ok(())
}

/// Patch the binary at `path` so it starts through the external loader
///
/// `interpreter` and `rpath` are recorded in the sidecar for the loader.
pub fn patch_binary(
    path: &Path,
    interpreter: &str,
    rpath: &str,
    config: &PatchConfig,
    compiler: &dyn StubCompiler,
    dry_run: bool,
) -> Result<PatchOutcome, PatchError> {
    let mut data = fs::read(path)?;
    let original_mode = fs::metadata(path)?.permissions().mode();
    let info = parse_elf(&data)?;
    if !info.little_endian {
        return Err(ElfError::Unsupported("big-endian images are not supported".to_string()).into());
    }

    let window = entry_window(&info).ok_or(PatchError::EntryNotLoaded(info.entry))?;
    debug!(
        binary = %path.display(),
        entry = info.entry,
        file_offset = window.file_offset,
        available = window.available,
        "entry point located"
    );

    if dry_run {
        info!(
            binary = %path.display(),
            entry = info.entry,
            file_offset = window.file_offset,
            available = window.available,
            "dry run: would patch binary"
        );
        return Ok(PatchOutcome::DryRun { window });
    }

    let stub = compile_stub(compiler, &config.stub_source, &config.loader, info.machine)?;
    let padded = padded_len(stub.len());
    if padded as u64 > window.available {
        return Err(PatchError::InsufficientSpace {
            stub: padded,
            available: window.available,
        });
    }
    debug!(stub_len = stub.len(), padded, "stub compiled");

    let record = SidecarRecord {
        class: info.class,
        orig_entry: info.entry,
        interpreter: interpreter.to_string(),
        rpath: rpath.to_string(),
        original_bytes: read_window(&data, window.file_offset, padded)?,
    };
    // Encode up front so a bad field fails before anything is written
    record.encode()?;

    let mut stub_padded = stub.clone();
    stub_padded.resize(padded, 0);
    write_window(&mut data, window.file_offset, &stub_padded)?;
    null_interp(&mut data, &info)?;

    let sidecar = sidecar_path(path);
    write_sidecar(&sidecar, &record)?;
    if let Err(err) = write_atomically(path, &data, executable_mode(original_mode & 0o7777)) {
        let _ = fs::remove_file(&sidecar);
        return Err(err);
    }

    Ok(PatchOutcome::Patched {
        sidecar,
        window,
        stub_len: stub.len(),
    })
}
