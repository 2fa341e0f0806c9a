//! File naming conventions

use std::path::Path;
use std::path::PathBuf;

/// Suffix of sidecar recovery files
pub const SIDECAR_SUFFIX: &str = ".wrapbuddy";

/// Sidecar path for a binary: `dir/foo` -> `dir/.foo.wrapbuddy`
pub fn sidecar_path(binary: &Path) -> PathBuf {
    let name = binary
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    binary.with_file_name(format!(".{}{}", name, SIDECAR_SUFFIX))
}

/// Whether a file name looks like a shared library (`.so` or `.so.N...`)
pub fn is_shared_library_name(path: &Path) -> bool {
    let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
        return false;
    };
    name.ends_with(".so") || name.contains(".so.")
}
