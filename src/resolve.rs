//! Dependency resolution and RPATH construction

use std::collections::BTreeSet;
use std::path::Path;
use std::path::PathBuf;

use crate::soname::SonameCache;

/// Replace `$ORIGIN` / `${ORIGIN}` in an RPATH entry with `origin`
pub fn expand_origin(entry: &str, origin: &Path) -> PathBuf {
    let origin = origin.to_string_lossy();
    PathBuf::from(
        entry
            .replace("${ORIGIN}", &origin)
            .replace("$ORIGIN", &origin),
    )
}

/// Everything needed to resolve the dependencies of one binary
#[derive(Debug, Clone, Copy)]
pub struct Resolver<'a> {
    pub cache: &'a SonameCache,
    /// Explicit libc directory, checked first
    pub libc_lib: Option<&'a Path>,
    /// The binary's own RPATH/RUNPATH entries, unexpanded
    pub existing_rpath: &'a [String],
    /// Directory the binary lives in, for `$ORIGIN`
    pub binary_dir: &'a Path,
    pub machine: u16,
    pub osabi: u8,
}

impl Resolver<'_> {
    /// Directory that provides `dep`
    ///
    /// Priority: libc directory, then the binary's existing RPATH, then the
    /// soname cache.
    pub fn resolve(&self, dep: &str) -> Option<PathBuf> {
        if let Some(libc) = self.libc_lib {
            if libc.join(dep).exists() {
                return Some(libc.to_path_buf());
            }
        }

        for entry in self.existing_rpath {
            let dir = expand_origin(entry, self.binary_dir);
            if dir.join(dep).exists() {
                return Some(dir);
            }
        }

        self.cache
            .resolve(dep, self.machine, self.osabi)
            .map(Path::to_path_buf)
    }
}

/// Build the colon-separated RPATH for a patched binary
///
/// The result is the sorted union of every discovered library directory,
/// the directories direct dependencies were found in, preserved existing
/// entries and the runtime dependencies that exist, followed by the libc
/// directory.
pub fn build_rpath(
    all_lib_dirs: &BTreeSet<PathBuf>,
    found_dirs: &BTreeSet<PathBuf>,
    runtime_deps: &[PathBuf],
    preserved: &[PathBuf],
    libc_lib: Option<&Path>,
) -> String {
    let mut combined: BTreeSet<&Path> = all_lib_dirs
        .iter()
        .chain(found_dirs)
        .chain(preserved)
        .map(PathBuf::as_path)
        .collect();
    combined.extend(
        runtime_deps
            .iter()
            .filter(|dep| dep.exists())
            .map(PathBuf::as_path),
    );

    if let Some(libc) = libc_lib {
        combined.remove(libc);
    }

    let mut parts: Vec<String> = combined
        .into_iter()
        .map(|dir| dir.to_string_lossy().into_owned())
        .collect();
    if let Some(libc) = libc_lib {
        parts.push(libc.to_string_lossy().into_owned());
    }
    parts.join(":")
}
