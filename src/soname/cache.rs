//! Soname cache: where each (library name, machine) can be found
//!
//! The cache is filled by a [`CacheBuilder`] that walks search roots and
//! follows each library's own RPATH/RUNPATH, the way the dynamic loader
//! would. Once built, the cache has no mutating methods.

use std::collections::BTreeSet;
use std::collections::HashMap;
use std::collections::HashSet;
use std::collections::VecDeque;
use std::path::Path;
use std::path::PathBuf;

use tracing::debug;

use crate::elf::is_elf_file;
use crate::elf::read_elf;
use crate::elf::ELFOSABI_SYSV;
use crate::name::is_shared_library_name;
use crate::resolve::expand_origin;
use crate::walk::regular_files;
use crate::walk::Symlinks;

/// One place a library was found
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    /// Canonical directory containing the library
    pub dir: PathBuf,
    /// EI_OSABI of the library
    pub osabi: u8,
}

/// `ELFOSABI_SYSV` is compatible with everything, in either direction
pub fn osabi_compatible(a: u8, b: u8) -> bool {
    a == ELFOSABI_SYSV || b == ELFOSABI_SYSV || a == b
}

/// Read-only index of discovered shared libraries
#[derive(Debug, Clone, Default)]
pub struct SonameCache {
    entries: HashMap<(String, u16), Vec<CacheEntry>>,
    lib_dirs: BTreeSet<PathBuf>,
}

impl SonameCache {
    /// First directory holding `soname` for `machine` with a compatible OS ABI
    pub fn resolve(&self, soname: &str, machine: u16, osabi: u8) -> Option<&Path> {
        self.entries(soname, machine)
            .iter()
            .find(|entry| osabi_compatible(osabi, entry.osabi))
            .map(|entry| entry.dir.as_path())
    }

    /// All recorded locations of `soname` for `machine`, in discovery order
    pub fn entries(&self, soname: &str, machine: u16) -> &[CacheEntry] {
        self.entries
            .get(&(soname.to_string(), machine))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Every directory in which at least one library was found
    pub fn lib_dirs(&self) -> &BTreeSet<PathBuf> {
        &self.lib_dirs
    }

    /// Number of distinct (soname, machine) keys
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Populates a [`SonameCache`]
///
/// Each canonical path is scanned at most once across all calls to
/// [`CacheBuilder::scan`], which keeps RPATH cycles finite.
#[derive(Debug, Default)]
pub struct CacheBuilder {
    cache: SonameCache,
    visited: HashSet<PathBuf>,
}

impl CacheBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a library found in `dir`
    pub fn insert(&mut self, soname: impl Into<String>, machine: u16, dir: PathBuf, osabi: u8) {
        let list = self.cache.entries.entry((soname.into(), machine)).or_default();
        let entry = CacheEntry { dir, osabi };
        if !list.contains(&entry) {
            self.cache.lib_dirs.insert(entry.dir.clone());
            list.push(entry);
        }
    }

    /// Breadth-first scan of `roots` and every RPATH directory reachable from
    /// the libraries found there
    pub fn scan(&mut self, roots: &[PathBuf], recursive: bool) -> &mut Self {
        let mut queue: VecDeque<PathBuf> = roots.iter().cloned().collect();

        while let Some(path) = queue.pop_front() {
            let Ok(canonical) = path.canonicalize() else {
                continue;
            };
            if !self.visited.insert(canonical) {
                continue;
            }

            if path.is_file() {
                if is_shared_library_name(&path) && is_elf_file(&path) {
                    self.process_library(&path, &mut queue);
                }
            } else if path.is_dir() {
                debug!(dir = %path.display(), recursive, "scanning for libraries");
                for file in regular_files(&path, recursive, Symlinks::Follow) {
                    if is_shared_library_name(&file) && is_elf_file(&file) {
                        self.process_library(&file, &mut queue);
                    }
                }
            }
        }

        self
    }

    fn process_library(&mut self, path: &Path, queue: &mut VecDeque<PathBuf>) {
        let info = match read_elf(path) {
            Ok(info) => info,
            Err(err) => {
                debug!(library = %path.display(), %err, "skipping unreadable library");
                return;
            }
        };
        let Some(dir) = path
            .canonicalize()
            .ok()
            .and_then(|p| p.parent().map(Path::to_path_buf))
        else {
            return;
        };
        let Some(soname) = path.file_name().and_then(|n| n.to_str()) else {
            return;
        };

        for entry in &info.rpath {
            let expanded = expand_origin(entry, &dir);
            if expanded.exists() {
                queue.push_back(expanded);
            }
        }

        self.insert(soname, info.machine, dir, info.osabi);
    }

    pub fn build(self) -> SonameCache {
        self.cache
    }
}
