//! Directory traversal shared by cache population and binary discovery

use std::fs;
use std::path::Path;
use std::path::PathBuf;

/// How symlinked files are treated. Symlinked directories are never entered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Symlinks {
    /// Include symlinks that point at regular files
    Follow,
    /// Leave symlinks out entirely
    Skip,
}

/// Regular files under `dir`, sorted per directory
///
/// Unreadable directories and entries are silently skipped.
pub fn regular_files(dir: &Path, recursive: bool, symlinks: Symlinks) -> Vec<PathBuf> {
    let mut files = Vec::new();
    let mut pending = vec![dir.to_path_buf()];

    while let Some(current) = pending.pop() {
        let Ok(read_dir) = fs::read_dir(&current) else {
            continue;
        };
        let mut entries: Vec<_> = read_dir.filter_map(Result::ok).collect();
        entries.sort_by_key(|e| e.file_name());

        let mut subdirs = Vec::new();
        for entry in entries {
            let Ok(file_type) = entry.file_type() else {
                continue;
            };
            let path = entry.path();
            if file_type.is_symlink() {
                if symlinks == Symlinks::Follow && path.is_file() {
                    files.push(path);
                }
            } else if file_type.is_file() {
                files.push(path);
            } else if file_type.is_dir() && recursive {
                subdirs.push(path);
            }
        }
        // Reverse so the stack visits subdirectories in name order
        pending.extend(subdirs.into_iter().rev());
    }

    files
}
