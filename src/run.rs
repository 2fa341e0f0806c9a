//! Batch driver: discover binaries, resolve their dependencies, patch them
//! and collect the outcome of each one.

use std::collections::BTreeSet;
use std::io;
use std::io::Write;
use std::path::Path;
use std::path::PathBuf;

use glob::Pattern;
use tracing::debug;
use tracing::info;
use tracing::warn;

use crate::elf::check_elf_magic;
use crate::elf::read_elf;
use crate::error::ConfigError;
use crate::error::ElfError;
use crate::error::PatchError;
use crate::interpreter::InterpreterInfo;
use crate::name::sidecar_path;
use crate::patch::patch_binary;
use crate::patch::PatchConfig;
use crate::patch::PatchOutcome;
use crate::resolve::build_rpath;
use crate::resolve::Resolver;
use crate::sidecar::read_sidecar;
use crate::soname::osabi_compatible;
use crate::soname::CacheBuilder;
use crate::soname::SonameCache;
use crate::stub::StubCompiler;
use crate::stub::StubSource;
use crate::walk::regular_files;
use crate::walk::Symlinks;

/// Interpreter prefix of binaries that already load from the store
pub const DEFAULT_TRUSTED_PREFIX: &str = "/nix/store/";

/// Run-level switches
#[derive(Debug, Clone)]
pub struct Options {
    /// Executables or directories to patch; also searched for libraries
    pub paths: Vec<PathBuf>,
    /// Extra library directories, scanned non-recursively
    pub libs: Vec<PathBuf>,
    /// Paths always added to the RPATH, for libraries loaded at runtime
    pub runtime_deps: Vec<PathBuf>,
    /// Dependency names that may stay unresolved
    pub ignore_missing: Vec<Pattern>,
    pub recursive: bool,
    pub dry_run: bool,
    /// Binaries whose interpreter starts with this prefix are left alone
    pub trusted_prefix: String,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            paths: Vec::new(),
            libs: Vec::new(),
            runtime_deps: Vec::new(),
            ignore_missing: Vec::new(),
            recursive: true,
            dry_run: false,
            trusted_prefix: DEFAULT_TRUSTED_PREFIX.to_string(),
        }
    }
}

/// Compile `--ignore-missing` globs
pub fn ignore_patterns<S: AsRef<str>>(patterns: &[S]) -> Result<Vec<Pattern>, ConfigError> {
    patterns
        .iter()
        .map(|p| {
            Pattern::new(p.as_ref()).map_err(|source| ConfigError::Pattern {
                pattern: p.as_ref().to_string(),
                source,
            })
        })
        .collect()
}

/// Why a binary was left untouched
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Static executable, object file or core dump
    NotDynamic,
    /// Interpreter already under the trusted prefix
    TrustedInterpreter,
    /// Patched earlier: no PT_INTERP and a valid sidecar
    AlreadyPatched,
    MachineMismatch,
    AbiMismatch,
    /// Could not be read or parsed
    Unreadable,
}

/// Result of handling one binary
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BinaryOutcome {
    Skipped(SkipReason),
    Patched(PatchOutcome),
}

/// Per-binary failure
#[derive(Debug)]
pub enum ProcessError {
    MissingDeps(Vec<String>),
    Patch(PatchError),
}

impl From<PatchError> for ProcessError {
    fn from(err: PatchError) -> Self {
        ProcessError::Patch(err)
    }
}

/// Dependencies nothing could provide for one binary
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MissingDeps {
    pub binary: PathBuf,
    pub deps: Vec<String>,
}

/// Aggregate of a whole run
#[derive(Debug, Default)]
pub struct RunReport {
    pub patched: Vec<PathBuf>,
    pub skipped: Vec<(PathBuf, SkipReason)>,
    pub missing: Vec<MissingDeps>,
    pub errors: Vec<(PathBuf, PatchError)>,
}

impl RunReport {
    /// True if no binary failed
    pub fn is_success(&self) -> bool {
        self.missing.is_empty() && self.errors.is_empty()
    }

    pub fn exit_code(&self) -> i32 {
        if self.is_success() {
            0
        } else {
            1
        }
    }

    /// Print failures grouped per binary
    pub fn write_errors<W: Write>(&self, out: &mut W) -> io::Result<()> {
        for (binary, err) in &self.errors {
            writeln!(out, "error: {}: {}", binary.display(), err)?;
        }

        if !self.missing.is_empty() {
            writeln!(out, "\nerror: missing dependencies")?;
            writeln!(
                out,
                "       add library paths with --libs or use --ignore-missing\n"
            )?;
            for missing in &self.missing {
                writeln!(out, "{}:", missing.binary.display())?;
                for dep in &missing.deps {
                    writeln!(out, "  {}", dep)?;
                }
            }
        }
        Ok(())
    }

    fn record(&mut self, path: PathBuf, result: Result<BinaryOutcome, ProcessError>) {
        match result {
            Ok(BinaryOutcome::Patched(_)) => self.patched.push(path),
            Ok(BinaryOutcome::Skipped(reason)) => self.skipped.push((path, reason)),
            Err(ProcessError::MissingDeps(deps)) => {
                self.missing.push(MissingDeps { binary: path, deps })
            }
            Err(ProcessError::Patch(err)) => self.errors.push((path, err)),
        }
    }
}

/// Populate the soname cache from every search root
///
/// Primary paths honour `recursive`; `--libs` and runtime dependencies are
/// scanned flat.
pub fn build_cache(options: &Options) -> SonameCache {
    let mut builder = CacheBuilder::new();
    builder
        .scan(&options.paths, options.recursive)
        .scan(&options.libs, false)
        .scan(&options.runtime_deps, false);
    let cache = builder.build();
    debug!(
        sonames = cache.len(),
        lib_dirs = cache.lib_dirs().len(),
        "soname cache populated"
    );
    cache
}

/// Whether `path` goes on to `process_binary`
///
/// Files that cannot be opened stay in, so the run reports them.
fn is_candidate(path: &Path) -> bool {
    check_elf_magic(path).unwrap_or_else(|err| {
        debug!(file = %path.display(), %err, "cannot check ELF magic");
        true
    })
}

/// ELF files to consider for patching; symlinks are never followed
pub fn candidates(paths: &[PathBuf], recursive: bool) -> Vec<PathBuf> {
    let mut found = Vec::new();
    for path in paths {
        let Ok(meta) = path.symlink_metadata() else {
            continue;
        };
        if meta.file_type().is_symlink() {
            continue;
        }
        if meta.is_file() {
            if is_candidate(path) {
                found.push(path.clone());
            }
        } else if meta.is_dir() {
            found.extend(
                regular_files(path, recursive, Symlinks::Skip)
                    .into_iter()
                    .filter(|file| is_candidate(file)),
            );
        }
    }
    found
}

fn skip(path: &Path, reason: SkipReason) -> Result<BinaryOutcome, ProcessError> {
    debug!(binary = %path.display(), ?reason, "skipping");
    Ok(BinaryOutcome::Skipped(reason))
}

/// Analyze one binary and patch it if all its dependencies resolve
pub fn process_binary(
    path: &Path,
    cache: &SonameCache,
    interp: &InterpreterInfo,
    options: &Options,
    config: &PatchConfig,
    compiler: &dyn StubCompiler,
) -> Result<BinaryOutcome, ProcessError> {
    let elf = match read_elf(path) {
        Ok(elf) => elf,
        Err(ElfError::Io(err)) => {
            warn!(binary = %path.display(), %err, "cannot read file");
            return Ok(BinaryOutcome::Skipped(SkipReason::Unreadable));
        }
        Err(err) => {
            warn!(binary = %path.display(), %err, "not a parseable ELF file");
            return Ok(BinaryOutcome::Skipped(SkipReason::Unreadable));
        }
    };

    // A sidecar only counts if the image really went through the patcher
    let sidecar = sidecar_path(path);
    if sidecar.exists() {
        if elf.interp_segment().is_some() {
            return Err(PatchError::StaleSidecar(sidecar).into());
        }
        read_sidecar(&sidecar, elf.class)?;
        return skip(path, SkipReason::AlreadyPatched);
    }

    if !elf.is_dynamic_executable() {
        return skip(path, SkipReason::NotDynamic);
    }
    if elf
        .interpreter
        .as_deref()
        .is_some_and(|current| current.starts_with(&options.trusted_prefix))
    {
        return skip(path, SkipReason::TrustedInterpreter);
    }
    if elf.machine != interp.machine {
        return skip(path, SkipReason::MachineMismatch);
    }
    if !osabi_compatible(elf.osabi, interp.osabi) {
        return skip(path, SkipReason::AbiMismatch);
    }

    // $ORIGIN must expand to an absolute directory, whatever form `path` has
    let binary_dir = match path.canonicalize() {
        Ok(full) => full.parent().map(Path::to_path_buf).unwrap_or_default(),
        Err(err) => {
            warn!(binary = %path.display(), %err, "cannot resolve binary location");
            return Ok(BinaryOutcome::Skipped(SkipReason::Unreadable));
        }
    };
    let resolver = Resolver {
        cache,
        libc_lib: interp.libc_lib.as_deref(),
        existing_rpath: &elf.rpath,
        binary_dir: &binary_dir,
        machine: elf.machine,
        osabi: elf.osabi,
    };

    let mut found_dirs = BTreeSet::new();
    let mut missing = Vec::new();
    for dep in &elf.needed {
        match resolver.resolve(dep) {
            Some(dir) => {
                debug!(binary = %path.display(), dep, dir = %dir.display(), "resolved");
                found_dirs.insert(dir);
            }
            None if options.ignore_missing.iter().any(|p| p.matches(dep)) => {
                debug!(binary = %path.display(), dep, "ignoring missing dependency");
            }
            None => missing.push(dep.clone()),
        }
    }
    if !missing.is_empty() {
        return Err(ProcessError::MissingDeps(missing));
    }

    let preserved: Vec<PathBuf> = elf
        .rpath
        .iter()
        .filter(|entry| entry.starts_with(&options.trusted_prefix))
        .map(PathBuf::from)
        .filter(|dir| dir.exists())
        .collect();
    let rpath = build_rpath(
        &config.all_lib_dirs,
        &found_dirs,
        &config.runtime_deps,
        &preserved,
        interp.libc_lib.as_deref(),
    );

    info!(binary = %path.display(), "patching");
    let outcome = patch_binary(path, &interp.path, &rpath, config, compiler, options.dry_run)?;
    if let PatchOutcome::Patched { stub_len, .. } = &outcome {
        info!(binary = %path.display(), stub_len, "patched");
    }
    Ok(BinaryOutcome::Patched(outcome))
}

/// Patch every candidate under `options.paths`
///
/// The soname cache is built once up front and only read afterwards.
pub fn run(
    options: &Options,
    interp: &InterpreterInfo,
    stub_source: StubSource,
    loader: PathBuf,
    compiler: &dyn StubCompiler,
) -> RunReport {
    let cache = build_cache(options);
    let config = PatchConfig {
        stub_source,
        loader,
        runtime_deps: options.runtime_deps.clone(),
        all_lib_dirs: cache.lib_dirs().clone(),
    };

    let mut report = RunReport::default();
    for path in candidates(&options.paths, options.recursive) {
        let result = process_binary(&path, &cache, interp, options, &config, compiler);
        report.record(path, result);
    }
    report
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ignore_patterns() {
        let patterns = ignore_patterns(&["libcuda.so*", "libGL?.so"]).unwrap();
        assert!(patterns[0].matches("libcuda.so.1"));
        assert!(!patterns[0].matches("libcudart.so"));
        assert!(patterns[1].matches("libGLX.so"));
        assert!(ignore_patterns(&["[unclosed"]).is_err());
    }

    #[test]
    fn test_report_exit_code_and_output() {
        let mut report = RunReport::default();
        report.record(
            PathBuf::from("/bin/ok"),
            Ok(BinaryOutcome::Skipped(SkipReason::NotDynamic)),
        );
        assert!(report.is_success());
        assert_eq!(report.exit_code(), 0);

        report.record(
            PathBuf::from("/bin/broken"),
            Err(ProcessError::MissingDeps(vec!["libmissing.so".to_string()])),
        );
        assert_eq!(report.exit_code(), 1);

        let mut out = Vec::new();
        report.write_errors(&mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("missing dependencies"));
        assert!(text.contains("/bin/broken:\n  libmissing.so\n"));
    }

    #[test]
    fn test_candidates_skip_symlinks_and_non_elf() {
        let dir = tempfile::TempDir::new().unwrap();
        std::fs::write(dir.path().join("script.sh"), b"#!/bin/sh\n").unwrap();
        std::fs::write(dir.path().join("fake-elf"), b"\x7fELF").unwrap();
        std::os::unix::fs::symlink("fake-elf", dir.path().join("link")).unwrap();

        let found = candidates(&[dir.path().to_path_buf()], true);
        assert_eq!(found, vec![dir.path().join("fake-elf")]);
        assert!(candidates(&[dir.path().join("link")], true).is_empty());
    }
}
