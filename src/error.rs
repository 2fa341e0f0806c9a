//! Error types for wrapbuddy

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while reading ELF images
#[derive(Error, Debug)]
pub enum ElfError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid ELF: {0}")]
    InvalidElf(String),

    #[error("Unsupported ELF layout: {0}")]
    Unsupported(String),
}

/// Errors from stub compilation
#[derive(Error, Debug)]
pub enum StubError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0} not found in stub source directory {1}")]
    MissingSource(&'static str, PathBuf),

    #[error("no stub available for machine {0:#x}")]
    UnsupportedMachine(u16),

    #[error("loader path contains a NUL byte: {0}")]
    InvalidLoaderPath(String),

    #[error("failed to run {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{program} exited with {status}: {stderr}")]
    ToolFailed {
        program: String,
        status: std::process::ExitStatus,
        stderr: String,
    },

    #[error("stub compiled to an empty blob")]
    Empty,
}

/// Errors related to the sidecar recovery record
#[derive(Error, Debug)]
pub enum SidecarError {
    #[error("{field} is too long for the sidecar header ({len} bytes)")]
    FieldTooLong { field: &'static str, len: usize },

    #[error("string field {0} contains a NUL byte")]
    InteriorNul(&'static str),

    #[error("sidecar record truncated: need {needed} bytes, have {actual}")]
    Truncated { needed: usize, actual: usize },

    #[error("malformed sidecar record: {0}")]
    Malformed(String),
}

/// Errors from patching a single binary
#[derive(Error, Debug)]
pub enum PatchError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("ELF error: {0}")]
    Elf(#[from] ElfError),

    #[error("stub error: {0}")]
    Stub(#[from] StubError),

    #[error("sidecar error: {0}")]
    Sidecar(#[from] SidecarError),

    #[error("entry point {0:#x} is not inside any PT_LOAD segment")]
    EntryNotLoaded(u64),

    #[error("stub ({stub} bytes) exceeds available space ({available} bytes) in code segment")]
    InsufficientSpace { stub: usize, available: u64 },

    #[error("{} exists but the binary still has PT_INTERP; remove it to patch again", .0.display())]
    StaleSidecar(PathBuf),
}

/// Fatal configuration errors that abort the whole run
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("no interpreter specified: set NIX_BINTOOLS or use --interpreter")]
    NoInterpreter,

    #[error("missing {0}")]
    MissingFile(PathBuf),

    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("interpreter {path} is not a usable ELF file: {source}")]
    Interpreter {
        path: PathBuf,
        #[source]
        source: ElfError,
    },

    #[error("invalid --ignore-missing pattern {pattern:?}: {source}")]
    Pattern {
        pattern: String,
        #[source]
        source: glob::PatternError,
    },

    #[error("no loader specified: use --loader or set WRAP_BUDDY_LOADER")]
    NoLoader,

    #[error("loader not found at {0}")]
    LoaderNotFound(PathBuf),
}
