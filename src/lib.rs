//! wrapbuddy: retrofit prebuilt ELF executables for a non-FHS store layout
//!
//! Dynamically linked executables hardcode an interpreter path such as
//! `/lib64/ld-linux-x86-64.so.2`. Instead of rewriting that path, wrapbuddy
//! overwrites the bytes at the entry point with a small stub that maps an
//! external loader and jumps to it. The displaced bytes, the real
//! interpreter and the computed library search path go into a hidden
//! sidecar file (`.NAME.wrapbuddy`) next to the binary, where the loader
//! picks them up.
//!
//! # Example
//!
//! ```no_run
//! use std::path::PathBuf;
//!
//! use wrapbuddy::{run, CcCompiler, InterpreterInfo, Options, StubSource};
//!
//! let interp = InterpreterInfo::from_bintools("/nix/store/...-bintools".as_ref()).unwrap();
//! let options = Options {
//!     paths: vec![PathBuf::from("./opt/app")],
//!     ..Options::default()
//! };
//! let report = run(
//!     &options,
//!     &interp,
//!     StubSource::Embedded,
//!     PathBuf::from("/nix/store/...-loader/bin/loader"),
//!     &CcCompiler::default(),
//! );
//! std::process::exit(report.exit_code());
//! ```

pub mod elf;
pub mod error;
pub mod interpreter;
pub mod name;
pub mod patch;
pub mod resolve;
pub mod run;
pub mod sidecar;
pub mod soname;
pub mod stub;
pub mod walk;

pub use error::ConfigError;
pub use error::ElfError;
pub use error::PatchError;
pub use error::SidecarError;
pub use error::StubError;
pub use interpreter::InterpreterInfo;
pub use name::sidecar_path;
pub use patch::patch_binary;
pub use patch::PatchConfig;
pub use patch::PatchOutcome;
pub use resolve::build_rpath;
pub use resolve::Resolver;
pub use run::ignore_patterns;
pub use run::process_binary;
pub use run::run;
pub use run::BinaryOutcome;
pub use run::MissingDeps;
pub use run::Options;
pub use run::RunReport;
pub use run::SkipReason;
pub use run::DEFAULT_TRUSTED_PREFIX;
pub use sidecar::read_sidecar;
pub use sidecar::restore_image;
pub use sidecar::SidecarRecord;
pub use soname::CacheBuilder;
pub use soname::SonameCache;
pub use stub::CcCompiler;
pub use stub::StubCompiler;
pub use stub::StubSource;
