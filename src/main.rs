use std::io;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use wrapbuddy::error::ConfigError;
use wrapbuddy::ignore_patterns;
use wrapbuddy::run;
use wrapbuddy::CcCompiler;
use wrapbuddy::InterpreterInfo;
use wrapbuddy::Options;
use wrapbuddy::StubSource;
use wrapbuddy::DEFAULT_TRUSTED_PREFIX;

/// Patch prebuilt ELF executables to start through an external loader
#[derive(Parser, Debug)]
#[command(name = "wrap-buddy", version)]
struct Cli {
    /// Executables or directories to patch; also searched for libraries
    #[arg(long, required = true, num_args = 1..)]
    paths: Vec<PathBuf>,

    /// Additional library directories (not recursive)
    #[arg(long, num_args = 1..)]
    libs: Vec<PathBuf>,

    /// Paths always added to the RPATH
    #[arg(long = "runtime-dependencies", num_args = 1..)]
    runtime_dependencies: Vec<PathBuf>,

    /// Glob patterns for dependencies that may stay unresolved
    #[arg(long = "ignore-missing", num_args = 1..)]
    ignore_missing: Vec<String>,

    /// Do not descend into subdirectories of --paths
    #[arg(long)]
    no_recurse: bool,

    /// Report what would be patched without writing anything
    #[arg(long)]
    dry_run: bool,

    /// Interpreter to record in the sidecar, instead of the one from bintools
    #[arg(long)]
    interpreter: Option<String>,

    /// Build-environment root providing nix-support/dynamic-linker
    #[arg(long, env = "NIX_BINTOOLS")]
    bintools: Option<PathBuf>,

    /// Loader binary each stub maps and jumps to
    #[arg(long, env = "WRAP_BUDDY_LOADER")]
    loader: Option<PathBuf>,

    /// Directory with stub.c and preamble.ld overriding the built-in sources
    #[arg(long)]
    stub_source_dir: Option<PathBuf>,

    /// Interpreters under this prefix are considered already usable
    #[arg(long, default_value = DEFAULT_TRUSTED_PREFIX)]
    trusted_prefix: String,

    /// C compiler for the stub
    #[arg(long, env = "CC", default_value = "cc")]
    cc: String,

    /// objcopy used to extract the flat stub
    #[arg(long, env = "OBJCOPY", default_value = "objcopy")]
    objcopy: String,
}

fn interpreter(cli: &Cli) -> Result<InterpreterInfo, ConfigError> {
    match (&cli.interpreter, &cli.bintools) {
        (Some(path), _) => InterpreterInfo::from_path(path.clone(), None),
        (None, Some(root)) => InterpreterInfo::from_bintools(root),
        (None, None) => Err(ConfigError::NoInterpreter),
    }
}

fn loader(cli: &Cli) -> Result<PathBuf, ConfigError> {
    match &cli.loader {
        Some(path) if path.exists() => Ok(path.clone()),
        Some(path) => Err(ConfigError::LoaderNotFound(path.clone())),
        // The stub is never compiled in a dry run
        None if cli.dry_run => Ok(PathBuf::new()),
        None => Err(ConfigError::NoLoader),
    }
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(io::stderr)
        .without_time()
        .init();

    let cli = Cli::parse();

    let setup = (|| -> Result<_, ConfigError> {
        let interp = interpreter(&cli)?;
        let loader = loader(&cli)?;
        let ignore_missing = ignore_patterns(&cli.ignore_missing)?;
        Ok((interp, loader, ignore_missing))
    })();
    let (interp, loader, ignore_missing) = match setup {
        Ok(setup) => setup,
        Err(err) => {
            eprintln!("error: {}", err);
            return ExitCode::FAILURE;
        }
    };
    info!(interpreter = %interp.path, "using interpreter");

    let options = Options {
        paths: cli.paths,
        libs: cli.libs,
        runtime_deps: cli.runtime_dependencies,
        ignore_missing,
        recursive: !cli.no_recurse,
        dry_run: cli.dry_run,
        trusted_prefix: cli.trusted_prefix,
    };
    let stub_source = match cli.stub_source_dir {
        Some(dir) => StubSource::Dir(dir),
        None => StubSource::Embedded,
    };
    let compiler = CcCompiler::new(cli.cc, cli.objcopy);

    let report = run(&options, &interp, stub_source, loader, &compiler);
    info!(
        patched = report.patched.len(),
        skipped = report.skipped.len(),
        "done"
    );
    if let Err(err) = report.write_errors(&mut io::stderr()) {
        eprintln!("error: failed to write report: {}", err);
        return ExitCode::FAILURE;
    }

    if report.is_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}
