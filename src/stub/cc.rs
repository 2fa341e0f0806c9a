//! C toolchain backend: `cc` to a linked object, `objcopy` to a flat blob

use std::ffi::OsString;
use std::process::Command;

use tracing::debug;

use crate::error::StubError;

use super::StubCompiler;
use super::StubSource;

/// Compiles the stub with an external C compiler and objcopy
#[derive(Debug, Clone)]
pub struct CcCompiler {
    pub cc: String,
    pub objcopy: String,
}

impl Default for CcCompiler {
    fn default() -> Self {
        Self {
            cc: "cc".to_string(),
            objcopy: "objcopy".to_string(),
        }
    }
}

impl CcCompiler {
    pub fn new(cc: impl Into<String>, objcopy: impl Into<String>) -> Self {
        Self {
            cc: cc.into(),
            objcopy: objcopy.into(),
        }
    }
}

fn run(program: &str, args: &[OsString]) -> Result<(), StubError> {
    debug!(program, ?args, "running stub toolchain");
    let output = Command::new(program)
        .args(args)
        .output()
        .map_err(|source| StubError::Spawn {
            program: program.to_string(),
            source,
        })?;
    if !output.status.success() {
        return Err(StubError::ToolFailed {
            program: program.to_string(),
            status: output.status,
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }
    Ok(())
}

impl StubCompiler for CcCompiler {
    fn compile(&self, source: &StubSource, flags: &[String]) -> Result<Vec<u8>, StubError> {
        // Removed on drop, whichever way we leave
        let scratch = tempfile::Builder::new().prefix("wrapbuddy-stub").tempdir()?;
        let files = source.materialize(scratch.path())?;
        let elf_file = scratch.path().join("stub.elf");
        let bin_file = scratch.path().join("stub.bin");

        let mut cc_args: Vec<OsString> = flags.iter().map(OsString::from).collect();
        let mut include = OsString::from("-I");
        include.push(&files.include_dir);
        cc_args.push(include);
        let mut script = OsString::from("-Wl,-T,");
        script.push(&files.linker_script);
        cc_args.push(script);
        cc_args.push("-o".into());
        cc_args.push(elf_file.clone().into_os_string());
        cc_args.push(files.stub_c.into_os_string());
        run(&self.cc, &cc_args)?;

        let objcopy_args: Vec<OsString> = vec![
            "-O".into(),
            "binary".into(),
            "--only-section=.all".into(),
            elf_file.into_os_string(),
            bin_file.clone().into_os_string(),
        ];
        run(&self.objcopy, &objcopy_args)?;

        Ok(std::fs::read(&bin_file)?)
    }
}
