//! Child process execution.

use std::collections::BTreeMap;
use std::io;
use std::path::Path;
use std::process::{Command, ExitStatus, Stdio};

use objcache_store::CapturedOutput;

/// Exit code, stdout and stderr of a finished child.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunResult {
    pub exit_code: i32,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

impl RunResult {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    pub fn stdout_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }

    pub fn stderr_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stderr).into_owned()
    }
}

impl From<RunResult> for CapturedOutput {
    fn from(result: RunResult) -> Self {
        CapturedOutput {
            stdout: result.stdout,
            stderr: result.stderr,
            exit_code: result.exit_code,
        }
    }
}

/// Run `program` with exactly `env` in `cwd` and wait for it.
///
/// `args` excludes the program itself. Stdin is inherited; stdout and stderr
/// are captured.
pub fn run(
    program: &Path,
    args: &[String],
    env: &BTreeMap<String, String>,
    cwd: &Path,
) -> io::Result<RunResult> {
    tracing::trace!(program = %program.display(), ?args, "spawning");
    let output = Command::new(program)
        .args(args)
        .env_clear()
        .envs(env)
        .current_dir(cwd)
        .stdin(Stdio::inherit())
        .output()?;

    Ok(RunResult {
        exit_code: exit_code_of(output.status),
        stdout: output.stdout,
        stderr: output.stderr,
    })
}

/// Shell-style exit code: a child killed by signal `n` reports `128 + n`.
fn exit_code_of(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return 128 + signal;
        }
    }
    1
}
