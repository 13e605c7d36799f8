//! Child process execution
//!
//! The flashing tool is the only thing that touches hardware, so it runs
//! behind [`ProcessRunner`]; tests substitute a recording fake.

use std::io;
use std::process::Command;

use super::FlashError;

/// Captured result of a finished child process
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolOutput {
    /// Exit code; `None` if the process was killed by a signal
    pub code: Option<i32>,
    /// Captured standard output
    pub stdout: String,
    /// Captured standard error
    pub stderr: String,
}

impl ToolOutput {
    /// Whether the process exited with status zero
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

/// Runs external programs to completion
pub trait ProcessRunner {
    /// Run `program` with `args`, wait for it and capture its output
    ///
    /// A program missing from the search path maps to
    /// [`FlashError::ToolNotFound`]. A non-zero exit is not an error here.
    fn run(&self, program: &str, args: &[String]) -> Result<ToolOutput, FlashError>;
}

/// Runs programs with `std::process::Command`
///
/// Blocks until the child exits; no timeout is applied.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemRunner;

impl ProcessRunner for SystemRunner {
    fn run(&self, program: &str, args: &[String]) -> Result<ToolOutput, FlashError> {
        log::debug!("spawning {} with {} arguments", program, args.len());

        let output = Command::new(program)
            .args(args)
            .output()
            .map_err(|source| match source.kind() {
                io::ErrorKind::NotFound => FlashError::ToolNotFound {
                    program: program.to_string(),
                },
                _ => FlashError::Spawn {
                    program: program.to_string(),
                    source,
                },
            })?;

        Ok(ToolOutput {
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_program_is_tool_not_found() {
        let err = SystemRunner
            .run("lfsflash-definitely-not-installed-tool", &[])
            .unwrap_err();
        assert!(matches!(err, FlashError::ToolNotFound { program } if program == "lfsflash-definitely-not-installed-tool"));
    }

    #[cfg(unix)]
    #[test]
    fn test_captures_output_and_exit_code() {
        let args = vec!["-c".to_string(), "echo out; echo err >&2; exit 3".to_string()];
        let output = SystemRunner.run("sh", &args).unwrap();
        assert_eq!(output.code, Some(3));
        assert!(!output.success());
        assert_eq!(output.stdout.trim(), "out");
        assert_eq!(output.stderr.trim(), "err");
    }

    #[cfg(unix)]
    #[test]
    fn test_success() {
        let output = SystemRunner.run("true", &[]).unwrap();
        assert!(output.success());
    }
}
