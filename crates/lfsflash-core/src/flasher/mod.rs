//! Uploading an image with an external flashing tool
//!
//! [`flash_image`] checks the image exists, runs the tool through a
//! [`ProcessRunner`] and turns a non-zero exit into [`FlashError::ToolFailed`].

mod command;
mod runner;

pub use command::{
    FlashCommand, FlashSettings, DEFAULT_BAUD, DEFAULT_CHIP, DEFAULT_FLASH_FREQ,
    DEFAULT_FLASH_MODE, DEFAULT_FLASH_SIZE, DEFAULT_OFFSET, DEFAULT_TOOL, SECTOR_SIZE,
};
pub use runner::{ProcessRunner, SystemRunner, ToolOutput};

use std::io;

use thiserror::Error;

use crate::error::{Error, Result};

/// Errors from running the flashing tool
#[derive(Debug, Error)]
pub enum FlashError {
    /// The program is not on the search path
    #[error("{program} not found, install it with `pip install esptool` and make sure it is on PATH")]
    ToolNotFound {
        /// Program that was looked up
        program: String,
    },

    /// The program ran and exited unsuccessfully
    #[error("{program} failed (exit={code:?}): {}", stderr.trim())]
    ToolFailed {
        /// Program that failed
        program: String,
        /// Exit code, `None` if killed by a signal
        code: Option<i32>,
        /// Captured standard output
        stdout: String,
        /// Captured standard error
        stderr: String,
    },

    /// The program could not be started for another reason
    #[error("failed to start {program}")]
    Spawn {
        /// Program that could not be started
        program: String,
        /// Underlying error
        #[source]
        source: io::Error,
    },
}

/// Output of a successful upload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlashReport {
    /// The command line that was run
    pub command_line: String,
    /// Tool standard output
    pub stdout: String,
    /// Tool standard error (esptool prints some progress here)
    pub stderr: String,
}

/// Write the image named by `command` to flash
pub fn flash_image(runner: &dyn ProcessRunner, command: &FlashCommand) -> Result<FlashReport> {
    if !command.image.is_file() {
        return Err(Error::MissingImage(command.image.clone()));
    }

    if !command.is_sector_aligned() {
        log::warn!(
            "Offset 0x{:X} is not aligned to the {} byte flash sector size",
            command.offset,
            SECTOR_SIZE
        );
    }

    let command_line = command.command_line();
    log::info!(
        "Uploading {} at offset 0x{:X}",
        command.image.display(),
        command.offset
    );
    log::info!("Running: {}", command_line);

    let output = runner.run(command.program(), &command.args())?;
    if !output.success() {
        return Err(FlashError::ToolFailed {
            program: command.program().to_string(),
            code: output.code,
            stdout: output.stdout,
            stderr: output.stderr,
        }
        .into());
    }

    log::debug!("{} exited successfully", command.program());
    Ok(FlashReport {
        command_line,
        stdout: output.stdout,
        stderr: output.stderr,
    })
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::cell::RefCell;

    /// Records invocations and replays a canned result
    pub(crate) struct FakeRunner {
        pub calls: RefCell<Vec<(String, Vec<String>)>>,
        result: RefCell<Option<std::result::Result<ToolOutput, FlashError>>>,
    }

    impl FakeRunner {
        pub fn exiting(code: i32, stdout: &str, stderr: &str) -> Self {
            Self::with_result(Ok(ToolOutput {
                code: Some(code),
                stdout: stdout.to_string(),
                stderr: stderr.to_string(),
            }))
        }

        pub fn not_found() -> Self {
            Self::with_result(Err(FlashError::ToolNotFound {
                program: DEFAULT_TOOL.to_string(),
            }))
        }

        fn with_result(result: std::result::Result<ToolOutput, FlashError>) -> Self {
            Self {
                calls: RefCell::new(Vec::new()),
                result: RefCell::new(Some(result)),
            }
        }

        pub fn call_count(&self) -> usize {
            self.calls.borrow().len()
        }
    }

    impl ProcessRunner for FakeRunner {
        fn run(
            &self,
            program: &str,
            args: &[String],
        ) -> std::result::Result<ToolOutput, FlashError> {
            self.calls
                .borrow_mut()
                .push((program.to_string(), args.to_vec()));
            self.result
                .borrow_mut()
                .take()
                .unwrap_or_else(|| panic!("unexpected second call to {program}"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::FakeRunner;
    use super::*;
    use std::fs;

    fn image_in(dir: &tempfile::TempDir) -> std::path::PathBuf {
        let path = dir.path().join("littlefs.bin");
        fs::write(&path, vec![0xFF; 4096]).unwrap();
        path
    }

    #[test]
    fn test_flash_success_passes_arguments() {
        let dir = tempfile::tempdir().unwrap();
        let image = image_in(&dir);
        let runner = FakeRunner::exiting(0, "Hash of data verified.", "");
        let command = FlashCommand::new(&image, Some("COM3".to_string()), DEFAULT_OFFSET);

        let report = flash_image(&runner, &command).unwrap();
        assert_eq!(report.stdout, "Hash of data verified.");
        assert_eq!(report.command_line, command.command_line());

        let calls = runner.calls.borrow();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0, "esptool.py");
        assert_eq!(calls[0].1, command.args());
    }

    #[test]
    fn test_flash_failure_carries_stderr() {
        let dir = tempfile::tempdir().unwrap();
        let image = image_in(&dir);
        let runner = FakeRunner::exiting(2, "", "Failed to connect to ESP32-S3\n");
        let command = FlashCommand::new(&image, None, DEFAULT_OFFSET);

        let err = flash_image(&runner, &command).unwrap_err();
        match err {
            Error::Flash(FlashError::ToolFailed { code, stderr, .. }) => {
                assert_eq!(code, Some(2));
                assert!(stderr.contains("Failed to connect"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_flash_tool_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let image = image_in(&dir);
        let runner = FakeRunner::not_found();
        let command = FlashCommand::new(&image, None, DEFAULT_OFFSET);

        let err = flash_image(&runner, &command).unwrap_err();
        assert!(matches!(err, Error::Flash(FlashError::ToolNotFound { .. })));
        assert!(err.to_string().contains("upload failed"));
    }

    #[test]
    fn test_missing_image_never_runs_tool() {
        let dir = tempfile::tempdir().unwrap();
        let runner = FakeRunner::exiting(0, "", "");
        let command = FlashCommand::new(dir.path().join("absent.bin"), None, DEFAULT_OFFSET);

        let err = flash_image(&runner, &command).unwrap_err();
        assert!(matches!(err, Error::MissingImage(_)));
        assert_eq!(runner.call_count(), 0);
    }

    #[test]
    fn test_tool_failed_message() {
        let err = FlashError::ToolFailed {
            program: "esptool.py".to_string(),
            code: Some(1),
            stdout: String::new(),
            stderr: "A fatal error occurred\n".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "esptool.py failed (exit=Some(1)): A fatal error occurred"
        );
    }
}
