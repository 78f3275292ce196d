//! Error types for command execution

use std::fmt;
use std::io;

use thiserror::Error;

use crate::cancel::CancellationId;

/// Unified error type for command execution
#[derive(Error, Debug)]
pub enum Error {
    /// An argument was rejected before any process was started
    #[error("invalid argument `{parameter}`: {reason}")]
    InvalidArgument {
        /// The name of the offending parameter
        parameter: &'static str,
        /// Why the value was rejected
        reason: String,
    },

    /// The operating system could not start the process
    #[error("failed to start `{program}`: {source}")]
    LaunchFailed {
        /// The program that could not be started
        program: String,
        /// The error reported by the operating system
        #[source]
        source: io::Error,
    },

    /// The process ran to completion with an exit code that was not accepted
    #[error(transparent)]
    ExitCode(#[from] ExitCodeFailure),

    /// The run was abandoned because its cancellation token fired first
    #[error("the command was cancelled by token {token}")]
    Cancelled {
        /// The token that triggered the cancellation
        token: CancellationId,
    },

    /// I/O error while writing stdin or reading captured output
    #[error(transparent)]
    Io(#[from] io::Error),
}

impl Error {
    /// Create an invalid argument error
    pub fn invalid_argument(parameter: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidArgument {
            parameter,
            reason: reason.into(),
        }
    }

    /// Create a launch failure, keeping the OS error as the source
    pub fn launch_failed(program: impl Into<String>, source: io::Error) -> Self {
        Self::LaunchFailed {
            program: program.into(),
            source,
        }
    }

    /// Returns true if the process could not be started because the program does not exist
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::LaunchFailed { source, .. } if source.kind() == io::ErrorKind::NotFound)
    }

    /// Returns true if the run was cancelled
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::Cancelled { .. })
    }

    /// The exit code carried by an [`Error::ExitCode`] failure
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            Error::ExitCode(failure) => Some(failure.exit_code),
            _ => None,
        }
    }
}

/// Output captured from a command whose exit code was rejected
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedOutput {
    /// The contents of standard output (stdout)
    pub stdout: String,
    /// The contents of standard error (stderr)
    pub stderr: String,
}

/// The command exited with an exit code the exit policy did not accept
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExitCodeFailure {
    /// The exit code of the command
    pub exit_code: i32,
    /// Captured output, present when the command was read rather than run
    pub output: Option<CapturedOutput>,
}

impl ExitCodeFailure {
    /// Create a failure without captured output
    pub fn new(exit_code: i32) -> Self {
        Self {
            exit_code,
            output: None,
        }
    }

    /// Attach captured output to the failure
    pub fn with_output(mut self, stdout: impl Into<String>, stderr: impl Into<String>) -> Self {
        self.output = Some(CapturedOutput {
            stdout: stdout.into(),
            stderr: stderr.into(),
        });
        self
    }
}

impl fmt::Display for ExitCodeFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "The command exited with code {}.", self.exit_code)?;
        if let Some(output) = &self.output {
            write!(
                f,
                "\n\nStandard output (stdout):\n\n{}\n\nStandard error (stderr):\n\n{}",
                output.stdout, output.stderr
            )?;
        }
        Ok(())
    }
}

impl std::error::Error for ExitCodeFailure {}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_code_message() {
        let failure = ExitCodeFailure::new(2);
        assert_eq!(failure.to_string(), "The command exited with code 2.");
    }

    #[test]
    fn test_exit_code_message_with_output() {
        let failure = ExitCodeFailure::new(1).with_output("out text", "err text");
        let message = failure.to_string();

        assert!(message.starts_with("The command exited with code 1."));
        assert!(message.contains("Standard output (stdout):\n\nout text"));
        assert!(message.contains("Standard error (stderr):\n\nerr text"));
    }

    #[test]
    fn test_not_found_detection() {
        let err = Error::launch_failed("nope", io::Error::from(io::ErrorKind::NotFound));
        assert!(err.is_not_found());
        assert!(err.to_string().contains("nope"));

        let err = Error::launch_failed("nope", io::Error::from(io::ErrorKind::PermissionDenied));
        assert!(!err.is_not_found());
    }

    #[test]
    fn test_exit_code_accessor() {
        let err = Error::from(ExitCodeFailure::new(42));
        assert_eq!(err.exit_code(), Some(42));
        assert_eq!(err.to_string(), "The command exited with code 42.");

        let err = Error::invalid_argument("program", "must not be empty");
        assert_eq!(err.exit_code(), None);
        assert!(err.to_string().contains("program"));
    }
}
