//! Run child processes with echo, capture, exit-code policy and cancellation
//!
//! The crate wraps the operating system's process API with a few defaults:
//! the command line is echoed (with secrets redacted) before the process
//! starts, a non-zero exit code becomes an [`Error::ExitCode`], and a run can
//! be abandoned through a [`CancellationToken`], which kills the process (and
//! by default its descendants).
//!
//! ```no_run
//! use simple_exec::Command;
//! use std::time::Duration;
//!
//! # fn main() -> simple_exec::Result<()> {
//! smol::block_on(async {
//!     Command::new("cargo").args(["build", "--release"]).run().await?;
//!
//!     let output = Command::new("git")
//!         .args(["rev-parse", "HEAD"])
//!         .no_echo()
//!         .timeout(Duration::from_secs(5))
//!         .read()
//!         .await?;
//!     println!("{}", output.stdout.trim());
//!     Ok::<_, simple_exec::Error>(())
//! })
//! # }
//! ```
//!
//! Lower-level control is available through [`Executor`], which works on an
//! immutable [`LaunchSpec`].

#![warn(missing_docs)]

pub mod cancel;
pub mod capture;
pub mod command;
pub mod echo;
pub mod error;
pub mod executor;
pub mod exit_policy;
pub mod latch;
pub mod launch;
pub mod process;

pub use cancel::{CancellationId, CancellationToken, Registration};
pub use command::{Command, Output};
pub use echo::{DEFAULT_ECHO_PREFIX, Echo, EchoSink, REDACTED, SharedBuffer};
pub use error::{CapturedOutput, Error, ExitCodeFailure, Result};
pub use executor::{Executor, RunOutcome};
pub use exit_policy::ExitCodeHandler;
pub use launch::{LaunchSpec, LaunchSpecBuilder, OutputEncoding, Redirect};
pub use process::{ExitStatus, ProcessHandle};
