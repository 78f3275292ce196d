//! Execution coordinator
//!
//! [`Executor::execute`] starts one process and races its exit against a
//! [`CancellationToken`]. The exit observer runs in the awaiting task; the
//! cancellation observer runs as a token callback on whichever thread
//! cancels. Both try to move the shared [`RunGuard`] out of `Running`, and only
//! the winner fulfills the [`CompletionLatch`] the executor is waiting on.
//! When cancellation wins, the awaiting task kills the process before it
//! returns.

use futures_lite::future;
use std::io;
use std::sync::Arc;
use tracing::debug;

use crate::cancel::{CancellationId, CancellationToken};
use crate::echo::Echo;
use crate::error::{Error, Result};
use crate::latch::{CompletionLatch, RunGuard, RunState};
use crate::launch::LaunchSpec;
use crate::process::{ExitStatus, ProcessHandle};

/// The result of a run that was not cancelled
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOutcome {
    /// The exit code of the process
    pub exit_code: i32,
    /// Captured standard output, when captured
    pub stdout: Option<String>,
    /// Captured standard error, when captured
    pub stderr: Option<String>,
}

impl RunOutcome {
    /// Returns true if the exit code is zero
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Runs processes with echo and cancellation
#[derive(Debug, Clone)]
pub struct Executor {
    /// Echo configuration, `None` when echo is disabled
    echo: Option<Echo>,
    /// Leave descendants running when a run is cancelled
    cancellation_ignores_process_tree: bool,
}

impl Executor {
    /// Create an executor that echoes to stderr with the given prefix
    pub fn new(echo_prefix: impl Into<String>) -> Self {
        Self {
            echo: Some(Echo::new(echo_prefix)),
            cancellation_ignores_process_tree: false,
        }
    }

    /// Replace the echo configuration
    pub fn with_echo(mut self, echo: Echo) -> Self {
        self.echo = Some(echo);
        self
    }

    /// Disable echo
    pub fn no_echo(mut self) -> Self {
        self.echo = None;
        self
    }

    /// Only kill the direct child on cancellation
    ///
    /// Cancellation is cheaper, but any descendants the child started keep
    /// running after the run is reported as cancelled.
    pub fn cancellation_ignores_process_tree(mut self, ignore: bool) -> Self {
        self.cancellation_ignores_process_tree = ignore;
        self
    }

    /// The echo configuration, if echo is enabled
    pub fn echo(&self) -> Option<&Echo> {
        self.echo.as_ref()
    }

    /// Run a process to completion or cancellation
    ///
    /// Standard streams follow the spec's redirect flags; piped streams are
    /// not read. Use [`execute_and_capture`](Self::execute_and_capture) to
    /// collect output.
    pub async fn execute(&self, spec: &LaunchSpec, token: &CancellationToken) -> Result<RunOutcome> {
        let handle = self.start(spec.clone())?;
        let status = supervise(handle, token).await?;

        Ok(RunOutcome {
            exit_code: status.exit_code(),
            stdout: None,
            stderr: None,
        })
    }

    /// Validate, echo and spawn
    pub(crate) fn start(&self, spec: LaunchSpec) -> Result<ProcessHandle> {
        spec.validate()?;

        if let Some(echo) = &self.echo {
            echo.emit(&spec)?;
        }

        ProcessHandle::start(spec, !self.cancellation_ignores_process_tree)
    }
}

impl Default for Executor {
    fn default() -> Self {
        Self {
            echo: Some(Echo::default()),
            cancellation_ignores_process_tree: false,
        }
    }
}

/// What the winning observer hands to the waiting executor
#[derive(Debug)]
enum Signal {
    Exited(io::Result<ExitStatus>),
    Cancelled(CancellationId),
}

/// State shared between the two observers of a run
#[derive(Debug)]
struct Run {
    guard: RunGuard,
    latch: CompletionLatch<Signal>,
}

/// Wait for a started process, racing its exit against `token`
///
/// The token callback only claims the run; the kill is sent from here, by
/// the owner of the child, and only while the child has not been reaped.
/// The handle is dropped, and the token callback unregistered, before this
/// returns on every path.
pub(crate) async fn supervise(mut handle: ProcessHandle, token: &CancellationToken) -> Result<ExitStatus> {
    let pid = handle.pid();
    let run = Arc::new(Run {
        guard: RunGuard::new(),
        latch: CompletionLatch::new(),
    });

    let registration = {
        let run = run.clone();
        token.register(move |cause| {
            if run.guard.try_transition(RunState::Cancelled) {
                run.latch.fulfill(Signal::Cancelled(cause));
            }
        })
    };

    let observe_exit = async {
        let status = handle.wait().await;
        if run.guard.try_transition(RunState::Completed) {
            run.latch.fulfill(Signal::Exited(status));
        }
        future::pending::<Option<Signal>>().await
    };

    // Awaiting the token is what fires a deadline; its callback does the rest.
    let observe_deadline = async {
        token.cancelled().await;
        future::pending::<Option<Signal>>().await
    };

    let signal = future::or(
        run.latch.wait(),
        future::or(observe_exit, observe_deadline),
    )
    .await;

    drop(registration);

    if let Some(Signal::Cancelled(cause)) = &signal {
        let killed = handle.terminate();
        debug!(pid, killed, cause = %cause, "run cancelled");
    }
    drop(handle);

    match signal {
        Some(Signal::Exited(Ok(status))) => {
            debug!(pid, code = status.exit_code(), "process exited");
            Ok(status)
        }
        Some(Signal::Exited(Err(e))) => Err(Error::Io(e)),
        Some(Signal::Cancelled(cause)) => Err(Error::Cancelled { token: cause }),
        None => Err(Error::Io(io::Error::other("completion latch was abandoned"))),
    }
}
