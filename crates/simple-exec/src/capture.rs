//! Stream capture
//!
//! Output is drained while the process runs, not after it exits: a child that
//! fills a pipe buffer blocks until someone reads, so waiting for exit first
//! can deadlock. Captured output is accumulated in memory without a limit.

use async_process::ChildStdin;
use futures::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use futures_lite::future;
use std::io;
use tracing::debug;

use crate::cancel::CancellationToken;
use crate::error::{Error, Result};
use crate::executor::{Executor, RunOutcome, supervise};
use crate::launch::{LaunchSpec, Redirect};

impl Executor {
    /// Run a process while capturing stdout and stderr
    ///
    /// When `stdin` is given it is written to the process and the pipe is
    /// closed afterwards. Draining, writing and waiting run concurrently and
    /// are all finished before anything is returned. A failure to write
    /// stdin is reported as [`Error::Io`], but only after the process has
    /// been waited for. Cancellation takes precedence over every other
    /// failure; the drains are abandoned when the token fires so that
    /// descendants still holding the pipes cannot hold up the return.
    pub async fn execute_and_capture(
        &self,
        spec: &LaunchSpec,
        token: &CancellationToken,
        stdin: Option<&str>,
    ) -> Result<RunOutcome> {
        let redirect = Redirect {
            stdin: stdin.is_some(),
            ..Redirect::OUTPUT
        };
        self.execute_piped(spec, redirect, token, stdin).await
    }

    /// Run a process with inherited stdout and stderr, writing `stdin` to it
    ///
    /// Stdin failures and cancellation behave as in
    /// [`execute_and_capture`](Self::execute_and_capture); no output is
    /// captured.
    pub async fn execute_with_stdin(
        &self,
        spec: &LaunchSpec,
        token: &CancellationToken,
        stdin: &str,
    ) -> Result<RunOutcome> {
        let redirect = Redirect {
            stdin: true,
            ..Redirect::NONE
        };
        self.execute_piped(spec, redirect, token, Some(stdin)).await
    }

    async fn execute_piped(
        &self,
        spec: &LaunchSpec,
        redirect: Redirect,
        token: &CancellationToken,
        stdin: Option<&str>,
    ) -> Result<RunOutcome> {
        let mut handle = self.start(spec.with_redirect(redirect))?;

        let stdout = handle.take_stdout();
        let stderr = handle.take_stderr();
        let stdin_pipe = handle.take_stdin();

        let io = async {
            let (out, err, fed) = futures::join!(drain(stdout), drain(stderr), feed(stdin_pipe, stdin));
            Some((out, err, fed))
        };
        let io = future::or(io, async {
            token.cancelled().await;
            None
        });

        let (status, io) = futures::join!(supervise(handle, token), io);
        let status = status?;

        let Some((out, err, fed)) = io else {
            // The process exited, but the token fired before its output was drained.
            let cause = token.cancelled_by().unwrap_or_else(|| token.id());
            return Err(Error::Cancelled { token: cause });
        };

        if let Err(e) = fed {
            debug!(error = %e, "failed to write stdin");
            return Err(Error::Io(e));
        }

        let encoding = spec.encoding();
        let decode = |piped: bool, bytes: io::Result<Vec<u8>>| -> Result<Option<String>> {
            if !piped {
                return Ok(None);
            }
            Ok(Some(encoding.decode(bytes?)?))
        };
        Ok(RunOutcome {
            exit_code: status.exit_code(),
            stdout: decode(redirect.stdout, out)?,
            stderr: decode(redirect.stderr, err)?,
        })
    }
}

async fn drain<R: AsyncRead + Unpin>(pipe: Option<R>) -> io::Result<Vec<u8>> {
    let mut buf = Vec::new();
    if let Some(mut pipe) = pipe {
        pipe.read_to_end(&mut buf).await?;
    }
    Ok(buf)
}

async fn feed(pipe: Option<ChildStdin>, input: Option<&str>) -> io::Result<()> {
    let (Some(mut pipe), Some(input)) = (pipe, input) else {
        return Ok(());
    };
    pipe.write_all(input.as_bytes()).await?;
    pipe.flush().await?;
    pipe.close().await
}
