//! Convenience builder for running and reading commands
//!
//! [`Command`] gathers launch settings, echo settings, an exit-code handler
//! and cancellation into one value, then offers two terminal operations:
//! [`run`](Command::run) inherits the standard streams and
//! [`read`](Command::read) captures them.

use std::ffi::OsStr;
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use crate::cancel::{CancellationToken, Registration};
use crate::echo::{DEFAULT_ECHO_PREFIX, Echo, EchoSink};
use crate::error::Result;
use crate::executor::Executor;
use crate::exit_policy::{self, ExitCodeHandler};
use crate::launch::{LaunchSpec, LaunchSpecBuilder, OutputEncoding};

/// Output captured by [`Command::read`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Output {
    /// The contents of standard output (stdout)
    pub stdout: String,
    /// The contents of standard error (stderr)
    pub stderr: String,
}

/// A command to be run or read
///
/// Unlike the process it describes, a `Command` is `Clone` and can be run
/// any number of times.
#[derive(Clone)]
pub struct Command {
    launch: LaunchSpecBuilder,
    echo_prefix: String,
    echo_sink: EchoSink,
    secrets: Vec<String>,
    no_echo: bool,
    handle_exit_code: Option<Arc<ExitCodeHandler>>,
    cancellation: Option<CancellationToken>,
    timeout: Option<Duration>,
    cancellation_ignores_process_tree: bool,
    stdin: Option<String>,
}

impl Command {
    /// Create a new command for the given program
    pub fn new<S: AsRef<OsStr>>(program: S) -> Self {
        Self {
            launch: LaunchSpec::builder(program),
            echo_prefix: DEFAULT_ECHO_PREFIX.to_string(),
            echo_sink: EchoSink::default(),
            secrets: Vec::new(),
            no_echo: false,
            handle_exit_code: None,
            cancellation: None,
            timeout: None,
            cancellation_ignores_process_tree: false,
            stdin: None,
        }
    }

    /// Add an argument to the command
    pub fn arg<S: AsRef<OsStr>>(mut self, arg: S) -> Self {
        self.launch = self.launch.arg(arg);
        self
    }

    /// Add multiple arguments to the command
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        self.launch = self.launch.args(args);
        self
    }

    /// Set the working directory for the command
    pub fn current_dir<P: AsRef<Path>>(mut self, dir: P) -> Self {
        self.launch = self.launch.current_dir(dir);
        self
    }

    /// Set an environment variable
    pub fn env<K, V>(mut self, key: K, val: V) -> Self
    where
        K: AsRef<OsStr>,
        V: AsRef<OsStr>,
    {
        self.launch = self.launch.env(key, val);
        self
    }

    /// Set multiple environment variables
    pub fn envs<I, K, V>(mut self, vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<OsStr>,
        V: AsRef<OsStr>,
    {
        self.launch = self.launch.envs(vars);
        self
    }

    /// Remove an inherited environment variable
    pub fn env_remove<K: AsRef<OsStr>>(mut self, key: K) -> Self {
        self.launch = self.launch.env_remove(key);
        self
    }

    /// Suppress the console window of the child (Windows only)
    pub fn create_no_window(mut self, create_no_window: bool) -> Self {
        self.launch = self.launch.create_no_window(create_no_window);
        self
    }

    /// Set the encoding used by [`read`](Self::read)
    pub fn encoding(mut self, encoding: OutputEncoding) -> Self {
        self.launch = self.launch.encoding(encoding);
        self
    }

    /// Do not echo the command line
    pub fn no_echo(mut self) -> Self {
        self.no_echo = true;
        self
    }

    /// Set the label written before echoed lines
    pub fn echo_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.echo_prefix = prefix.into();
        self
    }

    /// Echo to a different sink
    pub fn echo_to(mut self, sink: EchoSink) -> Self {
        self.echo_sink = sink;
        self
    }

    /// Redact a secret from the echoed command line
    pub fn secret(mut self, secret: impl Into<String>) -> Self {
        self.secrets.push(secret.into());
        self
    }

    /// Accept exit codes for which `handler` returns true
    pub fn handle_exit_code<F>(mut self, handler: F) -> Self
    where
        F: Fn(i32) -> bool + Send + Sync + 'static,
    {
        let handler: Arc<ExitCodeHandler> = Arc::new(handler);
        self.handle_exit_code = Some(handler);
        self
    }

    /// Give up when `token` is cancelled
    pub fn cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = Some(token);
        self
    }

    /// Give up after `timeout`
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Only kill the direct child on cancellation, leaving its descendants
    pub fn cancellation_ignores_process_tree(mut self, ignore: bool) -> Self {
        self.cancellation_ignores_process_tree = ignore;
        self
    }

    /// Text written to standard input, which is then closed
    ///
    /// Used by both [`run`](Self::run) and [`read`](Self::read). Without it
    /// `run` lets the child inherit standard input.
    pub fn stdin(mut self, input: impl Into<String>) -> Self {
        self.stdin = Some(input.into());
        self
    }

    /// The launch spec this command describes
    pub fn spec(&self) -> LaunchSpec {
        self.launch.clone().build()
    }

    /// The executor this command runs with
    pub fn executor(&self) -> Executor {
        let executor = Executor::new(self.echo_prefix.clone())
            .cancellation_ignores_process_tree(self.cancellation_ignores_process_tree);
        if self.no_echo {
            return executor.no_echo();
        }

        let echo = self
            .secrets
            .iter()
            .fold(Echo::new(self.echo_prefix.clone()), |echo, secret| {
                echo.with_secret(secret.clone())
            })
            .with_sink(self.echo_sink.clone());
        executor.with_echo(echo)
    }

    /// The token to observe, with the link that keeps it tied to the caller's
    fn token(&self) -> (CancellationToken, Option<Registration>) {
        match (&self.cancellation, self.timeout) {
            (Some(token), None) => (token.clone(), None),
            (Some(token), Some(timeout)) => {
                let (token, link) = token.linked(Some(timeout));
                (token, Some(link))
            }
            (None, Some(timeout)) => (CancellationToken::with_timeout(timeout), None),
            (None, None) => (CancellationToken::new(), None),
        }
    }

    /// Run the command with inherited standard streams
    ///
    /// Standard input is piped instead when [`stdin`](Self::stdin) was set.
    /// Fails with [`Error::ExitCode`](crate::Error::ExitCode) if the exit code
    /// is not accepted.
    pub async fn run(&self) -> Result<()> {
        let (token, _link) = self.token();
        let executor = self.executor();
        let spec = self.spec();
        let outcome = match &self.stdin {
            Some(input) => executor.execute_with_stdin(&spec, &token, input).await?,
            None => executor.execute(&spec, &token).await?,
        };
        exit_policy::evaluate(outcome.exit_code, self.handle_exit_code.as_deref())?;
        Ok(())
    }

    /// Run the command and capture stdout and stderr
    ///
    /// An unaccepted exit code fails with the captured output attached.
    pub async fn read(&self) -> Result<Output> {
        let (token, _link) = self.token();
        let outcome = self
            .executor()
            .execute_and_capture(&self.spec(), &token, self.stdin.as_deref())
            .await?;
        exit_policy::evaluate_outcome(&outcome, self.handle_exit_code.as_deref())?;

        Ok(Output {
            stdout: outcome.stdout.unwrap_or_default(),
            stderr: outcome.stderr.unwrap_or_default(),
        })
    }

    /// Blocking variant of [`run`](Self::run)
    pub fn run_blocking(&self) -> Result<()> {
        futures_lite::future::block_on(self.run())
    }

    /// Blocking variant of [`read`](Self::read)
    pub fn read_blocking(&self) -> Result<Output> {
        futures_lite::future::block_on(self.read())
    }
}

impl fmt::Debug for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Command")
            .field("spec", &self.spec())
            .field("echo_prefix", &self.echo_prefix)
            .field("no_echo", &self.no_echo)
            .field("handle_exit_code", &self.handle_exit_code.is_some())
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}
