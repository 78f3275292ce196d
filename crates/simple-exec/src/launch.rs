//! Launch specification for a single child process
//!
//! A [`LaunchSpec`] is an immutable description of how to start one process.
//! It is assembled with [`LaunchSpec::builder`] and converted into an
//! `async_process::Command` only at spawn time, so the same spec can be run
//! any number of times.

use async_process::{Command as AsyncCommand, Stdio};
use std::collections::HashMap;
use std::ffi::{OsStr, OsString};
use std::io;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Which standard streams are redirected to pipes owned by the parent
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Redirect {
    /// Pipe standard output
    pub stdout: bool,
    /// Pipe standard error
    pub stderr: bool,
    /// Pipe standard input
    pub stdin: bool,
}

impl Redirect {
    /// Inherit all streams from the parent
    pub const NONE: Redirect = Redirect {
        stdout: false,
        stderr: false,
        stdin: false,
    };

    /// Pipe stdout and stderr
    pub const OUTPUT: Redirect = Redirect {
        stdout: true,
        stderr: true,
        stdin: false,
    };
}

/// Text encoding used to decode captured output
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OutputEncoding {
    /// UTF-8, replacing invalid sequences with U+FFFD
    #[default]
    Utf8Lossy,
    /// UTF-8, rejecting invalid sequences with an `InvalidData` error
    Utf8,
}

impl OutputEncoding {
    /// Decode captured bytes into text
    pub fn decode(self, bytes: Vec<u8>) -> io::Result<String> {
        match self {
            OutputEncoding::Utf8Lossy => Ok(match String::from_utf8(bytes) {
                Ok(text) => text,
                Err(err) => String::from_utf8_lossy(err.as_bytes()).into_owned(),
            }),
            OutputEncoding::Utf8 => String::from_utf8(bytes)
                .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e)),
        }
    }
}

/// Immutable description of a process to start
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchSpec {
    program: OsString,
    args: Vec<OsString>,
    env: HashMap<OsString, OsString>,
    env_remove: Vec<OsString>,
    current_dir: Option<PathBuf>,
    create_no_window: bool,
    redirect: Redirect,
    encoding: OutputEncoding,
}

impl LaunchSpec {
    /// Start building a spec for the given program
    pub fn builder<S: AsRef<OsStr>>(program: S) -> LaunchSpecBuilder {
        LaunchSpecBuilder {
            spec: LaunchSpec {
                program: program.as_ref().to_owned(),
                args: Vec::new(),
                env: HashMap::new(),
                env_remove: Vec::new(),
                current_dir: None,
                create_no_window: false,
                redirect: Redirect::NONE,
                encoding: OutputEncoding::default(),
            },
        }
    }

    /// Get the program name
    pub fn program(&self) -> &OsStr {
        &self.program
    }

    /// Get the arguments
    pub fn args(&self) -> &[OsString] {
        &self.args
    }

    /// Get the environment overrides
    pub fn envs(&self) -> &HashMap<OsString, OsString> {
        &self.env
    }

    /// Get the names removed from the inherited environment
    pub fn env_removals(&self) -> &[OsString] {
        &self.env_remove
    }

    /// Get the working directory
    pub fn current_dir(&self) -> Option<&Path> {
        self.current_dir.as_deref()
    }

    /// Whether a console window is suppressed (Windows only)
    pub fn create_no_window(&self) -> bool {
        self.create_no_window
    }

    /// Get the redirect flags
    pub fn redirect(&self) -> Redirect {
        self.redirect
    }

    /// Get the encoding for captured output
    pub fn encoding(&self) -> OutputEncoding {
        self.encoding
    }

    /// Copy of this spec with different redirect flags
    pub(crate) fn with_redirect(&self, redirect: Redirect) -> LaunchSpec {
        LaunchSpec {
            redirect,
            ..self.clone()
        }
    }

    /// Reject programs that cannot possibly name an executable
    pub fn validate(&self) -> Result<()> {
        let blank = self
            .program
            .to_str()
            .is_some_and(|name| name.trim().is_empty());
        if blank {
            return Err(Error::invalid_argument(
                "program",
                "must not be empty or consist only of white-space characters",
            ));
        }
        Ok(())
    }

    /// Convert into an `async_process::Command` ready to spawn
    ///
    /// With `own_process_group` set the child leads a new process group on
    /// Unix, so that it and its descendants can be signalled together.
    pub(crate) fn prepare(&self, own_process_group: bool) -> AsyncCommand {
        let mut cmd = std::process::Command::new(&self.program);
        cmd.args(&self.args);

        for key in &self.env_remove {
            cmd.env_remove(key);
        }
        for (key, val) in &self.env {
            cmd.env(key, val);
        }

        if let Some(dir) = &self.current_dir {
            cmd.current_dir(dir);
        }

        #[cfg(unix)]
        if own_process_group {
            use std::os::unix::process::CommandExt;
            cmd.process_group(0);
        }
        #[cfg(not(unix))]
        let _ = own_process_group;

        #[cfg(windows)]
        if self.create_no_window {
            use std::os::windows::process::CommandExt;
            const CREATE_NO_WINDOW: u32 = 0x0800_0000;
            cmd.creation_flags(CREATE_NO_WINDOW);
        }

        let mut cmd = AsyncCommand::from(cmd);
        cmd.stdout(pipe_or_inherit(self.redirect.stdout));
        cmd.stderr(pipe_or_inherit(self.redirect.stderr));
        cmd.stdin(pipe_or_inherit(self.redirect.stdin));
        cmd.kill_on_drop(true);
        cmd
    }
}

fn pipe_or_inherit(piped: bool) -> Stdio {
    if piped { Stdio::piped() } else { Stdio::inherit() }
}

/// Builder for [`LaunchSpec`]
#[derive(Debug, Clone)]
pub struct LaunchSpecBuilder {
    spec: LaunchSpec,
}

impl LaunchSpecBuilder {
    /// Add an argument
    pub fn arg<S: AsRef<OsStr>>(mut self, arg: S) -> Self {
        self.spec.args.push(arg.as_ref().to_owned());
        self
    }

    /// Add multiple arguments
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        self.spec
            .args
            .extend(args.into_iter().map(|a| a.as_ref().to_owned()));
        self
    }

    /// Set an environment variable on top of the inherited environment
    pub fn env<K, V>(mut self, key: K, val: V) -> Self
    where
        K: AsRef<OsStr>,
        V: AsRef<OsStr>,
    {
        self.spec
            .env
            .insert(key.as_ref().to_owned(), val.as_ref().to_owned());
        self
    }

    /// Set multiple environment variables
    pub fn envs<I, K, V>(mut self, vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<OsStr>,
        V: AsRef<OsStr>,
    {
        for (key, val) in vars {
            self = self.env(key, val);
        }
        self
    }

    /// Remove a variable from the inherited environment
    pub fn env_remove<K: AsRef<OsStr>>(mut self, key: K) -> Self {
        let key = key.as_ref().to_owned();
        self.spec.env.remove(&key);
        self.spec.env_remove.push(key);
        self
    }

    /// Set the working directory
    pub fn current_dir<P: AsRef<Path>>(mut self, dir: P) -> Self {
        self.spec.current_dir = Some(dir.as_ref().to_owned());
        self
    }

    /// Suppress the console window of the child (Windows only)
    pub fn create_no_window(mut self, create_no_window: bool) -> Self {
        self.spec.create_no_window = create_no_window;
        self
    }

    /// Set which streams are redirected
    pub fn redirect(mut self, redirect: Redirect) -> Self {
        self.spec.redirect = redirect;
        self
    }

    /// Set the encoding for captured output
    pub fn encoding(mut self, encoding: OutputEncoding) -> Self {
        self.spec.encoding = encoding;
        self
    }

    /// Build the spec
    pub fn build(self) -> LaunchSpec {
        self.spec
    }
}
