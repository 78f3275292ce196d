//! Owning wrapper around one child process

use async_process::{Child, ChildStderr, ChildStdin, ChildStdout};
use std::io;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::launch::LaunchSpec;

/// Process exit status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitStatus {
    /// Exit code if the process exited normally
    pub code: Option<i32>,
    /// Signal that terminated the process (Unix only)
    #[cfg(unix)]
    pub signal: Option<i32>,
}

impl ExitStatus {
    /// Returns true if the process exited successfully (code 0)
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    /// Returns true if the process was terminated by a signal
    pub fn terminated_by_signal(&self) -> bool {
        #[cfg(unix)]
        {
            self.signal.is_some()
        }
        #[cfg(not(unix))]
        {
            false
        }
    }

    /// The exit code as an integer
    ///
    /// A process killed by a signal reports `128 + signal`, the way shells do.
    pub fn exit_code(&self) -> i32 {
        if let Some(code) = self.code {
            return code;
        }
        #[cfg(unix)]
        if let Some(signal) = self.signal {
            return 128 + signal;
        }
        -1
    }
}

impl From<std::process::ExitStatus> for ExitStatus {
    fn from(status: std::process::ExitStatus) -> Self {
        Self {
            code: status.code(),
            #[cfg(unix)]
            signal: {
                use std::os::unix::process::ExitStatusExt;
                status.signal()
            },
        }
    }
}

/// A started child process together with the spec it was launched from
///
/// The child is killed if the handle is dropped before it exits.
pub struct ProcessHandle {
    spec: LaunchSpec,
    child: Child,
    pid: u32,
    kill_tree: bool,
    /// Set once `wait` has reaped the child; its pid may be reused after that
    reaped: bool,
}

impl ProcessHandle {
    /// Start a process
    ///
    /// With `kill_tree` set the child leads its own process group so that
    /// [`terminate`](Self::terminate) reaches its descendants too.
    pub fn start(spec: LaunchSpec, kill_tree: bool) -> Result<Self> {
        let child = spec.prepare(kill_tree).spawn().map_err(|e| {
            Error::launch_failed(spec.program().to_string_lossy().into_owned(), e)
        })?;
        let pid = child.id();
        debug!(pid, program = ?spec.program(), "process started");

        Ok(Self {
            spec,
            child,
            pid,
            kill_tree,
            reaped: false,
        })
    }

    /// Get the process ID
    pub fn pid(&self) -> u32 {
        self.pid
    }

    /// The spec this process was launched from
    pub fn spec(&self) -> &LaunchSpec {
        &self.spec
    }

    /// Whether [`wait`](Self::wait) has observed the exit
    pub fn has_exited(&self) -> bool {
        self.reaped
    }

    /// Wait for the process to exit
    pub async fn wait(&mut self) -> io::Result<ExitStatus> {
        let status = self.child.status().await?;
        self.reaped = true;
        Ok(ExitStatus::from(status))
    }

    /// Take the piped standard output, if redirected
    pub fn take_stdout(&mut self) -> Option<ChildStdout> {
        self.child.stdout.take()
    }

    /// Take the piped standard error, if redirected
    pub fn take_stderr(&mut self) -> Option<ChildStderr> {
        self.child.stderr.take()
    }

    /// Take the piped standard input, if redirected
    pub fn take_stdin(&mut self) -> Option<ChildStdin> {
        self.child.stdin.take()
    }

    /// Kill the process, and its process tree when configured
    ///
    /// Nothing is signalled once the child has been reaped, so a recycled
    /// pid is never hit. Returns false if no kill was delivered. Never panics.
    pub fn terminate(&mut self) -> bool {
        if self.reaped {
            debug!(pid = self.pid, "process already exited");
            return false;
        }

        let result = if self.kill_tree {
            kill_tree(self.pid)
        } else {
            self.child.kill()
        };

        match result {
            Ok(()) => {
                debug!(pid = self.pid, tree = self.kill_tree, "process killed");
                true
            }
            Err(e) => {
                warn!(pid = self.pid, error = %e, "failed to kill process");
                false
            }
        }
    }
}

/// Kill the process group led by `pid`
///
/// The caller guarantees the leader has not been reaped, so the group id is
/// still ours.
#[cfg(unix)]
fn kill_tree(pid: u32) -> io::Result<()> {
    use nix::sys::signal::{self, Signal};
    use nix::unistd::Pid;

    let raw = i32::try_from(pid).map_err(io::Error::other)?;
    signal::killpg(Pid::from_raw(raw), Signal::SIGKILL).map_err(io::Error::from)
}

/// Kill `pid` and its descendants with `taskkill /T`
#[cfg(not(unix))]
fn kill_tree(pid: u32) -> io::Result<()> {
    let status = std::process::Command::new("taskkill")
        .args(["/PID", pid.to_string().as_str(), "/F", "/T"])
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .status()?;
    if status.success() {
        Ok(())
    } else {
        Err(io::Error::other(format!("taskkill exited with {status}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[cfg(unix)]
    fn test_signal_exit_code() {
        let status = ExitStatus {
            code: None,
            signal: Some(9),
        };
        assert!(status.terminated_by_signal());
        assert!(!status.success());
        assert_eq!(status.exit_code(), 137);
    }

    #[test]
    fn test_normal_exit_code() {
        let status = ExitStatus {
            code: Some(3),
            #[cfg(unix)]
            signal: None,
        };
        assert!(!status.terminated_by_signal());
        assert_eq!(status.exit_code(), 3);
    }

    #[smol_potat::test]
    #[cfg(unix)]
    async fn test_start_and_wait() {
        let spec = LaunchSpec::builder("sh").args(["-c", "exit 4"]).build();
        let mut handle = ProcessHandle::start(spec, true).unwrap();

        assert!(handle.pid() > 0);
        assert_eq!(handle.spec().program(), "sh");
        let status = handle.wait().await.unwrap();
        assert_eq!(status.exit_code(), 4);
    }

    #[smol_potat::test]
    #[cfg(unix)]
    async fn test_terminate_exited_process_is_tolerated() {
        let spec = LaunchSpec::builder("true").build();
        for tree in [false, true] {
            let mut handle = ProcessHandle::start(spec.clone(), tree).unwrap();
            handle.wait().await.unwrap();
            assert!(handle.has_exited());

            // The pid has been reaped and may belong to someone else now.
            assert!(!handle.terminate());
        }
    }

    #[smol_potat::test]
    #[cfg(unix)]
    async fn test_terminate_running_process() {
        let spec = LaunchSpec::builder("sleep").arg("10").build();
        for tree in [false, true] {
            let mut handle = ProcessHandle::start(spec.clone(), tree).unwrap();

            assert!(!handle.has_exited());
            assert!(handle.terminate());
            let status = handle.wait().await.unwrap();
            assert_eq!(status.signal, Some(9));
        }
    }

    #[test]
    fn test_start_missing_program() {
        let spec = LaunchSpec::builder("this_command_does_not_exist_12345").build();
        match ProcessHandle::start(spec, false) {
            Err(err) => assert!(err.is_not_found(), "unexpected error: {err}"),
            Ok(_) => panic!("missing program should not start"),
        }
    }
}
