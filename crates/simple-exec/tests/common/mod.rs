//! Common test utilities

#![allow(dead_code)]

use simple_exec::{Command, Echo, EchoSink, Executor, SharedBuffer};

/// Path to the cooperative test executable built with this package
pub fn tester() -> &'static str {
    env!("CARGO_BIN_EXE_exec-tester")
}

/// A command running the test executable with the given arguments
pub fn tester_command<I, S>(args: I) -> Command
where
    I: IntoIterator<Item = S>,
    S: AsRef<std::ffi::OsStr>,
{
    Command::new(tester()).args(args).no_echo()
}

/// An executor that echoes into a buffer the test can inspect
pub fn buffered_executor(prefix: &str) -> (Executor, SharedBuffer) {
    let buffer = SharedBuffer::new();
    let executor =
        Executor::new(prefix).with_echo(Echo::new(prefix).with_sink(EchoSink::Buffer(buffer.clone())));
    (executor, buffer)
}

/// Check whether a process is still alive by sending it signal 0
///
/// A zombie waiting for its new parent to reap it counts as dead.
#[cfg(unix)]
pub fn is_alive(pid: u32) -> bool {
    use nix::sys::signal;
    use nix::unistd::Pid;

    if signal::kill(Pid::from_raw(pid as i32), None).is_err() {
        return false;
    }

    match std::fs::read_to_string(format!("/proc/{pid}/stat")) {
        // The state follows the parenthesised command name.
        Ok(stat) => !stat
            .rsplit_once(')')
            .is_some_and(|(_, rest)| rest.trim_start().starts_with('Z')),
        Err(_) => true,
    }
}

/// Read a pid written by `exec-tester spawn-child`, waiting for the file to appear
pub fn read_pid_file(path: &std::path::Path) -> Option<u32> {
    for _ in 0..50 {
        if let Ok(text) = std::fs::read_to_string(path) {
            if let Ok(pid) = text.trim().parse() {
                return Some(pid);
            }
        }
        std::thread::sleep(std::time::Duration::from_millis(20));
    }
    None
}
