//! Cooperative test executable for simple-exec
//!
//! Behaviour is selected by words among the arguments:
//!
//! - `large`: write 1 MiB to both stdout and stderr, well past a pipe buffer
//! - `diagnostic`: echo the arguments to stderr
//! - `error`: echo the arguments to stderr and exit with code 1
//! - `stdin`: echo everything read from stdin
//! - `environment`: print the value of the `foo` environment variable
//! - `spawn-child`: start a detached-stdio `sleep 30` child, print its pid
//!   and write it to the file named by `EXEC_TESTER_PID_FILE`, if set
//! - `sleep`: sleep for ten seconds
//! - an integer: exit with that code

use std::io::{self, Read, Write};
use std::process::{ExitCode, Stdio};
use std::time::Duration;

fn main() -> io::Result<ExitCode> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let has = |word: &str| args.iter().any(|a| a == word);
    let joined = args.join(" ");

    let mut stdout = io::stdout().lock();
    let mut stderr = io::stderr().lock();

    writeln!(stdout, "exec-tester (stdout): {joined}")?;

    if has("large") {
        let block = "x".repeat(1 << 20);
        writeln!(stdout, "{block}")?;
        writeln!(stderr, "{block}")?;
    }

    if has("diagnostic") || has("error") {
        writeln!(stderr, "exec-tester (stderr): {joined}")?;
    }

    if has("stdin") {
        let mut input = String::new();
        io::stdin().read_to_string(&mut input)?;
        write!(stdout, "stdin: {input}")?;
    }

    if has("environment") {
        let foo = std::env::var("foo").unwrap_or_default();
        writeln!(stdout, "foo={foo}")?;
    }

    if has("spawn-child") {
        let child = std::process::Command::new("sleep")
            .arg("30")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()?;
        writeln!(stdout, "child: {}", child.id())?;
        if let Some(path) = std::env::var_os("EXEC_TESTER_PID_FILE") {
            std::fs::write(path, child.id().to_string())?;
        }
    }

    stdout.flush()?;
    stderr.flush()?;

    if has("sleep") {
        std::thread::sleep(Duration::from_secs(10));
    }

    if has("error") {
        return Ok(ExitCode::from(1));
    }

    let code = args
        .iter()
        .find_map(|a| a.parse::<u8>().ok())
        .unwrap_or(0);
    Ok(ExitCode::from(code))
}
