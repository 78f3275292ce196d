//! Echoing of command lines to a diagnostic sink
//!
//! Before a process starts, the executor writes its working directory (when
//! one is set) and its command line to the echo sink, each line prefixed with
//! a label. Any secret registered with [`Echo::with_secret`] is replaced by
//! [`REDACTED`] wherever it appears, ignoring case.

use regex::{Regex, RegexBuilder};
use std::fmt;
use std::io::{self, Write};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::debug;

use crate::launch::LaunchSpec;

/// Prefix used when the embedding application does not supply one
pub const DEFAULT_ECHO_PREFIX: &str = "simple-exec";

/// Marker that replaces secrets in echoed output
pub const REDACTED: &str = "***";

/// In-memory echo destination that can be shared and inspected
#[derive(Debug, Clone, Default)]
pub struct SharedBuffer(Arc<Mutex<String>>);

impl SharedBuffer {
    /// Create an empty buffer
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything written so far
    pub fn contents(&self) -> String {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    fn push(&self, text: &str) {
        self.0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_str(text);
    }
}

/// Where echo lines are written
#[derive(Debug, Clone, Default)]
pub enum EchoSink {
    /// The standard error of the current process
    #[default]
    Stderr,
    /// The standard output of the current process
    Stdout,
    /// A shared in-memory buffer
    Buffer(SharedBuffer),
}

/// Echo configuration: label, sink and secrets to redact
#[derive(Clone)]
pub struct Echo {
    prefix: String,
    sink: EchoSink,
    secrets: Vec<String>,
    redactors: Vec<Redactor>,
}

impl Echo {
    /// Echo to stderr with the given prefix
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            sink: EchoSink::default(),
            secrets: Vec::new(),
            redactors: Vec::new(),
        }
    }

    /// Write to a different sink
    pub fn with_sink(mut self, sink: EchoSink) -> Self {
        self.sink = sink;
        self
    }

    /// Redact `secret` from everything echoed
    pub fn with_secret(mut self, secret: impl Into<String>) -> Self {
        let secret = secret.into();
        if !secret.is_empty() {
            self.secrets.push(secret);
            self.redactors = build_redactors(&self.secrets);
        }
        self
    }

    /// The label written before every line
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// The configured sink
    pub fn sink(&self) -> &EchoSink {
        &self.sink
    }

    /// Replace every registered secret in `text`
    pub fn redact(&self, text: &str) -> String {
        self.redactors
            .iter()
            .fold(text.to_string(), |text, redactor| redactor.apply(&text))
    }

    /// Render the echo lines for a spec, without trailing newlines
    pub fn render(&self, spec: &LaunchSpec) -> Vec<String> {
        let mut lines = Vec::with_capacity(2);

        if let Some(dir) = spec.current_dir() {
            let dir = self.redact(&dir.to_string_lossy());
            lines.push(self.redact(&format!("{}: Working directory: {}", self.prefix, dir)));
        }

        let mut command = quote(&self.redact(&spec.program().to_string_lossy()));
        for arg in spec.args() {
            command.push(' ');
            command.push_str(&quote(&self.redact(&arg.to_string_lossy())));
        }
        lines.push(self.redact(&format!("{}: {}", self.prefix, command)));

        lines
    }

    /// Write the echo lines for a spec to the sink
    pub fn emit(&self, spec: &LaunchSpec) -> io::Result<()> {
        let mut message = String::new();
        for line in self.render(spec) {
            message.push_str(&line);
            message.push('\n');
        }

        match &self.sink {
            EchoSink::Stderr => {
                let mut stderr = io::stderr().lock();
                stderr.write_all(message.as_bytes())?;
                stderr.flush()
            }
            EchoSink::Stdout => {
                let mut stdout = io::stdout().lock();
                stdout.write_all(message.as_bytes())?;
                stdout.flush()
            }
            EchoSink::Buffer(buffer) => {
                buffer.push(&message);
                Ok(())
            }
        }
    }
}

impl Default for Echo {
    fn default() -> Self {
        Self::new(DEFAULT_ECHO_PREFIX)
    }
}

impl fmt::Debug for Echo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Echo")
            .field("prefix", &self.prefix)
            .field("sink", &self.sink)
            .field("secrets", &self.secrets.len())
            .finish()
    }
}

/// One pass of secret replacement
#[derive(Clone)]
enum Redactor {
    Pattern(Regex),
    /// A secret too large to compile into a regex
    Literal(String),
}

impl Redactor {
    fn apply(&self, text: &str) -> String {
        match self {
            Redactor::Pattern(pattern) => pattern.replace_all(text, REDACTED).into_owned(),
            Redactor::Literal(secret) => replace_ignoring_case(text, secret),
        }
    }
}

/// One combined pattern when it compiles, otherwise one redactor per secret
fn build_redactors(secrets: &[String]) -> Vec<Redactor> {
    let mut sorted: Vec<&str> = secrets.iter().map(String::as_str).collect();
    // Longest first so that a secret containing another is redacted whole.
    sorted.sort_by_key(|s| std::cmp::Reverse(s.len()));

    let compile = |pattern: &str| RegexBuilder::new(pattern).case_insensitive(true).build();

    let combined = sorted
        .iter()
        .map(|s| regex::escape(s))
        .collect::<Vec<_>>()
        .join("|");
    if let Ok(pattern) = compile(&combined) {
        return vec![Redactor::Pattern(pattern)];
    }

    sorted
        .into_iter()
        .map(|secret| match compile(&regex::escape(secret)) {
            Ok(pattern) => Redactor::Pattern(pattern),
            Err(e) => {
                debug!(len = secret.len(), error = %e, "secret redacted without a regex");
                Redactor::Literal(secret.to_string())
            }
        })
        .collect()
}

fn replace_ignoring_case(text: &str, secret: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(c) = rest.chars().next() {
        match match_len_ignoring_case(rest, secret) {
            Some(len) => {
                out.push_str(REDACTED);
                rest = &rest[len..];
            }
            None => {
                out.push(c);
                rest = &rest[c.len_utf8()..];
            }
        }
    }
    out
}

/// Byte length of the prefix of `text` equal to `secret` ignoring case
fn match_len_ignoring_case(text: &str, secret: &str) -> Option<usize> {
    let mut chars = text.char_indices();
    for expected in secret.chars() {
        let (_, found) = chars.next()?;
        if !found.to_lowercase().eq(expected.to_lowercase()) {
            return None;
        }
    }
    Some(chars.next().map_or(text.len(), |(i, _)| i))
}

/// Quote an argument so the echoed line can be pasted into a shell
fn quote(arg: &str) -> String {
    let plain = !arg.is_empty()
        && !arg
            .chars()
            .any(|c| c.is_whitespace() || matches!(c, '"' | '\'' | '\\'));
    if plain {
        return arg.to_string();
    }

    let mut quoted = String::with_capacity(arg.len() + 2);
    quoted.push('"');
    for c in arg.chars() {
        if matches!(c, '"' | '\\') {
            quoted.push('\\');
        }
        quoted.push(c);
    }
    quoted.push('"');
    quoted
}
