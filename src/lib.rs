//! Shared data model used by every stage of the spasm toolchain: source
//! provenance (`Token`), the three-queue `Diagnostics` sink, and the small
//! `Error` type used for the handful of conditions that are implementation
//! bugs rather than user-facing diagnostics.
//!
//! Every other crate in this workspace depends on this one; this one depends
//! on nothing but `std`.

use std::collections::VecDeque;
use std::fmt;

/// A single lexical unit produced by the tokenizer and threaded through the
/// preprocessor and assembler front-end. `filepath`/`line` is the
/// provenance pair attached to every token; it must survive every
/// transformation, including macro splicing.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Token {
    pub value: String,
    pub line: u32,
    pub filepath: String,
    pub dead: bool,
}

impl Token {
    pub fn new(value: impl Into<String>, line: u32, filepath: impl Into<String>) -> Token {
        Token {
            value: value.into(),
            line,
            filepath: filepath.into(),
            dead: false,
        }
    }

    pub fn file_location(&self) -> String {
        format!("\"{}\" @ line {}", self.filepath, self.line)
    }

    /// A directive token is any token whose raw text begins with `@`.
    pub fn is_directive(&self) -> bool {
        self.value.starts_with('@')
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.value)
    }
}

/// The three independent diagnostic kinds. Order between kinds is never
/// defined; order within a kind is insertion order (FIFO).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DiagnosticKind {
    Warning,
    Error,
    Debug,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    pub message: String,
    /// Only meaningful for `DiagnosticKind::Error`: whether this error
    /// should stop further work on the current file/target.
    pub fatal: bool,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let prefix = match self.kind {
            DiagnosticKind::Warning => "[WARNING]:",
            DiagnosticKind::Error => "[ERROR]:",
            DiagnosticKind::Debug => "[DEBUG]:",
        };
        write!(f, "{} {}", prefix, self.message)
    }
}

/// Three independent FIFO queues: warnings, errors, debug notes. No stage
/// ever raises an exception for a user-facing problem; it pushes a
/// `Diagnostic` here and continues.
#[derive(Debug, Default)]
pub struct Diagnostics {
    warnings: VecDeque<Diagnostic>,
    errors: VecDeque<Diagnostic>,
    debugs: VecDeque<Diagnostic>,
}

impl Diagnostics {
    pub fn new() -> Diagnostics {
        Diagnostics::default()
    }

    pub fn warn(&mut self, message: impl Into<String>) {
        self.warnings.push_back(Diagnostic {
            kind: DiagnosticKind::Warning,
            message: message.into(),
            fatal: false,
        });
    }

    pub fn error(&mut self, message: impl Into<String>) {
        self.push_error(message, false);
    }

    pub fn fatal_error(&mut self, message: impl Into<String>) {
        self.push_error(message, true);
    }

    fn push_error(&mut self, message: impl Into<String>, fatal: bool) {
        self.errors.push_back(Diagnostic {
            kind: DiagnosticKind::Error,
            message: message.into(),
            fatal,
        });
    }

    pub fn debug(&mut self, message: impl Into<String>) {
        self.debugs.push_back(Diagnostic {
            kind: DiagnosticKind::Debug,
            message: message.into(),
            fatal: false,
        });
    }

    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn has_debugs(&self) -> bool {
        !self.debugs.is_empty()
    }

    pub fn consume_warning(&mut self) -> Option<Diagnostic> {
        self.warnings.pop_front()
    }

    pub fn consume_error(&mut self) -> Option<Diagnostic> {
        self.errors.pop_front()
    }

    pub fn consume_debug(&mut self) -> Option<Diagnostic> {
        self.debugs.pop_front()
    }

    pub fn clear_warnings(&mut self) {
        self.warnings.clear();
    }

    pub fn clear_errors(&mut self) {
        self.errors.clear();
    }

    pub fn clear_debugs(&mut self) {
        self.debugs.clear();
    }

    /// Append another sink's queues onto this one, preserving per-kind
    /// insertion order. Used to merge diagnostics produced while recursively
    /// preprocessing an included file back into the includer's sink.
    pub fn extend(&mut self, other: Diagnostics) {
        self.warnings.extend(other.warnings);
        self.errors.extend(other.errors);
        self.debugs.extend(other.debugs);
    }
}

/// Implementation-bug errors, as opposed to user-facing `Diagnostic`s.
/// Reserved for invariant violations: a handle that must resolve by
/// construction failing to, an internal lookup table missing an entry it
/// was supposed to have. User input problems always go through
/// `Diagnostics`, never through this type.
#[derive(Debug)]
pub enum Error {
    Io(std::io::Error),
    Internal(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Io(err) => write!(f, "I/O error: {}", err),
            Error::Internal(message) => write!(f, "internal error: {}", message),
        }
    }
}

impl std::error::Error for Error {}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Error {
        Error::Io(err)
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn diagnostics_queues_are_independent_fifos() {
        let mut diag = Diagnostics::new();
        diag.warn("first warning");
        diag.error("first error");
        diag.warn("second warning");

        assert!(diag.has_warnings());
        assert!(diag.has_errors());
        assert!(!diag.has_debugs());

        assert_eq!(
            diag.consume_warning().unwrap().message,
            "first warning"
        );
        assert_eq!(diag.consume_error().unwrap().message, "first error");
        assert_eq!(
            diag.consume_warning().unwrap().message,
            "second warning"
        );
        assert!(diag.consume_warning().is_none());
        assert!(diag.consume_error().is_none());
    }

    #[test]
    fn fatal_flag_only_set_when_requested() {
        let mut diag = Diagnostics::new();
        diag.error("ordinary");
        diag.fatal_error("stop everything");

        let first = diag.consume_error().unwrap();
        assert!(!first.fatal);
        let second = diag.consume_error().unwrap();
        assert!(second.fatal);
    }

    #[test]
    fn token_file_location_and_directive_detection() {
        let plain = Token::new("ADD", 3, "main.spasm");
        assert!(!plain.is_directive());
        assert_eq!(plain.file_location(), "\"main.spasm\" @ line 3");

        let directive = Token::new("@include", 1, "main.spasm");
        assert!(directive.is_directive());
    }
}
