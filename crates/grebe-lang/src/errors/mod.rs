pub mod codes;

pub use codes::ErrorCode;

use crate::syntax::Span;
use crate::types::Type;
use codespan_reporting::diagnostic::{Diagnostic, Label};
use codespan_reporting::files::SimpleFiles;
use codespan_reporting::term;
use codespan_reporting::term::termcolor::{ColorChoice, StandardStream};
use std::fmt;

/// An inference or evaluation error. The span is attached once, by the
/// node closest to the failure, and preserved as the error bubbles.
#[derive(Debug, Clone)]
pub struct Error {
    pub kind: ErrorKind,
    pub span: Option<Span>,
}

#[derive(Debug, Clone)]
pub enum ErrorKind {
    Parse(String),
    /// Type mismatch; carries both sides so callers can render either.
    Unification {
        have: Type,
        want: Type,
    },
    OccursCheck {
        var: Type,
        ty: Type,
    },
    UndeclaredName(String),
    Redeclaration {
        name: String,
        have: Type,
        want: Type,
    },
    CircularDependency(Vec<String>),
    NonMonotype(String),
    MissingArgument(String),
    InterfaceConformance(String),
    UnsupportedOperation {
        op: String,
        left: String,
        right: String,
    },
    Assertion(String),
    RequiredSlot {
        name: String,
        ty: Type,
    },
    Cancelled,
    Eval(String),
}

impl Error {
    pub fn new(kind: ErrorKind) -> Self {
        Self { kind, span: None }
    }

    pub fn at(kind: ErrorKind, span: Span) -> Self {
        Self {
            kind,
            span: Some(span),
        }
    }

    pub fn eval(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::Eval(msg.into()))
    }

    /// Attach a span if the error doesn't already carry one. Errors are
    /// never re-spanned once located.
    pub fn with_span(mut self, span: Span) -> Self {
        if self.span.is_none() {
            self.span = Some(span);
        }
        self
    }

    pub fn code(&self) -> ErrorCode {
        match &self.kind {
            ErrorKind::Parse(_) => ErrorCode::E0101,
            ErrorKind::Unification { .. } => ErrorCode::E0200,
            ErrorKind::UndeclaredName(_) => ErrorCode::E0201,
            ErrorKind::MissingArgument(_) => ErrorCode::E0202,
            ErrorKind::OccursCheck { .. } => ErrorCode::E0203,
            ErrorKind::Redeclaration { .. } => ErrorCode::E0204,
            ErrorKind::NonMonotype(_) => ErrorCode::E0205,
            ErrorKind::CircularDependency(_) => ErrorCode::E0206,
            ErrorKind::InterfaceConformance(_) => ErrorCode::E0207,
            ErrorKind::UnsupportedOperation { .. } => ErrorCode::E0300,
            ErrorKind::Assertion(_) => ErrorCode::E0301,
            ErrorKind::RequiredSlot { .. } => ErrorCode::E0302,
            ErrorKind::Cancelled => ErrorCode::E0303,
            ErrorKind::Eval(_) => ErrorCode::E0300,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            ErrorKind::Parse(msg) => write!(f, "parse error: {msg}"),
            ErrorKind::Unification { have, want } => {
                write!(f, "cannot use {have} as {want}")
            }
            ErrorKind::OccursCheck { var, ty } => {
                write!(f, "infinite type: {var} occurs in {ty}")
            }
            ErrorKind::UndeclaredName(name) => write!(f, "{name:?} not found"),
            ErrorKind::Redeclaration { name, have, want } => {
                write!(
                    f,
                    "{name:?} already defined as {want}, cannot redefine as {have}"
                )
            }
            ErrorKind::CircularDependency(names) => {
                write!(f, "circular dependency detected in declarations")?;
                if !names.is_empty() {
                    write!(f, ": {}", names.join(", "))?;
                }
                Ok(())
            }
            ErrorKind::NonMonotype(name) => {
                write!(f, "{name:?} does not resolve to a concrete type")
            }
            ErrorKind::MissingArgument(name) => {
                write!(f, "missing required argument: {name:?}")
            }
            ErrorKind::InterfaceConformance(msg) => write!(f, "{msg}"),
            ErrorKind::UnsupportedOperation { op, left, right } => {
                write!(f, "operation {op:?} not supported for types {left}, {right}")
            }
            ErrorKind::Assertion(msg) => write!(f, "assertion failed: {msg}"),
            ErrorKind::RequiredSlot { name, ty } => {
                write!(f, "required slot {name:?} (type {ty}) has no value")
            }
            ErrorKind::Cancelled => write!(f, "cancelled"),
            ErrorKind::Eval(msg) => write!(f, "{msg}"),
        }
    }
}

impl std::error::Error for Error {}

/// Render an error with a highlighted source snippet to stderr.
pub fn report_error(filename: &str, source: &str, error: &Error) {
    match error.span {
        Some(span) => {
            let mut files = SimpleFiles::new();
            let file_id = files.add(filename, source);
            let diagnostic = Diagnostic::error()
                .with_code(error.code().as_str())
                .with_message(error.to_string())
                .with_labels(vec![Label::primary(file_id, span.start..span.end)]);
            let writer = StandardStream::stderr(ColorChoice::Auto);
            let config = term::Config::default();
            let _ = term::emit(&mut writer.lock(), &config, &files, &diagnostic);
        }
        None => {
            eprintln!("error[{}]: {}", error.code(), error);
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
