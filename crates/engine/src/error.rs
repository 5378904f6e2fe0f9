//! The engine's error taxonomy.
//!
//! Separates ordinary evaluation failures (`EngineError`) from control-flow
//! [`Sentinel`]s (`Break`, `Continue`, `Return`, `Exit`), which are not
//! errors and must never be converted into one. Loop and function
//! constructs catch sentinels by type; everything else propagates.

use std::fmt;

use crate::{pos::SourcePos, value::Value};

/// The taxonomy of non-control-flow failures the engine can produce.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// Syntactic error from the lexer or parser.
    Parse,
    /// Unknown variable, function, or host method.
    Resolution,
    /// Polymorphic dispatch saw an unsupported variant, or coercion failed.
    Type,
    /// Index out of bounds on a mutating operation (`setAt` only).
    Range,
    /// Required-but-missing parameter, bad pattern, unsupported data type.
    Validation,
    /// Wrapped driver/IO error, carrying the backend's own message.
    Backend,
    /// A paused evaluator was force-stopped.
    Cancelled,
    /// A deadline was exceeded.
    Timeout,
    /// Signature or checksum failure on a signed load.
    Integrity,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Parse => "parse",
            Self::Resolution => "resolution",
            Self::Type => "type",
            Self::Range => "range",
            Self::Validation => "validation",
            Self::Backend => "backend",
            Self::Cancelled => "cancelled",
            Self::Timeout => "timeout",
            Self::Integrity => "integrity",
        };
        f.write_str(s)
    }
}

/// A single engine-level failure.
///
/// Carries enough context to build the user-visible structured object
/// `{kind, message, file, line, column}` on demand via [`EngineError::to_structured`].
#[derive(Debug, Clone)]
pub struct EngineError {
    pub kind: ErrorKind,
    pub message: String,
    pub pos: Option<SourcePos>,
}

impl EngineError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self { kind, message: message.into(), pos: None }
    }

    pub fn at(kind: ErrorKind, message: impl Into<String>, pos: SourcePos) -> Self {
        Self { kind, message: message.into(), pos: Some(pos) }
    }

    pub fn parse(message: impl Into<String>, pos: SourcePos) -> Self {
        Self::at(ErrorKind::Parse, message, pos)
    }

    pub fn resolution(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Resolution, message)
    }

    pub fn type_error(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Type, message)
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Validation, message)
    }

    pub fn backend(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Backend, message)
    }

    pub fn with_pos(mut self, pos: SourcePos) -> Self {
        self.pos = Some(pos);
        self
    }

    /// Renders the `{kind, message, file, line, column}` object the spec
    /// requires as the single user-visible failure shape.
    pub fn to_structured(&self) -> StructuredError {
        StructuredError {
            kind: self.kind.to_string(),
            message: self.message.clone(),
            file: self.pos.as_ref().map(|p| p.file.to_string()),
            line: self.pos.as_ref().map(|p| p.line),
            column: self.pos.as_ref().map(|p| p.column),
        }
    }
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.pos {
            Some(pos) => write!(f, "{} error at {pos}: {}", self.kind, self.message),
            None => write!(f, "{} error: {}", self.kind, self.message),
        }
    }
}

impl std::error::Error for EngineError {}

/// JSON/serde-friendly rendering of an [`EngineError`].
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct StructuredError {
    pub kind: String,
    pub message: String,
    pub file: Option<String>,
    pub line: Option<u32>,
    pub column: Option<u32>,
}

/// A typed control-flow signal, propagated as a failure value but never
/// surfaced to the embedder unless it escapes its enclosing construct.
#[derive(Debug, Clone)]
pub enum Sentinel {
    Break,
    Continue,
    Return(Value),
    Exit(i32),
}

impl fmt::Display for Sentinel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Break => f.write_str("break outside loop"),
            Self::Continue => f.write_str("continue outside loop"),
            Self::Return(_) => f.write_str("return outside function"),
            Self::Exit(code) => write!(f, "exit({code})"),
        }
    }
}

/// Everything a statement evaluation can fail with: either a genuine error
/// or a control-flow sentinel escaping toward its handler.
///
/// Kept as a single enum with two variants (rather than nesting `Result`s)
/// so `?` composes naturally through the evaluator, while call sites that
/// must distinguish the two (loops, function bodies) match explicitly
/// instead of relying on a shared "error channel".
#[derive(Debug, Clone)]
pub enum Flow {
    Error(EngineError),
    Sentinel(Sentinel),
}

impl From<EngineError> for Flow {
    fn from(err: EngineError) -> Self {
        Self::Error(err)
    }
}

impl From<Sentinel> for Flow {
    fn from(s: Sentinel) -> Self {
        Self::Sentinel(s)
    }
}

impl fmt::Display for Flow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Error(e) => write!(f, "{e}"),
            Self::Sentinel(s) => write!(f, "{s}"),
        }
    }
}

pub type EvalResult<T> = Result<T, Flow>;
