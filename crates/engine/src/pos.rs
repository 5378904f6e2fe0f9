//! Source positions threaded through every token and AST node.

use std::{fmt, rc::Rc};

/// A single point in a source file, recorded by the lexer and copied onto
/// every AST node the parser builds from it.
///
/// Cheap to clone: the file name is reference-counted so every token in a
/// script shares one allocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourcePos {
    pub file: Rc<str>,
    pub line: u32,
    pub column: u32,
}

impl SourcePos {
    pub fn new(file: Rc<str>, line: u32, column: u32) -> Self {
        Self { file, line, column }
    }

    /// A placeholder position for values that were never parsed from source
    /// (builtin-constructed functions, synthetic nodes in tests).
    pub fn synthetic() -> Self {
        Self { file: Rc::from("<synthetic>"), line: 0, column: 0 }
    }
}

impl fmt::Display for SourcePos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.file, self.line, self.column)
    }
}
