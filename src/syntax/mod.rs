//! Parsing of the sandboxed Python subset.
//!
//! [`parse_program`] parses with `rustpython-parser` and lowers the result
//! into an arena-allocated [`ast::Program`]. Every node lives in one of two
//! flat vectors, so later stages can visit the whole tree with a linear scan.

pub mod ast;
pub mod parser;

use std::fmt;

pub use ast::{Location, Program};
pub use parser::parse_program;

/// Maximum nesting of brackets and of indented blocks.
pub const MAX_NESTING_DEPTH: usize = 100;

/// Maximum depth of the syntax tree, counting every statement and
/// expression level (an `elif` nests one level below its `if`).
pub const MAX_TREE_DEPTH: usize = 10_000;

/// A source text that could not be tokenized or parsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyntaxError {
    /// Description of the problem.
    pub message: String,
    /// Where the problem was found.
    pub location: Location,
}

impl SyntaxError {
    pub(crate) fn new(message: impl Into<String>, location: Location) -> Self {
        Self {
            message: message.into(),
            location,
        }
    }
}

impl fmt::Display for SyntaxError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.message, self.location)
    }
}

impl std::error::Error for SyntaxError {}
