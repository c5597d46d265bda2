//! The terminal result of one execution request.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::syntax::Location;

/// Category of a static analysis finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ViolationKind {
    /// Import of a module that is not allow-listed.
    ForbiddenImport,
    /// Reference to a built-in that is not allow-listed.
    ForbiddenCall,
    /// Access to a dunder or reflection attribute.
    ForbiddenAttribute,
    /// A `def`, `class` or `lambda`.
    ForbiddenDefinition,
    /// The source does not parse.
    SyntaxError,
}

impl ViolationKind {
    /// Wire name, e.g. `forbidden-import`.
    pub fn as_str(self) -> &'static str {
        match self {
            ViolationKind::ForbiddenImport => "forbidden-import",
            ViolationKind::ForbiddenCall => "forbidden-call",
            ViolationKind::ForbiddenAttribute => "forbidden-attribute",
            ViolationKind::ForbiddenDefinition => "forbidden-definition",
            ViolationKind::SyntaxError => "syntax-error",
        }
    }
}

impl fmt::Display for ViolationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One finding of the static security analyzer.
///
/// Values are only created by [`analyze`](crate::sandbox::analyzer::analyze)
/// and cannot be modified afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisViolation {
    kind: ViolationKind,
    symbol: String,
    location: Location,
}

impl AnalysisViolation {
    pub(crate) fn new(kind: ViolationKind, symbol: impl Into<String>, location: Location) -> Self {
        Self {
            kind,
            symbol: symbol.into(),
            location,
        }
    }

    /// What kind of violation this is.
    pub fn kind(&self) -> ViolationKind {
        self.kind
    }

    /// The offending name (module, built-in, attribute or definition).
    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    /// Where in the source the violation occurs.
    pub fn location(&self) -> Location {
        self.location
    }
}

impl fmt::Display for AnalysisViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {} ({})", self.kind, self.symbol, self.location)
    }
}

/// Result of a single execution request. Exactly one variant per request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ExecutionOutcome {
    /// The program ran to completion.
    Completed {
        /// Everything the program printed, in order.
        captured_output: String,
        /// `str()` of the `result` variable, if the program bound one.
        result_value: Option<String>,
    },
    /// Static analysis refused the program; nothing was executed.
    Rejected {
        /// Every violation found, ordered by source position.
        violations: Vec<AnalysisViolation>,
    },
    /// The wall-clock limit was reached and the execution was killed.
    TimedOut {
        /// Time between start and termination.
        elapsed_seconds: f64,
    },
    /// The memory ceiling was reached and the execution was killed.
    MemoryExceeded {
        /// The limit that applied.
        limit_mb: u64,
    },
    /// The program raised an exception that it did not handle.
    RuntimeFailure {
        /// Exception class name, e.g. `ZeroDivisionError`.
        error_type: String,
        /// Sanitized exception text, e.g. `division by zero`.
        message: String,
    },
    /// The request was rejected before analysis.
    InvalidInput {
        /// Why the input was refused.
        reason: String,
    },
}

impl ExecutionOutcome {
    /// Machine-readable kind, matching the serde tag.
    pub fn kind(&self) -> &'static str {
        match self {
            ExecutionOutcome::Completed { .. } => "completed",
            ExecutionOutcome::Rejected { .. } => "rejected",
            ExecutionOutcome::TimedOut { .. } => "timed_out",
            ExecutionOutcome::MemoryExceeded { .. } => "memory_exceeded",
            ExecutionOutcome::RuntimeFailure { .. } => "runtime_failure",
            ExecutionOutcome::InvalidInput { .. } => "invalid_input",
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, ExecutionOutcome::Completed { .. })
    }

    pub fn is_rejected(&self) -> bool {
        matches!(self, ExecutionOutcome::Rejected { .. })
    }

    pub fn is_timed_out(&self) -> bool {
        matches!(self, ExecutionOutcome::TimedOut { .. })
    }

    pub fn is_memory_exceeded(&self) -> bool {
        matches!(self, ExecutionOutcome::MemoryExceeded { .. })
    }

    pub fn is_runtime_failure(&self) -> bool {
        matches!(self, ExecutionOutcome::RuntimeFailure { .. })
    }

    pub fn is_invalid_input(&self) -> bool {
        matches!(self, ExecutionOutcome::InvalidInput { .. })
    }

    /// The `result` value of a completed execution.
    pub fn result_value(&self) -> Option<&str> {
        match self {
            ExecutionOutcome::Completed { result_value, .. } => result_value.as_deref(),
            _ => None,
        }
    }

    /// Output of a completed execution. Other outcomes never carry output.
    pub fn captured_output(&self) -> Option<&str> {
        match self {
            ExecutionOutcome::Completed {
                captured_output, ..
            } => Some(captured_output),
            _ => None,
        }
    }

    /// Violations of a rejected program; empty for every other outcome.
    pub fn violations(&self) -> &[AnalysisViolation] {
        match self {
            ExecutionOutcome::Rejected { violations } => violations,
            _ => &[],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_violation_display() {
        let v = AnalysisViolation::new(
            ViolationKind::ForbiddenImport,
            "os",
            Location::new(1, 8),
        );
        assert_eq!(v.to_string(), "forbidden-import: os (line 1, column 8)");
        assert_eq!(v.kind(), ViolationKind::ForbiddenImport);
        assert_eq!(v.symbol(), "os");
    }

    #[test]
    fn test_outcome_serializes_with_tag() {
        let outcome = ExecutionOutcome::MemoryExceeded { limit_mb: 64 };
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["outcome"], "memory_exceeded");
        assert_eq!(json["limit_mb"], 64);
        assert_eq!(outcome.kind(), "memory_exceeded");
    }

    #[test]
    fn test_violation_kind_wire_name() {
        let json = serde_json::to_string(&ViolationKind::ForbiddenAttribute).unwrap();
        assert_eq!(json, "\"forbidden-attribute\"");
    }

    #[test]
    fn test_accessors() {
        let done = ExecutionOutcome::Completed {
            captured_output: "hi\n".into(),
            result_value: Some("4".into()),
        };
        assert!(done.is_completed());
        assert_eq!(done.result_value(), Some("4"));
        assert_eq!(done.captured_output(), Some("hi\n"));
        assert!(done.violations().is_empty());

        let timed_out = ExecutionOutcome::TimedOut {
            elapsed_seconds: 2.0,
        };
        assert!(timed_out.is_timed_out());
        assert_eq!(timed_out.captured_output(), None);
    }
}
