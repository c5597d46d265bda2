//! Mapping of execution outcomes onto the uniform response shape.
//!
//! Every outcome, rejections and failures included, becomes a well-formed
//! response with `"status": "success"`. Callers tell the sandbox refusing a
//! program apart from a program succeeding through `outcome` and the message
//! text, never through a transport-level error.

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::sandbox::outcome::{ExecutionOutcome, ViolationKind};

/// The wire-level response body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizedResponse {
    /// Always `"success"`: the sandbox itself handled the request.
    pub status: String,
    /// Machine-checkable outcome kind, e.g. `timed_out`.
    pub outcome: String,
    pub response: Vec<ResponseItem>,
}

/// One message of a [`NormalizedResponse`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseItem {
    pub message: String,
    #[serde(rename = "type")]
    pub kind: String,
}

impl NormalizedResponse {
    /// Text of the first message.
    pub fn message(&self) -> &str {
        self.response.first().map_or("", |item| item.message.as_str())
    }
}

/// Convert an outcome into the response shape.
pub fn normalize(outcome: &ExecutionOutcome) -> NormalizedResponse {
    NormalizedResponse {
        status: "success".to_string(),
        outcome: outcome.kind().to_string(),
        response: vec![ResponseItem {
            message: describe(outcome),
            kind: "text".to_string(),
        }],
    }
}

/// Serialize the normalized form of `outcome`.
pub fn to_json(outcome: &ExecutionOutcome) -> Result<String> {
    Ok(serde_json::to_string(&normalize(outcome))?)
}

fn describe(outcome: &ExecutionOutcome) -> String {
    match outcome {
        ExecutionOutcome::Completed {
            captured_output,
            result_value,
        } => {
            let mut message = captured_output.clone();
            if let Some(value) = result_value {
                if !message.is_empty() && !message.ends_with('\n') {
                    message.push('\n');
                }
                message.push_str("Result: ");
                message.push_str(value);
            }
            if message.is_empty() {
                message.push_str("Execution completed with no output.");
            }
            message
        }
        ExecutionOutcome::Rejected { violations } => {
            if let [only] = violations.as_slice() {
                if only.kind() == ViolationKind::SyntaxError {
                    return format!("Syntax error: {} ({})", only.symbol(), only.location());
                }
            }
            let mut message = format!(
                "Execution rejected by security analysis ({} violation{}):",
                violations.len(),
                if violations.len() == 1 { "" } else { "s" }
            );
            for violation in violations {
                message.push_str("\n- ");
                message.push_str(&violation.to_string());
            }
            message
        }
        ExecutionOutcome::TimedOut { elapsed_seconds } => {
            format!("Execution timed out after {elapsed_seconds:.2} seconds.")
        }
        ExecutionOutcome::MemoryExceeded { limit_mb } => {
            format!("Execution exceeded the memory limit of {limit_mb} MB.")
        }
        ExecutionOutcome::RuntimeFailure {
            error_type,
            message,
        } => {
            if message.is_empty() {
                format!("Execution failed: {error_type}")
            } else {
                format!("Execution failed: {error_type}: {message}")
            }
        }
        ExecutionOutcome::InvalidInput { reason } => format!("Invalid input: {reason}"),
    }
}
