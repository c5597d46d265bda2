//! Prelude module for convenient imports.

pub use crate::error::{Result, SandboxError};
pub use crate::sandbox::{
    config::{AllowList, SandboxConfig},
    executor::{CodeGenerator, PythonSandbox},
    normalize::{normalize, NormalizedResponse},
    outcome::{AnalysisViolation, ExecutionOutcome, ViolationKind},
    request::ExecutionRequest,
};
