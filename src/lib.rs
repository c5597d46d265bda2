//! # Restricted Python Sandbox
//!
//! Safe execution of untrusted Python snippets through static analysis and
//! process isolation.
//!
//! Each request travels through a fixed pipeline, and every stage can end it
//! early with a specific outcome:
//!
//! - **Validation**: empty, oversized or undecodable source is refused
//! - **Static analysis**: the source is parsed and every forbidden import,
//!   built-in reference, reflection attribute and definition is reported
//! - **Restricted runtime**: approved programs run in a fresh worker process,
//!   on an embedded RustPython interpreter whose namespace holds only
//!   allow-listed names
//! - **Resource governance**: the worker's allocator refuses heap growth past
//!   the memory limit, and a supervisor kills the worker on timeout or when
//!   its resident memory passes the limit
//! - **Normalization**: every outcome maps onto one response shape
//!
//! ## Example
//!
//! ```rust,ignore
//! use restricted_python_sandbox_rs::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let config = SandboxConfig::builder()
//!         .default_timeout_secs(2)
//!         .default_memory_mb(64)
//!         .build()?;
//!
//!     let sandbox = PythonSandbox::new(config)?;
//!     let outcome = sandbox.execute_source("result = 2 + 2").await;
//!
//!     assert_eq!(outcome.result_value(), Some("4"));
//!     Ok(())
//! }
//! ```
//!
//! ## Security Model
//!
//! 1. **Allow-lists**: only configured built-ins and modules are reachable
//! 2. **No reflection**: dunder and frame/code attributes are rejected before
//!    anything runs, and the worker repeats the analysis on what it receives
//! 3. **Filtered modules**: imports resolve to proxies carrying only the
//!    public, non-module attributes of allow-listed modules
//! 4. **Process isolation**: the worker starts with an empty environment and
//!    is killed unconditionally when a limit is hit
//! 5. **No partial leakage**: output is only returned from completed runs

pub mod error;
pub mod prelude;
pub mod runtime;
pub mod sandbox;
pub mod syntax;

// Re-export main types at crate root for convenience
pub use error::{Result, SandboxError};
pub use sandbox::config::{AllowList, SandboxConfig, SandboxConfigBuilder};
pub use sandbox::executor::{CodeGenerator, PythonSandbox};
pub use sandbox::normalize::{normalize, to_json, NormalizedResponse};
pub use sandbox::outcome::{AnalysisViolation, ExecutionOutcome, ViolationKind};
pub use sandbox::request::{ExecutionLimits, ExecutionRequest};
