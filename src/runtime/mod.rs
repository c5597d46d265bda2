//! The restricted runtime executed inside the worker process.
//!
//! Programs reaching this layer have already passed validation and static
//! analysis. They run on an embedded RustPython interpreter whose namespace
//! is cut down to the allow-list: host-facing built-ins are removed, every
//! other non-allowed built-in is shadowed, and imports resolve to filtered
//! proxies of the allow-listed modules.

mod imports;
pub mod interpreter;

pub use interpreter::{run, run_isolated, RunOptions, RunOutcome};
