//! Sandbox module containing all execution-related components.

pub mod analyzer;
pub mod config;
pub mod executor;
pub mod io;
pub mod ipc;
pub mod limits;
pub mod normalize;
pub mod outcome;
pub mod redact;
pub mod request;
pub mod validator;
