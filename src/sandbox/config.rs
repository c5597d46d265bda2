//! Sandbox configuration with builder pattern.
//!
//! Configuration is assembled once at startup, from defaults, a TOML
//! document or the process environment, and is immutable afterwards. The
//! allow-list is shared behind an [`Arc`] so every request sees the same
//! read-only sets without copying them.
//!
//! ```toml
//! [sandbox]
//! default_timeout_secs = 5
//! max_timeout_secs = 30
//! default_memory_mb = 128
//! max_memory_mb = 512
//! allowed_modules = ["math", "json"]
//! ```

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SandboxError};

/// Built-in names available to sandboxed programs by default.
pub const DEFAULT_BUILTINS: &[&str] = &[
    "print",
    "len",
    "range",
    "abs",
    "min",
    "max",
    "sum",
    "round",
    "sorted",
    "reversed",
    "enumerate",
    "zip",
    "map",
    "filter",
    "any",
    "all",
    "int",
    "float",
    "str",
    "bool",
    "list",
    "dict",
    "tuple",
    "set",
    "isinstance",
    "divmod",
    "pow",
    "chr",
    "ord",
    "hex",
    "bin",
    "oct",
    "format",
    "repr",
    "Exception",
    "ValueError",
    "TypeError",
    "KeyError",
    "IndexError",
    "ZeroDivisionError",
    "ArithmeticError",
    "RuntimeError",
    "AssertionError",
    "NameError",
    "AttributeError",
    "OverflowError",
    "LookupError",
    "StopIteration",
    "NotImplementedError",
    "ImportError",
];

/// Every name in the host language's built-in namespace.
///
/// A reference to one of these that is not allow-listed is a violation even
/// when it is never called, since binding it to another name and calling
/// that would otherwise be enough. The worker hides the same names at
/// runtime.
pub const KNOWN_BUILTINS: &[&str] = &[
    // functions and types
    "abs", "aiter", "all", "anext", "any", "ascii", "bin", "bool", "breakpoint", "bytearray",
    "bytes", "callable", "chr", "classmethod", "compile", "complex", "copyright", "credits",
    "delattr", "dict", "dir", "divmod", "enumerate", "eval", "exec", "exit", "filter", "float",
    "format", "frozenset", "getattr", "globals", "hasattr", "hash", "help", "hex", "id", "input",
    "int", "isinstance", "issubclass", "iter", "len", "license", "list", "locals", "map", "max",
    "memoryview", "min", "next", "object", "oct", "open", "ord", "pow", "print", "property",
    "quit", "range", "repr", "reversed", "round", "set", "setattr", "slice", "sorted",
    "staticmethod", "str", "sum", "super", "tuple", "type", "vars", "zip", "NotImplemented",
    "Ellipsis",
    // exceptions and warnings
    "BaseException", "BaseExceptionGroup", "ExceptionGroup", "Exception", "ArithmeticError",
    "AssertionError", "AttributeError", "BlockingIOError", "BrokenPipeError", "BufferError",
    "BytesWarning", "ChildProcessError", "ConnectionAbortedError", "ConnectionError",
    "ConnectionRefusedError", "ConnectionResetError", "DeprecationWarning", "EOFError",
    "EncodingWarning", "EnvironmentError", "FileExistsError", "FileNotFoundError",
    "FloatingPointError", "FutureWarning", "GeneratorExit", "IOError", "ImportError",
    "ImportWarning", "IndentationError", "IndexError", "InterruptedError", "IsADirectoryError",
    "KeyError", "KeyboardInterrupt", "LookupError", "MemoryError", "ModuleNotFoundError",
    "NameError", "NotADirectoryError", "NotImplementedError", "OSError", "OverflowError",
    "PendingDeprecationWarning", "PermissionError", "ProcessLookupError", "RecursionError",
    "ReferenceError", "ResourceWarning", "RuntimeError", "RuntimeWarning", "StopAsyncIteration",
    "StopIteration", "SyntaxError", "SyntaxWarning", "SystemError", "SystemExit", "TabError",
    "TimeoutError", "TypeError", "UnboundLocalError", "UnicodeDecodeError", "UnicodeEncodeError",
    "UnicodeError", "UnicodeTranslateError", "UnicodeWarning", "UserWarning", "ValueError",
    "Warning", "ZeroDivisionError",
];

/// Modules that may be imported by default. All are pure computation.
pub const DEFAULT_MODULES: &[&str] = &["math", "string", "json", "re"];

/// Non-dunder attributes that expose frames, code objects or type internals.
pub const REFLECTION_ATTRIBUTES: &[&str] = &[
    "mro",
    "gi_frame",
    "gi_code",
    "gi_yieldframe",
    "cr_frame",
    "cr_code",
    "ag_frame",
    "ag_code",
    "f_globals",
    "f_locals",
    "f_builtins",
    "f_back",
    "f_code",
    "tb_frame",
    "tb_next",
    "co_code",
    "func_globals",
    "func_code",
    "func_closure",
];

/// The names a sandboxed program may reach.
///
/// Passed explicitly to the analyzer and the runtime; never global.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllowList {
    builtins: BTreeSet<String>,
    modules: BTreeSet<String>,
    forbidden_attributes: BTreeSet<String>,
}

impl AllowList {
    /// Create an allow-list from explicit built-in and module names.
    ///
    /// The reflection attribute deny-list starts from
    /// [`REFLECTION_ATTRIBUTES`].
    pub fn new<B, M>(builtins: B, modules: M) -> Self
    where
        B: IntoIterator,
        B::Item: Into<String>,
        M: IntoIterator,
        M::Item: Into<String>,
    {
        Self {
            builtins: builtins.into_iter().map(Into::into).collect(),
            modules: modules.into_iter().map(Into::into).collect(),
            forbidden_attributes: REFLECTION_ATTRIBUTES.iter().map(|s| s.to_string()).collect(),
        }
    }

    /// Add attribute names that are always forbidden.
    pub fn with_forbidden_attributes<I>(mut self, attributes: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        self.forbidden_attributes
            .extend(attributes.into_iter().map(Into::into));
        self
    }

    /// Whether `name` is a permitted built-in.
    pub fn allows_builtin(&self, name: &str) -> bool {
        self.builtins.contains(name)
    }

    /// Whether the dotted module `name` may be imported.
    pub fn allows_module(&self, name: &str) -> bool {
        self.modules.contains(name)
    }

    /// Whether accessing attribute `attr` is forbidden.
    ///
    /// Every dunder name is forbidden, plus the reflection deny-list.
    pub fn forbids_attribute(&self, attr: &str) -> bool {
        is_dunder(attr) || self.forbidden_attributes.contains(attr)
    }

    /// Permitted built-in names, sorted.
    pub fn builtins(&self) -> impl Iterator<Item = &str> {
        self.builtins.iter().map(String::as_str)
    }

    /// Permitted module names, sorted.
    pub fn modules(&self) -> impl Iterator<Item = &str> {
        self.modules.iter().map(String::as_str)
    }
}

impl Default for AllowList {
    fn default() -> Self {
        Self::new(DEFAULT_BUILTINS.iter().copied(), DEFAULT_MODULES.iter().copied())
    }
}

/// `__name__` style identifiers.
pub fn is_dunder(name: &str) -> bool {
    name.len() > 4 && name.starts_with("__") && name.ends_with("__")
}

/// Configuration for the Python sandbox.
#[derive(Debug, Clone)]
pub struct SandboxConfig {
    /// Timeout applied when a request does not ask for one.
    pub default_timeout_secs: u64,
    /// Lower clamp for requested timeouts.
    pub min_timeout_secs: u64,
    /// Upper clamp for requested timeouts.
    pub max_timeout_secs: u64,
    /// Memory ceiling applied when a request does not ask for one.
    pub default_memory_mb: u64,
    /// Lower clamp for requested memory ceilings.
    pub min_memory_mb: u64,
    /// Upper clamp for requested memory ceilings.
    pub max_memory_mb: u64,
    /// Maximum accepted source length, in characters.
    pub max_source_chars: usize,
    /// Captured output beyond this many bytes is truncated.
    pub max_output_bytes: usize,
    /// How often the governor samples the worker's resident memory.
    pub sample_interval: Duration,
    /// Largest IPC frame accepted from or sent to the worker.
    pub max_message_bytes: usize,
    /// Explicit worker binary location; discovered when `None`.
    pub worker_path: Option<PathBuf>,
    /// Permitted built-ins and modules.
    pub allow_list: Arc<AllowList>,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            default_timeout_secs: 5,
            min_timeout_secs: 1,
            max_timeout_secs: 30,
            default_memory_mb: 128,
            min_memory_mb: 64,
            max_memory_mb: 512,
            max_source_chars: 100_000,
            max_output_bytes: 1024 * 1024, // 1MiB
            sample_interval: Duration::from_millis(5),
            max_message_bytes: crate::sandbox::ipc::DEFAULT_MAX_MESSAGE_SIZE,
            worker_path: None,
            allow_list: Arc::new(AllowList::default()),
        }
    }
}

impl SandboxConfig {
    /// Create a new builder for SandboxConfig.
    pub fn builder() -> SandboxConfigBuilder {
        SandboxConfigBuilder::default()
    }

    /// Load configuration from the `[sandbox]` table of a TOML document.
    ///
    /// Missing keys keep their defaults.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        let file: ConfigFile =
            toml::from_str(toml_str).map_err(|e| SandboxError::Config(e.to_string()))?;
        file.sandbox.into_builder().build()
    }

    /// Load configuration from `SANDBOX_*` environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    ///
    /// [`from_env`](Self::from_env) uses the process environment; tests pass a
    /// map instead.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        fn number<T: std::str::FromStr>(
            lookup: &impl Fn(&str) -> Option<String>,
            key: &str,
        ) -> Result<Option<T>> {
            match lookup(key) {
                None => Ok(None),
                Some(raw) => raw
                    .trim()
                    .parse()
                    .map(Some)
                    .map_err(|_| SandboxError::Config(format!("{key} is not a valid number: {raw:?}"))),
            }
        }
        fn list(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<Vec<String>> {
            lookup(key).map(|raw| {
                raw.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(String::from)
                    .collect()
            })
        }

        let section = SandboxSection {
            default_timeout_secs: number(&lookup, "SANDBOX_DEFAULT_TIMEOUT_SECS")?,
            min_timeout_secs: number(&lookup, "SANDBOX_MIN_TIMEOUT_SECS")?,
            max_timeout_secs: number(&lookup, "SANDBOX_MAX_TIMEOUT_SECS")?,
            default_memory_mb: number(&lookup, "SANDBOX_DEFAULT_MEMORY_MB")?,
            min_memory_mb: number(&lookup, "SANDBOX_MIN_MEMORY_MB")?,
            max_memory_mb: number(&lookup, "SANDBOX_MAX_MEMORY_MB")?,
            max_source_chars: number(&lookup, "SANDBOX_MAX_SOURCE_CHARS")?,
            max_output_bytes: number(&lookup, "SANDBOX_MAX_OUTPUT_BYTES")?,
            sample_interval_ms: None,
            max_message_bytes: None,
            worker_path: lookup("SANDBOX_WORKER_BIN").map(PathBuf::from),
            allowed_modules: list(&lookup, "SANDBOX_ALLOWED_MODULES"),
            allowed_builtins: list(&lookup, "SANDBOX_ALLOWED_BUILTINS"),
            forbidden_attributes: None,
        };
        section.into_builder().build()
    }

    /// Check the invariants between the limit settings.
    pub fn validate(&self) -> Result<()> {
        fn range(name: &str, min: u64, default: u64, max: u64) -> Result<()> {
            if min == 0 {
                return Err(SandboxError::Config(format!("minimum {name} must be at least 1")));
            }
            if min > max {
                return Err(SandboxError::Config(format!(
                    "minimum {name} ({min}) exceeds maximum ({max})"
                )));
            }
            if default < min || default > max {
                return Err(SandboxError::Config(format!(
                    "default {name} ({default}) is outside [{min}, {max}]"
                )));
            }
            Ok(())
        }

        range(
            "timeout",
            self.min_timeout_secs,
            self.default_timeout_secs,
            self.max_timeout_secs,
        )?;
        range(
            "memory",
            self.min_memory_mb,
            self.default_memory_mb,
            self.max_memory_mb,
        )?;
        if self.max_source_chars == 0 {
            return Err(SandboxError::Config("max_source_chars must be positive".into()));
        }
        if self.max_output_bytes == 0 {
            return Err(SandboxError::Config("max_output_bytes must be positive".into()));
        }
        if self.sample_interval.is_zero() {
            return Err(SandboxError::Config("sample_interval must be positive".into()));
        }
        if self.max_message_bytes < 1024 {
            return Err(SandboxError::Config("max_message_bytes is too small".into()));
        }
        Ok(())
    }
}

/// Builder for creating SandboxConfig instances.
#[derive(Debug, Clone, Default)]
pub struct SandboxConfigBuilder {
    default_timeout_secs: Option<u64>,
    min_timeout_secs: Option<u64>,
    max_timeout_secs: Option<u64>,
    default_memory_mb: Option<u64>,
    min_memory_mb: Option<u64>,
    max_memory_mb: Option<u64>,
    max_source_chars: Option<usize>,
    max_output_bytes: Option<usize>,
    sample_interval: Option<Duration>,
    max_message_bytes: Option<usize>,
    worker_path: Option<PathBuf>,
    allowed_builtins: Option<Vec<String>>,
    allowed_modules: Option<Vec<String>>,
    forbidden_attributes: Vec<String>,
}

impl SandboxConfigBuilder {
    /// Set the timeout used when a request omits one.
    pub fn default_timeout_secs(mut self, secs: u64) -> Self {
        self.default_timeout_secs = Some(secs);
        self
    }

    /// Set the range requested timeouts are clamped to.
    pub fn timeout_range_secs(mut self, min: u64, max: u64) -> Self {
        self.min_timeout_secs = Some(min);
        self.max_timeout_secs = Some(max);
        self
    }

    /// Set the memory ceiling used when a request omits one.
    pub fn default_memory_mb(mut self, mb: u64) -> Self {
        self.default_memory_mb = Some(mb);
        self
    }

    /// Set the range requested memory ceilings are clamped to.
    pub fn memory_range_mb(mut self, min: u64, max: u64) -> Self {
        self.min_memory_mb = Some(min);
        self.max_memory_mb = Some(max);
        self
    }

    /// Set the maximum source length in characters.
    pub fn max_source_chars(mut self, chars: usize) -> Self {
        self.max_source_chars = Some(chars);
        self
    }

    /// Set the captured output cap in bytes.
    pub fn max_output_bytes(mut self, bytes: usize) -> Self {
        self.max_output_bytes = Some(bytes);
        self
    }

    /// Set the resident memory sampling interval.
    pub fn sample_interval(mut self, interval: Duration) -> Self {
        self.sample_interval = Some(interval);
        self
    }

    /// Set the largest accepted IPC frame.
    pub fn max_message_bytes(mut self, bytes: usize) -> Self {
        self.max_message_bytes = Some(bytes);
        self
    }

    /// Use the worker binary at `path` instead of discovering it.
    pub fn worker_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.worker_path = Some(path.into());
        self
    }

    /// Replace the permitted built-in names.
    pub fn allowed_builtins<I>(mut self, names: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        self.allowed_builtins = Some(names.into_iter().map(Into::into).collect());
        self
    }

    /// Replace the permitted module names.
    pub fn allowed_modules<I>(mut self, names: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        self.allowed_modules = Some(names.into_iter().map(Into::into).collect());
        self
    }

    /// Forbid additional attribute names.
    pub fn forbid_attributes<I>(mut self, names: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        self.forbidden_attributes
            .extend(names.into_iter().map(Into::into));
        self
    }

    /// Build and validate the SandboxConfig.
    pub fn build(self) -> Result<SandboxConfig> {
        let default = SandboxConfig::default();
        let builtins = self
            .allowed_builtins
            .unwrap_or_else(|| DEFAULT_BUILTINS.iter().map(|s| s.to_string()).collect());
        let modules = self
            .allowed_modules
            .unwrap_or_else(|| DEFAULT_MODULES.iter().map(|s| s.to_string()).collect());
        let allow_list =
            AllowList::new(builtins, modules).with_forbidden_attributes(self.forbidden_attributes);

        let config = SandboxConfig {
            default_timeout_secs: self
                .default_timeout_secs
                .unwrap_or(default.default_timeout_secs),
            min_timeout_secs: self.min_timeout_secs.unwrap_or(default.min_timeout_secs),
            max_timeout_secs: self.max_timeout_secs.unwrap_or(default.max_timeout_secs),
            default_memory_mb: self.default_memory_mb.unwrap_or(default.default_memory_mb),
            min_memory_mb: self.min_memory_mb.unwrap_or(default.min_memory_mb),
            max_memory_mb: self.max_memory_mb.unwrap_or(default.max_memory_mb),
            max_source_chars: self.max_source_chars.unwrap_or(default.max_source_chars),
            max_output_bytes: self.max_output_bytes.unwrap_or(default.max_output_bytes),
            sample_interval: self.sample_interval.unwrap_or(default.sample_interval),
            max_message_bytes: self.max_message_bytes.unwrap_or(default.max_message_bytes),
            worker_path: self.worker_path,
            allow_list: Arc::new(allow_list),
        };
        config.validate()?;
        Ok(config)
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ConfigFile {
    sandbox: SandboxSection,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct SandboxSection {
    default_timeout_secs: Option<u64>,
    min_timeout_secs: Option<u64>,
    max_timeout_secs: Option<u64>,
    default_memory_mb: Option<u64>,
    min_memory_mb: Option<u64>,
    max_memory_mb: Option<u64>,
    max_source_chars: Option<usize>,
    max_output_bytes: Option<usize>,
    sample_interval_ms: Option<u64>,
    max_message_bytes: Option<usize>,
    worker_path: Option<PathBuf>,
    allowed_modules: Option<Vec<String>>,
    allowed_builtins: Option<Vec<String>>,
    forbidden_attributes: Option<Vec<String>>,
}

impl SandboxSection {
    fn into_builder(self) -> SandboxConfigBuilder {
        SandboxConfigBuilder {
            default_timeout_secs: self.default_timeout_secs,
            min_timeout_secs: self.min_timeout_secs,
            max_timeout_secs: self.max_timeout_secs,
            default_memory_mb: self.default_memory_mb,
            min_memory_mb: self.min_memory_mb,
            max_memory_mb: self.max_memory_mb,
            max_source_chars: self.max_source_chars,
            max_output_bytes: self.max_output_bytes,
            sample_interval: self.sample_interval_ms.map(Duration::from_millis),
            max_message_bytes: self.max_message_bytes,
            worker_path: self.worker_path,
            allowed_builtins: self.allowed_builtins,
            allowed_modules: self.allowed_modules,
            forbidden_attributes: self.forbidden_attributes.unwrap_or_default(),
        }
    }
}
