//! Core execution engine for the Python sandbox.
//!
//! [`PythonSandbox::execute`] runs the full pipeline for one request:
//! validation, static analysis, then execution in a fresh worker process
//! supervised by the [`ResourceGovernor`]. Every stage reports through an
//! [`ExecutionOutcome`]; nothing the submitted program does can make this
//! module return an error.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, error, info};

use crate::error::{Result, SandboxError};
use crate::sandbox::analyzer::analyze;
use crate::sandbox::config::SandboxConfig;
use crate::sandbox::ipc::WorkerRequest;
use crate::sandbox::limits::ResourceGovernor;
use crate::sandbox::normalize::{normalize, NormalizedResponse};
use crate::sandbox::outcome::ExecutionOutcome;
use crate::sandbox::redact::redact_message;
use crate::sandbox::request::ExecutionRequest;
use crate::sandbox::validator::validate_source;

/// File name of the worker executable.
pub const WORKER_BINARY_NAME: &str = "sandbox-worker";

/// Environment variable naming the worker binary. Must be absolute.
pub const WORKER_BIN_ENV: &str = "SANDBOX_WORKER_BIN";

/// Environment variable that keeps the worker's stderr attached.
pub const DEBUG_ENV: &str = "SANDBOX_DEBUG";

/// Upstream producer of source text, e.g. a natural-language code generator.
///
/// Generated text is untrusted and goes through the same pipeline as any
/// other submission.
#[async_trait]
pub trait CodeGenerator: Send + Sync {
    /// Produce candidate source text for a task description.
    async fn generate(&self, task: &str) -> anyhow::Result<String>;
}

/// A sandboxed Python execution environment.
///
/// Cheap to clone and safe to share; concurrent calls to
/// [`execute`](Self::execute) each get their own worker process.
#[derive(Debug, Clone)]
pub struct PythonSandbox {
    config: Arc<SandboxConfig>,
    worker: PathBuf,
}

impl PythonSandbox {
    /// Create a sandbox, validating `config` and locating the worker binary.
    pub fn new(config: SandboxConfig) -> Result<Self> {
        config.validate()?;
        let worker = find_worker_binary(
            config.worker_path.as_deref(),
            std::env::var(WORKER_BIN_ENV).ok(),
        )?;
        debug!(worker = %worker.display(), "sandbox worker located");
        Ok(Self {
            config: Arc::new(config),
            worker,
        })
    }

    pub fn config(&self) -> &SandboxConfig {
        &self.config
    }

    /// Path of the worker binary in use.
    pub fn worker_path(&self) -> &Path {
        &self.worker
    }

    /// Run one request through the whole pipeline.
    pub async fn execute(&self, request: ExecutionRequest) -> ExecutionOutcome {
        let started = Instant::now();
        let outcome = self.run_pipeline(&request).await;
        info!(
            outcome = outcome.kind(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "execution finished"
        );
        outcome
    }

    /// Run `source` with the configured default limits.
    pub async fn execute_source(&self, source: &str) -> ExecutionOutcome {
        self.execute(ExecutionRequest::new(source)).await
    }

    /// Run a request and normalize the outcome into the response shape.
    pub async fn respond(&self, request: ExecutionRequest) -> NormalizedResponse {
        normalize(&self.execute(request).await)
    }

    /// Ask `generator` for source text and run it like any other submission.
    ///
    /// A generator failure is reported as invalid input.
    pub async fn generate_and_execute(
        &self,
        generator: &dyn CodeGenerator,
        task: &str,
        timeout_seconds: Option<i64>,
        memory_limit_mb: Option<i64>,
    ) -> ExecutionOutcome {
        let source_text = match generator.generate(task).await {
            Ok(source) => source,
            Err(e) => {
                debug!(error = %e, "code generation failed");
                return ExecutionOutcome::InvalidInput {
                    reason: redact_message(&format!("code generation failed: {e:#}")),
                };
            }
        };
        self.execute(ExecutionRequest {
            source_text,
            timeout_seconds,
            memory_limit_mb,
        })
        .await
    }

    async fn run_pipeline(&self, request: &ExecutionRequest) -> ExecutionOutcome {
        if let Err(e) = validate_source(&request.source_text, self.config.max_source_chars) {
            debug!(error = %e, "source rejected by validator");
            let reason = match e {
                SandboxError::InvalidInput(reason) => reason,
                other => other.to_string(),
            };
            return ExecutionOutcome::InvalidInput { reason };
        }

        let source = match analyze(&request.source_text, &self.config.allow_list) {
            Ok(analyzed) => analyzed.into_source(),
            Err(violations) => {
                debug!(count = violations.len(), "source rejected by analyzer");
                return ExecutionOutcome::Rejected { violations };
            }
        };

        let limits = request.limits(&self.config);
        debug!(
            timeout_ms = limits.timeout.as_millis() as u64,
            memory_limit_mb = limits.memory_limit_mb,
            "dispatching to worker"
        );
        let worker_request = WorkerRequest::Execute {
            source,
            allow_list: (*self.config.allow_list).clone(),
            memory_limit_bytes: limits.memory_limit_bytes(),
            max_output_bytes: self.config.max_output_bytes,
        };
        let governor = ResourceGovernor::new(
            limits,
            self.config.sample_interval,
            self.config.max_message_bytes,
        );

        let supervised = match self.spawn_worker() {
            Ok(child) => governor.supervise(child, &worker_request).await,
            Err(e) => Err(e),
        };
        match supervised {
            Ok(ExecutionOutcome::RuntimeFailure {
                error_type,
                message,
            }) => ExecutionOutcome::RuntimeFailure {
                error_type,
                message: redact_message(&message),
            },
            Ok(outcome) => outcome,
            Err(e) => {
                error!(error = %e, "sandbox worker failed");
                ExecutionOutcome::RuntimeFailure {
                    error_type: "RuntimeError".into(),
                    message: redact_message(&format!("internal sandbox error: {e}")),
                }
            }
        }
    }

    fn spawn_worker(&self) -> Result<tokio::process::Child> {
        Command::new(&self.worker)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(if std::env::var_os(DEBUG_ENV).is_some() {
                Stdio::inherit()
            } else {
                Stdio::null()
            })
            .env_clear()
            .kill_on_drop(true)
            .spawn()
            .map_err(SandboxError::WorkerSpawn)
    }
}

/// Locate the worker executable.
///
/// Order: the configured path, then `env_path` (the value of
/// [`WORKER_BIN_ENV`], which must be absolute), then the directory of the
/// current executable and its parent. `PATH` is never searched.
pub fn find_worker_binary(configured: Option<&Path>, env_path: Option<String>) -> Result<PathBuf> {
    if let Some(path) = configured {
        if !path.exists() {
            return Err(SandboxError::WorkerNotFound(path.display().to_string()));
        }
        validate_binary_permissions(path)?;
        return Ok(path.to_path_buf());
    }

    if let Some(path) = env_path {
        let p = PathBuf::from(&path);
        if !p.is_absolute() {
            return Err(SandboxError::Config(format!(
                "{WORKER_BIN_ENV} must be an absolute path, got: {path}"
            )));
        }
        if p.exists() {
            validate_binary_permissions(&p)?;
            return Ok(p);
        }
    }

    if let Ok(exe) = std::env::current_exe() {
        if let Some(dir) = exe.parent() {
            let worker = dir.join(WORKER_BINARY_NAME);
            if worker.exists() {
                validate_binary_permissions(&worker)?;
                return Ok(worker);
            }
            // test binaries live in target/<profile>/deps
            if let Some(parent) = dir.parent() {
                let worker = parent.join(WORKER_BINARY_NAME);
                if worker.exists() {
                    validate_binary_permissions(&worker)?;
                    return Ok(worker);
                }
            }
        }
    }

    Err(SandboxError::WorkerNotFound(format!(
        "{WORKER_BINARY_NAME} not found; set {WORKER_BIN_ENV} or install it next to this executable"
    )))
}

/// Reject world-writable worker binaries.
fn validate_binary_permissions(_path: &Path) -> Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let metadata = std::fs::metadata(_path).map_err(|e| {
            SandboxError::Config(format!(
                "cannot read metadata for {}: {e}",
                _path.display()
            ))
        })?;
        let mode = metadata.permissions().mode();
        if mode & 0o002 != 0 {
            return Err(SandboxError::Config(format!(
                "insecure permissions on worker binary {}: mode {mode:o} is world-writable",
                _path.display()
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(unix)]
    fn script(dir: &Path, body: &str, mode: u32) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;
        let path = dir.join(WORKER_BINARY_NAME);
        std::fs::write(&path, body).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(mode)).unwrap();
        path
    }

    #[cfg(unix)]
    fn sandbox_with_worker(body: &str) -> (tempfile::TempDir, PythonSandbox) {
        let dir = tempfile::tempdir().unwrap();
        let worker = script(dir.path(), body, 0o755);
        let config = SandboxConfig::builder().worker_path(worker).build().unwrap();
        let sandbox = PythonSandbox::new(config).unwrap();
        (dir, sandbox)
    }

    #[test]
    fn test_relative_env_path_rejected() {
        let err = find_worker_binary(None, Some("./relative/worker".into())).unwrap_err();
        assert!(err.is_config());
        assert!(err.to_string().contains("absolute"));
    }

    #[test]
    fn test_missing_configured_path() {
        let err = find_worker_binary(Some(Path::new("/nonexistent/sandbox-worker")), None)
            .unwrap_err();
        assert!(matches!(err, SandboxError::WorkerNotFound(_)));
    }

    #[test]
    fn test_not_found_message_does_not_mention_path_search() {
        if let Err(e) = find_worker_binary(None, None) {
            let msg = e.to_string();
            assert!(!msg.contains("PATH"));
            assert!(msg.contains(WORKER_BIN_ENV));
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_world_writable_binary_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let bin = script(dir.path(), "#!/bin/sh\n", 0o777);
        let err = find_worker_binary(None, Some(bin.display().to_string())).unwrap_err();
        assert!(err.to_string().contains("insecure"));
    }

    #[cfg(unix)]
    #[test]
    fn test_configured_path_wins() {
        let dir = tempfile::tempdir().unwrap();
        let bin = script(dir.path(), "#!/bin/sh\n", 0o755);
        let found = find_worker_binary(Some(&bin), Some("/elsewhere/worker".into())).unwrap();
        assert_eq!(found, bin);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_invalid_input_short_circuits() {
        let (_dir, sandbox) = sandbox_with_worker("#!/bin/sh\nexit 1\n");
        let outcome = sandbox.execute_source("   \n").await;
        assert_eq!(
            outcome,
            ExecutionOutcome::InvalidInput {
                reason: "source text is empty".into()
            }
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_rejection_short_circuits() {
        let (_dir, sandbox) = sandbox_with_worker("#!/bin/sh\nexit 1\n");
        let outcome = sandbox.execute_source("import os\n").await;
        assert!(outcome.is_rejected());
        assert_eq!(outcome.violations()[0].symbol(), "os");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_silent_worker_death_is_generic_failure() {
        let (_dir, sandbox) = sandbox_with_worker("#!/bin/sh\nexit 3\n");
        let outcome = sandbox.execute_source("result = 1\n").await;
        assert_eq!(
            outcome,
            ExecutionOutcome::RuntimeFailure {
                error_type: "RuntimeError".into(),
                message: crate::sandbox::limits::ABNORMAL_TERMINATION.into(),
            }
        );
    }

    struct FailingGenerator;

    #[async_trait]
    impl CodeGenerator for FailingGenerator {
        async fn generate(&self, _task: &str) -> anyhow::Result<String> {
            anyhow::bail!("model unavailable at https://llm.internal/v1")
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_generator_failure_is_invalid_input() {
        let (_dir, sandbox) = sandbox_with_worker("#!/bin/sh\nexit 1\n");
        let outcome = sandbox
            .generate_and_execute(&FailingGenerator, "add numbers", None, None)
            .await;
        let ExecutionOutcome::InvalidInput { reason } = outcome else {
            panic!("expected invalid input, got {outcome:?}");
        };
        assert_eq!(reason, "code generation failed: model unavailable at [url]");
    }
}
