//! Sandbox worker: the isolated child process that runs one program.
//!
//! Spawned by [`PythonSandbox`](restricted_python_sandbox_rs::PythonSandbox)
//! with an empty environment. It reads a single `Execute` frame from stdin,
//! analyzes and runs the program and writes a single response frame to
//! stdout. The parent kills this process on timeout or excess memory, so
//! nothing here needs to clean up after itself.

use std::io::Write;
use std::sync::OnceLock;

use anyhow::{Context, Result};
use restricted_python_sandbox_rs::runtime::{run_isolated, RunOptions, RunOutcome};
use restricted_python_sandbox_rs::sandbox::analyzer::analyze;
use restricted_python_sandbox_rs::sandbox::ipc::{
    encode_frame, read_message, write_message, WorkerRequest, WorkerResponse,
};
use restricted_python_sandbox_rs::sandbox::limits::BudgetAllocator;
use tokio::io::{self, BufReader};

#[global_allocator]
static ALLOCATOR: BudgetAllocator = BudgetAllocator::new();

/// `MemoryExceeded` frame encoded up front, while allocation still works.
static MEMORY_EXCEEDED_FRAME: OnceLock<Vec<u8>> = OnceLock::new();

/// Exit status after reporting a memory breach.
const MEMORY_EXCEEDED_EXIT: i32 = 3;

fn report_memory_exceeded() {
    if let Some(frame) = MEMORY_EXCEEDED_FRAME.get() {
        let mut stdout = std::io::stdout().lock();
        let _ = stdout.write_all(frame).and_then(|()| stdout.flush());
    }
    std::process::exit(MEMORY_EXCEEDED_EXIT);
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    // stderr is discarded by the parent unless SANDBOX_DEBUG is set
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_max_level(tracing::Level::WARN)
        .init();

    let mut stdin = BufReader::new(io::stdin());
    let mut stdout = io::stdout();

    let request: WorkerRequest = read_message(&mut stdin)
        .await
        .context("failed to read request from parent")?
        .context("parent closed stdin before sending a request")?;

    let WorkerRequest::Execute {
        source,
        allow_list,
        memory_limit_bytes,
        max_output_bytes,
    } = request;

    let analyzed = match analyze(&source, &allow_list) {
        Ok(analyzed) => analyzed,
        Err(violations) => {
            tracing::warn!(count = violations.len(), "received a program that fails analysis");
            anyhow::bail!("program rejected by analysis");
        }
    };

    MEMORY_EXCEEDED_FRAME
        .set(encode_frame(&WorkerResponse::MemoryExceeded)?)
        .map_err(|_| anyhow::anyhow!("memory breach frame already prepared"))?;
    // The breach hook writes through std's stdout; set it up now.
    std::io::stdout().flush()?;
    ALLOCATOR.set_on_exceeded(report_memory_exceeded);
    ALLOCATOR.set_limit(usize::try_from(memory_limit_bytes).unwrap_or(usize::MAX));

    let outcome = run_isolated(analyzed, allow_list, RunOptions { max_output_bytes });
    ALLOCATOR.lift_limit();
    let outcome = outcome.context("interpreter thread failed")?;

    let response = match outcome {
        RunOutcome::Completed { output, result } => WorkerResponse::Completed {
            captured_output: output,
            result_value: result,
        },
        RunOutcome::Failed {
            error_type,
            message,
        } => WorkerResponse::RuntimeFailure {
            error_type,
            message,
        },
        RunOutcome::MemoryExceeded => WorkerResponse::MemoryExceeded,
    };

    write_message(&mut stdout, &response)
        .await
        .context("failed to send response to parent")?;

    // Skip destructors of whatever the program built.
    std::process::exit(0);
}
