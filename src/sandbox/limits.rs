//! Resource governance for sandboxed executions.
//!
//! Two layers cooperate here. Inside the worker, a [`BudgetAllocator`]
//! installed as the global allocator refuses heap growth past the memory
//! limit and reports the breach before the worker exits. Outside, the
//! [`ResourceGovernor`] watches the worker process and kills it when the
//! wall-clock deadline passes or its resident memory exceeds the limit.

use std::alloc::{GlobalAlloc, Layout, System};
use std::future::pending;
use std::ptr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Once, OnceLock};
use std::time::{Duration, Instant};

use tokio::io::BufReader;
use tokio::process::{Child, ChildStdin, ChildStdout};

use crate::error::{Result, SandboxError};
use crate::sandbox::ipc::{read_message_with_limit, write_message, WorkerRequest, WorkerResponse};
use crate::sandbox::outcome::ExecutionOutcome;
use crate::sandbox::request::ExecutionLimits;

/// Message reported when the worker disappears without answering.
pub const ABNORMAL_TERMINATION: &str = "execution terminated abnormally";

/// A global allocator that counts live heap bytes against a limit.
///
/// The first allocation that would push the total over the limit lifts the
/// limit, runs the hook registered with
/// [`set_on_exceeded`](Self::set_on_exceeded) and then fails. The worker's
/// hook reports `MemoryExceeded` to the parent and exits, so the failed
/// allocation never reaches the interpreter.
#[derive(Debug)]
pub struct BudgetAllocator {
    used: AtomicUsize,
    limit: AtomicUsize,
    tripped: AtomicBool,
    on_exceeded: OnceLock<fn()>,
}

impl BudgetAllocator {
    /// An allocator with no limit armed.
    pub const fn new() -> Self {
        Self {
            used: AtomicUsize::new(0),
            limit: AtomicUsize::new(usize::MAX),
            tripped: AtomicBool::new(false),
            on_exceeded: OnceLock::new(),
        }
    }

    /// Arm the limit. Bytes already live count against it.
    pub fn set_limit(&self, bytes: usize) {
        self.tripped.store(false, Ordering::Relaxed);
        self.limit.store(bytes, Ordering::Relaxed);
    }

    pub fn lift_limit(&self) {
        self.limit.store(usize::MAX, Ordering::Relaxed);
    }

    /// Live heap bytes handed out through this allocator.
    pub fn used(&self) -> usize {
        self.used.load(Ordering::Relaxed)
    }

    /// Whether an allocation has been refused since the limit was armed.
    pub fn is_tripped(&self) -> bool {
        self.tripped.load(Ordering::Relaxed)
    }

    /// Register the breach hook. Only the first registration sticks.
    ///
    /// The hook runs on the allocating thread with the limit lifted. It must
    /// not return into code that expects the allocation to succeed; the
    /// worker's hook exits the process.
    pub fn set_on_exceeded(&self, hook: fn()) -> bool {
        self.on_exceeded.set(hook).is_ok()
    }

    fn reserve(&self, bytes: usize) -> bool {
        let used = self.used.fetch_add(bytes, Ordering::Relaxed).saturating_add(bytes);
        if used <= self.limit.load(Ordering::Relaxed) {
            return true;
        }
        self.release(bytes);
        if !self.tripped.swap(true, Ordering::Relaxed) {
            self.lift_limit();
            if let Some(hook) = self.on_exceeded.get() {
                hook();
            }
        }
        false
    }

    fn release(&self, bytes: usize) {
        self.used.fetch_sub(bytes, Ordering::Relaxed);
    }
}

impl Default for BudgetAllocator {
    fn default() -> Self {
        Self::new()
    }
}

unsafe impl GlobalAlloc for BudgetAllocator {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        if !self.reserve(layout.size()) {
            return ptr::null_mut();
        }
        // SAFETY: the caller upholds `GlobalAlloc::alloc`'s contract for `layout`.
        let block = unsafe { System.alloc(layout) };
        if block.is_null() {
            self.release(layout.size());
        }
        block
    }

    unsafe fn alloc_zeroed(&self, layout: Layout) -> *mut u8 {
        if !self.reserve(layout.size()) {
            return ptr::null_mut();
        }
        // SAFETY: as for `alloc`.
        let block = unsafe { System.alloc_zeroed(layout) };
        if block.is_null() {
            self.release(layout.size());
        }
        block
    }

    unsafe fn dealloc(&self, block: *mut u8, layout: Layout) {
        // SAFETY: `block` came from this allocator, which always delegates to `System`.
        unsafe { System.dealloc(block, layout) };
        self.release(layout.size());
    }

    unsafe fn realloc(&self, block: *mut u8, layout: Layout, new_size: usize) -> *mut u8 {
        let old_size = layout.size();
        if new_size > old_size && !self.reserve(new_size - old_size) {
            return ptr::null_mut();
        }
        // SAFETY: `block` came from `System` with `layout`; the caller upholds the
        // size requirements of `GlobalAlloc::realloc`.
        let moved = unsafe { System.realloc(block, layout, new_size) };
        match (moved.is_null(), new_size > old_size) {
            (true, true) => self.release(new_size - old_size),
            (false, false) => self.release(old_size - new_size),
            _ => {}
        }
        moved
    }
}

/// Whether resident memory of other processes can be sampled here.
pub fn memory_sampling_supported() -> bool {
    cfg!(target_os = "linux")
}

/// Resident set size of process `pid` in bytes.
///
/// Read from the `VmRSS` line of `/proc/<pid>/status`, which the kernel
/// reports in kB regardless of page size. Returns `None` on platforms
/// without procfs or when the process is gone.
pub fn process_rss_bytes(pid: u32) -> Option<u64> {
    #[cfg(target_os = "linux")]
    {
        let status = std::fs::read_to_string(format!("/proc/{pid}/status")).ok()?;
        parse_vm_rss_kb(&status).map(|kb| kb * 1024)
    }
    #[cfg(not(target_os = "linux"))]
    {
        let _ = pid;
        None
    }
}

fn parse_vm_rss_kb(status: &str) -> Option<u64> {
    let line = status.lines().find(|line| line.starts_with("VmRSS:"))?;
    line["VmRSS:".len()..].split_whitespace().next()?.parse().ok()
}

static SAMPLER_UNAVAILABLE: Once = Once::new();

/// Periodic RSS check of one worker process.
#[derive(Debug, Clone)]
pub struct MemoryWatch {
    pid: Option<u32>,
    limit_bytes: u64,
    interval: Duration,
}

impl MemoryWatch {
    pub fn new(pid: Option<u32>, limit_bytes: u64, interval: Duration) -> Self {
        let pid = if memory_sampling_supported() {
            pid
        } else {
            SAMPLER_UNAVAILABLE.call_once(|| {
                tracing::warn!(
                    os = std::env::consts::OS,
                    "memory sampling unavailable on this platform; only the in-process budget applies"
                );
            });
            None
        };
        Self {
            pid,
            limit_bytes,
            interval: interval.max(Duration::from_millis(1)),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.pid.is_some()
    }

    /// Resolves with the offending RSS once it is above the limit.
    ///
    /// Never resolves when sampling is disabled.
    pub async fn exceeded(&self) -> u64 {
        let Some(pid) = self.pid else {
            return pending().await;
        };
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            if let Some(rss) = process_rss_bytes(pid) {
                if rss > self.limit_bytes {
                    return rss;
                }
            }
        }
    }
}

/// Supervises one worker process for one execution.
#[derive(Debug, Clone)]
pub struct ResourceGovernor {
    limits: ExecutionLimits,
    sample_interval: Duration,
    max_message_bytes: usize,
}

impl ResourceGovernor {
    pub fn new(limits: ExecutionLimits, sample_interval: Duration, max_message_bytes: usize) -> Self {
        Self {
            limits,
            sample_interval,
            max_message_bytes,
        }
    }

    pub fn limits(&self) -> &ExecutionLimits {
        &self.limits
    }

    /// Send `request` to the worker and race its answer against the
    /// deadline and the memory sampler.
    ///
    /// The worker is always dead when this returns. Errors are protocol
    /// failures; every resource outcome is an `Ok`.
    pub async fn supervise(&self, mut child: Child, request: &WorkerRequest) -> Result<ExecutionOutcome> {
        let started = Instant::now();
        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| SandboxError::WorkerProtocol("worker has no stdin".into()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| SandboxError::WorkerProtocol("worker has no stdout".into()))?;
        let answer = exchange(stdin, BufReader::new(stdout), request, self.max_message_bytes);
        let watch = MemoryWatch::new(
            child.id(),
            self.limits.memory_limit_bytes(),
            self.sample_interval,
        );

        let outcome = tokio::select! {
            biased;
            response = answer => match response {
                Ok(Some(response)) => Ok(response.into_outcome(self.limits.memory_limit_mb)),
                Ok(None) => Ok(abnormal_termination()),
                Err(e) if e.kind() == std::io::ErrorKind::InvalidData => {
                    Err(SandboxError::WorkerProtocol(e.to_string()))
                }
                // The pipe broke because the worker died mid-exchange.
                Err(_) => Ok(abnormal_termination()),
            },
            _ = tokio::time::sleep(self.limits.timeout) => {
                let elapsed = started.elapsed();
                tracing::warn!(
                    timeout_ms = self.limits.timeout.as_millis() as u64,
                    "worker exceeded its deadline, killing"
                );
                Ok(ExecutionOutcome::TimedOut {
                    elapsed_seconds: elapsed.as_secs_f64(),
                })
            }
            rss = watch.exceeded() => {
                tracing::warn!(
                    rss_bytes = rss,
                    limit_mb = self.limits.memory_limit_mb,
                    "worker exceeded its memory limit, killing"
                );
                Ok(ExecutionOutcome::MemoryExceeded {
                    limit_mb: self.limits.memory_limit_mb,
                })
            }
        };

        // Reaps the worker too; an already exited child is not an error here.
        if let Err(e) = child.kill().await {
            tracing::debug!(error = %e, "worker already gone");
        }
        outcome
    }
}

/// Write the request, close the worker's stdin and wait for its answer.
async fn exchange(
    mut stdin: ChildStdin,
    mut stdout: BufReader<ChildStdout>,
    request: &WorkerRequest,
    max_message_bytes: usize,
) -> std::io::Result<Option<WorkerResponse>> {
    write_message(&mut stdin, request).await?;
    drop(stdin);
    read_message_with_limit(&mut stdout, max_message_bytes).await
}

fn abnormal_termination() -> ExecutionOutcome {
    ExecutionOutcome::RuntimeFailure {
        error_type: "RuntimeError".into(),
        message: ABNORMAL_TERMINATION.into(),
    }
}

impl WorkerResponse {
    fn into_outcome(self, limit_mb: u64) -> ExecutionOutcome {
        match self {
            WorkerResponse::Completed {
                captured_output,
                result_value,
            } => ExecutionOutcome::Completed {
                captured_output,
                result_value,
            },
            WorkerResponse::RuntimeFailure {
                error_type,
                message,
            } => ExecutionOutcome::RuntimeFailure {
                error_type,
                message,
            },
            WorkerResponse::MemoryExceeded => ExecutionOutcome::MemoryExceeded { limit_mb },
        }
    }
}
