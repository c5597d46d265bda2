//! Example demonstrating resource limiting capabilities.
//!
//! This example shows how to configure and handle:
//! - Timeouts for long-running code
//! - Memory limits
//! - Requests asking for more than the configured ceilings
//!
//! Run with: cargo build --bin sandbox-worker && cargo run --example resource_limits

use restricted_python_sandbox_rs::prelude::*;

#[tokio::main]
async fn main() -> Result<()> {
    println!("=== Resource Limits Example ===\n");

    let config = SandboxConfig::builder()
        .default_timeout_secs(5)
        .timeout_range_secs(1, 10)
        .memory_range_mb(64, 256)
        .default_memory_mb(128)
        .build()?;
    let sandbox = PythonSandbox::new(config)?;

    println!("--- Test 1: Timeout Protection ---");
    {
        let request = ExecutionRequest::new("while True:\n    pass\n").with_timeout_seconds(1);
        println!("Executing infinite loop with 1s timeout...");
        match sandbox.execute(request).await {
            ExecutionOutcome::TimedOut { elapsed_seconds } => {
                println!("Timeout triggered as expected after {elapsed_seconds:.2}s");
            }
            other => println!("Unexpected outcome: {:?}", other),
        }
    }
    println!();

    println!("--- Test 2: Memory Limits ---");
    {
        let code = r#"
big_list = [i for i in range(10_000_000)]
print(f"Created list with {len(big_list)} elements")
"#;
        let request = ExecutionRequest::new(code).with_memory_limit_mb(64);
        println!("Attempting to allocate large list with 64MB limit...");
        match sandbox.execute(request).await {
            ExecutionOutcome::MemoryExceeded { limit_mb } => {
                println!("Memory limit triggered at {limit_mb} MB");
            }
            other => println!("Outcome: {:?}", other),
        }
    }
    println!();

    println!("--- Test 3: Reasonable Allocation ---");
    {
        let code = r#"
data = [i * 2 for i in range(10000)]
result = sum(data)
print(f"Sum of doubled range: {result}")
"#;
        let request = ExecutionRequest::new(code).with_memory_limit_mb(64);
        println!("Running reasonable computation with 64MB limit...");
        let outcome = sandbox.execute(request).await;
        println!("Output: {}", outcome.captured_output().unwrap_or_default().trim());
    }
    println!();

    println!("--- Test 4: Clamped Requests ---");
    {
        let request = ExecutionRequest::new("result = 1")
            .with_timeout_seconds(3600)
            .with_memory_limit_mb(-1);
        let limits = request.limits(sandbox.config());
        println!(
            "Requested 3600s / -1MB, granted {}s / {}MB",
            limits.timeout.as_secs(),
            limits.memory_limit_mb
        );
    }
    println!();

    println!("=== Resource Limits Example Complete ===");
    Ok(())
}
