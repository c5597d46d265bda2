//! Basic example of executing Python code in the sandbox.
//!
//! Run with: cargo build --bin sandbox-worker && cargo run --example basic_execution
//!
//! The worker binary is discovered next to the example's executable.

use restricted_python_sandbox_rs::prelude::*;
use restricted_python_sandbox_rs::to_json;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = SandboxConfig::builder()
        .default_timeout_secs(5)
        .default_memory_mb(128)
        .build()?;

    println!("Creating sandbox with config: {:?}", config);

    let sandbox = match PythonSandbox::new(config) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Failed to create sandbox: {}", e);
            eprintln!("Build the worker first: cargo build --bin sandbox-worker");
            return Err(e);
        }
    };

    println!("\n=== Test 1: Simple arithmetic ===");
    let outcome = sandbox.execute_source("result = 2 + 2").await;
    println!("outcome: {}", outcome.kind());
    println!("result: {:?}", outcome.result_value());

    println!("\n=== Test 2: Loop with output ===");
    let code = r#"
import json
counts = {}
for word in "the cat and the hat".split():
    counts[word] = counts.get(word, 0) + 1
    print(f"saw {word}")
result = json.dumps(counts)
"#;
    let outcome = sandbox.execute_source(code).await;
    println!("output:\n{}", outcome.captured_output().unwrap_or_default());
    println!("result: {}", outcome.result_value().unwrap_or("<none>"));

    println!("\n=== Test 3: Python error ===");
    let outcome = sandbox.execute_source("raise ValueError('test error')").await;
    let response = normalize(&outcome);
    println!("outcome: {}", response.outcome);
    println!("message: {}", response.message());

    println!("\n=== Test 4: Rejected program ===");
    let outcome = sandbox
        .execute_source("import os\nx = ().__class__.__bases__\n")
        .await;
    for violation in outcome.violations() {
        println!(
            "{} {} at {}",
            violation.kind().as_str(),
            violation.symbol(),
            violation.location()
        );
    }
    println!("json: {}", to_json(&outcome)?);

    Ok(())
}
