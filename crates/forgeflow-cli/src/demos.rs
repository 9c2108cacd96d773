//! Built-in demo workflows and the shared runner.
//!
//! Each demo assembles a workflow with `FnOperation` steps (plus the
//! combinators where relevant), wires the foundry with the configured
//! middleware chain, event logger, and optional audit trail, then
//! drives it through a smith built from the engine config. A demo that
//! fails by design (the saga, the tolerant run) reports the failure and
//! its compensation summary without a non-zero exit.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::json;

use forgeflow_core::{
    default_chain, AdmissionGate, Conditional, FnOperation, ForEach, Foundry, OperationError,
    Retry, Smith, Workflow,
};
use forgeflow_observe::{audit, event_log};
use forgeflow_types::config::EngineConfig;
use forgeflow_types::retry::RetryPolicy;

use crate::cli::DemoKind;

fn add_one() -> FnOperation {
    FnOperation::new("add-one", |input, _| {
        Ok(json!(input.as_i64().unwrap_or(0) + 1))
    })
}

fn double() -> FnOperation {
    FnOperation::new("double", |input, _| {
        Ok(json!(input.as_i64().unwrap_or(0) * 2))
    })
}

fn square() -> FnOperation {
    FnOperation::new("square", |input, _| {
        let n = input.as_i64().unwrap_or(0);
        Ok(json!(n * n))
    })
}

fn build_demo(demo: DemoKind) -> Arc<Workflow> {
    match demo {
        DemoKind::Pipeline => Workflow::builder("pipeline")
            .version("1.0.0")
            .then(add_one())
            .then(double())
            .then(square())
            .build(),

        DemoKind::Saga => Workflow::builder("booking-saga")
            .version("1.0.0")
            .then(
                FnOperation::new("reserve-inventory", |input, ctx| {
                    ctx.set_property("inventory.reserved", input.clone());
                    Ok(json!({ "reservation": "inv-001", "qty": input }))
                })
                .with_restore(|output, ctx| {
                    ctx.set_property("inventory.released", output.clone());
                    Ok(())
                }),
            )
            .then(
                FnOperation::new("charge-card", |input, ctx| {
                    ctx.set_property("payment.charged", json!(true));
                    Ok(json!({ "charge": "ch-001", "for": input }))
                })
                .with_restore(|output, ctx| {
                    ctx.set_property("payment.refunded", output.clone());
                    Ok(())
                }),
            )
            .then(FnOperation::new("ship-order", |_, _| {
                Err(OperationError::Failed("carrier unavailable".into()))
            }))
            .build(),

        DemoKind::Retry => {
            let calls = Arc::new(AtomicU32::new(0));
            let flaky = FnOperation::new("flaky-fetch", move |input, _| {
                let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                if n < 3 {
                    Err(OperationError::Failed(format!("transient error {n}")))
                } else {
                    Ok(input)
                }
            });
            let policy = RetryPolicy::ExponentialBackoff {
                base_delay_ms: 10,
                multiplier: 2.0,
                max_delay_ms: 1000,
                max_attempts: 5,
            };
            Workflow::builder("retry-demo")
                .then(Retry::new("fetch-with-retry", Arc::new(flaky), policy))
                .then(double())
                .build()
        }

        DemoKind::Parallel => {
            let items = (0..8).map(|i| json!(i)).collect();
            Workflow::builder("batch-squares")
                .then(ForEach::concurrent(
                    "square-batch",
                    items,
                    Arc::new(square()),
                    3,
                ))
                .build()
        }

        DemoKind::Tolerant => Workflow::builder("tolerant-pipeline")
            .continue_on_error()
            .then(add_one())
            .then(FnOperation::new("unreliable", |_, _| {
                Err(OperationError::Failed("downstream unavailable".into()))
            }))
            .then(double())
            .build(),

        DemoKind::Branch => Workflow::builder("sign-branch")
            .then(Conditional::new(
                "sign-check",
                |input, _| input.as_i64().unwrap_or(0) >= 0,
                Arc::new(double()),
                Arc::new(FnOperation::new("negate", |input, _| {
                    Ok(json!(-input.as_i64().unwrap_or(0)))
                })),
            ))
            .build(),
    }
}

fn smith_from_config(config: &EngineConfig) -> Smith {
    Smith::new(Arc::new(AdmissionGate::new(config.max_concurrent_workflows)))
        .with_default_timeout(Duration::from_secs(config.default_workflow_timeout_secs))
}

/// Run one demo workflow and print its outcome.
pub async fn run_demo(
    config: &EngineConfig,
    demo: DemoKind,
    input: i64,
    json_output: bool,
) -> anyhow::Result<()> {
    let workflow = build_demo(demo);
    let foundry = Foundry::new();
    for link in default_chain(&config.middleware) {
        foundry.add_middleware(link)?;
    }

    let logger = event_log::spawn_event_logger(foundry.events());
    let audit_task = config
        .audit_log_path
        .as_ref()
        .map(|path| audit::spawn_audit_writer(foundry.events(), path));

    let smith = smith_from_config(config);
    let result = smith.forge(workflow, &foundry, json!(input)).await;

    match &result {
        Ok(report) => {
            if json_output {
                let out = json!({
                    "status": report.status,
                    "execution_id": report.execution_id,
                    "workflow": report.workflow,
                    "output": report.output,
                    "completed_operations": report.completed_operations,
                    "duration_ms": report.duration_ms,
                });
                println!("{}", serde_json::to_string_pretty(&out)?);
            } else {
                println!(
                    "workflow '{}' completed in {}ms",
                    report.workflow, report.duration_ms
                );
                println!("  output: {}", report.output);
                println!(
                    "  operations: {}",
                    report.completed_operations.join(" -> ")
                );
            }
        }
        Err(err) => {
            if json_output {
                let compensation = err.compensation().map(|c| {
                    json!({
                        "restored": c.restored,
                        "failed": c.failed,
                        "duration_ms": c.duration_ms,
                    })
                });
                let out = json!({
                    "status": err.status(),
                    "error": err.to_string(),
                    "compensation": compensation,
                });
                println!("{}", serde_json::to_string_pretty(&out)?);
            } else {
                println!("workflow failed: {err}");
                if let Some(c) = err.compensation() {
                    println!(
                        "  compensation: {} restored, {} failed in {}ms",
                        c.restored, c.failed, c.duration_ms
                    );
                }
            }
        }
    }

    // Drop the foundry so the bus closes and the consumer tasks drain
    drop(foundry);
    logger.await?;
    if let Some(handle) = audit_task {
        let written = handle.await??;
        tracing::debug!(written, "audit trail flushed");
    }
    Ok(())
}

/// Run the pipeline workflow repeatedly and report throughput.
pub async fn bench(config: &EngineConfig, iterations: u32, operations: usize) -> anyhow::Result<()> {
    let smith = smith_from_config(config);

    let started = Instant::now();
    for i in 0..iterations {
        let mut builder = Workflow::builder("bench");
        for _ in 0..operations {
            builder = builder.then(add_one());
        }
        let workflow = builder.build();
        let foundry = Foundry::new();
        let report = smith.forge(workflow, &foundry, json!(i)).await?;
        debug_assert_eq!(
            report.output,
            json!(i as i64 + operations as i64),
            "bench workflow produced an unexpected sum"
        );
    }
    let elapsed = started.elapsed();

    let per_run_us = elapsed.as_micros() as f64 / iterations as f64;
    let throughput = iterations as f64 / elapsed.as_secs_f64();
    println!(
        "{iterations} runs x {operations} operations in {:.2?} ({per_run_us:.1}us/run, {throughput:.0} runs/s)",
        elapsed
    );
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
