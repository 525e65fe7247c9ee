//! # Demo: restart_and_cancel
//!
//! A flaky job that earns its retries, next to a long runner that is
//! cancelled mid-flight.
//!
//! Demonstrates how to:
//! - Attach a [`RestartPolicy`] and [`BackoffPolicy`] to a definition.
//! - Override the policy per submission with [`SubmitOptions`].
//! - Cancel a running instance and observe the cancelled transition.
//!
//! ## Flow
//! ```text
//! flaky ──► submit ──► pending ─► running ─► restarting ─► pending ─► ...
//!                                  (exit 1)   (backoff)      ─► failed
//! ticker ─► submit ──► pending ─► running ──► cancel() ──► cancelled
//! ```
//!
//! ## Run
//! ```bash
//! cargo run --example restart_and_cancel --features logging
//! ```

use std::sync::Arc;
use std::time::Duration;

use runjob::{
    BackoffPolicy, CoordinatorBuilder, CoreConfig, JobDefinition, JobId, LogWriter, Phase,
    RestartPolicy, StreamItem, Subscribe, SubmitOptions,
};

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 1. Coordinator with a stdout subscriber
    let subs: Vec<Arc<dyn Subscribe>> = vec![Arc::new(LogWriter::new())];
    let core = CoordinatorBuilder::new(CoreConfig::default())
        .with_subscribers(subs)
        .build()?;

    // 2. A job that always fails, allowed three attempts with short backoff
    core.register(
        JobDefinition::builder("flaky", "/bin/sh")
            .with_args(["-c", "echo attempt; exit 1"])
            .with_restart(RestartPolicy::OnFailure { max_attempts: 3 })
            .with_backoff(BackoffPolicy {
                first: Duration::from_millis(100),
                max: Duration::from_millis(400),
                ..BackoffPolicy::default()
            })
            .build()?,
    )?;

    // 3. A long runner we will cancel while it sleeps
    core.register(
        JobDefinition::builder("ticker", "/bin/sh")
            .with_args(["-c", "while true; do echo tick; sleep 1; done"])
            .build()?,
    )?;

    // 4. Submit both; the flaky run keeps the definition's policy
    let flaky = core.submit(&JobId::new("flaky")?, SubmitOptions::new())?;
    let ticker = core.submit(&JobId::new("ticker")?, SubmitOptions::new())?;

    // 5. Watch the flaky instance burn through its attempts
    let mut stream = core.replay(&flaky)?;
    while let Some(item) = stream.next().await {
        if let StreamItem::Event(ev) = item {
            if ev.to.is_terminal() {
                println!("flaky finished: phase={} attempt={}", ev.to, ev.attempt);
                break;
            }
        }
    }

    // 6. Cancel the ticker once the flaky run is done
    core.cancel(&ticker)?;
    let mut stream = core.replay(&ticker)?;
    while let Some(item) = stream.next().await {
        if let StreamItem::Event(ev) = item {
            if ev.to == Phase::Cancelled {
                println!("ticker cancelled after attempt {}", ev.attempt);
                break;
            }
        }
    }

    // 7. A resubmit can drop the retries without touching the definition
    let one_shot = core.submit(
        &JobId::new("flaky")?,
        SubmitOptions::new().with_restart(RestartPolicy::Never),
    )?;
    let mut stream = core.replay(&one_shot)?;
    while let Some(item) = stream.next().await {
        if let StreamItem::Event(ev) = item {
            if ev.to.is_terminal() {
                println!("one-shot finished after attempt {}", ev.attempt);
                break;
            }
        }
    }

    // 8. Drain subscribers and exit
    core.shutdown().await?;
    Ok(())
}
