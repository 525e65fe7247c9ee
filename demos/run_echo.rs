//! # Demo: run_echo
//!
//! Minimal end-to-end run of a single one-shot process job.
//!
//! Demonstrates how to:
//! - Register a [`JobDefinition`] for an OS command.
//! - Submit it and follow the instance with [`Coordinator::replay`].
//! - Read the terminal snapshot, including captured output.
//!
//! ## Flow
//! ```text
//! JobDefinition ──► Coordinator::submit()
//!     ├─► admission (open by default)
//!     ├─► InstanceWorker
//!     │     ├─► transition(pending)
//!     │     ├─► spawn /bin/sh ─► transition(running)
//!     │     └─► exit 0 ─► transition(completed)
//!     ├─► LogWriter.on_event()  (one line per transition)
//!     └─► Coordinator::shutdown()
//! ```
//!
//! ## Run
//! ```bash
//! cargo run --example run_echo --features logging
//! ```

use std::sync::Arc;

use runjob::{
    CoordinatorBuilder, CoreConfig, JobDefinition, JobId, LogWriter, StreamItem, Subscribe,
    SubmitOptions,
};

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 1. Default configuration: unlimited concurrency, no journal
    let cfg = CoreConfig::default();

    // 2. A stdout subscriber so every transition is visible
    let subs: Vec<Arc<dyn Subscribe>> = vec![Arc::new(LogWriter::new())];

    // 3. Build the coordinator
    let core = CoordinatorBuilder::new(cfg).with_subscribers(subs).build()?;

    // 4. Register a definition for a plain shell command
    core.register(
        JobDefinition::builder("echo-ok", "/bin/sh")
            .with_args(["-c", "echo ok"])
            .build()?,
    )?;

    // 5. Submit one instance
    let id = core.submit(&JobId::new("echo-ok")?, SubmitOptions::new())?;
    println!("submitted instance {id}");

    // 6. Follow the run to its terminal phase
    let mut stream = core.replay(&id)?;
    while let Some(item) = stream.next().await {
        if let StreamItem::Event(ev) = item {
            if ev.to.is_terminal() {
                break;
            }
        }
    }

    // 7. Inspect the final snapshot
    let snap = core.get(&id)?;
    println!("phase={} attempt={}", snap.phase, snap.attempt);
    if let Some(out) = &snap.output {
        print!("stdout: {}", out.stdout_lossy());
    }

    // 8. Flush subscribers and exit
    core.shutdown().await?;
    Ok(())
}
