//! # Stdout logging subscriber for debugging and demos.
//!
//! [`LogWriter`] prints one line per transition in a compact format:
//!
//! ```text
//! [pending]   job=echo-ok instance=6f9e…
//! [running]   job=echo-ok instance=6f9e… attempt=1
//! [completed] job=echo-ok instance=6f9e… cause=exit code 0
//! ```

use async_trait::async_trait;

use crate::events::Event;
use crate::subscribers::Subscribe;

/// Simple stdout logging subscriber.
///
/// Enabled via the `logging` feature. Meant for development and demos; for
/// production logging implement a custom [`Subscribe`] against your own
/// sink.
#[derive(Default)]
pub struct LogWriter;

impl LogWriter {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Subscribe for LogWriter {
    async fn on_event(&self, ev: &Event) {
        let mut line = format!(
            "[{:<10}] job={} instance={} attempt={}",
            ev.to.as_str(),
            ev.job,
            ev.instance,
            ev.attempt
        );
        if let Some(cause) = &ev.cause {
            line.push_str(&format!(" cause={cause}"));
        }
        println!("{line}");
    }

    fn name(&self) -> &'static str {
        "log-writer"
    }
}
