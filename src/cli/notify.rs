//! Desktop notification at the end of a run

use crate::process::{Invocation, NoopSink, ProcessRunner};
use std::sync::Arc;
use tracing::{debug, warn};

/// Notification command
pub const NOTIFY_TOOL: &str = "notify-send";

pub fn invocation(summary: &str, body: &str) -> Invocation {
    Invocation::new(NOTIFY_TOOL).args(["--app-name=backhaul", summary, body])
}

/// Send a notification; any failure is logged and otherwise ignored
pub async fn notify(runner: &dyn ProcessRunner, summary: &str, body: &str) {
    match runner.run(&invocation(summary, body), Arc::new(NoopSink)).await {
        Ok(output) if output.success() => debug!("Notification sent"),
        Ok(output) => warn!("{} failed with {}", NOTIFY_TOOL, output.status_text()),
        Err(e) => warn!("Could not send notification: {}", e),
    }
}
