use crate::refresh::{RefreshOrchestrator, TriggerOutcome};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Triggers a refresh immediately and then every `every`.
///
/// Ticks that land on a running cycle are coalesced by the orchestrator, so a
/// slow upstream never stacks cycles.
pub fn spawn(orchestrator: RefreshOrchestrator, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        tracing::info!(every_secs = every.as_secs(), "refresh scheduler started");
        loop {
            ticker.tick().await;
            match orchestrator.trigger() {
                TriggerOutcome::Started => tracing::debug!("scheduled refresh started"),
                TriggerOutcome::AlreadyRunning => {
                    tracing::info!("scheduled refresh skipped; previous cycle still running")
                }
            }
        }
    })
}
