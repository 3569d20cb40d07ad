//! Background sampler: waits for the provider to initialize, then collects
//! one snapshot per tick with at most one sampling operation in flight.
//! Successful samples land in the cache and fan out through the hub.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, sleep, MissedTickBehavior};

use crate::cache::SnapshotCache;
use crate::error::AgentResult;
use crate::hub::BroadcastHub;
use crate::provider::MetricsProvider;
use crate::snapshot::{build_snapshot, Envelope, SystemSnapshot};

const READINESS_POLL: Duration = Duration::from_secs(1);

pub struct SamplerHandle {
    stop: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl SamplerHandle {
    /// Stops ticking. A sample already in flight is allowed to complete but
    /// its result is discarded rather than cached or broadcast.
    pub async fn stop(self) {
        let _ = self.stop.send(true);
        let _ = self.task.await;
    }
}

pub fn spawn_sampler(
    provider: Arc<dyn MetricsProvider>,
    cache: SnapshotCache,
    hub: Arc<BroadcastHub>,
    period: Duration,
) -> SamplerHandle {
    let (stop_tx, stop_rx) = watch::channel(false);
    let task = tokio::spawn(run(provider, cache, hub, period, stop_rx));
    SamplerHandle {
        stop: stop_tx,
        task,
    }
}

async fn run(
    provider: Arc<dyn MetricsProvider>,
    cache: SnapshotCache,
    hub: Arc<BroadcastHub>,
    period: Duration,
    mut stop: watch::Receiver<bool>,
) {
    // Readiness gate: no tick fires until the provider has initialized.
    while !provider.is_initialized() {
        if *stop.borrow() {
            return;
        }
        match provider.initialize().await {
            Ok(()) => break,
            Err(e) => tracing::warn!(error = %e, "provider initialization failed, retrying"),
        }
        tokio::select! {
            _ = sleep(READINESS_POLL) => {}
            changed = stop.changed() => {
                if changed.is_err() || *stop.borrow() {
                    return;
                }
            }
        }
    }

    tracing::info!(period_ms = period.as_millis() as u64, "sampler started");

    let mut ticker = interval(period);
    // A tick that fires while a sample is still being built is dropped, not
    // queued; this bounds work under a slow provider and keeps snapshots in
    // order.
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            changed = stop.changed() => {
                if changed.is_err() || *stop.borrow() {
                    return;
                }
                continue;
            }
        }

        let snapshot = match sample(provider.as_ref()).await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                // One failed tick never stops the loop; broadcasting resumes
                // on the next successful sample.
                tracing::warn!(error = %e, "sample failed, skipping tick");
                continue;
            }
        };

        // A stop requested mid-sample discards the result.
        if *stop.borrow() {
            return;
        }

        cache.store(snapshot.clone()).await;
        hub.broadcast_all(&Envelope::stats(snapshot)).await;
    }
}

async fn sample(provider: &dyn MetricsProvider) -> AgentResult<SystemSnapshot> {
    let raw_cpu = provider.read_cpu().await?;
    let raw_memory = provider.read_memory().await?;
    Ok(build_snapshot(raw_cpu, raw_memory))
}
