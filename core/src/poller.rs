//! Poller: one concurrent fetch per registered instance per tick, each under its own timeout,
//! plus the ticker that paces ticks and carries the shutdown signal.

use std::sync::Arc;
use std::time::Duration;

use futures_util::stream::{FuturesUnordered, StreamExt};
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::backends::{ArrHttp, QueueBackend};
use crate::instance::{InstanceConfig, Registry};
use crate::queue::BackendError;
use crate::snapshot::InstanceResult;

/// One instance and the adapter that speaks its API.
#[derive(Clone)]
pub struct PollTarget {
    pub instance: InstanceConfig,
    pub backend: Arc<dyn QueueBackend>,
}

pub struct Poller {
    targets: Vec<PollTarget>,
    call_timeout: Duration,
}

impl Poller {
    pub fn new(targets: Vec<PollTarget>, call_timeout: Duration) -> Self {
        Self {
            targets,
            call_timeout,
        }
    }

    /// Pair every registry entry with the adapter selected by its kind.
    pub fn from_registry(registry: &Registry, http: ArrHttp, call_timeout: Duration) -> Self {
        let targets = registry
            .instances()
            .iter()
            .map(|instance| PollTarget {
                backend: instance.kind.backend(http.clone()),
                instance: instance.clone(),
            })
            .collect();
        Self::new(targets, call_timeout)
    }

    pub fn call_timeout(&self) -> Duration {
        self.call_timeout
    }

    /// Fetch every instance concurrently and wait for all of them to settle.
    /// Results come back in completion order; `snapshot::aggregate` restores registry order.
    pub async fn fetch_all(&self) -> Vec<InstanceResult> {
        let mut pending: FuturesUnordered<_> = self
            .targets
            .iter()
            .map(|target| fetch_one(target, self.call_timeout))
            .collect();

        let mut results = Vec::with_capacity(self.targets.len());
        while let Some(result) = pending.next().await {
            results.push(result);
        }
        results
    }
}

async fn fetch_one(target: &PollTarget, limit: Duration) -> InstanceResult {
    let started = Instant::now();
    let outcome = match tokio::time::timeout(limit, target.backend.fetch_queue(&target.instance)).await {
        Ok(outcome) => outcome,
        Err(_) => Err(BackendError::timeout(limit)),
    };
    let elapsed_ms = started.elapsed().as_millis() as u64;
    match &outcome {
        Ok(items) => tracing::debug!(
            instance = %target.instance.id,
            adapter = target.backend.name(),
            items = items.len(),
            elapsed_ms,
            "queue fetched"
        ),
        Err(error) => tracing::warn!(
            instance = %target.instance.id,
            adapter = target.backend.name(),
            kind = ?error.kind,
            %error,
            elapsed_ms,
            "queue fetch failed"
        ),
    }
    InstanceResult::new(&target.instance, outcome)
}

/// Fixed-period tick source. A tick that overruns delays the next one instead of
/// overlapping it; cancellation is only observed while waiting, never mid-tick.
pub struct Ticker {
    interval: Interval,
    cancel: CancellationToken,
}

impl Ticker {
    pub fn new(period: Duration, cancel: CancellationToken) -> Self {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        Self { interval, cancel }
    }

    /// Wait for the next tick. Returns None once shutdown was requested.
    pub async fn next(&mut self) -> Option<Instant> {
        if self.cancel.is_cancelled() {
            return None;
        }
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => None,
            at = self.interval.tick() => Some(at),
        }
    }
}
