//! Tick pipeline: fetch → aggregate → render → reconcile, and the loop that repeats it.

use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures_util::FutureExt;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::chat::ChatTransport;
use crate::instance::Registry;
use crate::poller::{Poller, Ticker};
use crate::reconcile::{ReconcileError, ReconcileReport, Reconciler};
use crate::render::{render, RenderOptions, SlotGrouping};
use crate::snapshot::aggregate;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(60);

/// Cloneable handle that asks the running monitor to purge and repost on its next tick.
#[derive(Clone, Default)]
pub struct ResyncHandle(Arc<AtomicBool>);

impl ResyncHandle {
    pub fn request(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    fn take(&self) -> bool {
        self.0.swap(false, Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TickSummary {
    pub tick: u64,
    pub instances: usize,
    pub failed_instances: usize,
    pub items: usize,
    pub slots: usize,
    pub report: ReconcileReport,
}

pub struct Monitor<T> {
    registry: Registry,
    poller: Poller,
    options: RenderOptions,
    reconciler: Reconciler<T>,
    interval: Duration,
    resync: ResyncHandle,
    ticks: u64,
}

impl<T> Monitor<T>
where
    T: ChatTransport,
{
    /// Render limits are taken from the reconciler's transport.
    pub fn new(
        registry: Registry,
        poller: Poller,
        reconciler: Reconciler<T>,
        grouping: SlotGrouping,
        interval: Duration,
    ) -> Self {
        let options = RenderOptions::new(grouping, &reconciler.capabilities());
        Self {
            registry,
            poller,
            options,
            reconciler,
            interval,
            resync: ResyncHandle::default(),
            ticks: 0,
        }
    }

    pub fn resync_handle(&self) -> ResyncHandle {
        self.resync.clone()
    }

    pub fn reconciler(&self) -> &Reconciler<T> {
        &self.reconciler
    }

    /// One full tick. Backend failures never surface here; only a failed channel purge does.
    pub async fn run_tick(&mut self) -> Result<TickSummary, ReconcileError> {
        self.ticks += 1;
        let deadline = Instant::now() + self.interval;
        if self.resync.take() {
            tracing::info!("channel resync requested");
            self.reconciler.request_resync();
        }

        let results = self.poller.fetch_all().await;
        let snapshot = aggregate(&self.registry, results, Utc::now());
        let payloads = render(&snapshot, &self.options);
        let report = self.reconciler.reconcile(&payloads, Some(deadline)).await?;

        Ok(TickSummary {
            tick: self.ticks,
            instances: snapshot.results.len(),
            failed_instances: snapshot.failed_count(),
            items: snapshot.item_count(),
            slots: payloads.len(),
            report,
        })
    }

    /// `run_tick` with errors and panics caught and logged. A panicking tick forces a resync,
    /// since the channel may no longer match the tracked state.
    pub async fn tick_guarded(&mut self) -> Option<TickSummary> {
        let outcome = AssertUnwindSafe(self.run_tick()).catch_unwind().await;
        match outcome {
            Ok(Ok(summary)) => {
                let r = &summary.report;
                tracing::info!(
                    tick = summary.tick,
                    instances = summary.instances,
                    failed = summary.failed_instances,
                    items = summary.items,
                    slots = summary.slots,
                    posted = r.posted,
                    edited = r.edited,
                    deleted = r.deleted,
                    unchanged = r.unchanged,
                    chat_failures = r.failed,
                    purged = r.purged,
                    purge_skipped = r.purge_skipped,
                    api_calls = r.api_calls,
                    "tick complete"
                );
                Some(summary)
            }
            Ok(Err(e)) if e.is_unrecoverable() => {
                tracing::error!(tick = self.ticks, error = %e, "tick failed; the bot cannot read this channel");
                None
            }
            Ok(Err(e)) => {
                tracing::warn!(tick = self.ticks, error = %e, "tick failed");
                None
            }
            Err(panic) => {
                let message = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                tracing::error!(tick = self.ticks, panic = %message, "tick panicked");
                self.reconciler.request_resync();
                None
            }
        }
    }

    /// Tick on a fixed period until `cancel` fires. An in-flight tick always completes.
    pub async fn run(mut self, cancel: CancellationToken) {
        tracing::info!(
            instances = self.registry.len(),
            interval_secs = self.interval.as_secs(),
            "monitor started"
        );
        let mut ticker = Ticker::new(self.interval, cancel);
        while ticker.next().await.is_some() {
            self.tick_guarded().await;
        }
        tracing::info!(ticks = self.ticks, "monitor stopped");
    }
}
