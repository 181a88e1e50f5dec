//! Backend clients: one adapter per instance kind behind the `QueueBackend` trait.
//! Adapters are read-only, never retry, and turn every failure into a typed `BackendError`.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::instance::{InstanceConfig, InstanceKind};
use crate::queue::{BackendError, QueueItem};

mod arr;
mod radarr;
mod sonarr;

pub use arr::{ArrHttp, HttpSettings};
pub use radarr::RadarrBackend;
pub use sonarr::SonarrBackend;

/// Unified queue client: same interface for all kinds so the poller can dispatch uniformly.
#[async_trait]
pub trait QueueBackend: Send + Sync {
    /// Adapter id (e.g. "sonarr") for logging.
    fn name(&self) -> &'static str;

    /// Fetch the current queue of `instance`. One HTTP round trip, no retries.
    async fn fetch_queue(&self, instance: &InstanceConfig) -> Result<Vec<QueueItem>, BackendError>;
}

impl InstanceKind {
    /// Build the adapter for this kind on a shared HTTP client.
    pub fn backend(&self, http: ArrHttp) -> Arc<dyn QueueBackend> {
        match self {
            InstanceKind::Sonarr => Arc::new(SonarrBackend::new(http)),
            InstanceKind::Radarr => Arc::new(RadarrBackend::new(http)),
        }
    }
}

/// Default per-request budget; the poller's own timeout is the hard bound.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
