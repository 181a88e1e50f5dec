//! Normalised queue data produced by every backend adapter, and the backend failure taxonomy.

use std::fmt;

use thiserror::Error;

/// Download state as shown to operators. Backends report richer states; adapters fold them into these.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemStatus {
    Downloading,
    Paused,
    Queued,
    Stalled,
    Importing,
    Error,
    /// Anything the adapter does not recognise, passed through verbatim.
    Other(String),
}

impl fmt::Display for ItemStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ItemStatus::Downloading => write!(f, "downloading"),
            ItemStatus::Paused => write!(f, "paused"),
            ItemStatus::Queued => write!(f, "queued"),
            ItemStatus::Stalled => write!(f, "stalled"),
            ItemStatus::Importing => write!(f, "importing"),
            ItemStatus::Error => write!(f, "error"),
            ItemStatus::Other(s) => write!(f, "{s}"),
        }
    }
}

/// One in-progress download. Value type, rebuilt every tick.
#[derive(Debug, Clone, PartialEq)]
pub struct QueueItem {
    pub instance_id: String,
    pub title: String,
    /// Fraction in [0, 1]; None when the backend does not know the size yet.
    pub progress: Option<f64>,
    pub size_bytes: Option<u64>,
    /// Backend-reported time left, verbatim (e.g. "00:12:34").
    pub time_left: Option<String>,
    pub estimated_completion: Option<String>,
    pub status: ItemStatus,
    /// Episode or movie line, e.g. "S01E02 · Pilot".
    pub detail: Option<String>,
    pub error_message: Option<String>,
    pub poster_url: Option<String>,
}

impl QueueItem {
    /// Minimal item; adapters fill the optional fields.
    pub fn new(instance_id: impl Into<String>, title: impl Into<String>, status: ItemStatus) -> Self {
        Self {
            instance_id: instance_id.into(),
            title: title.into(),
            progress: None,
            size_bytes: None,
            time_left: None,
            estimated_completion: None,
            status,
            detail: None,
            error_message: None,
            poster_url: None,
        }
    }

    pub fn with_progress(mut self, progress: f64) -> Self {
        self.progress = Some(progress.clamp(0.0, 1.0));
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    /// Connection, DNS, TLS or an unexpected HTTP status.
    Network,
    /// Credential rejected.
    Auth,
    Timeout,
    MalformedResponse,
    /// Instance answered but the queue endpoint is not available.
    UnreachableFeature,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureKind::Network => write!(f, "network error"),
            FailureKind::Auth => write!(f, "authentication failed"),
            FailureKind::Timeout => write!(f, "timeout"),
            FailureKind::MalformedResponse => write!(f, "malformed response"),
            FailureKind::UnreachableFeature => write!(f, "queue endpoint unavailable"),
        }
    }
}

/// A failed fetch for one instance in one tick. Never fatal.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind}: {message}")]
pub struct BackendError {
    pub kind: FailureKind,
    pub message: String,
}

impl BackendError {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn timeout(after: std::time::Duration) -> Self {
        Self::new(FailureKind::Timeout, format!("no answer within {}s", after.as_secs_f64()))
    }
}
