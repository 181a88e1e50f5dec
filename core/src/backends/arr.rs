//! Shared *arr (Sonarr/Radarr v3) HTTP plumbing: authenticated GET of the queue endpoint,
//! response decoding and the normalisation rules both adapters share.

use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::StatusCode;
use serde::Deserialize;

use crate::instance::InstanceConfig;
use crate::queue::{BackendError, FailureKind, ItemStatus, QueueItem};

const QUEUE_DETAILS_PATH: &str = "api/v3/queue/details";
const API_KEY_HEADER: &str = "X-Api-Key";
const COMPLETION_FORMAT: &str = "%d.%m.%Y %H:%M:%S";

#[derive(Debug, Clone)]
pub struct HttpSettings {
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(5),
            request_timeout: super::DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

/// Thin reqwest wrapper shared by every *arr adapter (one connection pool per process).
#[derive(Debug, Clone)]
pub struct ArrHttp {
    client: reqwest::Client,
}

impl ArrHttp {
    pub fn new(settings: &HttpSettings) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .connect_timeout(settings.connect_timeout)
            .timeout(settings.request_timeout)
            .user_agent(concat!("arrwatch/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client })
    }

    /// GET `{base}/api/v3/queue/details?{query}` and decode the records.
    pub(crate) async fn queue_details(
        &self,
        instance: &InstanceConfig,
        query: &[(&str, &str)],
    ) -> Result<Vec<ArrQueueRecord>, BackendError> {
        let mut url = instance
            .base_url
            .join(QUEUE_DETAILS_PATH)
            .map_err(|e| BackendError::new(FailureKind::Network, e.to_string()))?;
        url.query_pairs_mut().extend_pairs(query);

        let response = self
            .client
            .get(url)
            .header(API_KEY_HEADER, &instance.api_key)
            .send()
            .await
            .map_err(map_reqwest_error)?;

        let status = response.status();
        if !status.is_success() {
            return Err(map_status(status));
        }

        let body = response.bytes().await.map_err(map_reqwest_error)?;
        let decoded: QueueResponse = serde_json::from_slice(&body).map_err(|e| {
            BackendError::new(FailureKind::MalformedResponse, format!("queue body: {e}"))
        })?;
        Ok(decoded.into_records())
    }
}

fn map_status(status: StatusCode) -> BackendError {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            BackendError::new(FailureKind::Auth, format!("http status {}", status.as_u16()))
        }
        StatusCode::NOT_FOUND | StatusCode::METHOD_NOT_ALLOWED | StatusCode::NOT_IMPLEMENTED => {
            BackendError::new(
                FailureKind::UnreachableFeature,
                format!("queue endpoint returned {}", status.as_u16()),
            )
        }
        _ => BackendError::new(FailureKind::Network, format!("http status {}", status.as_u16())),
    }
}

fn map_reqwest_error(err: reqwest::Error) -> BackendError {
    if err.is_timeout() {
        return BackendError::new(FailureKind::Timeout, err.to_string());
    }
    if err.is_decode() {
        return BackendError::new(FailureKind::MalformedResponse, err.to_string());
    }
    BackendError::new(FailureKind::Network, err.to_string())
}

/// `queue/details` answers with a bare array; `queue` answers with a page object.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum QueueResponse {
    List(Vec<ArrQueueRecord>),
    Paged { records: Vec<ArrQueueRecord> },
}

impl QueueResponse {
    fn into_records(self) -> Vec<ArrQueueRecord> {
        match self {
            QueueResponse::List(records) | QueueResponse::Paged { records } => records,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub(crate) struct ArrQueueRecord {
    pub title: Option<String>,
    pub status: Option<String>,
    pub tracked_download_status: Option<String>,
    pub tracked_download_state: Option<String>,
    pub timeleft: Option<String>,
    pub size: Option<f64>,
    pub sizeleft: Option<f64>,
    pub estimated_completion_time: Option<String>,
    pub error_message: Option<String>,
    pub series: Option<ArrMedia>,
    pub movie: Option<ArrMedia>,
    pub episode: Option<ArrEpisode>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub(crate) struct ArrMedia {
    pub title: Option<String>,
    pub year: Option<i64>,
    pub images: Vec<ArrImage>,
}

impl ArrMedia {
    pub fn poster_url(&self) -> Option<String> {
        self.images
            .iter()
            .find(|i| i.cover_type.as_deref() == Some("poster"))
            .and_then(|i| i.remote_url.clone())
            .filter(|u| !u.is_empty())
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub(crate) struct ArrImage {
    pub cover_type: Option<String>,
    pub remote_url: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub(crate) struct ArrEpisode {
    pub title: Option<String>,
    pub season_number: Option<u32>,
    pub episode_number: Option<u32>,
}

impl ArrQueueRecord {
    /// Fields common to every *arr kind. Adapters add `detail` and the poster.
    pub fn base_item(&self, instance_id: &str) -> QueueItem {
        let title = self
            .title
            .clone()
            .filter(|t| !t.trim().is_empty())
            .unwrap_or_else(|| "(untitled)".to_string());
        let status = fold_status(
            self.status.as_deref(),
            self.tracked_download_state.as_deref(),
            self.tracked_download_status.as_deref(),
        );
        let mut item = QueueItem::new(instance_id, title, status);
        item.progress = progress_fraction(self.size, self.sizeleft);
        item.size_bytes = self.size.filter(|s| *s > 0.0).map(|s| s as u64);
        item.time_left = self.timeleft.clone().filter(|t| !t.is_empty());
        item.estimated_completion = self
            .estimated_completion_time
            .as_deref()
            .filter(|t| !t.is_empty())
            .map(format_completion);
        item.error_message = self.error_message.clone().filter(|m| !m.trim().is_empty());
        item
    }
}

/// (size - sizeleft) / size, clamped; None when the size is unknown.
pub(crate) fn progress_fraction(size: Option<f64>, sizeleft: Option<f64>) -> Option<f64> {
    let size = size.filter(|s| *s > 0.0)?;
    let left = sizeleft.unwrap_or(size).max(0.0);
    Some(((size - left) / size).clamp(0.0, 1.0))
}

/// RFC 3339 timestamps become `dd.mm.YYYY HH:MM:SS` (UTC); anything else passes through.
pub(crate) fn format_completion(raw: &str) -> String {
    match DateTime::parse_from_rfc3339(raw) {
        Ok(t) => t.with_timezone(&Utc).format(COMPLETION_FORMAT).to_string(),
        Err(_) => raw.to_string(),
    }
}

/// Fold the download-client status and the tracked import state into one tag.
pub(crate) fn fold_status(
    status: Option<&str>,
    tracked_state: Option<&str>,
    tracked_status: Option<&str>,
) -> ItemStatus {
    let state = tracked_state.unwrap_or("").to_ascii_lowercase();
    match state.as_str() {
        "importpending" | "importing" | "importblocked" => return ItemStatus::Importing,
        "failedpending" | "failed" => return ItemStatus::Error,
        _ => {}
    }
    if tracked_status.is_some_and(|s| s.eq_ignore_ascii_case("error")) {
        return ItemStatus::Error;
    }
    let raw = status.unwrap_or("").trim();
    match raw.to_ascii_lowercase().as_str() {
        "downloading" => ItemStatus::Downloading,
        "paused" => ItemStatus::Paused,
        "queued" | "delay" => ItemStatus::Queued,
        "warning" | "stalled" => ItemStatus::Stalled,
        "completed" => ItemStatus::Importing,
        "failed" => ItemStatus::Error,
        "" => ItemStatus::Other("unknown".into()),
        _ => ItemStatus::Other(raw.to_string()),
    }
}
