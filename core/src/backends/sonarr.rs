//! Sonarr adapter: queue/details with series and episode expanded.

use async_trait::async_trait;

use super::arr::{ArrHttp, ArrQueueRecord};
use super::QueueBackend;
use crate::instance::InstanceConfig;
use crate::queue::{BackendError, QueueItem};

const QUERY: &[(&str, &str)] = &[("includeSeries", "true"), ("includeEpisode", "true")];

pub struct SonarrBackend {
    http: ArrHttp,
}

impl SonarrBackend {
    pub fn new(http: ArrHttp) -> Self {
        Self { http }
    }
}

#[async_trait]
impl QueueBackend for SonarrBackend {
    fn name(&self) -> &'static str {
        "sonarr"
    }

    async fn fetch_queue(&self, instance: &InstanceConfig) -> Result<Vec<QueueItem>, BackendError> {
        let records = self.http.queue_details(instance, QUERY).await?;
        Ok(records.iter().map(|r| to_item(&instance.id, r)).collect())
    }
}

fn to_item(instance_id: &str, record: &ArrQueueRecord) -> QueueItem {
    let mut item = record.base_item(instance_id);
    item.poster_url = record.series.as_ref().and_then(|s| s.poster_url());
    item.detail = record.episode.as_ref().and_then(|episode| {
        let code = match (episode.season_number, episode.episode_number) {
            (Some(s), Some(e)) => Some(format!("S{s:02}E{e:02}")),
            _ => None,
        };
        let title = episode.title.as_deref().filter(|t| !t.is_empty());
        match (code, title) {
            (Some(code), Some(title)) => Some(format!("{code} · {title}")),
            (Some(code), None) => Some(code),
            (None, Some(title)) => Some(title.to_string()),
            (None, None) => None,
        }
    });
    item
}
