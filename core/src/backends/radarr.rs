//! Radarr adapter: queue/details with the movie expanded.

use async_trait::async_trait;

use super::arr::{ArrHttp, ArrQueueRecord};
use super::QueueBackend;
use crate::instance::InstanceConfig;
use crate::queue::{BackendError, QueueItem};

const QUERY: &[(&str, &str)] = &[("includeMovie", "true")];

pub struct RadarrBackend {
    http: ArrHttp,
}

impl RadarrBackend {
    pub fn new(http: ArrHttp) -> Self {
        Self { http }
    }
}

#[async_trait]
impl QueueBackend for RadarrBackend {
    fn name(&self) -> &'static str {
        "radarr"
    }

    async fn fetch_queue(&self, instance: &InstanceConfig) -> Result<Vec<QueueItem>, BackendError> {
        let records = self.http.queue_details(instance, QUERY).await?;
        Ok(records.iter().map(|r| to_item(&instance.id, r)).collect())
    }
}

fn to_item(instance_id: &str, record: &ArrQueueRecord) -> QueueItem {
    let mut item = record.base_item(instance_id);
    if let Some(movie) = record.movie.as_ref() {
        item.poster_url = movie.poster_url();
        item.detail = match (movie.title.as_deref(), movie.year) {
            (Some(title), Some(year)) if year > 0 => Some(format!("{title} ({year})")),
            (Some(title), _) => Some(title.to_string()),
            _ => None,
        };
    }
    item
}
