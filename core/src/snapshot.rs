//! Snapshot aggregation: per-instance outcomes of one tick merged into one immutable, registry-ordered value.

use chrono::{DateTime, Utc};

use crate::instance::{InstanceConfig, InstanceKind, Registry};
use crate::queue::{BackendError, FailureKind, QueueItem};

/// Outcome of one instance's fetch in one tick. Carries the display label and kind so
/// rendering needs nothing but the snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct InstanceResult {
    pub instance_id: String,
    pub label: String,
    pub kind: InstanceKind,
    pub outcome: Result<Vec<QueueItem>, BackendError>,
}

impl InstanceResult {
    pub fn ok(instance: &InstanceConfig, items: Vec<QueueItem>) -> Self {
        Self::new(instance, Ok(items))
    }

    pub fn err(instance: &InstanceConfig, error: BackendError) -> Self {
        Self::new(instance, Err(error))
    }

    pub fn new(instance: &InstanceConfig, outcome: Result<Vec<QueueItem>, BackendError>) -> Self {
        Self {
            instance_id: instance.id.clone(),
            label: instance.label.clone(),
            kind: instance.kind,
            outcome,
        }
    }
}

/// Everything one tick learned. Replaced wholesale by the next tick.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub taken_at: DateTime<Utc>,
    pub results: Vec<InstanceResult>,
}

impl Snapshot {
    pub fn failed_count(&self) -> usize {
        self.results.iter().filter(|r| r.outcome.is_err()).count()
    }

    pub fn item_count(&self) -> usize {
        self.results
            .iter()
            .filter_map(|r| r.outcome.as_ref().ok())
            .map(Vec::len)
            .sum()
    }
}

/// Order `results` by registry position, whatever order they completed in.
/// An instance with no result becomes an `Err` entry so it is still rendered;
/// results for ids outside the registry are dropped.
pub fn aggregate(registry: &Registry, results: Vec<InstanceResult>, taken_at: DateTime<Utc>) -> Snapshot {
    let mut slots: Vec<Option<InstanceResult>> = vec![None; registry.len()];
    for result in results {
        match registry.position(&result.instance_id) {
            Some(pos) => slots[pos] = Some(result),
            None => tracing::warn!(instance = %result.instance_id, "result for unknown instance dropped"),
        }
    }

    let results = registry
        .instances()
        .iter()
        .zip(slots)
        .map(|(instance, slot)| {
            slot.unwrap_or_else(|| {
                InstanceResult::err(
                    instance,
                    BackendError::new(FailureKind::Network, "no result collected this tick"),
                )
            })
        })
        .collect();

    Snapshot { taken_at, results }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry(ids: &[&str]) -> Registry {
        Registry::new(
            ids.iter()
                .map(|id| InstanceConfig::new(*id, InstanceKind::Radarr, "http://x", "k", "").unwrap())
                .collect(),
        )
        .unwrap()
    }

    fn instance(registry: &Registry, id: &str) -> InstanceConfig {
        registry.get(id).cloned().unwrap()
    }

    #[test]
    fn output_follows_registry_order_not_arrival_order() {
        let registry = registry(&["a", "b", "c"]);
        let arrived = vec![
            InstanceResult::ok(&instance(&registry, "c"), vec![]),
            InstanceResult::err(&instance(&registry, "a"), BackendError::new(FailureKind::Timeout, "slow")),
            InstanceResult::ok(&instance(&registry, "b"), vec![]),
        ];
        let snapshot = aggregate(&registry, arrived, Utc::now());
        let ids: Vec<_> = snapshot.results.iter().map(|r| r.instance_id.as_str()).collect();
        assert_eq!(ids, ["a", "b", "c"]);
        assert_eq!(snapshot.failed_count(), 1);
    }

    #[test]
    fn missing_results_are_kept_as_errors_and_unknown_ids_dropped() {
        let registry = registry(&["a", "b"]);
        let stranger = InstanceConfig::new("zzz", InstanceKind::Sonarr, "http://y", "k", "").unwrap();
        let snapshot = aggregate(
            &registry,
            vec![InstanceResult::ok(&stranger, vec![]), InstanceResult::ok(&instance(&registry, "b"), vec![])],
            Utc::now(),
        );
        assert_eq!(snapshot.results.len(), 2);
        assert_eq!(snapshot.results[0].instance_id, "a");
        assert!(snapshot.results[0].outcome.is_err());
        assert!(snapshot.results[1].outcome.is_ok());
    }
}
