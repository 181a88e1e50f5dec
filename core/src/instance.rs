//! Instance registry: the static list of backend deployments arrwatch polls.
//! Pure data plus validation; registry order is configuration order and drives render order.

use std::collections::HashSet;
use std::fmt;

use thiserror::Error;
use url::Url;

/// Backend kind. Selects the queue adapter and the embed colour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InstanceKind {
    Sonarr,
    Radarr,
}

/// Coarser grouping derived from the kind; used when slots are merged per category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Category {
    Series,
    Movies,
}

impl InstanceKind {
    /// Unique string id for config and logging (e.g. "sonarr", "radarr").
    pub fn kind_id(&self) -> &'static str {
        match self {
            InstanceKind::Sonarr => "sonarr",
            InstanceKind::Radarr => "radarr",
        }
    }

    pub fn category(&self) -> Category {
        match self {
            InstanceKind::Sonarr => Category::Series,
            InstanceKind::Radarr => Category::Movies,
        }
    }

    /// Parse from a config string. Accepts a few common aliases.
    pub fn from_str_loose(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "sonarr" | "tv" | "series" => Some(Self::Sonarr),
            "radarr" | "movie" | "movies" => Some(Self::Radarr),
            _ => None,
        }
    }

    /// All known kinds (for iteration / discovery).
    pub fn all() -> &'static [InstanceKind] {
        &[InstanceKind::Sonarr, InstanceKind::Radarr]
    }
}

impl fmt::Display for InstanceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.kind_id())
    }
}

impl Category {
    pub fn label(&self) -> &'static str {
        match self {
            Category::Series => "Series",
            Category::Movies => "Movies",
        }
    }
}

/// One configured backend. Immutable after load.
#[derive(Clone, PartialEq, Eq)]
pub struct InstanceConfig {
    pub id: String,
    pub kind: InstanceKind,
    pub base_url: Url,
    pub api_key: String,
    pub label: String,
}

// Manual Debug so the API key never lands in logs.
impl fmt::Debug for InstanceConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InstanceConfig")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("base_url", &self.base_url.as_str())
            .field("label", &self.label)
            .finish_non_exhaustive()
    }
}

impl InstanceConfig {
    /// Build and validate one instance. An empty label falls back to the id.
    pub fn new(
        id: impl Into<String>,
        kind: InstanceKind,
        base_url: &str,
        api_key: impl Into<String>,
        label: impl Into<String>,
    ) -> Result<Self, RegistryError> {
        let id = id.into().trim().to_string();
        if id.is_empty() {
            return Err(RegistryError::EmptyId);
        }
        let base_url = parse_base_url(&id, base_url)?;
        let api_key = api_key.into().trim().to_string();
        if api_key.is_empty() {
            return Err(RegistryError::MissingApiKey { id });
        }
        let label = label.into().trim().to_string();
        let label = if label.is_empty() { id.clone() } else { label };
        Ok(Self {
            id,
            kind,
            base_url,
            api_key,
            label,
        })
    }
}

fn parse_base_url(id: &str, raw: &str) -> Result<Url, RegistryError> {
    let invalid = |reason: String| RegistryError::InvalidBaseUrl {
        id: id.to_string(),
        reason,
    };
    let mut url = Url::parse(raw.trim()).map_err(|e| invalid(e.to_string()))?;
    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(invalid(format!("unsupported scheme {}", url.scheme())));
    }
    if url.cannot_be_a_base() {
        return Err(invalid("not a base url".into()));
    }
    // Url::join treats a path without trailing slash as a file; normalise so
    // "http://host/sonarr" keeps its prefix.
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    Ok(url)
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("instance id must not be empty")]
    EmptyId,
    #[error("duplicate instance id {0}")]
    DuplicateId(String),
    #[error("instance {id}: invalid base url: {reason}")]
    InvalidBaseUrl { id: String, reason: String },
    #[error("instance {id}: api key is missing")]
    MissingApiKey { id: String },
}

/// Ordered set of instances keyed by id.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    instances: Vec<InstanceConfig>,
}

impl Registry {
    /// Validate and freeze the instance list. Ids must be unique.
    pub fn new(instances: Vec<InstanceConfig>) -> Result<Self, RegistryError> {
        let mut seen = HashSet::new();
        for instance in &instances {
            if !seen.insert(instance.id.as_str()) {
                return Err(RegistryError::DuplicateId(instance.id.clone()));
            }
        }
        Ok(Self { instances })
    }

    pub fn instances(&self) -> &[InstanceConfig] {
        &self.instances
    }

    pub fn get(&self, id: &str) -> Option<&InstanceConfig> {
        self.instances.iter().find(|i| i.id == id)
    }

    /// Registry position of an instance; used to order results and slots.
    pub fn position(&self, id: &str) -> Option<usize> {
        self.instances.iter().position(|i| i.id == id)
    }

    pub fn len(&self) -> usize {
        self.instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }
}
