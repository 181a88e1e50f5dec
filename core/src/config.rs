//! Settings loading. settings.json is the primary source; environment variables override the
//! Discord credentials and poll interval, and the flat `SONARR_*` / `RADARR_*` variables of older
//! deployments still define instances when the file lists none.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde_json::Value;
use thiserror::Error;

use crate::backends::DEFAULT_REQUEST_TIMEOUT;
use crate::chat::RetryPolicy;
use crate::instance::{InstanceConfig, InstanceKind, Registry, RegistryError};
use crate::monitor::DEFAULT_POLL_INTERVAL;
use crate::render::SlotGrouping;

pub const DEFAULT_SETTINGS_FILE: &str = "settings.json";
pub const MIN_POLL_INTERVAL_SECS: u64 = 5;

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("cannot read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("{path} is not valid JSON: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("missing Discord bot token (settings discord.bot_token or DISCORD_TOKEN)")]
    MissingToken,
    #[error("missing Discord channel id (settings discord.channel_id or DISCORD_CHANNEL_ID)")]
    MissingChannel,
    #[error("invalid Discord channel id {0:?}")]
    InvalidChannel(String),
    #[error("invalid value for {key}: {reason}")]
    Invalid { key: String, reason: String },
    #[error(transparent)]
    Instance(#[from] RegistryError),
}

/// Validated runtime settings.
#[derive(Debug, Clone)]
pub struct Settings {
    pub discord_token: String,
    /// Non-zero.
    pub channel_id: u64,
    pub poll_interval: Duration,
    /// Per-call timeout for backend queue requests.
    pub request_timeout: Duration,
    pub grouping: SlotGrouping,
    pub retry: RetryPolicy,
    pub instances: Vec<InstanceConfig>,
}

impl Settings {
    pub fn registry(&self) -> Result<Registry, RegistryError> {
        Registry::new(self.instances.clone())
    }
}

/// Load from `path` (must exist) or from ./settings.json (may be absent), with process
/// environment overrides applied.
pub fn load(path: Option<&Path>) -> Result<Settings, SettingsError> {
    let root = match path {
        Some(path) => read_json(path)?,
        None => {
            let default = Path::new(DEFAULT_SETTINGS_FILE);
            if default.exists() {
                read_json(default)?
            } else {
                tracing::debug!("no settings.json; using environment only");
                Value::Null
            }
        }
    };
    from_value(&root, |key| std::env::var(key).ok())
}

fn read_json(path: &Path) -> Result<Value, SettingsError> {
    let data = std::fs::read_to_string(path).map_err(|source| SettingsError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&data).map_err(|source| SettingsError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// Build settings from a parsed settings document and an environment lookup.
pub fn from_value(root: &Value, env: impl Fn(&str) -> Option<String>) -> Result<Settings, SettingsError> {
    let env = |key: &str| env(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
    let discord = root.get("discord");

    let discord_token = env("DISCORD_TOKEN")
        .or_else(|| str_at(discord, "bot_token"))
        .ok_or(SettingsError::MissingToken)?;

    let channel_raw = env("DISCORD_CHANNEL_ID")
        .or_else(|| {
            discord.and_then(|d| d.get("channel_id")).and_then(|v| match v {
                Value::String(s) => Some(s.trim().to_string()),
                Value::Number(n) => Some(n.to_string()),
                _ => None,
            })
        })
        .ok_or(SettingsError::MissingChannel)?;
    let channel_id = channel_raw
        .parse::<u64>()
        .ok()
        .filter(|id| *id != 0)
        .ok_or(SettingsError::InvalidChannel(channel_raw))?;

    let poll = root.get("poll");
    let interval_secs = match env("ARRWATCH_POLL_INTERVAL_SECS") {
        Some(raw) => Some(parse_u64("ARRWATCH_POLL_INTERVAL_SECS", &raw)?),
        None => u64_at(poll, "interval_secs", "poll.interval_secs")?,
    };
    let poll_interval = match interval_secs {
        Some(secs) if secs < MIN_POLL_INTERVAL_SECS => {
            return Err(SettingsError::Invalid {
                key: "poll.interval_secs".into(),
                reason: format!("must be at least {MIN_POLL_INTERVAL_SECS}"),
            })
        }
        Some(secs) => Duration::from_secs(secs),
        None => DEFAULT_POLL_INTERVAL,
    };

    let request_timeout = match u64_at(poll, "request_timeout_secs", "poll.request_timeout_secs")? {
        Some(0) => {
            return Err(SettingsError::Invalid {
                key: "poll.request_timeout_secs".into(),
                reason: "must be positive".into(),
            })
        }
        Some(secs) => Duration::from_secs(secs),
        None => DEFAULT_REQUEST_TIMEOUT,
    };

    let grouping = match str_at(poll, "grouping") {
        Some(raw) => SlotGrouping::from_str_loose(&raw).ok_or_else(|| SettingsError::Invalid {
            key: "poll.grouping".into(),
            reason: format!("unknown grouping {raw:?} (expected \"instance\" or \"category\")"),
        })?,
        None => SlotGrouping::default(),
    };

    let retry = retry_policy(root.get("retry"))?;

    let mut instances = match root.get("instances") {
        Some(Value::Array(entries)) => entries
            .iter()
            .enumerate()
            .map(|(i, entry)| instance_from_json(i, entry))
            .collect::<Result<Vec<_>, _>>()?,
        Some(Value::Null) | None => Vec::new(),
        Some(_) => {
            return Err(SettingsError::Invalid {
                key: "instances".into(),
                reason: "must be an array".into(),
            })
        }
    };
    if instances.is_empty() {
        instances = legacy_instances(&env)?;
    }
    if instances.is_empty() {
        tracing::warn!("no instances configured; the channel will only show the idle notice");
    }

    Ok(Settings {
        discord_token,
        channel_id,
        poll_interval,
        request_timeout,
        grouping,
        retry,
        instances,
    })
}

fn instance_from_json(index: usize, entry: &Value) -> Result<InstanceConfig, SettingsError> {
    let field = |name: &str| str_at(Some(entry), name);
    let key = |name: &str| format!("instances[{index}].{name}");

    let kind_raw = field("kind").ok_or_else(|| SettingsError::Invalid {
        key: key("kind"),
        reason: "missing".into(),
    })?;
    let kind = InstanceKind::from_str_loose(&kind_raw).ok_or_else(|| SettingsError::Invalid {
        key: key("kind"),
        reason: format!("unknown kind {kind_raw:?}"),
    })?;
    let url = field("url").ok_or_else(|| SettingsError::Invalid {
        key: key("url"),
        reason: "missing".into(),
    })?;
    let id = field("id").unwrap_or_else(|| kind.kind_id().to_string());

    Ok(InstanceConfig::new(
        id,
        kind,
        &url,
        field("api_key").unwrap_or_default(),
        field("label").unwrap_or_default(),
    )?)
}

/// `SONARR_IP`, `SONARR_PORT`, `SONARR_API_KEY`, `SONARR_TITLE` and the `_ANIME` suffixed set,
/// likewise for `RADARR_*`. An instance exists when its IP is set.
fn legacy_instances(env: &impl Fn(&str) -> Option<String>) -> Result<Vec<InstanceConfig>, SettingsError> {
    let mut instances = Vec::new();
    for kind in InstanceKind::all() {
        let prefix = kind.kind_id().to_uppercase();
        for (suffix, id_suffix) in [("", ""), ("_ANIME", "-anime")] {
            let var = |name: &str| env(&format!("{prefix}_{name}{suffix}"));
            let Some(host) = var("IP") else {
                continue;
            };
            let url = match var("PORT") {
                Some(port) => format!("http://{host}:{port}"),
                None => format!("http://{host}"),
            };
            let id = format!("{}{}", kind.kind_id(), id_suffix);
            let label = var("TITLE").unwrap_or_else(|| id.clone());
            instances.push(InstanceConfig::new(
                id,
                *kind,
                &url,
                var("API_KEY").unwrap_or_default(),
                label,
            )?);
        }
    }
    if !instances.is_empty() {
        tracing::info!(count = instances.len(), "instances taken from legacy environment variables");
    }
    Ok(instances)
}

fn retry_policy(retry: Option<&Value>) -> Result<RetryPolicy, SettingsError> {
    let mut policy = RetryPolicy::default();
    if let Some(attempts) = u64_at(retry, "max_attempts", "retry.max_attempts")? {
        policy.max_attempts = u32::try_from(attempts.max(1)).unwrap_or(u32::MAX);
    }
    if let Some(ms) = u64_at(retry, "base_delay_ms", "retry.base_delay_ms")? {
        policy.base_delay = Duration::from_millis(ms);
    }
    if let Some(ms) = u64_at(retry, "max_delay_ms", "retry.max_delay_ms")? {
        policy.max_delay = Duration::from_millis(ms);
    }
    if let Some(multiplier) = retry.and_then(|r| r.get("multiplier")).and_then(Value::as_f64) {
        policy.multiplier = multiplier.max(1.0);
    }
    Ok(policy)
}

fn str_at(parent: Option<&Value>, name: &str) -> Option<String> {
    parent
        .and_then(|p| p.get(name))
        .and_then(|v| v.as_str())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn u64_at(parent: Option<&Value>, name: &str, key: &str) -> Result<Option<u64>, SettingsError> {
    match parent.and_then(|p| p.get(name)) {
        None | Some(Value::Null) => Ok(None),
        Some(v) => v.as_u64().map(Some).ok_or_else(|| SettingsError::Invalid {
            key: key.to_string(),
            reason: format!("expected a non-negative integer, got {v}"),
        }),
    }
}

fn parse_u64(key: &str, raw: &str) -> Result<u64, SettingsError> {
    raw.parse().map_err(|_| SettingsError::Invalid {
        key: key.to_string(),
        reason: format!("expected a non-negative integer, got {raw:?}"),
    })
}
