//! Chat transport abstraction: create / edit / delete / list against the one destination channel.
//! Each platform declares its limits as capabilities; the renderer sizes payloads from them.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

/// Platform message id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MessageId(pub u64);

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmbedField {
    pub name: String,
    pub value: String,
    pub inline: bool,
}

/// Platform-neutral rich block (a Discord embed).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Embed {
    pub title: Option<String>,
    pub author: Option<String>,
    pub description: Option<String>,
    pub colour: Option<u32>,
    pub fields: Vec<EmbedField>,
    pub thumbnail_url: Option<String>,
}

impl Embed {
    pub fn field(mut self, name: impl Into<String>, value: impl Into<String>, inline: bool) -> Self {
        self.fields.push(EmbedField {
            name: name.into(),
            value: value.into(),
            inline,
        });
        self
    }

    /// Characters counted against the per-message embed budget.
    pub fn char_count(&self) -> usize {
        let opt = |s: &Option<String>| s.as_deref().map_or(0, |s| s.chars().count());
        opt(&self.title)
            + opt(&self.author)
            + opt(&self.description)
            + self
                .fields
                .iter()
                .map(|f| f.name.chars().count() + f.value.chars().count())
                .sum::<usize>()
    }
}

/// Full content of one chat message. Compared by value to decide whether an edit is needed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessageContent {
    pub text: String,
    pub embeds: Vec<Embed>,
}

impl MessageContent {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            embeds: Vec::new(),
        }
    }
}

/// Per-platform limits the renderer and reconciler must respect.
#[derive(Clone, Debug)]
pub struct ChatCapabilities {
    /// Max characters of plain text per message.
    pub max_message_len: usize,
    pub max_embeds_per_message: usize,
    /// Max characters across all embeds of one message.
    pub max_embed_chars: usize,
    /// Max messages returned by one history page.
    pub history_page_size: u8,
    /// Prefix for the log target (e.g. "discord").
    pub channel_id_prefix: &'static str,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChatApiError {
    #[error("rate limited (retry after {retry_after:?})")]
    RateLimited { retry_after: Option<Duration> },
    #[error("transient server error: {0}")]
    Transient(String),
    /// The request left but no answer came back; the server may have applied it.
    #[error("no response, outcome unknown: {0}")]
    Unconfirmed(String),
    #[error("permission denied: {0}")]
    PermissionDenied(String),
    /// The referenced message no longer exists.
    #[error("unknown message")]
    NotFound,
    #[error("{0}")]
    Other(String),
    #[error("{op} gave up after {attempts} attempt(s): {last}")]
    Exhausted {
        op: &'static str,
        attempts: u32,
        last: String,
    },
}

impl ChatApiError {
    /// Worth retrying within the same tick.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ChatApiError::RateLimited { .. } | ChatApiError::Transient(_) | ChatApiError::Unconfirmed(_)
        )
    }

    /// The call may have taken effect. Only safe to retry for idempotent operations.
    pub fn is_unconfirmed(&self) -> bool {
        matches!(self, ChatApiError::Unconfirmed(_))
    }

    /// Retrying cannot fix this; log loudly.
    pub fn is_unrecoverable(&self) -> bool {
        matches!(self, ChatApiError::PermissionDenied(_))
    }
}

/// Transport bound to one destination channel. Implemented per chat platform.
#[async_trait]
pub trait ChatTransport: Send + Sync {
    fn capabilities(&self) -> ChatCapabilities;

    /// Log target, e.g. "discord:1234".
    fn target(&self) -> String;

    async fn send(&self, content: &MessageContent) -> Result<MessageId, ChatApiError>;

    async fn edit(&self, id: MessageId, content: &MessageContent) -> Result<(), ChatApiError>;

    async fn delete(&self, id: MessageId) -> Result<(), ChatApiError>;

    /// Most recent messages in the channel, newest first, at most `limit`.
    async fn list_messages(&self, limit: u8) -> Result<Vec<MessageId>, ChatApiError>;
}
