//! Discord transport: all serenity usage is confined here. REST only (no gateway connection);
//! bound to the one destination channel.

use std::sync::Arc;

use async_trait::async_trait;
use serenity::all::{
    ChannelId, CreateEmbed, CreateEmbedAuthor, CreateMessage, EditMessage, GetMessages, Http,
};
use serenity::http::HttpError;

use super::log::truncate_content_default;
use super::transport::{ChatApiError, ChatCapabilities, ChatTransport, Embed, MessageContent, MessageId};

pub const DISCORD_MAX_MESSAGE_LEN: usize = 2000;
pub const DISCORD_MAX_EMBEDS: usize = 10;
pub const DISCORD_MAX_EMBED_CHARS: usize = 6000;
const DISCORD_HISTORY_PAGE: u8 = 100;

pub struct DiscordTransport {
    http: Arc<Http>,
    channel_id: ChannelId,
}

impl DiscordTransport {
    /// `channel_id` must be non-zero (validated by settings loading).
    pub fn new(token: &str, channel_id: u64) -> Self {
        Self::with_http(Arc::new(Http::new(token)), channel_id)
    }

    pub fn with_http(http: Arc<Http>, channel_id: u64) -> Self {
        Self {
            http,
            channel_id: ChannelId::new(channel_id),
        }
    }

    /// Check the token by fetching the bot user. Used once at startup.
    pub async fn whoami(&self) -> Result<String, ChatApiError> {
        let user = self.http.get_current_user().await.map_err(map_error)?;
        Ok(user.name.clone())
    }
}

#[async_trait]
impl ChatTransport for DiscordTransport {
    fn capabilities(&self) -> ChatCapabilities {
        ChatCapabilities {
            max_message_len: DISCORD_MAX_MESSAGE_LEN,
            max_embeds_per_message: DISCORD_MAX_EMBEDS,
            max_embed_chars: DISCORD_MAX_EMBED_CHARS,
            history_page_size: DISCORD_HISTORY_PAGE,
            channel_id_prefix: "discord",
        }
    }

    fn target(&self) -> String {
        format!("{}:{}", self.capabilities().channel_id_prefix, self.channel_id)
    }

    async fn send(&self, content: &MessageContent) -> Result<MessageId, ChatApiError> {
        let builder = CreateMessage::new()
            .content(truncate_to_max(&content.text))
            .embeds(content.embeds.iter().map(build_embed).collect());
        let message = self
            .channel_id
            .send_message(&*self.http, builder)
            .await
            .map_err(map_error)?;
        tracing::debug!(
            target_channel = %self.target(),
            message_id = %message.id,
            content = %truncate_content_default(&content.text),
            "message posted"
        );
        Ok(MessageId(message.id.get()))
    }

    async fn edit(&self, id: MessageId, content: &MessageContent) -> Result<(), ChatApiError> {
        let builder = EditMessage::new()
            .content(truncate_to_max(&content.text))
            .embeds(content.embeds.iter().map(build_embed).collect());
        self.channel_id
            .edit_message(&*self.http, discord_id(id)?, builder)
            .await
            .map_err(map_error)?;
        Ok(())
    }

    async fn delete(&self, id: MessageId) -> Result<(), ChatApiError> {
        self.channel_id
            .delete_message(&*self.http, discord_id(id)?)
            .await
            .map_err(map_error)
    }

    async fn list_messages(&self, limit: u8) -> Result<Vec<MessageId>, ChatApiError> {
        let limit = limit.clamp(1, DISCORD_HISTORY_PAGE);
        let messages = self
            .channel_id
            .messages(&*self.http, GetMessages::new().limit(limit))
            .await
            .map_err(map_error)?;
        Ok(messages.iter().map(|m| MessageId(m.id.get())).collect())
    }
}

fn discord_id(id: MessageId) -> Result<serenity::all::MessageId, ChatApiError> {
    if id.0 == 0 {
        return Err(ChatApiError::NotFound);
    }
    Ok(serenity::all::MessageId::new(id.0))
}

fn build_embed(embed: &Embed) -> CreateEmbed {
    let mut builder = CreateEmbed::new();
    if let Some(title) = &embed.title {
        builder = builder.title(title);
    }
    if let Some(author) = &embed.author {
        builder = builder.author(CreateEmbedAuthor::new(author));
    }
    if let Some(description) = &embed.description {
        builder = builder.description(description);
    }
    if let Some(colour) = embed.colour {
        builder = builder.colour(colour);
    }
    for field in &embed.fields {
        builder = builder.field(&field.name, &field.value, field.inline);
    }
    if let Some(url) = &embed.thumbnail_url {
        builder = builder.thumbnail(url);
    }
    builder
}

fn truncate_to_max(text: &str) -> &str {
    if text.len() <= DISCORD_MAX_MESSAGE_LEN {
        return text;
    }
    let mut end = DISCORD_MAX_MESSAGE_LEN;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}

fn map_error(err: serenity::Error) -> ChatApiError {
    match &err {
        serenity::Error::Http(http_err) => map_http_error(http_err),
        _ => ChatApiError::Other(err.to_string()),
    }
}

fn map_http_error(err: &HttpError) -> ChatApiError {
    match err {
        HttpError::UnsuccessfulRequest(response) => {
            let detail = format!("{} (code {})", response.error.message, response.error.code);
            match response.status_code.as_u16() {
                429 => ChatApiError::RateLimited { retry_after: None },
                401 | 403 => ChatApiError::PermissionDenied(detail),
                404 => ChatApiError::NotFound,
                s if s >= 500 => ChatApiError::Transient(format!("status {s}: {detail}")),
                s => ChatApiError::Other(format!("status {s}: {detail}")),
            }
        }
        HttpError::Request(e) if e.is_connect() => ChatApiError::Transient(e.to_string()),
        HttpError::Request(e) => ChatApiError::Unconfirmed(e.to_string()),
        other => ChatApiError::Other(other.to_string()),
    }
}
