//! Chat side: platform transport (serenity only in chat::discord), the rate-limited gateway
//! every reconciliation call goes through, and log helpers.

pub mod discord;
pub mod gateway;
pub mod log;
pub mod transport;

pub use discord::DiscordTransport;
pub use gateway::{ChatGateway, RetryPolicy};
pub use transport::{
    ChatApiError, ChatCapabilities, ChatTransport, Embed, EmbedField, MessageContent, MessageId,
};
