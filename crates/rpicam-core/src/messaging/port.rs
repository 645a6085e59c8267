use std::path::Path;

use async_trait::async_trait;

use crate::{
    domain::ChatId,
    messaging::types::{ChatAction, ReplyOptions},
    Result,
};

/// Outbound side of the transport.
///
/// Errors carry the transport's own failure description; callers log them and
/// carry on.
#[async_trait]
pub trait MessagingPort: Send + Sync {
    async fn send_text(&self, chat_id: ChatId, text: &str, opts: &ReplyOptions) -> Result<()>;

    async fn send_photo(&self, chat_id: ChatId, path: &Path, opts: &ReplyOptions) -> Result<()>;

    async fn send_chat_action(&self, chat_id: ChatId, action: ChatAction) -> Result<()>;
}
