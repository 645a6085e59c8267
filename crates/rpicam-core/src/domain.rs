use std::fmt;

/// Telegram username used as the identity on the allow-list.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct UserId(pub String);

impl UserId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for UserId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Telegram chat id (numeric).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ChatId(pub i64);

/// Who sent an update, as far as the transport could tell.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Sender {
    pub username: Option<String>,
    pub first_name: String,
}

/// One inbound message event from the update feed.
#[derive(Clone, Debug)]
pub struct IncomingMessage {
    pub chat_id: ChatId,
    pub sender: Option<Sender>,
    /// `None` for non-text messages (stickers, photos, ...).
    pub text: Option<String>,
}

/// Identity the bot runs as (`getMe`).
#[derive(Clone, Debug)]
pub struct BotIdentity {
    pub username: String,
    pub first_name: String,
}
