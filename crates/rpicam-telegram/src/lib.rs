//! Telegram adapter (teloxide).
//!
//! This crate implements the `rpicam-core` MessagingPort over the Telegram Bot
//! API and runs the long-polling loop that feeds the dispatcher.

use std::path::Path;

use async_trait::async_trait;

use teloxide::{
    prelude::*,
    types::{InputFile, KeyboardButton, KeyboardMarkup},
};

use tokio::time::sleep;

pub mod handlers;
pub mod router;

use rpicam_core::{
    domain::{BotIdentity, ChatId},
    errors::Error,
    messaging::{
        port::MessagingPort,
        types::{ChatAction, ParseMode, ReplyKeyboard, ReplyOptions},
    },
    Result,
};

#[derive(Clone)]
pub struct TelegramMessenger {
    bot: Bot,
}

impl TelegramMessenger {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }

    /// `getMe`: who we are running as.
    pub async fn identity(&self) -> Result<BotIdentity> {
        let me = self.with_retry(|| self.bot.get_me()).await?;
        Ok(BotIdentity {
            username: me.username().to_string(),
            first_name: me.user.first_name.clone(),
        })
    }

    /// Long polling does not work while a webhook is registered.
    pub async fn delete_webhook(&self) -> Result<()> {
        self.with_retry(|| self.bot.delete_webhook()).await?;
        Ok(())
    }

    fn tg_chat(chat_id: ChatId) -> teloxide::types::ChatId {
        teloxide::types::ChatId(chat_id.0)
    }

    fn map_err(e: teloxide::RequestError) -> Error {
        Error::Delivery(format!("telegram error: {e}"))
    }

    async fn with_retry<T, Fut>(&self, mut op: impl FnMut() -> Fut) -> Result<T>
    where
        Fut: std::future::IntoFuture<Output = std::result::Result<T, teloxide::RequestError>>,
        Fut::IntoFuture: Send,
    {
        const MAX_RETRIES: usize = 1;
        let mut attempts = 0usize;
        loop {
            match op().await {
                Ok(v) => return Ok(v),
                Err(e) => match e {
                    teloxide::RequestError::RetryAfter(d) if attempts < MAX_RETRIES => {
                        attempts += 1;
                        sleep(d).await;
                        continue;
                    }
                    other => return Err(Self::map_err(other)),
                },
            }
        }
    }
}

pub fn reply_markup(kb: &ReplyKeyboard) -> KeyboardMarkup {
    let rows: Vec<Vec<KeyboardButton>> = kb
        .rows
        .iter()
        .map(|row| row.iter().map(KeyboardButton::new).collect())
        .collect();
    KeyboardMarkup::new(rows).resize_keyboard(kb.resize)
}

// Legacy Markdown: the replies use `*bold*`, which MarkdownV2 would reject unescaped.
#[allow(deprecated)]
fn tg_parse_mode(mode: ParseMode) -> teloxide::types::ParseMode {
    match mode {
        ParseMode::Markdown => teloxide::types::ParseMode::Markdown,
    }
}

#[async_trait]
impl MessagingPort for TelegramMessenger {
    async fn send_text(&self, chat_id: ChatId, text: &str, opts: &ReplyOptions) -> Result<()> {
        let markup = opts.keyboard.as_ref().map(reply_markup);
        let parse_mode = tg_parse_mode(opts.parse_mode);

        self.with_retry(|| {
            let mut req = self
                .bot
                .send_message(Self::tg_chat(chat_id), text.to_string())
                .parse_mode(parse_mode);
            if let Some(markup) = &markup {
                req = req.reply_markup(markup.clone());
            }
            req
        })
        .await?;
        Ok(())
    }

    async fn send_photo(&self, chat_id: ChatId, path: &Path, opts: &ReplyOptions) -> Result<()> {
        let markup = opts.keyboard.as_ref().map(reply_markup);
        let parse_mode = tg_parse_mode(opts.parse_mode);

        self.with_retry(|| {
            let mut req = self
                .bot
                .send_photo(Self::tg_chat(chat_id), InputFile::file(path.to_path_buf()))
                .parse_mode(parse_mode);
            if let Some(markup) = &markup {
                req = req.reply_markup(markup.clone());
            }
            req
        })
        .await?;
        Ok(())
    }

    async fn send_chat_action(&self, chat_id: ChatId, action: ChatAction) -> Result<()> {
        let tg_action = match action {
            ChatAction::Typing => teloxide::types::ChatAction::Typing,
            ChatAction::UploadPhoto => teloxide::types::ChatAction::UploadPhoto,
        };
        self.with_retry(|| self.bot.send_chat_action(Self::tg_chat(chat_id), tg_action))
            .await?;
        Ok(())
    }
}
