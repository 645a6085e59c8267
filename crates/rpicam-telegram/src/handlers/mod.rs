//! Telegram update handlers.
//!
//! Converts teloxide messages into core updates and hands them to the
//! dispatcher. Authorization, routing and replies all happen in `rpicam-core`.

use std::sync::Arc;

use teloxide::{prelude::*, types::Message};

use rpicam_core::domain::{ChatId, IncomingMessage, Sender};

use crate::router::AppState;

pub async fn handle_message(msg: Message, state: Arc<AppState>) -> ResponseResult<()> {
    let incoming = incoming_message(&msg);
    let outcome = state.dispatcher.process_update(&incoming).await;
    tracing::debug!(chat_id = incoming.chat_id.0, ?outcome, "update processed");
    Ok(())
}

pub fn incoming_message(msg: &Message) -> IncomingMessage {
    IncomingMessage {
        chat_id: ChatId(msg.chat.id.0),
        sender: msg.from().map(|u| Sender {
            username: u.username.clone(),
            first_name: u.first_name.clone(),
        }),
        text: msg.text().map(|s| s.to_string()),
    }
}
