use std::sync::Arc;

use anyhow::Context;
use teloxide::{
    dispatching::Dispatcher, dptree, error_handlers::LoggingErrorHandler, prelude::*,
    update_listeners::Polling,
};

use rpicam_core::{
    config::Config, dispatch::Dispatcher as UpdateDispatcher, messaging::port::MessagingPort,
    ports::Camera, status::StatusProvider,
};

use crate::handlers;
use crate::TelegramMessenger;

#[derive(Clone)]
pub struct AppState {
    pub dispatcher: Arc<UpdateDispatcher>,
}

/// Every update maps to the same key, so teloxide runs one worker and
/// handles updates in the order the feed returned them.
fn single_queue(_: &Update) -> Option<()> {
    Some(())
}

/// Identify the bot, drop any webhook, then long-poll until Ctrl-C.
///
/// Failing to identify the bot or to remove the webhook is fatal: long polling
/// and webhooks are mutually exclusive, so there is nothing useful to fall back to.
pub async fn run_polling(
    cfg: Arc<Config>,
    camera: Arc<dyn Camera>,
    status: Arc<dyn StatusProvider>,
) -> anyhow::Result<()> {
    let bot = Bot::new(cfg.telegram_bot_token.clone());
    let telegram = TelegramMessenger::new(bot.clone());

    let me = telegram
        .identity()
        .await
        .context("failed to get info of the bot")?;
    tracing::info!("launching bot: @{} ({})", me.username, me.first_name);
    tracing::info!(
        allowed_users = cfg.allowed_users.len(),
        width = cfg.image_size.width,
        height = cfg.image_size.height,
        temp_dir = %cfg.temp_dir.display(),
        "configuration loaded"
    );

    telegram
        .delete_webhook()
        .await
        .context("failed to delete webhook")?;

    let messenger: Arc<dyn MessagingPort> = Arc::new(telegram);
    let dispatcher = Arc::new(UpdateDispatcher::new(&cfg, messenger, camera, status));

    let state = Arc::new(AppState { dispatcher });

    let listener = Polling::builder(bot.clone())
        .timeout(cfg.poll_interval)
        .build();

    let handler = dptree::entry().branch(Update::filter_message().endpoint(handlers::handle_message));

    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![state])
        .distribution_function(single_queue)
        .enable_ctrlc_handler()
        .build()
        .dispatch_with_listener(
            listener,
            LoggingErrorHandler::with_custom_text("error while receiving update"),
        )
        .await;

    Ok(())
}
