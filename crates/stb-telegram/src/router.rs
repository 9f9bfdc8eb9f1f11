use std::sync::Arc;

use teloxide::{
    dispatching::Dispatcher, dptree, error_handlers::LoggingErrorHandler, prelude::*,
};
use tracing::{error, info, warn};

use stb_core::{
    activity::ActivityStore, config::Config, db::SharedConnection,
    messaging::port::MessagingPort, relay::Relay, settings::SettingsStore,
    topic_service::TopicService, topic_store::TopicStore,
};

use crate::handlers::{self, greeting_editor::EditorSessions};
use crate::TelegramMessenger;

#[derive(Clone)]
pub struct AppState {
    pub cfg: Arc<Config>,
    pub relay: Relay,
    pub editors: Arc<EditorSessions>,
    /// Our own user id; messages we post into topics are not relayed back.
    pub bot_id: i64,
}

pub async fn run_polling(cfg: Arc<Config>, conn: SharedConnection) -> anyhow::Result<()> {
    let bot = Bot::new(cfg.bot_token.clone());
    let me = bot.get_me().await?;

    let messenger: Arc<dyn MessagingPort> =
        Arc::new(TelegramMessenger::new(bot.clone(), cfg.admin_chat_id));
    let topics = TopicService::new(messenger.clone(), TopicStore::new(conn.clone()));
    let relay = Relay::new(
        messenger,
        topics,
        ActivityStore::new(conn.clone()),
        SettingsStore::new(conn),
    );

    let state = Arc::new(AppState {
        cfg: cfg.clone(),
        relay,
        editors: Arc::new(EditorSessions::new(cfg.editor_user_ids.iter().copied())),
        bot_id: me.id.0 as i64,
    });

    let handler = dptree::entry()
        .branch(Update::filter_my_chat_member().endpoint(handlers::handle_my_chat_member))
        .branch(Update::filter_message().endpoint(handlers::handle_message));

    info!(
        bot_id = state.bot_id,
        username = %me.username(),
        admin_chat_id = cfg.admin_chat_id.0,
        "Bot started in long polling mode"
    );

    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![state])
        .error_handler(LoggingErrorHandler::with_custom_text(
            "Unhandled Telegram API error",
        ))
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;

    info!("Shutting down bot");
    Ok(())
}

/// Log a core error raised while handling an update.
///
/// External failures are expected under normal operation (rate limits, users
/// leaving); everything else is a bug or an infrastructure problem.
pub(crate) fn log_core_error(context: &'static str, update_chat: i64, e: &stb_core::Error) {
    if e.is_external() {
        warn!(chat_id = update_chat, error = %e, "{context}");
    } else {
        error!(chat_id = update_chat, error = %e, "{context}");
    }
}
