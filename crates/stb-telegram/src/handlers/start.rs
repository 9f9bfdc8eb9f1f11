use std::sync::Arc;

use chrono::Utc;
use teloxide::prelude::*;

use stb_core::domain::UserId;

use crate::router::{log_core_error, AppState};

pub async fn handle_start(bot: Bot, msg: Message, state: Arc<AppState>) -> ResponseResult<()> {
    let greeting = match state.relay.start_greeting() {
        Ok(text) => text,
        Err(e) => {
            log_core_error("Failed to load start greeting", msg.chat.id.0, &e);
            stb_core::relay::DEFAULT_START_MESSAGE.to_string()
        }
    };
    bot.send_message(msg.chat.id, greeting).await?;

    if let Some(user) = msg.from() {
        if let Err(e) = state.relay.touch(UserId(user.id.0 as i64), Utc::now()) {
            log_core_error("Failed to record user activity", msg.chat.id.0, &e);
        }
    }
    Ok(())
}
