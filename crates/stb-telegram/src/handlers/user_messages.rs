use std::sync::Arc;

use chrono::Utc;
use teloxide::prelude::*;
use tracing::debug;

use stb_core::domain::{ChatId, MessageId};

use crate::handlers::{is_command_text, profile};
use crate::router::{log_core_error, AppState};

pub async fn handle_user_message(msg: Message, state: Arc<AppState>) -> ResponseResult<()> {
    let Some(user) = msg.from() else {
        return Ok(());
    };
    let is_command = msg.text().map(is_command_text).unwrap_or(false);

    match state
        .relay
        .relay_user_message(
            &profile(user),
            ChatId(msg.chat.id.0),
            MessageId(msg.id.0),
            is_command,
            Utc::now(),
        )
        .await
    {
        Ok(out) => debug!(
            user_id = user.id.0,
            thread_id = out.thread_id.0,
            first_reply_sent = out.first_reply_sent,
            "Relayed user message"
        ),
        Err(e) => log_core_error("Failed to relay user message", msg.chat.id.0, &e),
    }
    Ok(())
}
