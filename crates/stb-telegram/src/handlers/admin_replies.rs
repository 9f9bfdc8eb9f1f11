use std::sync::Arc;

use teloxide::prelude::*;
use tracing::debug;

use stb_core::domain::{MessageId, ThreadId};

use crate::router::{log_core_error, AppState};

pub async fn handle_admin_message(msg: Message, state: Arc<AppState>) -> ResponseResult<()> {
    let Some(thread_id) = msg.thread_id else {
        return Ok(());
    };
    if msg.from().map(|u| u.id.0 as i64) == Some(state.bot_id) {
        return Ok(());
    }

    // Inside a topic every message implicitly replies to the topic root; only
    // explicit replies to a forwarded user message are relayed.
    let Some(replied) = msg.reply_to_message() else {
        return Ok(());
    };
    if replied.forward().is_none() {
        return Ok(());
    }

    match state
        .relay
        .relay_admin_reply(ThreadId(thread_id), MessageId(msg.id.0), msg.text())
        .await
    {
        Ok(outcome) => debug!(thread_id, ?outcome, "Handled admin reply"),
        Err(e) => log_core_error("Failed to relay admin reply", msg.chat.id.0, &e),
    }
    Ok(())
}
