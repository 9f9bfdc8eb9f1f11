//! `/setgreeting` flow: an editor sends the command, then the new text.

use std::{collections::HashSet, sync::Arc};

use teloxide::prelude::*;
use tokio::sync::Mutex;
use tracing::info;

use crate::router::{log_core_error, AppState};

const NO_RIGHTS_MESSAGE: &str = "You are not allowed to use this command.";

/// Which editors are mid-edit. Lives as long as the dispatcher.
pub struct EditorSessions {
    editors: HashSet<i64>,
    pending: Mutex<HashSet<i64>>,
}

impl EditorSessions {
    pub fn new(editors: impl IntoIterator<Item = i64>) -> Self {
        Self {
            editors: editors.into_iter().collect(),
            pending: Mutex::new(HashSet::new()),
        }
    }

    pub fn can_edit(&self, user_id: i64) -> bool {
        self.editors.contains(&user_id)
    }

    /// Returns false if the user is not an editor.
    pub async fn begin(&self, user_id: i64) -> bool {
        if !self.can_edit(user_id) {
            return false;
        }
        self.pending.lock().await.insert(user_id);
        true
    }

    /// Returns whether an edit was pending.
    pub async fn cancel(&self, user_id: i64) -> bool {
        self.pending.lock().await.remove(&user_id)
    }

    pub async fn is_pending(&self, user_id: i64) -> bool {
        self.can_edit(user_id) && self.pending.lock().await.contains(&user_id)
    }
}

fn sender(msg: &Message) -> Option<i64> {
    msg.from().map(|u| u.id.0 as i64)
}

pub async fn is_pending(state: &AppState, msg: &Message) -> bool {
    match sender(msg) {
        Some(id) => state.editors.is_pending(id).await,
        None => false,
    }
}

pub async fn handle_set_greeting(
    bot: Bot,
    msg: Message,
    state: Arc<AppState>,
) -> ResponseResult<()> {
    let Some(user_id) = sender(&msg) else {
        return Ok(());
    };

    if !state.editors.begin(user_id).await {
        bot.send_message(msg.chat.id, NO_RIGHTS_MESSAGE).await?;
        return Ok(());
    }

    bot.send_message(
        msg.chat.id,
        "Send the new start message.\n\nTo cancel, send /cancel.",
    )
    .await?;
    Ok(())
}

pub async fn handle_cancel(bot: Bot, msg: Message, state: Arc<AppState>) -> ResponseResult<()> {
    let Some(user_id) = sender(&msg) else {
        return Ok(());
    };

    let reply = if !state.editors.can_edit(user_id) {
        NO_RIGHTS_MESSAGE
    } else if state.editors.cancel(user_id).await {
        "Start message setup cancelled."
    } else {
        "No start message setup in progress."
    };
    bot.send_message(msg.chat.id, reply).await?;
    Ok(())
}

pub async fn handle_new_greeting(
    bot: Bot,
    msg: Message,
    state: Arc<AppState>,
) -> ResponseResult<()> {
    let Some(user_id) = sender(&msg) else {
        return Ok(());
    };
    let Some(text) = msg.text() else {
        bot.send_message(msg.chat.id, "Send a text message or /cancel.")
            .await?;
        return Ok(());
    };

    if let Err(e) = state.relay.set_start_greeting(text) {
        log_core_error("Failed to store start greeting", msg.chat.id.0, &e);
        bot.send_message(msg.chat.id, "Could not save the start message, try again.")
            .await?;
        return Ok(());
    }
    state.editors.cancel(user_id).await;
    info!(user_id, "Start greeting updated");

    bot.send_message(msg.chat.id, "Start message updated.").await?;
    Ok(())
}
