//! Telegram update handlers.
//!
//! Private chats: `/start`, the greeting editor, then the user relay.
//! Admin chat: replies inside topics are relayed back to users.

use std::sync::{Arc, OnceLock};

use regex::Regex;
use teloxide::{
    prelude::*,
    types::{ChatMemberKind, ChatMemberUpdated, Message, User},
};
use tracing::info;

use stb_core::domain::{UserId, UserProfile};

use crate::router::{log_core_error, AppState};

mod admin_replies;
pub mod greeting_editor;
mod start;
mod user_messages;

pub async fn handle_message(bot: Bot, msg: Message, state: Arc<AppState>) -> ResponseResult<()> {
    log_incoming(&msg);

    if msg.chat.is_private() {
        let command = msg.text().and_then(parse_command);
        match command.as_ref().map(|(name, _)| name.as_str()) {
            Some("start") => return start::handle_start(bot, msg, state).await,
            Some("setgreeting") => return greeting_editor::handle_set_greeting(bot, msg, state).await,
            Some("cancel") => return greeting_editor::handle_cancel(bot, msg, state).await,
            _ => {}
        }

        if greeting_editor::is_pending(&state, &msg).await {
            return greeting_editor::handle_new_greeting(bot, msg, state).await;
        }

        return user_messages::handle_user_message(msg, state).await;
    }

    if msg.chat.id.0 == state.cfg.admin_chat_id.0 {
        return admin_replies::handle_admin_message(msg, state).await;
    }

    Ok(())
}

pub async fn handle_my_chat_member(
    upd: ChatMemberUpdated,
    state: Arc<AppState>,
) -> ResponseResult<()> {
    let old_status = member_status(&upd.old_chat_member.kind);
    let new_status = member_status(&upd.new_chat_member.kind);

    info!(
        chat_id = upd.chat.id.0,
        from_id = upd.from.id.0,
        from_username = ?upd.from.username,
        old_status,
        new_status,
        "Incoming my_chat_member update"
    );

    if !upd.chat.is_private() {
        return Ok(());
    }

    if let Err(e) = state
        .relay
        .member_status_changed(UserId(upd.chat.id.0), old_status, new_status)
        .await
    {
        log_core_error(
            "Unexpected failure while posting my_chat_member status update",
            upd.chat.id.0,
            &e,
        );
    }
    Ok(())
}

/// Bot API status names (`kicked` for banned).
fn member_status(kind: &ChatMemberKind) -> &'static str {
    match kind {
        ChatMemberKind::Owner { .. } => "creator",
        ChatMemberKind::Administrator { .. } => "administrator",
        ChatMemberKind::Member { .. } => "member",
        ChatMemberKind::Restricted { .. } => "restricted",
        ChatMemberKind::Left { .. } => "left",
        ChatMemberKind::Banned { .. } => "kicked",
    }
}

fn log_incoming(msg: &Message) {
    let from = msg.from();
    info!(
        message_id = msg.id.0,
        from_id = from.map(|u| u.id.0),
        from_username = ?from.and_then(|u| u.username.as_deref()),
        chat_id = msg.chat.id.0,
        private = msg.chat.is_private(),
        text = ?msg.text(),
        caption = ?msg.caption(),
        command = ?msg.text().and_then(parse_command).map(|(name, _)| name),
        "Incoming message"
    );
}

/// `/cmd@botname args` → `("cmd", "args")`.
fn parse_command(text: &str) -> Option<(String, String)> {
    if !text.starts_with('/') {
        return None;
    }
    let mut parts = text.trim().splitn(2, char::is_whitespace);
    let first = parts.next().unwrap_or("").trim();
    let rest = parts.next().unwrap_or("").trim().to_string();

    let cmd = first
        .trim_start_matches('/')
        .split('@')
        .next()
        .unwrap_or("")
        .to_lowercase();
    if cmd.is_empty() {
        return None;
    }

    Some((cmd, rest))
}

/// Bot-command shaped text: `/name`, optionally `@bot`, then whitespace or end.
fn is_command_text(text: &str) -> bool {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^/[A-Za-z0-9_]+(?:@[A-Za-z0-9_]+)?(?:\s|$)").expect("valid regex")
    })
    .is_match(text)
}

fn profile(user: &User) -> UserProfile {
    UserProfile {
        id: UserId(user.id.0 as i64),
        first_name: user.first_name.clone(),
        last_name: user.last_name.clone(),
        username: user.username.clone(),
        language_code: user.language_code.clone(),
    }
}
