//! Telegram adapter (teloxide).
//!
//! This crate implements the `stb-core` MessagingPort over the Telegram Bot API
//! and wires the relay into a teloxide dispatcher.

use std::sync::OnceLock;

use async_trait::async_trait;
use regex::Regex;
use teloxide::{prelude::*, RequestError};
use tokio::time::sleep;

pub mod handlers;
pub mod router;

use stb_core::{
    domain::{ChatId, MessageId, ThreadId},
    errors::Error,
    messaging::port::MessagingPort,
    Result,
};

/// Topic icon colour; must be one of the six values Telegram accepts.
const TOPIC_ICON_COLOR: u32 = 0x6FB9F0;

#[derive(Clone)]
pub struct TelegramMessenger {
    bot: Bot,
    admin_chat: ChatId,
}

impl TelegramMessenger {
    pub fn new(bot: Bot, admin_chat: ChatId) -> Self {
        Self { bot, admin_chat }
    }

    fn tg_chat(chat_id: ChatId) -> teloxide::types::ChatId {
        teloxide::types::ChatId(chat_id.0)
    }

    fn tg_msg_id(message_id: MessageId) -> teloxide::types::MessageId {
        teloxide::types::MessageId(message_id.0)
    }

    fn map_err(e: RequestError) -> Error {
        match &e {
            RequestError::Api(api) => classify_api_error(&api.to_string()),
            _ => Error::Transient(format!("telegram error: {e}")),
        }
    }

    async fn with_retry<T, Fut>(&self, mut op: impl FnMut() -> Fut) -> Result<T>
    where
        Fut: std::future::IntoFuture<Output = std::result::Result<T, RequestError>>,
        Fut::IntoFuture: Send,
    {
        const MAX_RETRIES: usize = 1;
        let mut attempts = 0usize;
        loop {
            match op().await {
                Ok(v) => return Ok(v),
                Err(RequestError::RetryAfter(d)) if attempts < MAX_RETRIES => {
                    attempts += 1;
                    sleep(d).await;
                }
                Err(other) => return Err(Self::map_err(other)),
            }
        }
    }
}

/// Sort a Bot API error description into the core taxonomy.
pub fn classify_api_error(description: &str) -> Error {
    static BLOCKED: OnceLock<Regex> = OnceLock::new();
    static THREAD_MISSING: OnceLock<Regex> = OnceLock::new();

    let blocked =
        BLOCKED.get_or_init(|| Regex::new(r"(?i)bot was blocked by the user").expect("valid regex"));
    let thread_missing = THREAD_MISSING.get_or_init(|| {
        Regex::new(r"(?i)message thread|topic.*not found|thread.*not found|topic_deleted")
            .expect("valid regex")
    });

    if blocked.is_match(description) {
        Error::RecipientBlocked(description.to_string())
    } else if thread_missing.is_match(description) {
        Error::TargetMissing(description.to_string())
    } else {
        Error::Transient(format!("telegram error: {description}"))
    }
}

#[async_trait]
impl MessagingPort for TelegramMessenger {
    async fn create_thread(&self, title: &str) -> Result<ThreadId> {
        let topic = self
            .with_retry(|| {
                self.bot.create_forum_topic(
                    Self::tg_chat(self.admin_chat),
                    title.to_string(),
                    TOPIC_ICON_COLOR,
                    String::new(),
                )
            })
            .await?;
        Ok(ThreadId(topic.message_thread_id))
    }

    async fn post_to_thread(&self, thread: ThreadId, text: &str) -> Result<MessageId> {
        let msg = self
            .with_retry(|| {
                self.bot
                    .send_message(Self::tg_chat(self.admin_chat), text.to_string())
                    .message_thread_id(thread.0)
            })
            .await?;
        Ok(MessageId(msg.id.0))
    }

    async fn forward_to_thread(
        &self,
        from_chat: ChatId,
        message_id: MessageId,
        thread: ThreadId,
    ) -> Result<MessageId> {
        let msg = self
            .with_retry(|| {
                self.bot
                    .forward_message(
                        Self::tg_chat(self.admin_chat),
                        Self::tg_chat(from_chat),
                        Self::tg_msg_id(message_id),
                    )
                    .message_thread_id(thread.0)
            })
            .await?;
        Ok(MessageId(msg.id.0))
    }

    async fn send_text(&self, chat_id: ChatId, text: &str) -> Result<MessageId> {
        let msg = self
            .with_retry(|| self.bot.send_message(Self::tg_chat(chat_id), text.to_string()))
            .await?;
        Ok(MessageId(msg.id.0))
    }

    async fn copy_from_admin(&self, to_chat: ChatId, message_id: MessageId) -> Result<MessageId> {
        let id = self
            .with_retry(|| {
                self.bot.copy_message(
                    Self::tg_chat(to_chat),
                    Self::tg_chat(self.admin_chat),
                    Self::tg_msg_id(message_id),
                )
            })
            .await?;
        Ok(MessageId(id.0))
    }
}
