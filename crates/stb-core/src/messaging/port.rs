use async_trait::async_trait;

use crate::{
    domain::{ChatId, MessageId, ThreadId},
    Result,
};

/// Port over the messaging surface: the admin forum plus private chats.
///
/// Thread operations target the configured admin chat. Implementations map
/// transport failures into `Error::TargetMissing` (thread/chat gone),
/// `Error::RecipientBlocked` or `Error::Transient`.
#[async_trait]
pub trait MessagingPort: Send + Sync {
    /// Create a forum topic in the admin chat and return its id.
    async fn create_thread(&self, title: &str) -> Result<ThreadId>;

    async fn post_to_thread(&self, thread: ThreadId, text: &str) -> Result<MessageId>;

    /// Forward a user's message into a thread, keeping the "forwarded from" header.
    async fn forward_to_thread(
        &self,
        from_chat: ChatId,
        message_id: MessageId,
        thread: ThreadId,
    ) -> Result<MessageId>;

    async fn send_text(&self, chat_id: ChatId, text: &str) -> Result<MessageId>;

    /// Copy an admin-chat message to `to_chat` without attribution.
    async fn copy_from_admin(&self, to_chat: ChatId, message_id: MessageId) -> Result<MessageId>;
}
