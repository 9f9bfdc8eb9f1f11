/// Telegram user id (numeric).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct UserId(pub i64);

/// Telegram chat id (numeric).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ChatId(pub i64);

/// Telegram message id (numeric).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct MessageId(pub i32);

/// Forum topic id inside the admin chat.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ThreadId(pub i32);

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::fmt::Display for ThreadId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The end-user as seen on the messaging surface.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UserProfile {
    pub id: UserId,
    pub first_name: String,
    pub last_name: Option<String>,
    pub username: Option<String>,
    pub language_code: Option<String>,
}

impl UserProfile {
    /// First and last name joined, or `user-{id}` when both are blank.
    pub fn full_name(&self) -> String {
        let joined = [Some(self.first_name.as_str()), self.last_name.as_deref()]
            .into_iter()
            .flatten()
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join(" ");
        let trimmed = joined.trim();
        if trimmed.is_empty() {
            format!("user-{}", self.id)
        } else {
            trimmed.to_string()
        }
    }
}

/// Durable association between one end-user and one admin forum topic.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TopicBinding {
    pub user_id: UserId,
    pub thread_id: ThreadId,
    pub full_name: String,
    pub username: Option<String>,
    pub topic_title: String,
    pub created_at: String,
    pub updated_at: String,
}

/// Insert payload for the binding store; timestamps are assigned on write.
#[derive(Clone, Debug)]
pub struct NewTopicBinding {
    pub user_id: UserId,
    pub thread_id: ThreadId,
    pub full_name: String,
    pub username: Option<String>,
    pub topic_title: String,
}
