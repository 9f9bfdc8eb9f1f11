//! Message relay between private user chats and their admin forum topics.
//!
//! Transport-agnostic: the Telegram handlers translate updates into these calls.

use std::sync::{Arc, OnceLock};

use chrono::{DateTime, Utc};
use regex::Regex;
use tracing::{error, info, warn};

use crate::{
    activity::{ActivityStore, DEFAULT_INACTIVITY_WINDOW},
    domain::{ChatId, MessageId, ThreadId, UserId, UserProfile},
    errors::Error,
    messaging::port::MessagingPort,
    settings::SettingsStore,
    topic_service::TopicService,
    Result,
};

pub const DEFAULT_FIRST_REPLY_MESSAGE: &str =
    "We have received your message and will get back to you shortly.";
pub const DEFAULT_START_MESSAGE: &str = "Hello!\n\nYou can contact us using this bot.";

const REPLY_USAGE: &str = "Usage: /r <message>";
const BLOCKED_NOTICE: &str = "Cannot deliver message: user blocked the bot.";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct UserRelayOutcome {
    /// Topic the message ended up in (differs from the old binding after a recreate).
    pub thread_id: ThreadId,
    pub first_reply_sent: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AdminReplyOutcome {
    Delivered,
    /// The topic isn't bound to any user.
    Unbound,
    /// `/r` without text; usage hint posted into the topic.
    UsageHint,
    /// User blocked the bot; notice posted into the topic.
    Blocked,
    /// Other delivery failure; reported into the topic.
    Failed,
}

#[derive(Clone)]
pub struct Relay {
    messenger: Arc<dyn MessagingPort>,
    topics: TopicService,
    activity: ActivityStore,
    settings: SettingsStore,
}

impl Relay {
    pub fn new(
        messenger: Arc<dyn MessagingPort>,
        topics: TopicService,
        activity: ActivityStore,
        settings: SettingsStore,
    ) -> Self {
        Self {
            messenger,
            topics,
            activity,
            settings,
        }
    }

    pub fn topics(&self) -> &TopicService {
        &self.topics
    }

    /// Forward a private-chat message into the user's topic.
    ///
    /// A missing topic is recreated and the forward retried once. The first
    /// non-command message after 24h of silence gets an acknowledgment.
    pub async fn relay_user_message(
        &self,
        user: &UserProfile,
        chat_id: ChatId,
        message_id: MessageId,
        is_command: bool,
        now: DateTime<Utc>,
    ) -> Result<UserRelayOutcome> {
        let first_reply_due = !is_command
            && self
                .activity
                .is_inactive_for(user.id, now, DEFAULT_INACTIVITY_WINDOW)?;

        let binding = self.topics.ensure_for_user(user).await?;

        let thread_id = match self
            .messenger
            .forward_to_thread(chat_id, message_id, binding.thread_id)
            .await
        {
            Ok(_) => binding.thread_id,
            Err(e) if e.is_target_missing() => {
                warn!(
                    user_id = %user.id,
                    chat_id = chat_id.0,
                    message_id = message_id.0,
                    stale_thread_id = %binding.thread_id,
                    error = %e,
                    "Topic is missing; recreating and retrying user message relay"
                );

                let recreated = match self.topics.get_by_user_id(user.id)? {
                    // Another message already replaced the stale topic.
                    Some(current) if current.thread_id != binding.thread_id => current,
                    _ => self.topics.recreate_for_user(user).await?,
                };
                self.messenger
                    .forward_to_thread(chat_id, message_id, recreated.thread_id)
                    .await?;

                info!(
                    user_id = %user.id,
                    chat_id = chat_id.0,
                    message_id = message_id.0,
                    old_thread_id = %binding.thread_id,
                    new_thread_id = %recreated.thread_id,
                    "Relayed user message after topic recreation"
                );
                recreated.thread_id
            }
            Err(e) => return Err(e),
        };

        self.activity.touch(user.id, now)?;

        let mut first_reply_sent = false;
        if first_reply_due {
            let text = self
                .settings
                .first_reply_message()?
                .unwrap_or_else(|| DEFAULT_FIRST_REPLY_MESSAGE.to_string());

            match self.messenger.send_text(chat_id, &text).await {
                Ok(_) => first_reply_sent = true,
                Err(e) if e.is_external() => {
                    warn!(
                        user_id = %user.id,
                        chat_id = chat_id.0,
                        message_id = message_id.0,
                        error = %e,
                        "Failed to send first-reply confirmation message"
                    );
                }
                Err(e) => return Err(e),
            }
        }

        Ok(UserRelayOutcome {
            thread_id,
            first_reply_sent,
        })
    }

    /// Deliver an admin's reply in a topic back to the bound user.
    ///
    /// `/r <text>` (or `/reply`) sends plain text; anything else is copied.
    /// Delivery failures are reported into the topic rather than returned.
    pub async fn relay_admin_reply(
        &self,
        thread_id: ThreadId,
        message_id: MessageId,
        text: Option<&str>,
    ) -> Result<AdminReplyOutcome> {
        let Some(binding) = self.topics.get_by_thread_id(thread_id)? else {
            return Ok(AdminReplyOutcome::Unbound);
        };
        let user_chat = ChatId(binding.user_id.0);

        let delivery = match text.and_then(extract_reply_command) {
            Some(body) if body.is_empty() => {
                self.messenger.post_to_thread(thread_id, REPLY_USAGE).await?;
                return Ok(AdminReplyOutcome::UsageHint);
            }
            Some(body) => self.messenger.send_text(user_chat, &body).await,
            None => self.messenger.copy_from_admin(user_chat, message_id).await,
        };

        match delivery {
            Ok(_) => Ok(AdminReplyOutcome::Delivered),
            Err(Error::RecipientBlocked(_)) => {
                self.messenger.post_to_thread(thread_id, BLOCKED_NOTICE).await?;
                info!(
                    user_id = %binding.user_id,
                    thread_id = %thread_id,
                    message_id = message_id.0,
                    "User blocked the bot; admin reply not delivered"
                );
                Ok(AdminReplyOutcome::Blocked)
            }
            Err(e) if e.is_external() => {
                self.messenger
                    .post_to_thread(thread_id, &format!("Delivery failed: {e}"))
                    .await?;
                error!(
                    user_id = %binding.user_id,
                    thread_id = %thread_id,
                    message_id = message_id.0,
                    error = %e,
                    "Failed to relay admin reply"
                );
                Ok(AdminReplyOutcome::Failed)
            }
            Err(e) => Err(e),
        }
    }

    /// Tell the admins that the user blocked/unblocked the bot.
    ///
    /// Returns whether a notice was posted. Users without a topic are skipped.
    pub async fn member_status_changed(
        &self,
        user_id: UserId,
        old_status: &str,
        new_status: &str,
    ) -> Result<bool> {
        let Some(binding) = self.topics.get_by_user_id(user_id)? else {
            info!(
                user_id = %user_id,
                old_status,
                new_status,
                "Skipping my_chat_member notification: user has no topic binding"
            );
            return Ok(false);
        };

        let label = format_user_label(&binding.full_name, binding.username.as_deref());
        let text = build_status_message(&label, old_status, new_status);

        match self.messenger.post_to_thread(binding.thread_id, &text).await {
            Ok(_) => Ok(true),
            Err(e) if e.is_external() => {
                error!(
                    user_id = %user_id,
                    thread_id = %binding.thread_id,
                    old_status,
                    new_status,
                    error = %e,
                    "Failed to post my_chat_member status update to topic"
                );
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    /// Greeting for `/start`: the stored one or the default.
    pub fn start_greeting(&self) -> Result<String> {
        Ok(self
            .settings
            .start_greeting()?
            .unwrap_or_else(|| DEFAULT_START_MESSAGE.to_string()))
    }

    pub fn set_start_greeting(&self, text: &str) -> Result<()> {
        self.settings.set_start_greeting(text)
    }

    pub fn touch(&self, user_id: UserId, now: DateTime<Utc>) -> Result<()> {
        self.activity.touch(user_id, now)
    }
}

/// `Some(body)` for `/r`, `/reply` and their `@bot` forms; body may be empty.
pub fn extract_reply_command(text: &str) -> Option<String> {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| {
        Regex::new(r"^/(?:r|reply)(?:@[A-Za-z0-9_]+)?(?:\s+([\s\S]+))?$").expect("valid regex")
    });

    let caps = re.captures(text)?;
    Some(
        caps.get(1)
            .map(|m| m.as_str().trim().to_string())
            .unwrap_or_default(),
    )
}

fn format_user_label(full_name: &str, username: Option<&str>) -> String {
    match username {
        Some(u) => format!("{full_name} (@{u})"),
        None => full_name.to_string(),
    }
}

fn build_status_message(label: &str, old_status: &str, new_status: &str) -> String {
    match (old_status == "kicked", new_status == "kicked") {
        (false, true) => format!(
            "{label} blocked the bot. Messages cannot be delivered until they unblock it."
        ),
        (true, false) => format!(
            "{label} is back: the bot is no longer blocked and messages are delivered again."
        ),
        _ => format!("{label} changed chat status with the bot: {old_status} -> {new_status}."),
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone};

    use super::*;
    use crate::{
        db::open_in_memory,
        domain::NewTopicBinding,
        messaging::fake::{FakeMessenger, Sent},
        topic_store::TopicStore,
    };

    struct Harness {
        relay: Relay,
        messenger: Arc<FakeMessenger>,
        store: TopicStore,
    }

    fn harness() -> Harness {
        let conn = open_in_memory().unwrap();
        let messenger = Arc::new(FakeMessenger::default());
        let store = TopicStore::new(conn.clone());
        let topics = TopicService::new(messenger.clone(), store.clone());
        let relay = Relay::new(
            messenger.clone(),
            topics,
            ActivityStore::new(conn.clone()),
            SettingsStore::new(conn),
        );
        Harness {
            relay,
            messenger,
            store,
        }
    }

    fn user(id: i64) -> UserProfile {
        UserProfile {
            id: UserId(id),
            first_name: "Ada".to_string(),
            last_name: None,
            username: Some("ada".to_string()),
            language_code: None,
        }
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 5, 1, 9, 0, 0).unwrap()
    }

    #[test]
    fn reply_command_parsing() {
        assert_eq!(extract_reply_command("/r hello there").as_deref(), Some("hello there"));
        assert_eq!(extract_reply_command("/reply@SupportBot  hi\nmore ").as_deref(), Some("hi\nmore"));
        assert_eq!(extract_reply_command("/r").as_deref(), Some(""));
        assert_eq!(extract_reply_command("/rate 5"), None);
        assert_eq!(extract_reply_command("just text"), None);
    }

    #[test]
    fn status_messages() {
        assert!(build_status_message("Ada", "member", "kicked").contains("blocked the bot"));
        assert!(build_status_message("Ada", "kicked", "member").contains("is back"));
        assert_eq!(
            build_status_message("Ada (@ada)", "member", "left"),
            "Ada (@ada) changed chat status with the bot: member -> left."
        );
    }

    #[tokio::test]
    async fn first_message_is_forwarded_and_acknowledged() {
        let h = harness();
        let out = h
            .relay
            .relay_user_message(&user(1), ChatId(1), MessageId(10), false, t0())
            .await
            .unwrap();
        assert!(out.first_reply_sent);

        let sent = h.messenger.sent();
        assert!(sent.contains(&Sent::Forward {
            from_chat: ChatId(1),
            message_id: MessageId(10),
            thread: out.thread_id,
        }));
        assert!(sent.contains(&Sent::Text {
            chat_id: ChatId(1),
            text: DEFAULT_FIRST_REPLY_MESSAGE.to_string(),
        }));

        // Within the window: no second acknowledgment.
        let out = h
            .relay
            .relay_user_message(&user(1), ChatId(1), MessageId(11), false, t0() + Duration::hours(1))
            .await
            .unwrap();
        assert!(!out.first_reply_sent);
    }

    #[tokio::test]
    async fn commands_never_trigger_the_acknowledgment() {
        let h = harness();
        let out = h
            .relay
            .relay_user_message(&user(1), ChatId(1), MessageId(10), true, t0())
            .await
            .unwrap();
        assert!(!out.first_reply_sent);
    }

    #[tokio::test]
    async fn stored_first_reply_overrides_default() {
        let h = harness();
        h.relay.settings.set_first_reply_message("Thanks!").unwrap();
        h.relay
            .relay_user_message(&user(1), ChatId(1), MessageId(10), false, t0())
            .await
            .unwrap();
        assert!(h.messenger.sent().contains(&Sent::Text {
            chat_id: ChatId(1),
            text: "Thanks!".to_string(),
        }));
    }

    #[tokio::test]
    async fn missing_topic_is_recreated_and_retried_once() {
        let h = harness();
        let first = h
            .relay
            .relay_user_message(&user(1), ChatId(1), MessageId(10), false, t0())
            .await
            .unwrap();
        h.messenger.delete_thread(first.thread_id);

        let second = h
            .relay
            .relay_user_message(&user(1), ChatId(1), MessageId(11), false, t0())
            .await
            .unwrap();
        assert_ne!(second.thread_id, first.thread_id);
        assert!(h.messenger.sent().contains(&Sent::Forward {
            from_chat: ChatId(1),
            message_id: MessageId(11),
            thread: second.thread_id,
        }));
        assert!(h.relay.topics().get_by_thread_id(first.thread_id).unwrap().is_none());
        assert_eq!(h.messenger.created_titles().len(), 2);
    }

    #[tokio::test]
    async fn stale_topic_already_replaced_is_reused() {
        let h = harness();
        let first = h
            .relay
            .relay_user_message(&user(1), ChatId(1), MessageId(10), false, t0())
            .await
            .unwrap();
        h.messenger.delete_thread(first.thread_id);

        // A concurrent message recreates the topic after our lookup.
        let store = h.store.clone();
        h.messenger.on_next_forward(move || {
            store
                .replace_for_user(NewTopicBinding {
                    user_id: UserId(1),
                    thread_id: ThreadId(5000),
                    full_name: "Ada".to_string(),
                    username: Some("ada".to_string()),
                    topic_title: "Ada | @ada | 1".to_string(),
                })
                .unwrap();
        });

        let second = h
            .relay
            .relay_user_message(&user(1), ChatId(1), MessageId(11), false, t0())
            .await
            .unwrap();
        assert_eq!(second.thread_id, ThreadId(5000));
        assert_eq!(h.messenger.created_titles().len(), 1);
        assert!(h.messenger.sent().contains(&Sent::Forward {
            from_chat: ChatId(1),
            message_id: MessageId(11),
            thread: ThreadId(5000),
        }));
    }

    #[tokio::test]
    async fn transient_forward_failure_is_surfaced_without_touching_activity() {
        let h = harness();
        h.relay
            .relay_user_message(&user(1), ChatId(1), MessageId(10), false, t0())
            .await
            .unwrap();
        h.messenger
            .fail_sends_with(Error::Transient("Too Many Requests".to_string()));

        let later = t0() + Duration::hours(30);
        let err = h
            .relay
            .relay_user_message(&user(1), ChatId(1), MessageId(11), false, later)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Transient(_)));
        assert!(h
            .relay
            .activity
            .is_inactive_for(UserId(1), later, DEFAULT_INACTIVITY_WINDOW)
            .unwrap());
    }

    #[tokio::test]
    async fn admin_reply_copies_message_to_user() {
        let h = harness();
        let out = h
            .relay
            .relay_user_message(&user(7), ChatId(7), MessageId(1), false, t0())
            .await
            .unwrap();

        let res = h
            .relay
            .relay_admin_reply(out.thread_id, MessageId(50), Some("hello"))
            .await
            .unwrap();
        assert_eq!(res, AdminReplyOutcome::Delivered);
        assert!(h.messenger.sent().contains(&Sent::Copy {
            to_chat: ChatId(7),
            message_id: MessageId(50),
        }));
    }

    #[tokio::test]
    async fn admin_reply_command_sends_text_or_usage() {
        let h = harness();
        let out = h
            .relay
            .relay_user_message(&user(7), ChatId(7), MessageId(1), false, t0())
            .await
            .unwrap();

        let res = h
            .relay
            .relay_admin_reply(out.thread_id, MessageId(50), Some("/r see you"))
            .await
            .unwrap();
        assert_eq!(res, AdminReplyOutcome::Delivered);
        assert!(h.messenger.sent().contains(&Sent::Text {
            chat_id: ChatId(7),
            text: "see you".to_string(),
        }));

        let res = h
            .relay
            .relay_admin_reply(out.thread_id, MessageId(51), Some("/r"))
            .await
            .unwrap();
        assert_eq!(res, AdminReplyOutcome::UsageHint);
        assert!(h.messenger.sent().contains(&Sent::Thread {
            thread: out.thread_id,
            text: REPLY_USAGE.to_string(),
        }));
    }

    #[tokio::test]
    async fn admin_reply_reports_blocked_user_into_topic() {
        let h = harness();
        let out = h
            .relay
            .relay_user_message(&user(7), ChatId(7), MessageId(1), false, t0())
            .await
            .unwrap();
        h.messenger.block_chat(ChatId(7));

        let res = h
            .relay
            .relay_admin_reply(out.thread_id, MessageId(50), None)
            .await
            .unwrap();
        assert_eq!(res, AdminReplyOutcome::Blocked);
        assert!(h.messenger.sent().contains(&Sent::Thread {
            thread: out.thread_id,
            text: BLOCKED_NOTICE.to_string(),
        }));
    }

    #[tokio::test]
    async fn admin_reply_in_unbound_topic_is_ignored() {
        let h = harness();
        let res = h
            .relay
            .relay_admin_reply(ThreadId(4242), MessageId(1), Some("hi"))
            .await
            .unwrap();
        assert_eq!(res, AdminReplyOutcome::Unbound);
        assert!(h.messenger.sent().is_empty());
    }

    #[tokio::test]
    async fn member_status_posts_only_for_bound_users() {
        let h = harness();
        assert!(!h
            .relay
            .member_status_changed(UserId(7), "member", "kicked")
            .await
            .unwrap());

        let out = h
            .relay
            .relay_user_message(&user(7), ChatId(7), MessageId(1), false, t0())
            .await
            .unwrap();
        assert!(h
            .relay
            .member_status_changed(UserId(7), "member", "kicked")
            .await
            .unwrap());
        assert!(matches!(
            h.messenger.sent().last(),
            Some(Sent::Thread { thread, text }) if *thread == out.thread_id && text.starts_with("Ada (@ada) blocked the bot")
        ));
    }

    #[test]
    fn start_greeting_falls_back_to_default() {
        let h = harness();
        assert_eq!(h.relay.start_greeting().unwrap(), DEFAULT_START_MESSAGE);
        h.relay.set_start_greeting("Welcome").unwrap();
        assert_eq!(h.relay.start_greeting().unwrap(), "Welcome");
    }
}
