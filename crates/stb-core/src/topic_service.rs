//! Binding manager: one forum topic per user, created lazily and exactly once.
//!
//! Concurrent first-contact messages from the same user are coalesced onto a
//! single creation task; every caller observes that task's outcome. Races with
//! other processes are settled by the store's uniqueness constraints.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use tokio::sync::watch;
use tracing::{info, warn};

use crate::{
    domain::{NewTopicBinding, ThreadId, TopicBinding, UserId, UserProfile},
    errors::Error,
    messaging::port::MessagingPort,
    topic_store::TopicStore,
    Result,
};

/// Telegram caps forum topic names at 128 characters.
pub const MAX_TOPIC_TITLE_CHARS: usize = 128;

type Outcome = Option<Result<TopicBinding>>;
type Pending = watch::Receiver<Outcome>;

#[derive(Clone, Copy, Debug)]
enum Creation {
    /// Create only if the user still has no binding.
    Ensure,
    /// Replace whatever binding the user has.
    Recreate,
}

#[derive(Clone)]
pub struct TopicService {
    inner: Arc<Inner>,
}

struct Inner {
    messenger: Arc<dyn MessagingPort>,
    store: TopicStore,
    in_flight: Mutex<HashMap<UserId, Pending>>,
}

impl TopicService {
    pub fn new(messenger: Arc<dyn MessagingPort>, store: TopicStore) -> Self {
        Self {
            inner: Arc::new(Inner {
                messenger,
                store,
                in_flight: Mutex::new(HashMap::new()),
            }),
        }
    }

    pub fn get_by_user_id(&self, user_id: UserId) -> Result<Option<TopicBinding>> {
        self.inner.store.get_by_user_id(user_id)
    }

    pub fn get_by_thread_id(&self, thread_id: ThreadId) -> Result<Option<TopicBinding>> {
        self.inner.store.get_by_thread_id(thread_id)
    }

    /// Return the user's binding, creating the topic (and posting the user card)
    /// on first contact.
    pub async fn ensure_for_user(&self, user: &UserProfile) -> Result<TopicBinding> {
        if let Some(existing) = self.inner.store.get_by_user_id(user.id)? {
            return Ok(existing);
        }
        let pending = self.join_or_start(user, Creation::Ensure);
        wait_for(pending).await
    }

    /// Create a fresh topic for a user whose bound topic is gone.
    ///
    /// If a creation for the user is already running, its result is returned
    /// instead of starting a second one.
    pub async fn recreate_for_user(&self, user: &UserProfile) -> Result<TopicBinding> {
        let pending = self.join_or_start(user, Creation::Recreate);
        wait_for(pending).await
    }

    /// Attach to the user's running creation or start one.
    ///
    /// Lookup and registration happen under one lock with no `.await`, so two
    /// callers can never both start.
    fn join_or_start(&self, user: &UserProfile, kind: Creation) -> Pending {
        let mut in_flight = lock(&self.inner.in_flight);
        if let Some(pending) = in_flight.get(&user.id) {
            return pending.clone();
        }

        let (tx, rx) = watch::channel(None);
        in_flight.insert(user.id, rx.clone());
        drop(in_flight);

        // Spawned so that a caller being dropped cannot cancel the creation
        // other callers are waiting on.
        let inner = self.inner.clone();
        let user = user.clone();
        tokio::spawn(async move {
            let entry = InFlightEntry {
                inner: inner.clone(),
                user_id: user.id,
            };
            let outcome = match kind {
                Creation::Ensure => inner.create(&user).await,
                Creation::Recreate => inner.recreate(&user).await,
            };
            drop(entry);
            let _ = tx.send(Some(outcome));
        });

        rx
    }
}

impl Inner {
    async fn create(&self, user: &UserProfile) -> Result<TopicBinding> {
        // A creation that finished between the caller's lookup and our
        // registration has already persisted its row.
        if let Some(existing) = self.store.get_by_user_id(user.id)? {
            return Ok(existing);
        }

        let new = self.open_thread(user).await?;
        let duplicate_thread_id = new.thread_id;

        let binding = match self.store.create(new) {
            Ok(binding) => binding,
            Err(e) if e.is_constraint_violation() => {
                let Some(winner) = self.store.get_by_user_id(user.id)? else {
                    return Err(e);
                };
                warn!(
                    user_id = %user.id,
                    existing_thread_id = %winner.thread_id,
                    duplicate_thread_id = %duplicate_thread_id,
                    "Detected concurrent topic creation; using existing topic binding"
                );
                return Ok(winner);
            }
            Err(e) => return Err(e),
        };

        self.post_user_card(user, &binding).await?;

        info!(
            user_id = %binding.user_id,
            thread_id = %binding.thread_id,
            topic_title = %binding.topic_title,
            "Created forum topic for user"
        );
        Ok(binding)
    }

    async fn recreate(&self, user: &UserProfile) -> Result<TopicBinding> {
        let stale_thread_id = self.store.get_by_user_id(user.id)?.map(|b| b.thread_id);

        let new = self.open_thread(user).await?;
        let binding = self.store.replace_for_user(new)?;

        self.post_user_card(user, &binding).await?;

        info!(
            user_id = %binding.user_id,
            old_thread_id = ?stale_thread_id.map(|t| t.0),
            new_thread_id = %binding.thread_id,
            "Recreated forum topic for user"
        );
        Ok(binding)
    }

    async fn open_thread(&self, user: &UserProfile) -> Result<NewTopicBinding> {
        let full_name = user.full_name();
        let topic_title = build_topic_title(&full_name, user.username.as_deref(), user.id);
        let thread_id = self.messenger.create_thread(&topic_title).await?;

        Ok(NewTopicBinding {
            user_id: user.id,
            thread_id,
            full_name,
            username: user.username.clone(),
            topic_title,
        })
    }

    async fn post_user_card(&self, user: &UserProfile, binding: &TopicBinding) -> Result<()> {
        self.messenger
            .post_to_thread(binding.thread_id, &build_user_card(user))
            .await?;
        Ok(())
    }
}

/// Removes the user's in-flight entry on every exit path, panics included.
struct InFlightEntry {
    inner: Arc<Inner>,
    user_id: UserId,
}

impl Drop for InFlightEntry {
    fn drop(&mut self) {
        lock(&self.inner.in_flight).remove(&self.user_id);
    }
}

async fn wait_for(mut pending: Pending) -> Result<TopicBinding> {
    loop {
        let current = pending.borrow_and_update().clone();
        if let Some(outcome) = current {
            return outcome;
        }
        if pending.changed().await.is_err() {
            let last = pending.borrow().clone();
            return last.unwrap_or_else(|| {
                Err(Error::Unexpected(
                    "topic creation ended without a result".to_string(),
                ))
            });
        }
    }
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

/// `"{name} | @{handle} | {id}"` with the name sanitized and the whole title
/// capped at [`MAX_TOPIC_TITLE_CHARS`] characters.
pub fn build_topic_title(name: &str, handle: Option<&str>, user_id: UserId) -> String {
    let name = normalize_whitespace(&strip_control_characters(name));
    let handle = handle.filter(|h| !h.is_empty()).unwrap_or("-");
    let full = format!("{name} | @{handle} | {user_id}");
    let title = truncate_chars(&full, MAX_TOPIC_TITLE_CHARS).trim().to_string();
    if title.is_empty() {
        format!("user-{user_id}")
    } else {
        title
    }
}

fn strip_control_characters(s: &str) -> String {
    s.chars().filter(|c| !c.is_control()).collect()
}

fn normalize_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Cut at a char boundary; a `char` is a whole scalar value so nothing is split.
fn truncate_chars(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

/// Introductory card posted as the first message of a new topic.
pub fn build_user_card(user: &UserProfile) -> String {
    let username = user
        .username
        .as_deref()
        .filter(|u| !u.is_empty())
        .map(|u| format!("@{u}"))
        .unwrap_or_else(|| "-".to_string());
    let language = user.language_code.as_deref().unwrap_or("-");

    [
        "New support thread".to_string(),
        format!("user_id: {}", user.id),
        format!("full_name: {}", user.full_name()),
        format!("username: {username}"),
        format!("language_code: {language}"),
    ]
    .join("\n")
}
