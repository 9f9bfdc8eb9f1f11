use std::{sync::Mutex, time::Duration};

use async_trait::async_trait;

use crate::{
    domain::{ChatId, MessageId, ThreadId},
    errors::Error,
    messaging::port::MessagingPort,
    Result,
};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Sent {
    Thread { thread: ThreadId, text: String },
    Forward { from_chat: ChatId, message_id: MessageId, thread: ThreadId },
    Text { chat_id: ChatId, text: String },
    Copy { to_chat: ChatId, message_id: MessageId },
}

type Hook = Box<dyn FnOnce() + Send>;

/// Recording messenger; thread ids are allocated from 1000 upwards.
#[derive(Default)]
pub struct FakeMessenger {
    next_thread: Mutex<i32>,
    next_message: Mutex<i32>,
    created: Mutex<Vec<String>>,
    sent: Mutex<Vec<Sent>>,
    create_delay: Mutex<Option<Duration>>,
    create_failure: Mutex<Option<Error>>,
    send_failure: Mutex<Option<Error>>,
    missing_threads: Mutex<Vec<ThreadId>>,
    blocked_chats: Mutex<Vec<ChatId>>,
    on_create: Mutex<Option<Hook>>,
    on_forward: Mutex<Option<Hook>>,
}

impl FakeMessenger {
    pub fn created_titles(&self) -> Vec<String> {
        self.created.lock().unwrap().clone()
    }

    pub fn sent(&self) -> Vec<Sent> {
        self.sent.lock().unwrap().clone()
    }

    pub fn peek_next_thread(&self) -> ThreadId {
        ThreadId(1000 + *self.next_thread.lock().unwrap())
    }

    pub fn set_create_delay(&self, d: Duration) {
        *self.create_delay.lock().unwrap() = Some(d);
    }

    pub fn fail_creates_with(&self, e: Error) {
        *self.create_failure.lock().unwrap() = Some(e);
    }

    pub fn clear_create_failure(&self) {
        *self.create_failure.lock().unwrap() = None;
    }

    /// Applies to every outbound message (not thread creation).
    pub fn fail_sends_with(&self, e: Error) {
        *self.send_failure.lock().unwrap() = Some(e);
    }

    pub fn clear_send_failure(&self) {
        *self.send_failure.lock().unwrap() = None;
    }

    /// Make posts/forwards into `thread` fail with `TargetMissing`.
    pub fn delete_thread(&self, thread: ThreadId) {
        self.missing_threads.lock().unwrap().push(thread);
    }

    pub fn block_chat(&self, chat_id: ChatId) {
        self.blocked_chats.lock().unwrap().push(chat_id);
    }

    pub fn on_next_create(&self, hook: impl FnOnce() + Send + 'static) {
        *self.on_create.lock().unwrap() = Some(Box::new(hook));
    }

    /// Runs inside the next `forward_to_thread`, before it succeeds or fails.
    pub fn on_next_forward(&self, hook: impl FnOnce() + Send + 'static) {
        *self.on_forward.lock().unwrap() = Some(Box::new(hook));
    }

    fn check_send(&self) -> Result<()> {
        match self.send_failure.lock().unwrap().clone() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn check_thread(&self, thread: ThreadId) -> Result<()> {
        if self.missing_threads.lock().unwrap().contains(&thread) {
            return Err(Error::TargetMissing(format!(
                "Bad Request: message thread not found ({})",
                thread.0
            )));
        }
        Ok(())
    }

    fn check_chat(&self, chat_id: ChatId) -> Result<()> {
        if self.blocked_chats.lock().unwrap().contains(&chat_id) {
            return Err(Error::RecipientBlocked(
                "Forbidden: bot was blocked by the user".to_string(),
            ));
        }
        Ok(())
    }

    fn record(&self, s: Sent) -> MessageId {
        self.sent.lock().unwrap().push(s);
        let mut next = self.next_message.lock().unwrap();
        *next += 1;
        MessageId(*next)
    }
}

#[async_trait]
impl MessagingPort for FakeMessenger {
    async fn create_thread(&self, title: &str) -> Result<ThreadId> {
        let delay = *self.create_delay.lock().unwrap();
        if let Some(d) = delay {
            tokio::time::sleep(d).await;
        }
        let hook = self.on_create.lock().unwrap().take();
        if let Some(hook) = hook {
            hook();
        }

        self.created.lock().unwrap().push(title.to_string());
        if let Some(e) = self.create_failure.lock().unwrap().clone() {
            return Err(e);
        }

        let mut next = self.next_thread.lock().unwrap();
        let id = ThreadId(1000 + *next);
        *next += 1;
        Ok(id)
    }

    async fn post_to_thread(&self, thread: ThreadId, text: &str) -> Result<MessageId> {
        self.check_send()?;
        self.check_thread(thread)?;
        Ok(self.record(Sent::Thread {
            thread,
            text: text.to_string(),
        }))
    }

    async fn forward_to_thread(
        &self,
        from_chat: ChatId,
        message_id: MessageId,
        thread: ThreadId,
    ) -> Result<MessageId> {
        let hook = self.on_forward.lock().unwrap().take();
        if let Some(hook) = hook {
            hook();
        }
        self.check_send()?;
        self.check_thread(thread)?;
        Ok(self.record(Sent::Forward {
            from_chat,
            message_id,
            thread,
        }))
    }

    async fn send_text(&self, chat_id: ChatId, text: &str) -> Result<MessageId> {
        self.check_send()?;
        self.check_chat(chat_id)?;
        Ok(self.record(Sent::Text {
            chat_id,
            text: text.to_string(),
        }))
    }

    async fn copy_from_admin(&self, to_chat: ChatId, message_id: MessageId) -> Result<MessageId> {
        self.check_send()?;
        self.check_chat(to_chat)?;
        Ok(self.record(Sent::Copy {
            to_chat,
            message_id,
        }))
    }
}
