//! Durable user ↔ forum topic bindings.
//!
//! Pure data access. Uniqueness of both `user_id` and `thread_id` is enforced
//! by the table definition, so racing inserts are rejected by SQLite itself and
//! surface as [`Error::ConstraintViolation`](crate::Error::ConstraintViolation).

use chrono::{SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::{
    db::{self, SharedConnection},
    domain::{NewTopicBinding, ThreadId, TopicBinding, UserId},
    Result,
};

const SELECT_COLUMNS: &str =
    "SELECT user_id, thread_id, full_name, username, topic_title, created_at, updated_at FROM user_topics";

const INSERT: &str = "
    INSERT INTO user_topics (
      user_id,
      thread_id,
      full_name,
      username,
      topic_title,
      created_at,
      updated_at
    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
";

#[derive(Clone)]
pub struct TopicStore {
    conn: SharedConnection,
}

impl TopicStore {
    pub fn new(conn: SharedConnection) -> Self {
        Self { conn }
    }

    pub fn get_by_user_id(&self, user_id: UserId) -> Result<Option<TopicBinding>> {
        let conn = db::lock(&self.conn);
        let binding = conn
            .query_row(
                &format!("{SELECT_COLUMNS} WHERE user_id = ?1"),
                params![user_id.0],
                map_row,
            )
            .optional()?;
        Ok(binding)
    }

    pub fn get_by_thread_id(&self, thread_id: ThreadId) -> Result<Option<TopicBinding>> {
        let conn = db::lock(&self.conn);
        let binding = conn
            .query_row(
                &format!("{SELECT_COLUMNS} WHERE thread_id = ?1"),
                params![thread_id.0],
                map_row,
            )
            .optional()?;
        Ok(binding)
    }

    /// Insert a new binding. Fails with `ConstraintViolation` if the user or the
    /// thread is already bound.
    pub fn create(&self, binding: NewTopicBinding) -> Result<TopicBinding> {
        let now = now_iso();
        let conn = db::lock(&self.conn);
        insert(&conn, &binding, &now)?;
        Ok(into_binding(binding, now))
    }

    /// Drop whatever row the user currently has and insert `binding`, in one
    /// transaction. A thread-id collision rolls the delete back.
    pub fn replace_for_user(&self, binding: NewTopicBinding) -> Result<TopicBinding> {
        let now = now_iso();
        let mut conn = db::lock(&self.conn);
        let tx = conn.transaction()?;
        tx.execute(
            "DELETE FROM user_topics WHERE user_id = ?1",
            params![binding.user_id.0],
        )?;
        insert(&tx, &binding, &now)?;
        tx.commit()?;
        Ok(into_binding(binding, now))
    }
}

fn insert(conn: &Connection, b: &NewTopicBinding, now: &str) -> rusqlite::Result<usize> {
    conn.execute(
        INSERT,
        params![
            b.user_id.0,
            b.thread_id.0,
            b.full_name,
            b.username,
            b.topic_title,
            now,
            now
        ],
    )
}

fn into_binding(b: NewTopicBinding, now: String) -> TopicBinding {
    TopicBinding {
        user_id: b.user_id,
        thread_id: b.thread_id,
        full_name: b.full_name,
        username: b.username,
        topic_title: b.topic_title,
        created_at: now.clone(),
        updated_at: now,
    }
}

fn map_row(row: &Row<'_>) -> rusqlite::Result<TopicBinding> {
    Ok(TopicBinding {
        user_id: UserId(row.get(0)?),
        thread_id: ThreadId(row.get(1)?),
        full_name: row.get(2)?,
        username: row.get(3)?,
        topic_title: row.get(4)?,
        created_at: row.get(5)?,
        updated_at: row.get(6)?,
    })
}

pub(crate) fn now_iso() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}
