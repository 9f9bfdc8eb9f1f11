//! Last-seen timestamps per user, used for the "first contact in 24h" reply.

use chrono::{DateTime, Duration, SecondsFormat, Utc};
use rusqlite::{params, OptionalExtension};

use crate::{
    db::{self, SharedConnection},
    domain::UserId,
    Result,
};

/// Window after which a user counts as inactive again.
pub const DEFAULT_INACTIVITY_WINDOW: Duration = Duration::hours(24);

#[derive(Clone)]
pub struct ActivityStore {
    conn: SharedConnection,
}

impl ActivityStore {
    pub fn new(conn: SharedConnection) -> Self {
        Self { conn }
    }

    /// Raw stored value; not validated.
    pub fn last_activity_at(&self, user_id: UserId) -> Result<Option<String>> {
        let conn = db::lock(&self.conn);
        let value = conn
            .query_row(
                "SELECT last_activity_at FROM user_chat_activity WHERE user_id = ?1",
                params![user_id.0],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }

    pub fn touch(&self, user_id: UserId, now: DateTime<Utc>) -> Result<()> {
        let at = now.to_rfc3339_opts(SecondsFormat::Millis, true);
        let conn = db::lock(&self.conn);
        conn.execute(
            "
            INSERT INTO user_chat_activity (user_id, last_activity_at, updated_at)
            VALUES (?1, ?2, ?2)
            ON CONFLICT(user_id) DO UPDATE SET
              last_activity_at = excluded.last_activity_at,
              updated_at = excluded.updated_at
            ",
            params![user_id.0, at],
        )?;
        Ok(())
    }

    /// True when there is no usable timestamp or the last one is at least
    /// `window` old.
    pub fn is_inactive_for(
        &self,
        user_id: UserId,
        now: DateTime<Utc>,
        window: Duration,
    ) -> Result<bool> {
        let Some(raw) = self.last_activity_at(user_id)? else {
            return Ok(true);
        };
        let Ok(last) = DateTime::parse_from_rfc3339(&raw) else {
            return Ok(true);
        };
        Ok(now.signed_duration_since(last.with_timezone(&Utc)) >= window)
    }
}
