use rusqlite::{params, OptionalExtension};

use crate::{
    db::{self, SharedConnection},
    topic_store::now_iso,
    Result,
};

const START_GREETING_KEY: &str = "start_greeting";
const FIRST_REPLY_KEY: &str = "first_reply_message";

/// Operator-editable bot texts (key/value rows in `bot_settings`).
#[derive(Clone)]
pub struct SettingsStore {
    conn: SharedConnection,
}

impl SettingsStore {
    pub fn new(conn: SharedConnection) -> Self {
        Self { conn }
    }

    pub fn start_greeting(&self) -> Result<Option<String>> {
        self.get(START_GREETING_KEY)
    }

    pub fn set_start_greeting(&self, value: &str) -> Result<()> {
        self.set(START_GREETING_KEY, value)
    }

    pub fn first_reply_message(&self) -> Result<Option<String>> {
        self.get(FIRST_REPLY_KEY)
    }

    pub fn set_first_reply_message(&self, value: &str) -> Result<()> {
        self.set(FIRST_REPLY_KEY, value)
    }

    fn get(&self, key: &str) -> Result<Option<String>> {
        let conn = db::lock(&self.conn);
        let value = conn
            .query_row(
                "SELECT value FROM bot_settings WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let conn = db::lock(&self.conn);
        conn.execute(
            "
            INSERT INTO bot_settings (key, value, updated_at)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(key) DO UPDATE SET
              value = excluded.value,
              updated_at = excluded.updated_at
            ",
            params![key, value, now_iso()],
        )?;
        Ok(())
    }
}
