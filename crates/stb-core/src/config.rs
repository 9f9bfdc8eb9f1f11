use std::{
    collections::BTreeSet,
    env, fs,
    path::{Path, PathBuf},
};

use crate::{domain::ChatId, errors::Error, Result};

const DEFAULT_DATABASE_PATH: &str = "./data/support-bot.sqlite";
const DEFAULT_LOG_LEVEL: &str = "info";

/// Typed configuration, read from the process environment (and `.env`).
#[derive(Clone, Debug)]
pub struct Config {
    pub bot_token: String,
    /// Forum-enabled supergroup where per-user topics are created.
    pub admin_chat_id: ChatId,
    /// Users allowed to run `/setgreeting`.
    pub editor_user_ids: Vec<i64>,
    pub database_path: PathBuf,
    pub log_level: String,
}

impl Config {
    pub fn load() -> Result<Self> {
        load_dotenv_if_present(Path::new(".env"));
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build the config from an arbitrary key lookup.
    ///
    /// Every problem is collected so a bad deployment reports all of them at once.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut problems = Vec::new();

        let bot_token = lookup("BOT_TOKEN").and_then(non_empty).unwrap_or_default();
        if bot_token.is_empty() {
            problems.push("BOT_TOKEN: BOT_TOKEN is required".to_string());
        }

        let admin_chat_id = match lookup("ADMIN_CHAT_ID").and_then(non_empty) {
            None => {
                problems.push("ADMIN_CHAT_ID: ADMIN_CHAT_ID is required".to_string());
                None
            }
            Some(raw) => match parse_i64_strict(&raw) {
                Some(id) => Some(ChatId(id)),
                None => {
                    problems.push("ADMIN_CHAT_ID: ADMIN_CHAT_ID must be an integer".to_string());
                    None
                }
            },
        };

        let editor_user_ids = match lookup("EDITOR_USER_IDS").and_then(non_empty) {
            None => {
                problems.push("EDITOR_USER_IDS: EDITOR_USER_IDS is required".to_string());
                Vec::new()
            }
            Some(raw) => match parse_csv_i64(&raw) {
                Ok(ids) if !ids.is_empty() => ids,
                Ok(_) => {
                    problems.push(
                        "EDITOR_USER_IDS: EDITOR_USER_IDS must contain at least one integer"
                            .to_string(),
                    );
                    Vec::new()
                }
                Err(bad) => {
                    problems.push(format!(
                        "EDITOR_USER_IDS: EDITOR_USER_IDS must be a comma-separated list of integers (got `{bad}`)"
                    ));
                    Vec::new()
                }
            },
        };

        let database_path = PathBuf::from(
            lookup("DATABASE_PATH")
                .and_then(non_empty)
                .unwrap_or_else(|| DEFAULT_DATABASE_PATH.to_string()),
        );
        let log_level = lookup("LOG_LEVEL")
            .and_then(non_empty)
            .unwrap_or_else(|| DEFAULT_LOG_LEVEL.to_string());

        match admin_chat_id {
            Some(admin_chat_id) if problems.is_empty() => Ok(Self {
                bot_token,
                admin_chat_id,
                editor_user_ids,
                database_path,
                log_level,
            }),
            _ => Err(Error::Config(format!(
                "invalid environment configuration: {}",
                problems.join("; ")
            ))),
        }
    }
}

fn load_dotenv_if_present(path: &Path) {
    let Ok(contents) = fs::read_to_string(path) else {
        return;
    };
    for (key, value) in parse_dotenv(&contents) {
        // Real environment wins over the file.
        if env::var_os(&key).is_none() {
            env::set_var(key, value);
        }
    }
}

/// `KEY=value` pairs from a `.env` body. Blank lines, `#` comments and lines
/// without `=` are skipped; one layer of matching quotes is removed.
fn parse_dotenv(contents: &str) -> Vec<(String, String)> {
    contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(|line| line.split_once('='))
        .map(|(k, v)| (k.trim(), unquote(v.trim())))
        .filter(|(k, _)| !k.is_empty())
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

fn unquote(v: &str) -> &str {
    for q in ['"', '\''] {
        if let Some(inner) = v.strip_prefix(q).and_then(|rest| rest.strip_suffix(q)) {
            return inner;
        }
    }
    v
}

/// `-?\d+` only; rejects `+1`, `1.0`, whitespace inside.
fn parse_i64_strict(s: &str) -> Option<i64> {
    let s = s.trim();
    let digits = s.strip_prefix('-').unwrap_or(s);
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    s.parse::<i64>().ok()
}

/// Parse a comma-separated id list, dropping blanks and duplicates (first
/// occurrence wins). Returns the first offending item on error.
fn parse_csv_i64(v: &str) -> std::result::Result<Vec<i64>, String> {
    let mut seen = BTreeSet::new();
    let mut out = Vec::new();
    for item in v.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        let id = parse_i64_strict(item).ok_or_else(|| item.to_string())?;
        if seen.insert(id) {
            out.push(id);
        }
    }
    Ok(out)
}

fn non_empty(s: String) -> Option<String> {
    if s.trim().is_empty() {
        None
    } else {
        Some(s.trim().to_string())
    }
}
