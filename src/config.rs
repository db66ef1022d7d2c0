use std::path::PathBuf;

use serde::Deserialize;

use crate::auth::{
    password_reset::{MAX_RESET_TTL, MIN_RESET_TOKEN_BYTES},
    sessions::MIN_SESSION_TOKEN_BYTES,
};

#[derive(Debug, Clone, Deserialize)]
pub struct TokenConfig {
    pub session_bytes: usize,
    pub reset_bytes: usize,
    pub reset_ttl_minutes: i64,
}

impl Default for TokenConfig {
    fn default() -> Self {
        Self {
            session_bytes: MIN_SESSION_TOKEN_BYTES,
            reset_bytes: 32,
            reset_ttl_minutes: 60,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub database_url: String,
    pub images_dir: PathBuf,
    pub base_url: String,
    /// Where reset mails are written when no transport is wired in.
    pub mail_outbox: Option<PathBuf>,
    pub tokens: TokenConfig,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = std::env::var("DATABASE_URL")?;
        let images_dir = std::env::var("IMAGES_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("images"));
        let base_url = std::env::var("BASE_URL")
            .map(|v| v.trim_end_matches('/').to_string())
            .unwrap_or_else(|_| "http://localhost:8080".into());

        let mail_outbox = std::env::var("MAIL_OUTBOX").ok().map(PathBuf::from);

        let defaults = TokenConfig::default();
        let tokens = TokenConfig {
            session_bytes: env_parse("SESSION_TOKEN_BYTES")
                .unwrap_or(defaults.session_bytes)
                .max(MIN_SESSION_TOKEN_BYTES),
            reset_bytes: env_parse("RESET_TOKEN_BYTES")
                .unwrap_or(defaults.reset_bytes)
                .max(MIN_RESET_TOKEN_BYTES),
            reset_ttl_minutes: reset_ttl_minutes(env_parse("RESET_TTL_MINUTES"))
                .unwrap_or(defaults.reset_ttl_minutes),
        };

        Ok(Self {
            database_url,
            images_dir,
            base_url,
            mail_outbox,
            tokens,
        })
    }
}

/// Non-positive values are dropped; the rest is capped at [`MAX_RESET_TTL`].
fn reset_ttl_minutes(raw: Option<i64>) -> Option<i64> {
    raw.filter(|m| *m > 0)
        .map(|m| m.min(MAX_RESET_TTL.whole_minutes()))
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.parse::<T>().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reset_ttl_is_bounded() {
        assert_eq!(reset_ttl_minutes(Some(15)), Some(15));
        assert_eq!(reset_ttl_minutes(Some(0)), None);
        assert_eq!(reset_ttl_minutes(Some(-5)), None);
        assert_eq!(reset_ttl_minutes(None), None);

        let capped = reset_ttl_minutes(Some(i64::MAX)).unwrap();
        assert_eq!(capped, MAX_RESET_TTL.whole_minutes());
        // converting back must not overflow
        assert_eq!(time::Duration::minutes(capped), MAX_RESET_TTL);
    }
}
