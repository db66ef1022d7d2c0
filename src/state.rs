use crate::auth::password_reset::{PasswordResetStore, PgPasswordResetRepo};
use crate::auth::sessions::{PgSessionRepo, SessionStore};
use crate::config::AppConfig;
use crate::galleries::images::ImageStore;
use crate::mailer::{LogMailer, Mailer, OutboxMailer};
use anyhow::Context;
use sqlx::PgPool;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,
    pub config: Arc<AppConfig>,
    pub sessions: SessionStore,
    pub resets: PasswordResetStore,
    pub images: ImageStore,
    pub mailer: Arc<dyn Mailer>,
}

impl AppState {
    pub async fn init() -> anyhow::Result<Self> {
        let config = Arc::new(AppConfig::from_env()?);

        let db = sqlx::postgres::PgPoolOptions::new()
            .max_connections(10)
            .connect(&config.database_url)
            .await
            .context("connect to database")?;

        let mailer: Arc<dyn Mailer> = match &config.mail_outbox {
            Some(path) => Arc::new(OutboxMailer::new(path)),
            None => Arc::new(LogMailer),
        };

        Ok(Self::from_parts(db, config, mailer))
    }

    pub fn from_parts(db: PgPool, config: Arc<AppConfig>, mailer: Arc<dyn Mailer>) -> Self {
        let tokens = &config.tokens;
        let sessions = SessionStore::new(
            Arc::new(PgSessionRepo::new(db.clone())),
            tokens.session_bytes,
        );
        let resets = PasswordResetStore::new(
            Arc::new(PgPasswordResetRepo::new(db.clone())),
            tokens.reset_bytes,
            time::Duration::minutes(tokens.reset_ttl_minutes),
        );
        let images = ImageStore::new(&config.images_dir);

        Self {
            db,
            config,
            sessions,
            resets,
            images,
            mailer,
        }
    }
}
