use std::path::PathBuf;

use anyhow::Context;
use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tracing::info;

/// Outbound mail. Delivery transport lives outside this service.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn forgot_password(&self, to: &str, reset_url: &str) -> anyhow::Result<()>;
}

/// Records that a reset mail would be sent. The link is a credential, so it is not logged.
#[derive(Clone, Default)]
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn forgot_password(&self, to: &str, _reset_url: &str) -> anyhow::Result<()> {
        info!(%to, "password reset email queued");
        Ok(())
    }
}

/// Development mailer: appends `recipient<TAB>reset_url` lines to a local file
/// so reset links can be followed without a mail transport.
#[derive(Clone)]
pub struct OutboxMailer {
    path: PathBuf,
}

impl OutboxMailer {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl Mailer for OutboxMailer {
    async fn forgot_password(&self, to: &str, reset_url: &str) -> anyhow::Result<()> {
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .with_context(|| format!("open mail outbox {}", self.path.display()))?;
        file.write_all(format!("{to}\t{reset_url}\n").as_bytes()).await?;
        file.flush().await?;
        info!(%to, outbox = %self.path.display(), "password reset email written to outbox");
        Ok(())
    }
}

pub fn reset_url(base_url: &str, token: &str) -> String {
    format!("{}/reset-password?token={}", base_url.trim_end_matches('/'), token)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reset_url_embeds_token() {
        assert_eq!(
            reset_url("https://galaria.example/", "abc_-1"),
            "https://galaria.example/reset-password?token=abc_-1"
        );
    }

    #[tokio::test]
    async fn outbox_keeps_every_reset_link() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("outbox.txt");
        let mailer = OutboxMailer::new(&path);

        mailer
            .forgot_password("zelda@hyrule.com", "http://localhost/reset-password?token=a")
            .await
            .unwrap();
        mailer
            .forgot_password("link@hyrule.com", "http://localhost/reset-password?token=b")
            .await
            .unwrap();

        let written = std::fs::read_to_string(&path).unwrap();
        assert_eq!(
            written,
            "zelda@hyrule.com\thttp://localhost/reset-password?token=a\n\
             link@hyrule.com\thttp://localhost/reset-password?token=b\n"
        );
    }
}
