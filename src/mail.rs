use anyhow::Context;
use axum::async_trait;
use lettre::{
    message::{header::ContentType, Mailbox},
    transport::smtp::authentication::Credentials,
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use tracing::info;

use crate::config::SmtpConfig;

/// Outbound transactional email. Behind a trait object so tests can capture
/// deliveries or force failures.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, to: &str, subject: &str, body: &str) -> anyhow::Result<()>;
}

pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl SmtpMailer {
    pub fn new(cfg: &SmtpConfig) -> anyhow::Result<Self> {
        let transport = AsyncSmtpTransport::<Tokio1Executor>::relay(&cfg.host)
            .context("smtp relay setup")?
            .credentials(Credentials::new(cfg.username.clone(), cfg.password.clone()))
            .port(cfg.port)
            .build();
        let from = cfg
            .from
            .parse()
            .map_err(|e| anyhow::anyhow!("invalid from address: {e}"))?;
        Ok(Self { transport, from })
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, to: &str, subject: &str, body: &str) -> anyhow::Result<()> {
        let email = Message::builder()
            .from(self.from.clone())
            .to(to
                .parse()
                .map_err(|e| anyhow::anyhow!("invalid to address: {e}"))?)
            .subject(subject)
            .header(ContentType::TEXT_PLAIN)
            .body(body.to_string())
            .context("build email")?;
        self.transport.send(email).await.context("smtp send")?;
        info!(%to, %subject, "email sent");
        Ok(())
    }
}

/// Dev fallback when SMTP is not configured: logs instead of delivering.
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, to: &str, subject: &str, _body: &str) -> anyhow::Result<()> {
        info!(%to, %subject, "smtp not configured; delivery skipped");
        Ok(())
    }
}

pub const RESET_SUBJECT: &str = "Password reset request";

pub fn password_reset_body(reset_url: &str) -> String {
    format!(
        "Hello,\n\n\
        A password reset was requested for your account.\n\n\
        To reset your password, open the following link:\n\n\
        {}\n\n\
        This link will expire in 20 minutes.\n\n\
        If you did not request this reset, please ignore this email.\n",
        reset_url
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reset_body_carries_the_link_and_expiry() {
        let body = password_reset_body("https://shop.example/api/auth/password/reset/abc");
        assert!(body.contains("https://shop.example/api/auth/password/reset/abc"));
        assert!(body.contains("expire in 20 minutes"));
        assert!(body.contains("did not request"));
    }
}
