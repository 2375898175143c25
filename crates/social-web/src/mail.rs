//! Outbound mail.
//!
//! Only a logging mailer ships; a provider client plugs in behind [`Mailer`].

use async_trait::async_trait;
use serde::Serialize;

pub const USER_WELCOME_TEMPLATE: &str = "user_invitation";

/// Values substituted into the welcome template.
#[derive(Debug, Clone, Serialize)]
pub struct WelcomeVars {
    pub username: String,
    pub activation_url: String,
}

#[async_trait]
pub trait Mailer: Send + Sync {
    /// Returns the provider's status code. `sandbox` mails are not delivered.
    async fn send(
        &self,
        template: &str,
        username: &str,
        email: &str,
        vars: &WelcomeVars,
        sandbox: bool,
    ) -> anyhow::Result<u16>;
}

/// Writes mails to the log instead of sending them.
pub struct LogMailer {
    from_email: String,
}

impl LogMailer {
    pub fn new(from_email: impl Into<String>) -> Self {
        Self {
            from_email: from_email.into(),
        }
    }
}

#[async_trait]
impl Mailer for LogMailer {
    async fn send(
        &self,
        template: &str,
        username: &str,
        email: &str,
        vars: &WelcomeVars,
        sandbox: bool,
    ) -> anyhow::Result<u16> {
        tracing::info!(
            template,
            from = %self.from_email,
            to = %email,
            username,
            activation_url = %vars.activation_url,
            sandbox,
            "mail queued"
        );
        Ok(200)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn log_mailer_accepts_everything() {
        let mailer = LogMailer::new("noreply@example.com");
        let vars = WelcomeVars {
            username: "alice".to_string(),
            activation_url: "http://localhost:3000/confirm/abc".to_string(),
        };
        let status = mailer
            .send(USER_WELCOME_TEMPLATE, "alice", "alice@example.com", &vars, true)
            .await
            .unwrap();
        assert_eq!(status, 200);
    }
}
