//! Outbound email
//!
//! Lifecycle notifications over SMTP. Delivery failures are reported as
//! `DeliveryFailed` and callers treat them as non-fatal: an account is
//! created even when its welcome message bounces.

use lettre::{
    message::{Mailbox, MultiPart},
    transport::smtp::authentication::Credentials,
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use tracing::{debug, info};

use crate::config::SmtpConfig;
use crate::utils::AppError;

/// SMTP mail dispatcher
pub struct Mailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
    frontend_url: String,
}

impl Mailer {
    /// Build a dispatcher from SMTP settings
    pub fn from_config(config: &SmtpConfig, frontend_url: &str) -> Result<Self, AppError> {
        let mut builder = AsyncSmtpTransport::<Tokio1Executor>::relay(&config.host)
            .map_err(|e| AppError::DeliveryFailed(format!("SMTP relay setup failed: {e}")))?
            .port(config.port);

        if let (Some(username), Some(password)) = (&config.username, &config.password) {
            builder = builder.credentials(Credentials::new(username.clone(), password.clone()));
        }

        let from: Mailbox = format!("{} <{}>", config.from_name, config.from_email)
            .parse()
            .map_err(|e| AppError::DeliveryFailed(format!("Invalid sender address: {e}")))?;

        Ok(Self {
            transport: builder.build(),
            from,
            frontend_url: frontend_url.trim_end_matches('/').to_string(),
        })
    }

    /// Send one message with HTML and plain-text alternatives
    pub async fn send(
        &self,
        to: &str,
        subject: &str,
        html: String,
        text: String,
    ) -> Result<(), AppError> {
        let to: Mailbox = to
            .parse()
            .map_err(|e| AppError::DeliveryFailed(format!("Invalid recipient address: {e}")))?;

        let message = Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject(subject)
            .multipart(MultiPart::alternative_plain_html(text, html))
            .map_err(|e| AppError::DeliveryFailed(format!("Failed to build message: {e}")))?;

        debug!(subject = %subject, "Dispatching email");
        self.transport
            .send(message)
            .await
            .map_err(|e| AppError::DeliveryFailed(e.to_string()))?;

        info!(subject = %subject, "Email dispatched");
        Ok(())
    }

    /// Welcome message for a newly registered account
    pub async fn send_welcome(&self, to: &str, first_name: &str) -> Result<(), AppError> {
        let subject = "Welcome to StaySpot";
        let html = format!(
            "<h2>Welcome, {first_name}!</h2>\
             <p>Your StaySpot account is ready. Sign in to start managing your properties.</p>\
             <p><a href=\"{url}/login\">Sign in to StaySpot</a></p>",
            url = self.frontend_url,
        );
        let text = format!(
            "Welcome, {first_name}!\n\nYour StaySpot account is ready. \
             Sign in at {url}/login to start managing your properties.\n",
            url = self.frontend_url,
        );
        self.send(to, subject, html, text).await
    }

    /// Password reset message carrying a single-use token link
    pub async fn send_password_reset(
        &self,
        to: &str,
        first_name: &str,
        token: &str,
    ) -> Result<(), AppError> {
        let subject = "Reset your StaySpot password";
        let link = format!("{}/reset-password?token={}", self.frontend_url, token);
        let html = format!(
            "<h2>Password reset</h2>\
             <p>Hi {first_name}, a password reset was requested for your account.</p>\
             <p><a href=\"{link}\">Choose a new password</a></p>\
             <p>The link expires in one hour. If you did not request this, ignore this message.</p>",
        );
        let text = format!(
            "Hi {first_name},\n\nA password reset was requested for your account.\n\
             Choose a new password at:\n{link}\n\n\
             The link expires in one hour. If you did not request this, ignore this message.\n",
        );
        self.send(to, subject, html, text).await
    }

    /// Invitation to join the inviter's team
    pub async fn send_invitation(
        &self,
        to: &str,
        inviter_name: &str,
        token: &str,
    ) -> Result<(), AppError> {
        let subject = format!("{inviter_name} invited you to StaySpot");
        let link = format!("{}/accept-invitation?token={}", self.frontend_url, token);
        let html = format!(
            "<h2>You're invited</h2>\
             <p>{inviter_name} invited you to join their team on StaySpot.</p>\
             <p><a href=\"{link}\">Accept the invitation</a></p>\
             <p>The invitation expires in seven days.</p>",
        );
        let text = format!(
            "{inviter_name} invited you to join their team on StaySpot.\n\
             Accept the invitation at:\n{link}\n\n\
             The invitation expires in seven days.\n",
        );
        self.send(to, &subject, html, text).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_mailer() -> Mailer {
        let config = SmtpConfig {
            host: "smtp.example.com".to_string(),
            port: 587,
            username: Some("mailer".to_string()),
            password: Some("secret".to_string()),
            from_name: "StaySpot".to_string(),
            from_email: "no-reply@stayspot.app".to_string(),
        };
        Mailer::from_config(&config, "https://stayspot.app/").expect("mailer")
    }

    #[test]
    fn test_frontend_url_trailing_slash_is_stripped() {
        let mailer = test_mailer();
        assert_eq!(mailer.frontend_url, "https://stayspot.app");
    }

    #[test]
    fn test_from_config_rejects_bad_sender() {
        let config = SmtpConfig {
            host: "smtp.example.com".to_string(),
            port: 587,
            username: None,
            password: None,
            from_name: "StaySpot".to_string(),
            from_email: "not an address".to_string(),
        };
        let result = Mailer::from_config(&config, "https://stayspot.app");
        assert!(matches!(result, Err(AppError::DeliveryFailed(_))));
    }

    #[tokio::test]
    async fn test_send_rejects_bad_recipient_without_connecting() {
        let mailer = test_mailer();
        let result = mailer
            .send("not an address", "subject", String::new(), String::new())
            .await;
        assert!(matches!(result, Err(AppError::DeliveryFailed(_))));
    }
}
