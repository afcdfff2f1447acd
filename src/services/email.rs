//! Email service for registration OTPs and password reset links

use std::{str::FromStr, time::Duration};

use lettre::{
    message::{header::ContentType, Mailbox, Message, MultiPart, SinglePart},
    transport::smtp::authentication::Credentials,
    SmtpTransport, Transport,
};

use crate::{
    config::EmailConfig,
    error::{AppError, AppResult},
};

/// Delay before retry `attempt` (1-based): 2s, 4s, 8s, ...
pub fn retry_delay(attempt: u32) -> Duration {
    Duration::from_secs(2u64.saturating_pow(attempt.min(10)))
}

#[derive(Clone)]
pub struct EmailService {
    config: EmailConfig,
}

impl EmailService {
    pub fn new(config: EmailConfig) -> Self {
        Self { config }
    }

    /// Send a registration OTP
    pub async fn send_otp(&self, to: &str, otp: &str, expires_minutes: u64) -> AppResult<()> {
        let subject = "Your Car Portal verification code";
        let body = format!(
            r#"
Your verification code is: {otp}

This code will expire in {expires_minutes} minutes.

If you didn't create an account, please ignore this email.
"#
        );

        self.send_with_retry(to, subject, &body).await
    }

    /// Send a password reset link
    pub async fn send_password_reset(&self, to: &str, link: &str, expires_minutes: u64) -> AppResult<()> {
        let subject = "Reset your Car Portal password";
        let body = format!(
            r#"
We received a request to reset your password.

Open the following link to choose a new one:
{link}

This link will expire in {expires_minutes} minutes. If you didn't request a reset, you can ignore this email.
"#
        );

        self.send_with_retry(to, subject, &body).await
    }

    async fn send_with_retry(&self, to: &str, subject: &str, body: &str) -> AppResult<()> {
        let email = self.build_message(to, subject, body)?;
        let attempts = self.config.max_attempts.max(1);

        let mut attempt = 1;
        loop {
            let mailer = self.mailer()?;
            let message = email.clone();
            let result = tokio::task::spawn_blocking(move || mailer.send(&message))
                .await
                .map_err(|e| AppError::Internal(format!("Email task failed: {}", e)))?;

            match result {
                Ok(_) => {
                    tracing::info!(to, subject, attempt, "Email sent");
                    return Ok(());
                }
                Err(e) if attempt < attempts => {
                    let delay = retry_delay(attempt);
                    tracing::warn!(to, attempt, error = %e, "Email delivery failed, retrying in {:?}", delay);
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => {
                    tracing::error!(to, attempt, error = %e, "Email delivery failed");
                    return Err(AppError::Internal(format!("Failed to send email: {}", e)));
                }
            }
        }
    }

    fn build_message(&self, to: &str, subject: &str, body: &str) -> AppResult<Message> {
        let from_name = self.config.smtp_from_name.as_deref().unwrap_or("Car Portal");
        let from_mailbox = Mailbox::from_str(&format!("{} <{}>", from_name, self.config.smtp_from))
            .map_err(|e| AppError::Internal(format!("Invalid from address: {}", e)))?;

        let to_mailbox = Mailbox::from_str(to)
            .map_err(|e| AppError::Validation(format!("Invalid email address: {}", e)))?;

        Message::builder()
            .from(from_mailbox)
            .to(to_mailbox)
            .subject(subject)
            .multipart(
                MultiPart::alternative()
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_PLAIN)
                            .body(body.to_string()),
                    )
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_HTML)
                            .body(format!(
                                r#"<html><body><pre>{}</pre></body></html>"#,
                                body.trim().replace('\n', "<br>")
                            )),
                    ),
            )
            .map_err(|e| AppError::Internal(format!("Failed to build email: {}", e)))
    }

    fn mailer(&self) -> AppResult<SmtpTransport> {
        let builder = if self.config.smtp_use_tls {
            SmtpTransport::starttls_relay(&self.config.smtp_host)
                .map_err(|e| AppError::Internal(format!("Failed to create SMTP transport: {}", e)))?
        } else {
            SmtpTransport::builder_dangerous(&self.config.smtp_host)
        }
        .port(self.config.smtp_port)
        .timeout(Some(Duration::from_secs(15)));

        let builder = match (&self.config.smtp_username, &self.config.smtp_password) {
            (Some(username), Some(password)) => {
                builder.credentials(Credentials::new(username.clone(), password.clone()))
            }
            _ => builder,
        };

        Ok(builder.build())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_delay_doubles() {
        assert_eq!(retry_delay(1), Duration::from_secs(2));
        assert_eq!(retry_delay(2), Duration::from_secs(4));
        assert_eq!(retry_delay(3), Duration::from_secs(8));
        assert_eq!(retry_delay(50), Duration::from_secs(1024));
    }

    #[test]
    fn test_build_message_rejects_bad_recipient() {
        let service = EmailService::new(EmailConfig::default());
        assert!(service.build_message("asha@example.com", "Hi", "Body").is_ok());
        assert!(matches!(
            service.build_message("not an address", "Hi", "Body"),
            Err(AppError::Validation(_))
        ));
    }
}
