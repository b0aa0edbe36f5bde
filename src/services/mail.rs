//! Transactional email for account confirmation and password resets.
//!
//! Uses SMTP via lettre for delivery with Askama templates. When mail is
//! disabled the links are written to the log instead.

use askama::Template;
use async_trait::async_trait;
use lettre::{
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
    message::{MultiPart, SinglePart, header::ContentType},
    transport::smtp::{Error as SmtpError, authentication::Credentials},
};
use thiserror::Error;
use tracing::info;

use crate::config::MailConfig;

#[derive(Template)]
#[template(path = "email/confirmation.html")]
struct ConfirmationEmailHtml<'a> {
    name: &'a str,
    link: &'a str,
}

#[derive(Template)]
#[template(path = "email/confirmation.txt")]
struct ConfirmationEmailText<'a> {
    name: &'a str,
    link: &'a str,
}

#[derive(Template)]
#[template(path = "email/reset_password.html")]
struct ResetPasswordEmailHtml<'a> {
    link: &'a str,
}

#[derive(Template)]
#[template(path = "email/reset_password.txt")]
struct ResetPasswordEmailText<'a> {
    link: &'a str,
}

#[derive(Debug, Error)]
pub enum MailError {
    #[error("SMTP error: {0}")]
    Smtp(#[from] SmtpError),

    #[error("Failed to build message: {0}")]
    MessageBuild(#[from] lettre::error::Error),

    #[error("Invalid email address: {0}")]
    InvalidAddress(String),

    #[error("Template error: {0}")]
    Template(#[from] askama::Error),

    #[error("Invalid link: {0}")]
    Link(#[from] url::ParseError),
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send_register_confirmation(
        &self,
        email: &str,
        name: &str,
        token: &str,
    ) -> Result<(), MailError>;

    async fn send_password_reset(&self, email: &str, token: &str) -> Result<(), MailError>;
}

/// `{client_url}/verify-email?token=…`
pub fn verification_link(client_url: &str, token: &str) -> Result<String, MailError> {
    client_link(client_url, "verify-email", token)
}

/// `{client_url}/reset-password?token=…`
pub fn reset_link(client_url: &str, token: &str) -> Result<String, MailError> {
    client_link(client_url, "reset-password", token)
}

fn client_link(client_url: &str, path: &str, token: &str) -> Result<String, MailError> {
    let base = format!("{}/{path}", client_url.trim_end_matches('/'));
    let url = url::Url::parse_with_params(&base, &[("token", token)])?;
    Ok(url.to_string())
}

#[derive(Clone)]
pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from_address: String,
    client_url: String,
}

impl SmtpMailer {
    pub fn new(config: &MailConfig, client_url: &str) -> Result<Self, MailError> {
        let credentials =
            Credentials::new(config.smtp_username.clone(), config.smtp_password.clone());

        let transport = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.smtp_host)?
            .port(config.smtp_port)
            .credentials(credentials)
            .build();

        Ok(Self {
            transport,
            from_address: config.from_address.clone(),
            client_url: client_url.to_string(),
        })
    }

    async fn send_multipart_email(
        &self,
        to: &str,
        subject: &str,
        text_body: String,
        html_body: String,
    ) -> Result<(), MailError> {
        let email = Message::builder()
            .from(
                self.from_address
                    .parse()
                    .map_err(|_| MailError::InvalidAddress(self.from_address.clone()))?,
            )
            .to(to
                .parse()
                .map_err(|_| MailError::InvalidAddress(to.to_string()))?)
            .subject(subject)
            .multipart(
                MultiPart::alternative()
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_PLAIN)
                            .body(text_body),
                    )
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_HTML)
                            .body(html_body),
                    ),
            )?;

        self.transport.send(email).await?;

        info!(to = %to, subject = %subject, "Email sent");
        Ok(())
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send_register_confirmation(
        &self,
        email: &str,
        name: &str,
        token: &str,
    ) -> Result<(), MailError> {
        let link = verification_link(&self.client_url, token)?;
        let html = ConfirmationEmailHtml { name, link: &link }.render()?;
        let text = ConfirmationEmailText { name, link: &link }.render()?;

        self.send_multipart_email(email, "Confirm your email address", text, html)
            .await
    }

    async fn send_password_reset(&self, email: &str, token: &str) -> Result<(), MailError> {
        let link = reset_link(&self.client_url, token)?;
        let html = ResetPasswordEmailHtml { link: &link }.render()?;
        let text = ResetPasswordEmailText { link: &link }.render()?;

        self.send_multipart_email(email, "Reset your password", text, html)
            .await
    }
}

/// Stand-in used when SMTP is not configured.
#[derive(Clone)]
pub struct LogMailer {
    client_url: String,
}

impl LogMailer {
    #[must_use]
    pub fn new(client_url: &str) -> Self {
        Self {
            client_url: client_url.to_string(),
        }
    }
}

#[async_trait]
impl Mailer for LogMailer {
    async fn send_register_confirmation(
        &self,
        email: &str,
        _name: &str,
        token: &str,
    ) -> Result<(), MailError> {
        let link = verification_link(&self.client_url, token)?;
        info!(to = %email, link = %link, "Mail disabled, confirmation link");
        Ok(())
    }

    async fn send_password_reset(&self, email: &str, token: &str) -> Result<(), MailError> {
        let link = reset_link(&self.client_url, token)?;
        info!(to = %email, link = %link, "Mail disabled, password reset link");
        Ok(())
    }
}
