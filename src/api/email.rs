//! Transactional email.
//!
//! Handlers build an [`EmailMessage`] and hand it to an [`EmailSender`]. When a
//! Resend API key is configured the server uses [`ResendEmailSender`];
//! otherwise [`LogEmailSender`] logs the link so local development works
//! without an email provider. Delivery failures are logged by the caller and
//! never roll back data that was already stored.

use crate::APP_USER_AGENT;
use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use std::{fmt, time::Duration};
use tracing::{debug, info};

const RESEND_ENDPOINT: &str = "https://api.resend.com/emails";

pub const CONTINUATION_TEMPLATE: &str = "continuation";
pub const VERIFICATION_TEMPLATE: &str = "verification";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EmailMessage {
    pub to_email: String,
    pub template: &'static str,
    pub subject: String,
    pub html: String,
    /// The call-to-action link, kept separately so it can be logged.
    pub link: String,
}

#[async_trait]
pub trait EmailSender: Send + Sync {
    /// Deliver a message or return an error describing why it failed.
    async fn send(&self, from: &str, message: &EmailMessage) -> Result<()>;
}

/// Local dev sender that logs the link instead of sending real email.
#[derive(Clone, Debug)]
pub struct LogEmailSender;

#[async_trait]
impl EmailSender for LogEmailSender {
    async fn send(&self, from: &str, message: &EmailMessage) -> Result<()> {
        info!(
            from = %from,
            to_email = %message.to_email,
            template = %message.template,
            link = %message.link,
            "email send stub"
        );
        Ok(())
    }
}

#[derive(Serialize)]
struct ResendRequest<'a> {
    from: &'a str,
    to: &'a str,
    subject: &'a str,
    html: &'a str,
}

#[derive(Clone)]
pub struct ResendEmailSender {
    client: Client,
    api_key: SecretString,
    endpoint: String,
}

impl fmt::Debug for ResendEmailSender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResendEmailSender")
            .field("endpoint", &self.endpoint)
            .finish_non_exhaustive()
    }
}

impl ResendEmailSender {
    /// # Errors
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(api_key: SecretString) -> Result<Self> {
        let client = Client::builder()
            .user_agent(APP_USER_AGENT)
            .timeout(Duration::from_secs(10))
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            client,
            api_key,
            endpoint: RESEND_ENDPOINT.to_string(),
        })
    }

    #[must_use]
    pub fn with_endpoint(mut self, endpoint: String) -> Self {
        self.endpoint = endpoint;
        self
    }
}

#[async_trait]
impl EmailSender for ResendEmailSender {
    async fn send(&self, from: &str, message: &EmailMessage) -> Result<()> {
        let body = ResendRequest {
            from,
            to: &message.to_email,
            subject: &message.subject,
            html: &message.html,
        };
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(self.api_key.expose_secret())
            .json(&body)
            .send()
            .await
            .context("Failed to reach email provider")?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            bail!("Email provider returned {status}: {text}");
        }

        debug!(to_email = %message.to_email, template = message.template, "email sent");
        Ok(())
    }
}

fn layout(heading: &str, intro: &str, link: &str, button: &str, footer: &str) -> String {
    format!(
        r#"<div style="font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, sans-serif; max-width: 480px; margin: 0 auto; padding: 40px 20px;">
  <h1 style="color: #0B0F1A; font-size: 24px; font-weight: 600; margin-bottom: 16px;">{heading}</h1>
  {intro}
  <a href="{link}" style="display: inline-block; background: #6C5CE7; color: #FFFFFF; font-size: 16px; font-weight: 600; text-decoration: none; padding: 14px 32px; border-radius: 12px;">{button}</a>
  <p style="color: #9CA3AF; font-size: 14px; margin-top: 32px;">{footer}</p>
</div>"#
    )
}

/// Link back into the second step after the first submission.
#[must_use]
pub fn continuation_email(to_email: &str, link: &str) -> EmailMessage {
    let intro = r#"<p style="color: #6B7280; font-size: 16px; line-height: 1.5; margin-bottom: 32px;">Thanks for reaching out. We just need a few more details to get your call handled.</p>"#;
    EmailMessage {
        to_email: to_email.to_string(),
        template: CONTINUATION_TEMPLATE,
        subject: "One quick step so we can handle your call".to_string(),
        html: layout(
            "One quick step",
            intro,
            link,
            "Complete 2-minute intake",
            "This link expires in 7 days.",
        ),
        link: link.to_string(),
    }
}

#[must_use]
pub fn verification_email(to_email: &str, code: &str, link: &str) -> EmailMessage {
    let intro = format!(
        r#"<p style="color: #6B7280; font-size: 16px; line-height: 1.5; margin-bottom: 16px;">Enter this code to confirm your email and complete your submission:</p>
  <p style="color: #0B0F1A; font-size: 32px; font-weight: 700; letter-spacing: 6px; margin-bottom: 32px;">{code}</p>"#
    );
    EmailMessage {
        to_email: to_email.to_string(),
        template: VERIFICATION_TEMPLATE,
        subject: "Verify your email".to_string(),
        html: layout(
            "Verify your email",
            &intro,
            link,
            "Verify my email",
            "This code expires in 10 minutes.",
        ),
        link: link.to_string(),
    }
}
