//! Submission collaborator used by the step flow.
//!
//! [`HttpIntakeClient`] talks to the `concierge server` endpoints. Every failure
//! is folded into a [`CollaboratorError`] whose `Display` is safe to show to the
//! user as-is.

use crate::{flow::GENERIC_FAILURE, APP_USER_AGENT};
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{header::CONTENT_TYPE, Client};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error};
use url::Url;

pub const STEP1_PATH: &str = "/v1/intake/step1";
pub const STEP2_PATH: &str = "/v1/intake/step2";
pub const TRANSCRIBE_PATH: &str = "/v1/intake/transcribe";
pub const SEND_VERIFICATION_PATH: &str = "/v1/verification/send";
pub const VERIFY_CODE_PATH: &str = "/v1/verification/verify";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CollaboratorError {
    #[error("Network error. Please check your connection.")]
    Network,
    #[error("Server error ({status}). Please try again.")]
    UnexpectedBody { status: u16 },
    #[error("Invalid server response. Please try again.")]
    InvalidResponse,
    #[error("{message}")]
    Rejected { status: u16, message: String },
    #[error("Something went wrong. Please try again.")]
    Unknown,
}

impl CollaboratorError {
    /// A rejection carrying the server's message, or a status-based fallback.
    #[must_use]
    pub fn rejected(status: u16, message: Option<&str>) -> Self {
        let message = message
            .map(str::trim)
            .filter(|m| !m.is_empty())
            .map_or_else(|| format!("Request failed ({status})"), ToString::to_string);
        Self::Rejected { status, message }
    }

    #[must_use]
    pub fn user_message(&self) -> String {
        let message = self.to_string();
        if message.trim().is_empty() {
            GENERIC_FAILURE.to_string()
        } else {
            message
        }
    }
}

/// UTM attribution carried with the first-step submission.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attribution {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub utm_source: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub utm_campaign: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub utm_adset: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub utm_ad: Option<String>,
}

impl Attribution {
    /// Pick `utm_*` parameters out of the landing page URL.
    ///
    /// # Errors
    ///
    /// Returns an error if `landing_url` is not an absolute URL.
    pub fn from_landing_url(landing_url: &str) -> Result<Self> {
        let url = Url::parse(landing_url)
            .with_context(|| format!("Invalid landing URL: {landing_url}"))?;
        let mut attribution = Self::default();
        for (key, value) in url.query_pairs() {
            let value = Some(value.into_owned()).filter(|v| !v.is_empty());
            match key.as_ref() {
                "utm_source" => attribution.utm_source = value,
                "utm_campaign" => attribution.utm_campaign = value,
                "utm_adset" => attribution.utm_adset = value,
                "utm_ad" => attribution.utm_ad = value,
                _ => {}
            }
        }
        Ok(attribution)
    }

    /// Fill fields that are still unset from `other`.
    #[must_use]
    pub fn or(self, other: Self) -> Self {
        Self {
            utm_source: self.utm_source.or(other.utm_source),
            utm_campaign: self.utm_campaign.or(other.utm_campaign),
            utm_adset: self.utm_adset.or(other.utm_adset),
            utm_ad: self.utm_ad.or(other.utm_ad),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LeadSubmission {
    pub email: String,
    pub call_types: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avoided_call_text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub company: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description_text: Option<String>,
    #[serde(flatten)]
    pub attribution: Attribution,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DetailsSubmission {
    pub token: String,
    pub company: String,
    pub description_text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audio_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transcript_text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Submission {
    Lead(LeadSubmission),
    Details(DetailsSubmission),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct Receipt {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub token: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TranscriptionRequest {
    pub token: String,
    pub audio_base64: String,
    pub audio_mime: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Transcription {
    #[serde(default)]
    pub transcript_text: String,
    pub audio_path: String,
}

#[derive(Deserialize)]
struct TokenResponse {
    token: String,
}

#[async_trait]
pub trait IntakeClient: Send + Sync {
    async fn submit(&self, submission: &Submission) -> Result<Receipt, CollaboratorError>;

    async fn transcribe(
        &self,
        request: &TranscriptionRequest,
    ) -> Result<Transcription, CollaboratorError>;

    /// Email a verification code; returns the verification token.
    async fn send_verification(&self, email: &str) -> Result<String, CollaboratorError>;

    async fn verify_code(&self, token: &str, code: &str) -> Result<(), CollaboratorError>;
}

#[derive(Debug, Clone)]
pub struct HttpIntakeClient {
    base_url: String,
    client: Client,
}

impl HttpIntakeClient {
    /// # Errors
    ///
    /// Returns an error if the base URL is invalid or the HTTP client cannot be built.
    pub fn new(base_url: &str) -> Result<Self> {
        let parsed =
            Url::parse(base_url).with_context(|| format!("Invalid API base URL: {base_url}"))?;
        let client = Client::builder()
            .user_agent(APP_USER_AGENT)
            .timeout(Duration::from_secs(60))
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            base_url: parsed.as_str().trim_end_matches('/').to_string(),
            client,
        })
    }

    async fn post<B, T>(&self, path: &str, body: &B) -> Result<T, CollaboratorError>
    where
        B: Serialize + Sync + ?Sized,
        T: DeserializeOwned,
    {
        let url = format!("{}{path}", self.base_url);
        debug!(%url, "posting to intake API");

        let response = self
            .client
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|err| {
                error!("Network error calling {path}: {err}");
                CollaboratorError::Network
            })?;

        let status = response.status();
        let is_json = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .is_some_and(|value| value.contains("application/json"));
        if !is_json {
            let text = response.text().await.unwrap_or_default();
            error!("Non-JSON response from {path}: {text}");
            return Err(CollaboratorError::UnexpectedBody {
                status: status.as_u16(),
            });
        }

        let value: Value = response.json().await.map_err(|err| {
            error!("JSON parse error from {path}: {err}");
            CollaboratorError::InvalidResponse
        })?;

        if !status.is_success() {
            return Err(CollaboratorError::rejected(
                status.as_u16(),
                value.get("error").and_then(Value::as_str),
            ));
        }

        serde_json::from_value(value).map_err(|err| {
            error!("Unexpected response shape from {path}: {err}");
            CollaboratorError::InvalidResponse
        })
    }
}

#[async_trait]
impl IntakeClient for HttpIntakeClient {
    async fn submit(&self, submission: &Submission) -> Result<Receipt, CollaboratorError> {
        match submission {
            Submission::Lead(lead) => self.post(STEP1_PATH, lead).await,
            Submission::Details(details) => self.post(STEP2_PATH, details).await,
        }
    }

    async fn transcribe(
        &self,
        request: &TranscriptionRequest,
    ) -> Result<Transcription, CollaboratorError> {
        self.post(TRANSCRIBE_PATH, request).await
    }

    async fn send_verification(&self, email: &str) -> Result<String, CollaboratorError> {
        let body = serde_json::json!({ "email": email });
        let response: TokenResponse = self.post(SEND_VERIFICATION_PATH, &body).await?;
        Ok(response.token)
    }

    async fn verify_code(&self, token: &str, code: &str) -> Result<(), CollaboratorError> {
        let body = serde_json::json!({ "token": token, "code": code });
        let _: Value = self.post(VERIFY_CODE_PATH, &body).await?;
        Ok(())
    }
}
