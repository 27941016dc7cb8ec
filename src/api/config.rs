use crate::token::{continuation, verification, verification::TokenMode};
use secrecy::SecretString;
use std::path::{Path, PathBuf};

const DEFAULT_EMAIL_FROM: &str = "Concierge <noreply@concierge.dev>";
const DEFAULT_AUDIO_DIR: &str = "audio";

#[derive(Clone, Debug)]
pub struct IntakeConfig {
    site_url: String,
    continuation_ttl_seconds: i64,
    verification_ttl_seconds: i64,
    token_mode: TokenMode,
    email_from: String,
    audio_dir: PathBuf,
}

impl IntakeConfig {
    #[must_use]
    pub fn new(site_url: String) -> Self {
        Self {
            site_url: site_url.trim_end_matches('/').to_string(),
            continuation_ttl_seconds: continuation::DEFAULT_TTL_SECONDS,
            verification_ttl_seconds: verification::DEFAULT_TTL_SECONDS,
            token_mode: TokenMode::default(),
            email_from: DEFAULT_EMAIL_FROM.to_string(),
            audio_dir: PathBuf::from(DEFAULT_AUDIO_DIR),
        }
    }

    #[must_use]
    pub fn with_continuation_ttl_seconds(mut self, seconds: i64) -> Self {
        self.continuation_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_verification_ttl_seconds(mut self, seconds: i64) -> Self {
        self.verification_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_token_mode(mut self, mode: TokenMode) -> Self {
        self.token_mode = mode;
        self
    }

    #[must_use]
    pub fn with_email_from(mut self, from: String) -> Self {
        self.email_from = from;
        self
    }

    #[must_use]
    pub fn with_audio_dir(mut self, dir: PathBuf) -> Self {
        self.audio_dir = dir;
        self
    }

    #[must_use]
    pub fn site_url(&self) -> &str {
        &self.site_url
    }

    #[must_use]
    pub fn continuation_ttl_seconds(&self) -> i64 {
        self.continuation_ttl_seconds
    }

    #[must_use]
    pub fn verification_ttl_seconds(&self) -> i64 {
        self.verification_ttl_seconds
    }

    #[must_use]
    pub fn token_mode(&self) -> TokenMode {
        self.token_mode
    }

    #[must_use]
    pub fn email_from(&self) -> &str {
        &self.email_from
    }

    #[must_use]
    pub fn audio_dir(&self) -> &Path {
        &self.audio_dir
    }
}

/// Secrets the server needs at startup. Optional keys fall back to the
/// log-only email sender and to a disabled transcriber.
#[derive(Clone, Debug)]
pub struct Credentials {
    pub token_secret: SecretString,
    pub resend_api_key: Option<SecretString>,
    pub openai_api_key: Option<SecretString>,
}
