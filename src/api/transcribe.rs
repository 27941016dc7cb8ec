//! Voice recordings: where the audio is kept and how it becomes text.

use crate::APP_USER_AGENT;
use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use reqwest::{
    multipart::{Form, Part},
    Client,
};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::{
    fmt,
    path::{Component, Path, PathBuf},
    time::Duration,
};
use tokio::{fs, io::AsyncWriteExt};
use tracing::debug;

const WHISPER_ENDPOINT: &str = "https://api.openai.com/v1/audio/transcriptions";
const WHISPER_MODEL: &str = "whisper-1";
const WHISPER_LANGUAGE: &str = "en";

/// File extension for an uploaded MIME type; unknown types are stored as `webm`.
#[must_use]
pub fn mime_extension(mime: &str) -> &'static str {
    match mime {
        "audio/mp4" => "mp4",
        "audio/mpeg" => "mp3",
        "audio/ogg" => "ogg",
        "audio/wav" => "wav",
        _ => "webm",
    }
}

/// `<subject>/<unix_ms>.<ext>`
#[must_use]
pub fn audio_path(subject_id: &str, now_ms: i64, extension: &str) -> String {
    format!("{subject_id}/{now_ms}.{extension}")
}

#[async_trait]
pub trait AudioStore: Send + Sync {
    /// Store `bytes` at `path`. Existing objects are never overwritten.
    async fn put(&self, path: &str, bytes: &[u8], mime: &str) -> Result<()>;
}

#[async_trait]
pub trait Transcriber: Send + Sync {
    async fn transcribe(&self, audio: Vec<u8>, mime: &str, extension: &str) -> Result<String>;
}

/// Audio objects as files under a root directory.
#[derive(Clone, Debug)]
pub struct FsAudioStore {
    root: PathBuf,
}

impl FsAudioStore {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, path: &str) -> Result<PathBuf> {
        let relative = Path::new(path);
        let safe = relative
            .components()
            .all(|component| matches!(component, Component::Normal(_)));
        if path.is_empty() || !safe {
            bail!("refusing to store audio outside the audio directory: {path}");
        }
        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl AudioStore for FsAudioStore {
    async fn put(&self, path: &str, bytes: &[u8], mime: &str) -> Result<()> {
        let target = self.resolve(path)?;
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }

        let mut file = fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&target)
            .await
            .with_context(|| format!("Failed to create {}", target.display()))?;
        file.write_all(bytes)
            .await
            .with_context(|| format!("Failed to write {}", target.display()))?;
        file.flush().await?;

        debug!(path = %target.display(), mime, size = bytes.len(), "stored audio");
        Ok(())
    }
}

#[derive(Deserialize)]
struct WhisperResponse {
    #[serde(default)]
    text: String,
}

/// OpenAI Whisper transcription over multipart upload.
#[derive(Clone)]
pub struct WhisperTranscriber {
    client: Client,
    api_key: SecretString,
    endpoint: String,
}

impl fmt::Debug for WhisperTranscriber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WhisperTranscriber")
            .field("endpoint", &self.endpoint)
            .finish_non_exhaustive()
    }
}

impl WhisperTranscriber {
    /// # Errors
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(api_key: SecretString) -> Result<Self> {
        let client = Client::builder()
            .user_agent(APP_USER_AGENT)
            .timeout(Duration::from_secs(120))
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            client,
            api_key,
            endpoint: WHISPER_ENDPOINT.to_string(),
        })
    }

    #[must_use]
    pub fn with_endpoint(mut self, endpoint: String) -> Self {
        self.endpoint = endpoint;
        self
    }
}

#[async_trait]
impl Transcriber for WhisperTranscriber {
    async fn transcribe(&self, audio: Vec<u8>, mime: &str, extension: &str) -> Result<String> {
        let file = Part::bytes(audio)
            .file_name(format!("audio.{extension}"))
            .mime_str(mime)
            .map_err(|err| anyhow!("invalid audio MIME type {mime}: {err}"))?;
        let form = Form::new()
            .part("file", file)
            .text("model", WHISPER_MODEL)
            .text("language", WHISPER_LANGUAGE);

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(self.api_key.expose_secret())
            .multipart(form)
            .send()
            .await
            .context("Failed to reach transcription API")?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            bail!("Transcription API returned {status}: {text}");
        }

        let result: WhisperResponse = response
            .json()
            .await
            .context("Failed to parse transcription response")?;
        Ok(result.text)
    }
}
