//! Shared handler state.

use super::{
    config::IntakeConfig,
    email::{EmailSender, LogEmailSender},
    storage::LeadStore,
    transcribe::{AudioStore, FsAudioStore, Transcriber},
};
use crate::token::{Clock, SystemClock, TokenCodec};
use std::{fmt, sync::Arc};

/// Immutable after startup; handlers receive it as `Extension<Arc<IntakeState>>`.
pub struct IntakeState {
    config: IntakeConfig,
    codec: TokenCodec,
    leads: Arc<dyn LeadStore>,
    mailer: Arc<dyn EmailSender>,
    audio: Arc<dyn AudioStore>,
    transcriber: Option<Arc<dyn Transcriber>>,
    clock: Arc<dyn Clock>,
}

impl fmt::Debug for IntakeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IntakeState")
            .field("config", &self.config)
            .field("transcriber", &self.transcriber.is_some())
            .field("clock", &self.clock)
            .finish_non_exhaustive()
    }
}

impl IntakeState {
    /// State with the log-only mailer, filesystem audio under the configured
    /// directory, no transcriber, and the system clock.
    #[must_use]
    pub fn new(config: IntakeConfig, codec: TokenCodec, leads: Arc<dyn LeadStore>) -> Self {
        let audio = Arc::new(FsAudioStore::new(config.audio_dir()));
        Self {
            config,
            codec,
            leads,
            mailer: Arc::new(LogEmailSender),
            audio,
            transcriber: None,
            clock: Arc::new(SystemClock),
        }
    }

    #[must_use]
    pub fn with_mailer(mut self, mailer: Arc<dyn EmailSender>) -> Self {
        self.mailer = mailer;
        self
    }

    #[must_use]
    pub fn with_audio_store(mut self, audio: Arc<dyn AudioStore>) -> Self {
        self.audio = audio;
        self
    }

    #[must_use]
    pub fn with_transcriber(mut self, transcriber: Arc<dyn Transcriber>) -> Self {
        self.transcriber = Some(transcriber);
        self
    }

    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    #[must_use]
    pub fn config(&self) -> &IntakeConfig {
        &self.config
    }

    #[must_use]
    pub fn codec(&self) -> &TokenCodec {
        &self.codec
    }

    #[must_use]
    pub fn leads(&self) -> &dyn LeadStore {
        self.leads.as_ref()
    }

    #[must_use]
    pub fn mailer(&self) -> &dyn EmailSender {
        self.mailer.as_ref()
    }

    #[must_use]
    pub fn audio(&self) -> &dyn AudioStore {
        self.audio.as_ref()
    }

    #[must_use]
    pub fn transcriber(&self) -> Option<&dyn Transcriber> {
        self.transcriber.as_deref()
    }

    #[must_use]
    pub fn now_ms(&self) -> i64 {
        self.clock.now_ms()
    }
}
