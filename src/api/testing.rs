//! In-memory collaborators for handler tests.

use super::{
    config::IntakeConfig,
    email::{EmailMessage, EmailSender},
    storage::{DetailsRecord, LeadRecord, LeadStore},
    transcribe::{AudioStore, Transcriber},
    IntakeState,
};
use crate::token::{FixedClock, TokenCodec};
use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use secrecy::SecretString;
use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex,
    },
};
use uuid::Uuid;

pub const SECRET: &str = "test-intake-secret";
pub const NOW: i64 = 1_700_000_000_000;
pub const SITE: &str = "https://intake.example.com";

fn poisoned<T>(_: T) -> anyhow::Error {
    anyhow!("test store lock poisoned")
}

#[derive(Default)]
pub struct MemoryLeadStore {
    leads: Mutex<Vec<(Uuid, LeadRecord)>>,
    details: Mutex<Vec<DetailsRecord>>,
    failing: AtomicBool,
}

impl MemoryLeadStore {
    pub fn fail(&self) {
        self.failing.store(true, Ordering::SeqCst);
    }

    pub fn leads(&self) -> Vec<(Uuid, LeadRecord)> {
        self.leads.lock().map(|l| l.clone()).unwrap_or_default()
    }

    pub fn details(&self) -> Vec<DetailsRecord> {
        self.details.lock().map(|d| d.clone()).unwrap_or_default()
    }

    fn check(&self) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            bail!("database unavailable");
        }
        Ok(())
    }
}

#[async_trait]
impl LeadStore for MemoryLeadStore {
    async fn ping(&self) -> Result<()> {
        self.check()
    }

    async fn insert_lead(&self, lead: &LeadRecord) -> Result<Uuid> {
        self.check()?;
        let id = Uuid::now_v7();
        self.leads.lock().map_err(poisoned)?.push((id, lead.clone()));
        Ok(id)
    }

    async fn lead_exists(&self, id: Uuid) -> Result<bool> {
        self.check()?;
        Ok(self
            .leads
            .lock()
            .map_err(poisoned)?
            .iter()
            .any(|(lead_id, _)| *lead_id == id))
    }

    async fn insert_details(&self, details: &DetailsRecord) -> Result<Uuid> {
        self.check()?;
        self.details.lock().map_err(poisoned)?.push(details.clone());
        Ok(Uuid::now_v7())
    }
}

#[derive(Default)]
pub struct RecordingMailer {
    sent: Mutex<Vec<EmailMessage>>,
    failing: AtomicBool,
}

impl RecordingMailer {
    pub fn fail(&self) {
        self.failing.store(true, Ordering::SeqCst);
    }

    pub fn sent(&self) -> Vec<EmailMessage> {
        self.sent.lock().map(|s| s.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl EmailSender for RecordingMailer {
    async fn send(&self, _from: &str, message: &EmailMessage) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            bail!("provider down");
        }
        self.sent.lock().map_err(poisoned)?.push(message.clone());
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryAudioStore {
    objects: Mutex<HashMap<String, Vec<u8>>>,
    failing: AtomicBool,
}

impl MemoryAudioStore {
    pub fn fail(&self) {
        self.failing.store(true, Ordering::SeqCst);
    }

    pub fn get(&self, path: &str) -> Option<Vec<u8>> {
        self.objects.lock().ok().and_then(|o| o.get(path).cloned())
    }
}

#[async_trait]
impl AudioStore for MemoryAudioStore {
    async fn put(&self, path: &str, bytes: &[u8], _mime: &str) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            bail!("bucket unavailable");
        }
        self.objects
            .lock()
            .map_err(poisoned)?
            .insert(path.to_string(), bytes.to_vec());
        Ok(())
    }
}

pub struct StubTranscriber {
    text: String,
    failing: AtomicBool,
}

impl StubTranscriber {
    pub fn fail(&self) {
        self.failing.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl Transcriber for StubTranscriber {
    async fn transcribe(&self, _audio: Vec<u8>, _mime: &str, _extension: &str) -> Result<String> {
        if self.failing.load(Ordering::SeqCst) {
            bail!("whisper unavailable");
        }
        Ok(self.text.clone())
    }
}

pub struct Fixture {
    pub leads: Arc<MemoryLeadStore>,
    pub mailer: Arc<RecordingMailer>,
    pub audio: Arc<MemoryAudioStore>,
    pub transcriber: Arc<StubTranscriber>,
    pub config: IntakeConfig,
}

impl Fixture {
    pub fn new() -> Self {
        Self {
            leads: Arc::new(MemoryLeadStore::default()),
            mailer: Arc::new(RecordingMailer::default()),
            audio: Arc::new(MemoryAudioStore::default()),
            transcriber: Arc::new(StubTranscriber {
                text: "I need to cancel my plan".to_string(),
                failing: AtomicBool::new(false),
            }),
            config: IntakeConfig::new(SITE.to_string()),
        }
    }

    pub fn codec() -> TokenCodec {
        TokenCodec::new(SecretString::from(SECRET.to_string()))
    }

    fn base_state(&self) -> IntakeState {
        IntakeState::new(self.config.clone(), Self::codec(), self.leads.clone())
            .with_mailer(self.mailer.clone())
            .with_audio_store(self.audio.clone())
            .with_clock(Arc::new(FixedClock(NOW)))
    }

    pub fn state(&self) -> Arc<IntakeState> {
        Arc::new(self.base_state().with_transcriber(self.transcriber.clone()))
    }

    pub fn state_without_transcriber(&self) -> Arc<IntakeState> {
        Arc::new(self.base_state())
    }

    /// Store a first-step row and return a continuation token for it.
    pub async fn lead_token(&self) -> Result<(Uuid, String)> {
        let id = self
            .leads
            .insert_lead(&LeadRecord {
                email: "a@b.com".to_string(),
                ..LeadRecord::default()
            })
            .await?;
        let token = Self::codec().encode_continuation(&id.to_string(), 3600, NOW)?;
        Ok((id, token))
    }
}
