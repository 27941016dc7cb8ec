//! Lead persistence.
//!
//! The schema (`lead_intake_step1`, `lead_intake_step2`) is managed outside this
//! repository; queries here only assume the columns they name.

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::{Connection, PgPool, Row};
use tracing::{info_span, Instrument};
use uuid::Uuid;

/// First-step submission as stored.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LeadRecord {
    pub email: String,
    pub call_types: Vec<String>,
    pub avoided_call_text: Option<String>,
    pub company: Option<String>,
    pub description_text: Option<String>,
    pub utm_source: Option<String>,
    pub utm_campaign: Option<String>,
    pub utm_adset: Option<String>,
    pub utm_ad: Option<String>,
}

/// Second-step details, linked to the first-step row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetailsRecord {
    pub step1_id: Uuid,
    pub company: String,
    pub description_text: String,
    pub audio_path: Option<String>,
    pub transcript_text: Option<String>,
    pub phone: Option<String>,
}

#[async_trait]
pub trait LeadStore: Send + Sync {
    async fn ping(&self) -> Result<()>;

    async fn insert_lead(&self, lead: &LeadRecord) -> Result<Uuid>;

    async fn lead_exists(&self, id: Uuid) -> Result<bool>;

    async fn insert_details(&self, details: &DetailsRecord) -> Result<Uuid>;
}

#[derive(Clone, Debug)]
pub struct PgLeadStore {
    pool: PgPool,
}

impl PgLeadStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl LeadStore for PgLeadStore {
    async fn ping(&self) -> Result<()> {
        let acquire_span = info_span!(
            "db.acquire",
            db.system = "postgresql",
            db.operation = "ACQUIRE"
        );
        let mut conn = self
            .pool
            .acquire()
            .instrument(acquire_span)
            .await
            .context("Failed to acquire database connection")?;

        let ping_span = info_span!("db.ping", db.system = "postgresql", db.operation = "PING");
        conn.ping()
            .instrument(ping_span)
            .await
            .context("Failed to ping database")
    }

    async fn insert_lead(&self, lead: &LeadRecord) -> Result<Uuid> {
        let query = r"
            INSERT INTO lead_intake_step1
                (id, email, call_types, avoided_call_text, company, description_text,
                 utm_source, utm_campaign, utm_adset, utm_ad)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            RETURNING id
        ";
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "INSERT",
            db.statement = query
        );
        let row = sqlx::query(query)
            .bind(Uuid::now_v7())
            .bind(&lead.email)
            .bind(&lead.call_types)
            .bind(lead.avoided_call_text.as_deref())
            .bind(lead.company.as_deref())
            .bind(lead.description_text.as_deref())
            .bind(lead.utm_source.as_deref())
            .bind(lead.utm_campaign.as_deref())
            .bind(lead.utm_adset.as_deref())
            .bind(lead.utm_ad.as_deref())
            .fetch_one(&self.pool)
            .instrument(span)
            .await
            .context("failed to insert lead_intake_step1")?;

        Ok(row.get("id"))
    }

    async fn lead_exists(&self, id: Uuid) -> Result<bool> {
        let query = "SELECT EXISTS(SELECT 1 FROM lead_intake_step1 WHERE id = $1) AS exists";
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        let row = sqlx::query(query)
            .bind(id)
            .fetch_one(&self.pool)
            .instrument(span)
            .await
            .context("failed to look up lead_intake_step1")?;

        Ok(row.get("exists"))
    }

    async fn insert_details(&self, details: &DetailsRecord) -> Result<Uuid> {
        let query = r"
            INSERT INTO lead_intake_step2
                (id, step1_id, company, description_text, audio_path, transcript_text, phone)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING id
        ";
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "INSERT",
            db.statement = query
        );
        let row = sqlx::query(query)
            .bind(Uuid::now_v7())
            .bind(details.step1_id)
            .bind(&details.company)
            .bind(&details.description_text)
            .bind(details.audio_path.as_deref())
            .bind(details.transcript_text.as_deref())
            .bind(details.phone.as_deref())
            .fetch_one(&self.pool)
            .instrument(span)
            .await
            .context("failed to insert lead_intake_step2")?;

        Ok(row.get("id"))
    }
}
