//! # Concierge (lead intake)
//!
//! `concierge` collects a multi-step lead-intake form, stores submissions, and
//! emails follow-up links that let a visitor resume the flow later.
//!
//! ## Continuation tokens
//!
//! Follow-up links carry a stateless bearer token (see [`token`]): a base64url
//! JSON payload holding the first-step row id and an expiry, plus an
//! `HMAC-SHA256` signature keyed by a server-held secret. Nothing is stored
//! server-side; rotating the secret invalidates every outstanding link.
//!
//! ## Step flow
//!
//! The client side of the form is a small state machine (see [`flow`]) with a
//! validation gate per step, a write-through draft snapshot, and a single
//! submission collaborator. The `concierge intake` subcommand drives it from a
//! terminal.
//!
//! ## Service
//!
//! [`api`] exposes the submission, verification, and transcription endpoints
//! over axum, backed by Postgres through sqlx.

pub mod analytics;
pub mod api;
pub mod cli;
pub mod flow;
pub mod token;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};

pub const APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"),);
