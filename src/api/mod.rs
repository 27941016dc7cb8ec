//! HTTP service for lead intake.
//!
//! [`router`] wires the handlers onto an axum [`Router`] with the shared
//! [`IntakeState`]; [`new`] adds the datastore, collaborators, and the
//! request-id, tracing, and CORS layers, then serves until Ctrl-C.

pub mod config;
pub mod email;
pub mod handlers;
pub mod openapi;
pub mod state;
pub mod storage;
pub mod transcribe;

#[cfg(test)]
pub(crate) mod testing;

pub use config::{Credentials, IntakeConfig};
pub use openapi::openapi;
pub use state::IntakeState;

use crate::{
    flow::client::{
        SEND_VERIFICATION_PATH, STEP1_PATH, STEP2_PATH, TRANSCRIBE_PATH, VERIFY_CODE_PATH,
    },
    token::TokenCodec,
};
use anyhow::{anyhow, Context, Result};
use axum::{
    body::Body,
    extract::MatchedPath,
    http::{header::CONTENT_TYPE, HeaderName, HeaderValue, Method, Request},
    routing::{get, post},
    Extension, Router,
};
use sqlx::postgres::PgPoolOptions;
use std::{sync::Arc, time::Duration};
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    request_id::PropagateRequestIdLayer,
    set_header::SetRequestHeaderLayer,
    trace::TraceLayer,
};
use tracing::{info, info_span, warn, Span};
use ulid::Ulid;
use url::Url;
use utoipa_swagger_ui::SwaggerUi;

/// All routes, documented ones and the Swagger UI.
#[must_use]
pub fn router(state: Arc<IntakeState>) -> Router {
    Router::new()
        .route("/health", get(handlers::health).options(handlers::health))
        .route(STEP1_PATH, post(handlers::submit_step1))
        .route(STEP2_PATH, post(handlers::submit_step2))
        .route(TRANSCRIBE_PATH, post(handlers::transcribe))
        .route(SEND_VERIFICATION_PATH, post(handlers::send_verification))
        .route(VERIFY_CODE_PATH, post(handlers::verify_code))
        .merge(SwaggerUi::new(openapi::DOCS_PATH).url(openapi::SPEC_PATH, openapi()))
        .layer(Extension(state))
}

/// Start the server
/// # Errors
/// Return error if failed to start the server
pub async fn new(
    port: u16,
    dsn: String,
    config: IntakeConfig,
    credentials: Credentials,
) -> Result<()> {
    let pool = PgPoolOptions::new()
        .min_connections(1)
        .max_connections(5)
        .max_lifetime(Duration::from_secs(60 * 2))
        .test_before_acquire(true)
        .connect(&dsn)
        .await
        .context("Failed to connect to database")?;

    let frontend_origin = frontend_origin(config.site_url())?;

    let mut state = IntakeState::new(
        config,
        TokenCodec::new(credentials.token_secret),
        Arc::new(storage::PgLeadStore::new(pool)),
    );

    match credentials.resend_api_key {
        Some(key) => {
            state = state.with_mailer(Arc::new(email::ResendEmailSender::new(key)?));
        }
        None => warn!("No Resend API key configured, emails will only be logged"),
    }

    match credentials.openai_api_key {
        Some(key) => {
            state = state.with_transcriber(Arc::new(transcribe::WhisperTranscriber::new(key)?));
        }
        None => warn!("No OpenAI API key configured, transcription is disabled"),
    }

    let cors = CorsLayer::new()
        .allow_headers([CONTENT_TYPE])
        .allow_methods([Method::GET, Method::POST])
        .allow_origin(AllowOrigin::exact(frontend_origin));

    let app = router(Arc::new(state)).layer(
        ServiceBuilder::new()
            .layer(SetRequestHeaderLayer::if_not_present(
                HeaderName::from_static("x-request-id"),
                |_req: &_| HeaderValue::from_str(Ulid::new().to_string().as_str()).ok(),
            ))
            .layer(PropagateRequestIdLayer::new(HeaderName::from_static(
                "x-request-id",
            )))
            .layer(TraceLayer::new_for_http().make_span_with(make_span))
            .layer(cors),
    );

    let listener = TcpListener::bind(format!("::0:{port}")).await?;

    info!("Listening on [::]:{}", port);

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(async {
            if let Err(err) = tokio::signal::ctrl_c().await {
                warn!("Failed to listen for shutdown signal: {err}");
            }
            info!("Gracefully shutdown");
        })
        .await?;

    Ok(())
}

fn make_span(request: &Request<Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|val| val.to_str().ok())
        .unwrap_or("none");
    let matched_path = request
        .extensions()
        .get::<MatchedPath>()
        .map_or_else(|| request.uri().path(), MatchedPath::as_str);

    info_span!(
        "http.request",
        http.method = %request.method(),
        http.route = matched_path,
        request_id
    )
}

fn frontend_origin(site_url: &str) -> Result<HeaderValue> {
    let parsed = Url::parse(site_url).with_context(|| format!("Invalid site URL: {site_url}"))?;
    let host = parsed
        .host_str()
        .ok_or_else(|| anyhow!("Site URL must include a valid host: {site_url}"))?;
    let port = parsed
        .port()
        .map_or_else(String::new, |port| format!(":{port}"));
    let origin = format!("{}://{}{}", parsed.scheme(), host, port);
    HeaderValue::from_str(&origin).context("Failed to build site origin header")
}
