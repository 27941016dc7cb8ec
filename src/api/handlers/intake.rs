use super::{error_response, non_empty, MISSING_PAYLOAD, SAVE_FAILED};
use crate::{
    api::{
        email,
        storage::{DetailsRecord, LeadRecord},
        transcribe::{audio_path, mime_extension},
        IntakeState,
    },
    flow::validate::{valid_email, EMAIL_INVALID},
    token::{self, continuation::continuation_url, INVALID_LINK_MESSAGE},
};
use axum::{
    extract::Extension,
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use base64ct::{Base64, Encoding};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;

pub const TOKEN_REQUIRED: &str = "Token is required";
pub const COMPANY_REQUIRED: &str = "Company is required";
pub const DESCRIPTION_REQUIRED: &str = "Description is required";
pub const INTAKE_NOT_FOUND: &str = "Invalid token - intake not found";
pub const AUDIO_FIELDS_REQUIRED: &str = "token, audio_base64, and audio_mime are required";
pub const AUDIO_INVALID: &str = "Invalid audio_base64";
pub const AUDIO_STORE_FAILED: &str = "Failed to store audio";
pub const TRANSCRIPTION_FAILED: &str = "Transcription failed";

#[derive(ToSchema, Serialize, Deserialize, Debug, Default)]
#[serde(default)]
pub struct Step1Request {
    email: Option<String>,
    call_types: Vec<String>,
    avoided_call_text: Option<String>,
    company: Option<String>,
    description_text: Option<String>,
    utm_source: Option<String>,
    utm_campaign: Option<String>,
    utm_adset: Option<String>,
    utm_ad: Option<String>,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct Step1Response {
    ok: bool,
    id: Uuid,
    token: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug, Default)]
#[serde(default)]
pub struct Step2Request {
    token: Option<String>,
    company: Option<String>,
    description_text: Option<String>,
    audio_path: Option<String>,
    transcript_text: Option<String>,
    phone: Option<String>,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct Step2Response {
    ok: bool,
    id: Uuid,
}

#[derive(ToSchema, Serialize, Deserialize, Debug, Default)]
#[serde(default)]
pub struct TranscribeRequest {
    token: Option<String>,
    audio_base64: Option<String>,
    audio_mime: Option<String>,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct TranscribeResponse {
    transcript_text: String,
    audio_path: String,
}

/// Decode a continuation token, mapping every failure to the generic 401.
fn authorize(state: &IntakeState, token: &str) -> Result<String, Response> {
    state
        .codec()
        .decode_continuation(token, state.now_ms())
        .map_err(|err: token::Error| {
            warn!(reason = err.reason(), "rejected continuation token");
            error_response(StatusCode::UNAUTHORIZED, INVALID_LINK_MESSAGE)
        })
}

#[utoipa::path(
    post,
    path= "/v1/intake/step1",
    request_body = Step1Request,
    responses (
        (status = 200, description = "Lead stored and continuation link sent", body = Step1Response, content_type = "application/json"),
        (status = 400, description = "Invalid email", body = super::ErrorBody),
        (status = 500, description = "Lead could not be stored", body = super::ErrorBody),
    ),
    tag= "intake"
)]
#[instrument(skip(state, payload))]
pub async fn submit_step1(
    state: Extension<Arc<IntakeState>>,
    payload: Option<Json<Step1Request>>,
) -> impl IntoResponse {
    let request: Step1Request = match payload {
        Some(Json(payload)) => payload,
        None => return error_response(StatusCode::BAD_REQUEST, MISSING_PAYLOAD),
    };

    let email = request.email.as_deref().unwrap_or_default();
    if !valid_email(email) {
        return error_response(StatusCode::BAD_REQUEST, EMAIL_INVALID);
    }

    let record = LeadRecord {
        email: email.to_string(),
        call_types: request.call_types,
        avoided_call_text: non_empty(request.avoided_call_text.as_deref()),
        company: non_empty(request.company.as_deref()),
        description_text: non_empty(request.description_text.as_deref()),
        utm_source: non_empty(request.utm_source.as_deref()),
        utm_campaign: non_empty(request.utm_campaign.as_deref()),
        utm_adset: non_empty(request.utm_adset.as_deref()),
        utm_ad: non_empty(request.utm_ad.as_deref()),
    };

    let id = match state.leads().insert_lead(&record).await {
        Ok(id) => id,
        Err(err) => {
            error!("Error inserting lead: {err:#}");
            return error_response(StatusCode::INTERNAL_SERVER_ERROR, SAVE_FAILED);
        }
    };

    let config = state.config();
    let token = match state.codec().encode_continuation(
        &id.to_string(),
        config.continuation_ttl_seconds(),
        state.now_ms(),
    ) {
        Ok(token) => token,
        Err(err) => {
            error!("Error minting continuation token: {err}");
            return error_response(StatusCode::INTERNAL_SERVER_ERROR, super::INTERNAL_ERROR);
        }
    };

    let link = continuation_url(config.site_url(), &token);
    let message = email::continuation_email(email, &link);
    if let Err(err) = state.mailer().send(config.email_from(), &message).await {
        error!("Failed to send continuation email: {err:#}");
    }

    info!(%id, "stored first-step lead");
    (
        StatusCode::OK,
        Json(Step1Response {
            ok: true,
            id,
            token,
        }),
    )
        .into_response()
}

#[utoipa::path(
    post,
    path= "/v1/intake/step2",
    request_body = Step2Request,
    responses (
        (status = 200, description = "Details stored", body = Step2Response, content_type = "application/json"),
        (status = 400, description = "Missing or blank field, or unknown intake", body = super::ErrorBody),
        (status = 401, description = "Continuation token invalid or expired", body = super::ErrorBody),
        (status = 500, description = "Details could not be stored", body = super::ErrorBody),
    ),
    tag= "intake"
)]
#[instrument(skip(state, payload))]
pub async fn submit_step2(
    state: Extension<Arc<IntakeState>>,
    payload: Option<Json<Step2Request>>,
) -> impl IntoResponse {
    let request: Step2Request = match payload {
        Some(Json(payload)) => payload,
        None => return error_response(StatusCode::BAD_REQUEST, MISSING_PAYLOAD),
    };

    let Some(token) = non_empty(request.token.as_deref()) else {
        return error_response(StatusCode::BAD_REQUEST, TOKEN_REQUIRED);
    };
    let Some(company) = non_empty(request.company.as_deref()) else {
        return error_response(StatusCode::BAD_REQUEST, COMPANY_REQUIRED);
    };
    let Some(description) = non_empty(request.description_text.as_deref()) else {
        return error_response(StatusCode::BAD_REQUEST, DESCRIPTION_REQUIRED);
    };

    let subject = match authorize(&state, &token) {
        Ok(subject) => subject,
        Err(response) => return response,
    };

    let Ok(step1_id) = Uuid::parse_str(&subject) else {
        warn!(%subject, "continuation token does not name a lead");
        return error_response(StatusCode::BAD_REQUEST, INTAKE_NOT_FOUND);
    };

    match state.leads().lead_exists(step1_id).await {
        Ok(true) => (),
        Ok(false) => return error_response(StatusCode::BAD_REQUEST, INTAKE_NOT_FOUND),
        Err(err) => {
            error!("Error looking up lead: {err:#}");
            return error_response(StatusCode::INTERNAL_SERVER_ERROR, SAVE_FAILED);
        }
    }

    let record = DetailsRecord {
        step1_id,
        company,
        description_text: description,
        audio_path: non_empty(request.audio_path.as_deref()),
        transcript_text: non_empty(request.transcript_text.as_deref()),
        phone: non_empty(request.phone.as_deref()),
    };

    match state.leads().insert_details(&record).await {
        Ok(id) => {
            info!(%id, %step1_id, "stored second-step details");
            (StatusCode::OK, Json(Step2Response { ok: true, id })).into_response()
        }
        Err(err) => {
            error!("Error inserting details: {err:#}");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, SAVE_FAILED)
        }
    }
}

#[utoipa::path(
    post,
    path= "/v1/intake/transcribe",
    request_body = TranscribeRequest,
    responses (
        (status = 200, description = "Audio stored and transcribed", body = TranscribeResponse, content_type = "application/json"),
        (status = 400, description = "Missing field or undecodable audio", body = super::ErrorBody),
        (status = 401, description = "Continuation token invalid or expired", body = super::ErrorBody),
        (status = 500, description = "Storage or transcription failed", body = super::ErrorBody),
    ),
    tag= "intake"
)]
#[instrument(skip(state, payload))]
pub async fn transcribe(
    state: Extension<Arc<IntakeState>>,
    payload: Option<Json<TranscribeRequest>>,
) -> impl IntoResponse {
    let request: TranscribeRequest = match payload {
        Some(Json(payload)) => payload,
        None => return error_response(StatusCode::BAD_REQUEST, MISSING_PAYLOAD),
    };

    let (Some(token), Some(audio_base64), Some(mime)) = (
        non_empty(request.token.as_deref()),
        non_empty(request.audio_base64.as_deref()),
        non_empty(request.audio_mime.as_deref()),
    ) else {
        return error_response(StatusCode::BAD_REQUEST, AUDIO_FIELDS_REQUIRED);
    };

    let subject = match authorize(&state, &token) {
        Ok(subject) => subject,
        Err(response) => return response,
    };

    let Ok(audio) = Base64::decode_vec(&audio_base64) else {
        return error_response(StatusCode::BAD_REQUEST, AUDIO_INVALID);
    };

    let extension = mime_extension(&mime);
    let path = audio_path(&subject, state.now_ms(), extension);

    if let Err(err) = state.audio().put(&path, &audio, &mime).await {
        error!("Storage upload error: {err:#}");
        return error_response(StatusCode::INTERNAL_SERVER_ERROR, AUDIO_STORE_FAILED);
    }

    let Some(transcriber) = state.transcriber() else {
        error!("No transcription API key is configured");
        return error_response(StatusCode::INTERNAL_SERVER_ERROR, TRANSCRIPTION_FAILED);
    };

    match transcriber.transcribe(audio, &mime, extension).await {
        Ok(transcript_text) => (
            StatusCode::OK,
            Json(TranscribeResponse {
                transcript_text,
                audio_path: path,
            }),
        )
            .into_response(),
        Err(err) => {
            error!("Transcription error: {err:#}");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, TRANSCRIPTION_FAILED)
        }
    }
}
