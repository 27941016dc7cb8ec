use super::{error_response, non_empty, OkBody, INTERNAL_ERROR, MISSING_PAYLOAD};
use crate::{
    api::{email, IntakeState},
    flow::validate::valid_email,
    token::{
        verification::{generate_code, verification_url, VerifyError},
        Error as TokenError,
    },
};
use axum::{
    extract::Extension,
    http::StatusCode,
    response::{IntoResponse, Json},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, instrument, warn};
use utoipa::ToSchema;

pub const EMAIL_REQUIRED: &str = "Valid email is required";
pub const TOKEN_AND_CODE_REQUIRED: &str = "Token and code are required";
pub const INVALID_TOKEN: &str = "Invalid token";
pub const CODE_EXPIRED: &str = "Code has expired. Please request a new one.";
pub const CODE_MISMATCH: &str = "Invalid code. Please try again.";

#[derive(ToSchema, Serialize, Deserialize, Debug, Default)]
#[serde(default)]
pub struct SendVerificationRequest {
    email: Option<String>,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct SendVerificationResponse {
    ok: bool,
    token: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug, Default)]
#[serde(default)]
pub struct VerifyCodeRequest {
    token: Option<String>,
    code: Option<String>,
}

#[utoipa::path(
    post,
    path= "/v1/verification/send",
    request_body = SendVerificationRequest,
    responses (
        (status = 200, description = "Code emailed; the token binds it", body = SendVerificationResponse, content_type = "application/json"),
        (status = 400, description = "Invalid email", body = super::ErrorBody),
    ),
    tag= "verification"
)]
#[instrument(skip(state, payload))]
pub async fn send_verification(
    state: Extension<Arc<IntakeState>>,
    payload: Option<Json<SendVerificationRequest>>,
) -> impl IntoResponse {
    let request: SendVerificationRequest = match payload {
        Some(Json(payload)) => payload,
        None => return error_response(StatusCode::BAD_REQUEST, MISSING_PAYLOAD),
    };

    let email = request.email.as_deref().unwrap_or_default();
    if !valid_email(email) {
        return error_response(StatusCode::BAD_REQUEST, EMAIL_REQUIRED);
    }

    let config = state.config();
    let code = generate_code();
    let token = match state.codec().issue_verification(
        email,
        &code,
        config.verification_ttl_seconds(),
        config.token_mode(),
        state.now_ms(),
    ) {
        Ok(token) => token,
        Err(err) => {
            error!("Error issuing verification token: {err}");
            return error_response(StatusCode::INTERNAL_SERVER_ERROR, INTERNAL_ERROR);
        }
    };

    let link = verification_url(config.site_url(), &token);
    let message = email::verification_email(email, &code, &link);
    if let Err(err) = state.mailer().send(config.email_from(), &message).await {
        error!("Failed to send verification email: {err:#}");
    }

    (
        StatusCode::OK,
        Json(SendVerificationResponse { ok: true, token }),
    )
        .into_response()
}

#[utoipa::path(
    post,
    path= "/v1/verification/verify",
    request_body = VerifyCodeRequest,
    responses (
        (status = 200, description = "Code accepted", body = OkBody, content_type = "application/json"),
        (status = 400, description = "Missing field, invalid or expired token, or wrong code", body = super::ErrorBody),
    ),
    tag= "verification"
)]
#[instrument(skip(state, payload))]
pub async fn verify_code(
    state: Extension<Arc<IntakeState>>,
    payload: Option<Json<VerifyCodeRequest>>,
) -> impl IntoResponse {
    let request: VerifyCodeRequest = match payload {
        Some(Json(payload)) => payload,
        None => return error_response(StatusCode::BAD_REQUEST, MISSING_PAYLOAD),
    };

    let (Some(token), Some(code)) = (
        non_empty(request.token.as_deref()),
        non_empty(request.code.as_deref()),
    ) else {
        return error_response(StatusCode::BAD_REQUEST, TOKEN_AND_CODE_REQUIRED);
    };

    let mode = state.config().token_mode();
    match state.codec().verify_code(&token, &code, mode, state.now_ms()) {
        Ok(email) => {
            info!(%email, "email verified");
            (StatusCode::OK, Json(OkBody { ok: true })).into_response()
        }
        Err(VerifyError::Token(TokenError::Expired)) => {
            error_response(StatusCode::BAD_REQUEST, CODE_EXPIRED)
        }
        Err(VerifyError::Token(err)) => {
            warn!(reason = err.reason(), "rejected verification token");
            error_response(StatusCode::BAD_REQUEST, INVALID_TOKEN)
        }
        Err(VerifyError::CodeMismatch) => error_response(StatusCode::BAD_REQUEST, CODE_MISMATCH),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        api::{
            handlers::ErrorBody,
            router,
            testing::{Fixture, NOW, SITE},
        },
        token::verification::{TokenMode, VerificationClaims},
    };
    use anyhow::Result;
    use axum::{
        body::{to_bytes, Body},
        http::{header::CONTENT_TYPE, Request},
        Router,
    };
    use serde_json::{json, Value};
    use tower::ServiceExt;

    async fn post(app: Router, path: &str, body: &Value) -> Result<(StatusCode, Value)> {
        let response = app
            .oneshot(
                Request::post(path)
                    .header(CONTENT_TYPE, "application/json")
                    .body(Body::from(serde_json::to_vec(body)?))?,
            )
            .await?;
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await?;
        Ok((status, serde_json::from_slice(&bytes)?))
    }

    fn error(message: &str) -> Value {
        json!(ErrorBody {
            error: message.to_string()
        })
    }

    /// Pull the code out of the emailed HTML; it is the only 6-digit run.
    fn emailed_code(html: &str) -> Option<String> {
        regex::Regex::new(r"\b(\d{6})\b")
            .ok()?
            .captures(html)
            .map(|caps| caps[1].to_string())
    }

    #[tokio::test]
    async fn send_then_verify() -> Result<()> {
        let fixture = Fixture::new();
        let (status, body) = post(
            router(fixture.state()),
            "/v1/verification/send",
            &json!({ "email": "a@b.com" }),
        )
        .await?;
        assert_eq!(status, StatusCode::OK);
        let token = body["token"].as_str().unwrap_or_default().to_string();

        let sent = fixture.mailer.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].link, format!("{SITE}/verify?token={token}"));
        let code = emailed_code(&sent[0].html).unwrap_or_default();
        assert!(!token.contains(&code));

        let (status, body) = post(
            router(fixture.state()),
            "/v1/verification/verify",
            &json!({ "token": token, "code": "000000" }),
        )
        .await?;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body, error(CODE_MISMATCH));

        let (status, body) = post(
            router(fixture.state()),
            "/v1/verification/verify",
            &json!({ "token": token, "code": code }),
        )
        .await?;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({ "ok": true }));
        Ok(())
    }

    #[tokio::test]
    async fn send_requires_valid_email() -> Result<()> {
        let fixture = Fixture::new();
        let (status, body) = post(
            router(fixture.state()),
            "/v1/verification/send",
            &json!({ "email": "nope" }),
        )
        .await?;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body, error(EMAIL_REQUIRED));
        assert!(fixture.mailer.sent().is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn verify_reports_each_failure() -> Result<()> {
        let fixture = Fixture::new();
        let codec = Fixture::codec();
        let expired =
            codec.issue_verification("a@b.com", "123456", -1, TokenMode::Signed, NOW)?;
        let unsigned =
            codec.issue_verification("a@b.com", "123456", 600, TokenMode::Unsigned, NOW)?;

        let cases = [
            (json!({ "token": "t" }), TOKEN_AND_CODE_REQUIRED),
            (json!({ "token": expired, "code": "123456" }), CODE_EXPIRED),
            (json!({ "token": unsigned, "code": "123456" }), INVALID_TOKEN),
            (json!({ "token": "garbage", "code": "123456" }), INVALID_TOKEN),
        ];
        for (request, message) in cases {
            let (status, body) =
                post(router(fixture.state()), "/v1/verification/verify", &request).await?;
            assert_eq!(status, StatusCode::BAD_REQUEST);
            assert_eq!(body, error(message));
        }
        Ok(())
    }

    #[tokio::test]
    async fn unsigned_mode_is_opt_in() -> Result<()> {
        let mut fixture = Fixture::new();
        fixture.config = fixture.config.clone().with_token_mode(TokenMode::Unsigned);
        let (status, body) = post(
            router(fixture.state()),
            "/v1/verification/send",
            &json!({ "email": "a@b.com" }),
        )
        .await?;
        assert_eq!(status, StatusCode::OK);

        let token = body["token"].as_str().unwrap_or_default();
        assert!(!token.contains('.'));
        let claims: VerificationClaims = crate::token::open_unsigned(token, NOW)?;
        assert_eq!(claims.email, "a@b.com");
        Ok(())
    }
}
