//! Route handlers and the helpers they share.

pub mod health;
pub mod intake;
pub mod verification;

pub use self::health::health;
pub use self::intake::{submit_step1, submit_step2, transcribe};
pub use self::verification::{send_verification, verify_code};

use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

pub const MISSING_PAYLOAD: &str = "Missing payload";
pub const SAVE_FAILED: &str = "Failed to save data";
pub const INTERNAL_ERROR: &str = "Internal server error";

/// Every error response has this shape.
#[derive(ToSchema, Serialize, Deserialize, Debug, PartialEq, Eq)]
pub struct ErrorBody {
    pub error: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug, PartialEq, Eq)]
pub struct OkBody {
    pub ok: bool,
}

pub fn error_response(status: StatusCode, message: &str) -> Response {
    (
        status,
        Json(ErrorBody {
            error: message.to_string(),
        }),
    )
        .into_response()
}

/// Trimmed value, with blank strings treated as absent.
fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(ToString::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_values_are_absent() {
        assert_eq!(non_empty(None), None);
        assert_eq!(non_empty(Some("   ")), None);
        assert_eq!(non_empty(Some(" meta ")), Some("meta".to_string()));
    }
}
