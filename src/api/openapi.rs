use super::handlers::{self, health, intake, verification};
use utoipa::{
    openapi::{Contact, InfoBuilder, License},
    OpenApi,
};

pub const DOCS_PATH: &str = "/docs";
pub const SPEC_PATH: &str = "/api-docs/openapi.json";

#[derive(OpenApi)]
#[openapi(
    paths(
        health::health,
        intake::submit_step1,
        intake::submit_step2,
        intake::transcribe,
        verification::send_verification,
        verification::verify_code,
    ),
    components(schemas(
        handlers::ErrorBody,
        handlers::OkBody,
        health::Health,
        intake::Step1Request,
        intake::Step1Response,
        intake::Step2Request,
        intake::Step2Response,
        intake::TranscribeRequest,
        intake::TranscribeResponse,
        verification::SendVerificationRequest,
        verification::SendVerificationResponse,
        verification::VerifyCodeRequest,
    )),
    tags(
        (name = "health", description = "Liveness and datastore status"),
        (name = "intake", description = "Lead intake and continuation"),
        (name = "verification", description = "Email verification codes"),
    )
)]
struct ApiDoc;

/// The `OpenAPI` document, with its info block taken from Cargo metadata.
#[must_use]
pub fn openapi() -> utoipa::openapi::OpenApi {
    let mut doc = ApiDoc::openapi();

    let mut info = InfoBuilder::new()
        .title(env!("CARGO_PKG_NAME"))
        .version(env!("CARGO_PKG_VERSION"))
        .description(optional_str(env!("CARGO_PKG_DESCRIPTION")))
        .build();
    info.contact = cargo_contact();
    info.license = cargo_license();
    doc.info = info;

    doc
}

fn cargo_contact() -> Option<Contact> {
    // Cargo authors are `:` separated and may include "Name <email>".
    let primary = env!("CARGO_PKG_AUTHORS").split(':').next().map(str::trim)?;
    let (name, email) = parse_author(primary);
    if name.is_none() && email.is_none() {
        return None;
    }

    let mut contact = Contact::new();
    contact.name = name.map(str::to_string);
    contact.email = email.map(str::to_string);
    Some(contact)
}

fn cargo_license() -> Option<License> {
    let identifier = optional_str(env!("CARGO_PKG_LICENSE"))?;
    let mut license = License::new(identifier);
    license.identifier = Some(identifier.to_string());
    Some(license)
}

fn optional_str(value: &'static str) -> Option<&'static str> {
    Some(value.trim()).filter(|trimmed| !trimmed.is_empty())
}

fn parse_author(author: &str) -> (Option<&str>, Option<&str>) {
    let (name, email) = match author.split_once('<') {
        Some((name, rest)) => (name, Some(rest.trim_end_matches('>'))),
        None => (author, None),
    };
    let name = Some(name.trim()).filter(|n| !n.is_empty());
    let email = email.map(str::trim).filter(|e| !e.is_empty());
    (name, email)
}
