//! Stateless bearer tokens for links that travel through email.
//!
//! A signed token is `base64url(json(claims)) "." base64url(hmac_sha256(json(claims), secret))`.
//! Decoding checks, in order: shape, signature (constant time), payload JSON,
//! expiry. Nothing is stored server-side, so a token can only be revoked early by
//! rotating the secret, which revokes all of them.
//!
//! The unsigned form drops the signature segment. It exists only for the
//! verification-code path and only when explicitly configured, see
//! [`verification::TokenMode`].

pub mod continuation;
pub mod verification;

use base64ct::{Base64UrlUnpadded, Encoding};
use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use serde::{de::DeserializeOwned, Serialize};
use sha2::Sha256;
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};
use subtle::ConstantTimeEq;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

const SEPARATOR: char = '.';

/// Shown to end users for every token failure; the precise reason is logged only.
pub const INVALID_LINK_MESSAGE: &str =
    "This link is invalid or has expired. Please start from the beginning.";

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    #[error("malformed token")]
    MalformedToken,
    #[error("signature mismatch")]
    SignatureMismatch,
    #[error("token expired")]
    Expired,
    #[error("invalid signing key")]
    InvalidKey,
}

impl Error {
    /// Short label for structured logs.
    #[must_use]
    pub const fn reason(self) -> &'static str {
        match self {
            Self::MalformedToken => "malformed",
            Self::SignatureMismatch => "signature_mismatch",
            Self::Expired => "expired",
            Self::InvalidKey => "invalid_key",
        }
    }
}

/// Claims that carry an absolute expiry in unix milliseconds.
pub trait Expiring {
    fn expires_at_ms(&self) -> i64;
}

/// Source of "now" for expiry checks, injected so tests can move time.
pub trait Clock: Send + Sync + fmt::Debug {
    fn now_ms(&self) -> i64;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |elapsed| {
                i64::try_from(elapsed.as_millis()).unwrap_or(i64::MAX)
            })
    }
}

/// A clock frozen at a given instant.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub i64);

impl Clock for FixedClock {
    fn now_ms(&self) -> i64 {
        self.0
    }
}

/// `now + ttl`, saturating so absurd TTLs cannot wrap around into the past.
#[must_use]
pub fn expiry_from(now_ms: i64, ttl_seconds: i64) -> i64 {
    now_ms.saturating_add(ttl_seconds.saturating_mul(1000))
}

fn sign(payload: &[u8], secret: &[u8]) -> Result<Vec<u8>, Error> {
    let mut mac = HmacSha256::new_from_slice(secret).map_err(|_| Error::InvalidKey)?;
    mac.update(payload);
    Ok(mac.finalize().into_bytes().to_vec())
}

fn encode_claims<T: Serialize>(claims: &T) -> Result<(Vec<u8>, String), Error> {
    let json = serde_json::to_vec(claims).map_err(|_| Error::MalformedToken)?;
    let encoded = Base64UrlUnpadded::encode_string(&json);
    Ok((json, encoded))
}

fn check_expiry<T: Expiring>(claims: T, now_ms: i64) -> Result<T, Error> {
    if claims.expires_at_ms() < now_ms {
        return Err(Error::Expired);
    }
    Ok(claims)
}

/// Produce a signed token for `claims`.
///
/// # Errors
///
/// Returns an error if the claims cannot be serialized.
pub fn seal<T: Serialize>(claims: &T, secret: &[u8]) -> Result<String, Error> {
    let (json, payload_b64) = encode_claims(claims)?;
    let signature = sign(&json, secret)?;
    let signature_b64 = Base64UrlUnpadded::encode_string(&signature);

    Ok(format!("{payload_b64}{SEPARATOR}{signature_b64}"))
}

/// Verify a signed token and return its claims.
///
/// # Errors
///
/// - [`Error::MalformedToken`] unless the token is exactly two non-empty segments
///   and the payload segment is base64url JSON of the expected shape,
/// - [`Error::SignatureMismatch`] if the signature segment does not authenticate
///   the payload (including when it is not valid base64url),
/// - [`Error::Expired`] if the claims expired before `now_ms`.
pub fn open<T: DeserializeOwned + Expiring>(
    token: &str,
    secret: &[u8],
    now_ms: i64,
) -> Result<T, Error> {
    let mut parts = token.split(SEPARATOR);
    let payload_b64 = parts.next().filter(|s| !s.is_empty());
    let signature_b64 = parts.next().filter(|s| !s.is_empty());
    let (Some(payload_b64), Some(signature_b64), None) = (payload_b64, signature_b64, parts.next())
    else {
        return Err(Error::MalformedToken);
    };

    let payload = Base64UrlUnpadded::decode_vec(payload_b64).map_err(|_| Error::MalformedToken)?;

    let expected = sign(&payload, secret)?;
    let supplied =
        Base64UrlUnpadded::decode_vec(signature_b64).map_err(|_| Error::SignatureMismatch)?;
    if !bool::from(expected.as_slice().ct_eq(supplied.as_slice())) {
        return Err(Error::SignatureMismatch);
    }

    let claims: T = serde_json::from_slice(&payload).map_err(|_| Error::MalformedToken)?;
    check_expiry(claims, now_ms)
}

/// Produce an unsigned token. Anyone holding it can forge a new one.
///
/// # Errors
///
/// Returns an error if the claims cannot be serialized.
pub fn seal_unsigned<T: Serialize>(claims: &T) -> Result<String, Error> {
    encode_claims(claims).map(|(_, encoded)| encoded)
}

/// Decode an unsigned token; only shape and expiry are checked.
///
/// # Errors
///
/// Returns [`Error::MalformedToken`] or [`Error::Expired`].
pub fn open_unsigned<T: DeserializeOwned + Expiring>(token: &str, now_ms: i64) -> Result<T, Error> {
    if token.is_empty() || token.contains(SEPARATOR) {
        return Err(Error::MalformedToken);
    }
    let payload = Base64UrlUnpadded::decode_vec(token).map_err(|_| Error::MalformedToken)?;
    let claims: T = serde_json::from_slice(&payload).map_err(|_| Error::MalformedToken)?;
    check_expiry(claims, now_ms)
}

/// Read the claims of a signed token without checking its signature.
///
/// Only for clients that need to decide what to render before calling the
/// server; the server must always use [`open`].
///
/// # Errors
///
/// Returns [`Error::MalformedToken`] or [`Error::Expired`].
pub fn inspect<T: DeserializeOwned + Expiring>(token: &str, now_ms: i64) -> Result<T, Error> {
    let mut parts = token.split(SEPARATOR);
    let payload_b64 = parts.next().filter(|s| !s.is_empty());
    let (Some(payload_b64), Some(_), None) = (payload_b64, parts.next(), parts.next()) else {
        return Err(Error::MalformedToken);
    };
    let payload = Base64UrlUnpadded::decode_vec(payload_b64).map_err(|_| Error::MalformedToken)?;
    let claims: T = serde_json::from_slice(&payload).map_err(|_| Error::MalformedToken)?;
    check_expiry(claims, now_ms)
}

/// Server-side holder of the signing secret.
#[derive(Clone)]
pub struct TokenCodec {
    secret: SecretString,
}

impl fmt::Debug for TokenCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenCodec").finish_non_exhaustive()
    }
}

impl TokenCodec {
    #[must_use]
    pub fn new(secret: SecretString) -> Self {
        Self { secret }
    }

    /// # Errors
    ///
    /// See [`seal`].
    pub fn seal<T: Serialize>(&self, claims: &T) -> Result<String, Error> {
        seal(claims, self.secret.expose_secret().as_bytes())
    }

    /// # Errors
    ///
    /// See [`open`].
    pub fn open<T: DeserializeOwned + Expiring>(&self, token: &str, now_ms: i64) -> Result<T, Error> {
        open(token, self.secret.expose_secret().as_bytes(), now_ms)
    }
}
