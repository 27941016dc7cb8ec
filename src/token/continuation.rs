//! Continuation tokens: bind a first-step submission id to an expiry so the
//! second step can be authorized from an emailed link.

use super::{expiry_from, Error, Expiring, TokenCodec};
use serde::{Deserialize, Serialize};

/// Default lifetime of a continuation link.
pub const DEFAULT_TTL_SECONDS: i64 = 7 * 24 * 60 * 60;

/// Query parameter that carries the token in continuation URLs.
pub const QUERY_PARAM: &str = "t";

/// Path of the continuation page on the site.
pub const RESUME_PATH: &str = "/details";

// Field names match links already sent out.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ContinuationClaims {
    #[serde(rename = "step1_id")]
    pub subject_id: String,
    #[serde(rename = "exp")]
    pub expires_at_ms: i64,
}

impl Expiring for ContinuationClaims {
    fn expires_at_ms(&self) -> i64 {
        self.expires_at_ms
    }
}

/// Mint a continuation token for `subject_id`, valid for `ttl_seconds` from `now_ms`.
///
/// # Errors
///
/// Returns an error if the claims cannot be serialized.
pub fn encode(subject_id: &str, ttl_seconds: i64, secret: &[u8], now_ms: i64) -> Result<String, Error> {
    super::seal(&claims(subject_id, ttl_seconds, now_ms), secret)
}

/// Verify a continuation token and return the subject id it was minted for.
///
/// # Errors
///
/// See [`super::open`].
pub fn decode(token: &str, secret: &[u8], now_ms: i64) -> Result<String, Error> {
    super::open::<ContinuationClaims>(token, secret, now_ms).map(|claims| claims.subject_id)
}

fn claims(subject_id: &str, ttl_seconds: i64, now_ms: i64) -> ContinuationClaims {
    ContinuationClaims {
        subject_id: subject_id.to_string(),
        expires_at_ms: expiry_from(now_ms, ttl_seconds),
    }
}

impl TokenCodec {
    /// # Errors
    ///
    /// See [`encode`].
    pub fn encode_continuation(
        &self,
        subject_id: &str,
        ttl_seconds: i64,
        now_ms: i64,
    ) -> Result<String, Error> {
        self.seal(&claims(subject_id, ttl_seconds, now_ms))
    }

    /// # Errors
    ///
    /// See [`decode`].
    pub fn decode_continuation(&self, token: &str, now_ms: i64) -> Result<String, Error> {
        self.open::<ContinuationClaims>(token, now_ms)
            .map(|claims| claims.subject_id)
    }
}

/// Build `<base><resume-path>?t=<token>`.
#[must_use]
pub fn continuation_url(site_url: &str, token: &str) -> String {
    let base = site_url.trim_end_matches('/');
    format!("{base}{RESUME_PATH}?{QUERY_PARAM}={token}")
}

/// Pull the token out of a continuation URL, or accept a bare token.
#[must_use]
pub fn token_from_link(link: &str) -> Option<String> {
    let link = link.trim();
    if link.is_empty() {
        return None;
    }
    match url::Url::parse(link) {
        Ok(parsed) => parsed
            .query_pairs()
            .find(|(key, _)| key == QUERY_PARAM)
            .map(|(_, value)| value.into_owned())
            .filter(|value| !value.is_empty()),
        Err(_) => Some(link.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64ct::{Base64UrlUnpadded, Encoding};

    const NOW: i64 = 1_700_000_000_000;
    const SECRET: &[u8] = b"intake-secret";
    const SUBJECT: &str = "0190f3c2-7d1e-7c55-9a51-2f1d9f0d4a11";

    #[test]
    fn round_trip_before_expiry() -> Result<(), Error> {
        let token = encode(SUBJECT, DEFAULT_TTL_SECONDS, SECRET, NOW)?;
        assert_eq!(decode(&token, SECRET, NOW)?, SUBJECT);
        assert_eq!(
            decode(&token, SECRET, NOW + DEFAULT_TTL_SECONDS * 1000)?,
            SUBJECT
        );
        Ok(())
    }

    #[test]
    fn round_trip_for_many_subjects_and_ttls() -> Result<(), Error> {
        for (subject, ttl) in [("a", 1), ("step-1", 60), (SUBJECT, 3600), ("ü-id", 86_400)] {
            let token = encode(subject, ttl, SECRET, NOW)?;
            assert_eq!(decode(&token, SECRET, NOW + ttl * 1000 - 1)?, subject);
        }
        Ok(())
    }

    #[test]
    fn only_expiry_varies_with_time() -> Result<(), Error> {
        let first = encode(SUBJECT, 60, SECRET, NOW)?;
        let again = encode(SUBJECT, 60, SECRET, NOW)?;
        let later = encode(SUBJECT, 60, SECRET, NOW + 1)?;
        assert_eq!(first, again);
        assert_ne!(first, later);
        Ok(())
    }

    #[test]
    fn negative_ttl_is_expired_immediately() -> Result<(), Error> {
        let token = encode(SUBJECT, -1, SECRET, NOW)?;
        assert_eq!(decode(&token, SECRET, NOW), Err(Error::Expired));
        Ok(())
    }

    #[test]
    fn expired_even_with_valid_signature() -> Result<(), Error> {
        let token = encode(SUBJECT, 60, SECRET, NOW)?;
        assert_eq!(decode(&token, SECRET, NOW + 61_000), Err(Error::Expired));
        Ok(())
    }

    #[test]
    fn every_signature_bit_flip_is_a_mismatch() -> Result<(), Error> {
        let token = encode(SUBJECT, 60, SECRET, NOW)?;
        let (payload, signature) = token.split_once('.').unwrap_or_default();
        let signature = Base64UrlUnpadded::decode_vec(signature).unwrap_or_default();
        assert_eq!(signature.len(), 32);

        for byte in 0..signature.len() {
            for bit in 0..8 {
                let mut flipped = signature.clone();
                flipped[byte] ^= 1 << bit;
                let forged = format!("{payload}.{}", Base64UrlUnpadded::encode_string(&flipped));
                assert_eq!(
                    decode(&forged, SECRET, NOW),
                    Err(Error::SignatureMismatch),
                    "byte {byte} bit {bit}"
                );
            }
        }
        Ok(())
    }

    #[test]
    fn truncated_signature_is_a_mismatch() -> Result<(), Error> {
        let token = encode(SUBJECT, 60, SECRET, NOW)?;
        let truncated = &token[..token.len() - 4];
        assert_eq!(decode(truncated, SECRET, NOW), Err(Error::SignatureMismatch));
        Ok(())
    }

    #[test]
    fn payload_uses_established_field_names() -> Result<(), Error> {
        let token = encode(SUBJECT, 60, SECRET, NOW)?;
        let payload = token.split('.').next().unwrap_or_default();
        let json: serde_json::Value =
            serde_json::from_slice(&Base64UrlUnpadded::decode_vec(payload).unwrap_or_default())
                .unwrap_or_default();
        assert_eq!(json["step1_id"], SUBJECT);
        assert_eq!(json["exp"], NOW + 60_000);
        Ok(())
    }

    #[test]
    fn codec_methods_agree_with_free_functions() -> Result<(), Error> {
        let codec = TokenCodec::new(secrecy::SecretString::from("intake-secret".to_string()));
        let token = codec.encode_continuation(SUBJECT, 60, NOW)?;
        assert_eq!(token, encode(SUBJECT, 60, SECRET, NOW)?);
        assert_eq!(codec.decode_continuation(&token, NOW)?, SUBJECT);
        Ok(())
    }

    #[test]
    fn builds_and_parses_links() {
        let url = continuation_url("https://intake.example.com/", "abc.def");
        assert_eq!(url, "https://intake.example.com/details?t=abc.def");
        assert_eq!(token_from_link(&url).as_deref(), Some("abc.def"));
        assert_eq!(token_from_link(" abc.def ").as_deref(), Some("abc.def"));
        assert_eq!(token_from_link("https://intake.example.com/details"), None);
        assert_eq!(token_from_link(""), None);
    }
}
