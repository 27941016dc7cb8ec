//! Email verification codes.
//!
//! A 6-digit code is emailed to the user; the browser keeps a token that binds
//! the address, an HMAC of the address and code under the server secret, and an
//! expiry. The token is signed by
//! default. [`TokenMode::Unsigned`] reproduces the legacy unsigned links and is
//! only accepted when explicitly configured.

use super::{
    expiry_from, open, open_unsigned, seal, seal_unsigned, sign, Error, Expiring, TokenCodec,
};
use rand::Rng;
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};
use subtle::ConstantTimeEq;

pub const DEFAULT_TTL_SECONDS: i64 = 10 * 60;

/// Path of the verification page on the site.
pub const VERIFY_PATH: &str = "/verify";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TokenMode {
    #[default]
    Signed,
    Unsigned,
}

impl TokenMode {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Signed => "signed",
            Self::Unsigned => "unsigned",
        }
    }
}

impl fmt::Display for TokenMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TokenMode {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "signed" => Ok(Self::Signed),
            "unsigned" => Ok(Self::Unsigned),
            other => Err(format!("invalid verification token mode: {other}")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct VerificationClaims {
    pub email: String,
    pub code_hash: String,
    pub exp: i64,
}

impl Expiring for VerificationClaims {
    fn expires_at_ms(&self) -> i64 {
        self.exp
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerifyError {
    Token(Error),
    CodeMismatch,
}

/// Random code in `100000..=999999`.
#[must_use]
pub fn generate_code() -> String {
    rand::thread_rng().gen_range(100_000..=999_999).to_string()
}

/// Keyed digest of `email` and `code`. Without the secret the code cannot be
/// recovered from a token, signed or not.
///
/// # Errors
///
/// Returns [`Error::InvalidKey`] if the secret is rejected by the MAC.
pub fn hash_code(email: &str, code: &str, secret: &[u8]) -> Result<String, Error> {
    let mut message = Vec::with_capacity(email.len() + code.len() + 1);
    message.extend_from_slice(email.as_bytes());
    message.push(0);
    message.extend_from_slice(code.trim().as_bytes());
    let digest = sign(&message, secret)?;
    Ok(digest.iter().map(|byte| format!("{byte:02x}")).collect())
}

/// Issue a verification token for `email` and `code`.
///
/// # Errors
///
/// Returns an error if the claims cannot be serialized.
pub fn issue(
    email: &str,
    code: &str,
    ttl_seconds: i64,
    mode: TokenMode,
    secret: &[u8],
    now_ms: i64,
) -> Result<String, Error> {
    let claims = VerificationClaims {
        email: email.to_string(),
        code_hash: hash_code(email, code, secret)?,
        exp: expiry_from(now_ms, ttl_seconds),
    };
    match mode {
        TokenMode::Signed => seal(&claims, secret),
        TokenMode::Unsigned => seal_unsigned(&claims),
    }
}

/// Check `code` against a verification token and return the verified email.
///
/// # Errors
///
/// [`VerifyError::Token`] if the token is malformed, forged, or expired;
/// [`VerifyError::CodeMismatch`] if the code does not match.
pub fn verify(
    token: &str,
    code: &str,
    mode: TokenMode,
    secret: &[u8],
    now_ms: i64,
) -> Result<String, VerifyError> {
    let claims: VerificationClaims = match mode {
        TokenMode::Signed => open(token, secret, now_ms),
        TokenMode::Unsigned => open_unsigned(token, now_ms),
    }
    .map_err(VerifyError::Token)?;
    matches_code(&claims, code, secret)
}

impl TokenCodec {
    /// # Errors
    ///
    /// See [`issue`].
    pub fn issue_verification(
        &self,
        email: &str,
        code: &str,
        ttl_seconds: i64,
        mode: TokenMode,
        now_ms: i64,
    ) -> Result<String, Error> {
        issue(email, code, ttl_seconds, mode, self.secret_bytes(), now_ms)
    }

    /// # Errors
    ///
    /// See [`verify`].
    pub fn verify_code(
        &self,
        token: &str,
        code: &str,
        mode: TokenMode,
        now_ms: i64,
    ) -> Result<String, VerifyError> {
        verify(token, code, mode, self.secret_bytes(), now_ms)
    }

    fn secret_bytes(&self) -> &[u8] {
        self.secret.expose_secret().as_bytes()
    }
}

fn matches_code(
    claims: &VerificationClaims,
    code: &str,
    secret: &[u8],
) -> Result<String, VerifyError> {
    let supplied = hash_code(&claims.email, code, secret).map_err(VerifyError::Token)?;
    if bool::from(supplied.as_bytes().ct_eq(claims.code_hash.as_bytes())) {
        Ok(claims.email.clone())
    } else {
        Err(VerifyError::CodeMismatch)
    }
}

#[must_use]
pub fn verification_url(site_url: &str, token: &str) -> String {
    let base = site_url.trim_end_matches('/');
    format!("{base}{VERIFY_PATH}?token={token}")
}

#[cfg(test)]
mod tests {
    use super::*;

    const NOW: i64 = 1_700_000_000_000;
    const SECRET: &[u8] = b"verification-secret";

    #[test]
    fn generated_codes_are_six_digits() {
        for _ in 0..100 {
            let code = generate_code();
            assert_eq!(code.len(), 6);
            assert!(code.chars().all(|c| c.is_ascii_digit()));
            assert!(!code.starts_with('0'));
        }
    }

    #[test]
    fn code_cannot_be_recovered_without_secret() -> Result<(), Error> {
        let token = issue("a@b.com", "482913", 600, TokenMode::Unsigned, SECRET, NOW)?;
        let claims: VerificationClaims = open_unsigned(&token, NOW)?;

        let unkeyed = |code: u32| -> String {
            use sha2::{Digest, Sha256};
            Sha256::digest(code.to_string().as_bytes())
                .iter()
                .map(|byte| format!("{byte:02x}"))
                .collect()
        };
        assert!((100_000..=999_999).all(|code| unkeyed(code) != claims.code_hash));

        let guess = |secret: &[u8]| -> Result<Option<u32>, Error> {
            for code in 482_900..=482_920 {
                if hash_code("a@b.com", &code.to_string(), secret)? == claims.code_hash {
                    return Ok(Some(code));
                }
            }
            Ok(None)
        };
        assert_eq!(guess(b"another-secret")?, None);
        assert_eq!(guess(SECRET)?, Some(482_913));
        Ok(())
    }

    #[test]
    fn hash_is_bound_to_email() -> Result<(), Error> {
        assert_ne!(
            hash_code("a@b.com", "482913", SECRET)?,
            hash_code("c@d.com", "482913", SECRET)?
        );
        assert_eq!(
            hash_code("a@b.com", " 482913 ", SECRET)?,
            hash_code("a@b.com", "482913", SECRET)?
        );
        Ok(())
    }

    #[test]
    fn unsigned_token_rejects_other_secret() -> Result<(), Error> {
        let token = issue("a@b.com", "482913", 600, TokenMode::Unsigned, SECRET, NOW)?;
        assert_eq!(
            verify(&token, "482913", TokenMode::Unsigned, b"another-secret", NOW),
            Err(VerifyError::CodeMismatch)
        );
        Ok(())
    }

    #[test]
    fn signed_accepts_right_code() -> Result<(), Error> {
        let token = issue("a@b.com", "482913", 600, TokenMode::Signed, SECRET, NOW)?;
        assert_eq!(
            verify(&token, "482913", TokenMode::Signed, SECRET, NOW),
            Ok("a@b.com".to_string())
        );
        assert_eq!(
            verify(&token, " 482913 ", TokenMode::Signed, SECRET, NOW),
            Ok("a@b.com".to_string())
        );
        Ok(())
    }

    #[test]
    fn signed_rejects_wrong_code_expiry_and_forgery() -> Result<(), Error> {
        let token = issue("a@b.com", "482913", 600, TokenMode::Signed, SECRET, NOW)?;
        assert_eq!(
            verify(&token, "000000", TokenMode::Signed, SECRET, NOW),
            Err(VerifyError::CodeMismatch)
        );
        assert_eq!(
            verify(&token, "482913", TokenMode::Signed, SECRET, NOW + 601_000),
            Err(VerifyError::Token(Error::Expired))
        );

        // An unsigned token with a chosen code is useless against a signed server.
        let forged = issue("a@b.com", "111111", 600, TokenMode::Unsigned, SECRET, NOW)?;
        assert_eq!(
            verify(&forged, "111111", TokenMode::Signed, SECRET, NOW),
            Err(VerifyError::Token(Error::MalformedToken))
        );
        Ok(())
    }

    #[test]
    fn unsigned_mode_round_trip() -> Result<(), Error> {
        let token = issue("a@b.com", "482913", 600, TokenMode::Unsigned, SECRET, NOW)?;
        assert_eq!(
            verify(&token, "482913", TokenMode::Unsigned, SECRET, NOW),
            Ok("a@b.com".to_string())
        );
        Ok(())
    }

    #[test]
    fn codec_issues_and_checks_codes() -> Result<(), Error> {
        let codec = TokenCodec::new(secrecy::SecretString::from("verification-secret".to_string()));
        let token = codec.issue_verification("a@b.com", "482913", 600, TokenMode::Signed, NOW)?;
        assert_eq!(
            verify(&token, "482913", TokenMode::Signed, SECRET, NOW),
            Ok("a@b.com".to_string())
        );
        assert_eq!(
            codec.verify_code(&token, "482913", TokenMode::Signed, NOW),
            Ok("a@b.com".to_string())
        );
        assert_eq!(
            codec.verify_code(&token, "482914", TokenMode::Signed, NOW),
            Err(VerifyError::CodeMismatch)
        );
        Ok(())
    }

    #[test]
    fn parses_mode() {
        assert_eq!("signed".parse::<TokenMode>(), Ok(TokenMode::Signed));
        assert_eq!(" Unsigned ".parse::<TokenMode>(), Ok(TokenMode::Unsigned));
        assert!("hmac".parse::<TokenMode>().is_err());
        assert_eq!(TokenMode::default().to_string(), "signed");
    }

    #[test]
    fn builds_verification_url() {
        assert_eq!(
            verification_url("https://intake.example.com/", "tok"),
            "https://intake.example.com/verify?token=tok"
        );
    }
}
