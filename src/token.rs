//! Identity token service — JWT minting and verification.
//!
//! Tokens are HS256-signed, carry a subject (username) and a comma-joined
//! `roles` claim (`ROLE_ORGANIZER,ROLE_PRACTITIONER`), and are valid in the
//! half-open window `[iat, exp)` with `exp = iat + ttl`. There is no
//! revocation list; expiry is the only lifecycle event.
//!
//! Verification uses zero clock leeway and an explicit `now` parameter in
//! [`TokenService::verify_at`] so the expiry contract is testable with a
//! simulated clock.

use chrono::Utc;
use jsonwebtoken::{
    Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode,
    errors::ErrorKind,
};
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Closed set of roles known to the platform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Care organizer: schedules and manages patient records
    Organizer,
    /// Practitioner: reads records, writes notes, reviews risk reports
    Practitioner,
}

impl Role {
    /// Claim tag embedded in tokens, e.g. `ROLE_ORGANIZER`
    #[must_use]
    pub fn tag(self) -> &'static str {
        match self {
            Self::Organizer => "ROLE_ORGANIZER",
            Self::Practitioner => "ROLE_PRACTITIONER",
        }
    }
}

/// Claims carried by an identity token
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (username)
    pub sub: String,
    /// Comma-joined role tags
    pub roles: String,
    /// Issued-at (Unix seconds)
    pub iat: u64,
    /// Expiry (Unix seconds), `iat + ttl`
    pub exp: u64,
}

impl Claims {
    /// Split the `roles` claim back into individual tags
    #[must_use]
    pub fn role_tags(&self) -> Vec<&str> {
        self.roles.split(',').filter(|r| !r.is_empty()).collect()
    }
}

/// Why a token failed verification
#[derive(Debug, thiserror::Error)]
pub enum InvalidTokenError {
    /// Signature does not verify under the shared secret
    #[error("Invalid token signature")]
    Signature,

    /// Structurally broken token (not three base64 segments, bad claims, ...)
    #[error("Malformed token: {0}")]
    Malformed(jsonwebtoken::errors::Error),

    /// Current time is at or past `exp`
    #[error("Token expired")]
    Expired,

    /// Current time is before `iat`
    #[error("Token not yet valid")]
    NotYetValid,
}

/// Mints and verifies identity tokens under a process-wide shared secret.
///
/// The secret and TTL are immutable after construction; the service is
/// freely shareable across request tasks without locking.
pub struct TokenService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    ttl_seconds: u64,
}

impl TokenService {
    /// Create a token service.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if the secret is empty — absent key material
    /// is a fatal startup condition, not a per-request failure.
    pub fn new(secret: &str, ttl_seconds: u64) -> Result<Self> {
        if secret.is_empty() {
            return Err(Error::Config(
                "token signing secret must not be empty".to_string(),
            ));
        }
        Ok(Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            ttl_seconds,
        })
    }

    /// Token lifetime in seconds (also the cookie `Max-Age`)
    #[must_use]
    pub fn ttl_seconds(&self) -> u64 {
        self.ttl_seconds
    }

    /// Issue a signed token for `subject` with the given roles.
    pub fn issue(&self, subject: &str, roles: &[Role]) -> Result<String> {
        self.issue_at(subject, roles, unix_now())
    }

    /// Issue a token as of an explicit clock value (for tests).
    pub fn issue_at(&self, subject: &str, roles: &[Role], now: u64) -> Result<String> {
        let claims = Claims {
            sub: subject.to_string(),
            roles: roles
                .iter()
                .map(|r| r.tag())
                .collect::<Vec<_>>()
                .join(","),
            iat: now,
            exp: now + self.ttl_seconds,
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| Error::Internal(format!("token signing failed: {e}")))
    }

    /// Verify a token against the current clock.
    pub fn verify(&self, token: &str) -> std::result::Result<Claims, InvalidTokenError> {
        self.verify_at(token, unix_now())
    }

    /// Verify a token as of an explicit clock value.
    ///
    /// A token is valid iff its signature verifies and `iat <= now < exp`.
    pub fn verify_at(
        &self,
        token: &str,
        now: u64,
    ) -> std::result::Result<Claims, InvalidTokenError> {
        // Time checks are done explicitly below, against the caller's clock.
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = false;
        validation.required_spec_claims.clear();

        let data = decode::<Claims>(token, &self.decoding_key, &validation).map_err(|e| {
            match e.kind() {
                ErrorKind::InvalidSignature => InvalidTokenError::Signature,
                _ => InvalidTokenError::Malformed(e),
            }
        })?;

        if now < data.claims.iat {
            return Err(InvalidTokenError::NotYetValid);
        }
        if now >= data.claims.exp {
            return Err(InvalidTokenError::Expired);
        }

        Ok(data.claims)
    }
}

fn unix_now() -> u64 {
    u64::try_from(Utc::now().timestamp()).unwrap_or(0)
}
