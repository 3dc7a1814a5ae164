//! Bearer token verification.
//!
//! Tokens are HS256 JWTs signed with a shared secret. The claims of
//! interest are `usernumber`, `role` and `exp`; unknown claims are
//! ignored. Verification order:
//!
//! 1. split into the three dot-separated base64url segments;
//! 2. check the header names HS256 (anything else, including `none`,
//!    is rejected outright);
//! 3. recompute the HMAC-SHA256 over `{header}.{payload}` and compare
//!    it to the signature in constant time;
//! 4. decode the claims and check the expiry.
//!
//! Any failure yields a [`TokenError`] and no partial identity. The
//! role claim deserializes into a closed enum, so a token carrying an
//! unknown role string fails at decode time rather than being compared
//! leniently later.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use subtle::ConstantTimeEq;

use crate::error::TokenError;

/// HMAC-SHA256 type alias
type HmacSha256 = Hmac<Sha256>;

/// The two roles the authorization service issues. Anything else found
/// in a token is a data-integrity problem and fails closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Staff,
    User,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::Staff => write!(f, "staff"),
            Role::User => write!(f, "user"),
        }
    }
}

/// Verified identity attached to one request. Immutable; never outlives
/// the request it was decoded for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Identity {
    pub user_number: u32,
    pub role: Role,
}

impl Identity {
    /// Staff identities bypass all per-experiment authorization.
    pub fn is_staff(&self) -> bool {
        matches!(self.role, Role::Staff)
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct Header {
    alg: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    typ: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    usernumber: u32,
    role: Role,
    exp: u64,
}

/// Verifies bearer tokens against a shared secret, and mints them for
/// the `token` subcommand and tests.
#[derive(Clone)]
pub struct TokenAuthenticator {
    secret: Vec<u8>,
}

impl TokenAuthenticator {
    pub fn new(secret: impl AsRef<[u8]>) -> Self {
        Self {
            secret: secret.as_ref().to_vec(),
        }
    }

    /// Decode and verify a bearer token into an [`Identity`].
    pub fn decode(&self, token: &str) -> Result<Identity, TokenError> {
        let mut parts = token.split('.');
        let (Some(header_b64), Some(payload_b64), Some(sig_b64), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(TokenError::Malformed);
        };

        let header_bytes = URL_SAFE_NO_PAD
            .decode(header_b64)
            .map_err(|_| TokenError::Malformed)?;
        let header: Header =
            serde_json::from_slice(&header_bytes).map_err(|_| TokenError::Malformed)?;
        if header.alg != "HS256" {
            return Err(TokenError::UnsupportedAlgorithm(header.alg));
        }

        // Verify the signature before trusting anything in the payload
        let signature = URL_SAFE_NO_PAD
            .decode(sig_b64)
            .map_err(|_| TokenError::Malformed)?;
        let expected = self.signature_for(header_b64, payload_b64);
        if !bool::from(signature.ct_eq(&expected)) {
            return Err(TokenError::BadSignature);
        }

        let payload = URL_SAFE_NO_PAD
            .decode(payload_b64)
            .map_err(|_| TokenError::Malformed)?;
        let claims: Claims = serde_json::from_slice(&payload)
            .map_err(|err| TokenError::InvalidClaims(err.to_string()))?;

        let now = unix_now();
        if claims.exp <= now {
            return Err(TokenError::Expired {
                expired_at: claims.exp,
                now,
            });
        }

        Ok(Identity {
            user_number: claims.usernumber,
            role: claims.role,
        })
    }

    /// Mint a token valid for `ttl` from now.
    pub fn issue(&self, user_number: u32, role: Role, ttl: Duration) -> String {
        self.issue_with_expiry(user_number, role, unix_now() + ttl.as_secs())
    }

    /// Mint a token with a specific expiry timestamp. Useful for tests
    /// that need an already-expired credential.
    pub fn issue_with_expiry(&self, user_number: u32, role: Role, exp: u64) -> String {
        let header = Header {
            alg: "HS256".to_string(),
            typ: Some("JWT".to_string()),
        };
        let claims = Claims {
            usernumber: user_number,
            role,
            exp,
        };
        // Serializing these fixed structs cannot fail
        let header_b64 =
            URL_SAFE_NO_PAD.encode(serde_json::to_vec(&header).expect("header serializes"));
        let payload_b64 =
            URL_SAFE_NO_PAD.encode(serde_json::to_vec(&claims).expect("claims serialize"));
        let signature = self.signature_for(&header_b64, &payload_b64);
        format!(
            "{}.{}.{}",
            header_b64,
            payload_b64,
            URL_SAFE_NO_PAD.encode(signature)
        )
    }

    /// HMAC-SHA256 over the JWT signing input.
    fn signature_for(&self, header_b64: &str, payload_b64: &str) -> Vec<u8> {
        let mut mac =
            HmacSha256::new_from_slice(&self.secret).expect("HMAC can take key of any size");
        mac.update(header_b64.as_bytes());
        mac.update(b".");
        mac.update(payload_b64.as_bytes());
        mac.finalize().into_bytes().to_vec()
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

// =============================================================================
// Tests
// =============================================================================
