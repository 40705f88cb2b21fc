//! Compact token codec
//!
//! Tokens are `header.payload.signature`, each segment base64url without padding.
//! Signing and signature checks are delegated to `jsonwebtoken`; this module adds
//! the parts that make multi-issuer verification safe:
//!
//! - a closed [`Algorithm`] set (RS256, HS256, HS384, HS512), so `none` and
//!   anything else is rejected at the boundary
//! - an explicit allowlist on verification, combined with the key's own
//!   algorithm, so the header's `alg` can never select the primitive by itself
//! - separate [`UnverifiedClaims`] and [`VerifiedClaims`] types for the issuer
//!   peek and the verified result
//!
//! # Two-step decode
//!
//! The verification key depends on the `iss` claim, which lives inside the token
//! being verified. [`decode_unverified`] reads it without checking anything; only
//! [`verify`] produces claims that may back an authorization decision.

use std::fmt;
use std::str::FromStr;

use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, decode_header, encode};
use serde_json::Value;
use tracing::{debug, error};

use crate::error::CodecError;
use crate::keys::KeyMaterial;

/// Flat claim mapping carried in the token payload
pub type ClaimMap = serde_json::Map<String, Value>;

/// Signing algorithms accepted anywhere in this crate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Algorithm {
    /// RSASSA-PKCS1-v1_5 with SHA-256 (PEM private key signs, PEM public key verifies)
    RS256,
    /// HMAC with SHA-256 (shared secret)
    HS256,
    /// HMAC with SHA-384 (shared secret)
    HS384,
    /// HMAC with SHA-512 (shared secret)
    HS512,
}

impl Algorithm {
    /// Every supported algorithm
    pub const ALL: [Algorithm; 4] = [
        Algorithm::RS256,
        Algorithm::HS256,
        Algorithm::HS384,
        Algorithm::HS512,
    ];

    /// Header name of the algorithm
    pub fn as_str(&self) -> &'static str {
        match self {
            Algorithm::RS256 => "RS256",
            Algorithm::HS256 => "HS256",
            Algorithm::HS384 => "HS384",
            Algorithm::HS512 => "HS512",
        }
    }

    /// Whether keys are PEM files (RSA) rather than shared secrets
    pub fn is_asymmetric(&self) -> bool {
        matches!(self, Algorithm::RS256)
    }

    fn to_jwt(self) -> jsonwebtoken::Algorithm {
        match self {
            Algorithm::RS256 => jsonwebtoken::Algorithm::RS256,
            Algorithm::HS256 => jsonwebtoken::Algorithm::HS256,
            Algorithm::HS384 => jsonwebtoken::Algorithm::HS384,
            Algorithm::HS512 => jsonwebtoken::Algorithm::HS512,
        }
    }

    fn from_jwt(alg: jsonwebtoken::Algorithm) -> Option<Self> {
        match alg {
            jsonwebtoken::Algorithm::RS256 => Some(Algorithm::RS256),
            jsonwebtoken::Algorithm::HS256 => Some(Algorithm::HS256),
            jsonwebtoken::Algorithm::HS384 => Some(Algorithm::HS384),
            jsonwebtoken::Algorithm::HS512 => Some(Algorithm::HS512),
            _ => None,
        }
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Algorithm {
    type Err = CodecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Algorithm::ALL
            .into_iter()
            .find(|alg| alg.as_str() == s)
            .ok_or_else(|| CodecError::UnsupportedAlgorithm(s.to_string()))
    }
}

/// Claims read without any signature check
///
/// Only the routing information needed to pick a verification key is exposed.
#[derive(Debug, Clone)]
pub struct UnverifiedClaims {
    claims: ClaimMap,
    key_id: Option<String>,
}

impl UnverifiedClaims {
    /// Declared issuer (`iss`), if it is a string
    pub fn issuer(&self) -> Option<&str> {
        self.claims.get("iss").and_then(Value::as_str)
    }

    /// Declared key id (`kid` header)
    pub fn key_id(&self) -> Option<&str> {
        self.key_id.as_deref()
    }
}

/// Claims whose signature and expiry have been checked
#[derive(Debug, Clone, PartialEq)]
pub struct VerifiedClaims {
    claims: ClaimMap,
    algorithm: Algorithm,
}

impl VerifiedClaims {
    /// The full claim mapping
    pub fn claims(&self) -> &ClaimMap {
        &self.claims
    }

    /// Consume into the claim mapping
    pub fn into_claims(self) -> ClaimMap {
        self.claims
    }

    /// Algorithm the signature was checked with
    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    /// Issuer (`iss`)
    pub fn issuer(&self) -> Option<&str> {
        self.claims.get("iss").and_then(Value::as_str)
    }

    /// Token id (`jti`)
    pub fn token_id(&self) -> Option<&str> {
        self.claims.get("jti").and_then(Value::as_str)
    }

    /// Issued-at (`iat`) in epoch seconds
    pub fn issued_at(&self) -> Option<u64> {
        self.claims.get("iat").and_then(numeric_date)
    }

    /// Expiry (`exp`) in epoch seconds
    pub fn expires_at(&self) -> Option<u64> {
        self.claims.get("exp").and_then(numeric_date)
    }

    /// Whether the `aud` claim admits `service`
    ///
    /// A missing, `null` or empty `aud` places no restriction. Otherwise the
    /// claim (a string or an array of strings) must contain `service` exactly;
    /// with no service name configured a restricted token is never admitted.
    pub fn audience_allows(&self, service: Option<&str>) -> bool {
        let members: Vec<&str> = match self.claims.get("aud") {
            None | Some(Value::Null) => return true,
            Some(Value::String(aud)) if aud.is_empty() => return true,
            Some(Value::Array(items)) if items.is_empty() => return true,
            Some(Value::String(aud)) => vec![aud.as_str()],
            Some(Value::Array(items)) => items.iter().filter_map(Value::as_str).collect(),
            Some(_) => Vec::new(),
        };

        service.is_some_and(|name| members.contains(&name))
    }
}

/// Sign `claims` into a compact token
///
/// `key_id`, when given, is written to the `kid` header.
///
/// # Errors
///
/// Returns [`CodecError::UnsupportedAlgorithm`] if `algorithm` differs from the
/// key's algorithm or the key bytes are not a usable signing key for it.
pub fn encode_token(
    claims: &ClaimMap,
    key: &KeyMaterial,
    algorithm: Algorithm,
    key_id: Option<&str>,
) -> Result<String, CodecError> {
    if key.algorithm() != algorithm {
        return Err(CodecError::UnsupportedAlgorithm(format!(
            "{algorithm} requested with a {} key",
            key.algorithm()
        )));
    }

    let encoding_key = match algorithm {
        Algorithm::RS256 => EncodingKey::from_rsa_pem(key.bytes()).map_err(|e| {
            error!(error = %e, "RS256 signing key is not a valid PEM private key");
            CodecError::UnsupportedAlgorithm(format!("{algorithm}: invalid signing key"))
        })?,
        Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512 => {
            EncodingKey::from_secret(key.bytes())
        }
    };

    let mut header = Header::new(algorithm.to_jwt());
    header.kid = key_id.map(str::to_string);

    encode(&header, claims, &encoding_key).map_err(|e| {
        error!(error = %e, algorithm = %algorithm, "Token signing failed");
        CodecError::UnsupportedAlgorithm(format!("{algorithm}: {e}"))
    })
}

/// Read a token's claims without checking its signature
///
/// Never base an authorization decision on the result.
///
/// # Errors
///
/// Returns [`CodecError::MalformedToken`] unless the token has exactly three
/// non-empty segments, a parseable header and a JSON object payload.
pub fn decode_unverified(token: &str) -> Result<UnverifiedClaims, CodecError> {
    let payload = split_segments(token)?[1];

    let header = decode_header(token)
        .map_err(|e| CodecError::MalformedToken(format!("invalid header: {e}")))?;

    let bytes = URL_SAFE_NO_PAD
        .decode(payload)
        .map_err(|e| CodecError::MalformedToken(format!("invalid payload encoding: {e}")))?;

    let claims: ClaimMap = serde_json::from_slice(&bytes)
        .map_err(|e| CodecError::MalformedToken(format!("invalid claims: {e}")))?;

    Ok(UnverifiedClaims {
        claims,
        key_id: header.kid,
    })
}

/// Verify a token's signature and expiry
///
/// The signature is checked with the key's algorithm, and only when the token's
/// header names that same algorithm and it appears in `allowed`. `exp` is
/// required and the token is expired once `now >= exp + leeway`.
///
/// # Errors
///
/// - [`CodecError::MalformedToken`] - bad structure, encoding, or an `exp` that
///   is missing or not a non-negative NumericDate
/// - [`CodecError::SignatureInvalid`] - algorithm not allowed or signature mismatch
/// - [`CodecError::TokenExpired`] - `exp` has elapsed
pub fn verify(
    token: &str,
    key: &KeyMaterial,
    allowed: &[Algorithm],
    now: u64,
    leeway: u64,
) -> Result<VerifiedClaims, CodecError> {
    split_segments(token)?;

    let header = decode_header(token)
        .map_err(|e| CodecError::MalformedToken(format!("invalid header: {e}")))?;

    let algorithm = match Algorithm::from_jwt(header.alg) {
        Some(alg) if allowed.contains(&alg) && alg == key.algorithm() => alg,
        _ => {
            debug!(
                header_alg = ?header.alg,
                key_alg = %key.algorithm(),
                allowed = ?allowed,
                "Token algorithm not accepted"
            );
            return Err(CodecError::SignatureInvalid);
        }
    };

    let decoding_key = match algorithm {
        Algorithm::RS256 => DecodingKey::from_rsa_pem(key.bytes()).map_err(|e| {
            error!(error = %e, "RS256 verifying key is not a valid PEM public key");
            CodecError::SignatureInvalid
        })?,
        Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512 => {
            DecodingKey::from_secret(key.bytes())
        }
    };

    // Time and audience are checked here against the injected clock, not by jsonwebtoken
    let mut validation = Validation::new(algorithm.to_jwt());
    validation.validate_exp = false;
    validation.validate_nbf = false;
    validation.validate_aud = false;
    validation.required_spec_claims.clear();

    let token_data = decode::<ClaimMap>(token, &decoding_key, &validation).map_err(|e| {
        debug!(error = %e, algorithm = %algorithm, "Token signature check failed");
        match e.kind() {
            ErrorKind::InvalidToken | ErrorKind::Base64(_) | ErrorKind::Json(_) | ErrorKind::Utf8(_) => {
                CodecError::MalformedToken(e.to_string())
            }
            _ => CodecError::SignatureInvalid,
        }
    })?;

    let claims = token_data.claims;
    let exp = claims
        .get("exp")
        .and_then(numeric_date)
        .ok_or_else(|| CodecError::MalformedToken("missing or non-numeric exp".to_string()))?;

    if now >= exp.saturating_add(leeway) {
        debug!(exp, now, leeway, "Token expired");
        return Err(CodecError::TokenExpired);
    }

    Ok(VerifiedClaims { claims, algorithm })
}

/// Read a NumericDate (RFC 7519): seconds as an integer, or a finite
/// non-negative float rounded to the nearest second
fn numeric_date(value: &Value) -> Option<u64> {
    value.as_u64().or_else(|| {
        value
            .as_f64()
            .filter(|secs| secs.is_finite() && *secs >= 0.0 && *secs < u64::MAX as f64)
            .map(|secs| secs.round() as u64)
    })
}

fn split_segments(token: &str) -> Result<[&str; 3], CodecError> {
    let mut parts = token.split('.');
    match (parts.next(), parts.next(), parts.next(), parts.next()) {
        (Some(header), Some(payload), Some(signature), None)
            if !header.is_empty() && !payload.is_empty() && !signature.is_empty() =>
        {
            Ok([header, payload, signature])
        }
        _ => Err(CodecError::MalformedToken(
            "expected three non-empty segments".to_string(),
        )),
    }
}
