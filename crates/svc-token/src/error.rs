//! Error taxonomy for token issuance and verification
//!
//! Errors are split by the stage that produces them:
//!
//! - [`ConfigError`] - configuration time, fatal (the service must not start)
//! - [`KeyError`] - key store construction and resolution
//! - [`CodecError`] - token encoding, structural decoding and signature checks
//! - [`IssueError`] - token issuance
//! - [`Rejection`] - the internal reason a presented token was refused
//! - [`Unauthorized`] - the single opaque error verification callers observe
//! - [`KeygenError`] - shared secret generation
//!
//! # Security
//!
//! Verification failures are deliberately collapsed into [`Unauthorized`], whose
//! `Display` never varies. The [`Rejection`] it carries is for logs and metrics;
//! it must never be written back to the caller.

use std::path::PathBuf;

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The configured algorithm is outside RS256, HS256, HS384, HS512
    #[error("Invalid signing algorithm: {0}")]
    InvalidSigningAlgorithm(String),

    /// An issuer needs a signing key but none was configured
    #[error("No signing key configured")]
    MissingSigningKey,

    /// Config file not found
    #[error("Configuration file not found: {0}")]
    FileNotFound(PathBuf),

    /// Unsupported file format
    #[error("Unsupported configuration file format. Use .toml, .yaml, .yml, or .json")]
    UnsupportedFormat,

    /// Configuration parsing error
    #[error("Failed to parse configuration: {0}")]
    Parse(#[from] config::ConfigError),

    /// The configured keys could not form a store
    #[error(transparent)]
    Keys(#[from] KeyError),
}

/// Key store errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum KeyError {
    /// No usable key under this name.
    ///
    /// Also returned when a file-backed key cannot be read, so callers never
    /// learn anything about the filesystem.
    #[error("Key not found: {0}")]
    KeyNotFound(String),

    /// Attempt to overwrite an entry that is already registered
    #[error("Cannot replace key '{0}': key stores are immutable once an entry is registered")]
    ImmutableStoreViolation(String),

    /// No key name given and the store has no single or primary entry
    #[error("Ambiguous signing key: store holds {0} keys and no primary")]
    AmbiguousSigningKey(usize),

    /// A blank secret or key path was registered.
    ///
    /// An empty HMAC secret would let anyone mint tokens the store accepts.
    #[error("Key '{0}' has an empty value")]
    EmptyKey(String),
}

/// Codec errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CodecError {
    /// Algorithm is outside the supported set or does not match the key
    #[error("Unsupported algorithm: {0}")]
    UnsupportedAlgorithm(String),

    /// Token is not three base64url segments carrying a JSON object
    #[error("Malformed token: {0}")]
    MalformedToken(String),

    /// Signature does not match, or the token's algorithm is not allowed
    #[error("Signature invalid")]
    SignatureInvalid,

    /// `exp` has elapsed
    #[error("Token expired")]
    TokenExpired,
}

/// Issuance errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IssueError {
    /// The named signing key is missing or unreadable
    #[error("Signing key not found: {0}")]
    SigningKeyNotFound(String),

    /// No key name given and the signing store has no single or primary entry
    #[error("Ambiguous signing key: store holds {0} keys and no primary")]
    AmbiguousSigningKey(usize),

    /// Claims could not be signed
    #[error("Failed to encode token: {0}")]
    Encoding(#[from] CodecError),
}

/// Internal reason a token was rejected
///
/// Only meant for diagnostics. See [`Unauthorized`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Rejection {
    /// The token could not even be decoded structurally
    #[error("invalid token: {0}")]
    InvalidToken(CodecError),

    /// No verification key for the declared issuer
    #[error("verifying key not found for issuer {0:?}")]
    VerifyingKeyNotFound(Option<String>),

    /// Signature, algorithm or expiry check failed
    #[error("token verification failed: {0}")]
    Unauthorized(CodecError),

    /// The token names an audience that excludes this service
    #[error("not intended audience")]
    NotIntendedAudience,
}

impl Rejection {
    /// Whether this rejection was caused by an elapsed `exp`
    pub fn is_expired(&self) -> bool {
        matches!(self, Rejection::Unauthorized(CodecError::TokenExpired))
    }
}

/// The one error verification callers see
///
/// `Display` is constant so that error text cannot be used as an oracle.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unauthorized.")]
pub struct Unauthorized {
    reason: Rejection,
}

impl Unauthorized {
    pub(crate) fn new(reason: Rejection) -> Self {
        Self { reason }
    }

    /// Internal rejection reason, for logging and telemetry only
    pub fn reason(&self) -> &Rejection {
        &self.reason
    }
}

impl From<Rejection> for Unauthorized {
    fn from(reason: Rejection) -> Self {
        Self::new(reason)
    }
}

/// Shared secret generation errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum KeygenError {
    /// Zero-length secrets are never usable
    #[error("Secret size must be at least one bit")]
    ZeroBits,
}
