//! Token issuance
//!
//! A [`TokenIssuer`] signs a caller [`Context`] into a short-lived token. The
//! standard claims are always written last, so nothing in the context can
//! extend a token's lifetime or forge its id:
//!
//! ```text
//! context claims → jti, iat, exp, iss, aud → sign (kid = key name) → token
//! ```

use std::fmt;
use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, error};
use uuid::Uuid;

use crate::bearer::format_bearer;
use crate::clock::{Clock, SystemClock};
use crate::codec::{ClaimMap, encode_token};
use crate::context::Context;
use crate::error::{IssueError, KeyError};
use crate::keys::KeyStore;

/// Default token lifetime in seconds
pub const DEFAULT_TOKEN_LIFETIME_SECS: u64 = 60;

/// Signs contexts into bearer tokens
///
/// # Example
///
/// ```rust
/// use std::sync::Arc;
/// use svc_token::{Algorithm, Context, KeyStore, TokenIssuer};
///
/// let keys = KeyStore::builder(Algorithm::HS256).key("billing", "s3cr3t").build()?;
/// let issuer = TokenIssuer::new(Arc::new(keys)).with_issuer("billing");
///
/// let ctx = Context::builder().subject("user-42").scope("read:invoices").build();
/// let token = issuer.issue(None, Some(&ctx), &[])?;
/// assert_eq!(token.split('.').count(), 3);
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
#[derive(Clone)]
pub struct TokenIssuer {
    keys: Arc<KeyStore>,
    issuer: Option<String>,
    lifetime_secs: u64,
    clock: Arc<dyn Clock>,
}

impl fmt::Debug for TokenIssuer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenIssuer")
            .field("algorithm", &self.keys.algorithm())
            .field("keys", &self.keys.len())
            .field("issuer", &self.issuer)
            .field("lifetime_secs", &self.lifetime_secs)
            .finish()
    }
}

impl TokenIssuer {
    /// Create an issuer signing with `keys`
    #[must_use]
    pub fn new(keys: Arc<KeyStore>) -> Self {
        Self {
            keys,
            issuer: None,
            lifetime_secs: DEFAULT_TOKEN_LIFETIME_SECS,
            clock: Arc::new(SystemClock),
        }
    }

    /// Set the `iss` claim written into every token
    #[must_use]
    pub fn with_issuer(mut self, issuer: impl Into<String>) -> Self {
        self.issuer = Some(issuer.into());
        self
    }

    /// Set the token lifetime in seconds
    #[must_use]
    pub fn with_lifetime(mut self, secs: u64) -> Self {
        self.lifetime_secs = secs;
        self
    }

    /// Replace the clock used for `iat`/`exp`
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Configured issuer name
    pub fn issuer(&self) -> Option<&str> {
        self.issuer.as_deref()
    }

    /// Token lifetime in seconds
    pub fn lifetime_secs(&self) -> u64 {
        self.lifetime_secs
    }

    /// Issue a signed token
    ///
    /// `signing_key_name` selects the key and is written as the header `kid`;
    /// `None` signs with the store's primary key. An empty `audience` leaves the
    /// token unrestricted.
    ///
    /// # Errors
    ///
    /// - [`IssueError::SigningKeyNotFound`] - the named key is missing or unreadable
    /// - [`IssueError::AmbiguousSigningKey`] - no name given and no primary key
    /// - [`IssueError::Encoding`] - the key cannot sign with the store's algorithm
    pub fn issue(
        &self,
        signing_key_name: Option<&str>,
        context: Option<&Context>,
        audience: &[String],
    ) -> Result<String, IssueError> {
        let key_name = match signing_key_name {
            Some(name) => name,
            None => self.keys.primary_name().map_err(map_key_error)?,
        };
        let key = self.keys.resolve(key_name).map_err(map_key_error)?;

        let claims = self.build_claims(context, audience);
        let token = encode_token(&claims, &key, self.keys.algorithm(), signing_key_name)?;

        let jti = claims.get("jti").and_then(Value::as_str);
        debug!(
            key = key_name,
            algorithm = %self.keys.algorithm(),
            jti,
            "Issued token"
        );
        Ok(token)
    }

    /// Issue a token formatted as an `Authorization` header value
    ///
    /// # Errors
    ///
    /// Same as [`TokenIssuer::issue`].
    pub fn issue_bearer(
        &self,
        signing_key_name: Option<&str>,
        context: Option<&Context>,
        audience: &[String],
    ) -> Result<String, IssueError> {
        self.issue(signing_key_name, context, audience)
            .map(|token| format_bearer(&token))
    }

    fn build_claims(&self, context: Option<&Context>, audience: &[String]) -> ClaimMap {
        let mut claims = context.map(Context::to_claim_map).unwrap_or_default();

        let iat = self.clock.now();
        claims.insert("jti".into(), Value::String(Uuid::new_v4().to_string()));
        claims.insert("iat".into(), Value::from(iat));
        claims.insert(
            "exp".into(),
            Value::from(iat.saturating_add(self.lifetime_secs)),
        );

        // Standard claims always win over anything the context carried
        match &self.issuer {
            Some(issuer) => {
                claims.insert("iss".into(), Value::String(issuer.clone()));
            }
            None => {
                claims.remove("iss");
            }
        }
        if audience.is_empty() {
            claims.remove("aud");
        } else {
            claims.insert(
                "aud".into(),
                Value::Array(audience.iter().cloned().map(Value::String).collect()),
            );
        }

        claims
    }
}

fn map_key_error(err: KeyError) -> IssueError {
    match err {
        KeyError::KeyNotFound(name) => {
            error!(key = %name, "Signing key not found");
            IssueError::SigningKeyNotFound(name)
        }
        KeyError::AmbiguousSigningKey(count) => {
            error!(keys = count, "No signing key named and no primary key configured");
            IssueError::AmbiguousSigningKey(count)
        }
        KeyError::ImmutableStoreViolation(name) | KeyError::EmptyKey(name) => {
            IssueError::SigningKeyNotFound(name)
        }
    }
}
