//! Multi-issuer token verification
//!
//! The verification key depends on who signed the token, so verification runs
//! as a fixed sequence of checks. Any failing step rejects the token:
//!
//! ```text
//! Received
//!   → IssuerExtracted   (unverified peek at `iss`)     InvalidToken
//!   → KeyResolved       (KeyStore lookup by issuer)    VerifyingKeyNotFound
//!   → SignatureChecked  (algorithm allowlist + sig)    Unauthorized
//!   → ExpiryChecked     (`now < exp + leeway`)         Unauthorized
//!   → AudienceChecked   (service name in `aud`)        NotIntendedAudience
//!   → ContextBuilt
//! ```
//!
//! Callers only ever see [`Unauthorized`]; the [`Rejection`] it carries is
//! logged at `warn` and kept for diagnostics.

use std::fmt;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::bearer::extract_bearer;
use crate::clock::{Clock, SystemClock};
use crate::codec::{self, Algorithm, VerifiedClaims, decode_unverified};
use crate::context::Context;
use crate::error::{CodecError, Rejection, Unauthorized};
use crate::keys::KeyStore;

/// Verifies tokens from any issuer registered in its key store
///
/// # Example
///
/// ```rust
/// use std::sync::Arc;
/// use svc_token::{Algorithm, Context, KeyStore, TokenIssuer, TokenVerifier};
///
/// let keys = Arc::new(KeyStore::builder(Algorithm::HS256).key("billing", "s3cr3t").build()?);
/// let issuer = TokenIssuer::new(keys.clone()).with_issuer("billing");
/// let verifier = TokenVerifier::new(keys);
///
/// let ctx = Context::builder().subject("user-42").build();
/// let token = issuer.issue(None, Some(&ctx), &[])?;
///
/// let verified = verifier.verify(&token)?;
/// assert_eq!(verified.subject(), Some("user-42"));
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
#[derive(Clone)]
pub struct TokenVerifier {
    /// Verification keys, by issuer name
    keys: Arc<KeyStore>,
    /// Accepted header algorithms (default: the store's algorithm)
    allowed_algorithms: Vec<Algorithm>,
    /// This service's audience identifier
    service_name: Option<String>,
    /// Clock skew tolerance in seconds (default: 0)
    leeway_secs: u64,
    clock: Arc<dyn Clock>,
}

impl fmt::Debug for TokenVerifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenVerifier")
            .field("issuers", &self.keys.len())
            .field("allowed_algorithms", &self.allowed_algorithms)
            .field("service_name", &self.service_name)
            .field("leeway_secs", &self.leeway_secs)
            .finish()
    }
}

impl TokenVerifier {
    /// Create a verifier resolving keys from `keys`
    #[must_use]
    pub fn new(keys: Arc<KeyStore>) -> Self {
        let allowed_algorithms = vec![keys.algorithm()];
        Self {
            keys,
            allowed_algorithms,
            service_name: None,
            leeway_secs: 0,
            clock: Arc::new(SystemClock),
        }
    }

    /// Set the accepted header algorithms
    ///
    /// A token is still only accepted when its algorithm also matches the
    /// resolved key, so widening this list never enables algorithm confusion.
    #[must_use]
    pub fn with_algorithms(mut self, algorithms: impl IntoIterator<Item = Algorithm>) -> Self {
        self.allowed_algorithms = algorithms.into_iter().collect();
        self
    }

    /// Set this service's audience identifier
    #[must_use]
    pub fn with_service_name(mut self, name: impl Into<String>) -> Self {
        self.service_name = Some(name.into());
        self
    }

    /// Set the clock skew tolerance applied to `exp`
    #[must_use]
    pub fn with_leeway(mut self, secs: u64) -> Self {
        self.leeway_secs = secs;
        self
    }

    /// Replace the clock used for expiry checks
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Configured audience identifier
    pub fn service_name(&self) -> Option<&str> {
        self.service_name.as_deref()
    }

    /// Accepted header algorithms
    pub fn allowed_algorithms(&self) -> &[Algorithm] {
        &self.allowed_algorithms
    }

    /// Verify a token and reconstruct the caller's context
    ///
    /// # Errors
    ///
    /// Returns [`Unauthorized`] on any failure. Use [`Unauthorized::reason`] for
    /// the internal cause.
    pub fn verify(&self, token: &str) -> Result<Context, Unauthorized> {
        self.verify_claims(token)
            .map(|claims| Context::reconstitute(claims.claims()))
    }

    /// Verify a token and return the raw verified claims
    ///
    /// # Errors
    ///
    /// Same as [`TokenVerifier::verify`].
    pub fn verify_claims(&self, token: &str) -> Result<VerifiedClaims, Unauthorized> {
        self.check(token).map_err(reject)
    }

    /// Verify an `Authorization` header value (`Bearer <token>`)
    ///
    /// # Errors
    ///
    /// A value without the `Bearer` scheme is rejected as an invalid token.
    pub fn verify_bearer(&self, header_value: &str) -> Result<Context, Unauthorized> {
        match extract_bearer(header_value) {
            Some(token) => self.verify(token),
            None => Err(reject(Rejection::InvalidToken(CodecError::MalformedToken(
                "missing bearer token".to_string(),
            )))),
        }
    }

    /// Check a token without building a context
    ///
    /// # Errors
    ///
    /// Same as [`TokenVerifier::verify`].
    pub fn authorize(&self, token: &str) -> Result<(), Unauthorized> {
        self.verify_claims(token).map(|_| ())
    }

    fn check(&self, token: &str) -> Result<VerifiedClaims, Rejection> {
        let unverified = decode_unverified(token).map_err(Rejection::InvalidToken)?;

        let issuer = unverified
            .issuer()
            .ok_or(Rejection::VerifyingKeyNotFound(None))?;

        let key = self
            .keys
            .resolve(issuer)
            .map_err(|_| Rejection::VerifyingKeyNotFound(Some(issuer.to_string())))?;

        let claims = codec::verify(
            token,
            &key,
            &self.allowed_algorithms,
            self.clock.now(),
            self.leeway_secs,
        )
        .map_err(Rejection::Unauthorized)?;

        if !claims.audience_allows(self.service_name.as_deref()) {
            return Err(Rejection::NotIntendedAudience);
        }

        debug!(
            issuer,
            algorithm = %claims.algorithm(),
            jti = claims.token_id(),
            "Token verified"
        );
        Ok(claims)
    }
}

fn reject(reason: Rejection) -> Unauthorized {
    warn!(reason = %reason, expired = reason.is_expired(), "Token rejected");
    Unauthorized::new(reason)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::issuer::TokenIssuer;

    const NOW: u64 = 1_700_000_000;

    fn keys() -> Arc<KeyStore> {
        Arc::new(
            KeyStore::builder(Algorithm::HS256)
                .key("billing", "s3cr3t")
                .key("shipping", "sh1pp1ng")
                .build()
                .unwrap(),
        )
    }

    fn issuer(name: &str, clock: Arc<ManualClock>) -> TokenIssuer {
        TokenIssuer::new(keys()).with_issuer(name).with_clock(clock)
    }

    fn verifier(clock: Arc<ManualClock>) -> TokenVerifier {
        TokenVerifier::new(keys()).with_clock(clock)
    }

    #[test]
    fn test_defaults() {
        let v = TokenVerifier::new(keys());
        assert_eq!(v.allowed_algorithms(), [Algorithm::HS256]);
        assert_eq!(v.service_name(), None);
    }

    #[test]
    fn test_verify_round_trip() {
        let clock = Arc::new(ManualClock::new(NOW));
        let ctx = Context::builder()
            .subject("user-42")
            .scope("read:invoices")
            .build();

        let token = issuer("billing", clock.clone())
            .issue(Some("billing"), Some(&ctx), &[])
            .unwrap();
        let verified = verifier(clock).verify(&token).unwrap();

        assert_eq!(verified, ctx);
    }

    #[test]
    fn test_expired_token() {
        let clock = Arc::new(ManualClock::new(NOW));
        let token = issuer("billing", clock.clone())
            .issue(Some("billing"), None, &[])
            .unwrap();

        clock.advance(59);
        assert!(verifier(clock.clone()).authorize(&token).is_ok());

        clock.advance(2);
        let err = verifier(clock.clone()).authorize(&token).unwrap_err();
        assert!(err.reason().is_expired());

        // Leeway extends acceptance past exp
        assert!(verifier(clock).with_leeway(5).authorize(&token).is_ok());
    }

    #[test]
    fn test_missing_issuer_claim() {
        let clock = Arc::new(ManualClock::new(NOW));
        let token = TokenIssuer::new(keys())
            .with_clock(clock.clone())
            .issue(Some("billing"), None, &[])
            .unwrap();

        let err = verifier(clock).verify(&token).unwrap_err();
        assert_eq!(err.reason(), &Rejection::VerifyingKeyNotFound(None));
    }

    #[test]
    fn test_unknown_issuer() {
        let clock = Arc::new(ManualClock::new(NOW));
        let token = issuer("inventory", clock.clone())
            .issue(Some("billing"), None, &[])
            .unwrap();

        let err = verifier(clock).verify(&token).unwrap_err();
        assert_eq!(
            err.reason(),
            &Rejection::VerifyingKeyNotFound(Some("inventory".to_string()))
        );
    }

    #[test]
    fn test_signed_with_another_issuers_key() {
        // Claims to be shipping, signed with billing's secret
        let clock = Arc::new(ManualClock::new(NOW));
        let token = issuer("shipping", clock.clone())
            .issue(Some("billing"), None, &[])
            .unwrap();

        let err = verifier(clock).verify(&token).unwrap_err();
        assert_eq!(
            err.reason(),
            &Rejection::Unauthorized(CodecError::SignatureInvalid)
        );
    }

    #[test]
    fn test_audience() {
        let clock = Arc::new(ManualClock::new(NOW));
        let token = issuer("billing", clock.clone())
            .issue(Some("billing"), None, &["shipping".to_string()])
            .unwrap();

        let as_billing = verifier(clock.clone()).with_service_name("billing");
        assert_eq!(
            as_billing.verify(&token).unwrap_err().reason(),
            &Rejection::NotIntendedAudience
        );

        let as_shipping = verifier(clock.clone()).with_service_name("shipping");
        assert!(as_shipping.verify(&token).is_ok());

        // A restricted token needs a configured service name
        assert_eq!(
            verifier(clock.clone()).verify(&token).unwrap_err().reason(),
            &Rejection::NotIntendedAudience
        );

        // Unrestricted tokens pass everywhere
        let open = issuer("billing", clock.clone())
            .issue(Some("billing"), None, &[])
            .unwrap();
        assert!(as_billing.verify(&open).is_ok());
    }

    #[test]
    fn test_malformed_tokens() {
        let v = verifier(Arc::new(ManualClock::new(NOW)));
        for token in ["", "abc", "a.b", "a..c", "a.b.c.d", "not a token at all"] {
            let err = v.verify(token).unwrap_err();
            assert!(
                matches!(err.reason(), Rejection::InvalidToken(_)),
                "{token:?} gave {:?}",
                err.reason()
            );
            assert_eq!(err.to_string(), "Unauthorized.");
        }
    }

    #[test]
    fn test_verify_bearer() {
        let clock = Arc::new(ManualClock::new(NOW));
        let header = issuer("billing", clock.clone())
            .issue_bearer(Some("billing"), None, &[])
            .unwrap();

        assert!(verifier(clock.clone()).verify_bearer(&header).is_ok());

        let bare = header.trim_start_matches("Bearer ");
        let err = verifier(clock).verify_bearer(bare).unwrap_err();
        assert!(matches!(err.reason(), Rejection::InvalidToken(_)));
    }

    #[test]
    fn test_verify_claims_exposes_standard_claims() {
        let clock = Arc::new(ManualClock::new(NOW));
        let token = issuer("billing", clock.clone())
            .issue(Some("billing"), None, &[])
            .unwrap();

        let claims = verifier(clock).verify_claims(&token).unwrap();
        assert_eq!(claims.issuer(), Some("billing"));
        assert_eq!(claims.issued_at(), Some(NOW));
        assert_eq!(claims.expires_at(), Some(NOW + 60));
        assert_eq!(claims.algorithm(), Algorithm::HS256);
        assert!(claims.token_id().is_some());
    }
}
