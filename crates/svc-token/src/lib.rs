//! # svc-token - Service Bearer Tokens
//!
//! Signed bearer tokens for service-to-service and client-to-service
//! authentication across a set of cooperating services. Every service can be an
//! issuer (signing a caller's context into a short-lived token), a verifier
//! (resolving the signer's key by the token's declared issuer and checking the
//! token), or both.
//!
//! ## Design Principles
//!
//! - **One claims type**: [`Context`] is built by issuers and reconstituted by verifiers
//! - **Closed algorithm set**: RS256, HS256, HS384, HS512 and nothing else
//! - **Build-once keys**: a [`KeyStore`] has no mutating API after construction
//! - **Fail closed**: every verification failure is the same opaque [`Unauthorized`]
//!
//! ## Architecture
//!
//! - [`keys`] - [`KeyStore`]: logical key name → key material
//! - [`context`] - [`Context`]: caller identity, scopes, permissions, extra claims
//! - [`codec`] - compact token encoding, unverified peek, signature + expiry checks
//! - [`issuer`] - [`TokenIssuer`]: standard claims + context → signed token
//! - [`verifier`] - [`TokenVerifier`]: issuer lookup → verify → audience → context
//! - [`config`] - [`TokenConfig`]: file/env configuration building both engines
//! - [`tower`] - Tower middleware attaching contexts to `http` requests
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use svc_token::{Algorithm, Context, KeyStore, TokenIssuer, TokenVerifier};
//!
//! let keys = Arc::new(KeyStore::builder(Algorithm::HS256).key("billing", "s3cr3t").build()?);
//!
//! // Billing signs a token for one of its users...
//! let issuer = TokenIssuer::new(keys.clone()).with_issuer("billing");
//! let ctx = Context::builder().subject("user-42").scope("read:invoices").build();
//! let header = issuer.issue_bearer(Some("billing"), Some(&ctx), &[])?;
//!
//! // ...and any service holding billing's key can verify it
//! let verifier = TokenVerifier::new(keys);
//! let verified = verifier.verify_bearer(&header)?;
//! assert!(verified.has_scope("read:invoices"));
//! assert!(!verified.has_scope("write:invoices"));
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! ## Feature Flags
//!
//! - `middleware` (default) - Tower layer for `http::Request` services
//! - `tower` - Alias for `middleware`

pub mod bearer;
pub mod clock;
pub mod codec;
pub mod config;
pub mod context;
pub mod error;
pub mod issuer;
pub mod keygen;
pub mod keys;
pub mod verifier;

#[cfg(feature = "middleware")]
pub mod tower;

#[doc(inline)]
pub use codec::{Algorithm, ClaimMap, UnverifiedClaims, VerifiedClaims};
#[doc(inline)]
pub use config::TokenConfig;
#[doc(inline)]
pub use context::{Context, ContextBuilder};
#[doc(inline)]
pub use error::{
    CodecError, ConfigError, IssueError, KeyError, KeygenError, Rejection, Unauthorized,
};
#[doc(inline)]
pub use issuer::TokenIssuer;
#[doc(inline)]
pub use keygen::generate_shared_secret;
#[doc(inline)]
pub use keys::{KeyMaterial, KeyStore, KeyStoreBuilder};
#[doc(inline)]
pub use verifier::TokenVerifier;
