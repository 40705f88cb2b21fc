//! Common test utilities for integration tests
//!
//! Shared key stores, PEM fixtures, simulated clocks and raw token forging
//! helpers for the issuance and verification scenarios.

#![allow(dead_code)]

use std::sync::Arc;

use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use serde_json::Value;
use svc_token::clock::ManualClock;
use svc_token::{Algorithm, KeyStore, TokenIssuer, TokenVerifier};

/// 2023-11-14T22:13:20Z, a fixed "now" for simulated time
pub const NOW: u64 = 1_700_000_000;

pub const BILLING_PRIVATE_PEM: &str =
    concat!(env!("CARGO_MANIFEST_DIR"), "/tests/fixtures/billing_private.pem");
pub const BILLING_PUBLIC_PEM: &str =
    concat!(env!("CARGO_MANIFEST_DIR"), "/tests/fixtures/billing_public.pem");
pub const ROGUE_PRIVATE_PEM: &str =
    concat!(env!("CARGO_MANIFEST_DIR"), "/tests/fixtures/rogue_private.pem");

/// Install a test log subscriber once per test binary
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("svc_token=debug")
        .with_test_writer()
        .try_init();
}

pub fn clock() -> Arc<ManualClock> {
    Arc::new(ManualClock::new(NOW))
}

/// HMAC store holding a single `name → secret` entry
pub fn hmac_store(algorithm: Algorithm, name: &str, secret: &str) -> Arc<KeyStore> {
    Arc::new(
        KeyStore::builder(algorithm)
            .key(name, secret)
            .build()
            .expect("hmac store"),
    )
}

/// RS256 store signing as billing with its private key
pub fn rsa_signing_store(private_pem: &str) -> Arc<KeyStore> {
    Arc::new(
        KeyStore::builder(Algorithm::RS256)
            .key("billing", private_pem)
            .build()
            .expect("rsa signing store"),
    )
}

/// RS256 store verifying billing with its public key
pub fn rsa_verifying_store() -> Arc<KeyStore> {
    Arc::new(
        KeyStore::builder(Algorithm::RS256)
            .key("billing", BILLING_PUBLIC_PEM)
            .build()
            .expect("rsa verifying store"),
    )
}

pub fn issuer(keys: Arc<KeyStore>, name: &str, clock: Arc<ManualClock>) -> TokenIssuer {
    TokenIssuer::new(keys).with_issuer(name).with_clock(clock)
}

pub fn verifier(keys: Arc<KeyStore>, clock: Arc<ManualClock>) -> TokenVerifier {
    TokenVerifier::new(keys).with_clock(clock)
}

/// Base64url-encode a JSON value as a token segment
pub fn segment(value: &Value) -> String {
    URL_SAFE_NO_PAD.encode(serde_json::to_vec(value).expect("json"))
}

/// Decode a token's payload without any checks
pub fn payload(token: &str) -> Value {
    let part = token.split('.').nth(1).expect("payload segment");
    serde_json::from_slice(&URL_SAFE_NO_PAD.decode(part).expect("base64")).expect("json")
}
