//! Token lifecycle tests
//!
//! Issue → present → verify across services, with simulated time:
//! - Context round-trip for every supported algorithm
//! - Expiry after the configured lifetime
//! - Audience restriction between services
//! - Standard claim integrity and token id uniqueness
//! - Engines built from a configuration file

mod common;

use std::collections::HashSet;
use std::io::Write;

use common::*;
use pretty_assertions::assert_eq;
use serde_json::json;
use svc_token::{Algorithm, Context, Rejection, TokenConfig};

fn invoice_reader() -> Context {
    Context::builder()
        .subject("user-42")
        .scopes(["read:invoices"])
        .build()
}

/// Test: billing signs with HS256, a peer holding the same secret verifies
#[test]
fn test_billing_hs256_scenario() {
    init_tracing();

    // GIVEN: billing's HS256 secret registered on both sides
    let keys = hmac_store(Algorithm::HS256, "billing", "s3cr3t");
    let clock = clock();
    let issuer = issuer(keys.clone(), "billing", clock.clone());
    let verifier = verifier(keys, clock.clone());

    // WHEN: billing issues a token for user-42
    let token = issuer.issue(None, Some(&invoice_reader()), &[]).unwrap();

    // THEN: it verifies and carries exactly the granted scope
    let ctx = verifier.verify(&token).unwrap();
    assert_eq!(ctx.subject(), Some("user-42"));
    assert!(ctx.has_scope("read:invoices"));
    assert!(!ctx.has_scope("write:invoices"));

    // AND: replaying it 61 seconds later fails as expired
    clock.advance(61);
    let err = verifier.verify(&token).unwrap_err();
    assert!(err.reason().is_expired());
    assert_eq!(err.to_string(), "Unauthorized.");
}

/// Test: a token addressed to shipping is refused by billing
#[test]
fn test_audience_between_services() {
    let keys = hmac_store(Algorithm::HS256, "billing", "s3cr3t");
    let clock = clock();
    let token = issuer(keys.clone(), "billing", clock.clone())
        .issue(None, Some(&invoice_reader()), &["shipping".to_string()])
        .unwrap();

    let at_billing = verifier(keys.clone(), clock.clone()).with_service_name("billing");
    assert_eq!(
        at_billing.verify(&token).unwrap_err().reason(),
        &Rejection::NotIntendedAudience
    );

    let at_shipping = verifier(keys, clock).with_service_name("shipping");
    assert_eq!(at_shipping.verify(&token).unwrap().subject(), Some("user-42"));
}

/// Test: every field of a context survives issue → verify for every algorithm
#[test]
fn test_context_round_trip_all_algorithms() {
    let ctx = Context::builder()
        .subject("user-42")
        .scopes(["read:invoices", "read:orders"])
        .permissions(["invoices.view"])
        .verified(true)
        .client_ip("203.0.113.9")
        .claim("tenant_id", json!("acme"))
        .claim("limits", json!({"daily": 10, "burst": [1, 2]}))
        .build();

    for algorithm in [Algorithm::HS256, Algorithm::HS384, Algorithm::HS512] {
        let keys = hmac_store(algorithm, "billing", "a-long-shared-secret");
        let token = issuer(keys.clone(), "billing", clock())
            .issue(None, Some(&ctx), &[])
            .unwrap();
        let verified = verifier(keys, clock()).verify(&token).unwrap();
        assert_eq!(verified, ctx, "{algorithm}");
    }

    let token = issuer(rsa_signing_store(BILLING_PRIVATE_PEM), "billing", clock())
        .issue(None, Some(&ctx), &[])
        .unwrap();
    let verified = verifier(rsa_verifying_store(), clock()).verify(&token).unwrap();
    assert_eq!(verified, ctx);
}

/// Test: tokens without a context verify to an empty context
#[test]
fn test_issue_without_context() {
    let keys = hmac_store(Algorithm::HS512, "billing", "s3cr3t");
    let token = issuer(keys.clone(), "billing", clock())
        .issue(Some("billing"), None, &[])
        .unwrap();

    assert_eq!(verifier(keys, clock()).verify(&token).unwrap(), Context::default());
}

/// Test: standard claims are always the issuer's, never the context's
#[test]
fn test_context_cannot_override_standard_claims() {
    let keys = hmac_store(Algorithm::HS256, "billing", "s3cr3t");
    let clock = clock();

    let mut forged = serde_json::Map::new();
    forged.insert("jti".into(), json!("fixed-id"));
    forged.insert("exp".into(), json!(u64::MAX));
    forged.insert("iat".into(), json!(0));
    let ctx = invoice_reader().with_extra_claims(forged);

    let token = issuer(keys.clone(), "billing", clock.clone())
        .issue(None, Some(&ctx), &[])
        .unwrap();
    let claims = payload(&token);

    assert_ne!(claims["jti"], json!("fixed-id"));
    assert_eq!(claims["iat"], json!(NOW));
    assert_eq!(claims["exp"], json!(NOW + 60));

    clock.advance(60);
    assert!(verifier(keys, clock).verify(&token).unwrap_err().reason().is_expired());
}

/// Test: every issuance gets a fresh token id
#[test]
fn test_distinct_token_ids() {
    let keys = hmac_store(Algorithm::HS256, "billing", "s3cr3t");
    let issuer = issuer(keys, "billing", clock());

    let ids: HashSet<String> = (0..50)
        .map(|_| {
            let token = issuer.issue(None, None, &[]).unwrap();
            payload(&token)["jti"].as_str().unwrap().to_string()
        })
        .collect();
    assert_eq!(ids.len(), 50);
}

/// Test: one verifier trusts several issuers, each with its own key
#[test]
fn test_multiple_issuers() {
    let keys = std::sync::Arc::new(
        svc_token::KeyStore::builder(Algorithm::HS256)
            .key("billing", "billing-secret")
            .key("shipping", "shipping-secret")
            .build()
            .unwrap(),
    );
    let billing = issuer(
        hmac_store(Algorithm::HS256, "billing", "billing-secret"),
        "billing",
        clock(),
    );
    let shipping = issuer(
        hmac_store(Algorithm::HS256, "shipping", "shipping-secret"),
        "shipping",
        clock(),
    );
    let gateway = verifier(keys, clock());

    for token in [
        billing.issue(None, Some(&invoice_reader()), &[]).unwrap(),
        shipping.issue(None, Some(&invoice_reader()), &[]).unwrap(),
    ] {
        assert_eq!(gateway.verify(&token).unwrap(), invoice_reader());
    }
}

/// Test: issuer and verifier built from one RS256 configuration file
#[test]
fn test_engines_from_config_file() {
    let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
    write!(
        file,
        r#"
issuer = "billing"
algorithm = "RS256"
signing_key = "{private}"
token_expire_seconds = 120
service_name = "billing"

[key_mappings]
billing = "{public}"
"#,
        private = BILLING_PRIVATE_PEM,
        public = BILLING_PUBLIC_PEM,
    )
    .unwrap();

    let config = TokenConfig::from_file_with_prefix(file.path(), "SVC_TOKEN_LIFECYCLE_TEST").unwrap();
    let clock = clock();
    let issuer = config.issuer().unwrap().with_clock(clock.clone());
    let verifier = config.verifier().unwrap().with_clock(clock.clone());

    let token = issuer
        .issue(None, Some(&invoice_reader()), &["billing".to_string()])
        .unwrap();
    assert_eq!(verifier.verify(&token).unwrap(), invoice_reader());

    clock.advance(119);
    assert!(verifier.authorize(&token).is_ok());
    clock.advance(1);
    assert!(verifier.authorize(&token).unwrap_err().reason().is_expired());
}
