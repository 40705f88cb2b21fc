//! Caller context carried inside tokens
//!
//! [`Context`] is the one claims container used on both sides of a token:
//! issuers build it before signing, verifiers reconstitute it from verified
//! claims. Well-known fields are typed; everything else lives in an open map of
//! extra claims.
//!
//! # Wire shape
//!
//! | Field          | Claim         | Type            |
//! |----------------|---------------|-----------------|
//! | `subject`      | `sub`         | string          |
//! | `scopes`       | `scopes`      | array of string |
//! | `permissions`  | `permissions` | array of string |
//! | `verified`     | `verified`    | bool            |
//! | `client_ip`    | `ip`          | string          |
//! | `extra_claims` | (top level)   | any             |
//!
//! Unset fields are omitted, never written as `null`.

use std::collections::HashMap;

use serde::{Serialize, Serializer};
use serde_json::Value;

use crate::codec::ClaimMap;

const SUBJECT: &str = "sub";
const SCOPES: &str = "scopes";
const PERMISSIONS: &str = "permissions";
const VERIFIED: &str = "verified";
const CLIENT_IP: &str = "ip";

/// Claims owned by the token itself rather than by the context
pub const REGISTERED_CLAIMS: [&str; 6] = ["jti", "iat", "exp", "nbf", "iss", "aud"];

const CONTEXT_CLAIMS: [&str; 5] = [SUBJECT, SCOPES, PERMISSIONS, VERIFIED, CLIENT_IP];

/// Identity and authorization attributes of a caller
///
/// Never mutated once built; merging returns a new value.
///
/// # Example
///
/// ```rust
/// use svc_token::Context;
///
/// let ctx = Context::builder()
///     .subject("user-42")
///     .scope("read:invoices")
///     .permission("invoices.view")
///     .verified(true)
///     .build();
///
/// assert!(ctx.has_scope("read:invoices"));
/// assert!(!ctx.has_scope("write:invoices"));
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Context {
    subject: Option<String>,
    scopes: Vec<String>,
    permissions: Vec<String>,
    verified: Option<bool>,
    client_ip: Option<String>,
    extra_claims: HashMap<String, Value>,
}

impl Context {
    /// Create builder for constructing a context
    pub fn builder() -> ContextBuilder {
        ContextBuilder::default()
    }

    /// Empty context explicitly marked unverified
    ///
    /// Used by pipelines that continue without a valid token.
    pub fn anonymous() -> Self {
        Self {
            verified: Some(false),
            ..Self::default()
        }
    }

    /// Subject (caller id)
    pub fn subject(&self) -> Option<&str> {
        self.subject.as_deref()
    }

    /// Granted scopes, without duplicates
    pub fn scopes(&self) -> &[String] {
        &self.scopes
    }

    /// Granted permissions, without duplicates
    pub fn permissions(&self) -> &[String] {
        &self.permissions
    }

    /// Whether the caller's identity was verified upstream
    pub fn verified(&self) -> Option<bool> {
        self.verified
    }

    /// Originating client IP address
    pub fn client_ip(&self) -> Option<&str> {
        self.client_ip.as_deref()
    }

    /// Additional claims
    pub fn extra_claims(&self) -> &HashMap<String, Value> {
        &self.extra_claims
    }

    /// Get an extra claim deserialized into `T`
    ///
    /// ```rust
    /// use svc_token::Context;
    /// use serde_json::json;
    ///
    /// let ctx = Context::builder().claim("tenant_id", json!("acme")).build();
    /// assert_eq!(ctx.extra_claim::<String>("tenant_id").as_deref(), Some("acme"));
    /// ```
    pub fn extra_claim<T: serde::de::DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.extra_claims
            .get(key)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    // ═══════════════════════════════════════════════════
    // AUTHORIZATION HELPERS
    // ═══════════════════════════════════════════════════

    /// Check if the context holds a specific scope
    pub fn has_scope(&self, scope: &str) -> bool {
        self.scopes.iter().any(|s| s == scope)
    }

    /// Check if the context holds any of the scopes
    pub fn has_any_scope(&self, scopes: &[&str]) -> bool {
        scopes.iter().any(|s| self.has_scope(s))
    }

    /// Check if the context holds all of the scopes
    pub fn has_all_scopes(&self, scopes: &[&str]) -> bool {
        scopes.iter().all(|s| self.has_scope(s))
    }

    /// Check if the context holds a specific permission
    pub fn has_permission(&self, perm: &str) -> bool {
        self.permissions.iter().any(|p| p == perm)
    }

    /// Check if the context holds any of the permissions
    pub fn has_any_permission(&self, perms: &[&str]) -> bool {
        perms.iter().any(|p| self.has_permission(p))
    }

    /// Check if the context holds all of the permissions
    pub fn has_all_permissions(&self, perms: &[&str]) -> bool {
        perms.iter().all(|p| self.has_permission(p))
    }

    // ═══════════════════════════════════════════════════
    // CLAIM MAPPING
    // ═══════════════════════════════════════════════════

    /// Merge `claims` into this context, returning a new one
    ///
    /// On a key collision the new claim wins, including for the well-known
    /// fields (`sub`, `scopes`, `permissions`, `verified`, `ip`). Registered token
    /// claims (`jti`, `exp`, ...) are ignored.
    pub fn with_extra_claims(&self, claims: ClaimMap) -> Self {
        let mut merged = self.to_claim_map();
        merged.extend(claims);
        Self::reconstitute(&merged)
    }

    /// Flatten into the wire claim mapping, omitting unset fields
    pub fn to_claim_map(&self) -> ClaimMap {
        let mut map: ClaimMap = self
            .extra_claims
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        if let Some(subject) = &self.subject {
            map.insert(SUBJECT.to_string(), Value::String(subject.clone()));
        }
        if !self.scopes.is_empty() {
            map.insert(SCOPES.to_string(), string_array(&self.scopes));
        }
        if !self.permissions.is_empty() {
            map.insert(PERMISSIONS.to_string(), string_array(&self.permissions));
        }
        if let Some(verified) = self.verified {
            map.insert(VERIFIED.to_string(), Value::Bool(verified));
        }
        if let Some(ip) = &self.client_ip {
            map.insert(CLIENT_IP.to_string(), Value::String(ip.clone()));
        }

        map
    }

    /// Rebuild a context from a claim mapping
    ///
    /// Never fails: missing or mistyped fields are left unset or empty.
    /// Whether the claims deserve trust is the verifier's decision.
    pub fn reconstitute(claims: &ClaimMap) -> Self {
        let subject = claims.get(SUBJECT).and_then(|v| match v {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        });

        let extra_claims = claims
            .iter()
            .filter(|(k, _)| !is_reserved(k))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        Self {
            subject,
            scopes: dedup(strings(claims.get(SCOPES))),
            permissions: dedup(strings(claims.get(PERMISSIONS))),
            verified: claims.get(VERIFIED).and_then(Value::as_bool),
            client_ip: claims.get(CLIENT_IP).and_then(Value::as_str).map(str::to_string),
            extra_claims,
        }
    }
}

impl Serialize for Context {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_claim_map().serialize(serializer)
    }
}

fn is_reserved(key: &str) -> bool {
    CONTEXT_CLAIMS.contains(&key) || REGISTERED_CLAIMS.contains(&key)
}

fn string_array(items: &[String]) -> Value {
    Value::Array(items.iter().cloned().map(Value::String).collect())
}

fn strings(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_string)
            .collect(),
        _ => Vec::new(),
    }
}

/// Drop repeats, keeping first-occurrence order
fn dedup(items: Vec<String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(items.len());
    for item in items {
        if !out.contains(&item) {
            out.push(item);
        }
    }
    out
}

// ═══════════════════════════════════════════════════════════
// BUILDER PATTERN
// ═══════════════════════════════════════════════════════════

/// Builder for [`Context`]
///
/// Building never fails. Duplicate scopes and permissions are collapsed, and
/// extra claims that use a reserved name are dropped so they cannot shadow a
/// typed field or a registered token claim.
#[derive(Debug, Default)]
pub struct ContextBuilder {
    subject: Option<String>,
    scopes: Vec<String>,
    permissions: Vec<String>,
    verified: Option<bool>,
    client_ip: Option<String>,
    extra_claims: HashMap<String, Value>,
}

impl ContextBuilder {
    /// Set subject
    pub fn subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = Some(subject.into());
        self
    }

    /// Set scopes
    pub fn scopes<I, S>(mut self, scopes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.scopes = scopes.into_iter().map(Into::into).collect();
        self
    }

    /// Add a single scope
    pub fn scope(mut self, scope: impl Into<String>) -> Self {
        self.scopes.push(scope.into());
        self
    }

    /// Set permissions
    pub fn permissions<I, S>(mut self, permissions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.permissions = permissions.into_iter().map(Into::into).collect();
        self
    }

    /// Add a single permission
    pub fn permission(mut self, permission: impl Into<String>) -> Self {
        self.permissions.push(permission.into());
        self
    }

    /// Set verified flag
    pub fn verified(mut self, verified: bool) -> Self {
        self.verified = Some(verified);
        self
    }

    /// Set client IP
    pub fn client_ip(mut self, ip: impl Into<String>) -> Self {
        self.client_ip = Some(ip.into());
        self
    }

    /// Add an extra claim
    pub fn claim(mut self, key: impl Into<String>, value: Value) -> Self {
        self.extra_claims.insert(key.into(), value);
        self
    }

    /// Add several extra claims
    pub fn claims(mut self, claims: ClaimMap) -> Self {
        self.extra_claims.extend(claims);
        self
    }

    /// Build the `Context`
    pub fn build(self) -> Context {
        let mut extra_claims = self.extra_claims;
        extra_claims.retain(|k, _| !is_reserved(k));

        Context {
            subject: self.subject,
            scopes: dedup(self.scopes),
            permissions: dedup(self.permissions),
            verified: self.verified,
            client_ip: self.client_ip,
            extra_claims,
        }
    }
}

// ═══════════════════════════════════════════════════════════
// TESTS
// ═══════════════════════════════════════════════════════════
