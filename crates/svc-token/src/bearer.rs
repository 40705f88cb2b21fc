//! `Authorization: Bearer <token>` helpers

/// Scheme prefix of a bearer `Authorization` header value
pub const BEARER_PREFIX: &str = "Bearer ";

/// Format a token as an `Authorization` header value
pub fn format_bearer(token: &str) -> String {
    format!("{BEARER_PREFIX}{token}")
}

/// Extract the token from an `Authorization` header value
///
/// The scheme name is matched case-insensitively (RFC 7235). Returns `None`
/// when the value does not use the `Bearer` scheme or the token part is empty.
///
/// ```rust
/// use svc_token::bearer::extract_bearer;
///
/// assert_eq!(extract_bearer("Bearer abc.def.ghi"), Some("abc.def.ghi"));
/// assert_eq!(extract_bearer("bearer abc.def.ghi"), Some("abc.def.ghi"));
/// assert_eq!(extract_bearer("Basic dXNlcjpwdw=="), None);
/// ```
pub fn extract_bearer(header_value: &str) -> Option<&str> {
    let (scheme, token) = header_value.split_once(' ')?;
    let token = token.trim();
    (scheme.eq_ignore_ascii_case(BEARER_PREFIX.trim_end()) && !token.is_empty()).then_some(token)
}
