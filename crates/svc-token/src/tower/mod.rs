//! # Tower middleware
//!
//! [`ContextLayer`] runs the "acquire context" step in front of any
//! `http::Request` service: it verifies the bearer token and inserts the
//! resulting [`Context`](crate::Context) into the request extensions.
//!
//! ```rust,ignore
//! use tower::ServiceBuilder;
//! use svc_token::tower::ContextLayer;
//!
//! let service = ServiceBuilder::new()
//!     .layer(ContextLayer::new(verifier))
//!     .service(my_handler);
//!
//! // In the handler
//! let ctx = req.extensions().get::<svc_token::Context>();
//! ```
//!
//! ## Policies
//!
//! | Policy                      | Missing or invalid token                          |
//! |-----------------------------|---------------------------------------------------|
//! | [`ContextPolicy::Require`]  | `401` with `WWW-Authenticate: Bearer`; inner service not called |
//! | [`ContextPolicy::Optional`] | [`Context::anonymous`](crate::Context::anonymous) inserted; request continues |

mod layer;
mod service;

pub use layer::ContextLayer;
pub use service::{ContextService, ContextServiceFuture};

/// What to do with requests that carry no valid token
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ContextPolicy {
    /// Reject with `401 Unauthorized`
    #[default]
    Require,
    /// Continue with an anonymous, unverified context
    Optional,
}

/// Configuration for the context layer
#[derive(Debug, Clone)]
pub struct ContextLayerConfig {
    /// Handling of missing or invalid tokens
    pub policy: ContextPolicy,
    /// Header name to extract the bearer token from (default: "Authorization")
    pub auth_header: String,
}

impl Default for ContextLayerConfig {
    fn default() -> Self {
        Self {
            policy: ContextPolicy::Require,
            auth_header: http::header::AUTHORIZATION.as_str().to_string(),
        }
    }
}

impl ContextLayerConfig {
    /// Config that lets requests without a valid token through as anonymous
    #[must_use]
    pub fn optional() -> Self {
        Self {
            policy: ContextPolicy::Optional,
            ..Default::default()
        }
    }

    /// Set the authorization header name
    #[must_use]
    pub fn auth_header(mut self, header: impl Into<String>) -> Self {
        self.auth_header = header.into();
        self
    }
}
