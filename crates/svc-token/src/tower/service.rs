//! Tower Service implementation for context acquisition
//!
//! For every `http::Request<B>` the service:
//! 1. Reads the bearer token from the configured header
//! 2. Verifies it with the [`TokenVerifier`]
//! 3. Inserts the verified [`Context`] into the request extensions
//! 4. Applies the [`ContextPolicy`] when there is no valid token

use std::sync::Arc;
use std::task::Poll;

use futures_util::future::BoxFuture;
use http::header::WWW_AUTHENTICATE;
use http::{HeaderMap, HeaderValue, StatusCode};
use tower_service::Service;
use tracing::debug;

use crate::context::Context;
use crate::error::Unauthorized;
use crate::verifier::TokenVerifier;

use super::{ContextLayerConfig, ContextPolicy};

/// Tower Service that verifies bearer tokens and attaches a [`Context`]
#[derive(Debug, Clone)]
pub struct ContextService<S> {
    inner: S,
    verifier: Arc<TokenVerifier>,
    config: ContextLayerConfig,
}

impl<S> ContextService<S> {
    /// Create a new context service
    pub fn new(inner: S, verifier: Arc<TokenVerifier>, config: ContextLayerConfig) -> Self {
        Self {
            inner,
            verifier,
            config,
        }
    }

    /// Get a reference to the inner service
    pub fn inner(&self) -> &S {
        &self.inner
    }

    /// Get a mutable reference to the inner service
    pub fn inner_mut(&mut self) -> &mut S {
        &mut self.inner
    }

    /// Verify the request's token, `Ok(None)` when there is none
    fn acquire(&self, headers: &HeaderMap) -> Result<Option<Context>, Unauthorized> {
        let Some(value) = headers.get(&self.config.auth_header) else {
            debug!(header = %self.config.auth_header, "No bearer token on request");
            return Ok(None);
        };

        // Non-visible ASCII can never be a token; let the verifier reject it uniformly
        let value = value.to_str().unwrap_or_default();
        self.verifier.verify_bearer(value).map(Some)
    }
}

/// Future type for context service responses
pub type ContextServiceFuture<T, E> = BoxFuture<'static, Result<T, E>>;

fn unauthorized<ResBody: Default>() -> http::Response<ResBody> {
    let mut response = http::Response::new(ResBody::default());
    *response.status_mut() = StatusCode::UNAUTHORIZED;
    response
        .headers_mut()
        .insert(WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
    response
}

impl<S, B, ResBody> Service<http::Request<B>> for ContextService<S>
where
    S: Service<http::Request<B>, Response = http::Response<ResBody>> + Clone + Send + 'static,
    S::Future: Send + 'static,
    B: Send + 'static,
    ResBody: Default + Send + 'static,
{
    type Response = http::Response<ResBody>;
    type Error = S::Error;
    type Future = ContextServiceFuture<Self::Response, Self::Error>;

    fn poll_ready(&mut self, cx: &mut std::task::Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: http::Request<B>) -> Self::Future {
        let context = match (self.acquire(req.headers()), self.config.policy) {
            (Ok(Some(context)), _) => context,
            (Ok(None) | Err(_), ContextPolicy::Optional) => Context::anonymous(),
            (Ok(None) | Err(_), ContextPolicy::Require) => {
                return Box::pin(async { Ok::<Self::Response, S::Error>(unauthorized()) });
            }
        };
        req.extensions_mut().insert(context);

        // Call the clone that was driven to readiness
        let inner = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, inner);
        Box::pin(async move { inner.call(req).await })
    }
}
