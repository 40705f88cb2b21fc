//! Tower Layer attaching verified contexts to requests

use std::sync::Arc;
use tower::Layer;

use crate::verifier::TokenVerifier;

use super::service::ContextService;
use super::{ContextLayerConfig, ContextPolicy};

/// Tower Layer that wraps services with [`ContextService`]
#[derive(Debug, Clone)]
pub struct ContextLayer {
    verifier: Arc<TokenVerifier>,
    config: ContextLayerConfig,
}

impl ContextLayer {
    /// Create a layer with the default (fail-closed) configuration
    pub fn new(verifier: Arc<TokenVerifier>) -> Self {
        Self::with_config(verifier, ContextLayerConfig::default())
    }

    /// Create a layer with a custom configuration
    pub fn with_config(verifier: Arc<TokenVerifier>, config: ContextLayerConfig) -> Self {
        Self { verifier, config }
    }

    /// Set the policy for requests without a valid token
    #[must_use]
    pub fn policy(mut self, policy: ContextPolicy) -> Self {
        self.config.policy = policy;
        self
    }

    /// Let requests without a valid token through as anonymous
    #[must_use]
    pub fn optional(self) -> Self {
        self.policy(ContextPolicy::Optional)
    }
}

impl<S> Layer<S> for ContextLayer {
    type Service = ContextService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        ContextService::new(inner, Arc::clone(&self.verifier), self.config.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Algorithm, KeyStore};

    fn verifier() -> Arc<TokenVerifier> {
        let keys = KeyStore::builder(Algorithm::HS256)
            .key("billing", "s3cr3t")
            .build()
            .unwrap();
        Arc::new(TokenVerifier::new(Arc::new(keys)))
    }

    #[test]
    fn test_layer_creation() {
        let layer = ContextLayer::new(verifier());
        assert_eq!(layer.config.policy, ContextPolicy::Require);
    }

    #[test]
    fn test_layer_builder_pattern() {
        let layer = ContextLayer::new(verifier()).optional();
        assert_eq!(layer.config.policy, ContextPolicy::Optional);

        let layer = ContextLayer::with_config(verifier(), ContextLayerConfig::optional())
            .policy(ContextPolicy::Require);
        assert_eq!(layer.config.policy, ContextPolicy::Require);
    }
}
