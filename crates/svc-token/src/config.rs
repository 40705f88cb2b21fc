//! Token configuration
//!
//! [`TokenConfig`] carries everything a service needs to act as an issuer, a
//! verifier or both. It can be built in code or loaded from a TOML, YAML or
//! JSON file, with `SVC_TOKEN__*` environment variables overriding file values:
//!
//! ```toml
//! issuer = "billing"
//! algorithm = "HS256"
//! signing_key = "s3cr3t"
//! token_expire_seconds = 60
//! service_name = "billing"
//!
//! [key_mappings]
//! billing = "s3cr3t"
//! shipping = "sh1pp1ng"
//! ```
//!
//! For `RS256`, `signing_key` and the `key_mappings` values are paths to PEM
//! files rather than secrets.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tracing::{error, warn};

use crate::codec::Algorithm;
use crate::error::ConfigError;
use crate::issuer::{DEFAULT_TOKEN_LIFETIME_SECS, TokenIssuer};
use crate::keys::KeyStore;
use crate::verifier::TokenVerifier;

/// Environment variable prefix used by [`TokenConfig::from_file`]
pub const ENV_PREFIX: &str = "SVC_TOKEN";

/// Key name used for the signing key when no issuer is configured
pub const DEFAULT_SIGNING_KEY_NAME: &str = "default";

/// Issuer and verifier configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TokenConfig {
    /// Name written to `iss` and used as the signing key name
    pub issuer: Option<String>,
    /// Signing algorithm: `RS256`, `HS256`, `HS384` or `HS512`
    pub algorithm: String,
    /// Signing secret, or PEM private key path for `RS256`
    pub signing_key: Option<SecretString>,
    /// Lifetime of issued tokens
    pub token_expire_seconds: u64,
    /// Verification keys by issuer name (secrets, or PEM public key paths)
    pub key_mappings: HashMap<String, SecretString>,
    /// This service's audience identifier
    pub service_name: Option<String>,
    /// Clock skew tolerance for `exp`
    pub leeway_seconds: u64,
}

impl Default for TokenConfig {
    fn default() -> Self {
        Self {
            issuer: None,
            algorithm: Algorithm::RS256.to_string(),
            signing_key: None,
            token_expire_seconds: DEFAULT_TOKEN_LIFETIME_SECS,
            key_mappings: HashMap::new(),
            service_name: None,
            leeway_seconds: 0,
        }
    }
}

impl TokenConfig {
    /// Load configuration from a file (TOML, YAML, or JSON)
    ///
    /// The format is detected from the extension. Environment variables with the
    /// `SVC_TOKEN__` prefix override file settings, e.g.
    /// `SVC_TOKEN__TOKEN_EXPIRE_SECONDS=30`.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The file doesn't exist
    /// - The file format is unsupported
    /// - The file contains invalid configuration
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        Self::from_file_with_prefix(path, ENV_PREFIX)
    }

    /// Load configuration from a file with a custom environment prefix
    ///
    /// # Errors
    ///
    /// Same as [`TokenConfig::from_file`].
    pub fn from_file_with_prefix(
        path: impl AsRef<Path>,
        env_prefix: &str,
    ) -> Result<Self, ConfigError> {
        use config::{Config, Environment, File, FileFormat};

        let path = path.as_ref();

        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.to_path_buf()));
        }

        let format = match path.extension().and_then(|s| s.to_str()) {
            Some("toml") => FileFormat::Toml,
            Some("yaml" | "yml") => FileFormat::Yaml,
            Some("json") => FileFormat::Json,
            _ => return Err(ConfigError::UnsupportedFormat),
        };

        let config = Config::builder()
            .add_source(File::new(
                path.to_str().ok_or(ConfigError::UnsupportedFormat)?,
                format,
            ))
            .add_source(
                Environment::with_prefix(env_prefix)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        Ok(config.try_deserialize()?)
    }

    /// Parsed signing algorithm
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidSigningAlgorithm`] for any name outside the
    /// supported set, `none` included.
    pub fn algorithm(&self) -> Result<Algorithm, ConfigError> {
        self.algorithm
            .trim()
            .to_ascii_uppercase()
            .parse()
            .map_err(|_| {
                error!(algorithm = %self.algorithm, "Invalid signing algorithm configured");
                ConfigError::InvalidSigningAlgorithm(self.algorithm.clone())
            })
    }

    /// Check the configuration without touching any key files
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidSigningAlgorithm`] for an unsupported algorithm.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.algorithm().map(|_| ())
    }

    /// Build the single-entry store holding the signing key
    ///
    /// The entry is named after the issuer (or [`DEFAULT_SIGNING_KEY_NAME`]) and
    /// marked primary.
    ///
    /// # Errors
    ///
    /// - [`ConfigError::InvalidSigningAlgorithm`] - unsupported algorithm
    /// - [`ConfigError::MissingSigningKey`] - no signing key configured
    /// - [`ConfigError::Keys`] - the signing key is blank
    pub fn signing_store(&self) -> Result<KeyStore, ConfigError> {
        let algorithm = self.algorithm()?;
        let Some(signing_key) = &self.signing_key else {
            error!("Issuer requested but no signing key is configured");
            return Err(ConfigError::MissingSigningKey);
        };

        let name = self.issuer.as_deref().unwrap_or(DEFAULT_SIGNING_KEY_NAME);
        Ok(KeyStore::builder(algorithm)
            .key(name, signing_key.expose_secret().as_str())
            .primary(name)
            .build()?)
    }

    /// Build the store of verification keys from `key_mappings`
    ///
    /// # Errors
    ///
    /// - [`ConfigError::InvalidSigningAlgorithm`] - unsupported algorithm
    /// - [`ConfigError::Keys`] - a mapping has a blank secret or path
    pub fn verifying_store(&self) -> Result<KeyStore, ConfigError> {
        let algorithm = self.algorithm()?;
        if self.key_mappings.is_empty() {
            warn!("No key mappings configured; every token will be rejected");
        }

        Ok(KeyStore::builder(algorithm)
            .keys(
                self.key_mappings
                    .iter()
                    .map(|(name, value)| (name.as_str(), value.expose_secret().as_str())),
            )
            .build()?)
    }

    /// Build a [`TokenIssuer`] from this configuration
    ///
    /// # Errors
    ///
    /// See [`TokenConfig::signing_store`].
    pub fn issuer(&self) -> Result<TokenIssuer, ConfigError> {
        let mut issuer = TokenIssuer::new(Arc::new(self.signing_store()?))
            .with_lifetime(self.token_expire_seconds);
        if let Some(name) = &self.issuer {
            issuer = issuer.with_issuer(name.clone());
        }
        Ok(issuer)
    }

    /// Build a [`TokenVerifier`] from this configuration
    ///
    /// # Errors
    ///
    /// See [`TokenConfig::verifying_store`].
    pub fn verifier(&self) -> Result<TokenVerifier, ConfigError> {
        let mut verifier = TokenVerifier::new(Arc::new(self.verifying_store()?))
            .with_leeway(self.leeway_seconds);
        if let Some(name) = &self.service_name {
            verifier = verifier.with_service_name(name.clone());
        }
        Ok(verifier)
    }
}
