//! Immutable key store
//!
//! A [`KeyStore`] maps logical names (issuer names or key ids) to key material
//! for a single [`Algorithm`]. It is assembled once through [`KeyStoreBuilder`]
//! and then only read. There is no way to add, replace or remove an entry on a
//! built store:
//!
//! ```compile_fail
//! use svc_token::{Algorithm, KeyStore};
//!
//! let store = KeyStore::builder(Algorithm::HS256).key("billing", "s3cr3t").build()?;
//! store.insert("billing", "forged");
//! # Ok::<(), svc_token::KeyError>(())
//! ```
//!
//! # Key shapes
//!
//! - HMAC stores (`HS256`/`HS384`/`HS512`) hold the shared secret itself.
//! - RSA stores (`RS256`) hold a path to a PEM file. The file is read on every
//!   resolution, so a replaced file is picked up without a restart.

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;

use secrecy::{ExposeSecret, Secret, SecretString, SecretVec};
use tracing::{debug, error};

use crate::codec::Algorithm;
use crate::error::KeyError;

/// Resolved key bytes paired with the algorithm they are meant for
pub struct KeyMaterial {
    algorithm: Algorithm,
    bytes: SecretVec<u8>,
}

impl KeyMaterial {
    /// Wrap raw key bytes (a shared secret or PEM document)
    pub fn new(algorithm: Algorithm, bytes: Vec<u8>) -> Self {
        Self {
            algorithm,
            bytes: Secret::new(bytes),
        }
    }

    /// Algorithm this material is used with
    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    pub(crate) fn bytes(&self) -> &[u8] {
        self.bytes.expose_secret()
    }
}

// Manual Debug impl so key bytes never reach logs
impl fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyMaterial")
            .field("algorithm", &self.algorithm)
            .field("bytes", &"<redacted>")
            .finish()
    }
}

/// Where an entry's bytes come from
#[derive(Debug)]
enum KeySource {
    /// Shared secret held in memory
    Secret(SecretString),
    /// PEM file dereferenced on resolution
    File(PathBuf),
}

/// Read-only mapping from key name to key material
#[derive(Debug)]
pub struct KeyStore {
    algorithm: Algorithm,
    entries: HashMap<String, KeySource>,
    primary: Option<String>,
}

impl KeyStore {
    /// Start building a store for `algorithm`
    pub fn builder(algorithm: Algorithm) -> KeyStoreBuilder {
        KeyStoreBuilder::new(algorithm)
    }

    /// Algorithm shared by every entry
    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the store has no entries
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whether `name` is registered
    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Registered names, in no particular order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Resolve `name` to key material
    ///
    /// # Errors
    ///
    /// Returns [`KeyError::KeyNotFound`] if the name is empty, unknown, or
    /// refers to a key file that cannot be read.
    pub fn resolve(&self, name: &str) -> Result<KeyMaterial, KeyError> {
        if name.is_empty() {
            return Err(KeyError::KeyNotFound(String::new()));
        }

        let source = self
            .entries
            .get(name)
            .ok_or_else(|| KeyError::KeyNotFound(name.to_string()))?;

        let bytes = match source {
            KeySource::Secret(secret) => secret.expose_secret().as_bytes().to_vec(),
            KeySource::File(path) => std::fs::read(path).map_err(|e| {
                debug!(key = name, path = %path.display(), error = %e, "Key file unreadable");
                KeyError::KeyNotFound(name.to_string())
            })?,
        };

        Ok(KeyMaterial::new(self.algorithm, bytes))
    }

    /// Name of the default entry: the explicit primary, or the only entry
    ///
    /// # Errors
    ///
    /// Returns [`KeyError::AmbiguousSigningKey`] when there is no primary and the
    /// store does not hold exactly one entry.
    pub fn primary_name(&self) -> Result<&str, KeyError> {
        if let Some(primary) = &self.primary {
            return Ok(primary.as_str());
        }

        match self.entries.keys().next() {
            Some(only) if self.entries.len() == 1 => Ok(only.as_str()),
            _ => Err(KeyError::AmbiguousSigningKey(self.entries.len())),
        }
    }

    /// Resolve the default entry
    ///
    /// # Errors
    ///
    /// See [`KeyStore::primary_name`] and [`KeyStore::resolve`].
    pub fn primary(&self) -> Result<KeyMaterial, KeyError> {
        let name = self.primary_name()?;
        self.resolve(name)
    }
}

/// Builder for [`KeyStore`]
///
/// # Example
///
/// ```rust
/// use svc_token::{Algorithm, KeyStore};
///
/// let store = KeyStore::builder(Algorithm::HS256)
///     .key("billing", "s3cr3t")
///     .key("shipping", "0ther")
///     .primary("billing")
///     .build()?;
///
/// assert_eq!(store.primary_name()?, "billing");
/// # Ok::<(), svc_token::KeyError>(())
/// ```
#[derive(Debug)]
pub struct KeyStoreBuilder {
    algorithm: Algorithm,
    entries: HashMap<String, KeySource>,
    primary: Option<String>,
    rejected: Option<String>,
    empty: Option<String>,
}

impl KeyStoreBuilder {
    fn new(algorithm: Algorithm) -> Self {
        Self {
            algorithm,
            entries: HashMap::new(),
            primary: None,
            rejected: None,
            empty: None,
        }
    }

    /// Register `value` under `name`
    ///
    /// For RSA stores `value` is a path to a PEM file, for HMAC stores it is the
    /// shared secret. Registering a name twice, or with a blank value, makes
    /// [`build`](Self::build) fail; the first registration is kept.
    pub fn key(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        let name = name.into();
        let value = value.into();

        if self.entries.contains_key(&name) {
            self.rejected.get_or_insert(name);
            return self;
        }

        if value.trim().is_empty() {
            self.empty.get_or_insert(name);
            return self;
        }

        let source = if self.algorithm.is_asymmetric() {
            KeySource::File(PathBuf::from(value))
        } else {
            KeySource::Secret(SecretString::new(value))
        };
        self.entries.insert(name, source);
        self
    }

    /// Register every `(name, value)` pair, see [`key`](Self::key)
    pub fn keys<I, K, V>(self, pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        pairs
            .into_iter()
            .fold(self, |builder, (name, value)| builder.key(name, value))
    }

    /// Mark `name` as the default entry
    pub fn primary(mut self, name: impl Into<String>) -> Self {
        self.primary = Some(name.into());
        self
    }

    /// Freeze the store
    ///
    /// # Errors
    ///
    /// - [`KeyError::ImmutableStoreViolation`] if a name was registered twice
    /// - [`KeyError::EmptyKey`] if a secret or key path is blank
    /// - [`KeyError::KeyNotFound`] if the primary names an unregistered entry
    pub fn build(self) -> Result<KeyStore, KeyError> {
        if let Some(name) = self.rejected {
            return Err(KeyError::ImmutableStoreViolation(name));
        }

        if let Some(name) = self.empty {
            error!(key = %name, algorithm = %self.algorithm, "Refusing blank key value");
            return Err(KeyError::EmptyKey(name));
        }

        if let Some(primary) = &self.primary
            && !self.entries.contains_key(primary)
        {
            return Err(KeyError::KeyNotFound(primary.clone()));
        }

        Ok(KeyStore {
            algorithm: self.algorithm,
            entries: self.entries,
            primary: self.primary,
        })
    }
}
