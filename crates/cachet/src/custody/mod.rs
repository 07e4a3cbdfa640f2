//! Pluggable envelope-key providers.
//!
//! A custody backend generates envelope keys and decrypts their wrapped form.
//! The secret name is bound into both operations as authenticated context, so
//! a key ciphertext produced for one secret cannot be unwrapped under another
//! secret's name even with full backend access.

pub mod kms;
pub mod testing;

pub use kms::KmsCustody;
pub use testing::TestingCustody;

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;

use common::{Error, Result};

/// Fixed-size buffer for plaintext key material.
///
/// The buffer is overwritten with zeroes on drop to minimise the window
/// during which plaintext key bytes live in RAM, and never prints its
/// contents, not even in debug builds.
pub struct KeyBytes(Vec<u8>);

impl KeyBytes {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.0
    }
}

impl Drop for KeyBytes {
    fn drop(&mut self) {
        self.0.iter_mut().for_each(|b| *b = 0);
    }
}

impl std::fmt::Debug for KeyBytes {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("KeyBytes([REDACTED])")
    }
}

/// The key used in envelope encryption.
#[derive(Debug)]
pub struct EnvelopeKey {
    /// Fully-qualified identifier of the custody key that produced this one.
    pub resolved_id: String,
    /// Plaintext key bytes, scoped to one encrypt or decrypt call. Never
    /// persisted.
    pub plaintext: KeyBytes,
    /// The same key encrypted by the custody backend; this is what the
    /// store records.
    pub ciphertext: Vec<u8>,
}

/// A service that can generate envelope keys and unwrap them later.
#[async_trait]
pub trait KeyCustody: Send + Sync {
    /// The registry label for this backend.
    fn label(&self) -> &'static str;

    /// Generate a fresh envelope key under `key_id`, bound to `secret_name`.
    async fn generate_envelope_key(&self, key_id: &str, secret_name: &str)
        -> Result<EnvelopeKey>;

    /// Unwrap a previously generated envelope key. Fails unless the same
    /// `secret_name` binding is presented.
    async fn decrypt(
        &self,
        key_id: &str,
        key_ciphertext: &[u8],
        secret_name: &str,
    ) -> Result<Vec<u8>>;
}

impl std::fmt::Debug for dyn KeyCustody {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyCustody")
            .field("label", &self.label())
            .finish()
    }
}

/// Explicit custody-backend lookup table.
pub struct CustodyRegistry {
    backends: BTreeMap<&'static str, Arc<dyn KeyCustody>>,
}

impl CustodyRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self {
            backends: BTreeMap::new(),
        }
    }

    /// A registry holding the kms backend (over the given provider) and the
    /// fixed-key testing backend.
    pub fn builtin(provider: Arc<dyn crate::kms::KmsProvider>) -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(KmsCustody::new(provider)));
        registry.register(Arc::new(TestingCustody));
        registry
    }

    /// Add a backend under its own label.
    pub fn register(&mut self, backend: Arc<dyn KeyCustody>) {
        self.backends.insert(backend.label(), backend);
    }

    /// Look up a backend by label.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] for an unknown label.
    pub fn get(&self, label: &str) -> Result<Arc<dyn KeyCustody>> {
        self.backends
            .get(label)
            .cloned()
            .ok_or_else(|| Error::configuration(format!("unsupported key manager '{label}'")))
    }

    /// Registered labels, sorted.
    pub fn labels(&self) -> Vec<&'static str> {
        self.backends.keys().copied().collect()
    }

    /// The backend used when the caller does not choose one.
    pub fn default_label(&self) -> &'static str {
        kms::KMS_LABEL
    }
}

impl Default for CustodyRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_bytes_redacted_in_debug() {
        let key = KeyBytes::new(vec![0xFF; 32]);
        assert!(format!("{key:?}").contains("REDACTED"));
    }

    #[test]
    fn unknown_backend_is_a_configuration_error() {
        let mut registry = CustodyRegistry::new();
        registry.register(Arc::new(TestingCustody));
        let err = registry.get("vault").unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
        assert_eq!(registry.labels(), vec!["testing"]);
        assert_eq!(registry.default_label(), "kms");
    }
}
