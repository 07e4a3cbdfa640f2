//! Symmetric ciphers behind one capability interface.
//!
//! Ciphers are stateless and selected by string label through an explicit
//! [`CipherRegistry`] built once at startup and passed by reference — there
//! is no global lookup table.

mod aesgcm;
mod plain;
mod xchacha;

pub use aesgcm::AesGcm256;
pub use plain::Plain;
pub use xchacha::XChaCha;

use std::collections::BTreeMap;
use std::sync::Arc;

use common::{Error, Result};

/// Label of the cipher used when none is configured.
pub const DEFAULT_CIPHER: &str = xchacha::LABEL;

/// A named, stateless symmetric cipher.
///
/// Authenticated ciphers must fail closed: decrypting with the wrong key or
/// a corrupted ciphertext returns [`Error::Authentication`], never garbage
/// plaintext.
pub trait Cipher: Send + Sync {
    /// The registry label for this cipher.
    fn label(&self) -> &'static str;

    /// Whether this cipher requires an envelope key. Keyless ciphers are
    /// passed an empty key slice.
    fn needs_key(&self) -> bool;

    /// Encrypt `plaintext` under `key`. Authenticated ciphers generate a
    /// fresh random nonce on every call.
    fn encrypt(&self, key: &[u8], plaintext: &[u8]) -> Result<Vec<u8>>;

    /// Decrypt `ciphertext` under `key`.
    fn decrypt(&self, key: &[u8], ciphertext: &[u8]) -> Result<Vec<u8>>;
}

impl std::fmt::Debug for dyn Cipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cipher")
            .field("label", &self.label())
            .finish()
    }
}

/// Explicit cipher lookup table.
pub struct CipherRegistry {
    ciphers: BTreeMap<&'static str, Arc<dyn Cipher>>,
}

impl CipherRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self {
            ciphers: BTreeMap::new(),
        }
    }

    /// A registry holding every built-in cipher.
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(Plain));
        registry.register(Arc::new(XChaCha));
        registry.register(Arc::new(AesGcm256));
        registry
    }

    /// Add a cipher under its own label. A later registration under the same
    /// label replaces the earlier one.
    pub fn register(&mut self, cipher: Arc<dyn Cipher>) {
        self.ciphers.insert(cipher.label(), cipher);
    }

    /// Look up a cipher by label.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] for an unknown label.
    pub fn get(&self, label: &str) -> Result<Arc<dyn Cipher>> {
        self.ciphers
            .get(label)
            .cloned()
            .ok_or_else(|| Error::configuration(format!("unsupported cipher '{label}'")))
    }

    /// Registered labels, sorted.
    pub fn labels(&self) -> Vec<&'static str> {
        self.ciphers.keys().copied().collect()
    }

    /// The label used when the caller does not choose one.
    pub fn default_label(&self) -> &'static str {
        DEFAULT_CIPHER
    }
}

impl Default for CipherRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    use aes_gcm::aead::rand_core::RngCore;
    use aes_gcm::aead::OsRng;

    fn random_key() -> Vec<u8> {
        let mut key = vec![0u8; 32];
        OsRng.fill_bytes(&mut key);
        key
    }

    #[test]
    fn unknown_label_is_a_configuration_error() {
        let registry = CipherRegistry::builtin();
        let err = registry.get("rot13").unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }

    #[test]
    fn labels_are_sorted_and_complete() {
        let registry = CipherRegistry::builtin();
        assert_eq!(registry.labels(), vec!["aes256gcm", "none", "xchacha"]);
        assert_eq!(registry.default_label(), "xchacha");
    }

    #[test]
    fn round_trip_every_keyed_cipher() {
        let registry = CipherRegistry::builtin();
        let long = b"beef".repeat(128);
        let mut inputs: Vec<&[u8]> = vec![b"", b" ", b"a", b"ab", b"12345678", b"123456789"];
        inputs.push(&long);
        let key = random_key();
        let wrong_key = random_key();
        for label in registry.labels() {
            let cipher = registry.get(label).unwrap();
            if !cipher.needs_key() {
                continue;
            }
            for &input in &inputs {
                let ciphertext = cipher.encrypt(&key, input).unwrap();
                // Wrong key must be rejected.
                assert!(
                    cipher.decrypt(&wrong_key, &ciphertext).is_err(),
                    "{label}: wrong key accepted"
                );
                // Correct key round-trips.
                let plaintext = cipher.decrypt(&key, &ciphertext).unwrap();
                assert_eq!(plaintext, input, "{label}: round trip mismatch");
                // A few flipped bytes must be rejected.
                let mut tampered = ciphertext.clone();
                let offset = (OsRng.next_u32() as usize) % tampered.len().saturating_sub(4).max(1);
                let end = (offset + 4).min(tampered.len());
                for byte in tampered[offset..end].iter_mut() {
                    *byte ^= 0xFF;
                }
                assert!(
                    cipher.decrypt(&key, &tampered).is_err(),
                    "{label}: tampered ciphertext accepted"
                );
            }
        }
    }

    #[test]
    fn nonces_are_unique_across_encryptions() {
        let registry = CipherRegistry::builtin();
        let key = random_key();
        for (label, nonce_of) in [
            ("xchacha", (|ct: &[u8]| ct[..24].to_vec()) as fn(&[u8]) -> Vec<u8>),
            ("aes256gcm", |ct: &[u8]| ct[ct.len() - 12..].to_vec()),
        ] {
            let cipher = registry.get(label).unwrap();
            let mut nonces = HashSet::new();
            for _ in 0..100 {
                let mut message = vec![0u8; 4096];
                OsRng.fill_bytes(&mut message);
                let ciphertext = cipher.encrypt(&key, &message).unwrap();
                nonces.insert(nonce_of(&ciphertext));
            }
            assert_eq!(nonces.len(), 100, "{label}: repeated nonce observed");
        }
    }
}
