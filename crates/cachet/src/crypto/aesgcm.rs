//! AES-256-GCM with the nonce appended to the ciphertext.

use aes_gcm::aead::rand_core::RngCore;
use aes_gcm::aead::{Aead, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Nonce};

use common::{Error, Result};

use super::Cipher;

/// Registry label for this cipher.
pub const LABEL: &str = "aes256gcm";

/// Byte length of the key (32 bytes = 256 bits).
pub const KEY_LEN: usize = 32;

/// Byte length of the nonce (12 bytes = 96 bits).
pub const NONCE_LEN: usize = 12;

/// AES-256-GCM AEAD. Output layout is `ciphertext || nonce`.
///
/// The nonce is drawn fresh from the OS CSPRNG on every call. GCM nonce
/// reuse under one key breaks both confidentiality and authentication, so
/// the nonce is never derived or counter-based.
pub struct AesGcm256;

impl Cipher for AesGcm256 {
    fn label(&self) -> &'static str {
        LABEL
    }

    fn needs_key(&self) -> bool {
        true
    }

    fn encrypt(&self, key: &[u8], plaintext: &[u8]) -> Result<Vec<u8>> {
        let cipher = build_cipher(key)?;
        let mut nonce_bytes = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let mut output = cipher
            .encrypt(nonce, plaintext)
            .map_err(|_| Error::Authentication)?;
        output.extend_from_slice(&nonce_bytes);
        Ok(output)
    }

    fn decrypt(&self, key: &[u8], ciphertext: &[u8]) -> Result<Vec<u8>> {
        let cipher = build_cipher(key)?;
        if ciphertext.len() < NONCE_LEN {
            return Err(Error::Authentication);
        }
        let (sealed, nonce_bytes) = ciphertext.split_at(ciphertext.len() - NONCE_LEN);
        cipher
            .decrypt(Nonce::from_slice(nonce_bytes), sealed)
            .map_err(|_| Error::Authentication)
    }
}

fn build_cipher(key: &[u8]) -> Result<Aes256Gcm> {
    Aes256Gcm::new_from_slice(key).map_err(|_| Error::InvalidKeyLength {
        expected: KEY_LEN,
        got: key.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nonce_is_appended() {
        let key = [9u8; KEY_LEN];
        let ciphertext = AesGcm256.encrypt(&key, b"hello").unwrap();
        // 5 bytes of plaintext + 16-byte tag + 12-byte nonce.
        assert_eq!(ciphertext.len(), 33);
    }

    #[test]
    fn short_key_rejected() {
        let err = AesGcm256.encrypt(&[0u8; 24], b"x").unwrap_err();
        assert!(matches!(
            err,
            Error::InvalidKeyLength {
                expected: KEY_LEN,
                got: 24
            }
        ));
    }

    #[test]
    fn truncated_ciphertext_fails_closed() {
        let key = [9u8; KEY_LEN];
        assert!(matches!(
            AesGcm256.decrypt(&key, &[0u8; 8]).unwrap_err(),
            Error::Authentication
        ));
    }
}
