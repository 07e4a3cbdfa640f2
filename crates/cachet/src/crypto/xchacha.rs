//! XChaCha20-Poly1305 with the nonce prepended to the ciphertext.

use chacha20poly1305::aead::rand_core::RngCore;
use chacha20poly1305::aead::{Aead, KeyInit, OsRng};
use chacha20poly1305::{XChaCha20Poly1305, XNonce};

use common::{Error, Result};

use super::Cipher;

/// Registry label for this cipher.
pub const LABEL: &str = "xchacha";

/// Byte length of the key (32 bytes = 256 bits).
pub const KEY_LEN: usize = 32;

/// Byte length of the extended nonce (24 bytes = 192 bits).
pub const NONCE_LEN: usize = 24;

/// XChaCha20-Poly1305 AEAD. Output layout is `nonce || ciphertext`.
///
/// The 192-bit nonce is drawn fresh from the OS CSPRNG on every call, which
/// keeps random nonces collision-free even under heavy key reuse.
pub struct XChaCha;

impl Cipher for XChaCha {
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
        let nonce = XNonce::from_slice(&nonce_bytes);

        let sealed = cipher
            .encrypt(nonce, plaintext)
            .map_err(|_| Error::Authentication)?;

        let mut output = Vec::with_capacity(NONCE_LEN + sealed.len());
        output.extend_from_slice(&nonce_bytes);
        output.extend_from_slice(&sealed);
        Ok(output)
    }

    fn decrypt(&self, key: &[u8], ciphertext: &[u8]) -> Result<Vec<u8>> {
        let cipher = build_cipher(key)?;
        if ciphertext.len() < NONCE_LEN {
            return Err(Error::Authentication);
        }
        let (nonce_bytes, sealed) = ciphertext.split_at(NONCE_LEN);
        cipher
            .decrypt(XNonce::from_slice(nonce_bytes), sealed)
            .map_err(|_| Error::Authentication)
    }
}

fn build_cipher(key: &[u8]) -> Result<XChaCha20Poly1305> {
    XChaCha20Poly1305::new_from_slice(key).map_err(|_| Error::InvalidKeyLength {
        expected: KEY_LEN,
        got: key.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nonce_is_prepended() {
        let key = [7u8; KEY_LEN];
        let ciphertext = XChaCha.encrypt(&key, b"hello").unwrap();
        let (nonce, sealed) = ciphertext.split_at(NONCE_LEN);
        assert_eq!(nonce.len(), NONCE_LEN);
        // 5 bytes of plaintext + 16-byte tag.
        assert_eq!(sealed.len(), 21);
    }

    #[test]
    fn short_key_rejected() {
        let err = XChaCha.encrypt(&[0u8; 16], b"x").unwrap_err();
        assert!(matches!(
            err,
            Error::InvalidKeyLength {
                expected: KEY_LEN,
                got: 16
            }
        ));
    }

    #[test]
    fn truncated_ciphertext_fails_closed() {
        let key = [7u8; KEY_LEN];
        assert!(matches!(
            XChaCha.decrypt(&key, &[0u8; 10]).unwrap_err(),
            Error::Authentication
        ));
    }
}
