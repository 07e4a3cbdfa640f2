//! Identity cipher for no-encryption mode and tests.

use common::Result;

use super::Cipher;

/// Registry label for the identity cipher.
pub const LABEL: &str = "none";

/// Passes data through unchanged and needs no key.
pub struct Plain;

impl Cipher for Plain {
    fn label(&self) -> &'static str {
        LABEL
    }

    fn needs_key(&self) -> bool {
        false
    }

    fn encrypt(&self, _key: &[u8], plaintext: &[u8]) -> Result<Vec<u8>> {
        Ok(plaintext.to_vec())
    }

    fn decrypt(&self, _key: &[u8], ciphertext: &[u8]) -> Result<Vec<u8>> {
        Ok(ciphertext.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn passes_data_through() {
        assert_eq!(Plain.encrypt(&[], b"data").unwrap(), b"data");
        assert_eq!(Plain.decrypt(&[], b"data").unwrap(), b"data");
        assert!(!Plain.needs_key());
    }
}
