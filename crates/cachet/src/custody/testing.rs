//! Fixed-key custody backend for integration tests.

use async_trait::async_trait;

use common::Result;

use super::{EnvelopeKey, KeyBytes, KeyCustody};

/// Registry label for the fixed-key backend.
pub const TESTING_LABEL: &str = "testing";

const PLAINTEXT: [u8; 32] = [b'x'; 32];
const CIPHERTEXT: [u8; 32] = [b'y'; 32];

/// Returns constant key material. Never use for production data.
pub struct TestingCustody;

#[async_trait]
impl KeyCustody for TestingCustody {
    fn label(&self) -> &'static str {
        TESTING_LABEL
    }

    async fn generate_envelope_key(
        &self,
        _key_id: &str,
        _secret_name: &str,
    ) -> Result<EnvelopeKey> {
        Ok(EnvelopeKey {
            resolved_id: "resolved".to_string(),
            plaintext: KeyBytes::new(PLAINTEXT.to_vec()),
            ciphertext: CIPHERTEXT.to_vec(),
        })
    }

    async fn decrypt(
        &self,
        _key_id: &str,
        _key_ciphertext: &[u8],
        _secret_name: &str,
    ) -> Result<Vec<u8>> {
        Ok(PLAINTEXT.to_vec())
    }
}
