//! Custody backend delegating to the regional key service.

use std::sync::Arc;

use async_trait::async_trait;

use common::{Error, Result};

use crate::arn::Arn;
use crate::kms::KmsProvider;

use super::{EnvelopeKey, KeyBytes, KeyCustody};

/// Registry label for the key-service backend.
pub const KMS_LABEL: &str = "kms";

/// Envelope keys wrapped by the remote key service.
///
/// The target region is resolved from the key identifier's ARN region field;
/// a bare key ID or alias falls back to the provider's ambient region.
pub struct KmsCustody {
    provider: Arc<dyn KmsProvider>,
}

impl KmsCustody {
    pub fn new(provider: Arc<dyn KmsProvider>) -> Self {
        Self { provider }
    }

    fn region_for(&self, key_id: &str) -> Result<String> {
        if let Ok(arn) = Arn::parse(key_id) {
            if !arn.region.is_empty() {
                return Ok(arn.region);
            }
        }
        self.provider.ambient_region().ok_or_else(|| {
            Error::configuration(format!(
                "key '{key_id}' carries no region and no ambient region is configured"
            ))
        })
    }
}

#[async_trait]
impl KeyCustody for KmsCustody {
    fn label(&self) -> &'static str {
        KMS_LABEL
    }

    async fn generate_envelope_key(
        &self,
        key_id: &str,
        secret_name: &str,
    ) -> Result<EnvelopeKey> {
        let client = self.provider.for_region(&self.region_for(key_id)?);
        let data_key = client.generate_data_key(key_id, secret_name).await?;
        Ok(EnvelopeKey {
            resolved_id: data_key.key_id,
            plaintext: KeyBytes::new(data_key.plaintext),
            ciphertext: data_key.ciphertext,
        })
    }

    async fn decrypt(
        &self,
        key_id: &str,
        key_ciphertext: &[u8],
        secret_name: &str,
    ) -> Result<Vec<u8>> {
        let client = self.provider.for_region(&self.region_for(key_id)?);
        client.decrypt(key_ciphertext, secret_name).await
    }
}
