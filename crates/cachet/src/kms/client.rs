//! AWS SDK implementation of the key-service facade.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_kms::config::Region;
use aws_sdk_kms::primitives::Blob;
use aws_sdk_kms::types::{GrantConstraints, GrantOperation};

use common::{Error, NotFound, Result};

use super::{DataKey, Grant, GrantIssued, GrantSpec, KmsApi, KmsProvider};

/// Name of the encryption-context field that binds an envelope key to one
/// secret. A key ciphertext generated for secret "A" cannot be decrypted
/// under secret name "B" even with full backend access.
pub const CONTEXT_KEY: &str = "SecretName";

const POLICY_NAME: &str = "default";

/// [`KmsApi`] backed by one region's `aws_sdk_kms::Client`.
pub struct AwsKms {
    client: aws_sdk_kms::Client,
}

impl AwsKms {
    pub fn new(client: aws_sdk_kms::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl KmsApi for AwsKms {
    async fn resolve_alias(&self, alias: &str) -> Result<String> {
        let mut pages = self.client.list_aliases().into_paginator().items().send();
        while let Some(entry) = pages.next().await {
            let entry = entry.map_err(Error::backend)?;
            if entry.alias_name() == Some(alias) {
                if let Some(target) = entry.target_key_id() {
                    return Ok(target.to_string());
                }
            }
        }
        Err(NotFound::Alias(alias.to_string()).into())
    }

    async fn alias_for_key(&self, key_id: &str) -> Result<String> {
        let mut pages = self.client.list_aliases().into_paginator().items().send();
        while let Some(entry) = pages.next().await {
            let entry = entry.map_err(Error::backend)?;
            let name = entry.alias_name().unwrap_or_default();
            if name.starts_with(super::ALIAS_PREFIX) && entry.target_key_id() == Some(key_id) {
                return Ok(name.to_string());
            }
        }
        Err(NotFound::AliasForKey(key_id.to_string()).into())
    }

    async fn get_key_policy(&self, key_id: &str) -> Result<String> {
        let output = self
            .client
            .get_key_policy()
            .key_id(key_id)
            .policy_name(POLICY_NAME)
            .send()
            .await
            .map_err(Error::backend)?;
        output
            .policy()
            .map(str::to_string)
            .ok_or_else(|| Error::Backend("get_key_policy returned no policy".into()))
    }

    async fn put_key_policy(&self, key_id: &str, policy: &str) -> Result<()> {
        self.client
            .put_key_policy()
            .key_id(key_id)
            .policy_name(POLICY_NAME)
            .policy(policy)
            .send()
            .await
            .map_err(Error::backend)?;
        Ok(())
    }

    async fn list_grants(&self, key_id: &str) -> Result<Vec<Grant>> {
        let mut grants = Vec::new();
        let mut pages = self
            .client
            .list_grants()
            .key_id(key_id)
            .into_paginator()
            .items()
            .send();
        while let Some(entry) = pages.next().await {
            let entry = entry.map_err(Error::backend)?;
            grants.push(Grant {
                id: entry.grant_id().unwrap_or_default().to_string(),
                name: entry.name().unwrap_or_default().to_string(),
                grantee_principal: entry.grantee_principal().unwrap_or_default().to_string(),
                retiring_principal: entry.retiring_principal().map(str::to_string),
                operations: entry
                    .operations()
                    .iter()
                    .map(|op| op.as_str().to_string())
                    .collect(),
                encryption_context: entry
                    .constraints()
                    .and_then(|c| c.encryption_context_subset())
                    .map(|subset| subset.clone().into_iter().collect())
                    .unwrap_or_default(),
            });
        }
        Ok(grants)
    }

    async fn create_grant(&self, key_id: &str, spec: GrantSpec) -> Result<GrantIssued> {
        let mut request = self
            .client
            .create_grant()
            .key_id(key_id)
            .name(&spec.name)
            .grantee_principal(&spec.grantee_principal)
            .set_operations(Some(
                spec.operations
                    .iter()
                    .map(|op| GrantOperation::from(op.as_str()))
                    .collect(),
            ));
        if let Some(retiring) = &spec.retiring_principal {
            request = request.retiring_principal(retiring);
        }
        if !spec.encryption_context.is_empty() {
            let subset: HashMap<String, String> = spec.encryption_context.into_iter().collect();
            request = request.constraints(
                GrantConstraints::builder()
                    .set_encryption_context_subset(Some(subset))
                    .build(),
            );
        }
        let output = request.send().await.map_err(Error::backend)?;
        Ok(GrantIssued {
            grant_id: output.grant_id().unwrap_or_default().to_string(),
            grant_token: output.grant_token().unwrap_or_default().to_string(),
        })
    }

    async fn revoke_grant(&self, key_id: &str, grant_id: &str) -> Result<()> {
        self.client
            .revoke_grant()
            .key_id(key_id)
            .grant_id(grant_id)
            .send()
            .await
            .map_err(Error::backend)?;
        Ok(())
    }

    async fn generate_data_key(&self, key_id: &str, secret_name: &str) -> Result<DataKey> {
        let output = self
            .client
            .generate_data_key()
            .key_id(key_id)
            .encryption_context(CONTEXT_KEY, secret_name)
            .number_of_bytes(32)
            .send()
            .await
            .map_err(Error::backend)?;
        Ok(DataKey {
            key_id: output
                .key_id()
                .ok_or_else(|| Error::Backend("generate_data_key returned no key ID".into()))?
                .to_string(),
            plaintext: output
                .plaintext()
                .ok_or_else(|| Error::Backend("generate_data_key returned no plaintext".into()))?
                .as_ref()
                .to_vec(),
            ciphertext: output
                .ciphertext_blob()
                .ok_or_else(|| Error::Backend("generate_data_key returned no ciphertext".into()))?
                .as_ref()
                .to_vec(),
        })
    }

    async fn decrypt(&self, key_ciphertext: &[u8], secret_name: &str) -> Result<Vec<u8>> {
        let output = self
            .client
            .decrypt()
            .ciphertext_blob(Blob::new(key_ciphertext))
            .encryption_context(CONTEXT_KEY, secret_name)
            .send()
            .await
            .map_err(Error::backend)?;
        output
            .plaintext()
            .map(|blob| blob.as_ref().to_vec())
            .ok_or_else(|| Error::Backend("decrypt returned no plaintext".into()))
    }
}

/// [`KmsProvider`] building per-region clients from one shared SDK config,
/// so credentials are resolved once and reused.
pub struct AwsKmsProvider {
    config: aws_config::SdkConfig,
    endpoint: Option<String>,
}

impl AwsKmsProvider {
    /// Load the ambient SDK configuration (credential chain, default region).
    ///
    /// `endpoint` overrides the key-service endpoint for every region; this
    /// is only useful against local stand-ins of the service.
    pub async fn init(endpoint: Option<String>) -> Self {
        let config = aws_config::defaults(BehaviorVersion::latest()).load().await;
        Self { config, endpoint }
    }
}

impl KmsProvider for AwsKmsProvider {
    fn for_region(&self, region: &str) -> Arc<dyn KmsApi> {
        let mut builder = aws_sdk_kms::config::Builder::from(&self.config)
            .region(Region::new(region.to_string()));
        if let Some(endpoint) = &self.endpoint {
            builder = builder.endpoint_url(endpoint);
        }
        Arc::new(AwsKms::new(aws_sdk_kms::Client::from_conf(builder.build())))
    }

    fn ambient_region(&self) -> Option<String> {
        self.config.region().map(|region| region.to_string())
    }
}

#[cfg(test)]
mod tests {
    use crate::kms::{ALIAS_PREFIX, GRANT_PREFIX};

    #[test]
    fn grant_prefix_matches_alias_prefix_tool_name() {
        assert!(ALIAS_PREFIX.contains(GRANT_PREFIX));
    }
}
