//! Facade over the regional key-custody service.
//!
//! The coordinator and the kms custody backend talk to the service through
//! [`KmsApi`] and obtain per-region handles from a [`KmsProvider`]. SDK types
//! never cross the facade: grants and data keys are engine-owned structs, so
//! the rest of the engine can be exercised against mocks.

mod client;

pub use client::{AwsKms, AwsKmsProvider, CONTEXT_KEY};

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;

use common::Result;

/// Prefix of every alias managed by this tool.
pub const ALIAS_PREFIX: &str = "alias/cachet-";

/// Prefix of every grant name created by this tool.
pub const GRANT_PREFIX: &str = "cachet-";

/// The alias name for a key label.
pub fn alias_name(label: &str) -> String {
    format!("{ALIAS_PREFIX}{label}")
}

/// A data key generated by the custody service.
pub struct DataKey {
    /// Fully-qualified identifier of the custody key that wrapped this one.
    pub key_id: String,
    /// Raw symmetric key bytes. Never persisted.
    pub plaintext: Vec<u8>,
    /// The same key, encrypted by the custody service.
    pub ciphertext: Vec<u8>,
}

/// A grant as reported by the custody service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Grant {
    pub id: String,
    pub name: String,
    pub grantee_principal: String,
    pub retiring_principal: Option<String>,
    pub operations: Vec<String>,
    pub encryption_context: BTreeMap<String, String>,
}

/// Template for creating one grant. The per-region key ID is substituted by
/// the coordinator; everything else is shared across regions.
#[derive(Debug, Clone, Default, Serialize)]
pub struct GrantSpec {
    pub name: String,
    pub grantee_principal: String,
    pub retiring_principal: Option<String>,
    pub operations: Vec<String>,
    /// Encryption-context subset constraint. Empty means unconstrained.
    pub encryption_context: BTreeMap<String, String>,
}

/// Identifiers returned for a freshly created grant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GrantIssued {
    pub grant_id: String,
    pub grant_token: String,
}

/// Region-scoped key-custody operations.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait KmsApi: Send + Sync {
    /// Resolve an alias name to the key ID it targets.
    ///
    /// # Errors
    ///
    /// [`common::NotFound::Alias`] when the alias does not exist in this region.
    async fn resolve_alias(&self, alias_name: &str) -> Result<String>;

    /// Reverse lookup: the tool-managed alias pointing at `key_id`.
    ///
    /// # Errors
    ///
    /// [`common::NotFound::AliasForKey`] when no prefixed alias targets the key.
    async fn alias_for_key(&self, key_id: &str) -> Result<String>;

    /// Fetch the default key policy document.
    async fn get_key_policy(&self, key_id: &str) -> Result<String>;

    /// Replace the default key policy document.
    async fn put_key_policy(&self, key_id: &str, policy: &str) -> Result<()>;

    /// List every grant on the key, following pagination.
    async fn list_grants(&self, key_id: &str) -> Result<Vec<Grant>>;

    /// Create a grant on the key.
    async fn create_grant(&self, key_id: &str, spec: GrantSpec) -> Result<GrantIssued>;

    /// Revoke a grant by ID.
    async fn revoke_grant(&self, key_id: &str, grant_id: &str) -> Result<()>;

    /// Generate a 32-byte data key under `key_id`, binding `secret_name`
    /// into the operation as authenticated context.
    async fn generate_data_key(&self, key_id: &str, secret_name: &str) -> Result<DataKey>;

    /// Decrypt a wrapped data key. The same `secret_name` binding supplied
    /// at generation time must be presented, or the call fails.
    async fn decrypt(&self, key_ciphertext: &[u8], secret_name: &str) -> Result<Vec<u8>>;
}

/// Hands out region-scoped [`KmsApi`] handles.
pub trait KmsProvider: Send + Sync {
    /// A handle for the given region.
    fn for_region(&self, region: &str) -> Arc<dyn KmsApi>;

    /// The region used when a key identifier carries none.
    fn ambient_region(&self) -> Option<String>;
}
