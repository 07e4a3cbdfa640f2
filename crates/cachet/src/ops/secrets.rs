//! Put, get, list, and export.

use std::collections::BTreeMap;
use std::sync::Arc;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use tokio::task::JoinSet;
use tracing::{error, warn};

use common::record::{Key, Value, ValueList, KEY_TEMPLATE_NAME};
use common::{Error, Result};

use crate::crypto::CipherRegistry;
use crate::custody::CustodyRegistry;
use crate::store::sort;

use super::Engine;

/// Inputs for storing one secret.
pub struct PutRequest {
    /// Name of the secret.
    pub name: String,
    /// The plaintext to protect.
    pub plaintext: Vec<u8>,
    /// Explicit comma-separated key IDs. When absent, the store's key
    /// template chooses the keys.
    pub key_id: Option<String>,
    /// Custody backend for explicit key IDs.
    pub key_manager: String,
    /// Cipher label.
    pub algorithm: String,
}

impl Engine {
    /// Encrypt and store a secret under every selected key.
    ///
    /// Keys come from, in order of preference: the request's explicit key
    /// IDs; no key at all when the cipher needs none; else the store's key
    /// template. Encryption fans out one task per key and fully drains
    /// before the first error is reported. The first write to a brand-new
    /// store also seeds the template from the keys used.
    pub async fn put(&self, request: PutRequest) -> Result<()> {
        let keys = self.choose_keys(&request)?;
        let plaintext: Arc<[u8]> = Arc::from(request.plaintext.as_slice());

        let mut join = JoinSet::new();
        for (index, key) in keys.iter().cloned().enumerate() {
            let ciphers = Arc::clone(&self.ciphers);
            let custody = Arc::clone(&self.custody);
            let name = request.name.clone();
            let plaintext = Arc::clone(&plaintext);
            join.spawn(async move {
                let value = encrypt_one(&ciphers, &custody, key, &name, &plaintext).await;
                (index, value)
            });
        }
        let mut slots: Vec<Option<Result<Value>>> = (0..keys.len()).map(|_| None).collect();
        while let Some(joined) = join.join_next().await {
            let (index, value) =
                joined.map_err(|err| Error::Backend(format!("encrypt task failed: {err}")))?;
            slots[index] = Some(value);
        }
        let mut values = ValueList::new();
        for slot in slots {
            match slot {
                Some(value) => values.push(value?),
                None => return Err(Error::Backend("encrypt task never reported".into())),
            }
        }

        // A brand-new store gets a template recording the keys used here.
        if let Err(err) = self.store().get(KEY_TEMPLATE_NAME) {
            if err.is_store_missing() {
                let template: ValueList = keys
                    .into_iter()
                    .map(|key| Value {
                        key,
                        ..Default::default()
                    })
                    .collect();
                self.store().put(KEY_TEMPLATE_NAME, template)?;
            }
        }

        self.store().put(&request.name, values)
    }

    /// Decrypt a secret, trying its values in region-priority order.
    ///
    /// A value that fails to decrypt is logged and skipped; the next one is
    /// tried. The last failure surfaces only if no value succeeds.
    pub async fn get(&self, name: &str, region_priority: &[String]) -> Result<Vec<u8>> {
        let mut values = self.store().get(name)?;
        sort::sort_by_region(&mut values, region_priority);

        // Multiple values are assumed to hold the same contents; stop after
        // the first successful decryption.
        let mut last_err: Option<Error> = None;
        for value in &values {
            match self.decrypt_value(value, name).await {
                Ok(plaintext) => return Ok(plaintext),
                Err(err) => {
                    warn!(
                        key_manager = %value.key.key_manager,
                        error = %err,
                        "decryption failed, trying next value"
                    );
                    last_err = Some(err);
                }
            }
        }
        Err(last_err.unwrap_or_else(|| common::NotFound::Name(name.to_string()).into()))
    }

    /// Names of all stored secrets, template entry excluded.
    pub fn list(&self) -> Result<Vec<String>> {
        Ok(self
            .store()
            .get_all()?
            .into_keys()
            .filter(|name| name != KEY_TEMPLATE_NAME)
            .collect())
    }

    /// Decrypt every secret in the store.
    ///
    /// Per-secret failures are logged, counted, and skipped so the rest of
    /// the export proceeds; a non-zero failure count still fails the whole
    /// call with [`Error::ExportIncomplete`].
    pub async fn export(&self, region_priority: &[String]) -> Result<BTreeMap<String, Vec<u8>>> {
        let entries = self.store().get_all()?;
        let mut output = BTreeMap::new();
        let mut failures = 0usize;
        for (name, mut values) in entries {
            if name == KEY_TEMPLATE_NAME {
                continue;
            }
            sort::sort_by_region(&mut values, region_priority);
            let mut plaintext = None;
            for value in &values {
                match self.decrypt_value(value, &name).await {
                    Ok(decrypted) => {
                        plaintext = Some(decrypted);
                        break;
                    }
                    Err(err) => {
                        warn!(name = %name, error = %err, "unable to decrypt value")
                    }
                }
            }
            match plaintext {
                Some(decrypted) => {
                    output.insert(name, decrypted);
                }
                None => {
                    error!(name = %name, "unable to decrypt secret, skipping");
                    failures += 1;
                }
            }
        }
        if failures > 0 {
            return Err(Error::ExportIncomplete(failures));
        }
        Ok(output)
    }

    async fn decrypt_value(&self, value: &Value, name: &str) -> Result<Vec<u8>> {
        let cipher = self.ciphers.get(&value.key.algorithm)?;
        let key_plaintext = if cipher.needs_key() {
            let manager = self.custody.get(&value.key.key_manager)?;
            let key_ciphertext = value.key_ciphertext_bytes()?;
            Some(
                manager
                    .decrypt(&value.key.key_id, &key_ciphertext, name)
                    .await?,
            )
        } else {
            None
        };
        let ciphertext = value.ciphertext_bytes()?;
        cipher.decrypt(key_plaintext.as_deref().unwrap_or(&[]), &ciphertext)
    }

    fn choose_keys(&self, request: &PutRequest) -> Result<Vec<Key>> {
        if let Some(ids) = request.key_id.as_deref().filter(|ids| !ids.is_empty()) {
            return Ok(ids
                .split(',')
                .map(|id| Key {
                    key_id: id.trim().to_string(),
                    key_manager: request.key_manager.clone(),
                    algorithm: request.algorithm.clone(),
                })
                .collect());
        }
        let cipher = self.ciphers.get(&request.algorithm)?;
        if !cipher.needs_key() {
            return Ok(vec![Key {
                algorithm: request.algorithm.clone(),
                ..Default::default()
            }]);
        }
        self.store().get_key_ids()
    }
}

async fn encrypt_one(
    ciphers: &CipherRegistry,
    custody: &CustodyRegistry,
    key: Key,
    name: &str,
    plaintext: &[u8],
) -> Result<Value> {
    let cipher = ciphers.get(&key.algorithm)?;
    let mut value = Value {
        key: Key {
            algorithm: key.algorithm.clone(),
            ..Default::default()
        },
        ..Default::default()
    };
    let mut envelope_key = None;
    if cipher.needs_key() {
        let manager = custody.get(&key.key_manager)?;
        let envelope = manager.generate_envelope_key(&key.key_id, name).await?;
        value.key.key_manager = manager.label().to_string();
        value.key.key_id = envelope.resolved_id.clone();
        value.key_ciphertext = STANDARD.encode(&envelope.ciphertext);
        envelope_key = Some(envelope);
    }
    let key_bytes = envelope_key
        .as_ref()
        .map(|envelope| envelope.plaintext.as_slice())
        .unwrap_or(&[]);
    let ciphertext = cipher.encrypt(key_bytes, plaintext)?;
    value.ciphertext = STANDARD.encode(ciphertext);
    Ok(value)
}
