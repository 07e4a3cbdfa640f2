//! Top-level operations composing the cipher registry, key custody, the
//! secret store, and the multi-region coordinator.
//!
//! Every dependency is passed in explicitly — there is no ambient global
//! state — so the same operations run against production backends or the
//! fixed-key testing backend unchanged.

pub mod grants;
pub mod policy;
mod secrets;

pub use secrets::PutRequest;

use std::sync::Arc;

use crate::crypto::CipherRegistry;
use crate::custody::CustodyRegistry;
use crate::store::FileStore;

/// Handles shared by the secret-level operations.
pub struct Engine {
    store: FileStore,
    ciphers: Arc<CipherRegistry>,
    custody: Arc<CustodyRegistry>,
}

impl Engine {
    pub fn new(store: FileStore, ciphers: Arc<CipherRegistry>, custody: Arc<CustodyRegistry>) -> Self {
        Self {
            store,
            ciphers,
            custody,
        }
    }

    /// The underlying store.
    pub fn store(&self) -> &FileStore {
        &self.store
    }
}
