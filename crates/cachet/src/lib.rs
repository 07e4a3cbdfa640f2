//! `cachet` — envelope-encrypted secrets file engine.
//!
//! Secrets are stored by name in a single YAML file. Each value is encrypted
//! under a fresh envelope key, and the envelope key is wrapped by a pluggable
//! key-custody backend. Custody keys replicated across several regions under
//! one alias are coordinated as a single logical key with one access policy.
//!
//! Layering, leaf first:
//! - [`crypto`] — the cipher registry (capability trait + explicit registry).
//! - [`custody`] — envelope-key providers (kms backend, fixed-key testing backend).
//! - [`store`] — the file-backed secret store and region-priority ordering.
//! - [`kms`] — the key-service facade the custody and coordinator layers call.
//! - [`coordinator`] — the multi-region key coordinator.
//! - [`ops`] — top-level operations composing the above.
//!
//! Command-line parsing, resource provisioning, the interactive policy
//! editor, and caller-identity resolution are external collaborators; the
//! engine exposes the operations and traits they drive.

pub mod arn;
pub mod config;
pub mod coordinator;
pub mod crypto;
pub mod custody;
pub mod kms;
pub mod ops;
pub mod store;
pub mod telemetry;

pub use common::{Error, NotFound, Result};
pub use config::Config;
pub use ops::Engine;
