//! Error taxonomy shared across crates.

use std::path::PathBuf;
use thiserror::Error;

/// Convenience alias used throughout the engine.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Top-level engine error type.
///
/// Fan-out operations wrap per-region failures in [`Error::Region`] and
/// collect them into [`Error::Aggregate`], so callers can report every
/// region's outcome without matching on message strings.
#[derive(Debug, Error)]
pub enum Error {
    /// Unknown cipher or key-custody label, or an invalid configuration value.
    #[error("configuration: {0}")]
    Configuration(String),

    /// A named entity is absent. Recoverable by the caller.
    #[error(transparent)]
    NotFound(#[from] NotFound),

    /// Two regions disagree about the key policy document.
    #[error("the policies in region {left_region} and {right_region} do not match")]
    PolicyMismatch {
        left_region: String,
        right_region: String,
    },

    /// An authenticated decryption failed: wrong key, tampered ciphertext,
    /// or wrong secret-name binding. No partial plaintext is ever returned.
    #[error("ciphertext failed authentication")]
    Authentication,

    /// A symmetric key had the wrong length for the selected cipher.
    #[error("invalid key length: expected {expected} bytes, got {got}")]
    InvalidKeyLength { expected: usize, got: usize },

    /// An error scoped to the region it occurred in.
    #[error("{region}: {source}")]
    Region {
        region: String,
        #[source]
        source: Box<Error>,
    },

    /// Per-region failures collected from one fan-out call.
    #[error("{}", render_list(.0))]
    Aggregate(Vec<Error>),

    /// One or more secrets could not be decrypted during a bulk export.
    #[error("{0} secret(s) could not be exported")]
    ExportIncomplete(usize),

    /// The secret store exists but could not be parsed or serialized.
    #[error("secret store is malformed: {0}")]
    Format(String),

    /// A persisted base64 field could not be decoded.
    #[error("invalid base64: {0}")]
    Decode(#[from] base64::DecodeError),

    /// The key-custody service reported an error.
    #[error("key service: {0}")]
    Backend(String),

    /// Filesystem error reading or writing the store.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// The kinds of entity that can be reported missing.
#[derive(Debug, Error)]
pub enum NotFound {
    /// The store file has not been created yet. Distinct from a parse
    /// failure on an existing file.
    #[error("secret store {} does not exist", .0.display())]
    Store(PathBuf),

    /// The named secret is not in the store.
    #[error("name not found: {0}")]
    Name(String),

    /// The reserved key-template entry is absent.
    #[error("no key template found; specify a key ID or add a '_keys' entry")]
    Template,

    /// The key alias does not exist in the queried region.
    #[error("key alias '{0}' not found")]
    Alias(String),

    /// No engine-managed alias points at the given key.
    #[error("no alias found for key {0}")]
    AliasForKey(String),

    /// The named grant does not exist in the queried region.
    #[error("grant '{0}' not found")]
    Grant(String),
}

impl Error {
    /// Shorthand for a [`Error::Configuration`] with a formatted message.
    pub fn configuration(msg: impl Into<String>) -> Self {
        Error::Configuration(msg.into())
    }

    /// Shorthand for a [`Error::Backend`] wrapping a displayable source.
    pub fn backend(err: impl std::fmt::Display) -> Self {
        Error::Backend(err.to_string())
    }

    /// Wrap `source` with the region it occurred in.
    pub fn region(region: impl Into<String>, source: Error) -> Self {
        Error::Region {
            region: region.into(),
            source: Box::new(source),
        }
    }

    /// True if this error means the store file simply does not exist yet,
    /// as opposed to existing but being unreadable.
    pub fn is_store_missing(&self) -> bool {
        matches!(self, Error::NotFound(NotFound::Store(_)))
    }
}

fn render_list(errs: &[Error]) -> String {
    errs.iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}
