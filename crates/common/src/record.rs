//! Persisted secret-store records.
//!
//! The store file is a single YAML document mapping secret names to lists of
//! encrypted values. Field presence is significant and must round-trip: a
//! value produced by a keyless cipher carries no `key_ciphertext`, and a
//! template entry carries no ciphertexts at all.

use std::collections::BTreeMap;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Name of the reserved entry that configures the default set of keys used
/// when a `put` does not name one explicitly.
pub const KEY_TEMPLATE_NAME: &str = "_keys";

/// Key and cipher settings for one [`Value`]. Immutable once written.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Key {
    /// Identifier of the custody key the value is encrypted under.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub key_id: String,

    /// Which custody backend provided the key.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub key_manager: String,

    /// Cipher used for the value.
    pub algorithm: String,
}

/// One encrypted entry of a secret. Replaced wholesale on re-`put`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Value {
    #[serde(flatten)]
    pub key: Key,

    /// The envelope key that `ciphertext` is encrypted with, itself encrypted
    /// by the custody backend. Base64, standard alphabet. Empty when the
    /// cipher needs no key.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub key_ciphertext: String,

    /// The plaintext encrypted with the envelope key. Base64, standard
    /// alphabet.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub ciphertext: String,
}

impl Value {
    /// The base64-decoded envelope-key ciphertext.
    pub fn key_ciphertext_bytes(&self) -> Result<Vec<u8>> {
        Ok(STANDARD.decode(&self.key_ciphertext)?)
    }

    /// The base64-decoded value ciphertext.
    pub fn ciphertext_bytes(&self) -> Result<Vec<u8>> {
        Ok(STANDARD.decode(&self.ciphertext)?)
    }
}

/// Ordered list of values for one secret name. Multiple entries exist when a
/// secret is protected under several custody keys at once; readers try them
/// in order and stop at the first success.
pub type ValueList = Vec<Value>;

/// The whole-file contents: secret name to value list.
pub type EntryMap = BTreeMap<String, ValueList>;

/// Returns only the values provided by the given custody backend.
pub fn filter_by_key_manager(values: &[Value], manager: &str) -> ValueList {
    values
        .iter()
        .filter(|value| value.key.key_manager == manager)
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_value() -> Value {
        Value {
            key: Key {
                key_id: "arn:aws:kms:us-west-2:123456789012:key/abc".into(),
                key_manager: "kms".into(),
                algorithm: "xchacha".into(),
            },
            key_ciphertext: STANDARD.encode(b"wrapped"),
            ciphertext: STANDARD.encode(b"sealed"),
        }
    }

    #[test]
    fn value_yaml_round_trip() {
        let value = sample_value();
        let yaml = serde_yaml::to_string(&vec![value.clone()]).unwrap();
        let parsed: ValueList = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(parsed, vec![value]);
    }

    #[test]
    fn keyless_value_omits_key_fields() {
        let value = Value {
            key: Key {
                algorithm: "none".into(),
                ..Default::default()
            },
            ciphertext: STANDARD.encode(b"plain"),
            ..Default::default()
        };
        let yaml = serde_yaml::to_string(&vec![value]).unwrap();
        assert!(!yaml.contains("key_ciphertext"));
        assert!(!yaml.contains("key_id"));
        assert!(!yaml.contains("key_manager"));
        assert!(yaml.contains("algorithm: none"));
    }

    #[test]
    fn base64_accessors_decode() {
        let value = sample_value();
        assert_eq!(value.key_ciphertext_bytes().unwrap(), b"wrapped");
        assert_eq!(value.ciphertext_bytes().unwrap(), b"sealed");
    }

    #[test]
    fn corrupt_base64_is_an_error() {
        let mut value = sample_value();
        value.ciphertext = "!!not base64!!".into();
        assert!(value.ciphertext_bytes().is_err());
    }

    #[test]
    fn filter_by_key_manager_selects_subset() {
        let kms = sample_value();
        let mut testing = sample_value();
        testing.key.key_manager = "testing".into();
        let values = vec![kms.clone(), testing.clone(), kms.clone()];
        assert_eq!(filter_by_key_manager(&values, "kms"), vec![kms.clone(), kms]);
        assert_eq!(filter_by_key_manager(&values, "testing"), vec![testing]);
        assert!(filter_by_key_manager(&values, "vault").is_empty());
    }
}
