//! Parsing and normalization of AWS resource names.

use std::fmt;

use common::{Error, Result};

/// A parsed ARN: `arn:partition:service:region:account-id:resource`.
///
/// The resource segment may carry a type separated by `:` or `/`; both forms
/// round-trip through [`fmt::Display`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Arn {
    pub partition: String,
    pub service: String,
    pub region: String,
    pub account_id: String,
    pub resource_type: String,
    pub resource: String,
    delimiter: &'static str,
}

impl Arn {
    /// Parse `s` into an [`Arn`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] when `s` is not a well-formed ARN.
    pub fn parse(s: &str) -> Result<Self> {
        let s = s.trim();
        if !s.starts_with("arn:") {
            return Err(invalid(s));
        }
        let parts: Vec<&str> = s.splitn(6, ':').collect();
        if parts.len() < 6 {
            return Err(invalid(s));
        }
        let mut arn = Arn {
            partition: parts[1].to_string(),
            service: parts[2].to_string(),
            region: parts[3].to_string(),
            account_id: parts[4].to_string(),
            ..Default::default()
        };
        let tail = parts[5];
        if let Some((resource_type, resource)) = tail.split_once(':') {
            arn.resource_type = resource_type.to_string();
            arn.resource = resource.to_string();
            arn.delimiter = ":";
        } else if let Some((resource_type, resource)) = tail.split_once('/') {
            arn.resource_type = resource_type.to_string();
            arn.resource = resource.to_string();
            arn.delimiter = "/";
        } else {
            arn.resource = tail.to_string();
        }
        Ok(arn)
    }

    /// True iff the ARN names a KMS key.
    pub fn is_kms_key(&self) -> bool {
        self.service == "kms" && self.resource_type == "key"
    }

    /// True iff the ARN names a KMS alias.
    pub fn is_kms_alias(&self) -> bool {
        self.service == "kms" && self.resource_type == "alias"
    }
}

impl fmt::Display for Arn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "arn:{}:{}:{}:{}:",
            self.partition, self.service, self.region, self.account_id
        )?;
        if self.resource_type.is_empty() {
            write!(f, "{}", self.resource)
        } else {
            write!(f, "{}{}{}", self.resource_type, self.delimiter, self.resource)
        }
    }
}

fn invalid(s: &str) -> Error {
    Error::configuration(format!("{s}: invalid ARN"))
}

/// Normalize a short-form principal reference into a fully-qualified IAM ARN.
///
/// A value already starting with `arn:` is passed through; `user/...` and
/// `role/...` are qualified with the account; any other non-empty value is
/// treated as a bare user name. Empty input stays empty.
pub fn clean(account_id: &str, principal: &str) -> String {
    let principal = principal.trim();
    if principal.is_empty() {
        return String::new();
    }
    if principal.starts_with("arn:") {
        principal.to_string()
    } else if principal.starts_with("user/") || principal.starts_with("role/") {
        format!("arn:aws:iam::{account_id}:{principal}")
    } else {
        format!("arn:aws:iam::{account_id}:user/{principal}")
    }
}
