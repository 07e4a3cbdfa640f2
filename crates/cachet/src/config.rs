//! Configuration loading and validation.
//!
//! All values are read from `CACHET_`-prefixed environment variables. The
//! caller gets a clear error if a required variable is missing or invalid.

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::crypto::DEFAULT_CIPHER;

/// Validated engine configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Name of the file storing the secrets. **Required.**
    pub filename: String,

    /// Comma-delimited list of regions keys are provisioned in.
    #[serde(default = "default_regions")]
    pub regions: String,

    /// Default cipher label for new secrets.
    #[serde(default = "default_algorithm")]
    pub algorithm: String,

    /// Comma-delimited list of regions to prefer for decryption. Ordering
    /// only — storage is unaffected.
    #[serde(default)]
    pub region_priority: String,

    /// Optional key-service endpoint override, for local stand-ins.
    #[serde(default)]
    pub endpoint: Option<String>,

    /// Tracing log level (e.g. `"info"`, `"debug"`).
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_regions() -> String {
    "us-east-1,us-west-1,us-west-2".into()
}
fn default_algorithm() -> String {
    DEFAULT_CIPHER.into()
}
fn default_log_level() -> String {
    "info".into()
}

impl Config {
    /// Load and validate configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if any required variable is absent or cannot be
    /// parsed.
    pub fn from_env() -> Result<Self> {
        let cfg = config::Config::builder()
            .add_source(config::Environment::with_prefix("CACHET"))
            .build()
            .context("failed to build configuration from environment")?;

        let c: Config = cfg
            .try_deserialize()
            .context("failed to deserialise configuration")?;

        c.validate()?;
        Ok(c)
    }

    /// Validate all fields, returning a descriptive error on the first
    /// failure.
    fn validate(&self) -> Result<()> {
        if self.filename.trim().is_empty() {
            anyhow::bail!("CACHET_FILENAME is required and must not be empty");
        }
        if self.regions().is_empty() {
            anyhow::bail!("CACHET_REGIONS must name at least one region");
        }
        if self.algorithm.trim().is_empty() {
            anyhow::bail!("CACHET_ALGORITHM must not be empty");
        }
        Ok(())
    }

    /// The region list.
    pub fn regions(&self) -> Vec<String> {
        split_list(&self.regions)
    }

    /// The decrypt-ordering region priority list.
    pub fn region_priority(&self) -> Vec<String> {
        split_list(&self.region_priority)
    }
}

fn split_list(input: &str) -> Vec<String> {
    input
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(String::from)
        .collect()
}
