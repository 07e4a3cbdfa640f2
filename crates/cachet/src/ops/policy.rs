//! Key-policy inspection and replacement.
//!
//! The interactive editor sits outside the engine: [`fetch`] hands it the
//! current consensus policy, [`apply`] validates and pushes the edited
//! document back to every region.

use std::sync::Arc;

use common::{Error, Result};

use crate::coordinator::MultiRegionKey;
use crate::kms::{alias_name, KmsProvider};

/// The consensus policy for a key label, pretty-printed.
pub async fn fetch(
    provider: &Arc<dyn KmsProvider>,
    label: &str,
    regions: &[String],
    force_region: Option<&str>,
) -> Result<String> {
    let mrk =
        MultiRegionKey::resolve(Arc::clone(provider), &alias_name(label), regions, force_region)
            .await?;
    prettify(&mrk.policy)
}

/// Validate `new_policy` and push it to every region of the labeled key.
///
/// # Errors
///
/// Rejects an empty document, invalid JSON, and a document identical to the
/// current consensus policy (no change to apply).
pub async fn apply(
    provider: &Arc<dyn KmsProvider>,
    label: &str,
    regions: &[String],
    force_region: Option<&str>,
    new_policy: &str,
) -> Result<()> {
    let mrk =
        MultiRegionKey::resolve(Arc::clone(provider), &alias_name(label), regions, force_region)
            .await?;

    if new_policy.trim().is_empty() {
        return Err(Error::configuration("no change: the new policy is empty"));
    }
    let formatted = prettify(new_policy)?;
    if formatted == prettify(&mrk.policy)? {
        return Err(Error::configuration(
            "no change: the new policy matches the existing policy",
        ));
    }
    mrk.set_key_policy(&formatted).await
}

fn prettify(content: &str) -> Result<String> {
    let value: serde_json::Value = serde_json::from_str(content)
        .map_err(|err| Error::Format(format!("policy is not valid JSON: {err}")))?;
    serde_json::to_string_pretty(&value).map_err(|err| Error::Format(err.to_string()))
}
