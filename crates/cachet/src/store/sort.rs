//! Region-priority ordering of a value list.
//!
//! Decryption walks a secret's values in order and stops at the first
//! success, so placing the caller's preferred regions first avoids
//! round-trips to distant endpoints. Ordering is a read-side concern only;
//! nothing about the stored file changes.

use std::cmp::Ordering;
use std::collections::HashMap;

use common::record::Value;

use crate::arn::Arn;
use crate::custody::kms::KMS_LABEL;

/// Stable in-place sort: values are grouped by key manager, and within the
/// kms group ranked by descending position in `priority`. Regions not listed
/// (and key IDs that are not ARNs) sink to the end of their group; ties keep
/// their original relative order.
pub fn sort_by_region(values: &mut [Value], priority: &[String]) {
    if priority.is_empty() || priority[0].is_empty() {
        return;
    }
    let ordering: HashMap<&str, usize> = priority
        .iter()
        .enumerate()
        .map(|(i, region)| (region.as_str(), priority.len() - i))
        .collect();
    values.sort_by(|left, right| {
        left.key
            .key_manager
            .cmp(&right.key.key_manager)
            .then_with(|| {
                if left.key.key_manager != KMS_LABEL {
                    return Ordering::Equal;
                }
                rank(&ordering, &right.key.key_id).cmp(&rank(&ordering, &left.key.key_id))
            })
    });
}

fn rank(ordering: &HashMap<&str, usize>, key_id: &str) -> usize {
    Arn::parse(key_id)
        .map(|arn| ordering.get(arn.region.as_str()).copied().unwrap_or(0))
        .unwrap_or(0)
}
