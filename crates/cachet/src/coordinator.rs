//! Multi-region key coordinator.
//!
//! N regional key-custody endpoints sharing one alias name are treated as a
//! single logical key with one access policy. Every operation is one
//! fan-out/fan-in round: one task per region, no early cancellation, and no
//! result is inspected until every region has reported. Aggregation runs
//! single-threaded after the join. There are no retries — a failed region is
//! surfaced to the caller, who decides whether to re-run.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use tokio::task::JoinSet;

use common::{Error, NotFound, Result};

use crate::kms::{Grant, GrantIssued, GrantSpec, KmsApi, KmsProvider, GRANT_PREFIX};

/// A collection of regional keys operated on simultaneously.
///
/// Transient: built fresh for each high-level operation and discarded with
/// it. After construction every participating region's policy document is
/// byte-identical to [`MultiRegionKey::policy`] (unless a forced region
/// suppressed the check).
pub struct MultiRegionKey {
    alias_name: String,
    /// The consensus policy document.
    pub policy: String,
    /// Region to resolved key ID, in the caller-supplied region order.
    region_keys: Vec<(String, String)>,
    provider: Arc<dyn KmsProvider>,
}

impl std::fmt::Debug for MultiRegionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MultiRegionKey")
            .field("alias_name", &self.alias_name)
            .field("policy", &self.policy)
            .field("region_keys", &self.region_keys)
            .finish_non_exhaustive()
    }
}

impl MultiRegionKey {
    /// Resolve `alias_name` in every region and reconcile the policies.
    ///
    /// All regions are queried concurrently and always to completion, even
    /// when some fail, so the returned error carries every region's outcome.
    /// Reconciliation walks results in the order `regions` was given: the
    /// first successful region's policy is the consensus and every other
    /// region must match it byte-for-byte. With `force_region` set, that
    /// region's policy is adopted and the cross-region check is skipped.
    ///
    /// # Errors
    ///
    /// [`Error::Aggregate`] collecting a [`Error::Region`] per failed region
    /// and a [`Error::PolicyMismatch`] per disagreeing region.
    pub async fn resolve(
        provider: Arc<dyn KmsProvider>,
        alias_name: &str,
        regions: &[String],
        force_region: Option<&str>,
    ) -> Result<Self> {
        if regions.is_empty() {
            return Err(Error::configuration("at least one region is required"));
        }
        if let Some(forced) = force_region {
            if !regions.iter().any(|region| region == forced) {
                return Err(Error::configuration(format!(
                    "force region '{forced}' is not in the region list"
                )));
            }
        }

        let mut tasks = FanOut::new();
        for region in regions {
            let client = provider.for_region(region);
            let alias = alias_name.to_string();
            tasks.spawn(region, async move {
                let key_id = client.resolve_alias(&alias).await?;
                let policy = client.get_key_policy(&key_id).await?;
                Ok((key_id, policy))
            });
        }
        let mut outcomes = tasks.drain().await;

        let mut errs = Vec::new();
        let mut region_keys = Vec::new();
        let mut policies = Vec::new();
        for region in regions {
            match outcomes.remove(region.as_str()) {
                Some(Ok((key_id, policy))) => {
                    region_keys.push((region.clone(), key_id));
                    policies.push((region.clone(), policy));
                }
                Some(Err(err)) => errs.push(Error::region(region, err)),
                None => errs.push(Error::region(
                    region,
                    Error::Backend("region task never reported".into()),
                )),
            }
        }

        let consensus = match force_region {
            Some(forced) => policies
                .iter()
                .find(|(region, _)| region == forced)
                .map(|(_, policy)| policy.clone()),
            None => policies.first().cloned().map(|(first_region, policy)| {
                for (region, other) in policies.iter().skip(1) {
                    if *other != policy {
                        errs.push(Error::PolicyMismatch {
                            left_region: first_region.clone(),
                            right_region: region.clone(),
                        });
                    }
                }
                policy
            }),
        };

        if !errs.is_empty() {
            return Err(Error::Aggregate(errs));
        }
        // No errors means at least one region resolved, so a consensus exists.
        let policy = consensus
            .ok_or_else(|| Error::configuration("no region produced a policy document"))?;

        Ok(Self {
            alias_name: alias_name.to_string(),
            policy,
            region_keys,
            provider,
        })
    }

    /// The alias this logical key was resolved from.
    pub fn alias_name(&self) -> &str {
        &self.alias_name
    }

    /// Participating regions, in the order they were given.
    pub fn regions(&self) -> impl Iterator<Item = &str> {
        self.region_keys.iter().map(|(region, _)| region.as_str())
    }

    /// The resolved key ID for one region.
    pub fn key_for(&self, region: &str) -> Option<&str> {
        self.region_keys
            .iter()
            .find(|(r, _)| r == region)
            .map(|(_, key_id)| key_id.as_str())
    }

    /// Push the same policy document to every region.
    ///
    /// Best effort: a failing region does not stop the others from being
    /// updated. The first failure in region order is reported after all
    /// pushes complete.
    pub async fn set_key_policy(&self, policy: &str) -> Result<()> {
        let mut tasks = FanOut::new();
        for (region, key_id) in &self.region_keys {
            let client = self.provider.for_region(region);
            let key_id = key_id.clone();
            let policy = policy.to_string();
            tasks.spawn(region, async move {
                client.put_key_policy(&key_id, &policy).await
            });
        }
        let mut outcomes = tasks.drain().await;
        self.first_error(&mut outcomes)
    }

    /// List this tool's grants in every region.
    ///
    /// # Errors
    ///
    /// Any region's listing failure aborts the whole call (after all regions
    /// have reported).
    pub async fn grant_details(&self) -> Result<HashMap<String, Vec<Grant>>> {
        let mut tasks = FanOut::new();
        for (region, key_id) in &self.region_keys {
            let client = self.provider.for_region(region);
            let key_id = key_id.clone();
            tasks.spawn(region, async move {
                let grants = client.list_grants(&key_id).await?;
                Ok(grants
                    .into_iter()
                    .filter(|grant| grant.name.starts_with(GRANT_PREFIX))
                    .collect::<Vec<_>>())
            });
        }
        let mut outcomes = tasks.drain().await;
        self.first_error(&mut outcomes)?;
        Ok(self.successes(outcomes))
    }

    /// Create one grant per region from a shared template, substituting each
    /// region's key ID.
    ///
    /// Any single region's failure fails the whole call. Grants already
    /// created in sibling regions are not rolled back; re-running the
    /// operation after fixing the failing region converges, since grant
    /// names are deterministic.
    pub async fn add_grant(&self, spec: GrantSpec) -> Result<HashMap<String, GrantIssued>> {
        let mut tasks = FanOut::new();
        for (region, key_id) in &self.region_keys {
            let client = self.provider.for_region(region);
            let key_id = key_id.clone();
            let spec = spec.clone();
            tasks.spawn(region, async move {
                client.create_grant(&key_id, spec).await
            });
        }
        let mut outcomes = tasks.drain().await;
        self.first_error(&mut outcomes)?;
        Ok(self.successes(outcomes))
    }

    /// Find the grant named `name` in every region and revoke it.
    ///
    /// A region where the name does not exist reports [`NotFound::Grant`]
    /// for that region; the first error in region order surfaces after all
    /// regions finish.
    pub async fn retire_grant(&self, name: &str) -> Result<()> {
        let mut tasks = FanOut::new();
        for (region, key_id) in &self.region_keys {
            let client = self.provider.for_region(region);
            let key_id = key_id.clone();
            let name = name.to_string();
            tasks.spawn(region, async move {
                let grants = client.list_grants(&key_id).await?;
                let grant_id = grants
                    .into_iter()
                    .find(|grant| grant.name == name)
                    .map(|grant| grant.id)
                    .ok_or(NotFound::Grant(name))?;
                client.revoke_grant(&key_id, &grant_id).await
            });
        }
        let mut outcomes = tasks.drain().await;
        self.first_error(&mut outcomes)
    }

    /// Remove and return the first failed outcome in region order, wrapped
    /// with its region.
    fn first_error<T>(&self, outcomes: &mut HashMap<String, Result<T>>) -> Result<()> {
        for (region, _) in &self.region_keys {
            if matches!(outcomes.get(region.as_str()), Some(Err(_))) {
                if let Some(Err(err)) = outcomes.remove(region.as_str()) {
                    return Err(Error::region(region, err));
                }
            }
        }
        Ok(())
    }

    /// Collapse all-successful outcomes into a region-to-value map.
    fn successes<T>(&self, outcomes: HashMap<String, Result<T>>) -> HashMap<String, T> {
        outcomes
            .into_iter()
            .filter_map(|(region, result)| result.ok().map(|value| (region, value)))
            .collect()
    }
}

/// One fan-out round: each worker writes only its own result slot, and no
/// slot is read until every worker has finished. A panicked task is recorded
/// as a backend error in its region's slot, so the round is always fully
/// drained before aggregation.
struct FanOut<T> {
    join: JoinSet<Result<T>>,
    regions: HashMap<tokio::task::Id, String>,
}

impl<T: Send + 'static> FanOut<T> {
    fn new() -> Self {
        Self {
            join: JoinSet::new(),
            regions: HashMap::new(),
        }
    }

    fn spawn(&mut self, region: &str, task: impl Future<Output = Result<T>> + Send + 'static) {
        let handle = self.join.spawn(task);
        self.regions.insert(handle.id(), region.to_string());
    }

    async fn drain(mut self) -> HashMap<String, Result<T>> {
        let mut outcomes = HashMap::new();
        while let Some(joined) = self.join.join_next_with_id().await {
            match joined {
                Ok((id, result)) => {
                    if let Some(region) = self.regions.remove(&id) {
                        outcomes.insert(region, result);
                    }
                }
                Err(err) => {
                    if let Some(region) = self.regions.remove(&err.id()) {
                        outcomes.insert(
                            region,
                            Err(Error::Backend(format!("region task failed: {err}"))),
                        );
                    }
                }
            }
        }
        outcomes
    }
}
