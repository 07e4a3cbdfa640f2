//! Grant management across every region a secret's keys live in.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use sha2::{Digest, Sha256};

use common::record::{filter_by_key_manager, Value};
use common::{Error, Result};

use crate::arn::{self, Arn};
use crate::coordinator::MultiRegionKey;
use crate::custody::kms::KMS_LABEL;
use crate::kms::{Grant, GrantIssued, GrantSpec, KmsProvider, CONTEXT_KEY, GRANT_PREFIX};
use crate::store::FileStore;

/// The caller's account and fully-qualified identity, used to normalize
/// short-form principal references. Resolution itself is an external
/// collaborator's concern.
#[derive(Debug, Clone)]
pub struct CallerIdentity {
    pub account: String,
    pub arn: String,
}

/// Resolves the identity of the caller.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait IdentityResolver: Send + Sync {
    async fn caller_identity(&self) -> Result<CallerIdentity>;
}

/// Inputs for creating one logical grant.
pub struct CreateGrantRequest {
    /// Name of the secret to grant access to.
    pub name: String,
    /// Principal receiving the delegation. Short forms are qualified with
    /// the caller's account.
    pub grantee_principal: String,
    /// Principal allowed to retire the grant.
    pub retiring_principal: Option<String>,
    /// Key-service operations the grant allows.
    pub operations: Vec<String>,
    /// When set, the grant is not constrained to this secret's name and the
    /// grantee may decrypt anything under the same keys.
    pub all_names: bool,
}

/// The grant created in every region of every alias.
#[derive(Debug)]
pub struct GrantsCreated {
    /// The deterministic grant name, shared by all regions.
    pub name: String,
    /// Alias to region to issued grant.
    pub aliases: BTreeMap<String, BTreeMap<String, GrantIssued>>,
}

/// One logical grant as listed: identical settings across regions, with the
/// per-region grant IDs collected.
#[derive(Debug)]
pub struct GrantSummary {
    pub grantee_principal: String,
    pub retiring_principal: Option<String>,
    pub operations: Vec<String>,
    pub encryption_context: BTreeMap<String, String>,
    /// Region to grant ID.
    pub grant_ids: BTreeMap<String, String>,
}

/// Create a grant on every key the secret is encrypted under.
///
/// Regions already granted are not rolled back when a later region fails;
/// the deterministic grant name makes a re-run converge instead.
pub async fn create(
    store: &FileStore,
    provider: &Arc<dyn KmsProvider>,
    identity: &dyn IdentityResolver,
    request: CreateGrantRequest,
) -> Result<GrantsCreated> {
    let values = store.get(&request.name)?;
    let values = filter_by_key_manager(&values, KMS_LABEL);
    let aliases = resolve_aliases_and_regions(provider, &values).await?;

    let caller = identity.caller_identity().await?;
    let grantee = arn::clean(&caller.account, &request.grantee_principal);
    if grantee.is_empty() {
        return Err(Error::configuration("grantee principal must not be empty"));
    }
    let retiring = request
        .retiring_principal
        .as_deref()
        .map(|principal| arn::clean(&caller.account, principal))
        .filter(|principal| !principal.is_empty());

    let mut spec = GrantSpec {
        name: String::new(),
        grantee_principal: grantee,
        retiring_principal: retiring,
        operations: request.operations.clone(),
        encryption_context: BTreeMap::new(),
    };
    if !request.all_names {
        spec.encryption_context
            .insert(CONTEXT_KEY.to_string(), request.name.clone());
    }
    spec.name = grant_name(&spec, &caller.arn)?;

    let mut output = GrantsCreated {
        name: spec.name.clone(),
        aliases: BTreeMap::new(),
    };
    for (alias, regions) in aliases {
        let mrk = MultiRegionKey::resolve(Arc::clone(provider), &alias, &regions, None).await?;
        let issued = mrk.add_grant(spec.clone()).await?;
        output.aliases.insert(alias, issued.into_iter().collect());
    }
    Ok(output)
}

/// List this tool's grants for every key the secret is encrypted under,
/// grouped by grant name with the per-region grant IDs collected.
pub async fn list(
    store: &FileStore,
    provider: &Arc<dyn KmsProvider>,
    name: &str,
) -> Result<BTreeMap<String, BTreeMap<String, GrantSummary>>> {
    let values = store.get(name)?;
    let values = filter_by_key_manager(&values, KMS_LABEL);
    let aliases = resolve_aliases_and_regions(provider, &values).await?;

    let mut output = BTreeMap::new();
    for (alias, regions) in aliases {
        let mrk = MultiRegionKey::resolve(Arc::clone(provider), &alias, &regions, None).await?;
        let region_grants = mrk.grant_details().await?;

        let mut by_name: BTreeMap<String, GrantSummary> = BTreeMap::new();
        for region in mrk.regions() {
            let Some(grants) = region_grants.get(region) else {
                continue;
            };
            for grant in grants {
                by_name
                    .entry(grant.name.clone())
                    .or_insert_with(|| summarize(grant))
                    .grant_ids
                    .insert(region.to_string(), grant.id.clone());
            }
        }
        if !by_name.is_empty() {
            output.insert(alias, by_name);
        }
    }
    Ok(output)
}

/// Retire a grant, by name, from every key the secret is encrypted under.
pub async fn retire(
    store: &FileStore,
    provider: &Arc<dyn KmsProvider>,
    name: &str,
    grant_name: &str,
) -> Result<()> {
    let values = store.get(name)?;
    let values = filter_by_key_manager(&values, KMS_LABEL);
    let aliases = resolve_aliases_and_regions(provider, &values).await?;

    for (alias, regions) in aliases {
        let mrk = MultiRegionKey::resolve(Arc::clone(provider), &alias, &regions, None).await?;
        mrk.retire_grant(grant_name).await?;
    }
    Ok(())
}

/// Map a secret's values to the aliases addressing their keys, with the
/// list of regions each alias spans.
///
/// A value may record either an alias ARN or a raw key ARN; raw keys are
/// resolved back to their tool-managed alias so grants can be applied
/// across every region at once.
async fn resolve_aliases_and_regions(
    provider: &Arc<dyn KmsProvider>,
    values: &[Value],
) -> Result<BTreeMap<String, Vec<String>>> {
    let mut aliases: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for value in values {
        let arn = Arn::parse(&value.key.key_id)?;
        if arn.is_kms_alias() {
            aliases
                .entry(format!("alias/{}", arn.resource))
                .or_default()
                .push(arn.region.clone());
        } else if arn.is_kms_key() {
            let client = provider.for_region(&arn.region);
            let alias = client.alias_for_key(&arn.resource).await?;
            aliases.entry(alias).or_default().push(arn.region.clone());
        } else {
            return Err(Error::configuration(format!(
                "{} is neither a kms key nor an alias",
                value.key.key_id
            )));
        }
    }
    Ok(aliases)
}

/// Derive the deterministic grant name: the tool prefix plus the first ten
/// hex characters of a digest over the canonical grant spec and the caller.
/// The same spec issued by the same caller always produces the same name.
fn grant_name(spec: &GrantSpec, caller_arn: &str) -> Result<String> {
    let canonical = serde_json::to_vec(&(spec, caller_arn))
        .map_err(|err| Error::Format(err.to_string()))?;
    let digest = Sha256::digest(&canonical);
    let hex: String = digest
        .iter()
        .take(5)
        .map(|byte| format!("{byte:02x}"))
        .collect();
    Ok(format!("{GRANT_PREFIX}{hex}"))
}

fn summarize(grant: &Grant) -> GrantSummary {
    GrantSummary {
        grantee_principal: grant.grantee_principal.clone(),
        retiring_principal: grant.retiring_principal.clone(),
        operations: grant.operations.clone(),
        encryption_context: grant.encryption_context.clone(),
        grant_ids: BTreeMap::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kms::testutil::FixedProvider;
    use crate::kms::MockKmsApi;
    use common::record::{Key, ValueList};

    const POLICY: &str = r#"{"Version":"2012-10-17"}"#;

    fn kms_value(key_id: &str) -> Value {
        Value {
            key: Key {
                key_id: key_id.into(),
                key_manager: "kms".into(),
                algorithm: "xchacha".into(),
            },
            key_ciphertext: "a2V5".into(),
            ciphertext: "Y3Q=".into(),
        }
    }

    fn store_with(dir: &tempfile::TempDir, name: &str, values: ValueList) -> FileStore {
        let store = FileStore::new(dir.path().join("secrets.yml"));
        store.put(name, values).unwrap();
        store
    }

    fn identity() -> MockIdentityResolver {
        let mut resolver = MockIdentityResolver::new();
        resolver.expect_caller_identity().returning(|| {
            Ok(CallerIdentity {
                account: "123456789012".into(),
                arn: "arn:aws:iam::123456789012:user/operator".into(),
            })
        });
        resolver
    }

    fn granting(key_id: &'static str, grant_id: &'static str) -> MockKmsApi {
        let mut api = MockKmsApi::new();
        api.expect_resolve_alias()
            .returning(move |_| Ok(key_id.to_string()));
        api.expect_get_key_policy()
            .returning(|_| Ok(POLICY.to_string()));
        api.expect_create_grant()
            .withf(move |key, spec| {
                key == key_id
                    && spec.name.starts_with(GRANT_PREFIX)
                    && spec.grantee_principal == "arn:aws:iam::123456789012:user/alice"
                    && spec.encryption_context.get("SecretName").map(String::as_str)
                        == Some("db-password")
            })
            .times(1)
            .returning(move |_, _| {
                Ok(GrantIssued {
                    grant_id: grant_id.to_string(),
                    grant_token: "token".to_string(),
                })
            });
        api
    }

    fn request() -> CreateGrantRequest {
        CreateGrantRequest {
            name: "db-password".into(),
            grantee_principal: "alice".into(),
            retiring_principal: None,
            operations: vec!["Decrypt".into(), "RetireGrant".into()],
            all_names: false,
        }
    }

    #[tokio::test]
    async fn create_grants_across_alias_regions() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_with(
            &dir,
            "db-password",
            vec![
                kms_value("arn:aws:kms:us-east-1:123456789012:alias/cachet-default"),
                kms_value("arn:aws:kms:us-west-2:123456789012:alias/cachet-default"),
            ],
        );
        let mut provider = FixedProvider::new();
        provider.insert("us-east-1", Arc::new(granting("key-east", "g-east")));
        provider.insert("us-west-2", Arc::new(granting("key-west", "g-west")));
        let provider: Arc<dyn KmsProvider> = Arc::new(provider);

        let created = create(&store, &provider, &identity(), request())
            .await
            .unwrap();
        assert!(created.name.starts_with(GRANT_PREFIX));
        let by_region = &created.aliases["alias/cachet-default"];
        assert_eq!(by_region["us-east-1"].grant_id, "g-east");
        assert_eq!(by_region["us-west-2"].grant_id, "g-west");
    }

    #[tokio::test]
    async fn create_resolves_raw_keys_to_aliases() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_with(
            &dir,
            "db-password",
            vec![kms_value("arn:aws:kms:us-east-1:123456789012:key/abc")],
        );
        let mut api = granting("key-east", "g-east");
        api.expect_alias_for_key()
            .withf(|key_id| key_id == "abc")
            .returning(|_| Ok("alias/cachet-default".to_string()));
        let mut provider = FixedProvider::new();
        provider.insert("us-east-1", Arc::new(api));
        let provider: Arc<dyn KmsProvider> = Arc::new(provider);

        let created = create(&store, &provider, &identity(), request())
            .await
            .unwrap();
        assert!(created.aliases.contains_key("alias/cachet-default"));
    }

    #[tokio::test]
    async fn create_skips_values_from_other_backends() {
        let dir = tempfile::tempdir().unwrap();
        let mut testing_value = kms_value("not-an-arn");
        testing_value.key.key_manager = "testing".into();
        let store = store_with(
            &dir,
            "db-password",
            vec![
                kms_value("arn:aws:kms:us-east-1:123456789012:alias/cachet-default"),
                testing_value,
            ],
        );
        let mut provider = FixedProvider::new();
        provider.insert("us-east-1", Arc::new(granting("key-east", "g-east")));
        let provider: Arc<dyn KmsProvider> = Arc::new(provider);

        // The non-kms value would fail ARN parsing if it were not filtered.
        create(&store, &provider, &identity(), request())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn all_names_drops_the_context_constraint() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_with(
            &dir,
            "db-password",
            vec![kms_value(
                "arn:aws:kms:us-east-1:123456789012:alias/cachet-default",
            )],
        );
        let mut api = MockKmsApi::new();
        api.expect_resolve_alias()
            .returning(|_| Ok("key-east".to_string()));
        api.expect_get_key_policy()
            .returning(|_| Ok(POLICY.to_string()));
        api.expect_create_grant()
            .withf(|_, spec| spec.encryption_context.is_empty())
            .times(1)
            .returning(|_, _| {
                Ok(GrantIssued {
                    grant_id: "g".into(),
                    grant_token: "t".into(),
                })
            });
        let mut provider = FixedProvider::new();
        provider.insert("us-east-1", Arc::new(api));
        let provider: Arc<dyn KmsProvider> = Arc::new(provider);

        create(
            &store,
            &provider,
            &identity(),
            CreateGrantRequest {
                all_names: true,
                ..request()
            },
        )
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn grant_names_are_deterministic() {
        let spec = GrantSpec {
            name: String::new(),
            grantee_principal: "arn:aws:iam::123456789012:user/alice".into(),
            retiring_principal: None,
            operations: vec!["Decrypt".into()],
            encryption_context: BTreeMap::new(),
        };
        let caller = "arn:aws:iam::123456789012:user/operator";
        let first = grant_name(&spec, caller).unwrap();
        let second = grant_name(&spec, caller).unwrap();
        assert_eq!(first, second);
        assert!(first.starts_with(GRANT_PREFIX));
        assert_eq!(first.len(), GRANT_PREFIX.len() + 10);

        let other_caller = grant_name(&spec, "arn:aws:iam::123456789012:user/else").unwrap();
        assert_ne!(first, other_caller);
    }

    #[tokio::test]
    async fn list_groups_grants_by_name() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_with(
            &dir,
            "db-password",
            vec![
                kms_value("arn:aws:kms:us-east-1:123456789012:alias/cachet-default"),
                kms_value("arn:aws:kms:us-west-2:123456789012:alias/cachet-default"),
            ],
        );
        let shared = Grant {
            id: String::new(),
            name: "cachet-abc".into(),
            grantee_principal: "arn:aws:iam::123456789012:user/alice".into(),
            retiring_principal: None,
            operations: vec!["Decrypt".into()],
            encryption_context: BTreeMap::new(),
        };
        let mut east = MockKmsApi::new();
        east.expect_resolve_alias()
            .returning(|_| Ok("key-east".to_string()));
        east.expect_get_key_policy()
            .returning(|_| Ok(POLICY.to_string()));
        let east_grant = Grant {
            id: "g-east".into(),
            ..shared.clone()
        };
        east.expect_list_grants()
            .returning(move |_| Ok(vec![east_grant.clone()]));
        let mut west = MockKmsApi::new();
        west.expect_resolve_alias()
            .returning(|_| Ok("key-west".to_string()));
        west.expect_get_key_policy()
            .returning(|_| Ok(POLICY.to_string()));
        let west_grant = Grant {
            id: "g-west".into(),
            ..shared.clone()
        };
        west.expect_list_grants()
            .returning(move |_| Ok(vec![west_grant.clone()]));

        let mut provider = FixedProvider::new();
        provider.insert("us-east-1", Arc::new(east));
        provider.insert("us-west-2", Arc::new(west));
        let provider: Arc<dyn KmsProvider> = Arc::new(provider);

        let listed = list(&store, &provider, "db-password").await.unwrap();
        let summary = &listed["alias/cachet-default"]["cachet-abc"];
        assert_eq!(summary.grant_ids["us-east-1"], "g-east");
        assert_eq!(summary.grant_ids["us-west-2"], "g-west");
        assert_eq!(summary.operations, vec!["Decrypt"]);
    }

    #[tokio::test]
    async fn retire_revokes_in_every_region() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_with(
            &dir,
            "db-password",
            vec![kms_value(
                "arn:aws:kms:us-east-1:123456789012:alias/cachet-default",
            )],
        );
        let mut api = MockKmsApi::new();
        api.expect_resolve_alias()
            .returning(|_| Ok("key-east".to_string()));
        api.expect_get_key_policy()
            .returning(|_| Ok(POLICY.to_string()));
        api.expect_list_grants().returning(|_| {
            Ok(vec![Grant {
                id: "g-east".into(),
                name: "cachet-abc".into(),
                grantee_principal: String::new(),
                retiring_principal: None,
                operations: vec![],
                encryption_context: BTreeMap::new(),
            }])
        });
        api.expect_revoke_grant()
            .withf(|_, grant_id| grant_id == "g-east")
            .times(1)
            .returning(|_, _| Ok(()));
        let mut provider = FixedProvider::new();
        provider.insert("us-east-1", Arc::new(api));
        let provider: Arc<dyn KmsProvider> = Arc::new(provider);

        retire(&store, &provider, "db-password", "cachet-abc")
            .await
            .unwrap();
    }
}
