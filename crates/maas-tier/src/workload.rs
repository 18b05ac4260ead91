//! Tier association of KServe LLMInferenceService workloads
//!
//! The association is not stored anywhere but on the workloads themselves:
//! each lists its tiers in the `alpha.maas.opendatahub.io/tiers` annotation.
//! Queries scan every workload in the cluster; there is no index.
//!
//! Annotation writes are merge patches carrying the `resourceVersion` that
//! was read, so two writers racing on one workload produce a
//! `StorageConflict` and the loser re-reads.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use kube::api::{Api, DynamicObject, ListParams, Patch, PatchParams};
use kube::Client;
#[cfg(test)]
use mockall::automock;
use tracing::{debug, info, warn};

use maas_common::crd::{InferenceService, LlmInferenceServiceResource};
use maas_common::kube_utils::{self, is_conflict, is_not_found, HasApiResource};
use maas_common::retry::{retry_on_conflict, RetryConfig};
use maas_common::validation::require_field;
use maas_common::{Error, Result, FIELD_MANAGER, TIER_ANNOTATION_KEY};

use crate::annotation::{add_tier, format_tiers, parse_tiers, remove_tier};
use crate::service::TierService;

/// Access to LLMInferenceService workloads
#[cfg_attr(test, automock)]
#[async_trait]
pub trait InferenceServiceClient: Send + Sync {
    /// True if the namespace exists
    async fn namespace_exists(&self, namespace: &str) -> Result<bool>;

    /// Get one workload, `None` if absent
    async fn get(&self, namespace: &str, name: &str) -> Result<Option<InferenceService>>;

    /// Every workload in every namespace
    async fn list(&self) -> Result<Vec<InferenceService>>;

    /// Set the tier annotation, conditional on `resource_version` when given
    async fn set_tiers_annotation(
        &self,
        namespace: &str,
        name: &str,
        resource_version: Option<String>,
        value: &str,
    ) -> Result<()>;
}

/// [`InferenceServiceClient`] backed by the Kubernetes API
pub struct KubeInferenceServiceClient {
    client: Client,
}

impl KubeInferenceServiceClient {
    /// Create a client
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn namespaced(&self, namespace: &str) -> Api<DynamicObject> {
        Api::namespaced_with(
            self.client.clone(),
            namespace,
            &LlmInferenceServiceResource::api_resource(),
        )
    }
}

#[async_trait]
impl InferenceServiceClient for KubeInferenceServiceClient {
    async fn namespace_exists(&self, namespace: &str) -> Result<bool> {
        kube_utils::namespace_exists(&self.client, namespace).await
    }

    async fn get(&self, namespace: &str, name: &str) -> Result<Option<InferenceService>> {
        let obj = self.namespaced(namespace).get_opt(name).await.map_err(|e| {
            Error::storage_read(
                format!("llminferenceservice {}/{}", namespace, name),
                e.to_string(),
            )
        })?;
        Ok(obj.map(inference_service_from))
    }

    async fn list(&self) -> Result<Vec<InferenceService>> {
        let api: Api<DynamicObject> = Api::all_with(
            self.client.clone(),
            &LlmInferenceServiceResource::api_resource(),
        );
        match api.list(&ListParams::default()).await {
            Ok(list) => {
                debug!(count = list.items.len(), "Listed LLMInferenceServices");
                Ok(list.items.into_iter().map(inference_service_from).collect())
            }
            Err(e) if is_not_found(&e) => {
                warn!("LLMInferenceService CRD is not installed, no workloads to scan");
                Ok(Vec::new())
            }
            Err(e) => Err(Error::storage_read("llminferenceservices", e.to_string())),
        }
    }

    async fn set_tiers_annotation(
        &self,
        namespace: &str,
        name: &str,
        resource_version: Option<String>,
        value: &str,
    ) -> Result<()> {
        let mut annotations = serde_json::Map::new();
        annotations.insert(TIER_ANNOTATION_KEY.to_string(), value.into());
        let mut metadata = serde_json::Map::new();
        metadata.insert("annotations".to_string(), annotations.into());
        if let Some(version) = resource_version {
            metadata.insert("resourceVersion".to_string(), version.into());
        }
        let patch = serde_json::json!({ "metadata": metadata });

        let params = PatchParams {
            field_manager: Some(FIELD_MANAGER.to_string()),
            ..Default::default()
        };
        let resource = format!("llminferenceservice {}/{}", namespace, name);

        self.namespaced(namespace)
            .patch(name, &params, &Patch::Merge(&patch))
            .await
            .map_err(|e| {
                if is_conflict(&e) {
                    Error::StorageConflict { resource }
                } else if is_not_found(&e) {
                    Error::WorkloadNotFound {
                        namespace: namespace.to_string(),
                        name: name.to_string(),
                    }
                } else {
                    Error::storage_write(resource, e.to_string())
                }
            })?;

        Ok(())
    }
}

/// Project a workload object onto the view returned by queries.
///
/// An unreadable annotation is kept raw and reported as no tiers.
pub fn inference_service_from(obj: DynamicObject) -> InferenceService {
    let name = obj.metadata.name.clone().unwrap_or_default();
    let namespace = obj.metadata.namespace.clone().unwrap_or_default();
    let tier_annotation = obj
        .metadata
        .annotations
        .as_ref()
        .and_then(|a| a.get(TIER_ANNOTATION_KEY))
        .cloned();

    let tiers = match tier_annotation.as_deref().map(parse_tiers) {
        Some(Ok(tiers)) => tiers,
        Some(Err(e)) => {
            warn!(
                namespace = %namespace,
                name = %name,
                error = %e,
                "Skipping unreadable tiers annotation"
            );
            Vec::new()
        }
        None => Vec::new(),
    };

    let spec = obj
        .data
        .get("spec")
        .cloned()
        .unwrap_or_else(|| serde_json::json!({}));

    InferenceService {
        name,
        namespace,
        tiers,
        spec,
        tier_annotation,
        resource_version: obj.metadata.resource_version,
    }
}

/// A workload's reference to a tier that is no longer in the registry
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize)]
pub struct StaleTierReference {
    /// Workload namespace
    pub namespace: String,
    /// Workload name
    pub name: String,
    /// Tier named in the annotation
    pub tier: String,
}

/// Attach, detach and query workload tiers
pub struct WorkloadTiers {
    client: Arc<dyn InferenceServiceClient>,
    tiers: Arc<TierService>,
    retry: RetryConfig,
}

impl WorkloadTiers {
    /// Create the service
    pub fn new(client: Arc<dyn InferenceServiceClient>, tiers: Arc<TierService>) -> Self {
        Self {
            client,
            tiers,
            retry: RetryConfig::default(),
        }
    }

    /// Override the conflict retry policy
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Add `tier` to a workload's annotation. Idempotent.
    ///
    /// The tier must exist in the registry.
    pub async fn annotate(&self, namespace: &str, name: &str, tier: &str) -> Result<()> {
        require_request(namespace, name, tier)?;
        self.tiers.get_tier(tier).await?;
        self.ensure_namespace(namespace).await?;

        let client = &self.client;
        retry_on_conflict(&self.retry, "annotate", move || async move {
            let svc = fetch(client.as_ref(), namespace, name).await?;
            let mut tiers = parse_tiers(svc.tier_annotation.as_deref().unwrap_or_default())?;
            if !add_tier(&mut tiers, tier) {
                debug!(namespace = %namespace, name = %name, tier = %tier, "Tier already annotated");
                return Ok(());
            }
            client
                .set_tiers_annotation(namespace, name, svc.resource_version, &format_tiers(&tiers)?)
                .await
        })
        .await?;

        info!(namespace = %namespace, name = %name, tier = %tier, "Annotated LLMInferenceService with tier");
        Ok(())
    }

    /// Remove `tier` from a workload's annotation.
    ///
    /// The tier need not exist in the registry, so stale references can be
    /// cleaned up.
    pub async fn remove_tier(&self, namespace: &str, name: &str, tier: &str) -> Result<()> {
        require_request(namespace, name, tier)?;
        self.ensure_namespace(namespace).await?;

        let client = &self.client;
        retry_on_conflict(&self.retry, "remove_tier", move || async move {
            let svc = fetch(client.as_ref(), namespace, name).await?;
            let not_listed = || Error::TierNotFoundInAnnotation {
                namespace: namespace.to_string(),
                name: name.to_string(),
                tier: tier.to_string(),
            };

            let raw = match svc.tier_annotation.as_deref() {
                Some(raw) if !raw.is_empty() => raw,
                _ => return Err(not_listed()),
            };
            let mut tiers = parse_tiers(raw)?;
            if !remove_tier(&mut tiers, tier) {
                return Err(not_listed());
            }
            client
                .set_tiers_annotation(namespace, name, svc.resource_version, &format_tiers(&tiers)?)
                .await
        })
        .await?;

        info!(namespace = %namespace, name = %name, tier = %tier, "Removed tier from LLMInferenceService");
        Ok(())
    }

    /// Workloads whose annotation lists `tier`. The tier must exist.
    pub async fn list_by_tier(&self, tier: &str) -> Result<Vec<InferenceService>> {
        self.tiers.get_tier(tier).await?;
        let services = self.client.list().await?;
        Ok(services
            .into_iter()
            .filter(|svc| svc.tiers.iter().any(|t| t == tier))
            .collect())
    }

    /// Workloads reachable through any tier that lists `group`, each once,
    /// ordered by `namespace/name`
    pub async fn list_by_group(&self, group: &str) -> Result<Vec<InferenceService>> {
        let tiers: Vec<String> = self
            .tiers
            .get_tiers_by_group(group)
            .await?
            .into_iter()
            .map(|t| t.name)
            .collect();
        if tiers.is_empty() {
            return Ok(Vec::new());
        }

        let services = self.client.list().await?;
        Ok(dedup_by_key(services.into_iter().filter(|svc| {
            svc.tiers.iter().any(|t| tiers.contains(t))
        })))
    }

    /// Workloads a user can reach through their tiers, each once.
    ///
    /// Each view's `tiers` only names tiers present in the registry.
    pub async fn list_for_user(&self, username: &str) -> Result<Vec<InferenceService>> {
        let user_tiers: Vec<String> = self
            .tiers
            .get_tiers_for_user(username)
            .await?
            .into_iter()
            .map(|t| t.name)
            .collect();
        if user_tiers.is_empty() {
            return Ok(Vec::new());
        }

        let registry: Vec<String> = self
            .tiers
            .get_tiers()
            .await?
            .into_iter()
            .map(|t| t.name)
            .collect();

        let services = self.client.list().await?;
        Ok(dedup_by_key(services.into_iter().filter_map(|mut svc| {
            if !svc.tiers.iter().any(|t| user_tiers.contains(t)) {
                return None;
            }
            svc.tiers.retain(|t| registry.contains(t));
            Some(svc)
        })))
    }

    /// Annotated tier names that the registry no longer has
    pub async fn stale_references(&self) -> Result<Vec<StaleTierReference>> {
        let registry: Vec<String> = self
            .tiers
            .get_tiers()
            .await?
            .into_iter()
            .map(|t| t.name)
            .collect();

        let mut stale = Vec::new();
        for svc in dedup_by_key(self.client.list().await?) {
            for tier in &svc.tiers {
                if !registry.contains(tier) {
                    stale.push(StaleTierReference {
                        namespace: svc.namespace.clone(),
                        name: svc.name.clone(),
                        tier: tier.clone(),
                    });
                }
            }
        }

        if !stale.is_empty() {
            warn!(count = stale.len(), "Found workloads referencing deleted tiers");
        }
        Ok(stale)
    }

    async fn ensure_namespace(&self, namespace: &str) -> Result<()> {
        if self.client.namespace_exists(namespace).await? {
            Ok(())
        } else {
            Err(Error::NamespaceNotFound {
                namespace: namespace.to_string(),
            })
        }
    }
}

fn require_request(namespace: &str, name: &str, tier: &str) -> Result<()> {
    require_field(namespace, "namespace")?;
    require_field(name, "name")?;
    require_field(tier, "tier")?;
    Ok(())
}

async fn fetch(
    client: &dyn InferenceServiceClient,
    namespace: &str,
    name: &str,
) -> Result<InferenceService> {
    client
        .get(namespace, name)
        .await?
        .ok_or_else(|| Error::WorkloadNotFound {
            namespace: namespace.to_string(),
            name: name.to_string(),
        })
}

fn dedup_by_key(services: impl IntoIterator<Item = InferenceService>) -> Vec<InferenceService> {
    services
        .into_iter()
        .map(|svc| (svc.key(), svc))
        .collect::<BTreeMap<_, _>>()
        .into_values()
        .collect()
}
