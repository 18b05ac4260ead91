//! Tier registry persistence
//!
//! The registry is one YAML document in one ConfigMap key. Every save replaces
//! the whole document. Saves carry the `resourceVersion` observed at load so a
//! concurrent writer surfaces as [`Error::StorageConflict`] instead of a lost
//! update.

use std::collections::BTreeMap;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::ConfigMap;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::api::{Api, Patch, PatchParams, PostParams};
use kube::Client;
#[cfg(test)]
use mockall::automock;
use tracing::{debug, info};

use maas_common::crd::TierConfig;
use maas_common::kube_utils::{is_conflict, is_not_found, namespace_exists};
use maas_common::{Error, Result, CONFIGMAP_APP_LABEL, FIELD_MANAGER, TIERS_CONFIGMAP_KEY};

/// A loaded registry plus the version it was read at
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StoredTiers {
    /// The tiers
    pub config: TierConfig,
    /// `None` when the backing document does not exist yet
    pub resource_version: Option<String>,
}

/// Trait abstracting registry persistence for testability
#[cfg_attr(test, automock)]
#[async_trait]
pub trait TierStore: Send + Sync {
    /// Read the registry.
    ///
    /// A missing document or an empty `tiers` key yields an empty registry.
    /// Fails with `NamespaceUnavailable` if the registry namespace is gone.
    async fn load(&self) -> Result<StoredTiers>;

    /// Replace the registry document.
    ///
    /// With a version this is a conditional update and fails with
    /// `StorageConflict` if the document changed since it was read. Without
    /// a version the document is created.
    async fn save(&self, tiers: &StoredTiers) -> Result<()>;
}

/// Registry stored in a ConfigMap
pub struct ConfigMapTierStore {
    client: Client,
    namespace: String,
    name: String,
}

impl ConfigMapTierStore {
    /// Create a store for the ConfigMap `namespace/name`
    pub fn new(client: Client, namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            client,
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// Fail with `NamespaceUnavailable` unless the registry namespace exists
    pub async fn validate_namespace(&self) -> Result<()> {
        if self.namespace_exists().await? {
            Ok(())
        } else {
            Err(Error::NamespaceUnavailable {
                namespace: self.namespace.clone(),
            })
        }
    }

    fn api(&self) -> Api<ConfigMap> {
        Api::namespaced(self.client.clone(), &self.namespace)
    }

    fn resource(&self) -> String {
        format!("configmap {}/{}", self.namespace, self.name)
    }

    async fn namespace_exists(&self) -> Result<bool> {
        namespace_exists(&self.client, &self.namespace).await
    }

    fn build_configmap(&self, yaml: String) -> ConfigMap {
        let (label_key, label_value) = CONFIGMAP_APP_LABEL;
        ConfigMap {
            metadata: ObjectMeta {
                name: Some(self.name.clone()),
                namespace: Some(self.namespace.clone()),
                labels: Some(BTreeMap::from([(
                    label_key.to_string(),
                    label_value.to_string(),
                )])),
                ..Default::default()
            },
            data: Some(BTreeMap::from([(TIERS_CONFIGMAP_KEY.to_string(), yaml)])),
            ..Default::default()
        }
    }

    /// Classify a failed write.
    ///
    /// 409 means the version precondition failed (or a concurrent creator won);
    /// 404 on update means the document vanished since it was read. Both are
    /// resolved by reloading. 404 on create means the namespace is gone.
    fn write_error(&self, err: kube::Error, creating: bool) -> Error {
        if is_conflict(&err) || (!creating && is_not_found(&err)) {
            return Error::StorageConflict {
                resource: self.resource(),
            };
        }
        if creating && is_not_found(&err) {
            return Error::NamespaceUnavailable {
                namespace: self.namespace.clone(),
            };
        }
        Error::storage_write(self.resource(), err.to_string())
    }
}

#[async_trait]
impl TierStore for ConfigMapTierStore {
    async fn load(&self) -> Result<StoredTiers> {
        debug!(configmap = %self.name, namespace = %self.namespace, "Loading tier registry");

        let cm = self
            .api()
            .get_opt(&self.name)
            .await
            .map_err(|e| Error::storage_read(self.resource(), e.to_string()))?;

        let Some(cm) = cm else {
            if !self.namespace_exists().await? {
                return Err(Error::NamespaceUnavailable {
                    namespace: self.namespace.clone(),
                });
            }
            debug!(configmap = %self.name, "Tier registry ConfigMap absent, starting empty");
            return Ok(StoredTiers::default());
        };

        let text = cm
            .data
            .as_ref()
            .and_then(|data| data.get(TIERS_CONFIGMAP_KEY))
            .map(String::as_str)
            .unwrap_or_default();

        let config = TierConfig::from_yaml(text)?;
        debug!(
            configmap = %self.name,
            tiers = config.tiers.len(),
            "Loaded tier registry"
        );

        Ok(StoredTiers {
            config,
            resource_version: cm.metadata.resource_version,
        })
    }

    async fn save(&self, tiers: &StoredTiers) -> Result<()> {
        let yaml = tiers.config.to_yaml()?;

        match &tiers.resource_version {
            Some(version) => {
                let mut data = serde_json::Map::new();
                data.insert(TIERS_CONFIGMAP_KEY.to_string(), yaml.into());
                let patch = serde_json::json!({
                    "metadata": { "resourceVersion": version },
                    "data": data,
                });
                let params = PatchParams {
                    field_manager: Some(FIELD_MANAGER.to_string()),
                    ..Default::default()
                };
                self.api()
                    .patch(&self.name, &params, &Patch::Merge(&patch))
                    .await
                    .map_err(|e| self.write_error(e, false))?;
                debug!(configmap = %self.name, version = %version, "Updated tier registry");
            }
            None => {
                let params = PostParams {
                    field_manager: Some(FIELD_MANAGER.to_string()),
                    ..Default::default()
                };
                self.api()
                    .create(&params, &self.build_configmap(yaml))
                    .await
                    .map_err(|e| self.write_error(e, true))?;
                info!(
                    configmap = %self.name,
                    namespace = %self.namespace,
                    "Created tier registry ConfigMap"
                );
            }
        }

        Ok(())
    }
}
