//! In-memory backends with real version semantics.
//!
//! Each fake tracks a monotonically increasing version per document and
//! rejects a stale conditional write with `StorageConflict`, the way the API
//! server does. A pending "interleaved" write can be queued to simulate
//! another writer landing between a load and the following save.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Mutex;

use async_trait::async_trait;

use maas_common::crd::{GroupMembers, InferenceService, Tier, TierConfig};
use maas_common::{Error, Result, SYSTEM_AUTHENTICATED_GROUP};

use crate::annotation::parse_tiers;
use crate::groups::{memberships, GroupDirectory};
use crate::store::{StoredTiers, TierStore};

type Interleave = Box<dyn FnOnce(&mut TierConfig) + Send>;

#[derive(Default)]
struct TierState {
    config: TierConfig,
    version: u64,
    exists: bool,
    loads: usize,
    saves: usize,
    interleave: Option<Interleave>,
}

impl TierState {
    fn current_version(&self) -> Option<String> {
        self.exists.then(|| self.version.to_string())
    }
}

/// [`TierStore`] holding the registry in memory
#[derive(Default)]
pub struct InMemoryTierStore {
    state: Mutex<TierState>,
}

impl InMemoryTierStore {
    /// A store whose backing document does not exist yet
    pub fn new() -> Self {
        Self::default()
    }

    /// A store whose document already holds `tiers`
    pub fn with_tiers(tiers: Vec<Tier>) -> Self {
        Self {
            state: Mutex::new(TierState {
                config: TierConfig { tiers },
                version: 1,
                exists: true,
                ..Default::default()
            }),
        }
    }

    /// Apply `write` as another writer right after the next load
    pub fn interleave_once(&self, write: impl FnOnce(&mut TierConfig) + Send + 'static) {
        self.lock().interleave = Some(Box::new(write));
    }

    /// Current tiers
    pub fn tiers(&self) -> Vec<Tier> {
        self.lock().config.tiers.clone()
    }

    /// Number of loads served
    pub fn load_count(&self) -> usize {
        self.lock().loads
    }

    /// Number of saves accepted
    pub fn save_count(&self) -> usize {
        self.lock().saves
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, TierState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl TierStore for InMemoryTierStore {
    async fn load(&self) -> Result<StoredTiers> {
        let mut state = self.lock();
        state.loads += 1;
        let snapshot = StoredTiers {
            config: state.config.clone(),
            resource_version: state.current_version(),
        };

        if let Some(write) = state.interleave.take() {
            write(&mut state.config);
            state.version += 1;
            state.exists = true;
        }

        Ok(snapshot)
    }

    async fn save(&self, tiers: &StoredTiers) -> Result<()> {
        let mut state = self.lock();
        if tiers.resource_version != state.current_version() {
            return Err(Error::StorageConflict {
                resource: "in-memory tier registry".to_string(),
            });
        }
        state.config = tiers.config.clone();
        state.version += 1;
        state.exists = true;
        state.saves += 1;
        Ok(())
    }
}

/// [`GroupDirectory`] over a fixed set of groups
#[derive(Clone, Debug, Default)]
pub struct InMemoryGroupDirectory {
    groups: Vec<GroupMembers>,
}

impl InMemoryGroupDirectory {
    /// An empty directory
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a group with its members
    pub fn with_group(mut self, name: &str, users: &[&str]) -> Self {
        self.groups.push(GroupMembers {
            name: name.to_string(),
            users: users.iter().map(|u| u.to_string()).collect(),
        });
        self
    }
}

#[async_trait]
impl GroupDirectory for InMemoryGroupDirectory {
    async fn group_exists(&self, name: &str) -> Result<bool> {
        Ok(name == SYSTEM_AUTHENTICATED_GROUP || self.groups.iter().any(|g| g.name == name))
    }

    async fn user_groups(&self, username: &str) -> Result<Vec<String>> {
        memberships(&self.groups, username)
    }
}

#[derive(Default)]
struct WorkloadState {
    namespaces: BTreeSet<String>,
    services: BTreeMap<(String, String), (Option<String>, u64)>,
    writes: usize,
    interleave: Option<((String, String), String)>,
}

/// [`InferenceServiceClient`](crate::workload::InferenceServiceClient) over
/// in-memory workloads
#[derive(Default)]
pub struct InMemoryInferenceServiceClient {
    state: Mutex<WorkloadState>,
}

impl InMemoryInferenceServiceClient {
    /// A cluster with no namespaces
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a namespace
    pub fn with_namespace(self, namespace: &str) -> Self {
        self.lock().namespaces.insert(namespace.to_string());
        self
    }

    /// Add a workload with an optional raw tier annotation
    pub fn with_service(self, namespace: &str, name: &str, annotation: Option<&str>) -> Self {
        self.lock().services.insert(
            (namespace.to_string(), name.to_string()),
            (annotation.map(str::to_string), 1),
        );
        self
    }

    /// Overwrite a workload's annotation as another writer right after its next read
    pub fn interleave_once(&self, namespace: &str, name: &str, annotation: &str) {
        self.lock().interleave = Some((
            (namespace.to_string(), name.to_string()),
            annotation.to_string(),
        ));
    }

    /// Current raw annotation of a workload
    pub fn annotation(&self, namespace: &str, name: &str) -> Option<String> {
        self.lock()
            .services
            .get(&(namespace.to_string(), name.to_string()))
            .and_then(|(annotation, _)| annotation.clone())
    }

    /// Number of annotation writes accepted
    pub fn write_count(&self) -> usize {
        self.lock().writes
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, WorkloadState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

fn view(namespace: &str, name: &str, annotation: &Option<String>, version: u64) -> InferenceService {
    InferenceService {
        name: name.to_string(),
        namespace: namespace.to_string(),
        tiers: annotation
            .as_deref()
            .and_then(|a| parse_tiers(a).ok())
            .unwrap_or_default(),
        spec: serde_json::json!({}),
        tier_annotation: annotation.clone(),
        resource_version: Some(version.to_string()),
    }
}

#[async_trait]
impl crate::workload::InferenceServiceClient for InMemoryInferenceServiceClient {
    async fn namespace_exists(&self, namespace: &str) -> Result<bool> {
        Ok(self.lock().namespaces.contains(namespace))
    }

    async fn get(&self, namespace: &str, name: &str) -> Result<Option<InferenceService>> {
        let mut state = self.lock();
        let key = (namespace.to_string(), name.to_string());
        let found = state
            .services
            .get(&key)
            .map(|(annotation, version)| view(namespace, name, annotation, *version));

        if state.interleave.as_ref().is_some_and(|(k, _)| *k == key) {
            if let Some((_, annotation)) = state.interleave.take() {
                if let Some(entry) = state.services.get_mut(&key) {
                    entry.0 = Some(annotation);
                    entry.1 += 1;
                }
            }
        }

        Ok(found)
    }

    async fn list(&self) -> Result<Vec<InferenceService>> {
        Ok(self
            .lock()
            .services
            .iter()
            .map(|((ns, name), (annotation, version))| view(ns, name, annotation, *version))
            .collect())
    }

    async fn set_tiers_annotation(
        &self,
        namespace: &str,
        name: &str,
        resource_version: Option<String>,
        value: &str,
    ) -> Result<()> {
        let mut state = self.lock();
        let key = (namespace.to_string(), name.to_string());
        let Some(entry) = state.services.get_mut(&key) else {
            return Err(Error::WorkloadNotFound {
                namespace: namespace.to_string(),
                name: name.to_string(),
            });
        };

        if resource_version.is_some_and(|v| v != entry.1.to_string()) {
            return Err(Error::StorageConflict {
                resource: format!("llminferenceservice {}/{}", namespace, name),
            });
        }

        entry.0 = Some(value.to_string());
        entry.1 += 1;
        state.writes += 1;
        Ok(())
    }
}
