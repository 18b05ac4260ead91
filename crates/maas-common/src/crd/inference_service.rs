//! Views of the external resources the toolbox reads: KServe
//! LLMInferenceService workloads and OpenShift user groups.
//!
//! Neither is owned by the toolbox, so both are accessed as `DynamicObject`
//! and projected onto the small structs here.

use serde::{Deserialize, Serialize};

use crate::kube_utils::HasApiResource;

/// Marker for the KServe `LLMInferenceService` resource
pub struct LlmInferenceServiceResource;

impl HasApiResource for LlmInferenceServiceResource {
    const API_VERSION: &'static str = "serving.kserve.io/v1alpha1";
    const KIND: &'static str = "LLMInferenceService";
}

/// Marker for the OpenShift `Group` resource (cluster-scoped)
pub struct OpenShiftGroupResource;

impl HasApiResource for OpenShiftGroupResource {
    const API_VERSION: &'static str = "user.openshift.io/v1";
    const KIND: &'static str = "Group";
}

/// An LLMInferenceService as returned by the workload listings.
///
/// `tiers` is decoded from the tier annotation; a missing or unreadable
/// annotation yields an empty list. `spec` is passed through untouched.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct InferenceService {
    /// Workload name
    pub name: String,
    /// Workload namespace
    pub namespace: String,
    /// Tiers listed in the annotation, in annotation order
    #[serde(default)]
    pub tiers: Vec<String>,
    /// The workload's spec, opaque to the toolbox
    #[serde(default)]
    pub spec: serde_json::Value,
    /// Raw tier annotation value, if the annotation is present
    #[serde(skip)]
    pub tier_annotation: Option<String>,
    /// resourceVersion observed when the workload was read
    #[serde(skip)]
    pub resource_version: Option<String>,
}

impl InferenceService {
    /// `namespace/name`, unique across the cluster
    pub fn key(&self) -> String {
        format!("{}/{}", self.namespace, self.name)
    }
}

/// An identity-system group and its member users
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupMembers {
    /// Group name
    pub name: String,
    /// Usernames in the group
    #[serde(default)]
    pub users: Vec<String>,
}

impl GroupMembers {
    /// True if the user is a direct member
    pub fn contains(&self, username: &str) -> bool {
        self.users.iter().any(|u| u == username)
    }
}
