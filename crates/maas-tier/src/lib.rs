//! Tier registry, identity-group resolution and LLMInferenceService tier
//! annotations for the MaaS toolbox

#![deny(missing_docs)]

pub mod annotation;
pub mod groups;
#[cfg(any(test, feature = "test-util"))]
pub mod memory;
pub mod service;
pub mod store;
pub mod workload;

pub use groups::{GroupDirectory, OpenShiftGroupDirectory};
pub use service::TierService;
pub use store::{ConfigMapTierStore, StoredTiers, TierStore};
pub use workload::{
    InferenceServiceClient, KubeInferenceServiceClient, StaleTierReference, WorkloadTiers,
};
