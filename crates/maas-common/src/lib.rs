//! Common types for the MaaS tier toolbox: tier model, validation, errors,
//! conflict retry and Kubernetes helpers

#![deny(missing_docs)]

pub mod crd;
pub mod error;
pub mod kube_utils;
pub mod retry;
pub mod telemetry;
pub mod validation;

pub use error::{Error, ErrorKind};

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Default namespace holding the tier registry ConfigMap
pub const DEFAULT_NAMESPACE: &str = "maas-api";

/// Default name of the tier registry ConfigMap
pub const DEFAULT_CONFIGMAP_NAME: &str = "tier-to-group-mapping";

/// ConfigMap data key holding the tier YAML document
pub const TIERS_CONFIGMAP_KEY: &str = "tiers";

/// Label applied to a registry ConfigMap created by the toolbox
pub const CONFIGMAP_APP_LABEL: (&str, &str) = ("app", "tier-to-group-admin");

/// Annotation on LLMInferenceService workloads listing their tiers as a JSON array
pub const TIER_ANNOTATION_KEY: &str = "alpha.maas.opendatahub.io/tiers";

/// Identity-system group that every authenticated user implicitly belongs to
pub const SYSTEM_AUTHENTICATED_GROUP: &str = "system:authenticated";

/// Field manager recorded on writes made by the toolbox
pub const FIELD_MANAGER: &str = "maas-toolbox";
