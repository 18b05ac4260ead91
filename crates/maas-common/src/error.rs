//! Error types for the MaaS tier toolbox
//!
//! Errors are structured with fields so callers (and the REST transport) can
//! classify them without parsing messages. Every variant maps onto one
//! [`ErrorKind`], which is what decides the HTTP status code and whether a
//! caller may retry.

use thiserror::Error;

use crate::validation::ValidationError;

/// Classification of an [`Error`], independent of its concrete variant
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed input, rejected before any remote call
    Validation,
    /// A referenced tier, group, user, namespace or workload does not exist
    NotFound,
    /// The target already exists (tier name, group in tier) or a write lost a race
    Conflict,
    /// A group named in a write does not exist in the identity system
    ReferentialIntegrity,
    /// Attempt to rename a tier
    Immutability,
    /// Remote read/write failure; state unknown at document granularity
    Storage,
    /// The request deadline expired before the remote calls completed
    Unavailable,
}

/// Main error type for tier and annotation operations
#[derive(Debug, Error)]
pub enum Error {
    /// Input failed validation
    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),

    /// No tier with this name exists in the registry
    #[error("tier not found: {tier}")]
    TierNotFound {
        /// Requested tier name
        tier: String,
    },

    /// The tier exists but does not list the group
    #[error("group not found in tier: {group} (tier {tier})")]
    GroupNotFound {
        /// Tier that was searched
        tier: String,
        /// Group that was not present
        group: String,
    },

    /// The user is not a member of any group
    #[error("user not found: {username}")]
    UserNotFound {
        /// Requested user
        username: String,
    },

    /// The namespace holding the tier registry does not exist
    #[error("configmap namespace not found: {namespace}")]
    NamespaceUnavailable {
        /// Registry namespace
        namespace: String,
    },

    /// The namespace of a workload does not exist
    #[error("namespace not found: {namespace}")]
    NamespaceNotFound {
        /// Workload namespace
        namespace: String,
    },

    /// The LLMInferenceService does not exist
    #[error("llminferenceservice not found: {namespace}/{name}")]
    WorkloadNotFound {
        /// Workload namespace
        namespace: String,
        /// Workload name
        name: String,
    },

    /// The workload's tier annotation is absent or does not list the tier
    #[error("tier {tier} not found in annotation of {namespace}/{name}")]
    TierNotFoundInAnnotation {
        /// Workload namespace
        namespace: String,
        /// Workload name
        name: String,
        /// Tier that was not listed
        tier: String,
    },

    /// A tier with this name already exists
    #[error("tier already exists: {tier}")]
    TierAlreadyExists {
        /// Conflicting tier name
        tier: String,
    },

    /// The group is already listed in the tier
    #[error("group already exists in tier: {group} (tier {tier})")]
    GroupAlreadyExists {
        /// Tier that already lists the group
        tier: String,
        /// Duplicate group
        group: String,
    },

    /// A group named in a write does not exist in the cluster
    #[error("group not found in cluster: {group}")]
    GroupNotFoundInCluster {
        /// Missing group
        group: String,
    },

    /// Tier names cannot be changed after creation
    #[error("tier name cannot be changed: {current} -> {requested}")]
    TierNameImmutable {
        /// Name in the request path
        current: String,
        /// Name supplied in the request body
        requested: String,
    },

    /// Reading a backing resource failed
    #[error("storage read error [{resource}]: {message}")]
    StorageRead {
        /// Resource being read (e.g. "configmap maas-api/tier-to-group-mapping")
        resource: String,
        /// Description of what failed
        message: String,
    },

    /// Writing a backing resource failed
    #[error("storage write error [{resource}]: {message}")]
    StorageWrite {
        /// Resource being written
        resource: String,
        /// Description of what failed
        message: String,
    },

    /// The resource changed between read and write (resourceVersion mismatch)
    #[error("concurrent modification of {resource}")]
    StorageConflict {
        /// Resource that was modified concurrently
        resource: String,
    },

    /// The identity system could not answer a group or membership lookup
    #[error("identity lookup failed for {subject}: {message}")]
    IdentityLookup {
        /// Group or user being looked up
        subject: String,
        /// Description of what failed
        message: String,
    },

    /// Serialization or deserialization of a stored document failed
    #[error("serialization error: {message}")]
    Serialization {
        /// Description of what failed
        message: String,
    },

    /// The operation did not complete before its deadline
    #[error("operation {operation} timed out")]
    Unavailable {
        /// Operation that timed out
        operation: String,
    },

    /// Kubernetes API error not classified by the caller
    #[error("kubernetes error: {source}")]
    Kube {
        /// The underlying kube-rs error
        #[from]
        source: kube::Error,
    },
}

impl Error {
    /// Create a tier-not-found error
    pub fn tier_not_found(tier: impl Into<String>) -> Self {
        Self::TierNotFound { tier: tier.into() }
    }

    /// Create a group-not-found-in-tier error
    pub fn group_not_found(tier: impl Into<String>, group: impl Into<String>) -> Self {
        Self::GroupNotFound {
            tier: tier.into(),
            group: group.into(),
        }
    }

    /// Create a storage read error
    pub fn storage_read(resource: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::StorageRead {
            resource: resource.into(),
            message: msg.into(),
        }
    }

    /// Create a storage write error
    pub fn storage_write(resource: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::StorageWrite {
            resource: resource.into(),
            message: msg.into(),
        }
    }

    /// Create a serialization error
    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::Serialization {
            message: msg.into(),
        }
    }

    /// Classify this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Validation(_) => ErrorKind::Validation,
            Error::TierNotFound { .. }
            | Error::GroupNotFound { .. }
            | Error::UserNotFound { .. }
            | Error::NamespaceUnavailable { .. }
            | Error::NamespaceNotFound { .. }
            | Error::WorkloadNotFound { .. }
            | Error::TierNotFoundInAnnotation { .. } => ErrorKind::NotFound,
            Error::TierAlreadyExists { .. }
            | Error::GroupAlreadyExists { .. }
            | Error::StorageConflict { .. } => ErrorKind::Conflict,
            Error::GroupNotFoundInCluster { .. } => ErrorKind::ReferentialIntegrity,
            Error::TierNameImmutable { .. } => ErrorKind::Immutability,
            Error::StorageRead { .. }
            | Error::StorageWrite { .. }
            | Error::IdentityLookup { .. }
            | Error::Serialization { .. }
            | Error::Kube { .. } => ErrorKind::Storage,
            Error::Unavailable { .. } => ErrorKind::Unavailable,
        }
    }

    /// True when a read-modify-write lost an optimistic-concurrency race
    /// and re-running it against fresh state may succeed
    pub fn is_conflict(&self) -> bool {
        matches!(self, Error::StorageConflict { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ==========================================================================
    // Story Tests: Classifying failures for the transport layer
    // ==========================================================================

    /// Story: Bad input is rejected as validation, never as storage
    #[test]
    fn story_validation_errors_are_classified_as_validation() {
        let err: Error = ValidationError::DescriptionRequired.into();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert!(err.to_string().contains("description is required"));

        let err: Error = ValidationError::NegativeLevel { level: -3 }.into();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert!(err.to_string().contains("-3"));
    }

    /// Story: Missing references are distinguishable from conflicts
    #[test]
    fn story_not_found_and_conflict_are_distinct() {
        assert_eq!(Error::tier_not_found("free").kind(), ErrorKind::NotFound);
        assert_eq!(
            Error::group_not_found("free", "trial-users").kind(),
            ErrorKind::NotFound
        );
        assert_eq!(
            Error::TierAlreadyExists {
                tier: "free".into()
            }
            .kind(),
            ErrorKind::Conflict
        );
        assert_eq!(
            Error::GroupAlreadyExists {
                tier: "free".into(),
                group: "system:authenticated".into()
            }
            .kind(),
            ErrorKind::Conflict
        );
    }

    /// Story: A group missing from the cluster is a referential failure,
    /// not a "group not in tier" failure
    #[test]
    fn story_group_missing_in_cluster_is_referential() {
        let err = Error::GroupNotFoundInCluster {
            group: "ghost-group".into(),
        };
        assert_eq!(err.kind(), ErrorKind::ReferentialIntegrity);
        assert!(err.to_string().contains("ghost-group"));
    }

    /// Story: Renames are their own kind so callers can explain them
    #[test]
    fn story_rename_attempt_is_immutability() {
        let err = Error::TierNameImmutable {
            current: "free".into(),
            requested: "gratis".into(),
        };
        assert_eq!(err.kind(), ErrorKind::Immutability);
        assert!(err.to_string().contains("gratis"));
    }

    /// Story: Only precondition failures are retried automatically
    #[test]
    fn story_only_conflicts_are_retryable_in_process() {
        let conflict = Error::StorageConflict {
            resource: "configmap maas-api/tier-to-group-mapping".into(),
        };
        assert!(conflict.is_conflict());
        assert_eq!(conflict.kind(), ErrorKind::Conflict);

        let write = Error::storage_write("configmap maas-api/tiers", "connection reset");
        assert!(!write.is_conflict());
        assert_eq!(write.kind(), ErrorKind::Storage);

        let timeout = Error::Unavailable {
            operation: "create_tier".into(),
        };
        assert!(!timeout.is_conflict());
        assert_eq!(timeout.kind(), ErrorKind::Unavailable);
    }

    #[test]
    fn registry_namespace_and_workload_namespace_have_distinct_messages() {
        let registry = Error::NamespaceUnavailable {
            namespace: "maas-api".into(),
        };
        let workload = Error::NamespaceNotFound {
            namespace: "ns1".into(),
        };
        assert!(registry.to_string().contains("configmap namespace"));
        assert!(!workload.to_string().contains("configmap"));
        assert_eq!(registry.kind(), workload.kind());
    }
}
