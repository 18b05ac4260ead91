//! Shared Kubernetes helpers using kube-rs
//!
//! The toolbox reaches three kinds of remote object:
//! - the tier registry ConfigMap (typed `Api<ConfigMap>`)
//! - OpenShift `Group` objects in the identity system (`DynamicObject`)
//! - KServe `LLMInferenceService` workloads (`DynamicObject`)
//!
//! The two dynamic kinds are described by [`HasApiResource`] so the apiVersion
//! and plural are declared once.

use std::time::Duration;

use k8s_openapi::api::core::v1::Namespace;
use kube::api::Api;
use kube::discovery::ApiResource;
use kube::{Client, Config};

use crate::Error;

/// Default connection timeout for kube clients
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Types with a compile-time API group, version and kind.
///
/// ```ignore
/// impl HasApiResource for LlmInferenceServiceResource {
///     const API_VERSION: &'static str = "serving.kserve.io/v1alpha1";
///     const KIND: &'static str = "LLMInferenceService";
/// }
///
/// let api: Api<DynamicObject> =
///     Api::namespaced_with(client, "ns1", &LlmInferenceServiceResource::api_resource());
/// ```
pub trait HasApiResource {
    /// Full API version (e.g. "user.openshift.io/v1")
    const API_VERSION: &'static str;
    /// Resource kind (e.g. "Group")
    const KIND: &'static str;

    /// Build an ApiResource from the type's constants
    fn api_resource() -> ApiResource {
        build_api_resource(Self::API_VERSION, Self::KIND)
    }
}

/// Build an ApiResource from an apiVersion and kind
pub fn build_api_resource(api_version: &str, kind: &str) -> ApiResource {
    let (group, version) = parse_api_version(api_version);
    ApiResource {
        group,
        version,
        kind: kind.to_string(),
        api_version: api_version.to_string(),
        plural: pluralize_kind(kind),
    }
}

/// Split an apiVersion into (group, version). Core types have an empty group.
pub fn parse_api_version(api_version: &str) -> (String, String) {
    match api_version.split_once('/') {
        Some((group, version)) => (group.to_string(), version.to_string()),
        None => (String::new(), api_version.to_string()),
    }
}

/// Pluralize a Kubernetes resource kind the way the API server does for
/// regular nouns
pub fn pluralize_kind(kind: &str) -> String {
    let lower = kind.to_lowercase();
    if lower.ends_with('s') || lower.ends_with("ch") || lower.ends_with("sh") {
        format!("{}es", lower)
    } else if lower.ends_with('y') && !lower.ends_with("ay") && !lower.ends_with("ey") {
        format!("{}ies", &lower[..lower.len() - 1])
    } else {
        format!("{}s", lower)
    }
}

/// True if the API server answered 404
pub fn is_not_found(err: &kube::Error) -> bool {
    matches!(err, kube::Error::Api(ae) if ae.code == 404)
}

/// True if the API server rejected a write because the object changed (409)
pub fn is_conflict(err: &kube::Error) -> bool {
    matches!(err, kube::Error::Api(ae) if ae.code == 409)
}

/// True if the namespace exists. Lookup failures are `StorageRead` errors.
pub async fn namespace_exists(client: &Client, name: &str) -> Result<bool, Error> {
    let api: Api<Namespace> = Api::all(client.clone());
    let ns = api.get_opt(name).await.map_err(|e| {
        Error::storage_read(
            format!("namespace {}", name),
            format!("failed to check namespace: {}", e),
        )
    })?;
    Ok(ns.is_some())
}

/// Create a kube client from the in-cluster service account, falling back
/// to the local kubeconfig
pub async fn create_client_with_timeout(
    connect_timeout: Duration,
    read_timeout: Duration,
) -> Result<Client, Error> {
    let mut config = Config::infer().await.map_err(kube::Error::InferConfig)?;
    config.connect_timeout = Some(connect_timeout);
    config.read_timeout = Some(read_timeout);
    Ok(Client::try_from(config)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use http;
    use kube::core::ErrorResponse;

    fn api_error(code: u16) -> kube::Error {
        kube::Error::Api(ErrorResponse {
            status: "Failure".to_string(),
            message: "test".to_string(),
            reason: "Test".to_string(),
            code,
        })
    }

    #[test]
    fn parses_grouped_and_core_api_versions() {
        assert_eq!(
            parse_api_version("serving.kserve.io/v1alpha1"),
            ("serving.kserve.io".to_string(), "v1alpha1".to_string())
        );
        assert_eq!(
            parse_api_version("v1"),
            (String::new(), "v1".to_string())
        );
    }

    #[test]
    fn pluralizes_toolbox_kinds() {
        assert_eq!(pluralize_kind("Group"), "groups");
        assert_eq!(pluralize_kind("LLMInferenceService"), "llminferenceservices");
        assert_eq!(pluralize_kind("Policy"), "policies");
        assert_eq!(pluralize_kind("Gateway"), "gateways");
    }

    #[test]
    fn builds_api_resource_from_trait_constants() {
        struct Widget;
        impl HasApiResource for Widget {
            const API_VERSION: &'static str = "example.io/v1beta1";
            const KIND: &'static str = "Widget";
        }

        let ar = Widget::api_resource();
        assert_eq!(ar.group, "example.io");
        assert_eq!(ar.version, "v1beta1");
        assert_eq!(ar.plural, "widgets");
        assert_eq!(ar.api_version, "example.io/v1beta1");
    }

    #[test]
    fn classifies_api_status_codes() {
        assert!(is_not_found(&api_error(404)));
        assert!(!is_not_found(&api_error(409)));
        assert!(is_conflict(&api_error(409)));
        assert!(!is_conflict(&api_error(500)));
    }

    #[tokio::test]
    async fn namespace_lookup_failure_is_storage_read() {
        let service = tower::service_fn(|_req: http::Request<kube::client::Body>| async {
            Err::<http::Response<kube::client::Body>, _>(std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                "api server unreachable",
            ))
        });
        let client = Client::new(service, "default");

        let err = namespace_exists(&client, "maas-api").await.unwrap_err();
        assert!(matches!(err, Error::StorageRead { ref resource, .. } if resource == "namespace maas-api"));
    }
}
