//! REST routes under `/api/v1`
//!
//! Every handler runs its operation under the configured request deadline;
//! an expired deadline is reported as 503 and the caller may retry.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tracing::warn;

use maas_common::crd::{InferenceService, Tier, TierUpdate, UserTier};
use maas_tier::{StaleTierReference, TierService, WorkloadTiers};

use crate::error::Result;

/// Shared state for handlers
#[derive(Clone)]
pub struct AppState {
    /// Tier registry operations
    pub tiers: Arc<TierService>,
    /// Workload tier annotations
    pub workloads: Arc<WorkloadTiers>,
    /// Deadline applied to every request
    pub request_timeout: Duration,
}

/// Body of `POST /tiers/{name}/groups`
#[derive(Debug, Deserialize)]
pub struct AddGroupRequest {
    /// Group to grant the tier to
    #[serde(default)]
    pub group: String,
}

/// Body of the annotate and remove-annotation requests
#[derive(Debug, Deserialize)]
pub struct AnnotationRequest {
    /// Workload namespace
    #[serde(default)]
    pub namespace: String,
    /// Workload name
    #[serde(default)]
    pub name: String,
    /// Tier to add or remove
    #[serde(default)]
    pub tier: String,
}

/// Reply to an annotation change
#[derive(Debug, Serialize, Deserialize)]
pub struct AnnotationResponse {
    /// Human-readable summary
    pub message: String,
    /// Workload namespace
    pub namespace: String,
    /// Workload name
    pub name: String,
    /// Tier that was added or removed
    pub tier: String,
}

/// Build the toolbox router
pub fn build_router(state: AppState) -> Router {
    let api = Router::new()
        .route("/tiers", get(get_tiers).post(create_tier))
        .route(
            "/tiers/{name}",
            get(get_tier).put(update_tier).delete(delete_tier),
        )
        .route("/tiers/{name}/groups", post(add_group))
        .route(
            "/tiers/{name}/groups/{group}",
            axum::routing::delete(remove_group),
        )
        .route(
            "/tiers/{name}/llminferenceservices",
            get(list_workloads_by_tier),
        )
        .route("/groups/{group}/tiers", get(get_tiers_by_group))
        .route(
            "/groups/{group}/llminferenceservices",
            get(list_workloads_by_group),
        )
        .route("/users/{username}/tiers", get(get_tiers_for_user))
        .route(
            "/users/{username}/llminferenceservices",
            get(list_workloads_for_user),
        )
        .route(
            "/llminferenceservices/stale-tiers",
            get(list_stale_references),
        )
        .route(
            "/llminferenceservices/annotate",
            post(annotate_workload).delete(remove_workload_tier),
        );

    Router::new()
        .nest("/api/v1", api)
        .route("/health", get(|| async { Json(serde_json::json!({ "status": "ok" })) }))
        .with_state(state)
}

/// Run `operation` under the request deadline
async fn within_deadline<T>(
    state: &AppState,
    operation: &str,
    fut: impl Future<Output = maas_common::Result<T>>,
) -> Result<T> {
    match tokio::time::timeout(state.request_timeout, fut).await {
        Ok(result) => Ok(result?),
        Err(_) => {
            warn!(operation = %operation, timeout = ?state.request_timeout, "Request deadline exceeded");
            Err(maas_common::Error::Unavailable {
                operation: operation.to_string(),
            }
            .into())
        }
    }
}

async fn create_tier(
    State(state): State<AppState>,
    body: std::result::Result<Json<Tier>, JsonRejection>,
) -> Result<(StatusCode, Json<Tier>)> {
    let Json(tier) = body?;
    let created = within_deadline(&state, "create_tier", state.tiers.create_tier(tier)).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

async fn get_tiers(State(state): State<AppState>) -> Result<Json<Vec<Tier>>> {
    let tiers = within_deadline(&state, "get_tiers", state.tiers.get_tiers()).await?;
    Ok(Json(tiers))
}

async fn get_tier(State(state): State<AppState>, Path(name): Path<String>) -> Result<Json<Tier>> {
    let tier = within_deadline(&state, "get_tier", state.tiers.get_tier(&name)).await?;
    Ok(Json(tier))
}

async fn update_tier(
    State(state): State<AppState>,
    Path(name): Path<String>,
    body: std::result::Result<Json<TierUpdate>, JsonRejection>,
) -> Result<Json<Tier>> {
    let Json(update) = body?;
    let tier = within_deadline(&state, "update_tier", state.tiers.update_tier(&name, update)).await?;
    Ok(Json(tier))
}

async fn delete_tier(State(state): State<AppState>, Path(name): Path<String>) -> Result<StatusCode> {
    within_deadline(&state, "delete_tier", state.tiers.delete_tier(&name)).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn add_group(
    State(state): State<AppState>,
    Path(name): Path<String>,
    body: std::result::Result<Json<AddGroupRequest>, JsonRejection>,
) -> Result<Json<Tier>> {
    let Json(request) = body?;
    let tier = within_deadline(
        &state,
        "add_group",
        state.tiers.add_group(&name, &request.group),
    )
    .await?;
    Ok(Json(tier))
}

async fn remove_group(
    State(state): State<AppState>,
    Path((name, group)): Path<(String, String)>,
) -> Result<Json<Tier>> {
    let tier = within_deadline(&state, "remove_group", state.tiers.remove_group(&name, &group)).await?;
    Ok(Json(tier))
}

async fn get_tiers_by_group(
    State(state): State<AppState>,
    Path(group): Path<String>,
) -> Result<Json<Vec<Tier>>> {
    let tiers = within_deadline(
        &state,
        "get_tiers_by_group",
        state.tiers.get_tiers_by_group(&group),
    )
    .await?;
    Ok(Json(tiers))
}

async fn get_tiers_for_user(
    State(state): State<AppState>,
    Path(username): Path<String>,
) -> Result<Json<Vec<UserTier>>> {
    let tiers = within_deadline(
        &state,
        "get_tiers_for_user",
        state.tiers.get_tiers_for_user(&username),
    )
    .await?;
    Ok(Json(tiers))
}

async fn list_workloads_by_tier(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<Vec<InferenceService>>> {
    let services = within_deadline(
        &state,
        "list_workloads_by_tier",
        state.workloads.list_by_tier(&name),
    )
    .await?;
    Ok(Json(services))
}

async fn list_workloads_by_group(
    State(state): State<AppState>,
    Path(group): Path<String>,
) -> Result<Json<Vec<InferenceService>>> {
    let services = within_deadline(
        &state,
        "list_workloads_by_group",
        state.workloads.list_by_group(&group),
    )
    .await?;
    Ok(Json(services))
}

async fn list_workloads_for_user(
    State(state): State<AppState>,
    Path(username): Path<String>,
) -> Result<Json<Vec<InferenceService>>> {
    let services = within_deadline(
        &state,
        "list_workloads_for_user",
        state.workloads.list_for_user(&username),
    )
    .await?;
    Ok(Json(services))
}

async fn list_stale_references(
    State(state): State<AppState>,
) -> Result<Json<Vec<StaleTierReference>>> {
    let stale = within_deadline(
        &state,
        "list_stale_references",
        state.workloads.stale_references(),
    )
    .await?;
    Ok(Json(stale))
}

async fn annotate_workload(
    State(state): State<AppState>,
    body: std::result::Result<Json<AnnotationRequest>, JsonRejection>,
) -> Result<Json<AnnotationResponse>> {
    let Json(request) = body?;
    within_deadline(
        &state,
        "annotate_workload",
        state
            .workloads
            .annotate(&request.namespace, &request.name, &request.tier),
    )
    .await?;

    Ok(Json(AnnotationResponse {
        message: "Tier annotation added successfully".to_string(),
        namespace: request.namespace,
        name: request.name,
        tier: request.tier,
    }))
}

async fn remove_workload_tier(
    State(state): State<AppState>,
    body: std::result::Result<Json<AnnotationRequest>, JsonRejection>,
) -> Result<Json<AnnotationResponse>> {
    let Json(request) = body?;
    within_deadline(
        &state,
        "remove_workload_tier",
        state
            .workloads
            .remove_tier(&request.namespace, &request.name, &request.tier),
    )
    .await?;

    Ok(Json(AnnotationResponse {
        message: "Tier annotation removed successfully".to_string(),
        namespace: request.namespace,
        name: request.name,
        tier: request.tier,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    use maas_common::SYSTEM_AUTHENTICATED_GROUP;
    use maas_tier::memory::{InMemoryGroupDirectory, InMemoryInferenceServiceClient, InMemoryTierStore};
    use maas_tier::{StoredTiers, TierStore};

    fn state_with(store: Arc<dyn TierStore>, timeout: Duration) -> AppState {
        let groups = InMemoryGroupDirectory::new()
            .with_group("trial-users", &["alice"])
            .with_group("premium-users", &["bob"]);
        let tiers = Arc::new(TierService::new(store, Arc::new(groups)));
        let client = InMemoryInferenceServiceClient::new()
            .with_namespace("ns1")
            .with_service("ns1", "model-a", None);
        let workloads = Arc::new(WorkloadTiers::new(Arc::new(client), tiers.clone()));
        AppState {
            tiers,
            workloads,
            request_timeout: timeout,
        }
    }

    fn router() -> Router {
        build_router(state_with(
            Arc::new(InMemoryTierStore::new()),
            Duration::from_secs(5),
        ))
    }

    fn json_request(method: &str, uri: &str, body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn empty_request(method: &str, uri: &str) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .body(Body::empty())
            .unwrap()
    }

    async fn send(router: &Router, request: Request<Body>) -> (StatusCode, serde_json::Value) {
        let response = router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), 1024 * 1024)
            .await
            .unwrap();
        let json = if body.is_empty() {
            serde_json::Value::Null
        } else {
            serde_json::from_slice(&body).unwrap()
        };
        (status, json)
    }

    fn free_tier_body() -> serde_json::Value {
        serde_json::json!({
            "name": "free",
            "description": "Free tier",
            "level": 1,
            "groups": [SYSTEM_AUTHENTICATED_GROUP],
        })
    }

    #[tokio::test]
    async fn health_reports_ok() {
        let (status, body) = send(&router(), empty_request("GET", "/health")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, serde_json::json!({ "status": "ok" }));
    }

    /// Integration test: create, duplicate create, read back
    #[tokio::test]
    async fn integration_create_tier_lifecycle() {
        let router = router();

        let (status, body) = send(&router, json_request("POST", "/api/v1/tiers", free_tier_body())).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body, free_tier_body());

        let (status, body) = send(&router, json_request("POST", "/api/v1/tiers", free_tier_body())).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert!(body["error"].as_str().unwrap().contains("already exists"));

        let (status, body) = send(&router, empty_request("GET", "/api/v1/tiers")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.as_array().unwrap().len(), 1);

        let (status, _) = send(&router, empty_request("GET", "/api/v1/tiers/gold")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn invalid_tier_and_malformed_body_are_bad_requests() {
        let router = router();

        let mut body = free_tier_body();
        body["name"] = serde_json::json!("Free Tier");
        let (status, _) = send(&router, json_request("POST", "/api/v1/tiers", body)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let request = Request::builder()
            .method("POST")
            .uri("/api/v1/tiers")
            .header("content-type", "application/json")
            .body(Body::from("{not json"))
            .unwrap();
        let (status, body) = send(&router, request).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().starts_with("invalid request body"));
    }

    #[tokio::test]
    async fn create_without_level_defaults_to_zero() {
        let router = router();
        let body = serde_json::json!({
            "name": "free",
            "description": "Free tier",
            "groups": [SYSTEM_AUTHENTICATED_GROUP],
        });
        let (status, body) = send(&router, json_request("POST", "/api/v1/tiers", body)).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["level"], 0);
    }

    #[tokio::test]
    async fn create_without_description_is_classified_validation_error() {
        let router = router();
        let body = serde_json::json!({ "name": "free", "level": 1 });
        let (status, body) = send(&router, json_request("POST", "/api/v1/tiers", body)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "validation error: tier description is required");
    }

    #[tokio::test]
    async fn update_rename_and_missing_group_are_bad_requests() {
        let router = router();
        send(&router, json_request("POST", "/api/v1/tiers", free_tier_body())).await;

        let (status, _) = send(
            &router,
            json_request("PUT", "/api/v1/tiers/free", serde_json::json!({ "name": "gratis" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = send(
            &router,
            json_request(
                "PUT",
                "/api/v1/tiers/free",
                serde_json::json!({ "level": -1, "groups": ["ghost"] }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, body) = send(
            &router,
            json_request(
                "PUT",
                "/api/v1/tiers/free",
                serde_json::json!({ "description": "Updated", "level": 3 }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["description"], "Updated");
        assert_eq!(body["level"], 3);
    }

    #[tokio::test]
    async fn group_routes_add_remove_and_query() {
        let router = router();
        send(&router, json_request("POST", "/api/v1/tiers", free_tier_body())).await;

        let (status, body) = send(
            &router,
            json_request(
                "POST",
                "/api/v1/tiers/free/groups",
                serde_json::json!({ "group": "trial-users" }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            body["groups"],
            serde_json::json!(["system:authenticated", "trial-users"])
        );

        let (status, body) = send(&router, empty_request("GET", "/api/v1/groups/trial-users/tiers")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body[0]["name"], "free");

        let (status, body) = send(&router, empty_request("GET", "/api/v1/users/alice/tiers")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            body[0]["groups"],
            serde_json::json!(["system:authenticated", "trial-users"])
        );

        let (status, _) = send(&router, empty_request("GET", "/api/v1/users/mallory/tiers")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = send(
            &router,
            empty_request("DELETE", "/api/v1/tiers/free/groups/trial-users"),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let (status, _) = send(
            &router,
            empty_request("DELETE", "/api/v1/tiers/free/groups/trial-users"),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    /// Integration test: annotate, list, remove, list, stale references
    #[tokio::test]
    async fn integration_workload_annotation_lifecycle() {
        let router = router();
        send(&router, json_request("POST", "/api/v1/tiers", free_tier_body())).await;

        let request = serde_json::json!({ "namespace": "ns1", "name": "model-a", "tier": "free" });
        let (status, body) = send(
            &router,
            json_request("POST", "/api/v1/llminferenceservices/annotate", request.clone()),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["tier"], "free");
        assert_eq!(body["namespace"], "ns1");

        let (status, body) = send(
            &router,
            empty_request("GET", "/api/v1/tiers/free/llminferenceservices"),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body[0]["name"], "model-a");
        assert_eq!(body[0]["tiers"], serde_json::json!(["free"]));

        let (status, body) = send(
            &router,
            empty_request("GET", "/api/v1/users/alice/llminferenceservices"),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.as_array().unwrap().len(), 1);

        let (status, _) = send(&router, empty_request("DELETE", "/api/v1/tiers/free")).await;
        assert_eq!(status, StatusCode::NO_CONTENT);

        let (status, body) = send(
            &router,
            empty_request("GET", "/api/v1/llminferenceservices/stale-tiers"),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            body,
            serde_json::json!([{ "namespace": "ns1", "name": "model-a", "tier": "free" }])
        );

        let (status, _) = send(
            &router,
            json_request("DELETE", "/api/v1/llminferenceservices/annotate", request.clone()),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let (status, _) = send(
            &router,
            json_request("DELETE", "/api/v1/llminferenceservices/annotate", request),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn listing_workloads_of_unknown_tier_is_not_found() {
        let (status, _) = send(
            &router(),
            empty_request("GET", "/api/v1/tiers/gold/llminferenceservices"),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    struct StalledStore;

    #[async_trait]
    impl TierStore for StalledStore {
        async fn load(&self) -> maas_common::Result<StoredTiers> {
            std::future::pending().await
        }

        async fn save(&self, _tiers: &StoredTiers) -> maas_common::Result<()> {
            std::future::pending().await
        }
    }

    #[tokio::test]
    async fn expired_deadline_is_service_unavailable() {
        let router = build_router(state_with(Arc::new(StalledStore), Duration::from_millis(20)));
        let (status, body) = send(&router, empty_request("GET", "/api/v1/tiers")).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert!(body["error"].as_str().unwrap().contains("get_tiers"));
    }
}
