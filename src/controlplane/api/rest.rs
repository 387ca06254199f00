//! REST API Handlers
//!
//! Implements the REST API endpoints for creating, deleting and listing
//! highly-available iSCSI targets. Thin adapter: request bodies map onto the
//! orchestrator's types and errors map onto status codes; no logic lives
//! here.

use crate::controlplane::{ClusterOverview, CreateRequest, Orchestrator};
use crate::error::Error;
use axum::{
    extract::{Json, Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{delete, get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

// =============================================================================
// Request/Response Types
// =============================================================================

/// Target creation request
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateTargetRequest {
    /// Full IQN, e.g. "iqn.2020-01.com.example:disk0"
    pub iqn: String,
    /// Logical unit number
    pub lun: u8,
    /// Volume size in KiB
    pub size_kib: u64,
    /// Nodes holding a replica of the backing volume
    pub storage_nodes: Vec<String>,
    /// Additional diskless nodes eligible to run the target
    #[serde(default)]
    pub client_nodes: Vec<String>,
    /// Floating service address
    pub service_ip: String,
    /// CHAP username
    #[serde(default)]
    pub username: Option<String>,
    /// CHAP password
    #[serde(default)]
    pub password: Option<String>,
    /// Comma-separated portal list
    #[serde(default)]
    pub portals: Option<String>,
}

/// Target creation response
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateTargetResponse {
    pub iqn: String,
    pub lun: u8,
    pub status: String,
}

/// API error response
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiErrorResponse {
    pub error: String,
    pub message: String,
}

// =============================================================================
// REST Router
// =============================================================================

/// REST API router builder
pub struct RestRouter {
    orchestrator: Arc<Orchestrator>,
}

impl RestRouter {
    /// Create a new REST router
    pub fn new(orchestrator: Arc<Orchestrator>) -> Self {
        Self { orchestrator }
    }

    /// Build the Axum router
    pub fn build(self) -> Router {
        let state = AppState {
            orchestrator: self.orchestrator,
        };

        Router::new()
            // Target endpoints
            .route("/v1/iscsi", post(create_target))
            .route("/v1/iscsi", get(list_targets))
            .route("/v1/iscsi/:iqn/:lun", delete(delete_target))
            // Health endpoint
            .route("/health", get(health_check))
            .layer(TraceLayer::new_for_http())
            .layer(CorsLayer::permissive())
            .with_state(state)
    }
}

/// Shared application state
#[derive(Clone)]
struct AppState {
    orchestrator: Arc<Orchestrator>,
}

// =============================================================================
// Handlers
// =============================================================================

/// Create a target/LUN
async fn create_target(
    State(state): State<AppState>,
    Json(request): Json<CreateTargetRequest>,
) -> impl IntoResponse {
    info!("Creating target {} LUN {}", request.iqn, request.lun);

    let create = CreateRequest {
        iqn: request.iqn.clone(),
        lun: request.lun,
        size_kib: request.size_kib,
        storage_nodes: request.storage_nodes,
        client_nodes: request.client_nodes,
        service_ip: request.service_ip,
        username: request.username,
        password: request.password,
        portals: request.portals,
    };

    match state.orchestrator.create_target(create).await {
        Ok(()) => (
            StatusCode::CREATED,
            Json(CreateTargetResponse {
                iqn: request.iqn,
                lun: request.lun,
                status: "created".into(),
            }),
        )
            .into_response(),
        Err(e) => {
            error!("Create failed: {}", e);
            error_response(&e).into_response()
        }
    }
}

/// Delete a target/LUN
async fn delete_target(
    State(state): State<AppState>,
    Path((iqn, lun)): Path<(String, u8)>,
) -> impl IntoResponse {
    info!("Deleting target {} LUN {}", iqn, lun);

    match state.orchestrator.delete_target(&iqn, lun).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => {
            error!("Delete failed: {}", e);
            error_response(&e).into_response()
        }
    }
}

/// List targets with their aggregated health
async fn list_targets(State(state): State<AppState>) -> impl IntoResponse {
    match state.orchestrator.list_targets().await {
        Ok(overview) => (StatusCode::OK, Json::<ClusterOverview>(overview)).into_response(),
        Err(e) => {
            error!("List failed: {}", e);
            error_response(&e).into_response()
        }
    }
}

/// Health check
async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

// =============================================================================
// Error Mapping
// =============================================================================

fn error_response(error: &Error) -> (StatusCode, Json<ApiErrorResponse>) {
    let (status, tag) = match error {
        e if e.is_validation() => (StatusCode::BAD_REQUEST, "invalid_parameter"),
        e if e.is_conflict() => (StatusCode::CONFLICT, "conflict"),
        Error::TargetNotFound { .. } | Error::LogicalUnitNotFound { .. } => {
            (StatusCode::NOT_FOUND, "not_found")
        }
        _ => (StatusCode::INTERNAL_SERVER_ERROR, "action_failed"),
    };

    (
        status,
        Json(ApiErrorResponse {
            error: tag.into(),
            message: error.to_string(),
        }),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_status_mapping() {
        let (status, body) = error_response(&Error::MalformedIqn {
            iqn: "no-separator".into(),
        });
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body.error, "invalid_parameter");

        let (status, body) = error_response(&Error::CibConflict {
            expected: "0.5.2".into(),
            reason: "live version is 0.5.3".into(),
        });
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body.error, "conflict");

        let (status, _) = error_response(&Error::TargetNotFound {
            target: "disk0".into(),
        });
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, body) = error_response(&Error::CibWrite("partial apply".into()));
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body.error, "action_failed");
    }

    #[test]
    fn test_request_deserialization() {
        let payload = r#"{
            "iqn": "iqn.2020-01.com.example:disk0",
            "lun": 0,
            "sizeKib": 1048576,
            "storageNodes": ["node-a", "node-b"],
            "serviceIp": "10.0.0.5"
        }"#;
        let request: CreateTargetRequest = serde_json::from_str(payload).unwrap();
        assert_eq!(request.iqn, "iqn.2020-01.com.example:disk0");
        assert_eq!(request.size_kib, 1_048_576);
        assert_eq!(request.storage_nodes.len(), 2);
        assert!(request.client_nodes.is_empty());
        assert!(request.username.is_none());
    }
}
