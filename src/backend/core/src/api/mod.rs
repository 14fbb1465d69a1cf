//! API layer for CallMonitor.
//!
//! REST endpoints via Axum. Bearer tokens are verified by [`AuthLayer`] on
//! everything under `/api/v1`; `/health` and `/metrics` stay open.

mod handlers;
pub mod v1;

use axum::{extract::FromRef, routing::get, Router};
use std::sync::Arc;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::middleware::auth::{AuthLayer, TokenVerifier};
use crate::rbac::{DirectoryAdmin, RbacContextResolver};
use crate::tenancy::TenantGuard;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub resolver: Arc<RbacContextResolver>,
    pub guard: TenantGuard,
    pub directory: Arc<dyn DirectoryAdmin>,
    pub verifier: Arc<TokenVerifier>,
}

impl FromRef<AppState> for Arc<RbacContextResolver> {
    fn from_ref(state: &AppState) -> Self {
        state.resolver.clone()
    }
}

/// Build the API router.
///
/// ```rust,ignore
/// let state = AppState { resolver, guard, directory, verifier };
/// let app = build_router(state);
/// ```
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api = v1::v1_router(&state.resolver).layer(AuthLayer::new(state.verifier.clone()));

    Router::new()
        .route("/health", get(handlers::health_check))
        .route("/metrics", get(handlers::prometheus_metrics))
        .nest(v1::V1_PREFIX, api)
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(cors)
        .with_state(state)
}

/// API response wrapper.
#[derive(Debug, serde::Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T: serde::Serialize> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_response_success() {
        let response = ApiResponse::success("test data");
        assert!(response.success);
        assert_eq!(response.data, Some("test data"));
    }

    #[test]
    fn test_api_response_shape() {
        let body = serde_json::to_value(ApiResponse::success(vec![1, 2])).unwrap();
        assert_eq!(body, serde_json::json!({"success": true, "data": [1, 2]}));
    }
}
