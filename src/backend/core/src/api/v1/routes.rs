//! V1 API routes for CallMonitor.
//!
//! Routes that need a specific capability are wrapped in a
//! [`RequireCapabilityLayer`]; the rest resolve the context through the
//! [`RbacContext`](crate::rbac::RbacContext) extractor. Either way the
//! tenant session checks the capability again before touching data.

use axum::{
    routing::{delete, get, patch, post, put, MethodRouter},
    Router,
};
use std::sync::Arc;

use crate::api::{handlers, AppState};
use crate::rbac::{Capability, RbacContextResolver, RequireCapabilityLayer};

/// V1 API prefix.
pub const V1_PREFIX: &str = "/api/v1";

fn guarded(
    route: MethodRouter<AppState>,
    resolver: &Arc<RbacContextResolver>,
    capability: Capability,
) -> MethodRouter<AppState> {
    route.route_layer(RequireCapabilityLayer::new(resolver.clone(), capability))
}

/// Build the V1 API router.
///
/// # Endpoints
///
/// ## Access
/// - `GET /api/v1/rbac/context` - Resolve the caller's context
/// - `GET /api/v1/rbac/default-organization` - Suggested organization
/// - `GET /api/v1/rbac/policy` - Role × plan capability matrix
/// - `GET /api/v1/call-capabilities` - Per-call feature flags
///
/// ## Calls
/// - `GET|POST /api/v1/calls`
/// - `GET|PATCH|DELETE /api/v1/calls/:id`
/// - `POST /api/v1/calls/:id/supersede`
/// - `GET|POST /api/v1/calls/:id/notes`
/// - `GET /api/v1/audit`
///
/// ## Organization
/// - `POST /api/v1/organizations`
/// - `PUT /api/v1/organization/plan`, `DELETE /api/v1/organization`
/// - `POST /api/v1/organization/members`
/// - `PATCH|DELETE /api/v1/organization/members/:user_id`
pub fn v1_router(resolver: &Arc<RbacContextResolver>) -> Router<AppState> {
    use Capability::*;

    Router::new()
        // Access
        .route("/rbac/context", get(handlers::get_context))
        .route("/rbac/default-organization", get(handlers::get_default_organization))
        .route("/rbac/policy", get(handlers::get_policy))
        .route("/call-capabilities", get(handlers::get_call_capabilities))
        // Calls
        .route(
            "/calls",
            guarded(get(handlers::list_calls), resolver, ViewCalls)
                .merge(guarded(post(handlers::create_call), resolver, EditCalls)),
        )
        .route(
            "/calls/:id",
            guarded(get(handlers::get_call), resolver, ViewCalls)
                .merge(guarded(patch(handlers::update_call), resolver, EditCalls))
                .merge(delete(handlers::delete_call)),
        )
        .route(
            "/calls/:id/supersede",
            guarded(post(handlers::supersede_call), resolver, EditCalls),
        )
        .route(
            "/calls/:id/notes",
            guarded(get(handlers::list_notes), resolver, ViewCalls)
                .merge(guarded(post(handlers::append_note), resolver, EditCalls)),
        )
        .route("/audit", guarded(get(handlers::list_audit), resolver, ViewAudit))
        // Organization
        .route("/organizations", post(handlers::create_organization))
        .route(
            "/organization",
            guarded(delete(handlers::archive_organization), resolver, ManageBilling),
        )
        .route(
            "/organization/plan",
            guarded(put(handlers::set_plan), resolver, ManageBilling),
        )
        .route(
            "/organization/members",
            guarded(post(handlers::add_member), resolver, ManageUsers),
        )
        .route(
            "/organization/members/:user_id",
            guarded(patch(handlers::change_member_role), resolver, ManageUsers)
                .merge(guarded(delete(handlers::remove_member), resolver, ManageUsers)),
        )
}
