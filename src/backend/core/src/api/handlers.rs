//! API request handlers.
//!
//! All handlers return `Result<impl IntoResponse, CallMonitorError>`. Data
//! access always goes through a tenant session; handlers never touch a
//! store directly.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::error;
use uuid::Uuid;

use super::{ApiResponse, AppState};
use crate::audit::{actions, NewAuditEntry};
use crate::error::{CallMonitorError, Result};
use crate::rbac::{
    Capability, Identity, Membership, MembershipStore, Organization, OrganizationId, PlanTier,
    PredefinedRole, RbacContext, Role, UserId,
};
use crate::telemetry::logging::SECURITY_TARGET;
use crate::tenancy::{CallPatch, NewCall};

// ═══════════════════════════════════════════════════════════════════════════════
// Health Check
// ═══════════════════════════════════════════════════════════════════════════════

pub async fn health_check() -> impl IntoResponse {
    Json(json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

pub async fn prometheus_metrics() -> impl IntoResponse {
    let body = crate::telemetry::MetricsRegistry::global().render();

    (
        [(axum::http::header::CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")],
        body,
    )
}

// ═══════════════════════════════════════════════════════════════════════════════
// Access Context
// ═══════════════════════════════════════════════════════════════════════════════

pub async fn get_context(ctx: RbacContext) -> impl IntoResponse {
    Json(ctx.to_response())
}

pub async fn get_default_organization(
    State(state): State<AppState>,
    identity: Identity,
) -> Result<impl IntoResponse> {
    let organization_id = state.resolver.default_organization(&identity).await?;
    Ok(Json(ApiResponse::success(json!({ "organization_id": organization_id }))))
}

pub async fn get_policy(State(state): State<AppState>, ctx: RbacContext) -> impl IntoResponse {
    Json(ApiResponse::success(json!({
        "version": ctx.policy_version(),
        "matrix": state.resolver.policy().matrix(),
    })))
}

pub async fn get_call_capabilities(ctx: RbacContext) -> impl IntoResponse {
    Json(json!({
        "success": true,
        "capabilities": ctx.call_capabilities(),
    }))
}

// ═══════════════════════════════════════════════════════════════════════════════
// Call Handlers
// ═══════════════════════════════════════════════════════════════════════════════

pub async fn list_calls(State(state): State<AppState>, ctx: RbacContext) -> Result<impl IntoResponse> {
    let calls = state
        .guard
        .with_tenant_scope(&ctx, |s| Box::pin(async move { s.list_calls().await }))
        .await?;
    Ok(Json(ApiResponse::success(calls)))
}

pub async fn create_call(
    State(state): State<AppState>,
    ctx: RbacContext,
    Json(req): Json<NewCall>,
) -> Result<impl IntoResponse> {
    let call = state
        .guard
        .with_tenant_scope(&ctx, move |s| Box::pin(async move { s.create_call(req).await }))
        .await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(call))))
}

pub async fn get_call(
    State(state): State<AppState>,
    ctx: RbacContext,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    let call = state
        .guard
        .with_tenant_scope(&ctx, move |s| Box::pin(async move { s.get_call(id).await }))
        .await?
        .ok_or_else(|| CallMonitorError::not_found("call", id.to_string()))?;
    Ok(Json(ApiResponse::success(call)))
}

pub async fn update_call(
    State(state): State<AppState>,
    ctx: RbacContext,
    Path(id): Path<Uuid>,
    Json(patch): Json<CallPatch>,
) -> Result<impl IntoResponse> {
    let call = state
        .guard
        .with_tenant_scope(&ctx, move |s| Box::pin(async move { s.update_call(id, patch).await }))
        .await?;
    Ok(Json(ApiResponse::success(call)))
}

pub async fn delete_call(
    State(state): State<AppState>,
    ctx: RbacContext,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    state
        .guard
        .with_tenant_scope(&ctx, move |s| Box::pin(async move { s.delete_call(id).await }))
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn supersede_call(
    State(state): State<AppState>,
    ctx: RbacContext,
    Path(id): Path<Uuid>,
    Json(req): Json<NewCall>,
) -> Result<impl IntoResponse> {
    let call = state
        .guard
        .with_tenant_scope(&ctx, move |s| Box::pin(async move { s.supersede_call(id, req).await }))
        .await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(call))))
}

#[derive(Debug, Deserialize)]
pub struct AppendNoteRequest {
    pub body: String,
}

pub async fn list_notes(
    State(state): State<AppState>,
    ctx: RbacContext,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    let notes = state
        .guard
        .with_tenant_scope(&ctx, move |s| Box::pin(async move { s.list_notes(id).await }))
        .await?;
    Ok(Json(ApiResponse::success(notes)))
}

pub async fn append_note(
    State(state): State<AppState>,
    ctx: RbacContext,
    Path(id): Path<Uuid>,
    Json(req): Json<AppendNoteRequest>,
) -> Result<impl IntoResponse> {
    let note = state
        .guard
        .with_tenant_scope(&ctx, move |s| Box::pin(async move { s.append_note(id, req.body).await }))
        .await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(note))))
}

#[derive(Debug, Deserialize)]
pub struct AuditQuery {
    pub limit: Option<i64>,
}

pub async fn list_audit(
    State(state): State<AppState>,
    ctx: RbacContext,
    Query(query): Query<AuditQuery>,
) -> Result<impl IntoResponse> {
    let limit = query.limit.unwrap_or(100);
    let entries = state
        .guard
        .with_tenant_scope(&ctx, move |s| Box::pin(async move { s.list_audit(limit).await }))
        .await?;
    Ok(Json(ApiResponse::success(entries)))
}

// ═══════════════════════════════════════════════════════════════════════════════
// Organization Handlers
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Deserialize)]
pub struct CreateOrganizationRequest {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub plan: Option<PlanTier>,
}

#[derive(Debug, Deserialize)]
pub struct SetPlanRequest {
    pub plan: PlanTier,
}

#[derive(Debug, Deserialize)]
pub struct AddMemberRequest {
    pub user_id: String,
    pub role: String,
}

#[derive(Debug, Deserialize)]
pub struct ChangeRoleRequest {
    pub role: String,
}

#[derive(Debug, Serialize)]
struct PlanChange {
    plan: PlanTier,
}

/// Any authenticated user may create an organization; they become its owner.
pub async fn create_organization(
    State(state): State<AppState>,
    identity: Identity,
    Json(req): Json<CreateOrganizationRequest>,
) -> Result<impl IntoResponse> {
    let user = identity.user().ok_or_else(CallMonitorError::auth_required)?;
    let organization_id = OrganizationId::parse(&req.id)
        .filter(OrganizationId::is_well_formed)
        .ok_or_else(|| CallMonitorError::validation("Organization id is invalid"))?;
    if req.name.trim().is_empty() {
        return Err(CallMonitorError::validation("Organization name cannot be empty"));
    }

    let organization = Organization::new(
        organization_id,
        req.name.trim(),
        req.plan.unwrap_or(PlanTier::Free),
    );
    let organization = state
        .directory
        .create_organization(organization, user.user_id())
        .await?;

    let ctx = state
        .resolver
        .resolve(&identity, Some(organization.id.as_str()))
        .await?;
    let audit = NewAuditEntry::new("organization", actions::CREATE)
        .resource(&organization.id)
        .after(&organization);
    let recorded = state
        .guard
        .with_tenant_scope(&ctx, move |s| Box::pin(async move { s.record_audit(audit).await }))
        .await;
    if let Err(err) = recorded {
        error!(
            target: SECURITY_TARGET,
            organization_id = %organization.id,
            action = actions::CREATE,
            error = %err,
            "Organization created without a committed audit entry"
        );
        return Err(err);
    }

    Ok((StatusCode::CREATED, Json(ApiResponse::success(organization))))
}

pub async fn set_plan(
    State(state): State<AppState>,
    ctx: RbacContext,
    Json(req): Json<SetPlanRequest>,
) -> Result<impl IntoResponse> {
    let audit = NewAuditEntry::new("organization", actions::PLAN_CHANGE)
        .resource(ctx.organization_id())
        .before(&PlanChange { plan: ctx.plan() })
        .after(&PlanChange { plan: req.plan });
    let (directory, organization_id, plan) = (state.directory.clone(), ctx.organization_id().clone(), req.plan);
    audited(&state, &ctx, audit, async move { directory.set_plan(&organization_id, plan).await }).await?;

    Ok(Json(ApiResponse::success(json!({
        "organization_id": ctx.organization_id(),
        "plan": req.plan,
    }))))
}

pub async fn archive_organization(
    State(state): State<AppState>,
    ctx: RbacContext,
) -> Result<impl IntoResponse> {
    let audit = NewAuditEntry::new("organization", actions::ARCHIVE).resource(ctx.organization_id());
    let (directory, organization_id) = (state.directory.clone(), ctx.organization_id().clone());
    audited(&state, &ctx, audit, async move { directory.archive_organization(&organization_id).await }).await?;

    Ok(StatusCode::NO_CONTENT)
}

pub async fn add_member(
    State(state): State<AppState>,
    ctx: RbacContext,
    Json(req): Json<AddMemberRequest>,
) -> Result<impl IntoResponse> {
    let user_id = parse_member_id(&req.user_id)?;
    let role = assignable_role(&ctx, &req.role)?;

    let audit = NewAuditEntry::new("membership", actions::MEMBER_ADD)
        .resource(&user_id)
        .after(&json!({ "user_id": user_id, "role": role }));
    let (directory, organization_id) = (state.directory.clone(), ctx.organization_id().clone());
    let membership = audited(&state, &ctx, audit, async move {
        directory.accept_invite(&user_id, &organization_id, role).await
    })
    .await?;

    Ok((StatusCode::CREATED, Json(ApiResponse::success(membership))))
}

pub async fn change_member_role(
    State(state): State<AppState>,
    ctx: RbacContext,
    Path(user_id): Path<String>,
    Json(req): Json<ChangeRoleRequest>,
) -> Result<impl IntoResponse> {
    let user_id = parse_member_id(&user_id)?;
    let role = assignable_role(&ctx, &req.role)?;
    let target = manageable_member(&state, &ctx, &user_id).await?;

    let audit = NewAuditEntry::new("membership", actions::MEMBER_ROLE_CHANGE)
        .resource(&user_id)
        .before(&target)
        .after(&json!({ "user_id": user_id, "role": role }));
    let (directory, organization_id) = (state.directory.clone(), ctx.organization_id().clone());
    let membership = audited(&state, &ctx, audit, async move {
        directory.change_role(&user_id, &organization_id, role).await
    })
    .await?;

    Ok(Json(ApiResponse::success(membership)))
}

pub async fn remove_member(
    State(state): State<AppState>,
    ctx: RbacContext,
    Path(user_id): Path<String>,
) -> Result<impl IntoResponse> {
    let user_id = parse_member_id(&user_id)?;
    if &user_id == ctx.user_id() {
        return Err(CallMonitorError::validation("Members cannot remove themselves"));
    }
    let target = manageable_member(&state, &ctx, &user_id).await?;

    let audit = NewAuditEntry::new("membership", actions::MEMBER_REMOVE)
        .resource(&user_id)
        .before(&target);
    let (directory, organization_id) = (state.directory.clone(), ctx.organization_id().clone());
    audited(&state, &ctx, audit, async move { directory.offboard(&user_id, &organization_id).await }).await?;

    Ok(StatusCode::NO_CONTENT)
}

/// Run a directory change together with its audit entry.
///
/// The entry is written first in a tenant session and the change runs
/// inside that session: a failed audit write means the change never
/// runs, and a failed change rolls the entry back.
async fn audited<T, Fut>(state: &AppState, ctx: &RbacContext, entry: NewAuditEntry, change: Fut) -> Result<T>
where
    Fut: Future<Output = Result<T>> + Send + 'static,
    T: Send + 'static,
{
    let action = entry.action.clone();
    let applied = Arc::new(AtomicBool::new(false));
    let marker = applied.clone();
    let outcome = state
        .guard
        .with_tenant_scope(ctx, move |s| {
            Box::pin(async move {
                s.record_audit(entry).await?;
                let value = change.await?;
                marker.store(true, Ordering::SeqCst);
                Ok::<_, CallMonitorError>(value)
            })
        })
        .await;

    if let Err(ref err) = outcome {
        if applied.load(Ordering::SeqCst) {
            error!(
                target: SECURITY_TARGET,
                organization_id = %ctx.organization_id(),
                action = %action,
                error = %err,
                "Directory change applied without a committed audit entry"
            );
        }
    }
    outcome
}

/// The membership an administrator is about to change. Only an owner may
/// change or remove another owner.
async fn manageable_member(state: &AppState, ctx: &RbacContext, user_id: &UserId) -> Result<Membership> {
    let target = state
        .directory
        .lookup(user_id, ctx.organization_id())
        .await?
        .ok_or_else(|| CallMonitorError::not_found("membership", user_id.as_str()))?;
    if target.role == Role::Owner && !is_owner(ctx) {
        return Err(CallMonitorError::forbidden(Capability::ManageUsers));
    }
    Ok(target)
}

fn is_owner(ctx: &RbacContext) -> bool {
    PredefinedRole::from_role(ctx.role()) == Some(PredefinedRole::Owner)
}

fn parse_member_id(raw: &str) -> Result<UserId> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(CallMonitorError::validation("user_id cannot be empty"));
    }
    Ok(UserId::new(trimmed))
}

/// Only recognized roles can be granted, and only an owner can grant
/// ownership.
fn assignable_role(ctx: &RbacContext, raw: &str) -> Result<Role> {
    let role = Role::parse(raw);
    let predefined = PredefinedRole::from_role(&role)
        .ok_or_else(|| CallMonitorError::validation(format!("Unknown role: {}", raw.trim())))?;
    if predefined == PredefinedRole::Owner && !is_owner(ctx) {
        return Err(CallMonitorError::forbidden(Capability::ManageUsers));
    }
    Ok(predefined.as_role())
}
