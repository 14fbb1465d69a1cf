//! HTTP tests for the V1 API.
//!
//! Tests cover:
//! - Health and metrics endpoints
//! - Token handling and context resolution
//! - Capability-guarded call routes
//! - Cross-tenant reads and append-only responses
//! - Organization and membership administration, including owner protection
//!   and audit failures
//! - Error response shape

use async_trait::async_trait;
use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request, StatusCode},
    Router,
};
use callmonitor_core::api::{build_router, AppState};
use callmonitor_core::audit::AuditLogEntry;
use callmonitor_core::config::AuthSettings;
use callmonitor_core::error::{CallMonitorError, ErrorCode, Result};
use callmonitor_core::immutability::RegulatedTable;
use callmonitor_core::middleware::auth::{Claims, TokenVerifier};
use callmonitor_core::rbac::{
    DirectoryAdmin, InMemoryDirectory, MembershipStore, Organization, OrganizationId,
    OrganizationStore, PlanTier, PolicyEngine, RbacContextResolver, Role, UserId,
    ORGANIZATION_HEADER,
};
use callmonitor_core::security::SecurityEventLog;
use callmonitor_core::tenancy::{
    CallNote, CallPatch, CallRecord, InMemoryRecordStore, RecordStore, Scope, ScopeToken,
    ScopedTx, TenantGuard,
};
use serde_json::{json, Value};
use std::sync::Arc;
use tokio_test::assert_ok;
use tower::ServiceExt;
use uuid::Uuid;

// ============================================================================
// Test Utilities
// ============================================================================

struct TestApp {
    router: Router,
    verifier: Arc<TokenVerifier>,
    directory: Arc<InMemoryDirectory>,
}

impl TestApp {
    /// OrgA (pro) owned by `olga` with `adam` as admin, `alice` as agent
    /// and `vera` as viewer; OrgB (pro) owned by `oscar`.
    async fn new() -> Self {
        Self::with_store(Arc::new(InMemoryRecordStore::new())).await
    }

    async fn with_store(store: Arc<dyn RecordStore>) -> Self {
        let directory = Arc::new(InMemoryDirectory::new());
        for (org, owner) in [("OrgA", "olga"), ("OrgB", "oscar")] {
            directory
                .create_organization(
                    Organization::new(OrganizationId::new(org), org, PlanTier::Pro),
                    &UserId::new(owner),
                )
                .await
                .unwrap();
        }
        let org_a = OrganizationId::new("OrgA");
        directory
            .accept_invite(&UserId::new("adam"), &org_a, Role::Admin)
            .await
            .unwrap();
        directory
            .accept_invite(&UserId::new("alice"), &org_a, Role::Agent)
            .await
            .unwrap();
        directory
            .accept_invite(&UserId::new("vera"), &org_a, Role::Viewer)
            .await
            .unwrap();

        let verifier = Arc::new(
            TokenVerifier::new(&AuthSettings {
                jwt_secret: "test-secret-at-least-16-bytes".to_string(),
                issuer: None,
                audience: None,
                leeway_secs: 0,
            })
            .unwrap(),
        );
        let resolver = Arc::new(RbacContextResolver::new(
            directory.clone(),
            directory.clone(),
            Arc::new(PolicyEngine::builtin()),
        ));
        let guard = TenantGuard::new(store, Arc::new(SecurityEventLog::default()));

        let router = build_router(AppState {
            resolver,
            guard,
            directory: directory.clone(),
            verifier: verifier.clone(),
        });

        Self {
            router,
            verifier,
            directory,
        }
    }

    fn token(&self, user: &str) -> String {
        self.verifier.issue(&Claims::builder(user).build()).unwrap()
    }

    async fn call(
        &self,
        method: Method,
        uri: &str,
        user: Option<&str>,
        org: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(user) = user {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", self.token(user)));
        }
        if let Some(org) = org {
            builder = builder.header(ORGANIZATION_HEADER, org);
        }
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, value)
    }

    async fn role_of(&self, user: &str) -> Option<Role> {
        self.directory
            .lookup(&UserId::new(user), &OrganizationId::new("OrgA"))
            .await
            .unwrap()
            .map(|m| m.role)
    }
}

/// Record store whose audit table rejects every write.
struct AuditOutage {
    inner: InMemoryRecordStore,
}

#[async_trait]
impl RecordStore for AuditOutage {
    async fn begin(&self, token: &ScopeToken) -> Result<Box<dyn ScopedTx>> {
        Ok(Box::new(AuditOutageTx {
            inner: self.inner.begin(token).await?,
        }))
    }
}

struct AuditOutageTx {
    inner: Box<dyn ScopedTx>,
}

#[async_trait]
impl ScopedTx for AuditOutageTx {
    fn scope(&self) -> &Scope {
        self.inner.scope()
    }

    async fn select_calls(&mut self) -> Result<Vec<CallRecord>> {
        self.inner.select_calls().await
    }

    async fn select_call(&mut self, id: Uuid) -> Result<Option<CallRecord>> {
        self.inner.select_call(id).await
    }

    async fn insert_call(&mut self, call: &CallRecord) -> Result<()> {
        self.inner.insert_call(call).await
    }

    async fn update_call(&mut self, id: Uuid, patch: &CallPatch) -> Result<Option<CallRecord>> {
        self.inner.update_call(id, patch).await
    }

    async fn delete_call(&mut self, id: Uuid) -> Result<u64> {
        self.inner.delete_call(id).await
    }

    async fn insert_note(&mut self, note: &CallNote) -> Result<()> {
        self.inner.insert_note(note).await
    }

    async fn select_notes(&mut self, call_id: Uuid) -> Result<Vec<CallNote>> {
        self.inner.select_notes(call_id).await
    }

    async fn insert_audit(&mut self, _entry: &AuditLogEntry) -> Result<()> {
        Err(CallMonitorError::new(ErrorCode::DatabaseError, "audit_logs unavailable"))
    }

    async fn select_audit(&mut self, limit: i64) -> Result<Vec<AuditLogEntry>> {
        self.inner.select_audit(limit).await
    }

    async fn row_owner(&mut self, table: RegulatedTable, id: Uuid) -> Result<Option<OrganizationId>> {
        self.inner.row_owner(table, id).await
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        self.inner.commit().await
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        self.inner.rollback().await
    }
}

// ============================================================================
// Health and Metrics
// ============================================================================

#[tokio::test]
async fn test_health_needs_no_token() {
    let app = TestApp::new().await;
    let (status, body) = app.call(Method::GET, "/health", None, None, None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
}

// ============================================================================
// Context Resolution
// ============================================================================

#[tokio::test]
async fn test_context_success_shape() {
    let app = TestApp::new().await;
    let (status, body) = app
        .call(Method::GET, "/api/v1/rbac/context", Some("alice"), Some("OrgA"), None)
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body,
        json!({"success": true, "role": "agent", "plan": "pro", "organization_id": "OrgA"})
    );
}

#[tokio::test]
async fn test_context_org_from_query_parameter() {
    let app = TestApp::new().await;
    let (status, body) = app
        .call(Method::GET, "/api/v1/rbac/context?orgId=OrgA", Some("olga"), None, None)
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["role"], "owner");
}

#[tokio::test]
async fn test_context_error_codes() {
    let app = TestApp::new().await;

    let (status, body) = app
        .call(Method::GET, "/api/v1/rbac/context", None, Some("OrgA"), None)
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["success"], false);
    assert_eq!(body["error"]["code"], "AUTH_REQUIRED");

    let (status, body) = app
        .call(Method::GET, "/api/v1/rbac/context", Some("alice"), None, None)
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "ORG_REQUIRED");

    let (status, foreign) = app
        .call(Method::GET, "/api/v1/rbac/context", Some("alice"), Some("OrgB"), None)
        .await;
    let (_, missing) = app
        .call(Method::GET, "/api/v1/rbac/context", Some("alice"), Some("OrgZ"), None)
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(foreign["error"]["code"], "UNAUTHORIZED");
    assert_eq!(foreign["error"]["message"], missing["error"]["message"]);
}

#[tokio::test]
async fn test_token_org_claim_is_ignored() {
    let app = TestApp::new().await;
    let token = app
        .verifier
        .issue(&Claims::builder("alice").org_id("OrgB").build())
        .unwrap();
    let request = Request::builder()
        .uri("/api/v1/rbac/context")
        .header(header::AUTHORIZATION, format!("Bearer {token}"))
        .body(Body::empty())
        .unwrap();

    let response = app.router.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_invalid_and_expired_tokens() {
    let app = TestApp::new().await;
    let bad = Request::builder()
        .uri("/api/v1/rbac/context")
        .header(header::AUTHORIZATION, "Bearer not-a-jwt")
        .header(ORGANIZATION_HEADER, "OrgA")
        .body(Body::empty())
        .unwrap();
    let response = app.router.clone().oneshot(bad).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let expired = app
        .verifier
        .issue(
            &Claims::builder("alice")
                .expires_in(chrono::Duration::hours(-2))
                .build(),
        )
        .unwrap();
    let request = Request::builder()
        .uri("/api/v1/rbac/context")
        .header(header::AUTHORIZATION, format!("Bearer {expired}"))
        .header(ORGANIZATION_HEADER, "OrgA")
        .body(Body::empty())
        .unwrap();
    let response = app.router.clone().oneshot(request).await.unwrap();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["error"]["code"], "TOKEN_EXPIRED");
}

#[tokio::test]
async fn test_call_capabilities_follow_role_and_plan() {
    let app = TestApp::new().await;
    let (status, body) = app
        .call(Method::GET, "/api/v1/call-capabilities", Some("alice"), Some("OrgA"), None)
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body["capabilities"],
        json!({"record": true, "transcribe": true, "translate": true, "survey": false, "synthetic_caller": false})
    );
}

#[tokio::test]
async fn test_default_organization() {
    let app = TestApp::new().await;
    let (status, body) = app
        .call(Method::GET, "/api/v1/rbac/default-organization", Some("alice"), None, None)
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["organization_id"], "OrgA");
}

#[tokio::test]
async fn test_policy_matrix_lists_every_cell() {
    let app = TestApp::new().await;
    let (status, body) = app
        .call(Method::GET, "/api/v1/rbac/policy", Some("vera"), Some("OrgA"), None)
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["matrix"].as_array().map(Vec::len), Some(12));
}

// ============================================================================
// Calls
// ============================================================================

#[tokio::test]
async fn test_call_lifecycle_over_http() {
    let app = TestApp::new().await;

    let (status, created) = app
        .call(
            Method::POST,
            "/api/v1/calls",
            Some("alice"),
            Some("OrgA"),
            Some(json!({"phone_number": "+15550100", "notes": "first contact"})),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let id = created["data"]["id"].as_str().unwrap().to_string();
    assert_eq!(created["data"]["organization_id"], "OrgA");

    let (status, updated) = app
        .call(
            Method::PATCH,
            &format!("/api/v1/calls/{id}"),
            Some("alice"),
            Some("OrgA"),
            Some(json!({"status": "in_progress"})),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["data"]["status"], "in_progress");

    let (status, body) = app
        .call(
            Method::PATCH,
            &format!("/api/v1/calls/{id}"),
            Some("alice"),
            Some("OrgA"),
            Some(json!({"notes": "edited"})),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["code"], "IMMUTABLE_RECORD_VIOLATION");

    let (status, _) = app
        .call(
            Method::POST,
            &format!("/api/v1/calls/{id}/notes"),
            Some("alice"),
            Some("OrgA"),
            Some(json!({"body": "customer asked for a callback"})),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, notes) = app
        .call(Method::GET, &format!("/api/v1/calls/{id}/notes"), Some("vera"), Some("OrgA"), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(notes["data"].as_array().map(Vec::len), Some(1));

    let (status, body) = app
        .call(Method::DELETE, &format!("/api/v1/calls/{id}"), Some("olga"), Some("OrgA"), None)
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["code"], "IMMUTABLE_RECORD_VIOLATION");

    let (status, correction) = app
        .call(
            Method::POST,
            &format!("/api/v1/calls/{id}/supersede"),
            Some("olga"),
            Some("OrgA"),
            Some(json!({"phone_number": "+15550100", "notes": "corrected summary"})),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(correction["data"]["supersedes_id"], id.as_str());
}

#[tokio::test]
async fn test_viewer_cannot_create_calls() {
    let app = TestApp::new().await;
    let (status, body) = app
        .call(
            Method::POST,
            "/api/v1/calls",
            Some("vera"),
            Some("OrgA"),
            Some(json!({"phone_number": "+15550100"})),
        )
        .await;

    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"]["code"], "FORBIDDEN");
}

#[tokio::test]
async fn test_foreign_call_is_not_found() {
    let app = TestApp::new().await;
    let (_, created) = app
        .call(
            Method::POST,
            "/api/v1/calls",
            Some("oscar"),
            Some("OrgB"),
            Some(json!({"phone_number": "+15550199"})),
        )
        .await;
    let id = created["data"]["id"].as_str().unwrap().to_string();

    let (status, body) = app
        .call(Method::GET, &format!("/api/v1/calls/{id}"), Some("alice"), Some("OrgA"), None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "RECORD_NOT_FOUND");

    let (_, listed) = app
        .call(Method::GET, "/api/v1/calls", Some("alice"), Some("OrgA"), None)
        .await;
    assert_eq!(listed["data"], json!([]));
}

#[tokio::test]
async fn test_audit_requires_view_audit() {
    let app = TestApp::new().await;
    app.call(
        Method::POST,
        "/api/v1/calls",
        Some("alice"),
        Some("OrgA"),
        Some(json!({"phone_number": "+15550100"})),
    )
    .await;

    let (status, _) = app
        .call(Method::GET, "/api/v1/audit", Some("alice"), Some("OrgA"), None)
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = app
        .call(Method::GET, "/api/v1/audit?limit=10", Some("olga"), Some("OrgA"), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"][0]["action"], "create");
    assert_eq!(body["data"][0]["user_id"], "alice");
}

// ============================================================================
// Organization Administration
// ============================================================================

#[tokio::test]
async fn test_create_organization_makes_caller_owner() {
    let app = TestApp::new().await;
    let (status, _) = app
        .call(
            Method::POST,
            "/api/v1/organizations",
            Some("nina"),
            None,
            Some(json!({"id": "OrgN", "name": "Nina's Clinic", "plan": "enterprise"})),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, body) = app
        .call(Method::GET, "/api/v1/rbac/context", Some("nina"), Some("OrgN"), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["role"], "owner");
    assert_eq!(body["plan"], "enterprise");
}

#[tokio::test]
async fn test_member_management() {
    let app = TestApp::new().await;

    let (status, _) = app
        .call(
            Method::POST,
            "/api/v1/organization/members",
            Some("olga"),
            Some("OrgA"),
            Some(json!({"user_id": "uma", "role": "agent"})),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, _) = app
        .call(
            Method::PATCH,
            "/api/v1/organization/members/uma",
            Some("olga"),
            Some("OrgA"),
            Some(json!({"role": "viewer"})),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    let membership = assert_ok!(
        callmonitor_core::rbac::MembershipStore::lookup(
            app.directory.as_ref(),
            &UserId::new("uma"),
            &OrganizationId::new("OrgA"),
        )
        .await
    );
    assert_eq!(membership.map(|m| m.role), Some(Role::Viewer));

    let (status, _) = app
        .call(
            Method::POST,
            "/api/v1/organization/members",
            Some("alice"),
            Some("OrgA"),
            Some(json!({"user_id": "mallory", "role": "viewer"})),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = app
        .call(Method::DELETE, "/api/v1/organization/members/uma", Some("olga"), Some("OrgA"), None)
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = app
        .call(Method::GET, "/api/v1/rbac/context", Some("uma"), Some("OrgA"), None)
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_admin_cannot_grant_or_take_ownership() {
    let app = TestApp::new().await;

    let (status, body) = app
        .call(
            Method::POST,
            "/api/v1/organization/members",
            Some("adam"),
            Some("OrgA"),
            Some(json!({"user_id": "mallory", "role": "owner"})),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"]["code"], "FORBIDDEN");
    assert_eq!(app.role_of("mallory").await, None);

    let (status, _) = app
        .call(
            Method::PATCH,
            "/api/v1/organization/members/alice",
            Some("adam"),
            Some("OrgA"),
            Some(json!({"role": "owner"})),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(app.role_of("alice").await, Some(Role::Agent));

    let (status, _) = app
        .call(
            Method::PATCH,
            "/api/v1/organization/members/olga",
            Some("adam"),
            Some("OrgA"),
            Some(json!({"role": "viewer"})),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = app
        .call(Method::DELETE, "/api/v1/organization/members/olga", Some("adam"), Some("OrgA"), None)
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    assert_eq!(app.role_of("olga").await, Some(Role::Owner));
    let (status, body) = app
        .call(Method::GET, "/api/v1/rbac/context", Some("olga"), Some("OrgA"), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["role"], "owner");
}

#[tokio::test]
async fn test_admin_manages_non_owners() {
    let app = TestApp::new().await;

    let (status, _) = app
        .call(
            Method::PATCH,
            "/api/v1/organization/members/alice",
            Some("adam"),
            Some("OrgA"),
            Some(json!({"role": "viewer"})),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(app.role_of("alice").await, Some(Role::Viewer));

    let (status, _) = app
        .call(Method::DELETE, "/api/v1/organization/members/vera", Some("adam"), Some("OrgA"), None)
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    assert_eq!(app.role_of("vera").await, None);
}

#[tokio::test]
async fn test_last_owner_is_kept() {
    let app = TestApp::new().await;

    let (_, body) = app
        .call(
            Method::PATCH,
            "/api/v1/organization/members/olga",
            Some("olga"),
            Some("OrgA"),
            Some(json!({"role": "admin"})),
        )
        .await;
    assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
    assert_eq!(app.role_of("olga").await, Some(Role::Owner));

    let (status, _) = app
        .call(
            Method::POST,
            "/api/v1/organization/members",
            Some("olga"),
            Some("OrgA"),
            Some(json!({"user_id": "otto", "role": "owner"})),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, _) = app
        .call(
            Method::PATCH,
            "/api/v1/organization/members/olga",
            Some("olga"),
            Some("OrgA"),
            Some(json!({"role": "admin"})),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(app.role_of("olga").await, Some(Role::Admin));

    // The failed attempt wrote nothing; the grant and the demotion did.
    let (_, body) = app
        .call(Method::GET, "/api/v1/audit", Some("otto"), Some("OrgA"), None)
        .await;
    let actions: Vec<&str> = body["data"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|e| e["action"].as_str())
        .collect();
    assert_eq!(actions.len(), 2);
    assert!(actions.contains(&"membership.add"));
    assert!(actions.contains(&"membership.role_change"));
}

#[tokio::test]
async fn test_failed_audit_write_blocks_directory_change() {
    let app = TestApp::with_store(Arc::new(AuditOutage {
        inner: InMemoryRecordStore::new(),
    }))
    .await;

    let (status, body) = app
        .call(
            Method::PUT,
            "/api/v1/organization/plan",
            Some("olga"),
            Some("OrgA"),
            Some(json!({"plan": "enterprise"})),
        )
        .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["success"], false);
    assert_eq!(
        assert_ok!(app.directory.get_plan(&OrganizationId::new("OrgA")).await),
        Some(PlanTier::Pro)
    );

    let (status, _) = app
        .call(
            Method::PATCH,
            "/api/v1/organization/members/alice",
            Some("olga"),
            Some("OrgA"),
            Some(json!({"role": "viewer"})),
        )
        .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(app.role_of("alice").await, Some(Role::Agent));

    let (status, _) = app
        .call(Method::DELETE, "/api/v1/organization/members/vera", Some("olga"), Some("OrgA"), None)
        .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(app.role_of("vera").await, Some(Role::Viewer));

    let (status, _) = app
        .call(Method::DELETE, "/api/v1/organization", Some("olga"), Some("OrgA"), None)
        .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    let (status, _) = app
        .call(Method::GET, "/api/v1/rbac/context", Some("olga"), Some("OrgA"), None)
        .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_plan_change_and_archive() {
    let app = TestApp::new().await;

    let (status, _) = app
        .call(
            Method::PUT,
            "/api/v1/organization/plan",
            Some("olga"),
            Some("OrgA"),
            Some(json!({"plan": "enterprise"})),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let (_, caps) = app
        .call(Method::GET, "/api/v1/call-capabilities", Some("olga"), Some("OrgA"), None)
        .await;
    assert_eq!(caps["capabilities"]["survey"], true);

    let (status, _) = app
        .call(Method::DELETE, "/api/v1/organization", Some("olga"), Some("OrgA"), None)
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, body) = app
        .call(Method::GET, "/api/v1/rbac/context", Some("olga"), Some("OrgA"), None)
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"]["code"], "UNAUTHORIZED");
}
