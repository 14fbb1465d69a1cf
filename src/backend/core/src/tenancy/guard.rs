//! Tenant isolation guard: the only way to obtain a data-access handle.
//!
//! ```rust,ignore
//! let calls = guard
//!     .with_tenant_scope(&ctx, |session| Box::pin(async move { session.list_calls().await }))
//!     .await?;
//! ```
//!
//! The session commits when the operation returns `Ok`, rolls back on
//! `Err`, and is rolled back by drop if the future is cancelled.

use futures::future::BoxFuture;
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::records::{validate_note_body, CallNote, CallPatch, CallRecord, NewCall};
use super::scope::{RecordStore, ScopeToken, ScopedTx};
use crate::audit::{actions, AuditLogEntry, NewAuditEntry};
use crate::error::{CallMonitorError, ErrorCode, Result};
use crate::immutability::{ImmutabilityGuard, RegulatedTable, TableOperation};
use crate::rbac::capability::Capability;
use crate::rbac::context::RbacContext;
use crate::rbac::models::{OrganizationId, UserId};
use crate::security::{SecurityEvent, SecurityEventKind, SecurityEventLog};
use crate::telemetry::SecurityMetrics;

/// Largest page `list_audit` returns.
pub const MAX_AUDIT_PAGE: i64 = 500;

const CALL_RESOURCE: &str = "call";

// ═══════════════════════════════════════════════════════════════════════════════
// Guard
// ═══════════════════════════════════════════════════════════════════════════════

/// Opens scoped sessions against a record store.
#[derive(Clone)]
pub struct TenantGuard {
    store: Arc<dyn RecordStore>,
    immutability: ImmutabilityGuard,
    events: Arc<SecurityEventLog>,
}

impl std::fmt::Debug for TenantGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TenantGuard")
            .field("security_events", &self.events.len())
            .finish_non_exhaustive()
    }
}

impl TenantGuard {
    pub fn new(store: Arc<dyn RecordStore>, events: Arc<SecurityEventLog>) -> Self {
        Self {
            store,
            immutability: ImmutabilityGuard::new(events.clone()),
            events,
        }
    }

    pub fn events(&self) -> &Arc<SecurityEventLog> {
        &self.events
    }

    pub fn immutability(&self) -> &ImmutabilityGuard {
        &self.immutability
    }

    /// Run `operation` with a session bound to the context's organization.
    pub async fn with_tenant_scope<T, F>(&self, ctx: &RbacContext, operation: F) -> Result<T>
    where
        F: for<'s> FnOnce(&'s mut TenantSession) -> BoxFuture<'s, Result<T>> + Send,
        T: Send,
    {
        let token = ScopeToken::tenant(ctx.organization_id().clone());
        let tx = self.store.begin(&token).await?;
        SecurityMetrics::record_scope_opened("tenant");
        debug!(organization_id = %ctx.organization_id(), user_id = %ctx.user_id(), "Tenant scope opened");

        let mut session = TenantSession {
            tx,
            ctx: ctx.clone(),
            immutability: self.immutability.clone(),
            events: self.events.clone(),
        };
        let outcome = operation(&mut session).await;
        finish(session.tx, outcome).await
    }

    /// Run `operation` across all tenants.
    ///
    /// For migrations, backfills and support tooling only. Every opening is
    /// recorded as a security event with its reason and actor.
    pub async fn with_system_scope<T, F>(&self, reason: &str, actor: &str, operation: F) -> Result<T>
    where
        F: for<'s> FnOnce(&'s mut SystemSession) -> BoxFuture<'s, Result<T>> + Send,
        T: Send,
    {
        let reason = reason.trim();
        if reason.is_empty() {
            return Err(CallMonitorError::validation("A system scope requires a reason"));
        }
        let actor = actor.trim();
        if actor.is_empty() {
            return Err(CallMonitorError::validation("A system scope requires an actor"));
        }

        self.events.record(
            SecurityEvent::new(SecurityEventKind::SystemScopeOpened, reason).user(actor),
        );
        SecurityMetrics::record_scope_opened("system");
        info!(actor = %actor, reason = %reason, "System scope opened");

        let tx = self.store.begin(&ScopeToken::system(reason)).await?;
        let mut session = SystemSession {
            tx,
            actor: UserId::new(actor),
        };
        let outcome = operation(&mut session).await;
        finish(session.tx, outcome).await
    }
}

async fn finish<T>(tx: Box<dyn ScopedTx>, outcome: Result<T>) -> Result<T> {
    match outcome {
        Ok(value) => {
            tx.commit().await?;
            Ok(value)
        }
        Err(err) => {
            if let Err(rollback_err) = tx.rollback().await {
                warn!(error = %rollback_err, "Rollback failed; session dropped");
            }
            Err(err)
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tenant session
// ═══════════════════════════════════════════════════════════════════════════════

/// Data access confined to one organization. Not `Clone`; lives only as
/// long as the `with_tenant_scope` call that created it.
pub struct TenantSession {
    tx: Box<dyn ScopedTx>,
    ctx: RbacContext,
    immutability: ImmutabilityGuard,
    events: Arc<SecurityEventLog>,
}

impl TenantSession {
    pub fn context(&self) -> &RbacContext {
        &self.ctx
    }

    pub fn organization_id(&self) -> &OrganizationId {
        self.ctx.organization_id()
    }

    pub async fn list_calls(&mut self) -> Result<Vec<CallRecord>> {
        self.ctx.require(Capability::ViewCalls)?;
        self.tx.select_calls().await
    }

    /// `None` for unknown ids and for other tenants' ids alike. The latter
    /// are recorded as cross-tenant read attempts.
    pub async fn get_call(&mut self, id: Uuid) -> Result<Option<CallRecord>> {
        self.ctx.require(Capability::ViewCalls)?;
        self.visible_call(id).await
    }

    pub async fn create_call(&mut self, call: NewCall) -> Result<CallRecord> {
        self.ctx.require(Capability::EditCalls)?;
        call.validate()?;
        let record = CallRecord::new(
            self.ctx.organization_id().clone(),
            self.ctx.user_id().clone(),
            call,
        );
        self.tx.insert_call(&record).await?;
        self.write_audit(
            NewAuditEntry::new(CALL_RESOURCE, actions::CREATE)
                .resource(record.id)
                .after(&record),
        )
        .await?;
        info!(call_id = %record.id, organization_id = %record.organization_id, "Call created");
        Ok(record)
    }

    /// Change lifecycle columns. Any protected column fails the whole patch.
    pub async fn update_call(&mut self, id: Uuid, patch: CallPatch) -> Result<CallRecord> {
        self.ctx.require(Capability::EditCalls)?;
        if patch.is_empty() {
            return Err(CallMonitorError::validation("Patch contains no changes"));
        }
        let columns = patch.columns();
        self.immutability.enforce_as(
            &self.ctx,
            RegulatedTable::Calls,
            &TableOperation::Update { columns: &columns },
        )?;

        let before = self
            .visible_call(id)
            .await?
            .ok_or_else(|| CallMonitorError::not_found(CALL_RESOURCE, id.to_string()))?;
        if let Some(next) = patch.status {
            if !before.status.can_transition_to(next) {
                return Err(CallMonitorError::validation(format!(
                    "Cannot move call from {} to {}",
                    before.status, next
                )));
            }
        }

        let after = self
            .tx
            .update_call(id, &patch)
            .await
            .map_err(|e| self.observe(RegulatedTable::Calls, e))?
            .ok_or_else(|| CallMonitorError::not_found(CALL_RESOURCE, id.to_string()))?;
        self.write_audit(
            NewAuditEntry::new(CALL_RESOURCE, actions::UPDATE)
                .resource(id)
                .before(&json!({ "status": before.status, "call_sid": before.call_sid, "started_at": before.started_at, "ended_at": before.ended_at }))
                .after(&patch),
        )
        .await?;
        Ok(after)
    }

    /// Calls are never deleted. The store refuses rows it can see; ids it
    /// cannot see are refused here, so the answer does not reveal whether
    /// the id exists.
    pub async fn delete_call(&mut self, id: Uuid) -> Result<()> {
        let removed = self
            .tx
            .delete_call(id)
            .await
            .map_err(|e| self.observe(RegulatedTable::Calls, e))?;
        debug!(call_id = %id, removed, "Delete matched no visible row");
        self.immutability
            .enforce_as(&self.ctx, RegulatedTable::Calls, &TableOperation::Delete)
    }

    /// Record a correction for `original_id` as a new call.
    pub async fn supersede_call(&mut self, original_id: Uuid, correction: NewCall) -> Result<CallRecord> {
        self.ctx.require(Capability::EditCalls)?;
        correction.validate()?;
        let original = self
            .visible_call(original_id)
            .await?
            .ok_or_else(|| CallMonitorError::not_found(CALL_RESOURCE, original_id.to_string()))?;

        let mut record = CallRecord::new(
            self.ctx.organization_id().clone(),
            self.ctx.user_id().clone(),
            correction,
        );
        record.supersedes_id = Some(original.id);
        record.status = original.status;
        record.started_at = original.started_at;
        record.ended_at = original.ended_at;
        if record.call_sid.is_none() {
            record.call_sid = original.call_sid.clone();
        }

        self.tx.insert_call(&record).await?;
        self.write_audit(
            NewAuditEntry::new(CALL_RESOURCE, actions::SUPERSEDE)
                .resource(record.id)
                .before(&original)
                .after(&record),
        )
        .await?;
        Ok(record)
    }

    pub async fn append_note(&mut self, call_id: Uuid, body: impl Into<String>) -> Result<CallNote> {
        self.ctx.require(Capability::EditCalls)?;
        let body = body.into();
        validate_note_body(&body)?;
        self.visible_call(call_id)
            .await?
            .ok_or_else(|| CallMonitorError::not_found(CALL_RESOURCE, call_id.to_string()))?;

        let note = CallNote::new(
            self.ctx.organization_id().clone(),
            call_id,
            self.ctx.user_id().clone(),
            body,
        );
        self.tx.insert_note(&note).await?;
        self.write_audit(
            NewAuditEntry::new(CALL_RESOURCE, actions::ANNOTATE)
                .resource(call_id)
                .after(&note),
        )
        .await?;
        Ok(note)
    }

    pub async fn list_notes(&mut self, call_id: Uuid) -> Result<Vec<CallNote>> {
        self.ctx.require(Capability::ViewCalls)?;
        self.visible_call(call_id)
            .await?
            .ok_or_else(|| CallMonitorError::not_found(CALL_RESOURCE, call_id.to_string()))?;
        self.tx.select_notes(call_id).await
    }

    /// Most recent entries first. `limit` is clamped to `1..=MAX_AUDIT_PAGE`.
    pub async fn list_audit(&mut self, limit: i64) -> Result<Vec<AuditLogEntry>> {
        self.ctx.require(Capability::ViewAudit)?;
        self.tx.select_audit(limit.clamp(1, MAX_AUDIT_PAGE)).await
    }

    /// Store a record that already carries its organization, such as one
    /// replayed from an export. A foreign stamp is refused by the store.
    pub async fn import_call(&mut self, record: CallRecord) -> Result<CallRecord> {
        self.ctx.require(Capability::EditCalls)?;
        if let Err(err) = self.tx.insert_call(&record).await {
            if err.code() == ErrorCode::CrossTenantAccessDenied {
                self.events.record(
                    SecurityEvent::new(SecurityEventKind::CrossTenantAccessDenied, "foreign-stamped write")
                        .actor(self.ctx.user_id(), self.ctx.organization_id())
                        .target(record.organization_id.clone())
                        .table(RegulatedTable::Calls.name())
                        .record(record.id),
                );
            }
            return Err(err);
        }
        self.write_audit(
            NewAuditEntry::new(CALL_RESOURCE, actions::IMPORT)
                .resource(record.id)
                .after(&record),
        )
        .await?;
        Ok(record)
    }

    /// Append an audit entry attributed to the session's user.
    pub async fn record_audit(&mut self, entry: NewAuditEntry) -> Result<AuditLogEntry> {
        self.write_audit(entry).await
    }

    async fn write_audit(&mut self, entry: NewAuditEntry) -> Result<AuditLogEntry> {
        let sealed = AuditLogEntry::seal(
            entry,
            self.ctx.organization_id().clone(),
            Some(self.ctx.user_id().clone()),
        );
        self.tx.insert_audit(&sealed).await?;
        Ok(sealed)
    }

    async fn visible_call(&mut self, id: Uuid) -> Result<Option<CallRecord>> {
        if let Some(call) = self.tx.select_call(id).await? {
            return Ok(Some(call));
        }
        if let Some(owner) = self.tx.row_owner(RegulatedTable::Calls, id).await? {
            if &owner != self.ctx.organization_id() {
                self.events.record(
                    SecurityEvent::new(SecurityEventKind::CrossTenantAccessDenied, "read of foreign row")
                        .actor(self.ctx.user_id(), self.ctx.organization_id())
                        .target(owner)
                        .table(RegulatedTable::Calls.name())
                        .record(id),
                );
            }
        }
        Ok(None)
    }

    /// Record append-only violations that surfaced from the store.
    fn observe(&self, table: RegulatedTable, err: CallMonitorError) -> CallMonitorError {
        if err.code() == ErrorCode::ImmutableRecordViolation {
            self.immutability.report(Some(&self.ctx), table, &err);
        }
        err
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// System session
// ═══════════════════════════════════════════════════════════════════════════════

/// Cross-tenant access for audited maintenance work.
pub struct SystemSession {
    tx: Box<dyn ScopedTx>,
    actor: UserId,
}

impl SystemSession {
    pub fn actor(&self) -> &UserId {
        &self.actor
    }

    pub async fn list_all_calls(&mut self) -> Result<Vec<CallRecord>> {
        self.tx.select_calls().await
    }

    pub async fn get_call(&mut self, id: Uuid) -> Result<Option<CallRecord>> {
        self.tx.select_call(id).await
    }

    pub async fn list_audit(&mut self, limit: i64) -> Result<Vec<AuditLogEntry>> {
        self.tx.select_audit(limit.clamp(1, MAX_AUDIT_PAGE)).await
    }

    /// Store a fully stamped record for any tenant, with an audit entry in
    /// that tenant's trail.
    pub async fn import_call(&mut self, record: CallRecord) -> Result<CallRecord> {
        record_must_be_stamped(&record)?;
        self.tx.insert_call(&record).await?;
        let audit = AuditLogEntry::seal(
            NewAuditEntry::new(CALL_RESOURCE, actions::IMPORT)
                .resource(record.id)
                .after(&record),
            record.organization_id.clone(),
            Some(self.actor.clone()),
        );
        self.tx.insert_audit(&audit).await?;
        Ok(record)
    }
}

fn record_must_be_stamped(record: &CallRecord) -> Result<()> {
    if record.organization_id.as_str().trim().is_empty() {
        return Err(CallMonitorError::validation("Imported records must carry an organization"));
    }
    Ok(())
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rbac::context::fixtures::context;
    use crate::rbac::models::{PlanTier, Role};
    use crate::tenancy::memory::InMemoryRecordStore;
    use crate::tenancy::records::CallStatus;

    fn guard() -> (TenantGuard, InMemoryRecordStore) {
        let store = InMemoryRecordStore::new();
        let guard = TenantGuard::new(Arc::new(store.clone()), Arc::new(SecurityEventLog::new(64)));
        (guard, store)
    }

    fn agent(org: &str) -> RbacContext {
        context("agent-1", org, Role::Agent, PlanTier::Pro)
    }

    #[tokio::test]
    async fn test_create_and_list_calls() {
        let (guard, _) = guard();
        let ctx = agent("org-a");
        let created = guard
            .with_tenant_scope(&ctx, |s| Box::pin(async move { s.create_call(NewCall::new("+15550100")).await }))
            .await
            .unwrap();
        assert_eq!(created.organization_id.as_str(), "org-a");
        assert_eq!(created.created_by.as_str(), "agent-1");

        let calls = guard
            .with_tenant_scope(&ctx, |s| Box::pin(async move { s.list_calls().await }))
            .await
            .unwrap();
        assert_eq!(calls, vec![created]);
    }

    #[tokio::test]
    async fn test_error_rolls_back_writes() {
        let (guard, store) = guard();
        let ctx = agent("org-a");
        let result: Result<()> = guard
            .with_tenant_scope(&ctx, |s| {
                Box::pin(async move {
                    s.create_call(NewCall::new("+15550100")).await?;
                    Err(CallMonitorError::validation("abort"))
                })
            })
            .await;
        assert!(result.is_err());
        assert_eq!(store.call_count(), 0);
        assert_eq!(store.open_sessions(), 0);
    }

    #[tokio::test]
    async fn test_viewer_cannot_create() {
        let (guard, _) = guard();
        let ctx = context("v1", "org-a", Role::Viewer, PlanTier::Enterprise);
        let err = guard
            .with_tenant_scope(&ctx, |s| Box::pin(async move { s.create_call(NewCall::new("+15550100")).await }))
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::Forbidden);
    }

    #[tokio::test]
    async fn test_update_lifecycle_and_reject_notes() {
        let (guard, _) = guard();
        let ctx = agent("org-a");
        let call = guard
            .with_tenant_scope(&ctx, |s| Box::pin(async move { s.create_call(NewCall::new("+15550100")).await }))
            .await
            .unwrap();
        let id = call.id;

        let updated = guard
            .with_tenant_scope(&ctx, move |s| {
                Box::pin(async move { s.update_call(id, CallPatch::status(CallStatus::InProgress)).await })
            })
            .await
            .unwrap();
        assert_eq!(updated.status, CallStatus::InProgress);

        let err = guard
            .with_tenant_scope(&ctx, move |s| {
                Box::pin(async move {
                    s.update_call(
                        id,
                        CallPatch {
                            notes: Some("rewritten".into()),
                            ..Default::default()
                        },
                    )
                    .await
                })
            })
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::ImmutableRecordViolation);
        assert_eq!(guard.events().count(SecurityEventKind::ImmutableRecordViolation), 1);
    }

    #[tokio::test]
    async fn test_status_cannot_move_backwards() {
        let (guard, _) = guard();
        let ctx = agent("org-a");
        let err = guard
            .with_tenant_scope(&ctx, |s| {
                Box::pin(async move {
                    let call = s.create_call(NewCall::new("+15550100")).await?;
                    s.update_call(call.id, CallPatch::status(CallStatus::Completed)).await?;
                    s.update_call(call.id, CallPatch::status(CallStatus::Pending)).await
                })
            })
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::ValidationError);
    }

    #[tokio::test]
    async fn test_delete_always_rejected() {
        let (guard, _) = guard();
        let ctx = context("o1", "org-a", Role::Owner, PlanTier::Enterprise);
        let err = guard
            .with_tenant_scope(&ctx, |s| {
                Box::pin(async move {
                    let call = s.create_call(NewCall::new("+15550100")).await?;
                    s.delete_call(call.id).await
                })
            })
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::ImmutableRecordViolation);
    }

    #[tokio::test]
    async fn test_delete_of_committed_call_refused_by_store() {
        let (guard, store) = guard();
        let ctx = agent("org-a");
        let call = guard
            .with_tenant_scope(&ctx, |s| Box::pin(async move { s.create_call(NewCall::new("+15550100")).await }))
            .await
            .unwrap();
        let id = call.id;

        let err = guard
            .with_tenant_scope(&ctx, move |s| Box::pin(async move { s.delete_call(id).await }))
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::ImmutableRecordViolation);
        assert_eq!(guard.events().count(SecurityEventKind::ImmutableRecordViolation), 1);
        assert_eq!(store.call_count(), 1);
    }

    #[tokio::test]
    async fn test_delete_of_unknown_id_refused_the_same_way() {
        let (guard, _) = guard();
        let err = guard
            .with_tenant_scope(&agent("org-a"), |s| Box::pin(async move { s.delete_call(Uuid::new_v4()).await }))
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::ImmutableRecordViolation);
        assert_eq!(guard.events().count(SecurityEventKind::ImmutableRecordViolation), 1);
    }

    #[tokio::test]
    async fn test_foreign_read_returns_none_and_records_event() {
        let (guard, _) = guard();
        let foreign = guard
            .with_tenant_scope(&agent("org-b"), |s| {
                Box::pin(async move { s.create_call(NewCall::new("+15550199")).await })
            })
            .await
            .unwrap();
        let id = foreign.id;

        let seen = guard
            .with_tenant_scope(&agent("org-a"), move |s| Box::pin(async move { s.get_call(id).await }))
            .await
            .unwrap();
        assert!(seen.is_none());
        let events = guard.events().recent();
        let denial = events
            .iter()
            .find(|e| e.kind == SecurityEventKind::CrossTenantAccessDenied)
            .unwrap();
        assert_eq!(denial.target_organization_id.as_ref().unwrap().as_str(), "org-b");
    }

    #[tokio::test]
    async fn test_import_foreign_stamp_denied() {
        let (guard, _) = guard();
        let record = CallRecord::new(
            OrganizationId::new("org-b"),
            UserId::new("agent-1"),
            NewCall::new("+15550100"),
        );
        let err = guard
            .with_tenant_scope(&agent("org-a"), move |s| Box::pin(async move { s.import_call(record).await }))
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::CrossTenantAccessDenied);
        assert_eq!(guard.events().count(SecurityEventKind::CrossTenantAccessDenied), 1);
    }

    #[tokio::test]
    async fn test_supersede_links_original_and_audits() {
        let (guard, _) = guard();
        let ctx = context("a1", "org-a", Role::Admin, PlanTier::Pro);
        let (original, correction, audit) = guard
            .with_tenant_scope(&ctx, |s| {
                Box::pin(async move {
                    let original = s.create_call(NewCall::new("+15550100").with_notes("wrong")).await?;
                    let correction = s
                        .supersede_call(original.id, NewCall::new("+15550100").with_notes("right"))
                        .await?;
                    let audit = s.list_audit(10).await?;
                    Ok((original, correction, audit))
                })
            })
            .await
            .unwrap();
        assert_eq!(correction.supersedes_id, Some(original.id));
        assert_eq!(audit.len(), 2);
        assert!(audit.iter().all(AuditLogEntry::verify));
        assert!(audit.iter().any(|e| e.action == actions::SUPERSEDE));
    }

    #[tokio::test]
    async fn test_notes_append_and_list() {
        let (guard, _) = guard();
        let ctx = agent("org-a");
        let notes = guard
            .with_tenant_scope(&ctx, |s| {
                Box::pin(async move {
                    let call = s.create_call(NewCall::new("+15550100")).await?;
                    s.append_note(call.id, "customer called back").await?;
                    s.list_notes(call.id).await
                })
            })
            .await
            .unwrap();
        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0].body, "customer called back");
    }

    #[tokio::test]
    async fn test_agent_cannot_read_audit() {
        let (guard, _) = guard();
        let err = guard
            .with_tenant_scope(&agent("org-a"), |s| Box::pin(async move { s.list_audit(10).await }))
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::Forbidden);
    }

    #[tokio::test]
    async fn test_system_scope_requires_reason() {
        let (guard, _) = guard();
        let err = guard
            .with_system_scope("  ", "ops", |s| Box::pin(async move { s.list_all_calls().await }))
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::ValidationError);
        assert!(guard.events().is_empty());
    }

    #[tokio::test]
    async fn test_system_scope_reads_across_tenants() {
        let (guard, _) = guard();
        for org in ["org-a", "org-b"] {
            guard
                .with_tenant_scope(&agent(org), |s| {
                    Box::pin(async move { s.create_call(NewCall::new("+15550100")).await })
                })
                .await
                .unwrap();
        }
        let all = guard
            .with_system_scope("quarterly export", "ops@example.com", |s| {
                Box::pin(async move { s.list_all_calls().await })
            })
            .await
            .unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(guard.events().count(SecurityEventKind::SystemScopeOpened), 1);
    }
}
