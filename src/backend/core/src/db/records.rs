//! PostgreSQL record store.
//!
//! Each session is one transaction. The scope is written into
//! transaction-local settings (`set_config(..., true)`) that the row-level
//! security policies read, so it disappears with the transaction and can
//! never leak to the next borrower of the pooled connection.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, QueryBuilder, Transaction};
use tracing::debug;
use uuid::Uuid;

use crate::audit::AuditLogEntry;
use crate::error::{CallMonitorError, ErrorCode, Result};
use crate::immutability::RegulatedTable;
use crate::rbac::models::{OrganizationId, UserId};
use crate::tenancy::records::{CallNote, CallPatch, CallRecord, CallStatus};
use crate::tenancy::scope::{RecordStore, Scope, ScopeToken, ScopedTx};

const CALL_COLUMNS: &str = "id, organization_id, phone_number, status, call_sid, notes, \
     created_by, created_at, started_at, ended_at, supersedes_id";

// ═══════════════════════════════════════════════════════════════════════════════
// Row mapping
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, sqlx::FromRow)]
struct CallRow {
    id: Uuid,
    organization_id: String,
    phone_number: String,
    status: String,
    call_sid: Option<String>,
    notes: Option<String>,
    created_by: String,
    created_at: DateTime<Utc>,
    started_at: Option<DateTime<Utc>>,
    ended_at: Option<DateTime<Utc>>,
    supersedes_id: Option<Uuid>,
}

impl TryFrom<CallRow> for CallRecord {
    type Error = CallMonitorError;

    fn try_from(row: CallRow) -> Result<Self> {
        let status = CallStatus::parse(&row.status).ok_or_else(|| {
            CallMonitorError::with_internal(
                ErrorCode::DatabaseError,
                "A database error occurred",
                format!("call {} has unknown status {:?}", row.id, row.status),
            )
        })?;
        Ok(Self {
            id: row.id,
            organization_id: OrganizationId(row.organization_id),
            phone_number: row.phone_number,
            status,
            call_sid: row.call_sid,
            notes: row.notes,
            created_by: UserId(row.created_by),
            created_at: row.created_at,
            started_at: row.started_at,
            ended_at: row.ended_at,
            supersedes_id: row.supersedes_id,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct NoteRow {
    id: Uuid,
    organization_id: String,
    call_id: Uuid,
    author_id: String,
    body: String,
    created_at: DateTime<Utc>,
}

impl From<NoteRow> for CallNote {
    fn from(row: NoteRow) -> Self {
        Self {
            id: row.id,
            organization_id: OrganizationId(row.organization_id),
            call_id: row.call_id,
            author_id: UserId(row.author_id),
            body: row.body,
            created_at: row.created_at,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct AuditRow {
    id: Uuid,
    organization_id: String,
    user_id: Option<String>,
    resource_type: String,
    resource_id: Option<String>,
    action: String,
    before: Option<serde_json::Value>,
    after: Option<serde_json::Value>,
    content_hash: String,
    created_at: DateTime<Utc>,
}

impl From<AuditRow> for AuditLogEntry {
    fn from(row: AuditRow) -> Self {
        Self {
            id: row.id,
            organization_id: OrganizationId(row.organization_id),
            user_id: row.user_id.map(UserId),
            resource_type: row.resource_type,
            resource_id: row.resource_id,
            action: row.action,
            before: row.before,
            after: row.after,
            content_hash: row.content_hash,
            created_at: row.created_at,
        }
    }
}

/// `UPDATE calls` for every column the patch sets, returning the row.
fn update_call_query(id: Uuid, patch: &CallPatch) -> QueryBuilder<'static, Postgres> {
    let mut query: QueryBuilder<'static, Postgres> = QueryBuilder::new("UPDATE calls SET ");
    {
        let mut set = query.separated(", ");
        if let Some(status) = patch.status {
            set.push("status = ").push_bind_unseparated(status.as_str());
        }
        if let Some(ref sid) = patch.call_sid {
            set.push("call_sid = ").push_bind_unseparated(sid.clone());
        }
        if let Some(started_at) = patch.started_at {
            set.push("started_at = ").push_bind_unseparated(started_at);
        }
        if let Some(ended_at) = patch.ended_at {
            set.push("ended_at = ").push_bind_unseparated(ended_at);
        }
        // Protected columns are sent as-is so the trigger rejects them.
        if let Some(ref notes) = patch.notes {
            set.push("notes = ").push_bind_unseparated(notes.clone());
        }
        if let Some(ref phone) = patch.phone_number {
            set.push("phone_number = ").push_bind_unseparated(phone.clone());
        }
        if let Some(ref created_by) = patch.created_by {
            set.push("created_by = ").push_bind_unseparated(created_by.clone());
        }
        if let Some(ref org) = patch.organization_id {
            set.push("organization_id = ").push_bind_unseparated(org.clone());
        }
        if let Some(supersedes) = patch.supersedes_id {
            set.push("supersedes_id = ").push_bind_unseparated(supersedes);
        }
    }
    query.push(" WHERE id = ").push_bind(id);
    query.push(" RETURNING ").push(CALL_COLUMNS);
    query
}

// ═══════════════════════════════════════════════════════════════════════════════
// Store
// ═══════════════════════════════════════════════════════════════════════════════

/// Record store backed by the RLS-protected regulated tables.
#[derive(Clone)]
pub struct PgRecordStore {
    pool: PgPool,
}

impl PgRecordStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RecordStore for PgRecordStore {
    async fn begin(&self, token: &ScopeToken) -> Result<Box<dyn ScopedTx>> {
        let mut tx = self.pool.begin().await?;
        let scope = token.scope().clone();

        match &scope {
            Scope::Tenant(org) => {
                sqlx::query(
                    "SELECT set_config('app.current_organization_id', $1, true), \
                            set_config('app.system_context', 'off', true)",
                )
                .bind(org.as_str())
                .execute(&mut *tx)
                .await?;
            }
            Scope::System { reason } => {
                sqlx::query(
                    "SELECT set_config('app.current_organization_id', '', true), \
                            set_config('app.system_context', 'on', true), \
                            set_config('app.system_reason', $1, true)",
                )
                .bind(reason)
                .execute(&mut *tx)
                .await?;
            }
        }

        debug!(scope = scope.kind(), "Record store transaction opened");
        Ok(Box::new(PgScopedTx { tx, scope }))
    }
}

struct PgScopedTx {
    tx: Transaction<'static, Postgres>,
    scope: Scope,
}

impl PgScopedTx {
    async fn fetch_call(&mut self, id: Uuid) -> Result<Option<CallRecord>> {
        let row = sqlx::query_as::<_, CallRow>(&format!("SELECT {CALL_COLUMNS} FROM calls WHERE id = $1"))
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await?;
        row.map(CallRecord::try_from).transpose()
    }
}

#[async_trait]
impl ScopedTx for PgScopedTx {
    fn scope(&self) -> &Scope {
        &self.scope
    }

    async fn select_calls(&mut self) -> Result<Vec<CallRecord>> {
        let rows = sqlx::query_as::<_, CallRow>(&format!(
            "SELECT {CALL_COLUMNS} FROM calls ORDER BY created_at DESC, id ASC"
        ))
        .fetch_all(&mut *self.tx)
        .await?;
        rows.into_iter().map(CallRecord::try_from).collect()
    }

    async fn select_call(&mut self, id: Uuid) -> Result<Option<CallRecord>> {
        self.fetch_call(id).await
    }

    async fn insert_call(&mut self, call: &CallRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO calls (id, organization_id, phone_number, status, call_sid, notes,
                               created_by, created_at, started_at, ended_at, supersedes_id)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(call.id)
        .bind(call.organization_id.as_str())
        .bind(&call.phone_number)
        .bind(call.status.as_str())
        .bind(&call.call_sid)
        .bind(&call.notes)
        .bind(call.created_by.as_str())
        .bind(call.created_at)
        .bind(call.started_at)
        .bind(call.ended_at)
        .bind(call.supersedes_id)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn update_call(&mut self, id: Uuid, patch: &CallPatch) -> Result<Option<CallRecord>> {
        if patch.is_empty() {
            return self.fetch_call(id).await;
        }

        let mut query = update_call_query(id, patch);
        let row = query
            .build_query_as::<CallRow>()
            .fetch_optional(&mut *self.tx)
            .await?;
        row.map(CallRecord::try_from).transpose()
    }

    async fn delete_call(&mut self, id: Uuid) -> Result<u64> {
        let result = sqlx::query("DELETE FROM calls WHERE id = $1")
            .bind(id)
            .execute(&mut *self.tx)
            .await?;
        Ok(result.rows_affected())
    }

    async fn insert_note(&mut self, note: &CallNote) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO call_notes (id, organization_id, call_id, author_id, body, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(note.id)
        .bind(note.organization_id.as_str())
        .bind(note.call_id)
        .bind(note.author_id.as_str())
        .bind(&note.body)
        .bind(note.created_at)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn select_notes(&mut self, call_id: Uuid) -> Result<Vec<CallNote>> {
        let rows = sqlx::query_as::<_, NoteRow>(
            r#"
            SELECT id, organization_id, call_id, author_id, body, created_at
            FROM call_notes
            WHERE call_id = $1
            ORDER BY created_at ASC
            "#,
        )
        .bind(call_id)
        .fetch_all(&mut *self.tx)
        .await?;
        Ok(rows.into_iter().map(CallNote::from).collect())
    }

    async fn insert_audit(&mut self, entry: &AuditLogEntry) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO audit_logs (id, organization_id, user_id, resource_type, resource_id,
                                    action, before, after, content_hash, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(entry.id)
        .bind(entry.organization_id.as_str())
        .bind(entry.user_id.as_ref().map(|u| u.as_str()))
        .bind(&entry.resource_type)
        .bind(&entry.resource_id)
        .bind(&entry.action)
        .bind(&entry.before)
        .bind(&entry.after)
        .bind(&entry.content_hash)
        .bind(entry.created_at)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn select_audit(&mut self, limit: i64) -> Result<Vec<AuditLogEntry>> {
        let rows = sqlx::query_as::<_, AuditRow>(
            r#"
            SELECT id, organization_id, user_id, resource_type, resource_id,
                   action, before, after, content_hash, created_at
            FROM audit_logs
            ORDER BY created_at DESC, id ASC
            LIMIT $1
            "#,
        )
        .bind(limit)
        .fetch_all(&mut *self.tx)
        .await?;
        Ok(rows.into_iter().map(AuditLogEntry::from).collect())
    }

    async fn row_owner(&mut self, table: RegulatedTable, id: Uuid) -> Result<Option<OrganizationId>> {
        let owner: Option<String> = sqlx::query_scalar("SELECT tenant_row_owner($1, $2)")
            .bind(table.name())
            .bind(id)
            .fetch_one(&mut *self.tx)
            .await?;
        Ok(owner.map(OrganizationId))
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        let PgScopedTx { tx, scope } = *self;
        tx.commit().await?;
        debug!(scope = scope.kind(), "Record store transaction committed");
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        let PgScopedTx { tx, .. } = *self;
        tx.rollback().await?;
        Ok(())
    }
}
