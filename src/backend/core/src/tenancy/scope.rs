//! Scope tokens and the record-store contract.
//!
//! A store session can only be opened with a [`ScopeToken`], and tokens
//! can only be minted inside this crate by the tenant guard. Every query a
//! [`ScopedTx`] runs is filtered by its scope at the store itself.

use async_trait::async_trait;
use uuid::Uuid;

use crate::audit::AuditLogEntry;
use crate::error::Result;
use crate::immutability::RegulatedTable;
use crate::rbac::models::OrganizationId;
use crate::tenancy::records::{CallNote, CallPatch, CallRecord};

/// Which rows a session may see.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Scope {
    /// Exactly one tenant's rows.
    Tenant(OrganizationId),
    /// Every tenant's rows. Only opened through `with_system_scope`.
    System { reason: String },
}

impl Scope {
    pub fn organization_id(&self) -> Option<&OrganizationId> {
        match self {
            Self::Tenant(org) => Some(org),
            Self::System { .. } => None,
        }
    }

    /// Whether a row owned by `owner` is visible and writable.
    pub fn admits(&self, owner: &OrganizationId) -> bool {
        match self {
            Self::Tenant(org) => org == owner,
            Self::System { .. } => true,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Tenant(_) => "tenant",
            Self::System { .. } => "system",
        }
    }
}

/// Proof that the tenant guard authorized a session.
#[derive(Debug, Clone)]
pub struct ScopeToken {
    scope: Scope,
}

impl ScopeToken {
    pub(crate) fn tenant(organization_id: OrganizationId) -> Self {
        Self {
            scope: Scope::Tenant(organization_id),
        }
    }

    pub(crate) fn system(reason: impl Into<String>) -> Self {
        Self {
            scope: Scope::System {
                reason: reason.into(),
            },
        }
    }

    pub fn scope(&self) -> &Scope {
        &self.scope
    }
}

/// An open, scoped unit of work against the record store.
///
/// Dropping a session without calling [`commit`](Self::commit) discards
/// its writes.
#[async_trait]
pub trait ScopedTx: Send {
    fn scope(&self) -> &Scope;

    async fn select_calls(&mut self) -> Result<Vec<CallRecord>>;

    async fn select_call(&mut self, id: Uuid) -> Result<Option<CallRecord>>;

    /// Fails with `CrossTenantAccessDenied` if the row belongs to a tenant
    /// the scope does not admit.
    async fn insert_call(&mut self, call: &CallRecord) -> Result<()>;

    /// `Ok(None)` when no visible row has this id.
    async fn update_call(&mut self, id: Uuid, patch: &CallPatch) -> Result<Option<CallRecord>>;

    async fn delete_call(&mut self, id: Uuid) -> Result<u64>;

    async fn insert_note(&mut self, note: &CallNote) -> Result<()>;

    async fn select_notes(&mut self, call_id: Uuid) -> Result<Vec<CallNote>>;

    async fn insert_audit(&mut self, entry: &AuditLogEntry) -> Result<()>;

    /// Newest first.
    async fn select_audit(&mut self, limit: i64) -> Result<Vec<AuditLogEntry>>;

    /// Owner of a row regardless of scope. Used only to report
    /// cross-tenant read attempts; never to return data.
    async fn row_owner(&mut self, table: RegulatedTable, id: Uuid) -> Result<Option<OrganizationId>>;

    async fn commit(self: Box<Self>) -> Result<()>;

    async fn rollback(self: Box<Self>) -> Result<()>;
}

/// Opens scoped sessions.
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn begin(&self, token: &ScopeToken) -> Result<Box<dyn ScopedTx>>;
}
