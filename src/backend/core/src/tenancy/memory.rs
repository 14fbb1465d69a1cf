//! In-memory record store.
//!
//! Enforces the same boundary rules the PostgreSQL schema does: rows are
//! filtered by scope, foreign-stamped writes are refused, and regulated
//! rows go through [`check_append_only`]. Writes are staged per session
//! and applied on commit: new rows are checked again for duplicate ids
//! under the write lock, and lifecycle patches are applied to the stored
//! row column by column.

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use uuid::Uuid;

use super::records::{CallNote, CallPatch, CallRecord};
use super::scope::{RecordStore, Scope, ScopeToken, ScopedTx};
use crate::audit::AuditLogEntry;
use crate::error::{CallMonitorError, ErrorCode, Result};
use crate::immutability::{check_append_only, RegulatedTable, TableOperation};
use crate::rbac::models::OrganizationId;

#[derive(Debug, Default)]
struct Tables {
    calls: BTreeMap<Uuid, CallRecord>,
    notes: Vec<CallNote>,
    audit: Vec<AuditLogEntry>,
}

#[derive(Debug, Default)]
struct Inner {
    tables: RwLock<Tables>,
    open_sessions: AtomicUsize,
}

/// Process-local record store for tests and single-node runs.
#[derive(Debug, Clone, Default)]
pub struct InMemoryRecordStore {
    inner: Arc<Inner>,
}

impl InMemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sessions begun and not yet committed, rolled back or dropped.
    pub fn open_sessions(&self) -> usize {
        self.inner.open_sessions.load(Ordering::SeqCst)
    }

    /// Committed call count across all tenants.
    pub fn call_count(&self) -> usize {
        self.inner.tables.read().calls.len()
    }
}

#[async_trait]
impl RecordStore for InMemoryRecordStore {
    async fn begin(&self, token: &ScopeToken) -> Result<Box<dyn ScopedTx>> {
        self.inner.open_sessions.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MemoryTx {
            inner: self.inner.clone(),
            scope: token.scope().clone(),
            inserted_calls: BTreeMap::new(),
            lifecycle_updates: Vec::new(),
            staged_notes: Vec::new(),
            staged_audit: Vec::new(),
        }))
    }
}

struct MemoryTx {
    inner: Arc<Inner>,
    scope: Scope,
    inserted_calls: BTreeMap<Uuid, CallRecord>,
    lifecycle_updates: Vec<(Uuid, CallPatch)>,
    staged_notes: Vec<CallNote>,
    staged_audit: Vec<AuditLogEntry>,
}

impl Drop for MemoryTx {
    fn drop(&mut self) {
        self.inner.open_sessions.fetch_sub(1, Ordering::SeqCst);
    }
}

impl MemoryTx {
    fn admit(&self, table: RegulatedTable, owner: &OrganizationId) -> Result<()> {
        if self.scope.admits(owner) {
            Ok(())
        } else {
            Err(CallMonitorError::cross_tenant_access_denied(table.name())
                .with_context("row_organization_id", owner))
        }
    }

    fn visible_call(&self, id: Uuid) -> Option<CallRecord> {
        if let Some(staged) = self.inserted_calls.get(&id) {
            return Some(staged.clone());
        }
        self.inner
            .tables
            .read()
            .calls
            .get(&id)
            .filter(|c| self.scope.admits(&c.organization_id))
            .map(|c| self.with_pending_updates(c.clone()))
    }

    /// A committed row as this session sees it.
    fn with_pending_updates(&self, mut call: CallRecord) -> CallRecord {
        let call_id = call.id;
        for (_, patch) in self.lifecycle_updates.iter().filter(|(id, _)| *id == call_id) {
            call.apply_lifecycle(patch);
        }
        call
    }
}

#[async_trait]
impl ScopedTx for MemoryTx {
    fn scope(&self) -> &Scope {
        &self.scope
    }

    async fn select_calls(&mut self) -> Result<Vec<CallRecord>> {
        let mut calls: BTreeMap<Uuid, CallRecord> = self
            .inner
            .tables
            .read()
            .calls
            .values()
            .filter(|c| self.scope.admits(&c.organization_id))
            .map(|c| (c.id, self.with_pending_updates(c.clone())))
            .collect();
        calls.extend(self.inserted_calls.iter().map(|(id, c)| (*id, c.clone())));

        let mut calls: Vec<CallRecord> = calls.into_values().collect();
        calls.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(calls)
    }

    async fn select_call(&mut self, id: Uuid) -> Result<Option<CallRecord>> {
        Ok(self.visible_call(id))
    }

    async fn insert_call(&mut self, call: &CallRecord) -> Result<()> {
        self.admit(RegulatedTable::Calls, &call.organization_id)?;
        let exists = self.inserted_calls.contains_key(&call.id)
            || self.inner.tables.read().calls.contains_key(&call.id);
        if exists {
            return Err(duplicate_call(call.id));
        }
        self.inserted_calls.insert(call.id, call.clone());
        Ok(())
    }

    async fn update_call(&mut self, id: Uuid, patch: &CallPatch) -> Result<Option<CallRecord>> {
        let Some(mut call) = self.visible_call(id) else {
            return Ok(None);
        };
        let columns = patch.columns();
        check_append_only(RegulatedTable::Calls, &TableOperation::Update { columns: &columns })?;
        call.apply_lifecycle(patch);
        match self.inserted_calls.get_mut(&id) {
            Some(staged) => staged.apply_lifecycle(patch),
            None => self.lifecycle_updates.push((id, patch.clone())),
        }
        Ok(Some(call))
    }

    async fn delete_call(&mut self, id: Uuid) -> Result<u64> {
        if self.visible_call(id).is_none() {
            return Ok(0);
        }
        check_append_only(RegulatedTable::Calls, &TableOperation::Delete)?;
        Ok(0)
    }

    async fn insert_note(&mut self, note: &CallNote) -> Result<()> {
        self.admit(RegulatedTable::CallNotes, &note.organization_id)?;
        match self.visible_call(note.call_id) {
            Some(call) if call.organization_id == note.organization_id => {}
            _ => {
                return Err(CallMonitorError::with_internal(
                    ErrorCode::RecordNotFound,
                    "A referenced record does not exist",
                    format!("call {} not visible for note", note.call_id),
                ))
            }
        }
        self.staged_notes.push(note.clone());
        Ok(())
    }

    async fn select_notes(&mut self, call_id: Uuid) -> Result<Vec<CallNote>> {
        let mut notes: Vec<CallNote> = self
            .inner
            .tables
            .read()
            .notes
            .iter()
            .chain(self.staged_notes.iter())
            .filter(|n| n.call_id == call_id && self.scope.admits(&n.organization_id))
            .cloned()
            .collect();
        notes.sort_by_key(|n| n.created_at);
        Ok(notes)
    }

    async fn insert_audit(&mut self, entry: &AuditLogEntry) -> Result<()> {
        self.admit(RegulatedTable::AuditLogs, &entry.organization_id)?;
        self.staged_audit.push(entry.clone());
        Ok(())
    }

    async fn select_audit(&mut self, limit: i64) -> Result<Vec<AuditLogEntry>> {
        let limit = usize::try_from(limit).unwrap_or(0);
        let mut entries: Vec<AuditLogEntry> = self
            .inner
            .tables
            .read()
            .audit
            .iter()
            .chain(self.staged_audit.iter())
            .filter(|e| self.scope.admits(&e.organization_id))
            .cloned()
            .collect();
        entries.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        entries.truncate(limit);
        Ok(entries)
    }

    async fn row_owner(&mut self, table: RegulatedTable, id: Uuid) -> Result<Option<OrganizationId>> {
        let tables = self.inner.tables.read();
        let owner = match table {
            RegulatedTable::Calls => tables.calls.get(&id).map(|c| c.organization_id.clone()),
            RegulatedTable::CallNotes => tables
                .notes
                .iter()
                .find(|n| n.id == id)
                .map(|n| n.organization_id.clone()),
            RegulatedTable::AuditLogs => tables
                .audit
                .iter()
                .find(|e| e.id == id)
                .map(|e| e.organization_id.clone()),
        };
        Ok(owner)
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        let mut this = self;
        let calls = std::mem::take(&mut this.inserted_calls);
        let updates = std::mem::take(&mut this.lifecycle_updates);
        let notes = std::mem::take(&mut this.staged_notes);
        let audit = std::mem::take(&mut this.staged_audit);

        let mut tables = this.inner.tables.write();
        if let Some(id) = calls.keys().find(|id| tables.calls.contains_key(*id)) {
            return Err(duplicate_call(*id));
        }
        for (id, patch) in &updates {
            if let Some(row) = tables.calls.get_mut(id) {
                row.apply_lifecycle(patch);
            }
        }
        tables.calls.extend(calls);
        tables.notes.extend(notes);
        tables.audit.extend(audit);
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        Ok(())
    }
}

fn duplicate_call(id: Uuid) -> CallMonitorError {
    CallMonitorError::with_internal(
        ErrorCode::DuplicateRecord,
        "A record with this identifier already exists",
        format!("calls.id {} already present", id),
    )
}
