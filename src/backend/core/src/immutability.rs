//! Append-only rules for regulated tables.
//!
//! `calls` may change only in its lifecycle columns; `call_notes` and
//! `audit_logs` never change once written. Corrections are new rows that
//! point back at the original through `supersedes_id`.
//!
//! The same rules run in three places: [`ImmutabilityGuard`] in the
//! session layer, [`check_append_only`] inside the in-memory store, and
//! the `reject_regulated_mutation` triggers in PostgreSQL.

use serde::Serialize;
use std::fmt;
use std::sync::Arc;

use crate::error::{CallMonitorError, Result};
use crate::rbac::context::RbacContext;
use crate::security::{SecurityEvent, SecurityEventKind, SecurityEventLog};

/// Tables holding regulated records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RegulatedTable {
    Calls,
    CallNotes,
    AuditLogs,
}

impl RegulatedTable {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Calls => "calls",
            Self::CallNotes => "call_notes",
            Self::AuditLogs => "audit_logs",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::all().into_iter().find(|t| t.name() == name)
    }

    pub fn all() -> [RegulatedTable; 3] {
        [Self::Calls, Self::CallNotes, Self::AuditLogs]
    }

    /// Columns an update may touch. Empty means fully immutable.
    pub fn mutable_columns(&self) -> &'static [&'static str] {
        match self {
            Self::Calls => &["status", "call_sid", "started_at", "ended_at"],
            Self::CallNotes | Self::AuditLogs => &[],
        }
    }
}

impl fmt::Display for RegulatedTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// What a caller intends to do to a table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableOperation<'a> {
    Insert,
    Append,
    Update { columns: &'a [&'a str] },
    Delete,
    Truncate,
}

impl TableOperation<'_> {
    pub fn verb(&self) -> &'static str {
        match self {
            Self::Insert => "insert",
            Self::Append => "append",
            Self::Update { .. } => "update",
            Self::Delete => "delete",
            Self::Truncate => "truncate",
        }
    }
}

/// The rule itself, without side effects.
///
/// Unknown column names count as protected.
pub fn check_append_only(table: RegulatedTable, operation: &TableOperation<'_>) -> Result<()> {
    match operation {
        TableOperation::Insert | TableOperation::Append => Ok(()),
        TableOperation::Delete | TableOperation::Truncate => {
            Err(CallMonitorError::immutable_record_violation(
                table.name(),
                format!("{} on {} is not permitted", operation.verb(), table),
            ))
        }
        TableOperation::Update { columns } => {
            let allowed = table.mutable_columns();
            let protected: Vec<&str> = columns
                .iter()
                .copied()
                .filter(|c| !allowed.contains(c))
                .collect();
            if protected.is_empty() {
                Ok(())
            } else {
                Err(CallMonitorError::immutable_record_violation(
                    table.name(),
                    format!("update on {} touches protected columns: {}", table, protected.join(", ")),
                ))
            }
        }
    }
}

/// Session-layer enforcement with security-event reporting.
#[derive(Debug, Clone)]
pub struct ImmutabilityGuard {
    events: Arc<SecurityEventLog>,
}

impl ImmutabilityGuard {
    pub fn new(events: Arc<SecurityEventLog>) -> Self {
        Self { events }
    }

    /// Reject operations that would mutate or remove a regulated record.
    pub fn enforce_append_only(
        &self,
        table: RegulatedTable,
        operation: &TableOperation<'_>,
    ) -> Result<()> {
        self.enforce(None, table, operation)
    }

    /// As [`enforce_append_only`](Self::enforce_append_only), attributing
    /// any violation to the context's user and organization.
    pub fn enforce_as(
        &self,
        ctx: &RbacContext,
        table: RegulatedTable,
        operation: &TableOperation<'_>,
    ) -> Result<()> {
        self.enforce(Some(ctx), table, operation)
    }

    pub(crate) fn report(&self, ctx: Option<&RbacContext>, table: RegulatedTable, err: &CallMonitorError) {
        let detail = err
            .internal_message()
            .unwrap_or_else(|| err.user_message())
            .to_string();
        let mut event = SecurityEvent::new(SecurityEventKind::ImmutableRecordViolation, detail)
            .table(table.name());
        if let Some(ctx) = ctx {
            event = event.actor(ctx.user_id(), ctx.organization_id());
        }
        self.events.record(event);
    }

    fn enforce(
        &self,
        ctx: Option<&RbacContext>,
        table: RegulatedTable,
        operation: &TableOperation<'_>,
    ) -> Result<()> {
        check_append_only(table, operation).map_err(|err| {
            self.report(ctx, table, &err);
            err
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;

    fn guard() -> (ImmutabilityGuard, Arc<SecurityEventLog>) {
        let events = Arc::new(SecurityEventLog::new(16));
        (ImmutabilityGuard::new(events.clone()), events)
    }

    #[test]
    fn test_inserts_always_allowed() {
        for table in RegulatedTable::all() {
            assert!(check_append_only(table, &TableOperation::Insert).is_ok());
            assert!(check_append_only(table, &TableOperation::Append).is_ok());
        }
    }

    #[test]
    fn test_delete_and_truncate_always_rejected() {
        for table in RegulatedTable::all() {
            for op in [TableOperation::Delete, TableOperation::Truncate] {
                let err = check_append_only(table, &op).unwrap_err();
                assert_eq!(err.code(), ErrorCode::ImmutableRecordViolation);
            }
        }
    }

    #[test]
    fn test_call_lifecycle_columns_are_mutable() {
        let op = TableOperation::Update {
            columns: &["status", "ended_at"],
        };
        assert!(check_append_only(RegulatedTable::Calls, &op).is_ok());
    }

    #[test]
    fn test_call_notes_column_is_protected() {
        let op = TableOperation::Update {
            columns: &["status", "notes"],
        };
        let err = check_append_only(RegulatedTable::Calls, &op).unwrap_err();
        assert_eq!(err.code(), ErrorCode::ImmutableRecordViolation);
        assert!(err.internal_message().unwrap().contains("notes"));
    }

    #[test]
    fn test_unknown_column_is_protected() {
        let op = TableOperation::Update {
            columns: &["mystery"],
        };
        assert!(check_append_only(RegulatedTable::Calls, &op).is_err());
    }

    #[test]
    fn test_audit_logs_fully_immutable() {
        let op = TableOperation::Update {
            columns: &["status"],
        };
        assert!(check_append_only(RegulatedTable::AuditLogs, &op).is_err());
        assert!(check_append_only(RegulatedTable::CallNotes, &op).is_err());
    }

    #[test]
    fn test_guard_records_security_event() {
        let (guard, events) = guard();
        assert!(guard
            .enforce_append_only(RegulatedTable::AuditLogs, &TableOperation::Delete)
            .is_err());
        assert!(guard
            .enforce_append_only(RegulatedTable::AuditLogs, &TableOperation::Insert)
            .is_ok());
        assert_eq!(events.count(SecurityEventKind::ImmutableRecordViolation), 1);
        assert_eq!(events.recent()[0].table.as_deref(), Some("audit_logs"));
    }

    #[test]
    fn test_table_names_round_trip() {
        for table in RegulatedTable::all() {
            assert_eq!(RegulatedTable::from_name(table.name()), Some(table));
        }
        assert_eq!(RegulatedTable::from_name("memberships"), None);
    }
}
