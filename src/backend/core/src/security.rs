//! Security events: cross-tenant attempts, append-only violations and
//! system-scope openings.
//!
//! Every event is logged at `warn` on the `security` target, counted in
//! `callmonitor_security_events_total`, and kept in a bounded in-memory
//! ring for inspection.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::VecDeque;
use tracing::warn;
use uuid::Uuid;

use crate::rbac::models::{OrganizationId, UserId};
use crate::telemetry::{logging::SECURITY_TARGET, SecurityMetrics};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SecurityEventKind {
    CrossTenantAccessDenied,
    ImmutableRecordViolation,
    SystemScopeOpened,
}

impl SecurityEventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CrossTenantAccessDenied => "cross_tenant_access_denied",
            Self::ImmutableRecordViolation => "immutable_record_violation",
            Self::SystemScopeOpened => "system_scope_opened",
        }
    }
}

/// One recorded event.
#[derive(Debug, Clone, Serialize)]
pub struct SecurityEvent {
    pub id: Uuid,
    pub kind: SecurityEventKind,
    pub occurred_at: DateTime<Utc>,
    pub user_id: Option<UserId>,
    pub organization_id: Option<OrganizationId>,
    /// The tenant that owns the row the actor tried to reach.
    pub target_organization_id: Option<OrganizationId>,
    pub table: Option<String>,
    pub record_id: Option<String>,
    pub detail: String,
}

impl SecurityEvent {
    pub fn new(kind: SecurityEventKind, detail: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            occurred_at: Utc::now(),
            user_id: None,
            organization_id: None,
            target_organization_id: None,
            table: None,
            record_id: None,
            detail: detail.into(),
        }
    }

    pub fn actor(mut self, user_id: &UserId, organization_id: &OrganizationId) -> Self {
        self.user_id = Some(user_id.clone());
        self.organization_id = Some(organization_id.clone());
        self
    }

    pub fn user(mut self, user_id: impl Into<UserId>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn target(mut self, organization_id: OrganizationId) -> Self {
        self.target_organization_id = Some(organization_id);
        self
    }

    pub fn table(mut self, table: impl Into<String>) -> Self {
        self.table = Some(table.into());
        self
    }

    pub fn record(mut self, record_id: impl ToString) -> Self {
        self.record_id = Some(record_id.to_string());
        self
    }
}

/// Bounded log of recent security events.
#[derive(Debug)]
pub struct SecurityEventLog {
    recent: Mutex<VecDeque<SecurityEvent>>,
    capacity: usize,
}

impl Default for SecurityEventLog {
    fn default() -> Self {
        Self::new(256)
    }
}

impl SecurityEventLog {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            recent: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
        }
    }

    pub fn record(&self, event: SecurityEvent) {
        warn!(
            target: SECURITY_TARGET,
            event_id = %event.id,
            kind = event.kind.as_str(),
            user_id = event.user_id.as_ref().map(UserId::as_str).unwrap_or("-"),
            organization_id = event.organization_id.as_ref().map(OrganizationId::as_str).unwrap_or("-"),
            target_organization_id = event.target_organization_id.as_ref().map(OrganizationId::as_str).unwrap_or("-"),
            table = event.table.as_deref().unwrap_or("-"),
            record_id = event.record_id.as_deref().unwrap_or("-"),
            detail = %event.detail,
            "Security event"
        );
        SecurityMetrics::record_event(event.kind.as_str());

        let mut recent = self.recent.lock();
        if recent.len() == self.capacity {
            recent.pop_front();
        }
        recent.push_back(event);
    }

    /// Events oldest first.
    pub fn recent(&self) -> Vec<SecurityEvent> {
        self.recent.lock().iter().cloned().collect()
    }

    pub fn count(&self, kind: SecurityEventKind) -> usize {
        self.recent.lock().iter().filter(|e| e.kind == kind).count()
    }

    pub fn len(&self) -> usize {
        self.recent.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.recent.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_and_count() {
        let log = SecurityEventLog::new(8);
        log.record(
            SecurityEvent::new(SecurityEventKind::CrossTenantAccessDenied, "read")
                .actor(&UserId::new("u1"), &OrganizationId::new("a"))
                .target(OrganizationId::new("b"))
                .table("calls"),
        );
        log.record(SecurityEvent::new(SecurityEventKind::SystemScopeOpened, "backfill"));

        assert_eq!(log.len(), 2);
        assert_eq!(log.count(SecurityEventKind::CrossTenantAccessDenied), 1);
        let first = &log.recent()[0];
        assert_eq!(first.target_organization_id.as_ref().unwrap().as_str(), "b");
    }

    #[test]
    fn test_capacity_drops_oldest() {
        let log = SecurityEventLog::new(2);
        for detail in ["one", "two", "three"] {
            log.record(SecurityEvent::new(SecurityEventKind::ImmutableRecordViolation, detail));
        }
        let details: Vec<_> = log.recent().into_iter().map(|e| e.detail).collect();
        assert_eq!(details, vec!["two", "three"]);
    }
}
