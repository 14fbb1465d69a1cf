//! Tamper-evident audit trail entries.
//!
//! Each entry carries the SHA-256 of its canonical JSON payload. Keys are
//! serialized in sorted order and timestamps as integer microseconds, so
//! the hash survives a round trip through PostgreSQL `jsonb` and
//! `timestamptz`.

use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::rbac::models::{OrganizationId, UserId};

/// Action names written by the tenant session.
pub mod actions {
    pub const CREATE: &str = "create";
    pub const UPDATE: &str = "update";
    pub const SUPERSEDE: &str = "supersede";
    pub const ANNOTATE: &str = "annotate";
    pub const IMPORT: &str = "import";
    pub const MEMBER_ADD: &str = "membership.add";
    pub const MEMBER_ROLE_CHANGE: &str = "membership.role_change";
    pub const MEMBER_REMOVE: &str = "membership.remove";
    pub const PLAN_CHANGE: &str = "organization.plan_change";
    pub const ARCHIVE: &str = "organization.archive";
}

/// Current time truncated to the precision PostgreSQL stores.
pub(crate) fn now_micros() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

/// An audit entry before it is attributed and sealed.
#[derive(Debug, Clone, PartialEq)]
pub struct NewAuditEntry {
    pub resource_type: String,
    pub resource_id: Option<String>,
    pub action: String,
    pub before: Option<Value>,
    pub after: Option<Value>,
}

impl NewAuditEntry {
    pub fn new(resource_type: impl Into<String>, action: impl Into<String>) -> Self {
        Self {
            resource_type: resource_type.into(),
            resource_id: None,
            action: action.into(),
            before: None,
            after: None,
        }
    }

    pub fn resource(mut self, id: impl ToString) -> Self {
        self.resource_id = Some(id.to_string());
        self
    }

    pub fn before<T: Serialize>(mut self, value: &T) -> Self {
        self.before = serde_json::to_value(value).ok();
        self
    }

    pub fn after<T: Serialize>(mut self, value: &T) -> Self {
        self.after = serde_json::to_value(value).ok();
        self
    }
}

/// A sealed, immutable audit row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditLogEntry {
    pub id: Uuid,
    pub organization_id: OrganizationId,
    /// Kept after the user is offboarded.
    pub user_id: Option<UserId>,
    pub resource_type: String,
    pub resource_id: Option<String>,
    pub action: String,
    pub before: Option<Value>,
    pub after: Option<Value>,
    pub content_hash: String,
    pub created_at: DateTime<Utc>,
}

impl AuditLogEntry {
    /// Attribute an entry to a tenant and actor, and hash it.
    pub fn seal(entry: NewAuditEntry, organization_id: OrganizationId, user_id: Option<UserId>) -> Self {
        let mut sealed = Self {
            id: Uuid::new_v4(),
            organization_id,
            user_id,
            resource_type: entry.resource_type,
            resource_id: entry.resource_id,
            action: entry.action,
            before: entry.before,
            after: entry.after,
            content_hash: String::new(),
            created_at: now_micros(),
        };
        sealed.content_hash = sealed.compute_hash();
        sealed
    }

    fn canonical_payload(&self) -> Value {
        json!({
            "id": self.id,
            "organization_id": self.organization_id,
            "user_id": self.user_id,
            "resource_type": self.resource_type,
            "resource_id": self.resource_id,
            "action": self.action,
            "before": self.before,
            "after": self.after,
            "created_at": self.created_at.timestamp_micros(),
        })
    }

    /// Hex SHA-256 of the canonical payload.
    pub fn compute_hash(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.canonical_payload().to_string().as_bytes());
        hex::encode(hasher.finalize())
    }

    pub fn verify(&self) -> bool {
        self.content_hash == self.compute_hash()
    }
}
