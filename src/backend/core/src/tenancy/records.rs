//! Regulated call records and their write models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::audit::now_micros;
use crate::error::{CallMonitorError, Result};
use crate::rbac::models::{OrganizationId, UserId};

const MAX_PHONE_NUMBER_LEN: usize = 32;
const MAX_NOTE_LEN: usize = 10_000;

// ═══════════════════════════════════════════════════════════════════════════════
// Call status
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
    Cancelled,
}

impl CallStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "pending" => Some(Self::Pending),
            "in_progress" | "in-progress" => Some(Self::InProgress),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            "cancelled" => Some(Self::Cancelled),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    /// Calls move forward only: pending, then in progress, then a
    /// terminal state. Staying put is allowed.
    pub fn can_transition_to(&self, next: CallStatus) -> bool {
        if *self == next {
            return true;
        }
        match self {
            Self::Pending => true,
            Self::InProgress => next.is_terminal(),
            Self::Completed | Self::Failed | Self::Cancelled => false,
        }
    }
}

impl fmt::Display for CallStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Call record
// ═══════════════════════════════════════════════════════════════════════════════

/// One call, owned by exactly one organization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallRecord {
    pub id: Uuid,
    pub organization_id: OrganizationId,
    pub phone_number: String,
    pub status: CallStatus,
    pub call_sid: Option<String>,
    pub notes: Option<String>,
    pub created_by: UserId,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    /// The record this one corrects.
    pub supersedes_id: Option<Uuid>,
}

impl CallRecord {
    pub fn new(organization_id: OrganizationId, created_by: UserId, call: NewCall) -> Self {
        Self {
            id: Uuid::new_v4(),
            organization_id,
            phone_number: call.phone_number.trim().to_string(),
            status: CallStatus::Pending,
            call_sid: call.call_sid,
            notes: call.notes,
            created_by,
            created_at: now_micros(),
            started_at: None,
            ended_at: None,
            supersedes_id: None,
        }
    }

    /// Apply the lifecycle fields of a patch. Protected fields are ignored
    /// here; callers run the append-only check first.
    pub fn apply_lifecycle(&mut self, patch: &CallPatch) {
        if let Some(status) = patch.status {
            self.status = status;
        }
        if let Some(ref sid) = patch.call_sid {
            self.call_sid = Some(sid.clone());
        }
        if let Some(started_at) = patch.started_at {
            self.started_at = Some(started_at);
        }
        if let Some(ended_at) = patch.ended_at {
            self.ended_at = Some(ended_at);
        }
    }
}

/// Input for a new call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewCall {
    pub phone_number: String,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub call_sid: Option<String>,
}

impl NewCall {
    pub fn new(phone_number: impl Into<String>) -> Self {
        Self {
            phone_number: phone_number.into(),
            notes: None,
            call_sid: None,
        }
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }

    pub fn validate(&self) -> Result<()> {
        let phone = self.phone_number.trim();
        if phone.is_empty() {
            return Err(CallMonitorError::validation("phone_number is required"));
        }
        if phone.len() > MAX_PHONE_NUMBER_LEN {
            return Err(CallMonitorError::validation("phone_number is too long"));
        }
        Ok(())
    }
}

/// A requested change to a call.
///
/// Every column is representable so that attempts on protected columns
/// reach the append-only check and are rejected there, not silently
/// dropped.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CallPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<CallStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub call_sid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub organization_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub supersedes_id: Option<Uuid>,
}

impl CallPatch {
    pub fn status(status: CallStatus) -> Self {
        Self {
            status: Some(status),
            ..Default::default()
        }
    }

    /// Column names this patch writes.
    pub fn columns(&self) -> Vec<&'static str> {
        let mut columns = Vec::new();
        if self.status.is_some() {
            columns.push("status");
        }
        if self.call_sid.is_some() {
            columns.push("call_sid");
        }
        if self.started_at.is_some() {
            columns.push("started_at");
        }
        if self.ended_at.is_some() {
            columns.push("ended_at");
        }
        if self.notes.is_some() {
            columns.push("notes");
        }
        if self.phone_number.is_some() {
            columns.push("phone_number");
        }
        if self.created_by.is_some() {
            columns.push("created_by");
        }
        if self.organization_id.is_some() {
            columns.push("organization_id");
        }
        if self.supersedes_id.is_some() {
            columns.push("supersedes_id");
        }
        columns
    }

    pub fn is_empty(&self) -> bool {
        self.columns().is_empty()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Call note
// ═══════════════════════════════════════════════════════════════════════════════

/// Append-only annotation on a call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallNote {
    pub id: Uuid,
    pub organization_id: OrganizationId,
    pub call_id: Uuid,
    pub author_id: UserId,
    pub body: String,
    pub created_at: DateTime<Utc>,
}

impl CallNote {
    pub fn new(organization_id: OrganizationId, call_id: Uuid, author_id: UserId, body: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            organization_id,
            call_id,
            author_id,
            body,
            created_at: now_micros(),
        }
    }
}

pub(crate) fn validate_note_body(body: &str) -> Result<()> {
    if body.trim().is_empty() {
        return Err(CallMonitorError::validation("note body is required"));
    }
    if body.len() > MAX_NOTE_LEN {
        return Err(CallMonitorError::validation("note body is too long"));
    }
    Ok(())
}
