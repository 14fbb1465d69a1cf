//! RBAC data models: identities, organizations, plans, roles and memberships.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Longest organization id accepted from a request.
pub const MAX_ORGANIZATION_ID_LEN: usize = 128;

// ═══════════════════════════════════════════════════════════════════════════════
// Identifiers
// ═══════════════════════════════════════════════════════════════════════════════

/// Strongly-typed user identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for UserId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for UserId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Strongly-typed organization identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrganizationId(pub String);

impl OrganizationId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Parse a requested organization id. Surrounding whitespace is dropped
    /// and a blank value counts as absent.
    pub fn parse(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(Self(trimmed.to_string()))
        }
    }

    /// Whether the id could name a real organization at all.
    pub fn is_well_formed(&self) -> bool {
        self.0.len() <= MAX_ORGANIZATION_ID_LEN && !self.0.chars().any(char::is_control)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OrganizationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for OrganizationId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for OrganizationId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Plan tier
// ═══════════════════════════════════════════════════════════════════════════════

/// Subscription tier of an organization.
///
/// Parsing is total: anything unrecognised is treated as [`PlanTier::Free`],
/// so a bad plan value can only ever narrow access.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", from = "String")]
pub enum PlanTier {
    Free,
    Pro,
    Enterprise,
}

impl PlanTier {
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "pro" | "paid" => Self::Pro,
            "enterprise" => Self::Enterprise,
            _ => Self::Free,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Free => "free",
            Self::Pro => "pro",
            Self::Enterprise => "enterprise",
        }
    }

    pub fn all() -> [PlanTier; 3] {
        [Self::Free, Self::Pro, Self::Enterprise]
    }
}

impl From<String> for PlanTier {
    fn from(s: String) -> Self {
        Self::parse(&s)
    }
}

impl fmt::Display for PlanTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Role
// ═══════════════════════════════════════════════════════════════════════════════

/// A member's role inside one organization.
///
/// Role names stored by older deployments survive as
/// [`Role::Unrecognized`] and grant nothing.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Role {
    Owner,
    Admin,
    Agent,
    Viewer,
    Unrecognized(String),
}

impl Role {
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "owner" => Self::Owner,
            "admin" => Self::Admin,
            "agent" => Self::Agent,
            "viewer" => Self::Viewer,
            _ => Self::Unrecognized(raw.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Owner => "owner",
            Self::Admin => "admin",
            Self::Agent => "agent",
            Self::Viewer => "viewer",
            Self::Unrecognized(raw) => raw,
        }
    }

    pub fn is_recognized(&self) -> bool {
        !matches!(self, Self::Unrecognized(_))
    }
}

impl From<String> for Role {
    fn from(s: String) -> Self {
        Self::parse(&s)
    }
}

impl From<Role> for String {
    fn from(role: Role) -> Self {
        match role {
            Role::Unrecognized(raw) => raw,
            other => other.as_str().to_string(),
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Organization & membership
// ═══════════════════════════════════════════════════════════════════════════════

/// A tenant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Organization {
    pub id: OrganizationId,
    pub name: String,
    pub plan: PlanTier,
    pub created_at: DateTime<Utc>,
    /// Archived organizations keep their records but grant no access.
    pub archived_at: Option<DateTime<Utc>>,
}

impl Organization {
    pub fn new(id: OrganizationId, name: impl Into<String>, plan: PlanTier) -> Self {
        Self {
            id,
            name: name.into(),
            plan,
            created_at: Utc::now(),
            archived_at: None,
        }
    }

    pub fn is_archived(&self) -> bool {
        self.archived_at.is_some()
    }
}

/// Links one user to one organization. At most one per pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Membership {
    pub user_id: UserId,
    pub organization_id: OrganizationId,
    pub role: Role,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Membership {
    pub fn new(user_id: UserId, organization_id: OrganizationId, role: Role) -> Self {
        let now = Utc::now();
        Self {
            user_id,
            organization_id,
            role,
            created_at: now,
            updated_at: now,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Identity
// ═══════════════════════════════════════════════════════════════════════════════

/// A verified caller.
#[derive(Debug, Clone, PartialEq)]
pub struct AuthenticatedUser {
    user_id: UserId,
    email: Option<String>,
    session_id: Option<String>,
    expires_at: Option<DateTime<Utc>>,
}

impl AuthenticatedUser {
    /// Returns `None` for a blank user id.
    pub fn new(user_id: impl Into<String>) -> Option<Self> {
        let user_id = user_id.into();
        if user_id.trim().is_empty() {
            return None;
        }
        Some(Self {
            user_id: UserId(user_id),
            email: None,
            session_id: None,
            expires_at: None,
        })
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn with_expiry(mut self, expires_at: DateTime<Utc>) -> Self {
        self.expires_at = Some(expires_at);
        self
    }

    pub fn user_id(&self) -> &UserId {
        &self.user_id
    }

    pub fn email(&self) -> Option<&str> {
        self.email.as_deref()
    }

    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.expires_at
    }
}

/// Who is calling. Placed in request extensions by the auth layer.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Identity {
    #[default]
    Anonymous,
    Authenticated(AuthenticatedUser),
}

impl Identity {
    /// Build an identity from a user id; a blank id yields `Anonymous`.
    pub fn authenticated(user_id: impl Into<String>) -> Self {
        AuthenticatedUser::new(user_id)
            .map(Self::Authenticated)
            .unwrap_or(Self::Anonymous)
    }

    pub fn user(&self) -> Option<&AuthenticatedUser> {
        match self {
            Self::Authenticated(user) => Some(user),
            Self::Anonymous => None,
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.user().is_some()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════
