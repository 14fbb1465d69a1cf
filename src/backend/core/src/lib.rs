#![allow(clippy::result_large_err)]
//! # CallMonitor Core
//!
//! Access control and tenant isolation for multi-tenant call data.
//!
//! ## Architecture
//!
//! - **RBAC**: Resolves who is calling, for which organization, with which capabilities
//! - **Tenancy**: Scoped sessions that confine every query to one organization
//! - **Immutability**: Append-only enforcement for calls, notes and audit logs
//! - **Audit**: Hash-sealed audit trail entries
//! - **Security**: In-process log of cross-tenant access attempts and integrity violations
//! - **Middleware**: Bearer token authentication
//! - **Telemetry**: Logging, tracing, and metrics infrastructure
//! - **Database**: PostgreSQL stores with row-level security

pub mod api;
pub mod audit;
pub mod config;
pub mod db;
pub mod error;
pub mod immutability;
pub mod middleware;
pub mod rbac;
pub mod security;
pub mod telemetry;
pub mod tenancy;

pub use error::{CallMonitorError, ErrorCode, ErrorContext, ErrorDetails, ErrorSeverity, Result};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::audit::{actions, AuditLogEntry, NewAuditEntry};
    pub use crate::error::{CallMonitorError, ErrorCode, ErrorContext, ErrorDetails, ErrorSeverity, Result};
    pub use crate::immutability::{check_append_only, ImmutabilityGuard, RegulatedTable, TableOperation};
    pub use crate::middleware::auth::{AuthLayer, Claims, TokenVerifier};
    pub use crate::rbac::{
        Capability, CapabilitySet, DirectoryAdmin, Identity, InMemoryDirectory, Membership,
        MembershipStore, Organization, OrganizationId, OrganizationStore, PlanTier, PolicyEngine,
        PredefinedRole, RbacContext, RbacContextResolver, RequireCapabilityLayer, Role, UserId,
    };
    pub use crate::security::{SecurityEvent, SecurityEventKind, SecurityEventLog};
    pub use crate::tenancy::{
        CallNote, CallPatch, CallRecord, CallStatus, InMemoryRecordStore, NewCall, RecordStore,
        SystemSession, TenantGuard, TenantSession,
    };
}
