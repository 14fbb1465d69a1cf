//! Access resolution for a multi-tenant call center.
//!
//! This module provides:
//! - **Models**: identities, organizations, plans, roles and memberships
//! - **Policy Engine**: maps (role, plan) to a capability set
//! - **Stores**: membership and organization lookups plus lifecycle changes
//! - **Resolver**: turns (identity, organization) into an [`RbacContext`]
//! - **Middleware**: axum extractor and a capability-enforcing tower layer
//!
//! # Usage
//!
//! ```rust,ignore
//! use callmonitor_core::rbac::{
//!     Capability, Identity, InMemoryDirectory, PolicyEngine, RbacContextResolver,
//! };
//!
//! let directory = Arc::new(InMemoryDirectory::new());
//! let resolver = RbacContextResolver::new(
//!     directory.clone(),
//!     directory,
//!     Arc::new(PolicyEngine::builtin()),
//! );
//!
//! let ctx = resolver.resolve(&Identity::authenticated("u1"), Some("org-1")).await?;
//! ctx.require(Capability::ViewCalls)?;
//! ```

pub mod capability;
pub mod context;
pub mod middleware;
pub mod models;
pub mod policy;
pub mod resolver;
pub mod roles;
pub mod store;

pub use capability::{CallCapabilities, Capability, CapabilitySet};
pub use context::{RbacContext, RbacContextResponse};
pub use middleware::{RequireCapabilityLayer, RequireCapabilityService, ORGANIZATION_HEADER};
pub use models::{
    AuthenticatedUser, Identity, Membership, Organization, OrganizationId, PlanTier, Role, UserId,
};
pub use policy::{PolicyDecision, PolicyEngine, PolicyMatrixRow, PolicyTable};
pub use resolver::RbacContextResolver;
pub use roles::PredefinedRole;
pub use store::{DirectoryAdmin, InMemoryDirectory, MembershipStore, OrganizationStore};
