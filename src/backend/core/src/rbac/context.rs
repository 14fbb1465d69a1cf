//! The resolved, request-scoped access context.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::warn;

use super::capability::{CallCapabilities, Capability, CapabilitySet};
use super::models::{OrganizationId, PlanTier, Role, UserId};
use crate::error::{CallMonitorError, Result};
use crate::telemetry::AccessMetrics;

/// Who is acting, in which organization, with what.
///
/// Only the resolver constructs these, and there are no setters: a role
/// change after resolution affects the next request, never this one.
#[derive(Debug, Clone, PartialEq)]
pub struct RbacContext {
    user_id: UserId,
    organization_id: OrganizationId,
    role: Role,
    plan: PlanTier,
    capabilities: CapabilitySet,
    policy_version: u32,
    resolved_at: DateTime<Utc>,
}

impl RbacContext {
    pub(crate) fn new(
        user_id: UserId,
        organization_id: OrganizationId,
        role: Role,
        plan: PlanTier,
        capabilities: CapabilitySet,
        policy_version: u32,
    ) -> Self {
        Self {
            user_id,
            organization_id,
            role,
            plan,
            capabilities,
            policy_version,
            resolved_at: Utc::now(),
        }
    }

    pub fn user_id(&self) -> &UserId {
        &self.user_id
    }

    pub fn organization_id(&self) -> &OrganizationId {
        &self.organization_id
    }

    pub fn role(&self) -> &Role {
        &self.role
    }

    pub fn plan(&self) -> PlanTier {
        self.plan
    }

    pub fn capabilities(&self) -> &CapabilitySet {
        &self.capabilities
    }

    pub fn policy_version(&self) -> u32 {
        self.policy_version
    }

    pub fn resolved_at(&self) -> DateTime<Utc> {
        self.resolved_at
    }

    pub fn has(&self, capability: Capability) -> bool {
        self.capabilities.contains(capability)
    }

    /// Fail with `Forbidden` unless the context carries `capability`.
    pub fn require(&self, capability: Capability) -> Result<()> {
        let allowed = self.has(capability);
        AccessMetrics::record_policy_decision(capability.as_str(), allowed);
        if allowed {
            return Ok(());
        }
        warn!(
            user_id = %self.user_id,
            organization_id = %self.organization_id,
            role = %self.role,
            capability = %capability,
            "Capability denied"
        );
        Err(CallMonitorError::forbidden(capability))
    }

    pub fn call_capabilities(&self) -> CallCapabilities {
        CallCapabilities::from(&self.capabilities)
    }

    pub fn to_response(&self) -> RbacContextResponse {
        RbacContextResponse {
            success: true,
            role: self.role.to_string(),
            plan: self.plan,
            organization_id: self.organization_id.clone(),
        }
    }
}

/// Success body for a resolution.
#[derive(Debug, Clone, Serialize)]
pub struct RbacContextResponse {
    pub success: bool,
    pub role: String,
    pub plan: PlanTier,
    pub organization_id: OrganizationId,
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;
    use crate::rbac::policy::PolicyEngine;

    /// A context as the builtin policy would resolve it.
    pub fn context(user: &str, org: &str, role: Role, plan: PlanTier) -> RbacContext {
        let engine = PolicyEngine::builtin();
        let capabilities = engine.resolve_capabilities(&role, plan);
        RbacContext::new(
            UserId::new(user),
            OrganizationId::new(org),
            role,
            plan,
            capabilities,
            engine.version(),
        )
    }
}
