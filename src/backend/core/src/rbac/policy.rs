//! Policy engine: maps (role, plan) to the capabilities a context carries.
//!
//! The effective set is the role's grant intersected with the plan's
//! entitlement. Both tables live in a versioned [`PolicyTable`]; the
//! version is stamped on every resolved context.

use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

use super::capability::{Capability, CapabilitySet};
use super::context::RbacContext;
use super::models::{PlanTier, Role};
use super::roles::PredefinedRole;
use crate::error::{CallMonitorError, Result};
use crate::telemetry::AccessMetrics;

/// Version of the built-in policy table.
pub const BUILTIN_POLICY_VERSION: u32 = 1;

// ═══════════════════════════════════════════════════════════════════════════════
// Decision
// ═══════════════════════════════════════════════════════════════════════════════

/// Result of a policy evaluation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PolicyDecision {
    /// The action is allowed.
    Allow,
    /// The action is denied, with a reason.
    Deny(String),
}

impl PolicyDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allow)
    }

    pub fn is_denied(&self) -> bool {
        matches!(self, Self::Deny(_))
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Policy table
// ═══════════════════════════════════════════════════════════════════════════════

/// Role grants and plan entitlements, as data.
#[derive(Debug, Clone)]
pub struct PolicyTable {
    version: u32,
    role_grants: HashMap<PredefinedRole, CapabilitySet>,
    plan_entitlements: HashMap<PlanTier, CapabilitySet>,
}

impl PolicyTable {
    /// An empty table: every lookup yields nothing.
    pub fn new(version: u32) -> Self {
        Self {
            version,
            role_grants: HashMap::new(),
            plan_entitlements: HashMap::new(),
        }
    }

    /// The table shipped with the service.
    pub fn builtin() -> Self {
        use Capability::*;

        let free = CapabilitySet::from([
            ManageBilling,
            ManageUsers,
            ViewCalls,
            EditCalls,
            ViewAudit,
            Record,
        ]);
        let pro = free.union(&CapabilitySet::from([ExportData, Transcribe, Translate]));
        let enterprise = pro.union(&CapabilitySet::from([Survey, SyntheticCaller]));

        let mut table = Self::new(BUILTIN_POLICY_VERSION)
            .with_plan_entitlement(PlanTier::Free, free)
            .with_plan_entitlement(PlanTier::Pro, pro)
            .with_plan_entitlement(PlanTier::Enterprise, enterprise);
        for role in PredefinedRole::all() {
            table = table.with_role_grant(role, role.capabilities());
        }
        table
    }

    pub fn with_role_grant(mut self, role: PredefinedRole, grant: CapabilitySet) -> Self {
        self.role_grants.insert(role, grant);
        self
    }

    pub fn with_plan_entitlement(mut self, plan: PlanTier, entitlement: CapabilitySet) -> Self {
        self.plan_entitlements.insert(plan, entitlement);
        self
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    fn grant(&self, role: &Role) -> CapabilitySet {
        PredefinedRole::from_role(role)
            .and_then(|r| self.role_grants.get(&r).cloned())
            .unwrap_or_default()
    }

    fn entitlement(&self, plan: PlanTier) -> CapabilitySet {
        self.plan_entitlements.get(&plan).cloned().unwrap_or_default()
    }
}

/// One cell of the role × plan grid.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PolicyMatrixRow {
    pub role: String,
    pub plan: PlanTier,
    pub capabilities: CapabilitySet,
}

// ═══════════════════════════════════════════════════════════════════════════════
// Policy Engine
// ═══════════════════════════════════════════════════════════════════════════════

/// Evaluates the policy table. Immutable once built, so it is shared as
/// `Arc<PolicyEngine>` without locking.
#[derive(Debug, Clone)]
pub struct PolicyEngine {
    table: Arc<PolicyTable>,
}

impl Default for PolicyEngine {
    fn default() -> Self {
        Self::builtin()
    }
}

impl PolicyEngine {
    pub fn new(table: PolicyTable) -> Self {
        Self {
            table: Arc::new(table),
        }
    }

    pub fn builtin() -> Self {
        Self::new(PolicyTable::builtin())
    }

    pub fn version(&self) -> u32 {
        self.table.version()
    }

    /// Effective capabilities for `role` under `plan`.
    ///
    /// Total: unrecognized roles and unknown plans resolve to what the
    /// table gives them, which for the builtin table is nothing.
    pub fn resolve_capabilities(&self, role: &Role, plan: PlanTier) -> CapabilitySet {
        let effective = self.table.grant(role).intersection(&self.table.entitlement(plan));
        debug!(role = %role, plan = %plan, count = effective.len(), "Resolved capabilities");
        effective
    }

    /// Evaluate one capability against a resolved context.
    ///
    /// A context resolved under a different table version is denied.
    pub fn check(&self, ctx: &RbacContext, capability: Capability) -> PolicyDecision {
        if ctx.policy_version() != self.version() {
            return PolicyDecision::Deny(format!(
                "context resolved under policy v{}, current is v{}",
                ctx.policy_version(),
                self.version()
            ));
        }
        if ctx.has(capability) {
            PolicyDecision::Allow
        } else {
            PolicyDecision::Deny(format!(
                "role {} on plan {} lacks {}",
                ctx.role(),
                ctx.plan(),
                capability
            ))
        }
    }

    /// Like [`check`](Self::check), but a denial becomes `Forbidden`.
    pub fn enforce(&self, ctx: &RbacContext, capability: Capability) -> Result<()> {
        let decision = self.check(ctx, capability);
        AccessMetrics::record_policy_decision(capability.as_str(), decision.is_allowed());
        match decision {
            PolicyDecision::Allow => Ok(()),
            PolicyDecision::Deny(reason) => {
                warn!(
                    user_id = %ctx.user_id(),
                    organization_id = %ctx.organization_id(),
                    capability = %capability,
                    reason = %reason,
                    "Permission denied"
                );
                Err(CallMonitorError::forbidden(capability).with_internal_message(reason))
            }
        }
    }

    /// Every predefined role against every plan.
    pub fn matrix(&self) -> Vec<PolicyMatrixRow> {
        PredefinedRole::all()
            .into_iter()
            .flat_map(|role| {
                PlanTier::all().into_iter().map(move |plan| (role, plan))
            })
            .map(|(role, plan)| {
                let role = role.as_role();
                PolicyMatrixRow {
                    capabilities: self.resolve_capabilities(&role, plan),
                    role: role.to_string(),
                    plan,
                }
            })
            .collect()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use crate::rbac::context::fixtures::context;

    fn engine() -> PolicyEngine {
        PolicyEngine::builtin()
    }

    #[test]
    fn test_owner_on_enterprise_gets_everything() {
        let caps = engine().resolve_capabilities(&Role::Owner, PlanTier::Enterprise);
        assert_eq!(caps, CapabilitySet::all());
    }

    #[test]
    fn test_owner_on_free_is_capped_by_plan() {
        let caps = engine().resolve_capabilities(&Role::Owner, PlanTier::Free);
        assert!(caps.contains(Capability::ManageBilling));
        assert!(caps.contains(Capability::Record));
        assert!(!caps.contains(Capability::Transcribe));
        assert!(!caps.contains(Capability::ExportData));
        assert!(!caps.contains(Capability::Survey));
    }

    #[test]
    fn test_agent_on_pro() {
        let caps = engine().resolve_capabilities(&Role::Agent, PlanTier::Pro);
        assert_eq!(
            caps,
            CapabilitySet::from([
                Capability::ViewCalls,
                Capability::EditCalls,
                Capability::Record,
                Capability::Transcribe,
                Capability::Translate,
            ])
        );
    }

    #[test]
    fn test_admin_never_manages_billing() {
        for plan in PlanTier::all() {
            let caps = engine().resolve_capabilities(&Role::Admin, plan);
            assert!(!caps.contains(Capability::ManageBilling));
        }
    }

    #[test]
    fn test_unrecognized_role_gets_nothing() {
        let role = Role::parse("supervisor");
        for plan in PlanTier::all() {
            assert!(engine().resolve_capabilities(&role, plan).is_empty());
        }
    }

    #[test]
    fn test_resolution_is_deterministic() {
        let e = engine();
        let a = e.resolve_capabilities(&Role::Agent, PlanTier::Enterprise);
        let b = e.resolve_capabilities(&Role::Agent, PlanTier::Enterprise);
        assert_eq!(a, b);
    }

    #[test]
    fn test_plan_upgrade_never_narrows() {
        let e = engine();
        for role in PredefinedRole::all() {
            let role = role.as_role();
            let free = e.resolve_capabilities(&role, PlanTier::Free);
            let pro = e.resolve_capabilities(&role, PlanTier::Pro);
            let enterprise = e.resolve_capabilities(&role, PlanTier::Enterprise);
            assert!(free.iter().all(|c| pro.contains(c)));
            assert!(pro.iter().all(|c| enterprise.contains(c)));
        }
    }

    #[test]
    fn test_check_and_enforce() {
        let e = engine();
        let ctx = context("u1", "org-1", Role::Viewer, PlanTier::Pro);
        assert!(e.check(&ctx, Capability::ViewCalls).is_allowed());
        assert!(e.check(&ctx, Capability::EditCalls).is_denied());

        let err = e.enforce(&ctx, Capability::ExportData).unwrap_err();
        assert_eq!(err.code(), ErrorCode::Forbidden);
    }

    #[test]
    fn test_check_denies_stale_policy_version() {
        let ctx = context("u1", "org-1", Role::Viewer, PlanTier::Free);
        let mut table = PolicyTable::builtin();
        table.version = BUILTIN_POLICY_VERSION + 1;
        let bumped = PolicyEngine::new(table);

        assert!(engine().check(&ctx, Capability::ViewCalls).is_allowed());
        assert!(bumped.check(&ctx, Capability::ViewCalls).is_denied());
    }

    #[test]
    fn test_custom_table_replaces_builtin() {
        let table = PolicyTable::new(7)
            .with_role_grant(PredefinedRole::Viewer, CapabilitySet::all())
            .with_plan_entitlement(PlanTier::Free, CapabilitySet::from([Capability::ViewAudit]));
        let e = PolicyEngine::new(table);
        assert_eq!(e.version(), 7);
        assert_eq!(
            e.resolve_capabilities(&Role::Viewer, PlanTier::Free),
            CapabilitySet::from([Capability::ViewAudit])
        );
        assert!(e.resolve_capabilities(&Role::Owner, PlanTier::Free).is_empty());
    }

    #[test]
    fn test_matrix_covers_every_role_and_plan() {
        let rows = engine().matrix();
        assert_eq!(rows.len(), PredefinedRole::all().len() * PlanTier::all().len());
        let owner_enterprise = rows
            .iter()
            .find(|r| r.role == "owner" && r.plan == PlanTier::Enterprise)
            .unwrap();
        assert_eq!(owner_enterprise.capabilities, CapabilitySet::all());
    }
}
