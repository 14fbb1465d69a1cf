//! Resolves an identity and a requested organization into an [`RbacContext`].

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, instrument, warn};

use super::context::RbacContext;
use super::models::{Identity, OrganizationId};
use super::policy::PolicyEngine;
use super::store::{MembershipStore, OrganizationStore};
use crate::error::{CallMonitorError, ErrorCode, Result};
use crate::telemetry::{AccessMetrics, SensitiveFieldRedactor};

/// Default bound on each store lookup.
pub const DEFAULT_LOOKUP_TIMEOUT: Duration = Duration::from_secs(2);

/// Turns `(identity, organization)` into a context or a typed failure.
///
/// Holds no per-request state; one instance serves all requests
/// concurrently. Nothing is cached, so each call sees current memberships.
#[derive(Clone)]
pub struct RbacContextResolver {
    memberships: Arc<dyn MembershipStore>,
    organizations: Arc<dyn OrganizationStore>,
    policy: Arc<PolicyEngine>,
    lookup_timeout: Duration,
}

impl std::fmt::Debug for RbacContextResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RbacContextResolver")
            .field("policy_version", &self.policy.version())
            .field("lookup_timeout", &self.lookup_timeout)
            .finish()
    }
}

impl RbacContextResolver {
    pub fn new(
        memberships: Arc<dyn MembershipStore>,
        organizations: Arc<dyn OrganizationStore>,
        policy: Arc<PolicyEngine>,
    ) -> Self {
        Self {
            memberships,
            organizations,
            policy,
            lookup_timeout: DEFAULT_LOOKUP_TIMEOUT,
        }
    }

    pub fn with_lookup_timeout(mut self, lookup_timeout: Duration) -> Self {
        self.lookup_timeout = lookup_timeout;
        self
    }

    pub fn policy(&self) -> &Arc<PolicyEngine> {
        &self.policy
    }

    /// Resolve access for `identity` in the requested organization.
    ///
    /// Checks run in a fixed order: authentication, organization id,
    /// membership, plan. Store failures and timeouts arrive as
    /// `MembershipLookupFailed` and leave as `RbacError` with a generic
    /// message; the detail goes to the log.
    #[instrument(skip_all, fields(organization_id = organization_id.unwrap_or_default()))]
    pub async fn resolve(
        &self,
        identity: &Identity,
        organization_id: Option<&str>,
    ) -> Result<RbacContext> {
        let started = Instant::now();
        let outcome = self.resolve_inner(identity, organization_id).await;
        AccessMetrics::record_resolution(outcome_label(&outcome), started.elapsed());
        outcome
    }

    async fn resolve_inner(
        &self,
        identity: &Identity,
        organization_id: Option<&str>,
    ) -> Result<RbacContext> {
        let user = identity.user().ok_or_else(CallMonitorError::auth_required)?;
        let org = organization_id
            .and_then(OrganizationId::parse)
            .ok_or_else(CallMonitorError::org_required)?;
        if !org.is_well_formed() {
            debug!(user_id = %user.user_id(), "Rejected malformed organization id");
            return Err(CallMonitorError::unauthorized());
        }

        let membership = self
            .bounded("membership", self.memberships.lookup(user.user_id(), &org))
            .await?
            .ok_or_else(CallMonitorError::unauthorized)?;
        if membership.user_id != *user.user_id() || membership.organization_id != org {
            return Err(self.redacted_failure(
                "membership",
                format!(
                    "store returned membership for {}@{}",
                    membership.user_id, membership.organization_id
                ),
            ));
        }

        let plan = self
            .bounded("plan", self.organizations.get_plan(&org))
            .await?
            .ok_or_else(CallMonitorError::unauthorized)?;

        let capabilities = self.policy.resolve_capabilities(&membership.role, plan);
        debug!(
            user_id = %user.user_id(),
            role = %membership.role,
            plan = %plan,
            capabilities = capabilities.len(),
            "Access context resolved"
        );

        Ok(RbacContext::new(
            user.user_id().clone(),
            org,
            membership.role,
            plan,
            capabilities,
            self.policy.version(),
        ))
    }

    /// The organization a client should select when it has none yet.
    pub async fn default_organization(
        &self,
        identity: &Identity,
    ) -> Result<Option<OrganizationId>> {
        let user = identity.user().ok_or_else(CallMonitorError::auth_required)?;
        let membership = self
            .bounded("default organization", self.memberships.lookup_user(user.user_id()))
            .await?;
        Ok(membership.map(|m| m.organization_id))
    }

    /// Run one store lookup under the timeout, collapsing failures into
    /// `RbacError`.
    async fn bounded<T, F>(&self, what: &'static str, lookup: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        match tokio::time::timeout(self.lookup_timeout, lookup).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(err)) => {
                let detail = err
                    .internal_message()
                    .map(str::to_string)
                    .unwrap_or_else(|| err.to_string());
                Err(self.redacted_failure(what, format!("{} ({})", detail, err.code())))
            }
            Err(_) => Err(self.redacted_failure(
                what,
                format!(
                    "timed out after {:?} ({})",
                    self.lookup_timeout,
                    ErrorCode::MembershipLookupFailed
                ),
            )),
        }
    }

    fn redacted_failure(&self, what: &'static str, detail: String) -> CallMonitorError {
        let detail = SensitiveFieldRedactor::global().redact_value(&detail);
        warn!(lookup = what, detail = %detail, "Access context resolution failed");
        CallMonitorError::rbac_error(detail)
    }
}

fn outcome_label(outcome: &Result<RbacContext>) -> &'static str {
    match outcome {
        Ok(_) => "granted",
        Err(err) => match err.code() {
            ErrorCode::AuthRequired => "auth_required",
            ErrorCode::OrgRequired => "org_required",
            ErrorCode::Unauthorized => "unauthorized",
            _ => "rbac_error",
        },
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════
