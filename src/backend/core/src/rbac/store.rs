//! Membership and organization stores.
//!
//! The resolver only reads through [`MembershipStore`] and
//! [`OrganizationStore`]; membership lifecycle changes go through
//! [`DirectoryAdmin`]. [`InMemoryDirectory`] implements all three and
//! backs tests and local runs. The PostgreSQL implementation lives in
//! `crate::db::directory`.

use async_trait::async_trait;
use chrono::Utc;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tracing::{debug, info};

use super::models::{Membership, Organization, OrganizationId, PlanTier, Role, UserId};
use crate::error::{CallMonitorError, ErrorCode, Result};

// ═══════════════════════════════════════════════════════════════════════════════
// Collaborator traits
// ═══════════════════════════════════════════════════════════════════════════════

/// Read access to memberships.
///
/// A missing membership is `Ok(None)`; `Err` means the lookup itself failed.
#[async_trait]
pub trait MembershipStore: Send + Sync {
    async fn lookup(
        &self,
        user_id: &UserId,
        organization_id: &OrganizationId,
    ) -> Result<Option<Membership>>;

    /// The user's earliest membership. Used to suggest a default
    /// organization, never to choose what a request resolves against.
    async fn lookup_user(&self, user_id: &UserId) -> Result<Option<Membership>>;
}

/// Read access to organization plans.
#[async_trait]
pub trait OrganizationStore: Send + Sync {
    /// `None` for organizations that do not exist or are archived.
    async fn get_plan(&self, organization_id: &OrganizationId) -> Result<Option<PlanTier>>;
}

/// Organization and membership lifecycle.
///
/// Every organization keeps at least one owner: demoting or offboarding
/// the last one fails.
#[async_trait]
pub trait DirectoryAdmin: MembershipStore {
    /// Create an organization with `owner` as its first member.
    async fn create_organization(
        &self,
        organization: Organization,
        owner: &UserId,
    ) -> Result<Organization>;

    async fn set_plan(&self, organization_id: &OrganizationId, plan: PlanTier) -> Result<()>;

    /// Soft-archive. Records stay, access stops.
    async fn archive_organization(&self, organization_id: &OrganizationId) -> Result<()>;

    async fn accept_invite(
        &self,
        user_id: &UserId,
        organization_id: &OrganizationId,
        role: Role,
    ) -> Result<Membership>;

    async fn change_role(
        &self,
        user_id: &UserId,
        organization_id: &OrganizationId,
        role: Role,
    ) -> Result<Membership>;

    /// Remove the membership. Audit rows attributed to the user remain.
    async fn offboard(&self, user_id: &UserId, organization_id: &OrganizationId) -> Result<()>;
}

pub(crate) fn membership_not_found(user_id: &UserId, organization_id: &OrganizationId) -> CallMonitorError {
    CallMonitorError::not_found("membership", format!("{}@{}", user_id, organization_id))
}

pub(crate) fn organization_unavailable(organization_id: &OrganizationId) -> CallMonitorError {
    CallMonitorError::not_found("organization", organization_id.as_str())
}

pub(crate) fn last_owner(organization_id: &OrganizationId) -> CallMonitorError {
    CallMonitorError::validation("An organization must keep at least one owner")
        .with_context("organization_id", organization_id)
}

// ═══════════════════════════════════════════════════════════════════════════════
// In-memory directory
// ═══════════════════════════════════════════════════════════════════════════════

/// DashMap-backed directory.
#[derive(Debug, Default)]
pub struct InMemoryDirectory {
    organizations: DashMap<OrganizationId, Organization>,
    memberships: DashMap<(UserId, OrganizationId), Membership>,
}

impl InMemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a membership directly, bypassing the organization checks.
    /// Lets tests reproduce rows written by older deployments.
    pub fn insert_membership(&self, membership: Membership) {
        self.memberships.insert(
            (membership.user_id.clone(), membership.organization_id.clone()),
            membership,
        );
    }

    pub fn organization(&self, organization_id: &OrganizationId) -> Option<Organization> {
        self.organizations.get(organization_id).map(|o| o.clone())
    }

    /// Fails if `user_id` is the organization's only owner and would stop
    /// being one.
    fn ensure_other_owner(&self, user_id: &UserId, organization_id: &OrganizationId) -> Result<()> {
        let is_owner = self
            .memberships
            .get(&(user_id.clone(), organization_id.clone()))
            .map(|m| m.role == Role::Owner)
            .unwrap_or(false);
        if !is_owner {
            return Ok(());
        }
        let owners = self
            .memberships
            .iter()
            .filter(|m| &m.organization_id == organization_id && m.role == Role::Owner)
            .count();
        if owners <= 1 {
            return Err(last_owner(organization_id));
        }
        Ok(())
    }

    fn is_active(&self, organization_id: &OrganizationId) -> bool {
        self.organizations
            .get(organization_id)
            .map(|o| !o.is_archived())
            .unwrap_or(false)
    }
}

#[async_trait]
impl MembershipStore for InMemoryDirectory {
    async fn lookup(
        &self,
        user_id: &UserId,
        organization_id: &OrganizationId,
    ) -> Result<Option<Membership>> {
        Ok(self
            .memberships
            .get(&(user_id.clone(), organization_id.clone()))
            .map(|m| m.clone()))
    }

    async fn lookup_user(&self, user_id: &UserId) -> Result<Option<Membership>> {
        Ok(self
            .memberships
            .iter()
            .filter(|entry| &entry.user_id == user_id)
            .map(|entry| entry.value().clone())
            .min_by(|a, b| {
                a.created_at
                    .cmp(&b.created_at)
                    .then_with(|| a.organization_id.cmp(&b.organization_id))
            }))
    }
}

#[async_trait]
impl OrganizationStore for InMemoryDirectory {
    async fn get_plan(&self, organization_id: &OrganizationId) -> Result<Option<PlanTier>> {
        Ok(self
            .organizations
            .get(organization_id)
            .filter(|o| !o.is_archived())
            .map(|o| o.plan))
    }
}

#[async_trait]
impl DirectoryAdmin for InMemoryDirectory {
    async fn create_organization(
        &self,
        organization: Organization,
        owner: &UserId,
    ) -> Result<Organization> {
        match self.organizations.entry(organization.id.clone()) {
            Entry::Occupied(_) => {
                return Err(CallMonitorError::new(
                    ErrorCode::DuplicateRecord,
                    format!("Organization already exists: {}", organization.id),
                ))
            }
            Entry::Vacant(slot) => {
                slot.insert(organization.clone());
            }
        }
        self.insert_membership(Membership::new(
            owner.clone(),
            organization.id.clone(),
            Role::Owner,
        ));
        info!(organization_id = %organization.id, owner = %owner, "Organization created");
        Ok(organization)
    }

    async fn set_plan(&self, organization_id: &OrganizationId, plan: PlanTier) -> Result<()> {
        let mut org = self
            .organizations
            .get_mut(organization_id)
            .ok_or_else(|| organization_unavailable(organization_id))?;
        org.plan = plan;
        debug!(organization_id = %organization_id, plan = %plan, "Plan updated");
        Ok(())
    }

    async fn archive_organization(&self, organization_id: &OrganizationId) -> Result<()> {
        let mut org = self
            .organizations
            .get_mut(organization_id)
            .ok_or_else(|| organization_unavailable(organization_id))?;
        if org.archived_at.is_none() {
            org.archived_at = Some(Utc::now());
        }
        info!(organization_id = %organization_id, "Organization archived");
        Ok(())
    }

    async fn accept_invite(
        &self,
        user_id: &UserId,
        organization_id: &OrganizationId,
        role: Role,
    ) -> Result<Membership> {
        if !self.is_active(organization_id) {
            return Err(organization_unavailable(organization_id));
        }
        match self.memberships.entry((user_id.clone(), organization_id.clone())) {
            Entry::Occupied(_) => Err(CallMonitorError::new(
                ErrorCode::DuplicateRecord,
                "User is already a member of this organization",
            )),
            Entry::Vacant(slot) => {
                let membership = Membership::new(user_id.clone(), organization_id.clone(), role);
                slot.insert(membership.clone());
                info!(user_id = %user_id, organization_id = %organization_id, role = %membership.role, "Invite accepted");
                Ok(membership)
            }
        }
    }

    async fn change_role(
        &self,
        user_id: &UserId,
        organization_id: &OrganizationId,
        role: Role,
    ) -> Result<Membership> {
        if role != Role::Owner {
            self.ensure_other_owner(user_id, organization_id)?;
        }
        let mut membership = self
            .memberships
            .get_mut(&(user_id.clone(), organization_id.clone()))
            .ok_or_else(|| membership_not_found(user_id, organization_id))?;
        membership.role = role;
        membership.updated_at = Utc::now();
        info!(user_id = %user_id, organization_id = %organization_id, role = %membership.role, "Role changed");
        Ok(membership.clone())
    }

    async fn offboard(&self, user_id: &UserId, organization_id: &OrganizationId) -> Result<()> {
        self.ensure_other_owner(user_id, organization_id)?;
        self.memberships
            .remove(&(user_id.clone(), organization_id.clone()))
            .ok_or_else(|| membership_not_found(user_id, organization_id))?;
        info!(user_id = %user_id, organization_id = %organization_id, "Member offboarded");
        Ok(())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;

    async fn directory_with_org(org: &str, plan: PlanTier) -> InMemoryDirectory {
        let dir = InMemoryDirectory::new();
        dir.create_organization(
            Organization::new(OrganizationId::new(org), "Acme", plan),
            &UserId::new("owner"),
        )
        .await
        .unwrap();
        dir
    }

    #[tokio::test]
    async fn test_create_organization_makes_owner() {
        let dir = directory_with_org("org-1", PlanTier::Pro).await;
        let m = dir
            .lookup(&UserId::new("owner"), &OrganizationId::new("org-1"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(m.role, Role::Owner);
        assert_eq!(
            dir.get_plan(&OrganizationId::new("org-1")).await.unwrap(),
            Some(PlanTier::Pro)
        );
    }

    #[tokio::test]
    async fn test_duplicate_organization_rejected() {
        let dir = directory_with_org("org-1", PlanTier::Free).await;
        let err = dir
            .create_organization(
                Organization::new(OrganizationId::new("org-1"), "Again", PlanTier::Free),
                &UserId::new("someone"),
            )
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::DuplicateRecord);
    }

    #[tokio::test]
    async fn test_accept_invite_lifecycle() {
        let dir = directory_with_org("org-1", PlanTier::Free).await;
        let user = UserId::new("u2");
        let org = OrganizationId::new("org-1");

        dir.accept_invite(&user, &org, Role::Agent).await.unwrap();
        let dup = dir.accept_invite(&user, &org, Role::Viewer).await.unwrap_err();
        assert_eq!(dup.code(), ErrorCode::DuplicateRecord);

        let changed = dir.change_role(&user, &org, Role::Viewer).await.unwrap();
        assert_eq!(changed.role, Role::Viewer);

        dir.offboard(&user, &org).await.unwrap();
        assert!(dir.lookup(&user, &org).await.unwrap().is_none());
        assert_eq!(
            dir.offboard(&user, &org).await.unwrap_err().code(),
            ErrorCode::RecordNotFound
        );
    }

    #[tokio::test]
    async fn test_last_owner_cannot_be_demoted_or_removed() {
        let dir = directory_with_org("org-1", PlanTier::Free).await;
        let owner = UserId::new("owner");
        let org = OrganizationId::new("org-1");

        let demote = dir.change_role(&owner, &org, Role::Admin).await.unwrap_err();
        assert_eq!(demote.code(), ErrorCode::ValidationError);
        let remove = dir.offboard(&owner, &org).await.unwrap_err();
        assert_eq!(remove.code(), ErrorCode::ValidationError);
        assert!(dir.change_role(&owner, &org, Role::Owner).await.is_ok());

        let second = UserId::new("u2");
        dir.accept_invite(&second, &org, Role::Owner).await.unwrap();
        dir.change_role(&owner, &org, Role::Viewer).await.unwrap();
        assert_eq!(
            dir.offboard(&second, &org).await.unwrap_err().code(),
            ErrorCode::ValidationError
        );
    }

    #[tokio::test]
    async fn test_invite_into_missing_or_archived_org_fails() {
        let dir = directory_with_org("org-1", PlanTier::Free).await;
        let user = UserId::new("u2");

        let missing = dir
            .accept_invite(&user, &OrganizationId::new("nope"), Role::Agent)
            .await
            .unwrap_err();
        assert_eq!(missing.code(), ErrorCode::RecordNotFound);

        dir.archive_organization(&OrganizationId::new("org-1")).await.unwrap();
        assert!(dir
            .accept_invite(&user, &OrganizationId::new("org-1"), Role::Agent)
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_archived_org_has_no_plan() {
        let dir = directory_with_org("org-1", PlanTier::Enterprise).await;
        let org = OrganizationId::new("org-1");
        dir.archive_organization(&org).await.unwrap();
        assert_eq!(dir.get_plan(&org).await.unwrap(), None);
        assert!(dir.organization(&org).unwrap().is_archived());
    }

    #[tokio::test]
    async fn test_lookup_user_returns_earliest_membership() {
        let dir = InMemoryDirectory::new();
        let user = UserId::new("u1");
        let mut later = Membership::new(user.clone(), OrganizationId::new("org-b"), Role::Agent);
        let earlier = Membership::new(user.clone(), OrganizationId::new("org-c"), Role::Viewer);
        later.created_at = earlier.created_at + chrono::Duration::seconds(10);
        dir.insert_membership(later);
        dir.insert_membership(earlier);

        let first = dir.lookup_user(&user).await.unwrap().unwrap();
        assert_eq!(first.organization_id.as_str(), "org-c");
        assert!(dir.lookup_user(&UserId::new("ghost")).await.unwrap().is_none());
    }
}
