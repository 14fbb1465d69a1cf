//! PostgreSQL directory: organizations and memberships.
//!
//! These tables sit outside row-level security. They are read before any
//! tenant context exists, and every query here is keyed by the explicit
//! organization id the caller asked for.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tracing::info;

use crate::error::{CallMonitorError, ErrorCode, Result};
use crate::rbac::models::{Membership, Organization, OrganizationId, PlanTier, Role, UserId};
use crate::rbac::store::{
    last_owner, membership_not_found, organization_unavailable, DirectoryAdmin, MembershipStore,
    OrganizationStore,
};

#[derive(Debug, sqlx::FromRow)]
struct MembershipRow {
    user_id: String,
    organization_id: String,
    role: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<MembershipRow> for Membership {
    fn from(row: MembershipRow) -> Self {
        Self {
            user_id: UserId(row.user_id),
            organization_id: OrganizationId(row.organization_id),
            role: Role::parse(&row.role),
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

/// Directory backed by the `organizations` and `memberships` tables.
#[derive(Clone)]
pub struct PgDirectory {
    pool: PgPool,
}

impl PgDirectory {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MembershipStore for PgDirectory {
    async fn lookup(
        &self,
        user_id: &UserId,
        organization_id: &OrganizationId,
    ) -> Result<Option<Membership>> {
        let row = sqlx::query_as::<_, MembershipRow>(
            r#"
            SELECT user_id, organization_id, role, created_at, updated_at
            FROM memberships
            WHERE user_id = $1 AND organization_id = $2
            "#,
        )
        .bind(user_id.as_str())
        .bind(organization_id.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(lookup_failed)?;

        Ok(row.map(Membership::from))
    }

    async fn lookup_user(&self, user_id: &UserId) -> Result<Option<Membership>> {
        let row = sqlx::query_as::<_, MembershipRow>(
            r#"
            SELECT user_id, organization_id, role, created_at, updated_at
            FROM memberships
            WHERE user_id = $1
            ORDER BY created_at ASC, organization_id ASC
            LIMIT 1
            "#,
        )
        .bind(user_id.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(lookup_failed)?;

        Ok(row.map(Membership::from))
    }
}

/// Any storage failure during a membership read, kept apart from "no row".
fn lookup_failed(err: sqlx::Error) -> CallMonitorError {
    CallMonitorError::membership_lookup_failed(err.to_string())
}

#[async_trait]
impl OrganizationStore for PgDirectory {
    async fn get_plan(&self, organization_id: &OrganizationId) -> Result<Option<PlanTier>> {
        let plan: Option<String> = sqlx::query_scalar(
            "SELECT plan FROM organizations WHERE id = $1 AND archived_at IS NULL",
        )
        .bind(organization_id.as_str())
        .fetch_optional(&self.pool)
        .await?;

        Ok(plan.as_deref().map(PlanTier::parse))
    }
}

#[async_trait]
impl DirectoryAdmin for PgDirectory {
    async fn create_organization(
        &self,
        organization: Organization,
        owner: &UserId,
    ) -> Result<Organization> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO organizations (id, name, plan, created_at, archived_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(organization.id.as_str())
        .bind(&organization.name)
        .bind(organization.plan.as_str())
        .bind(organization.created_at)
        .bind(organization.archived_at)
        .execute(&mut *tx)
        .await?;

        let owner_membership = Membership::new(owner.clone(), organization.id.clone(), Role::Owner);
        insert_membership(&mut tx, &owner_membership).await?;

        tx.commit().await?;
        info!(organization_id = %organization.id, owner = %owner, "Organization created");
        Ok(organization)
    }

    async fn set_plan(&self, organization_id: &OrganizationId, plan: PlanTier) -> Result<()> {
        let result = sqlx::query("UPDATE organizations SET plan = $2 WHERE id = $1")
            .bind(organization_id.as_str())
            .bind(plan.as_str())
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(organization_unavailable(organization_id));
        }
        Ok(())
    }

    async fn archive_organization(&self, organization_id: &OrganizationId) -> Result<()> {
        let result = sqlx::query(
            "UPDATE organizations SET archived_at = COALESCE(archived_at, NOW()) WHERE id = $1",
        )
        .bind(organization_id.as_str())
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(organization_unavailable(organization_id));
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
        let mut tx = self.pool.begin().await?;

        let active: Option<bool> = sqlx::query_scalar(
            "SELECT archived_at IS NULL FROM organizations WHERE id = $1 FOR SHARE",
        )
        .bind(organization_id.as_str())
        .fetch_optional(&mut *tx)
        .await?;
        if active != Some(true) {
            return Err(organization_unavailable(organization_id));
        }

        let membership = Membership::new(user_id.clone(), organization_id.clone(), role);
        insert_membership(&mut tx, &membership).await.map_err(|e| {
            if e.code() == ErrorCode::DuplicateRecord {
                CallMonitorError::new(
                    ErrorCode::DuplicateRecord,
                    "User is already a member of this organization",
                )
            } else {
                e
            }
        })?;

        tx.commit().await?;
        info!(user_id = %user_id, organization_id = %organization_id, role = %membership.role, "Invite accepted");
        Ok(membership)
    }

    async fn change_role(
        &self,
        user_id: &UserId,
        organization_id: &OrganizationId,
        role: Role,
    ) -> Result<Membership> {
        let mut tx = self.pool.begin().await?;
        if role != Role::Owner {
            ensure_other_owner(&mut tx, user_id, organization_id).await?;
        }

        let row = sqlx::query_as::<_, MembershipRow>(
            r#"
            UPDATE memberships
            SET role = $3, updated_at = NOW()
            WHERE user_id = $1 AND organization_id = $2
            RETURNING user_id, organization_id, role, created_at, updated_at
            "#,
        )
        .bind(user_id.as_str())
        .bind(organization_id.as_str())
        .bind(role.as_str())
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| membership_not_found(user_id, organization_id))?;

        tx.commit().await?;
        info!(user_id = %user_id, organization_id = %organization_id, role = %row.role, "Role changed");
        Ok(row.into())
    }

    async fn offboard(&self, user_id: &UserId, organization_id: &OrganizationId) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        ensure_other_owner(&mut tx, user_id, organization_id).await?;

        let result = sqlx::query("DELETE FROM memberships WHERE user_id = $1 AND organization_id = $2")
            .bind(user_id.as_str())
            .bind(organization_id.as_str())
            .execute(&mut *tx)
            .await?;
        if result.rows_affected() == 0 {
            return Err(membership_not_found(user_id, organization_id));
        }
        tx.commit().await?;
        info!(user_id = %user_id, organization_id = %organization_id, "Member offboarded");
        Ok(())
    }
}

/// Locks the organization's owner rows for the rest of the transaction,
/// so two concurrent demotions cannot both pass.
async fn ensure_other_owner(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    user_id: &UserId,
    organization_id: &OrganizationId,
) -> Result<()> {
    let owners: Vec<String> = sqlx::query_scalar(
        "SELECT user_id FROM memberships WHERE organization_id = $1 AND role = $2 FOR UPDATE",
    )
    .bind(organization_id.as_str())
    .bind(Role::Owner.as_str())
    .fetch_all(&mut **tx)
    .await?;
    if sole_owner(&owners, user_id) {
        return Err(last_owner(organization_id));
    }
    Ok(())
}

fn sole_owner(owners: &[String], user_id: &UserId) -> bool {
    owners.len() == 1 && owners[0] == user_id.as_str()
}

async fn insert_membership(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    membership: &Membership,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO memberships (user_id, organization_id, role, created_at, updated_at)
        VALUES ($1, $2, $3, $4, $5)
        "#,
    )
    .bind(membership.user_id.as_str())
    .bind(membership.organization_id.as_str())
    .bind(membership.role.as_str())
    .bind(membership.created_at)
    .bind(membership.updated_at)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(role: &str) -> MembershipRow {
        MembershipRow {
            user_id: "u1".into(),
            organization_id: "org-a".into(),
            role: role.into(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_membership_row_maps_role() {
        let membership = Membership::from(row("admin"));
        assert_eq!(membership.role, Role::Admin);
        assert_eq!(membership.user_id.as_str(), "u1");
        assert_eq!(membership.organization_id.as_str(), "org-a");
    }

    #[test]
    fn test_unknown_role_stays_unrecognized() {
        let membership = Membership::from(row("superuser"));
        assert_eq!(membership.role, Role::Unrecognized("superuser".into()));
    }

    #[test]
    fn test_sole_owner() {
        let user = UserId::new("u1");
        assert!(sole_owner(&["u1".to_string()], &user));
        assert!(!sole_owner(&["u1".to_string(), "u2".to_string()], &user));
        assert!(!sole_owner(&["u2".to_string()], &user));
        assert!(!sole_owner(&[], &user));
    }
}
