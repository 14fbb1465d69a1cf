//! Predefined roles and their capability grants.
//!
//! | Role    | Description                                              |
//! |---------|----------------------------------------------------------|
//! | Owner   | Everything, including billing                            |
//! | Admin   | Everything except billing                                |
//! | Agent   | Works calls: view, edit, record, transcribe, translate   |
//! | Viewer  | Read-only access to calls                                |

use super::capability::{Capability, CapabilitySet};
use super::models::Role;

/// Roles the policy knows how to grant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PredefinedRole {
    Owner,
    Admin,
    Agent,
    Viewer,
}

impl PredefinedRole {
    /// Get the role identifier string.
    pub fn id(&self) -> &'static str {
        match self {
            Self::Owner => "owner",
            Self::Admin => "admin",
            Self::Agent => "agent",
            Self::Viewer => "viewer",
        }
    }

    /// Get the human-readable name.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Owner => "Owner",
            Self::Admin => "Admin",
            Self::Agent => "Agent",
            Self::Viewer => "Viewer",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Self::Owner => "Full access including billing",
            Self::Admin => "Manage users, calls and audit; no billing",
            Self::Agent => "Handle and annotate calls",
            Self::Viewer => "Read-only access to calls",
        }
    }

    /// Capabilities this role grants before plan entitlements apply.
    ///
    /// Every grant is listed explicitly so that adding a capability never
    /// widens an existing role by accident.
    pub fn capabilities(&self) -> CapabilitySet {
        use Capability::*;
        match self {
            Self::Owner => CapabilitySet::from([
                ManageBilling,
                ManageUsers,
                ViewCalls,
                EditCalls,
                ExportData,
                ViewAudit,
                Record,
                Transcribe,
                Translate,
                Survey,
                SyntheticCaller,
            ]),
            Self::Admin => CapabilitySet::from([
                ManageUsers,
                ViewCalls,
                EditCalls,
                ExportData,
                ViewAudit,
                Record,
                Transcribe,
                Translate,
                Survey,
                SyntheticCaller,
            ]),
            Self::Agent => CapabilitySet::from([ViewCalls, EditCalls, Record, Transcribe, Translate]),
            Self::Viewer => CapabilitySet::from([ViewCalls]),
        }
    }

    pub fn from_role(role: &Role) -> Option<Self> {
        match role {
            Role::Owner => Some(Self::Owner),
            Role::Admin => Some(Self::Admin),
            Role::Agent => Some(Self::Agent),
            Role::Viewer => Some(Self::Viewer),
            Role::Unrecognized(_) => None,
        }
    }

    pub fn as_role(&self) -> Role {
        match self {
            Self::Owner => Role::Owner,
            Self::Admin => Role::Admin,
            Self::Agent => Role::Agent,
            Self::Viewer => Role::Viewer,
        }
    }

    /// All predefined roles, most privileged first.
    pub fn all() -> [PredefinedRole; 4] {
        [Self::Owner, Self::Admin, Self::Agent, Self::Viewer]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_owner_has_every_capability() {
        assert_eq!(PredefinedRole::Owner.capabilities(), CapabilitySet::all());
    }

    #[test]
    fn test_admin_lacks_only_billing() {
        let admin = PredefinedRole::Admin.capabilities();
        assert!(!admin.contains(Capability::ManageBilling));
        assert_eq!(admin.len(), Capability::ALL.len() - 1);
    }

    #[test]
    fn test_viewer_is_read_only() {
        let viewer = PredefinedRole::Viewer.capabilities();
        assert_eq!(viewer, CapabilitySet::from([Capability::ViewCalls]));
    }

    #[test]
    fn test_roles_are_strictly_ordered_by_privilege() {
        let roles = PredefinedRole::all();
        for pair in roles.windows(2) {
            let higher = pair[0].capabilities();
            let lower = pair[1].capabilities();
            assert!(lower.iter().all(|c| higher.contains(c)));
            assert!(higher.len() > lower.len());
        }
    }

    #[test]
    fn test_role_mapping() {
        for role in PredefinedRole::all() {
            assert_eq!(PredefinedRole::from_role(&role.as_role()), Some(role));
        }
        assert_eq!(PredefinedRole::from_role(&Role::parse("janitor")), None);
    }
}
