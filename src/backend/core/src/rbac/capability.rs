//! Capabilities: the named actions a resolved context may be allowed to take.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

/// A single named capability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
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
}

impl Capability {
    pub const ALL: [Capability; 11] = [
        Self::ManageBilling,
        Self::ManageUsers,
        Self::ViewCalls,
        Self::EditCalls,
        Self::ExportData,
        Self::ViewAudit,
        Self::Record,
        Self::Transcribe,
        Self::Translate,
        Self::Survey,
        Self::SyntheticCaller,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ManageBilling => "manage_billing",
            Self::ManageUsers => "manage_users",
            Self::ViewCalls => "view_calls",
            Self::EditCalls => "edit_calls",
            Self::ExportData => "export_data",
            Self::ViewAudit => "view_audit",
            Self::Record => "record",
            Self::Transcribe => "transcribe",
            Self::Translate => "translate",
            Self::Survey => "survey",
            Self::SyntheticCaller => "synthetic_caller",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.as_str() == raw)
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Capability {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| format!("unknown capability: {}", s))
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Capability set
// ═══════════════════════════════════════════════════════════════════════════════

/// An ordered set of capabilities. Serializes as a sorted list.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CapabilitySet(BTreeSet<Capability>);

impl CapabilitySet {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn all() -> Self {
        Capability::ALL.into_iter().collect()
    }

    pub fn contains(&self, capability: Capability) -> bool {
        self.0.contains(&capability)
    }

    pub fn intersection(&self, other: &CapabilitySet) -> CapabilitySet {
        Self(self.0.intersection(&other.0).copied().collect())
    }

    pub fn union(&self, other: &CapabilitySet) -> CapabilitySet {
        Self(self.0.union(&other.0).copied().collect())
    }

    pub fn without(mut self, capability: Capability) -> Self {
        self.0.remove(&capability);
        self
    }

    pub fn iter(&self) -> impl Iterator<Item = Capability> + '_ {
        self.0.iter().copied()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<Capability> for CapabilitySet {
    fn from_iter<I: IntoIterator<Item = Capability>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl<const N: usize> From<[Capability; N]> for CapabilitySet {
    fn from(caps: [Capability; N]) -> Self {
        caps.into_iter().collect()
    }
}

/// The per-call feature flags clients use to enable UI controls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallCapabilities {
    pub record: bool,
    pub transcribe: bool,
    pub translate: bool,
    pub survey: bool,
    pub synthetic_caller: bool,
}

impl From<&CapabilitySet> for CallCapabilities {
    fn from(set: &CapabilitySet) -> Self {
        Self {
            record: set.contains(Capability::Record),
            transcribe: set.contains(Capability::Transcribe),
            translate: set.contains(Capability::Translate),
            survey: set.contains(Capability::Survey),
            synthetic_caller: set.contains(Capability::SyntheticCaller),
        }
    }
}
