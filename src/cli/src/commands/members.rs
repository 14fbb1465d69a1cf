//! Organization and membership administration.

use anyhow::Result;
use clap::Subcommand;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::client::ApiClient;
use crate::output::{self, OutputFormat};

#[derive(Subcommand)]
pub enum OrgCommands {
    /// Create an organization owned by the caller
    Create {
        /// Organization ID
        id: String,

        /// Display name
        name: String,

        /// free, pro, or enterprise
        #[arg(short, long)]
        plan: Option<String>,
    },

    /// Change the current organization's plan
    Plan {
        /// free, pro, or enterprise
        plan: String,
    },

    /// Archive the current organization
    Archive {
        /// Skip confirmation
        #[arg(short, long)]
        force: bool,
    },
}

#[derive(Subcommand)]
pub enum MemberCommands {
    /// Add a user to the current organization
    Add {
        /// User ID
        user_id: String,

        /// owner, admin, agent, or viewer
        #[arg(short, long, default_value = "agent")]
        role: String,
    },

    /// Change a member's role
    SetRole {
        /// User ID
        user_id: String,

        /// owner, admin, agent, or viewer
        role: String,
    },

    /// Remove a member from the current organization
    Remove {
        /// User ID
        user_id: String,
    },
}

#[derive(Debug, Deserialize, Serialize)]
struct MembershipInfo {
    user_id: String,
    organization_id: String,
    role: String,
}

pub async fn execute_org(cmd: OrgCommands, client: &ApiClient, format: OutputFormat) -> Result<()> {
    match cmd {
        OrgCommands::Create { id, name, plan } => {
            let org: serde_json::Value = client
                .post("/api/v1/organizations", &json!({ "id": id, "name": name, "plan": plan }))
                .await?;
            match format {
                OutputFormat::Table => {
                    output::print_success(&format!("Organization {} created", id));
                    Ok(())
                }
                _ => output::print_item(&org, format),
            }
        }

        OrgCommands::Plan { plan } => {
            let change: serde_json::Value = client
                .put("/api/v1/organization/plan", &json!({ "plan": plan }))
                .await?;
            match format {
                OutputFormat::Table => {
                    output::print_success(&format!("Plan changed to {}", plan));
                    Ok(())
                }
                _ => output::print_item(&change, format),
            }
        }

        OrgCommands::Archive { force } => {
            let org = client.organization().unwrap_or("(none)").to_string();
            if !force {
                output::print_info(&format!(
                    "This will archive organization {}. Use --force to confirm.",
                    org
                ));
                return Ok(());
            }
            client.delete("/api/v1/organization").await?;
            output::print_success(&format!("Organization {} archived", org));
            Ok(())
        }
    }
}

pub async fn execute_members(cmd: MemberCommands, client: &ApiClient, format: OutputFormat) -> Result<()> {
    match cmd {
        MemberCommands::Add { user_id, role } => {
            let membership: MembershipInfo = client
                .post(
                    "/api/v1/organization/members",
                    &json!({ "user_id": user_id, "role": role }),
                )
                .await?;
            print_membership(&membership, "added", format)
        }

        MemberCommands::SetRole { user_id, role } => {
            let membership: MembershipInfo = client
                .patch(
                    &format!("/api/v1/organization/members/{}", user_id),
                    &json!({ "role": role }),
                )
                .await?;
            print_membership(&membership, "updated", format)
        }

        MemberCommands::Remove { user_id } => {
            client
                .delete(&format!("/api/v1/organization/members/{}", user_id))
                .await?;
            output::print_success(&format!("{} removed", user_id));
            Ok(())
        }
    }
}

fn print_membership(membership: &MembershipInfo, verb: &str, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Table => {
            output::print_success(&format!(
                "{} {} as {} in {}",
                membership.user_id, verb, membership.role, membership.organization_id
            ));
            Ok(())
        }
        _ => output::print_item(membership, format),
    }
}
