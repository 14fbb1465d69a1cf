//! Access context commands.
//!
//! Shows the caller's resolved role, plan, and capabilities, and the
//! role × plan policy grid.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use tabled::Tabled;

use crate::client::ApiClient;
use crate::output::{self, OutputFormat};

#[derive(Debug, Deserialize, Serialize)]
struct ContextResponse {
    role: String,
    plan: String,
    organization_id: String,
}

#[derive(Debug, Deserialize, Serialize)]
struct CallCapabilities {
    record: bool,
    transcribe: bool,
    translate: bool,
    survey: bool,
    synthetic_caller: bool,
}

#[derive(Debug, Deserialize)]
struct CapabilitiesResponse {
    capabilities: CallCapabilities,
}

#[derive(Debug, Deserialize, Serialize)]
struct PolicyResponse {
    version: u32,
    matrix: Vec<MatrixRow>,
}

#[derive(Debug, Deserialize, Serialize)]
struct MatrixRow {
    role: String,
    plan: String,
    capabilities: Vec<String>,
}

#[derive(Tabled, Serialize)]
struct MatrixTableRow {
    #[tabled(rename = "Role")]
    role: String,
    #[tabled(rename = "Plan")]
    plan: String,
    #[tabled(rename = "Capabilities")]
    capabilities: String,
}

/// `cmctl context`
pub async fn context(client: &ApiClient, format: OutputFormat) -> Result<()> {
    let raw = client.get_raw("/api/v1/rbac/context").await?;
    let ctx: ContextResponse = serde_json::from_value(raw)?;

    match format {
        OutputFormat::Table => {
            output::print_header("Access Context");
            output::print_detail("Organization", &ctx.organization_id);
            output::print_detail("Role", &ctx.role);
            output::print_detail("Plan", &ctx.plan);
            Ok(())
        }
        _ => output::print_item(&ctx, format),
    }
}

/// `cmctl capabilities`
pub async fn capabilities(client: &ApiClient, format: OutputFormat) -> Result<()> {
    let raw = client.get_raw("/api/v1/call-capabilities").await?;
    let caps = serde_json::from_value::<CapabilitiesResponse>(raw)?.capabilities;

    match format {
        OutputFormat::Table => {
            output::print_header("Call Capabilities");
            for (name, enabled) in [
                ("record", caps.record),
                ("transcribe", caps.transcribe),
                ("translate", caps.translate),
                ("survey", caps.survey),
                ("synthetic_caller", caps.synthetic_caller),
            ] {
                println!("  {:<18} {}", name, output::flag(enabled));
            }
            Ok(())
        }
        _ => output::print_item(&caps, format),
    }
}

/// `cmctl policy`
pub async fn policy(client: &ApiClient, format: OutputFormat) -> Result<()> {
    let policy: PolicyResponse = client.get("/api/v1/rbac/policy").await?;

    match format {
        OutputFormat::Table => {
            output::print_info(&format!("Policy version {}", policy.version));
            let rows: Vec<MatrixTableRow> = policy
                .matrix
                .into_iter()
                .map(|row| MatrixTableRow {
                    role: row.role,
                    plan: row.plan,
                    capabilities: if row.capabilities.is_empty() {
                        "-".to_string()
                    } else {
                        row.capabilities.join(", ")
                    },
                })
                .collect();
            output::print_list(&rows, format)
        }
        _ => output::print_item(&policy, format),
    }
}

/// `cmctl default-org`
pub async fn default_organization(client: &ApiClient, format: OutputFormat) -> Result<()> {
    let value: serde_json::Value = client.get("/api/v1/rbac/default-organization").await?;
    match format {
        OutputFormat::Table => {
            match value.get("organization_id").and_then(|v| v.as_str()) {
                Some(org) => println!("{}", org),
                None => output::print_info("No organization memberships"),
            }
            Ok(())
        }
        _ => output::print_item(&value, format),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_policy_response_parses() {
        let body = serde_json::json!({
            "version": 1,
            "matrix": [
                {"role": "viewer", "plan": "free", "capabilities": ["view_calls"]},
                {"role": "agent", "plan": "enterprise", "capabilities": []}
            ]
        });
        let policy: PolicyResponse = serde_json::from_value(body).unwrap();
        assert_eq!(policy.matrix.len(), 2);
        assert!(policy.matrix[1].capabilities.is_empty());
    }
}
