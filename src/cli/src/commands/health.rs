//! Health check command.
//!
//! Queries `/health`, and optionally `/metrics` for the access counters.

use anyhow::Result;
use clap::Args;

use crate::client::ApiClient;
use crate::output::{self, OutputFormat};

#[derive(Args)]
pub struct HealthArgs {
    /// Also print the server's access metrics
    #[arg(short, long)]
    detailed: bool,
}

/// Metric families relevant to access control.
const ACCESS_METRIC_PREFIXES: [&str; 5] = [
    "callmonitor_rbac_",
    "callmonitor_auth_",
    "callmonitor_policy_",
    "callmonitor_data_scopes_",
    "callmonitor_security_",
];

pub async fn execute(args: HealthArgs, client: &ApiClient, format: OutputFormat) -> Result<()> {
    let health: serde_json::Value = client.get_raw("/health").await?;

    match format {
        OutputFormat::Table => {
            let status = health
                .get("status")
                .and_then(|v| v.as_str())
                .unwrap_or("unknown");

            output::print_header("Server Health");
            output::print_detail("Status", status);
            output::print_detail("API URL", client.base_url());

            if let Some(version) = health.get("version").and_then(|v| v.as_str()) {
                output::print_detail("Version", version);
            }
            if let Some(ts) = health.get("timestamp").and_then(|v| v.as_str()) {
                output::print_detail("Timestamp", ts);
            }

            if args.detailed {
                let metrics = client.get_text("/metrics").await?;
                output::print_header("Access Metrics");
                for line in access_metric_lines(&metrics) {
                    println!("  {}", line);
                }
            }

            if status == "healthy" {
                output::print_success("Server is healthy");
            } else {
                output::print_error(&format!("Server status: {}", status));
            }
            Ok(())
        }
        _ => output::print_item(&health, format),
    }
}

fn access_metric_lines(exposition: &str) -> impl Iterator<Item = &str> {
    exposition.lines().filter(|line| {
        !line.starts_with('#') && ACCESS_METRIC_PREFIXES.iter().any(|p| line.starts_with(p))
    })
}
