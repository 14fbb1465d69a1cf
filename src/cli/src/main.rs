//! cmctl - command-line client for the CallMonitor access API.
//!
//! Inspects the caller's access context, works with call records, and
//! administers organizations and memberships.

mod client;
mod commands;
mod output;

use anyhow::Result;
use clap::{Parser, Subcommand};

use client::Session;
use commands::{access, calls, config, health, members};
use output::OutputFormat;

#[derive(Parser)]
#[command(
    name = "cmctl",
    version,
    about = "CallMonitor access control CLI",
    long_about = "Command-line client for CallMonitor: access context, call records, and organization administration.",
    propagate_version = true
)]
pub struct Cli {
    /// Output format
    #[arg(short, long, global = true, default_value = "table")]
    output: OutputFormat,

    /// API server URL
    #[arg(long, global = true, env = "CALLMONITOR_API_URL")]
    api_url: Option<String>,

    /// Bearer token
    #[arg(long, global = true, env = "CALLMONITOR_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// Organization to act in
    #[arg(long, global = true, env = "CALLMONITOR_ORG")]
    org: Option<String>,

    /// Disable colored output
    #[arg(long, global = true)]
    no_color: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show your role, plan, and organization
    Context,

    /// Show per-call feature flags
    Capabilities,

    /// Show the role × plan capability grid
    Policy,

    /// Show the organization used when none is given
    DefaultOrg,

    /// Call records
    #[command(subcommand)]
    Calls(calls::CallCommands),

    /// Organization administration
    #[command(subcommand)]
    Org(members::OrgCommands),

    /// Membership administration
    #[command(subcommand)]
    Members(members::MemberCommands),

    /// Check server health
    Health(health::HealthArgs),

    /// Configuration management
    #[command(subcommand)]
    Config(config::ConfigCommands),
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.no_color {
        colored::control::set_override(false);
    }

    let api_url = cli
        .api_url
        .clone()
        .or_else(|| config::load_value(config::API_URL))
        .unwrap_or_else(|| "http://localhost:8080".to_string());
    let session = Session {
        token: cli.token.clone().or_else(|| config::load_value(config::TOKEN)),
        organization: cli.org.clone().or_else(|| config::load_value(config::ORGANIZATION)),
    };

    let client = client::ApiClient::new(&api_url, session)?;
    let format = cli.output;

    let result = match cli.command {
        Commands::Context => access::context(&client, format).await,
        Commands::Capabilities => access::capabilities(&client, format).await,
        Commands::Policy => access::policy(&client, format).await,
        Commands::DefaultOrg => access::default_organization(&client, format).await,
        Commands::Calls(cmd) => calls::execute(cmd, &client, format).await,
        Commands::Org(cmd) => members::execute_org(cmd, &client, format).await,
        Commands::Members(cmd) => members::execute_members(cmd, &client, format).await,
        Commands::Health(args) => health::execute(args, &client, format).await,
        Commands::Config(cmd) => config::execute(cmd, format).await,
    };

    if let Err(e) = result {
        output::print_error(&format!("{:#}", e));
        std::process::exit(1);
    }

    Ok(())
}
