//! Configuration management commands.
//!
//! Stores the API URL, bearer token, and default organization in
//! `~/.callmonitor/config.toml`. Flags and environment variables take
//! precedence over stored values.

use anyhow::{Context, Result};
use clap::Subcommand;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::output::{self, OutputFormat};

pub const API_URL: &str = "api-url";
pub const TOKEN: &str = "token";
pub const ORGANIZATION: &str = "org";

const KNOWN_KEYS: [&str; 3] = [API_URL, TOKEN, ORGANIZATION];

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Set a configuration value (api-url, token, org)
    Set {
        /// Configuration key
        key: String,
        /// Value to set
        value: String,
    },

    /// Get a configuration value
    Get {
        /// Configuration key
        key: String,
    },

    /// Show all configuration
    Show,

    /// Reset configuration to defaults
    Reset {
        /// Skip confirmation
        #[arg(short, long)]
        force: bool,
    },
}

/// Persistent CLI configuration stored on disk.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct CliConfig {
    #[serde(default)]
    pub values: BTreeMap<String, String>,
}

impl CliConfig {
    /// Values safe to print. The token is masked.
    fn displayable(&self) -> BTreeMap<String, String> {
        self.values
            .iter()
            .map(|(k, v)| {
                let shown = if k == TOKEN { mask(v) } else { v.clone() };
                (k.clone(), shown)
            })
            .collect()
    }
}

fn mask(secret: &str) -> String {
    let visible: String = secret.chars().take(6).collect();
    format!("{}…", visible)
}

fn config_path() -> Result<PathBuf> {
    let home = dirs::home_dir().context("Could not determine home directory")?;
    Ok(home.join(".callmonitor").join("config.toml"))
}

fn load_config() -> Result<CliConfig> {
    let path = config_path()?;
    if !path.exists() {
        return Ok(CliConfig::default());
    }
    let content = std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    toml::from_str(&content).context("Failed to parse config file")
}

fn save_config(cfg: &CliConfig) -> Result<()> {
    let path = config_path()?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    let content = toml::to_string_pretty(cfg).context("Failed to serialize config")?;
    std::fs::write(&path, content)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(())
}

/// Load one stored value, if set.
pub fn load_value(key: &str) -> Option<String> {
    load_config()
        .ok()
        .and_then(|cfg| cfg.values.get(key).cloned())
}

pub async fn execute(cmd: ConfigCommands, format: OutputFormat) -> Result<()> {
    match cmd {
        ConfigCommands::Set { key, value } => {
            if !KNOWN_KEYS.contains(&key.as_str()) {
                anyhow::bail!("Unknown key '{}'; expected one of {}", key, KNOWN_KEYS.join(", "));
            }
            let mut cfg = load_config()?;
            let shown = if key == TOKEN { mask(&value) } else { value.clone() };
            cfg.values.insert(key.clone(), value);
            save_config(&cfg)?;

            match format {
                OutputFormat::Table => output::print_success(&format!("{} = {}", key, shown)),
                _ => output::print_item(&serde_json::json!({ "key": key, "value": shown }), format)?,
            }
        }

        ConfigCommands::Get { key } => {
            let cfg = load_config()?;
            match cfg.displayable().get(&key) {
                Some(value) => match format {
                    OutputFormat::Table => println!("{}", value),
                    _ => output::print_item(&serde_json::json!({ "key": key, "value": value }), format)?,
                },
                None => output::print_error(&format!("Key '{}' not found", key)),
            }
        }

        ConfigCommands::Show => {
            let cfg = load_config()?;

            if cfg.values.is_empty() {
                output::print_info("No configuration values set.");
                return Ok(());
            }

            match format {
                OutputFormat::Table => {
                    output::print_header("Configuration");
                    for (k, v) in &cfg.displayable() {
                        output::print_detail(k, v);
                    }
                }
                _ => output::print_item(&cfg.displayable(), format)?,
            }
        }

        ConfigCommands::Reset { force } => {
            if !force {
                output::print_info("This will reset all CLI configuration. Use --force to confirm.");
                return Ok(());
            }

            let path = config_path()?;
            if path.exists() {
                std::fs::remove_file(&path)
                    .with_context(|| format!("Failed to remove {}", path.display()))?;
            }

            output::print_success("Configuration reset to defaults");
        }
    }

    Ok(())
}
