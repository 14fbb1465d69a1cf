//! Call record commands.
//!
//! Calls are append-only: besides lifecycle updates, corrections are made
//! by superseding a record and context is added through notes.

use anyhow::Result;
use chrono::{DateTime, Utc};
use clap::Subcommand;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tabled::Tabled;
use uuid::Uuid;

use crate::client::ApiClient;
use crate::output::{self, OutputFormat};

#[derive(Subcommand)]
pub enum CallCommands {
    /// List calls in the current organization
    List,

    /// Show one call
    Show {
        /// Call ID
        call_id: Uuid,
    },

    /// Record a new call
    Create {
        /// Caller phone number
        phone_number: String,

        /// Initial notes
        #[arg(short, long)]
        notes: Option<String>,
    },

    /// Move a call to a new lifecycle status
    Status {
        /// Call ID
        call_id: Uuid,

        /// pending, in_progress, completed, failed, or cancelled
        status: String,
    },

    /// Create a corrected copy of a call
    Supersede {
        /// Call being corrected
        call_id: Uuid,

        /// Corrected phone number
        phone_number: String,

        /// Corrected notes
        #[arg(short, long)]
        notes: Option<String>,
    },

    /// Append a note to a call
    Note {
        /// Call ID
        call_id: Uuid,

        /// Note text
        body: String,
    },

    /// List notes on a call
    Notes {
        /// Call ID
        call_id: Uuid,
    },

    /// Show the organization's audit trail
    Audit {
        /// Maximum number of entries
        #[arg(short, long, default_value = "50")]
        limit: u32,
    },
}

// ── API types ───────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize, Serialize)]
struct CallInfo {
    id: Uuid,
    organization_id: String,
    phone_number: String,
    status: String,
    #[serde(default)]
    notes: Option<String>,
    created_by: String,
    created_at: DateTime<Utc>,
    #[serde(default)]
    supersedes_id: Option<Uuid>,
}

#[derive(Debug, Deserialize, Serialize)]
struct NoteInfo {
    id: Uuid,
    author_id: String,
    body: String,
    created_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize, Serialize)]
struct AuditInfo {
    id: Uuid,
    #[serde(default)]
    user_id: Option<String>,
    resource_type: String,
    #[serde(default)]
    resource_id: Option<String>,
    action: String,
    content_hash: String,
    created_at: DateTime<Utc>,
}

#[derive(Tabled, Serialize)]
struct CallRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Phone")]
    phone_number: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Created By")]
    created_by: String,
    #[tabled(rename = "Created")]
    created_at: String,
}

impl From<&CallInfo> for CallRow {
    fn from(call: &CallInfo) -> Self {
        Self {
            id: call.id.to_string(),
            phone_number: call.phone_number.clone(),
            status: call.status.clone(),
            created_by: call.created_by.clone(),
            created_at: call.created_at.format("%Y-%m-%d %H:%M").to_string(),
        }
    }
}

#[derive(Tabled, Serialize)]
struct NoteRow {
    #[tabled(rename = "Author")]
    author_id: String,
    #[tabled(rename = "Created")]
    created_at: String,
    #[tabled(rename = "Note")]
    body: String,
}

#[derive(Tabled, Serialize)]
struct AuditRow {
    #[tabled(rename = "When")]
    created_at: String,
    #[tabled(rename = "User")]
    user_id: String,
    #[tabled(rename = "Action")]
    action: String,
    #[tabled(rename = "Resource")]
    resource: String,
    #[tabled(rename = "Hash")]
    hash: String,
}

fn print_call(call: &CallInfo, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Table => {
            output::print_header("Call");
            output::print_detail("ID", &call.id.to_string());
            output::print_detail("Organization", &call.organization_id);
            output::print_detail("Phone", &call.phone_number);
            output::print_detail("Status", &call.status);
            output::print_detail("Created By", &call.created_by);
            output::print_detail("Created", &call.created_at.to_rfc3339());
            if let Some(ref notes) = call.notes {
                output::print_detail("Notes", notes);
            }
            if let Some(prior) = call.supersedes_id {
                output::print_detail("Supersedes", &prior.to_string());
            }
            Ok(())
        }
        _ => output::print_item(call, format),
    }
}

pub async fn execute(cmd: CallCommands, client: &ApiClient, format: OutputFormat) -> Result<()> {
    match cmd {
        CallCommands::List => {
            let calls: Vec<CallInfo> = client.get("/api/v1/calls").await?;
            match format {
                OutputFormat::Table => {
                    let rows: Vec<CallRow> = calls.iter().map(CallRow::from).collect();
                    output::print_list(&rows, format)
                }
                _ => output::print_item(&calls, format),
            }
        }

        CallCommands::Show { call_id } => {
            let call: CallInfo = client.get(&format!("/api/v1/calls/{}", call_id)).await?;
            print_call(&call, format)
        }

        CallCommands::Create { phone_number, notes } => {
            let body = json!({ "phone_number": phone_number, "notes": notes });
            let call: CallInfo = client.post("/api/v1/calls", &body).await?;
            if let OutputFormat::Table = format {
                output::print_success(&format!("Call {} recorded", call.id));
            }
            print_call(&call, format)
        }

        CallCommands::Status { call_id, status } => {
            let body = json!({ "status": status });
            let call: CallInfo = client
                .patch(&format!("/api/v1/calls/{}", call_id), &body)
                .await?;
            print_call(&call, format)
        }

        CallCommands::Supersede {
            call_id,
            phone_number,
            notes,
        } => {
            let body = json!({ "phone_number": phone_number, "notes": notes });
            let call: CallInfo = client
                .post(&format!("/api/v1/calls/{}/supersede", call_id), &body)
                .await?;
            if let OutputFormat::Table = format {
                output::print_success(&format!("Call {} supersedes {}", call.id, call_id));
            }
            print_call(&call, format)
        }

        CallCommands::Note { call_id, body } => {
            let note: NoteInfo = client
                .post(&format!("/api/v1/calls/{}/notes", call_id), &json!({ "body": body }))
                .await?;
            match format {
                OutputFormat::Table => {
                    output::print_success(&format!("Note {} added", note.id));
                    Ok(())
                }
                _ => output::print_item(&note, format),
            }
        }

        CallCommands::Notes { call_id } => {
            let notes: Vec<NoteInfo> = client
                .get(&format!("/api/v1/calls/{}/notes", call_id))
                .await?;
            match format {
                OutputFormat::Table => {
                    let rows: Vec<NoteRow> = notes
                        .into_iter()
                        .map(|n| NoteRow {
                            author_id: n.author_id,
                            created_at: n.created_at.format("%Y-%m-%d %H:%M").to_string(),
                            body: n.body,
                        })
                        .collect();
                    output::print_list(&rows, format)
                }
                _ => output::print_item(&notes, format),
            }
        }

        CallCommands::Audit { limit } => {
            let entries: Vec<AuditInfo> = client
                .get(&format!("/api/v1/audit?limit={}", limit))
                .await?;
            match format {
                OutputFormat::Table => {
                    let rows: Vec<AuditRow> = entries
                        .into_iter()
                        .map(|e| AuditRow {
                            created_at: e.created_at.format("%Y-%m-%d %H:%M:%S").to_string(),
                            user_id: e.user_id.unwrap_or_else(|| "-".into()),
                            action: e.action,
                            resource: match e.resource_id {
                                Some(id) => format!("{}/{}", e.resource_type, id),
                                None => e.resource_type,
                            },
                            hash: e.content_hash.chars().take(12).collect(),
                        })
                        .collect();
                    output::print_list(&rows, format)
                }
                _ => output::print_item(&entries, format),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_call_row_from_server_record() {
        let body = serde_json::json!({
            "id": "6f1c1a9e-1c2b-4f5a-9d3e-1a2b3c4d5e6f",
            "organization_id": "OrgA",
            "phone_number": "+15550100",
            "status": "in_progress",
            "call_sid": null,
            "notes": null,
            "created_by": "alice",
            "created_at": "2024-03-01T12:30:00Z",
            "started_at": null,
            "ended_at": null,
            "supersedes_id": null
        });
        let call: CallInfo = serde_json::from_value(body).unwrap();
        let row = CallRow::from(&call);
        assert_eq!(row.status, "in_progress");
        assert_eq!(row.created_at, "2024-03-01 12:30");
    }
}
