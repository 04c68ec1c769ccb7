//! Timeline exports: ndjson, json, csv, md.

use serde::Deserialize;
use std::fmt::Write as _;

use crate::record::{JournalRecord, SequencedRecord};

/// Supported export formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    /// One JSON record per line.
    Ndjson,
    /// A single JSON array.
    Json,
    /// Comma-separated summary columns.
    Csv,
    /// A markdown table.
    Md,
}

impl ExportFormat {
    /// The response content type for this format.
    #[must_use]
    pub fn content_type(&self) -> &'static str {
        match self {
            Self::Ndjson => "application/x-ndjson",
            Self::Json => "application/json",
            Self::Csv => "text/csv",
            Self::Md => "text/markdown",
        }
    }
}

/// Summary columns shared by the tabular formats.
struct Row<'a> {
    cursor: u64,
    kind: &'static str,
    ts_ms: i64,
    id: &'a str,
    agent: &'a str,
    intent: &'a str,
    status: String,
}

fn row(record: &SequencedRecord) -> Row<'_> {
    let (id, agent, intent, status) = match &record.record {
        JournalRecord::Event {
            event, status, ..
        } => (
            event.id.as_str(),
            event.agent.as_str(),
            event.intent.as_str(),
            status.to_string(),
        ),
        JournalRecord::Decision { id, status, .. } => {
            (id.as_str(), "", "", status.to_string())
        },
        JournalRecord::Token { token, action, .. } => {
            ("", token.agent.as_str(), "", action_name(*action).to_string())
        },
        JournalRecord::RoleApplied { agent, template, .. } => (
            "",
            agent.as_str(),
            "",
            template.clone().unwrap_or_default(),
        ),
    };
    Row {
        cursor: record.cursor,
        kind: record.record.kind(),
        ts_ms: record.record.ts().millis(),
        id,
        agent,
        intent,
        status,
    }
}

fn action_name(action: crate::record::TokenAction) -> &'static str {
    match action {
        crate::record::TokenAction::Issued => "issued",
        crate::record::TokenAction::Paused => "paused",
        crate::record::TokenAction::Resumed => "resumed",
        crate::record::TokenAction::Revoked => "revoked",
    }
}

/// Quote a CSV field when it needs quoting.
fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

/// Render records in the requested format.
///
/// NDJSON and JSON carry the full record shape; CSV and markdown carry the
/// summary columns.
#[must_use]
pub fn export(records: &[SequencedRecord], format: ExportFormat) -> String {
    match format {
        ExportFormat::Ndjson => {
            let mut out = String::new();
            for record in records {
                if let Ok(line) = serde_json::to_string(record) {
                    out.push_str(&line);
                    out.push('\n');
                }
            }
            out
        },
        ExportFormat::Json => serde_json::to_string_pretty(records).unwrap_or_else(|_| "[]".to_string()),
        ExportFormat::Csv => {
            let mut out = String::from("cursor,type,ts,id,agent,intent,status\n");
            for record in records {
                let r = row(record);
                let _ = writeln!(
                    out,
                    "{},{},{},{},{},{},{}",
                    r.cursor,
                    r.kind,
                    r.ts_ms,
                    csv_field(r.id),
                    csv_field(r.agent),
                    csv_field(r.intent),
                    csv_field(&r.status),
                );
            }
            out
        },
        ExportFormat::Md => {
            let mut out =
                String::from("| cursor | type | ts | id | agent | intent | status |\n|---|---|---|---|---|---|---|\n");
            for record in records {
                let r = row(record);
                let _ = writeln!(
                    out,
                    "| {} | {} | {} | {} | {} | {} | {} |",
                    r.cursor, r.kind, r.ts_ms, r.id, r.agent, r.intent, r.status,
                );
            }
            out
        },
    }
}
