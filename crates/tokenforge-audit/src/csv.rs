//! CSV rendering of status history rows.

use chrono::SecondsFormat;
use std::borrow::Cow;
use tokenforge_core::deployment::{Deployment, StatusEntry};

pub const HEADER: [&str; 13] = [
    "DeploymentId",
    "Status",
    "Timestamp",
    "Message",
    "TransactionHash",
    "ConfirmedRound",
    "ErrorMessage",
    "TokenType",
    "Network",
    "TokenName",
    "TokenSymbol",
    "DeployedBy",
    "AssetIdentifier",
];

/// Quote a field if it contains a delimiter, quote or line break.
pub fn escape_field(field: &str) -> Cow<'_, str> {
    if field.contains([',', '"', '\n', '\r']) {
        Cow::Owned(format!("\"{}\"", field.replace('"', "\"\"")))
    } else {
        Cow::Borrowed(field)
    }
}

fn write_row<'a>(out: &mut String, fields: impl IntoIterator<Item = &'a str>) {
    for (i, field) in fields.into_iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        out.push_str(&escape_field(field));
    }
    out.push('\n');
}

pub fn write_header(out: &mut String) {
    write_row(out, HEADER);
}

/// Append one row per history entry of `deployment`.
pub fn write_history(out: &mut String, deployment: &Deployment, history: &[StatusEntry]) {
    for entry in history {
        let timestamp = entry.timestamp.to_rfc3339_opts(SecondsFormat::Millis, true);
        let round = entry
            .confirmed_round
            .map(|r| r.to_string())
            .unwrap_or_default();
        write_row(
            out,
            [
                deployment.id.as_str(),
                entry.status.as_str(),
                timestamp.as_str(),
                entry.message.as_str(),
                entry.transaction_hash.as_deref().unwrap_or_default(),
                round.as_str(),
                entry.error_message.as_deref().unwrap_or_default(),
                deployment.token_type.as_str(),
                deployment.network.as_str(),
                deployment.token_name.as_str(),
                deployment.token_symbol.as_str(),
                deployment.deployed_by.as_str(),
                deployment.asset_identifier.as_deref().unwrap_or_default(),
            ],
        );
    }
}
