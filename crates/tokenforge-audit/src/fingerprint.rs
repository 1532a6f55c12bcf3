//! Request fingerprints for idempotency checks.

use chrono::SecondsFormat;
use serde_json::json;
use sha2::{Digest, Sha256};
use tokenforge_core::audit::BulkExportRequest;

/// SHA-256 hex digest of the canonical form of `request`.
///
/// String filters are trimmed and empty ones treated as absent, so requests
/// that select the same rows produce the same fingerprint.
pub fn request_fingerprint(request: &BulkExportRequest) -> String {
    let filter = request.filter.normalized();
    let timestamp =
        |t: chrono::DateTime<chrono::Utc>| t.to_rfc3339_opts(SecondsFormat::Micros, true);

    // serde_json maps are sorted by key, which keeps the encoding stable.
    let canonical = json!({
        "format": request.format.as_str(),
        "page": request.page.max(1),
        "page_size": request.page_size,
        "filter": {
            "network": filter.network,
            "status": filter.status.map(|s| s.as_str()),
            "deployed_by": filter.deployed_by,
            "token_type": filter.token_type,
            "created_from": filter.created_from.map(timestamp),
            "created_to": filter.created_to.map(timestamp),
        },
    });

    hex::encode(Sha256::digest(canonical.to_string().as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokenforge_core::audit::ExportFormat;
    use tokenforge_core::deployment::{DeploymentFilter, DeploymentStatus};

    fn request(filter: DeploymentFilter) -> BulkExportRequest {
        BulkExportRequest::new(ExportFormat::Json, 1, 50).with_filter(filter)
    }

    #[test]
    fn test_whitespace_and_empty_filters_are_ignored() {
        let plain = request_fingerprint(&request(DeploymentFilter::default().network("base")));
        let padded = request_fingerprint(&request(DeploymentFilter::default().network("  base ")));
        assert_eq!(plain, padded);

        let none = request_fingerprint(&request(DeploymentFilter::default()));
        let empty = request_fingerprint(&request(DeploymentFilter {
            deployed_by: Some("   ".to_string()),
            ..Default::default()
        }));
        assert_eq!(none, empty);
        assert_eq!(none.len(), 64);
    }

    #[test]
    fn test_any_parameter_change_alters_fingerprint() {
        let base = request(DeploymentFilter::default().network("base"));
        let fp = request_fingerprint(&base);

        let mut other_network = base.clone();
        other_network.filter.network = Some("mainnet".to_string());
        let mut other_status = base.clone();
        other_status.filter.status = Some(DeploymentStatus::Failed);
        let mut other_page = base.clone();
        other_page.page = 2;
        let mut other_format = base.clone();
        other_format.format = ExportFormat::Csv;

        for changed in [other_network, other_status, other_page, other_format] {
            assert_ne!(fp, request_fingerprint(&changed), "{:?}", changed);
        }
    }
}
