//! Deployment records, status history and the legal transition table.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::{DeploymentId, Error};

/// Lifecycle status of a token deployment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DeploymentStatus {
    /// Accepted and waiting to be submitted.
    Queued,
    /// Transaction broadcast to the network.
    Submitted,
    /// Transaction seen by the network, awaiting inclusion.
    Pending,
    /// Transaction included in a block/round.
    Confirmed,
    /// Post-confirmation work finished. No transitions leave this state.
    Completed,
    /// Deployment failed. May be re-queued.
    Failed,
}

impl DeploymentStatus {
    pub const ALL: [DeploymentStatus; 6] = [
        DeploymentStatus::Queued,
        DeploymentStatus::Submitted,
        DeploymentStatus::Pending,
        DeploymentStatus::Confirmed,
        DeploymentStatus::Completed,
        DeploymentStatus::Failed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DeploymentStatus::Queued => "Queued",
            DeploymentStatus::Submitted => "Submitted",
            DeploymentStatus::Pending => "Pending",
            DeploymentStatus::Confirmed => "Confirmed",
            DeploymentStatus::Completed => "Completed",
            DeploymentStatus::Failed => "Failed",
        }
    }

    /// Statuses reachable from this one in a single transition.
    pub fn allowed_next(&self) -> &'static [DeploymentStatus] {
        use DeploymentStatus::*;
        match self {
            Queued => &[Submitted, Failed],
            Submitted => &[Pending, Failed],
            Pending => &[Confirmed, Failed],
            Confirmed => &[Completed, Failed],
            Completed => &[],
            Failed => &[Queued],
        }
    }

    pub fn can_transition_to(&self, next: DeploymentStatus) -> bool {
        self.allowed_next().contains(&next)
    }

    pub fn is_terminal(&self) -> bool {
        self.allowed_next().is_empty()
    }

    /// History message used when the caller does not supply one.
    pub fn default_message(&self) -> &'static str {
        match self {
            DeploymentStatus::Queued => "Deployment queued",
            DeploymentStatus::Submitted => "Transaction submitted to network",
            DeploymentStatus::Pending => "Transaction pending confirmation",
            DeploymentStatus::Confirmed => "Transaction confirmed",
            DeploymentStatus::Completed => "Deployment completed",
            DeploymentStatus::Failed => "Deployment failed",
        }
    }
}

impl fmt::Display for DeploymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for DeploymentStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DeploymentStatus::ALL
            .into_iter()
            .find(|status| status.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| Error::Validation(format!("unknown deployment status: {}", s)))
    }
}

/// A tracked token deployment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Deployment {
    pub id: DeploymentId,
    pub token_type: String,
    pub network: String,
    pub deployed_by: String,
    pub token_name: String,
    pub token_symbol: String,
    pub asset_identifier: Option<String>,
    pub transaction_hash: Option<String>,
    pub current_status: DeploymentStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Input for creating a deployment.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewDeployment {
    /// Caller-chosen id. A fresh one is generated when absent.
    pub id: Option<DeploymentId>,
    pub token_type: String,
    pub network: String,
    pub deployed_by: String,
    pub token_name: String,
    pub token_symbol: String,
}

impl NewDeployment {
    pub fn new(
        token_type: impl Into<String>,
        network: impl Into<String>,
        deployed_by: impl Into<String>,
        token_name: impl Into<String>,
        token_symbol: impl Into<String>,
    ) -> Self {
        Self {
            id: None,
            token_type: token_type.into(),
            network: network.into(),
            deployed_by: deployed_by.into(),
            token_name: token_name.into(),
            token_symbol: token_symbol.into(),
        }
    }

    pub fn with_id(mut self, id: impl Into<DeploymentId>) -> Self {
        self.id = Some(id.into());
        self
    }
}

impl Deployment {
    /// Build a fresh `Queued` deployment.
    pub fn queued(input: NewDeployment, now: DateTime<Utc>) -> Self {
        Self {
            id: input.id.unwrap_or_else(DeploymentId::generate),
            token_type: input.token_type,
            network: input.network,
            deployed_by: input.deployed_by,
            token_name: input.token_name,
            token_symbol: input.token_symbol,
            asset_identifier: None,
            transaction_hash: None,
            current_status: DeploymentStatus::Queued,
            created_at: now,
            updated_at: now,
        }
    }
}

/// One entry of a deployment's append-only status history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusEntry {
    pub deployment_id: DeploymentId,
    pub status: DeploymentStatus,
    pub timestamp: DateTime<Utc>,
    pub message: String,
    pub transaction_hash: Option<String>,
    pub confirmed_round: Option<u64>,
    pub error_message: Option<String>,
    pub retryable: Option<bool>,
}

/// Caller-supplied details recorded alongside a transition.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StatusDetails {
    pub message: Option<String>,
    pub transaction_hash: Option<String>,
    pub confirmed_round: Option<u64>,
    pub error_message: Option<String>,
    pub retryable: Option<bool>,
}

impl StatusDetails {
    pub fn message(message: impl Into<String>) -> Self {
        Self {
            message: Some(message.into()),
            ..Default::default()
        }
    }

    pub fn failure(error_message: impl Into<String>, retryable: bool) -> Self {
        Self {
            error_message: Some(error_message.into()),
            retryable: Some(retryable),
            ..Default::default()
        }
    }

    pub fn with_transaction_hash(mut self, hash: impl Into<String>) -> Self {
        self.transaction_hash = Some(hash.into());
        self
    }

    pub fn with_confirmed_round(mut self, round: u64) -> Self {
        self.confirmed_round = Some(round);
        self
    }

    /// Turn the details into a history entry for `status`.
    pub fn into_entry(
        self,
        deployment_id: DeploymentId,
        status: DeploymentStatus,
        timestamp: DateTime<Utc>,
    ) -> StatusEntry {
        let message = match (self.message, &self.error_message) {
            (Some(m), _) if !m.trim().is_empty() => m,
            (_, Some(err)) if status == DeploymentStatus::Failed => {
                format!("{}: {}", status.default_message(), err)
            }
            _ => status.default_message().to_string(),
        };
        StatusEntry {
            deployment_id,
            status,
            timestamp,
            message,
            transaction_hash: self.transaction_hash,
            confirmed_round: self.confirmed_round,
            error_message: self.error_message,
            retryable: self.retryable,
        }
    }
}

/// Result of asking the lifecycle to move a deployment to a new status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionOutcome {
    /// The transition was legal and has been recorded.
    Applied {
        from: DeploymentStatus,
        to: DeploymentStatus,
    },
    /// The deployment was already in the requested status.
    Unchanged(DeploymentStatus),
    /// No deployment with that id exists.
    NotFound,
    /// The edge is not in the transition table.
    Rejected {
        from: DeploymentStatus,
        to: DeploymentStatus,
    },
}

impl TransitionOutcome {
    /// Boolean view of the outcome: applied and idempotent repeats count as success.
    pub fn accepted(&self) -> bool {
        matches!(
            self,
            TransitionOutcome::Applied { .. } | TransitionOutcome::Unchanged(_)
        )
    }

    pub fn into_result(self) -> crate::Result<()> {
        match self {
            TransitionOutcome::Applied { .. } | TransitionOutcome::Unchanged(_) => Ok(()),
            TransitionOutcome::NotFound => Err(Error::NotFound("deployment".to_string())),
            TransitionOutcome::Rejected { from, to } => Err(Error::InvalidTransition { from, to }),
        }
    }
}

/// Predicates for listing, counting and bulk-exporting deployments.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeploymentFilter {
    pub network: Option<String>,
    pub status: Option<DeploymentStatus>,
    pub deployed_by: Option<String>,
    pub token_type: Option<String>,
    pub created_from: Option<DateTime<Utc>>,
    pub created_to: Option<DateTime<Utc>>,
}

impl DeploymentFilter {
    pub fn network(mut self, network: impl Into<String>) -> Self {
        self.network = Some(network.into());
        self
    }

    pub fn status(mut self, status: DeploymentStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn matches(&self, deployment: &Deployment) -> bool {
        self.network
            .as_deref()
            .is_none_or(|n| deployment.network == n)
            && self.status.is_none_or(|s| deployment.current_status == s)
            && self
                .deployed_by
                .as_deref()
                .is_none_or(|d| deployment.deployed_by == d)
            && self
                .token_type
                .as_deref()
                .is_none_or(|t| deployment.token_type == t)
            && self.created_from.is_none_or(|from| deployment.created_at >= from)
            && self.created_to.is_none_or(|to| deployment.created_at <= to)
    }

    /// Trim string predicates and drop empty ones.
    pub fn normalized(&self) -> Self {
        fn clean(value: &Option<String>) -> Option<String> {
            value
                .as_deref()
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(str::to_string)
        }
        Self {
            network: clean(&self.network),
            status: self.status,
            deployed_by: clean(&self.deployed_by),
            token_type: clean(&self.token_type),
            created_from: self.created_from,
            created_to: self.created_to,
        }
    }
}

/// 1-based page selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRequest {
    pub page: u32,
    pub page_size: u32,
}

impl PageRequest {
    pub fn new(page: u32, page_size: u32) -> Self {
        Self {
            page: page.max(1),
            page_size: page_size.max(1),
        }
    }

    pub fn offset(&self) -> usize {
        (self.page.max(1) as usize - 1) * self.page_size.max(1) as usize
    }

    pub fn limit(&self) -> usize {
        self.page_size.max(1) as usize
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self::new(1, 100)
    }
}
