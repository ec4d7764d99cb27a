use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use thiserror::Error;
use uuid::Uuid;

use super::tiers::Tier;

/// key: entitlement-models -> accounts,usage,decisions
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct AccountRecord {
    pub id: Uuid,
    /// Nominal tier label as stored by the directory. For sub-accounts this
    /// is display-only; quota and feature decisions resolve through the
    /// owner's tier.
    pub tier: String,
    pub owner_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl AccountRecord {
    pub fn is_sub_account(&self) -> bool {
        self.owner_id.is_some()
    }
}

/// key: entitlement-usage-record -> per billing account counter
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct UsageRecord {
    pub billing_account_id: Uuid,
    pub consumed: i64,
    pub period_start: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

/// Effective usage after lazy reset has been applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UsageSnapshot {
    pub consumed: i64,
    pub period_start: Option<DateTime<Utc>>,
}

/// Result of an atomic increment-with-ceiling against the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitOutcome {
    Committed { consumed: i64 },
    LimitExceeded { consumed: i64 },
}

/// Billing root an operation is attributed to: the account itself for
/// standalone and Pro-owner accounts, the owning Pro account for
/// sub-accounts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BillingIdentity {
    pub billing_account: Uuid,
    pub tier: Tier,
}

/// key: entitlement-operations -> admission request kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Validate { count: i64 },
    BatchValidate { count: i64 },
    SendEmail,
}

impl Operation {
    /// Quota units the operation charges on admission. Every operation is
    /// metered, email sends as a single unit.
    pub fn quota_units(&self) -> i64 {
        match self {
            Operation::Validate { count } | Operation::BatchValidate { count } => *count,
            Operation::SendEmail => 1,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Operation::Validate { .. } => "validate",
            Operation::BatchValidate { .. } => "batch_validate",
            Operation::SendEmail => "send_email",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DenialReason {
    QuotaExceeded,
    FeatureDisabled,
}

/// key: entitlement-decision -> tagged admission outcome
///
/// Denials are ordinary values, never errors; callers branch on the variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Decision {
    Allowed {
        remaining: i64,
    },
    Denied {
        reason: DenialReason,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        remaining: Option<i64>,
    },
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allowed { .. })
    }
}

/// Read-only quota view for dashboards; commits nothing.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct QuotaStatus {
    pub billing_account: Uuid,
    pub tier: Tier,
    pub consumed: i64,
    pub limit: i64,
    pub remaining: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resets_at: Option<DateTime<Utc>>,
}

/// key: entitlement-errors -> integrity and storage failures
///
/// Quota and feature denials are not in this taxonomy; they travel inside
/// [`Decision`].
#[derive(Debug, Error)]
pub enum EntitlementError {
    #[error("unknown tier `{0}`")]
    UnknownTier(String),
    #[error("account {0} not found")]
    AccountNotFound(Uuid),
    #[error("ownership chain for account {0} exceeds one level")]
    OwnershipCycle(Uuid),
    #[error("concurrent usage update detected for account {0}")]
    ConcurrentModification(Uuid),
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

pub type EntitlementResult<T> = Result<T, EntitlementError>;
