use axum::{
    extract::{Extension, Path},
    Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config;
use crate::error::AppResult;

use super::evaluator::EntitlementEvaluator;
use super::models::{Decision, EntitlementError, EntitlementResult, Operation, QuotaStatus};
use super::tiers::{ResetPolicy, Tier, TierFeatures};

/// key: entitlement-api -> rest endpoints
///
/// A transient ledger race is retried here, a small bounded number of times.
/// Exhausting the retries is a service failure, never a quota denial.
pub async fn authorize_with_retry(
    evaluator: &EntitlementEvaluator,
    account: Uuid,
    operation: Operation,
) -> EntitlementResult<Decision> {
    let attempts = *config::AUTHORIZE_RETRY_LIMIT;
    let mut last_race = None;
    for attempt in 1..=attempts {
        match evaluator.authorize(account, operation).await {
            Err(EntitlementError::ConcurrentModification(billing_account)) => {
                tracing::warn!(
                    account = %account,
                    billing_account = %billing_account,
                    attempt,
                    "authorize raced a ledger reset, retrying"
                );
                last_race = Some(EntitlementError::ConcurrentModification(billing_account));
            }
            other => return other,
        }
    }
    Err(last_race.unwrap_or(EntitlementError::ConcurrentModification(account)))
}

pub async fn authorize_operation(
    Extension(evaluator): Extension<EntitlementEvaluator>,
    Path(account_id): Path<Uuid>,
    Json(payload): Json<AuthorizeRequest>,
) -> AppResult<Json<Decision>> {
    let operation = payload.into_operation();
    let decision = authorize_with_retry(&evaluator, account_id, operation).await?;
    Ok(Json(decision))
}

pub async fn read_quota(
    Extension(evaluator): Extension<EntitlementEvaluator>,
    Path(account_id): Path<Uuid>,
) -> AppResult<Json<QuotaStatus>> {
    let status = evaluator.remaining_quota(account_id).await?;
    Ok(Json(status))
}

pub async fn list_tiers(
    Extension(evaluator): Extension<EntitlementEvaluator>,
) -> Json<Vec<TierCatalogEntry>> {
    let catalog = evaluator
        .registry()
        .catalog()
        .into_iter()
        .map(|(tier, bundle)| TierCatalogEntry {
            tier,
            limit: bundle.limit,
            reset: bundle.reset,
            features: bundle.features,
        })
        .collect();
    Json(catalog)
}

pub async fn force_reset_usage(
    Extension(evaluator): Extension<EntitlementEvaluator>,
    Path(account_id): Path<Uuid>,
) -> AppResult<Json<QuotaStatus>> {
    let status = evaluator.force_reset(account_id).await?;
    Ok(Json(status))
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    Validate,
    BatchValidate,
    SendEmail,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct AuthorizeRequest {
    pub operation: OperationKind,
    #[serde(default)]
    pub count: Option<i64>,
}

impl AuthorizeRequest {
    pub fn into_operation(self) -> Operation {
        let count = self.count.unwrap_or(1);
        match self.operation {
            OperationKind::Validate => Operation::Validate { count },
            OperationKind::BatchValidate => Operation::BatchValidate { count },
            OperationKind::SendEmail => Operation::SendEmail,
        }
    }
}

/// Catalog entry served to presentation layers so tier limits live in
/// exactly one place.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct TierCatalogEntry {
    pub tier: Tier,
    pub limit: i64,
    pub reset: ResetPolicy,
    pub features: TierFeatures,
}
