use std::sync::Arc;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::directory::AccountDirectory;

use super::hierarchy::AccountHierarchyResolver;
use super::ledger::UsageLedger;
use super::models::{
    CommitOutcome, Decision, DenialReason, EntitlementError, EntitlementResult, Operation,
    QuotaStatus,
};
use super::tiers::TierRegistry;

/// key: entitlement-evaluator -> single admission path
///
/// Every chargeable call site funnels through [`EntitlementEvaluator::authorize`];
/// feature and quota rules exist nowhere else. Admission is all-or-nothing:
/// the full requested count is committed, or nothing is.
#[derive(Clone)]
pub struct EntitlementEvaluator {
    registry: Arc<TierRegistry>,
    resolver: AccountHierarchyResolver,
    ledger: Arc<dyn UsageLedger>,
}

impl EntitlementEvaluator {
    pub fn new(
        registry: TierRegistry,
        directory: Arc<dyn AccountDirectory>,
        ledger: Arc<dyn UsageLedger>,
    ) -> Self {
        Self {
            registry: Arc::new(registry),
            resolver: AccountHierarchyResolver::new(directory),
            ledger,
        }
    }

    pub fn registry(&self) -> &TierRegistry {
        &self.registry
    }

    pub async fn authorize(
        &self,
        account: Uuid,
        operation: Operation,
    ) -> EntitlementResult<Decision> {
        self.authorize_at(account, operation, Utc::now()).await
    }

    /// Admission check with an explicit clock, the testable entry point.
    pub async fn authorize_at(
        &self,
        account: Uuid,
        operation: Operation,
        now: DateTime<Utc>,
    ) -> EntitlementResult<Decision> {
        let units = operation.quota_units();
        if units < 1 {
            return Err(EntitlementError::InvalidRequest(format!(
                "operation `{}` must request at least one quota unit",
                operation.kind()
            )));
        }

        let identity = self.resolver.billing_account_for(account).await?;
        let bundle = self.registry.lookup(identity.tier)?;

        // Feature gates come before any ledger traffic; a disabled feature
        // is denied identically at zero and at full quota.
        let feature_allowed = match operation {
            Operation::Validate { .. } => true,
            Operation::BatchValidate { .. } => bundle.features.batch_validation,
            Operation::SendEmail => bundle.features.email_sending,
        };
        if !feature_allowed {
            tracing::debug!(
                account = %account,
                billing_account = %identity.billing_account,
                tier = %identity.tier,
                operation = operation.kind(),
                "operation denied, feature not in tier bundle"
            );
            return Ok(Decision::Denied {
                reason: DenialReason::FeatureDisabled,
                remaining: None,
            });
        }

        match self
            .ledger
            .try_commit(
                identity.billing_account,
                units,
                bundle.limit,
                bundle.reset,
                now,
            )
            .await?
        {
            CommitOutcome::Committed { consumed } => Ok(Decision::Allowed {
                remaining: bundle.limit - consumed,
            }),
            CommitOutcome::LimitExceeded { consumed } => {
                tracing::debug!(
                    account = %account,
                    billing_account = %identity.billing_account,
                    tier = %identity.tier,
                    operation = operation.kind(),
                    requested = units,
                    consumed,
                    limit = bundle.limit,
                    "operation denied, quota exhausted"
                );
                Ok(Decision::Denied {
                    reason: DenialReason::QuotaExceeded,
                    remaining: Some((bundle.limit - consumed).max(0)),
                })
            }
        }
    }

    pub async fn remaining_quota(&self, account: Uuid) -> EntitlementResult<QuotaStatus> {
        self.remaining_quota_at(account, Utc::now()).await
    }

    /// Read-only quota view; commits nothing. Dashboards read limits through
    /// this instead of holding their own tier constants.
    pub async fn remaining_quota_at(
        &self,
        account: Uuid,
        now: DateTime<Utc>,
    ) -> EntitlementResult<QuotaStatus> {
        let identity = self.resolver.billing_account_for(account).await?;
        let bundle = self.registry.lookup(identity.tier)?;
        let snapshot = self
            .ledger
            .current_usage(identity.billing_account, bundle.reset, now)
            .await?;

        let resets_at = snapshot
            .period_start
            .and_then(|start| bundle.reset.period_end(start));
        Ok(QuotaStatus {
            billing_account: identity.billing_account,
            tier: identity.tier,
            consumed: snapshot.consumed,
            limit: bundle.limit,
            remaining: (bundle.limit - snapshot.consumed).max(0),
            resets_at,
        })
    }

    /// Administrative remediation: zero the billing account's counter.
    pub async fn force_reset(&self, account: Uuid) -> EntitlementResult<QuotaStatus> {
        let now = Utc::now();
        let identity = self.resolver.billing_account_for(account).await?;
        let bundle = self.registry.lookup(identity.tier)?;
        self.ledger
            .force_reset(identity.billing_account, bundle.reset, now)
            .await?;
        tracing::info!(
            account = %account,
            billing_account = %identity.billing_account,
            "usage record force-reset"
        );
        self.remaining_quota_at(account, now).await
    }
}
