use std::sync::Arc;

use chrono::{TimeZone, Utc};
use mailcheck_backend::directory::MemoryAccountDirectory;
use mailcheck_backend::entitlements::{
    Decision, DenialReason, EntitlementError, EntitlementEvaluator, MemoryUsageLedger, Operation,
    ResetPolicy, TierRegistry, UsageLedger,
};

// key: entitlement-tests -> admission scenarios over the in-memory stack
fn evaluator() -> (
    EntitlementEvaluator,
    Arc<MemoryAccountDirectory>,
    Arc<MemoryUsageLedger>,
) {
    let directory = Arc::new(MemoryAccountDirectory::new());
    let ledger = Arc::new(MemoryUsageLedger::new());
    let evaluator =
        EntitlementEvaluator::new(TierRegistry::defaults(), directory.clone(), ledger.clone());
    (evaluator, directory, ledger)
}

#[tokio::test]
async fn free_tier_end_to_end_scenario() {
    let (evaluator, directory, _) = evaluator();
    let account = directory.register("free", None);

    let warmup = evaluator
        .authorize(account, Operation::Validate { count: 9 })
        .await
        .unwrap();
    assert_eq!(warmup, Decision::Allowed { remaining: 1 });

    let last = evaluator
        .authorize(account, Operation::Validate { count: 1 })
        .await
        .unwrap();
    assert_eq!(last, Decision::Allowed { remaining: 0 });

    let over = evaluator
        .authorize(account, Operation::Validate { count: 1 })
        .await
        .unwrap();
    assert_eq!(
        over,
        Decision::Denied {
            reason: DenialReason::QuotaExceeded,
            remaining: Some(0),
        }
    );

    // Batch stays feature-denied for Free regardless of the quota state.
    let batch = evaluator
        .authorize(account, Operation::BatchValidate { count: 1 })
        .await
        .unwrap();
    assert_eq!(
        batch,
        Decision::Denied {
            reason: DenialReason::FeatureDisabled,
            remaining: None,
        }
    );
}

#[tokio::test]
async fn feature_gate_is_independent_of_quota() {
    let (evaluator, directory, _) = evaluator();
    let account = directory.register("starter", None);

    // Full quota: sending email is still not in the Starter bundle.
    let fresh = evaluator
        .authorize(account, Operation::SendEmail)
        .await
        .unwrap();
    assert_eq!(
        fresh,
        Decision::Denied {
            reason: DenialReason::FeatureDisabled,
            remaining: None,
        }
    );

    // Exhaust the Starter quota entirely.
    let drained = evaluator
        .authorize(account, Operation::BatchValidate { count: 10_000 })
        .await
        .unwrap();
    assert_eq!(drained, Decision::Allowed { remaining: 0 });

    // Zero quota: the denial reason must stay FeatureDisabled, not
    // QuotaExceeded.
    let still_feature = evaluator
        .authorize(account, Operation::SendEmail)
        .await
        .unwrap();
    assert_eq!(
        still_feature,
        Decision::Denied {
            reason: DenialReason::FeatureDisabled,
            remaining: None,
        }
    );

    // And an enabled feature now trips on quota instead.
    let quota = evaluator
        .authorize(account, Operation::BatchValidate { count: 1 })
        .await
        .unwrap();
    assert_eq!(
        quota,
        Decision::Denied {
            reason: DenialReason::QuotaExceeded,
            remaining: Some(0),
        }
    );
}

#[tokio::test]
async fn admission_is_all_or_nothing() {
    let (evaluator, directory, _) = evaluator();
    let account = directory.register("free", None);

    evaluator
        .authorize(account, Operation::Validate { count: 4 })
        .await
        .unwrap();

    // 7 > the 6 remaining: the whole request is rejected, nothing partial.
    let oversized = evaluator
        .authorize(account, Operation::Validate { count: 7 })
        .await
        .unwrap();
    assert_eq!(
        oversized,
        Decision::Denied {
            reason: DenialReason::QuotaExceeded,
            remaining: Some(6),
        }
    );

    let status = evaluator.remaining_quota(account).await.unwrap();
    assert_eq!(status.consumed, 4, "denied request must commit nothing");

    let exact = evaluator
        .authorize(account, Operation::Validate { count: 6 })
        .await
        .unwrap();
    assert_eq!(exact, Decision::Allowed { remaining: 0 });
}

#[tokio::test]
async fn sub_account_usage_attributes_to_owner() {
    let (evaluator, directory, ledger) = evaluator();
    let owner = directory.register("pro", None);
    // The nominal tier label on a sub-account is display-only.
    let sub = directory.register("free", Some(owner));

    let first = evaluator
        .authorize(sub, Operation::Validate { count: 5 })
        .await
        .unwrap();
    assert_eq!(
        first,
        Decision::Allowed {
            remaining: 10_000_000 - 5,
        }
    );

    let owner_status = evaluator.remaining_quota(owner).await.unwrap();
    assert_eq!(owner_status.consumed, 5);
    assert_eq!(owner_status.billing_account, owner);

    // The sub-account's own ledger slot stays untouched.
    let sub_record = ledger
        .current_usage(sub, ResetPolicy::Lifetime, Utc::now())
        .await
        .unwrap();
    assert_eq!(sub_record.consumed, 0);

    let second = evaluator
        .authorize(owner, Operation::Validate { count: 5 })
        .await
        .unwrap();
    assert_eq!(
        second,
        Decision::Allowed {
            remaining: 10_000_000 - 10,
        }
    );

    // Quota reads from the sub-account resolve to the shared record too.
    let shared = evaluator.remaining_quota(sub).await.unwrap();
    assert_eq!(shared.billing_account, owner);
    assert_eq!(shared.consumed, 10);
}

#[tokio::test]
async fn sub_account_features_come_from_the_owner_tier() {
    let (evaluator, directory, _) = evaluator();
    let owner = directory.register("pro", None);
    let sub = directory.register("free", Some(owner));

    // Free would deny both of these; the owning Pro subscription grants them.
    let batch = evaluator
        .authorize(sub, Operation::BatchValidate { count: 3 })
        .await
        .unwrap();
    assert!(batch.is_allowed());

    let send = evaluator.authorize(sub, Operation::SendEmail).await.unwrap();
    assert!(send.is_allowed());
}

#[tokio::test]
async fn daily_quota_resets_lazily_at_the_calendar_boundary() {
    let (evaluator, directory, _) = evaluator();
    let account = directory.register("free", None);

    let day_one = Utc.with_ymd_and_hms(2026, 8, 6, 22, 0, 0).unwrap();
    let drained = evaluator
        .authorize_at(account, Operation::Validate { count: 10 }, day_one)
        .await
        .unwrap();
    assert_eq!(drained, Decision::Allowed { remaining: 0 });

    let same_day = evaluator
        .authorize_at(account, Operation::Validate { count: 1 }, day_one)
        .await
        .unwrap();
    assert!(!same_day.is_allowed());

    // Next calendar day: the read rolls the counter and admission succeeds.
    let day_two = Utc.with_ymd_and_hms(2026, 8, 7, 1, 0, 0).unwrap();
    let status = evaluator.remaining_quota_at(account, day_two).await.unwrap();
    assert_eq!(status.consumed, 0);
    assert_eq!(
        status.resets_at,
        Some(Utc.with_ymd_and_hms(2026, 8, 8, 0, 0, 0).unwrap())
    );

    let fresh = evaluator
        .authorize_at(account, Operation::Validate { count: 1 }, day_two)
        .await
        .unwrap();
    assert_eq!(fresh, Decision::Allowed { remaining: 9 });

    // Querying again within the same day must not reset a second time.
    let later = Utc.with_ymd_and_hms(2026, 8, 7, 23, 59, 0).unwrap();
    let stable = evaluator.remaining_quota_at(account, later).await.unwrap();
    assert_eq!(stable.consumed, 1);
}

#[tokio::test]
async fn monthly_quota_rolls_into_the_next_month() {
    let (evaluator, directory, _) = evaluator();
    let account = directory.register("starter", None);

    let january = Utc.with_ymd_and_hms(2026, 1, 31, 12, 0, 0).unwrap();
    evaluator
        .authorize_at(account, Operation::Validate { count: 2_500 }, january)
        .await
        .unwrap();

    let february = Utc.with_ymd_and_hms(2026, 2, 1, 0, 30, 0).unwrap();
    let status = evaluator
        .remaining_quota_at(account, february)
        .await
        .unwrap();
    assert_eq!(status.consumed, 0);
    assert_eq!(status.remaining, 10_000);
}

#[tokio::test]
async fn unknown_tier_is_surfaced_not_defaulted() {
    let (evaluator, directory, ledger) = evaluator();
    let account = directory.register("enterprise", None);

    let err = evaluator
        .authorize(account, Operation::Validate { count: 1 })
        .await
        .unwrap_err();
    assert!(matches!(err, EntitlementError::UnknownTier(raw) if raw == "enterprise"));

    let record = ledger
        .current_usage(account, ResetPolicy::Lifetime, Utc::now())
        .await
        .unwrap();
    assert_eq!(record.consumed, 0, "failed authorize must commit nothing");
}

#[tokio::test]
async fn missing_account_is_an_error_not_a_denial() {
    let (evaluator, _, _) = evaluator();
    let err = evaluator
        .authorize(uuid::Uuid::new_v4(), Operation::Validate { count: 1 })
        .await
        .unwrap_err();
    assert!(matches!(err, EntitlementError::AccountNotFound(_)));
}

#[tokio::test]
async fn two_level_ownership_is_rejected_defensively() {
    let (evaluator, directory, _) = evaluator();
    let owner = directory.register("pro", None);
    let middle = directory.register("pro", Some(owner));
    let leaf = directory.register("free", Some(middle));

    let err = evaluator
        .authorize(leaf, Operation::Validate { count: 1 })
        .await
        .unwrap_err();
    assert!(matches!(err, EntitlementError::OwnershipCycle(id) if id == leaf));
}

#[tokio::test]
async fn send_email_charges_a_single_unit() {
    let (evaluator, directory, _) = evaluator();
    let account = directory.register("pro", None);

    let decision = evaluator
        .authorize(account, Operation::SendEmail)
        .await
        .unwrap();
    assert_eq!(
        decision,
        Decision::Allowed {
            remaining: 10_000_000 - 1,
        }
    );
}

#[tokio::test]
async fn zero_count_requests_are_rejected() {
    let (evaluator, directory, _) = evaluator();
    let account = directory.register("free", None);

    let err = evaluator
        .authorize(account, Operation::Validate { count: 0 })
        .await
        .unwrap_err();
    assert!(matches!(err, EntitlementError::InvalidRequest(_)));
}

#[tokio::test]
async fn force_reset_restores_full_quota() {
    let (evaluator, directory, _) = evaluator();
    let account = directory.register("free", None);

    evaluator
        .authorize(account, Operation::Validate { count: 10 })
        .await
        .unwrap();

    let status = evaluator.force_reset(account).await.unwrap();
    assert_eq!(status.consumed, 0);
    assert_eq!(status.remaining, 10);

    let fresh = evaluator
        .authorize(account, Operation::Validate { count: 1 })
        .await
        .unwrap();
    assert!(fresh.is_allowed());
}
