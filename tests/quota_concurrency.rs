use std::sync::Arc;

use chrono::{TimeZone, Utc};
use futures_util::future::join_all;
use mailcheck_backend::directory::MemoryAccountDirectory;
use mailcheck_backend::entitlements::{
    Decision, DenialReason, EntitlementEvaluator, MemoryUsageLedger, Operation, TierRegistry,
};

// key: entitlement-tests -> monotonic limit enforcement under contention
#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn concurrent_single_validations_never_overshoot_the_limit() {
    let directory = Arc::new(MemoryAccountDirectory::new());
    let ledger = Arc::new(MemoryUsageLedger::new());
    let evaluator =
        EntitlementEvaluator::new(TierRegistry::defaults(), directory.clone(), ledger.clone());
    let account = directory.register("free", None);
    let now = Utc.with_ymd_and_hms(2026, 8, 6, 12, 0, 0).unwrap();

    let tasks: Vec<_> = (0..1000)
        .map(|_| {
            let evaluator = evaluator.clone();
            tokio::spawn(async move {
                evaluator
                    .authorize_at(account, Operation::Validate { count: 1 }, now)
                    .await
                    .unwrap()
            })
        })
        .collect();

    let mut allowed = 0usize;
    let mut denied = 0usize;
    for result in join_all(tasks).await {
        match result.unwrap() {
            Decision::Allowed { .. } => allowed += 1,
            Decision::Denied {
                reason: DenialReason::QuotaExceeded,
                ..
            } => denied += 1,
            other => panic!("unexpected decision under contention: {other:?}"),
        }
    }

    assert_eq!(allowed, 10, "exactly the limit must be admitted");
    assert_eq!(denied, 990);

    let status = evaluator.remaining_quota_at(account, now).await.unwrap();
    assert_eq!(status.consumed, 10);
    assert_eq!(status.remaining, 0);
}

// key: entitlement-tests -> all-or-nothing batches under contention
#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn concurrent_batches_commit_fully_or_not_at_all() {
    let directory = Arc::new(MemoryAccountDirectory::new());
    let ledger = Arc::new(MemoryUsageLedger::new());
    let evaluator =
        EntitlementEvaluator::new(TierRegistry::defaults(), directory.clone(), ledger.clone());
    let account = directory.register("free", None);
    let now = Utc.with_ymd_and_hms(2026, 8, 6, 12, 0, 0).unwrap();

    // Limit 10, requests of 3: at most three can land, and the final count
    // must be an exact multiple of the batch size.
    let tasks: Vec<_> = (0..50)
        .map(|_| {
            let evaluator = evaluator.clone();
            tokio::spawn(async move {
                evaluator
                    .authorize_at(account, Operation::Validate { count: 3 }, now)
                    .await
                    .unwrap()
            })
        })
        .collect();

    let allowed = join_all(tasks)
        .await
        .into_iter()
        .filter(|result| result.as_ref().unwrap().is_allowed())
        .count();

    assert_eq!(allowed, 3);
    let status = evaluator.remaining_quota_at(account, now).await.unwrap();
    assert_eq!(status.consumed, allowed as i64 * 3);
}
