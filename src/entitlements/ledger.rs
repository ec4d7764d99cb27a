use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use sqlx::PgPool;
use uuid::Uuid;

use super::models::{CommitOutcome, EntitlementError, EntitlementResult, UsageRecord, UsageSnapshot};
use super::tiers::ResetPolicy;

/// Attempts to apply a read-triggered reset before reporting a storage race.
const LEDGER_RESET_ATTEMPTS: usize = 3;

/// key: usage-ledger -> per billing account consumption counter
///
/// Implementations must make `try_commit` behave as if serialized per
/// billing account: the ceiling comparison and the increment are one atomic
/// step, so concurrent near-limit commits can never overshoot. Resets are
/// applied lazily at read time; there is no background sweep.
#[async_trait]
pub trait UsageLedger: Send + Sync {
    /// Effective usage after lazy reset. If the stored period is stale the
    /// record is rolled forward before returning, so subsequent reads agree.
    async fn current_usage(
        &self,
        billing_account: Uuid,
        policy: ResetPolicy,
        now: DateTime<Utc>,
    ) -> EntitlementResult<UsageSnapshot>;

    /// Atomic increment-with-ceiling. Commits `delta` in full or not at all.
    async fn try_commit(
        &self,
        billing_account: Uuid,
        delta: i64,
        ceiling: i64,
        policy: ResetPolicy,
        now: DateTime<Utc>,
    ) -> EntitlementResult<CommitOutcome>;

    /// Administrative remediation: zero the counter and restart the current
    /// period.
    async fn force_reset(
        &self,
        billing_account: Uuid,
        policy: ResetPolicy,
        now: DateTime<Utc>,
    ) -> EntitlementResult<()>;
}

/// key: usage-ledger-postgres -> usage_records table
#[derive(Clone)]
pub struct PgUsageLedger {
    pool: PgPool,
}

impl PgUsageLedger {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn ensure_record(
        &self,
        billing_account: Uuid,
        period_start: Option<DateTime<Utc>>,
    ) -> EntitlementResult<()> {
        sqlx::query(
            r#"
            INSERT INTO usage_records (billing_account_id, consumed, period_start)
            VALUES ($1, 0, $2)
            ON CONFLICT (billing_account_id) DO NOTHING
            "#,
        )
        .bind(billing_account)
        .bind(period_start)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn read_record(&self, billing_account: Uuid) -> EntitlementResult<UsageRecord> {
        let record = sqlx::query_as::<_, UsageRecord>(
            "SELECT billing_account_id, consumed, period_start, updated_at \
            FROM usage_records WHERE billing_account_id = $1",
        )
        .bind(billing_account)
        .fetch_one(&self.pool)
        .await?;
        Ok(record)
    }
}

#[async_trait]
impl UsageLedger for PgUsageLedger {
    async fn current_usage(
        &self,
        billing_account: Uuid,
        policy: ResetPolicy,
        now: DateTime<Utc>,
    ) -> EntitlementResult<UsageSnapshot> {
        let current_start = policy.period_start(now);
        self.ensure_record(billing_account, current_start).await?;

        for _ in 0..LEDGER_RESET_ATTEMPTS {
            let record = self.read_record(billing_account).await?;
            let stale = match (current_start, record.period_start) {
                (Some(current), Some(stored)) => stored < current,
                (Some(_), None) => true,
                (None, _) => false,
            };
            if !stale {
                return Ok(UsageSnapshot {
                    consumed: record.consumed,
                    period_start: record.period_start,
                });
            }

            let rolled = sqlx::query(
                r#"
                UPDATE usage_records
                SET consumed = 0, period_start = $2, updated_at = NOW()
                WHERE billing_account_id = $1
                  AND period_start IS NOT DISTINCT FROM $3
                "#,
            )
            .bind(billing_account)
            .bind(current_start)
            .bind(record.period_start)
            .execute(&self.pool)
            .await?;
            if rolled.rows_affected() == 1 {
                return Ok(UsageSnapshot {
                    consumed: 0,
                    period_start: current_start,
                });
            }
            // lost the roll race to another worker; re-read
        }

        Err(EntitlementError::ConcurrentModification(billing_account))
    }

    async fn try_commit(
        &self,
        billing_account: Uuid,
        delta: i64,
        ceiling: i64,
        policy: ResetPolicy,
        now: DateTime<Utc>,
    ) -> EntitlementResult<CommitOutcome> {
        let snapshot = self.current_usage(billing_account, policy, now).await?;

        // The guard on period_start keeps a racing reset from absorbing this
        // delta into the wrong period; the ceiling predicate is evaluated on
        // the locked row, so admission is exact under concurrency.
        let updated: Option<(i64,)> = sqlx::query_as(
            r#"
            UPDATE usage_records
            SET consumed = consumed + $2, updated_at = NOW()
            WHERE billing_account_id = $1
              AND period_start IS NOT DISTINCT FROM $3
              AND consumed + $2 <= $4
            RETURNING consumed
            "#,
        )
        .bind(billing_account)
        .bind(delta)
        .bind(snapshot.period_start)
        .bind(ceiling)
        .fetch_optional(&self.pool)
        .await?;

        if let Some((consumed,)) = updated {
            return Ok(CommitOutcome::Committed { consumed });
        }

        let record = self.read_record(billing_account).await?;
        if record.period_start != snapshot.period_start {
            return Err(EntitlementError::ConcurrentModification(billing_account));
        }
        Ok(CommitOutcome::LimitExceeded {
            consumed: record.consumed,
        })
    }

    async fn force_reset(
        &self,
        billing_account: Uuid,
        policy: ResetPolicy,
        now: DateTime<Utc>,
    ) -> EntitlementResult<()> {
        sqlx::query(
            r#"
            INSERT INTO usage_records (billing_account_id, consumed, period_start)
            VALUES ($1, 0, $2)
            ON CONFLICT (billing_account_id)
            DO UPDATE SET consumed = 0, period_start = EXCLUDED.period_start, updated_at = NOW()
            "#,
        )
        .bind(billing_account)
        .bind(policy.period_start(now))
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
struct StoredUsage {
    consumed: i64,
    period_start: Option<DateTime<Utc>>,
}

/// key: usage-ledger-memory -> dashmap-backed ledger
///
/// The per-key entry lock serializes read-compare-commit, so this backend
/// never reports `ConcurrentModification`.
#[derive(Default)]
pub struct MemoryUsageLedger {
    records: DashMap<Uuid, StoredUsage>,
}

impl MemoryUsageLedger {
    pub fn new() -> Self {
        Self::default()
    }
}

fn roll_if_stale(record: &mut StoredUsage, policy: ResetPolicy, now: DateTime<Utc>) {
    let Some(current_start) = policy.period_start(now) else {
        return;
    };
    match record.period_start {
        Some(stored) if stored >= current_start => {}
        _ => {
            record.consumed = 0;
            record.period_start = Some(current_start);
        }
    }
}

#[async_trait]
impl UsageLedger for MemoryUsageLedger {
    async fn current_usage(
        &self,
        billing_account: Uuid,
        policy: ResetPolicy,
        now: DateTime<Utc>,
    ) -> EntitlementResult<UsageSnapshot> {
        let mut record = self
            .records
            .entry(billing_account)
            .or_insert_with(|| StoredUsage {
                consumed: 0,
                period_start: policy.period_start(now),
            });
        roll_if_stale(&mut record, policy, now);
        Ok(UsageSnapshot {
            consumed: record.consumed,
            period_start: record.period_start,
        })
    }

    async fn try_commit(
        &self,
        billing_account: Uuid,
        delta: i64,
        ceiling: i64,
        policy: ResetPolicy,
        now: DateTime<Utc>,
    ) -> EntitlementResult<CommitOutcome> {
        let mut record = self
            .records
            .entry(billing_account)
            .or_insert_with(|| StoredUsage {
                consumed: 0,
                period_start: policy.period_start(now),
            });
        roll_if_stale(&mut record, policy, now);
        if record.consumed + delta > ceiling {
            return Ok(CommitOutcome::LimitExceeded {
                consumed: record.consumed,
            });
        }
        record.consumed += delta;
        Ok(CommitOutcome::Committed {
            consumed: record.consumed,
        })
    }

    async fn force_reset(
        &self,
        billing_account: Uuid,
        policy: ResetPolicy,
        now: DateTime<Utc>,
    ) -> EntitlementResult<()> {
        self.records.insert(
            billing_account,
            StoredUsage {
                consumed: 0,
                period_start: policy.period_start(now),
            },
        );
        Ok(())
    }
}
