use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use sqlx::PgPool;
use uuid::Uuid;

use crate::entitlements::{AccountRecord, EntitlementError, EntitlementResult};

/// key: account-directory -> read seam over persisted account records
///
/// The directory owns account lifecycle (creation rules, deletion); the
/// entitlement core only ever reads from it.
#[async_trait]
pub trait AccountDirectory: Send + Sync {
    async fn get_account(&self, id: Uuid) -> EntitlementResult<AccountRecord>;
}

/// key: account-directory-postgres -> accounts table
#[derive(Clone)]
pub struct PgAccountDirectory {
    pool: PgPool,
}

impl PgAccountDirectory {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AccountDirectory for PgAccountDirectory {
    async fn get_account(&self, id: Uuid) -> EntitlementResult<AccountRecord> {
        let record = sqlx::query_as::<_, AccountRecord>(
            "SELECT id, tier, owner_id, created_at, updated_at FROM accounts WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        record.ok_or(EntitlementError::AccountNotFound(id))
    }
}

/// key: account-directory-memory -> dashmap-backed directory
///
/// Accepts whatever records are inserted, including ones the creation rules
/// would reject, so resolver defenses can be exercised.
#[derive(Default)]
pub struct MemoryAccountDirectory {
    accounts: DashMap<Uuid, AccountRecord>,
}

impl MemoryAccountDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, record: AccountRecord) {
        self.accounts.insert(record.id, record);
    }

    /// Convenience for tests and local runs: registers an account with the
    /// given tier label and optional owner, returning its id.
    pub fn register(&self, tier: &str, owner_id: Option<Uuid>) -> Uuid {
        let id = Uuid::new_v4();
        let now = Utc::now();
        self.insert(AccountRecord {
            id,
            tier: tier.to_string(),
            owner_id,
            created_at: now,
            updated_at: now,
        });
        id
    }
}

#[async_trait]
impl AccountDirectory for MemoryAccountDirectory {
    async fn get_account(&self, id: Uuid) -> EntitlementResult<AccountRecord> {
        self.accounts
            .get(&id)
            .map(|record| record.clone())
            .ok_or(EntitlementError::AccountNotFound(id))
    }
}
