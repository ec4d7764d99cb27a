use axum::extract::Path;
use axum::{Extension, Json};
use sqlx::PgPool;
use uuid::Uuid;

use crate::entitlements::{AccountRecord, Tier};
use crate::error::{AppError, AppResult};

#[derive(serde::Deserialize)]
pub struct NewAccount {
    pub tier: String,
    pub owner_id: Option<Uuid>,
}

/// Provisioning write path for the account directory. Ownership rules are
/// enforced here, at creation time: only Pro accounts own sub-accounts, and
/// ownership is a single level deep.
pub async fn create_account(
    Extension(pool): Extension<PgPool>,
    Json(payload): Json<NewAccount>,
) -> AppResult<Json<AccountRecord>> {
    let tier: Tier = payload
        .tier
        .parse()
        .map_err(|_| AppError::BadRequest(format!("unknown tier `{}`", payload.tier)))?;

    if let Some(owner_id) = payload.owner_id {
        let owner = fetch_account(&pool, owner_id).await?;
        let Some(owner) = owner else {
            return Err(AppError::BadRequest("owner account does not exist".into()));
        };
        if owner.is_sub_account() {
            return Err(AppError::BadRequest(
                "sub-accounts cannot own sub-accounts".into(),
            ));
        }
        if owner.tier.parse::<Tier>().ok() != Some(Tier::Pro) {
            return Err(AppError::BadRequest(
                "only pro accounts may own sub-accounts".into(),
            ));
        }
    }

    let record = sqlx::query_as::<_, AccountRecord>(
        "INSERT INTO accounts (id, tier, owner_id) VALUES ($1, $2, $3) \
        RETURNING id, tier, owner_id, created_at, updated_at",
    )
    .bind(Uuid::new_v4())
    .bind(tier.as_str())
    .bind(payload.owner_id)
    .fetch_one(&pool)
    .await
    .map_err(|e| {
        tracing::error!(?e, "DB error creating account");
        AppError::Db(e)
    })?;

    tracing::info!(
        account = %record.id,
        tier = %record.tier,
        owner = ?record.owner_id,
        "account provisioned"
    );
    Ok(Json(record))
}

/// Returns the stored record as-is. A sub-account's tier field is its
/// nominal label; quota endpoints resolve through the owner instead.
pub async fn get_account(
    Extension(pool): Extension<PgPool>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<AccountRecord>> {
    let record = fetch_account(&pool, id).await?;
    let Some(record) = record else {
        return Err(AppError::NotFound);
    };
    Ok(Json(record))
}

async fn fetch_account(pool: &PgPool, id: Uuid) -> AppResult<Option<AccountRecord>> {
    sqlx::query_as::<_, AccountRecord>(
        "SELECT id, tier, owner_id, created_at, updated_at FROM accounts WHERE id = $1",
    )
    .bind(id)
    .fetch_optional(pool)
    .await
    .map_err(|e| {
        tracing::error!(?e, "DB error fetching account");
        AppError::Db(e)
    })
}
