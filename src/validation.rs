use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use axum::{
    extract::{Extension, Path},
    Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::entitlements::{authorize_with_retry, Decision, EntitlementEvaluator, Operation};
use crate::error::{AppError, AppResult};

/// key: validation-engine -> external checker seam
///
/// The actual syntax/DNS/SMTP checks live outside this service; anything
/// implementing this trait can be plugged in behind the admission gate.
#[async_trait]
pub trait ValidationEngine: Send + Sync {
    async fn validate(&self, addresses: &[String]) -> Result<Vec<ValidationVerdict>>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationVerdict {
    pub address: String,
    pub valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// key: validation-engine-stub -> stand-in implementation
pub struct StubValidationEngine;

#[async_trait]
impl ValidationEngine for StubValidationEngine {
    async fn validate(&self, addresses: &[String]) -> Result<Vec<ValidationVerdict>> {
        Ok(addresses
            .iter()
            .map(|address| ValidationVerdict {
                address: address.clone(),
                valid: true,
                reason: None,
            })
            .collect())
    }
}

/// Validation entry point. Admission runs first; a denied request performs
/// no engine work at all.
pub async fn validate_emails(
    Extension(evaluator): Extension<EntitlementEvaluator>,
    Extension(engine): Extension<Arc<dyn ValidationEngine>>,
    Path(account_id): Path<Uuid>,
    Json(payload): Json<ValidateRequest>,
) -> AppResult<Json<ValidateResponse>> {
    if payload.addresses.is_empty() {
        return Err(AppError::BadRequest("at least one address required".into()));
    }

    let count = payload.addresses.len() as i64;
    let operation = if payload.batch {
        Operation::BatchValidate { count }
    } else {
        Operation::Validate { count }
    };

    let decision = authorize_with_retry(&evaluator, account_id, operation).await?;
    let results = match decision {
        Decision::Allowed { .. } => engine.validate(&payload.addresses).await.map_err(|err| {
            tracing::error!(?err, account = %account_id, "validation engine failure");
            AppError::Message("validation engine failure".to_string())
        })?,
        Decision::Denied { .. } => Vec::new(),
    };

    Ok(Json(ValidateResponse { decision, results }))
}

#[derive(Debug, Deserialize)]
pub struct ValidateRequest {
    pub addresses: Vec<String>,
    #[serde(default)]
    pub batch: bool,
}

#[derive(Debug, Serialize)]
pub struct ValidateResponse {
    pub decision: Decision,
    pub results: Vec<ValidationVerdict>,
}
