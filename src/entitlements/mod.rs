pub mod api;
pub mod evaluator;
pub mod hierarchy;
pub mod ledger;
pub mod models;
pub mod tiers;

pub use api::{
    authorize_operation, authorize_with_retry, force_reset_usage, list_tiers, read_quota,
    AuthorizeRequest, OperationKind, TierCatalogEntry,
};
pub use evaluator::EntitlementEvaluator;
pub use hierarchy::AccountHierarchyResolver;
pub use ledger::{MemoryUsageLedger, PgUsageLedger, UsageLedger};
pub use models::{
    AccountRecord, BillingIdentity, CommitOutcome, Decision, DenialReason, EntitlementError,
    EntitlementResult, Operation, QuotaStatus, UsageRecord, UsageSnapshot,
};
pub use tiers::{ResetPolicy, Tier, TierBundle, TierFeatures, TierRegistry};
