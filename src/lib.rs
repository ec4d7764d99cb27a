pub mod accounts;
pub mod config;
pub mod directory;
pub mod entitlements;
pub mod error;
pub mod routes;
pub mod validation;

pub use entitlements::{Decision, EntitlementEvaluator, Operation, TierRegistry};
