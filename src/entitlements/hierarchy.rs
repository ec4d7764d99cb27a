use std::sync::Arc;

use uuid::Uuid;

use crate::directory::AccountDirectory;

use super::models::{BillingIdentity, EntitlementError, EntitlementResult};
use super::tiers::Tier;

/// key: account-hierarchy -> billing root resolution
///
/// Sub-accounts are billed against their owner: usage attribution and
/// feature checks use the owner's tier, because the owning Pro subscription
/// is what grants them. The sub-account's own tier field stays untouched
/// here; it is a display label for the surrounding UI, nothing more.
#[derive(Clone)]
pub struct AccountHierarchyResolver {
    directory: Arc<dyn AccountDirectory>,
}

impl AccountHierarchyResolver {
    pub fn new(directory: Arc<dyn AccountDirectory>) -> Self {
        Self { directory }
    }

    /// Resolves the billing account and effective tier for `account`.
    ///
    /// The directory enforces single-level ownership at creation time; a
    /// chain deeper than one hop is treated as data corruption and surfaces
    /// as `OwnershipCycle` instead of being walked.
    pub async fn billing_account_for(&self, account: Uuid) -> EntitlementResult<BillingIdentity> {
        let record = self.directory.get_account(account).await?;

        let Some(owner_id) = record.owner_id else {
            let tier: Tier = record.tier.parse()?;
            return Ok(BillingIdentity {
                billing_account: record.id,
                tier,
            });
        };

        let owner = self.directory.get_account(owner_id).await?;
        if owner.owner_id.is_some() {
            return Err(EntitlementError::OwnershipCycle(account));
        }

        let tier: Tier = owner.tier.parse()?;
        Ok(BillingIdentity {
            billing_account: owner.id,
            tier,
        })
    }
}
