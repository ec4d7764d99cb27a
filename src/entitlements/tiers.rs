use std::collections::HashMap;
use std::str::FromStr;

use chrono::{DateTime, Datelike, Duration, Months, NaiveDate, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::config;

use super::models::EntitlementError;

/// key: tier-registry -> closed tier enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Free,
    Starter,
    Pro,
}

impl Tier {
    pub const ALL: [Tier; 3] = [Tier::Free, Tier::Starter, Tier::Pro];

    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Free => "free",
            Tier::Starter => "starter",
            Tier::Pro => "pro",
        }
    }
}

impl FromStr for Tier {
    type Err = EntitlementError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "free" => Ok(Tier::Free),
            "starter" => Ok(Tier::Starter),
            "pro" => Ok(Tier::Pro),
            _ => Err(EntitlementError::UnknownTier(raw.to_string())),
        }
    }
}

impl std::fmt::Display for Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// key: tier-registry -> usage reset cadence
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResetPolicy {
    Daily,
    Monthly,
    Lifetime,
}

impl ResetPolicy {
    /// Start of the period containing `now`. `None` for counters that never
    /// reset.
    pub fn period_start(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self {
            ResetPolicy::Daily => Some(
                Utc.with_ymd_and_hms(now.year(), now.month(), now.day(), 0, 0, 0)
                    .single()
                    .unwrap(),
            ),
            ResetPolicy::Monthly => {
                let start_date = NaiveDate::from_ymd_opt(now.year(), now.month(), 1)
                    .unwrap()
                    .and_hms_opt(0, 0, 0)
                    .unwrap();
                Some(Utc.from_utc_datetime(&start_date))
            }
            ResetPolicy::Lifetime => None,
        }
    }

    pub fn period_end(&self, period_start: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self {
            ResetPolicy::Daily => Some(period_start + Duration::days(1)),
            ResetPolicy::Monthly => Some(period_start + Months::new(1)),
            ResetPolicy::Lifetime => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierFeatures {
    pub batch_validation: bool,
    pub email_sending: bool,
}

/// key: tier-registry -> entitlement bundle per tier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierBundle {
    pub limit: i64,
    pub reset: ResetPolicy,
    pub features: TierFeatures,
}

/// Partial bundle override applied over the built-in defaults at process
/// start via the `TIER_OVERRIDES` env variable.
#[derive(Debug, Clone, Deserialize)]
pub struct TierBundleOverride {
    pub limit: Option<i64>,
    pub reset: Option<ResetPolicy>,
    pub features: Option<TierFeatures>,
}

/// key: tier-registry -> single source of truth for limits and features
///
/// Immutable after construction; the only mutation path is the
/// deployment-time override merge in [`TierRegistry::from_env`]. Presentation
/// layers must read bundles through the catalog endpoint instead of holding
/// their own copies.
#[derive(Debug, Clone)]
pub struct TierRegistry {
    bundles: HashMap<Tier, TierBundle>,
}

impl TierRegistry {
    pub fn defaults() -> Self {
        let mut bundles = HashMap::new();
        bundles.insert(
            Tier::Free,
            TierBundle {
                limit: 10,
                reset: ResetPolicy::Daily,
                features: TierFeatures {
                    batch_validation: false,
                    email_sending: false,
                },
            },
        );
        bundles.insert(
            Tier::Starter,
            TierBundle {
                limit: 10_000,
                reset: ResetPolicy::Monthly,
                features: TierFeatures {
                    batch_validation: true,
                    email_sending: false,
                },
            },
        );
        bundles.insert(
            Tier::Pro,
            TierBundle {
                limit: 10_000_000,
                reset: ResetPolicy::Lifetime,
                features: TierFeatures {
                    batch_validation: true,
                    email_sending: true,
                },
            },
        );
        Self { bundles }
    }

    /// Defaults merged with `TIER_OVERRIDES`. Malformed overrides abort
    /// startup rather than run with a half-applied tier table.
    pub fn from_env() -> Self {
        let mut registry = Self::defaults();
        let overrides = config::TIER_OVERRIDES.clone();
        let Some(map) = overrides.as_object() else {
            if !overrides.is_null() {
                panic!("TIER_OVERRIDES must be a JSON object keyed by tier name");
            }
            return registry;
        };

        for (raw_tier, raw_override) in map {
            let tier = Tier::from_str(raw_tier)
                .unwrap_or_else(|_| panic!("TIER_OVERRIDES references unknown tier '{raw_tier}'"));
            let patch: TierBundleOverride = serde_json::from_value(raw_override.clone())
                .unwrap_or_else(|err| panic!("invalid TIER_OVERRIDES entry for '{raw_tier}': {err}"));
            registry.apply_override(tier, patch);
        }
        registry
    }

    fn apply_override(&mut self, tier: Tier, patch: TierBundleOverride) {
        let bundle = self
            .bundles
            .get_mut(&tier)
            .expect("default registry covers every tier");
        if let Some(limit) = patch.limit {
            if limit <= 0 {
                panic!("TIER_OVERRIDES limit for '{tier}' must be positive");
            }
            bundle.limit = limit;
        }
        if let Some(reset) = patch.reset {
            bundle.reset = reset;
        }
        if let Some(features) = patch.features {
            bundle.features = features;
        }
    }

    pub fn lookup(&self, tier: Tier) -> Result<TierBundle, EntitlementError> {
        self.bundles
            .get(&tier)
            .copied()
            .ok_or_else(|| EntitlementError::UnknownTier(tier.as_str().to_string()))
    }

    pub fn catalog(&self) -> Vec<(Tier, TierBundle)> {
        Tier::ALL
            .iter()
            .filter_map(|tier| self.bundles.get(tier).map(|bundle| (*tier, *bundle)))
            .collect()
    }
}
