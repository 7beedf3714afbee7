//! # Parameters and Configuration
//!
//! [`PoolParams`] and [`ClaimProposalParams`] live in the store and are
//! exported with genesis. [`ShieldConfig`] is the operator-facing YAML
//! document they are seeded from, together with the shield admin and the
//! optional one-time staking rate migration.
//!
//! All durations are whole seconds.

use std::path::{Path, PathBuf};

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use shield_core::Address;

/// Nominal block interval used to convert block counts into seconds.
pub const SECONDS_PER_BLOCK: i64 = 5;

const DAY_SECS: i64 = 24 * 60 * 60;

/// Default `shield_fees_rate`: 0.769% of shield per purchase.
pub fn default_shield_fees_rate() -> Decimal {
    Decimal::new(769, 5)
}

/// Default shield staking rate before any migration.
pub fn default_shield_staking_rate() -> Decimal {
    Decimal::from(2)
}

/// Pool-level parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolParams {
    /// How long a purchase is protected.
    pub protection_period_secs: i64,
    /// Fraction of the purchased shield charged as service fees.
    pub shield_fees_rate: Decimal,
    /// Cooldown between a withdrawal request and its completion.
    pub withdraw_period_secs: i64,
    /// Coverage a new or extended pool must exceed.
    pub min_pool_life_secs: i64,
}

impl Default for PoolParams {
    fn default() -> Self {
        Self {
            protection_period_secs: 21 * DAY_SECS,
            shield_fees_rate: default_shield_fees_rate(),
            withdraw_period_secs: 21 * DAY_SECS,
            min_pool_life_secs: 56 * DAY_SECS,
        }
    }
}

impl PoolParams {
    pub fn validate(&self) -> Result<(), ConfigError> {
        positive("pool_params.protection_period_secs", self.protection_period_secs)?;
        positive("pool_params.withdraw_period_secs", self.withdraw_period_secs)?;
        positive("pool_params.min_pool_life_secs", self.min_pool_life_secs)?;
        if self.shield_fees_rate.is_sign_negative() || self.shield_fees_rate > Decimal::ONE {
            return Err(ConfigError::Invalid {
                field: "pool_params.shield_fees_rate",
                reason: format!("{} is outside [0, 1]", self.shield_fees_rate),
            });
        }
        Ok(())
    }
}

/// Claim proposal parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClaimProposalParams {
    /// Window after protection ends during which a claim may still be filed.
    pub claim_period_secs: i64,
    /// Delay between approval and the earliest payout.
    pub payout_period_secs: i64,
    /// How far unbonding entries backing a lock are pushed out.
    pub lock_period_secs: i64,
}

impl Default for ClaimProposalParams {
    fn default() -> Self {
        Self {
            claim_period_secs: 21 * DAY_SECS,
            payout_period_secs: 56 * DAY_SECS,
            lock_period_secs: 28 * DAY_SECS,
        }
    }
}

impl ClaimProposalParams {
    pub fn validate(&self) -> Result<(), ConfigError> {
        positive("claim_params.claim_period_secs", self.claim_period_secs)?;
        positive("claim_params.payout_period_secs", self.payout_period_secs)?;
        positive("claim_params.lock_period_secs", self.lock_period_secs)
    }
}

/// One-time staking rate change applied at a block height.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StakingRateMigration {
    pub height: u64,
    pub rate: Decimal,
}

/// Operator configuration.
///
/// ```yaml
/// admin: cosmos1admin
/// pool_params:
///   withdraw_period_secs: 86400
/// claim_params:
///   payout_period_secs: 3600
/// staking_rate_migration:
///   height: 1200
///   rate: "1.5"
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShieldConfig {
    pub admin: Option<Address>,
    pub pool_params: PoolParams,
    pub claim_params: ClaimProposalParams,
    pub staking_rate_migration: Option<StakingRateMigration>,
}

impl ShieldConfig {
    pub fn from_yaml_str(yaml: &str) -> Result<Self, ConfigError> {
        let config: ShieldConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml_str(&text)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.pool_params.validate()?;
        self.claim_params.validate()?;
        if let Some(m) = &self.staking_rate_migration {
            if m.rate <= Decimal::ZERO {
                return Err(ConfigError::Invalid {
                    field: "staking_rate_migration.rate",
                    reason: format!("{} must be positive", m.rate),
                });
            }
            if m.height == 0 {
                return Err(ConfigError::Invalid {
                    field: "staking_rate_migration.height",
                    reason: "height 0 is never executed".to_string(),
                });
            }
        }
        Ok(())
    }
}

/// Configuration loading failures.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("cannot read config {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("config is not valid YAML: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("invalid {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

fn positive(field: &'static str, secs: i64) -> Result<(), ConfigError> {
    if secs <= 0 {
        return Err(ConfigError::Invalid {
            field,
            reason: format!("{secs} must be a positive number of seconds"),
        });
    }
    Ok(())
}
