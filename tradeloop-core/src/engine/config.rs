//! Engine configuration.
//!
//! Deserialized from TOML; every field has a default so partial files
//! work. `validate` is called when the config is applied, including on
//! hot reload, and a config that fails validation is discarded.

use crate::hooks::ConfigError;
use crate::protection::RoiTable;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    /// Candle duration in seconds.
    pub timeframe_secs: u64,
    /// Live-mode polling interval.
    pub tick_interval_secs: u64,
    /// Stake proposed to the stake hook for each new entry.
    pub stake_amount: f64,
    pub min_stake: f64,
    pub max_stake: f64,
    pub max_open_trades: usize,
    pub default_leverage: f64,
    /// Initial stoploss as a signed profit ratio, e.g. -0.05.
    pub stoploss: f64,
    pub trailing: Option<TrailingConfig>,
    pub roi: RoiTable,
    /// Bars a pair stays blocked after its trade closes.
    pub cooldown_bars: usize,
    /// Entry prices from the price hook are clamped to within this
    /// ratio of the candle close.
    pub max_entry_price_distance_ratio: f64,
    pub unfilled_entry_timeout_secs: u64,
    pub unfilled_exit_timeout_secs: u64,
    pub allow_shorts: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrailingConfig {
    /// Trailing distance below the high-water mark, as a positive ratio.
    pub positive_ratio: f64,
    /// Profit ratio that must be reached before trailing activates.
    pub positive_offset: f64,
    /// When true, the initial stoploss stays in force until the offset
    /// is reached; when false, trailing starts immediately.
    pub only_offset_is_reached: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            timeframe_secs: 3600,
            tick_interval_secs: 5,
            stake_amount: 100.0,
            min_stake: 10.0,
            max_stake: 1000.0,
            max_open_trades: 3,
            default_leverage: 1.0,
            stoploss: -0.10,
            trailing: None,
            roi: RoiTable::default(),
            cooldown_bars: 2,
            max_entry_price_distance_ratio: 0.02,
            unfilled_entry_timeout_secs: 600,
            unfilled_exit_timeout_secs: 600,
            allow_shorts: false,
        }
    }
}

impl EngineConfig {
    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        let cfg: Self =
            toml::from_str(text).map_err(|e| ConfigError::Invalid(e.to_string()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.timeframe_secs == 0 {
            return Err(ConfigError::Invalid("timeframe_secs must be positive".into()));
        }
        if self.stoploss >= 0.0 || !self.stoploss.is_finite() {
            return Err(ConfigError::Invalid(format!(
                "stoploss must be a negative ratio, got {}",
                self.stoploss
            )));
        }
        if self.stake_amount <= 0.0 || self.min_stake < 0.0 || self.max_stake < self.min_stake {
            return Err(ConfigError::Invalid(
                "stake bounds must satisfy 0 <= min_stake <= max_stake, stake_amount > 0".into(),
            ));
        }
        if self.max_open_trades == 0 {
            return Err(ConfigError::Invalid("max_open_trades must be at least 1".into()));
        }
        if self.default_leverage < 1.0 {
            return Err(ConfigError::Invalid("default_leverage must be >= 1".into()));
        }
        if self.max_entry_price_distance_ratio < 0.0 {
            return Err(ConfigError::Invalid(
                "max_entry_price_distance_ratio must be non-negative".into(),
            ));
        }
        if let Some(trailing) = &self.trailing {
            if trailing.positive_ratio <= 0.0 || trailing.positive_offset < 0.0 {
                return Err(ConfigError::Invalid(
                    "trailing.positive_ratio must be > 0 and positive_offset >= 0".into(),
                ));
            }
        }
        Ok(())
    }

    /// Order timeout for the given side.
    pub fn unfilled_timeout_secs(&self, side: crate::domain::OrderSide) -> u64 {
        match side {
            crate::domain::OrderSide::Entry => self.unfilled_entry_timeout_secs,
            crate::domain::OrderSide::Exit => self.unfilled_exit_timeout_secs,
        }
    }
}
