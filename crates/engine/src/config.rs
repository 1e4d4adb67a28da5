//! Engine configuration.
//!
//! Loaded from `TALLYUP_*` environment variables (missing ones fall back to
//! defaults) or from a JSON file with the same fields.

use std::path::Path;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use tallyup_core::{Currency, Money};
use tallyup_observability::LogFormat;
use tallyup_settlement::DebtSimplifier;
use tallyup_splits::SplitCalculator;

pub const ENV_CURRENCY: &str = "TALLYUP_CURRENCY";
pub const ENV_SPLIT_TOLERANCE: &str = "TALLYUP_SPLIT_TOLERANCE";
pub const ENV_PERCENTAGE_TOLERANCE: &str = "TALLYUP_PERCENTAGE_TOLERANCE";
pub const ENV_SETTLE_TOLERANCE: &str = "TALLYUP_SETTLE_TOLERANCE";
pub const ENV_LOG_FORMAT: &str = "TALLYUP_LOG_FORMAT";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value '{value}' for {key}: {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },

    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed config file: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// ISO code of the currency new groups are created in.
    pub default_currency: String,
    /// How far exact split amounts may drift from the total, in minor units.
    pub split_tolerance: i64,
    /// How far percentage splits may drift from 100.
    pub percentage_tolerance: Decimal,
    /// Balances within this many minor units count as settled.
    pub settle_tolerance: i64,
    pub log_format: LogFormat,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_currency: "USD".to_string(),
            split_tolerance: 1,
            percentage_tolerance: Decimal::new(1, 2),
            settle_tolerance: 0,
            log_format: LogFormat::Json,
        }
    }
}

impl EngineConfig {
    /// Read `TALLYUP_*` from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup (the environment, a map in tests, ...).
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(code) = lookup(ENV_CURRENCY) {
            config.default_currency = code;
        }
        if let Some(raw) = lookup(ENV_SPLIT_TOLERANCE) {
            config.split_tolerance = parse(ENV_SPLIT_TOLERANCE, &raw)?;
        }
        if let Some(raw) = lookup(ENV_PERCENTAGE_TOLERANCE) {
            config.percentage_tolerance = parse(ENV_PERCENTAGE_TOLERANCE, &raw)?;
        }
        if let Some(raw) = lookup(ENV_SETTLE_TOLERANCE) {
            config.settle_tolerance = parse(ENV_SETTLE_TOLERANCE, &raw)?;
        }
        if let Some(raw) = lookup(ENV_LOG_FORMAT) {
            config.log_format = parse(ENV_LOG_FORMAT, &raw)?;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn from_json_str(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json_str(&raw)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.currency()?;
        if self.split_tolerance < 0 {
            return Err(invalid(ENV_SPLIT_TOLERANCE, self.split_tolerance, "must not be negative"));
        }
        if self.percentage_tolerance < Decimal::ZERO {
            return Err(invalid(
                ENV_PERCENTAGE_TOLERANCE,
                self.percentage_tolerance,
                "must not be negative",
            ));
        }
        if self.settle_tolerance < 0 {
            return Err(invalid(
                ENV_SETTLE_TOLERANCE,
                self.settle_tolerance,
                "must not be negative",
            ));
        }
        Ok(())
    }

    pub fn currency(&self) -> Result<Currency, ConfigError> {
        Currency::iso(&self.default_currency)
            .map_err(|err| invalid(ENV_CURRENCY, &self.default_currency, err))
    }

    pub fn calculator(&self) -> SplitCalculator {
        SplitCalculator::new(
            Money::from_minor(self.split_tolerance),
            self.percentage_tolerance,
        )
    }

    pub fn simplifier(&self) -> DebtSimplifier {
        DebtSimplifier::with_tolerance(Money::from_minor(self.settle_tolerance))
    }
}

fn parse<T>(key: &'static str, raw: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim().parse().map_err(|err| invalid(key, raw, err))
}

fn invalid(
    key: &'static str,
    value: impl std::fmt::Display,
    reason: impl std::fmt::Display,
) -> ConfigError {
    ConfigError::Invalid {
        key,
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_apply_when_nothing_is_set() {
        let config = EngineConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, EngineConfig::default());
        assert_eq!(config.currency().unwrap(), Currency::usd());
        assert_eq!(config.calculator(), SplitCalculator::default());
    }

    #[test]
    fn environment_overrides_defaults() {
        let config = EngineConfig::from_lookup(lookup(&[
            (ENV_CURRENCY, "jpy"),
            (ENV_SETTLE_TOLERANCE, "5"),
            (ENV_LOG_FORMAT, "pretty"),
        ]))
        .unwrap();
        assert_eq!(config.currency().unwrap(), Currency::jpy());
        assert_eq!(config.simplifier().tolerance(), Money::from_minor(5));
        assert_eq!(config.log_format, LogFormat::Pretty);
    }

    #[test]
    fn bad_values_name_their_variable() {
        let err = EngineConfig::from_lookup(lookup(&[(ENV_SPLIT_TOLERANCE, "lots")])).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid {
                key: ENV_SPLIT_TOLERANCE,
                ..
            }
        ));

        let err = EngineConfig::from_lookup(lookup(&[(ENV_CURRENCY, "dollars")])).unwrap_err();
        assert!(err.to_string().contains(ENV_CURRENCY));
    }

    #[test]
    fn json_fields_are_optional() {
        let config =
            EngineConfig::from_json_str(r#"{ "default_currency": "EUR", "log_format": "compact" }"#)
                .unwrap();
        assert_eq!(config.currency().unwrap(), Currency::eur());
        assert_eq!(config.split_tolerance, 1);
        assert_eq!(config.log_format, LogFormat::Compact);
    }
}
