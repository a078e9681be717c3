//! Configuration types

use crate::constants::{
    DEFAULT_CACHE_ADDRESS, DEFAULT_CACHE_TTL_SECS, DEFAULT_FLUSH_BATCH_SIZE,
    DEFAULT_FLUSH_INTERVAL_MS, DEFAULT_OPERATION_TIMEOUT_MS, DEFAULT_WIDENING_CEILING,
};
use crate::{CoherentError, CoherentResult, ConfigError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Consistency strategy selected at deployment time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    /// Cache writes synchronously persist through to the store.
    ReadWriteThrough,
    /// The application manages the cache; range queries may be widened.
    CacheAside,
    /// Writes land in the cache and a dirty set; a periodic flush persists them.
    #[default]
    WriteBack,
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::ReadWriteThrough => "read_write_through",
            Self::CacheAside => "cache_aside",
            Self::WriteBack => "write_back",
        };
        f.write_str(name)
    }
}

impl FromStr for StrategyKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "read_write_through" | "write_through" => Ok(Self::ReadWriteThrough),
            "cache_aside" => Ok(Self::CacheAside),
            "write_back" => Ok(Self::WriteBack),
            other => Err(ConfigError::InvalidValue {
                field: "strategy".to_string(),
                value: other.to_string(),
                reason: "expected read_write_through, cache_aside or write_back".to_string(),
            }),
        }
    }
}

/// Master configuration struct.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoherentConfig {
    pub strategy: StrategyKind,
    /// TTL applied to cached entries.
    pub entry_ttl: Duration,
    /// Interval between write-back flush ticks.
    pub flush_interval: Duration,
    /// Dirty-set members fetched per cursor step.
    pub flush_batch_size: usize,
    /// Cache backend connection address.
    pub cache_address: String,
    /// Upper bound of the numeric field when relaxing a max bound.
    pub widening_ceiling: u32,
    /// Timeout applied to store and cache calls made by background work.
    pub operation_timeout: Duration,
}

impl Default for CoherentConfig {
    fn default() -> Self {
        Self {
            strategy: StrategyKind::default(),
            entry_ttl: Duration::from_secs(DEFAULT_CACHE_TTL_SECS),
            flush_interval: Duration::from_millis(DEFAULT_FLUSH_INTERVAL_MS),
            flush_batch_size: DEFAULT_FLUSH_BATCH_SIZE,
            cache_address: DEFAULT_CACHE_ADDRESS.to_string(),
            widening_ceiling: DEFAULT_WIDENING_CEILING,
            operation_timeout: Duration::from_millis(DEFAULT_OPERATION_TIMEOUT_MS),
        }
    }
}

impl CoherentConfig {
    /// Create from environment variables with fallback to defaults.
    ///
    /// Environment variables:
    /// - `COHERENT_STRATEGY`: `read_write_through`, `cache_aside` or `write_back` (default: write_back)
    /// - `COHERENT_CACHE_TTL_SECS`: Cache entry TTL (default: 300)
    /// - `COHERENT_FLUSH_INTERVAL_MS`: Write-back flush interval (default: 5000)
    /// - `COHERENT_FLUSH_BATCH_SIZE`: Dirty-set scan batch size (default: 100)
    /// - `COHERENT_CACHE_ADDRESS`: Cache backend address (default: redis://localhost:6379)
    /// - `COHERENT_WIDENING_CEILING`: Max-bound ceiling for range widening (default: 100)
    /// - `COHERENT_OPERATION_TIMEOUT_MS`: Store/cache call timeout (default: 2000)
    pub fn from_env() -> CoherentResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup. Unparsable numbers fall back to
    /// defaults; an unknown strategy name is an error.
    pub fn from_lookup<F>(lookup: F) -> CoherentResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let parsed = |key: &str| lookup(key).and_then(|s| s.trim().parse::<u64>().ok());

        let strategy = match lookup("COHERENT_STRATEGY") {
            Some(raw) => raw.parse::<StrategyKind>()?,
            None => defaults.strategy,
        };

        let config = Self {
            strategy,
            entry_ttl: parsed("COHERENT_CACHE_TTL_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.entry_ttl),
            flush_interval: parsed("COHERENT_FLUSH_INTERVAL_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.flush_interval),
            flush_batch_size: parsed("COHERENT_FLUSH_BATCH_SIZE")
                .map(|n| n as usize)
                .unwrap_or(defaults.flush_batch_size),
            cache_address: lookup("COHERENT_CACHE_ADDRESS").unwrap_or(defaults.cache_address),
            widening_ceiling: parsed("COHERENT_WIDENING_CEILING")
                .and_then(|n| u32::try_from(n).ok())
                .unwrap_or(defaults.widening_ceiling),
            operation_timeout: parsed("COHERENT_OPERATION_TIMEOUT_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.operation_timeout),
        };

        config.validate()?;
        Ok(config)
    }

    pub fn with_strategy(mut self, strategy: StrategyKind) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.entry_ttl = ttl;
        self
    }

    pub fn with_flush_interval(mut self, interval: Duration) -> Self {
        self.flush_interval = interval;
        self
    }

    pub fn with_flush_batch_size(mut self, batch_size: usize) -> Self {
        self.flush_batch_size = batch_size;
        self
    }

    /// Validate the configuration.
    ///
    /// Validates:
    /// - all durations are positive
    /// - flush_batch_size > 0
    /// - cache_address has a scheme and a host
    pub fn validate(&self) -> CoherentResult<()> {
        for (field, value) in [
            ("entry_ttl", self.entry_ttl),
            ("flush_interval", self.flush_interval),
            ("operation_timeout", self.operation_timeout),
        ] {
            if value.is_zero() {
                return Err(invalid(field, format!("{:?}", value), "must be positive"));
            }
        }

        if self.flush_batch_size == 0 {
            return Err(invalid(
                "flush_batch_size",
                self.flush_batch_size.to_string(),
                "flush_batch_size must be greater than 0",
            ));
        }

        let host = self
            .cache_address
            .split_once("://")
            .map(|(scheme, rest)| (scheme, rest.trim_end_matches('/')));
        match host {
            Some((scheme, rest)) if !scheme.is_empty() && !rest.is_empty() => Ok(()),
            _ => Err(invalid(
                "cache_address",
                self.cache_address.clone(),
                "expected <scheme>://<host>[:port]",
            )),
        }
    }
}

fn invalid(field: &str, value: String, reason: &str) -> CoherentError {
    CoherentError::Config(ConfigError::InvalidValue {
        field: field.to_string(),
        value,
        reason: reason.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_are_valid() {
        let config = CoherentConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.entry_ttl, Duration::from_secs(300));
        assert_eq!(config.widening_ceiling, 100);
    }

    #[test]
    fn test_from_lookup_overrides() {
        let config = CoherentConfig::from_lookup(lookup_from(&[
            ("COHERENT_STRATEGY", "cache-aside"),
            ("COHERENT_CACHE_TTL_SECS", "60"),
            ("COHERENT_FLUSH_INTERVAL_MS", "250"),
            ("COHERENT_FLUSH_BATCH_SIZE", "7"),
            ("COHERENT_CACHE_ADDRESS", "redis://cache:6380"),
        ]))
        .unwrap();

        assert_eq!(config.strategy, StrategyKind::CacheAside);
        assert_eq!(config.entry_ttl, Duration::from_secs(60));
        assert_eq!(config.flush_interval, Duration::from_millis(250));
        assert_eq!(config.flush_batch_size, 7);
        assert_eq!(config.cache_address, "redis://cache:6380");
    }

    #[test]
    fn test_unparsable_numbers_fall_back() {
        let config =
            CoherentConfig::from_lookup(lookup_from(&[("COHERENT_CACHE_TTL_SECS", "soon")]))
                .unwrap();
        assert_eq!(config.entry_ttl, Duration::from_secs(300));
    }

    #[test]
    fn test_unknown_strategy_rejected() {
        let err = CoherentConfig::from_lookup(lookup_from(&[("COHERENT_STRATEGY", "lazy")]))
            .unwrap_err();
        assert!(matches!(err, CoherentError::Config(ConfigError::InvalidValue { .. })));
    }

    #[test]
    fn test_validate_rejects_zero_values() {
        let config = CoherentConfig::default().with_flush_interval(Duration::ZERO);
        assert!(config.validate().is_err());

        let config = CoherentConfig::default().with_flush_batch_size(0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_bad_address() {
        let config = CoherentConfig {
            cache_address: "localhost:6379".to_string(),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_strategy_display_round_trips() {
        for kind in [
            StrategyKind::ReadWriteThrough,
            StrategyKind::CacheAside,
            StrategyKind::WriteBack,
        ] {
            assert_eq!(kind.to_string().parse::<StrategyKind>().unwrap(), kind);
        }
    }
}
