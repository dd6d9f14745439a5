//! Configuration - Type-safe, validated config
//!
//! Loads from `config.toml` at the project root. Every section has
//! defaults, so a partial file is enough.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::core::{Error, Result};

/// Application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Application settings
    pub app: AppConfig,

    /// Outbound command pacing
    pub throttle: ThrottleConfig,

    /// Pre-trade risk limits
    pub risk: RiskConfig,

    /// Paper venue simulation
    pub paper: PaperConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Run mode: paper or live
    pub mode: RunMode,

    /// Log level, used when RUST_LOG is unset
    pub log_level: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            mode: RunMode::Paper,
            log_level: "info".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunMode {
    Paper,
    Live,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ThrottleConfig {
    /// Window length in milliseconds
    pub interval_ms: u64,

    /// Commands forwarded per window
    pub max_per_interval: usize,
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self {
            interval_ms: 1000,
            max_per_interval: 10,
        }
    }
}

impl ThrottleConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskConfig {
    /// Largest quantity accepted on a single order
    pub max_order_quantity: Decimal,

    /// Largest quantity * price accepted on a single order
    pub max_order_notional: Decimal,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            max_order_quantity: Decimal::from(1_000),
            max_order_notional: Decimal::from(50_000),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PaperConfig {
    /// Delay between acceptance and fill
    pub fill_latency_ms: u64,

    /// Fill price for market orders
    pub reference_price: Decimal,
}

impl Default for PaperConfig {
    fn default() -> Self {
        Self {
            fill_latency_ms: 50,
            reference_price: Decimal::from(100),
        }
    }
}

impl PaperConfig {
    pub fn fill_latency(&self) -> Duration {
        Duration::from_millis(self.fill_latency_ms)
    }
}

impl Config {
    /// Load from TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Failed to read {}: {}", path.display(), e)))?;
        Self::from_toml(&content)
    }

    /// Parse and validate a TOML document
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from the default location, falling back to defaults.
    pub fn load_default() -> Self {
        let candidates = [
            "config.toml",
            concat!(env!("CARGO_MANIFEST_DIR"), "/config.toml"),
        ];

        for path in &candidates {
            match Self::load(Path::new(path)) {
                Ok(cfg) => {
                    tracing::info!("Loaded config from {}", path);
                    return cfg;
                }
                Err(Error::Config(_)) => continue,
                Err(e) => tracing::warn!("Ignoring {}: {}", path, e),
            }
        }

        tracing::warn!("No config.toml found, using defaults");
        Self::default()
    }

    /// Reject values the runtime cannot honour.
    pub fn validate(&self) -> Result<()> {
        if self.throttle.interval_ms == 0 {
            return Err(Error::validation("throttle.interval_ms must be positive"));
        }
        if self.throttle.max_per_interval == 0 {
            return Err(Error::validation("throttle.max_per_interval must be positive"));
        }
        if self.risk.max_order_quantity <= Decimal::ZERO {
            return Err(Error::validation("risk.max_order_quantity must be positive"));
        }
        if self.risk.max_order_notional <= Decimal::ZERO {
            return Err(Error::validation("risk.max_order_notional must be positive"));
        }
        if self.paper.reference_price <= Decimal::ZERO {
            return Err(Error::validation("paper.reference_price must be positive"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_file_uses_defaults() {
        let config = Config::from_toml(
            r#"
            [throttle]
            interval_ms = 250
            "#,
        )
        .unwrap();

        assert_eq!(config.throttle.interval(), Duration::from_millis(250));
        assert_eq!(config.throttle.max_per_interval, 10);
        assert_eq!(config.app.mode, RunMode::Paper);
    }

    #[test]
    fn test_full_file() {
        let config = Config::from_toml(
            r#"
            [app]
            mode = "live"
            log_level = "debug"

            [throttle]
            interval_ms = 1000
            max_per_interval = 2

            [risk]
            max_order_quantity = 5.0
            max_order_notional = 1000.0

            [paper]
            fill_latency_ms = 10
            reference_price = 42.5
            "#,
        )
        .unwrap();

        assert_eq!(config.app.mode, RunMode::Live);
        assert_eq!(config.risk.max_order_quantity, Decimal::from(5));
        assert_eq!(config.paper.reference_price, Decimal::new(425, 1));
    }

    #[test]
    fn test_zero_limit_rejected() {
        let err = Config::from_toml("[throttle]\nmax_per_interval = 0\n").unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[test]
    fn test_malformed_toml() {
        let err = Config::from_toml("[throttle\n").unwrap_err();
        assert!(matches!(err, Error::Toml(_)));
    }
}
