use serde::{Deserialize, Serialize};

use common::{Error, Market, Result, Rule};

use crate::rules::RuleSet;

/// Top-level strategy config file (TOML).
///
/// Example `config/techsignal.toml`:
/// ```toml
/// symbol = "BTCUSDT"
///
/// [market]
/// baseCurrency = "BTC"
/// quoteCurrency = "USDT"
/// volumePrecision = 2
///
/// [[supportDetection]]
/// interval = "1h"
/// movingAverageType = "ewma"
/// movingAverageInterval = "1h"
/// movingAverageWindow = 99
/// minVolume = 1000
/// minQuoteVolume = 0
/// ```
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StrategyFileConfig {
    /// Trading pair watched by every rule, e.g. "BTCUSDT".
    #[serde(default)]
    pub symbol: String,
    /// Display metadata for notifications.
    #[serde(default)]
    pub market: Option<Market>,
    /// Suppress signals for bars that closed above the moving average.
    #[serde(default)]
    pub require_price_at_or_below_average: bool,
    #[serde(default)]
    pub support_detection: Vec<Rule>,
}

impl StrategyFileConfig {
    /// Load and validate a TOML strategy file.
    pub fn load(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("failed to read strategy config at '{path}': {e}"))
        })?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let cfg: Self = toml::from_str(content)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        if self.symbol.trim().is_empty() {
            return Err(Error::Config("symbol is required".into()));
        }
        RuleSet::new(self.support_detection.clone()).map(|_| ())
    }

    pub fn rule_set(&self) -> Result<RuleSet> {
        RuleSet::new(self.support_detection.clone())
    }

    /// Market metadata, falling back to bare labels when not configured.
    pub fn market(&self) -> Market {
        self.market.clone().unwrap_or_default()
    }
}
