//! Market volatility classification
//!
//! The decisive level is read from the cached value of the volatility
//! feature. That feature's payload carries one classification per time
//! window; the more severe one wins.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::cache::{now_ms, FeatureEntry};
use crate::engine::keys::feature_key;
use crate::store::StorageGateway;

/// Severity of current market volatility, least to most severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum VolatilityLevel {
    Low,
    Normal,
    High,
    Extreme,
}

impl VolatilityLevel {
    pub fn is_elevated(self) -> bool {
        matches!(self, Self::High | Self::Extreme)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Low => "LOW",
            Self::Normal => "NORMAL",
            Self::High => "HIGH",
            Self::Extreme => "EXTREME",
        }
    }
}

impl Default for VolatilityLevel {
    fn default() -> Self {
        Self::Normal
    }
}

impl fmt::Display for VolatilityLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VolatilityLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "LOW" => Ok(Self::Low),
            "NORMAL" => Ok(Self::Normal),
            "HIGH" => Ok(Self::High),
            "EXTREME" => Ok(Self::Extreme),
            other => Err(format!("unknown volatility level '{}'", other)),
        }
    }
}

/// TTL scaling factor per volatility level. Each value lies in (0, 1] and
/// the sequence never increases with severity.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VolatilityMultipliers {
    pub low: f64,
    pub normal: f64,
    pub high: f64,
    pub extreme: f64,
}

impl Default for VolatilityMultipliers {
    fn default() -> Self {
        Self {
            low: 1.0,
            normal: 1.0,
            high: 0.5,
            extreme: 0.2,
        }
    }
}

impl VolatilityMultipliers {
    pub fn for_level(&self, level: VolatilityLevel) -> f64 {
        match level {
            VolatilityLevel::Low => self.low,
            VolatilityLevel::Normal => self.normal,
            VolatilityLevel::High => self.high,
            VolatilityLevel::Extreme => self.extreme,
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        let ordered = [self.low, self.normal, self.high, self.extreme];
        if ordered.iter().any(|m| !(*m > 0.0 && *m <= 1.0)) {
            return Err("volatility multipliers must lie in (0, 1]".to_string());
        }
        if ordered.windows(2).any(|pair| pair[1] > pair[0]) {
            return Err("volatility multipliers must not increase with severity".to_string());
        }
        Ok(())
    }
}

/// Extract the decisive level from a volatility feature payload.
///
/// Accepts `{"shortTerm": {"level": ..}, "longTerm": {"level": ..}}` or a
/// flat `{"level": ..}`. Anything unrecognised yields `Normal`.
///
/// With a passthrough compute the payload is keyed by dependency name, so a
/// volatility feature must name its dependencies `shortTerm` and `longTerm`.
pub fn decisive_level(payload: &Value) -> VolatilityLevel {
    let windows = ["shortTerm", "longTerm"]
        .iter()
        .filter_map(|window| payload.get(window))
        .filter_map(level_of);

    windows
        .chain(level_of(payload))
        .max()
        .unwrap_or_default()
}

/// Read the decisive level from the cached volatility feature.
///
/// Missing, malformed or unreadable entries yield `Normal`. Freshness is not
/// checked here: the key-value tier's native expiry already bounds the age.
pub async fn current_level(storage: &dyn StorageGateway, volatility_feature: &str) -> VolatilityLevel {
    let stored = match storage.get(&feature_key(volatility_feature)).await {
        Ok(stored) => stored,
        Err(err) => {
            tracing::warn!("Volatility read failed, assuming NORMAL: {}", err);
            return VolatilityLevel::Normal;
        }
    };

    FeatureEntry::classify(stored, now_ms())
        .payload()
        .map(decisive_level)
        .unwrap_or_default()
}

fn level_of(value: &Value) -> Option<VolatilityLevel> {
    value.get("level")?.as_str()?.parse().ok()
}
