//! Provider rotation strategies
//!
//! Every strategy is a pure function of the provider pool, the current
//! usage counts and (for `VolatilityAware`) the decisive volatility level.
//! The resulting order drives both cache lookup and fetch failover.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::engine::types::ProviderName;
use crate::engine::volatility::VolatilityLevel;

/// How a provider pool is ordered for one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum RotationStrategy {
    #[default]
    LowestUsageFirst,
    NoKeyFirst,
    VolatilityAware,
    RoundRobin,
}

/// One entry of a rotation order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderedProvider {
    pub provider: ProviderName,
    pub usage: Option<u64>,
}

impl RotationStrategy {
    /// Parse a configured identifier. Unknown identifiers fall back to
    /// `LowestUsageFirst` with a warning.
    pub fn from_identifier(identifier: &str) -> Self {
        let normalized = identifier.trim().to_ascii_lowercase().replace('_', "-");
        match normalized.as_str() {
            "lowest-usage" | "lowest-usage-first" => Self::LowestUsageFirst,
            "no-key-first" | "nokey-first" => Self::NoKeyFirst,
            "volatility-aware" | "volatility" => Self::VolatilityAware,
            "round-robin" => Self::RoundRobin,
            _ => {
                tracing::warn!(
                    "Unknown rotation strategy '{}', falling back to lowest-usage",
                    identifier
                );
                Self::LowestUsageFirst
            }
        }
    }

    pub fn identifier(self) -> &'static str {
        match self {
            Self::LowestUsageFirst => "lowest-usage",
            Self::NoKeyFirst => "no-key-first",
            Self::VolatilityAware => "volatility-aware",
            Self::RoundRobin => "round-robin",
        }
    }

    /// Whether `order` reads the volatility level.
    pub fn needs_volatility(self) -> bool {
        matches!(self, Self::VolatilityAware)
    }

    /// Produce the attempt order for `pool`. Providers missing from `usage`
    /// count as unused.
    pub fn order(
        self,
        pool: &[ProviderName],
        usage: &HashMap<ProviderName, u64>,
        volatility: VolatilityLevel,
    ) -> Vec<OrderedProvider> {
        let entries: Vec<OrderedProvider> = pool
            .iter()
            .map(|provider| OrderedProvider {
                provider: provider.clone(),
                usage: Some(usage.get(provider).copied().unwrap_or(0)),
            })
            .collect();

        match self {
            Self::LowestUsageFirst => lowest_usage_first(entries),
            Self::NoKeyFirst => keyed_partition(entries, false),
            Self::VolatilityAware => keyed_partition(entries, volatility.is_elevated()),
            Self::RoundRobin => round_robin(entries),
        }
    }
}

impl fmt::Display for RotationStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.identifier())
    }
}

impl From<String> for RotationStrategy {
    fn from(identifier: String) -> Self {
        Self::from_identifier(&identifier)
    }
}

impl From<RotationStrategy> for String {
    fn from(strategy: RotationStrategy) -> Self {
        strategy.identifier().to_string()
    }
}

fn usage_of(entry: &OrderedProvider) -> u64 {
    entry.usage.unwrap_or(0)
}

// `sort_by_key` is stable, so ties keep pool order.
fn lowest_usage_first(mut entries: Vec<OrderedProvider>) -> Vec<OrderedProvider> {
    entries.sort_by_key(usage_of);
    entries
}

fn keyed_partition(entries: Vec<OrderedProvider>, keyed_first: bool) -> Vec<OrderedProvider> {
    let (keyless, keyed): (Vec<_>, Vec<_>) = entries
        .into_iter()
        .partition(|entry| !entry.provider.requires_credential());

    let (first, second) = if keyed_first {
        (keyed, keyless)
    } else {
        (keyless, keyed)
    };

    let mut ordered = lowest_usage_first(first);
    ordered.extend(lowest_usage_first(second));
    ordered
}

fn round_robin(mut entries: Vec<OrderedProvider>) -> Vec<OrderedProvider> {
    if entries.is_empty() {
        return entries;
    }
    let total: u64 = entries.iter().map(usage_of).fold(0, u64::saturating_add);
    let start = (total % entries.len() as u64) as usize;
    entries.rotate_left(start);
    entries
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pool(names: &[&str]) -> Vec<ProviderName> {
        names.iter().map(|n| ProviderName::new(*n)).collect()
    }

    fn usage(pairs: &[(&str, u64)]) -> HashMap<ProviderName, u64> {
        pairs
            .iter()
            .map(|(n, c)| (ProviderName::new(*n), *c))
            .collect()
    }

    fn names(order: &[OrderedProvider]) -> Vec<&str> {
        order.iter().map(|o| o.provider.as_str()).collect()
    }

    #[test]
    fn lowest_usage_sorts_ascending_and_keeps_ties_stable() {
        let order = RotationStrategy::LowestUsageFirst.order(
            &pool(&["a", "b", "c", "d"]),
            &usage(&[("a", 5), ("b", 1), ("c", 5), ("d", 0)]),
            VolatilityLevel::Normal,
        );
        assert_eq!(names(&order), vec!["d", "b", "a", "c"]);
        assert_eq!(order[0].usage, Some(0));
    }

    #[test]
    fn lowest_usage_visits_pool_in_round_order() {
        let providers = pool(&["a", "b", "c"]);
        let mut counts = usage(&[]);
        let mut visited = Vec::new();

        for _ in 0..7 {
            let order = RotationStrategy::LowestUsageFirst.order(
                &providers,
                &counts,
                VolatilityLevel::Normal,
            );
            let chosen = order[0].provider.clone();
            *counts.entry(chosen.clone()).or_insert(0) += 1;
            visited.push(chosen.as_str().to_string());
        }

        assert_eq!(visited, vec!["a", "b", "c", "a", "b", "c", "a"]);
    }

    #[test]
    fn no_key_first_puts_keyless_partition_first() {
        let order = RotationStrategy::NoKeyFirst.order(
            &pool(&["alpha", "beta-nokey", "gamma", "delta-nokey"]),
            &usage(&[("alpha", 0), ("beta-nokey", 9), ("gamma", 3), ("delta-nokey", 2)]),
            VolatilityLevel::Extreme,
        );
        assert_eq!(names(&order), vec!["delta-nokey", "beta-nokey", "alpha", "gamma"]);
    }

    #[test]
    fn volatility_aware_switches_partition_order() {
        let providers = pool(&["key", "nokey"]);
        let counts = usage(&[]);

        let calm = RotationStrategy::VolatilityAware.order(&providers, &counts, VolatilityLevel::Normal);
        assert_eq!(names(&calm), vec!["nokey", "key"]);

        let low = RotationStrategy::VolatilityAware.order(&providers, &counts, VolatilityLevel::Low);
        assert_eq!(names(&low), vec!["nokey", "key"]);

        let high = RotationStrategy::VolatilityAware.order(&providers, &counts, VolatilityLevel::High);
        assert_eq!(names(&high), vec!["key", "nokey"]);

        let extreme =
            RotationStrategy::VolatilityAware.order(&providers, &counts, VolatilityLevel::Extreme);
        assert_eq!(names(&extreme), vec!["key", "nokey"]);
    }

    #[test]
    fn round_robin_starts_at_total_usage_modulo_pool_size() {
        let providers = pool(&["a", "b", "c"]);

        let order = RotationStrategy::RoundRobin.order(&providers, &usage(&[]), VolatilityLevel::Normal);
        assert_eq!(names(&order), vec!["a", "b", "c"]);

        let order = RotationStrategy::RoundRobin.order(
            &providers,
            &usage(&[("a", 3), ("c", 1)]),
            VolatilityLevel::Normal,
        );
        assert_eq!(names(&order), vec!["b", "c", "a"]);
    }

    #[test]
    fn empty_pool_yields_empty_order() {
        for strategy in [
            RotationStrategy::LowestUsageFirst,
            RotationStrategy::NoKeyFirst,
            RotationStrategy::VolatilityAware,
            RotationStrategy::RoundRobin,
        ] {
            assert!(strategy.order(&[], &usage(&[]), VolatilityLevel::High).is_empty());
        }
    }

    #[test]
    fn unknown_identifier_falls_back_to_lowest_usage() {
        assert_eq!(
            RotationStrategy::from_identifier("fastest-first"),
            RotationStrategy::LowestUsageFirst
        );
        assert_eq!(
            RotationStrategy::from_identifier("ROUND_ROBIN"),
            RotationStrategy::RoundRobin
        );
    }

    #[test]
    fn strategy_round_trips_through_config_strings() {
        let parsed: RotationStrategy = serde_json::from_str("\"no-key-first\"").unwrap();
        assert_eq!(parsed, RotationStrategy::NoKeyFirst);

        let fallback: RotationStrategy = serde_json::from_str("\"mystery\"").unwrap();
        assert_eq!(fallback, RotationStrategy::LowestUsageFirst);

        assert_eq!(
            serde_json::to_string(&RotationStrategy::VolatilityAware).unwrap(),
            "\"volatility-aware\""
        );
    }
}
