//! Effective TTL calculation for feature cache entries

use std::sync::Arc;

use crate::engine::config::{EngineConfig, FeatureRegistry};
use crate::engine::types::{TtlBounds, UserRoleConfig};
use crate::engine::volatility::{current_level, VolatilityLevel, VolatilityMultipliers};
use crate::store::StorageGateway;

/// Apply the volatility multiplier and the three clamps to `bounds`.
///
/// Clamp order is min bound, then the user floor, then the max bound, so a
/// user floor above the feature maximum is capped rather than rejected.
pub fn effective_ttl(bounds: &TtlBounds, multiplier: f64, user_minimum: u64) -> u64 {
    let scaled = (bounds.base() as f64 * multiplier).floor();
    let scaled = if scaled.is_finite() && scaled > 0.0 {
        scaled as u64
    } else {
        0
    };

    scaled.max(bounds.min).max(user_minimum).min(bounds.max)
}

/// Computes how long a freshly computed feature value may be served.
pub struct TtlCalculator {
    registry: Arc<FeatureRegistry>,
    multipliers: VolatilityMultipliers,
    volatility_feature: String,
}

impl TtlCalculator {
    pub fn new(registry: Arc<FeatureRegistry>, config: &EngineConfig) -> Self {
        Self {
            registry,
            multipliers: config.multipliers,
            volatility_feature: config.volatility_feature.clone(),
        }
    }

    /// Effective TTL in seconds for `feature_name` requested under `role`.
    ///
    /// Unknown features get the role's minimum TTL directly.
    pub async fn calculate(
        &self,
        feature_name: &str,
        role: &UserRoleConfig,
        storage: &dyn StorageGateway,
    ) -> u64 {
        let Some(descriptor) = self.registry.get(feature_name) else {
            return role.minimum_ttl_seconds;
        };

        let level = current_level(storage, &self.volatility_feature).await;
        self.calculate_with_level(&descriptor.ttl, level, role)
    }

    pub fn calculate_with_level(
        &self,
        bounds: &TtlBounds,
        level: VolatilityLevel,
        role: &UserRoleConfig,
    ) -> u64 {
        let ttl = effective_ttl(
            bounds,
            self.multipliers.for_level(level),
            role.minimum_ttl_seconds,
        );
        tracing::debug!(
            "TTL {}s (base {}s, volatility {}, user floor {}s)",
            ttl,
            bounds.base(),
            level,
            role.minimum_ttl_seconds
        );
        ttl
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::rotation::RotationStrategy;
    use crate::engine::types::{FeatureDescriptor, ProviderName};
    use crate::store::MemoryStorage;
    use proptest::prelude::*;
    use serde_json::json;

    fn bounds() -> TtlBounds {
        TtlBounds::new(30, 300).with_default(150)
    }

    #[test]
    fn user_floor_beats_volatility_shrink() {
        assert_eq!(effective_ttl(&bounds(), 0.2, 200), 200);
    }

    #[test]
    fn feature_max_caps_oversized_user_floor() {
        assert_eq!(effective_ttl(&bounds(), 0.2, 1000), 300);
    }

    #[test]
    fn min_bound_applies_after_shrink() {
        // 150 * 0.2 = 30 lands exactly on min; 100 * 0.2 = 20 is lifted to it.
        assert_eq!(effective_ttl(&bounds(), 0.2, 0), 30);
        assert_eq!(effective_ttl(&TtlBounds::new(30, 300).with_default(100), 0.2, 0), 30);
    }

    #[test]
    fn multiplier_result_is_floored() {
        assert_eq!(effective_ttl(&TtlBounds::new(1, 1000).with_default(155), 0.5, 0), 77);
    }

    #[test]
    fn midpoint_used_without_default() {
        assert_eq!(effective_ttl(&TtlBounds::new(30, 300), 1.0, 0), 165);
    }

    proptest! {
        #[test]
        fn result_always_within_bounds(
            min in 0u64..1_000,
            span in 0u64..10_000,
            user in 0u64..20_000,
            multiplier in 0.01f64..=1.0,
        ) {
            let b = TtlBounds::new(min, min + span);
            let ttl = effective_ttl(&b, multiplier, user);
            prop_assert!(ttl >= b.min);
            prop_assert!(ttl <= b.max);
            prop_assert!(ttl >= user.min(b.max));
        }
    }

    fn calculator() -> TtlCalculator {
        let registry = FeatureRegistry::new(vec![FeatureDescriptor {
            name: "dominance".to_string(),
            dependencies: Vec::new(),
            providers: vec![ProviderName::new("alpha")],
            ttl: bounds(),
            strategy: RotationStrategy::LowestUsageFirst,
        }])
        .unwrap();
        TtlCalculator::new(Arc::new(registry), &EngineConfig::default())
    }

    #[tokio::test]
    async fn unknown_feature_returns_user_minimum() {
        let storage = MemoryStorage::new();
        let role = UserRoleConfig::new("free", 45);
        assert_eq!(calculator().calculate("nope", &role, &storage).await, 45);
    }

    #[tokio::test]
    async fn calm_market_uses_base_ttl() {
        let storage = MemoryStorage::new();
        let role = UserRoleConfig::new("free", 0);
        assert_eq!(calculator().calculate("dominance", &role, &storage).await, 150);
    }

    #[tokio::test]
    async fn extreme_volatility_shrinks_ttl() {
        let storage = MemoryStorage::new();
        storage
            .set(
                "feature:volatility_current",
                &json!({"data": {"shortTerm": {"level": "EXTREME"}, "longTerm": {"level": "LOW"}},
                        "fetchedAt": 0, "effectiveTTLSeconds": 60}),
                60,
            )
            .await
            .unwrap();

        let calc = calculator();
        assert_eq!(
            calc.calculate("dominance", &UserRoleConfig::new("free", 0), &storage).await,
            30
        );
        assert_eq!(
            calc.calculate("dominance", &UserRoleConfig::new("pro", 200), &storage).await,
            200
        );
        assert_eq!(
            calc.calculate("dominance", &UserRoleConfig::new("odd", 1000), &storage).await,
            300
        );
    }

    #[tokio::test]
    async fn high_volatility_halves_base() {
        let storage = MemoryStorage::new();
        storage
            .set("feature:volatility_current", &json!({"level": "HIGH"}), 60)
            .await
            .unwrap();
        assert_eq!(
            calculator()
                .calculate("dominance", &UserRoleConfig::new("free", 0), &storage)
                .await,
            75
        );
    }
}
