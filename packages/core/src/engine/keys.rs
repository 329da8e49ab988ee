//! Cache key derivation
//!
//! Key namespaces are a persistence contract with data written by earlier
//! deployments and must not change:
//!
//! | Namespace | Example |
//! |-----------|---------|
//! | `feature:` | `feature:volatility_current` |
//! | `raw:<provider>:` | `raw:alpha:live:/v1/ticker?symbol=BTC` |
//! | `usage:provider:` | `usage:provider:alpha` |

use std::collections::HashMap;

use crate::engine::types::ProviderName;

pub const FEATURE_PREFIX: &str = "feature:";
pub const RAW_PREFIX: &str = "raw:";
pub const USAGE_PREFIX: &str = "usage:provider:";

const LIVE_SEGMENT: &str = "live";
const HISTORICAL_SEGMENT: &str = "hist";

/// Key of the final cached value for a feature.
pub fn feature_key(feature_name: &str) -> String {
    format!("{}{}", FEATURE_PREFIX, feature_name)
}

/// Key of a raw dependency payload fetched from `provider`.
///
/// Query parameters are sorted by name so that map insertion order never
/// changes the key.
pub fn raw_key(
    endpoint_path: &str,
    provider: &ProviderName,
    query_params: &HashMap<String, String>,
    resource_id: Option<&str>,
    is_historical: bool,
) -> String {
    let tier = if is_historical { HISTORICAL_SEGMENT } else { LIVE_SEGMENT };
    let mut key = format!("{}{}:{}:{}", RAW_PREFIX, provider, tier, endpoint_path);

    if let Some(resource_id) = resource_id {
        key.push(':');
        key.push_str(&urlencoding::encode(resource_id));
    }

    let query = canonical_query(query_params);
    if !query.is_empty() {
        key.push('?');
        key.push_str(&query);
    }

    key
}

/// Key of the usage counter for `provider`.
pub fn usage_key(provider: &ProviderName) -> String {
    format!("{}{}", USAGE_PREFIX, provider)
}

fn canonical_query(params: &HashMap<String, String>) -> String {
    let mut pairs: Vec<(&String, &String)> = params.iter().collect();
    pairs.sort_by(|left, right| left.0.cmp(right.0).then_with(|| left.1.cmp(right.1)));

    pairs
        .into_iter()
        .map(|(name, value)| {
            format!("{}={}", urlencoding::encode(name), urlencoding::encode(value))
        })
        .collect::<Vec<_>>()
        .join("&")
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn params(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn feature_key_uses_feature_namespace() {
        assert_eq!(feature_key("dominance"), "feature:dominance");
    }

    #[test]
    fn usage_key_uses_usage_namespace() {
        assert_eq!(usage_key(&ProviderName::new("alpha")), "usage:provider:alpha");
    }

    #[test]
    fn raw_key_layout_is_stable() {
        let key = raw_key(
            "/v1/ticker",
            &ProviderName::new("alpha"),
            &params(&[("symbol", "BTC"), ("interval", "1h")]),
            None,
            false,
        );
        assert_eq!(key, "raw:alpha:live:/v1/ticker?interval=1h&symbol=BTC");
    }

    #[test]
    fn raw_key_without_params_has_no_query() {
        let key = raw_key("/v1/global", &ProviderName::new("alpha"), &HashMap::new(), None, false);
        assert_eq!(key, "raw:alpha:live:/v1/global");
    }

    #[test]
    fn raw_key_includes_resource_id() {
        let key = raw_key(
            "/coins",
            &ProviderName::new("beta-nokey"),
            &HashMap::new(),
            Some("bitcoin"),
            false,
        );
        assert_eq!(key, "raw:beta-nokey:live:/coins:bitcoin");
    }

    #[test]
    fn historical_flag_changes_key() {
        let p = params(&[("days", "30")]);
        let provider = ProviderName::new("alpha");
        assert_ne!(
            raw_key("/history", &provider, &p, None, false),
            raw_key("/history", &provider, &p, None, true)
        );
    }

    #[test]
    fn separator_characters_in_values_are_escaped() {
        let provider = ProviderName::new("alpha");
        let a = raw_key("/q", &provider, &params(&[("a", "1&b=2")]), None, false);
        let b = raw_key("/q", &provider, &params(&[("a", "1"), ("b", "2")]), None, false);
        assert_ne!(a, b);
    }

    proptest! {
        #[test]
        fn raw_key_ignores_insertion_order(
            pairs in prop::collection::vec(("[a-z]{1,8}", "[a-zA-Z0-9]{0,8}"), 0..8)
        ) {
            let forward: HashMap<String, String> = pairs.iter().cloned().collect();
            let mut reversed = HashMap::new();
            for (k, v) in forward.iter().collect::<Vec<_>>().into_iter().rev() {
                reversed.insert(k.clone(), v.clone());
            }

            let provider = ProviderName::new("alpha");
            prop_assert_eq!(
                raw_key("/v1/ticker", &provider, &forward, None, false),
                raw_key("/v1/ticker", &provider, &reversed, None, false)
            );
        }

        #[test]
        fn raw_key_differs_per_provider(
            left in "[a-z]{1,10}",
            right in "[a-z]{1,10}",
            historical in any::<bool>()
        ) {
            prop_assume!(left != right);
            let p = params(&[("symbol", "ETH")]);
            prop_assert_ne!(
                raw_key("/v1/ticker", &ProviderName::new(left), &p, None, historical),
                raw_key("/v1/ticker", &ProviderName::new(right), &p, None, historical)
            );
        }
    }
}
