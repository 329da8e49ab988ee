//! Cache envelopes and freshness rules.
//!
//! Both envelope kinds carry their own write time and TTL so that tiers
//! without native expiry (the blob tier) can still be validated on read.
//! An envelope is fresh iff `now - fetched_at < ttl * 1000`.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;

const FEATURE_TTL_FIELD: &str = "effectiveTTLSeconds";
const RAW_TTL_FIELD: &str = "ttlSeconds";
const FETCHED_AT_FIELD: &str = "fetchedAt";
const DATA_FIELD: &str = "data";

/// Current wall-clock time in epoch milliseconds.
pub fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

fn is_fresh(fetched_at: i64, ttl_seconds: u64, now_ms: i64) -> bool {
    let ttl_ms = i64::try_from(ttl_seconds).unwrap_or(i64::MAX).saturating_mul(1000);
    now_ms.saturating_sub(fetched_at) < ttl_ms
}

fn has_fields(value: &Value, fields: &[&str]) -> bool {
    value
        .as_object()
        .is_some_and(|map| fields.iter().all(|field| map.contains_key(*field)))
}

/// Final value of a feature as stored under its `feature:` key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedFeatureResult {
    pub data: Value,
    #[serde(rename = "fetchedAt")]
    pub fetched_at: i64,
    #[serde(rename = "effectiveTTLSeconds")]
    pub effective_ttl_seconds: u64,
}

impl CachedFeatureResult {
    pub fn new(data: Value, effective_ttl_seconds: u64) -> Self {
        Self {
            data,
            fetched_at: now_ms(),
            effective_ttl_seconds,
        }
    }

    pub fn is_fresh_at(&self, now_ms: i64) -> bool {
        is_fresh(self.fetched_at, self.effective_ttl_seconds, now_ms)
    }

    pub fn is_fresh(&self) -> bool {
        self.is_fresh_at(now_ms())
    }
}

/// A raw provider payload, scoped to one (endpoint, provider, params) tuple.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedRawDataResult {
    pub data: Value,
    #[serde(rename = "fetchedAt")]
    pub fetched_at: i64,
    #[serde(rename = "ttlSeconds")]
    pub ttl_seconds: u64,
}

impl CachedRawDataResult {
    pub fn new(data: Value, ttl_seconds: u64) -> Self {
        Self {
            data,
            fetched_at: now_ms(),
            ttl_seconds,
        }
    }

    pub fn is_fresh_at(&self, now_ms: i64) -> bool {
        is_fresh(self.fetched_at, self.ttl_seconds, now_ms)
    }
}

/// What was found under a feature key.
#[derive(Debug, Clone, PartialEq)]
pub enum FeatureEntry {
    Missing,
    Fresh(CachedFeatureResult),
    Expired(CachedFeatureResult),
    /// A bare payload written before values were wrapped.
    Legacy(Value),
    /// Carries envelope fields but does not parse as an envelope.
    Malformed,
}

impl FeatureEntry {
    pub fn classify(value: Option<Value>, now_ms: i64) -> Self {
        let value = match value {
            None | Some(Value::Null) => return Self::Missing,
            Some(value) => value,
        };

        if has_fields(&value, &[DATA_FIELD, FETCHED_AT_FIELD, FEATURE_TTL_FIELD]) {
            return match serde_json::from_value::<CachedFeatureResult>(value) {
                Ok(result) if result.is_fresh_at(now_ms) => Self::Fresh(result),
                Ok(result) => Self::Expired(result),
                Err(_) => Self::Malformed,
            };
        }

        let carries_metadata = value.as_object().is_some_and(|map| {
            map.contains_key(FETCHED_AT_FIELD) || map.contains_key(FEATURE_TTL_FIELD)
        });
        if carries_metadata {
            Self::Malformed
        } else {
            Self::Legacy(value)
        }
    }

    /// The payload, whatever the freshness. Used where staleness does not
    /// matter (reading the volatility level).
    pub fn payload(&self) -> Option<&Value> {
        match self {
            Self::Fresh(result) | Self::Expired(result) => Some(&result.data),
            Self::Legacy(value) => Some(value),
            Self::Missing | Self::Malformed => None,
        }
    }
}

/// What was found under a raw key.
#[derive(Debug, Clone, PartialEq)]
pub enum RawEntry {
    Missing,
    Fresh(CachedRawDataResult),
    Expired,
    /// Untyped or partially typed value; never trusted.
    Legacy,
}

impl RawEntry {
    pub fn classify(value: Option<Value>, now_ms: i64) -> Self {
        let value = match value {
            None | Some(Value::Null) => return Self::Missing,
            Some(value) => value,
        };

        if !has_fields(&value, &[DATA_FIELD, FETCHED_AT_FIELD, RAW_TTL_FIELD]) {
            return Self::Legacy;
        }

        match serde_json::from_value::<CachedRawDataResult>(value) {
            Ok(result) if result.is_fresh_at(now_ms) => Self::Fresh(result),
            Ok(_) => Self::Expired,
            Err(_) => Self::Legacy,
        }
    }
}
