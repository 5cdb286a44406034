//! Core types for the export pipeline
//!
//! This module defines the canonical metric model that flows from collection
//! through caching and formatting, plus the push destinations derived from
//! configuration.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::TelemetryError;

/// Label set attached to a metric. Keys are unique; iteration is key-sorted.
pub type Labels = BTreeMap<String, String>;

/// Label added to metrics served from the cache fallback
pub const CACHED_LABEL: &str = "cached";

/// Label carrying the cache age (whole minutes) of a fallback metric
pub const DATA_AGE_LABEL: &str = "data_age_minutes";

/// Metric semantics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricKind {
    /// Point-in-time value
    Gauge,
    /// Accumulated total over the collection window
    Counter,
}

impl MetricKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricKind::Gauge => "gauge",
            MetricKind::Counter => "counter",
        }
    }
}

/// One observed value plus its metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metric {
    /// Wire identifier, `[a-z_][a-z0-9_]*`
    pub name: String,
    #[serde(with = "sample_value")]
    pub value: f64,
    pub kind: MetricKind,
    #[serde(default)]
    pub labels: Labels,
    /// Unit descriptor (e.g. "kg", "count/min"); not interpreted by formatters
    #[serde(default)]
    pub unit: String,
}

impl Metric {
    /// Create a metric with no labels, validating the name.
    pub fn new(
        name: impl Into<String>,
        value: f64,
        kind: MetricKind,
        unit: impl Into<String>,
    ) -> Result<Self, TelemetryError> {
        let name = name.into();
        if !is_valid_metric_name(&name) {
            return Err(TelemetryError::InvalidMetricName(name));
        }
        Ok(Self {
            name,
            value,
            kind,
            labels: Labels::new(),
            unit: unit.into(),
        })
    }

    /// Add (or replace) a label
    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }
}

/// JSON has no NaN/Inf literals; non-finite values are stored as the
/// exposition spellings `"NaN"`, `"+Inf"`, `"-Inf"`.
mod sample_value {
    use serde::de::Error;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &f64, serializer: S) -> Result<S::Ok, S::Error> {
        if value.is_nan() {
            serializer.serialize_str("NaN")
        } else if *value == f64::INFINITY {
            serializer.serialize_str("+Inf")
        } else if *value == f64::NEG_INFINITY {
            serializer.serialize_str("-Inf")
        } else {
            serializer.serialize_f64(*value)
        }
    }

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(f64),
        Text(String),
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
        match Raw::deserialize(deserializer)? {
            Raw::Number(value) => Ok(value),
            Raw::Text(text) => match text.as_str() {
                "NaN" => Ok(f64::NAN),
                "+Inf" | "Inf" => Ok(f64::INFINITY),
                "-Inf" => Ok(f64::NEG_INFINITY),
                other => Err(D::Error::custom(format!("invalid sample value: {other}"))),
            },
        }
    }
}

/// Check a metric name against `[a-z_][a-z0-9_]*`
pub fn is_valid_metric_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_lowercase() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
}

/// A metric as persisted in the cache, stamped with its observation time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedMetric {
    pub metric: Metric,
    pub observed_at: DateTime<Utc>,
}

impl CachedMetric {
    pub fn new(metric: Metric, observed_at: DateTime<Utc>) -> Self {
        Self {
            metric,
            observed_at,
        }
    }

    /// Age relative to `now`
    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        now - self.observed_at
    }

    /// Whole minutes of age, floored
    pub fn age_minutes(&self, now: DateTime<Utc>) -> i64 {
        self.age(now).num_minutes()
    }

    /// Valid iff `age <= max_age`
    pub fn is_fresh(&self, now: DateTime<Utc>, max_age: Duration) -> bool {
        self.age(now) <= max_age
    }

    /// Convert to a batch metric tagged as served from cache
    pub fn to_fallback_metric(&self, now: DateTime<Utc>) -> Metric {
        self.metric
            .clone()
            .with_label(DATA_AGE_LABEL, self.age_minutes(now).to_string())
            .with_label(CACHED_LABEL, "true")
    }
}

/// Destination family selected by configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DestinationKind {
    Prometheus,
    InfluxDb,
}

impl DestinationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DestinationKind::Prometheus => "prometheus",
            DestinationKind::InfluxDb => "influxdb",
        }
    }
}

/// Username/password pair for Pushgateway basic auth
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BasicAuth {
    pub username: String,
    pub password: String,
}

impl std::fmt::Debug for BasicAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BasicAuth")
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}

/// Fully resolved push target, computed per push from configuration and secrets
#[derive(Debug, Clone, PartialEq)]
pub enum PushDestination {
    Prometheus {
        url: String,
        basic_auth: Option<BasicAuth>,
    },
    InfluxDb {
        url: String,
        org: String,
        bucket: String,
        token: String,
    },
}

impl PushDestination {
    pub fn kind(&self) -> DestinationKind {
        match self {
            PushDestination::Prometheus { .. } => DestinationKind::Prometheus,
            PushDestination::InfluxDb { .. } => DestinationKind::InfluxDb,
        }
    }
}
