//! Configuration source
//!
//! Durable key/value settings owned by the host. The pipeline only reads
//! them, except for the last-success timestamp written back after a push and
//! the explicit destination switch in [`DestinationSettings::apply`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use crate::secrets::{self, SecretStore};
use crate::types::{BasicAuth, DestinationKind};

/// Setting keys
pub mod keys {
    pub const USE_INFLUXDB: &str = "use_influxdb";
    pub const PUSHGATEWAY_URL: &str = "pushgateway_url";
    pub const INFLUXDB_URL: &str = "influxdb_url";
    pub const INFLUXDB_ORG: &str = "influxdb_org";
    pub const INFLUXDB_BUCKET: &str = "influxdb_bucket";
    pub const PUSH_INTERVAL_MINUTES: &str = "push_interval_minutes";
    pub const LAST_PUSH_TIME: &str = "last_push_time";
}

/// Push interval used when none (or a non-positive one) is configured
pub const DEFAULT_PUSH_INTERVAL_MINUTES: i64 = 5;

/// Job name reported to both destinations
pub const DEFAULT_JOB: &str = "my_health_data";

/// A stored setting
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigValue {
    Bool(bool),
    Int(i64),
    String(String),
    Timestamp(DateTime<Utc>),
}

/// Host-provided settings storage
pub trait ConfigSource: Send + Sync {
    fn get(&self, key: &str) -> Option<ConfigValue>;
    fn set(&self, key: &str, value: ConfigValue);
    fn remove(&self, key: &str);

    /// Non-empty string setting
    fn get_string(&self, key: &str) -> Option<String> {
        match self.get(key) {
            Some(ConfigValue::String(s)) if !s.is_empty() => Some(s),
            _ => None,
        }
    }

    /// Boolean setting, `false` when unset
    fn get_bool(&self, key: &str) -> bool {
        matches!(self.get(key), Some(ConfigValue::Bool(true)))
    }

    fn get_int(&self, key: &str) -> Option<i64> {
        match self.get(key) {
            Some(ConfigValue::Int(i)) => Some(i),
            _ => None,
        }
    }

    fn get_timestamp(&self, key: &str) -> Option<DateTime<Utc>> {
        match self.get(key) {
            Some(ConfigValue::Timestamp(ts)) => Some(ts),
            _ => None,
        }
    }
}

/// Destination currently selected by the `use_influxdb` flag
pub fn destination_kind(config: &dyn ConfigSource) -> DestinationKind {
    if config.get_bool(keys::USE_INFLUXDB) {
        DestinationKind::InfluxDb
    } else {
        DestinationKind::Prometheus
    }
}

/// Configured push interval
pub fn push_interval(config: &dyn ConfigSource) -> Duration {
    let minutes = config
        .get_int(keys::PUSH_INTERVAL_MINUTES)
        .filter(|m| *m > 0)
        .unwrap_or(DEFAULT_PUSH_INTERVAL_MINUTES);
    Duration::from_secs(minutes as u64 * 60)
}

/// Time of the last successful push
pub fn last_push_time(config: &dyn ConfigSource) -> Option<DateTime<Utc>> {
    config.get_timestamp(keys::LAST_PUSH_TIME)
}

/// Who is pushing: device name and job, as shown on the wire
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportIdentity {
    pub device_name: String,
    pub job: String,
}

impl Default for ExportIdentity {
    fn default() -> Self {
        Self {
            device_name: "unknown-device".to_string(),
            job: DEFAULT_JOB.to_string(),
        }
    }
}

impl ExportIdentity {
    pub fn new(device_name: &str) -> Self {
        Self {
            device_name: device_name.to_string(),
            ..Default::default()
        }
    }
}

/// Destination settings as entered by the user
#[derive(Debug, Clone, PartialEq)]
pub enum DestinationSettings {
    Prometheus {
        url: String,
        basic_auth: Option<BasicAuth>,
    },
    InfluxDb {
        url: String,
        org: String,
        bucket: String,
        /// `None` keeps a previously stored token
        token: Option<String>,
    },
}

impl DestinationSettings {
    /// Select this destination and clear every setting and secret of the other one
    pub fn apply(&self, config: &dyn ConfigSource, secrets: &dyn SecretStore) {
        match self {
            DestinationSettings::Prometheus { url, basic_auth } => {
                config.set(keys::USE_INFLUXDB, ConfigValue::Bool(false));
                config.set(keys::PUSHGATEWAY_URL, ConfigValue::String(url.clone()));
                match basic_auth {
                    Some(auth) if !auth.username.is_empty() && !auth.password.is_empty() => {
                        secrets::save_basic_auth(secrets, auth)
                    }
                    _ => secrets.delete(secrets::PUSHGATEWAY_BASIC_AUTH),
                }

                config.remove(keys::INFLUXDB_URL);
                config.remove(keys::INFLUXDB_ORG);
                config.remove(keys::INFLUXDB_BUCKET);
                secrets.delete(secrets::INFLUXDB_TOKEN);
            }
            DestinationSettings::InfluxDb {
                url,
                org,
                bucket,
                token,
            } => {
                config.set(keys::USE_INFLUXDB, ConfigValue::Bool(true));
                config.set(keys::INFLUXDB_URL, ConfigValue::String(url.clone()));
                config.set(keys::INFLUXDB_ORG, ConfigValue::String(org.clone()));
                config.set(keys::INFLUXDB_BUCKET, ConfigValue::String(bucket.clone()));
                if let Some(token) = token.as_deref().filter(|t| !t.is_empty()) {
                    secrets.put(secrets::INFLUXDB_TOKEN, token);
                }

                config.remove(keys::PUSHGATEWAY_URL);
                secrets.delete(secrets::PUSHGATEWAY_BASIC_AUTH);
            }
        }

        tracing::info!(
            destination = self.kind().as_str(),
            "Destination settings applied"
        );
    }

    pub fn kind(&self) -> DestinationKind {
        match self {
            DestinationSettings::Prometheus { .. } => DestinationKind::Prometheus,
            DestinationSettings::InfluxDb { .. } => DestinationKind::InfluxDb,
        }
    }
}

/// In-memory configuration source
#[derive(Debug, Default)]
pub struct MemoryConfigSource {
    values: Mutex<HashMap<String, ConfigValue>>,
}

impl MemoryConfigSource {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ConfigSource for MemoryConfigSource {
    fn get(&self, key: &str) -> Option<ConfigValue> {
        self.values
            .lock()
            .ok()
            .and_then(|values| values.get(key).cloned())
    }

    fn set(&self, key: &str, value: ConfigValue) {
        if let Ok(mut values) = self.values.lock() {
            values.insert(key.to_string(), value);
        }
    }

    fn remove(&self, key: &str) {
        if let Ok(mut values) = self.values.lock() {
            values.remove(key);
        }
    }
}
