//! Secret store contract
//!
//! Credentials live in a host-provided store (the keychain on device),
//! keyed by destination kind. The crate never persists secrets itself.

use std::collections::HashMap;
use std::sync::Mutex;

use crate::types::BasicAuth;

/// Key of the Pushgateway basic-auth pair, stored as `username:password`
pub const PUSHGATEWAY_BASIC_AUTH: &str = "pushgateway-basic-auth";

/// Key of the InfluxDB API token
pub const INFLUXDB_TOKEN: &str = "influxdb-token";

/// Durable credential storage
pub trait SecretStore: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
    fn put(&self, key: &str, secret: &str);
    fn delete(&self, key: &str);
}

/// Read the Pushgateway credentials, if a well-formed pair is stored
pub fn load_basic_auth(store: &dyn SecretStore) -> Option<BasicAuth> {
    let raw = store.get(PUSHGATEWAY_BASIC_AUTH)?;
    let (username, password) = raw.split_once(':')?;
    if username.is_empty() {
        return None;
    }
    Some(BasicAuth {
        username: username.to_string(),
        password: password.to_string(),
    })
}

/// Store the Pushgateway credentials, replacing any previous pair
pub fn save_basic_auth(store: &dyn SecretStore, auth: &BasicAuth) {
    store.put(
        PUSHGATEWAY_BASIC_AUTH,
        &format!("{}:{}", auth.username, auth.password),
    );
}

/// Read the InfluxDB token; an empty token counts as absent
pub fn load_influx_token(store: &dyn SecretStore) -> Option<String> {
    store.get(INFLUXDB_TOKEN).filter(|token| !token.is_empty())
}

/// In-memory secret store, for hosts without a keychain and for tests
#[derive(Debug, Default)]
pub struct MemorySecretStore {
    secrets: Mutex<HashMap<String, String>>,
}

impl MemorySecretStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SecretStore for MemorySecretStore {
    fn get(&self, key: &str) -> Option<String> {
        self.secrets
            .lock()
            .ok()
            .and_then(|secrets| secrets.get(key).cloned())
    }

    fn put(&self, key: &str, secret: &str) {
        if let Ok(mut secrets) = self.secrets.lock() {
            secrets.insert(key.to_string(), secret.to_string());
        }
    }

    fn delete(&self, key: &str) {
        if let Ok(mut secrets) = self.secrets.lock() {
            secrets.remove(key);
        }
    }
}
