//! Metric cache
//!
//! Keeps the last successful collection so a cycle can still push something
//! when the biometric source comes back empty. There is exactly one cache
//! generation: every save replaces the previous snapshot wholesale, and reads
//! hand out copies filtered by age.

use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use crate::error::TelemetryError;
use crate::types::{CachedMetric, Metric};

/// Fixed key under which the snapshot blob is stored
pub const CACHE_KEY: &str = "cached_health_metrics";

/// Entries older than this are never served
pub const MAX_CACHE_AGE_SECS: i64 = 3600;

/// Atomic blob persistence
pub trait BlobStore: Send + Sync {
    fn load(&self, key: &str) -> Result<Option<Vec<u8>>, TelemetryError>;
    /// Replace the blob; readers see either the old or the new bytes
    fn store(&self, key: &str, blob: &[u8]) -> Result<(), TelemetryError>;
    fn remove(&self, key: &str) -> Result<(), TelemetryError>;
}

/// Blob store kept in process memory
#[derive(Debug, Default)]
pub struct MemoryBlobStore {
    blobs: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl BlobStore for MemoryBlobStore {
    fn load(&self, key: &str) -> Result<Option<Vec<u8>>, TelemetryError> {
        let blobs = self
            .blobs
            .lock()
            .map_err(|e| TelemetryError::Cache(e.to_string()))?;
        Ok(blobs.get(key).cloned())
    }

    fn store(&self, key: &str, blob: &[u8]) -> Result<(), TelemetryError> {
        let mut blobs = self
            .blobs
            .lock()
            .map_err(|e| TelemetryError::Cache(e.to_string()))?;
        blobs.insert(key.to_string(), blob.to_vec());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), TelemetryError> {
        let mut blobs = self
            .blobs
            .lock()
            .map_err(|e| TelemetryError::Cache(e.to_string()))?;
        blobs.remove(key);
        Ok(())
    }
}

/// Blob store writing one `<key>.json` file per key in a directory.
///
/// Writes go to a temporary file first and are renamed into place.
#[derive(Debug, Clone)]
pub struct FileBlobStore {
    dir: PathBuf,
}

impl FileBlobStore {
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self, TelemetryError> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|e| {
            TelemetryError::Cache(format!("Failed to create {}: {e}", dir.display()))
        })?;
        Ok(Self { dir })
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }

    fn temp_path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!(".{key}.json.tmp"))
    }
}

fn io_error(path: &Path, e: std::io::Error) -> TelemetryError {
    TelemetryError::Cache(format!("{}: {e}", path.display()))
}

impl BlobStore for FileBlobStore {
    fn load(&self, key: &str) -> Result<Option<Vec<u8>>, TelemetryError> {
        let path = self.path_for(key);
        match fs::read(&path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(io_error(&path, e)),
        }
    }

    fn store(&self, key: &str, blob: &[u8]) -> Result<(), TelemetryError> {
        let temp = self.temp_path_for(key);
        let path = self.path_for(key);
        fs::write(&temp, blob).map_err(|e| io_error(&temp, e))?;
        fs::rename(&temp, &path).map_err(|e| io_error(&path, e))
    }

    fn remove(&self, key: &str) -> Result<(), TelemetryError> {
        let path = self.path_for(key);
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(io_error(&path, e)),
        }
    }
}

/// Time-bounded snapshot of the last successful collection
pub struct MetricCache {
    store: Arc<dyn BlobStore>,
    max_age: Duration,
}

impl MetricCache {
    /// Cache with the standard one-hour expiry
    pub fn new(store: Arc<dyn BlobStore>) -> Self {
        Self::with_max_age(store, Duration::seconds(MAX_CACHE_AGE_SECS))
    }

    pub fn with_max_age(store: Arc<dyn BlobStore>, max_age: Duration) -> Self {
        Self { store, max_age }
    }

    pub fn max_age(&self) -> Duration {
        self.max_age
    }

    /// Replace the snapshot with `metrics`, all stamped `observed_at`
    pub fn save(
        &self,
        metrics: &[Metric],
        observed_at: DateTime<Utc>,
    ) -> Result<(), TelemetryError> {
        let entries: Vec<CachedMetric> = metrics
            .iter()
            .cloned()
            .map(|metric| CachedMetric::new(metric, observed_at))
            .collect();

        let blob = serde_json::to_vec(&entries)?;
        self.store.store(CACHE_KEY, &blob)?;

        tracing::info!(count = entries.len(), "Cached metrics");
        Ok(())
    }

    /// Every stored entry regardless of age
    pub fn load_all(&self) -> Result<Vec<CachedMetric>, TelemetryError> {
        match self.store.load(CACHE_KEY)? {
            Some(blob) => Ok(serde_json::from_slice(&blob)?),
            None => Ok(Vec::new()),
        }
    }

    /// Entries whose age at `now` is within the expiry. Unreadable snapshots
    /// count as empty.
    pub fn load_valid(&self, now: DateTime<Utc>) -> Vec<CachedMetric> {
        let entries = match self.load_all() {
            Ok(entries) => entries,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to read metric cache");
                return Vec::new();
            }
        };

        let total = entries.len();
        let valid: Vec<CachedMetric> = entries
            .into_iter()
            .filter(|entry| entry.is_fresh(now, self.max_age))
            .collect();

        if valid.is_empty() && total > 0 {
            tracing::info!(expired = total, "All cached metrics expired");
        } else if !valid.is_empty() {
            tracing::info!(count = valid.len(), "Retrieved cached metrics");
        }

        valid
    }

    /// Drop the snapshot
    pub fn clear(&self) -> Result<(), TelemetryError> {
        self.store.remove(CACHE_KEY)?;
        tracing::info!("Metric cache cleared");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::MetricKind;

    fn sample_metrics() -> Vec<Metric> {
        vec![
            Metric::new("healthkit_steps_total", 4200.0, MetricKind::Counter, "count")
                .unwrap()
                .with_label("instance", "phone"),
            Metric::new("healthkit_heart_rate_bpm", 62.0, MetricKind::Gauge, "count/min")
                .unwrap()
                .with_label("instance", "phone")
                .with_label("source", "Watch"),
        ]
    }

    #[test]
    fn test_save_and_load_within_expiry() {
        let cache = MetricCache::new(Arc::new(MemoryBlobStore::new()));
        let now = Utc::now();

        cache.save(&sample_metrics(), now).unwrap();

        let valid = cache.load_valid(now + Duration::minutes(10));
        assert_eq!(valid.len(), 2);
        assert_eq!(valid[0].metric, sample_metrics()[0]);
        assert_eq!(valid[1].metric.unit, "count/min");
    }

    #[test]
    fn test_expiry_boundary() {
        let cache = MetricCache::new(Arc::new(MemoryBlobStore::new()));
        let observed = Utc::now();
        cache.save(&sample_metrics(), observed).unwrap();

        let max_age = Duration::seconds(MAX_CACHE_AGE_SECS);
        let just_fresh = observed + max_age - Duration::seconds(1);
        let just_stale = observed + max_age + Duration::seconds(1);

        assert_eq!(cache.load_valid(just_fresh).len(), 2);
        assert!(cache.load_valid(just_stale).is_empty());
        // Reads are non-destructive
        assert_eq!(cache.load_all().unwrap().len(), 2);
    }

    #[test]
    fn test_save_replaces_previous_generation() {
        let cache = MetricCache::new(Arc::new(MemoryBlobStore::new()));
        let now = Utc::now();

        cache.save(&sample_metrics(), now).unwrap();
        cache.save(&sample_metrics()[..1], now).unwrap();

        assert_eq!(cache.load_all().unwrap().len(), 1);
    }

    #[test]
    fn test_clear() {
        let cache = MetricCache::new(Arc::new(MemoryBlobStore::new()));
        cache.save(&sample_metrics(), Utc::now()).unwrap();
        cache.clear().unwrap();
        assert!(cache.load_valid(Utc::now()).is_empty());
        // Clearing twice is fine
        cache.clear().unwrap();
    }

    #[test]
    fn test_nan_value_survives_snapshot() {
        let cache = MetricCache::new(Arc::new(MemoryBlobStore::new()));
        let now = Utc::now();
        let metrics = vec![
            Metric::new("a_total", 5.0, MetricKind::Counter, "count").unwrap(),
            Metric::new("b", f64::NAN, MetricKind::Gauge, "").unwrap(),
        ];

        cache.save(&metrics, now).unwrap();

        let valid = cache.load_valid(now);
        assert_eq!(valid.len(), 2);
        assert_eq!(valid[0].metric.value, 5.0);
        assert!(valid[1].metric.value.is_nan());
    }

    #[test]
    fn test_corrupted_blob_reads_as_empty() {
        let store = Arc::new(MemoryBlobStore::new());
        store.store(CACHE_KEY, b"not json").unwrap();

        let cache = MetricCache::new(store);
        assert!(cache.load_all().is_err());
        assert!(cache.load_valid(Utc::now()).is_empty());
    }

    #[test]
    fn test_file_store_persists_across_instances() {
        let dir = tempfile::tempdir().unwrap();
        let now = Utc::now();

        {
            let store = Arc::new(FileBlobStore::new(dir.path()).unwrap());
            MetricCache::new(store).save(&sample_metrics(), now).unwrap();
        }

        let store = Arc::new(FileBlobStore::new(dir.path()).unwrap());
        let cache = MetricCache::new(store);
        assert_eq!(cache.load_valid(now).len(), 2);
        assert!(!dir.path().join(".cached_health_metrics.json.tmp").exists());

        cache.clear().unwrap();
        assert!(!dir.path().join("cached_health_metrics.json").exists());
    }
}
