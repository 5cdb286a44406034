//! HealthKit Export - on-device telemetry export for health metrics
//!
//! Collects biometric measurements into a canonical metric model, renders
//! them as Prometheus exposition text or InfluxDB line protocol, keeps the
//! last good collection as an offline fallback, and pushes on a timer with
//! retry: collection → cache → formatting → push.
//!
//! ## Modules
//!
//! - **Model**: `types`, `catalog`
//! - **Wire formats**: `exposition`, `line_protocol`
//! - **Collection**: `source`, `collector`, `cache`
//! - **Delivery**: `transport`, `dispatcher`, `pipeline`, `scheduler`
//! - **Host collaborators**: `config`, `secrets`, `logging`, `ffi`

pub mod cache;
pub mod catalog;
pub mod collector;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod exposition;
pub mod line_protocol;
pub mod logging;
pub mod pipeline;
pub mod scheduler;
pub mod secrets;
pub mod source;
pub mod transport;
pub mod types;

// FFI bindings for C interop (always available for cdylib/staticlib builds)
pub mod ffi;

#[cfg(test)]
mod test_support;

pub use cache::{BlobStore, FileBlobStore, MemoryBlobStore, MetricCache};
pub use collector::{BatchOrigin, Collection, Collector, CollectorOptions, DailyRecord};
pub use config::{
    ConfigSource, ConfigValue, DestinationSettings, ExportIdentity, MemoryConfigSource,
};
pub use dispatcher::{resolve_destination, PushDispatcher, PushReport, RetryPolicy};
pub use error::TelemetryError;
pub use exposition::ExpositionFormatter;
pub use line_protocol::LineProtocolFormatter;
pub use pipeline::{CycleOutcome, CycleTrigger, PushPipeline, StatusNotifier};
pub use scheduler::PushScheduler;
pub use secrets::{MemorySecretStore, SecretStore};
pub use source::{BiometricSource, SourceError};
pub use transport::{HttpTransport, ReqwestTransport};
pub use types::{CachedMetric, Metric, MetricKind, PushDestination};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
