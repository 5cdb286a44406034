//! Push dispatcher
//!
//! Resolves the active destination from configuration and secrets, renders
//! the batch in that destination's wire format and POSTs it with
//! exponential-backoff retry. The dispatcher keeps no state between pushes.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use crate::config::{self, keys, ConfigSource, ExportIdentity};
use crate::error::TelemetryError;
use crate::exposition::{self, ExpositionFormatter};
use crate::line_protocol::{self, LineProtocolFormatter};
use crate::secrets::{self, SecretStore};
use crate::transport::{HttpRequest, HttpTransport};
use crate::types::{DestinationKind, Metric, PushDestination};

/// Push retry tunables
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    /// Delay after attempt `n` is `base_delay * 2^n`
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    /// Pause before the attempt following `attempt` (1-based): 2s, 4s, ...
    pub fn delay_after(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(2u32.saturating_pow(attempt))
    }
}

/// Outcome of a successful push
#[derive(Debug, Clone, PartialEq)]
pub struct PushReport {
    pub destination: DestinationKind,
    pub attempts: u32,
    pub status: u16,
    pub metrics: usize,
}

/// Build the active destination from configuration and secrets.
///
/// Incomplete settings fail here, before any network call is made.
pub fn resolve_destination(
    config: &dyn ConfigSource,
    secrets: &dyn SecretStore,
) -> Result<PushDestination, TelemetryError> {
    match config::destination_kind(config) {
        DestinationKind::Prometheus => {
            let url = config.get_string(keys::PUSHGATEWAY_URL).ok_or_else(|| {
                TelemetryError::Configuration("Pushgateway URL not configured".to_string())
            })?;
            Ok(PushDestination::Prometheus {
                url,
                basic_auth: secrets::load_basic_auth(secrets),
            })
        }
        DestinationKind::InfluxDb => {
            let url = config.get_string(keys::INFLUXDB_URL);
            let org = config.get_string(keys::INFLUXDB_ORG);
            let bucket = config.get_string(keys::INFLUXDB_BUCKET);
            let token = secrets::load_influx_token(secrets);

            match (url, org, bucket, token) {
                (Some(url), Some(org), Some(bucket), Some(token)) => Ok(PushDestination::InfluxDb {
                    url,
                    org,
                    bucket,
                    token,
                }),
                (url, org, bucket, token) => {
                    let missing: Vec<&str> = [
                        ("url", url.is_none()),
                        ("org", org.is_none()),
                        ("bucket", bucket.is_none()),
                        ("token", token.is_none()),
                    ]
                    .iter()
                    .filter(|(_, absent)| *absent)
                    .map(|(field, _)| *field)
                    .collect();
                    Err(TelemetryError::Configuration(format!(
                        "InfluxDB settings incomplete, missing: {}",
                        missing.join(", ")
                    )))
                }
            }
        }
    }
}

/// Pushgateway instance segment: spaces become `_`, quotes are dropped
pub fn sanitize_instance(device_name: &str) -> String {
    device_name.replace(' ', "_").replace(['\'', '"'], "")
}

/// Renders and sends batches to a destination
pub struct PushDispatcher {
    transport: Arc<dyn HttpTransport>,
    identity: ExportIdentity,
    retry: RetryPolicy,
}

impl PushDispatcher {
    pub fn new(transport: Arc<dyn HttpTransport>, identity: ExportIdentity) -> Self {
        Self::with_retry(transport, identity, RetryPolicy::default())
    }

    pub fn with_retry(
        transport: Arc<dyn HttpTransport>,
        identity: ExportIdentity,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            transport,
            identity,
            retry,
        }
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    /// Push `batch`, retrying transport failures and non-2xx responses.
    /// After the last attempt the last error is returned.
    pub async fn push(
        &self,
        batch: &[Metric],
        destination: &PushDestination,
    ) -> Result<PushReport, TelemetryError> {
        if batch.is_empty() {
            return Err(TelemetryError::NoDataAvailable);
        }

        let kind = destination.kind();
        let request = self.build_request(batch, destination, Utc::now().timestamp_millis());
        let max_attempts = self.retry.max_attempts.max(1);
        let mut last_error = None;

        for attempt in 1..=max_attempts {
            match self.transport.post(request.clone()).await {
                Ok(response) if response.is_success() => {
                    tracing::info!(
                        attempt,
                        destination = kind.as_str(),
                        status = response.status,
                        count = batch.len(),
                        "Pushed metrics"
                    );
                    return Ok(PushReport {
                        destination: kind,
                        attempts: attempt,
                        status: response.status,
                        metrics: batch.len(),
                    });
                }
                Ok(response) => {
                    tracing::warn!(
                        attempt,
                        destination = kind.as_str(),
                        status = response.status,
                        body = %response.body,
                        "Push rejected"
                    );
                    last_error = Some(TelemetryError::HttpStatus {
                        status: response.status,
                        body: response.body,
                    });
                }
                Err(e) if e.is_retryable() => {
                    tracing::warn!(
                        attempt,
                        destination = kind.as_str(),
                        error = %e,
                        "Push failed"
                    );
                    last_error = Some(e);
                }
                Err(e) => return Err(e),
            }

            if attempt < max_attempts {
                tokio::time::sleep(self.retry.delay_after(attempt)).await;
            }
        }

        let error = last_error
            .unwrap_or_else(|| TelemetryError::Transport("No push attempt was made".to_string()));
        tracing::error!(
            attempts = max_attempts,
            destination = kind.as_str(),
            error = %error,
            "Push failed after all retries"
        );
        Err(error)
    }

    /// Render `batch` into the request for `destination`
    pub fn build_request(
        &self,
        batch: &[Metric],
        destination: &PushDestination,
        timestamp_ms: i64,
    ) -> HttpRequest {
        match destination {
            PushDestination::Prometheus { url, basic_auth } => {
                let url = format!(
                    "{}/metrics/job/{}/instance/{}",
                    url.trim_end_matches('/'),
                    self.identity.job,
                    sanitize_instance(&self.identity.device_name)
                );
                let body = ExpositionFormatter::format(batch);
                let request = HttpRequest::new(url, body)
                    .with_header("Content-Type", exposition::CONTENT_TYPE);

                match basic_auth {
                    Some(auth) => {
                        let credentials =
                            BASE64.encode(format!("{}:{}", auth.username, auth.password));
                        request.with_header("Authorization", format!("Basic {credentials}"))
                    }
                    None => request,
                }
            }
            PushDestination::InfluxDb {
                url,
                org,
                bucket,
                token,
            } => {
                let url = format!(
                    "{}/api/v2/write?org={}&bucket={}&precision=ms",
                    url.trim_end_matches('/'),
                    urlencoding::encode(org),
                    urlencoding::encode(bucket)
                );
                let formatter =
                    LineProtocolFormatter::new(&self.identity.device_name, &self.identity.job);
                let body = formatter.format(batch, timestamp_ms);

                HttpRequest::new(url, body)
                    .with_header("Content-Type", line_protocol::CONTENT_TYPE)
                    .with_header("Authorization", format!("Token {token}"))
            }
        }
    }
}
