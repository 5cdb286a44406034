//! InfluxDB line protocol
//!
//! One line per metric: `measurement,device=..,job=..,metric_type=.. value=<float> <ms>`.
//! Every line of a batch carries the same timestamp, the moment of formatting.

use crate::types::Metric;

/// Content type of the line protocol payload
pub const CONTENT_TYPE: &str = "text/plain; charset=utf-8";

/// Ordered keyword → `metric_type` tag mapping; first substring match wins
const METRIC_TYPE_KEYWORDS: &[(&str, &str)] = &[
    ("steps", "steps"),
    ("heart_rate", "heart_rate"),
    ("active_energy", "active_energy"),
    ("distance_walking", "distance_walking"),
    ("flights_climbed", "flights_climbed"),
    ("body_mass", "body_mass"),
    ("sleep", "sleep_analysis"),
];

/// Line protocol formatter bound to a device and job
#[derive(Debug, Clone)]
pub struct LineProtocolFormatter {
    device: String,
    job: String,
}

impl LineProtocolFormatter {
    pub fn new(device: &str, job: &str) -> Self {
        Self {
            device: escape_tag_value(device),
            job: escape_tag_value(job),
        }
    }

    /// Format a batch with a shared millisecond timestamp. Lines are joined
    /// with `\n`, no trailing newline.
    ///
    /// Float fields cannot hold NaN or infinity, so those metrics are left out.
    pub fn format(&self, batch: &[Metric], timestamp_ms: i64) -> String {
        batch
            .iter()
            .filter(|metric| {
                let finite = metric.value.is_finite();
                if !finite {
                    tracing::warn!(
                        metric = %metric.name,
                        value = %metric.value,
                        "Skipping non-finite value in line protocol"
                    );
                }
                finite
            })
            .map(|metric| self.format_line(metric, timestamp_ms))
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn format_line(&self, metric: &Metric, timestamp_ms: i64) -> String {
        let measurement = metric.name.replace('.', "_");
        format!(
            "{measurement},device={},job={},metric_type={} value={} {timestamp_ms}",
            self.device,
            self.job,
            metric_type_tag(metric),
            format_field_value(metric.value)
        )
    }
}

/// `metric_type` tag from the keyword table, falling back to the metric kind
pub fn metric_type_tag(metric: &Metric) -> &'static str {
    METRIC_TYPE_KEYWORDS
        .iter()
        .find(|(keyword, _)| metric.name.contains(keyword))
        .map(|(_, tag)| *tag)
        .unwrap_or_else(|| metric.kind.as_str())
}

/// Spaces become underscores; commas and equals signs are backslash-escaped
fn escape_tag_value(value: &str) -> String {
    value
        .replace(' ', "_")
        .replace(',', "\\,")
        .replace('=', "\\=")
}

/// Float field value, always with a fractional part (`5.0`, `42.5`)
fn format_field_value(value: f64) -> String {
    format!("{value:?}")
}
