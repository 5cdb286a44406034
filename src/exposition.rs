//! Prometheus exposition format
//!
//! Serializes a batch into the text format accepted by the Pushgateway.
//! Output is deterministic: blocks follow the first-seen order of names,
//! samples keep their relative input order, labels are sorted by key.

use std::collections::HashMap;
use std::fmt::Write;

use crate::catalog::help_text;
use crate::types::{Labels, Metric};

/// Content type of the exposition payload
pub const CONTENT_TYPE: &str = "text/plain; version=0.0.4";

/// Exposition text formatter
pub struct ExpositionFormatter;

impl ExpositionFormatter {
    /// Format a batch. One `# HELP`/`# TYPE` pair per distinct name, a blank
    /// line after each block.
    pub fn format(batch: &[Metric]) -> String {
        let mut output = String::new();

        for group in group_by_name(batch) {
            let first = group[0];
            let _ = writeln!(output, "# HELP {} {}", first.name, help_text(&first.name));
            let _ = writeln!(output, "# TYPE {} {}", first.name, first.kind.as_str());

            for metric in group {
                let _ = writeln!(
                    output,
                    "{}{} {}",
                    metric.name,
                    format_labels(&metric.labels),
                    format_value(metric.value)
                );
            }

            output.push('\n');
        }

        output
    }
}

/// Group metrics by name, blocks in first-seen order
fn group_by_name(batch: &[Metric]) -> Vec<Vec<&Metric>> {
    let mut index: HashMap<&str, usize> = HashMap::new();
    let mut groups: Vec<Vec<&Metric>> = Vec::new();

    for metric in batch {
        match index.get(metric.name.as_str()) {
            Some(&i) => groups[i].push(metric),
            None => {
                index.insert(metric.name.as_str(), groups.len());
                groups.push(vec![metric]);
            }
        }
    }

    groups
}

/// `{k1="v1",k2="v2"}` with keys sorted; empty string for no labels
fn format_labels(labels: &Labels) -> String {
    if labels.is_empty() {
        return String::new();
    }

    let formatted: Vec<String> = labels
        .iter()
        .map(|(key, value)| format!("{key}=\"{}\"", escape_label_value(value)))
        .collect();

    format!("{{{}}}", formatted.join(","))
}

/// Escape a label value: backslash, then double quote, then newline
pub fn escape_label_value(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('\n', "\\n")
}

/// Render a sample value.
///
/// Integral values have no decimal point; others use at most 6 fractional
/// digits with trailing zeros (and a dangling point) removed.
pub fn format_value(value: f64) -> String {
    if value.is_nan() {
        return "NaN".to_string();
    }
    if value.is_infinite() {
        return if value > 0.0 { "+Inf" } else { "-Inf" }.to_string();
    }

    if value.fract() == 0.0 && value.abs() < 9.0e15 {
        return format!("{}", value as i64);
    }

    let fixed = format!("{value:.6}");
    let trimmed = fixed.trim_end_matches('0').trim_end_matches('.');
    match trimmed {
        "-0" | "" => "0".to_string(),
        other => other.to_string(),
    }
}
