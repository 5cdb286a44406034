//! Metric collection
//!
//! Queries the biometric source for every catalog entry, assembles one batch
//! per attempt and retries empty attempts after a constant delay. A
//! non-empty batch is written through to the cache; when every attempt comes
//! back empty the cache snapshot is served instead, tagged with its age.

use chrono::{DateTime, Local, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use crate::cache::MetricCache;
use crate::catalog::{self, QUANTITY_CATALOG};
use crate::config::{self, ConfigSource, ExportIdentity};
use crate::error::TelemetryError;
use crate::source::{BiometricSource, CollectionWindow, EventCategory, Quantity, SourceError};
use crate::types::{Labels, Metric, MetricKind};

/// Collection tunables
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CollectorOptions {
    /// Attempts before falling back to the cache
    pub max_attempts: u32,
    /// Constant pause between empty attempts
    pub retry_delay: Duration,
    /// Days covered by cumulative queries (1 = since local midnight)
    pub window_days: u32,
}

impl Default for CollectorOptions {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            retry_delay: Duration::from_secs(2),
            window_days: 1,
        }
    }
}

/// Where a collected batch came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchOrigin {
    /// Fresh data from the biometric source
    Fresh,
    /// Cache fallback after every attempt came back empty
    Cache,
    /// Nothing fresh and nothing valid in the cache
    Empty,
}

/// Result of one `collect` call
#[derive(Debug, Clone)]
pub struct Collection {
    pub metrics: Vec<Metric>,
    pub origin: BatchOrigin,
    /// Attempts made against the source
    pub attempts: u32,
}

impl Collection {
    pub fn is_empty(&self) -> bool {
        self.metrics.is_empty()
    }
}

/// One day of the daily history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyRecord {
    pub date: NaiveDate,
    /// History key → value, e.g. `steps`, `distance_km`
    pub values: BTreeMap<String, f64>,
}

/// Collects metric batches from a biometric source
pub struct Collector {
    source: Arc<dyn BiometricSource>,
    cache: Arc<MetricCache>,
    config: Arc<dyn ConfigSource>,
    identity: ExportIdentity,
    options: CollectorOptions,
}

impl Collector {
    pub fn new(
        source: Arc<dyn BiometricSource>,
        cache: Arc<MetricCache>,
        config: Arc<dyn ConfigSource>,
        identity: ExportIdentity,
    ) -> Self {
        Self::with_options(source, cache, config, identity, CollectorOptions::default())
    }

    pub fn with_options(
        source: Arc<dyn BiometricSource>,
        cache: Arc<MetricCache>,
        config: Arc<dyn ConfigSource>,
        identity: ExportIdentity,
        options: CollectorOptions,
    ) -> Self {
        Self {
            source,
            cache,
            config,
            identity,
            options,
        }
    }

    pub fn cache(&self) -> &Arc<MetricCache> {
        &self.cache
    }

    /// Collect one batch.
    ///
    /// Returns `Err(SourceUnavailable)` only when the source was unreachable
    /// on the last attempt and the cache had nothing valid to offer.
    pub async fn collect(&self) -> Result<Collection, TelemetryError> {
        let max_attempts = self.options.max_attempts.max(1);
        let mut unreachable: Option<SourceError> = None;

        for attempt in 1..=max_attempts {
            let now = Utc::now();
            match self.collect_once(now).await {
                Ok(metrics) if !metrics.is_empty() => {
                    if let Err(e) = self.cache.save(&metrics, now) {
                        tracing::warn!(error = %e, "Failed to cache collected metrics");
                    }
                    tracing::info!(count = metrics.len(), attempt, "Collected metrics");
                    return Ok(Collection {
                        metrics,
                        origin: BatchOrigin::Fresh,
                        attempts: attempt,
                    });
                }
                Ok(_) => {
                    unreachable = None;
                    tracing::warn!(attempt, "No metrics collected");
                }
                Err(e) => {
                    tracing::warn!(attempt, error = %e, "Biometric source unreachable");
                    unreachable = Some(e);
                }
            }

            if attempt < max_attempts {
                tokio::time::sleep(self.options.retry_delay).await;
            }
        }

        let now = Utc::now();
        let cached = self.cache.load_valid(now);
        if !cached.is_empty() {
            tracing::info!(count = cached.len(), "Using cached metrics as fallback");
            return Ok(Collection {
                metrics: cached.iter().map(|c| c.to_fallback_metric(now)).collect(),
                origin: BatchOrigin::Cache,
                attempts: max_attempts,
            });
        }

        if let Some(e) = unreachable {
            return Err(TelemetryError::SourceUnavailable(e.to_string()));
        }

        tracing::warn!("No metrics available (fresh or cached)");
        Ok(Collection {
            metrics: Vec::new(),
            origin: BatchOrigin::Empty,
            attempts: max_attempts,
        })
    }

    /// One pass over every category. Category-level query failures are
    /// skipped; an unreachable source aborts the pass.
    async fn collect_once(&self, now: DateTime<Utc>) -> Result<Vec<Metric>, SourceError> {
        let window = CollectionWindow::trailing_days(now, self.options.window_days);
        let mut metrics = Vec::new();

        self.collect_quantities(&window, &mut metrics).await?;
        self.collect_events(&window, &mut metrics).await?;
        self.collect_workouts(&window, &mut metrics).await?;
        self.collect_activity_summary(now, &mut metrics).await?;

        if !metrics.is_empty() {
            if let Some(last_sync) = self.last_sync_metric(now) {
                metrics.push(last_sync);
            }
        }

        Ok(metrics)
    }

    async fn collect_quantities(
        &self,
        window: &CollectionWindow,
        metrics: &mut Vec<Metric>,
    ) -> Result<(), SourceError> {
        for spec in QUANTITY_CATALOG {
            match spec.kind {
                MetricKind::Counter => {
                    let sum = available(
                        spec.stem,
                        self.source.fetch_cumulative(spec.quantity, window).await,
                    )?;
                    if let Some(Some(value)) = sum {
                        metrics.push(self.metric(spec.metric_name(), value, spec.kind, spec.unit));
                    }
                }
                MetricKind::Gauge => {
                    let latest =
                        available(spec.stem, self.source.fetch_latest(spec.quantity).await)?;
                    if let Some(Some(sample)) = latest {
                        let mut metric =
                            self.metric(spec.metric_name(), sample.value, spec.kind, spec.unit);
                        metric.labels.insert("source".to_string(), sample.source_label);
                        metrics.push(metric);
                    }
                }
            }
        }
        Ok(())
    }

    async fn collect_events(
        &self,
        window: &CollectionWindow,
        metrics: &mut Vec<Metric>,
    ) -> Result<(), SourceError> {
        let sleep = available(
            "sleep_analysis",
            self.source
                .fetch_category_minutes(EventCategory::SleepAnalysis, window)
                .await,
        )?;
        if let Some(minutes) = sleep.filter(|m| *m > 0.0) {
            metrics.push(self.metric(
                catalog::SLEEP_MINUTES.to_string(),
                minutes,
                MetricKind::Counter,
                "min",
            ));
        }

        for event in catalog::EVENT_CATALOG {
            let count = available(
                event.name,
                self.source
                    .fetch_category_events(event.category, event.predicate, window)
                    .await,
            )?;
            if let Some(count) = count {
                metrics.push(self.metric(
                    event.name.to_string(),
                    count as f64,
                    MetricKind::Counter,
                    "count",
                ));
            }
        }
        Ok(())
    }

    async fn collect_workouts(
        &self,
        window: &CollectionWindow,
        metrics: &mut Vec<Metric>,
    ) -> Result<(), SourceError> {
        let Some(workouts) = available("workouts", self.source.fetch_workouts(window).await)? else {
            return Ok(());
        };

        let mut minutes_by_activity = BTreeMap::new();
        let mut calories_by_activity = BTreeMap::new();
        for workout in &workouts {
            *minutes_by_activity.entry(workout.activity).or_insert(0.0) += workout.duration_minutes;
            if let Some(kcal) = workout.energy_kcal {
                *calories_by_activity.entry(workout.activity).or_insert(0.0) += kcal;
            }
        }

        for (activity, minutes) in minutes_by_activity {
            metrics.push(
                self.metric(
                    catalog::WORKOUT_MINUTES.to_string(),
                    minutes,
                    MetricKind::Counter,
                    "min",
                )
                .with_label("activity", activity.as_str()),
            );
        }
        for (activity, kcal) in calories_by_activity {
            metrics.push(
                self.metric(
                    catalog::WORKOUT_CALORIES.to_string(),
                    kcal,
                    MetricKind::Counter,
                    "kcal",
                )
                .with_label("activity", activity.as_str()),
            );
        }
        Ok(())
    }

    async fn collect_activity_summary(
        &self,
        now: DateTime<Utc>,
        metrics: &mut Vec<Metric>,
    ) -> Result<(), SourceError> {
        let today = now.with_timezone(&Local).date_naive();
        let Some(Some(summary)) = available(
            "activity_summary",
            self.source.fetch_activity_summary(today).await,
        )?
        else {
            return Ok(());
        };

        let optional = [
            (catalog::SUMMARY_MOVE_MINUTES, summary.move_minutes, "min"),
            (catalog::SUMMARY_MOVE_GOAL_MINUTES, summary.move_goal_minutes, "min"),
        ];
        for (name, value, unit) in optional {
            if let Some(value) = value.filter(|v| *v > 0.0) {
                metrics.push(self.metric(name.to_string(), value, MetricKind::Gauge, unit));
            }
        }

        let fields = [
            (catalog::SUMMARY_ACTIVE_ENERGY, summary.active_energy_kcal, "kcal"),
            (catalog::SUMMARY_ACTIVE_ENERGY_GOAL, summary.active_energy_goal_kcal, "kcal"),
            (catalog::SUMMARY_EXERCISE_MINUTES, summary.exercise_minutes, "min"),
            (catalog::SUMMARY_EXERCISE_GOAL_MINUTES, summary.exercise_goal_minutes, "min"),
            (catalog::SUMMARY_STAND_HOURS, summary.stand_hours, "count"),
            (catalog::SUMMARY_STAND_HOURS_GOAL, summary.stand_goal_hours, "count"),
        ];
        for (name, value, unit) in fields {
            metrics.push(self.metric(name.to_string(), value, MetricKind::Gauge, unit));
        }
        Ok(())
    }

    fn last_sync_metric(&self, now: DateTime<Utc>) -> Option<Metric> {
        let last_push = config::last_push_time(self.config.as_ref())?;
        let seconds = (now - last_push).num_milliseconds() as f64 / 1000.0;
        Some(self.metric(
            catalog::LAST_SYNC_SECONDS.to_string(),
            seconds,
            MetricKind::Gauge,
            "s",
        ))
    }

    /// Per-day values of the history quantities for the last `days` days,
    /// oldest day first. Distances are reported in kilometers.
    pub async fn daily_history(&self, days: u32) -> Result<Vec<DailyRecord>, TelemetryError> {
        let mut by_date: BTreeMap<NaiveDate, BTreeMap<String, f64>> = BTreeMap::new();

        for (quantity, key) in catalog::DAILY_HISTORY {
            let series = available(key, self.source.fetch_daily_series(*quantity, days).await)
                .map_err(|e| TelemetryError::SourceUnavailable(e.to_string()))?;

            for (date, value) in series.unwrap_or_default() {
                let value = if *quantity == Quantity::DistanceWalkingRunning {
                    value / 1000.0
                } else {
                    value
                };
                by_date.entry(date).or_default().insert(key.to_string(), value);
            }
        }

        let sleep = self
            .source
            .fetch_daily_category_minutes(EventCategory::SleepAnalysis, days)
            .await;
        let sleep = available(catalog::DAILY_SLEEP_KEY, sleep)
            .map_err(|e| TelemetryError::SourceUnavailable(e.to_string()))?;
        for (date, minutes) in sleep.unwrap_or_default() {
            if minutes > 0.0 {
                by_date
                    .entry(date)
                    .or_default()
                    .insert(catalog::DAILY_SLEEP_KEY.to_string(), minutes / 60.0);
            }
        }

        tracing::info!(days = by_date.len(), "Collected daily history");
        Ok(by_date
            .into_iter()
            .map(|(date, values)| DailyRecord { date, values })
            .collect())
    }

    fn metric(&self, name: String, value: f64, kind: MetricKind, unit: &str) -> Metric {
        let mut labels = Labels::new();
        labels.insert("instance".to_string(), self.identity.device_name.clone());
        Metric {
            name,
            value,
            kind,
            labels,
            unit: unit.to_string(),
        }
    }
}

/// Turn a per-category query failure into "absent"; keep structural failures
fn available<T>(category: &str, result: Result<T, SourceError>) -> Result<Option<T>, SourceError> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(SourceError::Query(message)) => {
            tracing::debug!(category, error = %message, "Category unavailable");
            Ok(None)
        }
        Err(e @ SourceError::Unreachable(_)) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryBlobStore;
    use crate::config::{keys, ConfigValue, MemoryConfigSource};
    use crate::test_support::FakeSource;
    use crate::types::{CACHED_LABEL, DATA_AGE_LABEL};
    use chrono::Duration as ChronoDuration;

    fn collector_with(source: FakeSource) -> (Collector, Arc<FakeSource>, Arc<MetricCache>) {
        let source = Arc::new(source);
        let cache = Arc::new(MetricCache::new(Arc::new(MemoryBlobStore::new())));
        let collector = Collector::new(
            source.clone(),
            cache.clone(),
            Arc::new(MemoryConfigSource::new()),
            ExportIdentity::new("Test Phone"),
        );
        (collector, source, cache)
    }

    fn find<'a>(metrics: &'a [Metric], name: &str) -> Vec<&'a Metric> {
        metrics.iter().filter(|m| m.name == name).collect()
    }

    #[tokio::test]
    async fn test_collect_fresh_batch() {
        let (collector, source, cache) = collector_with(FakeSource::healthy());

        let collection = collector.collect().await.unwrap();
        assert_eq!(collection.origin, BatchOrigin::Fresh);
        assert_eq!(collection.attempts, 1);
        assert_eq!(source.attempts(), 1);

        let steps = find(&collection.metrics, "healthkit_steps_total");
        assert_eq!(steps.len(), 1);
        assert_eq!(steps[0].value, 8500.0);
        assert_eq!(steps[0].kind, MetricKind::Counter);
        assert_eq!(steps[0].labels.get("instance").unwrap(), "Test Phone");

        let hr = find(&collection.metrics, "healthkit_heart_rate_bpm");
        assert_eq!(hr[0].labels.get("source").unwrap(), "Apple Watch");
        assert_eq!(hr[0].kind, MetricKind::Gauge);

        let sleep = find(&collection.metrics, catalog::SLEEP_MINUTES);
        assert_eq!(sleep[0].value, 420.0);

        let workouts = find(&collection.metrics, catalog::WORKOUT_MINUTES);
        assert_eq!(workouts.len(), 2);
        assert_eq!(workouts[0].labels.get("activity").unwrap(), "running");
        assert_eq!(workouts[0].value, 45.0);
        let calories = find(&collection.metrics, catalog::WORKOUT_CALORIES);
        assert_eq!(calories.len(), 1);

        assert_eq!(find(&collection.metrics, catalog::SUMMARY_STAND_HOURS_GOAL).len(), 1);
        assert!(find(&collection.metrics, catalog::SUMMARY_MOVE_MINUTES).is_empty());

        // Write-through
        assert_eq!(cache.load_all().unwrap().len(), collection.metrics.len());
    }

    #[tokio::test]
    async fn test_failed_categories_are_skipped() {
        let mut source = FakeSource::healthy();
        source.failing.insert(Quantity::StepCount);
        source.failing.insert(Quantity::HeartRate);
        let (collector, _, _) = collector_with(source);

        let collection = collector.collect().await.unwrap();
        assert_eq!(collection.origin, BatchOrigin::Fresh);
        assert!(find(&collection.metrics, "healthkit_steps_total").is_empty());
        assert!(find(&collection.metrics, "healthkit_heart_rate_bpm").is_empty());
        assert!(!find(&collection.metrics, "healthkit_resting_heart_rate_bpm").is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_attempts_retry_with_constant_delay() {
        let source = FakeSource::healthy().with_empty_attempts(2);
        let (collector, source, _) = collector_with(source);

        let started = tokio::time::Instant::now();
        let collection = collector.collect().await.unwrap();

        assert_eq!(collection.origin, BatchOrigin::Fresh);
        assert_eq!(collection.attempts, 3);
        assert_eq!(source.attempts(), 3);
        assert_eq!(started.elapsed(), Duration::from_secs(4));
    }

    #[tokio::test(start_paused = true)]
    async fn test_fallback_to_cache_tags_metrics() {
        let (collector, source, cache) = collector_with(FakeSource::empty());
        let observed = Utc::now() - ChronoDuration::minutes(10);
        let cached = vec![Metric::new("healthkit_steps_total", 1200.0, MetricKind::Counter, "count")
            .unwrap()
            .with_label("instance", "Test Phone")];
        cache.save(&cached, observed).unwrap();

        let collection = collector.collect().await.unwrap();
        assert_eq!(collection.origin, BatchOrigin::Cache);
        assert_eq!(source.attempts(), 3);
        assert_eq!(collection.metrics.len(), 1);

        let metric = &collection.metrics[0];
        assert_eq!(metric.value, 1200.0);
        assert_eq!(metric.labels.get(CACHED_LABEL).unwrap(), "true");
        let age: i64 = metric.labels.get(DATA_AGE_LABEL).unwrap().parse().unwrap();
        assert!((10..=11).contains(&age));

        // Fallback reads leave the snapshot untouched
        assert_eq!(cache.load_all().unwrap()[0].metric, cached[0]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_cache_yields_empty_collection() {
        let (collector, _, cache) = collector_with(FakeSource::empty());
        let observed = Utc::now() - ChronoDuration::hours(2);
        cache
            .save(
                &[Metric::new("x", 1.0, MetricKind::Gauge, "count").unwrap()],
                observed,
            )
            .unwrap();

        let collection = collector.collect().await.unwrap();
        assert_eq!(collection.origin, BatchOrigin::Empty);
        assert!(collection.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_unreachable_source_without_cache_is_an_error() {
        let (collector, _, _) = collector_with(FakeSource::unreachable());

        let result = collector.collect().await;
        assert!(matches!(result, Err(TelemetryError::SourceUnavailable(_))));
    }

    #[tokio::test]
    async fn test_last_sync_metric_is_added() {
        let source = Arc::new(FakeSource::healthy());
        let config = Arc::new(MemoryConfigSource::new());
        config.set(
            keys::LAST_PUSH_TIME,
            ConfigValue::Timestamp(Utc::now() - ChronoDuration::seconds(90)),
        );
        let collector = Collector::new(
            source,
            Arc::new(MetricCache::new(Arc::new(MemoryBlobStore::new()))),
            config,
            ExportIdentity::new("phone"),
        );

        let collection = collector.collect().await.unwrap();
        let last_sync = find(&collection.metrics, catalog::LAST_SYNC_SECONDS);
        assert_eq!(last_sync.len(), 1);
        assert!(last_sync[0].value >= 90.0 && last_sync[0].value < 100.0);
    }

    #[tokio::test]
    async fn test_daily_history_merges_series() {
        let (collector, _, _) = collector_with(FakeSource::healthy());

        let history = collector.daily_history(2).await.unwrap();
        assert_eq!(history.len(), 2);
        assert!(history[0].date < history[1].date);
        assert_eq!(history[1].values.get("steps"), Some(&9000.0));
        assert_eq!(history[1].values.get("distance_km"), Some(&6.5));
        assert!(history[0].values.get("distance_km").is_none());

        assert_eq!(history[1].values.get(catalog::DAILY_SLEEP_KEY), Some(&7.5));
        // A night with no recorded sleep leaves the key out
        assert!(history[0].values.get(catalog::DAILY_SLEEP_KEY).is_none());
    }
}
