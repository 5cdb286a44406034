//! Push cycle orchestration
//!
//! One push cycle runs destination resolution, collection and dispatch in
//! that order, then records the success time. At most one cycle is in flight
//! per pipeline; an overlapping request is skipped rather than queued.

use chrono::Utc;
use std::sync::Arc;
use uuid::Uuid;

use crate::collector::{BatchOrigin, Collector, DailyRecord};
use crate::config::{keys, ConfigSource, ConfigValue};
use crate::dispatcher::{resolve_destination, PushDispatcher, PushReport};
use crate::error::TelemetryError;
use crate::secrets::SecretStore;

/// What started a cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleTrigger {
    /// Timer tick or the immediate cycle on scheduler start
    Scheduled,
    /// Out-of-band request (data changed, user refresh, background wake-up)
    External,
}

/// How a cycle ended when it did not fail
#[derive(Debug, Clone, PartialEq)]
pub enum CycleOutcome {
    Pushed {
        report: PushReport,
        origin: BatchOrigin,
    },
    /// Nothing fresh and nothing cached; no push attempted
    NoData,
    /// Another cycle was still in flight
    Skipped,
}

/// Hook for hosts that surface cycle results out of band (local notifications)
pub trait StatusNotifier: Send + Sync {
    fn cycle_finished(&self, trigger: CycleTrigger, result: &Result<CycleOutcome, TelemetryError>);
}

/// Collector → formatter → dispatcher, wired with the host's collaborators
pub struct PushPipeline {
    collector: Collector,
    dispatcher: PushDispatcher,
    config: Arc<dyn ConfigSource>,
    secrets: Arc<dyn SecretStore>,
    notifier: Option<Arc<dyn StatusNotifier>>,
    in_flight: tokio::sync::Mutex<()>,
}

impl PushPipeline {
    pub fn new(
        collector: Collector,
        dispatcher: PushDispatcher,
        config: Arc<dyn ConfigSource>,
        secrets: Arc<dyn SecretStore>,
    ) -> Self {
        Self {
            collector,
            dispatcher,
            config,
            secrets,
            notifier: None,
            in_flight: tokio::sync::Mutex::new(()),
        }
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn StatusNotifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    pub fn config(&self) -> &dyn ConfigSource {
        self.config.as_ref()
    }

    pub fn collector(&self) -> &Collector {
        &self.collector
    }

    /// Run one push cycle.
    ///
    /// # Arguments
    /// * `trigger` - What asked for the cycle; passed through to the notifier
    ///
    /// # Returns
    /// The cycle outcome. Configuration, source and push failures are logged
    /// and returned as errors; none of them leave the pipeline unusable.
    ///
    /// # Example
    /// ```ignore
    /// match pipeline.run_cycle(CycleTrigger::External).await {
    ///     Ok(CycleOutcome::Pushed { report, .. }) => println!("{} metrics", report.metrics),
    ///     Ok(_) => {}
    ///     Err(e) => eprintln!("push failed: {e}"),
    /// }
    /// ```
    pub async fn run_cycle(&self, trigger: CycleTrigger) -> Result<CycleOutcome, TelemetryError> {
        let Ok(_guard) = self.in_flight.try_lock() else {
            tracing::info!(?trigger, "Push cycle already in flight, skipping");
            return Ok(CycleOutcome::Skipped);
        };

        let cycle_id = Uuid::new_v4();
        tracing::debug!(%cycle_id, ?trigger, "Push cycle started");

        let result = self.execute(cycle_id).await;
        match &result {
            Ok(CycleOutcome::Pushed { report, origin }) => tracing::info!(
                %cycle_id,
                count = report.metrics,
                destination = report.destination.as_str(),
                ?origin,
                "Push cycle succeeded"
            ),
            Ok(outcome) => tracing::info!(%cycle_id, ?outcome, "Push cycle finished"),
            Err(e) => tracing::error!(%cycle_id, error = %e, "Push cycle failed"),
        }

        if let Some(notifier) = &self.notifier {
            notifier.cycle_finished(trigger, &result);
        }
        result
    }

    async fn execute(&self, cycle_id: Uuid) -> Result<CycleOutcome, TelemetryError> {
        let destination = resolve_destination(self.config.as_ref(), self.secrets.as_ref())?;

        let collection = self.collector.collect().await?;
        if collection.is_empty() {
            tracing::warn!(%cycle_id, "No data available, skipping push");
            return Ok(CycleOutcome::NoData);
        }

        let report = self
            .dispatcher
            .push(&collection.metrics, &destination)
            .await?;

        self.config
            .set(keys::LAST_PUSH_TIME, ConfigValue::Timestamp(Utc::now()));

        Ok(CycleOutcome::Pushed {
            report,
            origin: collection.origin,
        })
    }

    /// Per-day history for display, see [`Collector::daily_history`]
    pub async fn daily_history(&self, days: u32) -> Result<Vec<DailyRecord>, TelemetryError> {
        self.collector.daily_history(days).await
    }

    /// Drop the cached snapshot
    pub fn clear_cache(&self) -> Result<(), TelemetryError> {
        self.collector.cache().clear()
    }
}
