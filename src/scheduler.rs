//! Periodic push scheduler
//!
//! `Stopped → Running` state machine around a single timer task. Starting a
//! running scheduler restarts it, so there is never more than one timer.
//! Stopping cancels the timer task, including a cycle parked in a retry
//! backoff, and waits for it to exit.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::config;
use crate::error::TelemetryError;
use crate::pipeline::{CycleOutcome, CycleTrigger, PushPipeline};

struct Running {
    token: CancellationToken,
    handle: JoinHandle<()>,
    interval: Duration,
}

impl Running {
    async fn shutdown(self) {
        self.token.cancel();
        if let Err(e) = self.handle.await {
            if !e.is_cancelled() {
                tracing::warn!(error = %e, "Push timer task ended abnormally");
            }
        }
    }
}

/// Drives a [`PushPipeline`] on the configured interval
pub struct PushScheduler {
    pipeline: Arc<PushPipeline>,
    state: Mutex<Option<Running>>,
}

impl PushScheduler {
    pub fn new(pipeline: Arc<PushPipeline>) -> Self {
        Self {
            pipeline,
            state: Mutex::new(None),
        }
    }

    pub fn pipeline(&self) -> &Arc<PushPipeline> {
        &self.pipeline
    }

    /// (Re)start the timer: one cycle right away, then one per interval.
    /// The interval is read from configuration on every start.
    pub async fn start(&self) {
        let mut state = self.state.lock().await;
        if let Some(running) = state.take() {
            tracing::debug!("Restarting push scheduler");
            running.shutdown().await;
        }

        let interval = config::push_interval(self.pipeline.config());
        let token = CancellationToken::new();
        let handle = tokio::spawn(run_timer(self.pipeline.clone(), interval, token.clone()));

        tracing::info!(interval_secs = interval.as_secs(), "Push scheduler started");
        *state = Some(Running {
            token,
            handle,
            interval,
        });
    }

    /// Cancel the timer. Returns once no scheduled cycle can still push.
    pub async fn stop(&self) {
        let running = self.state.lock().await.take();
        if let Some(running) = running {
            running.shutdown().await;
            tracing::info!("Push scheduler stopped");
        }
    }

    pub async fn is_running(&self) -> bool {
        self.state.lock().await.is_some()
    }

    /// Interval of the active timer
    pub async fn interval(&self) -> Option<Duration> {
        self.state.lock().await.as_ref().map(|running| running.interval)
    }

    /// Run one cycle out of band without touching the timer. While the
    /// scheduler runs, `stop` also cancels the triggered cycle.
    pub async fn trigger(&self) -> JoinHandle<Result<CycleOutcome, TelemetryError>> {
        let token = match self.state.lock().await.as_ref() {
            Some(running) => running.token.child_token(),
            None => CancellationToken::new(),
        };
        let pipeline = self.pipeline.clone();

        tokio::spawn(async move {
            tokio::select! {
                biased;
                _ = token.cancelled() => Ok(CycleOutcome::Skipped),
                result = pipeline.run_cycle(CycleTrigger::External) => result,
            }
        })
    }
}

async fn run_timer(pipeline: Arc<PushPipeline>, period: Duration, token: CancellationToken) {
    let first_tick = Instant::now() + period;
    run_scheduled_cycle(&pipeline, &token).await;

    let mut ticker = tokio::time::interval_at(first_tick, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            biased;
            _ = token.cancelled() => break,
            _ = ticker.tick() => run_scheduled_cycle(&pipeline, &token).await,
        }
    }
}

/// Errors are already logged by the pipeline; the timer keeps going
async fn run_scheduled_cycle(pipeline: &PushPipeline, token: &CancellationToken) {
    tokio::select! {
        biased;
        _ = token.cancelled() => tracing::debug!("Scheduled push cycle cancelled"),
        _ = pipeline.run_cycle(CycleTrigger::Scheduled) => {}
    }
}
