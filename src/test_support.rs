//! Fakes shared by the unit tests

use async_trait::async_trait;
use chrono::{Duration, Local, NaiveDate};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

use crate::error::TelemetryError;
use crate::source::{
    ActivitySummary, BiometricSource, CollectionWindow, EventCategory, EventPredicate,
    LatestSample, Quantity, SourceError, Workout, WorkoutActivity,
};
use crate::transport::{HttpRequest, HttpResponse, HttpTransport};

/// Scripted biometric source. An attempt starts with the step count query.
#[derive(Default)]
pub(crate) struct FakeSource {
    pub cumulative: HashMap<Quantity, f64>,
    pub latest: HashMap<Quantity, LatestSample>,
    pub events: HashMap<EventCategory, u64>,
    pub sleep_minutes: f64,
    pub workouts: Vec<Workout>,
    pub summary: Option<ActivitySummary>,
    pub daily: HashMap<Quantity, Vec<(NaiveDate, f64)>>,
    pub daily_sleep: Vec<(NaiveDate, f64)>,
    /// Quantities whose queries fail
    pub failing: HashSet<Quantity>,
    pub unreachable: bool,
    /// Leading attempts that find no data at all
    pub empty_attempts: u32,
    attempts: AtomicU32,
}

impl FakeSource {
    pub fn healthy() -> Self {
        let today = Local::now().date_naive();
        let mut source = Self::default();

        source.cumulative.insert(Quantity::StepCount, 8500.0);
        source
            .cumulative
            .insert(Quantity::ActiveEnergyBurned, 320.5);
        source.latest.insert(
            Quantity::HeartRate,
            LatestSample {
                value: 61.0,
                source_label: "Apple Watch".to_string(),
            },
        );
        source.latest.insert(
            Quantity::RestingHeartRate,
            LatestSample {
                value: 52.0,
                source_label: "Apple Watch".to_string(),
            },
        );
        source.events.insert(EventCategory::AppleStandHour, 9);
        source.sleep_minutes = 420.0;
        source.workouts = vec![
            Workout {
                activity: WorkoutActivity::Running,
                duration_minutes: 30.0,
                energy_kcal: Some(250.0),
            },
            Workout {
                activity: WorkoutActivity::Walking,
                duration_minutes: 20.0,
                energy_kcal: None,
            },
            Workout {
                activity: WorkoutActivity::Running,
                duration_minutes: 15.0,
                energy_kcal: None,
            },
        ];
        source.summary = Some(ActivitySummary {
            active_energy_kcal: 320.0,
            active_energy_goal_kcal: 500.0,
            exercise_minutes: 45.0,
            exercise_goal_minutes: 30.0,
            stand_hours: 9.0,
            stand_goal_hours: 12.0,
            move_minutes: None,
            move_goal_minutes: None,
        });
        source.daily.insert(
            Quantity::StepCount,
            vec![(today - Duration::days(1), 8000.0), (today, 9000.0)],
        );
        source
            .daily
            .insert(Quantity::DistanceWalkingRunning, vec![(today, 6500.0)]);
        source.daily_sleep = vec![(today - Duration::days(1), 0.0), (today, 450.0)];
        source
    }

    /// Source that has nothing to report
    pub fn empty() -> Self {
        Self {
            empty_attempts: u32::MAX,
            ..Self::default()
        }
    }

    pub fn unreachable() -> Self {
        Self {
            unreachable: true,
            ..Self::default()
        }
    }

    pub fn with_empty_attempts(mut self, attempts: u32) -> Self {
        self.empty_attempts = attempts;
        self
    }

    pub fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }

    fn check(&self, quantity: Option<Quantity>) -> Result<bool, SourceError> {
        if self.unreachable {
            return Err(SourceError::Unreachable("health store missing".into()));
        }
        if quantity.is_some_and(|q| self.failing.contains(&q)) {
            return Err(SourceError::Query("query failed".into()));
        }
        Ok(self.attempts() > self.empty_attempts)
    }

    fn no_data() -> SourceError {
        SourceError::Query("no data".into())
    }
}

#[async_trait]
impl BiometricSource for FakeSource {
    async fn fetch_cumulative(
        &self,
        quantity: Quantity,
        _window: &CollectionWindow,
    ) -> Result<Option<f64>, SourceError> {
        if quantity == Quantity::StepCount {
            self.attempts.fetch_add(1, Ordering::SeqCst);
        }
        if !self.check(Some(quantity))? {
            return Ok(None);
        }
        Ok(self.cumulative.get(&quantity).copied())
    }

    async fn fetch_latest(&self, quantity: Quantity) -> Result<Option<LatestSample>, SourceError> {
        if !self.check(Some(quantity))? {
            return Ok(None);
        }
        Ok(self.latest.get(&quantity).cloned())
    }

    async fn fetch_category_events(
        &self,
        category: EventCategory,
        _predicate: EventPredicate,
        _window: &CollectionWindow,
    ) -> Result<u64, SourceError> {
        if !self.check(None)? {
            return Err(Self::no_data());
        }
        Ok(self.events.get(&category).copied().unwrap_or(0))
    }

    async fn fetch_category_minutes(
        &self,
        _category: EventCategory,
        _window: &CollectionWindow,
    ) -> Result<f64, SourceError> {
        if !self.check(None)? {
            return Ok(0.0);
        }
        Ok(self.sleep_minutes)
    }

    async fn fetch_daily_series(
        &self,
        quantity: Quantity,
        _days: u32,
    ) -> Result<Vec<(NaiveDate, f64)>, SourceError> {
        self.check(Some(quantity))?;
        Ok(self.daily.get(&quantity).cloned().unwrap_or_default())
    }

    async fn fetch_daily_category_minutes(
        &self,
        _category: EventCategory,
        _days: u32,
    ) -> Result<Vec<(NaiveDate, f64)>, SourceError> {
        self.check(None)?;
        Ok(self.daily_sleep.clone())
    }

    async fn fetch_workouts(
        &self,
        _window: &CollectionWindow,
    ) -> Result<Vec<Workout>, SourceError> {
        if !self.check(None)? {
            return Ok(Vec::new());
        }
        Ok(self.workouts.clone())
    }

    async fn fetch_activity_summary(
        &self,
        _date: NaiveDate,
    ) -> Result<Option<ActivitySummary>, SourceError> {
        if !self.check(None)? {
            return Ok(None);
        }
        Ok(self.summary.clone())
    }
}

/// HTTP transport that records requests and replays scripted responses.
/// Once the script runs out every request gets `200 OK`.
#[derive(Default)]
pub(crate) struct RecordingTransport {
    requests: Mutex<Vec<HttpRequest>>,
    responses: Mutex<VecDeque<Result<HttpResponse, TelemetryError>>>,
    fallback_status: Option<u16>,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer every request with `status`
    pub fn always(status: u16) -> Self {
        Self {
            fallback_status: Some(status),
            ..Self::default()
        }
    }

    pub fn then(self, response: Result<HttpResponse, TelemetryError>) -> Self {
        self.responses
            .lock()
            .unwrap()
            .push_back(response);
        self
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl HttpTransport for RecordingTransport {
    async fn post(&self, request: HttpRequest) -> Result<HttpResponse, TelemetryError> {
        self.requests.lock().unwrap().push(request);
        if let Some(response) = self.responses.lock().unwrap().pop_front() {
            return response;
        }
        let status = self.fallback_status.unwrap_or(200);
        Ok(HttpResponse {
            status,
            body: if status == 200 { String::new() } else { "server error".to_string() },
        })
    }
}
