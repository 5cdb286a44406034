//! Biometric source contract
//!
//! The biometric source (the OS health store on device) is an external
//! collaborator. This module defines what the collector may ask of it and what
//! it gets back; how the data is fetched is up to the implementor.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Local, NaiveDate, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors reported by a biometric source
#[derive(Debug, Clone, Error)]
pub enum SourceError {
    /// The whole source cannot be reached (store missing, access revoked)
    #[error("Biometric source unreachable: {0}")]
    Unreachable(String),

    /// A single query failed; the category is treated as absent
    #[error("Query failed: {0}")]
    Query(String),
}

/// Quantity sample types tracked by the collector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Quantity {
    // Cumulative
    StepCount,
    DistanceWalkingRunning,
    ActiveEnergyBurned,
    BasalEnergyBurned,
    FlightsClimbed,
    AppleExerciseTime,
    AppleStandTime,

    // Most recent sample
    HeartRate,
    RestingHeartRate,
    WalkingHeartRateAverage,
    HeartRateVariabilitySdnn,
    RespiratoryRate,
    Vo2Max,
    OxygenSaturation,
    BodyMass,
    BodyMassIndex,
    BodyFatPercentage,
    BloodPressureSystolic,
    BloodPressureDiastolic,
    BloodGlucose,
    WalkingSpeed,
    WalkingStepLength,
    WalkingDoubleSupportPercentage,
    WalkingAsymmetryPercentage,
    StairAscentSpeed,
    StairDescentSpeed,
    SixMinuteWalkTestDistance,
    AppleWalkingSteadiness,
    EnvironmentalAudioExposure,
    HeadphoneAudioExposure,
    EnvironmentalSoundReduction,
    PhysicalEffort,
}

/// Category sample types counted or summed by the collector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventCategory {
    SleepAnalysis,
    AppleStandHour,
    EnvironmentalAudioExposureEvent,
    HeadphoneAudioExposureEvent,
}

/// Which category samples count toward an event total
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventPredicate {
    /// Hour marked as stood
    Stood,
    /// Environmental exposure crossed the momentary limit
    MomentaryLimit,
    /// Headphone exposure crossed the seven-day limit
    SevenDayLimit,
    /// Every sample counts
    Any,
}

/// Workout activity types, collapsed to the set we export
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkoutActivity {
    Running,
    Walking,
    Cycling,
    Swimming,
    Yoga,
    FunctionalStrengthTraining,
    TraditionalStrengthTraining,
    Hiit,
    Other,
}

impl WorkoutActivity {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkoutActivity::Running => "running",
            WorkoutActivity::Walking => "walking",
            WorkoutActivity::Cycling => "cycling",
            WorkoutActivity::Swimming => "swimming",
            WorkoutActivity::Yoga => "yoga",
            WorkoutActivity::FunctionalStrengthTraining => "functional_strength_training",
            WorkoutActivity::TraditionalStrengthTraining => "traditional_strength_training",
            WorkoutActivity::Hiit => "hiit",
            WorkoutActivity::Other => "other",
        }
    }
}

/// Most recent sample of a quantity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LatestSample {
    /// Value already expressed in the catalog unit
    pub value: f64,
    /// Name of the app or device that recorded the sample
    pub source_label: String,
}

/// A finished workout
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Workout {
    pub activity: WorkoutActivity,
    pub duration_minutes: f64,
    pub energy_kcal: Option<f64>,
}

/// Activity ring summary for one day
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ActivitySummary {
    pub active_energy_kcal: f64,
    pub active_energy_goal_kcal: f64,
    pub exercise_minutes: f64,
    pub exercise_goal_minutes: f64,
    pub stand_hours: f64,
    pub stand_goal_hours: f64,
    /// Only reported by newer OS versions
    pub move_minutes: Option<f64>,
    pub move_goal_minutes: Option<f64>,
}

/// Time range a query covers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CollectionWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl CollectionWindow {
    /// Window covering the last `days` days ending at `now`.
    ///
    /// A single day means "since local midnight" rather than the last 24 hours.
    pub fn trailing_days(now: DateTime<Utc>, days: u32) -> Self {
        let start = if days <= 1 {
            local_midnight(now)
        } else {
            now - Duration::days(i64::from(days))
        };
        Self { start, end: now }
    }
}

fn local_midnight(now: DateTime<Utc>) -> DateTime<Utc> {
    let local_date = now.with_timezone(&Local).date_naive();
    local_date
        .and_hms_opt(0, 0, 0)
        .and_then(|naive| Local.from_local_datetime(&naive).earliest())
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or(now - Duration::hours(24))
}

/// Capability the collector consumes to read biometric data.
///
/// Every call may fail; the collector treats `SourceError::Query` as "this
/// category is absent" and `SourceError::Unreachable` as a failed attempt.
#[async_trait]
pub trait BiometricSource: Send + Sync {
    /// Sum of a cumulative quantity over the window, `None` when there are no samples
    async fn fetch_cumulative(
        &self,
        quantity: Quantity,
        window: &CollectionWindow,
    ) -> Result<Option<f64>, SourceError>;

    /// Most recent sample of a quantity, `None` when there is none
    async fn fetch_latest(&self, quantity: Quantity) -> Result<Option<LatestSample>, SourceError>;

    /// Number of category samples in the window matching `predicate`
    async fn fetch_category_events(
        &self,
        category: EventCategory,
        predicate: EventPredicate,
        window: &CollectionWindow,
    ) -> Result<u64, SourceError>;

    /// Total minutes covered by category samples in the window
    async fn fetch_category_minutes(
        &self,
        category: EventCategory,
        window: &CollectionWindow,
    ) -> Result<f64, SourceError>;

    /// One value per calendar day for the last `days` days (sum for cumulative
    /// quantities, average otherwise). Days without data are omitted.
    async fn fetch_daily_series(
        &self,
        quantity: Quantity,
        days: u32,
    ) -> Result<Vec<(NaiveDate, f64)>, SourceError>;

    /// Minutes covered by category samples per calendar day for the last
    /// `days` days. Days without samples are omitted.
    async fn fetch_daily_category_minutes(
        &self,
        category: EventCategory,
        days: u32,
    ) -> Result<Vec<(NaiveDate, f64)>, SourceError>;

    /// Workouts that started inside the window
    async fn fetch_workouts(&self, window: &CollectionWindow) -> Result<Vec<Workout>, SourceError>;

    /// Activity summary for a calendar day
    async fn fetch_activity_summary(
        &self,
        date: NaiveDate,
    ) -> Result<Option<ActivitySummary>, SourceError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_multi_day_window() {
        let now = Utc::now();
        let window = CollectionWindow::trailing_days(now, 7);
        assert_eq!(window.end, now);
        assert_eq!(window.end - window.start, Duration::days(7));
    }

    #[test]
    fn test_single_day_window_starts_today() {
        let now = Utc::now();
        let window = CollectionWindow::trailing_days(now, 1);
        assert!(window.start <= now);
        assert!(now - window.start <= Duration::hours(25));
    }

    #[test]
    fn test_workout_activity_names() {
        assert_eq!(WorkoutActivity::Hiit.as_str(), "hiit");
        assert_eq!(
            WorkoutActivity::FunctionalStrengthTraining.as_str(),
            "functional_strength_training"
        );
    }
}
