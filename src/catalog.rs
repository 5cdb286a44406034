//! Metric catalog
//!
//! The single authoritative list of what gets collected, how each measurement
//! is named on the wire, its kind and unit, and the HELP text shown for it.

use crate::source::{EventCategory, EventPredicate, Quantity};
use crate::types::MetricKind;

/// Namespace prefix of every exported metric
pub const NAMESPACE: &str = "healthkit";

/// HELP text for names missing from the description table
pub const GENERIC_HELP: &str = "Health metric from Apple HealthKit";

/// How one quantity type is exported
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QuantitySpec {
    pub quantity: Quantity,
    /// Name stem between the namespace and the `_total` suffix
    pub stem: &'static str,
    pub kind: MetricKind,
    pub unit: &'static str,
}

impl QuantitySpec {
    /// Wire name: counters get a `_total` suffix, gauges do not
    pub fn metric_name(&self) -> String {
        match self.kind {
            MetricKind::Counter => format!("{NAMESPACE}_{}_total", self.stem),
            MetricKind::Gauge => format!("{NAMESPACE}_{}", self.stem),
        }
    }
}

const fn counter(quantity: Quantity, stem: &'static str, unit: &'static str) -> QuantitySpec {
    QuantitySpec {
        quantity,
        stem,
        kind: MetricKind::Counter,
        unit,
    }
}

const fn gauge(quantity: Quantity, stem: &'static str, unit: &'static str) -> QuantitySpec {
    QuantitySpec {
        quantity,
        stem,
        kind: MetricKind::Gauge,
        unit,
    }
}

/// Quantity catalog. Counters are summed over the window, gauges take the
/// most recent sample.
pub const QUANTITY_CATALOG: &[QuantitySpec] = &[
    counter(Quantity::StepCount, "steps", "count"),
    counter(Quantity::DistanceWalkingRunning, "distance_walking_running_meters", "m"),
    counter(Quantity::ActiveEnergyBurned, "active_energy_burned_calories", "kcal"),
    counter(Quantity::BasalEnergyBurned, "basal_energy_burned_calories", "kcal"),
    counter(Quantity::FlightsClimbed, "flights_climbed", "count"),
    counter(Quantity::AppleExerciseTime, "apple_exercise_time_minutes", "min"),
    counter(Quantity::AppleStandTime, "apple_stand_time_minutes", "min"),
    gauge(Quantity::HeartRate, "heart_rate_bpm", "count/min"),
    gauge(Quantity::RestingHeartRate, "resting_heart_rate_bpm", "count/min"),
    gauge(Quantity::WalkingHeartRateAverage, "walking_heart_rate_average_bpm", "count/min"),
    gauge(Quantity::HeartRateVariabilitySdnn, "heart_rate_variability_sdnn_ms", "ms"),
    gauge(Quantity::RespiratoryRate, "respiratory_rate_bpm", "count/min"),
    gauge(Quantity::Vo2Max, "vo2_max_ml_min_kg", "mL/min·kg"),
    gauge(Quantity::OxygenSaturation, "oxygen_saturation_percent", "%"),
    gauge(Quantity::BodyMass, "body_weight_kg", "kg"),
    gauge(Quantity::BodyMassIndex, "body_mass_index", "count"),
    gauge(Quantity::BodyFatPercentage, "body_fat_percent", "%"),
    gauge(Quantity::BloodPressureSystolic, "blood_pressure_systolic_mmhg", "mmHg"),
    gauge(Quantity::BloodPressureDiastolic, "blood_pressure_diastolic_mmhg", "mmHg"),
    gauge(Quantity::BloodGlucose, "blood_glucose_mg_dl", "mg/dL"),
    gauge(Quantity::WalkingSpeed, "walking_speed_mph", "mi/hr"),
    gauge(Quantity::WalkingStepLength, "walking_step_length_inches", "in"),
    gauge(Quantity::WalkingDoubleSupportPercentage, "walking_double_support_percent", "%"),
    gauge(Quantity::WalkingAsymmetryPercentage, "walking_asymmetry_percent", "%"),
    gauge(Quantity::StairAscentSpeed, "stair_ascent_speed_fps", "ft/s"),
    gauge(Quantity::StairDescentSpeed, "stair_descent_speed_fps", "ft/s"),
    gauge(Quantity::SixMinuteWalkTestDistance, "six_minute_walk_distance_meters", "m"),
    gauge(Quantity::AppleWalkingSteadiness, "apple_walking_steadiness_percent", "%"),
    gauge(Quantity::EnvironmentalAudioExposure, "environmental_audio_exposure_db", "dBASPL"),
    gauge(Quantity::HeadphoneAudioExposure, "headphone_audio_exposure_db", "dBASPL"),
    gauge(Quantity::EnvironmentalSoundReduction, "environmental_sound_reduction_db", "dBASPL"),
    gauge(Quantity::PhysicalEffort, "physical_effort_kcal_hr_kg", "kcal/hr·kg"),
];

/// Look up the catalog entry of a quantity
pub fn quantity_spec(quantity: Quantity) -> Option<&'static QuantitySpec> {
    QUANTITY_CATALOG.iter().find(|spec| spec.quantity == quantity)
}

pub const SLEEP_MINUTES: &str = "healthkit_sleep_minutes_total";
pub const WORKOUT_MINUTES: &str = "healthkit_workout_minutes_total";
pub const WORKOUT_CALORIES: &str = "healthkit_workout_calories_total";
pub const LAST_SYNC_SECONDS: &str = "healthkit_last_sync_seconds";

pub const SUMMARY_MOVE_MINUTES: &str = "healthkit_apple_move_time_minutes";
pub const SUMMARY_MOVE_GOAL_MINUTES: &str = "healthkit_apple_move_time_goal_minutes";
pub const SUMMARY_ACTIVE_ENERGY: &str = "healthkit_activity_summary_active_energy_burned_calories";
pub const SUMMARY_ACTIVE_ENERGY_GOAL: &str =
    "healthkit_activity_summary_active_energy_burned_goal_calories";
pub const SUMMARY_EXERCISE_MINUTES: &str = "healthkit_activity_summary_exercise_time_minutes";
pub const SUMMARY_EXERCISE_GOAL_MINUTES: &str =
    "healthkit_activity_summary_exercise_time_goal_minutes";
pub const SUMMARY_STAND_HOURS: &str = "healthkit_activity_summary_stand_hours";
pub const SUMMARY_STAND_HOURS_GOAL: &str = "healthkit_activity_summary_stand_hours_goal";

/// Counted category events (always exported, zero included)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EventSpec {
    pub category: EventCategory,
    pub predicate: EventPredicate,
    pub name: &'static str,
}

pub const EVENT_CATALOG: &[EventSpec] = &[
    EventSpec {
        category: EventCategory::AppleStandHour,
        predicate: EventPredicate::Stood,
        name: "healthkit_apple_stand_hours_total",
    },
    EventSpec {
        category: EventCategory::EnvironmentalAudioExposureEvent,
        predicate: EventPredicate::MomentaryLimit,
        name: "healthkit_environmental_audio_exposure_events_total",
    },
    EventSpec {
        category: EventCategory::HeadphoneAudioExposureEvent,
        predicate: EventPredicate::SevenDayLimit,
        name: "healthkit_headphone_audio_exposure_events_total",
    },
];

/// Quantities reported by the daily history, with their history keys
pub const DAILY_HISTORY: &[(Quantity, &str)] = &[
    (Quantity::StepCount, "steps"),
    (Quantity::ActiveEnergyBurned, "active_calories"),
    (Quantity::DistanceWalkingRunning, "distance_km"),
    (Quantity::HeartRate, "heart_rate_bpm"),
    (Quantity::RestingHeartRate, "resting_hr_bpm"),
];

/// History key for nightly sleep, in hours
pub const DAILY_SLEEP_KEY: &str = "sleep_hours";

const HELP_TEXT: &[(&str, &str)] = &[
    ("healthkit_steps_total", "Total number of steps taken today"),
    (
        "healthkit_distance_walking_running_meters_total",
        "Total distance walked or run in meters today",
    ),
    (
        "healthkit_active_energy_burned_calories_total",
        "Total active energy burned in calories today",
    ),
    (
        "healthkit_basal_energy_burned_calories_total",
        "Total basal energy burned in calories today",
    ),
    ("healthkit_flights_climbed_total", "Total flights of stairs climbed today"),
    (
        "healthkit_apple_exercise_time_minutes_total",
        "Total exercise time in minutes today",
    ),
    (
        "healthkit_apple_stand_time_minutes_total",
        "Total stand time in minutes today",
    ),
    (
        "healthkit_heart_rate_bpm",
        "Most recent heart rate measurement in beats per minute",
    ),
    (
        "healthkit_resting_heart_rate_bpm",
        "Most recent resting heart rate in beats per minute",
    ),
    (
        "healthkit_walking_heart_rate_average_bpm",
        "Most recent walking heart rate average in beats per minute",
    ),
    (
        "healthkit_heart_rate_variability_sdnn_ms",
        "Most recent heart rate variability (SDNN) in milliseconds",
    ),
    (
        "healthkit_respiratory_rate_bpm",
        "Most recent respiratory rate in breaths per minute",
    ),
    ("healthkit_vo2_max_ml_min_kg", "Most recent VO2 max in mL/min·kg"),
    (
        "healthkit_oxygen_saturation_percent",
        "Most recent blood oxygen saturation percentage",
    ),
    (
        "healthkit_body_weight_kg",
        "Most recent body weight measurement in kilograms",
    ),
    ("healthkit_body_mass_index", "Most recent body mass index"),
    ("healthkit_body_fat_percent", "Most recent body fat percentage"),
    (
        "healthkit_blood_pressure_systolic_mmhg",
        "Most recent systolic blood pressure in mmHg",
    ),
    (
        "healthkit_blood_pressure_diastolic_mmhg",
        "Most recent diastolic blood pressure in mmHg",
    ),
    (
        "healthkit_blood_glucose_mg_dl",
        "Most recent blood glucose level in mg/dL",
    ),
    ("healthkit_walking_speed_mph", "Most recent walking speed in miles per hour"),
    (SLEEP_MINUTES, "Total sleep duration in minutes today"),
    (
        "healthkit_apple_stand_hours_total",
        "Total number of hours with standing today",
    ),
    (
        WORKOUT_MINUTES,
        "Total workout duration in minutes by activity type today",
    ),
    (
        WORKOUT_CALORIES,
        "Total calories burned during workouts by activity type today",
    ),
    (LAST_SYNC_SECONDS, "Seconds since the last successful push"),
];

/// HELP text for a metric name; never empty
pub fn help_text(name: &str) -> &'static str {
    HELP_TEXT
        .iter()
        .find(|(known, _)| *known == name)
        .map(|(_, help)| *help)
        .unwrap_or(GENERIC_HELP)
}
