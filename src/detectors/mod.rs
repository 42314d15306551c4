//! Anomaly detectors - one independent pure check per anomaly type
//!
//! Each detector is a pure function over the shared [`ComparisonSet`] and
//! the resolved threshold profile. Detectors never perform I/O, never see
//! each other's output, and always run; contradictions between them are
//! the aggregator's problem.
//!
//! The detector set is a closed enum rather than a trait-object registry:
//! the aggregator's mutual-exclusion rules are only auditable when the
//! list of anomaly sources is fixed at compile time.
//!
//! ## Detectors
//!
//! 1. **Sluggish** - Brix decline well below the cohort's expected rate
//! 2. **Stuck** - near-zero Brix movement sustained past a time threshold
//! 3. **TemperatureExcursion** - absolute band violation, cohort-blind
//! 4. **NutrientStress** - compound rule: lagging rate plus a cold must
//! 5. **UnusualDuration** - elapsed time outside the cohort band, checked
//!    near completion only

pub mod sluggish;
pub mod stuck;
pub mod temperature;
pub mod nutrient;
pub mod duration;

use chrono::{DateTime, Utc};
use rayon::prelude::*;
use tracing::warn;

use crate::config::ThresholdProfile;
use crate::error::EngineError;
use crate::types::{Anomaly, ComparisonSet, FermentationSnapshot};

/// Everything a detector may look at, shared read-only across all of them.
pub struct DetectionContext<'a> {
    pub snapshot: &'a FermentationSnapshot,
    pub comparisons: &'a ComparisonSet,
    pub profile: &'a ThresholdProfile,
    pub detected_at: DateTime<Utc>,
}

/// The closed set of detectors, in stable detection order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Detector {
    Sluggish,
    Stuck,
    TemperatureExcursion,
    NutrientStress,
    UnusualDuration,
}

/// Canonical detector ordering, the aggregator's final tie-breaker.
pub const DETECTION_ORDER: [Detector; 5] = [
    Detector::Sluggish,
    Detector::Stuck,
    Detector::TemperatureExcursion,
    Detector::NutrientStress,
    Detector::UnusualDuration,
];

impl Detector {
    pub fn name(&self) -> &'static str {
        match self {
            Detector::Sluggish => "sluggish",
            Detector::Stuck => "stuck",
            Detector::TemperatureExcursion => "temperature_excursion",
            Detector::NutrientStress => "nutrient_stress",
            Detector::UnusualDuration => "unusual_duration",
        }
    }

    /// Run one detector. `Ok(None)` means "no anomaly"; `Err` means this
    /// detector's thresholds were unusable (fatal to it alone).
    pub fn detect(&self, ctx: &DetectionContext<'_>) -> Result<Option<Anomaly>, EngineError> {
        match self {
            Detector::Sluggish => sluggish::detect(ctx),
            Detector::Stuck => stuck::detect(ctx),
            Detector::TemperatureExcursion => temperature::detect(ctx),
            Detector::NutrientStress => nutrient::detect(ctx),
            Detector::UnusualDuration => duration::detect(ctx),
        }
    }
}

/// Run every detector over the shared context, in parallel.
///
/// Output preserves detection order. A detector-local configuration fault
/// is logged and skipped; it never aborts the other detectors.
pub fn run_all(ctx: &DetectionContext<'_>) -> Vec<Anomaly> {
    DETECTION_ORDER
        .par_iter()
        .map(|detector| (detector, detector.detect(ctx)))
        .collect::<Vec<_>>()
        .into_iter()
        .filter_map(|(detector, result)| match result {
            Ok(found) => found,
            Err(e) => {
                warn!(detector = detector.name(), error = %e, "Detector skipped");
                None
            }
        })
        .collect()
}

/// Brix at or below which the lot counts as dry. A dry lot's flat or slow
/// Brix is normal, so progression detectors stand down below this.
pub(crate) fn completion_brix(ctx: &DetectionContext<'_>) -> f64 {
    ctx.snapshot
        .target_completion_brix
        .max(ctx.profile.duration.completion_brix)
}

/// Trailing Brix decline measured against the cohort's expectation.
pub(crate) struct BrixRate {
    /// Observed decline, °Bx/day, clamped non-negative
    pub decline: f64,
    /// Expected decline for this lot (cohort curve or absolute fallback)
    pub expected: f64,
    /// decline / expected
    pub ratio: f64,
    /// True when no cohort backed the expectation
    pub degraded: bool,
}

/// Recover the decline-vs-expected ratio from the Brix comparison entry.
///
/// The comparison's deviation percentage already encodes the gap against
/// the cohort's expected rate; when the cohort had no trend curve the
/// band midpoint stands in, and a zero-sample cohort falls back to the
/// configured absolute decline.
pub(crate) fn brix_rate(ctx: &DetectionContext<'_>) -> Option<BrixRate> {
    let entry = ctx.comparisons.get(crate::types::Signal::Brix)?;
    let decline = entry.comparison.current_value.max(0.0);
    let degraded = entry.confidence.sample_count == 0;

    // A fully stalled lot has deviation_percentage == -100, which makes
    // the reconstruction 0/0; the band midpoint stands in there too.
    let denominator = 100.0 + entry.comparison.deviation_percentage;
    let expected = if degraded {
        ctx.profile.sluggish.fallback_decline_brix_per_day
    } else if entry.comparison.deviation_percentage.abs() > f64::EPSILON
        && denominator > f64::EPSILON
    {
        decline * 100.0 / denominator
    } else {
        let midpoint = (entry.comparison.expected_min + entry.comparison.expected_max) / 2.0;
        if midpoint > f64::EPSILON {
            midpoint
        } else {
            ctx.profile.sluggish.fallback_decline_brix_per_day
        }
    };

    if !expected.is_finite() || expected <= f64::EPSILON {
        return None;
    }
    Some(BrixRate { decline, expected, ratio: decline / expected, degraded })
}

/// The signal's deviation score, or a neutral one when the comparison
/// entry is missing (rule-based detectors still need one to report).
pub(crate) fn deviation_or_neutral(
    ctx: &DetectionContext<'_>,
    signal: crate::types::Signal,
) -> crate::types::DeviationScore {
    ctx.comparisons.get(signal).map_or(
        crate::types::DeviationScore {
            z_score: 0.0,
            percentile: 50.0,
            warning_sigma: ctx.profile.deviation.warning_sigma,
            critical_sigma: ctx.profile.deviation.critical_sigma,
        },
        |entry| entry.deviation,
    )
}

/// The signal's confidence, or the floor when no comparison exists.
pub(crate) fn confidence_or_floor(
    ctx: &DetectionContext<'_>,
    signal: crate::types::Signal,
) -> crate::types::Confidence {
    ctx.comparisons
        .get(signal)
        .map_or_else(crate::types::Confidence::floor, |entry| entry.confidence)
}
