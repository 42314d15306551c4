//! Unusual duration detector
//!
//! Only meaningful near completion: until the lot is dry there is no
//! total duration to judge. Compares elapsed days against the cohort's
//! duration band, falling back to an absolute acceptable range when no
//! history exists.

use crate::types::{Anomaly, AnomalyType, Severity, Signal};

use super::{completion_brix, DetectionContext};
use crate::error::EngineError;

pub fn detect(ctx: &DetectionContext<'_>) -> Result<Option<Anomaly>, EngineError> {
    let t = ctx.profile.duration;

    let Some((_, latest_brix)) = ctx.snapshot.latest(Signal::Brix) else {
        return Ok(None);
    };
    if latest_brix > completion_brix(ctx) {
        return Ok(None);
    }

    let elapsed = ctx.snapshot.elapsed_days();
    let Some(entry) = ctx.comparisons.get(Signal::DurationDays) else {
        return Ok(None);
    };

    if entry.confidence.sample_count == 0 {
        // Absolute fallback band
        if (t.fallback_min_days..=t.fallback_max_days).contains(&elapsed) {
            return Ok(None);
        }
        let side = if elapsed > t.fallback_max_days { "longer" } else { "shorter" };
        return Ok(Some(Anomaly {
            anomaly_type: AnomalyType::UnusualDuration,
            severity: Severity::Medium,
            signal: Signal::DurationDays,
            deviation: entry.deviation,
            confidence: entry.confidence,
            description: format!(
                "Fermentation finished in {:.1} days, {} than the {:.0}-{:.0} day fallback range (no cohort history)",
                elapsed, side, t.fallback_min_days, t.fallback_max_days
            ),
            detected_at: ctx.detected_at,
        }));
    }

    // Inside the cohort's [p10, p90] band nothing is unusual
    if !entry.comparison.extreme {
        return Ok(None);
    }

    let severity = if entry.deviation.is_warning() { Severity::High } else { Severity::Medium };
    let side = if entry.comparison.percentile_rank >= 50.0 { "longer" } else { "shorter" };

    Ok(Some(Anomaly {
        anomaly_type: AnomalyType::UnusualDuration,
        severity,
        signal: Signal::DurationDays,
        deviation: entry.deviation,
        confidence: entry.confidence,
        description: format!(
            "Fermentation finished in {:.1} days, {} than the cohort's {:.0}-{:.0} day band ({} past fermentations)",
            elapsed,
            side,
            entry.comparison.expected_min,
            entry.comparison.expected_max,
            entry.confidence.sample_count
        ),
        detected_at: ctx.detected_at,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::comparison::ComparisonService;
    use crate::detectors::test_support::{cohorts_with, duration_cohort, profile, snapshot};
    use crate::types::{ConfidenceLevel, HistoricalCohort, WineColor};
    use chrono::Utc;
    use std::collections::HashMap;

    fn detect_with(
        points: &[(i64, f64, f64)],
        cohorts: HashMap<Signal, HistoricalCohort>,
    ) -> Option<Anomaly> {
        let snap = snapshot(points, WineColor::Red);
        let p = profile(WineColor::Red);
        let set = ComparisonService::build_set(&snap, &cohorts, &p);
        let ctx = DetectionContext {
            snapshot: &snap,
            comparisons: &set,
            profile: &p,
            detected_at: Utc::now(),
        };
        detect(&ctx).expect("duration detect")
    }

    #[test]
    fn slow_finisher_outside_cohort_band() {
        // Dry at day 20 against a cohort that finishes in 8-16 days
        let anomaly = detect_with(
            &[(0, 24.0, 25.0), (480, 1.8, 25.0)],
            cohorts_with(&[(Signal::DurationDays, duration_cohort(20))]),
        )
        .expect("should fire");
        assert_eq!(anomaly.anomaly_type, AnomalyType::UnusualDuration);
        // z = (20 - 12) / 2.5 = 3.2, past the warning sigma
        assert_eq!(anomaly.severity, Severity::High);
        assert!(anomaly.description.contains("longer"));
    }

    #[test]
    fn fast_finisher_is_flagged_short() {
        // Dry at day 3 against the same cohort
        let anomaly = detect_with(
            &[(0, 24.0, 25.0), (72, 1.5, 25.0)],
            cohorts_with(&[(Signal::DurationDays, duration_cohort(20))]),
        )
        .expect("should fire");
        assert!(anomaly.description.contains("shorter"));
    }

    #[test]
    fn typical_duration_is_clean() {
        // Dry at day 12, the cohort median
        let anomaly = detect_with(
            &[(0, 24.0, 25.0), (288, 1.8, 25.0)],
            cohorts_with(&[(Signal::DurationDays, duration_cohort(20))]),
        );
        assert!(anomaly.is_none());
    }

    #[test]
    fn active_lot_is_never_judged_on_duration() {
        // Day 20 but still at 15 °Bx
        let anomaly = detect_with(
            &[(0, 24.0, 25.0), (480, 15.0, 25.0)],
            cohorts_with(&[(Signal::DurationDays, duration_cohort(20))]),
        );
        assert!(anomaly.is_none());
    }

    #[test]
    fn fallback_band_applies_without_history() {
        // Dry at day 35, past the 30-day fallback maximum
        let anomaly = detect_with(&[(0, 24.0, 25.0), (840, 1.8, 25.0)], HashMap::new())
            .expect("should fire on fallback");
        assert_eq!(anomaly.severity, Severity::Medium);
        assert_eq!(anomaly.confidence.level, ConfidenceLevel::Low);

        // Dry at day 12 with no history is unremarkable
        let clean = detect_with(&[(0, 24.0, 25.0), (288, 1.8, 25.0)], HashMap::new());
        assert!(clean.is_none());
    }
}
