//! Nutrient stress compound detector
//!
//! Combines two signals that can each be individually unremarkable: a
//! Brix rate lagging the cohort and a cold must. Together they are the
//! classic early profile of nutrient depletion, so the rule escalates to
//! HIGH even when no single-signal detector fires. The rate condition
//! has no lower bound; on a deeply sluggish cold lot this detector fires
//! alongside the progression anomaly to name the likely cause.

use crate::types::{Anomaly, AnomalyType, Severity, Signal};

use super::{brix_rate, completion_brix, DetectionContext};
use crate::error::EngineError;

/// Same lag-phase guard as the sluggish detector.
const MIN_ELAPSED_DAYS: f64 = 1.0;

pub fn detect(ctx: &DetectionContext<'_>) -> Result<Option<Anomaly>, EngineError> {
    let t = ctx.profile.compound;

    let Some((_, temp)) = ctx.snapshot.latest(Signal::Temperature) else {
        return Ok(None);
    };
    let Some((_, latest_brix)) = ctx.snapshot.latest(Signal::Brix) else {
        return Ok(None);
    };
    if latest_brix <= completion_brix(ctx) || ctx.snapshot.elapsed_days() < MIN_ELAPSED_DAYS {
        return Ok(None);
    }

    if temp > t.max_temperature_c {
        return Ok(None);
    }
    let Some(rate) = brix_rate(ctx) else {
        return Ok(None);
    };
    if rate.ratio >= t.rate_fraction {
        return Ok(None);
    }

    let Some(entry) = ctx.comparisons.get(Signal::Brix) else {
        return Ok(None);
    };

    Ok(Some(Anomaly {
        anomaly_type: AnomalyType::NutrientStress,
        severity: Severity::High,
        signal: Signal::Brix,
        deviation: entry.deviation,
        confidence: entry.confidence,
        description: format!(
            "Brix at {:.0}% of expected rate with a cold must ({:.1} °C ≤ {:.1} °C): consistent with nutrient depletion",
            rate.ratio * 100.0,
            temp,
            t.max_temperature_c
        ),
        detected_at: ctx.detected_at,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::comparison::ComparisonService;
    use crate::detectors::test_support::{brix_rate_cohort, cohorts_with, profile, snapshot};
    use crate::types::WineColor;
    use chrono::Utc;

    fn detect_with(points: &[(i64, f64, f64)]) -> Option<Anomaly> {
        let snap = snapshot(points, WineColor::White);
        let p = profile(WineColor::White);
        let cohorts = cohorts_with(&[(Signal::Brix, brix_rate_cohort(20))]);
        let set = ComparisonService::build_set(&snap, &cohorts, &p);
        let ctx = DetectionContext {
            snapshot: &snap,
            comparisons: &set,
            profile: &p,
            detected_at: Utc::now(),
        };
        detect(&ctx).expect("nutrient detect")
    }

    #[test]
    fn lagging_rate_plus_cold_must_escalates() {
        // 1.4 °Bx/day = 70% of expected (not sluggish) at 15 °C (in band)
        let points =
            [(0, 24.0, 15.0), (24, 22.6, 15.0), (48, 21.2, 15.0), (72, 19.8, 15.0)];
        let anomaly = detect_with(&points).expect("compound rule should fire");
        assert_eq!(anomaly.anomaly_type, AnomalyType::NutrientStress);
        assert_eq!(anomaly.severity, Severity::High);

        // Neither condition alone is anomalous for this profile
        let snap = snapshot(&points, WineColor::White);
        let p = profile(WineColor::White);
        let cohorts = cohorts_with(&[(Signal::Brix, brix_rate_cohort(20))]);
        let set = ComparisonService::build_set(&snap, &cohorts, &p);
        let ctx = DetectionContext {
            snapshot: &snap,
            comparisons: &set,
            profile: &p,
            detected_at: Utc::now(),
        };
        assert!(crate::detectors::sluggish::detect(&ctx).expect("sluggish detect").is_none());
        assert!(crate::detectors::temperature::detect(&ctx)
            .expect("temperature detect")
            .is_none());
    }

    #[test]
    fn same_rate_in_a_warm_must_is_clean() {
        // 70% of expected at 18 °C, above the 16 °C cold threshold
        let anomaly = detect_with(&[
            (0, 24.0, 18.0),
            (24, 22.6, 18.0),
            (48, 21.2, 18.0),
            (72, 19.8, 18.0),
        ]);
        assert!(anomaly.is_none());
    }

    #[test]
    fn healthy_rate_in_a_cold_must_is_clean() {
        // Full expected rate at 15 °C
        let anomaly = detect_with(&[
            (0, 24.0, 15.0),
            (24, 22.0, 15.0),
            (48, 20.0, 15.0),
            (72, 18.0, 15.0),
        ]);
        assert!(anomaly.is_none());
    }
}
