//! Sluggish fermentation detector
//!
//! Fires when the trailing Brix decline is well below the cohort's
//! expected rate AND the rate sits in the cohort's bottom percentiles.
//! With no cohort the absolute fallback decline stands in and the
//! percentile condition is waived (it has nothing to rank against).

use crate::types::{Anomaly, AnomalyType, Severity, Signal};

use super::{brix_rate, completion_brix, DetectionContext};
use crate::error::EngineError;

/// Rates in the first day are lag-phase noise, not sluggishness.
const MIN_ELAPSED_DAYS: f64 = 1.0;

pub fn detect(ctx: &DetectionContext<'_>) -> Result<Option<Anomaly>, EngineError> {
    let t = ctx.profile.sluggish;
    if t.fallback_decline_brix_per_day <= 0.0 {
        return Err(EngineError::Configuration(
            "sluggish.fallback_decline_brix_per_day must be > 0".to_string(),
        ));
    }

    let Some((_, latest_brix)) = ctx.snapshot.latest(Signal::Brix) else {
        return Ok(None);
    };
    if latest_brix <= completion_brix(ctx) || ctx.snapshot.elapsed_days() < MIN_ELAPSED_DAYS {
        return Ok(None);
    }

    let Some(rate) = brix_rate(ctx) else {
        return Ok(None);
    };
    let Some(entry) = ctx.comparisons.get(Signal::Brix) else {
        return Ok(None);
    };

    if rate.ratio >= t.rate_fraction {
        return Ok(None);
    }
    if !rate.degraded && entry.comparison.percentile_rank > t.percentile_cutoff {
        return Ok(None);
    }

    // Severity scales with how far below the threshold the rate fell
    let severity = if rate.ratio < t.rate_fraction / 2.0 {
        Severity::High
    } else {
        Severity::Medium
    };

    let basis = if rate.degraded {
        "absolute fallback (no cohort history)".to_string()
    } else {
        format!(
            "cohort percentile {:.0}, {} past fermentations",
            entry.comparison.percentile_rank, entry.confidence.sample_count
        )
    };

    Ok(Some(Anomaly {
        anomaly_type: AnomalyType::Sluggish,
        severity,
        signal: Signal::Brix,
        deviation: entry.deviation,
        confidence: entry.confidence,
        description: format!(
            "Brix declining {:.2} °Bx/day vs {:.2} expected ({:.0}% of expected rate); {}",
            rate.decline,
            rate.expected,
            rate.ratio * 100.0,
            basis
        ),
        detected_at: ctx.detected_at,
    }))
}
