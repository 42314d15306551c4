//! Stuck fermentation detector
//!
//! Fires when Brix shows near-zero movement sustained past a wall-clock
//! threshold. The span is measured in time, not sample count, because
//! cellar sampling is irregular. Always CRITICAL: a stuck ferment risks
//! spoilage regardless of how much history backs the judgment.

use crate::types::{Anomaly, AnomalyType, Severity, Signal};

use super::{completion_brix, confidence_or_floor, deviation_or_neutral, DetectionContext};
use crate::error::EngineError;

pub fn detect(ctx: &DetectionContext<'_>) -> Result<Option<Anomaly>, EngineError> {
    let t = ctx.profile.stuck;

    let series = ctx.snapshot.series(Signal::Brix);
    let Some(&(last_ts, last_brix)) = series.last() else {
        return Ok(None);
    };
    if last_brix <= completion_brix(ctx) {
        // Dry lot: flat Brix is the goal, not a stall
        return Ok(None);
    }

    // Walk backwards while the average rate from each point to the latest
    // sample stays under the epsilon. The span floor keeps sub-day noise
    // from counting as movement.
    let mut flat_start = last_ts;
    for &(ts, brix) in series.iter().rev().skip(1) {
        let span_days = (last_ts - ts).num_seconds() as f64 / 86_400.0;
        if (brix - last_brix).abs() > t.rate_epsilon_brix_per_day * span_days.max(1.0) {
            break;
        }
        flat_start = ts;
    }

    let flat_hours = (last_ts - flat_start).num_seconds() as f64 / 3_600.0;
    if flat_hours < t.min_duration_hours {
        return Ok(None);
    }

    Ok(Some(Anomaly {
        anomaly_type: AnomalyType::Stuck,
        severity: Severity::Critical,
        signal: Signal::Brix,
        deviation: deviation_or_neutral(ctx, Signal::Brix),
        confidence: confidence_or_floor(ctx, Signal::Brix),
        description: format!(
            "Brix held at {:.1} °Bx for {:.0} hours (threshold {:.0} h) with {:.1} °Bx of sugar remaining",
            last_brix, flat_hours, t.min_duration_hours, last_brix
        ),
        detected_at: ctx.detected_at,
    }))
}
