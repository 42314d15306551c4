//! Out-of-range temperature detector
//!
//! Pure rule check against the absolute band for the lot's wine color.
//! Deliberately cohort-blind: a cohort that historically ran hot must not
//! normalize an excursion. HIGH inside the tolerance margin, CRITICAL
//! beyond it.

use crate::types::{Anomaly, AnomalyType, DeviationScore, Severity, Signal};

use super::{confidence_or_floor, DetectionContext};
use crate::error::EngineError;

pub fn detect(ctx: &DetectionContext<'_>) -> Result<Option<Anomaly>, EngineError> {
    let band = ctx.profile.temperature_band;
    if band.min_c >= band.max_c {
        return Err(EngineError::Configuration(format!(
            "temperature band for {} is inverted ({:.1}..{:.1} °C)",
            ctx.profile.color, band.min_c, band.max_c
        )));
    }

    let Some((_, temp)) = ctx.snapshot.latest(Signal::Temperature) else {
        return Ok(None);
    };

    // Signed distance outside the band: positive above max, negative
    // below min, zero inside
    let distance = if temp > band.max_c {
        temp - band.max_c
    } else if temp < band.min_c {
        temp - band.min_c
    } else {
        return Ok(None);
    };

    let severity = if distance.abs() > ctx.profile.temperature_tolerance_c {
        Severity::Critical
    } else {
        Severity::High
    };

    let bound = if distance > 0.0 {
        format!("above the {:.1} °C maximum", band.max_c)
    } else {
        format!("below the {:.1} °C minimum", band.min_c)
    };

    Ok(Some(Anomaly {
        anomaly_type: AnomalyType::TemperatureExcursion,
        severity,
        signal: Signal::Temperature,
        // Rule distance in °C stands in for the z-score; the percentile
        // still reflects the cohort when one exists.
        deviation: DeviationScore {
            z_score: distance,
            percentile: ctx
                .comparisons
                .get(Signal::Temperature)
                .map_or(50.0, |e| e.comparison.percentile_rank),
            warning_sigma: ctx.profile.deviation.warning_sigma,
            critical_sigma: ctx.profile.deviation.critical_sigma,
        },
        confidence: confidence_or_floor(ctx, Signal::Temperature),
        description: format!(
            "Must at {:.1} °C is {:.1} °C {} for {} wine (tolerance {:.1} °C)",
            temp,
            distance.abs(),
            bound,
            ctx.profile.color,
            ctx.profile.temperature_tolerance_c
        ),
        detected_at: ctx.detected_at,
    }))
}
