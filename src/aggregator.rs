//! Aggregator - merges detector outputs into one coherent anomaly list
//!
//! Two jobs: suppress structurally overlapping anomalies so the report
//! never contradicts itself, and order what remains for presentation.
//! The suppression table is a fixed const so every exclusion rule is
//! visible in one place.

use std::cmp::Ordering;

use tracing::debug;

use crate::types::{Anomaly, AnomalyType};

/// (dominant, suppressed) pairs: when both fire on the same signal the
/// suppressed anomaly is dropped. A stuck ferment is by definition also
/// slow, so reporting both would be noise.
const SUPPRESSIONS: [(AnomalyType, AnomalyType); 1] =
    [(AnomalyType::Stuck, AnomalyType::Sluggish)];

/// Resolve exclusions and sort: severity descending, confidence
/// descending, ties broken by the detectors' stable run order (the input
/// arrives in detection order and the sort is stable).
pub fn aggregate(anomalies: Vec<Anomaly>) -> Vec<Anomaly> {
    let mut kept: Vec<Anomaly> = anomalies
        .iter()
        .filter(|candidate| {
            let suppressed_by = SUPPRESSIONS.iter().find(|(dominant, suppressed)| {
                candidate.anomaly_type == *suppressed
                    && anomalies
                        .iter()
                        .any(|a| a.anomaly_type == *dominant && a.signal == candidate.signal)
            });
            if let Some((dominant, _)) = suppressed_by {
                debug!(
                    suppressed = %candidate.anomaly_type,
                    dominant = %dominant,
                    signal = %candidate.signal,
                    "Anomaly suppressed by mutual-exclusion rule"
                );
                false
            } else {
                true
            }
        })
        .cloned()
        .collect();

    kept.sort_by(|a, b| {
        b.severity
            .cmp(&a.severity)
            .then(b.confidence.level.cmp(&a.confidence.level))
            .then(
                b.confidence
                    .score
                    .partial_cmp(&a.confidence.score)
                    .unwrap_or(Ordering::Equal),
            )
    });

    kept
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{
        Confidence, ConfidenceLevel, DeviationScore, Severity, Signal,
    };
    use chrono::Utc;

    fn anomaly(
        anomaly_type: AnomalyType,
        severity: Severity,
        signal: Signal,
        level: ConfidenceLevel,
        score: f64,
    ) -> Anomaly {
        Anomaly {
            anomaly_type,
            severity,
            signal,
            deviation: DeviationScore {
                z_score: 0.0,
                percentile: 50.0,
                warning_sigma: 2.0,
                critical_sigma: 3.0,
            },
            confidence: Confidence { level, score, sample_count: 20 },
            description: String::new(),
            detected_at: Utc::now(),
        }
    }

    #[test]
    fn stuck_suppresses_sluggish_on_the_same_signal() {
        let out = aggregate(vec![
            anomaly(AnomalyType::Sluggish, Severity::High, Signal::Brix, ConfidenceLevel::High, 0.7),
            anomaly(AnomalyType::Stuck, Severity::Critical, Signal::Brix, ConfidenceLevel::High, 0.7),
        ]);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].anomaly_type, AnomalyType::Stuck);
    }

    #[test]
    fn sluggish_alone_survives() {
        let out = aggregate(vec![anomaly(
            AnomalyType::Sluggish,
            Severity::Medium,
            Signal::Brix,
            ConfidenceLevel::Medium,
            0.4,
        )]);
        assert_eq!(out.len(), 1);
    }

    #[test]
    fn sorts_by_severity_then_confidence() {
        let out = aggregate(vec![
            anomaly(AnomalyType::Sluggish, Severity::Medium, Signal::Brix, ConfidenceLevel::VeryHigh, 1.0),
            anomaly(AnomalyType::TemperatureExcursion, Severity::Critical, Signal::Temperature, ConfidenceLevel::Low, 0.1),
            anomaly(AnomalyType::UnusualDuration, Severity::Medium, Signal::DurationDays, ConfidenceLevel::Low, 0.1),
        ]);
        assert_eq!(out[0].anomaly_type, AnomalyType::TemperatureExcursion);
        assert_eq!(out[1].anomaly_type, AnomalyType::Sluggish);
        assert_eq!(out[2].anomaly_type, AnomalyType::UnusualDuration);
    }

    #[test]
    fn full_ties_keep_detection_order() {
        // NutrientStress runs after TemperatureExcursion in detection order
        let out = aggregate(vec![
            anomaly(AnomalyType::TemperatureExcursion, Severity::High, Signal::Temperature, ConfidenceLevel::High, 0.7),
            anomaly(AnomalyType::NutrientStress, Severity::High, Signal::Brix, ConfidenceLevel::High, 0.7),
        ]);
        assert_eq!(out[0].anomaly_type, AnomalyType::TemperatureExcursion);
        assert_eq!(out[1].anomaly_type, AnomalyType::NutrientStress);
    }

    #[test]
    fn empty_input_is_fine() {
        assert!(aggregate(Vec::new()).is_empty());
    }
}
