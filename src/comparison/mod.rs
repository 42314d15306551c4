//! Comparison Service - positions current measurements against history
//!
//! Pure computation: takes a fermentation snapshot plus prefetched cohorts
//! and produces the per-signal [`ComparisonSet`] every detector reads.
//! No I/O happens here; cohort fetching (and its degradation on timeout)
//! is the orchestrator's job.
//!
//! Numerical rules:
//! - Percentile rank interpolates linearly between the cohort's five
//!   anchors; values outside [p10, p90] clamp to the boundary rank and
//!   set the extreme flag instead of extrapolating.
//! - A zero standard deviation yields z = 0 with the extreme flag set
//!   when the value differs from the mean (no division, no infinities).
//! - A zero-sample cohort produces a neutral comparison at floor
//!   confidence. Missing history is degradation, never an error.
//!
//! Signal units: the Brix comparison operates on the trailing *decline
//! rate* (°Bx/day, positive while fermenting), because progression speed
//! is what the cohort distribution describes. Temperature compares the
//! latest reading, DurationDays the elapsed days. Cohorts are served in
//! matching units.

use std::collections::HashMap;

use tracing::debug;

use crate::config::ThresholdProfile;
use crate::types::{
    ComparisonResult, ComparisonSet, Confidence, ConfidenceLevel, DeviationScore,
    FermentationSnapshot, HistoricalCohort, Signal, SignalComparison, TrendDirection,
};

/// Rates smaller than this (units/day) are reported as a flat trend.
const TREND_EPSILON: f64 = 1e-3;

pub struct ComparisonService;

impl ComparisonService {
    /// Build the shared comparison set for one analysis.
    ///
    /// `cohorts` holds whatever the orchestrator managed to fetch; any
    /// tracked signal missing from the map (or present with zero samples)
    /// is marked degraded in the result.
    pub fn build_set(
        snapshot: &FermentationSnapshot,
        cohorts: &HashMap<Signal, HistoricalCohort>,
        profile: &ThresholdProfile,
    ) -> ComparisonSet {
        let mut set = ComparisonSet::default();
        let elapsed_days = snapshot.elapsed_days();

        for signal in Signal::TRACKED {
            let current = match signal {
                // Decline rate, positive while sugar is being consumed
                Signal::Brix => snapshot
                    .trailing_rate_per_day(Signal::Brix, profile.sluggish.window_hours)
                    .map(|rate| -rate),
                Signal::DurationDays => Some(elapsed_days),
                _ => snapshot.latest(signal).map(|(_, v)| v),
            };
            let Some(current) = current else {
                // Signal never measured on this lot (or too few points for
                // a rate); detectors that need it handle the absence.
                continue;
            };

            let empty = HistoricalCohort::empty(signal);
            let cohort = cohorts.get(&signal).unwrap_or(&empty);
            if cohort.sample_count == 0 {
                set.mark_degraded(signal);
            }

            let trend = match signal {
                Signal::DurationDays => TrendDirection::Rising,
                _ => Self::trend(snapshot, signal, profile.sluggish.window_hours),
            };

            let entry = Self::compare(signal, current, trend, elapsed_days, cohort, profile);
            debug!(
                signal = %signal,
                current,
                percentile = entry.comparison.percentile_rank,
                z = entry.deviation.z_score,
                samples = cohort.sample_count,
                "Signal compared against cohort"
            );
            set.insert(signal, entry);
        }

        set
    }

    /// Compare one current value against one cohort.
    pub fn compare(
        signal: Signal,
        current_value: f64,
        trend_direction: TrendDirection,
        elapsed_days: f64,
        cohort: &HistoricalCohort,
        profile: &ThresholdProfile,
    ) -> SignalComparison {
        let confidence = Self::confidence(cohort.sample_count, profile);

        if cohort.sample_count == 0 {
            // Neutral comparison: no rank, no deviation, floor confidence.
            return SignalComparison {
                comparison: ComparisonResult {
                    signal,
                    current_value,
                    expected_min: current_value,
                    expected_max: current_value,
                    percentile_rank: 50.0,
                    deviation_percentage: 0.0,
                    trend_direction,
                    extreme: false,
                },
                deviation: DeviationScore {
                    z_score: 0.0,
                    percentile: 50.0,
                    warning_sigma: profile.deviation.warning_sigma,
                    critical_sigma: profile.deviation.critical_sigma,
                },
                confidence,
            };
        }

        let (percentile_rank, rank_extreme) = Self::percentile_rank(current_value, cohort);
        let (z_score, z_extreme) = Self::z_score(current_value, cohort.mean, cohort.std_dev);

        let deviation_percentage = cohort
            .expected_at_day(elapsed_days)
            .filter(|expected| expected.abs() > f64::EPSILON)
            .map_or(0.0, |expected| (current_value - expected) / expected * 100.0);

        SignalComparison {
            comparison: ComparisonResult {
                signal,
                current_value,
                expected_min: cohort.percentiles.p10,
                expected_max: cohort.percentiles.p90,
                percentile_rank,
                deviation_percentage,
                trend_direction,
                extreme: rank_extreme || z_extreme,
            },
            deviation: DeviationScore {
                z_score,
                percentile: percentile_rank,
                warning_sigma: profile.deviation.warning_sigma,
                critical_sigma: profile.deviation.critical_sigma,
            },
            confidence,
        }
    }

    /// Map a cohort sample count onto a confidence level and score.
    ///
    /// Bands are validated strictly increasing at config load, which makes
    /// both the level and the score monotone in the sample count.
    pub fn confidence(sample_count: usize, profile: &ThresholdProfile) -> Confidence {
        let bands = profile.confidence;
        let level = if sample_count >= bands.very_high_min_samples {
            ConfidenceLevel::VeryHigh
        } else if sample_count >= bands.high_min_samples {
            ConfidenceLevel::High
        } else if sample_count >= bands.medium_min_samples {
            ConfidenceLevel::Medium
        } else {
            ConfidenceLevel::Low
        };
        let score = (sample_count as f64 / bands.very_high_min_samples as f64).clamp(0.0, 1.0);
        Confidence { level, score, sample_count }
    }

    /// Interpolated percentile rank against the cohort's anchor table.
    ///
    /// Returns (rank in [10, 90], extreme flag for values outside the
    /// anchored range). The table only anchors p10 through p90, so a rank
    /// past either end cannot be interpolated; extremes clamp to the
    /// outermost anchor's rank and the flag carries the tail information.
    fn percentile_rank(value: f64, cohort: &HistoricalCohort) -> (f64, bool) {
        let anchors = cohort.percentiles.anchors();
        let (lo_rank, lo_val) = anchors[0];
        let (hi_rank, hi_val) = anchors[anchors.len() - 1];

        if value < lo_val {
            return (lo_rank, true);
        }
        if value > hi_val {
            return (hi_rank, true);
        }

        for pair in anchors.windows(2) {
            let (r0, v0) = pair[0];
            let (r1, v1) = pair[1];
            if value <= v1 {
                // Degenerate segment (repeated anchor value): take its
                // lower rank rather than dividing by zero.
                let width = v1 - v0;
                if width <= f64::EPSILON {
                    return (r0, false);
                }
                return (r0 + (value - v0) / width * (r1 - r0), false);
            }
        }

        (hi_rank, false)
    }

    /// Standard z-score with a zero-variance guard: a degenerate cohort
    /// yields z = 0, flagged extreme when the value actually deviates.
    fn z_score(value: f64, mean: f64, std_dev: f64) -> (f64, bool) {
        if std_dev <= f64::EPSILON {
            let deviates = (value - mean).abs() > f64::EPSILON;
            return (0.0, deviates);
        }
        ((value - mean) / std_dev, false)
    }

    fn trend(
        snapshot: &FermentationSnapshot,
        signal: Signal,
        window_hours: f64,
    ) -> TrendDirection {
        match snapshot.trailing_rate_per_day(signal, window_hours) {
            Some(rate) if rate > TREND_EPSILON => TrendDirection::Rising,
            Some(rate) if rate < -TREND_EPSILON => TrendDirection::Falling,
            _ => TrendDirection::Flat,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::types::{PercentileTable, WineColor};

    fn profile() -> ThresholdProfile {
        ThresholdProfile::resolve(&EngineConfig::default(), "Syrah", WineColor::Red)
    }

    fn cohort(samples: usize) -> HistoricalCohort {
        HistoricalCohort {
            signal: Signal::Brix,
            sample_count: samples,
            mean: 12.0,
            std_dev: 2.0,
            percentiles: PercentileTable { p10: 8.0, p25: 10.0, p50: 12.0, p75: 14.0, p90: 16.0 },
            expected_by_day: vec![24.0, 21.0, 18.0, 15.0, 12.0],
        }
    }

    #[test]
    fn percentile_interpolates_between_anchors() {
        // 11.0 sits halfway between p25 (10.0) and p50 (12.0)
        let (rank, extreme) = ComparisonService::percentile_rank(11.0, &cohort(20));
        assert!((rank - 37.5).abs() < 1e-9, "got {rank}");
        assert!(!extreme);
    }

    #[test]
    fn percentile_hits_anchors_exactly() {
        let c = cohort(20);
        let (rank, _) = ComparisonService::percentile_rank(8.0, &c);
        assert!((rank - 10.0).abs() < 1e-9);
        let (rank, _) = ComparisonService::percentile_rank(12.0, &c);
        assert!((rank - 50.0).abs() < 1e-9);
        let (rank, _) = ComparisonService::percentile_rank(16.0, &c);
        assert!((rank - 90.0).abs() < 1e-9);
    }

    #[test]
    fn percentile_clamps_and_flags_outside_range() {
        let c = cohort(20);
        let (rank, extreme) = ComparisonService::percentile_rank(5.0, &c);
        assert!((rank - 10.0).abs() < 1e-9);
        assert!(extreme);

        let (rank, extreme) = ComparisonService::percentile_rank(25.0, &c);
        assert!((rank - 90.0).abs() < 1e-9);
        assert!(extreme);
    }

    #[test]
    fn zero_stddev_yields_zero_z_with_extreme_flag() {
        let (z, extreme) = ComparisonService::z_score(14.0, 12.0, 0.0);
        assert_eq!(z, 0.0);
        assert!(extreme);

        // Value equal to the degenerate mean is not extreme
        let (z, extreme) = ComparisonService::z_score(12.0, 12.0, 0.0);
        assert_eq!(z, 0.0);
        assert!(!extreme);
    }

    #[test]
    fn confidence_bands_are_monotone() {
        let p = profile();
        let levels: Vec<ConfidenceLevel> = [0, 4, 5, 14, 15, 29, 30, 100]
            .iter()
            .map(|&n| ComparisonService::confidence(n, &p).level)
            .collect();
        assert_eq!(levels[0], ConfidenceLevel::Low);
        assert_eq!(levels[1], ConfidenceLevel::Low);
        assert_eq!(levels[2], ConfidenceLevel::Medium);
        assert_eq!(levels[3], ConfidenceLevel::Medium);
        assert_eq!(levels[4], ConfidenceLevel::High);
        assert_eq!(levels[5], ConfidenceLevel::High);
        assert_eq!(levels[6], ConfidenceLevel::VeryHigh);
        assert_eq!(levels[7], ConfidenceLevel::VeryHigh);
        assert!(levels.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn zero_sample_cohort_degrades_to_floor_confidence() {
        let p = profile();
        let empty = HistoricalCohort::empty(Signal::Brix);
        let entry = ComparisonService::compare(
            Signal::Brix,
            14.0,
            TrendDirection::Falling,
            2.0,
            &empty,
            &p,
        );
        assert_eq!(entry.confidence.level, ConfidenceLevel::Low);
        assert_eq!(entry.confidence.sample_count, 0);
        assert_eq!(entry.deviation.z_score, 0.0);
        assert!(!entry.comparison.extreme);
    }

    #[test]
    fn deviation_percentage_against_expected_curve() {
        let p = profile();
        // Day 2 expectation is 18.0; current 21.6 is +20%
        let entry = ComparisonService::compare(
            Signal::Brix,
            21.6,
            TrendDirection::Falling,
            2.0,
            &cohort(20),
            &p,
        );
        assert!((entry.comparison.deviation_percentage - 20.0).abs() < 1e-9);
    }

    fn two_sample_snapshot() -> FermentationSnapshot {
        use chrono::{TimeZone, Utc};
        let start = Utc.with_ymd_and_hms(2025, 9, 1, 0, 0, 0).unwrap();
        FermentationSnapshot {
            id: uuid::Uuid::new_v4(),
            winery_id: uuid::Uuid::new_v4(),
            varietal: "Syrah".to_string(),
            color: WineColor::Red,
            started_at: start,
            target_completion_brix: 0.0,
            samples: vec![
                crate::types::FermentationSample {
                    recorded_at: start + chrono::Duration::hours(24),
                    brix: Some(22.0),
                    temperature_c: Some(25.0),
                    ph: None,
                },
                crate::types::FermentationSample {
                    recorded_at: start + chrono::Duration::hours(48),
                    brix: Some(20.0),
                    temperature_c: Some(25.5),
                    ph: None,
                },
            ],
        }
    }

    #[test]
    fn build_set_marks_missing_cohorts_degraded() {
        let p = profile();
        let mut cohorts = HashMap::new();
        cohorts.insert(Signal::Brix, cohort(20));
        // Temperature and DurationDays cohorts missing entirely

        let set = ComparisonService::build_set(&two_sample_snapshot(), &cohorts, &p);
        assert!(set.get(Signal::Brix).is_some());
        assert!(!set.degraded_signals.contains(&Signal::Brix));
        assert!(set.degraded_signals.contains(&Signal::Temperature));
        assert!(set.degraded_signals.contains(&Signal::DurationDays));
    }

    #[test]
    fn build_set_compares_brix_as_decline_rate() {
        let p = profile();
        // 22 → 20 over one day = 2.0 °Bx/day decline
        let set = ComparisonService::build_set(&two_sample_snapshot(), &HashMap::new(), &p);
        let brix = set.get(Signal::Brix).expect("brix entry");
        assert!((brix.comparison.current_value - 2.0).abs() < 1e-9);
        assert_eq!(brix.comparison.trend_direction, TrendDirection::Falling);
    }
}
