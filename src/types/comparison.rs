//! Comparison layer types: HistoricalCohort, ComparisonResult,
//! DeviationScore, Confidence

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::Signal;

// ============================================================================
// Historical Cohort
// ============================================================================

/// Known percentile anchors for a cohort distribution.
///
/// The comparison service interpolates linearly between adjacent anchors;
/// values outside [p10, p90] are clamped and flagged extreme.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct PercentileTable {
    pub p10: f64,
    pub p25: f64,
    pub p50: f64,
    pub p75: f64,
    pub p90: f64,
}

impl PercentileTable {
    /// Anchor points as (rank, value) pairs in ascending rank order.
    pub fn anchors(&self) -> [(f64, f64); 5] {
        [
            (10.0, self.p10),
            (25.0, self.p25),
            (50.0, self.p50),
            (75.0, self.p75),
            (90.0, self.p90),
        ]
    }
}

impl Default for PercentileTable {
    fn default() -> Self {
        Self { p10: 0.0, p25: 0.0, p50: 0.0, p75: 0.0, p90: 0.0 }
    }
}

/// Descriptive statistics over past fermentations for one cohort key
/// (winery, varietal, signal). Read-only to the engine.
///
/// `sample_count = 0` is the degradation value returned when no history
/// exists or the provider timed out, never an error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoricalCohort {
    pub signal: Signal,
    /// Number of past fermentations contributing to these statistics
    pub sample_count: usize,
    pub mean: f64,
    pub std_dev: f64,
    pub percentiles: PercentileTable,
    /// Expected signal value by elapsed day (index 0 = day 0).
    /// Empty when no history exists.
    pub expected_by_day: Vec<f64>,
}

impl HistoricalCohort {
    /// The zero-sample cohort used when history is missing or unreachable.
    pub fn empty(signal: Signal) -> Self {
        Self {
            signal,
            sample_count: 0,
            mean: 0.0,
            std_dev: 0.0,
            percentiles: PercentileTable::default(),
            expected_by_day: Vec::new(),
        }
    }

    /// Expected value at an elapsed day, reusing the last known point past
    /// the end of the curve. `None` when the cohort has no trend data.
    pub fn expected_at_day(&self, elapsed_days: f64) -> Option<f64> {
        if self.expected_by_day.is_empty() {
            return None;
        }
        let idx = (elapsed_days.max(0.0).floor() as usize).min(self.expected_by_day.len() - 1);
        Some(self.expected_by_day[idx])
    }
}

// ============================================================================
// Comparison Result
// ============================================================================

/// Direction of the trailing trend for a signal.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum TrendDirection {
    Rising,
    Falling,
    Flat,
}

impl std::fmt::Display for TrendDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TrendDirection::Rising => write!(f, "rising"),
            TrendDirection::Falling => write!(f, "falling"),
            TrendDirection::Flat => write!(f, "flat"),
        }
    }
}

/// One signal's current value positioned against its historical cohort.
///
/// Computed fresh per analysis and embedded in anomalies; never persisted
/// on its own.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComparisonResult {
    pub signal: Signal,
    pub current_value: f64,
    /// Cohort p10 (clamp floor of the expected band)
    pub expected_min: f64,
    /// Cohort p90 (clamp ceiling of the expected band)
    pub expected_max: f64,
    /// 0–100, interpolated between cohort percentile anchors
    pub percentile_rank: f64,
    /// (current − expected_at_elapsed_day) / expected_at_elapsed_day × 100
    pub deviation_percentage: f64,
    pub trend_direction: TrendDirection,
    /// Set when the value fell outside [p10, p90] or stddev was zero
    pub extreme: bool,
}

/// Composite abnormality measure derived from a ComparisonResult and the
/// configured sigma cutoffs.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct DeviationScore {
    pub z_score: f64,
    /// Percentile rank carried over from the comparison (0–100)
    pub percentile: f64,
    /// Sigma cutoff above which the deviation is a warning
    pub warning_sigma: f64,
    /// Sigma cutoff above which the deviation is critical
    pub critical_sigma: f64,
}

impl DeviationScore {
    pub fn is_warning(&self) -> bool {
        self.z_score.abs() >= self.warning_sigma
    }

    pub fn is_critical(&self) -> bool {
        self.z_score.abs() >= self.critical_sigma
    }
}

// ============================================================================
// Confidence
// ============================================================================

/// Discrete, sample-size-driven trust level for a detection result.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
pub enum ConfidenceLevel {
    Low = 0,
    Medium = 1,
    High = 2,
    VeryHigh = 3,
}

impl ConfidenceLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConfidenceLevel::Low => "LOW",
            ConfidenceLevel::Medium => "MEDIUM",
            ConfidenceLevel::High => "HIGH",
            ConfidenceLevel::VeryHigh => "VERY_HIGH",
        }
    }
}

impl std::fmt::Display for ConfidenceLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Confidence with its numeric score and the cohort size it derives from.
///
/// Invariant: both `level` and `score` are monotonically non-decreasing
/// functions of `sample_count` (enforced by the comparison service's band
/// mapping plus config validation of band ordering).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Confidence {
    pub level: ConfidenceLevel,
    /// sample_count / very_high band minimum, clamped to [0, 1]
    pub score: f64,
    pub sample_count: usize,
}

impl Confidence {
    /// The floor confidence used when all history is missing.
    pub fn floor() -> Self {
        Self { level: ConfidenceLevel::Low, score: 0.0, sample_count: 0 }
    }

    /// The lesser of two confidences (by level, then score).
    pub fn min(self, other: Self) -> Self {
        if (other.level, other.score) < (self.level, self.score) {
            other
        } else {
            self
        }
    }
}

// ============================================================================
// Per-analysis comparison bundle
// ============================================================================

/// One signal's comparison, deviation, and confidence, bundled for the
/// detectors.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalComparison {
    pub comparison: ComparisonResult,
    pub deviation: DeviationScore,
    pub confidence: Confidence,
}

/// All per-signal comparisons for one analysis.
///
/// Built once per analysis and shared read-only across every detector;
/// cohorts are never refetched per detector.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ComparisonSet {
    entries: HashMap<Signal, SignalComparison>,
    /// Signals whose cohort degraded to zero samples (timeout / no history)
    pub degraded_signals: Vec<Signal>,
}

impl ComparisonSet {
    pub fn insert(&mut self, signal: Signal, entry: SignalComparison) {
        self.entries.insert(signal, entry);
    }

    pub fn get(&self, signal: Signal) -> Option<&SignalComparison> {
        self.entries.get(&signal)
    }

    pub fn mark_degraded(&mut self, signal: Signal) {
        if !self.degraded_signals.contains(&signal) {
            self.degraded_signals.push(signal);
        }
    }
}
