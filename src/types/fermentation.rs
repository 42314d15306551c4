//! Fermentation measurement input types: snapshot, samples, signals

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Tracked measurement signals.
///
/// `DurationDays` is a cohort-only pseudo-signal: it never appears in a
/// sample, but the historical provider serves a cohort for it so the
/// duration detector can compare total elapsed time against past lots.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum Signal {
    /// Degrees Brix, the primary fermentation progression signal
    Brix,
    /// Must temperature (°C)
    Temperature,
    /// Must pH (optional in samples)
    Ph,
    /// Total fermentation duration in days (cohort-only)
    DurationDays,
}

impl Signal {
    /// Signals the engine fetches cohorts for, once per analysis.
    pub const TRACKED: [Signal; 3] = [Signal::Brix, Signal::Temperature, Signal::DurationDays];

    pub fn as_str(&self) -> &'static str {
        match self {
            Signal::Brix => "brix",
            Signal::Temperature => "temperature",
            Signal::Ph => "ph",
            Signal::DurationDays => "duration_days",
        }
    }
}

impl std::fmt::Display for Signal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Wine color class. Selects the absolute temperature band.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum WineColor {
    #[default]
    Red,
    White,
    Rose,
}

impl WineColor {
    pub fn as_str(&self) -> &'static str {
        match self {
            WineColor::Red => "red",
            WineColor::White => "white",
            WineColor::Rose => "rose",
        }
    }
}

impl std::fmt::Display for WineColor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One timestamped cellar measurement.
///
/// Sampling is irregular in practice (manual punch-down readings, probe
/// dropouts), so nothing downstream may assume a fixed cadence.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct FermentationSample {
    pub recorded_at: DateTime<Utc>,
    /// Degrees Brix
    pub brix: Option<f64>,
    /// Must temperature (°C)
    pub temperature_c: Option<f64>,
    /// Must pH
    pub ph: Option<f64>,
}

impl FermentationSample {
    /// Value of a measured signal in this sample, if present.
    pub fn value(&self, signal: Signal) -> Option<f64> {
        match signal {
            Signal::Brix => self.brix,
            Signal::Temperature => self.temperature_c,
            Signal::Ph => self.ph,
            Signal::DurationDays => None,
        }
    }
}

/// Immutable view of one fermentation and its measurement history.
///
/// Owned by the fermentation data collaborator; the engine never mutates it.
/// Samples are ordered by `recorded_at` ascending.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FermentationSnapshot {
    pub id: Uuid,
    pub winery_id: Uuid,
    /// Grape varietal, e.g. "Pinot Noir". Part of the cohort key
    pub varietal: String,
    pub color: WineColor,
    pub started_at: DateTime<Utc>,
    /// Brix at or below which the lot is considered dry
    pub target_completion_brix: f64,
    pub samples: Vec<FermentationSample>,
}

impl FermentationSnapshot {
    /// Ordered (timestamp, value) series for one signal, skipping samples
    /// where the signal was not measured.
    pub fn series(&self, signal: Signal) -> Vec<(DateTime<Utc>, f64)> {
        self.samples
            .iter()
            .filter_map(|s| s.value(signal).map(|v| (s.recorded_at, v)))
            .collect()
    }

    /// Most recent measured value for a signal.
    pub fn latest(&self, signal: Signal) -> Option<(DateTime<Utc>, f64)> {
        self.samples
            .iter()
            .rev()
            .find_map(|s| s.value(signal).map(|v| (s.recorded_at, v)))
    }

    /// Whole days elapsed from start to the most recent sample (≥ 0).
    pub fn elapsed_days(&self) -> f64 {
        let last = self
            .samples
            .last()
            .map_or(self.started_at, |s| s.recorded_at);
        let secs = (last - self.started_at).num_seconds().max(0) as f64;
        secs / 86_400.0
    }

    /// Trailing rate of change for a signal over `window_hours`, in units
    /// per day. Negative for a declining signal (normal Brix behavior).
    ///
    /// Uses the first and last measurements inside the window so irregular
    /// sampling cannot bias the rate. Returns `None` with fewer than two
    /// measurements in the window.
    pub fn trailing_rate_per_day(&self, signal: Signal, window_hours: f64) -> Option<f64> {
        let series = self.series(signal);
        let (last_ts, _) = *series.last()?;
        let cutoff = last_ts - chrono::Duration::seconds((window_hours * 3600.0) as i64);

        let window: Vec<&(DateTime<Utc>, f64)> =
            series.iter().filter(|(ts, _)| *ts >= cutoff).collect();
        if window.len() < 2 {
            return None;
        }

        let (t0, v0) = *window[0];
        let (t1, v1) = *window[window.len() - 1];
        let span_days = (t1 - t0).num_seconds() as f64 / 86_400.0;
        if span_days <= f64::EPSILON {
            return None;
        }
        Some((v1 - v0) / span_days)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ts(hours: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 9, 1, 0, 0, 0).unwrap() + chrono::Duration::hours(hours)
    }

    fn snapshot_with_brix(points: &[(i64, f64)]) -> FermentationSnapshot {
        FermentationSnapshot {
            id: Uuid::new_v4(),
            winery_id: Uuid::new_v4(),
            varietal: "Syrah".to_string(),
            color: WineColor::Red,
            started_at: ts(0),
            target_completion_brix: 0.0,
            samples: points
                .iter()
                .map(|&(h, b)| FermentationSample {
                    recorded_at: ts(h),
                    brix: Some(b),
                    temperature_c: Some(25.0),
                    ph: None,
                })
                .collect(),
        }
    }

    #[test]
    fn series_skips_missing_values() {
        let mut snap = snapshot_with_brix(&[(0, 24.0), (24, 22.0)]);
        snap.samples.push(FermentationSample {
            recorded_at: ts(48),
            brix: None,
            temperature_c: Some(26.0),
            ph: None,
        });
        assert_eq!(snap.series(Signal::Brix).len(), 2);
        assert_eq!(snap.series(Signal::Temperature).len(), 3);
    }

    #[test]
    fn trailing_rate_reflects_decline() {
        // 24 → 20 Brix over 48 hours = -2.0 Brix/day
        let snap = snapshot_with_brix(&[(0, 24.0), (24, 22.0), (48, 20.0)]);
        let rate = snap.trailing_rate_per_day(Signal::Brix, 72.0).unwrap();
        assert!((rate - (-2.0)).abs() < 1e-9, "got {rate}");
    }

    #[test]
    fn trailing_rate_window_excludes_old_samples() {
        // Old fast decline, recent stall: window must only see the stall
        let snap = snapshot_with_brix(&[(0, 24.0), (24, 18.0), (48, 10.0), (72, 10.0), (96, 10.0)]);
        let rate = snap.trailing_rate_per_day(Signal::Brix, 48.0).unwrap();
        assert!(rate.abs() < 1e-9, "got {rate}");
    }

    #[test]
    fn trailing_rate_needs_two_points() {
        let snap = snapshot_with_brix(&[(0, 24.0)]);
        assert!(snap.trailing_rate_per_day(Signal::Brix, 24.0).is_none());
    }

    #[test]
    fn elapsed_days_from_last_sample() {
        let snap = snapshot_with_brix(&[(0, 24.0), (72, 18.0)]);
        assert!((snap.elapsed_days() - 3.0).abs() < 1e-9);
    }
}
