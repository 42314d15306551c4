//! Engine Configuration - all detection thresholds as operator-tunable TOML values
//!
//! Every threshold the detectors and the comparison service consult is a
//! field in this module. Each struct implements `Default` with values
//! matching the shipped calibration, so behavior is unchanged when no
//! config file is present.
//!
//! ## Loading Order
//!
//! 1. `VINTEL_CONFIG` environment variable (path to TOML file)
//! 2. `vintel.toml` in the current working directory
//! 3. Built-in defaults
//!
//! Analyses never read a live shared table: the rule provider resolves an
//! immutable [`ThresholdProfile`] snapshot per call and passes it by value
//! through the pipeline, so a hot reload mid-analysis cannot race.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::types::WineColor;

// ============================================================================
// Top-Level Config
// ============================================================================

/// Root configuration for a winery deployment.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Winery identification, appears in logs and reports only
    #[serde(default)]
    pub winery: WineryInfo,

    /// Confidence band minimums (sample counts)
    #[serde(default)]
    pub confidence: ConfidenceBands,

    /// Z-score severity cutoffs
    #[serde(default)]
    pub deviation: DeviationThresholds,

    /// Slow-progression detector thresholds
    #[serde(default)]
    pub sluggish: SluggishThresholds,

    /// Stuck-fermentation detector thresholds
    #[serde(default)]
    pub stuck: StuckThresholds,

    /// Absolute temperature bands per wine color
    #[serde(default)]
    pub temperature: TemperatureThresholds,

    /// Compound nutrient/temperature risk rule
    #[serde(default)]
    pub compound: CompoundThresholds,

    /// Unusual-duration detector thresholds
    #[serde(default)]
    pub duration: DurationThresholds,

    /// Recommendation generation settings
    #[serde(default)]
    pub recommendation: RecommendationConfig,

    /// Historical cohort fetch behavior
    #[serde(default)]
    pub cohort: CohortConfig,

    /// Per-varietal threshold overrides, keyed by varietal name
    #[serde(default)]
    pub varietals: HashMap<String, VarietalOverrides>,
}

impl EngineConfig {
    /// Load configuration using the standard search order:
    /// 1. `$VINTEL_CONFIG` environment variable
    /// 2. `./vintel.toml` in the current working directory
    /// 3. Built-in defaults
    pub fn load() -> Self {
        if let Ok(path) = std::env::var("VINTEL_CONFIG") {
            let p = PathBuf::from(&path);
            if p.exists() {
                match Self::load_from_file(&p) {
                    Ok(config) => {
                        info!(path = %p.display(), winery = %config.winery.name, "Loaded engine config from VINTEL_CONFIG");
                        return config;
                    }
                    Err(e) => {
                        warn!(path = %p.display(), error = %e, "Failed to load config from VINTEL_CONFIG, falling back");
                    }
                }
            } else {
                warn!(path = %path, "VINTEL_CONFIG points to non-existent file, falling back");
            }
        }

        let local = PathBuf::from("vintel.toml");
        if local.exists() {
            match Self::load_from_file(&local) {
                Ok(config) => {
                    info!(winery = %config.winery.name, "Loaded engine config from ./vintel.toml");
                    return config;
                }
                Err(e) => {
                    warn!(error = %e, "Failed to load ./vintel.toml, using defaults");
                }
            }
        }

        info!("No vintel.toml found, using built-in defaults");
        Self::default()
    }

    /// Load from a specific TOML file path.
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents =
            std::fs::read_to_string(path).map_err(|e| ConfigError::Io(path.to_path_buf(), e))?;
        let config: Self =
            toml::from_str(&contents).map_err(|e| ConfigError::Parse(path.to_path_buf(), e))?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize the current config to a TOML string.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(ConfigError::Serialize)
    }

    /// Validate all thresholds for internal consistency.
    ///
    /// Rules:
    /// - Critical cutoffs must exceed warning cutoffs
    /// - Confidence bands must be strictly increasing (monotonicity of the
    ///   confidence mapping depends on it)
    /// - Temperature bands must satisfy min < max
    /// - Rate fractions must lie in (0, 1]
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors: Vec<String> = Vec::new();

        let c = &self.confidence;
        if !(c.medium_min_samples < c.high_min_samples
            && c.high_min_samples < c.very_high_min_samples)
        {
            errors.push(format!(
                "confidence bands must be strictly increasing: medium={} high={} very_high={}",
                c.medium_min_samples, c.high_min_samples, c.very_high_min_samples
            ));
        }
        if c.medium_min_samples == 0 {
            errors.push("confidence.medium_min_samples must be > 0".to_string());
        }

        let d = &self.deviation;
        if !d.warning_sigma.is_finite() || !d.critical_sigma.is_finite() {
            errors.push("deviation sigmas must be finite".to_string());
        } else if d.critical_sigma <= d.warning_sigma {
            errors.push(format!(
                "deviation.critical_sigma ({:.1}) must be > warning_sigma ({:.1})",
                d.critical_sigma, d.warning_sigma
            ));
        }
        if d.warning_sigma <= 0.0 {
            errors.push("deviation.warning_sigma must be > 0".to_string());
        }

        Self::check_fraction(self.sluggish.rate_fraction, "sluggish.rate_fraction", &mut errors);
        if !(0.0..=100.0).contains(&self.sluggish.percentile_cutoff) {
            errors.push("sluggish.percentile_cutoff must be in [0, 100]".to_string());
        }
        if self.sluggish.window_hours <= 0.0 {
            errors.push("sluggish.window_hours must be > 0".to_string());
        }
        if self.sluggish.fallback_decline_brix_per_day <= 0.0 {
            errors.push("sluggish.fallback_decline_brix_per_day must be > 0".to_string());
        }

        if self.stuck.min_duration_hours <= 0.0 {
            errors.push("stuck.min_duration_hours must be > 0".to_string());
        }
        if self.stuck.rate_epsilon_brix_per_day <= 0.0 {
            errors.push("stuck.rate_epsilon_brix_per_day must be > 0".to_string());
        }

        for (label, band) in [
            ("red", &self.temperature.red),
            ("white", &self.temperature.white),
            ("rose", &self.temperature.rose),
        ] {
            if band.min_c >= band.max_c {
                errors.push(format!(
                    "temperature.{label}: min_c ({:.1}) must be < max_c ({:.1})",
                    band.min_c, band.max_c
                ));
            }
        }
        if self.temperature.tolerance_margin_c < 0.0 {
            errors.push("temperature.tolerance_margin_c must be >= 0".to_string());
        }

        Self::check_fraction(self.compound.rate_fraction, "compound.rate_fraction", &mut errors);

        if self.duration.fallback_min_days >= self.duration.fallback_max_days {
            errors.push(format!(
                "duration.fallback_min_days ({:.1}) must be < fallback_max_days ({:.1})",
                self.duration.fallback_min_days, self.duration.fallback_max_days
            ));
        }

        if self.recommendation.top_n == 0 {
            errors.push("recommendation.top_n must be > 0".to_string());
        }

        if self.cohort.fetch_timeout_ms == 0 {
            errors.push("cohort.fetch_timeout_ms must be > 0".to_string());
        }

        // Reject NaN/Inf in any float threshold
        let float_fields = [
            (self.deviation.warning_sigma, "deviation.warning_sigma"),
            (self.deviation.critical_sigma, "deviation.critical_sigma"),
            (self.sluggish.rate_fraction, "sluggish.rate_fraction"),
            (self.sluggish.percentile_cutoff, "sluggish.percentile_cutoff"),
            (self.sluggish.window_hours, "sluggish.window_hours"),
            (
                self.sluggish.fallback_decline_brix_per_day,
                "sluggish.fallback_decline_brix_per_day",
            ),
            (self.stuck.min_duration_hours, "stuck.min_duration_hours"),
            (self.stuck.rate_epsilon_brix_per_day, "stuck.rate_epsilon_brix_per_day"),
            (self.temperature.red.min_c, "temperature.red.min_c"),
            (self.temperature.red.max_c, "temperature.red.max_c"),
            (self.temperature.white.min_c, "temperature.white.min_c"),
            (self.temperature.white.max_c, "temperature.white.max_c"),
            (self.temperature.rose.min_c, "temperature.rose.min_c"),
            (self.temperature.rose.max_c, "temperature.rose.max_c"),
            (self.temperature.tolerance_margin_c, "temperature.tolerance_margin_c"),
            (self.compound.rate_fraction, "compound.rate_fraction"),
            (self.compound.max_temperature_c, "compound.max_temperature_c"),
            (self.duration.completion_brix, "duration.completion_brix"),
            (self.duration.fallback_min_days, "duration.fallback_min_days"),
            (self.duration.fallback_max_days, "duration.fallback_max_days"),
        ];
        for (value, name) in float_fields {
            if !value.is_finite() {
                errors.push(format!("{name} must be a finite number, got {value}"));
            }
        }
        for (varietal, overrides) in &self.varietals {
            let overridden = [
                (overrides.fallback_decline_brix_per_day, "fallback_decline_brix_per_day"),
                (overrides.compound_max_temperature_c, "compound_max_temperature_c"),
                (overrides.temperature_band.map(|b| b.min_c), "temperature_band.min_c"),
                (overrides.temperature_band.map(|b| b.max_c), "temperature_band.max_c"),
            ];
            for (value, name) in overridden {
                if let Some(v) = value {
                    if !v.is_finite() {
                        errors.push(format!(
                            "varietals.{varietal}.{name} must be a finite number, got {v}"
                        ));
                    }
                }
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Validation(errors))
        }
    }

    fn check_fraction(value: f64, name: &str, errors: &mut Vec<String>) {
        if !value.is_finite() || value <= 0.0 || value > 1.0 {
            errors.push(format!("{name} must be in (0, 1], got {value}"));
        }
    }
}

// ============================================================================
// Error Type
// ============================================================================

#[derive(Debug)]
pub enum ConfigError {
    Io(PathBuf, std::io::Error),
    Parse(PathBuf, toml::de::Error),
    Serialize(toml::ser::Error),
    Validation(Vec<String>),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(path, e) => write!(f, "Config I/O error ({}): {}", path.display(), e),
            ConfigError::Parse(path, e) => {
                write!(f, "Config parse error ({}): {}", path.display(), e)
            }
            ConfigError::Serialize(e) => write!(f, "Config serialization error: {}", e),
            ConfigError::Validation(errors) => {
                writeln!(f, "Config validation failed:")?;
                for e in errors {
                    writeln!(f, "  - {}", e)?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for ConfigError {}

// ============================================================================
// Winery Info
// ============================================================================

/// Identification metadata, not used for logic.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WineryInfo {
    #[serde(default = "default_winery_name")]
    pub name: String,

    #[serde(default)]
    pub region: String,
}

fn default_winery_name() -> String {
    "DEFAULT".to_string()
}

impl Default for WineryInfo {
    fn default() -> Self {
        Self { name: default_winery_name(), region: String::new() }
    }
}

// ============================================================================
// Confidence Bands
// ============================================================================

/// Sample-count minimums for each confidence level.
///
/// Below `medium_min_samples` confidence is LOW. Validation requires the
/// bands to be strictly increasing, which makes the level a monotone
/// non-decreasing function of sample count.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ConfidenceBands {
    #[serde(default = "default_medium_min")]
    pub medium_min_samples: usize,

    #[serde(default = "default_high_min")]
    pub high_min_samples: usize,

    #[serde(default = "default_very_high_min")]
    pub very_high_min_samples: usize,
}

fn default_medium_min() -> usize { 5 }
fn default_high_min() -> usize { 15 }
fn default_very_high_min() -> usize { 30 }

impl Default for ConfidenceBands {
    fn default() -> Self {
        Self {
            medium_min_samples: default_medium_min(),
            high_min_samples: default_high_min(),
            very_high_min_samples: default_very_high_min(),
        }
    }
}

// ============================================================================
// Deviation Thresholds
// ============================================================================

/// Z-score cutoffs used by [`crate::types::DeviationScore`].
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct DeviationThresholds {
    /// |z| at or above this is a warning-grade deviation
    #[serde(default = "default_warning_sigma")]
    pub warning_sigma: f64,

    /// |z| at or above this is a critical-grade deviation
    #[serde(default = "default_critical_sigma")]
    pub critical_sigma: f64,
}

fn default_warning_sigma() -> f64 { 2.0 }
fn default_critical_sigma() -> f64 { 3.0 }

impl Default for DeviationThresholds {
    fn default() -> Self {
        Self {
            warning_sigma: default_warning_sigma(),
            critical_sigma: default_critical_sigma(),
        }
    }
}

// ============================================================================
// Sluggish (slow progression) Thresholds
// ============================================================================

/// Slow-progression detection: trailing Brix decline below a fraction of
/// the cohort's expected rate AND percentile rank below a cutoff.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SluggishThresholds {
    /// Trailing decline below this fraction of the expected rate is slow
    #[serde(default = "default_sluggish_rate_fraction")]
    pub rate_fraction: f64,

    /// Percentile rank below this marks the lot as lagging its cohort
    #[serde(default = "default_sluggish_percentile_cutoff")]
    pub percentile_cutoff: f64,

    /// Trailing window for the rate computation (hours)
    #[serde(default = "default_sluggish_window_hours")]
    pub window_hours: f64,

    /// Absolute expected decline (°Bx/day) when no cohort history exists
    #[serde(default = "default_sluggish_fallback_decline")]
    pub fallback_decline_brix_per_day: f64,
}

fn default_sluggish_rate_fraction() -> f64 { 0.5 }
fn default_sluggish_percentile_cutoff() -> f64 { 25.0 }
fn default_sluggish_window_hours() -> f64 { 48.0 }
fn default_sluggish_fallback_decline() -> f64 { 1.5 }

impl Default for SluggishThresholds {
    fn default() -> Self {
        Self {
            rate_fraction: default_sluggish_rate_fraction(),
            percentile_cutoff: default_sluggish_percentile_cutoff(),
            window_hours: default_sluggish_window_hours(),
            fallback_decline_brix_per_day: default_sluggish_fallback_decline(),
        }
    }
}

// ============================================================================
// Stuck Fermentation Thresholds
// ============================================================================

/// Stuck detection: near-zero Brix movement sustained for a minimum
/// wall-clock duration (not a sample count; sampling is irregular).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct StuckThresholds {
    /// Minimum sustained flat span before declaring stuck (hours)
    #[serde(default = "default_stuck_min_duration_hours")]
    pub min_duration_hours: f64,

    /// |Brix rate| below this counts as no movement (°Bx/day)
    #[serde(default = "default_stuck_rate_epsilon")]
    pub rate_epsilon_brix_per_day: f64,
}

fn default_stuck_min_duration_hours() -> f64 { 48.0 }
fn default_stuck_rate_epsilon() -> f64 { 0.1 }

impl Default for StuckThresholds {
    fn default() -> Self {
        Self {
            min_duration_hours: default_stuck_min_duration_hours(),
            rate_epsilon_brix_per_day: default_stuck_rate_epsilon(),
        }
    }
}

// ============================================================================
// Temperature Thresholds
// ============================================================================

/// Absolute must-temperature band for one wine color (°C).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TemperatureBand {
    pub min_c: f64,
    pub max_c: f64,
}

/// Rule-based temperature bands, independent of historical data.
///
/// Within `tolerance_margin_c` outside the band the excursion is HIGH;
/// beyond the margin it is CRITICAL.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TemperatureThresholds {
    #[serde(default = "default_red_band")]
    pub red: TemperatureBand,

    #[serde(default = "default_white_band")]
    pub white: TemperatureBand,

    #[serde(default = "default_rose_band")]
    pub rose: TemperatureBand,

    #[serde(default = "default_tolerance_margin")]
    pub tolerance_margin_c: f64,
}

fn default_red_band() -> TemperatureBand {
    TemperatureBand { min_c: 18.0, max_c: 30.0 }
}
fn default_white_band() -> TemperatureBand {
    TemperatureBand { min_c: 10.0, max_c: 20.0 }
}
fn default_rose_band() -> TemperatureBand {
    TemperatureBand { min_c: 12.0, max_c: 22.0 }
}
fn default_tolerance_margin() -> f64 { 2.0 }

impl TemperatureThresholds {
    pub fn band(&self, color: WineColor) -> TemperatureBand {
        match color {
            WineColor::Red => self.red,
            WineColor::White => self.white,
            WineColor::Rose => self.rose,
        }
    }
}

impl Default for TemperatureThresholds {
    fn default() -> Self {
        Self {
            red: default_red_band(),
            white: default_white_band(),
            rose: default_rose_band(),
            tolerance_margin_c: default_tolerance_margin(),
        }
    }
}

// ============================================================================
// Compound Risk Thresholds
// ============================================================================

/// Nutrient-stress compound rule: a Brix rate below `rate_fraction` of
/// expected combined with a cold must escalates to HIGH, even when
/// neither signal alone would be anomalous. There is deliberately no
/// lower bound on the rate: a deeply sluggish cold lot reports both the
/// progression anomaly and the nutrient-stress cause candidate.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CompoundThresholds {
    /// Decline below this fraction of expected is sluggish-leaning
    #[serde(default = "default_compound_rate_fraction")]
    pub rate_fraction: f64,

    /// Must temperature at or below this is "cold" for the rule (°C)
    #[serde(default = "default_compound_max_temp")]
    pub max_temperature_c: f64,
}

fn default_compound_rate_fraction() -> f64 { 0.8 }
fn default_compound_max_temp() -> f64 { 16.0 }

impl Default for CompoundThresholds {
    fn default() -> Self {
        Self {
            rate_fraction: default_compound_rate_fraction(),
            max_temperature_c: default_compound_max_temp(),
        }
    }
}

// ============================================================================
// Duration Thresholds
// ============================================================================

/// Unusual-duration detection, evaluated near/at completion only.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct DurationThresholds {
    /// Latest Brix at or below this means the lot is near completion (°Bx)
    #[serde(default = "default_completion_brix")]
    pub completion_brix: f64,

    /// Fallback acceptable duration band when no cohort exists (days)
    #[serde(default = "default_duration_fallback_min")]
    pub fallback_min_days: f64,

    #[serde(default = "default_duration_fallback_max")]
    pub fallback_max_days: f64,
}

fn default_completion_brix() -> f64 { 2.0 }
fn default_duration_fallback_min() -> f64 { 5.0 }
fn default_duration_fallback_max() -> f64 { 30.0 }

impl Default for DurationThresholds {
    fn default() -> Self {
        Self {
            completion_brix: default_completion_brix(),
            fallback_min_days: default_duration_fallback_min(),
            fallback_max_days: default_duration_fallback_max(),
        }
    }
}

// ============================================================================
// Recommendation Config
// ============================================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RecommendationConfig {
    /// Maximum recommendations emitted per anomaly
    #[serde(default = "default_top_n")]
    pub top_n: usize,
}

fn default_top_n() -> usize { 3 }

impl Default for RecommendationConfig {
    fn default() -> Self {
        Self { top_n: default_top_n() }
    }
}

// ============================================================================
// Cohort Fetch Config
// ============================================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CohortConfig {
    /// Historical provider timeout; on expiry the cohort degrades to
    /// zero samples instead of failing the analysis (ms)
    #[serde(default = "default_fetch_timeout_ms")]
    pub fetch_timeout_ms: u64,
}

fn default_fetch_timeout_ms() -> u64 { 2_000 }

impl Default for CohortConfig {
    fn default() -> Self {
        Self { fetch_timeout_ms: default_fetch_timeout_ms() }
    }
}

// ============================================================================
// Per-Varietal Overrides
// ============================================================================

/// Optional per-varietal overrides. Any field left unset inherits the
/// engine-wide default for the lot's color.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct VarietalOverrides {
    pub temperature_band: Option<TemperatureBand>,
    pub fallback_decline_brix_per_day: Option<f64>,
    pub compound_max_temperature_c: Option<f64>,
}

// ============================================================================
// Resolved Threshold Profile
// ============================================================================

/// Immutable per-analysis snapshot of every threshold the pipeline needs,
/// resolved for one (varietal, color) pair.
///
/// Fetched once at orchestration start and passed by value through the
/// call tree; detectors never consult shared mutable configuration.
#[derive(Debug, Clone)]
pub struct ThresholdProfile {
    pub varietal: String,
    pub color: WineColor,
    pub confidence: ConfidenceBands,
    pub deviation: DeviationThresholds,
    pub sluggish: SluggishThresholds,
    pub stuck: StuckThresholds,
    pub temperature_band: TemperatureBand,
    pub temperature_tolerance_c: f64,
    pub compound: CompoundThresholds,
    pub duration: DurationThresholds,
    pub recommendation_top_n: usize,
    pub cohort_fetch_timeout_ms: u64,
}

impl ThresholdProfile {
    /// Resolve the engine config for one lot, applying varietal overrides.
    pub fn resolve(config: &EngineConfig, varietal: &str, color: WineColor) -> Self {
        let overrides = config.varietals.get(varietal).copied().unwrap_or_default();

        let mut sluggish = config.sluggish;
        if let Some(rate) = overrides.fallback_decline_brix_per_day {
            sluggish.fallback_decline_brix_per_day = rate;
        }

        let mut compound = config.compound;
        if let Some(max_t) = overrides.compound_max_temperature_c {
            compound.max_temperature_c = max_t;
        }

        Self {
            varietal: varietal.to_string(),
            color,
            confidence: config.confidence,
            deviation: config.deviation,
            sluggish,
            stuck: config.stuck,
            temperature_band: overrides
                .temperature_band
                .unwrap_or_else(|| config.temperature.band(color)),
            temperature_tolerance_c: config.temperature.tolerance_margin_c,
            compound,
            duration: config.duration,
            recommendation_top_n: config.recommendation.top_n,
            cohort_fetch_timeout_ms: config.cohort.fetch_timeout_ms,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
