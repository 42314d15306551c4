//! Anomaly and Analysis aggregate types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{Confidence, DeviationScore, Recommendation, Signal};

// ============================================================================
// Anomaly
// ============================================================================

/// Anomaly classes the engine can detect, one per detector.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum AnomalyType {
    /// Fermentation progressing markedly slower than the cohort
    Sluggish,
    /// Near-zero Brix movement sustained long enough to risk spoilage
    Stuck,
    /// Must temperature outside the absolute band for the wine color
    TemperatureExcursion,
    /// Compound rule: sluggish-leaning Brix rate plus low temperature
    NutrientStress,
    /// Total elapsed time outside the cohort's duration band
    UnusualDuration,
}

impl AnomalyType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnomalyType::Sluggish => "sluggish",
            AnomalyType::Stuck => "stuck",
            AnomalyType::TemperatureExcursion => "temperature_excursion",
            AnomalyType::NutrientStress => "nutrient_stress",
            AnomalyType::UnusualDuration => "unusual_duration",
        }
    }
}

impl std::fmt::Display for AnomalyType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Business-impact tier of an anomaly, independent of confidence.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum Severity {
    #[default]
    Low = 1,
    Medium = 2,
    High = 3,
    Critical = 4,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Low => write!(f, "LOW"),
            Severity::Medium => write!(f, "MEDIUM"),
            Severity::High => write!(f, "HIGH"),
            Severity::Critical => write!(f, "CRITICAL"),
        }
    }
}

/// One detected problem on one fermentation.
///
/// Created only by a detector or the aggregator; belongs to exactly one
/// Analysis. Its confidence derives solely from the sample count of the
/// comparison that produced it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Anomaly {
    pub anomaly_type: AnomalyType,
    pub severity: Severity,
    /// Signal the anomaly was detected on (Brix for progression anomalies)
    pub signal: Signal,
    pub deviation: DeviationScore,
    pub confidence: Confidence,
    pub description: String,
    pub detected_at: DateTime<Utc>,
}

// ============================================================================
// Analysis aggregate root
// ============================================================================

/// Lifecycle states of one analysis run.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum AnalysisStatus {
    Pending,
    InProgress,
    Completed,
    Error,
}

impl AnalysisStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, AnalysisStatus::Completed | AnalysisStatus::Error)
    }
}

impl std::fmt::Display for AnalysisStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AnalysisStatus::Pending => write!(f, "PENDING"),
            AnalysisStatus::InProgress => write!(f, "IN_PROGRESS"),
            AnalysisStatus::Completed => write!(f, "COMPLETED"),
            AnalysisStatus::Error => write!(f, "ERROR"),
        }
    }
}

/// Attempted transition out of a terminal analysis state.
#[derive(Debug, thiserror::Error)]
#[error("invalid analysis transition: {from} -> {to} (terminal states are immutable)")]
pub struct InvalidTransition {
    pub from: AnalysisStatus,
    pub to: AnalysisStatus,
}

/// One analysis run for one fermentation. The aggregate root.
///
/// Created Pending at orchestration start, transitions to Completed or
/// Error exactly once, then becomes immutable. Re-analysis creates a new
/// Analysis with a new id; it never mutates an old one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Analysis {
    pub id: Uuid,
    pub fermentation_id: Uuid,
    pub winery_id: Uuid,
    pub status: AnalysisStatus,
    pub analyzed_at: DateTime<Utc>,
    pub anomalies: Vec<Anomaly>,
    pub recommendations: Vec<Recommendation>,
    /// Signals whose cohort degraded to zero samples during this run
    #[serde(default)]
    pub degraded_signals: Vec<Signal>,
    /// Failure description when status is Error
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Analysis {
    pub fn new(fermentation_id: Uuid, winery_id: Uuid) -> Self {
        Self {
            id: Uuid::new_v4(),
            fermentation_id,
            winery_id,
            status: AnalysisStatus::Pending,
            analyzed_at: Utc::now(),
            anomalies: Vec::new(),
            recommendations: Vec::new(),
            degraded_signals: Vec::new(),
            error: None,
        }
    }

    fn transition(&mut self, to: AnalysisStatus) -> Result<(), InvalidTransition> {
        if self.status.is_terminal() {
            return Err(InvalidTransition { from: self.status, to });
        }
        self.status = to;
        Ok(())
    }

    /// Pending → InProgress on invocation.
    pub fn begin(&mut self) -> Result<(), InvalidTransition> {
        self.transition(AnalysisStatus::InProgress)
    }

    /// InProgress → Completed with the final anomaly and recommendation
    /// lists. A completed analysis with zero anomalies is a normal success.
    pub fn complete(
        &mut self,
        anomalies: Vec<Anomaly>,
        recommendations: Vec<Recommendation>,
        degraded_signals: Vec<Signal>,
    ) -> Result<(), InvalidTransition> {
        self.transition(AnalysisStatus::Completed)?;
        self.anomalies = anomalies;
        self.recommendations = recommendations;
        self.degraded_signals = degraded_signals;
        self.analyzed_at = Utc::now();
        Ok(())
    }

    /// InProgress → Error on a fault no meaningful comparison can survive.
    pub fn fail(&mut self, reason: impl Into<String>) -> Result<(), InvalidTransition> {
        self.transition(AnalysisStatus::Error)?;
        self.error = Some(reason.into());
        self.analyzed_at = Utc::now();
        Ok(())
    }
}
