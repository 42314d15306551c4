//! Recommendation and template types

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{AnomalyType, Confidence, Severity};

/// Broad intervention class, used for cellar-floor routing.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum RecommendationCategory {
    /// Nutrient, enzyme, or yeast additions
    Additive,
    /// Tank temperature adjustments
    Temperature,
    /// Process changes (pump-overs, rousing, restart protocols)
    Process,
    /// Increased sampling or lab work
    Monitoring,
}

impl std::fmt::Display for RecommendationCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RecommendationCategory::Additive => write!(f, "additive"),
            RecommendationCategory::Temperature => write!(f, "temperature"),
            RecommendationCategory::Process => write!(f, "process"),
            RecommendationCategory::Monitoring => write!(f, "monitoring"),
        }
    }
}

/// Pre-authored intervention bound to an (anomaly type, severity) pair.
///
/// Owned by configuration collaborators and read-only here. The
/// effectiveness score is a snapshot recomputed asynchronously by an
/// external collaborator and never updated on the analysis path.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecommendationTemplate {
    pub id: Uuid,
    pub anomaly_type: AnomalyType,
    pub severity: Severity,
    pub action_text: String,
    pub category: RecommendationCategory,
    /// Historical success fraction in [0, 1]
    pub effectiveness_score: f64,
    /// Number of past applications behind the effectiveness score
    pub effectiveness_sample_count: usize,
}

/// Ranked action emitted for one anomaly.
///
/// Created only by the recommendation generator; references the template
/// it was instantiated from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Recommendation {
    pub action: String,
    pub category: RecommendationCategory,
    /// min(anomaly confidence, confidence from the template's sample size)
    pub confidence: Confidence,
    pub expected_success_rate: f64,
    pub reasoning: String,
    pub source_template_id: Uuid,
}
