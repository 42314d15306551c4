//! Collaborator seams consumed by the orchestrator
//!
//! The engine owns none of its inputs: fermentation data, historical
//! cohorts, threshold rules, and templates all arrive through these
//! traits. Data-access traits are async (network or database behind
//! them); rule and template lookups are sync snapshot reads.
//!
//! Tenant scoping happens behind [`FermentationSource`]: by the time a
//! snapshot reaches the engine it already belongs to the requesting
//! winery.

pub mod history;
pub mod rules;

pub use history::{CohortBuilder, CompletedFermentation, InMemoryHistoryProvider};
pub use rules::TomlRuleProvider;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::config::ThresholdProfile;
use crate::error::EngineError;
use crate::types::{
    Analysis, AnomalyType, FermentationSnapshot, HistoricalCohort, RecommendationTemplate,
    Severity, Signal, WineColor,
};

/// Fermentation data access, tenant-scoped by the implementor.
#[async_trait]
pub trait FermentationSource: Send + Sync {
    async fn get_fermentation_with_samples(
        &self,
        fermentation_id: Uuid,
        winery_id: Uuid,
    ) -> Result<FermentationSnapshot, EngineError>;
}

/// Historical pattern provider.
///
/// Contract: no history for the cohort key returns a cohort with
/// `sample_count = 0`, never an error. Errors are reserved for the
/// provider itself being unreachable; the orchestrator degrades those to
/// an empty cohort as well.
#[async_trait]
pub trait HistoricalPatternProvider: Send + Sync {
    async fn get_cohort(
        &self,
        winery_id: Uuid,
        varietal: &str,
        signal: Signal,
        as_of: DateTime<Utc>,
    ) -> Result<HistoricalCohort, EngineError>;
}

/// Threshold rules, resolved to an immutable per-analysis snapshot.
pub trait RuleConfigProvider: Send + Sync {
    fn thresholds(&self, varietal: &str, color: WineColor) -> ThresholdProfile;
}

/// Recommendation template lookup by (anomaly type, severity).
pub trait TemplateRepository: Send + Sync {
    fn get_templates(
        &self,
        anomaly_type: AnomalyType,
        severity: Severity,
    ) -> Vec<RecommendationTemplate>;
}

/// Persistence for completed analyses. The engine calls `save` once per
/// analysis and does not retry failures.
#[async_trait]
pub trait AnalysisSink: Send + Sync {
    async fn save(&self, analysis: &Analysis) -> Result<(), EngineError>;
}

#[async_trait]
impl AnalysisSink for crate::storage::AnalysisStorage {
    async fn save(&self, analysis: &Analysis) -> Result<(), EngineError> {
        self.store(analysis)?;
        Ok(())
    }
}

/// Fermentation source over a fixed in-memory set (tests, demo binary).
#[derive(Default)]
pub struct InMemoryFermentationSource {
    snapshots: Vec<FermentationSnapshot>,
}

impl InMemoryFermentationSource {
    pub fn new(snapshots: Vec<FermentationSnapshot>) -> Self {
        Self { snapshots }
    }
}

#[async_trait]
impl FermentationSource for InMemoryFermentationSource {
    async fn get_fermentation_with_samples(
        &self,
        fermentation_id: Uuid,
        winery_id: Uuid,
    ) -> Result<FermentationSnapshot, EngineError> {
        self.snapshots
            .iter()
            .find(|s| s.id == fermentation_id && s.winery_id == winery_id)
            .cloned()
            .ok_or(EngineError::FermentationNotFound { fermentation_id, winery_id })
    }
}
