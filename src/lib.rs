//! Vintel: Fermentation Operational Intelligence
//!
//! Anomaly detection and recommendation engine for active wine
//! fermentations. Compares live cellar measurements against a winery's
//! own historical patterns and suggests interventions.
//!
//! ## Architecture
//!
//! - **Comparison Service**: percentile and z-score positioning against
//!   historical cohorts, with a confidence model that degrades gracefully
//!   on sparse history
//! - **Detectors**: five independent pure checks (sluggish, stuck,
//!   temperature excursion, nutrient stress, unusual duration)
//! - **Aggregator**: mutual-exclusion rules and final ordering
//! - **Recommendation Generator**: effectiveness-ranked actions from a
//!   template library
//! - **Orchestrator**: the end-to-end pipeline and the Analysis lifecycle

pub mod aggregator;
pub mod comparison;
pub mod config;
pub mod detectors;
pub mod error;
pub mod orchestrator;
pub mod providers;
pub mod recommendation;
pub mod storage;
pub mod types;

// Re-export the config surface
pub use config::{EngineConfig, ThresholdProfile};

// Re-export commonly used types
pub use types::{
    Analysis, AnalysisStatus, Anomaly, AnomalyType, ComparisonResult, Confidence,
    ConfidenceLevel, DeviationScore, FermentationSample, FermentationSnapshot,
    HistoricalCohort, Recommendation, RecommendationTemplate, Severity, Signal, WineColor,
};

// Re-export the pipeline entry points
pub use comparison::ComparisonService;
pub use error::EngineError;
pub use orchestrator::AnalysisOrchestrator;
pub use recommendation::{BuiltinTemplateLibrary, RecommendationGenerator};

// Re-export storage
pub use storage::{AnalysisStorage, StorageError};
