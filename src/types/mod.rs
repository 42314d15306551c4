//! Shared data structures for the fermentation intelligence pipeline
//!
//! This module defines the core types for the analysis pipeline:
//! - FermentationSnapshot / FermentationSample (measurement input)
//! - HistoricalCohort, ComparisonResult, DeviationScore (comparison layer)
//! - Anomaly, Severity, Confidence (detector outputs)
//! - Recommendation, RecommendationTemplate (advisory layer)
//! - Analysis (aggregate root with its status state machine)

mod fermentation;
mod comparison;
mod analysis;
mod recommendation;

pub use fermentation::*;
pub use comparison::*;
pub use analysis::*;
pub use recommendation::*;
