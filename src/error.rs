//! Engine error taxonomy
//!
//! Propagation policy: detector- and template-local faults are swallowed
//! and degrade the result; data-source faults degrade confidence instead
//! of aborting; only structurally invalid input fails a whole analysis.

use thiserror::Error;
use uuid::Uuid;

use crate::storage::StorageError;
use crate::types::{AnomalyType, InvalidTransition, Severity};

#[derive(Debug, Error)]
pub enum EngineError {
    /// Missing or invalid thresholds. Fatal to one detector only
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Historical provider unreachable or timed out. Degrades to a
    /// zero-sample cohort, never propagates out of the orchestrator.
    /// Constructed by provider implementations, not by the engine itself.
    #[error("data unavailable from {provider}: {reason}")]
    DataUnavailable { provider: String, reason: String },

    /// Fermentation snapshot missing required signals. Fatal to the
    /// whole analysis
    #[error("malformed fermentation input: {0}")]
    MalformedInput(String),

    /// No template matched; the recommendation is simply omitted.
    /// Part of the [`TemplateRepository`](crate::providers::TemplateRepository)
    /// contract for fallible backends; the built-in library never raises it.
    #[error("no template for anomaly {anomaly_type} at severity {severity}")]
    TemplateNotFound {
        anomaly_type: AnomalyType,
        severity: Severity,
    },

    #[error("fermentation {fermentation_id} not found for winery {winery_id}")]
    FermentationNotFound {
        fermentation_id: Uuid,
        winery_id: Uuid,
    },

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error(transparent)]
    InvalidState(#[from] InvalidTransition),
}
