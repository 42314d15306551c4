//! Analysis Orchestrator - runs the pipeline end to end for one lot
//!
//! Owns the Analysis lifecycle: PENDING → IN_PROGRESS → COMPLETED or
//! ERROR, terminal exactly once. The flow per invocation:
//!
//! 1. Fetch the fermentation snapshot (tenant-scoped by the source)
//! 2. Resolve an immutable threshold profile for the lot
//! 3. Fetch one cohort per tracked signal, concurrently, each under a
//!    timeout; a slow or failing provider degrades that signal to an
//!    empty cohort instead of failing the analysis
//! 4. Build the shared comparison set, run every detector, aggregate
//! 5. Generate recommendations and persist the completed analysis
//!
//! Error policy matches the engine taxonomy: only a structurally
//! invalid snapshot produces an ERROR analysis; unknown fermentations
//! and persistence faults surface as `Err` to the caller; everything
//! else degrades.
//!
//! Analyses for different lots may run concurrently; serializing repeat
//! runs on the same lot is the caller's job.

use std::collections::HashMap;
use std::time::Duration;

use chrono::Utc;
use futures::future::join_all;
use tracing::{info, warn};
use uuid::Uuid;

use crate::aggregator;
use crate::comparison::ComparisonService;
use crate::detectors::{self, DetectionContext};
use crate::error::EngineError;
use crate::providers::{
    AnalysisSink, FermentationSource, HistoricalPatternProvider, RuleConfigProvider,
    TemplateRepository,
};
use crate::recommendation::RecommendationGenerator;
use crate::types::{Analysis, FermentationSnapshot, HistoricalCohort, Signal};

pub struct AnalysisOrchestrator<F, H, R, T, S>
where
    F: FermentationSource,
    H: HistoricalPatternProvider,
    R: RuleConfigProvider,
    T: TemplateRepository,
    S: AnalysisSink,
{
    fermentations: F,
    history: H,
    rules: R,
    templates: T,
    sink: S,
}

impl<F, H, R, T, S> AnalysisOrchestrator<F, H, R, T, S>
where
    F: FermentationSource,
    H: HistoricalPatternProvider,
    R: RuleConfigProvider,
    T: TemplateRepository,
    S: AnalysisSink,
{
    pub fn new(fermentations: F, history: H, rules: R, templates: T, sink: S) -> Self {
        Self { fermentations, history, rules, templates, sink }
    }

    /// Analyze one fermentation. Returns the persisted Analysis; its
    /// status tells the caller whether the run completed or errored on
    /// malformed input.
    pub async fn analyze(
        &self,
        fermentation_id: Uuid,
        winery_id: Uuid,
    ) -> Result<Analysis, EngineError> {
        let mut analysis = Analysis::new(fermentation_id, winery_id);
        analysis.begin()?;

        let snapshot = self
            .fermentations
            .get_fermentation_with_samples(fermentation_id, winery_id)
            .await?;

        if let Err(fault) = validate_snapshot(&snapshot) {
            warn!(%fermentation_id, error = %fault, "Analysis aborted on malformed input");
            analysis.fail(fault.to_string())?;
            self.sink.save(&analysis).await?;
            return Ok(analysis);
        }

        let profile = self.rules.thresholds(&snapshot.varietal, snapshot.color);

        let cohorts = self.fetch_cohorts(&snapshot, profile.cohort_fetch_timeout_ms).await;
        let comparisons = ComparisonService::build_set(&snapshot, &cohorts, &profile);

        let ctx = DetectionContext {
            snapshot: &snapshot,
            comparisons: &comparisons,
            profile: &profile,
            detected_at: Utc::now(),
        };
        let anomalies = aggregator::aggregate(detectors::run_all(&ctx));
        let recommendations =
            RecommendationGenerator::generate(&anomalies, &self.templates, &profile);

        info!(
            %fermentation_id,
            varietal = %snapshot.varietal,
            anomalies = anomalies.len(),
            recommendations = recommendations.len(),
            degraded = comparisons.degraded_signals.len(),
            "Analysis completed"
        );

        analysis.complete(anomalies, recommendations, comparisons.degraded_signals)?;
        self.sink.save(&analysis).await?;
        Ok(analysis)
    }

    /// One cohort per tracked signal, fetched concurrently. A timeout or
    /// provider error degrades that signal to the empty cohort.
    async fn fetch_cohorts(
        &self,
        snapshot: &FermentationSnapshot,
        timeout_ms: u64,
    ) -> HashMap<Signal, HistoricalCohort> {
        let as_of = Utc::now();
        let fetches = Signal::TRACKED.iter().map(|&signal| {
            let history = &self.history;
            async move {
                let fetched = tokio::time::timeout(
                    Duration::from_millis(timeout_ms),
                    history.get_cohort(snapshot.winery_id, &snapshot.varietal, signal, as_of),
                )
                .await;
                let cohort = match fetched {
                    Ok(Ok(cohort)) => cohort,
                    Ok(Err(e)) => {
                        warn!(%signal, error = %e, "Cohort fetch failed, degrading to empty");
                        HistoricalCohort::empty(signal)
                    }
                    Err(_) => {
                        warn!(%signal, timeout_ms, "Cohort fetch timed out, degrading to empty");
                        HistoricalCohort::empty(signal)
                    }
                };
                (signal, cohort)
            }
        });

        join_all(fetches).await.into_iter().collect()
    }
}

/// A snapshot no meaningful comparison can be built from.
fn validate_snapshot(snapshot: &FermentationSnapshot) -> Result<(), EngineError> {
    if snapshot.samples.is_empty() {
        return Err(EngineError::MalformedInput(
            "fermentation has no measurements".to_string(),
        ));
    }
    if snapshot.series(Signal::Brix).len() < 2 {
        return Err(EngineError::MalformedInput(
            "fermentation needs at least two Brix measurements".to_string(),
        ));
    }
    if snapshot.series(Signal::Temperature).is_empty() {
        return Err(EngineError::MalformedInput(
            "fermentation has no temperature measurements".to_string(),
        ));
    }
    if snapshot.samples.windows(2).any(|w| w[1].recorded_at < w[0].recorded_at) {
        return Err(EngineError::MalformedInput(
            "samples are not ordered by time".to_string(),
        ));
    }
    Ok(())
}
