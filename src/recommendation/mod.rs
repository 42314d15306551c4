//! Recommendation Generator - maps anomalies to ranked actions
//!
//! For each anomaly, in aggregator order: look up templates for the
//! (type, severity) pair, rank by historical effectiveness, emit the top
//! N. A recommendation's confidence can never exceed the confidence of
//! the anomaly it addresses, and a template backed by few outcomes drags
//! it down further: confidence = min(anomaly, template sample size).
//!
//! No matching template means zero recommendations for that anomaly;
//! logged, never an error.

pub mod library;

pub use library::BuiltinTemplateLibrary;

use std::cmp::Ordering;

use tracing::debug;

use crate::comparison::ComparisonService;
use crate::config::ThresholdProfile;
use crate::providers::TemplateRepository;
use crate::types::{Anomaly, Recommendation};

pub struct RecommendationGenerator;

impl RecommendationGenerator {
    /// Generate ranked recommendations for an already-aggregated anomaly
    /// list. Output preserves the anomaly order; within one anomaly
    /// recommendations are sorted by expected success rate descending.
    pub fn generate(
        anomalies: &[Anomaly],
        templates: &dyn TemplateRepository,
        profile: &ThresholdProfile,
    ) -> Vec<Recommendation> {
        anomalies
            .iter()
            .flat_map(|anomaly| Self::for_anomaly(anomaly, templates, profile))
            .collect()
    }

    fn for_anomaly(
        anomaly: &Anomaly,
        templates: &dyn TemplateRepository,
        profile: &ThresholdProfile,
    ) -> Vec<Recommendation> {
        let mut candidates = templates.get_templates(anomaly.anomaly_type, anomaly.severity);
        if candidates.is_empty() {
            debug!(
                anomaly = %anomaly.anomaly_type,
                severity = %anomaly.severity,
                "No templates for anomaly, emitting none"
            );
            return Vec::new();
        }

        candidates.sort_by(|a, b| {
            b.effectiveness_score
                .partial_cmp(&a.effectiveness_score)
                .unwrap_or(Ordering::Equal)
        });

        candidates
            .into_iter()
            .take(profile.recommendation_top_n)
            .map(|template| {
                let template_confidence =
                    ComparisonService::confidence(template.effectiveness_sample_count, profile);
                Recommendation {
                    action: template.action_text,
                    category: template.category,
                    confidence: anomaly.confidence.min(template_confidence),
                    expected_success_rate: template.effectiveness_score,
                    reasoning: format!(
                        "{} ({} severity): {}",
                        anomaly.anomaly_type, anomaly.severity, anomaly.description
                    ),
                    source_template_id: template.id,
                }
            })
            .collect()
    }
}
