//! Built-in recommendation template library
//!
//! Ships one curated template set covering every (anomaly type, severity)
//! pair the detectors can produce. Production deployments replace this
//! with a database-backed [`TemplateRepository`]; the built-in set keeps
//! the demo binary and tests self-contained.
//!
//! Effectiveness scores and sample counts here are seed values; the real
//! numbers are recomputed offline from outcome tracking and served as
//! snapshots.

use uuid::Uuid;

use crate::providers::TemplateRepository;
use crate::types::{
    AnomalyType, RecommendationCategory, RecommendationTemplate, Severity,
};

pub struct BuiltinTemplateLibrary {
    templates: Vec<RecommendationTemplate>,
}

impl BuiltinTemplateLibrary {
    pub fn new() -> Self {
        Self { templates: seed_templates() }
    }
}

impl Default for BuiltinTemplateLibrary {
    fn default() -> Self {
        Self::new()
    }
}

impl TemplateRepository for BuiltinTemplateLibrary {
    fn get_templates(
        &self,
        anomaly_type: AnomalyType,
        severity: Severity,
    ) -> Vec<RecommendationTemplate> {
        self.templates
            .iter()
            .filter(|t| t.anomaly_type == anomaly_type && t.severity == severity)
            .cloned()
            .collect()
    }
}

fn template(
    anomaly_type: AnomalyType,
    severity: Severity,
    category: RecommendationCategory,
    action_text: &str,
    effectiveness_score: f64,
    effectiveness_sample_count: usize,
) -> RecommendationTemplate {
    RecommendationTemplate {
        id: Uuid::new_v4(),
        anomaly_type,
        severity,
        action_text: action_text.to_string(),
        category,
        effectiveness_score,
        effectiveness_sample_count,
    }
}

fn seed_templates() -> Vec<RecommendationTemplate> {
    use AnomalyType::*;
    use RecommendationCategory::*;
    use Severity::*;

    vec![
        // Sluggish, medium
        template(Sluggish, Medium, Monitoring,
            "Increase sampling to twice daily and run a YAN panel on the next pull", 0.72, 41),
        template(Sluggish, Medium, Temperature,
            "Raise tank setpoint by 2 °C over the next 12 hours to re-energize the yeast", 0.68, 56),
        template(Sluggish, Medium, Process,
            "Add a pump-over or rousing cycle to resuspend yeast and release CO2", 0.61, 38),
        // Sluggish, high
        template(Sluggish, High, Additive,
            "Add complex yeast nutrient (Fermaid-type) at label rate; avoid straight DAP late in fermentation", 0.77, 63),
        template(Sluggish, High, Temperature,
            "Warm the must gradually toward the top of the varietal band; avoid swings over 3 °C/day", 0.70, 49),
        template(Sluggish, High, Monitoring,
            "Run a full lab panel (YAN, VA, residual sugar) before any addition", 0.64, 33),
        // Stuck, critical
        template(Stuck, Critical, Process,
            "Begin a restart protocol: build a rehydrated high-tolerance yeast starter (EC-1118 class) and incorporate the stuck wine stepwise", 0.81, 72),
        template(Stuck, Critical, Additive,
            "Add yeast hulls to adsorb inhibitory fatty acids before any restart attempt", 0.66, 47),
        template(Stuck, Critical, Temperature,
            "Bring the must to 20-24 °C and hold stable before reinoculation", 0.63, 51),
        template(Stuck, Critical, Monitoring,
            "Check VA and residual sugar immediately; escalate to the winemaker if VA exceeds house limits", 0.59, 29),
        // TemperatureExcursion, high
        template(TemperatureExcursion, High, Temperature,
            "Adjust the glycol setpoint to bring the must back inside the varietal band within 6 hours", 0.83, 88),
        template(TemperatureExcursion, High, Monitoring,
            "Verify the tank probe against a handheld thermometer before acting on the reading", 0.57, 26),
        // TemperatureExcursion, critical
        template(TemperatureExcursion, Critical, Temperature,
            "Apply maximum cooling/heating immediately and confirm jacket circulation; an excursion this size stresses the yeast within hours", 0.85, 67),
        template(TemperatureExcursion, Critical, Process,
            "If the jacket cannot recover the band, transfer the lot to a conditioned tank", 0.71, 23),
        template(TemperatureExcursion, Critical, Monitoring,
            "Log readings hourly until the must re-enters the band", 0.54, 31),
        // NutrientStress, high
        template(NutrientStress, High, Additive,
            "Add organic nitrogen (complex nutrient) now; a cold, lagging ferment responds poorly to DAP alone", 0.74, 44),
        template(NutrientStress, High, Temperature,
            "Raise the must above the cold threshold before the yeast population declines further", 0.69, 39),
        template(NutrientStress, High, Monitoring,
            "Confirm with a YAN measurement; treat below 150 mg N/L as depleted", 0.62, 27),
        // UnusualDuration, medium
        template(UnusualDuration, Medium, Monitoring,
            "Run a completion panel (residual sugar, VA, free SO2) and record the deviation for cohort review", 0.60, 35),
        template(UnusualDuration, Medium, Process,
            "Taste and schedule pressing; an atypical duration alone does not block the next step", 0.55, 22),
        // UnusualDuration, high
        template(UnusualDuration, High, Monitoring,
            "Hold the lot for sensory and microbial review before pressing; flag for the winemaker", 0.67, 31),
        template(UnusualDuration, High, Process,
            "Review the lot's temperature and addition history to locate the cause before blending decisions", 0.58, 19),
    ]
}
