//! End-to-end pipeline tests through the orchestrator.

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use uuid::Uuid;

use vintel::providers::{
    CompletedFermentation, HistoricalPatternProvider, InMemoryFermentationSource,
    InMemoryHistoryProvider, TomlRuleProvider,
};
use vintel::types::{PercentileTable, TrendDirection};
use vintel::{
    Analysis, AnalysisOrchestrator, AnalysisStatus, AnalysisStorage, AnomalyType,
    BuiltinTemplateLibrary, ComparisonService, ConfidenceLevel, EngineConfig, EngineError,
    FermentationSample, FermentationSnapshot, HistoricalCohort, Severity, Signal,
    ThresholdProfile, WineColor,
};

fn start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 9, 1, 0, 0, 0).unwrap()
}

/// Snapshot from (hour, brix, temp) triples.
fn snapshot(varietal: &str, color: WineColor, points: &[(i64, f64, f64)]) -> FermentationSnapshot {
    FermentationSnapshot {
        id: Uuid::new_v4(),
        winery_id: Uuid::new_v4(),
        varietal: varietal.to_string(),
        color,
        started_at: start(),
        target_completion_brix: 2.0,
        samples: points
            .iter()
            .map(|&(h, brix, temp)| FermentationSample {
                recorded_at: start() + Duration::hours(h),
                brix: Some(brix),
                temperature_c: Some(temp),
                ph: None,
            })
            .collect(),
    }
}

fn history(winery_id: Uuid, varietal: &str, count: usize, temp: f64) -> Vec<CompletedFermentation> {
    (0..count)
        .map(|i| {
            let spread = i as f64 / count.max(1) as f64; // 0..1
            CompletedFermentation {
                winery_id,
                varietal: varietal.to_string(),
                completed_at: start() - Duration::days(60 + i as i64),
                duration_days: 8.0 + spread * 8.0,
                brix_decline_per_day: 1.2 + spread * 1.6,
                mean_temperature_c: temp,
                brix_decline_by_day: vec![2.0; 12],
            }
        })
        .collect()
}

type DemoOrchestrator = AnalysisOrchestrator<
    InMemoryFermentationSource,
    InMemoryHistoryProvider,
    TomlRuleProvider,
    BuiltinTemplateLibrary,
    AnalysisStorage,
>;

fn orchestrator(
    snapshots: Vec<FermentationSnapshot>,
    records: Vec<CompletedFermentation>,
) -> (DemoOrchestrator, AnalysisStorage) {
    let storage = AnalysisStorage::open_temporary().expect("temp db");
    let orch = AnalysisOrchestrator::new(
        InMemoryFermentationSource::new(snapshots),
        InMemoryHistoryProvider::new(records),
        TomlRuleProvider::new(EngineConfig::default()),
        BuiltinTemplateLibrary::new(),
        storage.clone(),
    );
    (orch, storage)
}

fn sluggish_points() -> Vec<(i64, f64, f64)> {
    // Healthy 2 °Bx/day for two days, then the rate collapses to 0.3
    vec![
        (0, 24.0, 25.0),
        (12, 23.0, 25.0),
        (24, 22.0, 25.0),
        (36, 21.0, 25.0),
        (48, 20.0, 25.0),
        (60, 19.85, 25.0),
        (72, 19.7, 25.0),
        (84, 19.55, 25.0),
        (96, 19.4, 25.0),
    ]
}

fn stuck_points() -> Vec<(i64, f64, f64)> {
    // Fast drop to 12 °Bx, then dead flat for 60 hours
    vec![
        (0, 24.0, 23.0),
        (12, 21.0, 23.0),
        (24, 18.0, 23.0),
        (36, 15.0, 23.0),
        (48, 12.0, 23.0),
        (60, 12.0, 23.0),
        (72, 12.0, 23.0),
        (84, 12.0, 23.0),
        (96, 12.0, 23.0),
        (108, 12.0, 23.0),
    ]
}

// --- Scenario A: extreme low value against a known cohort -------------------

#[test]
fn extreme_value_is_clamped_and_flagged() {
    let profile = ThresholdProfile::resolve(&EngineConfig::default(), "Syrah", WineColor::Red);
    let cohort = HistoricalCohort {
        signal: Signal::Brix,
        sample_count: 25,
        mean: 10.0,
        std_dev: 2.0,
        percentiles: PercentileTable { p10: 7.5, p25: 8.7, p50: 10.0, p75: 11.3, p90: 12.5 },
        expected_by_day: vec![10.0; 10],
    };

    let entry =
        ComparisonService::compare(Signal::Brix, 4.0, TrendDirection::Falling, 2.0, &cohort, &profile);
    assert!((entry.deviation.z_score - (-3.0)).abs() < 1e-9);
    assert!(entry.deviation.is_critical());
    assert!(entry.comparison.extreme);
    // Rank clamps to the lowest known percentile rather than extrapolating
    assert!((entry.comparison.percentile_rank - 10.0).abs() < 1e-9);
}

// --- Scenario B: tiny cohort caps confidence at LOW -------------------------

#[tokio::test]
async fn three_record_cohort_yields_low_confidence() {
    let snap = snapshot("Syrah", WineColor::Red, &sluggish_points());
    let (fid, wid) = (snap.id, snap.winery_id);
    let (orch, _) = orchestrator(vec![snap], history(wid, "Syrah", 3, 24.0));

    let analysis = orch.analyze(fid, wid).await.expect("analysis");
    assert_eq!(analysis.status, AnalysisStatus::Completed);
    assert!(!analysis.anomalies.is_empty());
    for anomaly in &analysis.anomalies {
        assert_eq!(anomaly.confidence.level, ConfidenceLevel::Low);
    }
}

// --- Scenario C: out-of-range rule ignores a hot cohort ---------------------

#[tokio::test]
async fn temperature_rule_fires_even_when_the_cohort_ran_hot() {
    let points: Vec<(i64, f64, f64)> =
        (0..=8).map(|i| (i * 12, 24.0 - 1.1 * i as f64, 35.0)).collect();
    let snap = snapshot("Syrah", WineColor::Red, &points);
    let (fid, wid) = (snap.id, snap.winery_id);
    // Every historical lot also ran at 35 °C
    let (orch, _) = orchestrator(vec![snap], history(wid, "Syrah", 20, 35.0));

    let analysis = orch.analyze(fid, wid).await.expect("analysis");
    let temp_anomalies: Vec<_> = analysis
        .anomalies
        .iter()
        .filter(|a| a.anomaly_type == AnomalyType::TemperatureExcursion)
        .collect();
    assert_eq!(temp_anomalies.len(), 1);
    assert_eq!(temp_anomalies[0].severity, Severity::Critical);
}

// --- Scenario D: zero history completes on fallbacks ------------------------

#[tokio::test]
async fn zero_history_completes_with_low_confidence_anomalies() {
    // Same stuck Brix profile, at a temperature inside the white band
    let points: Vec<(i64, f64, f64)> =
        stuck_points().iter().map(|&(h, brix, _)| (h, brix, 15.0)).collect();
    let snap = snapshot("Riesling", WineColor::White, &points);
    let (fid, wid) = (snap.id, snap.winery_id);
    let (orch, _) = orchestrator(vec![snap], Vec::new());

    let analysis = orch.analyze(fid, wid).await.expect("analysis");
    assert_eq!(analysis.status, AnalysisStatus::Completed);
    assert!(!analysis.anomalies.is_empty(), "stuck lot should still be flagged");
    for anomaly in &analysis.anomalies {
        assert_eq!(anomaly.confidence.level, ConfidenceLevel::Low);
        assert_eq!(anomaly.confidence.sample_count, 0);
    }
    for signal in Signal::TRACKED {
        assert!(analysis.degraded_signals.contains(&signal));
    }
}

// --- Scenario E: stalled dominates slow --------------------------------------

#[tokio::test]
async fn stuck_lot_yields_one_critical_and_no_sluggish() {
    let snap = snapshot("Syrah", WineColor::Red, &stuck_points());
    let (fid, wid) = (snap.id, snap.winery_id);
    let (orch, _) = orchestrator(vec![snap], history(wid, "Syrah", 20, 24.0));

    let analysis = orch.analyze(fid, wid).await.expect("analysis");
    let stuck: Vec<_> = analysis
        .anomalies
        .iter()
        .filter(|a| a.anomaly_type == AnomalyType::Stuck)
        .collect();
    assert_eq!(stuck.len(), 1);
    assert_eq!(stuck[0].severity, Severity::Critical);
    assert!(
        !analysis
            .anomalies
            .iter()
            .any(|a| a.anomaly_type == AnomalyType::Sluggish && a.signal == Signal::Brix),
        "sluggish must be suppressed by stuck on the same signal"
    );
}

// --- Cross-cutting properties -------------------------------------------------

#[tokio::test]
async fn analysis_is_idempotent_modulo_ids_and_timestamps() {
    let snap = snapshot("Syrah", WineColor::Red, &sluggish_points());
    let (fid, wid) = (snap.id, snap.winery_id);
    let (orch, _) = orchestrator(vec![snap], history(wid, "Syrah", 20, 24.0));

    let first = orch.analyze(fid, wid).await.expect("first run");
    let second = orch.analyze(fid, wid).await.expect("second run");

    assert_ne!(first.id, second.id, "re-analysis must be a fresh Analysis");

    let key = |a: &Analysis| -> Vec<(AnomalyType, Severity, Signal)> {
        a.anomalies.iter().map(|x| (x.anomaly_type, x.severity, x.signal)).collect()
    };
    assert_eq!(key(&first), key(&second));

    let recs = |a: &Analysis| -> Vec<(String, String)> {
        a.recommendations
            .iter()
            .map(|r| (r.action.clone(), format!("{:.3}", r.expected_success_rate)))
            .collect()
    };
    assert_eq!(recs(&first), recs(&second));
}

#[tokio::test]
async fn recommendations_are_capped_and_ranked() {
    let snap = snapshot("Syrah", WineColor::Red, &stuck_points());
    let (fid, wid) = (snap.id, snap.winery_id);
    let (orch, _) = orchestrator(vec![snap], history(wid, "Syrah", 20, 24.0));

    let analysis = orch.analyze(fid, wid).await.expect("analysis");
    assert!(!analysis.recommendations.is_empty());
    assert!(analysis.recommendations.len() <= analysis.anomalies.len() * 3);

    // Within each anomaly's block, success rates are non-increasing
    for block in analysis.recommendations.chunks(3) {
        for pair in block.windows(2) {
            if pair[0].reasoning == pair[1].reasoning {
                assert!(pair[0].expected_success_rate >= pair[1].expected_success_rate);
            }
        }
    }
}

#[tokio::test]
async fn completed_analyses_are_persisted() {
    let snap = snapshot("Syrah", WineColor::Red, &sluggish_points());
    let (fid, wid) = (snap.id, snap.winery_id);
    let (orch, storage) = orchestrator(vec![snap], history(wid, "Syrah", 20, 24.0));

    let analysis = orch.analyze(fid, wid).await.expect("analysis");
    let loaded = storage.latest_for_fermentation(fid).expect("persisted");
    assert_eq!(loaded.id, analysis.id);
    assert_eq!(loaded.status, AnalysisStatus::Completed);
    assert_eq!(loaded.anomalies.len(), analysis.anomalies.len());
}

#[tokio::test]
async fn healthy_lot_completes_with_zero_anomalies() {
    let points: Vec<(i64, f64, f64)> =
        (0..=8).map(|i| (i * 12, 24.0 - i as f64, 25.0)).collect();
    let snap = snapshot("Syrah", WineColor::Red, &points);
    let (fid, wid) = (snap.id, snap.winery_id);
    let (orch, _) = orchestrator(vec![snap], history(wid, "Syrah", 20, 24.0));

    let analysis = orch.analyze(fid, wid).await.expect("analysis");
    assert_eq!(analysis.status, AnalysisStatus::Completed);
    assert!(analysis.anomalies.is_empty());
    assert!(analysis.recommendations.is_empty());
}

// --- Provider timeout degrades instead of failing -----------------------------

struct SlowProvider;

#[async_trait]
impl HistoricalPatternProvider for SlowProvider {
    async fn get_cohort(
        &self,
        _winery_id: Uuid,
        _varietal: &str,
        signal: Signal,
        _as_of: DateTime<Utc>,
    ) -> Result<HistoricalCohort, EngineError> {
        tokio::time::sleep(std::time::Duration::from_millis(500)).await;
        Ok(HistoricalCohort::empty(signal))
    }
}

#[tokio::test]
async fn slow_history_provider_degrades_to_empty_cohorts() {
    let snap = snapshot("Syrah", WineColor::Red, &sluggish_points());
    let (fid, wid) = (snap.id, snap.winery_id);

    let mut config = EngineConfig::default();
    config.cohort.fetch_timeout_ms = 25;

    let orch = AnalysisOrchestrator::new(
        InMemoryFermentationSource::new(vec![snap]),
        SlowProvider,
        TomlRuleProvider::new(config),
        BuiltinTemplateLibrary::new(),
        AnalysisStorage::open_temporary().expect("temp db"),
    );

    let analysis = orch.analyze(fid, wid).await.expect("analysis");
    assert_eq!(analysis.status, AnalysisStatus::Completed);
    for signal in Signal::TRACKED {
        assert!(analysis.degraded_signals.contains(&signal));
    }
}
