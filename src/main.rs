//! VINTEL - Fermentation Operational Intelligence
//!
//! Demo binary: generates a synthetic winery (historical lots plus a
//! handful of in-progress fermentations in various states of trouble),
//! runs the full analysis pipeline over each live lot, and prints the
//! results.
//!
//! # Usage
//!
//! ```bash
//! # Run the demo with defaults
//! cargo run --release
//!
//! # Deterministic data, JSON output, custom thresholds
//! cargo run --release -- --seed 7 --json --config vintel.toml
//! ```
//!
//! # Environment Variables
//!
//! - `VINTEL_CONFIG`: Path to a thresholds TOML file
//! - `RUST_LOG`: Logging level (default: info)

use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use clap::Parser;
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};
use tracing::info;
use uuid::Uuid;

use vintel::providers::{
    CompletedFermentation, InMemoryFermentationSource, InMemoryHistoryProvider, TomlRuleProvider,
};
use vintel::{
    Analysis, AnalysisOrchestrator, AnalysisStorage, BuiltinTemplateLibrary, EngineConfig,
    FermentationSample, FermentationSnapshot, WineColor,
};

#[derive(Parser, Debug)]
#[command(name = "vintel", about = "Fermentation anomaly detection demo")]
struct Args {
    /// Thresholds TOML file (falls back to the standard search order)
    #[arg(long, env = "VINTEL_CONFIG")]
    config: Option<PathBuf>,

    /// Persist analyses to this sled path instead of a temporary database
    #[arg(long)]
    db: Option<PathBuf>,

    /// Number of historical fermentations to synthesize per varietal
    #[arg(long, default_value_t = 24)]
    history: usize,

    /// RNG seed for reproducible demo data
    #[arg(long, default_value_t = 42)]
    seed: u64,

    /// Emit each analysis as pretty-printed JSON
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let config = match &args.config {
        Some(path) => EngineConfig::load_from_file(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => EngineConfig::load(),
    };

    let storage = match &args.db {
        Some(path) => AnalysisStorage::open(path)
            .with_context(|| format!("opening analysis db at {}", path.display()))?,
        None => AnalysisStorage::open_temporary().context("opening temporary analysis db")?,
    };

    let mut rng = StdRng::seed_from_u64(args.seed);
    let winery_id = Uuid::new_v4();
    let history = synth_history(&mut rng, winery_id, args.history)?;
    info!(lots = history.len(), "Synthesized historical fermentations");

    let lots = demo_lots(&mut rng, winery_id)?;
    let lot_ids: Vec<(Uuid, String)> =
        lots.iter().map(|l| (l.id, l.varietal.clone())).collect();

    let orchestrator = AnalysisOrchestrator::new(
        InMemoryFermentationSource::new(lots),
        InMemoryHistoryProvider::new(history),
        TomlRuleProvider::new(config),
        BuiltinTemplateLibrary::new(),
        storage,
    );

    for (fermentation_id, varietal) in lot_ids {
        let analysis = orchestrator
            .analyze(fermentation_id, winery_id)
            .await
            .with_context(|| format!("analyzing lot {fermentation_id}"))?;
        if args.json {
            println!("{}", serde_json::to_string_pretty(&analysis)?);
        } else {
            print_report(&varietal, &analysis);
        }
    }

    Ok(())
}

fn print_report(varietal: &str, analysis: &Analysis) {
    println!("\n=== {} lot {} [{}] ===", varietal, analysis.fermentation_id, analysis.status);
    if let Some(err) = &analysis.error {
        println!("  error: {err}");
        return;
    }
    if analysis.anomalies.is_empty() {
        println!("  no anomalies");
    }
    for a in &analysis.anomalies {
        println!(
            "  [{}] {} ({} confidence, {} samples): {}",
            a.severity, a.anomaly_type, a.confidence.level, a.confidence.sample_count, a.description
        );
    }
    for r in &analysis.recommendations {
        println!(
            "    -> [{}] ({:.0}% success, {} confidence) {}",
            r.category,
            r.expected_success_rate * 100.0,
            r.confidence.level,
            r.action
        );
    }
    if !analysis.degraded_signals.is_empty() {
        let names: Vec<&str> = analysis.degraded_signals.iter().map(|s| s.as_str()).collect();
        println!("  degraded signals: {}", names.join(", "));
    }
}

/// Past Syrah lots with plausible spread in duration, speed, and temp.
fn synth_history(
    rng: &mut StdRng,
    winery_id: Uuid,
    count: usize,
) -> Result<Vec<CompletedFermentation>> {
    let duration = Normal::<f64>::new(12.0, 2.5)?;
    let rate = Normal::<f64>::new(2.0, 0.4)?;
    let temp = Normal::<f64>::new(24.0, 1.5)?;

    Ok((0..count)
        .map(|i| {
            let lot_rate: f64 = rate.sample(rng).clamp(0.8, 3.5);
            // Slow start, vigorous middle, tapering tail
            let curve: Vec<f64> = [0.4, 0.9, 1.1, 1.1, 1.0, 0.9, 0.8, 0.6, 0.4, 0.3]
                .iter()
                .map(|shape| shape * lot_rate)
                .collect();
            CompletedFermentation {
                winery_id,
                varietal: "Syrah".to_string(),
                completed_at: Utc::now() - Duration::days(30 + i as i64),
                duration_days: duration.sample(rng).clamp(6.0, 25.0),
                brix_decline_per_day: lot_rate,
                mean_temperature_c: temp.sample(rng).clamp(18.0, 29.0),
                brix_decline_by_day: curve,
            }
        })
        .collect())
}

/// Four Syrah lots (healthy, sluggish, stuck, overheating) plus one
/// Chardonnay with no cohort history, to show fallback behavior.
fn demo_lots(rng: &mut StdRng, winery_id: Uuid) -> Result<Vec<FermentationSnapshot>> {
    let start = Utc::now() - Duration::days(4);
    Ok(vec![
        lot(rng, winery_id, "Syrah", WineColor::Red, start, &|day| (24.0 - 2.0 * day, 25.0))?,
        lot(rng, winery_id, "Syrah", WineColor::Red, start, &|day| {
            // Healthy for two days, then the rate collapses
            let brix = if day <= 2.0 { 24.0 - 2.0 * day } else { 20.0 - 0.3 * (day - 2.0) };
            (brix, 24.0)
        })?,
        lot(rng, winery_id, "Syrah", WineColor::Red, start, &|day| {
            // Drops to 12 °Bx then holds flat
            ((24.0 - 6.0 * day).max(12.0), 23.0)
        })?,
        lot(rng, winery_id, "Syrah", WineColor::Red, start, &|day| {
            // Runaway exotherm: crosses the 30 °C red ceiling on day 3
            (24.0 - 2.2 * day, 24.0 + 3.0 * day)
        })?,
        lot(rng, winery_id, "Chardonnay", WineColor::White, start, &|day| {
            // Cold and lagging with zero cohort history
            (23.0 - 1.0 * day, 14.5)
        })?,
    ])
}

fn lot(
    rng: &mut StdRng,
    winery_id: Uuid,
    varietal: &str,
    color: WineColor,
    started_at: DateTime<Utc>,
    curve: &dyn Fn(f64) -> (f64, f64),
) -> Result<FermentationSnapshot> {
    let brix_noise = Normal::<f64>::new(0.0, 0.02)?;
    let temp_noise = Normal::<f64>::new(0.0, 0.2)?;

    // Two manual readings per day over four days
    let samples: Vec<FermentationSample> = (0..=8)
        .map(|i| {
            let day = i as f64 * 0.5;
            let (brix, temp) = curve(day);
            FermentationSample {
                recorded_at: started_at + Duration::hours(i * 12),
                brix: Some(brix + brix_noise.sample(rng)),
                temperature_c: Some(temp + temp_noise.sample(rng)),
                ph: None,
            }
        })
        .collect();

    Ok(FermentationSnapshot {
        id: Uuid::new_v4(),
        winery_id,
        varietal: varietal.to_string(),
        color,
        started_at,
        target_completion_brix: 2.0,
        samples,
    })
}
