//! Cohort construction from completed fermentation records
//!
//! [`CohortBuilder`] turns a set of past fermentations into the
//! per-signal [`HistoricalCohort`] statistics the comparison service
//! consumes. [`InMemoryHistoryProvider`] wraps it behind the provider
//! trait for tests and the demo binary; production deployments implement
//! [`HistoricalPatternProvider`] against their own warehouse.
//!
//! Signal units follow the comparison service: Brix cohorts are built in
//! decline-rate units (°Bx/day), temperature in °C, duration in days.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use statrs::statistics::{Data, Distribution, OrderStatistics};
use uuid::Uuid;

use super::HistoricalPatternProvider;
use crate::error::EngineError;
use crate::types::{HistoricalCohort, PercentileTable, Signal};

/// One finished fermentation, reduced to the aggregates cohorts need.
#[derive(Debug, Clone)]
pub struct CompletedFermentation {
    pub winery_id: Uuid,
    pub varietal: String,
    pub completed_at: DateTime<Utc>,
    pub duration_days: f64,
    /// Mean Brix decline over the active phase (°Bx/day, positive)
    pub brix_decline_per_day: f64,
    pub mean_temperature_c: f64,
    /// Decline rate per elapsed day (index 0 = day 0); may be empty
    pub brix_decline_by_day: Vec<f64>,
}

pub struct CohortBuilder;

impl CohortBuilder {
    /// Build one signal's cohort from completed records. Fewer than one
    /// record yields the empty cohort, never an error.
    pub fn build(records: &[CompletedFermentation], signal: Signal) -> HistoricalCohort {
        let values: Vec<f64> = records
            .iter()
            .filter_map(|r| match signal {
                Signal::Brix => Some(r.brix_decline_per_day),
                Signal::Temperature => Some(r.mean_temperature_c),
                Signal::DurationDays => Some(r.duration_days),
                Signal::Ph => None,
            })
            .filter(|v| v.is_finite())
            .collect();

        if values.is_empty() {
            return HistoricalCohort::empty(signal);
        }

        let sample_count = values.len();
        let mut data = Data::new(values);
        let mean = data.mean().unwrap_or(0.0);
        let std_dev = data.std_dev().unwrap_or(0.0);
        let percentiles = PercentileTable {
            p10: data.percentile(10),
            p25: data.percentile(25),
            p50: data.percentile(50),
            p75: data.percentile(75),
            p90: data.percentile(90),
        };

        let expected_by_day = match signal {
            Signal::Brix => Self::mean_curve(records),
            _ => Vec::new(),
        };

        HistoricalCohort { signal, sample_count, mean, std_dev, percentiles, expected_by_day }
    }

    /// Element-wise mean of the per-day decline curves, over however many
    /// records reach each day.
    fn mean_curve(records: &[CompletedFermentation]) -> Vec<f64> {
        let longest = records.iter().map(|r| r.brix_decline_by_day.len()).max().unwrap_or(0);
        (0..longest)
            .map(|day| {
                let at_day: Vec<f64> = records
                    .iter()
                    .filter_map(|r| r.brix_decline_by_day.get(day).copied())
                    .collect();
                at_day.iter().sum::<f64>() / at_day.len().max(1) as f64
            })
            .collect()
    }
}

/// Provider over an in-memory record set.
#[derive(Default)]
pub struct InMemoryHistoryProvider {
    records: Vec<CompletedFermentation>,
}

impl InMemoryHistoryProvider {
    pub fn new(records: Vec<CompletedFermentation>) -> Self {
        Self { records }
    }

    /// A provider that knows nothing: every cohort comes back empty.
    pub fn empty() -> Self {
        Self::default()
    }
}

#[async_trait]
impl HistoricalPatternProvider for InMemoryHistoryProvider {
    async fn get_cohort(
        &self,
        winery_id: Uuid,
        varietal: &str,
        signal: Signal,
        as_of: DateTime<Utc>,
    ) -> Result<HistoricalCohort, EngineError> {
        let matching: Vec<CompletedFermentation> = self
            .records
            .iter()
            .filter(|r| {
                r.winery_id == winery_id
                    && r.varietal.eq_ignore_ascii_case(varietal)
                    && r.completed_at <= as_of
            })
            .cloned()
            .collect();
        Ok(CohortBuilder::build(&matching, signal))
    }
}
