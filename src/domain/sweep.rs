//! Parameter sweeps: one independent run per parameter value.
//!
//! Each run builds its own strategy and ledger; only the price data is
//! shared, read-only, across worker threads.

use crate::domain::error::SipsimError;
use crate::domain::metrics::{MetricName, MetricValue};
use crate::domain::price::Market;
use crate::domain::simulation::{self, SimulationConfig, SimulationResult};
use crate::domain::strategy::Strategy;
use rayon::prelude::*;
use tracing::info;

/// Result of the run for one parameter value.
#[derive(Debug, Clone)]
pub struct SweepRun {
    pub value: String,
    pub result: SimulationResult,
}

pub struct ParamSweep<'a> {
    config: &'a SimulationConfig,
    market: &'a Market,
    parallel: bool,
}

impl<'a> ParamSweep<'a> {
    pub fn new(config: &'a SimulationConfig, market: &'a Market) -> Self {
        Self {
            config,
            market,
            parallel: true,
        }
    }

    pub fn with_parallelism(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    /// Run once per value. `build` turns a value into a fresh strategy.
    /// The first failing run aborts the sweep.
    pub fn sweep<F>(&self, values: &[String], build: F) -> Result<SweepResults, SipsimError>
    where
        F: Fn(&str) -> Result<Box<dyn Strategy>, SipsimError> + Sync,
    {
        let run_one = |value: &String| -> Result<SweepRun, SipsimError> {
            let mut strategy = build(value.as_str())?;
            let result = simulation::run(self.config, self.market, strategy.as_mut())?;
            info!(value = %value, final_value = result.final_value, "sweep run complete");
            Ok(SweepRun {
                value: value.clone(),
                result,
            })
        };

        let runs = if self.parallel {
            values.par_iter().map(run_one).collect::<Result<Vec<_>, _>>()?
        } else {
            values.iter().map(run_one).collect::<Result<Vec<_>, _>>()?
        };
        Ok(SweepResults { runs })
    }
}

/// Sweep runs in input order.
#[derive(Debug, Clone)]
pub struct SweepResults {
    runs: Vec<SweepRun>,
}

impl SweepResults {
    pub fn all(&self) -> &[SweepRun] {
        &self.runs
    }

    pub fn len(&self) -> usize {
        self.runs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.runs.is_empty()
    }

    pub fn get(&self, value: &str) -> Option<&SweepRun> {
        self.runs.iter().find(|r| r.value == value)
    }

    /// Runs ranked by `metric`, best first. Undefined values sort last.
    pub fn ranked_by(&self, metric: MetricName) -> Vec<&SweepRun> {
        let score = |r: &SweepRun| match r.result.metrics.get(metric) {
            Some(MetricValue::Value(v)) if v.is_finite() => v,
            _ => f64::NEG_INFINITY,
        };
        let mut ranked: Vec<_> = self.runs.iter().collect();
        ranked.sort_by(|a, b| score(b).total_cmp(&score(a)));
        ranked
    }
}
