#![allow(dead_code)]

use chrono::{Days, NaiveDate};
use sipsim::domain::error::SipsimError;
use sipsim::domain::metrics::MetricsConfig;
use sipsim::domain::price::{Market, PricePoint, PriceSeries};
use sipsim::domain::simulation::{ContributionPlan, SimulationConfig};
use sipsim::domain::frequency::Frequency;
use sipsim::ports::data_port::PriceSeriesPort;
use std::collections::HashMap;
use std::fs;
use std::path::Path;

pub struct MockPricePort {
    pub data: HashMap<String, Vec<PricePoint>>,
    pub errors: HashMap<String, String>,
}

impl MockPricePort {
    pub fn new() -> Self {
        Self {
            data: HashMap::new(),
            errors: HashMap::new(),
        }
    }

    pub fn with_points(mut self, instrument: &str, points: Vec<PricePoint>) -> Self {
        self.data.insert(instrument.to_string(), points);
        self
    }

    pub fn with_error(mut self, instrument: &str, reason: &str) -> Self {
        self.errors.insert(instrument.to_string(), reason.to_string());
        self
    }
}

impl PriceSeriesPort for MockPricePort {
    fn get_prices(&self, instrument: &str) -> Result<PriceSeries, SipsimError> {
        if let Some(reason) = self.errors.get(instrument) {
            return Err(SipsimError::InvalidPriceData {
                instrument: instrument.to_string(),
                reason: reason.clone(),
            });
        }
        PriceSeries::from_points(
            instrument,
            self.data.get(instrument).cloned().unwrap_or_default(),
        )
    }

    fn list_instruments(&self) -> Result<Vec<String>, SipsimError> {
        let mut names: Vec<String> = self.data.keys().cloned().collect();
        names.sort();
        Ok(names)
    }
}

pub fn d(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
}

/// One observation per consecutive calendar day from `start`.
pub fn daily_points(start: &str, prices: &[f64]) -> Vec<PricePoint> {
    let start = d(start);
    prices
        .iter()
        .enumerate()
        .map(|(i, &p)| PricePoint::new(start + Days::new(i as u64), p))
        .collect()
}

pub fn daily_series(name: &str, start: &str, prices: &[f64]) -> PriceSeries {
    PriceSeries::from_points(name, daily_points(start, prices)).unwrap()
}

pub fn series(name: &str, points: &[(&str, f64)]) -> PriceSeries {
    PriceSeries::from_points(
        name,
        points.iter().map(|&(dt, p)| PricePoint::new(d(dt), p)).collect(),
    )
    .unwrap()
}

pub fn market(series: Vec<PriceSeries>) -> Market {
    Market::new(series)
}

pub fn sim_config(start: &str, end: &str, initial: f64) -> SimulationConfig {
    SimulationConfig {
        start_date: d(start),
        end_date: d(end),
        initial_investment: initial,
        contribution: None,
        metrics: MetricsConfig::default(),
    }
}

pub fn with_contribution(
    mut config: SimulationConfig,
    amount: f64,
    frequency: Frequency,
) -> SimulationConfig {
    config.contribution = Some(ContributionPlan { amount, frequency });
    config
}

/// Write `<dir>/<instrument>.csv` with a `date,price` header.
pub fn write_price_csv(dir: &Path, instrument: &str, points: &[PricePoint]) {
    let mut content = String::from("date,price\n");
    for p in points {
        content.push_str(&format!("{},{}\n", p.date.format("%Y-%m-%d"), p.price));
    }
    fs::write(dir.join(format!("{instrument}.csv")), content).unwrap();
}
