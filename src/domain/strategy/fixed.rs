//! Fixed target weights with optional annual contribution step-up.

use crate::domain::error::SipsimError;
use crate::domain::frequency::Frequency;
use crate::domain::price::MarketView;
use crate::domain::strategy::{Allocation, Order, Strategy, target_orders};
use crate::domain::transaction::Holdings;
use chrono::{Datelike, NaiveDate};

/// Buy-and-hold when the frequency is `never`, otherwise a hard rebalance
/// back to the target weights on every scheduled date.
#[derive(Debug, Clone)]
pub struct FixedAllocation {
    name: String,
    weights: Allocation,
    frequency: Frequency,
    step_up_pct: f64,
    min_order_amount: f64,
    first_contribution_year: Option<i32>,
}

impl FixedAllocation {
    /// Weights are normalized to sum to one.
    pub fn new(
        name: impl Into<String>,
        weights: Allocation,
        frequency: Frequency,
    ) -> Result<Self, SipsimError> {
        if weights.is_empty() {
            return Err(SipsimError::config_invalid(
                "strategy",
                "instruments",
                "at least one instrument is required",
            ));
        }
        if let Some((instrument, w)) = weights.iter().find(|(_, w)| !w.is_finite() || **w < 0.0) {
            return Err(SipsimError::config_invalid(
                "strategy",
                "weights",
                format!("weight {w} for {instrument} must be non-negative"),
            ));
        }
        let total: f64 = weights.values().sum();
        if total <= 0.0 {
            return Err(SipsimError::config_invalid(
                "strategy",
                "weights",
                "weights must not all be zero",
            ));
        }

        Ok(Self {
            name: name.into(),
            weights: weights.into_iter().map(|(k, w)| (k, w / total)).collect(),
            frequency,
            step_up_pct: 0.0,
            min_order_amount: 1.0,
            first_contribution_year: None,
        })
    }

    /// Equal weight across `instruments`.
    pub fn equal_weight(
        name: impl Into<String>,
        instruments: &[String],
        frequency: Frequency,
    ) -> Result<Self, SipsimError> {
        let weights = instruments.iter().map(|i| (i.clone(), 1.0)).collect();
        Self::new(name, weights, frequency)
    }

    /// Grow contributions by `pct` per calendar year.
    pub fn with_step_up(mut self, pct: f64) -> Self {
        self.step_up_pct = pct;
        self
    }

    pub fn with_min_order_amount(mut self, amount: f64) -> Self {
        self.min_order_amount = amount;
        self
    }

    pub fn weights(&self) -> &Allocation {
        &self.weights
    }
}

impl Strategy for FixedAllocation {
    fn name(&self) -> &str {
        &self.name
    }

    fn instruments(&self) -> Vec<String> {
        self.weights.keys().cloned().collect()
    }

    fn frequency(&self) -> Frequency {
        self.frequency
    }

    fn initial_allocation(
        &self,
        amount: f64,
        _market: MarketView<'_>,
    ) -> Result<Allocation, SipsimError> {
        Ok(self
            .weights
            .iter()
            .map(|(k, w)| (k.clone(), amount * w))
            .collect())
    }

    fn scheduled_rebalance(
        &mut self,
        holdings: &Holdings,
        market: MarketView<'_>,
    ) -> Result<Vec<Order>, SipsimError> {
        target_orders(holdings, market, &self.weights, self.min_order_amount)
    }

    fn contribution_amount(&mut self, date: NaiveDate, base: f64) -> f64 {
        if self.step_up_pct == 0.0 {
            return base;
        }
        let first = *self.first_contribution_year.get_or_insert(date.year());
        let years = date.year() - first;
        base * (1.0 + self.step_up_pct).powi(years)
    }
}
