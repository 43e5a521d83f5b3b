//! Value/momentum split driven by a moving-average regime on a reference
//! instrument.

use crate::domain::error::SipsimError;
use crate::domain::frequency::Frequency;
use crate::domain::price::MarketView;
use crate::domain::strategy::signals::{Regime, RegimeMapping, sma_regime};
use crate::domain::strategy::trigger::{TriggerConfig, TriggerState};
use crate::domain::strategy::{
    Allocation, Order, Strategy, TriggeredRebalance, target_orders, two_way_split,
    two_way_weights,
};
use crate::domain::transaction::Holdings;
use tracing::info;

#[derive(Debug, Clone)]
pub struct TrendFilterParams {
    pub value: String,
    pub momentum: String,
    /// Priced for the regime signal, never traded.
    pub reference: String,
    pub ma_window: usize,
    pub risk_on_weight: f64,
    pub risk_off_weight: f64,
    pub mapping: RegimeMapping,
    pub frequency: Frequency,
    pub min_order_amount: f64,
}

impl TrendFilterParams {
    pub fn new(
        value: impl Into<String>,
        momentum: impl Into<String>,
        reference: impl Into<String>,
    ) -> Self {
        Self {
            value: value.into(),
            momentum: momentum.into(),
            reference: reference.into(),
            ma_window: 200,
            risk_on_weight: 0.7,
            risk_off_weight: 0.3,
            mapping: RegimeMapping::Direct,
            frequency: Frequency::Monthly,
            min_order_amount: 1.0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct TrendFilter {
    name: String,
    params: TrendFilterParams,
    trigger: TriggerState<Regime>,
}

impl TrendFilter {
    pub fn new(name: impl Into<String>, params: TrendFilterParams, trigger: TriggerConfig) -> Self {
        Self {
            name: name.into(),
            params,
            trigger: TriggerState::new(trigger),
        }
    }

    pub fn params(&self) -> &TrendFilterParams {
        &self.params
    }

    pub fn regime(&self, market: MarketView<'_>) -> Regime {
        sma_regime(market.history(&self.params.reference), self.params.ma_window)
    }

    pub fn momentum_weight(&self, market: MarketView<'_>) -> f64 {
        let p = &self.params;
        p.mapping
            .momentum_weight(self.regime(market), p.risk_on_weight, p.risk_off_weight)
    }

    fn rebalance_orders(
        &self,
        holdings: &Holdings,
        market: MarketView<'_>,
    ) -> Result<Vec<Order>, SipsimError> {
        let p = &self.params;
        let weights = two_way_weights(&p.value, &p.momentum, self.momentum_weight(market));
        target_orders(holdings, market, &weights, p.min_order_amount)
    }
}

impl Strategy for TrendFilter {
    fn name(&self) -> &str {
        &self.name
    }

    fn instruments(&self) -> Vec<String> {
        vec![
            self.params.value.clone(),
            self.params.momentum.clone(),
            self.params.reference.clone(),
        ]
    }

    fn frequency(&self) -> Frequency {
        self.params.frequency
    }

    fn initial_allocation(
        &self,
        amount: f64,
        market: MarketView<'_>,
    ) -> Result<Allocation, SipsimError> {
        let p = &self.params;
        Ok(two_way_split(
            &p.value,
            &p.momentum,
            self.momentum_weight(market),
            amount,
        ))
    }

    fn scheduled_rebalance(
        &mut self,
        holdings: &Holdings,
        market: MarketView<'_>,
    ) -> Result<Vec<Order>, SipsimError> {
        let orders = self.rebalance_orders(holdings, market)?;
        self.trigger.record(self.regime(market));
        Ok(orders)
    }

    fn as_triggered(&mut self) -> Option<&mut dyn TriggeredRebalance> {
        if self.trigger.is_enabled() {
            Some(self)
        } else {
            None
        }
    }
}

impl TriggeredRebalance for TrendFilter {
    fn triggered_rebalance(
        &mut self,
        holdings: &Holdings,
        market: MarketView<'_>,
    ) -> Result<Option<Vec<Order>>, SipsimError> {
        let regime = self.regime(market);
        if !self.trigger.check(market.date(), regime) {
            return Ok(None);
        }
        info!(strategy = %self.name, date = %market.date(), %regime, "regime change trigger");
        self.rebalance_orders(holdings, market).map(Some)
    }

    fn trigger_count(&self) -> usize {
        self.trigger.count()
    }
}
