//! Trend regime and relative strength combined.
//!
//! When both signals agree the relative-strength weight is used as-is
//! (bounded); when they disagree the split goes back to 50/50.

use crate::domain::error::SipsimError;
use crate::domain::frequency::Frequency;
use crate::domain::price::MarketView;
use crate::domain::strategy::signals::{
    Horizon, Regime, default_horizons, relative_strength_weight, sma_regime,
};
use crate::domain::strategy::trigger::{TriggerConfig, TriggerState};
use crate::domain::strategy::{
    Allocation, Order, Strategy, TriggeredRebalance, target_orders, two_way_split,
    two_way_weights,
};
use crate::domain::transaction::Holdings;
use tracing::info;

#[derive(Debug, Clone)]
pub struct DualSignalParams {
    pub value: String,
    pub momentum: String,
    pub reference: String,
    pub ma_window: usize,
    pub horizons: Vec<Horizon>,
    pub sensitivity: f64,
    pub min_weight: f64,
    pub max_weight: f64,
    pub frequency: Frequency,
    pub min_order_amount: f64,
}

impl DualSignalParams {
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
            horizons: default_horizons(),
            sensitivity: 1.0,
            min_weight: 0.2,
            max_weight: 0.8,
            frequency: Frequency::Monthly,
            min_order_amount: 1.0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct DualSignal {
    name: String,
    params: DualSignalParams,
    trigger: TriggerState<(Regime, f64)>,
}

impl DualSignal {
    pub fn new(name: impl Into<String>, params: DualSignalParams, trigger: TriggerConfig) -> Self {
        Self {
            name: name.into(),
            params,
            trigger: TriggerState::new(trigger),
        }
    }

    /// Current (regime, unclipped relative-strength weight).
    pub fn signal(&self, market: MarketView<'_>) -> (Regime, f64) {
        let p = &self.params;
        (
            sma_regime(market.history(&p.reference), p.ma_window),
            relative_strength_weight(market, &p.momentum, &p.value, &p.horizons, p.sensitivity),
        )
    }

    pub fn momentum_weight(&self, market: MarketView<'_>) -> f64 {
        let (regime, rs) = self.signal(market);
        self.combine(regime, rs)
    }

    fn combine(&self, regime: Regime, rs: f64) -> f64 {
        let p = &self.params;
        let weight = match regime {
            Regime::RiskOn if rs >= 0.5 => rs.min(p.max_weight),
            Regime::RiskOff if rs < 0.5 => rs.max(p.min_weight),
            _ => 0.5,
        };
        weight.clamp(p.min_weight, p.max_weight)
    }

    fn rebalance_orders(
        &self,
        holdings: &Holdings,
        market: MarketView<'_>,
        momentum_weight: f64,
    ) -> Result<Vec<Order>, SipsimError> {
        let p = &self.params;
        let weights = two_way_weights(&p.value, &p.momentum, momentum_weight);
        target_orders(holdings, market, &weights, p.min_order_amount)
    }
}

impl Strategy for DualSignal {
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
        let signal = self.signal(market);
        let orders = self.rebalance_orders(holdings, market, self.combine(signal.0, signal.1))?;
        self.trigger.record(signal);
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

impl TriggeredRebalance for DualSignal {
    fn triggered_rebalance(
        &mut self,
        holdings: &Holdings,
        market: MarketView<'_>,
    ) -> Result<Option<Vec<Order>>, SipsimError> {
        let (regime, rs) = self.signal(market);
        if !self.trigger.check(market.date(), (regime, rs)) {
            return Ok(None);
        }
        info!(
            strategy = %self.name,
            date = %market.date(),
            %regime,
            rs,
            "dual signal trigger"
        );
        self.rebalance_orders(holdings, market, self.combine(regime, rs))
            .map(Some)
    }

    fn trigger_count(&self) -> usize {
        self.trigger.count()
    }
}
