//! Continuous value/momentum tilt from multi-horizon relative strength.

use crate::domain::error::SipsimError;
use crate::domain::frequency::Frequency;
use crate::domain::price::MarketView;
use crate::domain::strategy::signals::{Horizon, default_horizons, relative_strength_weight};
use crate::domain::strategy::trigger::{TriggerConfig, TriggerState};
use crate::domain::strategy::{
    Allocation, Order, Strategy, TriggeredRebalance, target_orders, two_way_split,
    two_way_weights,
};
use crate::domain::transaction::Holdings;
use tracing::info;

pub const DEFAULT_SIGNAL_THRESHOLD: f64 = 0.05;

#[derive(Debug, Clone)]
pub struct RelativeStrengthParams {
    pub value: String,
    pub momentum: String,
    pub horizons: Vec<Horizon>,
    pub sensitivity: f64,
    pub min_weight: f64,
    pub max_weight: f64,
    pub frequency: Frequency,
    pub min_order_amount: f64,
}

impl RelativeStrengthParams {
    pub fn new(value: impl Into<String>, momentum: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            momentum: momentum.into(),
            horizons: default_horizons(),
            sensitivity: 1.0,
            min_weight: 0.2,
            max_weight: 0.8,
            frequency: Frequency::Monthly,
            min_order_amount: 1.0,
        }
    }
}

/// Momentum weight = clip(0.5 + sensitivity × edge, min, max), where edge
/// is the weighted momentum-minus-value return over the horizons.
#[derive(Debug, Clone)]
pub struct RelativeStrength {
    name: String,
    params: RelativeStrengthParams,
    trigger: TriggerState<f64>,
}

impl RelativeStrength {
    pub fn new(
        name: impl Into<String>,
        params: RelativeStrengthParams,
        trigger: TriggerConfig,
    ) -> Self {
        Self {
            name: name.into(),
            params,
            trigger: TriggerState::new(trigger),
        }
    }

    pub fn momentum_weight(&self, market: MarketView<'_>) -> f64 {
        let p = &self.params;
        relative_strength_weight(market, &p.momentum, &p.value, &p.horizons, p.sensitivity)
            .clamp(p.min_weight, p.max_weight)
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

impl Strategy for RelativeStrength {
    fn name(&self) -> &str {
        &self.name
    }

    fn instruments(&self) -> Vec<String> {
        vec![self.params.value.clone(), self.params.momentum.clone()]
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
        let weight = self.momentum_weight(market);
        let orders = self.rebalance_orders(holdings, market, weight)?;
        self.trigger.record(weight);
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

impl TriggeredRebalance for RelativeStrength {
    fn triggered_rebalance(
        &mut self,
        holdings: &Holdings,
        market: MarketView<'_>,
    ) -> Result<Option<Vec<Order>>, SipsimError> {
        let weight = self.momentum_weight(market);
        if !self.trigger.check(market.date(), weight) {
            return Ok(None);
        }
        info!(strategy = %self.name, date = %market.date(), weight, "relative strength trigger");
        self.rebalance_orders(holdings, market, weight).map(Some)
    }

    fn trigger_count(&self) -> usize {
        self.trigger.count()
    }
}
