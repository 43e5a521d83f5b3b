//! Strategy contract and reference strategies.
//!
//! A strategy decides how new money is split across instruments and what
//! orders to place on scheduled rebalance dates. Strategies that also react
//! to market signals between scheduled dates expose that through
//! [`Strategy::as_triggered`]; the engine checks for the capability, never
//! for a concrete type.

pub mod dual_signal;
pub mod fixed;
pub mod relative_strength;
pub mod signals;
pub mod target;
pub mod trend_filter;
pub mod trigger;

use crate::domain::error::SipsimError;
use crate::domain::frequency::Frequency;
use crate::domain::price::MarketView;
use crate::domain::transaction::Holdings;
use chrono::NaiveDate;
use std::collections::BTreeMap;

pub use dual_signal::DualSignal;
pub use fixed::FixedAllocation;
pub use relative_strength::RelativeStrength;
pub use signals::{Regime, RegimeMapping};
pub use target::target_orders;
pub use trend_filter::TrendFilter;
pub use trigger::{Signal, TriggerConfig, TriggerState};

/// Instrument → cash amount to invest.
pub type Allocation = BTreeMap<String, f64>;

/// A signed cash order: positive buys, negative sells.
#[derive(Debug, Clone, PartialEq)]
pub struct Order {
    pub instrument: String,
    pub amount: f64,
}

impl Order {
    pub fn new(instrument: impl Into<String>, amount: f64) -> Self {
        Self {
            instrument: instrument.into(),
            amount,
        }
    }

    pub fn is_buy(&self) -> bool {
        self.amount > 0.0
    }
}

pub trait Strategy {
    fn name(&self) -> &str;

    /// Every instrument whose prices the strategy reads, traded or not.
    fn instruments(&self) -> Vec<String>;

    /// Cadence of scheduled rebalances.
    fn frequency(&self) -> Frequency;

    /// Split `amount` of new money across instruments. Used for the initial
    /// investment and for every recurring contribution.
    fn initial_allocation(
        &self,
        amount: f64,
        market: MarketView<'_>,
    ) -> Result<Allocation, SipsimError>;

    fn scheduled_rebalance(
        &mut self,
        holdings: &Holdings,
        market: MarketView<'_>,
    ) -> Result<Vec<Order>, SipsimError>;

    /// Contribution to invest on `date` given the configured base amount.
    fn contribution_amount(&mut self, _date: NaiveDate, base: f64) -> f64 {
        base
    }

    /// The off-schedule rebalance capability, if this strategy has it.
    fn as_triggered(&mut self) -> Option<&mut dyn TriggeredRebalance> {
        None
    }
}

/// Signal-driven rebalancing between scheduled dates.
pub trait TriggeredRebalance {
    /// `Some(orders)` when a trigger fired on the view date.
    fn triggered_rebalance(
        &mut self,
        holdings: &Holdings,
        market: MarketView<'_>,
    ) -> Result<Option<Vec<Order>>, SipsimError>;

    fn trigger_count(&self) -> usize;
}

/// Split `amount` between a value and a momentum instrument.
pub(crate) fn two_way_split(
    value: &str,
    momentum: &str,
    momentum_weight: f64,
    amount: f64,
) -> Allocation {
    Allocation::from([
        (value.to_string(), amount * (1.0 - momentum_weight)),
        (momentum.to_string(), amount * momentum_weight),
    ])
}

pub(crate) fn two_way_weights(value: &str, momentum: &str, momentum_weight: f64) -> Allocation {
    two_way_split(value, momentum, momentum_weight, 1.0)
}
