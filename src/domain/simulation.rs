//! Day-by-day simulation over the trading calendar.
//!
//! A run moves through `Uninitialized → Seeded → Running → Finalized`.
//! Within each date the contribution is applied first, then either the
//! scheduled rebalance or the trigger check (never both). Any error aborts
//! the whole run.

use crate::domain::calendar::TradingCalendar;
use crate::domain::error::SipsimError;
use crate::domain::frequency::Frequency;
use crate::domain::lot::{LotBook, UNIT_TOLERANCE, round_units};
use crate::domain::metrics::{self, MetricInputs, MetricReport, MetricsConfig, ValuePoint};
use crate::domain::price::{Market, PriceSeries};
use crate::domain::strategy::{Allocation, Order, Strategy};
use crate::domain::transaction::{
    Holdings, RebalanceKind, Transaction, TransactionKind, TransactionLog,
};
use chrono::NaiveDate;
use tracing::{debug, info, warn};

/// Recurring contribution.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ContributionPlan {
    pub amount: f64,
    pub frequency: Frequency,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SimulationConfig {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub initial_investment: f64,
    pub contribution: Option<ContributionPlan>,
    pub metrics: MetricsConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Uninitialized,
    Seeded,
    Running,
    Finalized,
}

impl RunState {
    pub fn as_str(self) -> &'static str {
        match self {
            RunState::Uninitialized => "uninitialized",
            RunState::Seeded => "seeded",
            RunState::Running => "running",
            RunState::Finalized => "finalized",
        }
    }
}

/// One executed rebalance.
#[derive(Debug, Clone, PartialEq)]
pub struct RebalanceEvent {
    pub date: NaiveDate,
    pub kind: RebalanceKind,
    pub order_count: usize,
}

/// Gain on units taken from one lot by a sell.
#[derive(Debug, Clone, PartialEq)]
pub struct RealizedGain {
    pub instrument: String,
    pub acquired: NaiveDate,
    pub sold: NaiveDate,
    pub units: f64,
    pub cost_per_unit: f64,
    pub sale_price: f64,
    pub gain: f64,
    pub holding_days: i64,
}

#[derive(Debug, Clone)]
pub struct SimulationResult {
    pub strategy_name: String,
    /// First calendar date on or after the requested start.
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub metrics: MetricReport,
    pub transactions: TransactionLog,
    pub final_holdings: Holdings,
    /// Initial investment plus contributions.
    pub total_invested: f64,
    pub final_value: f64,
    pub rebalances: Vec<RebalanceEvent>,
    pub realized_gains: Vec<RealizedGain>,
    pub value_series: Vec<ValuePoint>,
    pub trigger_count: usize,
}

impl SimulationResult {
    pub fn rebalance_count(&self, kind: RebalanceKind) -> usize {
        self.rebalances.iter().filter(|e| e.kind == kind).count()
    }

    /// Portfolio value on any date using last-known prices.
    pub fn value_on(&self, date: NaiveDate, market: &Market) -> Result<f64, SipsimError> {
        metrics::portfolio_value(&self.transactions.holdings_as_of(date), market, date)
    }

    pub fn total_realized_gain(&self) -> f64 {
        self.realized_gains.iter().map(|g| g.gain).sum()
    }
}

pub struct Simulation<'a> {
    config: &'a SimulationConfig,
    market: &'a Market,
    strategy: &'a mut dyn Strategy,
    calendar: TradingCalendar,
    state: RunState,
    log: TransactionLog,
    lots: LotBook,
    rebalances: Vec<RebalanceEvent>,
    realized: Vec<RealizedGain>,
}

impl<'a> Simulation<'a> {
    /// Resolve price data and build the calendar. Fails with
    /// `DataUnavailable` if any instrument the strategy reads has no data.
    pub fn new(
        config: &'a SimulationConfig,
        market: &'a Market,
        strategy: &'a mut dyn Strategy,
    ) -> Result<Self, SipsimError> {
        let (start, end) = (config.start_date, config.end_date);
        let series = strategy
            .instruments()
            .iter()
            .map(|i| market.require(i, start, end))
            .collect::<Result<Vec<&PriceSeries>, _>>()?;
        let calendar = TradingCalendar::build(&series, start, end)?;

        Ok(Self {
            config,
            market,
            strategy,
            calendar,
            state: RunState::Uninitialized,
            log: TransactionLog::new(),
            lots: LotBook::new(),
            rebalances: Vec::new(),
            realized: Vec::new(),
        })
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn calendar(&self) -> &TradingCalendar {
        &self.calendar
    }

    pub fn log(&self) -> &TransactionLog {
        &self.log
    }

    fn expect_state(&self, expected: RunState) -> Result<(), SipsimError> {
        if self.state != expected {
            return Err(SipsimError::InvalidRunState {
                expected: expected.as_str(),
                actual: self.state.as_str(),
            });
        }
        Ok(())
    }

    /// Invest the lump sum on the first calendar date.
    pub fn seed(&mut self) -> Result<(), SipsimError> {
        self.expect_state(RunState::Uninitialized)?;
        let date = self.calendar.effective_start();
        if self.config.initial_investment > 0.0 {
            let allocation = self
                .strategy
                .initial_allocation(self.config.initial_investment, self.market.view(date))?;
            self.invest(date, &allocation, TransactionKind::InitialInvestment)?;
        }
        self.state = RunState::Seeded;
        info!(
            strategy = self.strategy.name(),
            %date,
            amount = self.config.initial_investment,
            "seeded"
        );
        Ok(())
    }

    /// Process every calendar date in order.
    pub fn run_to_end(&mut self) -> Result<(), SipsimError> {
        self.expect_state(RunState::Seeded)?;
        self.state = RunState::Running;
        let dates: Vec<_> = self.calendar.with_previous().collect();
        for (previous, date) in dates {
            self.step(previous, date)?;
        }
        Ok(())
    }

    fn step(&mut self, previous: Option<NaiveDate>, date: NaiveDate) -> Result<(), SipsimError> {
        if let Some(plan) = self.config.contribution {
            if plan.amount > 0.0 && plan.frequency.is_due(date, previous) {
                let amount = self.strategy.contribution_amount(date, plan.amount);
                if amount > 0.0 {
                    let allocation = self.strategy.initial_allocation(amount, self.market.view(date))?;
                    self.invest(date, &allocation, TransactionKind::Contribution)?;
                    debug!(%date, amount, "contribution applied");
                }
            }
        }

        let market = self.market;
        let view = market.view(date);
        if self.strategy.frequency().is_due(date, previous) {
            let holdings = self.log.holdings();
            let orders = self.strategy.scheduled_rebalance(&holdings, view)?;
            self.apply_rebalance(date, &orders, RebalanceKind::Scheduled)?;
        } else if let Some(triggered) = self.strategy.as_triggered() {
            let holdings = self.log.holdings();
            if let Some(orders) = triggered.triggered_rebalance(&holdings, view)? {
                self.apply_rebalance(date, &orders, RebalanceKind::Triggered)?;
            }
        }
        Ok(())
    }

    /// Freeze the log, value the portfolio and compute metrics.
    pub fn finalize(mut self) -> Result<SimulationResult, SipsimError> {
        self.expect_state(RunState::Running)?;
        self.state = RunState::Finalized;

        let end_date = self.config.end_date;
        let final_holdings = self.log.holdings();
        let final_value = metrics::portfolio_value(&final_holdings, self.market, end_date)?;
        let total_invested: f64 = self
            .log
            .entries()
            .iter()
            .filter(|t| !matches!(t.kind, TransactionKind::Rebalance(_)))
            .map(|t| t.amount)
            .sum();
        let value_series = metrics::value_series(&self.log, self.market, self.calendar.dates())?;
        let report = metrics::compute(
            &self.config.metrics,
            &MetricInputs {
                series: &value_series,
                log: &self.log,
                total_invested,
                final_value,
                end_date,
            },
        )?;
        let trigger_count = self
            .strategy
            .as_triggered()
            .map_or(0, |t| t.trigger_count());

        info!(
            strategy = self.strategy.name(),
            transactions = self.log.len(),
            total_invested,
            final_value,
            "finalized"
        );

        Ok(SimulationResult {
            strategy_name: self.strategy.name().to_string(),
            start_date: self.calendar.effective_start(),
            end_date,
            metrics: report,
            transactions: self.log,
            final_holdings,
            total_invested,
            final_value,
            rebalances: self.rebalances,
            realized_gains: self.realized,
            value_series,
            trigger_count,
        })
    }

    fn invest(
        &mut self,
        date: NaiveDate,
        allocation: &Allocation,
        kind: TransactionKind,
    ) -> Result<(), SipsimError> {
        for (instrument, &amount) in allocation {
            if amount > 0.0 {
                self.buy(instrument, date, amount, kind)?;
            }
        }
        Ok(())
    }

    fn apply_rebalance(
        &mut self,
        date: NaiveDate,
        orders: &[Order],
        kind: RebalanceKind,
    ) -> Result<(), SipsimError> {
        let txn_kind = TransactionKind::Rebalance(kind);
        for order in orders {
            if order.amount > 0.0 {
                self.buy(&order.instrument, date, order.amount, txn_kind)?;
            } else if order.amount < 0.0 {
                self.sell(&order.instrument, date, -order.amount, txn_kind)?;
            }
        }
        self.rebalances.push(RebalanceEvent {
            date,
            kind,
            order_count: orders.len(),
        });
        if kind == RebalanceKind::Triggered {
            info!(%date, orders = orders.len(), "triggered rebalance");
        } else {
            debug!(%date, orders = orders.len(), "scheduled rebalance");
        }
        Ok(())
    }

    fn buy(
        &mut self,
        instrument: &str,
        date: NaiveDate,
        amount: f64,
        kind: TransactionKind,
    ) -> Result<(), SipsimError> {
        let price = self.market.price_as_of(instrument, date)?;
        let units = round_units(amount / price);
        if units <= 0.0 {
            warn!(instrument, %date, amount, "buy below unit precision skipped");
            return Ok(());
        }
        self.lots.acquire(instrument, date, units, price)?;
        self.log.record(Transaction {
            instrument: instrument.to_string(),
            date,
            units,
            amount,
            kind,
        });
        debug!(instrument, %date, units, price, amount, "buy");
        Ok(())
    }

    /// Sell `amount` worth of `instrument`. Overselling beyond rounding
    /// tolerance is an error, never clamped.
    fn sell(
        &mut self,
        instrument: &str,
        date: NaiveDate,
        amount: f64,
        kind: TransactionKind,
    ) -> Result<(), SipsimError> {
        let price = self.market.price_as_of(instrument, date)?;
        let requested = round_units(amount / price);
        if requested <= 0.0 {
            warn!(instrument, %date, amount, "sell below unit precision skipped");
            return Ok(());
        }
        let held = self.lots.held_units(instrument);
        if requested > held + UNIT_TOLERANCE {
            return Err(SipsimError::InsufficientUnits {
                instrument: instrument.to_string(),
                date,
                requested,
                held,
            });
        }
        let units = requested.min(held);

        let consumed = self.lots.consume(instrument, date, units)?;
        self.realized.extend(consumed.iter().map(|c| RealizedGain {
            instrument: instrument.to_string(),
            acquired: c.acquired,
            sold: date,
            units: c.units,
            cost_per_unit: c.cost_per_unit,
            sale_price: price,
            gain: c.gain(price),
            holding_days: c.holding_days,
        }));
        self.log.record(Transaction {
            instrument: instrument.to_string(),
            date,
            units: -units,
            amount: -units * price,
            kind,
        });
        debug!(instrument, %date, units, price, lots = consumed.len(), "sell");
        Ok(())
    }
}

/// Run one simulation start to finish.
pub fn run(
    config: &SimulationConfig,
    market: &Market,
    strategy: &mut dyn Strategy,
) -> Result<SimulationResult, SipsimError> {
    config.metrics.validate()?;
    let mut sim = Simulation::new(config, market, strategy)?;
    sim.seed()?;
    sim.run_to_end()?;
    sim.finalize()
}
