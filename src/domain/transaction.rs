//! Append-only transaction log and derived holdings.
//!
//! The log is the single source of truth for what a run holds. Holdings are
//! always recomputed from it; nothing caches a running total.

use chrono::NaiveDate;
use std::collections::BTreeMap;
use std::fmt;

/// Instrument → held units.
pub type Holdings = BTreeMap<String, f64>;

/// Why a transaction happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionKind {
    InitialInvestment,
    Contribution,
    Rebalance(RebalanceKind),
}

/// Classification of an executed rebalance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RebalanceKind {
    Scheduled,
    Triggered,
}

impl RebalanceKind {
    pub fn as_str(self) -> &'static str {
        match self {
            RebalanceKind::Scheduled => "scheduled",
            RebalanceKind::Triggered => "triggered",
        }
    }
}

impl fmt::Display for RebalanceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An executed order. `units` and `amount` are signed: positive buys,
/// negative sells.
#[derive(Debug, Clone, PartialEq)]
pub struct Transaction {
    pub instrument: String,
    pub date: NaiveDate,
    pub units: f64,
    pub amount: f64,
    pub kind: TransactionKind,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TransactionLog {
    entries: Vec<Transaction>,
}

impl TransactionLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a transaction. Entries must arrive in non-decreasing date order.
    pub fn record(&mut self, txn: Transaction) {
        debug_assert!(
            self.entries.last().is_none_or(|last| last.date <= txn.date),
            "transaction log must be appended in date order"
        );
        self.entries.push(txn);
    }

    pub fn entries(&self) -> &[Transaction] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Current holdings, summed per instrument.
    pub fn holdings(&self) -> Holdings {
        sum_units(self.entries.iter())
    }

    /// Holdings after every transaction dated at or before `date`.
    pub fn holdings_as_of(&self, date: NaiveDate) -> Holdings {
        sum_units(self.entries.iter().take_while(|t| t.date <= date))
    }

    /// Net cash flow per date, in date order.
    pub fn flows_by_date(&self) -> BTreeMap<NaiveDate, f64> {
        let mut flows = BTreeMap::new();
        for t in &self.entries {
            *flows.entry(t.date).or_insert(0.0) += t.amount;
        }
        flows
    }
}

fn sum_units<'a>(entries: impl Iterator<Item = &'a Transaction>) -> Holdings {
    let mut holdings = Holdings::new();
    for t in entries {
        *holdings.entry(t.instrument.clone()).or_insert(0.0) += t.units;
    }
    holdings
}
