//! FIFO lot ledger.
//!
//! Each buy appends a [`Lot`]; each sell walks the queue from the front,
//! shrinking or removing lots oldest-first. Holdings can never go negative.

use crate::domain::error::SipsimError;
use chrono::NaiveDate;
use std::collections::{BTreeMap, VecDeque};

/// Fractional-unit precision applied to every executed quantity.
pub const UNIT_DECIMALS: i32 = 4;

/// Half a unit of [`UNIT_DECIMALS`]; quantities closer than this are equal.
pub const UNIT_TOLERANCE: f64 = 0.5e-4;

/// Lots with fewer remaining units than this are dropped from the queue.
const DUST: f64 = 1e-9;

/// Round a quantity to [`UNIT_DECIMALS`] places.
pub fn round_units(units: f64) -> f64 {
    let scale = 10f64.powi(UNIT_DECIMALS);
    (units * scale).round() / scale
}

#[derive(Debug, Clone, PartialEq)]
pub struct Lot {
    /// Acquisition sequence number within the instrument's ledger.
    pub id: u64,
    pub instrument: String,
    pub acquired: NaiveDate,
    pub units: f64,
    pub cost_per_unit: f64,
}

/// Units taken from one lot by a sell.
#[derive(Debug, Clone, PartialEq)]
pub struct ConsumedLot {
    pub lot_id: u64,
    pub acquired: NaiveDate,
    pub units: f64,
    pub cost_per_unit: f64,
    pub holding_days: i64,
}

impl ConsumedLot {
    pub fn gain(&self, sale_price: f64) -> f64 {
        (sale_price - self.cost_per_unit) * self.units
    }
}

/// Per-instrument FIFO queue of live lots.
#[derive(Debug, Clone, PartialEq)]
pub struct LotLedger {
    instrument: String,
    lots: VecDeque<Lot>,
    next_id: u64,
}

impl LotLedger {
    pub fn new(instrument: impl Into<String>) -> Self {
        Self {
            instrument: instrument.into(),
            lots: VecDeque::new(),
            next_id: 0,
        }
    }

    pub fn instrument(&self) -> &str {
        &self.instrument
    }

    pub fn acquire(&mut self, date: NaiveDate, units: f64, price: f64) -> Result<&Lot, SipsimError> {
        if !(units.is_finite() && units > 0.0) {
            return Err(self.invalid(date, format!("units must be positive, got {units}")));
        }
        if !(price.is_finite() && price > 0.0) {
            return Err(self.invalid(date, format!("price must be positive, got {price}")));
        }

        let lot = Lot {
            id: self.next_id,
            instrument: self.instrument.clone(),
            acquired: date,
            units,
            cost_per_unit: price,
        };
        self.next_id += 1;
        self.lots.push_back(lot);
        Ok(&self.lots[self.lots.len() - 1])
    }

    /// Remove `units` oldest-first. Fails without touching any lot when
    /// `units` exceeds the current holding.
    pub fn consume(&mut self, date: NaiveDate, units: f64) -> Result<Vec<ConsumedLot>, SipsimError> {
        if !(units.is_finite() && units > 0.0) {
            return Err(self.invalid(date, format!("units must be positive, got {units}")));
        }
        let held = self.held_units();
        if units > held + DUST {
            return Err(SipsimError::InsufficientUnits {
                instrument: self.instrument.clone(),
                date,
                requested: units,
                held,
            });
        }

        let mut remaining = units;
        let mut consumed = Vec::new();

        while remaining > DUST {
            let Some(lot) = self.lots.front_mut() else {
                break;
            };
            let take = lot.units.min(remaining);
            consumed.push(ConsumedLot {
                lot_id: lot.id,
                acquired: lot.acquired,
                units: take,
                cost_per_unit: lot.cost_per_unit,
                holding_days: (date - lot.acquired).num_days(),
            });
            lot.units -= take;
            remaining -= take;
            if lot.units < DUST {
                self.lots.pop_front();
            }
        }

        Ok(consumed)
    }

    pub fn held_units(&self) -> f64 {
        self.lots.iter().map(|l| l.units).sum()
    }

    pub fn lots(&self) -> impl Iterator<Item = &Lot> {
        self.lots.iter()
    }

    pub fn lot_count(&self) -> usize {
        self.lots.len()
    }

    fn invalid(&self, date: NaiveDate, reason: String) -> SipsimError {
        SipsimError::InvalidOrder {
            instrument: self.instrument.clone(),
            date,
            reason,
        }
    }
}

/// One ledger per instrument, created on first acquisition.
#[derive(Debug, Clone, Default)]
pub struct LotBook {
    ledgers: BTreeMap<String, LotLedger>,
}

impl LotBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn acquire(
        &mut self,
        instrument: &str,
        date: NaiveDate,
        units: f64,
        price: f64,
    ) -> Result<&Lot, SipsimError> {
        self.ledgers
            .entry(instrument.to_string())
            .or_insert_with(|| LotLedger::new(instrument))
            .acquire(date, units, price)
    }

    pub fn consume(
        &mut self,
        instrument: &str,
        date: NaiveDate,
        units: f64,
    ) -> Result<Vec<ConsumedLot>, SipsimError> {
        match self.ledgers.get_mut(instrument) {
            Some(ledger) => ledger.consume(date, units),
            None => Err(SipsimError::InsufficientUnits {
                instrument: instrument.to_string(),
                date,
                requested: units,
                held: 0.0,
            }),
        }
    }

    pub fn held_units(&self, instrument: &str) -> f64 {
        self.ledgers
            .get(instrument)
            .map(LotLedger::held_units)
            .unwrap_or(0.0)
    }

    pub fn ledger(&self, instrument: &str) -> Option<&LotLedger> {
        self.ledgers.get(instrument)
    }

    pub fn ledgers(&self) -> impl Iterator<Item = &LotLedger> {
        self.ledgers.values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn d(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn ledger_with_two_lots() -> LotLedger {
        let mut ledger = LotLedger::new("Fund A");
        ledger.acquire(d("2023-01-01"), 100.0, 10.0).unwrap();
        ledger.acquire(d("2023-06-01"), 50.0, 12.0).unwrap();
        ledger
    }

    #[test]
    fn round_units_to_four_places() {
        assert_eq!(round_units(3.333_333_33), 3.3333);
        assert_eq!(round_units(0.000_04), 0.0);
        assert_eq!(round_units(2.000_06), 2.0001);
    }

    #[test]
    fn acquire_increases_holding() {
        let ledger = ledger_with_two_lots();
        assert_abs_diff_eq!(ledger.held_units(), 150.0);
        assert_eq!(ledger.lot_count(), 2);
        let ids: Vec<_> = ledger.lots().map(|l| l.id).collect();
        assert_eq!(ids, vec![0, 1]);
    }

    #[test]
    fn acquire_rejects_non_positive_units_and_price() {
        let mut ledger = LotLedger::new("Fund A");
        assert!(matches!(
            ledger.acquire(d("2023-01-01"), 0.0, 10.0),
            Err(SipsimError::InvalidOrder { .. })
        ));
        assert!(matches!(
            ledger.acquire(d("2023-01-01"), 1.0, -10.0),
            Err(SipsimError::InvalidOrder { .. })
        ));
        assert_eq!(ledger.lot_count(), 0);
    }

    #[test]
    fn consume_spans_lots_oldest_first() {
        let mut ledger = ledger_with_two_lots();
        let consumed = ledger.consume(d("2024-01-01"), 120.0).unwrap();

        assert_eq!(consumed.len(), 2);
        assert_eq!(consumed[0].acquired, d("2023-01-01"));
        assert_abs_diff_eq!(consumed[0].units, 100.0);
        assert_eq!(consumed[0].holding_days, 365);
        assert_eq!(consumed[1].acquired, d("2023-06-01"));
        assert_abs_diff_eq!(consumed[1].units, 20.0);
        assert_eq!(consumed[1].holding_days, 214);

        let total: f64 = consumed.iter().map(|c| c.units).sum();
        assert_abs_diff_eq!(total, 120.0);
        assert_abs_diff_eq!(ledger.held_units(), 30.0);
        assert_eq!(ledger.lot_count(), 1);
    }

    #[test]
    fn consume_partial_lot_keeps_it_at_front() {
        let mut ledger = ledger_with_two_lots();
        ledger.consume(d("2023-07-01"), 40.0).unwrap();
        let front = ledger.lots().next().unwrap();
        assert_eq!(front.id, 0);
        assert_abs_diff_eq!(front.units, 60.0);
    }

    #[test]
    fn consume_everything_empties_ledger() {
        let mut ledger = ledger_with_two_lots();
        ledger.consume(d("2024-01-01"), 150.0).unwrap();
        assert_eq!(ledger.lot_count(), 0);
        assert_abs_diff_eq!(ledger.held_units(), 0.0);
    }

    #[test]
    fn oversell_fails_and_leaves_lots_untouched() {
        let mut ledger = ledger_with_two_lots();
        let err = ledger.consume(d("2024-01-01"), 150.5).unwrap_err();
        assert!(matches!(
            err,
            SipsimError::InsufficientUnits { requested, held, .. }
                if requested == 150.5 && held == 150.0
        ));
        assert_abs_diff_eq!(ledger.held_units(), 150.0);
        assert_eq!(ledger.lot_count(), 2);
    }

    #[test]
    fn realized_gain_per_consumed_lot() {
        let mut ledger = ledger_with_two_lots();
        let consumed = ledger.consume(d("2024-01-01"), 120.0).unwrap();
        assert_abs_diff_eq!(consumed[0].gain(15.0), 500.0);
        assert_abs_diff_eq!(consumed[1].gain(15.0), 60.0);
    }

    #[test]
    fn book_sell_of_unknown_instrument_is_insufficient() {
        let mut book = LotBook::new();
        let err = book.consume("Nothing", d("2024-01-01"), 1.0).unwrap_err();
        assert!(matches!(err, SipsimError::InsufficientUnits { held, .. } if held == 0.0));
    }

    #[test]
    fn book_keeps_ledgers_separate() {
        let mut book = LotBook::new();
        book.acquire("A", d("2024-01-01"), 10.0, 100.0).unwrap();
        book.acquire("B", d("2024-01-01"), 5.0, 50.0).unwrap();
        book.consume("A", d("2024-01-02"), 4.0).unwrap();
        assert_abs_diff_eq!(book.held_units("A"), 6.0);
        assert_abs_diff_eq!(book.held_units("B"), 5.0);
        assert_abs_diff_eq!(book.held_units("C"), 0.0);
        assert_eq!(book.ledgers().count(), 2);
    }
}
