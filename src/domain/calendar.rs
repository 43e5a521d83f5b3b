//! Trading calendar built from observed price dates.

use crate::domain::error::SipsimError;
use crate::domain::price::PriceSeries;
use chrono::NaiveDate;
use std::collections::BTreeSet;

/// Ordered, duplicate-free simulation dates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TradingCalendar {
    dates: Vec<NaiveDate>,
}

impl TradingCalendar {
    /// Union of every instrument's observed dates within `[start, end]`.
    ///
    /// Each instrument needs at least one observation at or before `end`;
    /// an instrument observed only after the window is `DataUnavailable`.
    pub fn build(
        instruments: &[&PriceSeries],
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Self, SipsimError> {
        for series in instruments {
            let has_data = series.first_date().is_some_and(|first| first <= end);
            if !has_data {
                return Err(SipsimError::DataUnavailable {
                    instrument: series.instrument().to_string(),
                    window: Some((start, end)),
                });
            }
        }

        let dates: BTreeSet<NaiveDate> = instruments
            .iter()
            .flat_map(|s| s.points().iter().map(|p| p.date))
            .filter(|d| *d >= start && *d <= end)
            .collect();

        if dates.is_empty() {
            return Err(SipsimError::EmptyCalendar { start, end });
        }

        Ok(Self {
            dates: dates.into_iter().collect(),
        })
    }

    pub fn dates(&self) -> &[NaiveDate] {
        &self.dates
    }

    pub fn len(&self) -> usize {
        self.dates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dates.is_empty()
    }

    /// Requested start snapped forward to the first calendar date.
    pub fn effective_start(&self) -> NaiveDate {
        self.dates[0]
    }

    pub fn last(&self) -> NaiveDate {
        self.dates[self.dates.len() - 1]
    }

    /// Each date paired with the calendar date before it.
    pub fn with_previous(&self) -> impl Iterator<Item = (Option<NaiveDate>, NaiveDate)> + '_ {
        self.dates
            .iter()
            .enumerate()
            .map(|(i, &d)| (i.checked_sub(1).map(|p| self.dates[p]), d))
    }
}
