//! Price data port trait.

use crate::domain::error::SipsimError;
use crate::domain::price::PriceSeries;
use chrono::NaiveDate;

/// Supplies per-instrument daily reference prices.
///
/// Implementations hand back whatever they read; `PriceSeries::from_points`
/// re-sorts and validates, so adapters need not trust their source's order.
pub trait PriceSeriesPort {
    fn get_prices(&self, instrument: &str) -> Result<PriceSeries, SipsimError>;

    fn list_instruments(&self) -> Result<Vec<String>, SipsimError>;

    /// First date, last date and observation count, or `None` when the
    /// instrument has no observations.
    fn get_data_range(
        &self,
        instrument: &str,
    ) -> Result<Option<(NaiveDate, NaiveDate, usize)>, SipsimError> {
        let series = self.get_prices(instrument)?;
        Ok(match (series.first_date(), series.last_date()) {
            (Some(first), Some(last)) => Some((first, last, series.len())),
            _ => None,
        })
    }
}
