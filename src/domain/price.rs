//! Price series and last-known-price lookup.
//!
//! A [`PriceSeries`] is the ingested, validated history of one instrument.
//! [`Market`] holds every series a run needs and [`MarketView`] pins it to a
//! single date so strategies never see observations from the future.

use crate::domain::error::SipsimError;
use chrono::NaiveDate;
use std::collections::BTreeMap;

/// One (date, price) observation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PricePoint {
    pub date: NaiveDate,
    pub price: f64,
}

impl PricePoint {
    pub fn new(date: NaiveDate, price: f64) -> Self {
        Self { date, price }
    }
}

/// Ascending, date-unique observations for one instrument.
#[derive(Debug, Clone, PartialEq)]
pub struct PriceSeries {
    instrument: String,
    points: Vec<PricePoint>,
}

impl PriceSeries {
    /// Ingest raw adapter output. Points are re-sorted; duplicate dates and
    /// non-positive or non-finite prices are rejected.
    pub fn from_points(
        instrument: impl Into<String>,
        mut points: Vec<PricePoint>,
    ) -> Result<Self, SipsimError> {
        let instrument = instrument.into();
        points.sort_by_key(|p| p.date);

        for p in &points {
            if !p.price.is_finite() || p.price <= 0.0 {
                return Err(SipsimError::InvalidPriceData {
                    instrument,
                    reason: format!("price {} on {} must be positive", p.price, p.date),
                });
            }
        }
        if let Some(w) = points.windows(2).find(|w| w[0].date == w[1].date) {
            return Err(SipsimError::InvalidPriceData {
                instrument,
                reason: format!("duplicate observation on {}", w[0].date),
            });
        }

        Ok(Self { instrument, points })
    }

    pub fn instrument(&self) -> &str {
        &self.instrument
    }

    pub fn points(&self) -> &[PricePoint] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn first_date(&self) -> Option<NaiveDate> {
        self.points.first().map(|p| p.date)
    }

    pub fn last_date(&self) -> Option<NaiveDate> {
        self.points.last().map(|p| p.date)
    }

    /// All observations at or before `date`.
    pub fn up_to(&self, date: NaiveDate) -> &[PricePoint] {
        let end = self.points.partition_point(|p| p.date <= date);
        &self.points[..end]
    }

    /// Latest observation at or before `date`.
    pub fn observation_as_of(&self, date: NaiveDate) -> Option<&PricePoint> {
        self.up_to(date).last()
    }

    /// Last-known price: the latest observation at or before `date`.
    pub fn price_as_of(&self, date: NaiveDate) -> Result<f64, SipsimError> {
        self.observation_as_of(date)
            .map(|p| p.price)
            .ok_or_else(|| SipsimError::PriceNotYetAvailable {
                instrument: self.instrument.clone(),
                date,
            })
    }
}

/// Every price series available to a run, keyed by instrument.
#[derive(Debug, Clone, Default)]
pub struct Market {
    series: BTreeMap<String, PriceSeries>,
}

impl Market {
    pub fn new(series: impl IntoIterator<Item = PriceSeries>) -> Self {
        Self {
            series: series
                .into_iter()
                .map(|s| (s.instrument.clone(), s))
                .collect(),
        }
    }

    pub fn insert(&mut self, series: PriceSeries) {
        self.series.insert(series.instrument.clone(), series);
    }

    pub fn series(&self, instrument: &str) -> Option<&PriceSeries> {
        self.series.get(instrument)
    }

    pub fn instruments(&self) -> impl Iterator<Item = &str> {
        self.series.keys().map(String::as_str)
    }

    /// Look up a series, failing with `DataUnavailable` if the instrument was
    /// never loaded.
    pub fn require(
        &self,
        instrument: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<&PriceSeries, SipsimError> {
        self.series
            .get(instrument)
            .ok_or_else(|| SipsimError::DataUnavailable {
                instrument: instrument.to_string(),
                window: Some((start, end)),
            })
    }

    pub fn price_as_of(&self, instrument: &str, date: NaiveDate) -> Result<f64, SipsimError> {
        match self.series.get(instrument) {
            Some(series) => series.price_as_of(date),
            None => Err(SipsimError::PriceNotYetAvailable {
                instrument: instrument.to_string(),
                date,
            }),
        }
    }

    pub fn view(&self, date: NaiveDate) -> MarketView<'_> {
        MarketView { market: self, date }
    }
}

/// The market as it was known on one date.
#[derive(Debug, Clone, Copy)]
pub struct MarketView<'a> {
    market: &'a Market,
    date: NaiveDate,
}

impl<'a> MarketView<'a> {
    pub fn date(&self) -> NaiveDate {
        self.date
    }

    pub fn price(&self, instrument: &str) -> Result<f64, SipsimError> {
        self.market.price_as_of(instrument, self.date)
    }

    /// Observations of `instrument` at or before the view date; empty if the
    /// instrument is unknown.
    pub fn history(&self, instrument: &str) -> &'a [PricePoint] {
        self.market
            .series(instrument)
            .map(|s| s.up_to(self.date))
            .unwrap_or(&[])
    }

    /// Last-known price on an earlier date, `None` before the first observation.
    pub fn price_on_or_before(&self, instrument: &str, date: NaiveDate) -> Option<f64> {
        let date = date.min(self.date);
        self.market
            .series(instrument)
            .and_then(|s| s.observation_as_of(date))
            .map(|p| p.price)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn series(points: &[(&str, f64)]) -> PriceSeries {
        PriceSeries::from_points(
            "FUND",
            points.iter().map(|&(dt, p)| PricePoint::new(d(dt), p)).collect(),
        )
        .unwrap()
    }

    #[test]
    fn from_points_sorts_unordered_input() {
        let s = series(&[("2024-01-03", 102.0), ("2024-01-01", 100.0), ("2024-01-02", 101.0)]);
        let dates: Vec<_> = s.points().iter().map(|p| p.date).collect();
        assert_eq!(dates, vec![d("2024-01-01"), d("2024-01-02"), d("2024-01-03")]);
    }

    #[test]
    fn from_points_rejects_duplicate_dates() {
        let err = PriceSeries::from_points(
            "FUND",
            vec![
                PricePoint::new(d("2024-01-02"), 100.0),
                PricePoint::new(d("2024-01-02"), 101.0),
            ],
        )
        .unwrap_err();
        assert!(matches!(err, SipsimError::InvalidPriceData { .. }));
    }

    #[test]
    fn from_points_rejects_non_positive_price() {
        for bad in [0.0, -1.0, f64::NAN, f64::INFINITY] {
            let err =
                PriceSeries::from_points("FUND", vec![PricePoint::new(d("2024-01-02"), bad)])
                    .unwrap_err();
            assert!(matches!(err, SipsimError::InvalidPriceData { .. }));
        }
    }

    #[test]
    fn price_as_of_exact_date() {
        let s = series(&[("2024-01-01", 100.0), ("2024-01-03", 102.0)]);
        assert_eq!(s.price_as_of(d("2024-01-03")).unwrap(), 102.0);
    }

    #[test]
    fn price_as_of_holiday_uses_last_known() {
        let s = series(&[("2024-01-01", 100.0), ("2024-01-03", 102.0)]);
        assert_eq!(s.price_as_of(d("2024-01-02")).unwrap(), 100.0);
        assert_eq!(s.price_as_of(d("2024-02-15")).unwrap(), 102.0);
    }

    #[test]
    fn price_as_of_before_first_observation_fails() {
        let s = series(&[("2024-01-05", 100.0)]);
        let err = s.price_as_of(d("2024-01-04")).unwrap_err();
        assert!(matches!(
            err,
            SipsimError::PriceNotYetAvailable { ref instrument, date }
                if instrument == "FUND" && date == d("2024-01-04")
        ));
    }

    #[test]
    fn up_to_is_inclusive() {
        let s = series(&[("2024-01-01", 1.0), ("2024-01-02", 2.0), ("2024-01-03", 3.0)]);
        assert_eq!(s.up_to(d("2024-01-02")).len(), 2);
        assert!(s.up_to(d("2023-12-31")).is_empty());
    }

    #[test]
    fn market_view_hides_future_observations() {
        let market = Market::new([series(&[
            ("2024-01-01", 1.0),
            ("2024-01-02", 2.0),
            ("2024-01-03", 3.0),
        ])]);
        let view = market.view(d("2024-01-02"));
        assert_eq!(view.history("FUND").len(), 2);
        assert_eq!(view.price("FUND").unwrap(), 2.0);
        assert_eq!(view.price_on_or_before("FUND", d("2024-01-03")), Some(2.0));
        assert_eq!(view.price_on_or_before("FUND", d("2023-12-01")), None);
        assert!(view.history("OTHER").is_empty());
    }

    #[test]
    fn market_require_unknown_instrument() {
        let market = Market::default();
        let err = market
            .require("MISSING", d("2024-01-01"), d("2024-12-31"))
            .unwrap_err();
        assert!(matches!(err, SipsimError::DataUnavailable { .. }));
    }
}
