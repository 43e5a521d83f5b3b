//! CSV file price adapter.
//!
//! One file per instrument, `<dir>/<instrument>.csv`, with a header row.
//! The date column is `date`; the price column is the first of `price`,
//! `nav`, `close` or `closing index value` (case-insensitive). Rows whose
//! date or price cannot be read are skipped.

use crate::domain::error::SipsimError;
use crate::domain::price::{PricePoint, PriceSeries};
use crate::ports::data_port::PriceSeriesPort;
use chrono::NaiveDate;
use std::fs;
use std::io::ErrorKind;
use std::path::PathBuf;
use tracing::{debug, warn};

const DATE_FORMATS: [&str; 4] = ["%Y-%m-%d", "%d-%m-%Y", "%d-%b-%Y", "%d %b %Y"];
const PRICE_COLUMNS: [&str; 4] = ["price", "nav", "close", "closing index value"];

pub struct CsvAdapter {
    base_path: PathBuf,
}

impl CsvAdapter {
    pub fn new(base_path: PathBuf) -> Self {
        Self { base_path }
    }

    fn csv_path(&self, instrument: &str) -> PathBuf {
        self.base_path.join(format!("{instrument}.csv"))
    }

    fn invalid(instrument: &str, reason: impl Into<String>) -> SipsimError {
        SipsimError::InvalidPriceData {
            instrument: instrument.to_string(),
            reason: reason.into(),
        }
    }
}

pub(crate) fn parse_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(raw, fmt).ok())
}

fn parse_price(raw: &str) -> Option<f64> {
    raw.trim().replace(',', "").parse().ok()
}

impl PriceSeriesPort for CsvAdapter {
    fn get_prices(&self, instrument: &str) -> Result<PriceSeries, SipsimError> {
        let path = self.csv_path(instrument);
        let content = fs::read_to_string(&path).map_err(|e| match e.kind() {
            ErrorKind::NotFound => SipsimError::DataUnavailable {
                instrument: instrument.to_string(),
                window: None,
            },
            _ => Self::invalid(instrument, format!("failed to read {}: {e}", path.display())),
        })?;

        let mut rdr = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .flexible(true)
            .from_reader(content.as_bytes());

        let headers: Vec<String> = rdr
            .headers()
            .map_err(|e| Self::invalid(instrument, format!("CSV header error: {e}")))?
            .iter()
            .map(|h| h.to_lowercase())
            .collect();
        let date_col = headers
            .iter()
            .position(|h| h == "date")
            .ok_or_else(|| Self::invalid(instrument, "missing date column"))?;
        let price_col = PRICE_COLUMNS
            .iter()
            .find_map(|name| headers.iter().position(|h| h == name))
            .ok_or_else(|| Self::invalid(instrument, "missing price column"))?;

        let mut points = Vec::new();
        let mut skipped = 0usize;
        for result in rdr.records() {
            let record =
                result.map_err(|e| Self::invalid(instrument, format!("CSV parse error: {e}")))?;
            let date = record.get(date_col).and_then(parse_date);
            let price = record.get(price_col).and_then(parse_price);
            match (date, price) {
                (Some(date), Some(price)) => points.push(PricePoint::new(date, price)),
                _ => skipped += 1,
            }
        }

        if skipped > 0 {
            warn!(instrument, skipped, "skipped unreadable price rows");
        }
        debug!(instrument, observations = points.len(), path = %path.display(), "loaded prices");
        PriceSeries::from_points(instrument, points)
    }

    fn list_instruments(&self) -> Result<Vec<String>, SipsimError> {
        let entries = fs::read_dir(&self.base_path)?;

        let mut instruments = Vec::new();
        for entry in entries {
            let path = entry?.path();
            if path.extension().is_some_and(|ext| ext.eq_ignore_ascii_case("csv")) {
                if let Some(stem) = path.file_stem() {
                    instruments.push(stem.to_string_lossy().into_owned());
                }
            }
        }

        instruments.sort();
        Ok(instruments)
    }
}
