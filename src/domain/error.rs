//! Domain error types.
//!
//! Every failure aborts the run it occurs in. Metrics that cannot be computed
//! are not errors: they surface as [`MetricValue::Undefined`].
//!
//! [`MetricValue::Undefined`]: crate::domain::metrics::MetricValue::Undefined

use chrono::NaiveDate;

/// Top-level error type for sipsim.
#[derive(Debug, thiserror::Error)]
pub enum SipsimError {
    /// `window` is the requested range when the failure is detected
    /// against one; a missing source file has none.
    #[error("no price data available for {instrument}{}", window_suffix(.window))]
    DataUnavailable {
        instrument: String,
        window: Option<(NaiveDate, NaiveDate)>,
    },

    #[error("no price for {instrument} at or before {date}")]
    PriceNotYetAvailable { instrument: String, date: NaiveDate },

    #[error("cannot sell {requested} units of {instrument} on {date}: only {held} held")]
    InsufficientUnits {
        instrument: String,
        date: NaiveDate,
        requested: f64,
        held: f64,
    },

    #[error("unsupported frequency: {value:?}")]
    UnsupportedFrequency { value: String },

    #[error("invalid price data for {instrument}: {reason}")]
    InvalidPriceData { instrument: String, reason: String },

    #[error("invalid order for {instrument} on {date}: {reason}")]
    InvalidOrder {
        instrument: String,
        date: NaiveDate,
        reason: String,
    },

    #[error("no trading dates between {start} and {end}")]
    EmptyCalendar { start: NaiveDate, end: NaiveDate },

    #[error("risk-free rate is {rate_period} but returns are {return_period}")]
    FrequencyMismatch {
        rate_period: String,
        return_period: String,
    },

    #[error("unknown metric: {name:?}")]
    UnknownMetric { name: String },

    #[error("unknown strategy type: {name:?}")]
    UnknownStrategy { name: String },

    #[error("simulation is {actual}, expected {expected}")]
    InvalidRunState {
        expected: &'static str,
        actual: &'static str,
    },

    #[error("config parse error in {file}: {reason}")]
    ConfigParse { file: String, reason: String },

    #[error("missing config key [{section}] {key}")]
    ConfigMissing { section: String, key: String },

    #[error("invalid config value [{section}] {key}: {reason}")]
    ConfigInvalid {
        section: String,
        key: String,
        reason: String,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl SipsimError {
    pub(crate) fn config_invalid(section: &str, key: &str, reason: impl Into<String>) -> Self {
        SipsimError::ConfigInvalid {
            section: section.to_string(),
            key: key.to_string(),
            reason: reason.into(),
        }
    }
}

fn window_suffix(window: &Option<(NaiveDate, NaiveDate)>) -> String {
    match window {
        Some((start, end)) => format!(" in or before {start}..={end}"),
        None => String::new(),
    }
}

impl From<&SipsimError> for std::process::ExitCode {
    fn from(err: &SipsimError) -> Self {
        let code: u8 = match err {
            SipsimError::Io(_) => 1,
            SipsimError::ConfigParse { .. }
            | SipsimError::ConfigMissing { .. }
            | SipsimError::ConfigInvalid { .. }
            | SipsimError::UnsupportedFrequency { .. }
            | SipsimError::UnknownMetric { .. }
            | SipsimError::UnknownStrategy { .. } => 2,
            SipsimError::DataUnavailable { .. }
            | SipsimError::PriceNotYetAvailable { .. }
            | SipsimError::InvalidPriceData { .. }
            | SipsimError::EmptyCalendar { .. } => 3,
            SipsimError::InsufficientUnits { .. } | SipsimError::InvalidOrder { .. } => 4,
            SipsimError::FrequencyMismatch { .. } | SipsimError::InvalidRunState { .. } => 5,
        };
        std::process::ExitCode::from(code)
    }
}
