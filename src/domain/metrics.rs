//! Return and risk metrics.
//!
//! Everything here is computed from the transaction log and last-known
//! prices. The portfolio value series is rebuilt from cumulative units; no
//! precomputed totals are trusted.

use crate::domain::error::SipsimError;
use crate::domain::price::Market;
use crate::domain::transaction::{Holdings, TransactionLog};
use chrono::{Datelike, NaiveDate};
use std::fmt;
use std::str::FromStr;

pub const METRICS_SCHEMA_VERSION: u32 = 1;
pub const DEFAULT_RISK_FREE_RATE: f64 = 0.06;

const DAYS_PER_YEAR: f64 = 365.0;
const XIRR_TOLERANCE: f64 = 1e-10;
const XIRR_MAX_ITERATIONS: usize = 100;
/// Upper end of the bisection bracket for XIRR.
const XIRR_MAX_RATE: f64 = 1e6;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum MetricName {
    TotalReturn,
    Xirr,
    SharpeRatio,
    SortinoRatio,
    MaxDrawdown,
    CalmarRatio,
}

impl MetricName {
    /// Every supported metric. The default configuration is built from this
    /// list, so a new variant is enabled by default once it is added here.
    pub const ALL: [MetricName; 6] = [
        MetricName::TotalReturn,
        MetricName::Xirr,
        MetricName::SharpeRatio,
        MetricName::SortinoRatio,
        MetricName::MaxDrawdown,
        MetricName::CalmarRatio,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            MetricName::TotalReturn => "total_return",
            MetricName::Xirr => "xirr",
            MetricName::SharpeRatio => "sharpe_ratio",
            MetricName::SortinoRatio => "sortino_ratio",
            MetricName::MaxDrawdown => "max_drawdown",
            MetricName::CalmarRatio => "calmar_ratio",
        }
    }
}

impl fmt::Display for MetricName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MetricName {
    type Err = SipsimError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key = s.trim().to_lowercase().replace([' ', '-'], "_");
        match key.as_str() {
            "total_return" => Ok(MetricName::TotalReturn),
            "xirr" => Ok(MetricName::Xirr),
            "sharpe" | "sharpe_ratio" => Ok(MetricName::SharpeRatio),
            "sortino" | "sortino_ratio" => Ok(MetricName::SortinoRatio),
            "max_drawdown" | "maximum_drawdown" | "mdd" => Ok(MetricName::MaxDrawdown),
            "calmar" | "calmar_ratio" => Ok(MetricName::CalmarRatio),
            _ => Err(SipsimError::UnknownMetric {
                name: s.to_string(),
            }),
        }
    }
}

/// Sampling period of the return series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReturnFrequency {
    Daily,
    Weekly,
    Monthly,
}

impl ReturnFrequency {
    pub fn periods_per_year(self) -> f64 {
        match self {
            ReturnFrequency::Daily => 252.0,
            ReturnFrequency::Weekly => 52.0,
            ReturnFrequency::Monthly => 12.0,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ReturnFrequency::Daily => "daily",
            ReturnFrequency::Weekly => "weekly",
            ReturnFrequency::Monthly => "monthly",
        }
    }

    /// Key identifying the period a date falls in.
    fn bucket(self, date: NaiveDate) -> (i32, u32) {
        match self {
            ReturnFrequency::Daily => (date.year(), date.ordinal()),
            ReturnFrequency::Weekly => {
                let w = date.iso_week();
                (w.year(), w.week())
            }
            ReturnFrequency::Monthly => (date.year(), date.month()),
        }
    }
}

impl FromStr for ReturnFrequency {
    type Err = SipsimError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "daily" => Ok(ReturnFrequency::Daily),
            "weekly" => Ok(ReturnFrequency::Weekly),
            "monthly" => Ok(ReturnFrequency::Monthly),
            _ => Err(SipsimError::UnsupportedFrequency {
                value: s.to_string(),
            }),
        }
    }
}

/// Period a risk-free rate is quoted for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateBasis {
    /// Annual rate, pro-rated to the return period.
    Annual,
    /// Already per period; must match the return series.
    PerPeriod(ReturnFrequency),
}

impl FromStr for RateBasis {
    type Err = SipsimError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "annual" | "annually" | "yearly" => Ok(RateBasis::Annual),
            other => other.parse().map(RateBasis::PerPeriod),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RiskFreeRate {
    pub rate: f64,
    pub basis: RateBasis,
}

impl RiskFreeRate {
    pub fn annual(rate: f64) -> Self {
        Self {
            rate,
            basis: RateBasis::Annual,
        }
    }

    /// Rate for one period of `frequency`.
    pub fn per_period(&self, frequency: ReturnFrequency) -> Result<f64, SipsimError> {
        match self.basis {
            RateBasis::Annual => Ok(self.rate / frequency.periods_per_year()),
            RateBasis::PerPeriod(f) if f == frequency => Ok(self.rate),
            RateBasis::PerPeriod(f) => Err(SipsimError::FrequencyMismatch {
                rate_period: f.as_str().to_string(),
                return_period: frequency.as_str().to_string(),
            }),
        }
    }
}

/// Which metrics to compute and with what parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricsConfig {
    pub schema_version: u32,
    pub metrics: Vec<MetricName>,
    pub risk_free_rate: RiskFreeRate,
    pub return_frequency: ReturnFrequency,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            schema_version: METRICS_SCHEMA_VERSION,
            metrics: MetricName::ALL.to_vec(),
            risk_free_rate: RiskFreeRate::annual(DEFAULT_RISK_FREE_RATE),
            return_frequency: ReturnFrequency::Daily,
        }
    }
}

impl MetricsConfig {
    /// Reject configurations that would fail only after a full run.
    pub fn validate(&self) -> Result<(), SipsimError> {
        if self.schema_version != METRICS_SCHEMA_VERSION {
            return Err(SipsimError::config_invalid(
                "metrics",
                "schema_version",
                format!(
                    "unsupported version {}, expected {METRICS_SCHEMA_VERSION}",
                    self.schema_version
                ),
            ));
        }
        self.risk_free_rate.per_period(self.return_frequency)?;
        Ok(())
    }
}

/// A metric result, or the sentinel for too little data / zero denominator.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MetricValue {
    Value(f64),
    Undefined,
}

impl MetricValue {
    fn from_ratio(numerator: f64, denominator: f64) -> Self {
        if denominator == 0.0 || !denominator.is_finite() {
            MetricValue::Undefined
        } else {
            MetricValue::Value(numerator / denominator)
        }
    }

    pub fn value(self) -> Option<f64> {
        match self {
            MetricValue::Value(v) => Some(v),
            MetricValue::Undefined => None,
        }
    }

    pub fn is_undefined(self) -> bool {
        matches!(self, MetricValue::Undefined)
    }
}

impl fmt::Display for MetricValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetricValue::Value(v) => write!(f, "{v:.6}"),
            MetricValue::Undefined => f.write_str("undefined"),
        }
    }
}

/// Named metric results in configuration order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetricReport {
    entries: Vec<(MetricName, MetricValue)>,
}

impl MetricReport {
    pub fn get(&self, name: MetricName) -> Option<MetricValue> {
        self.entries
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, v)| *v)
    }

    pub fn iter(&self) -> impl Iterator<Item = &(MetricName, MetricValue)> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Portfolio value on one calendar date, with the net cash that entered on
/// that date.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ValuePoint {
    pub date: NaiveDate,
    pub value: f64,
    pub flow: f64,
}

/// Value every holding at its last-known price.
pub fn portfolio_value(
    holdings: &Holdings,
    market: &Market,
    date: NaiveDate,
) -> Result<f64, SipsimError> {
    holdings
        .iter()
        .filter(|(_, units)| units.abs() > 0.0)
        .map(|(instrument, units)| market.price_as_of(instrument, date).map(|p| units * p))
        .sum()
}

/// Rebuild the daily value series over `dates` from cumulative transactions.
pub fn value_series(
    log: &TransactionLog,
    market: &Market,
    dates: &[NaiveDate],
) -> Result<Vec<ValuePoint>, SipsimError> {
    let entries = log.entries();
    let mut holdings = Holdings::new();
    let mut next = 0;
    let mut series = Vec::with_capacity(dates.len());

    for &date in dates {
        let mut flow = 0.0;
        while next < entries.len() && entries[next].date <= date {
            let t = &entries[next];
            *holdings.entry(t.instrument.clone()).or_insert(0.0) += t.units;
            flow += t.amount;
            next += 1;
        }
        series.push(ValuePoint {
            date,
            value: portfolio_value(&holdings, market, date)?,
            flow,
        });
    }
    Ok(series)
}

/// Collapse a daily series to one point per period (the last date in it),
/// summing flows within the period.
pub fn resample(series: &[ValuePoint], frequency: ReturnFrequency) -> Vec<ValuePoint> {
    let mut out: Vec<ValuePoint> = Vec::new();
    let mut current_bucket = None;
    for p in series {
        let bucket = frequency.bucket(p.date);
        if current_bucket != Some(bucket) {
            out.push(*p);
            current_bucket = Some(bucket);
        } else if let Some(last) = out.last_mut() {
            last.date = p.date;
            last.value = p.value;
            last.flow += p.flow;
        }
    }
    out
}

/// Flow-adjusted period returns: (Vₜ − Fₜ) / Vₜ₋₁ − 1.
///
/// Periods following a zero value are skipped.
pub fn period_returns(series: &[ValuePoint]) -> Vec<f64> {
    series
        .windows(2)
        .filter(|w| w[0].value > 0.0)
        .map(|w| (w[1].value - w[1].flow) / w[0].value - 1.0)
        .collect()
}

pub fn total_return(final_value: f64, invested: f64) -> MetricValue {
    if invested <= 0.0 {
        return MetricValue::Undefined;
    }
    MetricValue::Value(final_value / invested - 1.0)
}

fn mean(xs: &[f64]) -> f64 {
    xs.iter().sum::<f64>() / xs.len() as f64
}

/// Sample (n − 1) standard deviation; `None` below two observations.
fn sample_std(xs: &[f64]) -> Option<f64> {
    if xs.len() < 2 {
        return None;
    }
    if xs.iter().all(|x| *x == xs[0]) {
        return Some(0.0);
    }
    let m = mean(xs);
    let var = xs.iter().map(|x| (x - m).powi(2)).sum::<f64>() / (xs.len() - 1) as f64;
    Some(var.sqrt())
}

pub fn sharpe_ratio(returns: &[f64], rf_per_period: f64, periods_per_year: f64) -> MetricValue {
    let excess: Vec<f64> = returns.iter().map(|r| r - rf_per_period).collect();
    match sample_std(&excess) {
        Some(sd) => match MetricValue::from_ratio(mean(&excess), sd) {
            MetricValue::Value(v) => MetricValue::Value(v * periods_per_year.sqrt()),
            undefined => undefined,
        },
        None => MetricValue::Undefined,
    }
}

pub fn sortino_ratio(returns: &[f64], rf_per_period: f64, periods_per_year: f64) -> MetricValue {
    if returns.len() < 2 {
        return MetricValue::Undefined;
    }
    let excess: Vec<f64> = returns.iter().map(|r| r - rf_per_period).collect();
    let downside: Vec<f64> = excess.iter().copied().filter(|r| *r < 0.0).collect();
    match sample_std(&downside) {
        Some(sd) => match MetricValue::from_ratio(mean(&excess), sd) {
            MetricValue::Value(v) => MetricValue::Value(v * periods_per_year.sqrt()),
            undefined => undefined,
        },
        None => MetricValue::Undefined,
    }
}

/// Largest peak-to-trough decline as a non-positive fraction.
pub fn max_drawdown(values: &[f64]) -> MetricValue {
    let Some(&first) = values.first() else {
        return MetricValue::Undefined;
    };
    let mut peak = first;
    let mut worst = 0.0_f64;
    for &v in values {
        peak = peak.max(v);
        if peak > 0.0 {
            worst = worst.min((v - peak) / peak);
        }
    }
    MetricValue::Value(worst)
}

pub fn calmar_ratio(xirr: MetricValue, max_drawdown: MetricValue) -> MetricValue {
    match (xirr, max_drawdown) {
        (MetricValue::Value(r), MetricValue::Value(dd)) => MetricValue::from_ratio(r, dd.abs()),
        _ => MetricValue::Undefined,
    }
}

fn npv(flows: &[(f64, f64)], rate: f64) -> f64 {
    flows
        .iter()
        .map(|(years, cf)| cf / (1.0 + rate).powf(*years))
        .sum()
}

fn npv_derivative(flows: &[(f64, f64)], rate: f64) -> f64 {
    flows
        .iter()
        .map(|(years, cf)| -years * cf / (1.0 + rate).powf(years + 1.0))
        .sum()
}

/// Money-weighted annual return of dated cash flows (actual/365).
///
/// Investments are negative, withdrawals and the terminal value positive.
/// Newton's method runs first; when it fails, bisection searches rates in
/// (−1, `XIRR_MAX_RATE`]. A root above that bound, as in a very short window
/// with a large gain, is `Undefined`.
pub fn xirr(flows: &[(NaiveDate, f64)]) -> MetricValue {
    let has_negative = flows.iter().any(|(_, cf)| *cf < 0.0);
    let has_positive = flows.iter().any(|(_, cf)| *cf > 0.0);
    let Some(first) = flows.iter().map(|(d, _)| *d).min() else {
        return MetricValue::Undefined;
    };
    if !(has_negative && has_positive) {
        return MetricValue::Undefined;
    }

    let timed: Vec<(f64, f64)> = flows
        .iter()
        .map(|(d, cf)| ((*d - first).num_days() as f64 / DAYS_PER_YEAR, *cf))
        .collect();

    newton(&timed)
        .or_else(|| bisect(&timed))
        .map_or(MetricValue::Undefined, MetricValue::Value)
}

fn newton(flows: &[(f64, f64)]) -> Option<f64> {
    let mut rate = 0.1;
    for _ in 0..XIRR_MAX_ITERATIONS {
        let f = npv(flows, rate);
        let df = npv_derivative(flows, rate);
        if df == 0.0 || !df.is_finite() {
            return None;
        }
        let next = rate - f / df;
        if !next.is_finite() || next <= -1.0 {
            return None;
        }
        if (next - rate).abs() < XIRR_TOLERANCE {
            return Some(next);
        }
        rate = next;
    }
    None
}

fn bisect(flows: &[(f64, f64)]) -> Option<f64> {
    let mut lo = -0.9999;
    let mut hi = 1.0;
    let f_lo = npv(flows, lo);
    let mut f_hi = npv(flows, hi);
    while f_lo.signum() == f_hi.signum() {
        hi *= 2.0;
        if hi > XIRR_MAX_RATE {
            return None;
        }
        f_hi = npv(flows, hi);
    }

    for _ in 0..200 {
        let mid = 0.5 * (lo + hi);
        let f_mid = npv(flows, mid);
        if f_mid == 0.0 || (hi - lo) < XIRR_TOLERANCE {
            return Some(mid);
        }
        if f_mid.signum() == f_lo.signum() {
            lo = mid;
        } else {
            hi = mid;
        }
    }
    Some(0.5 * (lo + hi))
}

/// Inputs the metrics engine needs from a finished run.
#[derive(Debug, Clone, Copy)]
pub struct MetricInputs<'a> {
    pub series: &'a [ValuePoint],
    pub log: &'a TransactionLog,
    pub total_invested: f64,
    pub final_value: f64,
    pub end_date: NaiveDate,
}

/// Investor-perspective cash flows: every transaction date's net amount
/// negated, plus the final value at `end_date`.
pub fn cash_flows(log: &TransactionLog, final_value: f64, end_date: NaiveDate) -> Vec<(NaiveDate, f64)> {
    let mut flows: Vec<(NaiveDate, f64)> = log
        .flows_by_date()
        .into_iter()
        .filter(|(_, amount)| *amount != 0.0)
        .map(|(date, amount)| (date, -amount))
        .collect();
    flows.push((end_date, final_value));
    flows
}

pub fn compute(config: &MetricsConfig, inputs: &MetricInputs<'_>) -> Result<MetricReport, SipsimError> {
    let rf = config.risk_free_rate.per_period(config.return_frequency)?;
    let periods = config.return_frequency.periods_per_year();

    let sampled = match config.return_frequency {
        ReturnFrequency::Daily => inputs.series.to_vec(),
        other => resample(inputs.series, other),
    };
    let returns = period_returns(&sampled);
    let values: Vec<f64> = inputs.series.iter().map(|p| p.value).collect();

    let xirr_value = || xirr(&cash_flows(inputs.log, inputs.final_value, inputs.end_date));

    let entries = config
        .metrics
        .iter()
        .map(|&name| {
            let value = match name {
                MetricName::TotalReturn => total_return(inputs.final_value, inputs.total_invested),
                MetricName::Xirr => xirr_value(),
                MetricName::SharpeRatio => sharpe_ratio(&returns, rf, periods),
                MetricName::SortinoRatio => sortino_ratio(&returns, rf, periods),
                MetricName::MaxDrawdown => max_drawdown(&values),
                MetricName::CalmarRatio => calmar_ratio(xirr_value(), max_drawdown(&values)),
            };
            (name, value)
        })
        .collect();

    Ok(MetricReport { entries })
}
