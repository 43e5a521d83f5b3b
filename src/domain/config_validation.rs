//! Configuration validation and translation into engine types.
//!
//! Everything is checked before a run starts, so a bad frequency string or
//! an out-of-range weight fails here rather than mid-simulation.

use crate::domain::error::SipsimError;
use crate::domain::frequency::Frequency;
use crate::domain::metrics::{
    DEFAULT_RISK_FREE_RATE, MetricName, MetricsConfig, RateBasis, ReturnFrequency, RiskFreeRate,
};
use crate::domain::simulation::{ContributionPlan, SimulationConfig};
use crate::domain::strategy::relative_strength::{
    DEFAULT_SIGNAL_THRESHOLD, RelativeStrengthParams,
};
use crate::domain::strategy::dual_signal::DualSignalParams;
use crate::domain::strategy::signals::Horizon;
use crate::domain::strategy::trend_filter::TrendFilterParams;
use crate::domain::strategy::trigger::DEFAULT_COOLDOWN_DAYS;
use crate::domain::strategy::{
    Allocation, DualSignal, FixedAllocation, RegimeMapping, RelativeStrength, Strategy,
    TrendFilter, TriggerConfig,
};
use crate::ports::config_port::{self, ConfigPort};
use chrono::NaiveDate;
use std::str::FromStr;

const SIMULATION: &str = "simulation";
const METRICS: &str = "metrics";
const STRATEGY: &str = "strategy";

/// Strategy families selectable with `[strategy] type`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StrategyKind {
    Fixed,
    TrendFilter,
    RelativeStrength,
    DualSignal,
}

impl StrategyKind {
    pub fn as_str(self) -> &'static str {
        match self {
            StrategyKind::Fixed => "fixed",
            StrategyKind::TrendFilter => "trend_filter",
            StrategyKind::RelativeStrength => "relative_strength",
            StrategyKind::DualSignal => "dual_signal",
        }
    }
}

impl FromStr for StrategyKind {
    type Err = SipsimError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "fixed" | "fixed_allocation" | "buy_and_hold" => Ok(StrategyKind::Fixed),
            "trend_filter" | "trend" | "ma_trend" => Ok(StrategyKind::TrendFilter),
            "relative_strength" | "rs" => Ok(StrategyKind::RelativeStrength),
            "dual_signal" | "dual" => Ok(StrategyKind::DualSignal),
            _ => Err(SipsimError::UnknownStrategy {
                name: s.to_string(),
            }),
        }
    }
}

/// Check every section. Nothing is built that a run would not also build.
pub fn validate_config(config: &dyn ConfigPort) -> Result<(), SipsimError> {
    build_simulation_config(config)?;
    build_strategy(config)?;
    Ok(())
}

pub fn build_simulation_config(config: &dyn ConfigPort) -> Result<SimulationConfig, SipsimError> {
    let start_date = required_date(config, SIMULATION, "start_date")?;
    let end_date = required_date(config, SIMULATION, "end_date")?;
    if end_date < start_date {
        return Err(SipsimError::config_invalid(
            SIMULATION,
            "end_date",
            "end_date must not be before start_date",
        ));
    }

    let initial_investment = optional_double(config, SIMULATION, "initial_investment", 0.0)?;
    non_negative(SIMULATION, "initial_investment", initial_investment)?;

    let contribution_amount = optional_double(config, SIMULATION, "contribution_amount", 0.0)?;
    non_negative(SIMULATION, "contribution_amount", contribution_amount)?;
    let contribution_frequency = optional_frequency(
        config,
        SIMULATION,
        "contribution_frequency",
        Frequency::Monthly,
    )?;

    if initial_investment <= 0.0 && contribution_amount <= 0.0 {
        return Err(SipsimError::config_invalid(
            SIMULATION,
            "initial_investment",
            "initial_investment or contribution_amount must be positive",
        ));
    }

    let contribution = (contribution_amount > 0.0 && contribution_frequency != Frequency::Never)
        .then_some(ContributionPlan {
            amount: contribution_amount,
            frequency: contribution_frequency,
        });

    Ok(SimulationConfig {
        start_date,
        end_date,
        initial_investment,
        contribution,
        metrics: build_metrics_config(config)?,
    })
}

pub fn build_metrics_config(config: &dyn ConfigPort) -> Result<MetricsConfig, SipsimError> {
    let defaults = MetricsConfig::default();

    let names = config.get_list(METRICS, "metrics");
    let metrics = if names.is_empty() {
        defaults.metrics
    } else {
        names
            .iter()
            .map(|n| n.parse::<MetricName>())
            .collect::<Result<Vec<_>, _>>()?
    };

    let rate = optional_double(config, METRICS, "risk_free_rate", DEFAULT_RISK_FREE_RATE)?;
    let basis = match config.get_string(METRICS, "risk_free_basis") {
        Some(s) if !s.trim().is_empty() => s.parse::<RateBasis>()?,
        _ => RateBasis::Annual,
    };
    let return_frequency = match config.get_string(METRICS, "return_frequency") {
        Some(s) if !s.trim().is_empty() => s.parse::<ReturnFrequency>()?,
        _ => defaults.return_frequency,
    };

    let metrics = MetricsConfig {
        metrics,
        risk_free_rate: RiskFreeRate { rate, basis },
        return_frequency,
        ..defaults
    };
    metrics.validate()?;
    Ok(metrics)
}

/// Build the strategy named by `[strategy] type`.
pub fn build_strategy(config: &dyn ConfigPort) -> Result<Box<dyn Strategy>, SipsimError> {
    let kind: StrategyKind = required_string(config, STRATEGY, "type")?.parse()?;
    let name = config
        .get_string(STRATEGY, "name")
        .filter(|s| !s.trim().is_empty())
        .unwrap_or_else(|| kind.as_str().to_string());

    let strategy: Box<dyn Strategy> = match kind {
        StrategyKind::Fixed => Box::new(build_fixed(config, name)?),
        StrategyKind::TrendFilter => Box::new(build_trend_filter(config, name)?),
        StrategyKind::RelativeStrength => Box::new(build_relative_strength(config, name)?),
        StrategyKind::DualSignal => Box::new(build_dual_signal(config, name)?),
    };
    Ok(strategy)
}

fn build_fixed(config: &dyn ConfigPort, name: String) -> Result<FixedAllocation, SipsimError> {
    let instruments = config.get_list(STRATEGY, "instruments");
    if instruments.is_empty() {
        return Err(missing(STRATEGY, "instruments"));
    }

    let raw_weights = config.get_list(STRATEGY, "weights");
    let weights: Allocation = if raw_weights.is_empty() {
        instruments.iter().map(|i| (i.clone(), 1.0)).collect()
    } else {
        if raw_weights.len() != instruments.len() {
            return Err(SipsimError::config_invalid(
                STRATEGY,
                "weights",
                format!(
                    "{} weights given for {} instruments",
                    raw_weights.len(),
                    instruments.len()
                ),
            ));
        }
        let parsed = raw_weights
            .iter()
            .map(|w| parse_double(STRATEGY, "weights", w))
            .collect::<Result<Vec<_>, _>>()?;
        instruments.into_iter().zip(parsed).collect()
    };

    let frequency = optional_frequency(config, STRATEGY, "frequency", Frequency::Never)?;
    let step_up = optional_double(config, STRATEGY, "step_up_pct", 0.0)?;
    non_negative(STRATEGY, "step_up_pct", step_up)?;

    Ok(FixedAllocation::new(name, weights, frequency)?
        .with_step_up(step_up)
        .with_min_order_amount(min_order_amount(config)?))
}

fn build_trend_filter(config: &dyn ConfigPort, name: String) -> Result<TrendFilter, SipsimError> {
    let defaults = TrendFilterParams::new(
        required_string(config, STRATEGY, "value")?,
        required_string(config, STRATEGY, "momentum")?,
        required_string(config, STRATEGY, "reference")?,
    );

    let risk_on_weight = optional_double(config, STRATEGY, "risk_on_weight", defaults.risk_on_weight)?;
    unit_interval(STRATEGY, "risk_on_weight", risk_on_weight)?;
    let risk_off_weight =
        optional_double(config, STRATEGY, "risk_off_weight", defaults.risk_off_weight)?;
    unit_interval(STRATEGY, "risk_off_weight", risk_off_weight)?;

    let mapping = match config.get_string(STRATEGY, "regime_mapping") {
        Some(s) if !s.trim().is_empty() => s.parse::<RegimeMapping>()?,
        _ => defaults.mapping,
    };

    let params = TrendFilterParams {
        ma_window: ma_window(config, defaults.ma_window)?,
        risk_on_weight,
        risk_off_weight,
        mapping,
        frequency: optional_frequency(config, STRATEGY, "frequency", defaults.frequency)?,
        min_order_amount: min_order_amount(config)?,
        ..defaults
    };
    Ok(TrendFilter::new(name, params, trigger_config(config, 0.0)?))
}

fn build_relative_strength(
    config: &dyn ConfigPort,
    name: String,
) -> Result<RelativeStrength, SipsimError> {
    let defaults = RelativeStrengthParams::new(
        required_string(config, STRATEGY, "value")?,
        required_string(config, STRATEGY, "momentum")?,
    );
    let (min_weight, max_weight) = weight_bounds(config, defaults.min_weight, defaults.max_weight)?;

    let params = RelativeStrengthParams {
        horizons: horizons(config, defaults.horizons.clone())?,
        sensitivity: optional_double(config, STRATEGY, "sensitivity", defaults.sensitivity)?,
        min_weight,
        max_weight,
        frequency: optional_frequency(config, STRATEGY, "frequency", defaults.frequency)?,
        min_order_amount: min_order_amount(config)?,
        ..defaults
    };
    Ok(RelativeStrength::new(
        name,
        params,
        trigger_config(config, DEFAULT_SIGNAL_THRESHOLD)?,
    ))
}

fn build_dual_signal(config: &dyn ConfigPort, name: String) -> Result<DualSignal, SipsimError> {
    let defaults = DualSignalParams::new(
        required_string(config, STRATEGY, "value")?,
        required_string(config, STRATEGY, "momentum")?,
        required_string(config, STRATEGY, "reference")?,
    );
    let (min_weight, max_weight) = weight_bounds(config, defaults.min_weight, defaults.max_weight)?;

    let params = DualSignalParams {
        ma_window: ma_window(config, defaults.ma_window)?,
        horizons: horizons(config, defaults.horizons.clone())?,
        sensitivity: optional_double(config, STRATEGY, "sensitivity", defaults.sensitivity)?,
        min_weight,
        max_weight,
        frequency: optional_frequency(config, STRATEGY, "frequency", defaults.frequency)?,
        min_order_amount: min_order_amount(config)?,
        ..defaults
    };
    Ok(DualSignal::new(
        name,
        params,
        trigger_config(config, DEFAULT_SIGNAL_THRESHOLD)?,
    ))
}

fn trigger_config(
    config: &dyn ConfigPort,
    default_threshold: f64,
) -> Result<TriggerConfig, SipsimError> {
    let cooldown_days = optional_int(config, STRATEGY, "cooldown_days", DEFAULT_COOLDOWN_DAYS)?;
    if cooldown_days < 0 {
        return Err(SipsimError::config_invalid(
            STRATEGY,
            "cooldown_days",
            "cooldown_days must be non-negative",
        ));
    }
    let threshold = optional_double(config, STRATEGY, "signal_threshold", default_threshold)?;
    non_negative(STRATEGY, "signal_threshold", threshold)?;

    Ok(TriggerConfig {
        enabled: optional_bool(config, STRATEGY, "trigger_enabled", false)?,
        cooldown_days,
        threshold,
    })
}

fn ma_window(config: &dyn ConfigPort, default: usize) -> Result<usize, SipsimError> {
    let window = optional_int(config, STRATEGY, "ma_window", default as i64)?;
    if window < 1 {
        return Err(SipsimError::config_invalid(
            STRATEGY,
            "ma_window",
            "ma_window must be at least 1",
        ));
    }
    Ok(window as usize)
}

fn weight_bounds(
    config: &dyn ConfigPort,
    default_min: f64,
    default_max: f64,
) -> Result<(f64, f64), SipsimError> {
    let min = optional_double(config, STRATEGY, "min_weight", default_min)?;
    unit_interval(STRATEGY, "min_weight", min)?;
    let max = optional_double(config, STRATEGY, "max_weight", default_max)?;
    unit_interval(STRATEGY, "max_weight", max)?;
    if min > max {
        return Err(SipsimError::config_invalid(
            STRATEGY,
            "min_weight",
            "min_weight must not exceed max_weight",
        ));
    }
    Ok((min, max))
}

/// `days:weight` pairs, e.g. `30:0.2, 90:0.3, 180:0.5`.
fn horizons(config: &dyn ConfigPort, default: Vec<Horizon>) -> Result<Vec<Horizon>, SipsimError> {
    let raw = config.get_list(STRATEGY, "horizons");
    if raw.is_empty() {
        return Ok(default);
    }
    raw.iter()
        .map(|entry| {
            let invalid = || {
                SipsimError::config_invalid(
                    STRATEGY,
                    "horizons",
                    format!("expected days:weight, got {entry:?}"),
                )
            };
            let (days, weight) = entry.split_once(':').ok_or_else(invalid)?;
            let days: u64 = days.trim().parse().map_err(|_| invalid())?;
            let weight: f64 = weight.trim().parse().map_err(|_| invalid())?;
            if days == 0 || !weight.is_finite() || weight < 0.0 {
                return Err(invalid());
            }
            Ok(Horizon { days, weight })
        })
        .collect()
}

fn min_order_amount(config: &dyn ConfigPort) -> Result<f64, SipsimError> {
    let amount = optional_double(config, STRATEGY, "min_order_amount", 1.0)?;
    non_negative(STRATEGY, "min_order_amount", amount)?;
    Ok(amount)
}

fn missing(section: &str, key: &str) -> SipsimError {
    SipsimError::ConfigMissing {
        section: section.to_string(),
        key: key.to_string(),
    }
}

fn required_string(config: &dyn ConfigPort, section: &str, key: &str) -> Result<String, SipsimError> {
    match config.get_string(section, key) {
        Some(s) if !s.trim().is_empty() => Ok(s.trim().to_string()),
        _ => Err(missing(section, key)),
    }
}

/// `YYYY-MM-DD` date.
pub fn parse_date(section: &str, key: &str, raw: &str) -> Result<NaiveDate, SipsimError> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d").map_err(|_| {
        SipsimError::config_invalid(section, key, "invalid date format (expected YYYY-MM-DD)")
    })
}

fn required_date(config: &dyn ConfigPort, section: &str, key: &str) -> Result<NaiveDate, SipsimError> {
    parse_date(section, key, &required_string(config, section, key)?)
}

fn parse_double(section: &str, key: &str, raw: &str) -> Result<f64, SipsimError> {
    config_port::parse_double(raw)
        .ok_or_else(|| SipsimError::config_invalid(section, key, format!("{raw:?} is not a number")))
}

fn optional_double(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
    default: f64,
) -> Result<f64, SipsimError> {
    match config.get_string(section, key) {
        Some(s) if !s.trim().is_empty() => parse_double(section, key, &s),
        _ => Ok(default),
    }
}

fn optional_int(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
    default: i64,
) -> Result<i64, SipsimError> {
    match config.get_string(section, key) {
        Some(s) if !s.trim().is_empty() => config_port::parse_int(&s).ok_or_else(|| {
            SipsimError::config_invalid(section, key, format!("{s:?} is not an integer"))
        }),
        _ => Ok(default),
    }
}

fn optional_bool(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
    default: bool,
) -> Result<bool, SipsimError> {
    match config.get_string(section, key) {
        Some(s) if !s.trim().is_empty() => config_port::parse_bool(&s).ok_or_else(|| {
            SipsimError::config_invalid(section, key, format!("{s:?} is not a boolean"))
        }),
        _ => Ok(default),
    }
}

fn optional_frequency(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
    default: Frequency,
) -> Result<Frequency, SipsimError> {
    match config.get_string(section, key) {
        Some(s) if !s.trim().is_empty() => s.parse(),
        _ => Ok(default),
    }
}

fn non_negative(section: &str, key: &str, value: f64) -> Result<(), SipsimError> {
    if value < 0.0 {
        return Err(SipsimError::config_invalid(
            section,
            key,
            format!("{key} must be non-negative"),
        ));
    }
    Ok(())
}

fn unit_interval(section: &str, key: &str, value: f64) -> Result<(), SipsimError> {
    if !(0.0..=1.0).contains(&value) {
        return Err(SipsimError::config_invalid(
            section,
            key,
            format!("{key} must be between 0 and 1"),
        ));
    }
    Ok(())
}
