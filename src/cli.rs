//! CLI definition and dispatch.
//!
//! Results go to stdout; diagnostics go through `tracing` to stderr.

use clap::{Parser, Subcommand};
use std::collections::BTreeSet;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::{info, warn};

use crate::adapters::csv_adapter::CsvAdapter;
use crate::adapters::file_config_adapter::FileConfigAdapter;
use crate::domain::config_validation::{build_simulation_config, build_strategy, validate_config};
use crate::domain::error::SipsimError;
use crate::domain::metrics::MetricName;
use crate::domain::price::Market;
use crate::domain::simulation::{self, SimulationResult};
use crate::domain::sweep::{ParamSweep, SweepResults};
use crate::domain::transaction::RebalanceKind;
use crate::ports::config_port::{ConfigPort, parse_bool, parse_double, parse_int};
use crate::ports::data_port::PriceSeriesPort;

#[derive(Parser, Debug)]
#[command(
    name = "sipsim",
    about = "Backtest lump-sum and recurring-contribution investment strategies"
)]
pub struct Cli {
    /// Log at debug level (RUST_LOG takes precedence)
    #[arg(short, long, global = true)]
    pub verbose: bool,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run one simulation and print its metrics
    Run {
        #[arg(short, long)]
        config: PathBuf,
        /// Directory of <instrument>.csv price files
        #[arg(short, long)]
        data_dir: Option<PathBuf>,
    },
    /// Validate a configuration without running it
    Validate {
        #[arg(short, long)]
        config: PathBuf,
    },
    /// Run once per value of a single [strategy] key
    Sweep {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(short, long)]
        data_dir: Option<PathBuf>,
        /// Strategy key to vary, e.g. ma_window
        #[arg(long)]
        key: String,
        /// Comma-separated values for the key
        #[arg(long, value_delimiter = ',', required = true)]
        values: Vec<String>,
        /// Metric to rank runs by
        #[arg(long, default_value = "xirr")]
        rank_by: String,
        /// Run one value at a time
        #[arg(long)]
        sequential: bool,
    },
    /// List instruments available in the data directory
    List {
        #[arg(short, long)]
        data_dir: Option<PathBuf>,
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
    /// Show date range and observation count per instrument
    Info {
        /// Instrument to describe; all instruments when omitted
        #[arg(long)]
        instrument: Option<String>,
        #[arg(short, long)]
        data_dir: Option<PathBuf>,
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

pub fn run(cli: Cli) -> ExitCode {
    let outcome = match cli.command {
        Command::Run { config, data_dir } => run_single(&config, data_dir.as_deref()),
        Command::Validate { config } => run_validate(&config),
        Command::Sweep {
            config,
            data_dir,
            key,
            values,
            rank_by,
            sequential,
        } => run_sweep_command(
            &config,
            data_dir.as_deref(),
            &key,
            &values,
            &rank_by,
            !sequential,
        ),
        Command::List { data_dir, config } => run_list(data_dir.as_deref(), config.as_deref()),
        Command::Info {
            instrument,
            data_dir,
            config,
        } => run_info(instrument.as_deref(), data_dir.as_deref(), config.as_deref()),
    };

    match outcome {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            (&e).into()
        }
    }
}

pub fn load_config(path: &Path) -> Result<FileConfigAdapter, SipsimError> {
    info!(path = %path.display(), "loading config");
    FileConfigAdapter::from_file(path)
}

/// `--data-dir` wins over `[simulation] data_dir`.
pub fn resolve_data_dir(
    data_dir: Option<&Path>,
    config: Option<&dyn ConfigPort>,
) -> Result<PathBuf, SipsimError> {
    if let Some(dir) = data_dir {
        return Ok(dir.to_path_buf());
    }
    config
        .and_then(|c| c.get_string("simulation", "data_dir"))
        .filter(|s| !s.trim().is_empty())
        .map(|s| PathBuf::from(s.trim()))
        .ok_or_else(|| SipsimError::ConfigMissing {
            section: "simulation".into(),
            key: "data_dir".into(),
        })
}

/// Fetch every instrument up front; nothing is read once a run starts.
pub fn load_market<'a>(
    port: &dyn PriceSeriesPort,
    instruments: impl IntoIterator<Item = &'a String>,
) -> Result<Market, SipsimError> {
    let mut market = Market::default();
    for instrument in instruments {
        market.insert(port.get_prices(instrument)?);
    }
    Ok(market)
}

/// Validate, load prices and run the configured strategy once.
pub fn run_simulation(
    config: &dyn ConfigPort,
    port: &dyn PriceSeriesPort,
) -> Result<SimulationResult, SipsimError> {
    validate_config(config)?;
    let sim_config = build_simulation_config(config)?;
    let mut strategy = build_strategy(config)?;
    let market = load_market(port, &strategy.instruments())?;
    simulation::run(&sim_config, &market, strategy.as_mut())
}

/// A config view with one key replaced. Typed getters parse the override
/// the same way the config builders do; the builders read through
/// `get_string` and reject what does not parse.
pub struct OverrideConfig<'a> {
    inner: &'a dyn ConfigPort,
    section: String,
    key: String,
    value: String,
}

impl<'a> OverrideConfig<'a> {
    pub fn new(inner: &'a dyn ConfigPort, section: &str, key: &str, value: &str) -> Self {
        Self {
            inner,
            section: section.to_string(),
            key: key.to_string(),
            value: value.to_string(),
        }
    }

    fn overridden(&self, section: &str, key: &str) -> Option<&str> {
        (self.section.eq_ignore_ascii_case(section) && self.key.eq_ignore_ascii_case(key))
            .then_some(self.value.as_str())
    }
}

impl ConfigPort for OverrideConfig<'_> {
    fn get_string(&self, section: &str, key: &str) -> Option<String> {
        match self.overridden(section, key) {
            Some(v) => Some(v.to_string()),
            None => self.inner.get_string(section, key),
        }
    }

    fn get_int(&self, section: &str, key: &str, default: i64) -> i64 {
        match self.overridden(section, key) {
            Some(v) => parse_int(v).unwrap_or(default),
            None => self.inner.get_int(section, key, default),
        }
    }

    fn get_double(&self, section: &str, key: &str, default: f64) -> f64 {
        match self.overridden(section, key) {
            Some(v) => parse_double(v).unwrap_or(default),
            None => self.inner.get_double(section, key, default),
        }
    }

    fn get_bool(&self, section: &str, key: &str, default: bool) -> bool {
        match self.overridden(section, key) {
            Some(v) => parse_bool(v).unwrap_or(default),
            None => self.inner.get_bool(section, key, default),
        }
    }
}

/// One run per value of `[strategy] key`. Every value is validated and
/// its instruments loaded before the first run starts.
pub fn run_sweep(
    config: &(dyn ConfigPort + Sync),
    port: &dyn PriceSeriesPort,
    key: &str,
    values: &[String],
    parallel: bool,
) -> Result<SweepResults, SipsimError> {
    if values.is_empty() {
        return Err(SipsimError::config_invalid(
            "strategy",
            key,
            "at least one sweep value is required",
        ));
    }
    let sim_config = build_simulation_config(config)?;

    let mut instruments = BTreeSet::new();
    for value in values {
        let strategy = build_strategy(&OverrideConfig::new(config, "strategy", key, value))?;
        instruments.extend(strategy.instruments());
    }
    let market = load_market(port, &instruments)?;

    info!(key, runs = values.len(), parallel, "starting sweep");
    ParamSweep::new(&sim_config, &market)
        .with_parallelism(parallel)
        .sweep(values, |value| {
            build_strategy(&OverrideConfig::new(config, "strategy", key, value))
        })
}

fn run_single(config_path: &Path, data_dir: Option<&Path>) -> Result<(), SipsimError> {
    let config = load_config(config_path)?;
    let port = CsvAdapter::new(resolve_data_dir(data_dir, Some(&config as &dyn ConfigPort))?);
    let result = run_simulation(&config, &port)?;
    print!("{}", format_summary(&result));
    Ok(())
}

fn run_validate(config_path: &Path) -> Result<(), SipsimError> {
    let config = load_config(config_path)?;
    validate_config(&config)?;

    let sim = build_simulation_config(&config)?;
    let strategy = build_strategy(&config)?;
    println!("Config is valid");
    println!("  strategy:    {} ({})", strategy.name(), strategy.frequency());
    println!("  instruments: {}", strategy.instruments().join(", "));
    println!("  window:      {} to {}", sim.start_date, sim.end_date);
    println!("  initial:     {:.2}", sim.initial_investment);
    match &sim.contribution {
        Some(plan) => println!("  contribute:  {:.2} {}", plan.amount, plan.frequency),
        None => println!("  contribute:  none"),
    }
    let metrics: Vec<&str> = sim.metrics.metrics.iter().map(|m| m.as_str()).collect();
    println!("  metrics:     {}", metrics.join(", "));
    Ok(())
}

fn run_sweep_command(
    config_path: &Path,
    data_dir: Option<&Path>,
    key: &str,
    values: &[String],
    rank_by: &str,
    parallel: bool,
) -> Result<(), SipsimError> {
    let rank_by: MetricName = rank_by.parse()?;
    let config = load_config(config_path)?;
    let port = CsvAdapter::new(resolve_data_dir(data_dir, Some(&config as &dyn ConfigPort))?);
    let results = run_sweep(&config, &port, key, values, parallel)?;
    print!("{}", format_sweep(key, rank_by, &results));
    Ok(())
}

fn run_list(data_dir: Option<&Path>, config_path: Option<&Path>) -> Result<(), SipsimError> {
    let port = CsvAdapter::new(data_dir_from_args(data_dir, config_path)?);
    let instruments = port.list_instruments()?;
    if instruments.is_empty() {
        warn!("no instruments found");
    }
    for instrument in &instruments {
        println!("{instrument}");
    }
    Ok(())
}

fn run_info(
    instrument: Option<&str>,
    data_dir: Option<&Path>,
    config_path: Option<&Path>,
) -> Result<(), SipsimError> {
    let port = CsvAdapter::new(data_dir_from_args(data_dir, config_path)?);
    let instruments = match instrument {
        Some(i) => vec![i.to_string()],
        None => port.list_instruments()?,
    };

    for instrument in &instruments {
        match port.get_data_range(instrument)? {
            Some((first, last, count)) => {
                println!("{instrument}: {first} to {last} ({count} observations)")
            }
            None => println!("{instrument}: no data"),
        }
    }
    Ok(())
}

fn data_dir_from_args(
    data_dir: Option<&Path>,
    config_path: Option<&Path>,
) -> Result<PathBuf, SipsimError> {
    let config = config_path.map(load_config).transpose()?;
    resolve_data_dir(data_dir, config.as_ref().map(|c| c as &dyn ConfigPort))
}

pub fn format_summary(result: &SimulationResult) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Strategy:        {}", result.strategy_name);
    let _ = writeln!(out, "Period:          {} to {}", result.start_date, result.end_date);
    let _ = writeln!(out, "Total invested:  {:.2}", result.total_invested);
    let _ = writeln!(out, "Final value:     {:.2}", result.final_value);
    let _ = writeln!(out, "Realized gain:   {:.2}", result.total_realized_gain());

    let _ = writeln!(out, "\nMetrics:");
    for (name, value) in result.metrics.iter() {
        let _ = writeln!(out, "  {:<14} {}", name.as_str(), value);
    }

    let _ = writeln!(out, "\nRebalances:");
    for kind in [RebalanceKind::Scheduled, RebalanceKind::Triggered] {
        let _ = writeln!(out, "  {:<14} {}", kind.as_str(), result.rebalance_count(kind));
    }

    let _ = writeln!(out, "\nFinal holdings:");
    for (instrument, units) in &result.final_holdings {
        let _ = writeln!(out, "  {instrument:<14} {units:.4}");
    }
    out
}

pub fn format_sweep(key: &str, rank_by: MetricName, results: &SweepResults) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "{:<16} {:>14} {:>14} {:>12}",
        key,
        "final_value",
        "invested",
        rank_by.as_str()
    );
    for run in results.ranked_by(rank_by) {
        let metric = run
            .result
            .metrics
            .get(rank_by)
            .map(|v| v.to_string())
            .unwrap_or_else(|| "-".to_string());
        let _ = writeln!(
            out,
            "{:<16} {:>14.2} {:>14.2} {:>12}",
            run.value, run.result.final_value, run.result.total_invested, metric
        );
    }
    out
}
