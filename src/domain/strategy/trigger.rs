//! Cooldown-gated trigger detection.

use crate::domain::strategy::signals::Regime;
use chrono::NaiveDate;

pub const DEFAULT_COOLDOWN_DAYS: i64 = 21;

/// A strategy signal that can be compared against its previous value.
pub trait Signal: Clone + std::fmt::Debug {
    /// Whether `self` is a material change from `previous`.
    fn differs_from(&self, previous: &Self, threshold: f64) -> bool;
}

impl Signal for Regime {
    fn differs_from(&self, previous: &Self, _threshold: f64) -> bool {
        self != previous
    }
}

impl Signal for f64 {
    fn differs_from(&self, previous: &Self, threshold: f64) -> bool {
        let change = (self - previous).abs();
        change > 0.0 && change >= threshold
    }
}

/// Regime flip, or a continuous component moving past the threshold.
impl Signal for (Regime, f64) {
    fn differs_from(&self, previous: &Self, threshold: f64) -> bool {
        self.0 != previous.0 || self.1.differs_from(&previous.1, threshold)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TriggerConfig {
    pub enabled: bool,
    /// Minimum calendar days between two triggered rebalances.
    pub cooldown_days: i64,
    /// Minimum absolute change for continuous signals.
    pub threshold: f64,
}

impl Default for TriggerConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            cooldown_days: DEFAULT_COOLDOWN_DAYS,
            threshold: 0.0,
        }
    }
}

/// Last recorded signal, last trigger date and trigger count.
#[derive(Debug, Clone)]
pub struct TriggerState<S: Signal> {
    config: TriggerConfig,
    last_signal: Option<S>,
    last_trigger: Option<NaiveDate>,
    count: usize,
}

impl<S: Signal> TriggerState<S> {
    pub fn new(config: TriggerConfig) -> Self {
        Self {
            config,
            last_signal: None,
            last_trigger: None,
            count: 0,
        }
    }

    pub fn config(&self) -> &TriggerConfig {
        &self.config
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    pub fn last_signal(&self) -> Option<&S> {
        self.last_signal.as_ref()
    }

    pub fn last_trigger(&self) -> Option<NaiveDate> {
        self.last_trigger
    }

    pub fn count(&self) -> usize {
        self.count
    }

    /// Feed today's signal. Returns true when a triggered rebalance should
    /// run; the signal and date are then recorded as the new baseline.
    ///
    /// The first observation only sets the baseline.
    pub fn check(&mut self, date: NaiveDate, signal: S) -> bool {
        if !self.config.enabled {
            return false;
        }
        let Some(previous) = &self.last_signal else {
            self.last_signal = Some(signal);
            return false;
        };
        let cooling_down = self
            .last_trigger
            .is_some_and(|last| (date - last).num_days() < self.config.cooldown_days);
        if cooling_down {
            return false;
        }
        if !signal.differs_from(previous, self.config.threshold) {
            return false;
        }

        self.last_signal = Some(signal);
        self.last_trigger = Some(date);
        self.count += 1;
        true
    }

    /// Refresh the baseline after a scheduled rebalance.
    pub fn record(&mut self, signal: S) {
        if self.config.enabled {
            self.last_signal = Some(signal);
        }
    }
}
