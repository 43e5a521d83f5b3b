//! Market signals shared by the adaptive strategies.

use crate::domain::error::SipsimError;
use crate::domain::price::{MarketView, PricePoint};
use chrono::Days;
use std::fmt;
use std::str::FromStr;

/// Trend regime of a reference instrument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Regime {
    RiskOn,
    RiskOff,
    /// Not enough history for the moving average.
    Neutral,
}

impl fmt::Display for Regime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Regime::RiskOn => "risk-on",
            Regime::RiskOff => "risk-off",
            Regime::Neutral => "neutral",
        })
    }
}

/// Direction in which a regime maps onto the momentum allocation.
///
/// `Direct` tilts towards momentum when risk-on; `Inverted` tilts towards
/// value when risk-on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RegimeMapping {
    #[default]
    Direct,
    Inverted,
}

impl RegimeMapping {
    pub fn momentum_weight(self, regime: Regime, risk_on_weight: f64, risk_off_weight: f64) -> f64 {
        match (self, regime) {
            (_, Regime::Neutral) => 0.5,
            (RegimeMapping::Direct, Regime::RiskOn) | (RegimeMapping::Inverted, Regime::RiskOff) => {
                risk_on_weight
            }
            (RegimeMapping::Direct, Regime::RiskOff) | (RegimeMapping::Inverted, Regime::RiskOn) => {
                risk_off_weight
            }
        }
    }
}

impl FromStr for RegimeMapping {
    type Err = SipsimError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "direct" => Ok(RegimeMapping::Direct),
            "inverted" => Ok(RegimeMapping::Inverted),
            other => Err(SipsimError::config_invalid(
                "strategy",
                "regime_mapping",
                format!("expected direct or inverted, got {other:?}"),
            )),
        }
    }
}

/// Compare the latest price with its `window`-observation simple moving
/// average. Price at or above the average is risk-on.
pub fn sma_regime(history: &[PricePoint], window: usize) -> Regime {
    if window == 0 || history.len() < window {
        return Regime::Neutral;
    }
    let tail = &history[history.len() - window..];
    let sma = tail.iter().map(|p| p.price).sum::<f64>() / window as f64;
    let current = tail[window - 1].price;
    if current >= sma {
        Regime::RiskOn
    } else {
        Regime::RiskOff
    }
}

/// Lookback horizon in calendar days with its blend weight.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Horizon {
    pub days: u64,
    pub weight: f64,
}

pub fn default_horizons() -> Vec<Horizon> {
    vec![
        Horizon { days: 30, weight: 0.2 },
        Horizon { days: 90, weight: 0.3 },
        Horizon { days: 180, weight: 0.5 },
    ]
}

/// Weighted average of momentum-minus-value returns across horizons.
///
/// Horizons lacking a price at either end are skipped and the remaining
/// weights renormalized. `None` when no horizon is usable.
pub fn relative_strength_edge(
    market: MarketView<'_>,
    momentum: &str,
    value: &str,
    horizons: &[Horizon],
) -> Option<f64> {
    let today = market.date();
    let m_now = market.price_on_or_before(momentum, today)?;
    let v_now = market.price_on_or_before(value, today)?;

    let mut edge = 0.0;
    let mut total_weight = 0.0;
    for h in horizons {
        let Some(past) = today.checked_sub_days(Days::new(h.days)) else {
            continue;
        };
        let (Some(m_then), Some(v_then)) = (
            market.price_on_or_before(momentum, past),
            market.price_on_or_before(value, past),
        ) else {
            continue;
        };
        edge += ((m_now / m_then - 1.0) - (v_now / v_then - 1.0)) * h.weight;
        total_weight += h.weight;
    }

    (total_weight > 0.0).then(|| edge / total_weight)
}

/// Unclipped momentum weight implied by relative strength; 0.5 without data.
pub fn relative_strength_weight(
    market: MarketView<'_>,
    momentum: &str,
    value: &str,
    horizons: &[Horizon],
    sensitivity: f64,
) -> f64 {
    relative_strength_edge(market, momentum, value, horizons)
        .map_or(0.5, |edge| 0.5 + sensitivity * edge)
}
