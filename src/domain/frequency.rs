//! Rebalance and contribution cadences.

use crate::domain::error::SipsimError;
use chrono::{Datelike, NaiveDate};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Frequency {
    Daily,
    Weekly,
    Monthly,
    Quarterly,
    SemiAnnual,
    Annual,
    Never,
}

impl Frequency {
    /// Whether `date` opens a new period relative to the previous calendar
    /// date. The first calendar date (no previous) is never due, even when it
    /// falls on a period boundary: the seed date carries the initial
    /// investment only, and the first contribution lands in the next period.
    ///
    /// Holidays cannot swallow a period: if the 1st of a month is not a
    /// trading date, the first trading date after it is due instead.
    pub fn is_due(self, date: NaiveDate, previous: Option<NaiveDate>) -> bool {
        let Some(prev) = previous else {
            return false;
        };
        match self {
            Frequency::Never => false,
            Frequency::Daily => true,
            Frequency::Weekly => {
                let (a, b) = (date.iso_week(), prev.iso_week());
                (a.year(), a.week()) != (b.year(), b.week())
            }
            Frequency::Monthly => period_key(date, 1) != period_key(prev, 1),
            Frequency::Quarterly => period_key(date, 3) != period_key(prev, 3),
            Frequency::SemiAnnual => period_key(date, 6) != period_key(prev, 6),
            Frequency::Annual => date.year() != prev.year(),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Frequency::Daily => "daily",
            Frequency::Weekly => "weekly",
            Frequency::Monthly => "monthly",
            Frequency::Quarterly => "quarterly",
            Frequency::SemiAnnual => "semi-annual",
            Frequency::Annual => "annual",
            Frequency::Never => "never",
        }
    }
}

fn period_key(date: NaiveDate, months: u32) -> (i32, u32) {
    (date.year(), (date.month() - 1) / months)
}

impl FromStr for Frequency {
    type Err = SipsimError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "daily" => Ok(Frequency::Daily),
            "weekly" => Ok(Frequency::Weekly),
            "monthly" => Ok(Frequency::Monthly),
            "quarterly" => Ok(Frequency::Quarterly),
            "semi-annual" | "semi-annually" | "semiannual" | "half-yearly" => {
                Ok(Frequency::SemiAnnual)
            }
            "annual" | "annually" | "yearly" => Ok(Frequency::Annual),
            "never" | "none" => Ok(Frequency::Never),
            _ => Err(SipsimError::UnsupportedFrequency {
                value: s.to_string(),
            }),
        }
    }
}

impl fmt::Display for Frequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
