use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Presentation unit for summed durations, which are kept in seconds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DurationUnit {
    #[default]
    Seconds,
    Minutes,
    Hours,
    Days,
}

impl DurationUnit {
    pub fn as_str(&self) -> &'static str {
        match self {
            DurationUnit::Seconds => "seconds",
            DurationUnit::Minutes => "minutes",
            DurationUnit::Hours => "hours",
            DurationUnit::Days => "days",
        }
    }

    /// Minutes round to whole numbers, hours and days to one decimal.
    pub fn convert(&self, seconds: f64) -> f64 {
        match self {
            DurationUnit::Seconds => seconds,
            DurationUnit::Minutes => (seconds / 60.0).round(),
            DurationUnit::Hours => round_tenths(seconds / 3_600.0),
            DurationUnit::Days => round_tenths(seconds / 86_400.0),
        }
    }
}

fn round_tenths(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

impl fmt::Display for DurationUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DurationUnit {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "seconds" | "s" => Ok(DurationUnit::Seconds),
            "minutes" | "m" => Ok(DurationUnit::Minutes),
            "hours" | "h" => Ok(DurationUnit::Hours),
            "days" | "d" => Ok(DurationUnit::Days),
            other => Err(format!("unknown duration unit `{other}`")),
        }
    }
}
