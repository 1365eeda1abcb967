//! Threshold classification of single measurements and the versioned policy table that
//! supplies the numeric limits.

mod table;

pub use table::{
    BcmLimits, ConductanceBands, PolicyError, PolicyTable, SeverityRule, TypeValueOffsets,
};

use serde::{Deserialize, Serialize};

use super::domain::Verdict;

/// Which side of a threshold is considered worse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// Values at or below the threshold are worse (float voltage, conductance).
    LowIsBad,
    /// Values above the threshold are worse (impedance scales).
    HighIsBad,
}

/// Replace/monitor limits for one channel.
///
/// With both ceilings present a low-is-bad classification uses half-open bands
/// `[floor, ceiling)`; otherwise the floors act as inclusive upper bounds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Thresholds {
    pub replace: f64,
    pub monitor: f64,
    #[serde(default)]
    pub replace_ceiling: Option<f64>,
    #[serde(default)]
    pub monitor_ceiling: Option<f64>,
}

impl Thresholds {
    pub fn floors(replace: f64, monitor: f64) -> Self {
        Self {
            replace,
            monitor,
            replace_ceiling: None,
            monitor_ceiling: None,
        }
    }

    pub fn bands(
        replace_floor: f64,
        replace_ceiling: f64,
        monitor_floor: f64,
        monitor_ceiling: f64,
    ) -> Self {
        Self {
            replace: replace_floor,
            monitor: monitor_floor,
            replace_ceiling: Some(replace_ceiling),
            monitor_ceiling: Some(monitor_ceiling),
        }
    }

    pub fn scaled(self, factor: f64) -> Self {
        Self {
            replace: self.replace * factor,
            monitor: self.monitor * factor,
            replace_ceiling: self.replace_ceiling.map(|value| value * factor),
            monitor_ceiling: self.monitor_ceiling.map(|value| value * factor),
        }
    }
}

/// Classifies one measurement against its thresholds.
pub fn classify(value: f64, thresholds: &Thresholds, direction: Direction) -> Verdict {
    if !value.is_finite() {
        return Verdict::Pass;
    }

    match direction {
        Direction::LowIsBad => match (thresholds.replace_ceiling, thresholds.monitor_ceiling) {
            (Some(replace_ceiling), Some(monitor_ceiling)) => {
                if value >= thresholds.replace && value < replace_ceiling {
                    Verdict::Replace
                } else if value >= thresholds.monitor && value < monitor_ceiling {
                    Verdict::Monitor
                } else {
                    Verdict::Pass
                }
            }
            _ => {
                if value <= thresholds.replace {
                    Verdict::Replace
                } else if value <= thresholds.monitor {
                    Verdict::Monitor
                } else {
                    Verdict::Pass
                }
            }
        },
        Direction::HighIsBad => {
            if value > thresholds.replace {
                Verdict::Replace
            } else if value > thresholds.monitor {
                Verdict::Monitor
            } else {
                Verdict::Pass
            }
        }
    }
}
