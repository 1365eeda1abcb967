use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::workflows::readings::domain::{CheckResult, Chemistry, EquipmentStatus, FieldCheck};

const STANDARD_VERSION: &str = "2024.1";

/// Absolute block-voltage limits used for battery condition monitors.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BcmLimits {
    pub replace_floor: f64,
    pub replace_low: f64,
    pub monitor_low: f64,
}

/// Percent-of-reference bands for the two conductance instrument scales.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConductanceBands {
    pub conductance_monitor_pct: f64,
    pub conductance_replace_pct: f64,
    pub impedance_monitor_pct: f64,
    pub impedance_replace_pct: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TypeValueOffsets {
    pub replace: f64,
    pub monitor: f64,
}

/// One row of the field-to-severity table consulted by the status reducer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeverityRule {
    pub field: FieldCheck,
    pub bad: CheckResult,
    pub severity: EquipmentStatus,
}

impl SeverityRule {
    const fn fail(field: FieldCheck, severity: EquipmentStatus) -> Self {
        Self {
            field,
            bad: CheckResult::Fail,
            severity,
        }
    }
}

/// Versioned numeric policy: lifetimes, nominal voltages, fixed limits, and field severities.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyTable {
    pub version: String,
    pub lifetimes: BTreeMap<Chemistry, u32>,
    pub nominal_cell_voltage: BTreeMap<Chemistry, f64>,
    pub bcm: BcmLimits,
    pub conductance: ConductanceBands,
    pub type_value: TypeValueOffsets,
    pub severity_rules: Vec<SeverityRule>,
}

impl PolicyTable {
    pub fn standard() -> Self {
        let lifetimes = BTreeMap::from([
            (Chemistry::Vrla, 5),
            (Chemistry::Flooded, 20),
            (Chemistry::NiCad, 20),
            (Chemistry::LithiumIon, 10),
        ]);

        let nominal_cell_voltage = BTreeMap::from([
            (Chemistry::Vrla, 2.11),
            (Chemistry::Flooded, 2.06),
            (Chemistry::NiCad, 1.2),
            (Chemistry::LithiumIon, 3.2),
        ]);

        let severity_rules = vec![
            SeverityRule::fail(
                FieldCheck::ChargingVoltage,
                EquipmentStatus::CriticalDeficiency,
            ),
            SeverityRule::fail(
                FieldCheck::TerminalTorque,
                EquipmentStatus::OnlineMajorDeficiency,
            ),
            SeverityRule::fail(
                FieldCheck::IntercellConnectors,
                EquipmentStatus::OnlineMajorDeficiency,
            ),
            SeverityRule::fail(
                FieldCheck::ElectrolyteLevel,
                EquipmentStatus::OnlineMajorDeficiency,
            ),
            SeverityRule::fail(
                FieldCheck::RippleCurrent,
                EquipmentStatus::OnlineMinorDeficiency,
            ),
            SeverityRule::fail(
                FieldCheck::CaseCondition,
                EquipmentStatus::OnlineMinorDeficiency,
            ),
            SeverityRule::fail(FieldCheck::VentCaps, EquipmentStatus::OnlineMinorDeficiency),
            SeverityRule::fail(
                FieldCheck::AmbientTemperature,
                EquipmentStatus::OnlineMinorDeficiency,
            ),
            SeverityRule::fail(
                FieldCheck::Cleanliness,
                EquipmentStatus::OnlineMinorDeficiency,
            ),
        ];

        Self {
            version: STANDARD_VERSION.to_string(),
            lifetimes,
            nominal_cell_voltage,
            bcm: BcmLimits {
                replace_floor: 0.0,
                replace_low: 24.0,
                monitor_low: 25.6,
            },
            conductance: ConductanceBands {
                conductance_monitor_pct: 0.70,
                conductance_replace_pct: 0.60,
                impedance_monitor_pct: 1.40,
                impedance_replace_pct: 1.50,
            },
            type_value: TypeValueOffsets {
                replace: 0.2,
                monitor: 0.5,
            },
            severity_rules,
        }
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, PolicyError> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|source| PolicyError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_reader(BufReader::new(file))
    }

    pub fn from_reader<R: Read>(reader: R) -> Result<Self, PolicyError> {
        let table: PolicyTable = serde_json::from_reader(reader)?;
        table.validate()?;
        Ok(table)
    }

    pub fn validate(&self) -> Result<(), PolicyError> {
        if self.version.trim().is_empty() {
            return Err(PolicyError::Invalid("version must not be empty".to_string()));
        }

        if let Some((chemistry, _)) = self.lifetimes.iter().find(|(_, years)| **years == 0) {
            return Err(PolicyError::Invalid(format!(
                "lifetime for {} must be at least one year",
                chemistry.label()
            )));
        }

        let bands = &self.conductance;
        let percentages = [
            bands.conductance_monitor_pct,
            bands.conductance_replace_pct,
            bands.impedance_monitor_pct,
            bands.impedance_replace_pct,
        ];
        if percentages
            .iter()
            .any(|pct| !pct.is_finite() || *pct <= 0.0)
        {
            return Err(PolicyError::Invalid(
                "conductance percentages must be positive".to_string(),
            ));
        }

        if self.bcm.replace_low > self.bcm.monitor_low {
            return Err(PolicyError::Invalid(
                "BCM replace limit must not exceed the monitor limit".to_string(),
            ));
        }

        Ok(())
    }

    pub fn lifetime_for(&self, chemistry: Chemistry) -> Option<u32> {
        self.lifetimes.get(&chemistry).copied()
    }

    pub fn nominal_cell_voltage_for(&self, chemistry: Chemistry) -> Option<f64> {
        self.nominal_cell_voltage.get(&chemistry).copied()
    }
}

impl Default for PolicyTable {
    fn default() -> Self {
        Self::standard()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PolicyError {
    #[error("unable to read policy table {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid policy table JSON: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("policy table rejected: {0}")]
    Invalid(String),
}
