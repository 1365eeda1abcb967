use serde::{Deserialize, Serialize};

use super::DeficiencyError;
use crate::workflows::readings::domain::{
    ConductanceScale, DeviceSubType, HeaderRecord, ReadingType, Topology,
};
use crate::workflows::readings::thresholds::{Direction, PolicyTable, Thresholds};

/// Remote inputs gathered before derivation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ThresholdInputs {
    pub base: Option<Thresholds>,
    pub reference_value: Option<f64>,
}

/// Which derivation rule produced the thresholds; logged with every recompute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DerivationRule {
    ConductanceReference,
    BcmAbsolute,
    PackScaled,
    TypeValue,
    Base,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConductanceCheck {
    pub thresholds: Thresholds,
    pub direction: Direction,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DerivedThresholds {
    pub rule: DerivationRule,
    pub voltage: Thresholds,
    pub conductance: Option<ConductanceCheck>,
}

/// Uses the conductance channel in addition to voltage.
pub fn uses_conductance(header: &HeaderRecord) -> bool {
    header.reading_type == ReadingType::Conductance
        && header.device_sub_type != DeviceSubType::Bcm
}

pub fn derive_thresholds(
    header: &HeaderRecord,
    row_count: usize,
    inputs: &ThresholdInputs,
    policy: &PolicyTable,
) -> Result<DerivedThresholds, DeficiencyError> {
    let base = || inputs.base.ok_or(DeficiencyError::MissingBaseThresholds);

    if uses_conductance(header) {
        let reference = inputs
            .reference_value
            .filter(|value| value.is_finite() && *value > 0.0)
            .ok_or_else(|| DeficiencyError::MissingReferenceValue {
                model: header.model.clone(),
            })?;

        let bands = &policy.conductance;
        let conductance = match header.conductance_scale {
            ConductanceScale::Conductance => ConductanceCheck {
                thresholds: Thresholds::floors(
                    reference * bands.conductance_replace_pct,
                    reference * bands.conductance_monitor_pct,
                ),
                direction: Direction::LowIsBad,
            },
            ConductanceScale::Impedance => ConductanceCheck {
                thresholds: Thresholds::floors(
                    reference * bands.impedance_replace_pct,
                    reference * bands.impedance_monitor_pct,
                ),
                direction: Direction::HighIsBad,
            },
        };

        return Ok(DerivedThresholds {
            rule: DerivationRule::ConductanceReference,
            voltage: base()?,
            conductance: Some(conductance),
        });
    }

    if header.reading_type == ReadingType::Voltage && header.device_sub_type == DeviceSubType::Bcm
    {
        let limits = &policy.bcm;
        return Ok(DerivedThresholds {
            rule: DerivationRule::BcmAbsolute,
            voltage: Thresholds::bands(
                limits.replace_floor,
                limits.replace_low,
                limits.replace_low,
                limits.monitor_low,
            ),
            conductance: None,
        });
    }

    if header.configuration.topology == Topology::PackOrTray {
        let factor = f64::from(header.configuration.units_per_group);
        return Ok(DerivedThresholds {
            rule: DerivationRule::PackScaled,
            voltage: base()?.scaled(factor),
            conductance: None,
        });
    }

    if header.reading_type == ReadingType::TypeValue {
        let nominal = policy
            .nominal_cell_voltage_for(header.chemistry)
            .ok_or(DeficiencyError::UnknownChemistry(header.chemistry))?;
        let string_nominal = nominal * row_count as f64;
        return Ok(DerivedThresholds {
            rule: DerivationRule::TypeValue,
            voltage: Thresholds::floors(
                string_nominal + policy.type_value.replace,
                string_nominal + policy.type_value.monitor,
            ),
            conductance: None,
        });
    }

    Ok(DerivedThresholds {
        rule: DerivationRule::Base,
        voltage: base()?,
        conductance: None,
    })
}
