use super::domain::{HeaderRecord, ReconciledField, Reading, Topology, UnitConfiguration};

pub const MAX_UNITS_PER_GROUP: u32 = 480;
pub const MAX_GROUP_COUNT: u32 = 64;

/// Field-completeness and range failures raised before any write.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationError {
    #[error("{0} is required")]
    MissingField(&'static str),
    #[error("{field} must be between {min} and {max} (found {found})")]
    OutOfRange {
        field: &'static str,
        min: u32,
        max: u32,
        found: u32,
    },
    #[error("expected {expected} rows but {found} are present; apply the configuration change first")]
    RowCountMismatch { expected: u32, found: u32 },
    #[error("row {index} has an invalid {channel} reading")]
    InvalidReading { index: u32, channel: &'static str },
    #[error("reconciliation has not been verified; confirm the declared make, model, serial number, and counts before saving")]
    ReconciliationUnverified,
    #[error("{} is marked incorrect but no observed value was entered", .0.label())]
    MissingActual(ReconciledField),
    #[error("observed {} can only be entered when the declared value is marked incorrect", .0.label())]
    ActualNotEditable(ReconciledField),
}

/// Checks only the topology counts; used by the change path.
pub fn validate_configuration(configuration: &UnitConfiguration) -> Result<(), ValidationError> {
    in_range(
        "units per group",
        configuration.units_per_group,
        MAX_UNITS_PER_GROUP,
    )?;

    if matches!(
        configuration.topology,
        Topology::InternalString | Topology::PackOrTray
    ) {
        in_range("group count", configuration.group_count, MAX_GROUP_COUNT)?;
    }

    Ok(())
}

/// Completeness checks for a final save.
pub fn validate_submission(header: &HeaderRecord, rows: &[Reading]) -> Result<(), ValidationError> {
    required("make", &header.make)?;
    required("model", &header.model)?;
    required("serial number", &header.serial_number)?;
    validate_configuration(&header.configuration)?;

    let expected = header.configuration.expected_count();
    let found = rows.len() as u32;
    if expected != found {
        return Err(ValidationError::RowCountMismatch { expected, found });
    }

    for row in rows {
        if !row.voltage.is_finite() || row.voltage <= 0.0 {
            return Err(ValidationError::InvalidReading {
                index: row.index,
                channel: "voltage",
            });
        }

        let channels = [
            ("conductance", row.conductance),
            ("current", row.current),
            ("frequency", row.frequency),
        ];
        if let Some((channel, _)) = channels
            .iter()
            .find(|(_, value)| !value.is_finite() || *value < 0.0)
        {
            return Err(ValidationError::InvalidReading {
                index: row.index,
                channel: *channel,
            });
        }

        if !row.temperature.is_finite() {
            return Err(ValidationError::InvalidReading {
                index: row.index,
                channel: "temperature",
            });
        }
    }

    Ok(())
}

fn required(field: &'static str, value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        Err(ValidationError::MissingField(field))
    } else {
        Ok(())
    }
}

fn in_range(field: &'static str, found: u32, max: u32) -> Result<(), ValidationError> {
    if (1..=max).contains(&found) {
        Ok(())
    } else {
        Err(ValidationError::OutOfRange {
            field,
            min: 1,
            max,
            found,
        })
    }
}
