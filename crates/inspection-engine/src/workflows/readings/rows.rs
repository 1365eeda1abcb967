use serde::{Deserialize, Serialize};

use super::domain::{DefectFlag, Reading, UnitConfiguration, Verdict};

/// Ambient temperature (°F) recorded on synthesized rows until the technician measures it.
pub const DEFAULT_TEMPERATURE: f64 = 77.0;

/// Outcome of comparing the configured row count with the persisted rows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RowPlan {
    pub expected: u32,
    /// Rows synthesized to fill the gap up to `expected`.
    pub added: Vec<Reading>,
    /// Indices that would be dropped because they exceed `expected`.
    pub removed: Vec<u32>,
    /// Candidate indices holding recorded data; non-empty only when removal was refused.
    pub blocking: Vec<u32>,
    pub remove_blocked: bool,
    /// Full row set to persist (or the untouched current rows when nothing changes).
    pub rows: Vec<Reading>,
}

impl RowPlan {
    /// True when nothing would be written.
    pub fn is_noop(&self) -> bool {
        self.added.is_empty() && (self.removed.is_empty() || self.remove_blocked)
    }

    /// Converts a refused removal into an error, otherwise yields the rows to persist.
    pub fn into_rows(self) -> Result<Vec<Reading>, RowCountError> {
        if self.remove_blocked {
            return Err(RowCountError::DeletionBlocked {
                expected: self.expected,
                candidates: self.blocking,
            });
        }
        Ok(self.rows)
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RowCountError {
    #[error("cannot reduce to {expected} rows: rows {candidates:?} already hold recorded readings")]
    DeletionBlocked { expected: u32, candidates: Vec<u32> },
}

/// Builds an empty row awaiting inspection.
pub fn blank_reading(index: u32) -> Reading {
    Reading {
        index,
        voltage: 0.0,
        conductance: 0.0,
        current: 0.0,
        frequency: 0.0,
        temperature: DEFAULT_TEMPERATURE,
        defect: DefectFlag::Pending,
        verdict: Verdict::Pass,
        action_plan: String::new(),
    }
}

/// Plans the row set that matches `configuration`.
///
/// Removal of rows with an index above the expected count is refused when any of them holds a
/// recorded primary measurement, unless `allow_removal` is set.
pub fn reconcile_row_count(
    configuration: &UnitConfiguration,
    current: &[Reading],
    allow_removal: bool,
) -> RowPlan {
    let expected = configuration.expected_count();
    let current_len = current.len() as u32;

    if expected == current_len {
        return RowPlan {
            expected,
            added: Vec::new(),
            removed: Vec::new(),
            blocking: Vec::new(),
            remove_blocked: false,
            rows: current.to_vec(),
        };
    }

    if expected > current_len {
        let added: Vec<Reading> = (current_len + 1..=expected).map(blank_reading).collect();
        let mut rows = current.to_vec();
        rows.extend(added.iter().cloned());
        return RowPlan {
            expected,
            added,
            removed: Vec::new(),
            blocking: Vec::new(),
            remove_blocked: false,
            rows,
        };
    }

    let (kept, candidates): (Vec<&Reading>, Vec<&Reading>) =
        current.iter().partition(|row| row.index <= expected);
    let removed: Vec<u32> = candidates.iter().map(|row| row.index).collect();
    let blocking: Vec<u32> = candidates
        .iter()
        .filter(|row| row.has_recorded_data())
        .map(|row| row.index)
        .collect();

    if !blocking.is_empty() && !allow_removal {
        return RowPlan {
            expected,
            added: Vec::new(),
            removed,
            blocking,
            remove_blocked: true,
            rows: current.to_vec(),
        };
    }

    RowPlan {
        expected,
        added: Vec::new(),
        removed,
        blocking: Vec::new(),
        remove_blocked: false,
        rows: kept.into_iter().cloned().collect(),
    }
}
