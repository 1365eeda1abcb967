mod derivation;

pub use derivation::{
    derive_thresholds, uses_conductance, ConductanceCheck, DerivationRule, DerivedThresholds,
    ThresholdInputs,
};

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::domain::{Chemistry, DefectFlag, HeaderRecord, Reading, Verdict};
use super::thresholds::{classify, Direction, PolicyTable, Thresholds};

/// Action plan attached to passing rows that carry a visible defect.
pub const VISIBLE_DEFECT_NOTE: &str =
    "Visible defect noted; readings within limits. Re-inspect at next scheduled maintenance.";

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DeficiencyError {
    #[error("no base thresholds available for this device sub-type and charger mode")]
    MissingBaseThresholds,
    #[error("no manufacturer reference value available for model '{model}'")]
    MissingReferenceValue { model: String },
    #[error("no nominal cell voltage configured for {0:?}")]
    UnknownChemistry(Chemistry),
}

/// Classified rows plus the aggregate counts written back into the header.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeficiencyOutcome {
    pub rows: Vec<Reading>,
    pub replace_count: u32,
    pub monitor_count: u32,
    pub thresholds: DerivedThresholds,
}

impl DeficiencyOutcome {
    pub fn apply_to(&self, header: &mut HeaderRecord) {
        header.replace_count = self.replace_count;
        header.monitor_count = self.monitor_count;
    }
}

/// Stateless evaluator applying the policy table to a reading set.
#[derive(Debug, Clone)]
pub struct DeficiencyEngine {
    policy: Arc<PolicyTable>,
}

impl DeficiencyEngine {
    pub fn new(policy: Arc<PolicyTable>) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &PolicyTable {
        &self.policy
    }

    pub fn classify(
        &self,
        header: &HeaderRecord,
        rows: &[Reading],
        inputs: &ThresholdInputs,
    ) -> Result<DeficiencyOutcome, DeficiencyError> {
        let thresholds = derive_thresholds(header, rows.len(), inputs, &self.policy)?;

        let rows: Vec<Reading> = rows
            .iter()
            .map(|row| evaluate_row(row, &thresholds))
            .collect();
        let replace_count = rows.iter().filter(|row| row.needs_replace()).count() as u32;
        let monitor_count = rows.iter().filter(|row| row.needs_monitor()).count() as u32;

        Ok(DeficiencyOutcome {
            rows,
            replace_count,
            monitor_count,
            thresholds,
        })
    }
}

fn evaluate_row(row: &Reading, thresholds: &DerivedThresholds) -> Reading {
    let mut evaluated = row.clone();

    if !row.has_recorded_data() {
        evaluated.verdict = Verdict::Pass;
        evaluated.action_plan = pass_note(row);
        return evaluated;
    }

    let primary = classify(row.voltage, &thresholds.voltage, Direction::LowIsBad);
    let mut verdict = primary;
    let mut plan = breach_note(primary, "voltage", row.voltage, &thresholds.voltage);

    // Conductance may only escalate a row the voltage channel passed.
    if let (Verdict::Pass, Some(check)) = (primary, thresholds.conductance) {
        let secondary = classify(row.conductance, &check.thresholds, check.direction);
        verdict = Verdict::combine([primary, secondary]);
        plan = breach_note(secondary, "conductance", row.conductance, &check.thresholds);
    }

    evaluated.verdict = verdict;
    evaluated.action_plan = if verdict == Verdict::Pass {
        pass_note(row)
    } else {
        plan
    };
    evaluated
}

fn pass_note(row: &Reading) -> String {
    if row.defect == DefectFlag::VisibleDefect {
        VISIBLE_DEFECT_NOTE.to_string()
    } else {
        String::new()
    }
}

fn breach_note(verdict: Verdict, channel: &str, value: f64, thresholds: &Thresholds) -> String {
    match verdict {
        Verdict::Pass => String::new(),
        Verdict::Replace => format!(
            "Replace: {channel} {value:.2} breaches replace limit {:.2}",
            thresholds.replace_ceiling.unwrap_or(thresholds.replace)
        ),
        Verdict::Monitor => format!(
            "Monitor: {channel} {value:.2} breaches monitor limit {:.2}",
            thresholds.monitor_ceiling.unwrap_or(thresholds.monitor)
        ),
    }
}
