//! Stage tables for the save and change pipelines.
//!
//! Each pipeline is a fixed sequence of [`SaveStage`]s. A stage's [`FailurePolicy`] decides
//! whether an error aborts the run or is logged and skipped.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::domain::{HeaderRecord, Reading, ReconciliationRecord};
use super::rows::RowPlan;
use super::status::StatusDecision;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SaveMode {
    Draft,
    #[default]
    Final,
}

impl SaveMode {
    pub const fn is_draft(self) -> bool {
        matches!(self, SaveMode::Draft)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SaveStage {
    Validate,
    ComputeDeficiency,
    DeleteExistingRows,
    InsertRows,
    SaveHeader,
    UpdateLinkedEquipment,
    RefreshEquipmentSnapshot,
    SaveReconciliation,
    ComputeStatus,
    RefreshReferenceValues,
    PersistStatus,
    ReconcileRows,
    ReloadAll,
    Done,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailurePolicy {
    Abort,
    LogAndContinue,
}

impl SaveStage {
    pub const fn label(self) -> &'static str {
        match self {
            SaveStage::Validate => "validate",
            SaveStage::ComputeDeficiency => "compute_deficiency",
            SaveStage::DeleteExistingRows => "delete_existing_rows",
            SaveStage::InsertRows => "insert_rows",
            SaveStage::SaveHeader => "save_header",
            SaveStage::UpdateLinkedEquipment => "update_linked_equipment",
            SaveStage::RefreshEquipmentSnapshot => "refresh_equipment_snapshot",
            SaveStage::SaveReconciliation => "save_reconciliation",
            SaveStage::ComputeStatus => "compute_status",
            SaveStage::RefreshReferenceValues => "refresh_reference_values",
            SaveStage::PersistStatus => "persist_status",
            SaveStage::ReconcileRows => "reconcile_rows",
            SaveStage::ReloadAll => "reload_all",
            SaveStage::Done => "done",
        }
    }

    pub const fn failure_policy(self) -> FailurePolicy {
        match self {
            SaveStage::ComputeDeficiency
            | SaveStage::RefreshEquipmentSnapshot
            | SaveStage::RefreshReferenceValues
            | SaveStage::ReloadAll => FailurePolicy::LogAndContinue,
            _ => FailurePolicy::Abort,
        }
    }
}

impl fmt::Display for SaveStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

const FINAL_STAGES: &[SaveStage] = &[
    SaveStage::Validate,
    SaveStage::ComputeDeficiency,
    SaveStage::DeleteExistingRows,
    SaveStage::InsertRows,
    SaveStage::SaveHeader,
    SaveStage::UpdateLinkedEquipment,
    SaveStage::RefreshEquipmentSnapshot,
    SaveStage::SaveReconciliation,
    SaveStage::ComputeStatus,
    SaveStage::RefreshReferenceValues,
    SaveStage::PersistStatus,
    SaveStage::ReloadAll,
    SaveStage::Done,
];

const DRAFT_STAGES: &[SaveStage] = &[
    SaveStage::ComputeDeficiency,
    SaveStage::DeleteExistingRows,
    SaveStage::InsertRows,
    SaveStage::SaveHeader,
    SaveStage::UpdateLinkedEquipment,
    SaveStage::RefreshEquipmentSnapshot,
    SaveStage::SaveReconciliation,
    SaveStage::ReloadAll,
    SaveStage::Done,
];

const CHANGE_STAGES: &[SaveStage] = &[
    SaveStage::Validate,
    SaveStage::SaveHeader,
    SaveStage::UpdateLinkedEquipment,
    SaveStage::ReconcileRows,
    SaveStage::ReloadAll,
    SaveStage::Done,
];

/// Which pipeline a run follows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Pipeline {
    Submit(SaveMode),
    Change,
}

impl Pipeline {
    pub fn stages(self) -> &'static [SaveStage] {
        match self {
            Pipeline::Submit(SaveMode::Final) => FINAL_STAGES,
            Pipeline::Submit(SaveMode::Draft) => DRAFT_STAGES,
            Pipeline::Change => CHANGE_STAGES,
        }
    }

    pub fn first(self) -> SaveStage {
        self.stages().first().copied().unwrap_or(SaveStage::Done)
    }

    /// Stage following `stage`, or `Done` at the end of the table.
    pub fn next(self, stage: SaveStage) -> SaveStage {
        let stages = self.stages();
        stages
            .iter()
            .position(|candidate| *candidate == stage)
            .and_then(|position| stages.get(position + 1))
            .copied()
            .unwrap_or(SaveStage::Done)
    }

    /// Saves the header as a draft on this pipeline.
    pub fn saves_draft(self) -> bool {
        match self {
            Pipeline::Submit(mode) => mode.is_draft(),
            Pipeline::Change => true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum StageOutcome {
    Completed,
    Degraded { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageRecord {
    pub stage: SaveStage,
    #[serde(flatten)]
    pub outcome: StageOutcome,
}

/// Result of a pipeline run that reached `Done`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineReport {
    pub pipeline: Pipeline,
    pub stages: Vec<StageRecord>,
    pub header: HeaderRecord,
    pub rows: Vec<Reading>,
    pub reconciliation: Option<ReconciliationRecord>,
    pub status: Option<StatusDecision>,
    pub row_plan: Option<RowPlan>,
    /// False when `ReloadAll` degraded; header, rows and reconciliation are then the run's
    /// working copy rather than the persisted state.
    pub reloaded: bool,
}

impl PipelineReport {
    pub fn reached(&self, stage: SaveStage) -> bool {
        self.stages.iter().any(|record| record.stage == stage)
    }

    pub fn degraded(&self) -> Vec<SaveStage> {
        self.stages
            .iter()
            .filter(|record| matches!(record.outcome, StageOutcome::Degraded { .. }))
            .map(|record| record.stage)
            .collect()
    }
}
