//! Battery, PDU, and UPS readings: per-row deficiency classification, equipment status
//! aggregation, declared-versus-observed reconciliation, and the save and change pipelines.
//!
//! The engine is stateless apart from the [`PolicyTable`] it is built with. Remote persistence
//! goes through [`InspectionStore`] and operator confirmations through [`ConfirmationPrompt`],
//! both injected by the caller.

pub mod deficiency;
pub mod domain;
pub mod pipeline;
pub mod reconciliation;
pub mod repository;
pub mod router;
pub mod rows;
pub mod service;
pub mod status;
pub mod thresholds;
pub mod validation;

#[cfg(test)]
mod tests;

pub use deficiency::{
    DeficiencyEngine, DeficiencyError, DeficiencyOutcome, DerivationRule, DerivedThresholds,
    ThresholdInputs,
};
pub use domain::{
    Attestation, ChargerMode, CheckResult, Chemistry, ConductanceScale, DefectFlag,
    DeviceSubType, EquipmentStatus, FieldCheck, HeaderRecord, Reading, ReadingSet, ReadingType,
    ReconciledField, ReconciliationEntry, ReconciliationRecord, ReplacementReason, Topology,
    UnitConfiguration, UnitKey, Verdict,
};
pub use pipeline::{Pipeline, PipelineReport, SaveMode, SaveStage, StageOutcome, StageRecord};
pub use reconciliation::ReconciliationGate;
pub use repository::{
    ConfirmationPrompt, ConfirmationRequest, EquipmentSnapshot, InspectionStore,
    LinkedEquipmentUpdate, PresetAnswers, StatusUpdate, StoreError, UpdateReason,
};
pub use router::readings_router;
pub use rows::{reconcile_row_count, RowCountError, RowPlan};
pub use service::{ChangeRequest, ReadingsService, SaveError, SaveRequest, UnitSnapshot};
pub use status::{age_in_years, StatusAggregator, StatusDecision, StatusRule};
pub use thresholds::{classify, Direction, PolicyError, PolicyTable, Thresholds};
pub use validation::ValidationError;
