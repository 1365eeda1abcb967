use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::deficiency::{
    uses_conductance, DeficiencyEngine, DeficiencyError, DeficiencyOutcome, ThresholdInputs,
};
use super::domain::{
    EquipmentStatus, HeaderRecord, Reading, ReadingSet, ReconciliationRecord, UnitConfiguration,
    UnitKey,
};
use super::pipeline::{
    FailurePolicy, Pipeline, PipelineReport, SaveMode, SaveStage, StageOutcome, StageRecord,
};
use super::reconciliation::ReconciliationGate;
use super::repository::{
    ConfirmationPrompt, ConfirmationRequest, InspectionStore, LinkedEquipmentUpdate,
    StatusUpdate, StoreError, UpdateReason,
};
use super::rows::{reconcile_row_count, RowCountError, RowPlan};
use super::status::{age_in_years, StatusAggregator, StatusDecision};
use super::thresholds::PolicyTable;
use super::validation::{validate_configuration, validate_submission, ValidationError};

/// One readings submission ("Save" or "Save as Draft").
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SaveRequest {
    pub header: HeaderRecord,
    pub rows: Vec<Reading>,
    pub reconciliation: ReconciliationRecord,
    pub mode: SaveMode,
    pub evaluated_on: NaiveDate,
}

/// A configuration change ("Change") that re-derives the row set.
///
/// Rows are planned against the persisted reading set; `rows` is the caller's view of it and is
/// only compared against what the store returns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeRequest {
    pub header: HeaderRecord,
    #[serde(default)]
    pub rows: Vec<Reading>,
}

/// Persisted state of one unit instance as returned by a reload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnitSnapshot {
    pub header: HeaderRecord,
    pub rows: Vec<Reading>,
    pub reconciliation: Option<ReconciliationRecord>,
}

#[derive(Debug, thiserror::Error)]
pub enum SaveError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    UnsafeOperation(#[from] RowCountError),
    #[error("save cancelled by operator")]
    Cancelled,
    #[error("a save is already in progress for unit {0}")]
    AlreadySaving(UnitKey),
    #[error("{stage} failed: {source}")]
    Stage {
        stage: SaveStage,
        #[source]
        source: StoreError,
    },
    #[error(transparent)]
    Deficiency(#[from] DeficiencyError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl SaveError {
    /// Stage at which a remote call aborted the pipeline.
    pub fn failed_stage(&self) -> Option<SaveStage> {
        match self {
            SaveError::Stage { stage, .. } => Some(*stage),
            _ => None,
        }
    }
}

/// Errors produced while running a single stage.
#[derive(Debug)]
enum StepError {
    Validation(ValidationError),
    Unsafe(RowCountError),
    Cancelled,
    Deficiency(DeficiencyError),
    Store(StoreError),
}

impl StepError {
    fn into_save_error(self, stage: SaveStage) -> SaveError {
        match self {
            StepError::Validation(err) => SaveError::Validation(err),
            StepError::Unsafe(err) => SaveError::UnsafeOperation(err),
            StepError::Cancelled => SaveError::Cancelled,
            StepError::Deficiency(err) => SaveError::Deficiency(err),
            StepError::Store(source) => SaveError::Stage { stage, source },
        }
    }

    fn reason(&self) -> String {
        match self {
            StepError::Validation(err) => err.to_string(),
            StepError::Unsafe(err) => err.to_string(),
            StepError::Cancelled => "cancelled".to_string(),
            StepError::Deficiency(err) => err.to_string(),
            StepError::Store(err) => err.to_string(),
        }
    }
}

impl From<ValidationError> for StepError {
    fn from(value: ValidationError) -> Self {
        Self::Validation(value)
    }
}

impl From<DeficiencyError> for StepError {
    fn from(value: DeficiencyError) -> Self {
        Self::Deficiency(value)
    }
}

impl From<StoreError> for StepError {
    fn from(value: StoreError) -> Self {
        Self::Store(value)
    }
}

/// Working copy threaded through the stages of one run.
struct RunState<'p> {
    pipeline: Pipeline,
    header: HeaderRecord,
    rows: Vec<Reading>,
    reconciliation: Option<ReconciliationRecord>,
    evaluated_on: Option<NaiveDate>,
    status: Option<StatusDecision>,
    row_plan: Option<RowPlan>,
    prompt: &'p dyn ConfirmationPrompt,
}

/// Units with a run in flight. Entries are removed when the guard drops, on every exit path.
#[derive(Debug, Default)]
struct InFlight {
    units: Mutex<HashSet<UnitKey>>,
}

impl InFlight {
    fn acquire(self: &Arc<Self>, key: &UnitKey) -> Option<InFlightGuard> {
        let mut units = self.units.lock().unwrap_or_else(PoisonError::into_inner);
        if !units.insert(key.clone()) {
            return None;
        }
        Some(InFlightGuard {
            registry: Arc::clone(self),
            key: key.clone(),
        })
    }

    fn contains(&self, key: &UnitKey) -> bool {
        self.units
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(key)
    }
}

struct InFlightGuard {
    registry: Arc<InFlight>,
    key: UnitKey,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.registry
            .units
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.key);
    }
}

/// Service composing the deficiency engine, status aggregator, reconciliation gate, and the
/// remote store into the save and change pipelines.
pub struct ReadingsService<S> {
    store: Arc<S>,
    policy: Arc<PolicyTable>,
    deficiency: DeficiencyEngine,
    status: StatusAggregator,
    gate: ReconciliationGate,
    in_flight: Arc<InFlight>,
}

impl<S> ReadingsService<S>
where
    S: InspectionStore + 'static,
{
    pub fn new(store: Arc<S>, policy: PolicyTable) -> Self {
        let policy = Arc::new(policy);
        Self {
            store,
            deficiency: DeficiencyEngine::new(Arc::clone(&policy)),
            status: StatusAggregator::new(Arc::clone(&policy)),
            policy,
            gate: ReconciliationGate,
            in_flight: Arc::new(InFlight::default()),
        }
    }

    pub fn policy(&self) -> &PolicyTable {
        &self.policy
    }

    /// True while a submit or change run holds the unit.
    pub fn is_saving(&self, key: &UnitKey) -> bool {
        self.in_flight.contains(key)
    }

    /// Plans the row set for `configuration` without writing anything.
    pub fn plan_rows(
        &self,
        configuration: &UnitConfiguration,
        rows: &[Reading],
        allow_removal: bool,
    ) -> RowPlan {
        reconcile_row_count(configuration, rows, allow_removal)
    }

    /// Classifies `rows` with thresholds fetched for `header`.
    pub async fn classify_reading_set(
        &self,
        header: &HeaderRecord,
        rows: &[Reading],
    ) -> Result<DeficiencyOutcome, SaveError> {
        let inputs = self.threshold_inputs(header).await;
        Ok(self.deficiency.classify(header, rows, &inputs)?)
    }

    pub fn compute_status(&self, header: &HeaderRecord, evaluated_on: NaiveDate) -> StatusDecision {
        let age = header
            .date_code
            .map(|date_code| age_in_years(date_code, evaluated_on));
        self.status.compute(header, age)
    }

    /// Reloads the persisted header, rows, and reconciliation record.
    pub async fn load(&self, key: &UnitKey) -> Result<UnitSnapshot, SaveError> {
        let header = self.store.get_header(key).await?;
        let readings = self.store.get_reading_set(key).await?;
        let reconciliation = self
            .store
            .get_reconciliation(&key.job_id, &key.equip_id)
            .await?;

        Ok(UnitSnapshot {
            header,
            rows: readings.rows,
            reconciliation,
        })
    }

    /// Brings the persisted rows in line with `configuration`, then reloads.
    pub async fn reconcile_rows(
        &self,
        key: &UnitKey,
        configuration: &UnitConfiguration,
        prompt: &dyn ConfirmationPrompt,
    ) -> Result<(RowPlan, UnitSnapshot), SaveError> {
        let _guard = self
            .in_flight
            .acquire(key)
            .ok_or_else(|| SaveError::AlreadySaving(key.clone()))?;

        let current = self.store.get_reading_set(key).await?;
        let plan = confirm_row_plan(configuration, &current.rows, prompt)
            .await
            .map_err(|err| err.into_save_error(SaveStage::ReconcileRows))?;

        if !plan.is_noop() {
            let readings = ReadingSet::new(key.clone(), plan.rows.clone());
            self.store
                .replace_reading_set(&readings)
                .await
                .map_err(|source| SaveError::Stage {
                    stage: SaveStage::ReconcileRows,
                    source,
                })?;
        }

        let snapshot = self.load(key).await?;
        Ok((plan, snapshot))
    }

    /// Runs the save pipeline for one submission.
    pub async fn submit(
        &self,
        request: SaveRequest,
        prompt: &dyn ConfirmationPrompt,
    ) -> Result<PipelineReport, SaveError> {
        let SaveRequest {
            header,
            rows,
            reconciliation,
            mode,
            evaluated_on,
        } = request;

        let state = RunState {
            pipeline: Pipeline::Submit(mode),
            header,
            rows,
            reconciliation: Some(reconciliation),
            evaluated_on: Some(evaluated_on),
            status: None,
            row_plan: None,
            prompt,
        };
        self.run(state).await
    }

    /// Runs the abbreviated change pipeline.
    pub async fn apply_change(
        &self,
        request: ChangeRequest,
        prompt: &dyn ConfirmationPrompt,
    ) -> Result<PipelineReport, SaveError> {
        let state = RunState {
            pipeline: Pipeline::Change,
            header: request.header,
            rows: request.rows,
            reconciliation: None,
            evaluated_on: None,
            status: None,
            row_plan: None,
            prompt,
        };
        self.run(state).await
    }

    async fn run(&self, mut state: RunState<'_>) -> Result<PipelineReport, SaveError> {
        let key = state.header.key.clone();
        let _guard = self
            .in_flight
            .acquire(&key)
            .ok_or_else(|| SaveError::AlreadySaving(key.clone()))?;

        info!(
            job_id = %key.job_id,
            equip_id = %key.equip_id,
            unit_id = %key.unit_id,
            pipeline = ?state.pipeline,
            rows = state.rows.len(),
            "readings pipeline started"
        );

        let mut stages = Vec::new();
        let mut stage = state.pipeline.first();

        while stage != SaveStage::Done {
            match self.run_stage(stage, &mut state).await {
                Ok(()) => {
                    debug!(unit = %key, %stage, "stage completed");
                    stages.push(StageRecord {
                        stage,
                        outcome: StageOutcome::Completed,
                    });
                }
                Err(err) => match stage.failure_policy() {
                    FailurePolicy::LogAndContinue => {
                        let reason = err.reason();
                        warn!(unit = %key, %stage, error = %reason, "stage failed; continuing");
                        stages.push(StageRecord {
                            stage,
                            outcome: StageOutcome::Degraded { reason },
                        });
                    }
                    FailurePolicy::Abort => {
                        let error = err.into_save_error(stage);
                        warn!(unit = %key, %stage, error = %error, "readings pipeline aborted");
                        return Err(error);
                    }
                },
            }
            stage = state.pipeline.next(stage);
        }

        let reloaded = stages.iter().any(|record| {
            record.stage == SaveStage::ReloadAll && record.outcome == StageOutcome::Completed
        });

        info!(
            unit = %key,
            reloaded,
            status = ?state.header.status,
            replace_count = state.header.replace_count,
            monitor_count = state.header.monitor_count,
            "readings pipeline finished"
        );

        Ok(PipelineReport {
            pipeline: state.pipeline,
            stages,
            header: state.header,
            rows: state.rows,
            reconciliation: state.reconciliation,
            status: state.status,
            row_plan: state.row_plan,
            reloaded,
        })
    }

    async fn run_stage(&self, stage: SaveStage, state: &mut RunState<'_>) -> Result<(), StepError> {
        let key = state.header.key.clone();

        match stage {
            SaveStage::Validate => match state.pipeline {
                Pipeline::Change => {
                    validate_configuration(&state.header.configuration)?;
                    let persisted = self.store.get_reading_set(&key).await?;
                    if persisted.rows != state.rows {
                        warn!(
                            unit = %key,
                            submitted = state.rows.len(),
                            persisted = persisted.len(),
                            "submitted rows differ from the persisted set; planning against the store"
                        );
                    }
                    let plan = confirm_row_plan(
                        &state.header.configuration,
                        &persisted.rows,
                        state.prompt,
                    )
                    .await?;
                    state.rows = persisted.rows;
                    state.row_plan = Some(plan);
                    Ok(())
                }
                Pipeline::Submit(mode) => self.validate_submission(state, mode).await,
            },
            SaveStage::ComputeDeficiency => {
                let inputs = self.threshold_inputs(&state.header).await;
                let outcome = self
                    .deficiency
                    .classify(&state.header, &state.rows, &inputs)?;
                debug!(
                    unit = %key,
                    rule = ?outcome.thresholds.rule,
                    replace_count = outcome.replace_count,
                    monitor_count = outcome.monitor_count,
                    "deficiencies recomputed"
                );
                outcome.apply_to(&mut state.header);
                state.rows = outcome.rows;
                Ok(())
            }
            SaveStage::DeleteExistingRows => Ok(self.store.delete_readings(&key).await?),
            SaveStage::InsertRows => {
                let readings = ReadingSet::new(key, state.rows.clone());
                Ok(self.store.insert_readings(&readings).await?)
            }
            SaveStage::SaveHeader => Ok(self
                .store
                .save_header(&state.header, state.pipeline.saves_draft())
                .await?),
            SaveStage::UpdateLinkedEquipment => {
                let reason = match state.pipeline {
                    Pipeline::Submit(_) => UpdateReason::Save,
                    Pipeline::Change => UpdateReason::ConfigurationChange,
                };
                let update = LinkedEquipmentUpdate::from_header(&state.header, reason);
                Ok(self.store.update_linked_equipment(&update).await?)
            }
            SaveStage::RefreshEquipmentSnapshot => {
                let snapshot = self
                    .store
                    .get_linked_equipment_snapshot(&key.job_id, &key.equip_id)
                    .await?;
                if snapshot.date_code.is_some() {
                    state.header.date_code = snapshot.date_code;
                }
                if !snapshot.location.trim().is_empty() {
                    state.header.location = snapshot.location;
                }
                Ok(())
            }
            SaveStage::SaveReconciliation => match &state.reconciliation {
                Some(record) => Ok(self.store.save_reconciliation(record).await?),
                None => Ok(()),
            },
            SaveStage::ComputeStatus => {
                let evaluated_on = state
                    .evaluated_on
                    .unwrap_or_else(|| chrono::Local::now().date_naive());
                let decision = self.compute_status(&state.header, evaluated_on);
                state.header.status = decision.status;
                state.status = Some(decision);
                Ok(())
            }
            SaveStage::RefreshReferenceValues => {
                if uses_conductance(&state.header) {
                    let reference = self
                        .store
                        .get_reference_value(
                            &key.equip_id,
                            state.header.conductance_scale,
                            &state.header.model,
                        )
                        .await?;
                    state.header.reference_value = Some(reference);
                }
                Ok(())
            }
            SaveStage::PersistStatus => {
                let update = StatusUpdate::from_header(&state.header);
                Ok(self.store.persist_status(&update).await?)
            }
            SaveStage::ReconcileRows => {
                let plan = match &state.row_plan {
                    Some(plan) => plan.clone(),
                    None => {
                        let persisted = self.store.get_reading_set(&key).await?;
                        confirm_row_plan(&state.header.configuration, &persisted.rows, state.prompt)
                            .await?
                    }
                };
                if !plan.is_noop() {
                    let readings = ReadingSet::new(key, plan.rows.clone());
                    self.store.replace_reading_set(&readings).await?;
                }
                state.rows = plan.rows.clone();
                state.row_plan = Some(plan);
                Ok(())
            }
            SaveStage::ReloadAll => {
                let header = self.store.get_header(&key).await?;
                let readings = self.store.get_reading_set(&key).await?;
                let reconciliation = self
                    .store
                    .get_reconciliation(&key.job_id, &key.equip_id)
                    .await?;
                state.header = header;
                state.rows = readings.rows;
                if reconciliation.is_some() {
                    state.reconciliation = reconciliation;
                }
                Ok(())
            }
            SaveStage::Done => Ok(()),
        }
    }

    async fn validate_submission(
        &self,
        state: &RunState<'_>,
        mode: SaveMode,
    ) -> Result<(), StepError> {
        if mode.is_draft() {
            return Ok(());
        }

        validate_submission(&state.header, &state.rows)?;
        if let Some(record) = &state.reconciliation {
            self.gate.check(record, mode)?;
        } else {
            return Err(StepError::Validation(
                ValidationError::ReconciliationUnverified,
            ));
        }

        let held = state.header.operator_status.unwrap_or_default();
        if held != EquipmentStatus::Online {
            let request = ConfirmationRequest::NonOnlineStatus { status: held };
            if !state.prompt.confirm(&request).await {
                return Err(StepError::Cancelled);
            }
        }

        Ok(())
    }

    /// Gathers base thresholds and the manufacturer reference. Lookup failures leave the input
    /// empty; derivation reports what was actually needed.
    async fn threshold_inputs(&self, header: &HeaderRecord) -> ThresholdInputs {
        let base = match self
            .store
            .get_threshold_table(
                header.device_sub_type,
                &header.sub_type_name,
                header.charger_mode,
            )
            .await
        {
            Ok(thresholds) => Some(thresholds),
            Err(err) => {
                debug!(unit = %header.key, error = %err, "base threshold lookup failed");
                None
            }
        };

        let reference_value = if uses_conductance(header) {
            match header.reference_value {
                Some(value) => Some(value),
                None => match self
                    .store
                    .get_reference_value(
                        &header.key.equip_id,
                        header.conductance_scale,
                        &header.model,
                    )
                    .await
                {
                    Ok(value) => Some(value),
                    Err(err) => {
                        debug!(unit = %header.key, error = %err, "reference value lookup failed");
                        None
                    }
                },
            }
        } else {
            None
        };

        ThresholdInputs {
            base,
            reference_value,
        }
    }
}

/// Plans the row set, asking the operator before dropping rows with recorded data.
async fn confirm_row_plan(
    configuration: &UnitConfiguration,
    rows: &[Reading],
    prompt: &dyn ConfirmationPrompt,
) -> Result<RowPlan, StepError> {
    let plan = reconcile_row_count(configuration, rows, false);
    if !plan.remove_blocked {
        return Ok(plan);
    }

    let request = ConfirmationRequest::RowRemoval {
        expected: plan.expected,
        candidates: plan.blocking.clone(),
    };
    if prompt.confirm(&request).await {
        return Ok(reconcile_row_count(configuration, rows, true));
    }

    Err(StepError::Unsafe(RowCountError::DeletionBlocked {
        expected: plan.expected,
        candidates: plan.blocking,
    }))
}
