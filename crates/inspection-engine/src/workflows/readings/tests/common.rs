use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use axum::http::StatusCode;
use axum::response::Response;
use chrono::NaiveDate;
use serde_json::Value;
use tokio::sync::Notify;

use crate::workflows::readings::domain::{
    Attestation, ChargerMode, Chemistry, ConductanceScale, DefectFlag, DeviceSubType,
    HeaderRecord, Reading, ReadingSet, ReconciledField, ReconciliationRecord, Topology,
    UnitConfiguration, UnitKey, Verdict,
};
use crate::workflows::readings::repository::{
    ConfirmationPrompt, ConfirmationRequest, EquipmentSnapshot, InspectionStore,
    LinkedEquipmentUpdate, StatusUpdate, StoreError,
};
use crate::workflows::readings::service::{ReadingsService, SaveRequest};
use crate::workflows::readings::thresholds::{PolicyTable, Thresholds};
use crate::workflows::readings::SaveMode;

/// Remote operations recorded by [`MemoryStore`], in call order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(super) enum StoreOp {
    GetHeader,
    GetReadingSet,
    DeleteReadings,
    InsertReadings,
    SaveHeader,
    UpdateLinkedEquipment,
    GetEquipmentSnapshot,
    GetReconciliation,
    SaveReconciliation,
    PersistStatus,
    GetThresholdTable,
    GetReferenceValue,
}

/// Pauses `delete_readings` until released, so a second run can observe the first in flight.
#[derive(Debug, Default)]
pub(super) struct Gate {
    pub(super) entered: Notify,
    pub(super) release: Notify,
}

#[derive(Debug, Default)]
pub(super) struct StoreState {
    pub(super) headers: HashMap<UnitKey, HeaderRecord>,
    pub(super) readings: HashMap<UnitKey, Vec<Reading>>,
    pub(super) reconciliations: HashMap<(String, String), ReconciliationRecord>,
    pub(super) equipment: HashMap<(String, String), EquipmentSnapshot>,
    pub(super) statuses: Vec<StatusUpdate>,
    pub(super) linked_updates: Vec<LinkedEquipmentUpdate>,
    pub(super) header_saves: Vec<bool>,
    pub(super) thresholds: Option<Thresholds>,
    pub(super) reference_value: Option<f64>,
    pub(super) failures: HashSet<StoreOp>,
    pub(super) calls: Vec<StoreOp>,
    pub(super) gate: Option<Arc<Gate>>,
}

#[derive(Debug, Default)]
pub(super) struct MemoryStore {
    state: Mutex<StoreState>,
}

impl MemoryStore {
    pub(super) fn state(&self) -> MutexGuard<'_, StoreState> {
        self.state.lock().expect("store mutex poisoned")
    }

    pub(super) fn fail_on(&self, op: StoreOp) {
        self.state().failures.insert(op);
    }

    pub(super) fn gate(&self) -> Arc<Gate> {
        let gate = Arc::new(Gate::default());
        self.state().gate = Some(Arc::clone(&gate));
        gate
    }

    pub(super) fn calls(&self) -> Vec<StoreOp> {
        self.state().calls.clone()
    }

    pub(super) fn called(&self, op: StoreOp) -> bool {
        self.state().calls.contains(&op)
    }

    pub(super) fn persisted_rows(&self, key: &UnitKey) -> Vec<Reading> {
        self.state().readings.get(key).cloned().unwrap_or_default()
    }

    pub(super) fn persisted_header(&self, key: &UnitKey) -> Option<HeaderRecord> {
        self.state().headers.get(key).cloned()
    }

    fn enter(&self, op: StoreOp) -> Result<(), StoreError> {
        let mut state = self.state();
        state.calls.push(op);
        if state.failures.contains(&op) {
            return Err(StoreError::Unavailable(format!("{op:?} injected failure")));
        }
        Ok(())
    }
}

#[async_trait]
impl InspectionStore for MemoryStore {
    async fn get_header(&self, key: &UnitKey) -> Result<HeaderRecord, StoreError> {
        self.enter(StoreOp::GetHeader)?;
        self.state()
            .headers
            .get(key)
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    async fn get_reading_set(&self, key: &UnitKey) -> Result<ReadingSet, StoreError> {
        self.enter(StoreOp::GetReadingSet)?;
        let rows = self.persisted_rows(key);
        Ok(ReadingSet::new(key.clone(), rows))
    }

    async fn delete_readings(&self, key: &UnitKey) -> Result<(), StoreError> {
        let gate = self.state().gate.clone();
        if let Some(gate) = gate {
            gate.entered.notify_one();
            gate.release.notified().await;
        }
        self.enter(StoreOp::DeleteReadings)?;
        self.state().readings.remove(key);
        Ok(())
    }

    async fn insert_readings(&self, readings: &ReadingSet) -> Result<(), StoreError> {
        self.enter(StoreOp::InsertReadings)?;
        self.state()
            .readings
            .insert(readings.key.clone(), readings.rows.clone());
        Ok(())
    }

    async fn save_header(&self, header: &HeaderRecord, draft: bool) -> Result<(), StoreError> {
        self.enter(StoreOp::SaveHeader)?;
        let mut state = self.state();
        state.header_saves.push(draft);
        state.headers.insert(header.key.clone(), header.clone());
        Ok(())
    }

    async fn update_linked_equipment(
        &self,
        update: &LinkedEquipmentUpdate,
    ) -> Result<(), StoreError> {
        self.enter(StoreOp::UpdateLinkedEquipment)?;
        self.state().linked_updates.push(update.clone());
        Ok(())
    }

    async fn get_linked_equipment_snapshot(
        &self,
        job_id: &str,
        equip_id: &str,
    ) -> Result<EquipmentSnapshot, StoreError> {
        self.enter(StoreOp::GetEquipmentSnapshot)?;
        self.state()
            .equipment
            .get(&(job_id.to_string(), equip_id.to_string()))
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    async fn get_reconciliation(
        &self,
        job_id: &str,
        equip_id: &str,
    ) -> Result<Option<ReconciliationRecord>, StoreError> {
        self.enter(StoreOp::GetReconciliation)?;
        Ok(self
            .state()
            .reconciliations
            .get(&(job_id.to_string(), equip_id.to_string()))
            .cloned())
    }

    async fn save_reconciliation(&self, record: &ReconciliationRecord) -> Result<(), StoreError> {
        self.enter(StoreOp::SaveReconciliation)?;
        self.state().reconciliations.insert(
            (record.job_id.clone(), record.equip_id.clone()),
            record.clone(),
        );
        Ok(())
    }

    async fn persist_status(&self, update: &StatusUpdate) -> Result<(), StoreError> {
        self.enter(StoreOp::PersistStatus)?;
        let mut state = self.state();
        if let Some(header) = state.headers.get_mut(&update.key) {
            header.status = update.status;
            header.replace_count = update.replace_count;
            header.monitor_count = update.monitor_count;
        }
        state.statuses.push(update.clone());
        Ok(())
    }

    async fn get_threshold_table(
        &self,
        _sub_type: DeviceSubType,
        _sub_type_name: &str,
        _charger_mode: ChargerMode,
    ) -> Result<Thresholds, StoreError> {
        self.enter(StoreOp::GetThresholdTable)?;
        self.state().thresholds.ok_or(StoreError::NotFound)
    }

    async fn get_reference_value(
        &self,
        _equip_id: &str,
        _scale: ConductanceScale,
        _model: &str,
    ) -> Result<f64, StoreError> {
        self.enter(StoreOp::GetReferenceValue)?;
        self.state().reference_value.ok_or(StoreError::NotFound)
    }
}

/// Prompt that answers every question the same way and remembers what it was asked.
#[derive(Debug, Default)]
pub(super) struct ScriptedPrompt {
    answer: bool,
    asked: Mutex<Vec<ConfirmationRequest>>,
}

impl ScriptedPrompt {
    pub(super) fn answering(answer: bool) -> Self {
        Self {
            answer,
            asked: Mutex::new(Vec::new()),
        }
    }

    pub(super) fn asked(&self) -> Vec<ConfirmationRequest> {
        self.asked.lock().expect("prompt mutex poisoned").clone()
    }
}

#[async_trait]
impl ConfirmationPrompt for ScriptedPrompt {
    async fn confirm(&self, request: &ConfirmationRequest) -> bool {
        self.asked
            .lock()
            .expect("prompt mutex poisoned")
            .push(request.clone());
        self.answer
    }
}

pub(super) fn unit_key() -> UnitKey {
    UnitKey::new("J-1001", "EQ-42", "STR-1")
}

pub(super) fn evaluated_on() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 6, 1).expect("valid date")
}

pub(super) fn external(units: u32) -> UnitConfiguration {
    UnitConfiguration {
        topology: Topology::External,
        units_per_group: units,
        group_count: 1,
    }
}

/// VRLA string of 12 V blocks, two years old at [`evaluated_on`].
pub(super) fn vrla_header(units: u32) -> HeaderRecord {
    let mut header = HeaderRecord::new(unit_key(), external(units), Chemistry::Vrla);
    header.make = "EnerSys".to_string();
    header.model = "HX-500".to_string();
    header.serial_number = "SN-7781".to_string();
    header.location = "Battery Room B".to_string();
    header.sub_type_name = "12V float".to_string();
    header.date_code = Some(NaiveDate::from_ymd_opt(2022, 3, 1).expect("valid date"));
    header
}

pub(super) fn reading(index: u32, voltage: f64) -> Reading {
    Reading {
        index,
        voltage,
        conductance: 0.0,
        current: 0.0,
        frequency: 0.0,
        temperature: 77.0,
        defect: DefectFlag::NoDefect,
        verdict: Verdict::Pass,
        action_plan: String::new(),
    }
}

pub(super) fn readings(voltages: &[f64]) -> Vec<Reading> {
    voltages
        .iter()
        .enumerate()
        .map(|(position, voltage)| reading(position as u32 + 1, *voltage))
        .collect()
}

/// Replace at or below 12.0 V, monitor at or below 12.6 V.
pub(super) fn block_thresholds() -> Thresholds {
    Thresholds::floors(12.0, 12.6)
}

pub(super) fn verified_reconciliation(header: &HeaderRecord) -> ReconciliationRecord {
    let mut record = ReconciliationRecord::from_header(header);
    for field in ReconciledField::ALL {
        record.set_attestation(field, Attestation::Correct);
    }
    record.verified = true;
    record
}

/// Store holding `header` and `rows` as the persisted state, with the linked equipment record
/// and block thresholds available.
pub(super) fn seeded_store(header: &HeaderRecord, rows: &[Reading]) -> Arc<MemoryStore> {
    let store = Arc::new(MemoryStore::default());
    {
        let mut state = store.state();
        state.headers.insert(header.key.clone(), header.clone());
        state.readings.insert(header.key.clone(), rows.to_vec());
        state.equipment.insert(
            (header.key.job_id.clone(), header.key.equip_id.clone()),
            EquipmentSnapshot {
                job_id: header.key.job_id.clone(),
                equip_id: header.key.equip_id.clone(),
                make: header.make.clone(),
                model: header.model.clone(),
                serial_number: header.serial_number.clone(),
                location: header.location.clone(),
                date_code: header.date_code,
            },
        );
        state.thresholds = Some(block_thresholds());
    }
    store
}

pub(super) fn build_service(store: Arc<MemoryStore>) -> ReadingsService<MemoryStore> {
    ReadingsService::new(store, PolicyTable::standard())
}

pub(super) fn final_request(header: HeaderRecord, rows: Vec<Reading>) -> SaveRequest {
    let reconciliation = verified_reconciliation(&header);
    SaveRequest {
        header,
        rows,
        reconciliation,
        mode: SaveMode::Final,
        evaluated_on: evaluated_on(),
    }
}

pub(super) async fn json_body(response: Response) -> (StatusCode, Value) {
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("read body");
    let value = serde_json::from_slice(&bytes).expect("json body");
    (status, value)
}
