use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::domain::{
    ChargerMode, ConductanceScale, DeviceSubType, EquipmentStatus, HeaderRecord, ReadingSet,
    ReconciliationRecord, UnitConfiguration, UnitKey,
};
use super::thresholds::Thresholds;

/// Why the linked equipment record is being updated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateReason {
    Save,
    ConfigurationChange,
}

impl UpdateReason {
    /// Numeric reason code expected by the equipment service.
    pub const fn code(self) -> u8 {
        match self {
            UpdateReason::Save => 1,
            UpdateReason::ConfigurationChange => 2,
        }
    }
}

/// Identity and configuration pushed to the linked equipment record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkedEquipmentUpdate {
    pub key: UnitKey,
    pub reason: UpdateReason,
    pub make: String,
    pub model: String,
    pub serial_number: String,
    pub location: String,
    pub configuration: UnitConfiguration,
    pub date_code: Option<NaiveDate>,
}

impl LinkedEquipmentUpdate {
    pub fn from_header(header: &HeaderRecord, reason: UpdateReason) -> Self {
        Self {
            key: header.key.clone(),
            reason,
            make: header.make.clone(),
            model: header.model.clone(),
            serial_number: header.serial_number.clone(),
            location: header.location.clone(),
            configuration: header.configuration,
            date_code: header.date_code,
        }
    }
}

/// Equipment record as persisted by the equipment service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EquipmentSnapshot {
    pub job_id: String,
    pub equip_id: String,
    pub make: String,
    pub model: String,
    pub serial_number: String,
    pub location: String,
    pub date_code: Option<NaiveDate>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusUpdate {
    pub key: UnitKey,
    pub status: EquipmentStatus,
    pub replace_count: u32,
    pub monitor_count: u32,
}

impl StatusUpdate {
    pub fn from_header(header: &HeaderRecord) -> Self {
        Self {
            key: header.key.clone(),
            status: header.status,
            replace_count: header.replace_count,
            monitor_count: header.monitor_count,
        }
    }
}

/// Remote persistence collaborator. Every call is a suspension point; the pipeline issues one at
/// a time.
#[async_trait]
pub trait InspectionStore: Send + Sync {
    async fn get_header(&self, key: &UnitKey) -> Result<HeaderRecord, StoreError>;

    async fn get_reading_set(&self, key: &UnitKey) -> Result<ReadingSet, StoreError>;

    /// Removes every persisted row for the unit. Succeeds when there is nothing to delete.
    async fn delete_readings(&self, key: &UnitKey) -> Result<(), StoreError>;

    async fn insert_readings(&self, readings: &ReadingSet) -> Result<(), StoreError>;

    /// Delete-then-insert of the full row set; always succeeds on empty input.
    async fn replace_reading_set(&self, readings: &ReadingSet) -> Result<(), StoreError> {
        self.delete_readings(&readings.key).await?;
        if readings.is_empty() {
            return Ok(());
        }
        self.insert_readings(readings).await
    }

    async fn save_header(&self, header: &HeaderRecord, draft: bool) -> Result<(), StoreError>;

    async fn update_linked_equipment(
        &self,
        update: &LinkedEquipmentUpdate,
    ) -> Result<(), StoreError>;

    async fn get_linked_equipment_snapshot(
        &self,
        job_id: &str,
        equip_id: &str,
    ) -> Result<EquipmentSnapshot, StoreError>;

    async fn get_reconciliation(
        &self,
        job_id: &str,
        equip_id: &str,
    ) -> Result<Option<ReconciliationRecord>, StoreError>;

    async fn save_reconciliation(&self, record: &ReconciliationRecord) -> Result<(), StoreError>;

    async fn persist_status(&self, update: &StatusUpdate) -> Result<(), StoreError>;

    /// Base `(replace, monitor)` floors for a sub-type and charger mode.
    async fn get_threshold_table(
        &self,
        sub_type: DeviceSubType,
        sub_type_name: &str,
        charger_mode: ChargerMode,
    ) -> Result<Thresholds, StoreError>;

    async fn get_reference_value(
        &self,
        equip_id: &str,
        scale: ConductanceScale,
        model: &str,
    ) -> Result<f64, StoreError>;
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("record not found")]
    NotFound,
    #[error("request rejected: {0}")]
    Rejected(String),
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Question put to the operator before a risky action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ConfirmationRequest {
    /// Saving while the operator-held status is not `Online`.
    NonOnlineStatus { status: EquipmentStatus },
    /// Dropping rows that already hold recorded readings.
    RowRemoval { expected: u32, candidates: Vec<u32> },
}

impl ConfirmationRequest {
    pub fn message(&self) -> String {
        match self {
            ConfirmationRequest::NonOnlineStatus { status } => format!(
                "Equipment status is '{}'. Save anyway?",
                status.label()
            ),
            ConfirmationRequest::RowRemoval {
                expected,
                candidates,
            } => format!(
                "Rows {candidates:?} hold recorded readings. Remove them to keep {expected} rows?"
            ),
        }
    }
}

/// Yes/no prompt answered by the operator.
#[async_trait]
pub trait ConfirmationPrompt: Send + Sync {
    async fn confirm(&self, request: &ConfirmationRequest) -> bool;
}

/// Answers supplied up front, e.g. as flags on an HTTP request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresetAnswers {
    #[serde(default)]
    pub confirm_non_online_status: bool,
    #[serde(default)]
    pub confirm_row_removal: bool,
}

#[async_trait]
impl ConfirmationPrompt for PresetAnswers {
    async fn confirm(&self, request: &ConfirmationRequest) -> bool {
        match request {
            ConfirmationRequest::NonOnlineStatus { .. } => self.confirm_non_online_status,
            ConfirmationRequest::RowRemoval { .. } => self.confirm_row_removal,
        }
    }
}
