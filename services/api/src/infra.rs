use async_trait::async_trait;
use chrono::NaiveDate;
use inspection_engine::workflows::readings::{
    ChargerMode, ConductanceScale, DeviceSubType, EquipmentSnapshot, HeaderRecord,
    InspectionStore, LinkedEquipmentUpdate, Reading, ReadingSet, ReconciliationRecord,
    StatusUpdate, StoreError, Thresholds, UnitKey,
};
use metrics_exporter_prometheus::PrometheusHandle;
use std::collections::HashMap;
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

type ThresholdKey = (DeviceSubType, String, ChargerMode);

#[derive(Default)]
struct Tables {
    headers: HashMap<UnitKey, HeaderRecord>,
    readings: HashMap<UnitKey, Vec<Reading>>,
    reconciliations: HashMap<(String, String), ReconciliationRecord>,
    equipment: HashMap<(String, String), EquipmentSnapshot>,
    statuses: Vec<StatusUpdate>,
    thresholds: HashMap<ThresholdKey, Thresholds>,
    references: HashMap<String, f64>,
}

/// Process-local stand-in for the inspection backend used by `serve` and `demo`.
#[derive(Default, Clone)]
pub(crate) struct InMemoryInspectionStore {
    tables: Arc<Mutex<Tables>>,
}

impl InMemoryInspectionStore {
    /// Store preloaded with float and equalize limits for common block and cell sub-types.
    pub(crate) fn seeded() -> Self {
        let store = Self::default();
        {
            let mut tables = store.tables();
            let seeds = [
                ("12V block", ChargerMode::Float, Thresholds::floors(12.0, 12.6)),
                ("12V block", ChargerMode::Equalize, Thresholds::floors(12.3, 12.9)),
                ("2V cell", ChargerMode::Float, Thresholds::floors(2.0, 2.1)),
                ("2V cell", ChargerMode::Equalize, Thresholds::floors(2.05, 2.15)),
            ];
            for (name, mode, thresholds) in seeds {
                tables.thresholds.insert(
                    (DeviceSubType::Standard, name.to_string(), mode),
                    thresholds,
                );
            }
            tables.references.insert("UPS12-370".to_string(), 1450.0);
            tables.references.insert("HX-500".to_string(), 1850.0);
        }
        store
    }

    pub(crate) fn seed_unit(&self, header: &HeaderRecord, rows: Vec<Reading>) {
        let mut tables = self.tables();
        tables.headers.insert(header.key.clone(), header.clone());
        tables.readings.insert(header.key.clone(), rows);
    }

    pub(crate) fn statuses(&self) -> Vec<StatusUpdate> {
        self.tables().statuses.clone()
    }

    fn tables(&self) -> MutexGuard<'_, Tables> {
        self.tables.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl InspectionStore for InMemoryInspectionStore {
    async fn get_header(&self, key: &UnitKey) -> Result<HeaderRecord, StoreError> {
        self.tables()
            .headers
            .get(key)
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    async fn get_reading_set(&self, key: &UnitKey) -> Result<ReadingSet, StoreError> {
        let rows = self.tables().readings.get(key).cloned().unwrap_or_default();
        Ok(ReadingSet::new(key.clone(), rows))
    }

    async fn delete_readings(&self, key: &UnitKey) -> Result<(), StoreError> {
        self.tables().readings.remove(key);
        Ok(())
    }

    async fn insert_readings(&self, readings: &ReadingSet) -> Result<(), StoreError> {
        let mut tables = self.tables();
        let existing = tables.readings.entry(readings.key.clone()).or_default();
        if let Some(duplicate) = readings
            .rows
            .iter()
            .find(|row| existing.iter().any(|stored| stored.index == row.index))
        {
            return Err(StoreError::Rejected(format!(
                "row {} already exists for {}",
                duplicate.index, readings.key
            )));
        }
        existing.extend(readings.rows.iter().cloned());
        existing.sort_by_key(|row| row.index);
        Ok(())
    }

    async fn save_header(&self, header: &HeaderRecord, _draft: bool) -> Result<(), StoreError> {
        self.tables()
            .headers
            .insert(header.key.clone(), header.clone());
        Ok(())
    }

    async fn update_linked_equipment(
        &self,
        update: &LinkedEquipmentUpdate,
    ) -> Result<(), StoreError> {
        let snapshot = EquipmentSnapshot {
            job_id: update.key.job_id.clone(),
            equip_id: update.key.equip_id.clone(),
            make: update.make.clone(),
            model: update.model.clone(),
            serial_number: update.serial_number.clone(),
            location: update.location.clone(),
            date_code: update.date_code,
        };
        self.tables().equipment.insert(
            (update.key.job_id.clone(), update.key.equip_id.clone()),
            snapshot,
        );
        Ok(())
    }

    async fn get_linked_equipment_snapshot(
        &self,
        job_id: &str,
        equip_id: &str,
    ) -> Result<EquipmentSnapshot, StoreError> {
        self.tables()
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
        Ok(self
            .tables()
            .reconciliations
            .get(&(job_id.to_string(), equip_id.to_string()))
            .cloned())
    }

    async fn save_reconciliation(&self, record: &ReconciliationRecord) -> Result<(), StoreError> {
        self.tables().reconciliations.insert(
            (record.job_id.clone(), record.equip_id.clone()),
            record.clone(),
        );
        Ok(())
    }

    async fn persist_status(&self, update: &StatusUpdate) -> Result<(), StoreError> {
        let mut tables = self.tables();
        let header = tables
            .headers
            .get_mut(&update.key)
            .ok_or(StoreError::NotFound)?;
        header.status = update.status;
        header.replace_count = update.replace_count;
        header.monitor_count = update.monitor_count;
        tables.statuses.push(update.clone());
        Ok(())
    }

    async fn get_threshold_table(
        &self,
        sub_type: DeviceSubType,
        sub_type_name: &str,
        charger_mode: ChargerMode,
    ) -> Result<Thresholds, StoreError> {
        let key = (sub_type, sub_type_name.trim().to_string(), charger_mode);
        self.tables()
            .thresholds
            .get(&key)
            .copied()
            .ok_or(StoreError::NotFound)
    }

    async fn get_reference_value(
        &self,
        _equip_id: &str,
        _scale: ConductanceScale,
        model: &str,
    ) -> Result<f64, StoreError> {
        self.tables()
            .references
            .get(model.trim())
            .copied()
            .ok_or(StoreError::NotFound)
    }
}

pub(crate) fn parse_date(raw: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|err| format!("failed to parse '{raw}' as YYYY-MM-DD ({err})"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use inspection_engine::workflows::readings::{Chemistry, Topology, UnitConfiguration};

    fn key() -> UnitKey {
        UnitKey::new("J-1", "EQ-1", "STR-1")
    }

    #[tokio::test]
    async fn seeded_store_resolves_float_thresholds() {
        let store = InMemoryInspectionStore::seeded();

        let thresholds = store
            .get_threshold_table(DeviceSubType::Standard, "12V block", ChargerMode::Float)
            .await
            .expect("seeded thresholds");

        assert_eq!(thresholds, Thresholds::floors(12.0, 12.6));
        assert_eq!(
            store
                .get_threshold_table(DeviceSubType::Bcm, "12V block", ChargerMode::Float)
                .await,
            Err(StoreError::NotFound)
        );
    }

    #[tokio::test]
    async fn insert_rejects_rows_that_already_exist() {
        let store = InMemoryInspectionStore::default();
        let header = HeaderRecord::new(
            key(),
            UnitConfiguration {
                topology: Topology::External,
                units_per_group: 1,
                group_count: 1,
            },
            Chemistry::Vrla,
        );
        let row = inspection_engine::workflows::readings::rows::blank_reading(1);
        store.seed_unit(&header, vec![row.clone()]);

        let result = store
            .insert_readings(&ReadingSet::new(key(), vec![row.clone()]))
            .await;
        assert!(matches!(result, Err(StoreError::Rejected(_))));

        store
            .replace_reading_set(&ReadingSet::new(key(), vec![row]))
            .await
            .expect("replace deletes before inserting");
    }

    #[test]
    fn parse_date_reports_bad_input() {
        assert!(parse_date("2024-06-01").is_ok());
        assert!(parse_date("06/01/2024")
            .unwrap_err()
            .contains("YYYY-MM-DD"));
    }
}
