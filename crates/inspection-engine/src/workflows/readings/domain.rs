use std::collections::BTreeMap;
use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Identifies one unit instance: a job, the equipment under inspection, and the string/unit id.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UnitKey {
    pub job_id: String,
    pub equip_id: String,
    pub unit_id: String,
}

impl UnitKey {
    pub fn new(
        job_id: impl Into<String>,
        equip_id: impl Into<String>,
        unit_id: impl Into<String>,
    ) -> Self {
        Self {
            job_id: job_id.into(),
            equip_id: equip_id.into(),
            unit_id: unit_id.into(),
        }
    }
}

impl fmt::Display for UnitKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.job_id, self.equip_id, self.unit_id)
    }
}

/// Per-row or per-channel classification outcome.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    #[default]
    Pass,
    Monitor,
    Replace,
}

impl Verdict {
    pub const fn label(self) -> &'static str {
        match self {
            Verdict::Pass => "pass",
            Verdict::Monitor => "monitor",
            Verdict::Replace => "replace",
        }
    }

    /// Folds channel verdicts: the first replace wins, else the first monitor, else pass.
    pub fn combine(verdicts: impl IntoIterator<Item = Verdict>) -> Verdict {
        let mut combined = Verdict::Pass;
        for verdict in verdicts {
            match verdict {
                Verdict::Replace => return Verdict::Replace,
                Verdict::Monitor => combined = Verdict::Monitor,
                Verdict::Pass => {}
            }
        }
        combined
    }
}

/// Qualitative defect indicator captured per row.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DefectFlag {
    /// Row was synthesized and not yet inspected.
    #[default]
    Pending,
    NoDefect,
    VisibleDefect,
}

/// One measured point on one unit (one cell, one jar, one phase).
///
/// The outcome is stored as a single [`Verdict`], so a row can never need both replacement and
/// monitoring at once.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    pub index: u32,
    pub voltage: f64,
    pub conductance: f64,
    pub current: f64,
    pub frequency: f64,
    pub temperature: f64,
    pub defect: DefectFlag,
    #[serde(default)]
    pub verdict: Verdict,
    #[serde(default)]
    pub action_plan: String,
}

impl Reading {
    pub fn needs_replace(&self) -> bool {
        self.verdict == Verdict::Replace
    }

    pub fn needs_monitor(&self) -> bool {
        self.verdict == Verdict::Monitor
    }

    /// Records an operator's manual verdict. Setting one outcome clears the other.
    pub fn apply_override(&mut self, verdict: Verdict, action_plan: impl Into<String>) {
        self.verdict = verdict;
        self.action_plan = action_plan.into();
    }

    /// Primary measurement used for deletion safety and classification.
    pub fn primary_value(&self) -> f64 {
        self.voltage
    }

    pub fn has_recorded_data(&self) -> bool {
        self.primary_value() > 0.0
    }
}

/// Ordered readings belonging to one unit instance.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReadingSet {
    pub key: UnitKey,
    pub rows: Vec<Reading>,
}

impl ReadingSet {
    pub fn new(key: UnitKey, rows: Vec<Reading>) -> Self {
        Self { key, rows }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn replace_count(&self) -> u32 {
        self.rows.iter().filter(|row| row.needs_replace()).count() as u32
    }

    pub fn monitor_count(&self) -> u32 {
        self.rows.iter().filter(|row| row.needs_monitor()).count() as u32
    }
}

/// Wiring arrangement determining how group and unit counts combine.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Topology {
    #[default]
    External,
    InternalString,
    PackOrTray,
}

impl Topology {
    pub const fn label(self) -> &'static str {
        match self {
            Topology::External => "external",
            Topology::InternalString => "internal_string",
            Topology::PackOrTray => "pack_or_tray",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitConfiguration {
    pub topology: Topology,
    pub units_per_group: u32,
    pub group_count: u32,
}

impl UnitConfiguration {
    /// Number of rows the configuration calls for.
    pub fn expected_count(&self) -> u32 {
        match self.topology {
            Topology::External => self.units_per_group,
            Topology::InternalString => self.group_count.saturating_mul(self.units_per_group),
            Topology::PackOrTray => self.group_count,
        }
    }
}

/// Battery chemistry code used to look up nominal voltages and lifetimes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Chemistry {
    Vrla,
    Flooded,
    NiCad,
    LithiumIon,
}

impl Chemistry {
    pub const fn label(self) -> &'static str {
        match self {
            Chemistry::Vrla => "vrla",
            Chemistry::Flooded => "flooded",
            Chemistry::NiCad => "nicad",
            Chemistry::LithiumIon => "lithium_ion",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceSubType {
    #[default]
    Standard,
    /// Battery condition monitor; reports block voltages on an absolute scale.
    Bcm,
}

/// What the rows of a reading sheet measure.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReadingType {
    #[default]
    Voltage,
    Conductance,
    /// Specific-gravity / type-value sheets judged against nominal cell voltage.
    TypeValue,
}

/// Scale reported by the conductance instrument.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConductanceScale {
    /// Conductance in siemens; low values are bad.
    #[default]
    Conductance,
    /// Internal impedance or resistance; high values are bad.
    Impedance,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChargerMode {
    #[default]
    Float,
    Equalize,
}

/// Equipment status in ascending severity; `Offline` is operator-set only.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EquipmentStatus {
    #[default]
    Online,
    ProactiveReplacement,
    OnlineMinorDeficiency,
    OnlineMajorDeficiency,
    ReplacementRecommended,
    CriticalDeficiency,
    Offline,
}

impl EquipmentStatus {
    /// Position in the severity ordering; `None` for the terminal `Offline` value.
    pub const fn severity(self) -> Option<u8> {
        match self {
            EquipmentStatus::Online => Some(0),
            EquipmentStatus::ProactiveReplacement => Some(1),
            EquipmentStatus::OnlineMinorDeficiency => Some(2),
            EquipmentStatus::OnlineMajorDeficiency => Some(3),
            EquipmentStatus::ReplacementRecommended => Some(4),
            EquipmentStatus::CriticalDeficiency => Some(5),
            EquipmentStatus::Offline => None,
        }
    }

    /// Returns the more severe of two computed statuses.
    pub fn max_severity(self, other: EquipmentStatus) -> EquipmentStatus {
        match (self.severity(), other.severity()) {
            (Some(a), Some(b)) if b > a => other,
            (Some(_), Some(_)) => self,
            (None, _) => self,
            (_, None) => other,
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            EquipmentStatus::Online => "Online",
            EquipmentStatus::ProactiveReplacement => "Proactive Replacement",
            EquipmentStatus::OnlineMinorDeficiency => "On-Line (Minor Deficiency)",
            EquipmentStatus::OnlineMajorDeficiency => "On-Line (Major Deficiency)",
            EquipmentStatus::ReplacementRecommended => "Replacement Recommended",
            EquipmentStatus::CriticalDeficiency => "Critical Deficiency",
            EquipmentStatus::Offline => "Offline",
        }
    }
}

/// Reason code attached to an operator's "replace whole unit" selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplacementReason {
    Age,
    Damage,
    Capacity,
    Other,
}

/// Pass/fail verification fields captured on the header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldCheck {
    ChargingVoltage,
    TerminalTorque,
    RippleCurrent,
    IntercellConnectors,
    ElectrolyteLevel,
    CaseCondition,
    VentCaps,
    AmbientTemperature,
    Cleanliness,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckResult {
    #[default]
    NotChecked,
    Pass,
    Fail,
}

/// Per-unit inspection header.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeaderRecord {
    pub key: UnitKey,
    pub make: String,
    pub model: String,
    pub serial_number: String,
    pub location: String,
    pub configuration: UnitConfiguration,
    pub chemistry: Chemistry,
    pub device_sub_type: DeviceSubType,
    /// Free-form sub-type name used alongside the sub-type code for threshold lookups.
    pub sub_type_name: String,
    pub reading_type: ReadingType,
    pub conductance_scale: ConductanceScale,
    pub charger_mode: ChargerMode,
    pub date_code: Option<NaiveDate>,
    /// Manufacturer conductance/impedance reference for the model.
    pub reference_value: Option<f64>,
    pub replace_count: u32,
    pub monitor_count: u32,
    pub status: EquipmentStatus,
    /// Status held by the operator on the form; the computed status never drops below it.
    pub operator_status: Option<EquipmentStatus>,
    pub replace_whole_unit: Option<ReplacementReason>,
    #[serde(default)]
    pub field_checks: BTreeMap<FieldCheck, CheckResult>,
}

impl HeaderRecord {
    pub fn new(key: UnitKey, configuration: UnitConfiguration, chemistry: Chemistry) -> Self {
        Self {
            key,
            make: String::new(),
            model: String::new(),
            serial_number: String::new(),
            location: String::new(),
            configuration,
            chemistry,
            device_sub_type: DeviceSubType::Standard,
            sub_type_name: String::new(),
            reading_type: ReadingType::Voltage,
            conductance_scale: ConductanceScale::Conductance,
            charger_mode: ChargerMode::Float,
            date_code: None,
            reference_value: None,
            replace_count: 0,
            monitor_count: 0,
            status: EquipmentStatus::Online,
            operator_status: None,
            replace_whole_unit: None,
            field_checks: BTreeMap::new(),
        }
    }

    pub fn check(&self, field: FieldCheck) -> CheckResult {
        self.field_checks.get(&field).copied().unwrap_or_default()
    }
}

/// Operator's answer to "is the declared value correct?".
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Attestation {
    #[default]
    Unanswered,
    Correct,
    Incorrect,
}

/// Identity and count fields tracked during reconciliation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReconciledField {
    Make,
    Model,
    SerialNumber,
    UnitCount,
    GroupCount,
}

impl ReconciledField {
    pub const ALL: [ReconciledField; 5] = [
        ReconciledField::Make,
        ReconciledField::Model,
        ReconciledField::SerialNumber,
        ReconciledField::UnitCount,
        ReconciledField::GroupCount,
    ];

    pub const fn label(self) -> &'static str {
        match self {
            ReconciledField::Make => "make",
            ReconciledField::Model => "model",
            ReconciledField::SerialNumber => "serial number",
            ReconciledField::UnitCount => "unit count",
            ReconciledField::GroupCount => "group count",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconciliationEntry {
    pub declared: String,
    pub attestation: Attestation,
    pub actual: Option<String>,
}

/// Declared-versus-observed attestation record for one piece of equipment.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconciliationRecord {
    pub job_id: String,
    pub equip_id: String,
    pub entries: BTreeMap<ReconciledField, ReconciliationEntry>,
    pub verified: bool,
}

impl ReconciliationRecord {
    /// Seeds a record with the header's declared identity and counts.
    pub fn from_header(header: &HeaderRecord) -> Self {
        let declared = [
            (ReconciledField::Make, header.make.clone()),
            (ReconciledField::Model, header.model.clone()),
            (ReconciledField::SerialNumber, header.serial_number.clone()),
            (
                ReconciledField::UnitCount,
                header.configuration.units_per_group.to_string(),
            ),
            (
                ReconciledField::GroupCount,
                header.configuration.group_count.to_string(),
            ),
        ];

        Self {
            job_id: header.key.job_id.clone(),
            equip_id: header.key.equip_id.clone(),
            entries: declared
                .into_iter()
                .map(|(field, declared)| {
                    (
                        field,
                        ReconciliationEntry {
                            declared,
                            ..ReconciliationEntry::default()
                        },
                    )
                })
                .collect(),
            verified: false,
        }
    }

    pub fn entry(&self, field: ReconciledField) -> Option<&ReconciliationEntry> {
        self.entries.get(&field)
    }
}
