use super::domain::{Attestation, ReconciledField, ReconciliationEntry, ReconciliationRecord};
use super::pipeline::SaveMode;
use super::validation::ValidationError;

impl ReconciliationRecord {
    /// Records the operator's attestation. Any answer other than `Incorrect` clears the
    /// observed value.
    pub fn set_attestation(&mut self, field: ReconciledField, attestation: Attestation) {
        let entry = self.entries.entry(field).or_default();
        entry.attestation = attestation;
        if attestation != Attestation::Incorrect {
            entry.actual = None;
        }
    }

    /// Enters the observed value; only allowed once the declared value is marked incorrect.
    pub fn set_actual(
        &mut self,
        field: ReconciledField,
        actual: impl Into<String>,
    ) -> Result<(), ValidationError> {
        match self.entries.get_mut(&field) {
            Some(entry) if entry.attestation == Attestation::Incorrect => {
                entry.actual = Some(actual.into());
                Ok(())
            }
            _ => Err(ValidationError::ActualNotEditable(field)),
        }
    }

    /// Fields the operator has flagged as not matching the declared value.
    pub fn mismatches(&self) -> Vec<ReconciledField> {
        self.entries
            .iter()
            .filter(|(_, entry)| entry.attestation == Attestation::Incorrect)
            .map(|(field, _)| *field)
            .collect()
    }
}

/// Withholds a final save until every declared value has been attested.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReconciliationGate;

impl ReconciliationGate {
    /// Checks per-field consistency: incorrect answers need an observed value, all others must
    /// have none.
    pub fn validate(&self, record: &ReconciliationRecord) -> Result<(), ValidationError> {
        for (field, entry) in &record.entries {
            check_entry(*field, entry)?;
        }
        Ok(())
    }

    pub fn check(&self, record: &ReconciliationRecord, mode: SaveMode) -> Result<(), ValidationError> {
        if mode == SaveMode::Draft {
            return Ok(());
        }

        if !record.verified {
            return Err(ValidationError::ReconciliationUnverified);
        }

        self.validate(record)
    }
}

fn check_entry(field: ReconciledField, entry: &ReconciliationEntry) -> Result<(), ValidationError> {
    let has_actual = entry
        .actual
        .as_deref()
        .map(|value| !value.trim().is_empty())
        .unwrap_or(false);

    match entry.attestation {
        Attestation::Incorrect if !has_actual => Err(ValidationError::MissingActual(field)),
        Attestation::Correct | Attestation::Unanswered if entry.actual.is_some() => {
            Err(ValidationError::ActualNotEditable(field))
        }
        _ => Ok(()),
    }
}
