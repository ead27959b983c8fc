//! Finds the subject's stable patient identifier.

use crate::backend::{self, Backend};
use crate::constants::PATIENT_LOOKUP;
use crate::{IntakeError, IntakeResult};
use intake_types::{NonEmptyText, PatientId, RawId};
use serde_json::Value;

/// What the intake knows about its subject.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubjectRef {
    /// The patient identifier is already on the form.
    Known(PatientId),
    /// Only the resident profile reference is known; the identifier must be looked up.
    Resident(NonEmptyText),
}

/// Returns the subject's patient identifier, looking it up by resident reference if needed.
///
/// The lookup answer may be a single object or a list of matches; the first match wins.
///
/// # Errors
///
/// - [`IntakeError::Transport`] if the lookup call fails or answers with a non-2xx status
/// - [`IntakeError::Resolution`] if the lookup succeeds but carries no `pat_id`
pub async fn resolve_patient_id(
    backend: &dyn Backend,
    subject: &SubjectRef,
) -> IntakeResult<PatientId> {
    let resident = match subject {
        SubjectRef::Known(id) => return Ok(id.clone()),
        SubjectRef::Resident(resident) => resident,
    };

    let path = format!("{}{}/", PATIENT_LOOKUP.path, resident);
    let body = backend::fetch(backend, &PATIENT_LOOKUP, path).await?;

    let record = match &body {
        Value::Array(matches) => matches.first(),
        other => Some(other),
    };

    let id = record
        .and_then(|r| r.get(PATIENT_LOOKUP.id_field))
        .and_then(RawId::from_json)
        .ok_or(IntakeError::Resolution {
            resource: PATIENT_LOOKUP.name,
            field: PATIENT_LOOKUP.id_field,
        })?;

    tracing::debug!(resident = %resident, pat_id = %id, "resolved patient identifier");
    Ok(PatientId::new(id))
}
