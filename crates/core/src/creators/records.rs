//! The clinical-record wrapper, the root intake form, and its visit classification.

use super::CreateContext;
use crate::constants::{FAMILY_PLANNING_RECORD_TYPE, FP_RECORD, FP_TYPE, PATIENT_RECORD};
use crate::intake::{FpRecordInput, FpTypeInput};
use crate::IntakeResult;
use intake_types::{FpRecordId, FpTypeId, PatientId, PatientRecordId};
use serde::Serialize;

#[derive(Serialize)]
struct PatientRecordBody {
    patrec_type: &'static str,
}

pub async fn create_patient_record(
    ctx: &CreateContext<'_>,
    patient: &PatientId,
) -> IntakeResult<PatientRecordId> {
    let body = PatientRecordBody {
        patrec_type: FAMILY_PLANNING_RECORD_TYPE,
    };
    let id = ctx
        .create(&PATIENT_RECORD, &body, &[("pat_id", patient.raw())])
        .await?;
    Ok(PatientRecordId::new(id))
}

pub async fn create_fp_record(
    ctx: &CreateContext<'_>,
    input: &FpRecordInput,
    patient_record: &PatientRecordId,
) -> IntakeResult<FpRecordId> {
    let id = ctx
        .create(&FP_RECORD, input, &[("patrec_id", patient_record.raw())])
        .await?;
    Ok(FpRecordId::new(id))
}

pub async fn create_fp_type(
    ctx: &CreateContext<'_>,
    input: &FpTypeInput,
    fp_record: &FpRecordId,
) -> IntakeResult<FpTypeId> {
    let id = ctx
        .create(&FP_TYPE, input, &[("fprecord_id", fp_record.raw())])
        .await?;
    Ok(FpTypeId::new(id))
}
