//! Obstetrical history and examination findings.

use super::CreateContext;
use crate::bmi::{body_mass_index, BodyMassIndex};
use crate::constants::{
    BODY_MEASUREMENT, FP_OBSTETRICAL, OBSTETRICAL_HISTORY, PELVIC_EXAM, PHYSICAL_EXAM,
};
use crate::intake::{
    BodyMeasurementInput, FpObstetricalInput, ObstetricalHistoryInput, PelvicExamInput,
    PhysicalExamInput,
};
use crate::IntakeResult;
use intake_types::{
    BodyMeasurementId, FpObstetricalId, FpRecordId, ObstetricalHistoryId, PatientId,
    PatientRecordId, PelvicExamId, PhysicalExamId,
};
use serde::Serialize;

#[derive(Serialize)]
pub(crate) struct BodyMeasurementBody<'a> {
    #[serde(flatten)]
    pub(crate) input: &'a BodyMeasurementInput,
    #[serde(flatten)]
    pub(crate) derived: BodyMassIndex,
}

impl<'a> BodyMeasurementBody<'a> {
    pub(crate) fn new(input: &'a BodyMeasurementInput) -> Self {
        Self {
            input,
            derived: body_mass_index(input.weight, input.height),
        }
    }
}

/// Writes the pregnancy history twice: the patient-wide table first, then the intake-scoped
/// table. If the second write fails the first row stays.
pub async fn create_obstetrical_history(
    ctx: &CreateContext<'_>,
    history: &ObstetricalHistoryInput,
    intake_history: &FpObstetricalInput,
    patient_record: &PatientRecordId,
    fp_record: &FpRecordId,
) -> IntakeResult<(ObstetricalHistoryId, FpObstetricalId)> {
    let patient_wide = ctx
        .create(
            &OBSTETRICAL_HISTORY,
            history,
            &[("patrec_id", patient_record.raw())],
        )
        .await?;
    let intake_scoped = ctx
        .create(&FP_OBSTETRICAL, intake_history, &[("fprecord_id", fp_record.raw())])
        .await
        .inspect_err(|_| {
            tracing::warn!(
                obs_id = %patient_wide,
                "patient-wide obstetrical history left without intake counterpart"
            );
        })?;

    Ok((
        ObstetricalHistoryId::new(patient_wide),
        FpObstetricalId::new(intake_scoped),
    ))
}

/// Records the body measurement (with derived BMI) against the patient, then the exam
/// findings against the intake, linked to that measurement.
pub async fn create_physical_exam(
    ctx: &CreateContext<'_>,
    measurement: &BodyMeasurementInput,
    exam: &PhysicalExamInput,
    patient: &PatientId,
    fp_record: &FpRecordId,
) -> IntakeResult<(BodyMeasurementId, PhysicalExamId)> {
    let body = BodyMeasurementBody::new(measurement);
    let bm_id = ctx
        .create(&BODY_MEASUREMENT, &body, &[("pat_id", patient.raw())])
        .await?;
    let pe_id = ctx
        .create(
            &PHYSICAL_EXAM,
            exam,
            &[("fprecord_id", fp_record.raw()), ("bm_id", &bm_id)],
        )
        .await
        .inspect_err(|_| {
            tracing::warn!(bm_id = %bm_id, "body measurement left without physical exam");
        })?;

    Ok((BodyMeasurementId::new(bm_id), PhysicalExamId::new(pe_id)))
}

/// Only called when the method gate says so; see [`crate::gates::requires_pelvic_exam`].
pub async fn create_pelvic_exam(
    ctx: &CreateContext<'_>,
    input: &PelvicExamInput,
    fp_record: &FpRecordId,
) -> IntakeResult<PelvicExamId> {
    let id = ctx
        .create(&PELVIC_EXAM, input, &[("fprecord_id", fp_record.raw())])
        .await?;
    Ok(PelvicExamId::new(id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{sample_intake, MockBackend};
    use serde_json::json;

    #[tokio::test]
    async fn test_obstetrical_history_writes_patient_wide_table_first() {
        let backend = MockBackend::new();
        let ctx = CreateContext::new(&backend, None);
        let plan = sample_intake("Pills").into_plan().unwrap();

        let (obs_id, fpob_id) = create_obstetrical_history(
            &ctx,
            &plan.obstetrical_history,
            &plan.fp_obstetrical,
            &PatientRecordId::from(10),
            &FpRecordId::from(11),
        )
        .await
        .unwrap();

        assert_eq!(obs_id, ObstetricalHistoryId::from(1));
        assert_eq!(fpob_id, FpObstetricalId::from(2));
        assert_eq!(
            backend.posted_paths(),
            vec![OBSTETRICAL_HISTORY.path, FP_OBSTETRICAL.path]
        );

        let intake_scoped = backend.body_posted_to(FP_OBSTETRICAL.path).unwrap();
        assert_eq!(intake_scoped["fprecord_id"], json!(11));
        assert_eq!(intake_scoped["fpob_last_delivery"], json!("2023-03-14"));
    }

    #[tokio::test]
    async fn test_obstetrical_history_stops_after_first_failure() {
        let backend = MockBackend::new();
        backend.fail_path(OBSTETRICAL_HISTORY.path, 400, "{}");
        let ctx = CreateContext::new(&backend, None);
        let plan = sample_intake("Pills").into_plan().unwrap();

        let err = create_obstetrical_history(
            &ctx,
            &plan.obstetrical_history,
            &plan.fp_obstetrical,
            &PatientRecordId::from(10),
            &FpRecordId::from(11),
        )
        .await
        .expect_err("scripted failure");

        assert_eq!(err.resource(), Some("obstetrical_history"));
        assert_eq!(backend.calls_to(FP_OBSTETRICAL.path), 0);
    }

    #[tokio::test]
    async fn test_physical_exam_carries_derived_bmi_and_links_measurement() {
        let backend = MockBackend::new();
        let ctx = CreateContext::new(&backend, None);
        let plan = sample_intake("Pills").into_plan().unwrap();

        let (bm_id, pe_id) = create_physical_exam(
            &ctx,
            &plan.body_measurement,
            &plan.physical_exam,
            &PatientId::from("PAT0001"),
            &FpRecordId::from(11),
        )
        .await
        .unwrap();

        assert_eq!(bm_id, BodyMeasurementId::from(1));
        assert_eq!(pe_id, PhysicalExamId::from(2));

        let measurement = backend.body_posted_to(BODY_MEASUREMENT.path).unwrap();
        assert_eq!(measurement["bmi"], json!(23.4));
        assert_eq!(measurement["bmi_category"], json!("Normal"));
        assert_eq!(measurement["pat_id"], json!("PAT0001"));

        let exam = backend.body_posted_to(PHYSICAL_EXAM.path).unwrap();
        assert_eq!(exam["bm_id"], json!(1));
        assert_eq!(exam["fprecord_id"], json!(11));
        assert_eq!(exam["skin_exam"], json!("normal"));
    }

    #[tokio::test]
    async fn test_missing_measurements_send_unknown_bmi() {
        let backend = MockBackend::new();
        let ctx = CreateContext::new(&backend, None);
        let plan = sample_intake("Pills").into_plan().unwrap();
        let measurement = BodyMeasurementInput {
            weight: Some(60.0),
            height: None,
        };

        create_physical_exam(
            &ctx,
            &measurement,
            &plan.physical_exam,
            &PatientId::from("PAT0001"),
            &FpRecordId::from(11),
        )
        .await
        .unwrap();

        let body = backend.body_posted_to(BODY_MEASUREMENT.path).unwrap();
        assert_eq!(body["bmi"], json!(0.0));
        assert_eq!(body["bmi_category"], json!("Unknown"));
        assert_eq!(body["height"], json!(null));
    }
}
