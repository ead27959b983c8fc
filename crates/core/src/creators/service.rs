//! Consent, the scheduled return visit, and the service-provision assessment.

use super::CreateContext;
use crate::constants::{ACKNOWLEDGEMENT, ASSESSMENT, FOLLOW_UP_VISIT};
use crate::intake::{AcknowledgementInput, AssessmentInput, FollowUpVisitInput};
use crate::IntakeResult;
use intake_types::{
    AcknowledgementId, AssessmentId, FollowUpVisitId, FpRecordId, FpTypeId, PatientRecordId,
};

pub async fn create_acknowledgement(
    ctx: &CreateContext<'_>,
    input: &AcknowledgementInput,
    fp_record: &FpRecordId,
    fp_type: &FpTypeId,
) -> IntakeResult<AcknowledgementId> {
    let id = ctx
        .create(
            &ACKNOWLEDGEMENT,
            input,
            &[("fprecord_id", fp_record.raw()), ("fpt_id", fp_type.raw())],
        )
        .await?;
    Ok(AcknowledgementId::new(id))
}

pub async fn create_follow_up_visit(
    ctx: &CreateContext<'_>,
    input: &FollowUpVisitInput,
    patient_record: &PatientRecordId,
) -> IntakeResult<FollowUpVisitId> {
    let id = ctx
        .create(&FOLLOW_UP_VISIT, input, &[("patrec_id", patient_record.raw())])
        .await?;
    Ok(FollowUpVisitId::new(id))
}

/// The follow-up reference is a plain borrow: an assessment cannot be issued without one.
pub async fn create_assessment(
    ctx: &CreateContext<'_>,
    input: &AssessmentInput,
    follow_up: &FollowUpVisitId,
    fp_record: &FpRecordId,
) -> IntakeResult<AssessmentId> {
    let id = ctx
        .create(
            &ASSESSMENT,
            input,
            &[("followv_id", follow_up.raw()), ("fprecord_id", fp_record.raw())],
        )
        .await?;
    Ok(AssessmentId::new(id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{sample_intake, MockBackend};
    use serde_json::json;

    #[tokio::test]
    async fn test_acknowledgement_links_intake_and_visit_type() {
        let backend = MockBackend::new();
        let ctx = CreateContext::new(&backend, None);
        let plan = sample_intake("Pills").into_plan().unwrap();

        create_acknowledgement(
            &ctx,
            &plan.acknowledgement,
            &FpRecordId::from(2),
            &FpTypeId::from(3),
        )
        .await
        .unwrap();

        let body = backend.body_posted_to(ACKNOWLEDGEMENT.path).unwrap();
        assert_eq!(body["fprecord_id"], json!(2));
        assert_eq!(body["fpt_id"], json!(3));
        assert_eq!(body["client_name"], json!("Maria Santos"));
        assert_eq!(body["ack_client_signature_date"], json!("2024-05-20"));
    }

    #[tokio::test]
    async fn test_follow_up_visit_is_pending_on_scheduled_date() {
        let backend = MockBackend::new();
        let ctx = CreateContext::new(&backend, None);
        let plan = sample_intake("Pills").into_plan().unwrap();

        create_follow_up_visit(&ctx, &plan.follow_up_visit, &PatientRecordId::from(1))
            .await
            .unwrap();

        let body = backend.body_posted_to(FOLLOW_UP_VISIT.path).unwrap();
        assert_eq!(body["followv_date"], json!("2024-08-20"));
        assert_eq!(body["followv_status"], json!("pending"));
        assert_eq!(body["patrec_id"], json!(1));
    }

    #[tokio::test]
    async fn test_assessment_references_follow_up_and_intake() {
        let backend = MockBackend::new();
        let ctx = CreateContext::new(&backend, None);
        let plan = sample_intake("Pills").into_plan().unwrap();

        create_assessment(
            &ctx,
            &plan.assessment,
            &FollowUpVisitId::from(8),
            &FpRecordId::from(2),
        )
        .await
        .unwrap();

        let body = backend.body_posted_to(ASSESSMENT.path).unwrap();
        assert_eq!(body["followv_id"], json!(8));
        assert_eq!(body["fprecord_id"], json!(2));
        assert_eq!(body["quantity"], json!(3));
        assert_eq!(body["as_provider_name"], json!("Nurse Reyes"));
    }
}
