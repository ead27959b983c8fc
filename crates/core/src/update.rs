//! In-place updates for an intake that already exists.
//!
//! Each typed update mirrors its creator but takes the row's existing identifier and issues a
//! single PATCH. Updates do not depend on one another, so [`apply_updates`] dispatches a batch
//! concurrently.

use crate::backend::{self, linked_body, Backend, Resource};
use crate::bmi::body_mass_index;
use crate::constants::*;
use crate::creators::history::BodyMeasurementBody;
use crate::intake::{
    AcknowledgementInput, AssessmentInput, BodyMeasurementInput, FollowUpVisitInput,
    FpObstetricalInput, FpRecordInput, FpTypeInput, ObstetricalHistoryInput, PelvicExamInput,
    PhysicalExamInput, PregnancyCheckInput, RiskStiInput, RiskVawInput,
};
use crate::{IntakeError, IntakeResult};
use intake_types::{
    AcknowledgementId, AssessmentId, BodyMeasurementId, FollowUpVisitId, FpObstetricalId,
    FpRecordId, FpTypeId, ObstetricalHistoryId, PelvicExamId, PhysicalExamId, PregnancyCheckId,
    RawId, RiskStiId, RiskVawId,
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;
use tokio::task::JoinSet;

macro_rules! typed_update {
    ($($fn_name:ident($id:ty, $input:ty) => $resource:ident;)+) => {
        $(
            pub async fn $fn_name(
                backend: &dyn Backend,
                id: &$id,
                input: &$input,
            ) -> IntakeResult<()> {
                let body = linked_body(input, &[])?;
                backend::update(backend, &$resource, id.raw(), body).await
            }
        )+
    };
}

typed_update! {
    update_fp_record(FpRecordId, FpRecordInput) => FP_RECORD;
    update_fp_type(FpTypeId, FpTypeInput) => FP_TYPE;
    update_risk_sti(RiskStiId, RiskStiInput) => RISK_STI;
    update_risk_vaw(RiskVawId, RiskVawInput) => RISK_VAW;
    update_obstetrical_history(ObstetricalHistoryId, ObstetricalHistoryInput) => OBSTETRICAL_HISTORY;
    update_fp_obstetrical(FpObstetricalId, FpObstetricalInput) => FP_OBSTETRICAL;
    update_physical_exam(PhysicalExamId, PhysicalExamInput) => PHYSICAL_EXAM;
    update_pelvic_exam(PelvicExamId, PelvicExamInput) => PELVIC_EXAM;
    update_acknowledgement(AcknowledgementId, AcknowledgementInput) => ACKNOWLEDGEMENT;
    update_follow_up_visit(FollowUpVisitId, FollowUpVisitInput) => FOLLOW_UP_VISIT;
    update_assessment(AssessmentId, AssessmentInput) => ASSESSMENT;
    update_pregnancy_check(PregnancyCheckId, PregnancyCheckInput) => PREGNANCY_CHECK;
}

/// Rewrites a body measurement. BMI and its category are recomputed from the new values.
pub async fn update_body_measurement(
    backend: &dyn Backend,
    id: &BodyMeasurementId,
    input: &BodyMeasurementInput,
) -> IntakeResult<()> {
    let body = linked_body(&BodyMeasurementBody::new(input), &[])?;
    backend::update(backend, &BODY_MEASUREMENT, id.raw(), body).await
}

// ============================================================================
// UNTYPED BATCH UPDATES
// ============================================================================

/// A resource that can be edited after submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateTarget {
    FpRecord,
    FpType,
    RiskSti,
    RiskVaw,
    ObstetricalHistory,
    FpObstetrical,
    BodyMeasurement,
    PhysicalExam,
    PelvicExam,
    Acknowledgement,
    FollowUpVisit,
    Assessment,
    PregnancyCheck,
}

impl UpdateTarget {
    pub fn resource(&self) -> Resource {
        match self {
            UpdateTarget::FpRecord => FP_RECORD,
            UpdateTarget::FpType => FP_TYPE,
            UpdateTarget::RiskSti => RISK_STI,
            UpdateTarget::RiskVaw => RISK_VAW,
            UpdateTarget::ObstetricalHistory => OBSTETRICAL_HISTORY,
            UpdateTarget::FpObstetrical => FP_OBSTETRICAL,
            UpdateTarget::BodyMeasurement => BODY_MEASUREMENT,
            UpdateTarget::PhysicalExam => PHYSICAL_EXAM,
            UpdateTarget::PelvicExam => PELVIC_EXAM,
            UpdateTarget::Acknowledgement => ACKNOWLEDGEMENT,
            UpdateTarget::FollowUpVisit => FOLLOW_UP_VISIT,
            UpdateTarget::Assessment => ASSESSMENT,
            UpdateTarget::PregnancyCheck => PREGNANCY_CHECK,
        }
    }

    /// Columns an edit may change. Link fields, the row's own key, and derived values such as
    /// `bmi` are not listed.
    pub fn columns(&self) -> &'static [&'static str] {
        match self {
            UpdateTarget::FpRecord => &[
                "client_id",
                "avg_monthly_income",
                "nhts",
                "fourps",
                "plan_more_children",
            ],
            UpdateTarget::FpType => &[
                "fpt_client_type",
                "fpt_subtype",
                "fpt_reason_fp",
                "fpt_reason",
                "fpt_method_used",
            ],
            UpdateTarget::RiskSti => &[
                "abnormal_discharge",
                "discharge_from",
                "sores",
                "pain",
                "history",
                "hiv",
                "referred_to",
            ],
            UpdateTarget::RiskVaw => &[
                "unpleasant_relationship",
                "partner_disapproval",
                "domestic_violence",
                "referred_to",
            ],
            UpdateTarget::ObstetricalHistory => &[
                "obs_gravida",
                "obs_para",
                "obs_fullterm",
                "obs_preterm",
                "obs_abortion",
                "obs_living_ch",
            ],
            UpdateTarget::FpObstetrical => &[
                "fpob_last_delivery",
                "fpob_type_last_delivery",
                "fpob_last_period",
                "fpob_previous_period",
                "fpob_mens_flow",
                "fpob_dysme",
                "fpob_hydatidiform",
                "fpob_pelvic_ectopic",
            ],
            UpdateTarget::BodyMeasurement => &["weight", "height"],
            UpdateTarget::PhysicalExam => &[
                "skin_exam",
                "conjunctiva_exam",
                "neck_exam",
                "breast_exam",
                "abdomen_exam",
                "extremities_exam",
                "blood_pressure",
                "pulse_rate",
            ],
            UpdateTarget::PelvicExam => &[
                "pelvic_exam",
                "cervical_consistency",
                "cervical_tenderness",
                "cervical_adnexal",
                "uterine_position",
                "uterine_depth",
            ],
            UpdateTarget::Acknowledgement => &[
                "client_name",
                "ack_client_signature",
                "ack_client_signature_date",
                "guardian_name",
                "guardian_signature",
            ],
            UpdateTarget::FollowUpVisit => {
                &["followv_date", "followv_status", "followv_description"]
            }
            UpdateTarget::Assessment => &[
                "quantity",
                "as_provider_name",
                "as_provider_signature",
                "as_findings",
                "as_method",
            ],
            UpdateTarget::PregnancyCheck => &[
                "breastfeeding",
                "abstained",
                "recent_baby",
                "recent_period",
                "recent_abortion",
                "using_contraceptive",
            ],
        }
    }
}

/// A partial update of one existing row, as sent by the edit screens.
#[derive(Debug, Clone, Deserialize)]
pub struct RecordUpdate {
    pub resource: UpdateTarget,
    pub id: RawId,
    #[serde(default)]
    pub fields: Map<String, Value>,
}

impl RecordUpdate {
    /// The PATCH body for this update.
    ///
    /// # Errors
    ///
    /// Returns [`IntakeError::InvalidInput`] if there is nothing to change, if a field is not
    /// an editable column of the resource, or if a body measurement update does not carry
    /// both `weight` and `height`.
    pub fn body(&self) -> IntakeResult<Value> {
        let resource = self.resource.resource();
        if self.fields.is_empty() {
            return Err(IntakeError::InvalidInput(format!(
                "update of {} {} carries no fields",
                resource.name, self.id
            )));
        }
        let columns = self.resource.columns();
        if let Some(field) = self.fields.keys().find(|f| !columns.contains(&f.as_str())) {
            return Err(IntakeError::InvalidInput(format!(
                "{} is not an editable field of {}",
                field, resource.name
            )));
        }

        let mut fields = self.fields.clone();
        if self.resource == UpdateTarget::BodyMeasurement {
            let measurement = |name: &str| {
                fields
                    .get(name)
                    .and_then(Value::as_f64)
                    .filter(|v| v.is_finite() && *v >= 0.0)
            };
            let (Some(weight), Some(height)) = (measurement("weight"), measurement("height"))
            else {
                return Err(IntakeError::InvalidInput(
                    "body measurement updates need both weight and height".into(),
                ));
            };
            let derived = body_mass_index(Some(weight), Some(height));
            fields.insert("bmi".into(), Value::from(derived.bmi));
            fields.insert(
                "bmi_category".into(),
                Value::from(derived.bmi_category.as_str()),
            );
        }
        Ok(Value::Object(fields))
    }
}

async fn apply_update(backend: &dyn Backend, update: &RecordUpdate) -> IntakeResult<()> {
    let body = update.body()?;
    backend::update(backend, &update.resource.resource(), &update.id, body).await
}

#[derive(Debug, Clone, Serialize)]
pub struct UpdateOutcome {
    pub resource: UpdateTarget,
    pub id: RawId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl UpdateOutcome {
    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

/// Applies every update concurrently and reports one outcome per update, in input order.
///
/// A failed update does not stop the others.
pub async fn apply_updates(
    backend: Arc<dyn Backend>,
    updates: Vec<RecordUpdate>,
) -> Vec<UpdateOutcome> {
    let mut outcomes: Vec<UpdateOutcome> = updates
        .iter()
        .map(|u| UpdateOutcome {
            resource: u.resource,
            id: u.id.clone(),
            error: Some("update task did not complete".into()),
        })
        .collect();

    let mut tasks = JoinSet::new();
    for (index, update) in updates.into_iter().enumerate() {
        let backend = Arc::clone(&backend);
        tasks.spawn(async move { (index, apply_update(backend.as_ref(), &update).await) });
    }

    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok((index, result)) => {
                if let Err(e) = &result {
                    tracing::warn!(
                        resource = outcomes[index].resource.resource().name,
                        id = %outcomes[index].id,
                        error = %e,
                        "record update failed"
                    );
                }
                outcomes[index].error = result.err().map(|e| e.to_string());
            }
            Err(e) => tracing::error!(error = %e, "update task aborted"),
        }
    }

    let failed = outcomes.iter().filter(|o| !o.is_ok()).count();
    tracing::info!(total = outcomes.len(), failed, "record updates applied");
    outcomes
}
