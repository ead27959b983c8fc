//! The family planning intake aggregate and its validated projection.
//!
//! The wizard submits one [`FamilyPlanningIntake`] covering every page. It is validated once,
//! at the pipeline boundary, by [`FamilyPlanningIntake::into_plan`], which produces an
//! [`IntakePlan`]: one narrow, typed input per record creator with all defaults applied. The
//! creators never look at the raw aggregate.
//!
//! Wire names on the aggregate are camelCase (what the wizard sends); the creator inputs
//! serialise with the backend's column names.

use crate::constants::{
    DEFAULT_CLIENT_TYPE, DEFAULT_EXAM_FINDING, DEFAULT_FINDINGS, DEFAULT_FOLLOW_UP_DESCRIPTION,
    DEFAULT_FOLLOW_UP_STATUS, DEFAULT_METHOD,
};
use crate::resolver::SubjectRef;
use crate::{IntakeError, IntakeResult};
use chrono::{NaiveDate, Utc};
use intake_types::{NonEmptyText, PatientId};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FamilyPlanningIntake {
    pub subject: SubjectSection,
    #[serde(default)]
    pub client: ClientSection,
    #[serde(default)]
    pub visit_type: VisitTypeSection,
    #[serde(default)]
    pub sti_risk: RiskStiInput,
    #[serde(default)]
    pub vaw_risk: RiskVawInput,
    #[serde(default)]
    pub obstetrical: ObstetricalSection,
    #[serde(default)]
    pub physical_exam: PhysicalExamSection,
    #[serde(default)]
    pub pelvic_exam: PelvicExamSection,
    #[serde(default)]
    pub acknowledgement: AcknowledgementSection,
    #[serde(default)]
    pub service_provision: ServiceProvisionSection,
    #[serde(default)]
    pub pregnancy_check: PregnancyCheckInput,
}

/// Who the intake is for. Either the stable patient id is already known, or the resident
/// profile reference is used to look it up.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectSection {
    pub pat_id: Option<PatientId>,
    pub resident_id: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ClientSection {
    pub client_id: Option<String>,
    pub income_bracket: Option<String>,
    pub nhts: bool,
    pub four_ps: bool,
    pub plan_more_children: bool,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct VisitTypeSection {
    pub client_type: Option<String>,
    pub subtype: Option<String>,
    pub reason_for_fp: Option<String>,
    pub reason: Option<String>,
    pub method_currently_used: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ObstetricalSection {
    pub gravida: u32,
    pub para: u32,
    pub fullterm: u32,
    pub premature: u32,
    pub abortion: u32,
    pub living_children: u32,
    pub last_delivery_date: Option<NaiveDate>,
    pub last_delivery_type: Option<String>,
    pub last_period: Option<NaiveDate>,
    pub previous_period: Option<NaiveDate>,
    pub menstrual_flow: Option<String>,
    pub dysmenorrhea: bool,
    pub hydatidiform_mole: bool,
    pub ectopic_pregnancy: bool,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PhysicalExamSection {
    pub weight_kg: Option<f64>,
    pub height_cm: Option<f64>,
    pub blood_pressure: Option<String>,
    pub pulse_rate: Option<u32>,
    pub skin: Option<String>,
    pub conjunctiva: Option<String>,
    pub neck: Option<String>,
    pub breast: Option<String>,
    pub abdomen: Option<String>,
    pub extremities: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PelvicExamSection {
    pub findings: Option<String>,
    pub cervical_consistency: Option<String>,
    pub cervical_tenderness: bool,
    pub cervical_adnexal_mass: bool,
    pub uterine_position: Option<String>,
    pub uterine_depth: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AcknowledgementSection {
    pub client_name: String,
    pub client_signature: Option<String>,
    pub signature_date: Option<NaiveDate>,
    pub guardian_name: Option<String>,
    pub guardian_signature: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServiceProvisionSection {
    pub follow_up_date: Option<NaiveDate>,
    pub follow_up_description: Option<String>,
    pub quantity: u32,
    pub provider_name: String,
    pub provider_signature: Option<String>,
    pub findings: Option<String>,
}

// ============================================================================
// CREATOR INPUTS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FpRecordInput {
    pub client_id: String,
    pub avg_monthly_income: String,
    pub nhts: bool,
    pub fourps: bool,
    pub plan_more_children: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FpTypeInput {
    pub fpt_client_type: String,
    pub fpt_subtype: Option<String>,
    pub fpt_reason_fp: Option<String>,
    pub fpt_reason: Option<String>,
    pub fpt_method_used: String,
}

/// Passed through from the wizard unchanged, so it deserialises from camelCase and
/// serialises with the backend's column names.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(
    rename_all(serialize = "snake_case", deserialize = "camelCase"),
    default
)]
pub struct RiskStiInput {
    pub abnormal_discharge: bool,
    pub discharge_from: Option<String>,
    pub sores: bool,
    pub pain: bool,
    pub history: bool,
    pub hiv: bool,
    pub referred_to: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(
    rename_all(serialize = "snake_case", deserialize = "camelCase"),
    default
)]
pub struct RiskVawInput {
    pub unpleasant_relationship: bool,
    pub partner_disapproval: bool,
    pub domestic_violence: bool,
    pub referred_to: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObstetricalHistoryInput {
    pub obs_gravida: u32,
    pub obs_para: u32,
    pub obs_fullterm: u32,
    pub obs_preterm: u32,
    pub obs_abortion: u32,
    pub obs_living_ch: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FpObstetricalInput {
    pub fpob_last_delivery: Option<NaiveDate>,
    pub fpob_type_last_delivery: Option<String>,
    pub fpob_last_period: Option<NaiveDate>,
    pub fpob_previous_period: Option<NaiveDate>,
    pub fpob_mens_flow: Option<String>,
    pub fpob_dysme: bool,
    pub fpob_hydatidiform: bool,
    pub fpob_pelvic_ectopic: bool,
}

/// Raw anthropometrics. BMI and its band are derived by the creator, never entered.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BodyMeasurementInput {
    pub weight: Option<f64>,
    pub height: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhysicalExamInput {
    pub skin_exam: String,
    pub conjunctiva_exam: String,
    pub neck_exam: String,
    pub breast_exam: String,
    pub abdomen_exam: String,
    pub extremities_exam: String,
    pub blood_pressure: Option<String>,
    pub pulse_rate: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PelvicExamInput {
    pub pelvic_exam: String,
    pub cervical_consistency: String,
    pub cervical_tenderness: bool,
    pub cervical_adnexal: bool,
    pub uterine_position: String,
    pub uterine_depth: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AcknowledgementInput {
    pub client_name: NonEmptyText,
    pub ack_client_signature: String,
    pub ack_client_signature_date: NaiveDate,
    pub guardian_name: Option<String>,
    pub guardian_signature: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FollowUpVisitInput {
    pub followv_date: NaiveDate,
    pub followv_status: String,
    pub followv_description: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssessmentInput {
    pub quantity: u32,
    pub as_provider_name: NonEmptyText,
    pub as_provider_signature: String,
    pub as_findings: String,
    pub as_method: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(
    rename_all(serialize = "snake_case", deserialize = "camelCase"),
    default
)]
pub struct PregnancyCheckInput {
    pub breastfeeding: bool,
    pub abstained: bool,
    pub recent_baby: bool,
    pub recent_period: bool,
    pub recent_abortion: bool,
    pub using_contraceptive: bool,
}

/// A validated intake: everything the pipeline needs, one input per creator.
#[derive(Debug, Clone, PartialEq)]
pub struct IntakePlan {
    pub subject: SubjectRef,
    pub fp_record: FpRecordInput,
    pub fp_type: FpTypeInput,
    pub risk_sti: RiskStiInput,
    pub risk_vaw: RiskVawInput,
    pub obstetrical_history: ObstetricalHistoryInput,
    pub fp_obstetrical: FpObstetricalInput,
    pub body_measurement: BodyMeasurementInput,
    pub physical_exam: PhysicalExamInput,
    pub pelvic_exam: PelvicExamInput,
    pub acknowledgement: AcknowledgementInput,
    pub follow_up_visit: FollowUpVisitInput,
    pub assessment: AssessmentInput,
    pub pregnancy_check: PregnancyCheckInput,
}

impl IntakePlan {
    /// The method text the pelvic exam gate is evaluated against.
    pub fn method_currently_used(&self) -> &str {
        &self.fp_type.fpt_method_used
    }
}

impl FamilyPlanningIntake {
    /// Validates the aggregate and projects it into per-creator inputs.
    ///
    /// An unsigned acknowledgement is dated today (UTC).
    ///
    /// # Errors
    ///
    /// Returns [`IntakeError::InvalidInput`] if:
    /// - the subject has neither a patient id nor a usable resident reference
    /// - the client name or provider name is blank
    /// - weight or height is negative or not a finite number
    /// - the follow-up date is missing
    pub fn into_plan(self) -> IntakeResult<IntakePlan> {
        self.into_plan_on(Utc::now().date_naive())
    }

    /// As [`into_plan`](Self::into_plan), with an explicit date for unsigned acknowledgements.
    pub fn into_plan_on(self, today: NaiveDate) -> IntakeResult<IntakePlan> {
        let subject = subject_ref(self.subject)?;

        let method = non_blank(self.visit_type.method_currently_used)
            .unwrap_or_else(|| DEFAULT_METHOD.to_owned());

        let weight = measurement("weightKg", self.physical_exam.weight_kg)?;
        let height = measurement("heightCm", self.physical_exam.height_cm)?;

        let client_name = NonEmptyText::new(&self.acknowledgement.client_name).map_err(|_| {
            IntakeError::InvalidInput("acknowledgement.clientName cannot be empty".into())
        })?;
        let provider_name =
            NonEmptyText::new(&self.service_provision.provider_name).map_err(|_| {
                IntakeError::InvalidInput("serviceProvision.providerName cannot be empty".into())
            })?;
        let follow_up_date = self.service_provision.follow_up_date.ok_or_else(|| {
            IntakeError::InvalidInput("serviceProvision.followUpDate is required".into())
        })?;

        let exam = self.physical_exam;
        let finding = |value: Option<String>| {
            non_blank(value).unwrap_or_else(|| DEFAULT_EXAM_FINDING.to_owned())
        };
        let obstetrical = self.obstetrical;
        let pelvic = self.pelvic_exam;

        Ok(IntakePlan {
            subject,
            fp_record: FpRecordInput {
                client_id: non_blank(self.client.client_id).unwrap_or_default(),
                avg_monthly_income: non_blank(self.client.income_bracket).unwrap_or_default(),
                nhts: self.client.nhts,
                fourps: self.client.four_ps,
                plan_more_children: self.client.plan_more_children,
            },
            fp_type: FpTypeInput {
                fpt_client_type: non_blank(self.visit_type.client_type)
                    .unwrap_or_else(|| DEFAULT_CLIENT_TYPE.to_owned()),
                fpt_subtype: non_blank(self.visit_type.subtype),
                fpt_reason_fp: non_blank(self.visit_type.reason_for_fp),
                fpt_reason: non_blank(self.visit_type.reason),
                fpt_method_used: method.clone(),
            },
            risk_sti: self.sti_risk,
            risk_vaw: self.vaw_risk,
            obstetrical_history: ObstetricalHistoryInput {
                obs_gravida: obstetrical.gravida,
                obs_para: obstetrical.para,
                obs_fullterm: obstetrical.fullterm,
                obs_preterm: obstetrical.premature,
                obs_abortion: obstetrical.abortion,
                obs_living_ch: obstetrical.living_children,
            },
            fp_obstetrical: FpObstetricalInput {
                fpob_last_delivery: obstetrical.last_delivery_date,
                fpob_type_last_delivery: non_blank(obstetrical.last_delivery_type),
                fpob_last_period: obstetrical.last_period,
                fpob_previous_period: obstetrical.previous_period,
                fpob_mens_flow: non_blank(obstetrical.menstrual_flow),
                fpob_dysme: obstetrical.dysmenorrhea,
                fpob_hydatidiform: obstetrical.hydatidiform_mole,
                fpob_pelvic_ectopic: obstetrical.ectopic_pregnancy,
            },
            body_measurement: BodyMeasurementInput { weight, height },
            physical_exam: PhysicalExamInput {
                skin_exam: finding(exam.skin),
                conjunctiva_exam: finding(exam.conjunctiva),
                neck_exam: finding(exam.neck),
                breast_exam: finding(exam.breast),
                abdomen_exam: finding(exam.abdomen),
                extremities_exam: finding(exam.extremities),
                blood_pressure: non_blank(exam.blood_pressure),
                pulse_rate: exam.pulse_rate,
            },
            pelvic_exam: PelvicExamInput {
                pelvic_exam: finding(pelvic.findings),
                cervical_consistency: finding(pelvic.cervical_consistency),
                cervical_tenderness: pelvic.cervical_tenderness,
                cervical_adnexal: pelvic.cervical_adnexal_mass,
                uterine_position: finding(pelvic.uterine_position),
                uterine_depth: non_blank(pelvic.uterine_depth),
            },
            acknowledgement: AcknowledgementInput {
                client_name,
                ack_client_signature: non_blank(self.acknowledgement.client_signature)
                    .unwrap_or_default(),
                ack_client_signature_date: self.acknowledgement.signature_date.unwrap_or(today),
                guardian_name: non_blank(self.acknowledgement.guardian_name),
                guardian_signature: non_blank(self.acknowledgement.guardian_signature),
            },
            follow_up_visit: FollowUpVisitInput {
                followv_date: follow_up_date,
                followv_status: DEFAULT_FOLLOW_UP_STATUS.to_owned(),
                followv_description: non_blank(self.service_provision.follow_up_description)
                    .unwrap_or_else(|| DEFAULT_FOLLOW_UP_DESCRIPTION.to_owned()),
            },
            assessment: AssessmentInput {
                quantity: self.service_provision.quantity,
                as_provider_name: provider_name,
                as_provider_signature: non_blank(self.service_provision.provider_signature)
                    .unwrap_or_default(),
                as_findings: non_blank(self.service_provision.findings)
                    .unwrap_or_else(|| DEFAULT_FINDINGS.to_owned()),
                as_method: method,
            },
            pregnancy_check: self.pregnancy_check,
        })
    }
}

fn subject_ref(subject: SubjectSection) -> IntakeResult<SubjectRef> {
    if let Some(pat_id) = subject.pat_id {
        return Ok(SubjectRef::Known(pat_id));
    }

    let resident = NonEmptyText::new(subject.resident_id.unwrap_or_default()).map_err(|_| {
        IntakeError::InvalidInput("subject needs either patId or residentId".into())
    })?;
    if resident.as_str().contains(['/', '?', '#']) {
        return Err(IntakeError::InvalidInput(format!(
            "subject.residentId contains reserved characters: {resident}"
        )));
    }

    Ok(SubjectRef::Resident(resident))
}

fn measurement(field: &str, value: Option<f64>) -> IntakeResult<Option<f64>> {
    match value {
        Some(v) if !v.is_finite() || v < 0.0 => Err(IntakeError::InvalidInput(format!(
            "physicalExam.{field} must be a non-negative number"
        ))),
        other => Ok(other),
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_owned())
        .filter(|v| !v.is_empty())
}
