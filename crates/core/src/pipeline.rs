//! The family planning intake saga.
//!
//! One intake becomes up to fourteen backend rows spread over independent resources, and the
//! backend offers no multi-resource transaction. [`IntakeOrchestrator::submit`] runs a fixed,
//! ordered list of [`Step`]s. Each step declares the identifier [`Slot`]s it needs and the ones
//! it fills, so the dependency graph can be inspected and tested without running anything.
//!
//! ## Ordering
//!
//! ```text
//! resolve_patient -> patient_record -> fp_record -> fp_type -> risk_sti -> risk_vaw
//!   -> obstetrical_history (patient-wide, then intake-scoped)
//!   -> physical_exam (body measurement, then exam)
//!   -> pelvic_exam (only for IUD methods)
//!   -> acknowledgement -> follow_up_visit -> assessment -> pregnancy_check
//! ```
//!
//! Steps run strictly one after another.
//!
//! ## Failure
//!
//! The first failing step aborts the run. Rows created before the failure are **not**
//! deleted; [`PipelineError::created`] lists them so the caller can report or clean them up.
//! A resubmission re-runs every step. Each create call carries an `Idempotency-Key` derived
//! from the [`SubmissionKey`]; reusing the key on retry lets a backend that honours the header
//! return the existing rows instead of duplicating them.

use crate::backend::{Backend, Resource};
use crate::creators::{self, CreateContext};
use crate::gates::requires_pelvic_exam;
use crate::intake::IntakePlan;
use crate::resolver::resolve_patient_id;
use crate::{IntakeError, IntakeResult};
use intake_types::{
    AcknowledgementId, AssessmentId, BodyMeasurementId, FollowUpVisitId, FpObstetricalId,
    FpRecordId, FpTypeId, ObstetricalHistoryId, PatientId, PatientRecordId, PelvicExamId,
    PhysicalExamId, PregnancyCheckId, RiskStiId, RiskVawId,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

// ============================================================================
// STEPS AND SLOTS
// ============================================================================

/// An identifier the pipeline threads forward. Named after the backend's key field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Slot {
    Patient,
    PatientRecord,
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

impl Slot {
    pub fn name(&self) -> &'static str {
        match self {
            Slot::Patient => "pat_id",
            Slot::PatientRecord => "patrec_id",
            Slot::FpRecord => "fprecord_id",
            Slot::FpType => "fpt_id",
            Slot::RiskSti => "sti_id",
            Slot::RiskVaw => "vaw_id",
            Slot::ObstetricalHistory => "obs_id",
            Slot::FpObstetrical => "fpob_id",
            Slot::BodyMeasurement => "bm_id",
            Slot::PhysicalExam => "fp_pe_id",
            Slot::PelvicExam => "pelvic_id",
            Slot::Acknowledgement => "ack_id",
            Slot::FollowUpVisit => "followv_id",
            Slot::Assessment => "as_id",
            Slot::PregnancyCheck => "fp_pc_id",
        }
    }

    /// The step that fills this slot.
    pub fn producer(&self) -> Step {
        match self {
            Slot::Patient => Step::ResolvePatient,
            Slot::PatientRecord => Step::PatientRecord,
            Slot::FpRecord => Step::FpRecord,
            Slot::FpType => Step::FpType,
            Slot::RiskSti => Step::RiskSti,
            Slot::RiskVaw => Step::RiskVaw,
            Slot::ObstetricalHistory | Slot::FpObstetrical => Step::ObstetricalHistory,
            Slot::BodyMeasurement | Slot::PhysicalExam => Step::PhysicalExam,
            Slot::PelvicExam => Step::PelvicExam,
            Slot::Acknowledgement => Step::Acknowledgement,
            Slot::FollowUpVisit => Step::FollowUpVisit,
            Slot::Assessment => Step::Assessment,
            Slot::PregnancyCheck => Step::PregnancyCheck,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Step {
    ResolvePatient,
    PatientRecord,
    FpRecord,
    FpType,
    RiskSti,
    RiskVaw,
    ObstetricalHistory,
    PhysicalExam,
    PelvicExam,
    Acknowledgement,
    FollowUpVisit,
    Assessment,
    PregnancyCheck,
}

impl Step {
    /// Execution order.
    pub const PIPELINE: [Step; 13] = [
        Step::ResolvePatient,
        Step::PatientRecord,
        Step::FpRecord,
        Step::FpType,
        Step::RiskSti,
        Step::RiskVaw,
        Step::ObstetricalHistory,
        Step::PhysicalExam,
        Step::PelvicExam,
        Step::Acknowledgement,
        Step::FollowUpVisit,
        Step::Assessment,
        Step::PregnancyCheck,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Step::ResolvePatient => "resolve_patient",
            Step::PatientRecord => "patient_record",
            Step::FpRecord => "fp_record",
            Step::FpType => "fp_type",
            Step::RiskSti => "risk_sti",
            Step::RiskVaw => "risk_vaw",
            Step::ObstetricalHistory => "obstetrical_history",
            Step::PhysicalExam => "physical_exam",
            Step::PelvicExam => "pelvic_exam",
            Step::Acknowledgement => "acknowledgement",
            Step::FollowUpVisit => "follow_up_visit",
            Step::Assessment => "assessment",
            Step::PregnancyCheck => "pregnancy_check",
        }
    }

    pub fn requires(&self) -> &'static [Slot] {
        match self {
            Step::ResolvePatient => &[],
            Step::PatientRecord => &[Slot::Patient],
            Step::FpRecord => &[Slot::PatientRecord],
            Step::FpType
            | Step::RiskSti
            | Step::RiskVaw
            | Step::PelvicExam
            | Step::PregnancyCheck => &[Slot::FpRecord],
            Step::ObstetricalHistory => &[Slot::PatientRecord, Slot::FpRecord],
            Step::PhysicalExam => &[Slot::Patient, Slot::FpRecord],
            Step::Acknowledgement => &[Slot::FpRecord, Slot::FpType],
            Step::FollowUpVisit => &[Slot::PatientRecord],
            Step::Assessment => &[Slot::FollowUpVisit, Slot::FpRecord],
        }
    }

    pub fn produces(&self) -> &'static [Slot] {
        match self {
            Step::ResolvePatient => &[Slot::Patient],
            Step::PatientRecord => &[Slot::PatientRecord],
            Step::FpRecord => &[Slot::FpRecord],
            Step::FpType => &[Slot::FpType],
            Step::RiskSti => &[Slot::RiskSti],
            Step::RiskVaw => &[Slot::RiskVaw],
            Step::ObstetricalHistory => &[Slot::ObstetricalHistory, Slot::FpObstetrical],
            Step::PhysicalExam => &[Slot::BodyMeasurement, Slot::PhysicalExam],
            Step::PelvicExam => &[Slot::PelvicExam],
            Step::Acknowledgement => &[Slot::Acknowledgement],
            Step::FollowUpVisit => &[Slot::FollowUpVisit],
            Step::Assessment => &[Slot::Assessment],
            Step::PregnancyCheck => &[Slot::PregnancyCheck],
        }
    }

    /// Whether a gate may leave this step's slots empty on a successful run.
    pub fn is_optional(&self) -> bool {
        matches!(self, Step::PelvicExam)
    }
}

impl std::fmt::Display for Step {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

// ============================================================================
// IDENTIFIER LEDGER
// ============================================================================

/// Identifiers produced so far. Every slot is write-once.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CreatedRecords {
    pub pat_id: Option<PatientId>,
    pub patrec_id: Option<PatientRecordId>,
    pub fprecord_id: Option<FpRecordId>,
    pub fpt_id: Option<FpTypeId>,
    pub sti_id: Option<RiskStiId>,
    pub vaw_id: Option<RiskVawId>,
    pub obs_id: Option<ObstetricalHistoryId>,
    pub fpob_id: Option<FpObstetricalId>,
    pub bm_id: Option<BodyMeasurementId>,
    pub fp_pe_id: Option<PhysicalExamId>,
    pub pelvic_id: Option<PelvicExamId>,
    pub ack_id: Option<AcknowledgementId>,
    pub followv_id: Option<FollowUpVisitId>,
    pub as_id: Option<AssessmentId>,
    pub fp_pc_id: Option<PregnancyCheckId>,
}

impl CreatedRecords {
    pub fn is_filled(&self, slot: Slot) -> bool {
        match slot {
            Slot::Patient => self.pat_id.is_some(),
            Slot::PatientRecord => self.patrec_id.is_some(),
            Slot::FpRecord => self.fprecord_id.is_some(),
            Slot::FpType => self.fpt_id.is_some(),
            Slot::RiskSti => self.sti_id.is_some(),
            Slot::RiskVaw => self.vaw_id.is_some(),
            Slot::ObstetricalHistory => self.obs_id.is_some(),
            Slot::FpObstetrical => self.fpob_id.is_some(),
            Slot::BodyMeasurement => self.bm_id.is_some(),
            Slot::PhysicalExam => self.fp_pe_id.is_some(),
            Slot::PelvicExam => self.pelvic_id.is_some(),
            Slot::Acknowledgement => self.ack_id.is_some(),
            Slot::FollowUpVisit => self.followv_id.is_some(),
            Slot::Assessment => self.as_id.is_some(),
            Slot::PregnancyCheck => self.fp_pc_id.is_some(),
        }
    }

    /// The complete result of a successful run, or the first mandatory slot still empty.
    pub fn to_records(&self) -> Result<IntakeRecords, Slot> {
        fn need<T: Clone>(value: &Option<T>, slot: Slot) -> Result<T, Slot> {
            value.clone().ok_or(slot)
        }

        Ok(IntakeRecords {
            pat_id: need(&self.pat_id, Slot::Patient)?,
            patrec_id: need(&self.patrec_id, Slot::PatientRecord)?,
            fprecord_id: need(&self.fprecord_id, Slot::FpRecord)?,
            fpt_id: need(&self.fpt_id, Slot::FpType)?,
            sti_id: need(&self.sti_id, Slot::RiskSti)?,
            vaw_id: need(&self.vaw_id, Slot::RiskVaw)?,
            obs_id: need(&self.obs_id, Slot::ObstetricalHistory)?,
            fpob_id: need(&self.fpob_id, Slot::FpObstetrical)?,
            bm_id: need(&self.bm_id, Slot::BodyMeasurement)?,
            fp_pe_id: need(&self.fp_pe_id, Slot::PhysicalExam)?,
            pelvic_id: self.pelvic_id.clone(),
            ack_id: need(&self.ack_id, Slot::Acknowledgement)?,
            followv_id: need(&self.followv_id, Slot::FollowUpVisit)?,
            as_id: need(&self.as_id, Slot::Assessment)?,
            fp_pc_id: need(&self.fp_pc_id, Slot::PregnancyCheck)?,
        })
    }
}

/// Every identifier of a completed intake. `pelvic_id` is `None` when the method gate skipped
/// the pelvic exam.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IntakeRecords {
    pub pat_id: PatientId,
    pub patrec_id: PatientRecordId,
    pub fprecord_id: FpRecordId,
    pub fpt_id: FpTypeId,
    pub sti_id: RiskStiId,
    pub vaw_id: RiskVawId,
    pub obs_id: ObstetricalHistoryId,
    pub fpob_id: FpObstetricalId,
    pub bm_id: BodyMeasurementId,
    pub fp_pe_id: PhysicalExamId,
    pub pelvic_id: Option<PelvicExamId>,
    pub ack_id: AcknowledgementId,
    pub followv_id: FollowUpVisitId,
    pub as_id: AssessmentId,
    pub fp_pc_id: PregnancyCheckId,
}

fn require<'a, T>(value: &'a Option<T>, step: Step, slot: Slot) -> IntakeResult<&'a T> {
    value.as_ref().ok_or(IntakeError::MissingDependency {
        step: step.name(),
        requires: slot.name(),
    })
}

fn fill<T>(target: &mut Option<T>, value: T, slot: Slot) -> IntakeResult<()> {
    if target.is_some() {
        return Err(IntakeError::AlreadyCreated { slot: slot.name() });
    }
    *target = Some(value);
    Ok(())
}

// ============================================================================
// SUBMISSION OPTIONS
// ============================================================================

/// Client-generated token identifying one logical submission across retries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubmissionKey(Uuid);

impl SubmissionKey {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn parse(input: &str) -> IntakeResult<Self> {
        Uuid::parse_str(input.trim())
            .map(Self)
            .map_err(|e| IntakeError::InvalidInput(format!("invalid submission key: {e}")))
    }

    /// Idempotency key for one resource within this submission.
    pub fn for_resource(&self, resource: &Resource) -> String {
        format!("{}:{}", self.0, resource.name)
    }
}

impl Default for SubmissionKey {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SubmissionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Records that already exist when an intake is re-submitted from edit mode.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct KnownRecords {
    pub patrec_id: PatientRecordId,
    pub fprecord_id: FpRecordId,
}

#[derive(Debug, Clone, Default)]
pub struct SubmitOptions {
    pub known: Option<KnownRecords>,
    pub submission_key: Option<SubmissionKey>,
}

// ============================================================================
// ORCHESTRATOR
// ============================================================================

#[derive(Debug, thiserror::Error)]
#[error("intake submission failed at step {step}: {source}")]
pub struct PipelineError {
    pub step: Step,
    #[source]
    pub source: IntakeError,
    /// Rows created before the failure. They are left in place.
    pub created: CreatedRecords,
}

/// Runs intake submissions against one backend.
#[derive(Clone)]
pub struct IntakeOrchestrator {
    backend: Arc<dyn Backend>,
    idempotency_keys: bool,
}

impl IntakeOrchestrator {
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        Self {
            backend,
            idempotency_keys: true,
        }
    }

    pub fn with_idempotency_keys(mut self, enabled: bool) -> Self {
        self.idempotency_keys = enabled;
        self
    }

    pub fn backend(&self) -> &Arc<dyn Backend> {
        &self.backend
    }

    /// Creates every record of one intake, in pipeline order.
    ///
    /// Steps whose identifiers are already known (edit mode) are skipped rather than
    /// recreated. The pelvic exam step is skipped when the method gate excludes it.
    ///
    /// # Errors
    ///
    /// Returns a [`PipelineError`] naming the first step that failed. No later step is
    /// attempted and nothing already created is rolled back.
    pub async fn submit(
        &self,
        plan: &IntakePlan,
        options: SubmitOptions,
    ) -> Result<IntakeRecords, PipelineError> {
        let key = options.submission_key.unwrap_or_default();
        let mut ledger = CreatedRecords::default();
        if let Some(known) = options.known {
            ledger.patrec_id = Some(known.patrec_id);
            ledger.fprecord_id = Some(known.fprecord_id);
        }

        let ctx = CreateContext::new(self.backend.as_ref(), self.idempotency_keys.then_some(&key));
        tracing::info!(submission = %key, "family planning intake submission started");

        for step in Step::PIPELINE {
            if step.produces().iter().all(|slot| ledger.is_filled(*slot)) {
                tracing::debug!(step = %step, "identifiers already known, step skipped");
                continue;
            }
            if step == Step::PelvicExam && !requires_pelvic_exam(plan.method_currently_used()) {
                tracing::debug!(
                    step = %step,
                    method = plan.method_currently_used(),
                    "method gate excludes step"
                );
                continue;
            }

            if let Err(source) = run_step(&ctx, step, plan, &mut ledger).await {
                tracing::error!(step = %step, error = %source, "intake submission aborted");
                return Err(PipelineError {
                    step,
                    source,
                    created: ledger,
                });
            }
            tracing::info!(step = %step, "intake step complete");
        }

        ledger.to_records().map_err(|slot| PipelineError {
            step: slot.producer(),
            source: IntakeError::MissingDependency {
                step: "submit",
                requires: slot.name(),
            },
            created: ledger.clone(),
        })
    }
}

/// Runs one step against the ledger.
///
/// Declared requirements are checked before any call is made, so a step never reaches the
/// backend with a missing upstream identifier. A step whose slots are already filled is
/// refused rather than re-run.
pub async fn run_step(
    ctx: &CreateContext<'_>,
    step: Step,
    plan: &IntakePlan,
    ledger: &mut CreatedRecords,
) -> IntakeResult<()> {
    for slot in step.requires() {
        if !ledger.is_filled(*slot) {
            return Err(IntakeError::MissingDependency {
                step: step.name(),
                requires: slot.name(),
            });
        }
    }
    for slot in step.produces() {
        if ledger.is_filled(*slot) {
            return Err(IntakeError::AlreadyCreated { slot: slot.name() });
        }
    }

    match step {
        Step::ResolvePatient => {
            let id = resolve_patient_id(ctx.backend(), &plan.subject).await?;
            fill(&mut ledger.pat_id, id, Slot::Patient)
        }
        Step::PatientRecord => {
            let patient = require(&ledger.pat_id, step, Slot::Patient)?;
            let id = creators::create_patient_record(ctx, patient).await?;
            fill(&mut ledger.patrec_id, id, Slot::PatientRecord)
        }
        Step::FpRecord => {
            let patient_record = require(&ledger.patrec_id, step, Slot::PatientRecord)?;
            let id = creators::create_fp_record(ctx, &plan.fp_record, patient_record).await?;
            fill(&mut ledger.fprecord_id, id, Slot::FpRecord)
        }
        Step::FpType => {
            let fp_record = require(&ledger.fprecord_id, step, Slot::FpRecord)?;
            let id = creators::create_fp_type(ctx, &plan.fp_type, fp_record).await?;
            fill(&mut ledger.fpt_id, id, Slot::FpType)
        }
        Step::RiskSti => {
            let fp_record = require(&ledger.fprecord_id, step, Slot::FpRecord)?;
            let id = creators::create_risk_sti(ctx, &plan.risk_sti, fp_record).await?;
            fill(&mut ledger.sti_id, id, Slot::RiskSti)
        }
        Step::RiskVaw => {
            let fp_record = require(&ledger.fprecord_id, step, Slot::FpRecord)?;
            let id = creators::create_risk_vaw(ctx, &plan.risk_vaw, fp_record).await?;
            fill(&mut ledger.vaw_id, id, Slot::RiskVaw)
        }
        Step::ObstetricalHistory => {
            let patient_record = require(&ledger.patrec_id, step, Slot::PatientRecord)?;
            let fp_record = require(&ledger.fprecord_id, step, Slot::FpRecord)?;
            let (obs_id, fpob_id) = creators::create_obstetrical_history(
                ctx,
                &plan.obstetrical_history,
                &plan.fp_obstetrical,
                patient_record,
                fp_record,
            )
            .await?;
            fill(&mut ledger.obs_id, obs_id, Slot::ObstetricalHistory)?;
            fill(&mut ledger.fpob_id, fpob_id, Slot::FpObstetrical)
        }
        Step::PhysicalExam => {
            let patient = require(&ledger.pat_id, step, Slot::Patient)?;
            let fp_record = require(&ledger.fprecord_id, step, Slot::FpRecord)?;
            let (bm_id, pe_id) = creators::create_physical_exam(
                ctx,
                &plan.body_measurement,
                &plan.physical_exam,
                patient,
                fp_record,
            )
            .await?;
            fill(&mut ledger.bm_id, bm_id, Slot::BodyMeasurement)?;
            fill(&mut ledger.fp_pe_id, pe_id, Slot::PhysicalExam)
        }
        Step::PelvicExam => {
            let fp_record = require(&ledger.fprecord_id, step, Slot::FpRecord)?;
            let id = creators::create_pelvic_exam(ctx, &plan.pelvic_exam, fp_record).await?;
            fill(&mut ledger.pelvic_id, id, Slot::PelvicExam)
        }
        Step::Acknowledgement => {
            let fp_record = require(&ledger.fprecord_id, step, Slot::FpRecord)?;
            let fp_type = require(&ledger.fpt_id, step, Slot::FpType)?;
            let id =
                creators::create_acknowledgement(ctx, &plan.acknowledgement, fp_record, fp_type)
                    .await?;
            fill(&mut ledger.ack_id, id, Slot::Acknowledgement)
        }
        Step::FollowUpVisit => {
            let patient_record = require(&ledger.patrec_id, step, Slot::PatientRecord)?;
            let id =
                creators::create_follow_up_visit(ctx, &plan.follow_up_visit, patient_record)
                    .await?;
            fill(&mut ledger.followv_id, id, Slot::FollowUpVisit)
        }
        Step::Assessment => {
            let follow_up = require(&ledger.followv_id, step, Slot::FollowUpVisit)?;
            let fp_record = require(&ledger.fprecord_id, step, Slot::FpRecord)?;
            let id =
                creators::create_assessment(ctx, &plan.assessment, follow_up, fp_record).await?;
            fill(&mut ledger.as_id, id, Slot::Assessment)
        }
        Step::PregnancyCheck => {
            let fp_record = require(&ledger.fprecord_id, step, Slot::FpRecord)?;
            let id =
                creators::create_pregnancy_check(ctx, &plan.pregnancy_check, fp_record).await?;
            fill(&mut ledger.fp_pc_id, id, Slot::PregnancyCheck)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::*;
    use crate::test_support::{sample_intake, MockBackend};
    use serde_json::json;
    use std::collections::HashSet;

    fn orchestrator(backend: &Arc<MockBackend>) -> IntakeOrchestrator {
        IntakeOrchestrator::new(backend.clone())
    }

    fn plan(method: &str) -> IntakePlan {
        sample_intake(method)
            .into_plan()
            .expect("sample intake should validate")
    }

    #[test]
    fn test_every_requirement_is_produced_by_an_earlier_step() {
        let mut available: HashSet<Slot> = HashSet::new();
        for step in Step::PIPELINE {
            for slot in step.requires() {
                assert!(
                    available.contains(slot),
                    "{step} requires {} before it is produced",
                    slot.name()
                );
                assert!(
                    !slot.producer().is_optional(),
                    "{step} depends on optional slot {}",
                    slot.name()
                );
            }
            for slot in step.produces() {
                assert_eq!(slot.producer(), step);
                assert!(available.insert(*slot), "{} produced twice", slot.name());
            }
        }
        assert_eq!(available.len(), 15);
    }

    #[tokio::test]
    async fn test_non_iud_intake_skips_pelvic_exam() {
        let backend = Arc::new(MockBackend::new());

        let records = orchestrator(&backend)
            .submit(&plan("Pills"), SubmitOptions::default())
            .await
            .expect("submission should succeed");

        assert_eq!(records.pelvic_id, None);
        assert_eq!(backend.calls_to(PELVIC_EXAM.path), 0);
        assert_eq!(backend.posted_paths().len(), 13);

        let measurement = backend.body_posted_to(BODY_MEASUREMENT.path).unwrap();
        assert_eq!(measurement["bmi"], json!(23.4));
        assert_eq!(measurement["bmi_category"], json!("Normal"));

        let serialised = serde_json::to_value(&records).unwrap();
        let nulls: Vec<&String> = serialised
            .as_object()
            .unwrap()
            .iter()
            .filter(|(_, v)| v.is_null())
            .map(|(k, _)| k)
            .collect();
        assert_eq!(nulls, vec!["pelvic_id"]);
    }

    #[tokio::test]
    async fn test_iud_intake_creates_pelvic_exam_after_intake_record() {
        let backend = Arc::new(MockBackend::new());

        let records = orchestrator(&backend)
            .submit(&plan("IUD-I"), SubmitOptions::default())
            .await
            .expect("submission should succeed");

        assert!(records.pelvic_id.is_some());
        assert_eq!(backend.calls_to(PELVIC_EXAM.path), 1);

        let posted = backend.posted_paths();
        let fp_record_at = posted.iter().position(|p| p == FP_RECORD.path).unwrap();
        let pelvic_at = posted.iter().position(|p| p == PELVIC_EXAM.path).unwrap();
        assert!(fp_record_at < pelvic_at);

        let pelvic = backend.body_posted_to(PELVIC_EXAM.path).unwrap();
        assert_eq!(pelvic["fprecord_id"], json!(records.fprecord_id));

        let serialised = serde_json::to_value(&records).unwrap();
        assert!(serialised.as_object().unwrap().values().all(|v| !v.is_null()));
    }

    #[tokio::test]
    async fn test_steps_post_in_pipeline_order_with_one_intake_record() {
        let backend = Arc::new(MockBackend::new());

        let records = orchestrator(&backend)
            .submit(&plan("IUD-I"), SubmitOptions::default())
            .await
            .unwrap();

        assert_eq!(
            backend.posted_paths(),
            CREATE_RESOURCES.iter().map(|r| r.path).collect::<Vec<_>>()
        );
        assert_eq!(backend.calls_to(FP_RECORD.path), 1);

        let fprecord = json!(records.fprecord_id);
        for resource in [
            FP_TYPE,
            RISK_STI,
            RISK_VAW,
            FP_OBSTETRICAL,
            PHYSICAL_EXAM,
            PELVIC_EXAM,
            ACKNOWLEDGEMENT,
            ASSESSMENT,
            PREGNANCY_CHECK,
        ] {
            let body = backend.body_posted_to(resource.path).unwrap();
            assert_eq!(body["fprecord_id"], fprecord, "{}", resource.name);
        }
    }

    #[tokio::test]
    async fn test_intake_record_failure_stops_pipeline() {
        let backend = Arc::new(MockBackend::new());
        backend.fail_path(FP_RECORD.path, 400, r#"{"client_id": ["invalid"]}"#);

        let err = orchestrator(&backend)
            .submit(&plan("IUD-I"), SubmitOptions::default())
            .await
            .expect_err("fp_record is scripted to fail");

        assert_eq!(err.step, Step::FpRecord);
        assert_eq!(err.step.name(), "fp_record");
        assert!(err.to_string().contains("fp_record"));
        assert_eq!(
            backend.posted_paths(),
            vec![PATIENT_RECORD.path, FP_RECORD.path]
        );
        assert!(err.created.patrec_id.is_some(), "parent row is left in place");
        assert!(err.created.fprecord_id.is_none());
    }

    #[tokio::test]
    async fn test_sti_server_error_aborts_remaining_steps() {
        let backend = Arc::new(MockBackend::new());
        backend.fail_path(RISK_STI.path, 500, "Internal Server Error");

        let err = orchestrator(&backend)
            .submit(&plan("IUD-I"), SubmitOptions::default())
            .await
            .expect_err("risk_sti is scripted to fail");

        assert_eq!(err.step, Step::RiskSti);
        assert!(matches!(
            err.source,
            IntakeError::Creation {
                resource: "risk_sti",
                status: 500,
                ..
            }
        ));
        assert_eq!(backend.calls_to(RISK_STI.path), 1);
        for resource in [
            RISK_VAW,
            OBSTETRICAL_HISTORY,
            FP_OBSTETRICAL,
            BODY_MEASUREMENT,
            PHYSICAL_EXAM,
            PELVIC_EXAM,
            ACKNOWLEDGEMENT,
            FOLLOW_UP_VISIT,
            ASSESSMENT,
            PREGNANCY_CHECK,
        ] {
            assert_eq!(backend.calls_to(resource.path), 0, "{} was called", resource.name);
        }
        assert!(err.created.fpt_id.is_some());
        assert!(err.created.sti_id.is_none());
    }

    #[tokio::test]
    async fn test_assessment_without_follow_up_fails_before_calling_backend() {
        let backend = MockBackend::new();
        let ctx = CreateContext::new(&backend, None);
        let mut ledger = CreatedRecords {
            fprecord_id: Some(FpRecordId::from(2)),
            ..Default::default()
        };

        let err = run_step(&ctx, Step::Assessment, &plan("Pills"), &mut ledger)
            .await
            .expect_err("follow-up visit is missing");

        assert!(matches!(
            err,
            IntakeError::MissingDependency {
                step: "assessment",
                requires: "followv_id"
            }
        ));
        assert!(backend.calls().is_empty());
        assert_eq!(ledger.as_id, None);
    }

    #[tokio::test]
    async fn test_filled_slot_is_not_recreated() {
        let backend = MockBackend::new();
        let ctx = CreateContext::new(&backend, None);
        let mut ledger = CreatedRecords {
            patrec_id: Some(PatientRecordId::from(1)),
            fprecord_id: Some(FpRecordId::from(2)),
            ..Default::default()
        };

        let err = run_step(&ctx, Step::FpRecord, &plan("Pills"), &mut ledger)
            .await
            .expect_err("fp_record already exists");

        assert!(matches!(
            err,
            IntakeError::AlreadyCreated {
                slot: "fprecord_id"
            }
        ));
        assert!(backend.calls().is_empty());
    }

    #[tokio::test]
    async fn test_known_records_bypass_creation() {
        let backend = Arc::new(MockBackend::new());
        let options = SubmitOptions {
            known: Some(KnownRecords {
                patrec_id: PatientRecordId::from(500),
                fprecord_id: FpRecordId::from(600),
            }),
            submission_key: None,
        };

        let records = orchestrator(&backend)
            .submit(&plan("Pills"), options)
            .await
            .unwrap();

        assert_eq!(records.patrec_id, PatientRecordId::from(500));
        assert_eq!(records.fprecord_id, FpRecordId::from(600));
        assert_eq!(backend.calls_to(PATIENT_RECORD.path), 0);
        assert_eq!(backend.calls_to(FP_RECORD.path), 0);
        assert_eq!(
            backend.body_posted_to(FP_TYPE.path).unwrap()["fprecord_id"],
            json!(600)
        );
    }

    #[test]
    fn test_known_records_reject_blank_identifiers() {
        let blank = serde_json::from_value::<KnownRecords>(json!({
            "patrec_id": "  ",
            "fprecord_id": 600
        }));
        assert!(blank.is_err());

        let known: KnownRecords = serde_json::from_value(json!({
            "patrec_id": " 500 ",
            "fprecord_id": 600
        }))
        .unwrap();
        assert_eq!(known.patrec_id, PatientRecordId::from("500"));
        assert_eq!(known.fprecord_id, FpRecordId::from(600));
    }

    #[tokio::test]
    async fn test_unresolvable_subject_fails_before_any_creation() {
        let backend = Arc::new(MockBackend::new());
        let mut intake = sample_intake("Pills");
        intake.subject.pat_id = None;
        intake.subject.resident_id = Some("RP-0404".into());
        let plan = intake.into_plan().unwrap();

        let err = orchestrator(&backend)
            .submit(&plan, SubmitOptions::default())
            .await
            .expect_err("lookup answers 404");

        assert_eq!(err.step, Step::ResolvePatient);
        assert!(matches!(err.source, IntakeError::Transport { .. }));
        assert!(backend.posted_paths().is_empty());
    }

    #[tokio::test]
    async fn test_idempotency_keys_follow_submission_key() {
        let backend = Arc::new(MockBackend::new());
        let key = SubmissionKey::parse("6f1c2a52-3b9e-4d1f-9a57-0c3c4f3b2e10").unwrap();
        let options = SubmitOptions {
            known: None,
            submission_key: Some(key),
        };

        orchestrator(&backend)
            .submit(&plan("Pills"), options)
            .await
            .unwrap();

        let calls = backend.calls();
        let fp_type = calls.iter().find(|c| c.path == FP_TYPE.path).unwrap();
        assert_eq!(
            fp_type.idempotency_key.as_deref(),
            Some("6f1c2a52-3b9e-4d1f-9a57-0c3c4f3b2e10:fp_type")
        );
        assert!(calls
            .iter()
            .filter(|c| c.method == crate::backend::Method::Post)
            .all(|c| c.idempotency_key.is_some()));
    }

    #[tokio::test]
    async fn test_idempotency_keys_can_be_disabled() {
        let backend = Arc::new(MockBackend::new());

        orchestrator(&backend)
            .with_idempotency_keys(false)
            .submit(&plan("Pills"), SubmitOptions::default())
            .await
            .unwrap();

        assert!(backend.calls().iter().all(|c| c.idempotency_key.is_none()));
    }
}
