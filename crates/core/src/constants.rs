//! Constants used throughout the intake core crate.
//!
//! Backend resource paths and identifier field names live here so the creators, the update
//! mirror, and the test backend agree on a single table.

use crate::backend::Resource;

/// Subject lookup by resident reference; answers with the subject's `pat_id`.
pub const PATIENT_LOOKUP: Resource =
    Resource::new("patient", "patientrecords/patient/by-resident/", "pat_id");

pub const PATIENT_RECORD: Resource =
    Resource::new("patient_record", "patientrecords/patient-record/", "patrec_id");

pub const FP_RECORD: Resource =
    Resource::new("fp_record", "familyplanning/fp_record/", "fprecord_id");

pub const FP_TYPE: Resource = Resource::new("fp_type", "familyplanning/fp_type/", "fpt_id");

pub const RISK_STI: Resource = Resource::new("risk_sti", "familyplanning/risk_sti/", "sti_id");

pub const RISK_VAW: Resource = Resource::new("risk_vaw", "familyplanning/risk_vaw/", "vaw_id");

/// Patient-wide obstetrical table, written before the intake-scoped one.
pub const OBSTETRICAL_HISTORY: Resource = Resource::new(
    "obstetrical_history",
    "patientrecords/obstetrical_history/",
    "obs_id",
);

pub const FP_OBSTETRICAL: Resource =
    Resource::new("fp_obstetrical", "familyplanning/obstetrical/", "fpob_id");

pub const BODY_MEASUREMENT: Resource =
    Resource::new("body_measurement", "patientrecords/body-measurements/", "bm_id");

pub const PHYSICAL_EXAM: Resource =
    Resource::new("physical_exam", "familyplanning/physical_exam/", "fp_pe_id");

pub const PELVIC_EXAM: Resource =
    Resource::new("pelvic_exam", "familyplanning/pelvic_exam/", "pelvic_id");

pub const ACKNOWLEDGEMENT: Resource =
    Resource::new("acknowledgement", "familyplanning/acknowledgement/", "ack_id");

pub const FOLLOW_UP_VISIT: Resource =
    Resource::new("follow_up_visit", "patientrecords/follow-up-visit/", "followv_id");

pub const ASSESSMENT: Resource = Resource::new("assessment", "familyplanning/assessment/", "as_id");

pub const PREGNANCY_CHECK: Resource =
    Resource::new("pregnancy_check", "familyplanning/pregnancy_check/", "fp_pc_id");

/// Every resource the intake pipeline creates, in pipeline order.
pub const CREATE_RESOURCES: [Resource; 14] = [
    PATIENT_RECORD,
    FP_RECORD,
    FP_TYPE,
    RISK_STI,
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
];

/// `patrec_type` tag for family planning clinical records.
pub const FAMILY_PLANNING_RECORD_TYPE: &str = "Family Planning";

/// Substring of `methodCurrentlyUsed` that marks an intrauterine device. Matched case-sensitively.
pub const IUD_MARKER: &str = "IUD";

pub const DEFAULT_METHOD: &str = "None";

pub const DEFAULT_CLIENT_TYPE: &str = "New Acceptor";

pub const DEFAULT_EXAM_FINDING: &str = "normal";

pub const DEFAULT_FOLLOW_UP_STATUS: &str = "pending";

pub const DEFAULT_FOLLOW_UP_DESCRIPTION: &str = "Family Planning follow-up visit";

pub const DEFAULT_FINDINGS: &str = "None";

/// Request header carrying the per-resource idempotency token.
pub const IDEMPOTENCY_HEADER: &str = "Idempotency-Key";

/// Default bind address for the REST front.
pub const DEFAULT_REST_ADDR: &str = "0.0.0.0:3000";
