//! One creator per backend resource.
//!
//! A creator takes its narrow input from the [`IntakePlan`](crate::intake::IntakePlan) plus the
//! typed identifiers it links to, issues exactly one POST (two for the dual-write creators),
//! and returns the typed identifier(s) the backend assigned. Failures come back tagged with
//! the resource name and are never retried.

pub mod history;
pub mod records;
pub mod screening;
pub mod service;

pub use history::{create_obstetrical_history, create_pelvic_exam, create_physical_exam};
pub use records::{create_fp_record, create_fp_type, create_patient_record};
pub use screening::{create_pregnancy_check, create_risk_sti, create_risk_vaw};
pub use service::{create_acknowledgement, create_assessment, create_follow_up_visit};

use crate::backend::{self, linked_body, Backend, Resource};
use crate::pipeline::SubmissionKey;
use crate::IntakeResult;
use intake_types::RawId;
use serde::Serialize;

/// What every creator needs besides its own input: the backend, and the submission the
/// call belongs to (for idempotency keys).
#[derive(Clone, Copy)]
pub struct CreateContext<'a> {
    backend: &'a dyn Backend,
    submission: Option<&'a SubmissionKey>,
}

impl<'a> CreateContext<'a> {
    pub fn new(backend: &'a dyn Backend, submission: Option<&'a SubmissionKey>) -> Self {
        Self {
            backend,
            submission,
        }
    }

    pub fn backend(&self) -> &'a dyn Backend {
        self.backend
    }

    pub(crate) async fn create(
        &self,
        resource: &Resource,
        input: &(impl Serialize + Sync),
        links: &[(&'static str, &RawId)],
    ) -> IntakeResult<RawId> {
        let body = linked_body(input, links)?;
        let key = self.submission.map(|k| k.for_resource(resource));
        backend::create(self.backend, resource, body, key).await
    }
}
