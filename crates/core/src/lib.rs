//! # Intake Core
//!
//! Record-creation orchestrator for the Family Planning clinical intake.
//!
//! One submitted intake becomes a graph of dependent backend rows:
//! - Patient resolution by resident reference (`resolver`)
//! - One creator per backend resource, threading typed identifiers forward (`creators`)
//! - The ordered, partially conditional pipeline and its failure model (`pipeline`)
//! - Derived BMI values and the IUD pelvic exam gate (`bmi`, `gates`)
//! - In-place updates for intakes being edited (`update`)
//!
//! **No server concerns**: HTTP routing and the operator CLI live in the `intake-run` and
//! `intake-cli` binaries. Configuration is resolved once by the caller into an
//! [`IntakeConfig`] and passed in explicitly.

pub mod backend;
pub mod bmi;
pub mod config;
pub mod constants;
pub mod creators;
pub mod error;
pub mod gates;
pub mod intake;
pub mod pipeline;
pub mod resolver;
pub mod update;

#[cfg(test)]
pub(crate) mod test_support;

pub use backend::{Backend, HttpBackend};
pub use config::IntakeConfig;
pub use error::{IntakeError, IntakeResult};
pub use intake::{FamilyPlanningIntake, IntakePlan};
pub use pipeline::{
    IntakeOrchestrator, IntakeRecords, KnownRecords, PipelineError, Step, SubmissionKey,
    SubmitOptions,
};
pub use update::{apply_updates, RecordUpdate, UpdateOutcome};
