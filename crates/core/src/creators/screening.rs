//! Screening answers hung off the intake record: STI risk, violence risk, pregnancy exclusion.

use super::CreateContext;
use crate::constants::{PREGNANCY_CHECK, RISK_STI, RISK_VAW};
use crate::intake::{PregnancyCheckInput, RiskStiInput, RiskVawInput};
use crate::IntakeResult;
use intake_types::{FpRecordId, PregnancyCheckId, RiskStiId, RiskVawId};

pub async fn create_risk_sti(
    ctx: &CreateContext<'_>,
    input: &RiskStiInput,
    fp_record: &FpRecordId,
) -> IntakeResult<RiskStiId> {
    let id = ctx
        .create(&RISK_STI, input, &[("fprecord_id", fp_record.raw())])
        .await?;
    Ok(RiskStiId::new(id))
}

pub async fn create_risk_vaw(
    ctx: &CreateContext<'_>,
    input: &RiskVawInput,
    fp_record: &FpRecordId,
) -> IntakeResult<RiskVawId> {
    let id = ctx
        .create(&RISK_VAW, input, &[("fprecord_id", fp_record.raw())])
        .await?;
    Ok(RiskVawId::new(id))
}

pub async fn create_pregnancy_check(
    ctx: &CreateContext<'_>,
    input: &PregnancyCheckInput,
    fp_record: &FpRecordId,
) -> IntakeResult<PregnancyCheckId> {
    let id = ctx
        .create(&PREGNANCY_CHECK, input, &[("fprecord_id", fp_record.raw())])
        .await?;
    Ok(PregnancyCheckId::new(id))
}
