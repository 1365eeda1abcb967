use std::sync::Arc;

use super::common::*;
use crate::workflows::readings::domain::{
    CheckResult, EquipmentStatus, FieldCheck, HeaderRecord, ReplacementReason,
};
use crate::workflows::readings::status::{StatusAggregator, StatusRule};
use crate::workflows::readings::thresholds::PolicyTable;

fn aggregator() -> StatusAggregator {
    StatusAggregator::new(Arc::new(PolicyTable::standard()))
}

fn failing(fields: &[FieldCheck]) -> HeaderRecord {
    let mut header = vrla_header(4);
    for field in fields {
        header.field_checks.insert(*field, CheckResult::Fail);
    }
    header
}

#[test]
fn offline_is_returned_unchanged() {
    let mut header = failing(&[FieldCheck::ChargingVoltage]);
    header.operator_status = Some(EquipmentStatus::Offline);
    header.replace_count = 3;

    let decision = aggregator().compute(&header, Some(12));

    assert_eq!(decision.status, EquipmentStatus::Offline);
    assert_eq!(decision.rule, StatusRule::OfflineHeld);
}

#[test]
fn replace_count_outranks_age_based_replacement() {
    let mut header = vrla_header(4);
    header.replace_count = 1;
    header.replace_whole_unit = Some(ReplacementReason::Age);

    let decision = aggregator().compute(&header, Some(9));

    assert_eq!(decision.status, EquipmentStatus::CriticalDeficiency);
    assert_eq!(decision.rule, StatusRule::ReplaceCount);
}

#[test]
fn age_at_or_past_lifetime_recommends_replacement() {
    let header = vrla_header(4);

    assert_eq!(
        aggregator().compute(&header, Some(5)).status,
        EquipmentStatus::ReplacementRecommended
    );
    assert_eq!(
        aggregator().compute(&header, Some(7)).status,
        EquipmentStatus::ReplacementRecommended
    );
}

#[test]
fn age_override_recommends_replacement_without_a_date_code() {
    let mut header = vrla_header(4);
    header.replace_whole_unit = Some(ReplacementReason::Age);

    let decision = aggregator().compute(&header, None);

    assert_eq!(decision.status, EquipmentStatus::ReplacementRecommended);
    assert_eq!(decision.rule, StatusRule::AgeReplacement);

    header.replace_whole_unit = Some(ReplacementReason::Damage);
    assert_eq!(
        aggregator().compute(&header, None).status,
        EquipmentStatus::Online
    );
}

#[test]
fn proactive_window_is_exactly_one_year_before_lifetime() {
    let header = vrla_header(4);

    let at_window = aggregator().compute(&header, Some(4));
    let before_window = aggregator().compute(&header, Some(3));

    assert_eq!(at_window.status, EquipmentStatus::ProactiveReplacement);
    assert_eq!(at_window.rule, StatusRule::ProactiveWindow);
    assert_eq!(before_window.status, EquipmentStatus::Online);
    assert_eq!(before_window.rule, StatusRule::FieldSeverity);
}

#[test]
fn proactive_window_short_circuits_field_failures() {
    let header = failing(&[FieldCheck::ChargingVoltage]);

    assert_eq!(
        aggregator().compute(&header, Some(4)).status,
        EquipmentStatus::ProactiveReplacement
    );
}

#[test]
fn field_failures_reduce_to_the_most_severe() {
    assert_eq!(
        aggregator()
            .compute(&failing(&[FieldCheck::RippleCurrent]), Some(1))
            .status,
        EquipmentStatus::OnlineMinorDeficiency
    );
    assert_eq!(
        aggregator()
            .compute(
                &failing(&[FieldCheck::Cleanliness, FieldCheck::TerminalTorque]),
                Some(1)
            )
            .status,
        EquipmentStatus::OnlineMajorDeficiency
    );
    assert_eq!(
        aggregator()
            .compute(&failing(&[FieldCheck::ChargingVoltage]), None)
            .status,
        EquipmentStatus::CriticalDeficiency
    );
}

#[test]
fn field_reduction_never_drops_below_operator_status() {
    let mut header = failing(&[FieldCheck::Cleanliness]);
    header.operator_status = Some(EquipmentStatus::OnlineMajorDeficiency);

    assert_eq!(
        aggregator().compute(&header, Some(1)).status,
        EquipmentStatus::OnlineMajorDeficiency
    );
}

#[test]
fn passing_checks_leave_the_unit_online() {
    let mut header = vrla_header(4);
    header
        .field_checks
        .insert(FieldCheck::ChargingVoltage, CheckResult::Pass);

    assert_eq!(
        aggregator().compute(&header, Some(1)).status,
        EquipmentStatus::Online
    );
}
