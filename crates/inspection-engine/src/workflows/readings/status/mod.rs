mod age;

pub use age::age_in_years;

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::domain::{EquipmentStatus, HeaderRecord, ReplacementReason};
use super::thresholds::PolicyTable;

/// The rule in the priority chain that settled the status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusRule {
    OfflineHeld,
    ReplaceCount,
    AgeReplacement,
    ProactiveWindow,
    FieldSeverity,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusDecision {
    pub status: EquipmentStatus,
    pub rule: StatusRule,
}

/// Short-circuiting priority chain combining device flags into one equipment status.
#[derive(Debug, Clone)]
pub struct StatusAggregator {
    policy: Arc<PolicyTable>,
}

impl StatusAggregator {
    pub fn new(policy: Arc<PolicyTable>) -> Self {
        Self { policy }
    }

    /// Evaluates the chain for `header`, whose counts must already reflect the latest
    /// deficiency pass. `age_years` is `None` when the unit has no date code.
    pub fn compute(&self, header: &HeaderRecord, age_years: Option<u32>) -> StatusDecision {
        if header.status == EquipmentStatus::Offline
            || header.operator_status == Some(EquipmentStatus::Offline)
        {
            return StatusDecision {
                status: EquipmentStatus::Offline,
                rule: StatusRule::OfflineHeld,
            };
        }

        if header.replace_count > 0 {
            return StatusDecision {
                status: EquipmentStatus::CriticalDeficiency,
                rule: StatusRule::ReplaceCount,
            };
        }

        let lifetime = self.policy.lifetime_for(header.chemistry);
        let age_due = matches!((age_years, lifetime), (Some(age), Some(life)) if age >= life);
        if age_due || header.replace_whole_unit == Some(ReplacementReason::Age) {
            return StatusDecision {
                status: EquipmentStatus::ReplacementRecommended,
                rule: StatusRule::AgeReplacement,
            };
        }

        // Exact match only: one year ahead of the nominal lifetime.
        let proactive = matches!(
            (age_years, lifetime.and_then(|life| life.checked_sub(1))),
            (Some(age), Some(window)) if age == window
        );
        if proactive {
            return StatusDecision {
                status: EquipmentStatus::ProactiveReplacement,
                rule: StatusRule::ProactiveWindow,
            };
        }

        StatusDecision {
            status: self.field_severity(header),
            rule: StatusRule::FieldSeverity,
        }
    }

    fn field_severity(&self, header: &HeaderRecord) -> EquipmentStatus {
        let start = header.operator_status.unwrap_or(EquipmentStatus::Online);
        self.policy
            .severity_rules
            .iter()
            .filter(|rule| header.check(rule.field) == rule.bad)
            .fold(start, |status, rule| status.max_severity(rule.severity))
    }
}
