//! Employee transition records and their audit trail
//!
//! An [`EmployeeTransition`] is the HR business-data payload behind a
//! transition-driven workflow instance: who submitted it, which employee it
//! targets, and the long tail of requested HR changes (title, schedule,
//! equipment, access flags). The engine itself only interprets a handful of
//! fields (submitter, manager, current employee and assignee, which feed
//! dynamic role resolution); everything else is carried and audit-tracked as
//! payload.
//!
//! Every mutation of tracked fields after submission produces exactly one
//! append-only [`TransitionChange`] entry recording the delta. Change entries
//! are immutable once created.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{PersonId, RoleId, TransitionChangeId, TransitionId};
use crate::role::{DynamicRole, RoleRef};

/// Category of transition, selecting which workflow templates apply
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransitionKind {
    Onboarding,
    Offboarding,
    Change,
}

/// Current responsible party for a transition still in triage
///
/// Legacy records stored this as free text that was sometimes a person's
/// name and sometimes a role keyword; the closed variant makes the two cases
/// explicit. `Role(Dynamic(Complete))` means triage is finished and no human
/// action is pending on the transition itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Assignee {
    Person(PersonId),
    Role(RoleRef),
}

impl Assignee {
    /// Static-role shorthand used when building transitions
    pub fn role(id: RoleId) -> Self {
        Assignee::Role(RoleRef::Static(id))
    }

    /// Dynamic-role shorthand
    pub fn dynamic(role: DynamicRole) -> Self {
        Assignee::Role(RoleRef::Dynamic(role))
    }

    /// True when the assignee marker says nothing is pending
    pub fn is_complete(&self) -> bool {
        matches!(self, Assignee::Role(RoleRef::Dynamic(DynamicRole::Complete)))
    }
}

/// The HR change payload of a transition
///
/// All fields are optional; which ones are filled in depends on the
/// transition kind and worker type. The engine never interprets these, but
/// changes to any of them are diffed into the audit trail.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TransitionFields {
    pub employee_first_name: Option<String>,
    pub employee_middle_initial: Option<String>,
    pub employee_last_name: Option<String>,
    pub employee_preferred_name: Option<String>,
    pub employee_number: Option<String>,
    pub employee_email: Option<String>,
    pub title: Option<String>,
    pub fte: Option<f64>,
    pub hours_per_week: Option<f64>,
    pub hourly_rate: Option<f64>,
    pub salary_range: Option<String>,
    pub salary_step: Option<String>,
    pub bilingual: Option<bool>,
    pub second_language: Option<String>,
    pub unit: Option<String>,
    pub transition_date: Option<NaiveDate>,
    pub system_change_date: Option<NaiveDate>,
    pub schedule: Option<String>,
    pub office_location: Option<String>,
    pub cubicle_number: Option<String>,
    pub union_affiliation: Option<String>,
    pub teleworking: Option<bool>,
    pub computer_type: Option<String>,
    pub computer_description: Option<String>,
    pub phone_number: Option<String>,
    pub cell_phone: Option<bool>,
    pub delete_profile: Option<bool>,
    pub reassign_to: Option<String>,
    pub business_cards: Option<bool>,
    pub prox_card_needed: Option<bool>,
    pub mailbox_needed: Option<bool>,
    pub special_instructions: Option<String>,
}

/// The HR business record driving a transition workflow
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmployeeTransition {
    pub id: TransitionId,
    pub kind: TransitionKind,
    /// Worker classification, e.g. "employee", "intern", "contractor"
    pub worker_type: String,
    pub date_submitted: DateTime<Utc>,
    pub submitter: PersonId,
    /// Target of the transition; absent for onboardings of brand-new hires
    pub current_employee: Option<PersonId>,
    /// Explicit manager override; when absent the directory's manager chain
    /// for `current_employee` is used
    pub manager: Option<PersonId>,
    /// Who is responsible for the transition while it is in triage
    pub assignee: Option<Assignee>,
    pub fields: TransitionFields,
}

impl EmployeeTransition {
    pub fn new(
        kind: TransitionKind,
        worker_type: impl Into<String>,
        submitter: PersonId,
        date_submitted: DateTime<Utc>,
    ) -> Self {
        Self {
            id: TransitionId::new(),
            kind,
            worker_type: worker_type.into(),
            date_submitted,
            submitter,
            current_employee: None,
            manager: None,
            assignee: None,
            fields: TransitionFields::default(),
        }
    }
}

/// Append-only audit entry: one per save that altered tracked fields
///
/// The `changes` payload maps field names to `{"from": .., "to": ..}` pairs.
/// Entries are never mutated after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransitionChange {
    pub id: TransitionChangeId,
    pub transition: TransitionId,
    pub date: DateTime<Utc>,
    pub created_by: PersonId,
    pub changes: serde_json::Value,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_complete_assignee_marker() {
        let assignee = Assignee::dynamic(DynamicRole::Complete);
        assert!(assignee.is_complete());
        assert!(!Assignee::Person(PersonId::new()).is_complete());
        assert!(!Assignee::role(RoleId::new()).is_complete());
    }

    #[test]
    fn test_new_transition_has_empty_payload() {
        let t = EmployeeTransition::new(
            TransitionKind::Onboarding,
            "employee",
            PersonId::new(),
            Utc::now(),
        );
        assert_eq!(t.fields, TransitionFields::default());
        assert!(t.assignee.is_none());
    }
}
