//! Transition updates and the audit diff
//!
//! An [`EmployeeTransition`] stays mutable after submission, but every save
//! that alters tracked fields must produce exactly one append-only
//! [`TransitionChange`] recording the delta. [`diff_update`] computes that
//! delta as a `{"field": {"from": .., "to": ..}}` JSON object; an update
//! that changes nothing yields no audit entry.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};

use hrflow_store::{
    Assignee, EmployeeTransition, PersonId, TransitionChange, TransitionChangeId,
    TransitionFields,
};

use crate::error::Result;

/// Desired new values for the tracked, mutable part of a transition
///
/// Interpreted as a full replacement: `None` means "now unset", not "leave
/// alone". Kind, worker type, submitter and submission date are fixed at
/// submission and not part of the update surface.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TransitionUpdate {
    pub current_employee: Option<PersonId>,
    pub manager: Option<PersonId>,
    pub assignee: Option<Assignee>,
    pub fields: TransitionFields,
}

impl TransitionUpdate {
    /// Start from a transition's current values, for partial edits
    pub fn from_transition(t: &EmployeeTransition) -> Self {
        Self {
            current_employee: t.current_employee,
            manager: t.manager,
            assignee: t.assignee,
            fields: t.fields.clone(),
        }
    }
}

#[derive(Serialize)]
struct Tracked<'a> {
    current_employee: Option<PersonId>,
    manager: Option<PersonId>,
    assignee: Option<Assignee>,
    #[serde(flatten)]
    fields: &'a TransitionFields,
}

fn tracked_value(
    current_employee: Option<PersonId>,
    manager: Option<PersonId>,
    assignee: Option<Assignee>,
    fields: &TransitionFields,
) -> Result<Map<String, Value>> {
    let value = serde_json::to_value(Tracked {
        current_employee,
        manager,
        assignee,
        fields,
    })?;
    match value {
        Value::Object(map) => Ok(map),
        _ => Ok(Map::new()),
    }
}

/// Apply an update to a transition, returning the audit entry when anything
/// tracked actually changed
///
/// The transition is mutated in place either way; callers persist the
/// record together with the returned change in one store call.
pub fn diff_update(
    transition: &mut EmployeeTransition,
    update: TransitionUpdate,
    actor: PersonId,
    now: DateTime<Utc>,
) -> Result<Option<TransitionChange>> {
    let before = tracked_value(
        transition.current_employee,
        transition.manager,
        transition.assignee,
        &transition.fields,
    )?;
    let after = tracked_value(
        update.current_employee,
        update.manager,
        update.assignee,
        &update.fields,
    )?;

    let mut changes = Map::new();
    for (key, new_value) in &after {
        let old_value = before.get(key).cloned().unwrap_or(Value::Null);
        if old_value != *new_value {
            changes.insert(
                key.clone(),
                serde_json::json!({ "from": old_value, "to": new_value }),
            );
        }
    }

    transition.current_employee = update.current_employee;
    transition.manager = update.manager;
    transition.assignee = update.assignee;
    transition.fields = update.fields;

    if changes.is_empty() {
        return Ok(None);
    }

    Ok(Some(TransitionChange {
        id: TransitionChangeId::new(),
        transition: transition.id,
        date: now,
        created_by: actor,
        changes: Value::Object(changes),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use hrflow_store::{DynamicRole, TransitionKind};

    fn fixture() -> EmployeeTransition {
        EmployeeTransition::new(
            TransitionKind::Change,
            "employee",
            PersonId::new(),
            Utc::now(),
        )
    }

    #[test]
    fn test_no_change_yields_no_audit_entry() {
        let mut t = fixture();
        let update = TransitionUpdate::from_transition(&t);
        let actor = t.submitter;
        let change = diff_update(&mut t, update, actor, Utc::now()).unwrap();
        assert!(change.is_none());
    }

    #[test]
    fn test_field_change_yields_exactly_one_entry_with_delta() {
        let mut t = fixture();
        let actor = t.submitter;
        let mut update = TransitionUpdate::from_transition(&t);
        update.fields.title = Some("Senior Analyst".into());
        update.fields.teleworking = Some(true);

        let change = diff_update(&mut t, update, actor, Utc::now())
            .unwrap()
            .expect("expected an audit entry");

        let changes = change.changes.as_object().unwrap();
        assert_eq!(changes.len(), 2);
        assert_eq!(changes["title"]["from"], Value::Null);
        assert_eq!(changes["title"]["to"], "Senior Analyst");
        assert_eq!(changes["teleworking"]["to"], true);
        assert_eq!(t.fields.title.as_deref(), Some("Senior Analyst"));
    }

    #[test]
    fn test_assignee_change_is_tracked() {
        let mut t = fixture();
        let actor = t.submitter;
        let mut update = TransitionUpdate::from_transition(&t);
        update.assignee = Some(Assignee::dynamic(DynamicRole::Complete));

        let change = diff_update(&mut t, update, actor, Utc::now())
            .unwrap()
            .expect("expected an audit entry");
        assert!(change.changes.as_object().unwrap().contains_key("assignee"));
        assert!(t.assignee.unwrap().is_complete());
    }

    #[test]
    fn test_unsetting_a_field_is_a_change() {
        let mut t = fixture();
        let actor = t.submitter;
        t.fields.office_location = Some("City Hall 2W".into());

        let mut update = TransitionUpdate::from_transition(&t);
        update.fields.office_location = None;
        let change = diff_update(&mut t, update, actor, Utc::now())
            .unwrap()
            .expect("expected an audit entry");
        let changes = change.changes.as_object().unwrap();
        assert_eq!(changes["office_location"]["from"], "City Hall 2W");
        assert_eq!(changes["office_location"]["to"], Value::Null);
    }
}
