//! Typed identifiers for every entity in the workflow model
//!
//! Each entity gets its own UUID-backed newtype so that a `StepId` can never
//! be passed where a `StepInstanceId` is expected. All ids serialize
//! transparently as their inner UUID.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

macro_rules! entity_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(pub Uuid);

        impl $name {
            /// Generate a fresh random id
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                self.0.fmt(f)
            }
        }

        impl From<Uuid> for $name {
            fn from(id: Uuid) -> Self {
                Self(id)
            }
        }
    };
}

entity_id!(
    /// Identifier for a `Workflow` template
    WorkflowId
);
entity_id!(
    /// Identifier for a `Process` template
    ProcessId
);
entity_id!(
    /// Identifier for a `Step` template
    StepId
);
entity_id!(
    /// Identifier for a `StepChoice` branch
    StepChoiceId
);
entity_id!(
    /// Identifier for an `Action` marker
    ActionId
);
entity_id!(
    /// Identifier for a static `Role` group
    RoleId
);
entity_id!(
    /// Identifier for a person in the organization directory
    PersonId
);
entity_id!(
    /// Identifier for a live `WorkflowInstance`
    WorkflowInstanceId
);
entity_id!(
    /// Identifier for a live `ProcessInstance`
    ProcessInstanceId
);
entity_id!(
    /// Identifier for a live `StepInstance`
    StepInstanceId
);
entity_id!(
    /// Identifier for an `EmployeeTransition` record
    TransitionId
);
entity_id!(
    /// Identifier for a `TransitionChange` audit entry
    TransitionChangeId
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_are_unique() {
        assert_ne!(StepId::new(), StepId::new());
    }

    #[test]
    fn test_id_serializes_transparently() {
        let id = PersonId::new();
        let json = serde_json::to_string(&id).unwrap();
        let uuid_json = serde_json::to_string(&id.0).unwrap();
        assert_eq!(json, uuid_json);

        let back: PersonId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }
}
