//! Role records and role references
//!
//! A role is either a **static** named group of people maintained in the
//! organization directory, or a **dynamic** responsibility that only has
//! meaning relative to a specific transition (its submitter, the target
//! employee's manager, the current assignee).
//!
//! Legacy records stored dynamic roles as bare strings (`"Submitter"`,
//! `"Manager"`, `"Assignee"`, `"Complete"`) compared at every call site.
//! Here they form a closed [`RoleRef`] variant resolved through a single
//! resolver function; `Display`/`FromStr` round-trip the legacy string
//! values for interop with stored data.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::ids::{PersonId, RoleId};

/// A static named group of people, e.g. "IT Helpdesk" or "HR Benefits"
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
    pub id: RoleId,
    pub name: String,
    pub description: String,
    /// Directory members; the resolver treats this as the authoritative set
    pub members: Vec<PersonId>,
}

impl Role {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: RoleId::new(),
            name: name.into(),
            description: String::new(),
            members: Vec::new(),
        }
    }
}

/// Dynamic responsibility resolved from a transition at runtime
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DynamicRole {
    /// The person who submitted the driving transition
    Submitter,
    /// The manager of the transition's target employee (explicit manager
    /// field wins over the directory's manager chain)
    Manager,
    /// Whoever the transition's `assignee` currently resolves to
    Assignee,
    /// Terminal marker: no human action is pending
    Complete,
}

impl fmt::Display for DynamicRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DynamicRole::Submitter => "Submitter",
            DynamicRole::Manager => "Manager",
            DynamicRole::Assignee => "Assignee",
            DynamicRole::Complete => "Complete",
        };
        f.write_str(s)
    }
}

impl FromStr for DynamicRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Submitter" => Ok(DynamicRole::Submitter),
            "Manager" => Ok(DynamicRole::Manager),
            "Assignee" => Ok(DynamicRole::Assignee),
            "Complete" => Ok(DynamicRole::Complete),
            other => Err(format!("unknown dynamic role: {other}")),
        }
    }
}

/// Reference to a role, attached to steps, processes and workflows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoleRef {
    /// A static directory group
    Static(RoleId),
    /// A per-transition dynamic responsibility
    Dynamic(DynamicRole),
}

impl From<DynamicRole> for RoleRef {
    fn from(role: DynamicRole) -> Self {
        RoleRef::Dynamic(role)
    }
}

impl From<RoleId> for RoleRef {
    fn from(id: RoleId) -> Self {
        RoleRef::Static(id)
    }
}
