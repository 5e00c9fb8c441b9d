//! Role resolution: from a role reference to the set of people who may act
//!
//! A [`RoleRef`] on a step is either a static directory group or a dynamic
//! responsibility scoped to the instance's transition. [`RoleResolver`]
//! turns either kind into a concrete [`RoleMembers`] set through the
//! organization-directory collaborator ([`Directory`]).
//!
//! Resolution failures are configuration problems, not instance failures:
//! the step simply has no eligible actor until an administrator fixes the
//! wiring, and read paths treat an unresolvable role as an empty set.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use hrflow_store::{
    Assignee, DynamicRole, EmployeeTransition, PersonId, Role, RoleId, RoleRef, WorkflowInstance,
};

use crate::error::{EngineError, Result};

/// Recursive `Assignee -> Role -> Assignee` chains are cut off here
const MAX_RESOLVE_DEPTH: usize = 4;

/// Upward manager-chain walks stop here, guarding against directory cycles
const MAX_CHAIN_WALK: usize = 16;

/// Organization-directory lookup capability
///
/// Provided by the surrounding system; the engine only needs group
/// membership and the manager chain. Implementations should map their own
/// failures into [`EngineError::Directory`].
#[async_trait]
pub trait Directory: Send + Sync {
    /// Members of a static role group
    async fn role_members(&self, role: RoleId) -> Result<Vec<PersonId>>;

    /// A person's manager, if they have one
    async fn manager_of(&self, person: PersonId) -> Result<Option<PersonId>>;
}

/// The resolved value of a role reference
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleMembers {
    /// The reference this set was resolved from, kept for notification
    /// rendering
    pub role: RoleRef,
    pub members: HashSet<PersonId>,
}

impl RoleMembers {
    pub fn contains(&self, person: PersonId) -> bool {
        self.members.contains(&person)
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

/// Instance context a dynamic role is resolved against
#[derive(Debug, Clone, Copy)]
pub struct ResolveCtx<'a> {
    pub workflow_instance: &'a WorkflowInstance,
    pub transition: Option<&'a EmployeeTransition>,
}

impl<'a> ResolveCtx<'a> {
    fn transition(&self) -> Result<&'a EmployeeTransition> {
        self.transition.ok_or_else(|| {
            EngineError::configuration(format!(
                "workflow instance {} has no transition but a dynamic role requires one",
                self.workflow_instance.id
            ))
        })
    }
}

/// Resolves role references to concrete people
#[derive(Clone)]
pub struct RoleResolver {
    directory: Arc<dyn Directory>,
}

impl RoleResolver {
    pub fn new(directory: Arc<dyn Directory>) -> Self {
        Self { directory }
    }

    /// Resolve a role reference within an instance context
    pub async fn resolve(&self, role: RoleRef, ctx: ResolveCtx<'_>) -> Result<RoleMembers> {
        let members = self.resolve_inner(role, ctx, 0).await?;
        debug!(role = ?role, count = members.len(), "resolved role");
        Ok(RoleMembers { role, members })
    }

    /// True when `manager` sits anywhere in `person`'s upward manager chain
    pub async fn in_manager_chain(&self, manager: PersonId, person: PersonId) -> Result<bool> {
        let mut current = person;
        for _ in 0..MAX_CHAIN_WALK {
            match self.directory.manager_of(current).await? {
                Some(m) if m == manager => return Ok(true),
                Some(m) => current = m,
                None => return Ok(false),
            }
        }
        Ok(false)
    }

    fn resolve_inner<'a>(
        &'a self,
        role: RoleRef,
        ctx: ResolveCtx<'a>,
        depth: usize,
    ) -> futures::future::BoxFuture<'a, Result<HashSet<PersonId>>> {
        Box::pin(async move {
            if depth > MAX_RESOLVE_DEPTH {
                return Err(EngineError::configuration(
                    "role resolution recursed too deeply; assignee chain loops",
                ));
            }
            match role {
                RoleRef::Static(id) => {
                    let members = self.directory.role_members(id).await?;
                    Ok(members.into_iter().collect())
                }
                RoleRef::Dynamic(DynamicRole::Complete) => Ok(HashSet::new()),
                RoleRef::Dynamic(DynamicRole::Submitter) => {
                    let transition = ctx.transition()?;
                    Ok(HashSet::from([transition.submitter]))
                }
                RoleRef::Dynamic(DynamicRole::Manager) => {
                    let transition = ctx.transition()?;
                    if let Some(manager) = transition.manager {
                        return Ok(HashSet::from([manager]));
                    }
                    let employee = transition.current_employee.ok_or_else(|| {
                        EngineError::configuration(format!(
                            "transition {} has neither a manager nor a current employee",
                            transition.id
                        ))
                    })?;
                    match self.directory.manager_of(employee).await? {
                        Some(manager) => Ok(HashSet::from([manager])),
                        None => Ok(HashSet::new()),
                    }
                }
                RoleRef::Dynamic(DynamicRole::Assignee) => {
                    let transition = ctx.transition()?;
                    match transition.assignee {
                        None => Ok(HashSet::new()),
                        Some(Assignee::Person(person)) => Ok(HashSet::from([person])),
                        Some(Assignee::Role(inner)) => {
                            self.resolve_inner(inner, ctx, depth + 1).await
                        }
                    }
                }
            }
        })
    }
}

/// In-memory [`Directory`] for tests and single-process deployments,
/// backed by stored [`Role`] records
#[derive(Debug, Clone, Default)]
pub struct InMemoryDirectory {
    roles: std::collections::HashMap<RoleId, Role>,
    managers: std::collections::HashMap<PersonId, PersonId>,
}

impl InMemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_role(&mut self, role: Role) {
        self.roles.insert(role.id, role);
    }

    pub fn set_manager(&mut self, person: PersonId, manager: PersonId) {
        self.managers.insert(person, manager);
    }
}

#[async_trait]
impl Directory for InMemoryDirectory {
    async fn role_members(&self, role: RoleId) -> Result<Vec<PersonId>> {
        Ok(self
            .roles
            .get(&role)
            .map(|r| r.members.clone())
            .unwrap_or_default())
    }

    async fn manager_of(&self, person: PersonId) -> Result<Option<PersonId>> {
        Ok(self.managers.get(&person).copied())
    }
}
