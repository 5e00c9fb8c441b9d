//! # hrflow-store - Instance Records & Storage Abstraction
//!
//! The persistence half of the hrflow workflow engine. This crate defines:
//!
//! - **Typed ids** for every entity ([`ids`])
//! - **Instance records** - live execution state of workflow templates
//!   ([`instance`])
//! - **Transition records** - the HR business payload and its append-only
//!   audit trail ([`transition`])
//! - **Role records** - static groups and the closed dynamic-role reference
//!   ([`role`])
//! - **[`WorkflowStore`]** - the async storage trait with atomic,
//!   version-guarded transaction commits ([`traits`])
//! - **[`InMemoryWorkflowStore`]** - the thread-safe reference backend
//!   ([`memory`])
//!
//! The execution engine lives in `hrflow-core` and talks to the backing
//! store exclusively through [`WorkflowStore`]. All engine mutations arrive
//! as a single [`InstanceTxn`]: a planned list of record upserts and deletes
//! that must apply atomically or not at all, guarded by optimistic record
//! versions so concurrent writers cannot corrupt the single-open-step
//! invariant.

pub mod error;
pub mod ids;
pub mod instance;
pub mod memory;
pub mod role;
pub mod traits;
pub mod transition;

pub use error::{Result, StoreError};
pub use ids::{
    ActionId, PersonId, ProcessId, ProcessInstanceId, RoleId, StepChoiceId, StepId,
    StepInstanceId, TransitionChangeId, TransitionId, WorkflowId, WorkflowInstanceId,
};
pub use instance::{ProcessInstance, StepInstance, WorkflowInstance};
pub use memory::InMemoryWorkflowStore;
pub use role::{DynamicRole, Role, RoleRef};
pub use traits::{InstanceTxn, TxnGuard, WorkflowStore};
pub use transition::{
    Assignee, EmployeeTransition, TransitionChange, TransitionFields, TransitionKind,
};
