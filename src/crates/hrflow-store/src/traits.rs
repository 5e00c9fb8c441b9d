//! Storage contract for workflow instance state
//!
//! [`WorkflowStore`] is the seam between the execution engine and the backing
//! data store. The engine never mutates records in place: it plans a set of
//! effects, packages them as an [`InstanceTxn`] and commits the whole unit
//! atomically. A transaction either fully applies or not at all.
//!
//! Concurrency control is optimistic. Every workflow/process instance record
//! carries a `version`; a transaction lists the versions it planned against
//! as [`TxnGuard`]s, and the store rejects the commit with
//! [`StoreError::VersionConflict`] if any record moved in the meantime. The
//! losing caller re-reads and retries. Reads are plain snapshots and take no
//! locks beyond the backend's own.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::ids::{
    PersonId, ProcessInstanceId, StepInstanceId, TransitionId, WorkflowInstanceId,
};
use crate::instance::{ProcessInstance, StepInstance, WorkflowInstance};
use crate::transition::{EmployeeTransition, TransitionChange};

/// Optimistic concurrency guard carried by a transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxnGuard {
    WorkflowInstance {
        id: WorkflowInstanceId,
        expected_version: u64,
    },
    ProcessInstance {
        id: ProcessInstanceId,
        expected_version: u64,
    },
}

/// Atomic unit of instance-state change
///
/// Upserts replace whole records (the store bumps their `version` on write);
/// deletes cascade nothing by themselves; the planner is responsible for
/// listing every record that has to go.
#[derive(Debug, Clone, Default)]
pub struct InstanceTxn {
    pub guards: Vec<TxnGuard>,
    pub workflow_instances: Vec<WorkflowInstance>,
    pub process_instances: Vec<ProcessInstance>,
    pub step_instances: Vec<StepInstance>,
    pub delete_step_instances: Vec<StepInstanceId>,
    pub delete_process_instances: Vec<ProcessInstanceId>,
}

impl InstanceTxn {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn guard_workflow_instance(mut self, wfi: &WorkflowInstance) -> Self {
        self.guards.push(TxnGuard::WorkflowInstance {
            id: wfi.id,
            expected_version: wfi.version,
        });
        self
    }

    pub fn guard_process_instance(mut self, pi: &ProcessInstance) -> Self {
        self.guards.push(TxnGuard::ProcessInstance {
            id: pi.id,
            expected_version: pi.version,
        });
        self
    }
}

/// Persistence backend for instance and transition state
///
/// Implementations must apply [`commit`](Self::commit) atomically and enforce
/// version guards. The in-memory implementation in this crate is the
/// reference; a SQL backend would map commits onto database transactions with
/// `WHERE version = ?` updates.
#[async_trait]
pub trait WorkflowStore: Send + Sync {
    // ---- instance reads ----

    async fn workflow_instance(&self, id: WorkflowInstanceId) -> Result<WorkflowInstance>;

    async fn process_instance(&self, id: ProcessInstanceId) -> Result<ProcessInstance>;

    async fn step_instance(&self, id: StepInstanceId) -> Result<StepInstance>;

    /// All workflow instances, for list views and batch jobs
    async fn list_workflow_instances(&self) -> Result<Vec<WorkflowInstance>>;

    /// Every open step instance across all process instances; the reminder
    /// job scans this
    async fn open_step_instances(&self) -> Result<Vec<StepInstance>>;

    // ---- instance writes ----

    /// Atomically apply a planned set of effects, or fail without applying
    /// anything
    async fn commit(&self, txn: InstanceTxn) -> Result<()>;

    // ---- transitions ----

    async fn insert_transition(&self, transition: EmployeeTransition) -> Result<()>;

    async fn transition(&self, id: TransitionId) -> Result<EmployeeTransition>;

    /// Replace a transition record and append its audit entry in one step
    async fn update_transition(
        &self,
        transition: EmployeeTransition,
        change: TransitionChange,
    ) -> Result<()>;

    /// Audit trail for a transition, in creation order
    async fn transition_changes(&self, id: TransitionId) -> Result<Vec<TransitionChange>>;

    // ---- reminder markers ----

    /// When this person was last reminded about this step instance, if ever
    async fn last_reminder(
        &self,
        step_instance: StepInstanceId,
        person: PersonId,
    ) -> Result<Option<DateTime<Utc>>>;

    async fn record_reminder(
        &self,
        step_instance: StepInstanceId,
        person: PersonId,
        at: DateTime<Utc>,
    ) -> Result<()>;
}
