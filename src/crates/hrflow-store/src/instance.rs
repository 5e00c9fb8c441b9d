//! Live instance records: one execution of a workflow template
//!
//! Instance records are the mutable half of the model. They are created when
//! a triggering event occurs (typically a transition submission), advanced by
//! the execution engine, and persisted through [`WorkflowStore`].
//!
//! Two invariants hold at all times and are enforced by the engine's
//! transactional commits:
//!
//! - A [`ProcessInstance`] has exactly one open [`StepInstance`]
//!   (`completed_at == None`) while active, and zero once complete.
//! - `current_step_instance` always points at that single open step instance,
//!   or is `None` when the process instance is complete.
//!
//! [`WorkflowStore`]: crate::traits::WorkflowStore

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{
    PersonId, ProcessId, ProcessInstanceId, StepChoiceId, StepId, StepInstanceId, TransitionId,
    WorkflowId, WorkflowInstanceId,
};

/// One live execution of a `Workflow` template
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowInstance {
    pub id: WorkflowInstanceId,
    /// Template this instance was created from
    pub workflow: WorkflowId,
    /// Driving transition, if any; some workflows are started manually
    pub transition: Option<TransitionId>,
    pub created_by: PersonId,
    pub started_at: DateTime<Utc>,
    /// True once every owned process instance has completed. Set exactly
    /// once and never cleared; completion actions may already have fired.
    pub complete: bool,
    pub completed_at: Option<DateTime<Utc>>,
    /// Owned process instances in creation order
    pub process_instances: Vec<ProcessInstanceId>,
    /// Optimistic concurrency version, bumped by the store on every commit
    pub version: u64,
}

impl WorkflowInstance {
    pub fn new(
        workflow: WorkflowId,
        transition: Option<TransitionId>,
        created_by: PersonId,
        started_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: WorkflowInstanceId::new(),
            workflow,
            transition,
            created_by,
            started_at,
            complete: false,
            completed_at: None,
            process_instances: Vec::new(),
            version: 0,
        }
    }
}

/// One live execution of a `Process` template within a workflow instance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessInstance {
    pub id: ProcessInstanceId,
    pub process: ProcessId,
    pub workflow_instance: WorkflowInstanceId,
    /// The single open step instance, or `None` once complete
    pub current_step_instance: Option<StepInstanceId>,
    pub completed_at: Option<DateTime<Utc>>,
    /// Approximate progress, 0-100. See the aggregator for the formula.
    pub percent_complete: u8,
    /// All step instances ever created for this process instance, in
    /// creation order
    pub step_instances: Vec<StepInstanceId>,
    /// Optimistic concurrency version, bumped by the store on every commit
    pub version: u64,
}

impl ProcessInstance {
    pub fn new(process: ProcessId, workflow_instance: WorkflowInstanceId) -> Self {
        Self {
            id: ProcessInstanceId::new(),
            process,
            workflow_instance,
            current_step_instance: None,
            completed_at: None,
            percent_complete: 0,
            step_instances: Vec::new(),
            version: 0,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.completed_at.is_some()
    }
}

/// One visit to a `Step` within a process instance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepInstance {
    pub id: StepInstanceId,
    pub step: StepId,
    pub process_instance: ProcessInstanceId,
    pub started_at: DateTime<Utc>,
    /// `None` while the step is awaiting a human
    pub completed_at: Option<DateTime<Utc>>,
    pub completed_by: Option<PersonId>,
    /// Which branch the completing actor took, when the step had choices
    pub chosen_choice: Option<StepChoiceId>,
    /// Process instances spawned by the chosen branch's trigger list; undo
    /// tears these down again
    pub triggered_process_instances: Vec<ProcessInstanceId>,
    /// True only for the most recently completed step instance of its
    /// process instance; the undo window is exactly one step deep
    pub undo_completion_possible: bool,
}

impl StepInstance {
    /// Create a freshly opened step instance
    pub fn open(step: StepId, process_instance: ProcessInstanceId, now: DateTime<Utc>) -> Self {
        Self {
            id: StepInstanceId::new(),
            step,
            process_instance,
            started_at: now,
            completed_at: None,
            completed_by: None,
            chosen_choice: None,
            triggered_process_instances: Vec::new(),
            undo_completion_possible: false,
        }
    }

    pub fn is_open(&self) -> bool {
        self.completed_at.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_step_instance_is_open() {
        let si = StepInstance::open(StepId::new(), ProcessInstanceId::new(), Utc::now());
        assert!(si.is_open());
        assert!(si.completed_by.is_none());
        assert!(!si.undo_completion_possible);
    }

    #[test]
    fn test_new_process_instance_is_incomplete() {
        let pi = ProcessInstance::new(ProcessId::new(), WorkflowInstanceId::new());
        assert!(!pi.is_complete());
        assert_eq!(pi.percent_complete, 0);
        assert!(pi.current_step_instance.is_none());
    }
}
