//! In-memory store for development and testing
//!
//! [`InMemoryWorkflowStore`] is the reference implementation of
//! [`WorkflowStore`]. All records live in a `HashMap` behind a single
//! `tokio::sync::RwLock`, which makes transaction commits trivially atomic:
//! the whole [`InstanceTxn`] is validated and applied under one write lock.
//!
//! Use it for unit tests, demos and single-process deployments. It is
//! ephemeral: everything is lost on restart.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::error::{Result, StoreError};
use crate::ids::{
    PersonId, ProcessInstanceId, StepInstanceId, TransitionId, WorkflowInstanceId,
};
use crate::instance::{ProcessInstance, StepInstance, WorkflowInstance};
use crate::traits::{InstanceTxn, TxnGuard, WorkflowStore};
use crate::transition::{EmployeeTransition, TransitionChange};

#[derive(Debug, Default)]
struct State {
    workflow_instances: HashMap<WorkflowInstanceId, WorkflowInstance>,
    process_instances: HashMap<ProcessInstanceId, ProcessInstance>,
    step_instances: HashMap<StepInstanceId, StepInstance>,
    transitions: HashMap<TransitionId, EmployeeTransition>,
    transition_changes: HashMap<TransitionId, Vec<TransitionChange>>,
    reminders: HashMap<(StepInstanceId, PersonId), DateTime<Utc>>,
}

impl State {
    fn check_guards(&self, guards: &[TxnGuard]) -> Result<()> {
        for guard in guards {
            match *guard {
                TxnGuard::WorkflowInstance {
                    id,
                    expected_version,
                } => {
                    let found = self
                        .workflow_instances
                        .get(&id)
                        .ok_or_else(|| StoreError::NotFound(format!("workflow instance {id}")))?
                        .version;
                    if found != expected_version {
                        return Err(StoreError::VersionConflict {
                            record: format!("workflow instance {id}"),
                            expected: expected_version,
                            found,
                        });
                    }
                }
                TxnGuard::ProcessInstance {
                    id,
                    expected_version,
                } => {
                    let found = self
                        .process_instances
                        .get(&id)
                        .ok_or_else(|| StoreError::NotFound(format!("process instance {id}")))?
                        .version;
                    if found != expected_version {
                        return Err(StoreError::VersionConflict {
                            record: format!("process instance {id}"),
                            expected: expected_version,
                            found,
                        });
                    }
                }
            }
        }
        Ok(())
    }
}

/// Thread-safe in-memory [`WorkflowStore`]
///
/// Cloning is cheap and shares the underlying state.
#[derive(Debug, Clone, Default)]
pub struct InMemoryWorkflowStore {
    state: Arc<RwLock<State>>,
}

impl InMemoryWorkflowStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop every record; test isolation helper
    pub async fn clear(&self) {
        let mut state = self.state.write().await;
        *state = State::default();
    }

    /// Number of step instances currently stored, open or closed
    pub async fn step_instance_count(&self) -> usize {
        self.state.read().await.step_instances.len()
    }
}

#[async_trait]
impl WorkflowStore for InMemoryWorkflowStore {
    async fn workflow_instance(&self, id: WorkflowInstanceId) -> Result<WorkflowInstance> {
        self.state
            .read()
            .await
            .workflow_instances
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("workflow instance {id}")))
    }

    async fn process_instance(&self, id: ProcessInstanceId) -> Result<ProcessInstance> {
        self.state
            .read()
            .await
            .process_instances
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("process instance {id}")))
    }

    async fn step_instance(&self, id: StepInstanceId) -> Result<StepInstance> {
        self.state
            .read()
            .await
            .step_instances
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("step instance {id}")))
    }

    async fn list_workflow_instances(&self) -> Result<Vec<WorkflowInstance>> {
        let state = self.state.read().await;
        let mut all: Vec<_> = state.workflow_instances.values().cloned().collect();
        all.sort_by_key(|wfi| wfi.started_at);
        Ok(all)
    }

    async fn open_step_instances(&self) -> Result<Vec<StepInstance>> {
        let state = self.state.read().await;
        let mut open: Vec<_> = state
            .step_instances
            .values()
            .filter(|si| si.is_open())
            .cloned()
            .collect();
        open.sort_by_key(|si| si.started_at);
        Ok(open)
    }

    async fn commit(&self, txn: InstanceTxn) -> Result<()> {
        let mut state = self.state.write().await;
        state.check_guards(&txn.guards)?;

        for id in &txn.delete_step_instances {
            state.step_instances.remove(id);
        }
        for id in &txn.delete_process_instances {
            state.process_instances.remove(id);
        }

        for mut wfi in txn.workflow_instances {
            wfi.version = state
                .workflow_instances
                .get(&wfi.id)
                .map(|prev| prev.version + 1)
                .unwrap_or(1);
            state.workflow_instances.insert(wfi.id, wfi);
        }
        for mut pi in txn.process_instances {
            pi.version = state
                .process_instances
                .get(&pi.id)
                .map(|prev| prev.version + 1)
                .unwrap_or(1);
            state.process_instances.insert(pi.id, pi);
        }
        for si in txn.step_instances {
            state.step_instances.insert(si.id, si);
        }

        Ok(())
    }

    async fn insert_transition(&self, transition: EmployeeTransition) -> Result<()> {
        let mut state = self.state.write().await;
        state.transition_changes.entry(transition.id).or_default();
        state.transitions.insert(transition.id, transition);
        Ok(())
    }

    async fn transition(&self, id: TransitionId) -> Result<EmployeeTransition> {
        self.state
            .read()
            .await
            .transitions
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("transition {id}")))
    }

    async fn update_transition(
        &self,
        transition: EmployeeTransition,
        change: TransitionChange,
    ) -> Result<()> {
        let mut state = self.state.write().await;
        if !state.transitions.contains_key(&transition.id) {
            return Err(StoreError::NotFound(format!(
                "transition {}",
                transition.id
            )));
        }
        state
            .transition_changes
            .entry(transition.id)
            .or_default()
            .push(change);
        state.transitions.insert(transition.id, transition);
        Ok(())
    }

    async fn transition_changes(&self, id: TransitionId) -> Result<Vec<TransitionChange>> {
        Ok(self
            .state
            .read()
            .await
            .transition_changes
            .get(&id)
            .cloned()
            .unwrap_or_default())
    }

    async fn last_reminder(
        &self,
        step_instance: StepInstanceId,
        person: PersonId,
    ) -> Result<Option<DateTime<Utc>>> {
        Ok(self
            .state
            .read()
            .await
            .reminders
            .get(&(step_instance, person))
            .copied())
    }

    async fn record_reminder(
        &self,
        step_instance: StepInstanceId,
        person: PersonId,
        at: DateTime<Utc>,
    ) -> Result<()> {
        self.state
            .write()
            .await
            .reminders
            .insert((step_instance, person), at);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::{ProcessId, StepId, WorkflowId};
    use crate::transition::TransitionKind;

    fn sample_instances() -> (WorkflowInstance, ProcessInstance, StepInstance) {
        let wfi = WorkflowInstance::new(WorkflowId::new(), None, PersonId::new(), Utc::now());
        let pi = ProcessInstance::new(ProcessId::new(), wfi.id);
        let si = StepInstance::open(StepId::new(), pi.id, Utc::now());
        (wfi, pi, si)
    }

    #[tokio::test]
    async fn test_commit_bumps_versions() {
        let store = InMemoryWorkflowStore::new();
        let (wfi, pi, si) = sample_instances();

        let txn = InstanceTxn {
            workflow_instances: vec![wfi.clone()],
            process_instances: vec![pi.clone()],
            step_instances: vec![si],
            ..InstanceTxn::new()
        };
        store.commit(txn).await.unwrap();

        let stored_wfi = store.workflow_instance(wfi.id).await.unwrap();
        let stored_pi = store.process_instance(pi.id).await.unwrap();
        assert_eq!(stored_wfi.version, 1);
        assert_eq!(stored_pi.version, 1);

        let txn = InstanceTxn {
            process_instances: vec![stored_pi.clone()],
            ..InstanceTxn::new()
        }
        .guard_process_instance(&stored_pi);
        store.commit(txn).await.unwrap();
        assert_eq!(store.process_instance(pi.id).await.unwrap().version, 2);
    }

    #[tokio::test]
    async fn test_stale_guard_is_rejected_and_nothing_applies() {
        let store = InMemoryWorkflowStore::new();
        let (wfi, pi, si) = sample_instances();
        store
            .commit(InstanceTxn {
                workflow_instances: vec![wfi],
                process_instances: vec![pi.clone()],
                step_instances: vec![si],
                ..InstanceTxn::new()
            })
            .await
            .unwrap();

        let fresh = store.process_instance(pi.id).await.unwrap();

        // First writer wins.
        store
            .commit(
                InstanceTxn {
                    process_instances: vec![fresh.clone()],
                    ..InstanceTxn::new()
                }
                .guard_process_instance(&fresh),
            )
            .await
            .unwrap();

        // Second writer planned against the stale version.
        let extra = StepInstance::open(StepId::new(), fresh.id, Utc::now());
        let err = store
            .commit(
                InstanceTxn {
                    step_instances: vec![extra.clone()],
                    ..InstanceTxn::new()
                }
                .guard_process_instance(&fresh),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::VersionConflict { .. }));
        assert!(store.step_instance(extra.id).await.is_err());
    }

    #[tokio::test]
    async fn test_open_step_instances_excludes_completed() {
        let store = InMemoryWorkflowStore::new();
        let (wfi, pi, open_si) = sample_instances();
        let mut closed_si = StepInstance::open(StepId::new(), pi.id, Utc::now());
        closed_si.completed_at = Some(Utc::now());

        store
            .commit(InstanceTxn {
                workflow_instances: vec![wfi],
                process_instances: vec![pi],
                step_instances: vec![open_si.clone(), closed_si],
                ..InstanceTxn::new()
            })
            .await
            .unwrap();

        let open = store.open_step_instances().await.unwrap();
        assert_eq!(open.len(), 1);
        assert_eq!(open[0].id, open_si.id);
    }

    #[tokio::test]
    async fn test_transition_update_appends_audit_entry() {
        let store = InMemoryWorkflowStore::new();
        let actor = PersonId::new();
        let mut t =
            EmployeeTransition::new(TransitionKind::Change, "employee", actor, Utc::now());
        store.insert_transition(t.clone()).await.unwrap();

        t.fields.title = Some("Analyst II".into());
        let change = TransitionChange {
            id: crate::ids::TransitionChangeId::new(),
            transition: t.id,
            date: Utc::now(),
            created_by: actor,
            changes: serde_json::json!({"title": {"from": null, "to": "Analyst II"}}),
        };
        store.update_transition(t.clone(), change).await.unwrap();

        let changes = store.transition_changes(t.id).await.unwrap();
        assert_eq!(changes.len(), 1);
        assert_eq!(
            store.transition(t.id).await.unwrap().fields.title.as_deref(),
            Some("Analyst II")
        );
    }

    #[tokio::test]
    async fn test_reminder_markers() {
        let store = InMemoryWorkflowStore::new();
        let si = StepInstanceId::new();
        let person = PersonId::new();

        assert!(store.last_reminder(si, person).await.unwrap().is_none());
        let at = Utc::now();
        store.record_reminder(si, person, at).await.unwrap();
        assert_eq!(store.last_reminder(si, person).await.unwrap(), Some(at));
    }
}
