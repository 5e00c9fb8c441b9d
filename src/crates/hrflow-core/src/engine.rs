//! The step execution engine
//!
//! [`WorkflowEngine`] owns every instance-state transition: starting a
//! workflow instance, advancing a process instance to its next step, and
//! undoing the most recent completion. Each operation is split into a pure
//! planning phase - reading a snapshot, validating, and assembling an
//! [`InstanceTxn`] effects list - and a single atomic commit, followed by
//! action dispatch. Nothing is mutated in place, so a rejected call never
//! leaves partial state behind.
//!
//! Concurrent calls against the same process instance are serialized by the
//! store's optimistic version guards: the loser gets
//! [`EngineError::Conflict`] and should re-read and retry.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use hrflow_store::{
    EmployeeTransition, InstanceTxn, PersonId, ProcessId, ProcessInstance, ProcessInstanceId,
    StepChoiceId, StepInstance, StepInstanceId, TransitionChange, TransitionId, WorkflowId,
    WorkflowInstance, WorkflowInstanceId, WorkflowStore,
};

use crate::action::{ActionContext, ActionExecutor};
use crate::error::{EngineError, Result};
use crate::progress::process_percent;
use crate::role::{Directory, ResolveCtx, RoleResolver};
use crate::template::{Step, StepChoice, TemplateSet};
use crate::transition::{diff_update, TransitionUpdate};

/// What an `advance` call did, returned to the caller after commit
#[derive(Debug)]
pub struct AdvanceOutcome {
    /// The step instance that was closed
    pub closed: StepInstance,
    /// The successor step instance, absent when the process completed
    pub opened: Option<StepInstance>,
    /// Process instances spawned by the chosen branch
    pub triggered: Vec<ProcessInstanceId>,
    pub process_completed: bool,
    pub workflow_completed: bool,
    /// Post-commit action dispatch failures; state is already committed and
    /// is not rolled back for these
    pub action_errors: Vec<EngineError>,
}

enum Successor {
    /// Terminal step: the process instance completes
    Complete,
    /// Branch taken by the actor
    Choice(StepChoice),
    /// Default linear successor
    Next(hrflow_store::StepId),
}

/// The workflow execution engine
///
/// Cheap to clone; all parts are shared behind `Arc`s.
#[derive(Clone)]
pub struct WorkflowEngine {
    pub(crate) templates: Arc<TemplateSet>,
    pub(crate) store: Arc<dyn WorkflowStore>,
    pub(crate) resolver: RoleResolver,
    pub(crate) actions: Arc<dyn ActionExecutor>,
}

impl WorkflowEngine {
    pub fn new(
        templates: Arc<TemplateSet>,
        store: Arc<dyn WorkflowStore>,
        directory: Arc<dyn Directory>,
        actions: Arc<dyn ActionExecutor>,
    ) -> Self {
        Self {
            templates,
            store,
            resolver: RoleResolver::new(directory),
            actions,
        }
    }

    pub fn templates(&self) -> &TemplateSet {
        &self.templates
    }

    /// Record a newly submitted transition
    pub async fn submit_transition(&self, transition: EmployeeTransition) -> Result<()> {
        self.store.insert_transition(transition).await?;
        Ok(())
    }

    /// Apply an update to a transition, appending one audit entry when
    /// tracked fields changed
    pub async fn update_transition(
        &self,
        id: TransitionId,
        update: TransitionUpdate,
        actor: PersonId,
    ) -> Result<Option<TransitionChange>> {
        let mut transition = self.store.transition(id).await?;
        let change = diff_update(&mut transition, update, actor, Utc::now())?;
        match change {
            Some(change) => {
                self.store
                    .update_transition(transition, change.clone())
                    .await?;
                Ok(Some(change))
            }
            None => Ok(None),
        }
    }

    /// Create a workflow instance with one process instance per template
    /// process, each opened at its start step, in a single transaction
    #[tracing::instrument(skip(self), fields(created_by = %created_by))]
    pub async fn start_workflow(
        &self,
        workflow: WorkflowId,
        created_by: PersonId,
        transition: Option<TransitionId>,
    ) -> Result<WorkflowInstance> {
        let template = self.templates.workflow(workflow)?.clone();
        if let Some(tid) = transition {
            // fail before creating anything if the transition is dangling
            self.store.transition(tid).await?;
        }

        let now = Utc::now();
        let mut wfi = WorkflowInstance::new(workflow, transition, created_by, now);
        let mut txn = InstanceTxn::new();
        for pid in &template.processes {
            let (pi, si) = self.spawn_process_instance(*pid, wfi.id, now)?;
            wfi.process_instances.push(pi.id);
            txn.process_instances.push(pi);
            txn.step_instances.push(si);
        }
        txn.workflow_instances.push(wfi.clone());
        self.store.commit(txn).await?;

        info!(
            workflow = %template.name,
            workflow_instance = %wfi.id,
            processes = wfi.process_instances.len(),
            "workflow instance started"
        );
        Ok(self.store.workflow_instance(wfi.id).await?)
    }

    /// Complete the current step of a process instance and open its
    /// successor
    #[tracing::instrument(skip(self), fields(actor = %actor))]
    pub async fn advance(
        &self,
        process_instance: ProcessInstanceId,
        actor: PersonId,
        choice: Option<StepChoiceId>,
    ) -> Result<AdvanceOutcome> {
        let pi = self.store.process_instance(process_instance).await?;
        let current = pi.current_step_instance.ok_or_else(|| {
            EngineError::validation("process instance is already complete")
        })?;
        self.advance_current(pi, current, actor, choice).await
    }

    /// [`advance`](Self::advance), addressed by the step instance the
    /// caller believes is current
    ///
    /// This is the de-duplicating form: a repeat of an already-applied call
    /// fails with `Validation("step already completed")` instead of
    /// advancing a second step.
    pub async fn advance_step(
        &self,
        step_instance: StepInstanceId,
        actor: PersonId,
        choice: Option<StepChoiceId>,
    ) -> Result<AdvanceOutcome> {
        let si = self.store.step_instance(step_instance).await?;
        if !si.is_open() {
            return Err(EngineError::validation("step already completed"));
        }
        let pi = self.store.process_instance(si.process_instance).await?;
        if pi.current_step_instance != Some(si.id) {
            return Err(EngineError::validation(
                "step instance is not the current step of its process instance",
            ));
        }
        self.advance_current(pi, si.id, actor, choice).await
    }

    async fn advance_current(
        &self,
        pi: ProcessInstance,
        current: StepInstanceId,
        actor: PersonId,
        choice: Option<StepChoiceId>,
    ) -> Result<AdvanceOutcome> {
        let wfi = self.store.workflow_instance(pi.workflow_instance).await?;
        let transition = self.load_transition(&wfi).await?;

        let mut si = self.store.step_instance(current).await?;
        if !si.is_open() {
            return Err(EngineError::validation("step already completed"));
        }
        let step = self.templates.step(si.step)?.clone();

        self.authorize(&step, actor, &wfi, transition.as_ref())
            .await?;

        // Resolve the successor before touching anything so that validation
        // and configuration failures leave no trace.
        let successor = self.plan_successor(&step, choice)?;

        let now = Utc::now();
        si.completed_at = Some(now);
        si.completed_by = Some(actor);
        si.undo_completion_possible = true;
        if let Successor::Choice(c) = &successor {
            si.chosen_choice = Some(c.id);
        }

        let mut txn = InstanceTxn::new().guard_process_instance(&pi);
        let mut wfi_updated = wfi.clone();
        let mut wfi_changed = false;
        let mut pi_updated = pi.clone();
        let mut triggered = Vec::new();
        let mut opened = None;
        let mut workflow_completed = false;

        // Close the one-step undo window on everything older.
        for sid in &pi.step_instances {
            if *sid == si.id {
                continue;
            }
            let mut earlier = self.store.step_instance(*sid).await?;
            if earlier.undo_completion_possible {
                earlier.undo_completion_possible = false;
                txn.step_instances.push(earlier);
            }
        }

        let process_completed = matches!(successor, Successor::Complete);
        match successor {
            Successor::Complete => {
                pi_updated.completed_at = Some(now);
                pi_updated.current_step_instance = None;
                pi_updated.percent_complete = 100;

                // Guard every sibling read. If another process instance
                // completes concurrently its version moves, the commit that
                // planned against the stale sibling fails with Conflict, and
                // the retry sees the sibling complete and cascades.
                workflow_completed = true;
                for pid in &wfi.process_instances {
                    if *pid == pi_updated.id {
                        continue;
                    }
                    let sibling = self.store.process_instance(*pid).await?;
                    txn = txn.guard_process_instance(&sibling);
                    if !sibling.is_complete() {
                        workflow_completed = false;
                    }
                }
                if workflow_completed && !wfi_updated.complete {
                    wfi_updated.complete = true;
                    wfi_updated.completed_at = Some(now);
                    wfi_changed = true;
                }
            }
            Successor::Choice(c) => {
                for tpid in &c.trigger_processes {
                    let (tpi, tsi) = self.spawn_process_instance(*tpid, wfi_updated.id, now)?;
                    wfi_updated.process_instances.push(tpi.id);
                    si.triggered_process_instances.push(tpi.id);
                    triggered.push(tpi.id);
                    txn.process_instances.push(tpi);
                    txn.step_instances.push(tsi);
                    wfi_changed = true;
                }
                opened = Some(self.open_successor(&mut pi_updated, c.next_step, now)?);
            }
            Successor::Next(next) => {
                opened = Some(self.open_successor(&mut pi_updated, next, now)?);
            }
        }

        txn.step_instances.push(si.clone());
        if let Some(new_si) = &opened {
            txn.step_instances.push(new_si.clone());
        }
        txn.process_instances.push(pi_updated.clone());
        if wfi_changed {
            txn = txn.guard_workflow_instance(&wfi);
            txn.workflow_instances.push(wfi_updated.clone());
        }

        self.store.commit(txn).await?;

        info!(
            step = %step.name,
            step_instance = %si.id,
            process_instance = %pi.id,
            process_completed,
            workflow_completed,
            "step completed"
        );

        let action_errors = self
            .dispatch_actions(&step, &wfi_updated, &pi_updated, &si)
            .await;

        Ok(AdvanceOutcome {
            closed: si,
            opened,
            triggered,
            process_completed,
            workflow_completed,
            action_errors,
        })
    }

    /// Revert the most recent step completion of a process instance
    ///
    /// Legal only while `undo_completion_possible` is set - the window is
    /// exactly one step deep - and only while the owning workflow instance
    /// has not completed. The successor step instance and any process
    /// instances triggered by the undone choice are deleted. Actions
    /// dispatched when the step completed are **not** revoked; compensating
    /// for them is the caller's concern.
    #[tracing::instrument(skip(self), fields(actor = %actor))]
    pub async fn undo(
        &self,
        step_instance: StepInstanceId,
        actor: PersonId,
    ) -> Result<StepInstance> {
        let mut si = self.store.step_instance(step_instance).await?;
        if si.is_open() {
            return Err(EngineError::validation("step is not completed"));
        }
        if !si.undo_completion_possible {
            return Err(EngineError::validation(
                "only the most recent step completion can be undone",
            ));
        }

        let pi = self.store.process_instance(si.process_instance).await?;
        let wfi = self.store.workflow_instance(pi.workflow_instance).await?;
        if wfi.complete {
            return Err(EngineError::validation(
                "workflow instance is already complete",
            ));
        }
        let transition = self.load_transition(&wfi).await?;

        let step = self.templates.step(si.step)?.clone();
        if si.completed_by != Some(actor) {
            self.authorize(&step, actor, &wfi, transition.as_ref())
                .await?;
        }

        let mut txn = InstanceTxn::new().guard_process_instance(&pi);
        let mut pi_updated = pi.clone();
        let mut wfi_updated = wfi.clone();
        let mut wfi_changed = false;

        // Delete the successor opened by the undone advance.
        if let Some(open_id) = pi.current_step_instance {
            txn.delete_step_instances.push(open_id);
            pi_updated.step_instances.retain(|id| *id != open_id);
        }
        // The undone step completed its process; reopen it.
        pi_updated.completed_at = None;

        // Tear down process instances spawned by the undone choice, along
        // with every step instance they own.
        for tpid in &si.triggered_process_instances {
            let tpi = self.store.process_instance(*tpid).await?;
            // Guard the read: if the triggered process advances concurrently
            // this delete list is stale and the commit must fail, not leave
            // an open step pointing at a deleted process instance.
            txn = txn.guard_process_instance(&tpi);
            txn.delete_process_instances.push(*tpid);
            txn.delete_step_instances.extend(tpi.step_instances);
            wfi_updated.process_instances.retain(|id| id != tpid);
            wfi_changed = true;
        }

        si.completed_at = None;
        si.completed_by = None;
        si.chosen_choice = None;
        si.triggered_process_instances.clear();
        si.undo_completion_possible = false;
        // a reopened step waits from now, including for reminder purposes
        si.started_at = Utc::now();

        pi_updated.current_step_instance = Some(si.id);
        let created = pi_updated.step_instances.len();
        pi_updated.percent_complete = process_percent(
            &self.templates,
            pi_updated.process,
            created,
            created.saturating_sub(1),
            false,
        )?;

        txn.step_instances.push(si.clone());
        txn.process_instances.push(pi_updated);
        if wfi_changed {
            txn = txn.guard_workflow_instance(&wfi);
            txn.workflow_instances.push(wfi_updated);
        }

        self.store.commit(txn).await?;

        info!(
            step = %step.name,
            step_instance = %si.id,
            process_instance = %pi.id,
            "step completion undone"
        );
        Ok(si)
    }

    // ---- planning helpers ----

    pub(crate) async fn load_transition(
        &self,
        wfi: &WorkflowInstance,
    ) -> Result<Option<EmployeeTransition>> {
        match wfi.transition {
            Some(tid) => Ok(Some(self.store.transition(tid).await?)),
            None => Ok(None),
        }
    }

    async fn authorize(
        &self,
        step: &Step,
        actor: PersonId,
        wfi: &WorkflowInstance,
        transition: Option<&EmployeeTransition>,
    ) -> Result<()> {
        let role = self.templates.effective_role(step)?.ok_or_else(|| {
            warn!(step = %step.name, "step has no role at step, process or workflow level");
            EngineError::configuration(format!(
                "step {} has no role at step, process or workflow level",
                step.name
            ))
        })?;
        let ctx = ResolveCtx {
            workflow_instance: wfi,
            transition,
        };
        let members = self.resolver.resolve(role, ctx).await?;
        if !members.contains(actor) {
            return Err(EngineError::Forbidden {
                actor,
                step: step.id,
            });
        }
        Ok(())
    }

    fn plan_successor(&self, step: &Step, choice: Option<StepChoiceId>) -> Result<Successor> {
        if step.end {
            return Ok(Successor::Complete);
        }
        if !step.choices.is_empty() {
            let cid = choice.ok_or_else(|| {
                EngineError::validation(format!(
                    "step {} branches; a choice is required",
                    step.name
                ))
            })?;
            if !step.choices.contains(&cid) {
                return Err(EngineError::validation(format!(
                    "choice {cid} does not belong to step {}",
                    step.name
                )));
            }
            return Ok(Successor::Choice(self.templates.choice(cid)?.clone()));
        }
        match self.templates.default_successor(step)? {
            Some(next) => Ok(Successor::Next(next)),
            None => {
                warn!(step = %step.name, "non-terminal step has no successor");
                Err(EngineError::configuration(format!(
                    "step {} is not terminal but has no successor",
                    step.name
                )))
            }
        }
    }

    fn spawn_process_instance(
        &self,
        process: ProcessId,
        workflow_instance: WorkflowInstanceId,
        now: DateTime<Utc>,
    ) -> Result<(ProcessInstance, StepInstance)> {
        let start = self.templates.start_step(process)?;
        let mut pi = ProcessInstance::new(process, workflow_instance);
        let si = StepInstance::open(start.id, pi.id, now);
        pi.current_step_instance = Some(si.id);
        pi.step_instances.push(si.id);
        pi.percent_complete = process_percent(&self.templates, process, 1, 0, false)?;
        Ok((pi, si))
    }

    fn open_successor(
        &self,
        pi: &mut ProcessInstance,
        next: hrflow_store::StepId,
        now: DateTime<Utc>,
    ) -> Result<StepInstance> {
        // the successor must exist; a dangling id is a template bug
        self.templates.step(next)?;
        let si = StepInstance::open(next, pi.id, now);
        pi.current_step_instance = Some(si.id);
        pi.step_instances.push(si.id);
        let created = pi.step_instances.len();
        pi.percent_complete = process_percent(
            &self.templates,
            pi.process,
            created,
            created - 1,
            false,
        )?;
        Ok(si)
    }

    async fn dispatch_actions(
        &self,
        step: &Step,
        wfi: &WorkflowInstance,
        pi: &ProcessInstance,
        si: &StepInstance,
    ) -> Vec<EngineError> {
        let ctx = ActionContext {
            workflow_instance: wfi.id,
            process_instance: pi.id,
            step_instance: si.id,
            transition: wfi.transition,
        };
        let mut errors = Vec::new();
        let action_ids = step
            .completion_action
            .iter()
            .chain(step.optional_actions.iter());
        for aid in action_ids {
            let action = match self.templates.action(*aid) {
                Ok(action) => action.clone(),
                Err(err) => {
                    warn!(action = %aid, error = %err, "completion action is not defined");
                    errors.push(err);
                    continue;
                }
            };
            if let Err(err) = self.actions.execute(&action, &ctx).await {
                warn!(
                    action = %action.name,
                    step_instance = %si.id,
                    error = %err,
                    "action execution failed; workflow state is not rolled back"
                );
                errors.push(EngineError::ActionExecution {
                    action: *aid,
                    error: err.to_string(),
                });
            }
        }
        errors
    }
}
