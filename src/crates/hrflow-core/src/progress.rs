//! Progress aggregation and action-required read models
//!
//! Everything here is a read path over committed state. Percentages are an
//! approximation by design: a process's true remaining length is unknowable
//! once branches and loops enter the picture, so the figure is
//! `completed / max(estimate, created_so_far)` where the estimate is the
//! template's linear chain length. The number is good enough for a progress
//! bar and monotone under `advance`.
//!
//! Unresolvable roles on read paths degrade to "no action required" with a
//! `warn!` rather than failing the query; a misconfigured step should show
//! up in dashboards as stalled, not as an error page.

use std::collections::HashSet;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::warn;

use hrflow_store::{
    Assignee, DynamicRole, EmployeeTransition, PersonId, ProcessId, ProcessInstance,
    ProcessInstanceId, RoleRef, WorkflowInstance, WorkflowInstanceId,
};

use crate::engine::WorkflowEngine;
use crate::error::{EngineError, Result};
use crate::role::ResolveCtx;
use crate::template::TemplateSet;

/// Percent-complete approximation for one process instance
///
/// `created` and `completed` count the instance's step instances; `complete`
/// short-circuits to exactly 100.
pub fn process_percent(
    templates: &TemplateSet,
    process: ProcessId,
    created: usize,
    completed: usize,
    complete: bool,
) -> Result<u8> {
    if complete {
        return Ok(100);
    }
    let estimate = templates.linear_chain_len(process)?;
    let total = estimate.max(created).max(1);
    let pct = (completed as f64 / total as f64 * 100.0).round();
    Ok(pct.clamp(0.0, 100.0) as u8)
}

/// List-view status of a workflow instance
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStatus {
    /// The driving transition is still being triaged; shows who holds it
    Triage(Assignee),
    /// Execution is underway or done; aggregate percentage
    Percent(u8),
}

impl WorkflowEngine {
    /// Aggregate percentage for a workflow instance: the mean of its process
    /// instances' percentages, 100 once complete, 0 when it owns none
    pub async fn workflow_percent_complete(&self, id: WorkflowInstanceId) -> Result<u8> {
        let wfi = self.store.workflow_instance(id).await?;
        self.percent_of(&wfi).await
    }

    /// What a list view shows for this workflow instance: the pending
    /// assignee while the transition is in triage, otherwise the percentage
    pub async fn status(&self, id: WorkflowInstanceId) -> Result<WorkflowStatus> {
        let wfi = self.store.workflow_instance(id).await?;
        self.status_of(&wfi).await
    }

    /// Every workflow instance with its [`status`](Self::status), feeding
    /// the dashboard list view
    pub async fn list_statuses(&self) -> Result<Vec<(WorkflowInstance, WorkflowStatus)>> {
        let mut rows = Vec::new();
        for wfi in self.store.list_workflow_instances().await? {
            let status = self.status_of(&wfi).await?;
            rows.push((wfi, status));
        }
        Ok(rows)
    }

    async fn status_of(&self, wfi: &WorkflowInstance) -> Result<WorkflowStatus> {
        if !wfi.complete {
            if let Some(transition) = self.load_transition(wfi).await? {
                if let Some(assignee) = transition.assignee {
                    if !assignee.is_complete() {
                        return Ok(WorkflowStatus::Triage(assignee));
                    }
                }
            }
        }
        Ok(WorkflowStatus::Percent(self.percent_of(wfi).await?))
    }

    /// Visibility filter: whether this person may see the workflow instance
    ///
    /// True for the creator, the transition's submitter and target employee,
    /// anyone in the resolved role of a currently open step, and anyone in
    /// the upward manager chain of those people.
    pub async fn can_view(
        &self,
        workflow_instance: WorkflowInstanceId,
        person: PersonId,
    ) -> Result<bool> {
        let wfi = self.store.workflow_instance(workflow_instance).await?;
        if wfi.created_by == person {
            return Ok(true);
        }
        let transition = self.load_transition(&wfi).await?;

        let mut involved: HashSet<PersonId> = HashSet::new();
        if let Some(t) = &transition {
            involved.insert(t.submitter);
            if let Some(employee) = t.current_employee {
                involved.insert(employee);
            }
        }
        for pid in &wfi.process_instances {
            let pi = self.store.process_instance(*pid).await?;
            let Some(current) = pi.current_step_instance else {
                continue;
            };
            let si = self.store.step_instance(current).await?;
            let step = self.templates.step(si.step)?;
            let Some(role) = self.templates.effective_role(step)? else {
                continue;
            };
            let ctx = ResolveCtx {
                workflow_instance: &wfi,
                transition: transition.as_ref(),
            };
            match self.resolver.resolve(role, ctx).await {
                Ok(members) => involved.extend(members.members),
                Err(EngineError::Configuration(msg)) => {
                    warn!(step = %step.name, error = %msg, "role is unresolvable; skipped for visibility");
                }
                Err(err) => return Err(err),
            }
        }

        if involved.contains(&person) {
            return Ok(true);
        }
        for member in involved {
            if self.resolver.in_manager_chain(person, member).await? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// True when the person is in the resolved role of the open step of any
    /// incomplete process instance of this workflow instance
    pub async fn action_required(
        &self,
        workflow_instance: WorkflowInstanceId,
        person: PersonId,
    ) -> Result<bool> {
        let wfi = self.store.workflow_instance(workflow_instance).await?;
        let transition = self.load_transition(&wfi).await?;
        for pid in &wfi.process_instances {
            let pi = self.store.process_instance(*pid).await?;
            if self
                .open_step_awaits(&pi, &wfi, transition.as_ref(), person)
                .await?
            {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// [`action_required`](Self::action_required) scoped to one process
    /// instance
    pub async fn process_action_required(
        &self,
        process_instance: ProcessInstanceId,
        person: PersonId,
    ) -> Result<bool> {
        let pi = self.store.process_instance(process_instance).await?;
        let wfi = self.store.workflow_instance(pi.workflow_instance).await?;
        let transition = self.load_transition(&wfi).await?;
        self.open_step_awaits(&pi, &wfi, transition.as_ref(), person)
            .await
    }

    /// True while the transition's assignee resolves to the person and no
    /// step anywhere on the workflow instance has been completed yet;
    /// responsibility moves to the steps with the first completion
    pub async fn transition_action_required(
        &self,
        workflow_instance: WorkflowInstanceId,
        person: PersonId,
    ) -> Result<bool> {
        let wfi = self.store.workflow_instance(workflow_instance).await?;
        let Some(transition) = self.load_transition(&wfi).await? else {
            return Ok(false);
        };
        for pid in &wfi.process_instances {
            let pi = self.store.process_instance(*pid).await?;
            for sid in &pi.step_instances {
                if !self.store.step_instance(*sid).await?.is_open() {
                    return Ok(false);
                }
            }
        }
        let ctx = ResolveCtx {
            workflow_instance: &wfi,
            transition: Some(&transition),
        };
        match self
            .resolver
            .resolve(RoleRef::Dynamic(DynamicRole::Assignee), ctx)
            .await
        {
            Ok(members) => Ok(members.contains(person)),
            Err(EngineError::Configuration(msg)) => {
                warn!(workflow_instance = %wfi.id, error = %msg, "assignee is unresolvable");
                Ok(false)
            }
            Err(err) => Err(err),
        }
    }

    async fn percent_of(&self, wfi: &WorkflowInstance) -> Result<u8> {
        if wfi.complete {
            return Ok(100);
        }
        if wfi.process_instances.is_empty() {
            return Ok(0);
        }
        let mut sum = 0u32;
        for pid in &wfi.process_instances {
            let pi = self.store.process_instance(*pid).await?;
            sum += u32::from(pi.percent_complete);
        }
        let mean = f64::from(sum) / wfi.process_instances.len() as f64;
        Ok(mean.round() as u8)
    }

    async fn open_step_awaits(
        &self,
        pi: &ProcessInstance,
        wfi: &WorkflowInstance,
        transition: Option<&EmployeeTransition>,
        person: PersonId,
    ) -> Result<bool> {
        let Some(current) = pi.current_step_instance else {
            return Ok(false);
        };
        let si = self.store.step_instance(current).await?;
        let step = self.templates.step(si.step)?;
        let Some(role) = self.templates.effective_role(step)? else {
            warn!(step = %step.name, "step has no role at any level; treating as unassigned");
            return Ok(false);
        };
        let ctx = ResolveCtx {
            workflow_instance: wfi,
            transition,
        };
        match self.resolver.resolve(role, ctx).await {
            Ok(members) => Ok(members.contains(person)),
            Err(EngineError::Configuration(msg)) => {
                warn!(step = %step.name, error = %msg, "role is unresolvable; treating as unassigned");
                Ok(false)
            }
            Err(err) => Err(err),
        }
    }
}

/// Age of an open step instance against a reference time, used by the
/// reminder scan
pub(crate) fn open_for_days(si: &hrflow_store::StepInstance, now: chrono::DateTime<Utc>) -> i64 {
    (now - si.started_at).num_days()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::template::{Process, Step, Workflow};
    use hrflow_store::TransitionKind;

    fn two_step_process() -> (TemplateSet, ProcessId) {
        let mut set = TemplateSet::new();
        let wf = set.add_workflow(Workflow::new("Onboarding", TransitionKind::Onboarding));
        let pid = set.add_process(Process::new(wf, "IT Setup"));
        let mut first = Step::new(pid, 0, "create account");
        first.start = true;
        set.add_step(first);
        let mut second = Step::new(pid, 1, "assign hardware");
        second.end = true;
        set.add_step(second);
        (set, pid)
    }

    #[test]
    fn test_half_done_two_step_process_is_fifty_percent() {
        let (set, pid) = two_step_process();
        assert_eq!(process_percent(&set, pid, 2, 1, false).unwrap(), 50);
    }

    #[test]
    fn test_complete_process_is_exactly_one_hundred() {
        let (set, pid) = two_step_process();
        assert_eq!(process_percent(&set, pid, 2, 2, true).unwrap(), 100);
    }

    #[test]
    fn test_loops_extend_the_denominator() {
        let (set, pid) = two_step_process();
        // a loop revisits steps, so more instances exist than the estimate
        assert_eq!(process_percent(&set, pid, 4, 3, false).unwrap(), 75);
    }

    #[test]
    fn test_fresh_process_is_zero_percent() {
        let (set, pid) = two_step_process();
        assert_eq!(process_percent(&set, pid, 1, 0, false).unwrap(), 0);
    }

    proptest::proptest! {
        #[test]
        fn test_percent_stays_in_range_and_grows_with_completions(
            created in 1usize..64,
            completed in 0usize..64,
        ) {
            let completed = completed.min(created);
            let (set, pid) = two_step_process();
            let pct = process_percent(&set, pid, created, completed, false).unwrap();
            proptest::prop_assert!(pct <= 100);
            if completed > 0 {
                let prev = process_percent(&set, pid, created, completed - 1, false).unwrap();
                proptest::prop_assert!(pct >= prev);
            }
        }
    }
}
