//! Workflow templates: the immutable definition of a procedure's shape
//!
//! Templates form a three-level hierarchy - [`Workflow`] owns ordered
//! [`Process`]es, which own ordered [`Step`]s - plus labeled branches
//! ([`StepChoice`]) and declared side-effect markers ([`Action`]).
//!
//! Steps and choices are nodes and edges of a graph that may contain cycles
//! (a choice can loop back to an earlier step), so the whole template set
//! lives in an id-keyed arena ([`TemplateSet`]) rather than nested owning
//! structures. [`TemplateSet::validate`] checks referential integrity once,
//! after authoring; execution then trusts the graph.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use hrflow_store::{
    ActionId, ProcessId, RoleRef, StepChoiceId, StepId, TransitionKind, WorkflowId,
};

use crate::error::{EngineError, Result};

/// Top-level template: a named, versioned, iconed procedure for one
/// category of transition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Workflow {
    pub id: WorkflowId,
    pub name: String,
    /// Which transition category this workflow applies to
    pub kind: TransitionKind,
    pub icon: String,
    pub version: u32,
    /// Fallback role for steps that set none at step or process level
    pub role: Option<RoleRef>,
    /// Owned processes in display order
    pub processes: Vec<ProcessId>,
}

impl Workflow {
    pub fn new(name: impl Into<String>, kind: TransitionKind) -> Self {
        Self {
            id: WorkflowId::new(),
            name: name.into(),
            kind,
            icon: String::new(),
            version: 1,
            role: None,
            processes: Vec::new(),
        }
    }
}

/// A sequence of steps within a workflow, e.g. "IT Setup"
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Process {
    pub id: ProcessId,
    pub name: String,
    pub version: u32,
    pub workflow: WorkflowId,
    /// Role override for steps that set none themselves
    pub role: Option<RoleRef>,
    /// Owned steps, kept sorted by step order
    pub steps: Vec<StepId>,
}

impl Process {
    pub fn new(workflow: WorkflowId, name: impl Into<String>) -> Self {
        Self {
            id: ProcessId::new(),
            name: name.into(),
            version: 1,
            workflow,
            role: None,
            steps: Vec::new(),
        }
    }
}

/// A single unit of human work within a process
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    pub id: StepId,
    pub process: ProcessId,
    /// Default sequence position within the process
    pub order: u32,
    /// Entry step of its process; exactly one per process
    pub start: bool,
    /// Terminal step; completing it completes the process instance
    pub end: bool,
    pub name: String,
    pub description: String,
    /// Prompt shown to the actor when the step branches
    pub choices_prompt: String,
    /// Assigned role; falls back to process role, then workflow role
    pub role: Option<RoleRef>,
    /// Default successor when the step has no choices; when unset the next
    /// step by order is used
    pub next_step: Option<StepId>,
    /// Branch alternatives, in display order; when non-empty the completing
    /// actor must select exactly one
    pub choices: Vec<StepChoiceId>,
    /// Action dispatched when this step completes
    pub completion_action: Option<ActionId>,
    /// Additional actions dispatched alongside the completion action
    pub optional_actions: Vec<ActionId>,
}

impl Step {
    pub fn new(process: ProcessId, order: u32, name: impl Into<String>) -> Self {
        Self {
            id: StepId::new(),
            process,
            order,
            start: false,
            end: false,
            name: name.into(),
            description: String::new(),
            choices_prompt: String::new(),
            role: None,
            next_step: None,
            choices: Vec::new(),
            completion_action: None,
            optional_actions: Vec::new(),
        }
    }
}

/// A labeled branch out of a step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepChoice {
    pub id: StepChoiceId,
    pub step: StepId,
    pub order: u32,
    pub choice_text: String,
    /// Target step when this choice is taken; may point backwards
    pub next_step: StepId,
    /// Processes to additionally instantiate when this choice is taken
    pub trigger_processes: Vec<ProcessId>,
}

impl StepChoice {
    pub fn new(step: StepId, order: u32, text: impl Into<String>, next_step: StepId) -> Self {
        Self {
            id: StepChoiceId::new(),
            step,
            order,
            choice_text: text.into(),
            next_step,
            trigger_processes: Vec::new(),
        }
    }
}

/// Declared side-effect marker, e.g. "revoke badge access"
///
/// Actions do not execute anything in this crate; they are typed markers
/// handed to the [`ActionExecutor`](crate::action::ActionExecutor)
/// collaborator on step completion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Action {
    pub id: ActionId,
    pub name: String,
    pub description: String,
    /// Free-form grouping used by the executing collaborator
    pub category: String,
}

impl Action {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: ActionId::new(),
            name: name.into(),
            description: String::new(),
            category: String::new(),
        }
    }
}

/// Id-keyed arena holding a consistent set of templates
///
/// The arena is read-only at execution time; administrators author and
/// version templates out of band and the engine receives the finished set.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TemplateSet {
    workflows: HashMap<WorkflowId, Workflow>,
    processes: HashMap<ProcessId, Process>,
    steps: HashMap<StepId, Step>,
    choices: HashMap<StepChoiceId, StepChoice>,
    actions: HashMap<ActionId, Action>,
}

impl TemplateSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_workflow(&mut self, workflow: Workflow) -> WorkflowId {
        let id = workflow.id;
        self.workflows.insert(id, workflow);
        id
    }

    /// Insert a process and register it on its owning workflow
    pub fn add_process(&mut self, process: Process) -> ProcessId {
        let id = process.id;
        if let Some(workflow) = self.workflows.get_mut(&process.workflow) {
            if !workflow.processes.contains(&id) {
                workflow.processes.push(id);
            }
        }
        self.processes.insert(id, process);
        id
    }

    /// Insert a step and keep its process's step list sorted by order
    pub fn add_step(&mut self, step: Step) -> StepId {
        let id = step.id;
        let process = step.process;
        let order = step.order;
        self.steps.insert(id, step);
        if let Some(p) = self.processes.get_mut(&process) {
            if !p.steps.contains(&id) {
                p.steps.push(id);
            }
            let steps = &self.steps;
            p.steps
                .sort_by_key(|sid| steps.get(sid).map(|s| s.order).unwrap_or(order));
        }
        id
    }

    /// Insert a choice and register it on its owning step
    pub fn add_choice(&mut self, choice: StepChoice) -> StepChoiceId {
        let id = choice.id;
        if let Some(step) = self.steps.get_mut(&choice.step) {
            if !step.choices.contains(&id) {
                step.choices.push(id);
            }
        }
        self.choices.insert(id, choice);
        id
    }

    pub fn add_action(&mut self, action: Action) -> ActionId {
        let id = action.id;
        self.actions.insert(id, action);
        id
    }

    /// Look up a workflow by caller-supplied id
    pub fn workflow(&self, id: WorkflowId) -> Result<&Workflow> {
        self.workflows
            .get(&id)
            .ok_or_else(|| EngineError::not_found(format!("workflow template {id}")))
    }

    pub fn process(&self, id: ProcessId) -> Result<&Process> {
        self.processes
            .get(&id)
            .ok_or_else(|| EngineError::configuration(format!("process template {id} is not defined")))
    }

    pub fn step(&self, id: StepId) -> Result<&Step> {
        self.steps
            .get(&id)
            .ok_or_else(|| EngineError::configuration(format!("step template {id} is not defined")))
    }

    pub fn choice(&self, id: StepChoiceId) -> Result<&StepChoice> {
        self.choices
            .get(&id)
            .ok_or_else(|| EngineError::configuration(format!("step choice {id} is not defined")))
    }

    pub fn action(&self, id: ActionId) -> Result<&Action> {
        self.actions
            .get(&id)
            .ok_or_else(|| EngineError::configuration(format!("action {id} is not defined")))
    }

    /// The entry step of a process (the one flagged `start`)
    pub fn start_step(&self, process: ProcessId) -> Result<&Step> {
        let p = self.process(process)?;
        p.steps
            .iter()
            .filter_map(|sid| self.steps.get(sid))
            .find(|s| s.start)
            .ok_or_else(|| {
                EngineError::configuration(format!("process {} has no start step", p.name))
            })
    }

    /// Default successor of a step: explicit `next_step`, else the next step
    /// by order within its process
    pub fn default_successor(&self, step: &Step) -> Result<Option<StepId>> {
        if let Some(next) = step.next_step {
            return Ok(Some(next));
        }
        let process = self.process(step.process)?;
        let pos = process.steps.iter().position(|sid| *sid == step.id);
        Ok(pos.and_then(|i| process.steps.get(i + 1)).copied())
    }

    /// Effective role of a step: step role, else process role, else
    /// workflow role
    pub fn effective_role(&self, step: &Step) -> Result<Option<RoleRef>> {
        if step.role.is_some() {
            return Ok(step.role);
        }
        let process = self.process(step.process)?;
        if process.role.is_some() {
            return Ok(process.role);
        }
        let workflow = self
            .workflows
            .get(&process.workflow)
            .ok_or_else(|| {
                EngineError::configuration(format!("workflow template {} is not defined", process.workflow))
            })?;
        Ok(workflow.role)
    }

    /// Static estimate of a process's length: the chain from the start step
    /// following default successors, ignoring alternate branches
    ///
    /// This feeds the percent-complete approximation. True remaining length
    /// is path-dependent once branches are taken, so this is deliberately a
    /// best-effort figure, not an exact one.
    pub fn linear_chain_len(&self, process: ProcessId) -> Result<usize> {
        let mut visited = HashSet::new();
        let mut current = self.start_step(process)?.id;
        let mut len = 0usize;
        loop {
            if !visited.insert(current) {
                break;
            }
            len += 1;
            let step = self.step(current)?;
            if step.end {
                break;
            }
            match self.default_successor(step)? {
                Some(next) if self.steps.contains_key(&next) => current = next,
                _ => break,
            }
        }
        Ok(len)
    }

    /// Check referential integrity of the whole set
    ///
    /// Catches the template-authoring mistakes that would otherwise only
    /// surface mid-execution: dangling ids, processes without a single start
    /// step, dead-end non-terminal steps, terminal steps with branches.
    pub fn validate(&self) -> Result<()> {
        for workflow in self.workflows.values() {
            for pid in &workflow.processes {
                let process = self.process(*pid)?;
                if process.workflow != workflow.id {
                    return Err(EngineError::configuration(format!(
                        "process {} is listed by workflow {} but owned by another",
                        process.name, workflow.name
                    )));
                }
            }
        }

        for process in self.processes.values() {
            let start_count = process
                .steps
                .iter()
                .filter_map(|sid| self.steps.get(sid))
                .filter(|s| s.start)
                .count();
            if start_count != 1 {
                return Err(EngineError::configuration(format!(
                    "process {} has {} start steps, expected exactly 1",
                    process.name, start_count
                )));
            }
            for sid in &process.steps {
                let step = self.step(*sid)?;
                if step.process != process.id {
                    return Err(EngineError::configuration(format!(
                        "step {} is listed by process {} but owned by another",
                        step.name, process.name
                    )));
                }
            }
        }

        for step in self.steps.values() {
            if step.end && !step.choices.is_empty() {
                return Err(EngineError::configuration(format!(
                    "terminal step {} must not have choices",
                    step.name
                )));
            }
            if let Some(next) = step.next_step {
                self.step(next)?;
            }
            if !step.end && step.choices.is_empty() && self.default_successor(step)?.is_none() {
                return Err(EngineError::configuration(format!(
                    "step {} is not terminal but has no successor",
                    step.name
                )));
            }
            for cid in &step.choices {
                let choice = self.choice(*cid)?;
                if choice.step != step.id {
                    return Err(EngineError::configuration(format!(
                        "choice '{}' is listed by step {} but owned by another",
                        choice.choice_text, step.name
                    )));
                }
            }
            if let Some(aid) = step.completion_action {
                self.action(aid)?;
            }
            for aid in &step.optional_actions {
                self.action(*aid)?;
            }
        }

        for choice in self.choices.values() {
            self.step(choice.next_step)?;
            for pid in &choice.trigger_processes {
                self.process(*pid)?;
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn linear_process(set: &mut TemplateSet, n: usize) -> ProcessId {
        let wf = set.add_workflow(Workflow::new("Onboarding", TransitionKind::Onboarding));
        let pid = set.add_process(Process::new(wf, "Setup"));
        for i in 0..n {
            let mut step = Step::new(pid, i as u32, format!("step {i}"));
            step.start = i == 0;
            step.end = i == n - 1;
            set.add_step(step);
        }
        pid
    }

    #[test]
    fn test_linear_chain_length_matches_step_count() {
        let mut set = TemplateSet::new();
        let pid = linear_process(&mut set, 4);
        assert!(set.validate().is_ok());
        assert_eq!(set.linear_chain_len(pid).unwrap(), 4);
    }

    #[test]
    fn test_default_successor_follows_order() {
        let mut set = TemplateSet::new();
        let pid = linear_process(&mut set, 3);
        let first = set.start_step(pid).unwrap().clone();
        let second = set.default_successor(&first).unwrap().unwrap();
        assert_eq!(set.step(second).unwrap().order, 1);
    }

    #[test]
    fn test_explicit_next_step_wins_over_order() {
        let mut set = TemplateSet::new();
        let pid = linear_process(&mut set, 3);
        let last = *set.process(pid).unwrap().steps.last().unwrap();
        let mut first = set.start_step(pid).unwrap().clone();
        first.next_step = Some(last);
        let first_id = first.id;
        set.add_step(first);
        let first = set.step(first_id).unwrap();
        assert_eq!(set.default_successor(first).unwrap(), Some(last));
    }

    #[test]
    fn test_validate_rejects_missing_start_step() {
        let mut set = TemplateSet::new();
        let wf = set.add_workflow(Workflow::new("Offboarding", TransitionKind::Offboarding));
        let pid = set.add_process(Process::new(wf, "Teardown"));
        let mut step = Step::new(pid, 0, "only");
        step.end = true;
        set.add_step(step);
        let err = set.validate().unwrap_err();
        assert!(matches!(err, EngineError::Configuration(_)));
    }

    #[test]
    fn test_validate_rejects_dead_end_step() {
        let mut set = TemplateSet::new();
        let wf = set.add_workflow(Workflow::new("Change", TransitionKind::Change));
        let pid = set.add_process(Process::new(wf, "Review"));
        let mut step = Step::new(pid, 0, "dangling");
        step.start = true;
        // not terminal, no next step, no choices
        set.add_step(step);
        assert!(set.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_terminal_step_with_choices() {
        let mut set = TemplateSet::new();
        let pid = linear_process(&mut set, 2);
        let last_id = *set.process(pid).unwrap().steps.last().unwrap();
        let first_id = set.start_step(pid).unwrap().id;
        set.add_choice(StepChoice::new(last_id, 0, "loop", first_id));
        assert!(set.validate().is_err());
    }

    #[test]
    fn test_choice_cycles_are_representable() {
        let mut set = TemplateSet::new();
        let pid = linear_process(&mut set, 3);
        let steps = set.process(pid).unwrap().steps.clone();
        // second step can branch back to the first
        set.add_choice(StepChoice::new(steps[1], 0, "redo", steps[0]));
        assert!(set.validate().is_ok());
        assert_eq!(set.linear_chain_len(pid).unwrap(), 3);
    }

    #[test]
    fn test_effective_role_fallback_chain() {
        use hrflow_store::{DynamicRole, RoleId};

        let mut set = TemplateSet::new();
        let mut workflow = Workflow::new("Onboarding", TransitionKind::Onboarding);
        let workflow_role = RoleRef::Static(RoleId::new());
        workflow.role = Some(workflow_role);
        let wf = set.add_workflow(workflow);
        let pid = set.add_process(Process::new(wf, "Setup"));
        let mut step = Step::new(pid, 0, "first");
        step.start = true;
        step.end = true;
        let sid = set.add_step(step);

        // falls through to the workflow role
        let step = set.step(sid).unwrap().clone();
        assert_eq!(set.effective_role(&step).unwrap(), Some(workflow_role));

        // process role overrides workflow role
        let mut process = set.process(pid).unwrap().clone();
        let process_role = RoleRef::Dynamic(DynamicRole::Manager);
        process.role = Some(process_role);
        set.add_process(process);
        assert_eq!(set.effective_role(&step).unwrap(), Some(process_role));

        // step role overrides everything
        let mut step = step;
        step.role = Some(RoleRef::Dynamic(DynamicRole::Submitter));
        assert_eq!(
            set.effective_role(&step).unwrap(),
            Some(RoleRef::Dynamic(DynamicRole::Submitter))
        );
    }
}
