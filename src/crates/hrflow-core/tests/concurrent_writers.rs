//! Interleaved-writer scenarios. Two engine calls plan against the same
//! snapshot and race their commits; the version guards must let exactly one
//! through and hand the other a retryable error, never a half-applied state.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use tokio::sync::Barrier;

use hrflow_core::{
    EngineError, InMemoryDirectory, LoggingActionExecutor, PersonId, Process, RecordingMailer,
    Role, RoleId, RoleRef, Step, StepChoice, TemplateSet, TransitionKind, Workflow,
    WorkflowEngine, WorkflowId,
};
use hrflow_store::{
    EmployeeTransition, InMemoryWorkflowStore, InstanceTxn, ProcessInstance, ProcessInstanceId,
    Result as StoreResult, StepInstance, StepInstanceId, TransitionChange, TransitionId,
    WorkflowInstance, WorkflowInstanceId, WorkflowStore,
};

/// Store wrapper that, once armed, holds the next two commits at a barrier
/// until both have arrived. Reads pass through untouched, so both writers
/// finish planning before either commit applies.
struct GatedStore {
    inner: InMemoryWorkflowStore,
    armed: AtomicBool,
    gated: AtomicU32,
    barrier: Barrier,
}

impl GatedStore {
    fn new() -> Self {
        Self {
            inner: InMemoryWorkflowStore::new(),
            armed: AtomicBool::new(false),
            gated: AtomicU32::new(0),
            barrier: Barrier::new(2),
        }
    }

    fn arm(&self) {
        self.armed.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl WorkflowStore for GatedStore {
    async fn workflow_instance(&self, id: WorkflowInstanceId) -> StoreResult<WorkflowInstance> {
        self.inner.workflow_instance(id).await
    }

    async fn process_instance(&self, id: ProcessInstanceId) -> StoreResult<ProcessInstance> {
        self.inner.process_instance(id).await
    }

    async fn step_instance(&self, id: StepInstanceId) -> StoreResult<StepInstance> {
        self.inner.step_instance(id).await
    }

    async fn list_workflow_instances(&self) -> StoreResult<Vec<WorkflowInstance>> {
        self.inner.list_workflow_instances().await
    }

    async fn open_step_instances(&self) -> StoreResult<Vec<StepInstance>> {
        self.inner.open_step_instances().await
    }

    async fn commit(&self, txn: InstanceTxn) -> StoreResult<()> {
        if self.armed.load(Ordering::SeqCst) && self.gated.fetch_add(1, Ordering::SeqCst) < 2 {
            self.barrier.wait().await;
        }
        self.inner.commit(txn).await
    }

    async fn insert_transition(&self, transition: EmployeeTransition) -> StoreResult<()> {
        self.inner.insert_transition(transition).await
    }

    async fn transition(&self, id: TransitionId) -> StoreResult<EmployeeTransition> {
        self.inner.transition(id).await
    }

    async fn update_transition(
        &self,
        transition: EmployeeTransition,
        change: TransitionChange,
    ) -> StoreResult<()> {
        self.inner.update_transition(transition, change).await
    }

    async fn transition_changes(&self, id: TransitionId) -> StoreResult<Vec<TransitionChange>> {
        self.inner.transition_changes(id).await
    }

    async fn last_reminder(
        &self,
        step_instance: StepInstanceId,
        person: PersonId,
    ) -> StoreResult<Option<DateTime<Utc>>> {
        self.inner.last_reminder(step_instance, person).await
    }

    async fn record_reminder(
        &self,
        step_instance: StepInstanceId,
        person: PersonId,
        at: DateTime<Utc>,
    ) -> StoreResult<()> {
        self.inner.record_reminder(step_instance, person, at).await
    }
}

fn hr_directory() -> (InMemoryDirectory, RoleId, PersonId) {
    let mut directory = InMemoryDirectory::new();
    let person = PersonId::new();
    let mut role = Role::new("HR Operations");
    role.members = vec![person];
    let role_id = role.id;
    directory.add_role(role);
    (directory, role_id, person)
}

fn engine_on(templates: TemplateSet, directory: InMemoryDirectory) -> (WorkflowEngine, Arc<GatedStore>) {
    templates.validate().expect("fixture templates must be valid");
    let store = Arc::new(GatedStore::new());
    let engine = WorkflowEngine::new(
        Arc::new(templates),
        store.clone(),
        Arc::new(directory),
        Arc::new(LoggingActionExecutor),
    );
    (engine, store)
}

/// Offboarding with two single-step processes, so each process's only
/// advance is also its final one
fn offboarding_pair(role: RoleRef) -> (TemplateSet, WorkflowId) {
    let mut set = TemplateSet::new();
    let mut workflow = Workflow::new("Employee Offboarding", TransitionKind::Offboarding);
    workflow.role = Some(role);
    let wf = set.add_workflow(workflow);
    for name in ["IT Teardown", "Payroll Closeout"] {
        let pid = set.add_process(Process::new(wf, name));
        let mut step = Step::new(pid, 0, "finish up");
        step.start = true;
        step.end = true;
        set.add_step(step);
    }
    (set, wf)
}

#[tokio::test]
async fn test_simultaneous_final_advances_serialize_and_cascade() {
    let (directory, role, hr) = hr_directory();
    let (set, wf) = offboarding_pair(RoleRef::Static(role));
    let (engine, store) = engine_on(set, directory);

    let wfi = engine.start_workflow(wf, hr, None).await.unwrap();
    let (p1, p2) = (wfi.process_instances[0], wfi.process_instances[1]);
    store.arm();

    // both writers see the other's process incomplete when they plan
    let (r1, r2) = tokio::join!(engine.advance(p1, hr, None), engine.advance(p2, hr, None));

    let loser = match (&r1, &r2) {
        (Ok(out), Err(EngineError::Conflict(_))) => {
            assert!(out.process_completed);
            p2
        }
        (Err(EngineError::Conflict(_)), Ok(out)) => {
            assert!(out.process_completed);
            p1
        }
        other => panic!("expected one success and one conflict, got {other:?}"),
    };

    // the retry sees the sibling complete and performs the cascade
    let out = engine.advance(loser, hr, None).await.unwrap();
    assert!(out.process_completed);
    assert!(out.workflow_completed);

    let wfi = store.workflow_instance(wfi.id).await.unwrap();
    assert!(wfi.complete);
    assert!(wfi.completed_at.is_some());
}

#[tokio::test]
async fn test_undo_racing_an_advance_of_a_triggered_process() {
    let (directory, role, hr) = hr_directory();

    let mut set = TemplateSet::new();
    let mut workflow = Workflow::new("Change Review", TransitionKind::Change);
    workflow.role = Some(RoleRef::Static(role));
    let wf = set.add_workflow(workflow);
    let pid = set.add_process(Process::new(wf, "Review"));
    let mut review = Step::new(pid, 0, "review request");
    review.start = true;
    review.choices_prompt = "Approve this change?".into();
    let review = set.add_step(review);
    let mut apply = Step::new(pid, 1, "apply change");
    apply.end = true;
    let apply = set.add_step(apply);

    // a two-step side process, so advancing it opens a successor step
    let mut side_workflow = Workflow::new("Side Effects", TransitionKind::Change);
    side_workflow.role = Some(RoleRef::Static(role));
    let side_wf = set.add_workflow(side_workflow);
    let side = set.add_process(Process::new(side_wf, "Badge Provisioning"));
    let mut request = Step::new(side, 0, "request badge");
    request.start = true;
    set.add_step(request);
    let mut issue = Step::new(side, 1, "issue badge");
    issue.end = true;
    set.add_step(issue);

    let mut approve = StepChoice::new(review, 0, "approve", apply);
    approve.trigger_processes = vec![side];
    let approve = set.add_choice(approve);

    let (engine, store) = engine_on(set, directory);
    let wfi = engine.start_workflow(wf, hr, None).await.unwrap();
    let main_pi = wfi.process_instances[0];

    let out = engine.advance(main_pi, hr, Some(approve)).await.unwrap();
    let side_pi = out.triggered[0];
    let closed = out.closed.id;
    store.arm();

    // the undo plans its teardown of the triggered process while that
    // process is being advanced
    let (advanced, undone) = tokio::join!(engine.advance(side_pi, hr, None), engine.undo(closed, hr));
    assert!(
        advanced.is_ok() != undone.is_ok(),
        "expected exactly one winner, got {advanced:?} / {undone:?}"
    );

    // whoever lost, no open step may point at a deleted process instance
    for si in store.open_step_instances().await.unwrap() {
        assert!(store.process_instance(si.process_instance).await.is_ok());
    }

    // and the reminder scan still walks the surviving state
    let mailer = RecordingMailer::new();
    engine
        .run_weekly_reminders_at(&mailer, Utc::now() + Duration::days(8))
        .await
        .unwrap();
}
