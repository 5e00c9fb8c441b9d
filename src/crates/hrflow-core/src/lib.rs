//! Workflow execution engine for employee transitions
//!
//! This crate runs HR transition workflows (onboarding, offboarding, role
//! changes) defined as templates: a [`Workflow`] owns [`Process`]es, which
//! own [`Step`]s that people complete one at a time. Live state is held as
//! instance records in a [`WorkflowStore`] backend; this crate plans every
//! state change as an atomic transaction, commits it with optimistic
//! version guards, and dispatches declared side-effect [`Action`]s after
//! commit.
//!
//! The main entry point is [`WorkflowEngine`]:
//!
//! - [`start_workflow`](WorkflowEngine::start_workflow) instantiates a
//!   template,
//! - [`advance`](WorkflowEngine::advance) completes the current step of a
//!   process instance and opens its successor,
//! - [`undo`](WorkflowEngine::undo) reverts the most recent completion,
//! - the `progress` read models answer "how far along" and "is it my turn",
//! - [`run_weekly_reminders`](WorkflowEngine::run_weekly_reminders) nags
//!   people about stalled steps.
//!
//! Who may act on a step is decided by role resolution: steps carry a
//! [`RoleRef`] that is either a static directory group or a dynamic
//! responsibility (submitter, manager, assignee) read off the driving
//! [`EmployeeTransition`].
//!
//! External capabilities are traits: [`Directory`] for org lookups,
//! [`ActionExecutor`] for side effects, [`Mailer`] for reminder delivery
//! and [`WorkflowStore`] for persistence. In-memory implementations of all
//! four ship for tests and single-process use.
//!
//! [`RoleRef`]: hrflow_store::RoleRef
//! [`EmployeeTransition`]: hrflow_store::EmployeeTransition
//! [`WorkflowStore`]: hrflow_store::WorkflowStore

pub mod action;
pub mod engine;
pub mod error;
pub mod progress;
pub mod reminder;
pub mod role;
pub mod template;
pub mod transition;

pub use action::{ActionContext, ActionExecutor, LoggingActionExecutor};
pub use engine::{AdvanceOutcome, WorkflowEngine};
pub use error::{EngineError, Result};
pub use progress::{process_percent, WorkflowStatus};
pub use reminder::{Mailer, RecordingMailer, SentMail, STALL_THRESHOLD_DAYS};
pub use role::{Directory, InMemoryDirectory, ResolveCtx, RoleMembers, RoleResolver};
pub use template::{Action, Process, Step, StepChoice, TemplateSet, Workflow};
pub use transition::{diff_update, TransitionUpdate};

// The record types live in hrflow-store; re-export the ones callers need
// alongside the engine.
pub use hrflow_store::{
    ActionId, Assignee, DynamicRole, EmployeeTransition, InMemoryWorkflowStore, PersonId,
    ProcessId, ProcessInstance, ProcessInstanceId, Role, RoleId, RoleRef, StepChoiceId, StepId,
    StepInstance, StepInstanceId, TransitionChange, TransitionFields, TransitionId,
    TransitionKind, WorkflowId, WorkflowInstance, WorkflowInstanceId, WorkflowStore,
};
