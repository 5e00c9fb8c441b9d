//! Dispatch of declared step-completion actions
//!
//! Actions are typed markers on step templates ("revoke badge access",
//! "create AD account"); executing them is somebody else's job. The engine
//! hands each fired action to an [`ActionExecutor`] *after* the state
//! transition has committed. A failing executor is logged and reported on
//! the advance outcome but never rolls the workflow back - that accepted
//! inconsistency window is part of the contract, not hidden.

use async_trait::async_trait;
use tracing::info;

use hrflow_store::{
    ProcessInstanceId, StepInstanceId, TransitionId, WorkflowInstanceId,
};

use crate::template::Action;

/// Where an action fired from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActionContext {
    pub workflow_instance: WorkflowInstanceId,
    pub process_instance: ProcessInstanceId,
    pub step_instance: StepInstanceId,
    pub transition: Option<TransitionId>,
}

/// External action-execution capability
#[async_trait]
pub trait ActionExecutor: Send + Sync {
    async fn execute(
        &self,
        action: &Action,
        ctx: &ActionContext,
    ) -> std::result::Result<(), Box<dyn std::error::Error + Send + Sync>>;
}

/// Default executor that only records the dispatch in the log
///
/// Useful until a real integration is wired up, and for tests that do not
/// care about side effects.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingActionExecutor;

#[async_trait]
impl ActionExecutor for LoggingActionExecutor {
    async fn execute(
        &self,
        action: &Action,
        ctx: &ActionContext,
    ) -> std::result::Result<(), Box<dyn std::error::Error + Send + Sync>> {
        info!(
            action = %action.name,
            step_instance = %ctx.step_instance,
            "action dispatched"
        );
        Ok(())
    }
}
