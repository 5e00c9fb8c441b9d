//! Weekly reminder batch job
//!
//! Scans every open step instance, finds the ones that have sat untouched
//! past the stall threshold, resolves who is responsible, and sends each
//! person one digest email covering all of their stalled steps. A marker per
//! (step instance, person) makes the run idempotent: re-running within the
//! same opening of a step sends nothing new. Markers are keyed against the
//! step instance's `started_at`, so a step that is undone and reopened
//! becomes remindable again.
//!
//! Delivery failures skip the marker and are retried by the next run.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::{info, warn};

use hrflow_store::{PersonId, StepInstance};

use crate::engine::WorkflowEngine;
use crate::error::{EngineError, Result};
use crate::progress::open_for_days;
use crate::role::ResolveCtx;

/// A step is considered stalled once it has been open this many days
pub const STALL_THRESHOLD_DAYS: i64 = 7;

/// Outbound email capability
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(
        &self,
        recipients: &[PersonId],
        subject: &str,
        body: &str,
    ) -> std::result::Result<(), Box<dyn std::error::Error + Send + Sync>>;
}

/// One line of a person's digest
struct StalledStep {
    instance: StepInstance,
    step_name: String,
    process_name: String,
    workflow_name: String,
    days_open: i64,
}

impl WorkflowEngine {
    /// Run the weekly reminder job against the current time
    pub async fn run_weekly_reminders(&self, mailer: &dyn Mailer) -> Result<usize> {
        self.run_weekly_reminders_at(mailer, Utc::now()).await
    }

    /// Run the reminder job against a fixed reference time
    ///
    /// Returns the number of people a digest was sent to.
    #[tracing::instrument(skip(self, mailer))]
    pub async fn run_weekly_reminders_at(
        &self,
        mailer: &dyn Mailer,
        now: DateTime<Utc>,
    ) -> Result<usize> {
        let mut digests: HashMap<PersonId, Vec<StalledStep>> = HashMap::new();

        for si in self.store.open_step_instances().await? {
            let days_open = open_for_days(&si, now);
            if days_open < STALL_THRESHOLD_DAYS {
                continue;
            }
            let pi = self.store.process_instance(si.process_instance).await?;
            if pi.is_complete() {
                continue;
            }
            let wfi = self.store.workflow_instance(pi.workflow_instance).await?;
            let transition = self.load_transition(&wfi).await?;

            let step = self.templates.step(si.step)?.clone();
            let Some(role) = self.templates.effective_role(&step)? else {
                warn!(step = %step.name, "stalled step has no role; nobody to remind");
                continue;
            };
            let ctx = ResolveCtx {
                workflow_instance: &wfi,
                transition: transition.as_ref(),
            };
            let members = match self.resolver.resolve(role, ctx).await {
                Ok(members) => members,
                Err(EngineError::Configuration(msg)) => {
                    warn!(step = %step.name, error = %msg, "stalled step role is unresolvable");
                    continue;
                }
                Err(err) => return Err(err),
            };

            let process_name = self.templates.process(pi.process)?.name.clone();
            let workflow_name = self.templates.workflow(wfi.workflow)?.name.clone();
            for person in &members.members {
                // one reminder per person per opening of the step
                if let Some(last) = self.store.last_reminder(si.id, *person).await? {
                    if last >= si.started_at {
                        continue;
                    }
                }
                digests.entry(*person).or_default().push(StalledStep {
                    instance: si.clone(),
                    step_name: step.name.clone(),
                    process_name: process_name.clone(),
                    workflow_name: workflow_name.clone(),
                    days_open,
                });
            }
        }

        let mut notified = 0usize;
        for (person, stalled) in digests {
            let subject = format!(
                "{} workflow step(s) awaiting your action",
                stalled.len()
            );
            let mut body = String::from(
                "The following workflow steps have been waiting for over a week:\n\n",
            );
            for entry in &stalled {
                body.push_str(&format!(
                    "- {} / {} / {} (open {} days)\n",
                    entry.workflow_name, entry.process_name, entry.step_name, entry.days_open
                ));
            }

            if let Err(err) = mailer.send(&[person], &subject, &body).await {
                // no marker recorded; the next run retries
                warn!(person = %person, error = %err, "reminder delivery failed");
                continue;
            }
            for entry in &stalled {
                self.store
                    .record_reminder(entry.instance.id, person, now)
                    .await?;
            }
            notified += 1;
        }

        info!(notified, "weekly reminder run finished");
        Ok(notified)
    }
}

/// [`Mailer`] that keeps sent mail in memory, for tests and dry runs
#[derive(Debug, Default)]
pub struct RecordingMailer {
    sent: tokio::sync::Mutex<Vec<SentMail>>,
}

/// One captured email
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentMail {
    pub recipients: Vec<PersonId>,
    pub subject: String,
    pub body: String,
}

impl RecordingMailer {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn sent(&self) -> Vec<SentMail> {
        self.sent.lock().await.clone()
    }
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send(
        &self,
        recipients: &[PersonId],
        subject: &str,
        body: &str,
    ) -> std::result::Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.sent.lock().await.push(SentMail {
            recipients: recipients.to_vec(),
            subject: subject.to_owned(),
            body: body.to_owned(),
        });
        Ok(())
    }
}
