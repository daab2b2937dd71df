//! Ordered, gated rollout of a playbook's components.
//!
//! Each component goes through
//! `Pending -> {Skipped | Applying} -> Applied -> {Ready | WaitingReadiness -> Ready | Failed}`
//! and components are processed strictly in declared order. Any fatal error
//! aborts the run; components already applied stay applied.

use serde::Serialize;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::cancel;
use crate::cluster::ClusterAccessor;
use crate::condition::ConditionEvaluator;
use crate::error::{PlaybookError, Result};
use crate::event::{EventKind, EventSink};
use crate::manifest::{ManifestApplier, ManifestBuilder};
use crate::playbook::{Component, Playbook};

// ---------------------------------------------------------------------------
// RetryPolicy
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first apply attempt. Attempt `i` failing waits
    /// `i` backoff units; a failure at index `apply_retries` is fatal.
    pub apply_retries: u32,
    /// Readiness polls. Poll `i` waits `i` backoff units before checking.
    pub readiness_polls: u32,
    pub backoff_unit: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            apply_retries: 15,
            readiness_polls: 40,
            backoff_unit: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    fn backoff(&self, attempt: u32) -> Duration {
        self.backoff_unit * attempt
    }
}

// ---------------------------------------------------------------------------
// Run state
// ---------------------------------------------------------------------------

/// A component plus its status within one run.
#[derive(Debug, Clone)]
pub struct RunComponent {
    pub component: Component,
    pub applied: bool,
    pub ready: bool,
    pub skipped: bool,
}

impl RunComponent {
    fn new(component: Component) -> Self {
        Self {
            component,
            applied: false,
            ready: false,
            skipped: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ComponentOutcome {
    pub name: String,
    pub applied: bool,
    pub ready: bool,
    pub skipped: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub components: Vec<ComponentOutcome>,
}

impl RunSummary {
    pub fn applied(&self) -> usize {
        self.components
            .iter()
            .filter(|c| c.applied && !c.skipped)
            .count()
    }

    pub fn skipped(&self) -> usize {
        self.components.iter().filter(|c| c.skipped).count()
    }
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

pub struct Engine<'a> {
    accessor: &'a dyn ClusterAccessor,
    builder: &'a dyn ManifestBuilder,
    applier: &'a dyn ManifestApplier,
    events: EventSink,
    cancel: CancellationToken,
    policy: RetryPolicy,
}

impl<'a> Engine<'a> {
    pub fn new(
        accessor: &'a dyn ClusterAccessor,
        builder: &'a dyn ManifestBuilder,
        applier: &'a dyn ManifestApplier,
    ) -> Self {
        Self {
            accessor,
            builder,
            applier,
            events: EventSink::disabled(),
            cancel: CancellationToken::new(),
            policy: RetryPolicy::default(),
        }
    }

    pub fn with_events(mut self, events: EventSink) -> Self {
        self.events = events;
        self
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Roll out every component of `playbook` in declared order.
    ///
    /// The playbook must already be validated and substituted.
    pub async fn run(&self, playbook: &Playbook) -> Result<RunSummary> {
        let run_id = Uuid::new_v4();
        let mut components: Vec<RunComponent> = playbook
            .components
            .iter()
            .cloned()
            .map(RunComponent::new)
            .collect();
        tracing::info!(%run_id, components = components.len(), "run started");

        for idx in 0..components.len() {
            let (done, rest) = components.split_at_mut(idx);
            let current = &mut rest[0];
            warn_unapplied_dependencies(done, &current.component);
            self.run_component(current).await?;
        }

        tracing::info!(%run_id, "run finished");
        Ok(RunSummary {
            run_id,
            components: components
                .into_iter()
                .map(|c| ComponentOutcome {
                    name: c.component.name,
                    applied: c.applied,
                    ready: c.ready,
                    skipped: c.skipped,
                })
                .collect(),
        })
    }

    async fn run_component(&self, rc: &mut RunComponent) -> Result<()> {
        self.check_cancelled()?;
        let name = rc.component.name.clone();
        let evaluator = ConditionEvaluator::new(self.accessor, self.cancel.clone());

        self.events.emit(&name, EventKind::ComponentStarted).await;

        if !rc.component.apply_conditions.is_empty() {
            self.events.emit(&name, EventKind::TestingApplyConditions).await;
            if !evaluator
                .is_fulfilled(&rc.component.apply_conditions)
                .await?
            {
                self.events
                    .emit(&name, EventKind::ApplyConditionsNotFulfilled)
                    .await;
                tracing::info!(component = %name, "apply conditions not fulfilled, skipping");
                rc.applied = true;
                rc.skipped = true;
                return Ok(());
            }
        }

        self.events.emit(&name, EventKind::Applying).await;
        self.apply_with_retry(&rc.component).await?;
        rc.applied = true;

        if !rc.component.readiness_conditions.is_empty() {
            self.wait_ready(&evaluator, &rc.component).await?;
        }
        rc.ready = true;
        self.events.emit(&name, EventKind::ComponentReady).await;
        Ok(())
    }

    async fn apply_with_retry(&self, component: &Component) -> Result<()> {
        let mut attempt = 0;
        loop {
            self.check_cancelled()?;
            match self.apply_once(component).await {
                Ok(()) => return Ok(()),
                Err(PlaybookError::Cancelled) => return Err(PlaybookError::Cancelled),
                Err(e) if attempt >= self.policy.apply_retries => {
                    return Err(PlaybookError::ApplyFailed {
                        component: component.name.clone(),
                        attempts: attempt + 1,
                        source: Box::new(e),
                    });
                }
                Err(e) => {
                    tracing::warn!(component = %component.name, attempt, "apply failed: {e}");
                    self.events
                        .emit(
                            &component.name,
                            EventKind::ApplyRetry {
                                attempt,
                                error: e.to_string(),
                            },
                        )
                        .await;
                    cancel::sleep(&self.cancel, self.policy.backoff(attempt)).await?;
                    attempt += 1;
                }
            }
        }
    }

    async fn apply_once(&self, component: &Component) -> Result<()> {
        let rendered = self.builder.build(&component.manifest, &self.cancel).await?;
        self.applier.apply(&rendered, &self.cancel).await
    }

    async fn wait_ready(
        &self,
        evaluator: &ConditionEvaluator<'_>,
        component: &Component,
    ) -> Result<()> {
        for attempt in 0..self.policy.readiness_polls {
            cancel::sleep(&self.cancel, self.policy.backoff(attempt)).await?;
            self.events
                .emit(&component.name, EventKind::TestingReadiness { attempt })
                .await;
            if evaluator
                .is_fulfilled(&component.readiness_conditions)
                .await?
            {
                return Ok(());
            }
        }
        Err(PlaybookError::ReadinessNotFulfilled {
            component: component.name.clone(),
        })
    }

    fn check_cancelled(&self) -> Result<()> {
        if self.cancel.is_cancelled() {
            Err(PlaybookError::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// `dependsOn` is only enforced statically. At runtime a dependency that was
/// not applied is reported and the component proceeds anyway.
fn warn_unapplied_dependencies(done: &[RunComponent], component: &Component) {
    for dep in &component.depends_on {
        let applied = done
            .iter()
            .any(|rc| rc.component.name == dep.name && rc.applied);
        if !applied {
            tracing::warn!(
                component = %component.name,
                dependency = %dep.name,
                "dependency has not been applied"
            );
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
