//! State machine: everything that happens after a task finishes.
//!
//! A completion is applied to the task record first (the CAS makes that the
//! single point where duplicates lose), then propagated to the parent chain
//! or group, then to the trigger of whatever finished.
//!
//! Outcomes produced locally (inline runs, dispatch failures) are not applied
//! where they happen. They go on a [`Backlog`] that the outermost call drains,
//! so a debug-mode chain runs as a loop instead of one nested future per step.

use std::collections::VecDeque;

use futures::future::BoxFuture;
use serde::Serialize;
use serde_json::{Value, json};
use tracing::{debug, error, info, warn};

use super::Engine;
use super::dispatcher::{DispatchReceipt, Dispatched};
use super::graph::Edit;
use super::injector::inject;
use crate::domain::chain::{ChainRecord, ChainStep};
use crate::domain::events::{DiscardReason, DomainEvent};
use crate::domain::group::{BarrierStep, GroupRecord};
use crate::domain::ids::{ChainId, GroupId, NodeId, TaskId};
use crate::domain::node::Parent;
use crate::domain::outcome::{ErrorDescriptor, FailureKind, MemberResult, Outcome};
use crate::domain::state::{FlowState, TaskState};
use crate::domain::task::TaskRecord;
use crate::error::EngineError;

/// What `on_complete` did with a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Disposition {
    Applied,
    Discarded { reason: DiscardReason },
}

/// Where an outcome comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Origin {
    /// The tracker endpoint.
    Notification,
    /// Produced by the engine itself: inline runs and dispatch failures.
    Local,
}

/// Local outcomes waiting to be applied, oldest first.
#[derive(Debug, Default)]
pub(crate) struct Backlog(VecDeque<(TaskId, Outcome)>);

impl Backlog {
    fn push(&mut self, task_id: TaskId, outcome: Outcome) {
        self.0.push_back((task_id, outcome));
    }

    fn pop(&mut self) -> Option<(TaskId, Outcome)> {
        self.0.pop_front()
    }
}

impl Engine {
    /// Apply `outcome` to a task and propagate it.
    pub(crate) async fn settle(
        &self,
        task_id: TaskId,
        outcome: Outcome,
        origin: Origin,
    ) -> Result<Disposition, EngineError> {
        let mut backlog = Backlog::default();
        let disposition = self.apply(task_id, outcome, origin, &mut backlog).await?;
        self.drain(&mut backlog).await?;
        Ok(disposition)
    }

    /// Dispatch a PENDING task, injecting `previous` into its payload.
    pub(crate) async fn submit_with(
        &self,
        task_id: TaskId,
        previous: Option<Value>,
    ) -> Result<DispatchReceipt, EngineError> {
        let mut backlog = Backlog::default();
        let receipt = self.schedule(task_id, previous, &mut backlog).await?;
        self.drain(&mut backlog).await?;
        Ok(receipt)
    }

    /// Start a node, handing it the previous result (if any).
    pub(crate) async fn enter(
        &self,
        node: NodeId,
        previous: Option<Value>,
    ) -> Result<(), EngineError> {
        let mut backlog = Backlog::default();
        self.enter_node(node, previous, &mut backlog).await?;
        self.drain(&mut backlog).await
    }

    /// Apply queued outcomes until none are left. Applying one may queue more.
    pub(crate) async fn drain(&self, backlog: &mut Backlog) -> Result<(), EngineError> {
        while let Some((task_id, outcome)) = backlog.pop() {
            self.apply(task_id, outcome, Origin::Local, backlog).await?;
        }
        Ok(())
    }

    async fn apply(
        &self,
        task_id: TaskId,
        outcome: Outcome,
        origin: Origin,
        backlog: &mut Backlog,
    ) -> Result<Disposition, EngineError> {
        let now = self.clock.now();
        let applied = self
            .graph
            .update_task(task_id, |task| {
                if task.state == TaskState::Revoked {
                    return Edit::Skip(Err(DiscardReason::Revoked));
                }
                if task.state.is_terminal() {
                    return Edit::Skip(Err(DiscardReason::AlreadyTerminal));
                }
                if task.state == TaskState::Pending && origin == Origin::Notification {
                    return Edit::Skip(Err(DiscardReason::NotDispatched));
                }
                let changed = match &outcome {
                    Outcome::Success { value } => task.mark_succeeded(value.clone(), now),
                    Outcome::Failure { error } => task.mark_failed(error.clone(), now),
                };
                if changed {
                    Edit::Commit(Ok(task.clone()))
                } else {
                    Edit::Skip(Err(DiscardReason::NotDispatched))
                }
            })
            .await?;

        let task = match applied {
            Ok(task) => task,
            Err(reason) => {
                if reason == DiscardReason::NotDispatched {
                    warn!(node = %task_id, "completion for a task that was never dispatched");
                } else {
                    debug!(node = %task_id, ?reason, "completion discarded");
                }
                self.events
                    .emit(&DomainEvent::NotificationDiscarded { task_id, reason });
                return Ok(Disposition::Discarded { reason });
            }
        };

        match outcome {
            Outcome::Success { value } => {
                debug!(node = %task_id, endpoint = %task.endpoint, "task succeeded");
                self.events.emit(&DomainEvent::TaskCompleted {
                    task_id,
                    value: value.clone(),
                });
                self.after_success(&task, value, backlog).await?;
            }
            Outcome::Failure { error } => {
                if task.is_error_callback() {
                    warn!(
                        node = %task_id,
                        endpoint = %task.endpoint,
                        error = %error.message,
                        "error callback failed"
                    );
                } else {
                    warn!(
                        node = %task_id,
                        endpoint = %task.endpoint,
                        kind = ?error.kind,
                        error = %error.message,
                        "task failed"
                    );
                }
                self.events.emit(&DomainEvent::TaskFailed {
                    task_id,
                    kind: error.kind,
                    message: error.message.clone(),
                });
                if let Some(callback) = task.on_error.as_deref()
                    && !task.is_error_callback()
                {
                    self.dispatch_error_callback(&task, callback, &error, backlog)
                        .await;
                }
                self.after_failure(&task, error, backlog).await?;
            }
        }
        Ok(Disposition::Applied)
    }

    async fn after_success(
        &self,
        task: &TaskRecord,
        value: Value,
        backlog: &mut Backlog,
    ) -> Result<(), EngineError> {
        match task.parent {
            Parent::Chain { id, position } => {
                self.advance_chain(id, position, value, backlog).await
            }
            Parent::Group { id, index } => {
                self.report_member(id, index, MemberResult::Succeeded(value), backlog)
                    .await
            }
            Parent::Standalone => match task.trigger {
                Some(trigger) => self.enter_node(trigger, Some(value), backlog).await,
                None => Ok(()),
            },
        }
    }

    async fn after_failure(
        &self,
        task: &TaskRecord,
        error: ErrorDescriptor,
        backlog: &mut Backlog,
    ) -> Result<(), EngineError> {
        match task.parent {
            Parent::Chain { id, .. } => self.fail_chain(id, error, backlog).await,
            Parent::Group { id, index } => {
                self.report_member(id, index, MemberResult::Failed(error), backlog)
                    .await
            }
            // trigger stays PENDING
            Parent::Standalone => Ok(()),
        }
    }

    async fn advance_chain(
        &self,
        chain_id: ChainId,
        position: usize,
        value: Value,
        backlog: &mut Backlog,
    ) -> Result<(), EngineError> {
        let now = self.clock.now();
        let (step, chain) = self
            .graph
            .update_chain(chain_id, |chain| match chain.advance(position, &value, now) {
                ChainStep::Ignored => Edit::Skip((ChainStep::Ignored, chain.clone())),
                step => Edit::Commit((step, chain.clone())),
            })
            .await?;

        match step {
            ChainStep::Next(next) => {
                debug!(chain = %chain_id, next = %next, "chain advanced");
                self.schedule(next, Some(value), backlog).await?;
                Ok(())
            }
            ChainStep::Finished => self.chain_finished(chain, None, backlog).await,
            ChainStep::Ignored => {
                debug!(
                    chain = %chain_id,
                    position,
                    state = ?chain.state,
                    "stale chain step ignored"
                );
                Ok(())
            }
        }
    }

    async fn fail_chain(
        &self,
        chain_id: ChainId,
        error: ErrorDescriptor,
        backlog: &mut Backlog,
    ) -> Result<(), EngineError> {
        let now = self.clock.now();
        let failed = self
            .graph
            .update_chain(chain_id, |chain| {
                if chain.mark_failed(now) {
                    Edit::Commit(Some(chain.clone()))
                } else {
                    Edit::Skip(None)
                }
            })
            .await?;

        match failed {
            Some(chain) => self.chain_finished(chain, Some(error), backlog).await,
            None => Ok(()),
        }
    }

    /// A chain reached a terminal state: tell its group, start its trigger.
    async fn chain_finished(
        &self,
        chain: ChainRecord,
        failure: Option<ErrorDescriptor>,
        backlog: &mut Backlog,
    ) -> Result<(), EngineError> {
        info!(chain = %chain.id, state = ?chain.state, "chain finished");
        self.events.emit(&DomainEvent::ChainFinished {
            chain_id: chain.id,
            state: chain.state,
        });

        if let Parent::Group { id, index } = chain.parent {
            let result = match chain.state {
                FlowState::Succeeded => {
                    MemberResult::Succeeded(chain.result.clone().unwrap_or(Value::Null))
                }
                FlowState::Failed => MemberResult::Failed(failure.unwrap_or_else(|| {
                    ErrorDescriptor::new(FailureKind::Execution, "chain failed", Default::default())
                })),
                _ => MemberResult::Revoked,
            };
            self.report_member(id, index, result, backlog).await?;
        }

        if chain.state == FlowState::Succeeded
            && let Some(trigger) = chain.trigger
        {
            self.enter_node(trigger, chain.result.clone(), backlog)
                .await?;
        }
        Ok(())
    }

    /// Fill one barrier slot; fire the group when it was the last one.
    pub(crate) fn report_member<'a>(
        &'a self,
        group_id: GroupId,
        index: usize,
        result: MemberResult,
        backlog: &'a mut Backlog,
    ) -> BoxFuture<'a, Result<(), EngineError>> {
        Box::pin(async move {
            let now = self.clock.now();
            let fired = self
                .graph
                .update_group(group_id, |group| match group.record(index, result.clone(), now) {
                    BarrierStep::Duplicate => Edit::Skip(None),
                    BarrierStep::Recorded { remaining } => {
                        debug!(group = %group_id, index, remaining, "member recorded");
                        Edit::Commit(None)
                    }
                    BarrierStep::Fired(results) => Edit::Commit(Some((results, group.clone()))),
                })
                .await?;

            match fired {
                Some((results, group)) => self.barrier_fired(group, results, backlog).await,
                None => Ok(()),
            }
        })
    }

    async fn barrier_fired(
        &self,
        group: GroupRecord,
        results: Vec<MemberResult>,
        backlog: &mut Backlog,
    ) -> Result<(), EngineError> {
        info!(group = %group.id, state = ?group.state, members = results.len(), "barrier fired");
        self.events.emit(&DomainEvent::BarrierFired {
            group_id: group.id,
            state: group.state,
            members: results.len(),
        });

        if group.state != FlowState::Revoked
            && let Some(trigger) = group.trigger
        {
            let values = results.iter().map(MemberResult::to_value).collect();
            self.enter_node(trigger, Some(Value::Array(values)), backlog)
                .await?;
        }
        Ok(())
    }

    fn enter_node<'a>(
        &'a self,
        node: NodeId,
        previous: Option<Value>,
        backlog: &'a mut Backlog,
    ) -> BoxFuture<'a, Result<(), EngineError>> {
        Box::pin(async move {
            let now = self.clock.now();
            match node {
                NodeId::Task(id) => {
                    self.schedule(id, previous, backlog).await?;
                    Ok(())
                }
                NodeId::Chain(id) => {
                    let started = self
                        .graph
                        .update_chain(id, |chain| {
                            if chain.start(now) {
                                Edit::Commit(Some(chain.clone()))
                            } else {
                                Edit::Skip(None)
                            }
                        })
                        .await?;
                    let Some(chain) = started else {
                        debug!(chain = %id, "chain already started");
                        return Ok(());
                    };

                    match chain.current() {
                        Some(first) => {
                            self.schedule(first, previous, backlog).await?;
                            Ok(())
                        }
                        None => {
                            let finished = self
                                .graph
                                .update_chain(id, |chain| {
                                    if chain.finish_empty(now) {
                                        Edit::Commit(Some(chain.clone()))
                                    } else {
                                        Edit::Skip(None)
                                    }
                                })
                                .await?;
                            match finished {
                                Some(chain) => self.chain_finished(chain, None, backlog).await,
                                None => Ok(()),
                            }
                        }
                    }
                }
                NodeId::Group(id) => {
                    let started = self
                        .graph
                        .update_group(id, |group| match group.start(now) {
                            Some(step) => Edit::Commit(Some((step, group.clone()))),
                            None => Edit::Skip(None),
                        })
                        .await?;

                    match started {
                        None => {
                            debug!(group = %id, "group already started");
                            Ok(())
                        }
                        Some((BarrierStep::Fired(results), group)) => {
                            self.barrier_fired(group, results, backlog).await
                        }
                        Some((_, group)) => {
                            for member in group.members {
                                self.enter_node(member.into(), previous.clone(), backlog)
                                    .await?;
                            }
                            Ok(())
                        }
                    }
                }
            }
        })
    }

    /// Schedule and dispatch one task. An inline outcome is queued on
    /// `backlog`, not applied.
    async fn schedule(
        &self,
        task_id: TaskId,
        previous: Option<Value>,
        backlog: &mut Backlog,
    ) -> Result<DispatchReceipt, EngineError> {
        let task = self.graph.task(task_id).await?;
        if task.state != TaskState::Pending {
            debug!(node = %task_id, state = ?task.state, "not pending, dispatch suppressed");
            return Ok(DispatchReceipt::Suppressed);
        }

        let handler = match self.registry.resolve(&task.endpoint) {
            Ok(handler) => handler,
            Err(e) => {
                let error = ErrorDescriptor::configuration(e.to_string(), task.payload.clone());
                return Ok(self.reject(task_id, error, backlog));
            }
        };
        let payload = match inject(
            &task.endpoint,
            &task.payload,
            handler.signature(),
            previous.as_ref(),
        ) {
            Ok(payload) => payload,
            Err(e) => {
                let error = e.to_descriptor(task.payload.clone());
                return Ok(self.reject(task_id, error, backlog));
            }
        };

        let now = self.clock.now();
        let inline = self.dispatcher.is_inline();
        let scheduled = self
            .graph
            .update_task(task_id, |task| {
                if !task.mark_scheduled(payload.clone(), now) {
                    return Edit::Skip(None);
                }
                if inline {
                    task.mark_running(now);
                }
                Edit::Commit(Some(task.clone()))
            })
            .await?;
        let Some(task) = scheduled else {
            debug!(node = %task_id, "lost the race to schedule, dispatch suppressed");
            return Ok(DispatchReceipt::Suppressed);
        };

        match self.dispatcher.dispatch(&task, payload).await {
            Ok(Dispatched::Enqueued(message_id)) => {
                self.events.emit(&DomainEvent::TaskDispatched {
                    task_id,
                    endpoint: task.endpoint.clone(),
                    inline: false,
                });
                Ok(DispatchReceipt::Enqueued { message_id })
            }
            Ok(Dispatched::Completed(outcome)) => {
                self.events.emit(&DomainEvent::TaskDispatched {
                    task_id,
                    endpoint: task.endpoint.clone(),
                    inline: true,
                });
                backlog.push(task_id, outcome.clone());
                Ok(DispatchReceipt::Inline { outcome })
            }
            Err(e) => {
                let error =
                    ErrorDescriptor::dispatch(e.to_string(), task.original_payload().clone());
                Ok(self.reject(task_id, error, backlog))
            }
        }
    }

    fn reject(
        &self,
        task_id: TaskId,
        error: ErrorDescriptor,
        backlog: &mut Backlog,
    ) -> DispatchReceipt {
        error!(node = %task_id, kind = ?error.kind, error = %error.message, "dispatch failed");
        backlog.push(task_id, Outcome::failure(error.clone()));
        DispatchReceipt::Rejected { error }
    }

    /// Fire-and-forget: problems here are logged, never returned.
    async fn dispatch_error_callback(
        &self,
        failed: &TaskRecord,
        endpoint: &str,
        error: &ErrorDescriptor,
        backlog: &mut Backlog,
    ) {
        let callback_id = self.ids.task_id();
        let payload = match json!({
            "task_id": failed.id.to_string(),
            "task_name": failed.endpoint,
            "error": error.message,
            "payload": Value::Object(failed.original_payload().clone()),
        }) {
            Value::Object(map) => map,
            _ => Default::default(),
        };

        let mut callback = TaskRecord::new(
            callback_id,
            failed.root,
            endpoint,
            payload,
            Parent::Standalone,
            self.clock.now(),
        );
        callback.callback_for = Some(failed.id);

        if let Err(e) = self.graph.insert(callback.into()).await {
            warn!(
                node = %failed.id,
                callback = endpoint,
                error = %e,
                "could not record error callback"
            );
            return;
        }
        info!(node = %failed.id, callback = %callback_id, endpoint, "dispatching error callback");
        self.events.emit(&DomainEvent::ErrorCallbackDispatched {
            task_id: failed.id,
            callback_id,
            endpoint: endpoint.to_string(),
        });

        match self.schedule(callback_id, None, backlog).await {
            Ok(DispatchReceipt::Rejected { error }) => {
                warn!(
                    node = %failed.id,
                    callback = %callback_id,
                    error = %error.message,
                    "error callback rejected"
                );
            }
            Ok(_) => {}
            Err(e) => {
                warn!(
                    node = %failed.id,
                    callback = %callback_id,
                    error = %e,
                    "error callback dispatch failed"
                );
            }
        }
    }
}
