// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 gantry contributors

//! Run coordinator
//!
//! Drives a single run from start to terminal state: computes the initial
//! schedulable set from the dependency graph, dispatches task runs, observes
//! completions, and re-evaluates dependents until nothing is waiting or in
//! flight. One coordinator owns one run; it is the only writer of the run
//! and its task runs while its registry claim exists.
//!
//! Re-evaluation is an explicit work queue: a terminal transition enqueues
//! only the finished task's dependents, never a full rescan.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::errors::GantryResult;
use crate::executors::{DispatchRequest, ExecutionBackend, TaskCompletion};
use crate::pipeline::{Pipeline, PipelineGraph};
use crate::run::{
    DependencyDecision, DependencyPolicy, Run, RunRegistry, RunState, RunStatus, TaskRun,
    TaskRunStatus,
};
use crate::storage::Storage;

/// Coordinates the lifecycle of one run
pub struct RunCoordinator {
    storage: Arc<dyn Storage>,
    backend: Arc<dyn ExecutionBackend>,
    registry: Arc<RunRegistry>,
    pipeline: Pipeline,
    graph: PipelineGraph,
    run: Run,
    cancel: CancellationToken,
}

/// Mutable scheduling state while a run is in progress
struct Scheduling {
    waiting: HashSet<String>,
    inflight: HashSet<String>,
    /// Terminal statuses observed so far, keyed by task id
    terminal: HashMap<String, TaskRunStatus>,
    cancelled: bool,
}

impl RunCoordinator {
    /// Build a coordinator for a run of `pipeline`
    ///
    /// The graph is rebuilt (and therefore re-validated) from the stored
    /// pipeline version; a definition that no longer validates fails here.
    pub fn new(
        storage: Arc<dyn Storage>,
        backend: Arc<dyn ExecutionBackend>,
        registry: Arc<RunRegistry>,
        pipeline: Pipeline,
        run: Run,
    ) -> GantryResult<Self> {
        let graph = PipelineGraph::build(&pipeline)?;
        Ok(Self {
            storage,
            backend,
            registry,
            pipeline,
            graph,
            run,
            cancel: CancellationToken::new(),
        })
    }

    /// The cancellation token registered for this run
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Drive the run to a terminal state
    ///
    /// Claims the run in the registry first; a duplicate claim fails with
    /// `RunAlreadyClaimed`. The claim is released on completion, but kept in
    /// place when storage fails mid-run so a recovery pass can find the run.
    pub async fn execute(mut self) -> GantryResult<Run> {
        let key = self.run.key();
        self.registry.register(key.clone(), self.cancel.clone())?;

        let result = self.drive().await;

        match &result {
            Err(e) if e.is_storage_failure() => {
                warn!(run = %key, error = %e, "storage failure; keeping registry claim for recovery");
            }
            _ => self.registry.unregister(&key),
        }

        result
    }

    async fn drive(&mut self) -> GantryResult<Run> {
        let key = self.run.key();
        info!(run = %key, version = self.pipeline.version, "coordinating run");

        // The run may have been settled between creation and claim, e.g. an
        // out-of-band cancellation of a not-yet-claimed run.
        self.run = self.storage.get_run(&key).await?;
        if self.run.state.is_terminal() {
            info!(run = %key, "run already terminal, nothing to coordinate");
            return Ok(self.run.clone());
        }

        let mut state = self.recover_task_state().await?;

        if self.run.state == RunState::Pending {
            if state.waiting.is_empty() && state.inflight.is_empty() {
                // Zero tasks: straight to a successful completion.
                self.run.mark_finished(RunStatus::Successful)?;
                self.storage.update_run(&self.run).await?;
                info!(run = %key, "run complete with no tasks");
                return Ok(self.run.clone());
            }
            self.run.mark_running()?;
            self.storage.update_run(&self.run).await?;
        }

        let (completions, mut completion_rx) = mpsc::unbounded_channel::<TaskCompletion>();
        let cancel = self.cancel.clone();

        // Initial schedulable set: every task evaluated once up front.
        let initial: VecDeque<String> = state.waiting.iter().cloned().collect();
        self.process_queue(initial, &mut state, &completions).await?;

        while !state.waiting.is_empty() || !state.inflight.is_empty() {
            tokio::select! {
                Some(completion) = completion_rx.recv() => {
                    self.handle_completion(completion, &mut state, &completions).await?;
                }
                _ = cancel.cancelled(), if !state.cancelled => {
                    self.handle_cancellation(&mut state).await?;
                }
            }
        }

        let status = self.aggregate_status(&state);
        self.run.mark_finished(status)?;
        self.storage.update_run(&self.run).await?;
        info!(run = %key, status = %status, "run finished");

        Ok(self.run.clone())
    }

    /// Seed scheduling state from any task runs already recorded
    ///
    /// On a fresh run there are none and every task starts waiting. On
    /// resume, terminal task runs keep their status; task runs that were
    /// dispatched by a previous process are marked failed, since their
    /// completions can no longer be delivered.
    async fn recover_task_state(&mut self) -> GantryResult<Scheduling> {
        let key = self.run.key();
        let existing = self.storage.list_task_runs(&key).await?;

        let mut state = Scheduling {
            waiting: self.graph.task_ids().into_iter().collect(),
            inflight: HashSet::new(),
            terminal: HashMap::new(),
            cancelled: false,
        };

        for mut task_run in existing {
            let id = task_run.task_id().to_string();
            state.waiting.remove(&id);

            if task_run.is_terminal() {
                state.terminal.insert(id, task_run.status);
                continue;
            }

            task_run.mark_complete(
                TaskRunStatus::Failed,
                None,
                Some("dispatch orphaned by coordinator restart".to_string()),
            )?;
            self.storage.update_task_run(&task_run).await?;
            warn!(run = %key, task = %id, "orphaned task run marked failed");
            state.terminal.insert(id, TaskRunStatus::Failed);
        }

        Ok(state)
    }

    /// Re-evaluate waiting tasks until the queue drains
    ///
    /// Each terminal transition inside (skip or dispatch rejection) pushes
    /// the affected task's dependents, so transitive unlocking and skipping
    /// reach a fixpoint without rescanning the whole waiting set.
    async fn process_queue(
        &mut self,
        mut queue: VecDeque<String>,
        state: &mut Scheduling,
        completions: &mpsc::UnboundedSender<TaskCompletion>,
    ) -> GantryResult<()> {
        while let Some(id) = queue.pop_front() {
            if !state.waiting.contains(&id) {
                continue;
            }

            let task = &self.pipeline.tasks[&id];
            match DependencyPolicy::evaluate(task, &state.terminal) {
                DependencyDecision::Waiting => {}
                DependencyDecision::Ready => {
                    state.waiting.remove(&id);
                    debug!(task = %id, "dependencies satisfied, dispatching");
                    self.dispatch(&id, state, completions, &mut queue).await?;
                }
                DependencyDecision::Skip => {
                    state.waiting.remove(&id);
                    debug!(task = %id, "parent requirement violated, skipping");
                    self.record_unstarted(
                        &id,
                        TaskRunStatus::Skipped,
                        "parent requirement not met",
                    )
                    .await?;
                    state.terminal.insert(id.clone(), TaskRunStatus::Skipped);
                    self.enqueue_dependents(&id, &mut queue)?;
                }
            }
        }

        Ok(())
    }

    /// Create a task run and hand it to the execution backend
    ///
    /// A backend rejection is not fatal to the run: the task run is recorded
    /// `Failed` and dependency propagation continues as for any failure.
    async fn dispatch(
        &mut self,
        id: &str,
        state: &mut Scheduling,
        completions: &mpsc::UnboundedSender<TaskCompletion>,
        queue: &mut VecDeque<String>,
    ) -> GantryResult<()> {
        let key = self.run.key();
        let task = self.pipeline.tasks[id].clone();

        let mut task_run = TaskRun::new(&key, task);
        task_run.mark_scheduled()?;
        self.storage.create_task_run(&task_run).await?;
        self.run.task_runs.push(id.to_string());
        self.storage.update_run(&self.run).await?;

        let request = DispatchRequest {
            task_run: task_run.clone(),
            variables: DispatchRequest::merged_variables(&task_run, &self.run.variables),
            completions: completions.clone(),
            cancel: self.cancel.clone(),
        };

        match self.backend.dispatch(request).await {
            Ok(()) => {
                // Dispatch confirmation from the backend.
                task_run.mark_running()?;
                self.storage.update_task_run(&task_run).await?;
                state.inflight.insert(id.to_string());
            }
            Err(e) => {
                warn!(run = %key, task = %id, error = %e, "backend rejected dispatch");
                task_run.mark_complete(TaskRunStatus::Failed, None, Some(e.to_string()))?;
                self.storage.update_task_run(&task_run).await?;
                state.terminal.insert(id.to_string(), TaskRunStatus::Failed);
                self.enqueue_dependents(id, queue)?;
            }
        }

        Ok(())
    }

    /// Record a terminal outcome delivered by the backend
    async fn handle_completion(
        &mut self,
        completion: TaskCompletion,
        state: &mut Scheduling,
        completions: &mpsc::UnboundedSender<TaskCompletion>,
    ) -> GantryResult<()> {
        let key = self.run.key();
        let id = completion.task_id.clone();

        if !state.inflight.remove(&id) {
            // Late or duplicate completion. The first terminal status stands.
            debug!(run = %key, task = %id, "ignoring completion for non-inflight task");
            return Ok(());
        }

        let mut task_run = self.storage.get_task_run(&key, &id).await?;
        task_run.mark_complete(completion.status, completion.exit_code, None)?;
        self.storage.update_task_run(&task_run).await?;
        debug!(run = %key, task = %id, status = %completion.status, "task run terminal");

        state.terminal.insert(id.clone(), completion.status);

        if !state.cancelled {
            let mut queue = VecDeque::new();
            self.enqueue_dependents(&id, &mut queue)?;
            self.process_queue(queue, state, completions).await?;
        }

        Ok(())
    }

    /// Cancel everything still waiting; in-flight tasks drain on their own
    ///
    /// The cancellation token doubles as the stop signal to the backend, so
    /// in-flight task runs are expected to report terminal (usually
    /// `Cancelled`) through the normal completion channel.
    async fn handle_cancellation(&mut self, state: &mut Scheduling) -> GantryResult<()> {
        let key = self.run.key();
        info!(run = %key, inflight = state.inflight.len(), "run cancelled");
        state.cancelled = true;

        let waiting: Vec<String> = state.waiting.drain().collect();
        for id in waiting {
            self.record_unstarted(&id, TaskRunStatus::Cancelled, "run cancelled")
                .await?;
            state.terminal.insert(id, TaskRunStatus::Cancelled);
        }

        Ok(())
    }

    /// Write a terminal task run for a task that never dispatched
    async fn record_unstarted(
        &mut self,
        id: &str,
        status: TaskRunStatus,
        reason: &str,
    ) -> GantryResult<()> {
        let key = self.run.key();
        let task = self.pipeline.tasks[id].clone();

        let mut task_run = TaskRun::new(&key, task);
        task_run.mark_complete(status, None, Some(reason.to_string()))?;
        self.storage.create_task_run(&task_run).await?;
        self.run.task_runs.push(id.to_string());
        self.storage.update_run(&self.run).await?;
        Ok(())
    }

    fn enqueue_dependents(&self, id: &str, queue: &mut VecDeque<String>) -> GantryResult<()> {
        for dependent in self.graph.dependents(id)? {
            queue.push_back(dependent);
        }
        Ok(())
    }

    /// `Successful` iff every task run passed or was skipped
    fn aggregate_status(&self, state: &Scheduling) -> RunStatus {
        if state.cancelled {
            return RunStatus::Cancelled;
        }
        if state.terminal.values().all(TaskRunStatus::is_passing) {
            RunStatus::Successful
        } else {
            RunStatus::Failed
        }
    }
}
