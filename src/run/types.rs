// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 gantry contributors

//! Run and task-run records
//!
//! A `Run` is one execution instance of a pipeline version; a `TaskRun` is the
//! execution of a single task within it. Both carry a small state machine:
//! transitions are guarded, and nothing moves out of a `Complete` state.
//! Only the owning coordinator mutates a run and its task runs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

use crate::errors::GantryError;
use crate::pipeline::Task;

/// Identity of a run: (namespace, pipeline, sequential run id)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RunKey {
    pub namespace: String,
    pub pipeline: String,
    pub run_id: u64,
}

impl RunKey {
    pub fn new(namespace: &str, pipeline: &str, run_id: u64) -> Self {
        Self {
            namespace: namespace.to_string(),
            pipeline: pipeline.to_string(),
            run_id,
        }
    }
}

impl fmt::Display for RunKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.namespace, self.pipeline, self.run_id)
    }
}

/// What requested a run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Initiator {
    /// Kind of source: "trigger", "manual", "recovery", ...
    pub kind: String,
    /// Name of the specific source
    pub name: String,
    /// Free-form reason
    #[serde(default)]
    pub reason: Option<String>,
}

impl Initiator {
    pub fn manual(name: &str) -> Self {
        Self {
            kind: "manual".to_string(),
            name: name.to_string(),
            reason: None,
        }
    }
}

/// Lifecycle state of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunState {
    Pending,
    Running,
    Complete,
    Cancelled,
}

impl RunState {
    /// Terminal states never change again
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete | Self::Cancelled)
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Final outcome of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunStatus {
    Unknown,
    Successful,
    Failed,
    Cancelled,
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// One execution instance of a pipeline version
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Run {
    pub namespace: String,
    pub pipeline: String,
    pub pipeline_version: u64,
    pub run_id: u64,
    pub state: RunState,
    pub status: RunStatus,
    pub started: Option<DateTime<Utc>>,
    pub ended: Option<DateTime<Utc>>,
    /// Task ids in dispatch order
    pub task_runs: Vec<String>,
    pub initiator: Initiator,
    /// Run-level variables merged into every task's environment
    pub variables: HashMap<String, String>,
}

impl Run {
    pub fn new(
        key: &RunKey,
        pipeline_version: u64,
        initiator: Initiator,
        variables: HashMap<String, String>,
    ) -> Self {
        Self {
            namespace: key.namespace.clone(),
            pipeline: key.pipeline.clone(),
            pipeline_version,
            run_id: key.run_id,
            state: RunState::Pending,
            status: RunStatus::Unknown,
            started: None,
            ended: None,
            task_runs: Vec::new(),
            initiator,
            variables,
        }
    }

    pub fn key(&self) -> RunKey {
        RunKey::new(&self.namespace, &self.pipeline, self.run_id)
    }

    /// `Pending → Running`, stamping the start time
    pub fn mark_running(&mut self) -> Result<(), GantryError> {
        if self.state != RunState::Pending {
            return Err(self.invalid_transition(RunState::Running));
        }
        self.state = RunState::Running;
        self.started = Some(Utc::now());
        Ok(())
    }

    /// Move to a terminal state with the aggregate status
    pub fn mark_finished(&mut self, status: RunStatus) -> Result<(), GantryError> {
        if self.state.is_terminal() {
            return Err(self.invalid_transition(RunState::Complete));
        }
        self.state = if status == RunStatus::Cancelled {
            RunState::Cancelled
        } else {
            RunState::Complete
        };
        self.status = status;
        if self.started.is_none() {
            self.started = Some(Utc::now());
        }
        self.ended = Some(Utc::now());
        Ok(())
    }

    fn invalid_transition(&self, to: RunState) -> GantryError {
        GantryError::InvalidTransition {
            task: self.key().to_string(),
            from: self.state.to_string(),
            to: to.to_string(),
        }
    }
}

/// Lifecycle state of a task run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskRunState {
    Waiting,
    Scheduled,
    Running,
    Complete,
}

impl fmt::Display for TaskRunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Final outcome of a task run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TaskRunStatus {
    Unknown,
    Successful,
    Failed,
    Skipped,
    Cancelled,
}

impl TaskRunStatus {
    /// Statuses that count toward a successful run
    pub fn is_passing(&self) -> bool {
        matches!(self, Self::Successful | Self::Skipped)
    }
}

impl fmt::Display for TaskRunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Execution of a single task within a run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskRun {
    pub namespace: String,
    pub pipeline: String,
    pub run_id: u64,
    /// Frozen copy of the task definition this run executes
    pub task: Task,
    pub state: TaskRunState,
    pub status: TaskRunStatus,
    pub started: Option<DateTime<Utc>>,
    pub ended: Option<DateTime<Utc>>,
    pub exit_code: Option<i32>,
    /// Short reason recorded on failure, skip, or cancellation
    #[serde(default)]
    pub state_reason: Option<String>,
}

impl TaskRun {
    pub fn new(run_key: &RunKey, task: Task) -> Self {
        Self {
            namespace: run_key.namespace.clone(),
            pipeline: run_key.pipeline.clone(),
            run_id: run_key.run_id,
            task,
            state: TaskRunState::Waiting,
            status: TaskRunStatus::Unknown,
            started: None,
            ended: None,
            exit_code: None,
            state_reason: None,
        }
    }

    pub fn task_id(&self) -> &str {
        &self.task.id
    }

    /// Terminal once `Complete`; the recorded status never changes after
    pub fn is_terminal(&self) -> bool {
        self.state == TaskRunState::Complete
    }

    /// `Waiting → Scheduled`, recording the dispatch request time
    pub fn mark_scheduled(&mut self) -> Result<(), GantryError> {
        if self.state != TaskRunState::Waiting {
            return Err(self.invalid_transition(TaskRunState::Scheduled));
        }
        self.state = TaskRunState::Scheduled;
        self.started = Some(Utc::now());
        Ok(())
    }

    /// `Scheduled → Running`, on confirmation from the execution backend
    pub fn mark_running(&mut self) -> Result<(), GantryError> {
        if self.state != TaskRunState::Scheduled {
            return Err(self.invalid_transition(TaskRunState::Running));
        }
        self.state = TaskRunState::Running;
        Ok(())
    }

    /// Any non-terminal state → `Complete` with a final status
    ///
    /// Also covers the `Waiting → Complete(Skipped)` shortcut taken when a
    /// parent requirement can no longer be satisfied.
    pub fn mark_complete(
        &mut self,
        status: TaskRunStatus,
        exit_code: Option<i32>,
        reason: Option<String>,
    ) -> Result<(), GantryError> {
        if self.is_terminal() {
            return Err(self.invalid_transition(TaskRunState::Complete));
        }
        self.state = TaskRunState::Complete;
        self.status = status;
        self.exit_code = exit_code;
        self.state_reason = reason;
        self.ended = Some(Utc::now());
        Ok(())
    }

    fn invalid_transition(&self, to: TaskRunState) -> GantryError {
        GantryError::InvalidTransition {
            task: self.task.id.clone(),
            from: self.state.to_string(),
            to: to.to_string(),
        }
    }
}
