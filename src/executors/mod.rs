// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 gantry contributors

//! Execution backend seam
//!
//! The coordinator hands task runs to an `ExecutionBackend` and receives
//! terminal outcomes back on a completion channel. How the workload actually
//! runs (container, process, remote worker) is the backend's concern; the
//! core only decides what to dispatch and when.

use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::errors::GantryError;
use crate::run::{TaskRun, TaskRunStatus};

/// Terminal outcome reported by the backend for one task run
#[derive(Debug, Clone)]
pub struct TaskCompletion {
    pub task_id: String,
    pub status: TaskRunStatus,
    pub exit_code: Option<i32>,
}

/// Everything a backend needs to execute one task run
pub struct DispatchRequest {
    /// The task run to execute, already marked `Scheduled`
    pub task_run: TaskRun,

    /// Run-level variables merged over the task's own (task wins)
    pub variables: HashMap<String, String>,

    /// Where the backend must deliver exactly one terminal completion
    pub completions: mpsc::UnboundedSender<TaskCompletion>,

    /// Cooperative stop signal for the run; a cancelled workload should
    /// report `Cancelled` on the completion channel
    pub cancel: CancellationToken,
}

impl DispatchRequest {
    /// Task variables layered over run variables
    pub fn merged_variables(task_run: &TaskRun, run_variables: &HashMap<String, String>) -> HashMap<String, String> {
        let mut merged = run_variables.clone();
        merged.extend(task_run.task.variables.clone());
        merged
    }
}

/// Trait for workload execution backends
///
/// `dispatch` returning an error means the workload could not even be
/// started; the coordinator records the task run as `Failed` and continues.
/// After a successful dispatch the backend owns delivering one completion.
#[async_trait]
pub trait ExecutionBackend: Send + Sync {
    async fn dispatch(&self, request: DispatchRequest) -> Result<(), GantryError>;
}
