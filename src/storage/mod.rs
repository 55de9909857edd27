// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 gantry contributors

//! Storage collaborator
//!
//! The core persists pipeline versions, runs, and task runs through this
//! trait. Implementations must provide read-after-write consistency for the
//! caller's own writes and keep the `NotFound`/`EntityExists` distinction.
//! The per-pipeline run counter must increment atomically.

mod memory;

pub use memory::MemoryStore;

use async_trait::async_trait;

use crate::errors::GantryError;
use crate::pipeline::Pipeline;
use crate::run::{Run, RunKey, TaskRun};

/// Persistence seam for the orchestration core
#[async_trait]
pub trait Storage: Send + Sync {
    /// Store a new pipeline version; the latest version wins lookups
    async fn put_pipeline(&self, pipeline: &Pipeline) -> Result<(), GantryError>;

    /// Latest version of a pipeline
    async fn get_pipeline(&self, namespace: &str, id: &str) -> Result<Pipeline, GantryError>;

    /// A specific pipeline version
    async fn get_pipeline_version(
        &self,
        namespace: &str,
        id: &str,
        version: u64,
    ) -> Result<Pipeline, GantryError>;

    /// Atomically allocate the next run id for a pipeline, starting at 1
    async fn next_run_id(&self, namespace: &str, pipeline: &str) -> Result<u64, GantryError>;

    /// Create a run record; `EntityExists` if the key is taken
    async fn create_run(&self, run: &Run) -> Result<(), GantryError>;

    /// Overwrite a run record
    async fn update_run(&self, run: &Run) -> Result<(), GantryError>;

    async fn get_run(&self, key: &RunKey) -> Result<Run, GantryError>;

    /// All runs of a pipeline, ordered by run id
    async fn list_runs(&self, namespace: &str, pipeline: &str) -> Result<Vec<Run>, GantryError>;

    /// Every run still in a non-terminal state, across all pipelines
    ///
    /// Used by the recovery pass at process startup.
    async fn list_unfinished_runs(&self) -> Result<Vec<Run>, GantryError>;

    /// Create a task run record; `EntityExists` if the key is taken
    async fn create_task_run(&self, task_run: &TaskRun) -> Result<(), GantryError>;

    /// Overwrite a task run record
    async fn update_task_run(&self, task_run: &TaskRun) -> Result<(), GantryError>;

    async fn get_task_run(&self, key: &RunKey, task_id: &str) -> Result<TaskRun, GantryError>;

    /// All task runs belonging to a run, ordered by task id
    async fn list_task_runs(&self, key: &RunKey) -> Result<Vec<TaskRun>, GantryError>;
}
