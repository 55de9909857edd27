// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 gantry contributors

//! Error types for pipeline registration and run execution
//!
//! Errors that a caller can resolve by retrying (another worker holds a
//! claim, a parallelism slot is occupied) report `is_retryable() == true`;
//! everything else needs the configuration or the request to change.

use miette::Diagnostic;
use thiserror::Error;

/// Result type for gantry operations
pub type GantryResult<T> = Result<T, GantryError>;

/// Main error type for gantry
#[derive(Error, Debug, Diagnostic)]
pub enum GantryError {
    // ─────────────────────────────────────────────────────────────────────────
    // Graph Errors
    // ─────────────────────────────────────────────────────────────────────────
    #[error("Task '{from}' cannot depend on '{to}': the edge would close a cycle")]
    #[diagnostic(
        code(gantry::dependency_cycle),
        help("Review the depends_on entries of the tasks involved and remove the cycle")
    )]
    DependencyCycle { from: String, to: String },

    #[error("Task '{task}' is declared more than once")]
    #[diagnostic(code(gantry::duplicate_task))]
    DuplicateTask { task: String },

    #[error("Task '{task}' not found")]
    #[diagnostic(code(gantry::task_not_found))]
    TaskNotFound { task: String },

    // ─────────────────────────────────────────────────────────────────────────
    // Pipeline Errors
    // ─────────────────────────────────────────────────────────────────────────
    #[error("Invalid pipeline configuration: {reason}")]
    #[diagnostic(code(gantry::invalid_pipeline))]
    InvalidPipeline {
        reason: String,
        #[help]
        help: Option<String>,
    },

    #[error("Pipeline '{namespace}/{pipeline}' not found")]
    #[diagnostic(code(gantry::pipeline_not_found))]
    PipelineNotFound { namespace: String, pipeline: String },

    // ─────────────────────────────────────────────────────────────────────────
    // Run Errors
    // ─────────────────────────────────────────────────────────────────────────
    #[error("Run {namespace}/{pipeline}/{run_id} is already claimed by another coordinator")]
    #[diagnostic(
        code(gantry::run_already_claimed),
        help("Another worker is driving this run; retry after it finishes or crashes")
    )]
    RunAlreadyClaimed {
        namespace: String,
        pipeline: String,
        run_id: u64,
    },

    #[error("Pipeline '{pipeline}' is at its parallelism limit of {limit}")]
    #[diagnostic(
        code(gantry::parallelism_exceeded),
        help("Wait for an active run to finish, or raise the pipeline's parallelism setting")
    )]
    ParallelismExceeded { pipeline: String, limit: u64 },

    #[error("Run {namespace}/{pipeline}/{run_id} not found")]
    #[diagnostic(code(gantry::run_not_found))]
    RunNotFound {
        namespace: String,
        pipeline: String,
        run_id: u64,
    },

    #[error("Task run '{task}' not found for run {run_id}")]
    #[diagnostic(code(gantry::task_run_not_found))]
    TaskRunNotFound { task: String, run_id: u64 },

    #[error("Task '{task}' cannot move from {from} to {to}")]
    #[diagnostic(code(gantry::invalid_transition))]
    InvalidTransition {
        task: String,
        from: String,
        to: String,
    },

    #[error("Failed to dispatch task '{task}': {reason}")]
    #[diagnostic(code(gantry::dispatch_failed))]
    Dispatch { task: String, reason: String },

    // ─────────────────────────────────────────────────────────────────────────
    // Storage Errors
    // ─────────────────────────────────────────────────────────────────────────
    #[error("Entity already exists: {entity}")]
    #[diagnostic(code(gantry::entity_exists))]
    EntityExists { entity: String },

    #[error("Storage error: {message}")]
    #[diagnostic(code(gantry::storage))]
    Storage { message: String },

    // ─────────────────────────────────────────────────────────────────────────
    // Config / IO Errors
    // ─────────────────────────────────────────────────────────────────────────
    #[error("YAML error: {0}")]
    #[diagnostic(code(gantry::yaml))]
    Yaml(#[from] serde_yaml::Error),

    #[error("IO error: {0}")]
    #[diagnostic(code(gantry::io))]
    Io(#[from] std::io::Error),
}

impl GantryError {
    /// True when the same request can simply be retried later
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            GantryError::RunAlreadyClaimed { .. } | GantryError::ParallelismExceeded { .. }
        )
    }

    /// True when the error was surfaced by the storage collaborator
    ///
    /// Covers the generic `Storage` variant real backends map their driver
    /// errors into, plus the lookup and uniqueness variants the storage
    /// trait itself reports.
    pub fn is_storage_failure(&self) -> bool {
        matches!(
            self,
            GantryError::Storage { .. }
                | GantryError::EntityExists { .. }
                | GantryError::PipelineNotFound { .. }
                | GantryError::RunNotFound { .. }
                | GantryError::TaskRunNotFound { .. }
        )
    }
}
