// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 gantry contributors

//! # gantry - Pipeline Automation Core
//!
//! `gantry` validates pipeline dependency graphs and executes runs: each
//! task is dispatched only when its declared parents have reached an allowed
//! terminal status.
//!
//! ## Features
//!
//! - **Graph validation** - cycles and unknown references rejected at
//!   registration, never at run time
//! - **Dependency gating** - per-parent requirements (`any`, `success`,
//!   `failure`) with transitive skip propagation
//! - **Sequential run ids** - contiguous per-pipeline numbering, correct
//!   under concurrent run creation
//! - **Parallelism limits** - a ceiling on concurrent non-terminal runs
//! - **Cooperative cancellation** - waiting tasks settle immediately,
//!   in-flight tasks drain through the backend's stop signal
//! - **Crash recovery** - interrupted runs are discovered and resumed
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::collections::HashMap;
//! use std::sync::Arc;
//! use gantry::{Gantry, Initiator, Pipeline};
//! use gantry::storage::MemoryStore;
//!
//! # use gantry::executors::ExecutionBackend;
//! # async fn example(backend: Arc<dyn ExecutionBackend>) -> gantry::GantryResult<()> {
//! let service = Gantry::new(Arc::new(MemoryStore::new()), backend);
//!
//! let pipeline = Pipeline::from_yaml(r#"
//! id: release
//! name: Release pipeline
//! tasks:
//!   build:
//!     id: build
//!     image: builder:latest
//!   publish:
//!     id: publish
//!     image: publisher:latest
//!     depends_on:
//!       build: success
//! "#)?;
//!
//! service.register_pipeline(pipeline).await?;
//! let run = service
//!     .create_run("default", "release", HashMap::new(), Initiator::manual("me"))
//!     .await?;
//! # Ok(())
//! # }
//! ```

pub mod errors;
pub mod executors;
pub mod pipeline;
pub mod run;
pub mod service;
pub mod storage;

// Re-export commonly used types
pub use errors::{GantryError, GantryResult};
pub use pipeline::{Pipeline, PipelineGraph, PipelineValidator, RequiredParentStatus, Task};
pub use run::{
    DependencyDecision, DependencyPolicy, Initiator, Run, RunCoordinator, RunKey, RunRegistry,
    RunSequencer, RunState, RunStatus, TaskRun, TaskRunState, TaskRunStatus,
};
pub use service::Gantry;
pub use storage::{MemoryStore, Storage};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
