// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 gantry contributors

//! Run execution
//!
//! Everything that happens after a pipeline is registered: run sequencing,
//! the per-run coordinator, dependency gating, the run registry, and the run
//! and task-run records themselves.

mod coordinator;
mod policy;
mod registry;
mod sequencer;
mod types;

pub use coordinator::RunCoordinator;
pub use policy::{DependencyDecision, DependencyPolicy};
pub use registry::RunRegistry;
pub use sequencer::RunSequencer;
pub use types::{
    Initiator, Run, RunKey, RunState, RunStatus, TaskRun, TaskRunState, TaskRunStatus,
};
