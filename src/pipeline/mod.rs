// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 gantry contributors

//! Pipeline definitions and dependency graph
//!
//! This module defines the configuration side of gantry: task definitions,
//! their declared parent dependencies, the validated dependency graph, and
//! registration-time validation.

mod definition;
mod graph;
mod validation;

pub use definition::{Pipeline, RequiredParentStatus, Task};
pub use graph::PipelineGraph;
pub use validation::{PipelineValidator, ValidationResult};
