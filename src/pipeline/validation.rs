// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 gantry contributors

//! Pipeline validation
//!
//! Validates a pipeline configuration before registration. A configuration
//! whose report contains errors is rejected whole; a version is never
//! partially committed.

use crate::errors::GantryError;
use crate::pipeline::{Pipeline, PipelineGraph, Task};

/// Pipeline validator
pub struct PipelineValidator;

impl PipelineValidator {
    /// Validate a pipeline configuration
    pub fn validate(pipeline: &Pipeline) -> ValidationResult {
        let mut result = ValidationResult::new();

        if pipeline.tasks.is_empty() {
            result.add_warning("Pipeline has no tasks; runs will complete immediately");
        }

        for (key, task) in &pipeline.tasks {
            if key != &task.id {
                result.add_error(&format!(
                    "Task map key '{}' does not match task id '{}'",
                    key, task.id
                ));
            }
            Self::validate_task(task, pipeline, &mut result);
        }

        // Graph construction checks unknown references and cycles
        match PipelineGraph::build(pipeline) {
            Ok(_) => {}
            Err(GantryError::DependencyCycle { from, to }) => {
                result.add_error(&format!(
                    "Circular dependency introduced by '{}' depending on '{}'",
                    from, to
                ));
            }
            Err(GantryError::TaskNotFound { task }) => {
                result.add_error(&format!("Dependency on unknown task '{}'", task));
            }
            Err(e) => {
                result.add_error(&format!("Graph validation error: {}", e));
            }
        }

        result
    }

    /// Validate the configuration and convert an error report into a failure
    pub fn validate_strict(pipeline: &Pipeline) -> Result<(), GantryError> {
        let result = Self::validate(pipeline);
        if result.is_valid() {
            Ok(())
        } else {
            Err(GantryError::InvalidPipeline {
                reason: result.errors.join("; "),
                help: Some("Fix the configuration and register it again".to_string()),
            })
        }
    }

    fn validate_task(task: &Task, pipeline: &Pipeline, result: &mut ValidationResult) {
        if task.id.is_empty() {
            result.add_error("Task id is empty");
        }

        if task.image.is_empty() {
            result.add_error(&format!("Task '{}': image is empty", task.id));
        }

        for parent in task.depends_on.keys() {
            if parent == &task.id {
                result.add_error(&format!("Task '{}' depends on itself", task.id));
            } else if pipeline.get_task(parent).is_none() {
                result.add_error(&format!(
                    "Task '{}' depends on unknown task '{}'",
                    task.id, parent
                ));
            }
        }
    }
}

/// Validation report: errors block registration, warnings do not
#[derive(Debug, Default)]
pub struct ValidationResult {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ValidationResult {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_error(&mut self, message: &str) {
        self.errors.push(message.to_string());
    }

    pub fn add_warning(&mut self, message: &str) {
        self.warnings.push(message.to_string());
    }

    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }
}
