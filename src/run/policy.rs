// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 gantry contributors

//! Dependency policy
//!
//! Decides, from the terminal statuses of a task's parents, whether the task
//! is ready to run, must keep waiting, or must be skipped. A `Skip` decision
//! is terminal and never revisited.

use std::collections::HashMap;

use crate::pipeline::{RequiredParentStatus, Task};
use crate::run::TaskRunStatus;

/// Outcome of evaluating a task's parent requirements
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DependencyDecision {
    /// Every parent requirement is satisfied
    Ready,
    /// At least one parent has not reached a terminal status yet
    Waiting,
    /// A now-terminal parent violates its requirement; the task never runs
    Skip,
}

/// Stateless evaluator for parent-status requirements
pub struct DependencyPolicy;

impl DependencyPolicy {
    /// Evaluate a task against the terminal parent statuses observed so far
    ///
    /// `parent_statuses` holds only parents that have already reached a
    /// terminal status. A task with no dependencies is immediately `Ready`.
    pub fn evaluate(
        task: &Task,
        parent_statuses: &HashMap<String, TaskRunStatus>,
    ) -> DependencyDecision {
        let mut violated = false;

        for (parent, requirement) in &task.depends_on {
            let Some(status) = parent_statuses.get(parent) else {
                return DependencyDecision::Waiting;
            };

            let satisfied = match requirement {
                RequiredParentStatus::Any => true,
                RequiredParentStatus::Success => *status == TaskRunStatus::Successful,
                RequiredParentStatus::Failure => *status == TaskRunStatus::Failed,
            };

            if !satisfied {
                violated = true;
            }
        }

        if violated {
            DependencyDecision::Skip
        } else {
            DependencyDecision::Ready
        }
    }
}
