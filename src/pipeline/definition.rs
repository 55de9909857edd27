// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 gantry contributors

//! Pipeline definition structures
//!
//! Defines the schema for pipeline configuration files: a set of tasks with
//! declared parent dependencies. A registered pipeline version is immutable.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::errors::GantryError;

/// Status a parent task must reach before a dependent may run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequiredParentStatus {
    /// Parent only needs to reach any terminal status
    Any,
    /// Parent must finish `Successful`
    Success,
    /// Parent must finish `Failed`
    Failure,
}

/// A single task within a pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    /// Task id (must be unique within a pipeline version)
    pub id: String,

    /// Task description
    #[serde(default)]
    pub description: Option<String>,

    /// Execution descriptor handed to the backend, opaque to the core
    pub image: String,

    /// Environment variables for this task
    #[serde(default)]
    pub variables: HashMap<String, String>,

    /// Parent task id → status the parent must reach
    #[serde(default)]
    pub depends_on: HashMap<String, RequiredParentStatus>,
}

/// Pipeline definition
///
/// Registration assigns `version`; every registration of the same pipeline id
/// produces a fresh, fully validated version. Tasks are never mutated in place.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pipeline {
    /// Namespace the pipeline belongs to
    #[serde(default = "default_namespace")]
    pub namespace: String,

    /// Pipeline id (unique within namespace)
    pub id: String,

    /// Human-readable name
    pub name: String,

    /// Pipeline description
    #[serde(default)]
    pub description: Option<String>,

    /// Configuration version, assigned at registration
    #[serde(default)]
    pub version: u64,

    /// Maximum concurrent non-terminal runs; zero means unlimited
    #[serde(default)]
    pub parallelism: u64,

    /// Tasks keyed by id
    pub tasks: HashMap<String, Task>,
}

fn default_namespace() -> String {
    "default".to_string()
}

impl Pipeline {
    /// Load a pipeline definition from a YAML file
    pub fn from_file(path: &std::path::Path) -> Result<Self, GantryError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse a pipeline definition from a YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self, GantryError> {
        serde_yaml::from_str(yaml).map_err(Into::into)
    }

    /// Serialize the definition to YAML
    pub fn to_yaml(&self) -> Result<String, GantryError> {
        serde_yaml::to_string(self).map_err(Into::into)
    }

    /// Get a task by id
    pub fn get_task(&self, id: &str) -> Option<&Task> {
        self.tasks.get(id)
    }

    /// All task ids, sorted for deterministic iteration
    pub fn task_ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.tasks.keys().map(String::as_str).collect();
        ids.sort_unstable();
        ids
    }
}
