// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 gantry contributors

//! In-memory storage
//!
//! Reference `Storage` implementation backed by `RwLock`-guarded maps.
//! Suitable for tests and single-process deployments; a durable store plugs
//! in behind the same trait.

use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

use crate::errors::GantryError;
use crate::pipeline::Pipeline;
use crate::run::{Run, RunKey, TaskRun};
use crate::storage::Storage;

type PipelineKey = (String, String);

#[derive(Default)]
struct State {
    /// (namespace, pipeline) → versions, ascending
    pipelines: HashMap<PipelineKey, Vec<Pipeline>>,
    /// (namespace, pipeline) → last allocated run id
    run_counters: HashMap<PipelineKey, u64>,
    runs: HashMap<RunKey, Run>,
    /// (run key, task id) → task run
    task_runs: HashMap<(RunKey, String), TaskRun>,
}

/// In-memory `Storage` implementation
#[derive(Default)]
pub struct MemoryStore {
    state: RwLock<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Storage for MemoryStore {
    async fn put_pipeline(&self, pipeline: &Pipeline) -> Result<(), GantryError> {
        let key = (pipeline.namespace.clone(), pipeline.id.clone());
        let mut state = self.state.write().await;
        let versions = state.pipelines.entry(key).or_default();

        if versions.iter().any(|p| p.version == pipeline.version) {
            return Err(GantryError::EntityExists {
                entity: format!(
                    "pipeline {}/{} version {}",
                    pipeline.namespace, pipeline.id, pipeline.version
                ),
            });
        }

        versions.push(pipeline.clone());
        versions.sort_by_key(|p| p.version);
        Ok(())
    }

    async fn get_pipeline(&self, namespace: &str, id: &str) -> Result<Pipeline, GantryError> {
        let state = self.state.read().await;
        state
            .pipelines
            .get(&(namespace.to_string(), id.to_string()))
            .and_then(|versions| versions.last().cloned())
            .ok_or_else(|| GantryError::PipelineNotFound {
                namespace: namespace.to_string(),
                pipeline: id.to_string(),
            })
    }

    async fn get_pipeline_version(
        &self,
        namespace: &str,
        id: &str,
        version: u64,
    ) -> Result<Pipeline, GantryError> {
        let state = self.state.read().await;
        state
            .pipelines
            .get(&(namespace.to_string(), id.to_string()))
            .and_then(|versions| versions.iter().find(|p| p.version == version).cloned())
            .ok_or_else(|| GantryError::PipelineNotFound {
                namespace: namespace.to_string(),
                pipeline: id.to_string(),
            })
    }

    async fn next_run_id(&self, namespace: &str, pipeline: &str) -> Result<u64, GantryError> {
        let mut state = self.state.write().await;

        // One more than the max existing run id, even for runs created out of
        // band (resume after restart).
        let max_existing = state
            .runs
            .keys()
            .filter(|k| k.namespace == namespace && k.pipeline == pipeline)
            .map(|k| k.run_id)
            .max()
            .unwrap_or(0);

        let counter = state
            .run_counters
            .entry((namespace.to_string(), pipeline.to_string()))
            .or_insert(0);
        *counter = (*counter).max(max_existing) + 1;
        Ok(*counter)
    }

    async fn create_run(&self, run: &Run) -> Result<(), GantryError> {
        let key = run.key();
        let mut state = self.state.write().await;
        if state.runs.contains_key(&key) {
            return Err(GantryError::EntityExists {
                entity: format!("run {}", key),
            });
        }
        state.runs.insert(key, run.clone());
        Ok(())
    }

    async fn update_run(&self, run: &Run) -> Result<(), GantryError> {
        let key = run.key();
        let mut state = self.state.write().await;
        if !state.runs.contains_key(&key) {
            return Err(GantryError::RunNotFound {
                namespace: run.namespace.clone(),
                pipeline: run.pipeline.clone(),
                run_id: run.run_id,
            });
        }
        state.runs.insert(key, run.clone());
        Ok(())
    }

    async fn get_run(&self, key: &RunKey) -> Result<Run, GantryError> {
        let state = self.state.read().await;
        state.runs.get(key).cloned().ok_or_else(|| GantryError::RunNotFound {
            namespace: key.namespace.clone(),
            pipeline: key.pipeline.clone(),
            run_id: key.run_id,
        })
    }

    async fn list_runs(&self, namespace: &str, pipeline: &str) -> Result<Vec<Run>, GantryError> {
        let state = self.state.read().await;
        let mut runs: Vec<Run> = state
            .runs
            .values()
            .filter(|r| r.namespace == namespace && r.pipeline == pipeline)
            .cloned()
            .collect();
        runs.sort_by_key(|r| r.run_id);
        Ok(runs)
    }

    async fn list_unfinished_runs(&self) -> Result<Vec<Run>, GantryError> {
        let state = self.state.read().await;
        let mut runs: Vec<Run> = state
            .runs
            .values()
            .filter(|r| !r.state.is_terminal())
            .cloned()
            .collect();
        runs.sort_by(|a, b| a.key().to_string().cmp(&b.key().to_string()));
        Ok(runs)
    }

    async fn create_task_run(&self, task_run: &TaskRun) -> Result<(), GantryError> {
        let run_key = RunKey::new(&task_run.namespace, &task_run.pipeline, task_run.run_id);
        let key = (run_key, task_run.task.id.clone());
        let mut state = self.state.write().await;
        if state.task_runs.contains_key(&key) {
            return Err(GantryError::EntityExists {
                entity: format!("task run {}/{}", key.0, key.1),
            });
        }
        state.task_runs.insert(key, task_run.clone());
        Ok(())
    }

    async fn update_task_run(&self, task_run: &TaskRun) -> Result<(), GantryError> {
        let run_key = RunKey::new(&task_run.namespace, &task_run.pipeline, task_run.run_id);
        let key = (run_key, task_run.task.id.clone());
        let mut state = self.state.write().await;
        if !state.task_runs.contains_key(&key) {
            return Err(GantryError::TaskRunNotFound {
                task: task_run.task.id.clone(),
                run_id: task_run.run_id,
            });
        }
        state.task_runs.insert(key, task_run.clone());
        Ok(())
    }

    async fn get_task_run(&self, key: &RunKey, task_id: &str) -> Result<TaskRun, GantryError> {
        let state = self.state.read().await;
        state
            .task_runs
            .get(&(key.clone(), task_id.to_string()))
            .cloned()
            .ok_or_else(|| GantryError::TaskRunNotFound {
                task: task_id.to_string(),
                run_id: key.run_id,
            })
    }

    async fn list_task_runs(&self, key: &RunKey) -> Result<Vec<TaskRun>, GantryError> {
        let state = self.state.read().await;
        let mut task_runs: Vec<TaskRun> = state
            .task_runs
            .iter()
            .filter(|(k, _)| &k.0 == key)
            .map(|(_, tr)| tr.clone())
            .collect();
        task_runs.sort_by(|a, b| a.task.id.cmp(&b.task.id));
        Ok(task_runs)
    }
}
