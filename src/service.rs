// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 gantry contributors

//! Service facade
//!
//! `Gantry` is the in-process surface consumed by the API layer and by
//! triggers: pipeline registration, run creation, queries, cancellation, and
//! recovery of runs interrupted by a process restart. Each created run gets
//! its own coordinator task.

use std::collections::HashMap;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::errors::{GantryError, GantryResult};
use crate::executors::ExecutionBackend;
use crate::pipeline::{Pipeline, PipelineValidator};
use crate::run::{
    Initiator, Run, RunCoordinator, RunKey, RunRegistry, RunSequencer, RunStatus, TaskRun,
    TaskRunStatus,
};
use crate::storage::Storage;

/// Pipeline-automation service core
pub struct Gantry {
    storage: Arc<dyn Storage>,
    backend: Arc<dyn ExecutionBackend>,
    registry: Arc<RunRegistry>,
    sequencer: Arc<RunSequencer>,
}

impl Gantry {
    pub fn new(storage: Arc<dyn Storage>, backend: Arc<dyn ExecutionBackend>) -> Self {
        let sequencer = Arc::new(RunSequencer::new(storage.clone()));
        Self {
            storage,
            backend,
            registry: Arc::new(RunRegistry::new()),
            sequencer,
        }
    }

    /// Runs currently claimed by a coordinator in this process
    pub fn active_runs(&self) -> Vec<RunKey> {
        self.registry.list()
    }

    /// Validate and register a pipeline configuration
    ///
    /// Assigns the next version number. A configuration that fails
    /// validation is rejected whole; no version is ever partially stored.
    pub async fn register_pipeline(&self, mut config: Pipeline) -> GantryResult<Pipeline> {
        PipelineValidator::validate_strict(&config)?;

        config.version = match self.storage.get_pipeline(&config.namespace, &config.id).await {
            Ok(previous) => previous.version + 1,
            Err(GantryError::PipelineNotFound { .. }) => 1,
            Err(e) => return Err(e),
        };

        self.storage.put_pipeline(&config).await?;
        info!(
            pipeline = %config.id,
            namespace = %config.namespace,
            version = config.version,
            "pipeline registered"
        );
        Ok(config)
    }

    /// Create a run of the latest pipeline version and start coordinating it
    ///
    /// Fails with `ParallelismExceeded` when the pipeline is at its ceiling.
    /// The returned run is `Pending`; the coordinator drives it from its own
    /// task.
    pub async fn create_run(
        &self,
        namespace: &str,
        pipeline_id: &str,
        variables: HashMap<String, String>,
        initiator: Initiator,
    ) -> GantryResult<Run> {
        let pipeline = self.storage.get_pipeline(namespace, pipeline_id).await?;
        let run = self.sequencer.allocate(&pipeline, initiator, variables).await?;
        let key = run.key();

        let coordinator = RunCoordinator::new(
            self.storage.clone(),
            self.backend.clone(),
            self.registry.clone(),
            pipeline,
            run.clone(),
        )?;

        info!(run = %key, "run created");
        tokio::spawn(async move {
            if let Err(e) = coordinator.execute().await {
                error!(run = %key, error = %e, "run coordination failed");
            }
        });

        Ok(run)
    }

    pub async fn get_run(&self, key: &RunKey) -> GantryResult<Run> {
        self.storage.get_run(key).await
    }

    pub async fn list_runs(&self, namespace: &str, pipeline: &str) -> GantryResult<Vec<Run>> {
        self.storage.list_runs(namespace, pipeline).await
    }

    pub async fn get_task_run(&self, key: &RunKey, task_id: &str) -> GantryResult<TaskRun> {
        self.storage.get_task_run(key, task_id).await
    }

    pub async fn list_task_runs(&self, key: &RunKey) -> GantryResult<Vec<TaskRun>> {
        self.storage.list_task_runs(key).await
    }

    /// Cancel a run
    ///
    /// For an actively coordinated run this signals its cancellation token
    /// and the coordinator settles the records. For an unclaimed non-terminal
    /// run (left over from a crashed process) the records are settled here.
    pub async fn cancel_run(&self, key: &RunKey) -> GantryResult<()> {
        if self.registry.cancel(key) {
            info!(run = %key, "cancellation signalled");
            return Ok(());
        }

        let mut run = self.storage.get_run(key).await?;
        if run.state.is_terminal() {
            return Ok(());
        }

        warn!(run = %key, "cancelling unclaimed run");
        for mut task_run in self.storage.list_task_runs(key).await? {
            if !task_run.is_terminal() {
                task_run.mark_complete(
                    TaskRunStatus::Cancelled,
                    None,
                    Some("run cancelled".to_string()),
                )?;
                self.storage.update_task_run(&task_run).await?;
            }
        }
        run.mark_finished(RunStatus::Cancelled)?;
        self.storage.update_run(&run).await?;

        // A coordinator may have claimed the run while the records were being
        // settled. Its pre-claim snapshot would miss the cancelled state, so
        // signal its token as well; without a late claim this is a no-op.
        if self.registry.cancel(key) {
            info!(run = %key, "cancellation signalled to late-claiming coordinator");
        }
        Ok(())
    }

    /// Restart coordination of runs left non-terminal by a previous process
    ///
    /// Runs already claimed in this process are left alone. Returns the keys
    /// of the runs a coordinator was restarted for.
    pub async fn recover_interrupted(&self) -> GantryResult<Vec<RunKey>> {
        let mut recovered = Vec::new();

        for run in self.storage.list_unfinished_runs().await? {
            let key = run.key();
            if self.registry.contains(&key) {
                continue;
            }

            let pipeline = self
                .storage
                .get_pipeline_version(&run.namespace, &run.pipeline, run.pipeline_version)
                .await?;

            let coordinator = RunCoordinator::new(
                self.storage.clone(),
                self.backend.clone(),
                self.registry.clone(),
                pipeline,
                run,
            )?;

            info!(run = %key, "resuming interrupted run");
            let spawned_key = key.clone();
            tokio::spawn(async move {
                if let Err(e) = coordinator.execute().await {
                    error!(run = %spawned_key, error = %e, "run recovery failed");
                }
            });
            recovered.push(key);
        }

        Ok(recovered)
    }
}
