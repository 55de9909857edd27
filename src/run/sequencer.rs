// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 gantry contributors

//! Run sequencing and parallelism gating
//!
//! Allocates monotonically increasing per-pipeline run ids and enforces the
//! pipeline's parallelism ceiling. The count, the id allocation and the
//! persistence of the new run record all happen inside one critical section:
//! concurrent run creations for the same pipeline can neither be assigned the
//! same id nor overshoot the limit, because each creation is counted by the
//! next before the lock is released.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::errors::GantryError;
use crate::pipeline::Pipeline;
use crate::run::{Initiator, Run, RunKey};
use crate::storage::Storage;

/// Allocates run ids and enforces the parallelism limit
pub struct RunSequencer {
    storage: Arc<dyn Storage>,
    // Serializes the count-then-allocate window across concurrent creations.
    allocation: Mutex<()>,
}

impl RunSequencer {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self {
            storage,
            allocation: Mutex::new(()),
        }
    }

    /// Whether another non-terminal run fits under the pipeline's limit
    ///
    /// A limit of zero means unlimited.
    pub async fn check_parallelism(&self, pipeline: &Pipeline) -> Result<bool, GantryError> {
        if pipeline.parallelism == 0 {
            return Ok(true);
        }

        let runs = self
            .storage
            .list_runs(&pipeline.namespace, &pipeline.id)
            .await?;
        let active = runs.iter().filter(|r| !r.state.is_terminal()).count() as u64;

        Ok(active < pipeline.parallelism)
    }

    /// Allocate the next run id and persist the new pending run, gated on
    /// the parallelism limit
    ///
    /// The run record is written before the lock is released, so it counts
    /// against the limit for every later allocation. Returns
    /// `ParallelismExceeded` when the pipeline is at its ceiling; safe for
    /// the caller to retry once a run reaches a terminal state.
    pub async fn allocate(
        &self,
        pipeline: &Pipeline,
        initiator: Initiator,
        variables: HashMap<String, String>,
    ) -> Result<Run, GantryError> {
        let _guard = self.allocation.lock().await;

        if !self.check_parallelism(pipeline).await? {
            return Err(GantryError::ParallelismExceeded {
                pipeline: pipeline.id.clone(),
                limit: pipeline.parallelism,
            });
        }

        let run_id = self
            .storage
            .next_run_id(&pipeline.namespace, &pipeline.id)
            .await?;
        let key = RunKey::new(&pipeline.namespace, &pipeline.id, run_id);
        let run = Run::new(&key, pipeline.version, initiator, variables);
        self.storage.create_run(&run).await?;

        Ok(run)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::run::RunStatus;
    use crate::storage::MemoryStore;

    fn make_pipeline(parallelism: u64) -> Pipeline {
        Pipeline {
            namespace: "default".into(),
            id: "p".into(),
            name: "p".into(),
            description: None,
            version: 1,
            parallelism,
            tasks: HashMap::new(),
        }
    }

    async fn seed_running_run(storage: &MemoryStore, run_id: u64) {
        let key = RunKey::new("default", "p", run_id);
        let mut run = Run::new(&key, 1, Initiator::manual("t"), HashMap::new());
        run.mark_running().unwrap();
        storage.create_run(&run).await.unwrap();
    }

    async fn allocate_one(sequencer: &RunSequencer, pipeline: &Pipeline) -> Result<Run, GantryError> {
        sequencer
            .allocate(pipeline, Initiator::manual("test"), HashMap::new())
            .await
    }

    #[tokio::test]
    async fn test_ids_are_contiguous_from_one() {
        let storage = Arc::new(MemoryStore::new());
        let sequencer = RunSequencer::new(storage.clone());
        let pipeline = make_pipeline(0);

        assert_eq!(allocate_one(&sequencer, &pipeline).await.unwrap().run_id, 1);
        assert_eq!(allocate_one(&sequencer, &pipeline).await.unwrap().run_id, 2);
        assert_eq!(allocate_one(&sequencer, &pipeline).await.unwrap().run_id, 3);

        // Each allocation persisted its pending run
        assert_eq!(storage.list_runs("default", "p").await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_concurrent_allocations_distinct() {
        let storage = Arc::new(MemoryStore::new());
        let sequencer = Arc::new(RunSequencer::new(storage));
        let pipeline = make_pipeline(0);

        let mut handles = Vec::new();
        for _ in 0..12 {
            let sequencer = sequencer.clone();
            let pipeline = pipeline.clone();
            handles.push(tokio::spawn(async move {
                allocate_one(&sequencer, &pipeline).await.unwrap().run_id
            }));
        }

        let mut ids = Vec::new();
        for handle in handles {
            ids.push(handle.await.unwrap());
        }
        ids.sort_unstable();
        assert_eq!(ids, (1..=12).collect::<Vec<u64>>());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_allocations_respect_limit() {
        let storage = Arc::new(MemoryStore::new());
        let sequencer = Arc::new(RunSequencer::new(storage.clone()));
        let pipeline = make_pipeline(1);

        let mut handles = Vec::new();
        for _ in 0..4 {
            let sequencer = sequencer.clone();
            let pipeline = pipeline.clone();
            handles.push(tokio::spawn(async move {
                allocate_one(&sequencer, &pipeline).await
            }));
        }

        let mut created = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => created += 1,
                Err(e) => assert!(matches!(e, GantryError::ParallelismExceeded { .. })),
            }
        }
        assert_eq!(created, 1);

        // The persisted runs never outnumber the ceiling either
        let runs = storage.list_runs("default", "p").await.unwrap();
        let active = runs.iter().filter(|r| !r.state.is_terminal()).count();
        assert_eq!(active, 1);
    }

    #[tokio::test]
    async fn test_parallelism_gate() {
        let storage = Arc::new(MemoryStore::new());
        seed_running_run(&storage, 1).await;
        seed_running_run(&storage, 2).await;

        let sequencer = RunSequencer::new(storage.clone());
        let pipeline = make_pipeline(2);

        let err = allocate_one(&sequencer, &pipeline).await.unwrap_err();
        assert!(matches!(err, GantryError::ParallelismExceeded { .. }));
        assert!(err.is_retryable());

        // Once one run finishes, allocation is allowed again
        let key = RunKey::new("default", "p", 1);
        let mut run = storage.get_run(&key).await.unwrap();
        run.mark_finished(RunStatus::Successful).unwrap();
        storage.update_run(&run).await.unwrap();

        let run = allocate_one(&sequencer, &pipeline).await.unwrap();
        assert_eq!(run.run_id, 3);
    }

    #[tokio::test]
    async fn test_zero_limit_is_unlimited() {
        let storage = Arc::new(MemoryStore::new());
        for run_id in 1..=5 {
            seed_running_run(&storage, run_id).await;
        }

        let sequencer = RunSequencer::new(storage);
        let pipeline = make_pipeline(0);
        assert!(sequencer.check_parallelism(&pipeline).await.unwrap());
    }
}
