// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 gantry contributors

//! Run registry
//!
//! Process-wide record of which runs are actively being coordinated. A
//! coordinator claims its run's key at startup; a second claim for the same
//! key fails, so two coordinators can never drive one run. The entry holds
//! the run's cancellation token so external cancellation can reach the
//! owning coordinator. Entries are removed on clean completion only; a
//! crashed or storage-failed coordinator leaves its entry for the recovery
//! pass to inspect.

use std::collections::HashMap;
use std::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::errors::GantryError;
use crate::run::RunKey;

/// Concurrent map of actively coordinated runs
#[derive(Default)]
pub struct RunRegistry {
    entries: Mutex<HashMap<RunKey, CancellationToken>>,
}

impl RunRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim exclusive coordination of a run
    pub fn register(&self, key: RunKey, token: CancellationToken) -> Result<(), GantryError> {
        let mut entries = self.entries.lock().expect("registry lock poisoned");
        if entries.contains_key(&key) {
            return Err(GantryError::RunAlreadyClaimed {
                namespace: key.namespace,
                pipeline: key.pipeline,
                run_id: key.run_id,
            });
        }
        entries.insert(key, token);
        Ok(())
    }

    /// Release a claim; unknown keys are ignored
    pub fn unregister(&self, key: &RunKey) {
        let mut entries = self.entries.lock().expect("registry lock poisoned");
        entries.remove(key);
    }

    /// Whether a run is currently claimed
    pub fn contains(&self, key: &RunKey) -> bool {
        let entries = self.entries.lock().expect("registry lock poisoned");
        entries.contains_key(key)
    }

    /// Keys of every claimed run
    pub fn list(&self) -> Vec<RunKey> {
        let entries = self.entries.lock().expect("registry lock poisoned");
        entries.keys().cloned().collect()
    }

    /// Signal cancellation to the coordinator owning `key`
    ///
    /// Returns false when no coordinator holds the run.
    pub fn cancel(&self, key: &RunKey) -> bool {
        let entries = self.entries.lock().expect("registry lock poisoned");
        match entries.get(key) {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_register_and_unregister() {
        let registry = RunRegistry::new();
        let key = RunKey::new("default", "p", 1);

        registry.register(key.clone(), CancellationToken::new()).unwrap();
        assert!(registry.contains(&key));

        registry.unregister(&key);
        assert!(!registry.contains(&key));
    }

    #[test]
    fn test_duplicate_claim_rejected() {
        let registry = RunRegistry::new();
        let key = RunKey::new("default", "p", 1);

        registry.register(key.clone(), CancellationToken::new()).unwrap();
        let err = registry
            .register(key.clone(), CancellationToken::new())
            .unwrap_err();
        assert!(matches!(err, GantryError::RunAlreadyClaimed { .. }));
        assert!(err.is_retryable());
    }

    #[test]
    fn test_cancel_fires_token() {
        let registry = RunRegistry::new();
        let key = RunKey::new("default", "p", 1);
        let token = CancellationToken::new();

        registry.register(key.clone(), token.clone()).unwrap();
        assert!(registry.cancel(&key));
        assert!(token.is_cancelled());

        let unknown = RunKey::new("default", "p", 99);
        assert!(!registry.cancel(&unknown));
    }

    #[test]
    fn test_concurrent_claims_are_exclusive() {
        let registry = Arc::new(RunRegistry::new());
        let key = RunKey::new("default", "p", 1);

        let mut handles = Vec::new();
        for _ in 0..8 {
            let registry = registry.clone();
            let key = key.clone();
            handles.push(std::thread::spawn(move || {
                registry.register(key, CancellationToken::new()).is_ok()
            }));
        }

        let successes = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|ok| *ok)
            .count();
        assert_eq!(successes, 1);
    }
}
