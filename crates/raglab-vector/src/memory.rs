use async_trait::async_trait;
use std::sync::RwLock;

use raglab_core::error::{Error, Result};
use raglab_core::traits::{CollectionStore, ExperimentLog};
use raglab_core::types::{Experiment, VectorCollection};

/// Process-local store; nothing survives the process.
#[derive(Default)]
pub struct MemoryStore {
    collections: RwLock<Vec<VectorCollection>>,
    experiments: RwLock<Vec<Experiment>>,
}

impl MemoryStore {
    pub fn new() -> Self { Self::default() }
}

fn poisoned<E>(_: E) -> Error { Error::store("in-memory store is unavailable", "lock poisoned") }

#[async_trait]
impl CollectionStore for MemoryStore {
    async fn put(&self, collection: &VectorCollection) -> Result<()> {
        collection.validate()?;
        let mut all = self.collections.write().map_err(poisoned)?;
        match all.iter_mut().find(|c| c.id == collection.id) {
            Some(slot) => *slot = collection.clone(),
            None => all.push(collection.clone()),
        }
        Ok(())
    }

    async fn get_all(&self) -> Result<Vec<VectorCollection>> { Ok(self.collections.read().map_err(poisoned)?.clone()) }

    async fn delete(&self, id: &str) -> Result<()> {
        self.collections.write().map_err(poisoned)?.retain(|c| c.id != id);
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        self.collections.write().map_err(poisoned)?.clear();
        Ok(())
    }
}

#[async_trait]
impl ExperimentLog for MemoryStore {
    async fn append(&self, experiment: &Experiment) -> Result<()> {
        self.experiments.write().map_err(poisoned)?.push(experiment.clone());
        Ok(())
    }

    async fn list(&self) -> Result<Vec<Experiment>> { Ok(self.experiments.read().map_err(poisoned)?.clone()) }
}
