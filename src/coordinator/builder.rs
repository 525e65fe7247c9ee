//! # Coordinator construction.

use std::sync::Arc;

use crate::config::CoreConfig;
use crate::coordinator::core::Coordinator;
use crate::error::JournalError;
use crate::jobs::DefinitionStore;
use crate::journal::Journal;
use crate::subscribers::{Subscribe, SubscriberSet};

/// Builder for a [`Coordinator`].
///
/// ```rust
/// use std::sync::Arc;
/// use runjob::{Coordinator, CoordinatorBuilder, CoreConfig};
///
/// #[tokio::main(flavor = "current_thread")]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let mut cfg = CoreConfig::default();
///     cfg.max_concurrent = 4;
///
///     let coordinator: Arc<Coordinator> = CoordinatorBuilder::new(cfg).build()?;
///     coordinator.shutdown().await?;
///     Ok(())
/// }
/// ```
pub struct CoordinatorBuilder {
    cfg: CoreConfig,
    store: Option<Arc<DefinitionStore>>,
    subscribers: Vec<Arc<dyn Subscribe>>,
}

impl CoordinatorBuilder {
    /// Creates a new builder with the given configuration.
    pub fn new(cfg: CoreConfig) -> Self {
        Self {
            cfg,
            store: None,
            subscribers: Vec::new(),
        }
    }

    /// Shares an existing definition store instead of creating a fresh one.
    ///
    /// Lets an embedder keep its own handle for surfaces the coordinator
    /// does not re-expose, or share definitions across coordinators.
    pub fn with_store(mut self, store: Arc<DefinitionStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Sets event subscribers for observability.
    ///
    /// Subscribers receive every transition event through dedicated workers
    /// with bounded queues; a slow subscriber loses events rather than
    /// slowing instances down.
    pub fn with_subscribers(mut self, subscribers: Vec<Arc<dyn Subscribe>>) -> Self {
        self.subscribers = subscribers;
        self
    }

    /// Builds the coordinator and starts its fan-out listener.
    ///
    /// Must be called inside a tokio runtime. Fails only when a configured
    /// `state_dir` cannot be prepared; `state_dir = None` never fails.
    pub fn build(self) -> Result<Arc<Coordinator>, JournalError> {
        let journal = match &self.cfg.state_dir {
            Some(dir) => Some(Journal::open(dir.join("instances"))?),
            None => None,
        };
        let store = self.store.unwrap_or_default();
        let subs = Arc::new(SubscriberSet::new(self.subscribers));
        Ok(Coordinator::new(self.cfg, store, subs, journal))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn build_prepares_the_state_directory() {
        let dir = tempfile::tempdir().unwrap();
        let state_dir = dir.path().join("runtime");
        let coord = CoordinatorBuilder::new(CoreConfig {
            state_dir: Some(state_dir.clone()),
            ..CoreConfig::default()
        })
        .build()
        .unwrap();

        assert!(state_dir.join("instances").is_dir());
        coord.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn builders_can_share_a_store() {
        let store = Arc::new(DefinitionStore::new());
        let coord = CoordinatorBuilder::new(CoreConfig::default())
            .with_store(Arc::clone(&store))
            .build()
            .unwrap();

        let def = crate::jobs::JobDefinition::builder("shared", "/bin/true")
            .build()
            .unwrap();
        store.register(def).unwrap();
        assert!(coord.definition(&crate::jobs::JobId::new("shared").unwrap()).is_ok());
        coord.shutdown().await.unwrap();
    }
}
