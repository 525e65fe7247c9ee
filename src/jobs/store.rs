//! # Definition store: registration, lookup and replacement.
//!
//! The store is the single source of truth for job definitions. Lookups hand
//! out `Arc` references; an instance captures its `Arc` at submission and
//! keeps that version for every attempt, so a replacement only changes what
//! future submissions see.
//!
//! ## Rules
//! - registration validates and rejects duplicates;
//! - replacement and removal require the identity to exist and refuse
//!   while any instance attempt holds a lease on it;
//! - a removed identity can be registered again.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, RwLock};

use crate::error::DefinitionError;
use crate::jobs::{JobDefinition, JobId};

#[derive(Debug)]
struct StoreEntry {
    def: Arc<JobDefinition>,
    running: Arc<AtomicU32>,
}

/// Thread-safe registry of job definitions.
///
/// All methods are synchronous; the inner lock is never held across awaits.
#[derive(Debug, Default)]
pub struct DefinitionStore {
    inner: RwLock<HashMap<JobId, StoreEntry>>,
}

impl DefinitionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validates and registers a new definition.
    ///
    /// Fails with [`DefinitionError::Duplicate`] when the identity is already
    /// registered.
    pub fn register(&self, def: JobDefinition) -> Result<(), DefinitionError> {
        def.validate()?;
        let mut map = self.write();
        if map.contains_key(def.id()) {
            return Err(DefinitionError::Duplicate { id: def.id().clone() });
        }
        map.insert(
            def.id().clone(),
            StoreEntry {
                def: Arc::new(def),
                running: Arc::new(AtomicU32::new(0)),
            },
        );
        Ok(())
    }

    /// Resolves an identity to its current definition.
    pub fn lookup(&self, id: &JobId) -> Result<Arc<JobDefinition>, DefinitionError> {
        self.read()
            .get(id)
            .map(|e| Arc::clone(&e.def))
            .ok_or_else(|| DefinitionError::NotFound { id: id.clone() })
    }

    /// Swaps in a new definition for an already registered identity.
    ///
    /// Refused with [`DefinitionError::InUse`] while any attempt holds a
    /// lease; the caller can retry once those runs finish.
    pub fn replace(&self, def: JobDefinition) -> Result<(), DefinitionError> {
        def.validate()?;
        let mut map = self.write();
        let entry = map
            .get_mut(def.id())
            .ok_or_else(|| DefinitionError::NotFound { id: def.id().clone() })?;
        if entry.running.load(Ordering::Acquire) > 0 {
            return Err(DefinitionError::InUse { id: def.id().clone() });
        }
        entry.def = Arc::new(def);
        Ok(())
    }

    /// Unregisters an identity.
    ///
    /// Refused with [`DefinitionError::InUse`] while any attempt holds a
    /// lease. Instances already submitted keep their `Arc` and finish
    /// normally.
    pub fn remove(&self, id: &JobId) -> Result<(), DefinitionError> {
        let mut map = self.write();
        let entry = map
            .get(id)
            .ok_or_else(|| DefinitionError::NotFound { id: id.clone() })?;
        if entry.running.load(Ordering::Acquire) > 0 {
            return Err(DefinitionError::InUse { id: id.clone() });
        }
        map.remove(id);
        Ok(())
    }

    /// Identities currently registered, in no particular order.
    pub fn ids(&self) -> Vec<JobId> {
        self.read().keys().cloned().collect()
    }

    /// Marks the definition as in use for one attempt, blocking replacement
    /// and removal until the returned lease is dropped.
    pub(crate) fn lease(&self, id: &JobId) -> Option<RunLease> {
        let map = self.read();
        let entry = map.get(id)?;
        entry.running.fetch_add(1, Ordering::AcqRel);
        Some(RunLease {
            running: Arc::clone(&entry.running),
        })
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, HashMap<JobId, StoreEntry>> {
        self.inner.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<JobId, StoreEntry>> {
        self.inner.write().unwrap_or_else(|e| e.into_inner())
    }
}

/// Attempt-scoped in-use marker for a registered definition.
#[derive(Debug)]
pub(crate) struct RunLease {
    running: Arc<AtomicU32>,
}

impl Drop for RunLease {
    fn drop(&mut self) {
        self.running.fetch_sub(1, Ordering::AcqRel);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn def(id: &str) -> JobDefinition {
        JobDefinition::builder(id, "/bin/true").build().unwrap()
    }

    #[test]
    fn register_then_lookup_returns_same_definition() {
        let store = DefinitionStore::new();
        store.register(def("a")).unwrap();
        let id = JobId::new("a").unwrap();
        let found = store.lookup(&id).unwrap();
        assert_eq!(found.id(), &id);
    }

    #[test]
    fn duplicate_registration_is_rejected() {
        let store = DefinitionStore::new();
        store.register(def("a")).unwrap();
        let err = store.register(def("a")).unwrap_err();
        assert_eq!(err.as_label(), "duplicate_definition");
    }

    #[test]
    fn lookup_of_unknown_identity_fails() {
        let store = DefinitionStore::new();
        let id = JobId::new("ghost").unwrap();
        let err = store.lookup(&id).unwrap_err();
        assert_eq!(err.as_label(), "definition_not_found");
    }

    #[test]
    fn replace_requires_prior_registration() {
        let store = DefinitionStore::new();
        let err = store.replace(def("a")).unwrap_err();
        assert!(matches!(err, DefinitionError::NotFound { .. }));
    }

    #[test]
    fn replace_swaps_the_definition() {
        let store = DefinitionStore::new();
        store.register(def("a")).unwrap();
        let newer = JobDefinition::builder("a", "/bin/false").build().unwrap();
        store.replace(newer).unwrap();
        let id = JobId::new("a").unwrap();
        assert_eq!(store.lookup(&id).unwrap().command(), "/bin/false");
    }

    #[test]
    fn replace_is_refused_while_leased() {
        let store = DefinitionStore::new();
        store.register(def("a")).unwrap();
        let id = JobId::new("a").unwrap();
        let lease = store.lease(&id).unwrap();
        let err = store.replace(def("a")).unwrap_err();
        assert_eq!(err.as_label(), "definition_in_use");
        drop(lease);
        store.replace(def("a")).unwrap();
    }

    #[test]
    fn replace_does_not_touch_previously_handed_out_arcs() {
        let store = DefinitionStore::new();
        store.register(def("a")).unwrap();
        let id = JobId::new("a").unwrap();
        let captured = store.lookup(&id).unwrap();
        let newer = JobDefinition::builder("a", "/bin/false").build().unwrap();
        store.replace(newer).unwrap();
        assert_eq!(captured.command(), "/bin/true", "submission-time view is stable");
        assert_eq!(store.lookup(&id).unwrap().command(), "/bin/false");
    }

    #[test]
    fn remove_frees_the_identity_for_reuse() {
        let store = DefinitionStore::new();
        store.register(def("a")).unwrap();
        let id = JobId::new("a").unwrap();
        store.remove(&id).unwrap();
        assert!(store.lookup(&id).is_err());
        store.register(def("a")).unwrap();
    }

    #[test]
    fn remove_is_refused_while_leased() {
        let store = DefinitionStore::new();
        store.register(def("a")).unwrap();
        let id = JobId::new("a").unwrap();
        let lease = store.lease(&id).unwrap();
        assert_eq!(store.remove(&id).unwrap_err().as_label(), "definition_in_use");
        drop(lease);
        store.remove(&id).unwrap();
    }

    #[test]
    fn ids_lists_registered_identities() {
        let store = DefinitionStore::new();
        store.register(def("a")).unwrap();
        store.register(def("b")).unwrap();
        let mut ids: Vec<String> = store.ids().iter().map(|i| i.as_str().to_string()).collect();
        ids.sort();
        assert_eq!(ids, ["a", "b"]);
    }
}
