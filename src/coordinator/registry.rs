//! # Live instance registry.
//!
//! Maps instance ids to their handles: the shared state cell, the
//! cancellation token and the worker's join handle. Instances stay here
//! from submission until they are explicitly reaped, so terminal instances
//! remain queryable.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::error::CoreError;
use crate::instance::{InstanceCell, InstanceId, InstanceSnapshot};

/// One registered instance.
#[derive(Debug)]
pub(crate) struct InstanceHandle {
    pub(crate) cell: Arc<InstanceCell>,
    pub(crate) cancel: CancellationToken,
    /// Worker task; `None` for instances restored by recovery, or once the
    /// handle was taken for joining.
    pub(crate) join: Mutex<Option<JoinHandle<()>>>,
}

impl InstanceHandle {
    pub(crate) fn new(
        cell: Arc<InstanceCell>,
        cancel: CancellationToken,
        join: Option<JoinHandle<()>>,
    ) -> Arc<Self> {
        Arc::new(Self {
            cell,
            cancel,
            join: Mutex::new(join),
        })
    }

    pub(crate) fn take_join(&self) -> Option<JoinHandle<()>> {
        self.join.lock().unwrap_or_else(|e| e.into_inner()).take()
    }
}

#[derive(Debug, Default)]
pub(crate) struct Registry {
    inner: Mutex<HashMap<InstanceId, Arc<InstanceHandle>>>,
}

impl Registry {
    pub(crate) fn insert(&self, handle: Arc<InstanceHandle>) {
        self.lock().insert(handle.cell.id(), handle);
    }

    pub(crate) fn get(&self, id: &InstanceId) -> Option<Arc<InstanceHandle>> {
        self.lock().get(id).cloned()
    }

    pub(crate) fn all(&self) -> Vec<Arc<InstanceHandle>> {
        self.lock().values().cloned().collect()
    }

    /// Removes a terminal instance and returns its final snapshot.
    pub(crate) fn remove_terminal(&self, id: &InstanceId) -> Result<InstanceSnapshot, CoreError> {
        let mut map = self.lock();
        let handle = map
            .get(id)
            .ok_or(CoreError::UnknownInstance { id: *id })?;
        let snapshot = handle.cell.snapshot();
        if !snapshot.phase.is_terminal() {
            return Err(CoreError::NotTerminal {
                id: *id,
                phase: snapshot.phase,
            });
        }
        map.remove(id);
        Ok(snapshot)
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<InstanceId, Arc<InstanceHandle>>> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}
