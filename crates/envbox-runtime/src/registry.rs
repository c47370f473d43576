//! In-memory registry of environments, backed by the store.
//!
//! Each environment lives in its own `Mutex<Slot>` so operations on one
//! namespace are serialised without blocking others. The map lock is only
//! held for lookup, insert and removal. Lock order is slot, then map:
//! [`Registry::retire`] takes the map lock while its caller holds the slot,
//! and no code path locks a slot while holding the map lock.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use envbox_common::types::Namespace;

use crate::environment::Environment;
use crate::error::{AdmissionError, ManagerError};
use crate::store::Store;

/// Locks `mutex`, recovering the data if a previous holder panicked.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// One registered environment.
#[derive(Debug)]
pub struct Slot {
    env: Environment,
    retired: bool,
}

impl Slot {
    const fn new(env: Environment) -> Self {
        Self {
            env,
            retired: false,
        }
    }

    /// The environment held by this slot.
    #[must_use]
    pub const fn env(&self) -> &Environment {
        &self.env
    }

    /// Mutable access to the environment.
    pub const fn env_mut(&mut self) -> &mut Environment {
        &mut self.env
    }

    /// Whether the environment was terminated while the caller waited.
    #[must_use]
    pub const fn is_retired(&self) -> bool {
        self.retired
    }
}

/// Shared handle to a slot.
pub type SlotRef = Arc<Mutex<Slot>>;

/// Namespace-keyed registry of live environments.
pub struct Registry {
    slots: Mutex<HashMap<Namespace, SlotRef>>,
    store: Arc<Store>,
}

impl Registry {
    /// Creates an empty registry over `store`.
    #[must_use]
    pub fn new(store: Arc<Store>) -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
            store,
        }
    }

    /// Registers a new environment.
    ///
    /// `admit` is called with whether the namespace is already taken, while
    /// the map is locked, so two concurrent creations of one namespace can
    /// never both succeed.
    ///
    /// # Errors
    ///
    /// Returns the admission error from `admit`, or a storage error.
    pub fn register<F>(&self, env: Environment, admit: F) -> Result<SlotRef, ManagerError>
    where
        F: FnOnce(bool) -> Result<(), AdmissionError>,
    {
        let namespace = env.namespace().clone();
        let mut slots = lock(&self.slots);
        let exists = slots.contains_key(&namespace) || self.store.contains(&namespace)?;
        admit(exists)?;

        if !self.store.insert_environment(&env)? {
            return Err(AdmissionError::DuplicateNamespace { namespace }.into());
        }
        let slot = Arc::new(Mutex::new(Slot::new(env)));
        let _ = slots.insert(namespace, Arc::clone(&slot));
        Ok(slot)
    }

    /// Returns the slot for `namespace`, loading it from the store on first
    /// touch.
    ///
    /// # Errors
    ///
    /// Returns [`ManagerError::NotFound`] if neither the registry nor the
    /// store knows the namespace.
    pub fn get(&self, namespace: &Namespace) -> Result<SlotRef, ManagerError> {
        let mut slots = lock(&self.slots);
        if let Some(slot) = slots.get(namespace) {
            return Ok(Arc::clone(slot));
        }

        let env = self
            .store
            .load_environment(namespace)?
            .ok_or_else(|| ManagerError::not_found(namespace))?;
        tracing::debug!(namespace = %namespace, "loaded environment from store");
        let slot = Arc::new(Mutex::new(Slot::new(env)));
        let _ = slots.insert(namespace.clone(), Arc::clone(&slot));
        Ok(slot)
    }

    /// Marks `slot` retired and drops it from the map.
    ///
    /// The caller holds the slot lock; anyone queued on it will observe
    /// [`Slot::is_retired`] and treat the environment as gone.
    pub fn retire(&self, namespace: &Namespace, slot: &mut Slot) {
        slot.retired = true;
        let _ = lock(&self.slots).remove(namespace);
    }

    /// Returns every resident slot.
    #[must_use]
    pub fn resident(&self) -> Vec<SlotRef> {
        lock(&self.slots).values().cloned().collect()
    }

    /// Number of resident environments.
    #[must_use]
    pub fn len(&self) -> usize {
        lock(&self.slots).len()
    }

    /// Whether no environment is resident.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("resident", &self.len())
            .finish_non_exhaustive()
    }
}
