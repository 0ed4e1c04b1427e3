//! Process-wide, load-once model registry.
//!
//! Loading an inference model is expensive, so each distinct model is loaded
//! at most once per process and shared through an `Arc`. Concurrent first
//! access to the same key blocks on a single in-flight load instead of
//! starting duplicates; a failed load leaves the slot empty so a later caller
//! sees the failure again.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, Mutex, PoisonError};

use once_cell::sync::OnceCell;

pub struct ModelCache<K, T> {
    slots: Mutex<HashMap<K, Arc<OnceCell<Arc<T>>>>>,
}

impl<K, T> Default for ModelCache<K, T> {
    fn default() -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
        }
    }
}

impl<K: Eq + Hash + Clone, T> ModelCache<K, T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the cached model for `key`, running `load` only if no load has
    /// succeeded for it yet.
    pub fn get_or_load<E>(
        &self,
        key: &K,
        load: impl FnOnce() -> Result<T, E>,
    ) -> Result<Arc<T>, E> {
        // The map lock is held only to find the slot; the load itself runs
        // under the slot's own once-guard.
        let slot = {
            let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
            Arc::clone(slots.entry(key.clone()).or_default())
        };
        slot.get_or_try_init(|| load().map(Arc::new)).cloned()
    }

    pub fn is_loaded(&self, key: &K) -> bool {
        let slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        slots.get(key).is_some_and(|slot| slot.get().is_some())
    }
}
