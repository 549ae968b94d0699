//! Bounded, newest-first collections persisted in device storage
//!
//! History and favorites are both a [`CollectionStore`]: a capacity, a
//! storage key and the items in newest-first order. Every mutation writes the
//! whole collection back before returning, so a fresh [`CollectionStore::load`]
//! right after a mutation sees it.

use crate::storage::KeyValueStore;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Storage key for generation history
pub(crate) const HISTORY_KEY: &str = "outputHistory";

/// Storage key for favorites
pub(crate) const FAVORITES_KEY: &str = "favorites";

/// Result of [`CollectionStore::toggle`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Toggled {
    Added,
    Removed,
}

/// A bounded ordered collection backed by one storage key
pub(crate) struct CollectionStore<T> {
    key: String,
    capacity: usize,
    items: Vec<T>,
    storage: Arc<dyn KeyValueStore>,
}

impl<T> CollectionStore<T>
where
    T: Serialize + DeserializeOwned,
{
    /// Load the collection stored under `key`
    ///
    /// Missing or unreadable data yields an empty collection. Stored data
    /// longer than `capacity` is cut down to the newest `capacity` items.
    pub(crate) fn load(storage: Arc<dyn KeyValueStore>, key: &str, capacity: usize) -> Self {
        let items = match storage.get(key) {
            Ok(Some(json)) => match serde_json::from_str::<Vec<T>>(&json) {
                Ok(mut items) => {
                    items.truncate(capacity);
                    items
                }
                Err(e) => {
                    warn!(key, error = %e, "Stored collection is corrupt, starting empty");
                    Vec::new()
                }
            },
            Ok(None) => Vec::new(),
            Err(e) => {
                warn!(key, error = %e, "Failed to read stored collection, starting empty");
                Vec::new()
            }
        };

        info!(key, count = items.len(), capacity, "Loaded collection");
        Self {
            key: key.to_string(),
            capacity,
            items,
            storage,
        }
    }

    /// Items, newest first
    pub(crate) fn items(&self) -> &[T] {
        &self.items
    }

    pub(crate) fn len(&self) -> usize {
        self.items.len()
    }

    pub(crate) fn capacity(&self) -> usize {
        self.capacity
    }

    pub(crate) fn get(&self, index: usize) -> Option<&T> {
        self.items.get(index)
    }

    /// Insert at the head, evicting from the tail past capacity, and persist
    pub(crate) fn prepend(&mut self, item: T) -> &[T] {
        self.items.insert(0, item);
        self.items.truncate(self.capacity);
        self.persist();
        &self.items
    }

    /// Remove the item with the same key, or prepend it if absent
    pub(crate) fn toggle<K, F>(&mut self, item: T, key_fn: F) -> Toggled
    where
        K: PartialEq,
        F: Fn(&T) -> K,
    {
        let key = key_fn(&item);
        match self.items.iter().position(|existing| key_fn(existing) == key) {
            Some(index) => {
                self.items.remove(index);
                self.persist();
                Toggled::Removed
            }
            None => {
                self.prepend(item);
                Toggled::Added
            }
        }
    }

    /// True if an item with the same key is present
    pub(crate) fn contains_by<K, F>(&self, item: &T, key_fn: F) -> bool
    where
        K: PartialEq,
        F: Fn(&T) -> K,
    {
        let key = key_fn(item);
        self.items.iter().any(|existing| key_fn(existing) == key)
    }

    fn persist(&self) {
        let json = match serde_json::to_string(&self.items) {
            Ok(json) => json,
            Err(e) => {
                error!(key = %self.key, error = %e, "Failed to serialize collection");
                return;
            }
        };
        // The in-memory collection stays authoritative for this session
        if let Err(e) = self.storage.set(&self.key, &json) {
            error!(key = %self.key, error = %e, "Failed to persist collection");
        }
    }
}
