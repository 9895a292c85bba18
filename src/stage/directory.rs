use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::{Mutex, MutexGuard};

use dashmap::DashMap;

use crate::actor::{ActorHandle, Address};

/// Sharding layout of the [`Directory`].
#[derive(Clone, Copy, Debug)]
pub struct DirectoryConfig {
    /// Number of buckets the address map is split over.
    pub buckets: usize,
    /// Pre-allocated capacity of each bucket.
    pub bucket_capacity: usize,
}

impl Default for DirectoryConfig {
    fn default() -> Self {
        DirectoryConfig {
            buckets: 32,
            bucket_capacity: 128,
        }
    }
}

/// Sharded mapping of live actors, `address → handle`, with a secondary
/// `type name → handle` index used for supervision routing and root
/// discovery.
///
/// The bucket is chosen by hashing the address; a live actor appears in
/// exactly one bucket. The type index is set on `set` and cleared on
/// `remove`, last-writer-wins — by convention the type names of root actors
/// and registered supervisors are unique.
pub struct Directory {
    buckets: Vec<Mutex<HashMap<String, ActorHandle>>>,
    type_index: DashMap<String, ActorHandle>,
}

impl Directory {
    pub(crate) fn new(config: &DirectoryConfig) -> Self {
        let bucket_count = config.buckets.max(1);
        let buckets = (0..bucket_count)
            .map(|_| Mutex::new(HashMap::with_capacity(config.bucket_capacity)))
            .collect();
        Directory {
            buckets,
            type_index: DashMap::new(),
        }
    }

    pub(crate) fn set(&self, handle: ActorHandle) {
        let address = handle.address();
        self.type_index
            .insert(handle.type_name().to_string(), handle.clone());
        self.bucket(&address).insert(address.to_string(), handle);
    }

    pub fn get(&self, address: &Address) -> Option<ActorHandle> {
        self.bucket(address).get(&address.to_string()).cloned()
    }

    pub(crate) fn remove(&self, address: &Address) -> Option<ActorHandle> {
        let removed = self.bucket(address).remove(&address.to_string());
        if let Some(handle) = &removed {
            self.type_index
                .remove_if(handle.type_name(), |_, indexed| indexed.address() == *address);
        }
        removed
    }

    /// Looks an actor up by its type name.
    pub fn find_by_type(&self, type_name: &str) -> Option<ActorHandle> {
        self.type_index.get(type_name).map(|entry| entry.clone())
    }

    /// Number of live actors; walks every bucket.
    pub fn count(&self) -> usize {
        self.buckets.iter().map(|b| lock(b).len()).sum()
    }

    pub(crate) fn all(&self) -> Vec<ActorHandle> {
        self.buckets
            .iter()
            .flat_map(|b| lock(b).values().cloned().collect::<Vec<_>>())
            .collect()
    }

    fn bucket(&self, address: &Address) -> MutexGuard<'_, HashMap<String, ActorHandle>> {
        let mut hasher = DefaultHasher::new();
        address.hash(&mut hasher);
        let index = (hasher.finish() as usize) % self.buckets.len();
        lock(&self.buckets[index])
    }
}

fn lock<'a>(
    bucket: &'a Mutex<HashMap<String, ActorHandle>>,
) -> MutexGuard<'a, HashMap<String, ActorHandle>> {
    bucket.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
