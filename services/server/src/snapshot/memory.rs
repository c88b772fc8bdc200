use std::collections::HashMap;
use std::hash::Hash;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tokio::time::Instant;
use weft_id::{ComponentId, CssStateId};
use weft_protocol::StateTree;

use super::SnapshotStore;
use crate::css::CssState;
use crate::SnapshotError;

#[derive(Debug)]
struct Expiring<T> {
    value: T,
    expires_at: Instant,
}

#[derive(Debug)]
struct Table<K, V> {
    entries: RwLock<HashMap<K, Expiring<V>>>,
}

impl<K: Eq + Hash, V: Clone> Table<K, V> {
    fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }

    async fn put(&self, key: K, value: V, ttl: Duration) {
        let expires_at = Instant::now() + ttl;
        self.entries
            .write()
            .await
            .insert(key, Expiring { value, expires_at });
    }

    async fn get(&self, key: &K) -> Option<V> {
        let now = Instant::now();
        {
            let entries = self.entries.read().await;
            match entries.get(key) {
                Some(entry) if entry.expires_at > now => return Some(entry.value.clone()),
                Some(_) => {}
                None => return None,
            }
        }
        self.entries.write().await.remove(key);
        None
    }

    async fn remove(&self, key: &K) {
        self.entries.write().await.remove(key);
    }

    async fn prune(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, entry| entry.expires_at > now);
        before - entries.len()
    }
}

/// In-process snapshot store. Expired entries are dropped when read or
/// pruned.
#[derive(Debug)]
pub struct MemorySnapshotStore {
    snapshots: Table<ComponentId, StateTree>,
    css: Table<CssStateId, CssState>,
}

impl MemorySnapshotStore {
    pub fn new() -> Self {
        Self {
            snapshots: Table::new(),
            css: Table::new(),
        }
    }
}

impl Default for MemorySnapshotStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SnapshotStore for MemorySnapshotStore {
    async fn save(&self, root_id: ComponentId, tree: &StateTree, ttl: Duration) -> Result<(), SnapshotError> {
        self.snapshots.put(root_id, tree.clone(), ttl).await;
        Ok(())
    }

    async fn get(&self, root_id: ComponentId) -> Result<Option<StateTree>, SnapshotError> {
        Ok(self.snapshots.get(&root_id).await)
    }

    async fn delete(&self, root_id: ComponentId) -> Result<(), SnapshotError> {
        self.snapshots.remove(&root_id).await;
        Ok(())
    }

    async fn save_css(&self, id: CssStateId, state: &CssState, ttl: Duration) -> Result<(), SnapshotError> {
        self.css.put(id, state.clone(), ttl).await;
        Ok(())
    }

    async fn get_css(&self, id: CssStateId) -> Result<Option<CssState>, SnapshotError> {
        Ok(self.css.get(&id).await)
    }

    async fn delete_css(&self, id: CssStateId) -> Result<(), SnapshotError> {
        self.css.remove(&id).await;
        Ok(())
    }

    async fn prune(&self) -> Result<usize, SnapshotError> {
        Ok(self.snapshots.prune().await + self.css.prune().await)
    }
}
