use std::fmt::Display;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tracing::{debug, warn};
use weft_id::{ComponentId, CssStateId};
use weft_protocol::StateTree;

use super::SnapshotStore;
use crate::css::CssState;
use crate::SnapshotError;

/// On-disk entry format version.
const ENTRY_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
struct PersistedEntry<T> {
    version: u32,
    expires_at: DateTime<Utc>,
    value: T,
}

/// The leading fields of an entry, enough to decide whether it is stale.
#[derive(Debug, Deserialize)]
struct EntryHeader {
    version: u32,
    expires_at: DateTime<Utc>,
}

/// Snapshot store writing one JSON file per entry.
///
/// Writes go to a temp file that is renamed into place, so readers never see
/// a partial entry.
#[derive(Debug, Clone)]
pub struct FileSnapshotStore {
    root: PathBuf,
}

impl FileSnapshotStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn snapshot_path(&self, id: ComponentId) -> PathBuf {
        entry_path(&self.root.join("snapshots"), id)
    }

    fn css_path(&self, id: CssStateId) -> PathBuf {
        entry_path(&self.root.join("css"), id)
    }

    fn dirs(&self) -> [PathBuf; 2] {
        [self.root.join("snapshots"), self.root.join("css")]
    }
}

fn entry_path(dir: &Path, id: impl Display) -> PathBuf {
    dir.join(format!("{id}.json"))
}

async fn write_entry<T: Serialize>(path: &Path, value: &T, ttl: Duration) -> Result<(), SnapshotError> {
    let ttl = chrono::Duration::from_std(ttl).map_err(|e| SnapshotError::InvalidTtl(e.to_string()))?;
    let entry = PersistedEntry {
        version: ENTRY_VERSION,
        expires_at: Utc::now() + ttl,
        value,
    };
    let content = serde_json::to_vec(&entry)?;

    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let tmp_path = path.with_extension("tmp");
    tokio::fs::write(&tmp_path, &content).await?;
    tokio::fs::rename(&tmp_path, path).await?;
    debug!(path = %path.display(), bytes = content.len(), "Saved snapshot entry");
    Ok(())
}

async fn read_entry<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, SnapshotError> {
    let content = match tokio::fs::read(path).await {
        Ok(content) => content,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    let entry: PersistedEntry<T> = serde_json::from_slice(&content)?;

    if entry.version != ENTRY_VERSION {
        warn!(
            path = %path.display(),
            file_version = entry.version,
            current_version = ENTRY_VERSION,
            "Snapshot entry version mismatch, discarding"
        );
        remove_entry(path).await?;
        return Ok(None);
    }
    if entry.expires_at <= Utc::now() {
        debug!(path = %path.display(), "Snapshot entry expired");
        remove_entry(path).await?;
        return Ok(None);
    }
    Ok(Some(entry.value))
}

async fn remove_entry(path: &Path) -> Result<(), SnapshotError> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

/// Removes expired and outdated entries under `dir`. Unreadable entries are
/// left for `read_entry` to report.
async fn prune_dir(dir: &Path, now: DateTime<Utc>) -> Result<usize, SnapshotError> {
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(e.into()),
    };

    let mut removed = 0;
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
            continue;
        }
        let content = match tokio::fs::read(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => continue,
            Err(e) => return Err(e.into()),
        };
        let stale = match serde_json::from_slice::<EntryHeader>(&content) {
            Ok(header) => header.version != ENTRY_VERSION || header.expires_at <= now,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Skipping unreadable snapshot entry");
                false
            }
        };
        if stale {
            remove_entry(&path).await?;
            removed += 1;
        }
    }
    Ok(removed)
}

#[async_trait]
impl SnapshotStore for FileSnapshotStore {
    async fn save(&self, root_id: ComponentId, tree: &StateTree, ttl: Duration) -> Result<(), SnapshotError> {
        write_entry(&self.snapshot_path(root_id), tree, ttl).await
    }

    async fn get(&self, root_id: ComponentId) -> Result<Option<StateTree>, SnapshotError> {
        read_entry(&self.snapshot_path(root_id)).await
    }

    async fn delete(&self, root_id: ComponentId) -> Result<(), SnapshotError> {
        remove_entry(&self.snapshot_path(root_id)).await
    }

    async fn save_css(&self, id: CssStateId, state: &CssState, ttl: Duration) -> Result<(), SnapshotError> {
        write_entry(&self.css_path(id), state, ttl).await
    }

    async fn get_css(&self, id: CssStateId) -> Result<Option<CssState>, SnapshotError> {
        read_entry(&self.css_path(id)).await
    }

    async fn delete_css(&self, id: CssStateId) -> Result<(), SnapshotError> {
        remove_entry(&self.css_path(id)).await
    }

    async fn prune(&self) -> Result<usize, SnapshotError> {
        let now = Utc::now();
        let mut removed = 0;
        for dir in self.dirs() {
            removed += prune_dir(&dir, now).await?;
        }
        if removed > 0 {
            debug!(root = %self.root.display(), removed, "Pruned snapshot entries");
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::css::CssRule;
    use crate::State;
    use serde_json::json;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_save_and_load() {
        let dir = TempDir::new().unwrap();
        let store = FileSnapshotStore::new(dir.path());
        let id = ComponentId::new();
        let mut tree = StateTree::new("Counter", State::new());
        tree.state.insert("count".into(), json!(3));

        store.save(id, &tree, Duration::from_secs(60)).await.unwrap();
        assert_eq!(store.get(id).await.unwrap(), Some(tree));
        assert!(!dir
            .path()
            .join("snapshots")
            .join(format!("{id}.tmp"))
            .exists());
    }

    #[tokio::test]
    async fn test_missing_entry_is_none() {
        let dir = TempDir::new().unwrap();
        let store = FileSnapshotStore::new(dir.path());
        assert!(store.get(ComponentId::new()).await.unwrap().is_none());
        store.delete(ComponentId::new()).await.unwrap();
    }

    #[tokio::test]
    async fn test_expired_entry_is_removed() {
        let dir = TempDir::new().unwrap();
        let store = FileSnapshotStore::new(dir.path());
        let id = CssStateId::new();
        let state = CssState {
            rules: vec![CssRule {
                class: "wabc".into(),
                declaration: "color: red".into(),
            }],
        };
        store.save_css(id, &state, Duration::ZERO).await.unwrap();
        assert!(store.get_css(id).await.unwrap().is_none());
        assert!(!store.css_path(id).exists());
    }

    #[tokio::test]
    async fn test_prune_removes_expired_entries_from_disk() {
        let dir = TempDir::new().unwrap();
        let store = FileSnapshotStore::new(dir.path());
        let tree = StateTree::new("Counter", State::new());
        let (expired, live) = (ComponentId::new(), ComponentId::new());
        let css = CssStateId::new();
        store.save(expired, &tree, Duration::ZERO).await.unwrap();
        store.save(live, &tree, Duration::from_secs(60)).await.unwrap();
        store
            .save_css(css, &CssState::default(), Duration::ZERO)
            .await
            .unwrap();
        let garbage = store.snapshot_path(ComponentId::new());
        std::fs::write(&garbage, b"not json").unwrap();

        assert_eq!(store.prune().await.unwrap(), 2);

        assert!(!store.snapshot_path(expired).exists());
        assert!(!store.css_path(css).exists());
        assert!(store.snapshot_path(live).exists());
        assert!(garbage.exists());
        assert_eq!(store.prune().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_prune_on_empty_root() {
        let dir = TempDir::new().unwrap();
        let store = FileSnapshotStore::new(dir.path().join("missing"));
        assert_eq!(store.prune().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_corrupt_entry_is_an_error() {
        let dir = TempDir::new().unwrap();
        let store = FileSnapshotStore::new(dir.path());
        let id = ComponentId::new();
        let path = store.snapshot_path(id);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, b"not json").unwrap();
        assert!(matches!(
            store.get(id).await,
            Err(SnapshotError::Serialization(_))
        ));
    }
}
