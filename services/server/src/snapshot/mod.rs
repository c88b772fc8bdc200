//! Snapshot persistence.
//!
//! Every root's [`StateTree`] is saved after the initial page render and again
//! on graceful disconnect, keyed by the root id the client will present when
//! it reconnects. CSS rule lists are saved alongside so the client's
//! stylesheet indexes stay meaningful. Entries expire after a TTL; reads
//! never return an expired entry, and [`SnapshotSweeper`] periodically
//! removes the ones nobody came back for.

mod file;
mod memory;
mod sweeper;

use std::time::Duration;

use async_trait::async_trait;
use weft_id::{ComponentId, CssStateId};
use weft_protocol::StateTree;

use crate::css::CssState;
use crate::SnapshotError;

pub use file::FileSnapshotStore;
pub use memory::MemorySnapshotStore;
pub use sweeper::{SnapshotSweeper, DEFAULT_SWEEP_INTERVAL};

/// Storage for root snapshots and CSS state.
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    async fn save(&self, root_id: ComponentId, tree: &StateTree, ttl: Duration) -> Result<(), SnapshotError>;

    /// The snapshot for `root_id`, unless absent or expired.
    async fn get(&self, root_id: ComponentId) -> Result<Option<StateTree>, SnapshotError>;

    async fn delete(&self, root_id: ComponentId) -> Result<(), SnapshotError>;

    async fn save_css(&self, id: CssStateId, state: &CssState, ttl: Duration) -> Result<(), SnapshotError>;

    async fn get_css(&self, id: CssStateId) -> Result<Option<CssState>, SnapshotError>;

    async fn delete_css(&self, id: CssStateId) -> Result<(), SnapshotError>;

    /// Removes every expired snapshot and CSS entry. Returns how many were
    /// removed.
    async fn prune(&self) -> Result<usize, SnapshotError>;
}
