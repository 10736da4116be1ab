//! Canvas snapshot storage trait.

use async_trait::async_trait;

use super::SnapshotError;

#[async_trait]
pub trait CanvasSnapshotStore: Send + Sync {
    /// Saved board bytes, or `None` when nothing has been saved yet.
    async fn load(&self) -> Result<Option<Vec<u8>>, SnapshotError>;

    async fn save(&self, board: &[u8]) -> Result<(), SnapshotError>;
}
