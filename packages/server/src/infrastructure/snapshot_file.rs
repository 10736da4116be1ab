//! キャンバスのスナップショットをファイルに保存する実装
//!
//! 形式は 1 セル 1 バイトの row-major な生バイト列。
//! 保存は一時ファイルに書いてから rename するので、途中で落ちても
//! 以前のスナップショットが壊れることはない。

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::{fs, io::AsyncWriteExt};

use crate::domain::{CanvasSnapshotStore, SnapshotError};

pub struct FileCanvasSnapshotStore {
    path: PathBuf,
}

impl FileCanvasSnapshotStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

fn io_error(path: &Path, e: std::io::Error) -> SnapshotError {
    SnapshotError::Io(format!("{}: {}", path.display(), e))
}

#[async_trait]
impl CanvasSnapshotStore for FileCanvasSnapshotStore {
    async fn load(&self) -> Result<Option<Vec<u8>>, SnapshotError> {
        match fs::read(&self.path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(io_error(&self.path, e)),
        }
    }

    async fn save(&self, board: &[u8]) -> Result<(), SnapshotError> {
        let temp = self.temp_path();
        let mut file = fs::File::create(&temp)
            .await
            .map_err(|e| io_error(&temp, e))?;
        file.write_all(board).await.map_err(|e| io_error(&temp, e))?;
        file.sync_all().await.map_err(|e| io_error(&temp, e))?;
        drop(file);

        fs::rename(&temp, &self.path)
            .await
            .map_err(|e| io_error(&self.path, e))?;
        tracing::debug!(
            "Canvas snapshot written to {} ({} bytes)",
            self.path.display(),
            board.len()
        );
        Ok(())
    }
}
