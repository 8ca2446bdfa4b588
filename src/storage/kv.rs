use crate::config::Config;
use crate::error::{Error, Result};
use crate::storage::{MemoryRepository, SnapshotStore};
use std::fs::{self, File};
use std::io::Write;
use std::path::PathBuf;
use tracing::debug;

/// File-based snapshot storage.
///
/// Files:
/// - `snapshot.json`: the repository (catalogs, readings, tenancies, ...) as pretty JSON
/// - `snapshot.json.tmp`: temporary file for atomic writes
pub struct FileStorage {
    snapshot_path: PathBuf,
    snapshot_tmp_path: PathBuf,
}

impl FileStorage {
    /// Create a new FileStorage with paths from config
    pub fn new(config: &Config) -> Self {
        FileStorage::with_path(config.get_snapshot_path())
    }

    /// Create FileStorage at a custom path (for testing)
    pub fn with_path(snapshot_path: PathBuf) -> Self {
        let snapshot_tmp_path = snapshot_path.with_extension("json.tmp");
        FileStorage {
            snapshot_path,
            snapshot_tmp_path,
        }
    }

    pub fn path(&self) -> &PathBuf {
        &self.snapshot_path
    }

    /// Load the snapshot or start from an empty repository.
    pub fn load_or_default(&self) -> Result<MemoryRepository> {
        Ok(self.load_snapshot()?.unwrap_or_default())
    }

    fn ensure_dir(&self) -> Result<()> {
        if let Some(parent) = self.snapshot_path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| Error::StorageError(format!("Failed to create data directory: {}", e)))?;
        }
        Ok(())
    }
}

impl SnapshotStore for FileStorage {
    fn load_snapshot(&self) -> Result<Option<MemoryRepository>> {
        if !self.snapshot_path.exists() {
            return Ok(None);
        }

        let data = fs::read_to_string(&self.snapshot_path)
            .map_err(|e| Error::StorageError(format!("Failed to read snapshot: {}", e)))?;
        let repo: MemoryRepository = serde_json::from_str(&data)
            .map_err(|e| Error::StorageError(format!("Failed to parse snapshot: {}", e)))?;
        repo.validate()?;

        debug!(
            path = %self.snapshot_path.display(),
            readings = repo.readings.len(),
            tenancies = repo.tenancies.len(),
            "snapshot loaded"
        );
        Ok(Some(repo))
    }

    fn persist_snapshot(&mut self, repo: &MemoryRepository) -> Result<()> {
        self.ensure_dir()?;

        let bytes = serde_json::to_vec_pretty(repo)
            .map_err(|e| Error::StorageError(format!("Failed to serialize snapshot: {}", e)))?;

        let mut file = File::create(&self.snapshot_tmp_path)
            .map_err(|e| Error::StorageError(format!("Failed to create temp snapshot: {}", e)))?;
        file.write_all(&bytes)
            .map_err(|e| Error::StorageError(format!("Failed to write snapshot: {}", e)))?;

        // Fsync before rename
        file.sync_all()
            .map_err(|e| Error::StorageError(format!("Failed to fsync temp snapshot: {}", e)))?;
        drop(file);

        fs::rename(&self.snapshot_tmp_path, &self.snapshot_path)
            .map_err(|e| Error::StorageError(format!("Failed to rename temp snapshot: {}", e)))?;

        if let Some(parent) = self.snapshot_path.parent() {
            let parent_file = File::open(parent)
                .map_err(|e| Error::StorageError(format!("Failed to open parent directory: {}", e)))?;
            parent_file
                .sync_all()
                .map_err(|e| Error::StorageError(format!("Failed to fsync parent directory: {}", e)))?;
        }

        Ok(())
    }
}
