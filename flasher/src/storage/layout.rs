//! Storage layout configuration

use std::path::PathBuf;

use crate::errors::FlasherError;
use crate::filesys::dir::Dir;
use crate::filesys::file::File;

/// Storage layout for the worker
#[derive(Debug, Clone)]
pub struct StorageLayout {
    /// Base directory for all storage
    pub base_dir: PathBuf,
}

impl StorageLayout {
    /// Create a new storage layout
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    /// Get the settings file path
    pub fn settings_file(&self) -> File {
        File::new(self.base_dir.join("settings.json"))
    }

    /// Status store entries, one file per key
    pub fn status_dir(&self) -> Dir {
        Dir::new(self.base_dir.join("status"))
    }

    /// Liveness registry entries, one file per worker
    pub fn liveness_dir(&self) -> Dir {
        Dir::new(self.base_dir.join("liveness"))
    }

    /// Spool directory for queued task requests
    pub fn tasks_dir(&self) -> Dir {
        Dir::new(self.base_dir.join("tasks"))
    }

    /// Downloaded firmware artifacts
    pub fn downloads_dir(&self) -> Dir {
        Dir::new(self.base_dir.join("downloads"))
    }

    /// Get the logs directory
    pub fn logs_dir(&self) -> Dir {
        Dir::new(self.base_dir.join("logs"))
    }

    /// Setup the storage layout (create directories)
    pub async fn setup(&self) -> Result<(), FlasherError> {
        self.status_dir().create().await?;
        self.liveness_dir().create().await?;
        self.tasks_dir().create().await?;
        self.downloads_dir().create().await?;
        self.logs_dir().create().await?;
        Ok(())
    }
}

impl Default for StorageLayout {
    fn default() -> Self {
        Self::new("/var/lib/flasher")
    }
}
