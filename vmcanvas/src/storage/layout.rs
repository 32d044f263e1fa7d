//! Storage layout configuration

use std::path::PathBuf;

use crate::errors::AppError;
use crate::filesys::dir::Dir;
use crate::filesys::file::File;

/// Environment variable overriding the data directory
pub const DATA_DIR_ENV: &str = "VMCANVAS_DATA_DIR";

/// On-disk layout under the data directory
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

    /// Collection file holding every machine record
    pub fn machines_file(&self) -> File {
        File::new(self.base_dir.join("machines.json"))
    }

    /// Get the settings file path
    pub fn settings_file(&self) -> File {
        File::new(self.base_dir.join("settings.json"))
    }

    /// Parent of the per-attempt deployment workspaces
    pub fn deployment_dir(&self) -> Dir {
        Dir::new(self.base_dir.join("deployments"))
    }

    /// Get the logs directory
    pub fn logs_dir(&self) -> Dir {
        Dir::new(self.base_dir.join("logs"))
    }

    /// Setup the storage layout (create directories)
    pub async fn setup(&self) -> Result<(), AppError> {
        Dir::new(&self.base_dir).create().await?;
        self.deployment_dir().create().await?;
        self.logs_dir().create().await?;
        Ok(())
    }
}

impl Default for StorageLayout {
    fn default() -> Self {
        let base_dir = std::env::var_os(DATA_DIR_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("data"));
        Self::new(base_dir)
    }
}
