use std::io;
use std::path::{Path, PathBuf};

use tokio::fs;
use uuid::Uuid;

use crate::{constants::WORKSPACE_PREFIX, core::domain::Language};

/// Uniquely named directory backing exactly one sandboxed run.
///
/// `close` removes it on the normal path. If the owner never gets there
/// (an early `?`, a panic, a cancelled future) `Drop` removes it instead.
/// Removal failures are logged, never returned.
#[derive(Debug)]
pub struct Workspace {
    dir: PathBuf,
    removed: bool,
}

impl Workspace {
    pub async fn create(root: &Path) -> io::Result<Self> {
        fs::create_dir_all(root).await?;
        // Container runtimes only accept absolute mount sources.
        let root = fs::canonicalize(root).await?;
        let dir = root.join(format!("{}{}", WORKSPACE_PREFIX, Uuid::new_v4()));
        fs::create_dir(&dir).await?;

        tracing::debug!(workspace = %dir.display(), "Workspace created");
        Ok(Self {
            dir,
            removed: false,
        })
    }

    pub fn path(&self) -> &Path {
        &self.dir
    }

    pub async fn write_source(&self, language: Language, code: &str) -> io::Result<PathBuf> {
        let path = self.dir.join(language.source_file_name());
        fs::write(&path, code).await?;
        Ok(path)
    }

    pub async fn close(mut self) {
        self.removed = true;
        match fs::remove_dir_all(&self.dir).await {
            Ok(()) => tracing::debug!(workspace = %self.dir.display(), "Workspace removed"),
            Err(e) => tracing::warn!(
                workspace = %self.dir.display(),
                error = %e,
                "Failed to remove workspace"
            ),
        }
    }
}

impl Drop for Workspace {
    fn drop(&mut self) {
        if self.removed {
            return;
        }

        if let Err(e) = std::fs::remove_dir_all(&self.dir) {
            tracing::warn!(
                workspace = %self.dir.display(),
                error = %e,
                "Failed to remove abandoned workspace"
            );
        }
    }
}
