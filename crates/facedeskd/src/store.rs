//! On-disk image store: `<root>/<label>/<unix millis>.jpg`.

use facedesk_core::Label;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs;
use tokio::io::AsyncWriteExt;

const IMAGE_EXTENSION: &str = "jpg";

#[derive(Error, Debug)]
#[error("{op} {}: {source}", path.display())]
pub struct StoreError {
    op: &'static str,
    path: PathBuf,
    #[source]
    source: std::io::Error,
}

impl StoreError {
    fn new(op: &'static str, path: &Path, source: std::io::Error) -> Self {
        Self {
            op,
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Directory-per-label photo store.
#[derive(Debug, Clone)]
pub struct ImageStore {
    root: PathBuf,
}

impl ImageStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Write one new image record under `label`, creating the label directory
    /// if needed. The file is named by the current time in milliseconds; on a
    /// name collision the timestamp is bumped until a free name is found.
    pub async fn save(&self, label: &Label, bytes: &[u8]) -> Result<PathBuf, StoreError> {
        let dir = self.root.join(label);
        if fs::metadata(&dir).await.is_err() {
            tracing::info!(dir = %dir.display(), "creating label directory");
        }
        fs::create_dir_all(&dir)
            .await
            .map_err(|e| StoreError::new("creating", &dir, e))?;

        let mut stamp = chrono::Utc::now().timestamp_millis();
        let (path, mut file) = loop {
            let path = dir.join(format!("{stamp}.{IMAGE_EXTENSION}"));
            match fs::OpenOptions::new().write(true).create_new(true).open(&path).await {
                Ok(file) => break (path, file),
                Err(e) if e.kind() == ErrorKind::AlreadyExists => stamp += 1,
                Err(e) => return Err(StoreError::new("creating", &path, e)),
            }
        };

        let written = async {
            file.write_all(bytes).await?;
            file.flush().await
        }
        .await;

        if let Err(e) = written {
            drop(file);
            if let Err(cleanup) = fs::remove_file(&path).await {
                tracing::warn!(path = %path.display(), error = %cleanup, "failed to remove partial upload");
            }
            return Err(StoreError::new("writing", &path, e));
        }

        tracing::info!(label = %label, path = %path.display(), bytes = bytes.len(), "image stored");
        Ok(path)
    }

    /// Label directory names, sorted. A missing root yields no labels.
    pub async fn labels(&self) -> Result<Vec<String>, StoreError> {
        let mut labels = self.list(&self.root, true).await?;
        labels.sort();
        Ok(labels)
    }

    /// Image files under one label, sorted by name (and so by upload time).
    pub async fn images(&self, label: &str) -> Result<Vec<PathBuf>, StoreError> {
        let dir = self.root.join(label);
        let mut names = self.list(&dir, false).await?;
        names.sort();
        Ok(names.into_iter().map(|n| dir.join(n)).collect())
    }

    /// Names of visible subdirectories (`dirs = true`) or regular files in `dir`.
    async fn list(&self, dir: &Path, dirs: bool) -> Result<Vec<String>, StoreError> {
        let mut entries = match fs::read_dir(dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(StoreError::new("listing", dir, e)),
        };

        let mut names = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| StoreError::new("listing", dir, e))?
        {
            let file_type = entry
                .file_type()
                .await
                .map_err(|e| StoreError::new("inspecting", &entry.path(), e))?;
            if file_type.is_dir() != dirs || !(file_type.is_dir() || file_type.is_file()) {
                continue;
            }
            let Ok(name) = entry.file_name().into_string() else {
                tracing::warn!(path = %entry.path().display(), "skipping non-UTF-8 name");
                continue;
            };
            if name.starts_with('.') {
                continue;
            }
            names.push(name);
        }
        Ok(names)
    }
}
