//! On-disk document storage.
//!
//! Files live under `{upload_dir}/{numero_identification}/{file}` and are
//! served back under `/uploads`. Stored paths (`chemin_fichier`) are relative
//! to the parent of the upload directory, e.g. `uploads/X123/scan.pdf`.

use std::path::{Path, PathBuf};
use thiserror::Error;

/// Extensions accepted for uploaded documents.
pub const ALLOWED_EXTENSIONS: &[&str] = &["pdf", "jpg", "jpeg", "png", "doc", "docx"];

#[derive(Debug, Error)]
pub enum StorageError {
    /// The upload was refused before anything touched the disk.
    #[error("{0}")]
    Rejected(String),

    #[error("storage i/o failed for {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Where a file was written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredFile {
    pub file_name: String,
    /// Path recorded on the document row.
    pub chemin: String,
    pub size: u64,
}

/// Documents directory tree rooted at the configured upload directory.
#[derive(Debug, Clone)]
pub struct DocumentStorage {
    root: PathBuf,
    max_upload_bytes: usize,
}

impl DocumentStorage {
    pub fn new(root: impl Into<PathBuf>, max_upload_bytes: usize) -> Self {
        Self {
            root: root.into(),
            max_upload_bytes,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn max_upload_bytes(&self) -> usize {
        self.max_upload_bytes
    }

    /// Checks an upload's name and size; returns the lowercased extension.
    pub fn check_upload(&self, original_name: &str, size: usize) -> Result<String, StorageError> {
        let extension = Path::new(original_name)
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .filter(|e| ALLOWED_EXTENSIONS.contains(&e.as_str()))
            .ok_or_else(|| {
                StorageError::Rejected(format!(
                    "file type not allowed; accepted: {}",
                    ALLOWED_EXTENSIONS.join(", ")
                ))
            })?;

        if size == 0 {
            return Err(StorageError::Rejected("uploaded file is empty".to_string()));
        }
        if size > self.max_upload_bytes {
            return Err(StorageError::Rejected(format!(
                "file too large: {} bytes (max {})",
                size, self.max_upload_bytes
            )));
        }
        Ok(extension)
    }

    /// Writes `bytes` as `file_name` in the subscriber's directory,
    /// replacing any previous file of the same name.
    pub async fn write(
        &self,
        numero_identification: &str,
        file_name: &str,
        bytes: &[u8],
    ) -> Result<StoredFile, StorageError> {
        let dir_name = directory_name(numero_identification)?;
        let dir = self.root.join(&dir_name);
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|source| io_error(&dir, source))?;

        let path = dir.join(file_name);
        tokio::fs::write(&path, bytes)
            .await
            .map_err(|source| io_error(&path, source))?;

        Ok(StoredFile {
            file_name: file_name.to_string(),
            chemin: format!("{}/{}/{}", self.prefix(), dir_name, file_name),
            size: bytes.len() as u64,
        })
    }

    /// Removes a stored file. A file that is already gone is not an error.
    pub async fn remove(&self, chemin: &str) -> Result<(), StorageError> {
        let path = self.resolve(chemin)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(io_error(&path, source)),
        }
    }

    /// Best-effort removal; failures are logged and swallowed.
    pub async fn remove_quietly(&self, chemin: &str) {
        if let Err(e) = self.remove(chemin).await {
            tracing::warn!(chemin, "failed to remove stored document: {}", e);
        }
    }

    /// Maps a recorded `chemin_fichier` back to a path under the root.
    pub fn resolve(&self, chemin: &str) -> Result<PathBuf, StorageError> {
        let prefix = format!("{}/", self.prefix());
        let relative = chemin.strip_prefix(&prefix).unwrap_or(chemin);
        let mut path = self.root.clone();
        for part in relative.split('/') {
            if part.is_empty() || part == "." || part == ".." || part.contains('\\') {
                return Err(StorageError::Rejected(format!(
                    "invalid stored path: {}",
                    chemin
                )));
            }
            path.push(part);
        }
        Ok(path)
    }

    fn prefix(&self) -> String {
        self.root
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("uploads")
            .to_string()
    }
}

/// A unique, filesystem-safe name for an uploaded file.
pub fn unique_file_name(original_name: &str, extension: &str) -> String {
    let stem = Path::new(original_name)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("document");
    let mut safe: String = stem
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .take(64)
        .collect();
    if safe.is_empty() {
        safe.push_str("document");
    }
    let stamp = chrono::Utc::now().timestamp_millis();
    let suffix = uuid::Uuid::new_v4().simple().to_string();
    format!("{}-{}-{}.{}", safe, stamp, &suffix[..8], extension)
}

fn directory_name(numero_identification: &str) -> Result<String, StorageError> {
    let numero = numero_identification.trim();
    if numero.is_empty()
        || numero == "."
        || numero == ".."
        || numero.contains(['/', '\\'])
        || numero.chars().any(char::is_control)
    {
        return Err(StorageError::Rejected(format!(
            "identification number cannot be used as a directory: {}",
            numero_identification
        )));
    }
    Ok(numero.to_string())
}

fn io_error(path: &Path, source: std::io::Error) -> StorageError {
    StorageError::Io {
        path: path.display().to_string(),
        source,
    }
}
