use std::future::Future;
use std::io;
use std::path::{Component, Path, PathBuf};

use tokio::fs;
use tracing::{info, warn};

use crate::chunk::FileHandle;
use crate::error::{StoreError, StoreResult};

/// Resolves logical file names to files under a read-only root.
pub trait FileStore: Send + Sync + 'static {
    /// Root directory every handle resolves under.
    fn root(&self) -> &Path;

    /// Map `name` onto a regular file under the root.
    ///
    /// Anything that is not a single plain path segment, does not exist, is not
    /// a regular file or escapes the root is reported as `NotFound`.
    fn resolve(&self, name: &str) -> impl Future<Output = StoreResult<FileHandle>> + Send;

    /// Current size of a resolved file. The file may have gone away since `resolve`.
    fn size(&self, handle: &FileHandle) -> impl Future<Output = StoreResult<u64>> + Send;
}

/// Flat directory of pre-existing files on the local filesystem.
#[derive(Debug, Clone)]
pub struct LocalFileStore {
    root: PathBuf,
}

impl LocalFileStore {
    pub async fn new(root: impl Into<PathBuf>) -> StoreResult<Self> {
        let root = root.into();
        let label = root.display().to_string();
        let root = fs::canonicalize(&root)
            .await
            .map_err(|e| StoreError::io(label.clone(), e))?;
        let metadata = fs::metadata(&root)
            .await
            .map_err(|e| StoreError::io(label.clone(), e))?;
        if !metadata.is_dir() {
            return Err(StoreError::Io {
                name: label,
                source: io::Error::new(io::ErrorKind::InvalidInput, "store root is not a directory"),
            });
        }
        info!("File store root: {}", root.display());
        Ok(Self { root })
    }

    /// Path a name would resolve to, without touching the filesystem.
    pub fn file_path(&self, name: &str) -> StoreResult<PathBuf> {
        validate_name(name)?;
        Ok(self.root.join(name))
    }
}

impl FileStore for LocalFileStore {
    fn root(&self) -> &Path {
        &self.root
    }

    async fn resolve(&self, name: &str) -> StoreResult<FileHandle> {
        let candidate = self.file_path(name)?;
        let path = fs::canonicalize(&candidate)
            .await
            .map_err(|e| unresolvable(name, e))?;

        // Symlinks are followed by canonicalize; the target must stay inside the root.
        if !path.starts_with(&self.root) {
            warn!("Rejected {}: resolves outside the store root", name);
            return Err(StoreError::NotFound(name.to_string()));
        }

        let metadata = fs::metadata(&path)
            .await
            .map_err(|e| unresolvable(name, e))?;
        if !metadata.is_file() {
            return Err(StoreError::NotFound(name.to_string()));
        }

        Ok(FileHandle {
            name: name.to_string(),
            path,
            size: metadata.len(),
        })
    }

    async fn size(&self, handle: &FileHandle) -> StoreResult<u64> {
        let metadata = fs::metadata(&handle.path)
            .await
            .map_err(|e| StoreError::io(handle.name.as_str(), e))?;
        Ok(metadata.len())
    }
}

/// A name the filesystem cannot even look up under the root names no file.
fn unresolvable(name: &str, e: io::Error) -> StoreError {
    match e.kind() {
        io::ErrorKind::NotFound | io::ErrorKind::InvalidFilename | io::ErrorKind::NotADirectory => {
            StoreError::NotFound(name.to_string())
        }
        _ => StoreError::io(name, e),
    }
}

fn validate_name(name: &str) -> StoreResult<()> {
    if name.is_empty() || name.contains(['/', '\\', '\0']) {
        return Err(StoreError::NotFound(name.to_string()));
    }
    let mut components = Path::new(name).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) => Ok(()),
        _ => Err(StoreError::NotFound(name.to_string())),
    }
}
