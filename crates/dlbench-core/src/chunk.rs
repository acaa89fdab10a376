use std::path::PathBuf;

use bytes::Bytes;

/// A file resolved against the store root for the lifetime of one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileHandle {
    /// Root-relative name as requested.
    pub name: String,
    /// Canonical absolute path under the root.
    pub path: PathBuf,
    /// Size in bytes at resolve time.
    pub size: u64,
}

/// An immutable span of file bytes plus an end-of-file flag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub data: Bytes,
    pub last: bool,
}

impl Chunk {
    pub fn new(data: Bytes, last: bool) -> Self {
        Self { data, last }
    }

    /// Empty terminal chunk, emitted when the file ends short of its expected length.
    pub fn eof() -> Self {
        Self {
            data: Bytes::new(),
            last: true,
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn into_bytes(self) -> Bytes {
        self.data
    }
}
