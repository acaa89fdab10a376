use std::fs::File;
use std::io::Read;

use crate::chunk::FileHandle;
use crate::error::{StoreError, StoreResult};

/// Reads a whole file into one buffer with blocking std I/O.
///
/// Memory cost is the file size per call. Keeping concurrent loads within a
/// sane memory budget is the caller's job; nothing here enforces a cap.
#[derive(Debug, Clone, Copy, Default)]
pub struct WholeFileLoader;

impl WholeFileLoader {
    /// Load the file. Blocks; run it on a worker or lightweight thread.
    ///
    /// A file removed after `resolve` surfaces as `NotFound` here.
    pub fn load(&self, handle: &FileHandle) -> StoreResult<Vec<u8>> {
        let name = handle.name.as_str();
        let mut file = File::open(&handle.path).map_err(|e| StoreError::io(name, e))?;
        let size = file.metadata().map_err(|e| StoreError::io(name, e))?.len();

        // Sized up front so a stable file is read without regrowing the buffer.
        let mut buf = Vec::with_capacity(size as usize);
        file.read_to_end(&mut buf).map_err(|e| StoreError::io(name, e))?;
        Ok(buf)
    }
}
