/// dlbench core: file-serving execution strategies.
///
/// Serves files from a flat read-only root in six ways:
/// - non-blocking tokio file I/O on the event loop (whole file, chunk stream, segment buffer)
/// - blocking std I/O on a bounded pool of OS worker threads (stream, whole buffer)
/// - blocking std I/O on lightweight tasks multiplexed over a few carrier threads
///
/// Nothing in here knows about HTTP; the server crate maps results onto responses.

pub mod chunk;
pub mod error;
pub mod loader;
pub mod locator;
pub mod pool;
pub mod producer;
pub mod strategy;
pub mod transfer;

// Re-export key types for convenience.
pub use chunk::{Chunk, FileHandle};
pub use error::{StoreError, StoreResult};
pub use loader::WholeFileLoader;
pub use locator::{FileStore, LocalFileStore};
pub use pool::{LightweightPool, WorkerPool};
pub use producer::{AsyncBuffer, AsyncChunkProducer, AsyncFile, ChunkStream, DEFAULT_ASYNC_CHUNK_SIZE};
pub use strategy::{ExecutionContext, Framing, MemoryProfile, TransferStrategy, select};
pub use transfer::{ChannelSink, DEFAULT_CHUNK_SIZE, StreamingTransfer};
