/// Non-blocking file reads driven from the event loop.
///
/// Two modes over the same tokio file primitives:
/// - chunked: a lazy stream that issues the next read only when the consumer
///   asks for the next chunk, so at most one unconsumed chunk exists
/// - single-shot: the whole file gathered as segments, coalesced later

use bytes::{Bytes, BytesMut};
use futures_util::stream::BoxStream;
use futures_util::{Stream, StreamExt};
use tokio::fs::File;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio_util::io::ReaderStream;

use crate::chunk::{Chunk, FileHandle};
use crate::error::{StoreError, StoreResult};

/// Read size for the async strategies.
pub const DEFAULT_ASYNC_CHUNK_SIZE: usize = 8192;

/// Owned chunk sequence for one request.
pub type ChunkStream = BoxStream<'static, StoreResult<Chunk>>;

/// A file opened for non-blocking reads, with its length at open time.
#[derive(Debug)]
pub struct AsyncFile {
    name: String,
    file: File,
    len: u64,
}

impl AsyncFile {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

/// Whole-file result of a single-shot async read.
#[derive(Debug, Default)]
pub struct AsyncBuffer {
    segments: Vec<Bytes>,
    len: u64,
}

impl AsyncBuffer {
    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn segments(&self) -> &[Bytes] {
        &self.segments
    }

    /// Copy the segments into one owned buffer.
    ///
    /// CPU-bound for large files; callers offload it from the event loop.
    pub fn into_contiguous(self) -> Bytes {
        if self.segments.len() == 1 {
            if let Some(only) = self.segments.into_iter().next() {
                return only;
            }
            return Bytes::new();
        }
        let mut buf = BytesMut::with_capacity(self.len as usize);
        for segment in &self.segments {
            buf.extend_from_slice(segment);
        }
        buf.freeze()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct AsyncChunkProducer {
    chunk_size: usize,
}

impl Default for AsyncChunkProducer {
    fn default() -> Self {
        Self::new(DEFAULT_ASYNC_CHUNK_SIZE)
    }
}

impl AsyncChunkProducer {
    pub fn new(chunk_size: usize) -> Self {
        Self {
            chunk_size: chunk_size.max(1),
        }
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Open `handle` without blocking the calling task.
    pub async fn open_async(&self, handle: &FileHandle) -> StoreResult<AsyncFile> {
        let name = handle.name.as_str();
        let file = File::open(&handle.path)
            .await
            .map_err(|e| StoreError::io(name, e))?;
        let len = file
            .metadata()
            .await
            .map_err(|e| StoreError::io(name, e))?
            .len();
        Ok(AsyncFile {
            name: handle.name.clone(),
            file,
            len,
        })
    }

    /// Lazy, ordered chunk sequence over an opened file.
    ///
    /// The final chunk carries `last`. A file that ends short of its opened
    /// length is closed off with an empty `last` chunk. A read failure is
    /// yielded once as a terminal `Err`, after which the stream ends.
    pub fn read_chunks(&self, async_file: AsyncFile) -> ChunkStream {
        let AsyncFile { name, file, len } = async_file;
        chunk_stream(name, file, len, self.chunk_size).boxed()
    }

    /// Open and stream in one step. Open failures are returned before any chunk exists.
    pub async fn chunks(&self, handle: &FileHandle) -> StoreResult<ChunkStream> {
        let async_file = self.open_async(handle).await?;
        Ok(self.read_chunks(async_file))
    }

    /// Single-shot mode: read the whole file through the same non-blocking
    /// reads and hand it back once complete.
    pub async fn read_whole(&self, handle: &FileHandle) -> StoreResult<AsyncBuffer> {
        let async_file = self.open_async(handle).await?;
        let expected = async_file.len();
        let mut stream = self.read_chunks(async_file);

        let mut segments = Vec::with_capacity(expected.div_ceil(self.chunk_size as u64) as usize);
        let mut len: u64 = 0;
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            if !chunk.is_empty() {
                len += chunk.len() as u64;
                segments.push(chunk.into_bytes());
            }
        }
        Ok(AsyncBuffer { segments, len })
    }

    /// Hand the open file straight to the network layer as a byte stream.
    /// No application-side whole-file buffer is ever built.
    pub fn into_body_stream(&self, async_file: AsyncFile) -> ReaderStream<File> {
        ReaderStream::with_capacity(async_file.file, self.chunk_size)
    }
}

fn chunk_stream<R>(
    name: String,
    mut reader: R,
    len: u64,
    chunk_size: usize,
) -> impl Stream<Item = StoreResult<Chunk>> + Send + 'static
where
    R: AsyncRead + Unpin + Send + 'static,
{
    async_stream::stream! {
        let mut buf = vec![0u8; chunk_size];
        let mut delivered: u64 = 0;
        let mut finished = false;
        while !finished {
            match reader.read(&mut buf).await {
                Ok(0) => {
                    yield Ok(Chunk::eof());
                    finished = true;
                }
                Ok(n) => {
                    delivered += n as u64;
                    let last = delivered >= len;
                    yield Ok(Chunk::new(Bytes::copy_from_slice(&buf[..n]), last));
                    finished = last;
                }
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    yield Err(StoreError::io(name.as_str(), e));
                    finished = true;
                }
            }
        }
    }
}
