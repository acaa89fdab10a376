use std::fs::File;
use std::io;
use std::time::Duration;

use axum::response::Response;
use bytes::Bytes;
use futures_util::StreamExt;
use futures_util::stream::BoxStream;
use tokio::runtime::Handle;
use tracing::{debug, error, info, warn};

use dlbench_core::{
    AsyncChunkProducer, ChannelSink, ChunkStream, FileHandle, FileStore, LightweightPool,
    LocalFileStore, StoreError, StoreResult, StreamingTransfer, TransferStrategy, WholeFileLoader,
    WorkerPool,
};

use crate::config::ServerConfig;
use crate::response::{StrategyOutput, assemble};

/// Runs a selected strategy on its execution context and assembles the response.
pub struct Downloader<S: FileStore = LocalFileStore> {
    store: S,
    workers: WorkerPool,
    lightweight: LightweightPool,
    streaming: StreamingTransfer,
    loader: WholeFileLoader,
    producer: AsyncChunkProducer,
    stall_timeout: Duration,
}

impl Downloader<LocalFileStore> {
    /// Open the configured root and start both pools.
    pub async fn from_config(config: &ServerConfig) -> anyhow::Result<Self> {
        let store = LocalFileStore::new(config.root.clone()).await?;
        Ok(Self::new(store, config)?)
    }
}

impl<S: FileStore> Downloader<S> {
    pub fn new(store: S, config: &ServerConfig) -> io::Result<Self> {
        Ok(Self {
            store,
            workers: WorkerPool::new(config.workers)?,
            lightweight: LightweightPool::new(config.carriers)?,
            streaming: StreamingTransfer::new(config.chunk_size),
            loader: WholeFileLoader,
            producer: AsyncChunkProducer::new(config.async_chunk_size),
            stall_timeout: config.stall_timeout,
        })
    }

    pub fn workers(&self) -> &WorkerPool {
        &self.workers
    }

    pub fn lightweight(&self) -> &LightweightPool {
        &self.lightweight
    }

    /// Resolve `name` and serve it with `strategy`.
    ///
    /// Errors returned here happen before any body byte exists. Failures after
    /// streaming starts end the body early instead.
    pub async fn serve(&self, strategy: TransferStrategy, name: &str) -> StoreResult<Response> {
        let handle = self.store.resolve(name).await?;
        debug!("{} [{}] resolved to {} ({} bytes)", strategy, name, handle.path.display(), handle.size);

        let (output, declared_len) = match strategy {
            TransferStrategy::AsyncWholeFile => {
                let file = self.producer.open_async(&handle).await?;
                let len = file.len();
                let body = self.producer.into_body_stream(file).boxed();
                (StrategyOutput::Stream(body), Some(len))
            }
            TransferStrategy::AsyncChunkedBuffer => {
                let buffer = self.producer.read_whole(&handle).await?;
                let bytes = self.workers.run(move || buffer.into_contiguous()).await?;
                (StrategyOutput::Buffer(bytes), Some(self.store.size(&handle).await?))
            }
            TransferStrategy::AsyncChunkStream => {
                let chunks = self.producer.chunks(&handle).await?;
                (StrategyOutput::Stream(chunk_body(chunks, handle.name.clone())), None)
            }
            TransferStrategy::BlockingStream => {
                // Open on the pool before committing headers, so an unreadable
                // file is still a status and not a truncated 200.
                let streaming = self.streaming;
                let target = handle.clone();
                let file = self.workers.run(move || streaming.open(&target)).await??;
                let len = self.store.size(&handle).await?;
                (StrategyOutput::Stream(self.spawn_stream(handle.clone(), file)?), Some(len))
            }
            TransferStrategy::BlockingWholeBuffer => {
                let loader = self.loader;
                let target = handle.clone();
                let data = self.workers.run(move || loader.load(&target)).await??;
                (StrategyOutput::Buffer(Bytes::from(data)), Some(self.store.size(&handle).await?))
            }
            TransferStrategy::BlockingWholeBufferOnLightweightThread => {
                let loader = self.loader;
                let target = handle.clone();
                let data = self.lightweight.run_blocking(move || loader.load(&target)).await??;
                (StrategyOutput::Buffer(Bytes::from(data)), Some(self.store.size(&handle).await?))
            }
        };

        info!("{} [{}] ready, {} bytes", strategy, name, handle.size);
        Ok(assemble(output, declared_len))
    }

    /// Queue the blocking copy loop over an already opened file and return the
    /// receiving end as a body stream.
    ///
    /// The worker stops at the first failed write, so a client that goes away
    /// costs at most one more chunk read.
    fn spawn_stream(
        &self,
        handle: FileHandle,
        file: File,
    ) -> StoreResult<BoxStream<'static, io::Result<Bytes>>> {
        let (mut sink, rx) = ChannelSink::new(Handle::current(), self.stall_timeout);
        let streaming = self.streaming;

        self.workers.execute(move || {
            let result = streaming.transfer_from(&handle.name, file, &mut sink);
            match result {
                Ok(n) => debug!("stream [{}]: {} bytes written", handle.name, n),
                Err(StoreError::SinkClosed(e)) => {
                    warn!("stream [{}] stopped early: {}", handle.name, e);
                }
                Err(e) => {
                    error!("stream [{}] failed: {}", handle.name, e);
                    sink.fail(io::Error::other(e));
                }
            }
        })?;

        let mut rx = rx;
        Ok(async_stream::stream! {
            while let Some(item) = rx.recv().await {
                yield item;
            }
        }
        .boxed())
    }
}

fn chunk_body(mut chunks: ChunkStream, name: String) -> BoxStream<'static, io::Result<Bytes>> {
    async_stream::stream! {
        while let Some(item) = chunks.next().await {
            match item {
                Ok(chunk) => {
                    if !chunk.is_empty() {
                        yield Ok(chunk.into_bytes());
                    }
                }
                Err(e) => {
                    error!("asyncMultiBuffer [{}] failed mid-stream: {}", name, e);
                    yield Err(io::Error::other(e));
                }
            }
        }
    }
    .boxed()
}
