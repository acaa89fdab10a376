/// Blocking chunked copy from a file to a writer.
///
/// ```text
/// [worker thread]                         [event loop]
/// read 4 KB -> write -> flush -> ...  ==>  mpsc(1) ==> response body
/// ```
///
/// Memory stays at one chunk buffer plus at most one chunk parked in the
/// channel, whatever the file size.

use std::fs::File;
use std::io::{self, Read, Write};
use std::time::Duration;

use bytes::Bytes;
use tokio::runtime::Handle;
use tokio::sync::mpsc;

use crate::chunk::FileHandle;
use crate::error::{StoreError, StoreResult};

/// Chunk size used by the blocking stream strategy.
pub const DEFAULT_CHUNK_SIZE: usize = 4096;

#[derive(Debug, Clone, Copy)]
pub struct StreamingTransfer {
    chunk_size: usize,
}

impl Default for StreamingTransfer {
    fn default() -> Self {
        Self::new(DEFAULT_CHUNK_SIZE)
    }
}

impl StreamingTransfer {
    pub fn new(chunk_size: usize) -> Self {
        Self {
            chunk_size: chunk_size.max(1),
        }
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Copy the whole file into `sink`, flushing after every chunk.
    /// Blocks the calling thread; never call this on the event loop.
    pub fn transfer<W: Write>(&self, handle: &FileHandle, sink: W) -> StoreResult<u64> {
        let file = self.open(handle)?;
        self.transfer_from(&handle.name, file, sink)
    }

    /// Open the source file with blocking std I/O.
    ///
    /// Callers that must report open failures as a status, before any byte is
    /// sent, open first and pass the file to [`transfer_from`](Self::transfer_from).
    pub fn open(&self, handle: &FileHandle) -> StoreResult<File> {
        File::open(&handle.path).map_err(|e| StoreError::io(handle.name.as_str(), e))
    }

    /// Same loop as [`transfer`](Self::transfer) over any reader.
    ///
    /// Stops at the first failed read or write. Bytes already written are not
    /// taken back; the receiving side sees a truncated stream.
    pub fn transfer_from<R: Read, W: Write>(
        &self,
        name: &str,
        mut reader: R,
        mut sink: W,
    ) -> StoreResult<u64> {
        let mut buf = vec![0u8; self.chunk_size];
        let mut total: u64 = 0;
        loop {
            let n = match reader.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(StoreError::io(name, e)),
            };
            sink.write_all(&buf[..n])
                .and_then(|()| sink.flush())
                .map_err(StoreError::SinkClosed)?;
            total += n as u64;
        }
        Ok(total)
    }
}

/// `Write` adapter that hands each write to an async consumer.
///
/// Writes block the calling (non-runtime) thread until the consumer has room.
/// A dropped receiver fails the write with `BrokenPipe`; a consumer that makes
/// no progress for `stall_timeout` fails it with `TimedOut`.
pub struct ChannelSink {
    tx: mpsc::Sender<io::Result<Bytes>>,
    runtime: Handle,
    stall_timeout: Duration,
}

impl ChannelSink {
    pub fn new(runtime: Handle, stall_timeout: Duration) -> (Self, mpsc::Receiver<io::Result<Bytes>>) {
        let (tx, rx) = mpsc::channel(1);
        (
            Self {
                tx,
                runtime,
                stall_timeout,
            },
            rx,
        )
    }

    fn send(&self, item: io::Result<Bytes>) -> io::Result<()> {
        let tx = &self.tx;
        let stall_timeout = self.stall_timeout;
        let sent = self
            .runtime
            .block_on(async move { tokio::time::timeout(stall_timeout, tx.send(item)).await });
        match sent {
            Ok(Ok(())) => Ok(()),
            Ok(Err(_)) => Err(io::Error::new(io::ErrorKind::BrokenPipe, "receiver dropped")),
            Err(_) => Err(io::Error::new(
                io::ErrorKind::TimedOut,
                format!("consumer stalled for {:?}", stall_timeout),
            )),
        }
    }

    /// Terminate the consumer's stream with an error so it cannot mistake a
    /// truncated transfer for a complete one. Best effort.
    pub fn fail(self, error: io::Error) {
        let _ = self.send(Err(error));
    }
}

impl Write for ChannelSink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        self.send(Ok(Bytes::copy_from_slice(buf)))?;
        Ok(buf.len())
    }

    // Every write is already handed off.
    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
