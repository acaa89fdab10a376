use std::fmt;

use serde::Serialize;

/// How a request's bytes are produced. Fixed for the lifetime of the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum TransferStrategy {
    /// Open non-blocking and let the I/O layer stream the file.
    AsyncWholeFile,
    /// Non-blocking whole-file read; coalescing into one buffer runs on the worker pool.
    AsyncChunkedBuffer,
    /// Lazy backpressured chunk stream on the event loop.
    AsyncChunkStream,
    /// Blocking 4 KB copy loop on the worker pool.
    BlockingStream,
    /// Blocking whole-file read on the worker pool.
    BlockingWholeBuffer,
    /// Blocking whole-file read on a lightweight task.
    BlockingWholeBufferOnLightweightThread,
}

/// Where strategy code runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ExecutionContext {
    EventLoop,
    BoundedWorkerPool,
    LightweightThreadPool,
}

/// Peak application memory per request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum MemoryProfile {
    FileSized,
    ChunkSized,
}

/// Whether the response declares its length up front.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Framing {
    Declared,
    Streamed,
}

impl TransferStrategy {
    pub const ALL: [TransferStrategy; 6] = [
        Self::AsyncWholeFile,
        Self::AsyncChunkedBuffer,
        Self::AsyncChunkStream,
        Self::BlockingStream,
        Self::BlockingWholeBuffer,
        Self::BlockingWholeBufferOnLightweightThread,
    ];

    /// Strategy for a `/download/{endpoint}/...` path segment.
    pub fn from_endpoint(segment: &str) -> Option<Self> {
        match segment {
            "asyncFile" => Some(Self::AsyncWholeFile),
            "asyncBuffer" | "asyncByteArray" => Some(Self::AsyncChunkedBuffer),
            "asyncMultiBuffer" => Some(Self::AsyncChunkStream),
            "stream" => Some(Self::BlockingStream),
            "byteArray" => Some(Self::BlockingWholeBuffer),
            "byteArrayVirtual" => Some(Self::BlockingWholeBufferOnLightweightThread),
            _ => None,
        }
    }

    pub fn endpoint(self) -> &'static str {
        match self {
            Self::AsyncWholeFile => "asyncFile",
            Self::AsyncChunkedBuffer => "asyncBuffer",
            Self::AsyncChunkStream => "asyncMultiBuffer",
            Self::BlockingStream => "stream",
            Self::BlockingWholeBuffer => "byteArray",
            Self::BlockingWholeBufferOnLightweightThread => "byteArrayVirtual",
        }
    }

    /// Blocking filesystem reads never land on the event loop.
    pub fn execution_context(self) -> ExecutionContext {
        match self {
            Self::AsyncWholeFile | Self::AsyncChunkedBuffer | Self::AsyncChunkStream => {
                ExecutionContext::EventLoop
            }
            Self::BlockingStream | Self::BlockingWholeBuffer => ExecutionContext::BoundedWorkerPool,
            Self::BlockingWholeBufferOnLightweightThread => ExecutionContext::LightweightThreadPool,
        }
    }

    pub fn memory_profile(self) -> MemoryProfile {
        match self {
            Self::AsyncChunkStream | Self::BlockingStream => MemoryProfile::ChunkSized,
            _ => MemoryProfile::FileSized,
        }
    }

    pub fn framing(self) -> Framing {
        match self {
            Self::AsyncChunkStream => Framing::Streamed,
            _ => Framing::Declared,
        }
    }

    pub fn is_blocking(self) -> bool {
        self.execution_context() != ExecutionContext::EventLoop
    }
}

impl fmt::Display for TransferStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.endpoint())
    }
}

/// Pick the strategy and execution context for a requested endpoint.
///
/// Purely a function of the endpoint; load never changes the answer.
pub fn select(endpoint: &str) -> Option<(TransferStrategy, ExecutionContext)> {
    TransferStrategy::from_endpoint(endpoint).map(|s| (s, s.execution_context()))
}
