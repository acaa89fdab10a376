/// End-to-end tests: every strategy over a real router and a temp file root.
///
/// Files are filled with a known pattern and compared byte-for-byte with the
/// response body.

use std::path::{Path, PathBuf};
use std::sync::{Arc, mpsc};
use std::time::Duration;

use axum::Router;
use axum::body::{Body, HttpBody};
use axum::http::{Request, StatusCode, header};
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use http_body_util::BodyExt;
use tower::ServiceExt;

use dlbench_core::{FileHandle, FileStore, LocalFileStore, StoreResult, TransferStrategy};
use dlbench_server::config::ServerConfig;
use dlbench_server::dispatch::Downloader;
use dlbench_server::response::DownloadError;
use dlbench_server::routes::AppState;

const MB: usize = 1024 * 1024;

const ENDPOINTS: [&str; 6] = [
    "asyncFile",
    "asyncBuffer",
    "asyncMultiBuffer",
    "stream",
    "byteArray",
    "byteArrayVirtual",
];

fn pattern(len: usize, seed: usize) -> Vec<u8> {
    (0..len).map(|i| ((i + seed) % 251) as u8).collect()
}

fn test_config(root: &Path) -> ServerConfig {
    ServerConfig {
        root: root.to_path_buf(),
        workers: 2,
        carriers: 2,
        stall_timeout: Duration::from_secs(5),
        ..ServerConfig::default()
    }
}

async fn setup(files: &[(&str, usize)]) -> (tempfile::TempDir, Arc<Downloader>, Router) {
    let dir = tempfile::tempdir().unwrap();
    for (i, (name, len)) in files.iter().enumerate() {
        std::fs::write(dir.path().join(name), pattern(*len, i)).unwrap();
    }
    let config = test_config(dir.path());
    let store = LocalFileStore::new(dir.path()).await.unwrap();
    let downloader = Arc::new(Downloader::new(store, &config).unwrap());
    let app = dlbench_server::app(AppState {
        downloader: downloader.clone(),
    });
    (dir, downloader, app)
}

async fn get(app: &Router, uri: &str) -> (StatusCode, Option<u64>, Bytes) {
    let response = app
        .clone()
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let content_length = response
        .headers()
        .get(header::CONTENT_LENGTH)
        .map(|v| v.to_str().unwrap().parse().unwrap());
    let body = response.into_body().collect().await.unwrap().to_bytes();
    (status, content_length, body)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn every_strategy_returns_exact_bytes() {
    let files = [("one.pdf", MB), ("five.pdf", 5 * MB), ("twenty.pdf", 20 * MB)];
    let (dir, _downloader, app) = setup(&files).await;

    for (name, len) in files {
        let expected = std::fs::read(dir.path().join(name)).unwrap();
        for endpoint in ENDPOINTS {
            let (status, content_length, body) = get(&app, &format!("/download/{endpoint}/{name}")).await;
            assert_eq!(status, StatusCode::OK, "{endpoint} {name}");
            assert_eq!(body.len(), len, "{endpoint} {name}");
            assert!(body[..] == expected[..], "{endpoint} {name}: body differs from file");

            if endpoint == "asyncMultiBuffer" {
                assert_eq!(content_length, None, "{endpoint} streams without a length");
            } else {
                assert_eq!(content_length, Some(len as u64), "{endpoint} {name}");
            }
        }
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn alias_endpoint_serves_async_buffer() {
    let (dir, _downloader, app) = setup(&[("sample.pdf", 64 * 1024)]).await;
    let expected = std::fs::read(dir.path().join("sample.pdf")).unwrap();
    let (status, _, body) = get(&app, "/download/asyncByteArray/sample.pdf").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(&body[..], &expected[..]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn missing_file_is_404_with_empty_body() {
    let (_dir, _downloader, app) = setup(&[("present.bin", 10)]).await;
    for endpoint in ENDPOINTS {
        let (status, _, body) = get(&app, &format!("/download/{endpoint}/absent.bin")).await;
        assert_eq!(status, StatusCode::NOT_FOUND, "{endpoint}");
        assert!(body.is_empty(), "{endpoint}");
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn traversal_and_unknown_strategy_are_404() {
    let (_dir, _downloader, app) = setup(&[("present.bin", 10)]).await;
    for uri in [
        "/download/byteArray/..",
        "/download/byteArray/..%2Fpresent.bin",
        "/download/stream/%2Fetc%2Fpasswd",
        "/download/mmap/present.bin",
    ] {
        let (status, _, body) = get(&app, uri).await;
        assert_eq!(status, StatusCode::NOT_FOUND, "{uri}");
        assert!(body.is_empty(), "{uri}");
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn repeated_requests_are_identical() {
    let (_dir, _downloader, app) = setup(&[("same.pdf", 3 * MB + 7)]).await;
    for endpoint in ENDPOINTS {
        let uri = format!("/download/{endpoint}/same.pdf");
        let first = get(&app, &uri).await;
        let second = get(&app, &uri).await;
        assert_eq!(first.0, second.0);
        assert_eq!(first.1, second.1);
        assert!(first.2 == second.2, "{endpoint}: bodies differ");
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn whole_buffer_strategies_hold_file_before_sending() {
    let len = 2 * MB + 3;
    let (_dir, downloader, _app) = setup(&[("whole.bin", len)]).await;
    for strategy in [
        TransferStrategy::AsyncChunkedBuffer,
        TransferStrategy::BlockingWholeBuffer,
        TransferStrategy::BlockingWholeBufferOnLightweightThread,
    ] {
        let response = downloader.serve(strategy, "whole.bin").await.unwrap();
        // A fully buffered body knows its exact size before the first poll.
        assert_eq!(response.body().size_hint().exact(), Some(len as u64), "{strategy}");
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn streaming_strategies_emit_bounded_frames() {
    let (_dir, downloader, _app) = setup(&[("big.bin", 8 * MB)]).await;
    for (strategy, bound) in [
        (TransferStrategy::BlockingStream, 4096),
        (TransferStrategy::AsyncChunkStream, 8192),
    ] {
        let response = downloader.serve(strategy, "big.bin").await.unwrap();
        assert_eq!(response.body().size_hint().exact(), None, "{strategy}");

        let mut body = response.into_body();
        let mut total = 0usize;
        let mut frames = 0usize;
        while let Some(frame) = body.frame().await {
            let data = frame.unwrap().into_data().unwrap();
            assert!(data.len() <= bound, "{strategy}: frame of {} bytes", data.len());
            total += data.len();
            frames += 1;
        }
        assert_eq!(total, 8 * MB);
        assert!(frames >= 8 * MB / bound, "{strategy}");
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn abandoned_stream_frees_its_worker() {
    let (_dir, downloader, _app) = setup(&[("huge.bin", 40 * MB), ("small.bin", 1024)]).await;

    // Occupy both workers with streams whose clients read one frame and leave.
    for _ in 0..downloader.workers().size() {
        let response = downloader
            .serve(TransferStrategy::BlockingStream, "huge.bin")
            .await
            .unwrap();
        let mut body = response.into_body();
        body.frame().await.unwrap().unwrap();
        drop(body);
    }

    // If the abandoned transfers kept reading, this would wait behind 80 MB of copying
    // through a channel nobody drains, i.e. until the stall timeout.
    let blocked = downloader.serve(TransferStrategy::BlockingWholeBuffer, "small.bin");
    let response = tokio::time::timeout(Duration::from_secs(2), blocked)
        .await
        .expect("worker pool still busy after clients disconnected")
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn blocking_requests_beyond_pool_size_queue() {
    let files: Vec<(String, usize)> = (0..8).map(|i| (format!("f{i}.bin"), 256 * 1024)).collect();
    let refs: Vec<(&str, usize)> = files.iter().map(|(n, l)| (n.as_str(), *l)).collect();
    let (_dir, _downloader, app) = setup(&refs).await;

    let requests = files.iter().map(|(name, _)| {
        let app = app.clone();
        let uri = format!("/download/stream/{name}");
        async move { get(&app, &uri).await }
    });
    for (status, content_length, body) in futures_util::future::join_all(requests).await {
        assert_eq!(status, StatusCode::OK);
        assert_eq!(content_length, Some(256 * 1024));
        assert_eq!(body.len(), 256 * 1024);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn health_and_strategy_listing() {
    let (_dir, _downloader, app) = setup(&[]).await;

    let (status, _, body) = get(&app, "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(&body[..], b"ok");

    let (status, _, body) = get(&app, "/strategies").await;
    assert_eq!(status, StatusCode::OK);
    let listing: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(listing["workerThreads"], 2);
    assert_eq!(listing["carrierThreads"], 2);
    let strategies = listing["strategies"].as_array().unwrap();
    assert_eq!(strategies.len(), 6);
    assert_eq!(strategies[3]["endpoint"], "stream");
    assert_eq!(strategies[3]["executionContext"], "boundedWorkerPool");
    assert_eq!(strategies[2]["framing"], "streamed");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn overlong_name_is_404() {
    let (_dir, _downloader, app) = setup(&[("present.bin", 10)]).await;
    let name = "a".repeat(300);
    for endpoint in ENDPOINTS {
        let (status, _, body) = get(&app, &format!("/download/{endpoint}/{name}")).await;
        assert_eq!(status, StatusCode::NOT_FOUND, "{endpoint}");
        assert!(body.is_empty(), "{endpoint}");
    }
}

/// Resolves every name to a fixed target, whatever is (or is not) there.
struct FixedStore {
    root: PathBuf,
    target: PathBuf,
}

impl FileStore for FixedStore {
    fn root(&self) -> &Path {
        &self.root
    }

    async fn resolve(&self, name: &str) -> StoreResult<FileHandle> {
        Ok(FileHandle {
            name: name.to_string(),
            path: self.target.clone(),
            size: 16,
        })
    }

    async fn size(&self, handle: &FileHandle) -> StoreResult<u64> {
        Ok(handle.size)
    }
}

/// What the download handler would send for this outcome.
async fn status_of<S: FileStore>(
    downloader: &Downloader<S>,
    strategy: TransferStrategy,
) -> (StatusCode, Bytes) {
    let response: Response = match downloader.serve(strategy, "target.bin").await {
        Ok(response) => response,
        Err(e) => DownloadError::from(e).into_response(),
    };
    let status = response.status();
    (status, response.into_body().collect().await.unwrap().to_bytes())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn open_failure_after_resolve_is_500_for_every_strategy() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("plain"), b"not a directory").unwrap();
    // Opening a path below a regular file fails with something other than NotFound.
    let store = FixedStore {
        root: dir.path().to_path_buf(),
        target: dir.path().join("plain").join("target.bin"),
    };
    let downloader = Downloader::new(store, &test_config(dir.path())).unwrap();

    for strategy in TransferStrategy::ALL {
        let (status, body) = status_of(&downloader, strategy).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR, "{strategy}");
        assert!(body.is_empty(), "{strategy}");
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn file_gone_after_resolve_is_404_for_every_strategy() {
    let dir = tempfile::tempdir().unwrap();
    let store = FixedStore {
        root: dir.path().to_path_buf(),
        target: dir.path().join("vanished.bin"),
    };
    let downloader = Downloader::new(store, &test_config(dir.path())).unwrap();

    for strategy in TransferStrategy::ALL {
        let (status, body) = status_of(&downloader, strategy).await;
        assert_eq!(status, StatusCode::NOT_FOUND, "{strategy}");
        assert!(body.is_empty(), "{strategy}");
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn blocking_stream_removed_while_queued_is_404() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("f.bin");
    std::fs::write(&path, pattern(64 * 1024, 0)).unwrap();
    let config = ServerConfig {
        workers: 1,
        ..test_config(dir.path())
    };
    let store = LocalFileStore::new(dir.path()).await.unwrap();
    let downloader = Arc::new(Downloader::new(store, &config).unwrap());

    // Hold the only worker so the request resolves, then waits in the queue.
    let (gate_tx, gate_rx) = mpsc::channel::<()>();
    let (held_tx, held_rx) = tokio::sync::oneshot::channel();
    downloader
        .workers()
        .execute(move || {
            let _ = held_tx.send(());
            let _ = gate_rx.recv();
        })
        .unwrap();
    held_rx.await.unwrap();

    let request = {
        let downloader = downloader.clone();
        tokio::spawn(async move { status_of(&downloader, TransferStrategy::BlockingStream).await })
    };
    tokio::time::timeout(Duration::from_secs(5), async {
        while downloader.workers().queued() == 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("request never reached the worker queue");

    std::fs::remove_file(&path).unwrap();
    gate_tx.send(()).unwrap();

    let (status, body) = request.await.unwrap();
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body.is_empty());
}
