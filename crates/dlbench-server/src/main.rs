use std::sync::Arc;

use tracing::info;

use dlbench_server::config::ServerConfig;
use dlbench_server::dispatch::Downloader;
use dlbench_server::routes::AppState;

fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "dlbench_server=debug,dlbench_core=info,tower_http=debug".into()),
        )
        .init();

    let config = ServerConfig::from_env()?;

    // Event-loop threads are sized from config, so the runtime is built by hand.
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(config.event_loops)
        .thread_name("dlbench-event-loop")
        .enable_all()
        .build()?;

    runtime.block_on(run(config))
}

async fn run(config: ServerConfig) -> anyhow::Result<()> {
    let downloader = Downloader::from_config(&config).await?;
    let state = AppState {
        downloader: Arc::new(downloader),
    };
    let app = dlbench_server::app(state);

    let addr = config.bind_addr()?;
    info!("dlbench server listening on {}", addr);
    info!(
        "Event loops: {}, workers: {}, carriers: {}, chunk: {} B, async chunk: {} B",
        config.event_loops, config.workers, config.carriers, config.chunk_size, config.async_chunk_size
    );

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        let mut sigterm =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                .expect("failed to install SIGTERM handler");
        tokio::select! {
            _ = ctrl_c => info!("Received Ctrl+C, shutting down..."),
            _ = sigterm.recv() => info!("Received SIGTERM, shutting down..."),
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
        info!("Received Ctrl+C, shutting down...");
    }
}
