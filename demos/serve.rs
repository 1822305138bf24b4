//! Run the media-dl REST API
//!
//! ```bash
//! RUST_LOG=media_dl=debug cargo run --example serve
//! ```
//!
//! Environment:
//! - `MEDIA_DL_BIND` - listen address (default 127.0.0.1:5200)
//! - `MEDIA_DL_OUTPUT_DIR` - where artifacts are written (default ./downloads)

use media_dl::{Config, MediaDownloader};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("media_dl=info")),
        )
        .init();

    let mut config = Config::default();
    if let Ok(bind) = std::env::var("MEDIA_DL_BIND") {
        config.server.api.bind_address = bind.parse()?;
    }
    if let Ok(dir) = std::env::var("MEDIA_DL_OUTPUT_DIR") {
        config.download.output_dir = dir.into();
    }

    let downloader = MediaDownloader::new(config.clone()).await?;
    tracing::info!(fetcher = downloader.fetcher_name(), "orchestrator ready");

    let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();
    let server = tokio::spawn(media_dl::api::start_api_server_with_shutdown(
        Arc::new(downloader.clone()),
        Arc::new(config),
        async {
            let _ = stop_rx.await;
        },
    ));

    media_dl::run_with_shutdown(downloader).await?;
    let _ = stop_tx.send(());
    server.await??;
    Ok(())
}
