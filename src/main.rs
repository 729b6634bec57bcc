use anyhow::Result;
use now_playing_bridge::{config::Config, server, session::MediaBridge};
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().init();

    let config = Config::load()?;

    #[cfg(target_os = "windows")]
    let bridge = MediaBridge::spawn(now_playing_bridge::session::GsmtcBackend::new);
    #[cfg(not(target_os = "windows"))]
    let bridge = MediaBridge::spawn(|| Ok(now_playing_bridge::session::UnsupportedBackend));

    info!("starting media bridge on port {}", config.server.port);
    server::serve(bridge, config.server.addr()).await
}
