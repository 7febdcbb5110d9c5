// ABOUTME: stereospin server binary
// ABOUTME: Standalone session coordinator for synchronized stereo-field playback

use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use stereospin::server::{ServerConfig, StereoServer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "stereospin")]
#[command(author, version, about = "Synchronized stereo-field session coordinator", long_about = None)]
struct Args {
    /// Address to bind the server to
    #[arg(short, long, default_value = "0.0.0.0:8080")]
    bind: SocketAddr,

    /// WebSocket endpoint path
    #[arg(long, default_value = "/ws")]
    path: String,

    /// Directory holding per-track artifact subdirectories
    #[arg(long, default_value = "audio")]
    audio_root: PathBuf,

    /// Path of the persisted session state document
    #[arg(long, default_value = "sessions.json")]
    state_file: PathBuf,

    /// Lead time for scheduled play broadcasts, in milliseconds
    #[arg(long, default_value = "500")]
    lead_ms: f64,

    /// External fetcher binary
    #[arg(long, default_value = "yt-dlp")]
    fetcher: String,

    /// External transcoder binary
    #[arg(long, default_value = "ffmpeg")]
    transcoder: String,

    /// External duration probe binary
    #[arg(long, default_value = "ffprobe")]
    probe: String,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let args = Args::parse();

    let filter = if args.verbose {
        "stereospin=debug,tower_http=debug"
    } else {
        "stereospin=info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("stereospin v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!("Bind: {}", args.bind);
    tracing::info!("Endpoint: ws://{}{}", args.bind, args.path);
    tracing::info!("Library: {}", args.audio_root.display());

    let config = ServerConfig::new()
        .bind_addr(args.bind)
        .ws_path(args.path)
        .audio_root(args.audio_root)
        .state_path(args.state_file)
        .lead_time_ms(args.lead_ms);
    let config = ServerConfig {
        fetcher_bin: args.fetcher,
        transcoder_bin: args.transcoder,
        probe_bin: args.probe,
        ..config
    };

    tracing::info!("Press Ctrl+C to stop");
    StereoServer::with_config(config).run().await
}
