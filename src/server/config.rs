// ABOUTME: Server configuration
// ABOUTME: Defines configurable parameters for the stereospin coordinator

use std::net::SocketAddr;
use std::path::PathBuf;

/// Server configuration
#[derive(Clone, Debug)]
pub struct ServerConfig {
    /// Address to bind the server to
    pub bind_addr: SocketAddr,
    /// WebSocket endpoint path
    pub ws_path: String,
    /// Directory holding per-track artifact subdirectories
    pub audio_root: PathBuf,
    /// Path of the persisted session↔track bindings document
    pub state_path: PathBuf,
    /// Lead time added to scheduled play broadcasts, in milliseconds
    pub lead_time_ms: f64,
    /// Artifact size at which ingestion signals progressive-ready, in bytes
    pub ready_bytes: u64,
    /// Interval between artifact size polls, in milliseconds
    pub poll_interval_ms: u64,
    /// How long an empty, trackless session lingers before it is dropped
    pub reap_delay_secs: u64,
    /// External fetcher binary (title / duration / stream-url probes)
    pub fetcher_bin: String,
    /// External transcoder binary (channel-splitting filter graph)
    pub transcoder_bin: String,
    /// External probe binary (artifact duration recovery)
    pub probe_bin: String,
    /// Hosts accepted by submit_link
    pub allowed_hosts: Vec<String>,
}

impl ServerConfig {
    /// Create a new server configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the bind address
    pub fn bind_addr(mut self, addr: SocketAddr) -> Self {
        self.bind_addr = addr;
        self
    }

    /// Set the WebSocket path
    pub fn ws_path(mut self, path: impl Into<String>) -> Self {
        self.ws_path = path.into();
        self
    }

    /// Set the audio library root directory
    pub fn audio_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.audio_root = root.into();
        self
    }

    /// Set the session persistence file path
    pub fn state_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.state_path = path.into();
        self
    }

    /// Set the scheduled-play lead time in milliseconds
    pub fn lead_time_ms(mut self, ms: f64) -> Self {
        self.lead_time_ms = ms;
        self
    }

    /// Set the idle-session reap delay in seconds
    pub fn reap_delay_secs(mut self, secs: u64) -> Self {
        self.reap_delay_secs = secs;
        self
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:8080".parse().unwrap(),
            ws_path: "/ws".to_string(),
            audio_root: PathBuf::from("audio"),
            state_path: PathBuf::from("sessions.json"),
            lead_time_ms: 500.0,
            ready_bytes: 500 * 1024,
            poll_interval_ms: 200,
            reap_delay_secs: 60,
            fetcher_bin: "yt-dlp".to_string(),
            transcoder_bin: "ffmpeg".to_string(),
            probe_bin: "ffprobe".to_string(),
            allowed_hosts: vec![
                "youtube.com".to_string(),
                "www.youtube.com".to_string(),
                "m.youtube.com".to_string(),
                "youtu.be".to_string(),
            ],
        }
    }
}
