// ABOUTME: Main library entry point for stereospin
// ABOUTME: Exports public API for the session coordinator and the playback client

//! # stereospin
//!
//! Turns two or more devices into a synchronised "stereo field" for a single
//! audio stream: one device plays the left mono channel, another the right,
//! and optional extras play the full mix.
//!
//! The server side groups clients into sessions, assigns each one a channel
//! role, answers clock-sync pings, ingests remote sources into per-channel
//! artifacts, and fans out play/pause/seek broadcasts carrying a scheduled
//! server instant. The client side translates those instants through its own
//! clock-offset estimate and starts playback at the shared moment.
//!
//! ## Example: Running a Server
//!
//! ```no_run
//! use stereospin::server::{ServerConfig, StereoServer};
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = ServerConfig::new()
//!         .bind_addr("0.0.0.0:8080".parse().unwrap());
//!
//!     StereoServer::with_config(config).run().await.unwrap();
//! }
//! ```

#![warn(missing_docs)]

/// Playback client: clock sync, scheduled-start audio engine, status machine
pub mod client;
/// Protocol envelope definitions for WebSocket communication
pub mod protocol;
/// Server implementation: sessions, dispatcher, ingestion, library
pub mod server;

pub use protocol::messages::{ChannelRole, ClientMessage, ServerMessage};
pub use server::{ServerConfig, StereoServer};

/// Result type for stereospin operations
pub type Result<T> = std::result::Result<T, error::Error>;

/// Error types for stereospin
pub mod error {
    use thiserror::Error;

    /// Error types for stereospin operations
    #[derive(Error, Debug)]
    pub enum Error {
        /// Message could not be parsed or failed schema validation
        #[error("invalid message: {0}")]
        InvalidMessage(String),

        /// Source URL host is not on the acceptance list
        #[error("Only YouTube links are supported")]
        UrlRejected,

        /// External fetcher could not produce a stream URL
        #[error("fetch failed: {0}")]
        FetchFailed(String),

        /// Transcoder exited non-zero before the progressive-ready barrier
        #[error("transcode failed: {0}")]
        TranscodeFailed(String),

        /// `load_track` referenced an unknown track id
        #[error("track not found: {0}")]
        TrackNotFound(String),

        /// An ingestion is already in flight for this session
        #[error("an ingestion is already in progress for this session")]
        Busy,

        /// Audio backend is suspended and cannot be resumed programmatically
        #[error("audio backend is suspended")]
        BackendSuspended,

        /// Audio output or decode error
        #[error("audio error: {0}")]
        Output(String),

        /// WebSocket-related error
        #[error("websocket error: {0}")]
        WebSocket(String),

        /// Session persistence error
        #[error("persistence error: {0}")]
        Persist(String),

        /// Underlying I/O error
        #[error(transparent)]
        Io(#[from] std::io::Error),
    }
}
