// ABOUTME: Playback session client
// ABOUTME: Connects to the coordinator, keeps the clock warm, and drives the audio engine

use crate::client::clock::{self, ClockSync, SYNC_INTERVAL, WARMUP_INTERVAL, WARMUP_PINGS};
use crate::client::engine::{fetch_artifact, AudioEngine};
use crate::client::status::{StatusEvent, StatusMachine};
use crate::error::Error;
use crate::protocol::messages::{
    decode_server, ChannelRole, ClientEntry, ClientMessage, ServerMessage, TrackEntry,
};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message as WsMessage;

/// Transport middleware hook: sees every raw frame before the dispatcher.
pub trait MessageTap: Send {
    /// Called with each outgoing frame
    fn on_send(&self, _raw: &str) {}
    /// Called with each incoming frame
    fn on_receive(&self, _raw: &str) {}
}

/// A [`MessageTap`] that tees frames into the debug log.
pub struct LogTap;

impl MessageTap for LogTap {
    fn on_send(&self, raw: &str) {
        log::debug!("→ {}", raw);
    }
    fn on_receive(&self, raw: &str) {
        log::debug!("← {}", raw);
    }
}

/// Handle for issuing user commands into a running [`SessionClient`].
#[derive(Clone)]
pub struct ClientControls {
    tx: mpsc::UnboundedSender<ClientMessage>,
}

impl ClientControls {
    /// Request a synchronized play
    pub fn play(&self) {
        let _ = self.tx.send(ClientMessage::PlayRequest);
    }

    /// Request a pause
    pub fn pause(&self) {
        let _ = self.tx.send(ClientMessage::PauseRequest);
    }

    /// Request a seek
    pub fn seek(&self, target_time: f64) {
        let _ = self.tx.send(ClientMessage::SeekRequest { target_time });
    }

    /// Request a per-channel volume change
    pub fn set_volume(&self, channel: ChannelRole, volume: u8) {
        let _ = self.tx.send(ClientMessage::VolumeRequest { channel, volume });
    }

    /// Submit a source URL for ingestion
    pub fn submit_link(&self, url: impl Into<String>) {
        let _ = self.tx.send(ClientMessage::SubmitLink { url: url.into() });
    }

    /// Bind a library track to the session
    pub fn load_track(&self, track_id: impl Into<String>) {
        let _ = self.tx.send(ClientMessage::LoadTrack {
            track_id: track_id.into(),
        });
    }
}

/// A stereospin playback client.
///
/// `run` owns the connection and processes frames serially; user commands
/// arrive through [`ClientControls`]. The future is not `Send` (the audio
/// engine owns a platform output stream), so drive it from one thread.
pub struct SessionClient {
    ws_url: String,
    http_base: String,
    session_id: String,
    client_id: Option<String>,
    channel: Option<ChannelRole>,
    clock: ClockSync,
    engine: AudioEngine,
    status: StatusMachine,
    roster: Vec<ClientEntry>,
    tracks: Vec<TrackEntry>,
    tap: Option<Box<dyn MessageTap>>,
    controls_tx: mpsc::UnboundedSender<ClientMessage>,
    controls_rx: Option<mpsc::UnboundedReceiver<ClientMessage>>,
}

impl SessionClient {
    /// Create a client for `ws_url` (e.g. `ws://host:8080/ws`) joining
    /// `session_id`.
    pub fn new(ws_url: impl Into<String>, session_id: impl Into<String>) -> Self {
        let ws_url = ws_url.into();
        let http_base = http_base_of(&ws_url);
        let (controls_tx, controls_rx) = mpsc::unbounded_channel();

        Self {
            ws_url,
            http_base,
            session_id: session_id.into(),
            client_id: None,
            channel: None,
            clock: ClockSync::new(),
            engine: AudioEngine::new(),
            status: StatusMachine::new(),
            roster: Vec::new(),
            tracks: Vec::new(),
            tap: None,
            controls_tx,
            controls_rx: Some(controls_rx),
        }
    }

    /// Install a transport middleware tap
    pub fn with_tap(mut self, tap: Box<dyn MessageTap>) -> Self {
        self.tap = Some(tap);
        self
    }

    /// Handle for issuing commands while the client runs
    pub fn controls(&self) -> ClientControls {
        ClientControls {
            tx: self.controls_tx.clone(),
        }
    }

    /// The status machine, e.g. to register a display observer before `run`
    pub fn status_mut(&mut self) -> &mut StatusMachine {
        &mut self.status
    }

    /// The audio engine, e.g. to register an event observer before `run`
    pub fn engine_mut(&mut self) -> &mut AudioEngine {
        &mut self.engine
    }

    /// Assigned channel role, once joined
    pub fn channel(&self) -> Option<ChannelRole> {
        self.channel
    }

    /// Server-assigned client id, once joined
    pub fn client_id(&self) -> Option<&str> {
        self.client_id.as_deref()
    }

    /// Latest roster broadcast
    pub fn roster(&self) -> &[ClientEntry] {
        &self.roster
    }

    /// Latest library broadcast
    pub fn tracks(&self) -> &[TrackEntry] {
        &self.tracks
    }

    /// Connect, join, and process the session until the server closes the
    /// connection.
    pub async fn run(mut self) -> crate::Result<()> {
        let (ws, _) = tokio_tungstenite::connect_async(&self.ws_url)
            .await
            .map_err(|e| Error::WebSocket(e.to_string()))?;
        let (mut ws_tx, mut ws_rx) = ws.split();

        self.send(
            &mut ws_tx,
            &ClientMessage::JoinSession {
                session_id: self.session_id.clone(),
            },
        )
        .await?;

        // The command receiver becomes a local so its borrow does not pin
        // `self` inside the select loop. `run` consumes the client, so the
        // fallback channel is never actually used.
        let (_fallback_tx, fallback_rx) = mpsc::unbounded_channel();
        let mut controls_rx = self.controls_rx.take().unwrap_or(fallback_rx);

        // Warm-up schedule: three rapid pings, then the steady 5s cadence.
        let mut pings_sent: u32 = 0;
        let mut next_ping = tokio::time::Instant::now();
        let mut keepalive = tokio::time::interval(std::time::Duration::from_secs(1));

        loop {
            tokio::select! {
                _ = tokio::time::sleep_until(next_ping) => {
                    let ping = ClientMessage::Ping {
                        client_timestamp: clock::local_epoch_ms(),
                    };
                    // Fire-and-forget: a lost ping just delays the next sample.
                    if let Err(e) = self.send(&mut ws_tx, &ping).await {
                        log::warn!("Ping failed: {}", e);
                    }
                    pings_sent += 1;
                    next_ping += if pings_sent < WARMUP_PINGS {
                        WARMUP_INTERVAL
                    } else {
                        SYNC_INTERVAL
                    };
                }

                _ = keepalive.tick() => {
                    self.engine.keepalive();
                }

                Some(cmd) = controls_rx.recv() => {
                    self.send(&mut ws_tx, &cmd).await?;
                }

                msg = ws_rx.next() => {
                    match msg {
                        Some(Ok(WsMessage::Text(text))) => {
                            self.handle_frame(&text, &mut ws_tx).await?;
                        }
                        Some(Ok(WsMessage::Close(_))) | None => {
                            log::info!("Server closed the connection");
                            return Ok(());
                        }
                        Some(Ok(_)) => {}
                        Some(Err(e)) => {
                            return Err(Error::WebSocket(e.to_string()));
                        }
                    }
                }
            }
        }
    }

    async fn send<S>(&mut self, ws_tx: &mut S, msg: &ClientMessage) -> crate::Result<()>
    where
        S: SinkExt<WsMessage> + Unpin,
        S::Error: std::fmt::Display,
    {
        let json =
            serde_json::to_string(msg).map_err(|e| Error::InvalidMessage(e.to_string()))?;
        if let Some(tap) = &self.tap {
            tap.on_send(&json);
        }
        ws_tx
            .send(WsMessage::Text(json.into()))
            .await
            .map_err(|e| Error::WebSocket(e.to_string()))
    }

    async fn handle_frame<S>(&mut self, text: &str, ws_tx: &mut S) -> crate::Result<()>
    where
        S: SinkExt<WsMessage> + Unpin,
        S::Error: std::fmt::Display,
    {
        if let Some(tap) = &self.tap {
            tap.on_receive(text);
        }

        let msg = match decode_server(text) {
            Ok(Some(msg)) => msg,
            Ok(None) => return Ok(()),
            Err(e) => {
                log::warn!("Dropping invalid frame: {}", e);
                return Ok(());
            }
        };

        match msg {
            ServerMessage::SessionJoined {
                session_id,
                client_id,
                channel,
            } => {
                log::info!(
                    "Joined session {} as {} (channel {})",
                    session_id,
                    client_id,
                    channel.as_str()
                );
                self.session_id = session_id;
                self.client_id = Some(client_id);
                self.channel = Some(channel);
            }

            ServerMessage::Pong {
                server_timestamp,
                client_timestamp,
            } => {
                let sample = self.clock.record_pong(
                    client_timestamp,
                    server_timestamp,
                    clock::local_epoch_ms(),
                );
                log::debug!(
                    "Clock sample: latency {:.1}ms, offset {:.1}ms (median {:.1}ms)",
                    sample.latency_ms,
                    sample.offset_ms,
                    self.clock.offset_ms()
                );
            }

            ServerMessage::AudioLoading { url } => {
                log::info!("Session is ingesting {}", url);
                self.status.apply(StatusEvent::Load);
            }

            ServerMessage::AudioReady {
                audio_url, title, ..
            } => {
                self.status.apply(StatusEvent::Load);
                log::info!("Loading \"{}\" from {}", title, audio_url);

                let url = self.resolve_url(&audio_url);
                let fetched =
                    tokio::task::spawn_blocking(move || fetch_artifact(&url))
                        .await
                        .map_err(|e| Error::Output(e.to_string()))?;

                match fetched.and_then(|bytes| self.engine.load_bytes(bytes)) {
                    Ok(duration) => {
                        log::info!("Artifact loaded ({duration:.1}s)");
                        self.send(ws_tx, &ClientMessage::Ready).await?;
                        self.status.apply(StatusEvent::AutoReady);
                    }
                    Err(e) => {
                        log::warn!("Failed to load artifact: {}", e);
                        self.status.apply(StatusEvent::Error);
                    }
                }
            }

            ServerMessage::Play {
                start_time,
                server_timestamp,
            } => {
                let at = self.clock.server_to_instant(server_timestamp);
                match self.engine.play_at(start_time, at) {
                    Ok(()) => {
                        self.status.apply(StatusEvent::Play);
                    }
                    Err(Error::BackendSuspended) => {
                        // Needs a user gesture; surfaced in the UI only.
                        log::warn!("Backend suspended; waiting for user interaction");
                    }
                    Err(e) => log::warn!("play failed: {}", e),
                }
            }

            ServerMessage::Pause { current_time, .. } => {
                self.engine.pause();
                // State correction: adopt the coordinator's position.
                if let Err(e) = self.engine.seek_to(current_time) {
                    log::warn!("pause correction failed: {}", e);
                }
                self.status.apply(StatusEvent::Pause);
            }

            ServerMessage::Seek { target_time, .. } => {
                if let Err(e) = self.engine.seek_to(target_time) {
                    log::warn!("seek failed: {}", e);
                }
            }

            ServerMessage::VolumeChange { channel, volume } => {
                if Some(channel) == self.channel {
                    self.engine.set_volume(f32::from(volume) / 100.0);
                }
            }

            ServerMessage::ClientList { clients } => {
                self.roster = clients;
            }

            ServerMessage::TrackList { tracks } => {
                self.tracks = tracks;
            }

            ServerMessage::Error { message } => {
                log::warn!("Server error: {}", message);
                self.status.apply(StatusEvent::Error);
            }
        }

        Ok(())
    }

    fn resolve_url(&self, audio_url: &str) -> String {
        if audio_url.starts_with('/') {
            format!("{}{}", self.http_base, audio_url)
        } else {
            audio_url.to_string()
        }
    }
}

/// Derive the HTTP origin serving artifacts from the WebSocket URL.
fn http_base_of(ws_url: &str) -> String {
    let (scheme, rest) = if let Some(rest) = ws_url.strip_prefix("wss://") {
        ("https", rest)
    } else if let Some(rest) = ws_url.strip_prefix("ws://") {
        ("http", rest)
    } else {
        ("http", ws_url)
    };

    let authority = rest.split('/').next().unwrap_or(rest);
    format!("{scheme}://{authority}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_http_base_derivation() {
        assert_eq!(http_base_of("ws://host:8080/ws"), "http://host:8080");
        assert_eq!(http_base_of("wss://example.com/ws"), "https://example.com");
        assert_eq!(http_base_of("ws://host:8080"), "http://host:8080");
    }

    #[test]
    fn test_resolve_relative_artifact_url() {
        let client = SessionClient::new("ws://host:8080/ws", "abcd");
        assert_eq!(
            client.resolve_url("/audio/aaaaaaaaaa/left.mp3"),
            "http://host:8080/audio/aaaaaaaaaa/left.mp3"
        );
        assert_eq!(
            client.resolve_url("https://cdn.example/x.mp3"),
            "https://cdn.example/x.mp3"
        );
    }
}
