// ABOUTME: Session store: rosters, channel assignment, playback state, fan-out
// ABOUTME: Thread-safe registry of sessions; sole owner of Session and Client records

use crate::protocol::messages::{ChannelRole, ClientEntry, ServerMessage};
use crate::server::clock::ServerClock;
use crate::server::library::Track;
use crate::server::persist::{self, PersistedSession};
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// Unique client identifier
pub type ClientId = String;

/// Playback state of a session
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaybackState {
    /// Whether the session is playing
    pub is_playing: bool,
    /// Position within the track in seconds
    pub current_time: f64,
    /// Last playback mutation, milliseconds since the Unix epoch
    pub last_sync_at: f64,
}

/// Partial update applied by [`SessionStore::update_playback`]
#[derive(Debug, Default, Clone, Copy)]
pub struct PlaybackPatch {
    /// New playing flag, if any
    pub is_playing: Option<bool>,
    /// New position, if any
    pub current_time: Option<f64>,
}

/// A connected client within a session
#[derive(Debug)]
pub struct ConnectedClient {
    /// Unique client identifier
    pub id: ClientId,
    /// Assigned channel role
    pub channel: ChannelRole,
    /// One-way latency estimate in milliseconds
    pub latency_ms: f64,
    /// Whether the client reported ready for the current track
    pub is_ready: bool,
    /// Outbox to this client's connection writer task
    tx: mpsc::UnboundedSender<String>,
}

impl ConnectedClient {
    fn send(&self, msg: &ServerMessage) -> bool {
        match serde_json::to_string(msg) {
            Ok(json) => self.tx.send(json).is_ok(),
            Err(e) => {
                log::error!("Failed to serialize message for {}: {}", self.id, e);
                false
            }
        }
    }

    fn entry(&self) -> ClientEntry {
        ClientEntry {
            id: self.id.clone(),
            channel: self.channel,
            ready: self.is_ready,
        }
    }
}

/// A named room multiplexing one audio stream across clients
#[derive(Debug)]
pub struct Session {
    /// Session id
    pub id: String,
    /// Creation time, milliseconds since the Unix epoch
    pub created_at: f64,
    /// The bound track, if any (at most one at any moment)
    pub audio_source: Option<Track>,
    /// Current playback state
    pub playback: PlaybackState,
    /// Clients by id
    clients: HashMap<ClientId, ConnectedClient>,
    /// Whether an ingestion is currently running for this session
    ingest_in_flight: bool,
}

impl Session {
    fn new(id: String, now_ms: f64) -> Self {
        Self {
            id,
            created_at: now_ms,
            audio_source: None,
            playback: PlaybackState {
                is_playing: false,
                current_time: 0.0,
                last_sync_at: now_ms,
            },
            clients: HashMap::new(),
            ingest_in_flight: false,
        }
    }

    /// First client gets left, second right, then the less-populated side
    /// (ties go left). Stereo is reserved and never auto-assigned.
    fn assign_channel(&self) -> ChannelRole {
        let left = self
            .clients
            .values()
            .filter(|c| c.channel == ChannelRole::Left)
            .count();
        let right = self
            .clients
            .values()
            .filter(|c| c.channel == ChannelRole::Right)
            .count();

        if left <= right {
            ChannelRole::Left
        } else {
            ChannelRole::Right
        }
    }

    fn roster(&self) -> Vec<ClientEntry> {
        let mut entries: Vec<ClientEntry> = self.clients.values().map(|c| c.entry()).collect();
        entries.sort_by(|a, b| a.id.cmp(&b.id));
        entries
    }
}

/// Read-only session summary exposed over `/api/session/:id`
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionView {
    /// Session id
    pub id: String,
    /// Whether a track is bound
    pub has_audio: bool,
    /// Number of connected clients
    pub client_count: usize,
    /// Current playback state
    pub playback_state: PlaybackState,
}

/// Manages all sessions
///
/// All session and client mutation happens through this store, under a single
/// lock, so broadcasts never observe partially-updated state and every client
/// in a session sees the same message order.
#[derive(Debug)]
pub struct SessionStore {
    sessions: Arc<RwLock<HashMap<String, Session>>>,
    clock: Arc<ServerClock>,
    state_path: PathBuf,
    reap_delay: Duration,
}

impl SessionStore {
    /// Create a new session store
    pub fn new(clock: Arc<ServerClock>, state_path: PathBuf, reap_delay: Duration) -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            clock,
            state_path,
            reap_delay,
        }
    }

    /// Recreate track-bound sessions from the persisted document.
    ///
    /// Rehydrated sessions come back with an empty roster and a reset
    /// playback state of `{stopped, 0, now}`.
    pub fn rehydrate(&self) {
        let doc = persist::load(&self.state_path);
        if doc.sessions.is_empty() {
            return;
        }

        let now = self.clock.now_ms();
        let mut sessions = self.sessions.write();
        for (id, persisted) in doc.sessions {
            let mut session = Session::new(id.clone(), now);
            session.created_at = persisted.created_at;
            session.audio_source = Some(persisted.audio_source);
            sessions.insert(id, session);
        }
        log::info!("Rehydrated {} session(s) from {}", sessions.len(), self.state_path.display());
    }

    /// Attach a connection to a session, creating the session if absent
    /// (preserving the supplied id). Returns the assigned channel role.
    pub fn attach(
        &self,
        session_id: &str,
        client_id: &str,
        tx: mpsc::UnboundedSender<String>,
    ) -> ChannelRole {
        let mut sessions = self.sessions.write();
        let session = sessions
            .entry(session_id.to_string())
            .or_insert_with(|| Session::new(session_id.to_string(), self.clock.now_ms()));

        let channel = session.assign_channel();
        session.clients.insert(
            client_id.to_string(),
            ConnectedClient {
                id: client_id.to_string(),
                channel,
                latency_ms: 0.0,
                is_ready: false,
                tx,
            },
        );

        log::info!(
            "Client {} joined session {} as {} ({} total)",
            client_id,
            session_id,
            channel.as_str(),
            session.clients.len()
        );
        channel
    }

    /// Remove a client and schedule the idle sweep: 60 s later the session is
    /// dropped iff it is still empty and still trackless.
    pub fn detach(&self, session_id: &str, client_id: &str) {
        {
            let mut sessions = self.sessions.write();
            if let Some(session) = sessions.get_mut(session_id) {
                session.clients.remove(client_id);
                log::info!(
                    "Client {} left session {} ({} remaining)",
                    client_id,
                    session_id,
                    session.clients.len()
                );
            }
        }

        let store = self.clone();
        let session_id = session_id.to_string();
        tokio::spawn(async move {
            tokio::time::sleep(store.reap_delay).await;
            store.reap(&session_id);
        });
    }

    /// Drop a session iff it is empty and has no bound track.
    pub fn reap(&self, session_id: &str) {
        let mut sessions = self.sessions.write();
        let dead = sessions
            .get(session_id)
            .map(|s| s.clients.is_empty() && s.audio_source.is_none())
            .unwrap_or(false);
        if dead {
            sessions.remove(session_id);
            log::info!("Reaped idle session {}", session_id);
        }
    }

    /// Bind a track to a session.
    ///
    /// Resets playback to `{stopped, 0, now}`, clears every client's ready
    /// flag, and persists the binding. Persistence failures are logged; the
    /// in-memory state stays authoritative for this process lifetime.
    pub fn set_track(&self, session_id: &str, track: Track) {
        let entries: Vec<PersistedSession> = {
            let mut sessions = self.sessions.write();
            let Some(session) = sessions.get_mut(session_id) else {
                return;
            };

            session.audio_source = Some(track);
            session.playback = PlaybackState {
                is_playing: false,
                current_time: 0.0,
                last_sync_at: self.clock.now_ms(),
            };
            for client in session.clients.values_mut() {
                client.is_ready = false;
            }

            sessions
                .values()
                .filter_map(|s| {
                    s.audio_source.as_ref().map(|track| PersistedSession {
                        id: s.id.clone(),
                        created_at: s.created_at,
                        audio_source: track.clone(),
                    })
                })
                .collect()
        };

        if let Err(e) = persist::save_merge(&self.state_path, &entries) {
            log::error!("Failed to persist session state: {}", e);
        }
    }

    /// Apply a partial playback update; always bumps `last_sync_at`.
    /// Not persisted (ephemeral by design).
    pub fn update_playback(&self, session_id: &str, patch: PlaybackPatch) {
        let mut sessions = self.sessions.write();
        if let Some(session) = sessions.get_mut(session_id) {
            if let Some(playing) = patch.is_playing {
                session.playback.is_playing = playing;
            }
            if let Some(time) = patch.current_time {
                session.playback.current_time = time;
            }
            session.playback.last_sync_at = self.clock.now_ms();
        }
    }

    /// Record a client's readiness for the current track.
    pub fn set_ready(&self, session_id: &str, client_id: &str, ready: bool) {
        let mut sessions = self.sessions.write();
        if let Some(client) = sessions
            .get_mut(session_id)
            .and_then(|s| s.clients.get_mut(client_id))
        {
            client.is_ready = ready;
        }
    }

    /// Record a client's one-way latency estimate in milliseconds.
    pub fn set_latency(&self, session_id: &str, client_id: &str, latency_ms: f64) {
        let mut sessions = self.sessions.write();
        if let Some(client) = sessions
            .get_mut(session_id)
            .and_then(|s| s.clients.get_mut(client_id))
        {
            client.latency_ms = latency_ms;
        }
    }

    /// Whether every current client has reported ready (false for an empty roster).
    pub fn all_ready(&self, session_id: &str) -> bool {
        let sessions = self.sessions.read();
        sessions
            .get(session_id)
            .map(|s| !s.clients.is_empty() && s.clients.values().all(|c| c.is_ready))
            .unwrap_or(false)
    }

    /// Current roster, sorted by client id.
    pub fn roster(&self, session_id: &str) -> Vec<ClientEntry> {
        self.sessions
            .read()
            .get(session_id)
            .map(|s| s.roster())
            .unwrap_or_default()
    }

    /// Broadcast a message to every client in a session, optionally skipping
    /// one. Best-effort: a closed outbox never aborts the fan-out to others.
    pub fn broadcast(&self, session_id: &str, msg: &ServerMessage, exclude: Option<&str>) {
        let sessions = self.sessions.read();
        if let Some(session) = sessions.get(session_id) {
            for client in session.clients.values() {
                if exclude == Some(client.id.as_str()) {
                    continue;
                }
                if !client.send(msg) {
                    log::debug!("Dropped broadcast to disconnected client {}", client.id);
                }
            }
        }
    }

    /// Send a message to one client.
    pub fn send_to(&self, session_id: &str, client_id: &str, msg: &ServerMessage) -> bool {
        let sessions = self.sessions.read();
        sessions
            .get(session_id)
            .and_then(|s| s.clients.get(client_id))
            .map(|c| c.send(msg))
            .unwrap_or(false)
    }

    /// Broadcast the current roster to the whole session.
    pub fn broadcast_client_list(&self, session_id: &str) {
        let msg = ServerMessage::ClientList {
            clients: self.roster(session_id),
        };
        self.broadcast(session_id, &msg, None);
    }

    /// Send `audio_ready` for the bound track to one client, with the
    /// artifact URL matching its channel. No-op for trackless sessions.
    pub fn send_audio_ready_to(&self, session_id: &str, client_id: &str) {
        let sessions = self.sessions.read();
        let Some(session) = sessions.get(session_id) else {
            return;
        };
        let (Some(track), Some(client)) =
            (session.audio_source.as_ref(), session.clients.get(client_id))
        else {
            return;
        };
        client.send(&audio_ready(track, client.channel));
    }

    /// Fan `audio_ready` out to every client, each with its own channel's
    /// artifact URL.
    pub fn broadcast_audio_ready(&self, session_id: &str) {
        let sessions = self.sessions.read();
        let Some(session) = sessions.get(session_id) else {
            return;
        };
        let Some(track) = session.audio_source.as_ref() else {
            return;
        };
        for client in session.clients.values() {
            client.send(&audio_ready(track, client.channel));
        }
    }

    /// Schedule a synchronized play.
    ///
    /// A single shared target instant `now + lead` is computed once; each
    /// peer receives it advanced by half its own latency estimate, so all
    /// engines fire at the same wall-clock moment regardless of RTT.
    pub fn broadcast_play(&self, session_id: &str, lead_ms: f64) {
        let mut sessions = self.sessions.write();
        let Some(session) = sessions.get_mut(session_id) else {
            return;
        };

        let now = self.clock.now_ms();
        let scheduled = now + lead_ms;
        let start_time = session.playback.current_time;

        for client in session.clients.values() {
            client.send(&ServerMessage::Play {
                start_time,
                server_timestamp: scheduled - client.latency_ms / 2.0,
            });
        }

        session.playback.is_playing = true;
        session.playback.last_sync_at = now;
    }

    /// Broadcast a pause, applied by clients at receipt (no lead time; a
    /// state correction, not a musical event).
    pub fn broadcast_pause(&self, session_id: &str) {
        let mut sessions = self.sessions.write();
        let Some(session) = sessions.get_mut(session_id) else {
            return;
        };

        let now = self.clock.now_ms();
        if session.playback.is_playing {
            session.playback.current_time += (now - session.playback.last_sync_at) / 1000.0;
        }
        session.playback.is_playing = false;
        session.playback.last_sync_at = now;

        let msg = ServerMessage::Pause {
            current_time: session.playback.current_time,
            server_timestamp: now,
        };
        for client in session.clients.values() {
            client.send(&msg);
        }
    }

    /// Broadcast a seek, applied by clients at receipt. The target is
    /// clamped against the bound track's duration when one is known.
    pub fn broadcast_seek(&self, session_id: &str, target_time: f64) {
        let mut sessions = self.sessions.write();
        let Some(session) = sessions.get_mut(session_id) else {
            return;
        };

        let mut target = target_time.max(0.0);
        if let Some(track) = &session.audio_source {
            if track.duration > 0.0 {
                target = target.min(track.duration);
            }
        }

        let now = self.clock.now_ms();
        session.playback.current_time = target;
        session.playback.last_sync_at = now;

        let msg = ServerMessage::Seek {
            target_time: target,
            server_timestamp: now,
        };
        for client in session.clients.values() {
            client.send(&msg);
        }
    }

    /// Try to claim the session's single ingestion slot. Returns false if an
    /// ingestion is already in flight (the `Busy` refusal).
    pub fn begin_ingest(&self, session_id: &str) -> bool {
        let mut sessions = self.sessions.write();
        match sessions.get_mut(session_id) {
            Some(session) if !session.ingest_in_flight => {
                session.ingest_in_flight = true;
                true
            }
            _ => false,
        }
    }

    /// Release the session's ingestion slot.
    pub fn finish_ingest(&self, session_id: &str) {
        let mut sessions = self.sessions.write();
        if let Some(session) = sessions.get_mut(session_id) {
            session.ingest_in_flight = false;
        }
    }

    /// The bound track, if any.
    pub fn track_of(&self, session_id: &str) -> Option<Track> {
        self.sessions
            .read()
            .get(session_id)
            .and_then(|s| s.audio_source.clone())
    }

    /// Read-only summary for the HTTP surface; `None` for unknown sessions.
    pub fn view(&self, session_id: &str) -> Option<SessionView> {
        let sessions = self.sessions.read();
        sessions.get(session_id).map(|s| SessionView {
            id: s.id.clone(),
            has_audio: s.audio_source.is_some(),
            client_count: s.clients.len(),
            playback_state: s.playback.clone(),
        })
    }
}

fn audio_ready(track: &Track, channel: ChannelRole) -> ServerMessage {
    ServerMessage::AudioReady {
        audio_url: track.files.for_channel(channel).to_string(),
        duration: track.duration,
        title: track.title.clone(),
        track_id: track.id.clone(),
    }
}

impl Clone for SessionStore {
    fn clone(&self) -> Self {
        Self {
            sessions: Arc::clone(&self.sessions),
            clock: Arc::clone(&self.clock),
            state_path: self.state_path.clone(),
            reap_delay: self.reap_delay,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::library::TrackFiles;

    fn test_store(dir: &std::path::Path) -> SessionStore {
        SessionStore::new(
            Arc::new(ServerClock::new()),
            dir.join("sessions.json"),
            Duration::from_millis(50),
        )
    }

    fn test_track(id: &str) -> Track {
        Track {
            id: id.to_string(),
            title: "A Song".to_string(),
            duration: 240.0,
            files: TrackFiles::for_track(id),
            original_url: "https://youtu.be/xyz".to_string(),
            created_at: 1.0,
        }
    }

    fn outbox() -> (
        mpsc::UnboundedSender<String>,
        mpsc::UnboundedReceiver<String>,
    ) {
        mpsc::unbounded_channel()
    }

    fn next_msg(rx: &mut mpsc::UnboundedReceiver<String>) -> ServerMessage {
        let text = rx.try_recv().expect("expected a message");
        serde_json::from_str(&text).unwrap()
    }

    #[test]
    fn test_channel_assignment_balance() {
        let dir = tempfile::tempdir().unwrap();
        let store = test_store(dir.path());

        let mut roles = Vec::new();
        let mut outboxes = Vec::new();
        for i in 0..7 {
            let (tx, rx) = outbox();
            outboxes.push(rx);
            roles.push(store.attach("s", &format!("c{i}"), tx));
        }

        assert_eq!(roles[0], ChannelRole::Left);
        assert_eq!(roles[1], ChannelRole::Right);

        for n in 2..=7 {
            let left = roles[..n].iter().filter(|r| **r == ChannelRole::Left).count() as i64;
            let right = roles[..n].iter().filter(|r| **r == ChannelRole::Right).count() as i64;
            assert!((left - right).abs() <= 1, "unbalanced at n={n}");
        }
    }

    #[test]
    fn test_set_track_resets_readiness_and_playback() {
        let dir = tempfile::tempdir().unwrap();
        let store = test_store(dir.path());

        let (tx_a, _rx_a) = outbox();
        let (tx_b, _rx_b) = outbox();
        store.attach("s", "a", tx_a);
        store.attach("s", "b", tx_b);

        store.set_ready("s", "a", true);
        store.set_ready("s", "b", true);
        assert!(store.all_ready("s"));

        store.update_playback(
            "s",
            PlaybackPatch {
                is_playing: Some(true),
                current_time: Some(42.0),
            },
        );

        store.set_track("s", test_track("aaaaaaaaaa"));

        assert!(!store.all_ready("s"));
        let view = store.view("s").unwrap();
        assert!(!view.playback_state.is_playing);
        assert_eq!(view.playback_state.current_time, 0.0);
    }

    #[test]
    fn test_all_ready_needs_every_client() {
        let dir = tempfile::tempdir().unwrap();
        let store = test_store(dir.path());

        let (tx_a, _rx_a) = outbox();
        let (tx_b, _rx_b) = outbox();
        store.attach("s", "a", tx_a);
        store.attach("s", "b", tx_b);

        assert!(!store.all_ready("s"));
        store.set_ready("s", "a", true);
        assert!(!store.all_ready("s"));
        store.set_ready("s", "b", true);
        assert!(store.all_ready("s"));
    }

    #[test]
    fn test_scheduled_play_compensates_latency() {
        let dir = tempfile::tempdir().unwrap();
        let store = test_store(dir.path());

        let (tx_a, mut rx_a) = outbox();
        let (tx_b, mut rx_b) = outbox();
        store.attach("s", "a", tx_a);
        store.attach("s", "b", tx_b);
        store.set_latency("s", "a", 20.0);
        store.set_latency("s", "b", 120.0);

        store.broadcast_play("s", 500.0);

        let (ServerMessage::Play { start_time: st_a, server_timestamp: ts_a },
             ServerMessage::Play { start_time: st_b, server_timestamp: ts_b }) =
            (next_msg(&mut rx_a), next_msg(&mut rx_b))
        else {
            panic!("expected play broadcasts");
        };

        assert_eq!(st_a, 0.0);
        assert_eq!(st_b, 0.0);
        // A (latency 20) is scheduled 10ms later than the shared target minus
        // nothing; B (latency 120) 60ms earlier: the gap is exactly 50ms.
        assert!((ts_a - ts_b - 50.0).abs() < 1e-6);

        assert!(store.view("s").unwrap().playback_state.is_playing);
    }

    #[test]
    fn test_pause_folds_elapsed_time() {
        let dir = tempfile::tempdir().unwrap();
        let store = test_store(dir.path());

        let (tx, mut rx) = outbox();
        store.attach("s", "a", tx);
        store.set_track("s", test_track("aaaaaaaaaa"));

        store.broadcast_play("s", 0.0);
        let _ = rx.try_recv(); // discard the play broadcast

        std::thread::sleep(Duration::from_millis(30));
        store.broadcast_pause("s");

        let ServerMessage::Pause { current_time, .. } = next_msg(&mut rx) else {
            panic!("expected pause");
        };
        assert!(current_time >= 0.03, "elapsed time folded in: {current_time}");
        assert!(!store.view("s").unwrap().playback_state.is_playing);
    }

    #[test]
    fn test_seek_clamps_to_duration() {
        let dir = tempfile::tempdir().unwrap();
        let store = test_store(dir.path());

        let (tx, mut rx) = outbox();
        store.attach("s", "a", tx);
        store.set_track("s", test_track("aaaaaaaaaa"));

        store.broadcast_seek("s", 9999.0);
        let ServerMessage::Seek { target_time, .. } = next_msg(&mut rx) else {
            panic!("expected seek");
        };
        assert_eq!(target_time, 240.0);

        store.broadcast_seek("s", -5.0);
        let ServerMessage::Seek { target_time, .. } = next_msg(&mut rx) else {
            panic!("expected seek");
        };
        assert_eq!(target_time, 0.0);
    }

    #[test]
    fn test_audio_ready_matches_channel() {
        let dir = tempfile::tempdir().unwrap();
        let store = test_store(dir.path());

        let (tx_a, mut rx_a) = outbox();
        let (tx_b, mut rx_b) = outbox();
        store.attach("s", "a", tx_a);
        store.attach("s", "b", tx_b);
        store.set_track("s", test_track("aaaaaaaaaa"));

        store.broadcast_audio_ready("s");

        let ServerMessage::AudioReady { audio_url: url_a, .. } = next_msg(&mut rx_a) else {
            panic!("expected audio_ready");
        };
        let ServerMessage::AudioReady { audio_url: url_b, .. } = next_msg(&mut rx_b) else {
            panic!("expected audio_ready");
        };
        assert_eq!(url_a, "/audio/aaaaaaaaaa/left.mp3");
        assert_eq!(url_b, "/audio/aaaaaaaaaa/right.mp3");
    }

    #[test]
    fn test_ingest_slot_is_exclusive() {
        let dir = tempfile::tempdir().unwrap();
        let store = test_store(dir.path());

        let (tx, _rx) = outbox();
        store.attach("s", "a", tx);

        assert!(store.begin_ingest("s"));
        assert!(!store.begin_ingest("s"));
        store.finish_ingest("s");
        assert!(store.begin_ingest("s"));
    }

    #[test]
    fn test_rehydration_restores_binding() {
        let dir = tempfile::tempdir().unwrap();

        {
            let store = test_store(dir.path());
            let (tx, _rx) = outbox();
            store.attach("x", "a", tx);
            store.set_track("x", test_track("aaaaaaaaaa"));
            store.update_playback(
                "x",
                PlaybackPatch {
                    is_playing: Some(true),
                    current_time: Some(10.0),
                },
            );
        }

        // Fresh store, same state path: simulates a process restart.
        let store = test_store(dir.path());
        store.rehydrate();

        let track = store.track_of("x").expect("binding survived restart");
        assert_eq!(track, test_track("aaaaaaaaaa"));

        let view = store.view("x").unwrap();
        assert!(!view.playback_state.is_playing);
        assert_eq!(view.playback_state.current_time, 0.0);
    }

    #[tokio::test]
    async fn test_reap_drops_only_empty_trackless_sessions() {
        let dir = tempfile::tempdir().unwrap();
        let store = test_store(dir.path());

        let (tx_y, _rx_y) = outbox();
        store.attach("y", "a", tx_y);
        store.detach("y", "a");

        let (tx_z, _rx_z) = outbox();
        store.attach("z", "b", tx_z);
        store.set_track("z", test_track("aaaaaaaaaa"));
        store.detach("z", "b");

        tokio::time::sleep(Duration::from_millis(120)).await;

        assert!(store.view("y").is_none(), "trackless session reaped");
        assert!(store.view("z").is_some(), "track-bound session persists");
    }
}
