// ABOUTME: Protocol message type definitions and serialization
// ABOUTME: Supports join_session, play/pause/seek broadcasts, clock-sync ping/pong, etc.

use serde::{Deserialize, Serialize};

/// The channel role a client plays within its session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelRole {
    /// Left mono slice of the stream
    Left,
    /// Right mono slice of the stream
    Right,
    /// Full mix (reserved; never auto-assigned)
    Stereo,
}

impl ChannelRole {
    /// Protocol string for this role
    pub fn as_str(&self) -> &'static str {
        match self {
            ChannelRole::Left => "left",
            ChannelRole::Right => "right",
            ChannelRole::Stereo => "stereo",
        }
    }
}

/// Messages sent from a client to the server.
///
/// One JSON envelope per WebSocket text frame; the `type` field selects the
/// variant and the remaining fields sit flat beside it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Join (or create) a session by id
    #[serde(rename_all = "camelCase")]
    JoinSession {
        /// Session to join; created if absent
        session_id: String,
    },

    /// Submit a remote source URL for ingestion
    SubmitLink {
        /// Remote source URL (host must be on the acceptance list)
        url: String,
    },

    /// Bind an already-ingested library track to the session
    #[serde(rename_all = "camelCase")]
    LoadTrack {
        /// Library track id
        track_id: String,
    },

    /// The client has loaded its channel artifact and can start on schedule
    Ready,

    /// Ask the coordinator to schedule a synchronized play
    PlayRequest,

    /// Ask the coordinator to broadcast a pause
    PauseRequest,

    /// Ask the coordinator to broadcast a seek
    #[serde(rename_all = "camelCase")]
    SeekRequest {
        /// Seek target in seconds
        target_time: f64,
    },

    /// Ask the coordinator to rebroadcast a per-channel volume change
    VolumeRequest {
        /// Channel the volume applies to
        channel: ChannelRole,
        /// Volume 0-100
        volume: u8,
    },

    /// Clock-sync probe
    #[serde(rename_all = "camelCase")]
    Ping {
        /// Client wall-clock at transmission (ms since epoch)
        client_timestamp: f64,
    },
}

/// A roster entry in a `client_list` broadcast.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientEntry {
    /// Client id
    pub id: String,
    /// Assigned channel role
    pub channel: ChannelRole,
    /// Whether the client has reported ready for the current track
    pub ready: bool,
}

/// A library entry in a `track_list` broadcast.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackEntry {
    /// Track id
    pub id: String,
    /// Track title
    pub title: String,
    /// Duration in seconds
    pub duration: f64,
}

/// Messages sent from the server to a client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Join acknowledgement with the assigned channel role
    #[serde(rename_all = "camelCase")]
    SessionJoined {
        /// Session id (echoed, or generated if the client sent an empty one)
        session_id: String,
        /// Server-assigned client id
        client_id: String,
        /// Assigned channel role
        channel: ChannelRole,
    },

    /// Ingestion has started for the submitted URL
    AudioLoading {
        /// The URL being ingested
        url: String,
    },

    /// A track is bound and its artifact for this client's channel is playable
    #[serde(rename_all = "camelCase")]
    AudioReady {
        /// Artifact URL matching the receiving client's channel
        audio_url: String,
        /// Track duration in seconds
        duration: f64,
        /// Track title
        title: String,
        /// Library track id
        track_id: String,
    },

    /// Scheduled play broadcast
    #[serde(rename_all = "camelCase")]
    Play {
        /// Offset within the track to start from, in seconds
        start_time: f64,
        /// Latency-compensated server instant at which to start (ms since epoch)
        server_timestamp: f64,
    },

    /// Pause broadcast, applied at receipt
    #[serde(rename_all = "camelCase")]
    Pause {
        /// Position the session paused at, in seconds
        current_time: f64,
        /// Server instant the pause was issued (ms since epoch)
        server_timestamp: f64,
    },

    /// Seek broadcast, applied at receipt
    #[serde(rename_all = "camelCase")]
    Seek {
        /// Seek target in seconds
        target_time: f64,
        /// Server instant the seek was issued (ms since epoch)
        server_timestamp: f64,
    },

    /// Clock-sync reply
    #[serde(rename_all = "camelCase")]
    Pong {
        /// Server wall-clock at response-write time (ms since epoch)
        server_timestamp: f64,
        /// Echo of the probe's client timestamp (ms since epoch)
        client_timestamp: f64,
    },

    /// Current session roster
    ClientList {
        /// All clients in the session
        clients: Vec<ClientEntry>,
    },

    /// Current library contents
    TrackList {
        /// Ingested tracks, newest first
        tracks: Vec<TrackEntry>,
    },

    /// Per-channel volume change, rebroadcast verbatim to all peers
    VolumeChange {
        /// Channel the volume applies to
        channel: ChannelRole,
        /// Volume 0-100
        volume: u8,
    },

    /// Targeted error report
    Error {
        /// Human-readable message
        message: String,
    },
}

const CLIENT_TYPES: &[&str] = &[
    "join_session",
    "submit_link",
    "load_track",
    "ready",
    "play_request",
    "pause_request",
    "seek_request",
    "volume_request",
    "ping",
];

const SERVER_TYPES: &[&str] = &[
    "session_joined",
    "audio_loading",
    "audio_ready",
    "play",
    "pause",
    "seek",
    "pong",
    "client_list",
    "track_list",
    "volume_change",
    "error",
];

/// Decode a client envelope.
///
/// Returns `Ok(None)` for a well-formed envelope whose `type` is unknown
/// (unknown types are ignored by both sides) and `Err` for malformed JSON or
/// a known type with a broken payload.
pub fn decode_client(text: &str) -> crate::Result<Option<ClientMessage>> {
    decode(text, CLIENT_TYPES)
}

/// Decode a server envelope. Same unknown-type semantics as [`decode_client`].
pub fn decode_server(text: &str) -> crate::Result<Option<ServerMessage>> {
    decode(text, SERVER_TYPES)
}

fn decode<T: serde::de::DeserializeOwned>(text: &str, known: &[&str]) -> crate::Result<Option<T>> {
    let value: serde_json::Value = serde_json::from_str(text)
        .map_err(|e| crate::error::Error::InvalidMessage(e.to_string()))?;

    let tag = value
        .get("type")
        .and_then(|t| t.as_str())
        .ok_or_else(|| crate::error::Error::InvalidMessage("missing type field".to_string()))?;

    if !known.contains(&tag) {
        return Ok(None);
    }

    serde_json::from_value(value)
        .map(Some)
        .map_err(|e| crate::error::Error::InvalidMessage(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_envelope_shape() {
        let msg = ClientMessage::JoinSession {
            session_id: "abcd".to_string(),
        };
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["type"], "join_session");
        assert_eq!(json["sessionId"], "abcd");
    }

    #[test]
    fn test_play_broadcast_shape() {
        let msg = ServerMessage::Play {
            start_time: 0.0,
            server_timestamp: 1490.0,
        };
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["type"], "play");
        assert_eq!(json["startTime"], 0.0);
        assert_eq!(json["serverTimestamp"], 1490.0);
    }

    #[test]
    fn test_ready_has_no_payload() {
        let json = serde_json::to_string(&ClientMessage::Ready).unwrap();
        assert_eq!(json, r#"{"type":"ready"}"#);
    }

    #[test]
    fn test_channel_role_strings() {
        assert_eq!(
            serde_json::to_string(&ChannelRole::Left).unwrap(),
            "\"left\""
        );
        assert_eq!(
            serde_json::to_string(&ChannelRole::Stereo).unwrap(),
            "\"stereo\""
        );
    }

    #[test]
    fn test_unknown_type_is_ignored() {
        let decoded = decode_client(r#"{"type":"telemetry","blob":42}"#).unwrap();
        assert!(decoded.is_none());
    }

    #[test]
    fn test_malformed_json_is_an_error() {
        assert!(decode_client("{not json").is_err());
        assert!(decode_client(r#"{"noType":1}"#).is_err());
    }

    #[test]
    fn test_known_type_with_broken_payload_is_an_error() {
        // seek_request requires targetTime
        assert!(decode_client(r#"{"type":"seek_request"}"#).is_err());
    }

    #[test]
    fn test_ping_round_trip() {
        let decoded = decode_client(r#"{"type":"ping","clientTimestamp":1234.5}"#)
            .unwrap()
            .unwrap();
        assert_eq!(
            decoded,
            ClientMessage::Ping {
                client_timestamp: 1234.5
            }
        );
    }
}
